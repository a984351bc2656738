//! Core library for the enrollment and grade settlement service.
//!
//! The interesting behavior lives under [`registry`]; the remaining modules
//! carry configuration, telemetry wiring, and the binary-facing error type.

pub mod config;
pub mod error;
pub mod registry;
pub mod telemetry;
