//! Section registration and grade settlement.
//!
//! Registration mutations run inside a per-section lock held by the backing
//! store, so seat counts never go negative and concurrent registrations for
//! the last seat serialize cleanly. Grade settlement reuses the same lock to
//! keep roster reads consistent while final grades are written. Everything is
//! expressed against the [`store::RegistryStore`] trait, so the in-memory
//! store used by the tests and the demo exercises the exact code paths a
//! durable store would.

pub(crate) mod access;
pub mod domain;
pub(crate) mod eligibility;
pub mod notify;
pub mod router;
pub(crate) mod seats;
pub mod service;
pub mod settlement;
pub mod store;
pub(crate) mod timetable;

#[cfg(test)]
mod tests;

pub use access::{Action, PermissionGate, RolePermissionGate};
pub use domain::{
    ComponentId, Course, CourseId, Enrollment, EnrollmentId, EnrollmentStatus, Grade,
    GradeComponent, LetterGrade, RequestContext, Role, Season, Section, SectionId, Term, UserId,
};
pub use notify::{Notice, NoticeKind, NotificationSink, NotifyError, NullSink, Recipient};
pub use router::{registrar_router, RegistrarState};
pub use service::{
    DropOutcome, EnrollmentError, EnrollmentService, EnrollmentView, RegistrarPolicy,
    RegistrationOutcome, RosterEntryView, SectionAvailabilityView,
};
pub use settlement::{SettlementEngine, SettlementError, SettlementOutcome, SettledGrade};
pub use store::memory::MemoryStore;
pub use store::{RegistryStore, RegistryTxn, StoreError};
