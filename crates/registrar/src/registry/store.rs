//! Storage abstraction for the registrar core.
//!
//! The original system hid row locking inside `SELECT ... FOR UPDATE` calls;
//! here the lock scope is an explicit combinator, `with_section_lock`, so the
//! transaction boundary is part of the contract and testable without a live
//! database. Everything staged through a [`RegistryTxn`] commits atomically
//! when the closure returns `Ok` and is discarded wholesale when it returns
//! `Err` — including any seat reservation staged earlier in the attempt.

pub mod memory;

use std::time::Duration;

use super::domain::{
    ComponentId, Course, CourseId, Enrollment, EnrollmentId, Grade, GradeComponent, Section,
    SectionId, Term, UserId,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    /// Bounded lock wait expired; retryable.
    #[error("timed out after {waited_ms} ms waiting for the section lock")]
    LockTimeout { waited_ms: u64 },
    /// Underlying store unreachable or a commit failed unexpectedly.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Reads and staged writes visible inside a section-locked transaction.
/// Reads observe committed state overlaid with this transaction's own staged
/// writes.
pub trait RegistryTxn {
    fn course(&self, id: &CourseId) -> Result<Course, StoreError>;
    fn courses(&self, ids: &[CourseId]) -> Result<Vec<Course>, StoreError>;
    fn section(&self, id: &SectionId) -> Result<Section, StoreError>;
    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, StoreError>;
    fn enrollment_for_pair(
        &self,
        student: &UserId,
        section: &SectionId,
    ) -> Result<Option<Enrollment>, StoreError>;
    fn enrollments_for_student(&self, student: &UserId) -> Result<Vec<Enrollment>, StoreError>;
    fn registered_enrollments_for_section(
        &self,
        section: &SectionId,
    ) -> Result<Vec<Enrollment>, StoreError>;
    fn components_for_section(
        &self,
        section: &SectionId,
    ) -> Result<Vec<GradeComponent>, StoreError>;
    fn score(
        &self,
        enrollment: &EnrollmentId,
        component: &ComponentId,
    ) -> Result<Option<f64>, StoreError>;

    fn put_section(&mut self, section: Section);
    fn put_enrollment(&mut self, enrollment: Enrollment);
    fn put_grade(&mut self, grade: Grade);
}

/// Store contract consumed by the enrollment service and settlement engine.
///
/// The snapshot reads run under ordinary read-committed visibility; only
/// `with_section_lock` grants exclusive access, and only to one section.
pub trait RegistryStore: Send + Sync {
    fn course(&self, id: &CourseId) -> Result<Option<Course>, StoreError>;
    fn section(&self, id: &SectionId) -> Result<Option<Section>, StoreError>;
    fn sections_for_term(&self, term: &Term) -> Result<Vec<Section>, StoreError>;
    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, StoreError>;
    fn enrollments_for_student(&self, student: &UserId) -> Result<Vec<Enrollment>, StoreError>;
    fn registered_enrollments_for_section(
        &self,
        section: &SectionId,
    ) -> Result<Vec<Enrollment>, StoreError>;
    fn components_for_section(
        &self,
        section: &SectionId,
    ) -> Result<Vec<GradeComponent>, StoreError>;
    fn score(
        &self,
        enrollment: &EnrollmentId,
        component: &ComponentId,
    ) -> Result<Option<f64>, StoreError>;

    /// Runs `body` while holding the exclusive lock for `section_id`.
    ///
    /// The lock is acquired with a bounded wait (`max_wait`); on expiry the
    /// attempt fails with [`StoreError::LockTimeout`] without running `body`.
    /// Staged writes commit iff `body` returns `Ok`; any `Err` rolls the
    /// whole transaction back. The lock is released either way.
    fn with_section_lock<T, E, F>(
        &self,
        section_id: &SectionId,
        max_wait: Duration,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut dyn RegistryTxn) -> Result<T, E>,
        E: From<StoreError>;
}
