use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::warn;

use super::access::{Action, PermissionGate};
use super::domain::{
    Enrollment, EnrollmentId, EnrollmentStatus, RequestContext, Role, Section, SectionId, Term,
    UserId,
};
use super::eligibility::{self, Eligibility, TranscriptEntry};
use super::notify::{NotificationSink, Notice, Recipient};
use super::seats;
use super::store::{RegistryStore, RegistryTxn, StoreError};
use super::timetable::TimeSlot;

/// Knobs the enrollment and settlement paths share.
#[derive(Debug, Clone)]
pub struct RegistrarPolicy {
    /// Bounded wait for the per-section lock; expiry surfaces as a retryable
    /// contention error instead of blocking indefinitely.
    pub lock_wait: Duration,
    /// Term whose sections are open for registration.
    pub term: Term,
}

impl RegistrarPolicy {
    pub fn new(lock_wait: Duration, term: Term) -> Self {
        Self { lock_wait, term }
    }
}

static ENROLLMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_enrollment_id() -> EnrollmentId {
    let id = ENROLLMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EnrollmentId(format!("enr-{id:06}"))
}

/// Errors surfaced by registration and drop. Permission and validation
/// variants abort before any mutation; contention variants are retryable and
/// distinguishable from one another.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("{0}")]
    Denied(String),
    #[error("missing prerequisites: {}", .0.join(", "))]
    MissingPrerequisites(Vec<String>),
    #[error("registration for this section closed on {0}")]
    PastAddDeadline(NaiveDate),
    #[error("the drop period for this section ended on {0}")]
    PastDropDeadline(NaiveDate),
    #[error("already registered for this section")]
    AlreadyRegistered,
    #[error("enrollment is not currently registered")]
    NotRegistered,
    #[error("timetable conflict with section {0}")]
    TimetableConflict(SectionId),
    #[error("section is full")]
    SectionFull,
    #[error("timed out waiting for the section lock")]
    LockTimeout,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for EnrollmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout { .. } => EnrollmentError::LockTimeout,
            other => EnrollmentError::Store(other),
        }
    }
}

impl EnrollmentError {
    /// Contention and infrastructure failures may succeed on retry;
    /// validation and permission failures will not until the caller changes
    /// something.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnrollmentError::SectionFull
                | EnrollmentError::LockTimeout
                | EnrollmentError::Store(StoreError::Unavailable(_))
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
    pub enrollment: Enrollment,
    pub seats_remaining: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DropOutcome {
    pub enrollment: Enrollment,
    pub seats_remaining: u32,
}

/// A section a student could still join this term.
#[derive(Debug, Clone, Serialize)]
pub struct SectionAvailabilityView {
    pub section_id: SectionId,
    pub course_code: String,
    pub course_title: String,
    pub schedule: String,
    pub seats_remaining: u32,
    pub add_deadline: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentView {
    pub enrollment_id: EnrollmentId,
    pub section_id: SectionId,
    pub course_code: String,
    pub schedule: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_grade: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentScoreView {
    pub component_id: super::domain::ComponentId,
    pub name: String,
    pub weight: f64,
    pub max_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterEntryView {
    pub enrollment_id: EnrollmentId,
    pub student_id: UserId,
    pub scores: Vec<ComponentScoreView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_grade: Option<String>,
}

/// Orchestrates eligibility, conflict detection, seat allocation, and the
/// enrollment row mutation as one atomic unit per attempt.
pub struct EnrollmentService<S, N> {
    store: Arc<S>,
    sink: Arc<N>,
    gate: Arc<dyn PermissionGate>,
    policy: RegistrarPolicy,
}

impl<S, N> EnrollmentService<S, N>
where
    S: RegistryStore + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        store: Arc<S>,
        sink: Arc<N>,
        gate: Arc<dyn PermissionGate>,
        policy: RegistrarPolicy,
    ) -> Self {
        Self {
            store,
            sink,
            gate,
            policy,
        }
    }

    pub fn policy(&self) -> &RegistrarPolicy {
        &self.policy
    }

    fn ensure_allowed(&self, ctx: &RequestContext, action: Action) -> Result<(), EnrollmentError> {
        if self.gate.is_action_allowed(ctx, action) {
            Ok(())
        } else {
            Err(EnrollmentError::Denied(self.gate.reason_denied(ctx, action)))
        }
    }

    /// Registers `student` into `section_id`.
    ///
    /// Runs entirely under the section lock: eligibility, the duplicate
    /// check, seat reservation, and conflict detection all observe and stage
    /// against the same transaction, so any failure rolls the reserved seat
    /// back with everything else.
    pub fn register(
        &self,
        ctx: &RequestContext,
        student: &UserId,
        section_id: &SectionId,
    ) -> Result<RegistrationOutcome, EnrollmentError> {
        self.ensure_allowed(ctx, Action::Register)?;
        self.ensure_self_or_admin(ctx, student)?;

        let today = ctx.today;
        let result: Result<(RegistrationOutcome, Vec<(Recipient, Notice)>), EnrollmentError> =
            self.store
                .with_section_lock(section_id, self.policy.lock_wait, |txn| {
                    let mut section = txn.section(section_id)?;
                    let course = txn.course(&section.course_id)?;

                    let prerequisites = txn.courses(&course.prerequisites)?;
                    let transcript = transcript_for(txn, student)?;
                    match eligibility::check(&section, &prerequisites, &transcript, today) {
                        Eligibility::Eligible => {}
                        Eligibility::MissingPrerequisites(codes) => {
                            return Err(EnrollmentError::MissingPrerequisites(codes))
                        }
                        Eligibility::PastAddDeadline(deadline) => {
                            return Err(EnrollmentError::PastAddDeadline(deadline))
                        }
                    }

                    let existing = txn.enrollment_for_pair(student, section_id)?;
                    if existing.as_ref().is_some_and(Enrollment::is_registered) {
                        return Err(EnrollmentError::AlreadyRegistered);
                    }

                    seats::try_reserve(&mut section).map_err(|_| EnrollmentError::SectionFull)?;

                    // Conflict detection runs after the seat is staged, as the
                    // original commit order did; an abort here discards the
                    // reservation along with the rest of the transaction.
                    if let Some(other) = find_conflict(txn, student, section_id, &section.schedule)?
                    {
                        return Err(EnrollmentError::TimetableConflict(other));
                    }

                    let now = Utc::now().naive_utc();
                    let enrollment = match existing {
                        Some(mut row) => {
                            row.status = EnrollmentStatus::Registered;
                            row.enrolled_at = now;
                            row.dropped_at = None;
                            row
                        }
                        None => Enrollment {
                            id: next_enrollment_id(),
                            student_id: student.clone(),
                            section_id: section_id.clone(),
                            status: EnrollmentStatus::Registered,
                            enrolled_at: now,
                            dropped_at: None,
                            final_grade: None,
                        },
                    };

                    let seats_remaining = seats::seats_remaining(&section);
                    let notices = vec![
                        (
                            Recipient::User(student.clone()),
                            Notice::registration_confirmed(&course.code, section_id),
                        ),
                        (
                            Recipient::User(section.instructor_id.clone()),
                            Notice::student_registered(student, section_id),
                        ),
                    ];

                    txn.put_section(section);
                    txn.put_enrollment(enrollment.clone());

                    Ok((
                        RegistrationOutcome {
                            enrollment,
                            seats_remaining,
                        },
                        notices,
                    ))
                });

        match result {
            Ok((outcome, notices)) => {
                self.dispatch(notices);
                Ok(outcome)
            }
            Err(err) => {
                // Failure notice goes out only for aborted attempts, never
                // for permission denials that preceded the transaction.
                if !matches!(err, EnrollmentError::Denied(_)) {
                    self.dispatch(vec![(
                        Recipient::User(student.clone()),
                        Notice::registration_failed(section_id, &err.to_string()),
                    )]);
                }
                Err(err)
            }
        }
    }

    /// Drops a registered enrollment owned by the caller and releases its
    /// seat in the same transaction.
    pub fn drop_enrollment(
        &self,
        ctx: &RequestContext,
        enrollment_id: &EnrollmentId,
    ) -> Result<DropOutcome, EnrollmentError> {
        self.ensure_allowed(ctx, Action::Drop)?;

        let current = self
            .store
            .enrollment(enrollment_id)?
            .ok_or_else(|| StoreError::not_found("enrollment", enrollment_id))
            .map_err(EnrollmentError::from)?;

        if current.student_id != ctx.user && ctx.role != Role::Admin {
            return Err(EnrollmentError::Denied(
                "this enrollment belongs to another student".to_string(),
            ));
        }

        let section_id = current.section_id.clone();
        let today = ctx.today;
        let (outcome, notices) =
            self.store
                .with_section_lock(&section_id, self.policy.lock_wait, |txn| {
                    let enrollment = txn
                        .enrollment(enrollment_id)?
                        .ok_or_else(|| StoreError::not_found("enrollment", enrollment_id))?;
                    if !enrollment.is_registered() {
                        return Err(EnrollmentError::NotRegistered);
                    }

                    let mut section = txn.section(&section_id)?;
                    if today > section.drop_deadline {
                        return Err(EnrollmentError::PastDropDeadline(section.drop_deadline));
                    }
                    let course = txn.course(&section.course_id)?;

                    let mut enrollment = enrollment;
                    enrollment.status = EnrollmentStatus::Dropped;
                    enrollment.dropped_at = Some(Utc::now().naive_utc());
                    seats::release(&mut section);

                    let seats_remaining = seats::seats_remaining(&section);
                    let notices = vec![
                        (
                            Recipient::User(enrollment.student_id.clone()),
                            Notice::enrollment_dropped(&course.code, &section_id),
                        ),
                        (
                            Recipient::User(section.instructor_id.clone()),
                            Notice::student_dropped(&enrollment.student_id, &section_id),
                        ),
                    ];

                    txn.put_section(section);
                    txn.put_enrollment(enrollment.clone());

                    Ok((
                        DropOutcome {
                            enrollment,
                            seats_remaining,
                        },
                        notices,
                    ))
                })?;

        self.dispatch(notices);
        Ok(outcome)
    }

    /// Current-term sections of active courses with open seats, excluding
    /// courses the student already holds a registration in.
    pub fn available_sections(
        &self,
        ctx: &RequestContext,
        student: &UserId,
    ) -> Result<Vec<SectionAvailabilityView>, EnrollmentError> {
        self.ensure_self_or_admin(ctx, student)?;

        let enrollments = self.store.enrollments_for_student(student)?;
        let mut held_courses = Vec::new();
        for enrollment in enrollments.iter().filter(|e| e.is_registered()) {
            if let Some(section) = self.store.section(&enrollment.section_id)? {
                held_courses.push(section.course_id);
            }
        }

        let mut views = Vec::new();
        for section in self.store.sections_for_term(&self.policy.term)? {
            let Some(course) = self.store.course(&section.course_id)? else {
                continue;
            };
            if !course.active || held_courses.contains(&course.id) {
                continue;
            }
            let seats_remaining = seats::seats_remaining(&section);
            if seats_remaining == 0 {
                continue;
            }
            views.push(SectionAvailabilityView {
                section_id: section.id,
                course_code: course.code,
                course_title: course.title,
                schedule: section.schedule,
                seats_remaining,
                add_deadline: section.add_deadline,
            });
        }
        views.sort_by(|a, b| a.course_code.cmp(&b.course_code));
        Ok(views)
    }

    /// The student's currently registered enrollments.
    pub fn active_enrollments(
        &self,
        ctx: &RequestContext,
        student: &UserId,
    ) -> Result<Vec<EnrollmentView>, EnrollmentError> {
        self.ensure_self_or_admin(ctx, student)?;

        let mut views = Vec::new();
        for enrollment in self.store.enrollments_for_student(student)? {
            if !enrollment.is_registered() {
                continue;
            }
            let section = self
                .store
                .section(&enrollment.section_id)?
                .ok_or_else(|| StoreError::not_found("section", &enrollment.section_id))?;
            let course = self
                .store
                .course(&section.course_id)?
                .ok_or_else(|| StoreError::not_found("course", &section.course_id))?;
            views.push(EnrollmentView {
                enrollment_id: enrollment.id,
                section_id: section.id,
                course_code: course.code,
                schedule: section.schedule,
                status: enrollment.status.label(),
                final_grade: enrollment.final_grade,
            });
        }
        Ok(views)
    }

    /// The section's registered students with their per-component scores.
    /// Restricted to the section's instructor and administrators.
    pub fn roster(
        &self,
        ctx: &RequestContext,
        section_id: &SectionId,
    ) -> Result<Vec<RosterEntryView>, EnrollmentError> {
        self.ensure_allowed(ctx, Action::ViewRoster)?;

        let section = self
            .store
            .section(section_id)?
            .ok_or_else(|| StoreError::not_found("section", section_id))?;
        if ctx.role != Role::Admin && section.instructor_id != ctx.user {
            return Err(EnrollmentError::Denied(
                "only the section's instructor may view its roster".to_string(),
            ));
        }

        let components = self.store.components_for_section(section_id)?;
        let mut entries = Vec::new();
        for enrollment in self.store.registered_enrollments_for_section(section_id)? {
            let mut scores = Vec::with_capacity(components.len());
            for component in &components {
                scores.push(ComponentScoreView {
                    component_id: component.id.clone(),
                    name: component.name.clone(),
                    weight: component.weight,
                    max_score: component.max_score,
                    score: self.store.score(&enrollment.id, &component.id)?,
                });
            }
            entries.push(RosterEntryView {
                enrollment_id: enrollment.id,
                student_id: enrollment.student_id,
                scores,
                final_grade: enrollment.final_grade,
            });
        }
        Ok(entries)
    }

    fn ensure_self_or_admin(
        &self,
        ctx: &RequestContext,
        student: &UserId,
    ) -> Result<(), EnrollmentError> {
        if ctx.user == *student || ctx.role == Role::Admin {
            Ok(())
        } else {
            Err(EnrollmentError::Denied(
                "students may only act on their own records".to_string(),
            ))
        }
    }

    /// Post-commit delivery: failures are logged, never surfaced.
    fn dispatch(&self, notices: Vec<(Recipient, Notice)>) {
        for (recipient, notice) in notices {
            if let Err(err) = self.sink.notify(recipient.clone(), notice) {
                warn!(?recipient, %err, "notification delivery failed");
            }
        }
    }
}

fn transcript_for(
    txn: &dyn RegistryTxn,
    student: &UserId,
) -> Result<Vec<TranscriptEntry>, StoreError> {
    let mut entries = Vec::new();
    for enrollment in txn.enrollments_for_student(student)? {
        let section = txn.section(&enrollment.section_id)?;
        entries.push(TranscriptEntry {
            course_id: section.course_id,
            final_grade: enrollment.final_grade,
        });
    }
    Ok(entries)
}

/// First registered section of the student whose slot overlaps the
/// candidate's, excluding the candidate itself. Unparsable schedule strings
/// never block registration; they are logged and skipped.
fn find_conflict(
    txn: &dyn RegistryTxn,
    student: &UserId,
    candidate_id: &SectionId,
    candidate_schedule: &str,
) -> Result<Option<SectionId>, StoreError> {
    let Some(candidate) = TimeSlot::parse(candidate_schedule) else {
        warn!(section = %candidate_id, schedule = candidate_schedule, "unparsable schedule, skipping conflict check");
        return Ok(None);
    };

    for enrollment in txn.enrollments_for_student(student)? {
        if !enrollment.is_registered() || enrollment.section_id == *candidate_id {
            continue;
        }
        let other = txn.section(&enrollment.section_id)?;
        match TimeSlot::parse(&other.schedule) {
            Some(slot) if candidate.conflicts_with(&slot) => return Ok(Some(other.id)),
            Some(_) => {}
            None => {
                warn!(section = %other.id, schedule = %other.schedule, "unparsable schedule, skipping conflict check");
            }
        }
    }
    Ok(None)
}
