//! Grade settlement: weighted totals, letter mapping, batch commit.
//!
//! Settlement is all-or-nothing per section. A malformed weight
//! configuration is rejected before any transaction opens; students missing
//! a component score are soft-skipped so instructors can settle in waves as
//! grading completes.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::access::{Action, PermissionGate};
use super::domain::{
    ComponentId, EnrollmentId, Grade, GradeComponent, LetterGrade, RequestContext, Role, Section,
    SectionId, UserId,
};
use super::notify::{NotificationSink, Notice, Recipient};
use super::service::RegistrarPolicy;
use super::store::{RegistryStore, StoreError};

/// Component weights must reach exactly 100 points, within this tolerance.
const WEIGHT_TOLERANCE: f64 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("{0}")]
    Denied(String),
    #[error("component weights sum to {total:.2}, expected 100.00")]
    IncompleteWeights { total: f64 },
    #[error("score {score} is outside the component range 0..={max_score}")]
    ScoreOutOfRange { score: f64, max_score: f64 },
    #[error("component {component} does not belong to section {section}")]
    ComponentMismatch {
        component: ComponentId,
        section: SectionId,
    },
    #[error("enrollment {enrollment} does not belong to section {section}")]
    EnrollmentMismatch {
        enrollment: EnrollmentId,
        section: SectionId,
    },
    #[error("timed out waiting for the section lock")]
    LockTimeout,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout { .. } => SettlementError::LockTimeout,
            other => SettlementError::Store(other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettledGrade {
    pub enrollment_id: EnrollmentId,
    pub student_id: UserId,
    pub total: f64,
    pub letter: LetterGrade,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementOutcome {
    pub section_id: SectionId,
    pub settled: Vec<SettledGrade>,
    /// Students left without a final grade because a component score was
    /// missing; a later settlement run picks them up.
    pub skipped: Vec<UserId>,
}

/// Computes and persists final letter grades for a section.
pub struct SettlementEngine<S, N> {
    store: Arc<S>,
    sink: Arc<N>,
    gate: Arc<dyn PermissionGate>,
    policy: RegistrarPolicy,
}

impl<S, N> SettlementEngine<S, N>
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

    fn ensure_allowed(&self, ctx: &RequestContext, action: Action) -> Result<(), SettlementError> {
        if self.gate.is_action_allowed(ctx, action) {
            Ok(())
        } else {
            Err(SettlementError::Denied(self.gate.reason_denied(ctx, action)))
        }
    }

    fn owned_section(
        &self,
        ctx: &RequestContext,
        section_id: &SectionId,
    ) -> Result<Section, SettlementError> {
        let section = self
            .store
            .section(section_id)?
            .ok_or_else(|| StoreError::not_found("section", section_id))?;
        if ctx.role != Role::Admin && section.instructor_id != ctx.user {
            return Err(SettlementError::Denied(
                "only the section's instructor may manage its grades".to_string(),
            ));
        }
        Ok(section)
    }

    /// Settles every registered enrollment of the section that has a full
    /// set of component scores, committing all final grades in one
    /// transaction.
    pub fn compute_final_grades(
        &self,
        ctx: &RequestContext,
        section_id: &SectionId,
    ) -> Result<SettlementOutcome, SettlementError> {
        self.ensure_allowed(ctx, Action::SettleGrades)?;
        let section = self.owned_section(ctx, section_id)?;
        let course = self
            .store
            .course(&section.course_id)?
            .ok_or_else(|| StoreError::not_found("course", &section.course_id))?;

        // Hard pre-transaction rejection: nothing is written when the
        // weight configuration is incomplete.
        let components = self.store.components_for_section(section_id)?;
        let total_weight: f64 = components.iter().map(|c| c.weight).sum();
        if (total_weight - 100.0).abs() > WEIGHT_TOLERANCE {
            return Err(SettlementError::IncompleteWeights {
                total: total_weight,
            });
        }

        let outcome = self
            .store
            .with_section_lock(section_id, self.policy.lock_wait, |txn| {
                let mut settled = Vec::new();
                let mut skipped = Vec::new();

                for enrollment in txn.registered_enrollments_for_section(section_id)? {
                    match weighted_total(txn, &enrollment.id, &components)? {
                        Some(total) => {
                            let letter = LetterGrade::from_total(total);
                            let mut enrollment = enrollment;
                            enrollment.final_grade = Some(letter.as_str().to_string());
                            settled.push(SettledGrade {
                                enrollment_id: enrollment.id.clone(),
                                student_id: enrollment.student_id.clone(),
                                total,
                                letter,
                            });
                            txn.put_enrollment(enrollment);
                        }
                        None => skipped.push(enrollment.student_id),
                    }
                }

                Ok::<_, SettlementError>(SettlementOutcome {
                    section_id: section_id.clone(),
                    settled,
                    skipped,
                })
            })?;

        info!(
            section = %section_id,
            settled = outcome.settled.len(),
            skipped = outcome.skipped.len(),
            "final grades settled"
        );

        for grade in &outcome.settled {
            self.dispatch(
                Recipient::User(grade.student_id.clone()),
                Notice::final_grade_posted(&course.code, grade.letter),
            );
        }
        self.dispatch(
            Recipient::Role(Role::Admin),
            Notice::section_settled(section_id, outcome.settled.len(), outcome.skipped.len()),
        );

        Ok(outcome)
    }

    /// Upserts one raw component score, validated against the component's
    /// range and the enrollment's section.
    pub fn record_score(
        &self,
        ctx: &RequestContext,
        section_id: &SectionId,
        enrollment_id: &EnrollmentId,
        component_id: &ComponentId,
        score: f64,
    ) -> Result<(), SettlementError> {
        self.ensure_allowed(ctx, Action::RecordScore)?;
        self.owned_section(ctx, section_id)?;

        self.store
            .with_section_lock(section_id, self.policy.lock_wait, |txn| {
                let components = txn.components_for_section(section_id)?;
                let component = components
                    .iter()
                    .find(|c| c.id == *component_id)
                    .ok_or_else(|| SettlementError::ComponentMismatch {
                        component: component_id.clone(),
                        section: section_id.clone(),
                    })?;

                if !(0.0..=component.max_score).contains(&score) {
                    return Err(SettlementError::ScoreOutOfRange {
                        score,
                        max_score: component.max_score,
                    });
                }

                let enrollment = txn
                    .enrollment(enrollment_id)?
                    .ok_or_else(|| StoreError::not_found("enrollment", enrollment_id))?;
                if enrollment.section_id != *section_id {
                    return Err(SettlementError::EnrollmentMismatch {
                        enrollment: enrollment_id.clone(),
                        section: section_id.clone(),
                    });
                }

                txn.put_grade(Grade {
                    enrollment_id: enrollment_id.clone(),
                    component_id: component_id.clone(),
                    score,
                });
                Ok(())
            })
    }

    fn dispatch(&self, recipient: Recipient, notice: Notice) {
        if let Err(err) = self.sink.notify(recipient.clone(), notice) {
            warn!(?recipient, %err, "notification delivery failed");
        }
    }
}

/// `Σ (score / max_score) × weight` across all components, or `None` when
/// any component score is missing.
fn weighted_total(
    txn: &dyn super::store::RegistryTxn,
    enrollment_id: &EnrollmentId,
    components: &[GradeComponent],
) -> Result<Option<f64>, StoreError> {
    let mut total = 0.0;
    for component in components {
        match txn.score(enrollment_id, &component.id)? {
            Some(score) if component.max_score > 0.0 => {
                total += score / component.max_score * component.weight;
            }
            Some(_) => {}
            None => return Ok(None),
        }
    }
    Ok(Some(total))
}
