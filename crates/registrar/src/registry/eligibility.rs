//! Prerequisite and deadline validation.
//!
//! Pure functions over already-fetched state: no I/O, no mutation, safe to
//! run speculatively so a registration can fail fast before paying for the
//! section lock.

use chrono::NaiveDate;

use super::domain::{is_passing_final_grade, Course, CourseId, Section};

/// Outcome of the eligibility check for one (student, section) attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Course codes the student has not passed.
    MissingPrerequisites(Vec<String>),
    PastAddDeadline(NaiveDate),
}

/// The slice of a student's history the checker needs: one entry per
/// enrollment, resolved to the course it was for.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub course_id: CourseId,
    pub final_grade: Option<String>,
}

impl TranscriptEntry {
    fn passes(&self, course: &CourseId) -> bool {
        self.course_id == *course && is_passing_final_grade(self.final_grade.as_deref())
    }
}

/// Checks the add deadline, then every prerequisite edge of the target
/// course. Registering exactly on the deadline date succeeds; only a
/// strictly later date fails.
pub fn check(
    section: &Section,
    prerequisites: &[Course],
    transcript: &[TranscriptEntry],
    today: NaiveDate,
) -> Eligibility {
    if today > section.add_deadline {
        return Eligibility::PastAddDeadline(section.add_deadline);
    }

    let missing: Vec<String> = prerequisites
        .iter()
        .filter(|prereq| !transcript.iter().any(|entry| entry.passes(&prereq.id)))
        .map(|prereq| prereq.code.clone())
        .collect();

    if missing.is_empty() {
        Eligibility::Eligible
    } else {
        Eligibility::MissingPrerequisites(missing)
    }
}
