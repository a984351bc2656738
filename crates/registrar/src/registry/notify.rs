//! Best-effort notification side channel.
//!
//! The core builds `Notice`s during a transaction but only hands them to the
//! sink after commit (or, for failure notices, outside the aborted
//! transaction). Sink failures are logged and swallowed; they must never make
//! a committed academic transaction look failed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{LetterGrade, Role, SectionId, UserId};

/// Delivery target: a single user or everyone holding a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    User(UserId),
    Role(Role),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    RegistrationConfirmed,
    RegistrationFailed,
    EnrollmentDropped,
    FinalGradePosted,
    SectionSettled,
}

/// Notification payload handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

impl Notice {
    fn new(kind: NoticeKind, message: String) -> Self {
        Self {
            kind,
            message,
            details: BTreeMap::new(),
        }
    }

    fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn registration_confirmed(course_code: &str, section: &SectionId) -> Self {
        Self::new(
            NoticeKind::RegistrationConfirmed,
            format!("registered for {course_code}"),
        )
        .with_detail("section", section.0.clone())
    }

    pub fn student_registered(student: &UserId, section: &SectionId) -> Self {
        Self::new(
            NoticeKind::RegistrationConfirmed,
            format!("{student} joined your section"),
        )
        .with_detail("section", section.0.clone())
    }

    pub fn registration_failed(section: &SectionId, reason: &str) -> Self {
        Self::new(
            NoticeKind::RegistrationFailed,
            format!("registration for section {section} failed: {reason}"),
        )
        .with_detail("section", section.0.clone())
    }

    pub fn enrollment_dropped(course_code: &str, section: &SectionId) -> Self {
        Self::new(
            NoticeKind::EnrollmentDropped,
            format!("dropped {course_code}"),
        )
        .with_detail("section", section.0.clone())
    }

    pub fn student_dropped(student: &UserId, section: &SectionId) -> Self {
        Self::new(
            NoticeKind::EnrollmentDropped,
            format!("{student} dropped your section"),
        )
        .with_detail("section", section.0.clone())
    }

    pub fn final_grade_posted(course_code: &str, letter: LetterGrade) -> Self {
        Self::new(
            NoticeKind::FinalGradePosted,
            format!("final grade for {course_code} is available"),
        )
        .with_detail("letter", letter.as_str())
    }

    pub fn section_settled(section: &SectionId, settled: usize, skipped: usize) -> Self {
        Self::new(
            NoticeKind::SectionSettled,
            format!("section {section} settled: {settled} graded, {skipped} pending"),
        )
        .with_detail("section", section.0.clone())
        .with_detail("settled", settled.to_string())
        .with_detail("skipped", skipped.to_string())
    }
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Outbound notification hook (e-mail, in-app inbox, ...). Implementations
/// should return quickly; the core never retries.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, recipient: Recipient, notice: Notice) -> Result<(), NotifyError>;
}

/// Sink that drops everything, for callers that do not care about delivery.
#[derive(Debug, Default, Clone)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _recipient: Recipient, _notice: Notice) -> Result<(), NotifyError> {
        Ok(())
    }
}
