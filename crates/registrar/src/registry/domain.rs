use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for catalog courses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseId(pub String);

/// Identifier wrapper for scheduled sections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectionId(pub String);

/// Identifier wrapper for enrollment rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentId(pub String);

/// Identifier wrapper for grade components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub String);

/// Identifier wrapper for user accounts (students, instructors, admins).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EnrollmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller capability attached to a request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Request-scoped identity threaded through every core call.
///
/// Replaces the implicit session singleton the original system leaned on; the
/// effective date rides along so deadline checks are reproducible in tests and
/// backdated administrative runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user: UserId,
    pub role: Role,
    pub today: NaiveDate,
}

impl RequestContext {
    pub fn new(user: UserId, role: Role, today: NaiveDate) -> Self {
        Self { user, role, today }
    }

    pub fn student(user: impl Into<String>, today: NaiveDate) -> Self {
        Self::new(UserId(user.into()), Role::Student, today)
    }

    pub fn instructor(user: impl Into<String>, today: NaiveDate) -> Self {
        Self::new(UserId(user.into()), Role::Instructor, today)
    }

    pub fn admin(user: impl Into<String>, today: NaiveDate) -> Self {
        Self::new(UserId(user.into()), Role::Admin, today)
    }
}

/// Academic term a section is offered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub const fn label(self) -> &'static str {
        match self {
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    pub season: Season,
    pub year: u16,
}

impl Term {
    pub fn new(season: Season, year: u16) -> Self {
        Self { season, year }
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.season.label(), self.year)
    }
}

impl FromStr for Term {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (season, year) = value
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("term '{value}' is not of the form '<season>-<year>'"))?;

        let season = match season.to_ascii_lowercase().as_str() {
            "spring" => Season::Spring,
            "summer" => Season::Summer,
            "fall" => Season::Fall,
            other => return Err(format!("unknown season '{other}'")),
        };
        let year = year
            .parse::<u16>()
            .map_err(|_| format!("term year '{year}' is not a number"))?;

        Ok(Term { season, year })
    }
}

/// Catalog course with directed prerequisite edges to other courses.
///
/// The edge list is acyclic by convention only; cycle detection belongs to
/// catalog management tooling, not the registration path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub code: String,
    pub title: String,
    pub credits: u8,
    pub active: bool,
    pub prerequisites: Vec<CourseId>,
}

/// One scheduled offering of a course.
///
/// `enrolled_count` is mutated only by seat allocation, always inside the same
/// transaction as the enrollment status change that justifies it. The
/// invariant `0 <= enrolled_count <= capacity` must hold even under
/// concurrent registration and drop traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub course_id: CourseId,
    pub instructor_id: UserId,
    pub term: Term,
    pub capacity: u32,
    pub enrolled_count: u32,
    /// Human-entered day/time string, e.g. `"Mon/Wed 10:00-11:30"`.
    pub schedule: String,
    pub add_deadline: NaiveDate,
    pub drop_deadline: NaiveDate,
}

/// Reachable enrollment states.
///
/// The legacy store also carried a `completed` status that nothing ever
/// transitioned into; it is intentionally not modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Registered,
    Dropped,
}

impl EnrollmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EnrollmentStatus::Registered => "registered",
            EnrollmentStatus::Dropped => "dropped",
        }
    }
}

/// Association between one student and one section.
///
/// At most one row exists per (student, section) pair; it is flipped between
/// registered and dropped rather than deleted, so re-registration reuses the
/// row. `final_grade` is written only by the settlement engine, but stays a
/// string so historical marks (`W`, `I`) remain representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student_id: UserId,
    pub section_id: SectionId,
    pub status: EnrollmentStatus,
    pub enrolled_at: NaiveDateTime,
    pub dropped_at: Option<NaiveDateTime>,
    pub final_grade: Option<String>,
}

impl Enrollment {
    pub fn is_registered(&self) -> bool {
        self.status == EnrollmentStatus::Registered
    }
}

/// Weighted grading component of a section (e.g. "Midterm", 30 points).
///
/// Weights need not sum to 100 while grading is being configured; settlement
/// refuses to run until they do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeComponent {
    pub id: ComponentId,
    pub section_id: SectionId,
    pub name: String,
    /// Percentage points this component contributes to the final grade.
    pub weight: f64,
    pub max_score: f64,
}

/// Raw score for one (enrollment, component) pair. Upsert semantics: at most
/// one per pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub enrollment_id: EnrollmentId,
    pub component_id: ComponentId,
    pub score: f64,
}

/// Final letter grade written by the settlement engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    /// Fixed thresholds over the weighted total.
    pub fn from_total(total: f64) -> Self {
        if total >= 90.0 {
            LetterGrade::A
        } else if total >= 80.0 {
            LetterGrade::B
        } else if total >= 70.0 {
            LetterGrade::C
        } else if total >= 60.0 {
            LetterGrade::D
        } else {
            LetterGrade::F
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a recorded final grade satisfies a prerequisite. Absent,
/// failing, withdrawn, incomplete, and blank marks all miss the bar.
pub fn is_passing_final_grade(grade: Option<&str>) -> bool {
    match grade {
        Some(mark) => !matches!(mark, "F" | "W" | "I" | ""),
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::{is_passing_final_grade, LetterGrade, Season, Term};
    use std::str::FromStr;

    #[test]
    fn letter_grade_thresholds() {
        assert_eq!(LetterGrade::from_total(92.0), LetterGrade::A);
        assert_eq!(LetterGrade::from_total(90.0), LetterGrade::A);
        assert_eq!(LetterGrade::from_total(89.99), LetterGrade::B);
        assert_eq!(LetterGrade::from_total(70.0), LetterGrade::C);
        assert_eq!(LetterGrade::from_total(60.0), LetterGrade::D);
        assert_eq!(LetterGrade::from_total(59.9), LetterGrade::F);
    }

    #[test]
    fn passing_grade_excludes_incomplete_marks() {
        assert!(is_passing_final_grade(Some("A")));
        assert!(is_passing_final_grade(Some("D")));
        assert!(!is_passing_final_grade(Some("F")));
        assert!(!is_passing_final_grade(Some("W")));
        assert!(!is_passing_final_grade(Some("I")));
        assert!(!is_passing_final_grade(Some("")));
        assert!(!is_passing_final_grade(None));
    }

    #[test]
    fn term_parses_season_and_year() {
        assert_eq!(
            Term::from_str("fall-2026").expect("valid term"),
            Term::new(Season::Fall, 2026)
        );
        assert!(Term::from_str("winter-2026").is_err());
        assert!(Term::from_str("fall2026").is_err());
    }
}
