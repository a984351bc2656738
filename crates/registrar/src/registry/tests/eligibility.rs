use chrono::Days;

use super::common::{course, date, section, today, ADD_DEADLINE};
use crate::registry::domain::CourseId;
use crate::registry::eligibility::{check, Eligibility, TranscriptEntry};

fn entry(course_id: &str, grade: Option<&str>) -> TranscriptEntry {
    TranscriptEntry {
        course_id: CourseId(course_id.to_string()),
        final_grade: grade.map(str::to_string),
    }
}

#[test]
fn no_prerequisites_means_eligible() {
    let target = section("sec-101", "crs-101", 30, "Mon 10:00-11:00");
    assert_eq!(check(&target, &[], &[], today()), Eligibility::Eligible);
}

#[test]
fn deadline_is_checked_before_prerequisites() {
    let target = section("sec-201", "crs-201", 30, "Mon 10:00-11:00");
    let prereqs = [course("crs-101", "CS101", &[])];
    let late = date(ADD_DEADLINE)
        .checked_add_days(Days::new(1))
        .expect("valid date");

    // Both conditions fail; the deadline wins.
    assert_eq!(
        check(&target, &prereqs, &[], late),
        Eligibility::PastAddDeadline(date(ADD_DEADLINE))
    );
}

#[test]
fn every_missing_prerequisite_is_reported() {
    let target = section("sec-301", "crs-301", 30, "Mon 10:00-11:00");
    let prereqs = [
        course("crs-101", "CS101", &[]),
        course("crs-201", "CS201", &[]),
    ];
    let transcript = [entry("crs-101", Some("B"))];

    assert_eq!(
        check(&target, &prereqs, &transcript, today()),
        Eligibility::MissingPrerequisites(vec!["CS201".to_string()])
    );
    assert_eq!(
        check(&target, &prereqs, &[], today()),
        Eligibility::MissingPrerequisites(vec!["CS101".to_string(), "CS201".to_string()])
    );
}

#[test]
fn only_passing_marks_satisfy_an_edge() {
    let target = section("sec-201", "crs-201", 30, "Mon 10:00-11:00");
    let prereqs = [course("crs-101", "CS101", &[])];

    for grade in [Some("F"), Some("W"), Some("I"), Some(""), None] {
        let transcript = [entry("crs-101", grade)];
        assert!(
            matches!(
                check(&target, &prereqs, &transcript, today()),
                Eligibility::MissingPrerequisites(_)
            ),
            "grade {grade:?} must not pass"
        );
    }

    let transcript = [entry("crs-101", Some("D"))];
    assert_eq!(
        check(&target, &prereqs, &transcript, today()),
        Eligibility::Eligible
    );
}

#[test]
fn a_later_retake_can_supply_the_pass() {
    let target = section("sec-201", "crs-201", 30, "Mon 10:00-11:00");
    let prereqs = [course("crs-101", "CS101", &[])];
    let transcript = [entry("crs-101", Some("F")), entry("crs-101", Some("C"))];

    assert_eq!(
        check(&target, &prereqs, &transcript, today()),
        Eligibility::Eligible
    );
}
