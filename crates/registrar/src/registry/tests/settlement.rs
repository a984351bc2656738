use std::sync::Arc;

use super::common::{build_engine, build_service, component, seed_catalog, today};
use crate::registry::domain::{
    ComponentId, EnrollmentId, LetterGrade, RequestContext, Role, SectionId, UserId,
};
use crate::registry::notify::{NoticeKind, Recipient};
use crate::registry::settlement::SettlementError;
use crate::registry::store::memory::MemoryStore;
use crate::registry::store::RegistryStore;

fn sid(id: &str) -> SectionId {
    SectionId(id.to_string())
}

fn uid(id: &str) -> UserId {
    UserId(id.to_string())
}

fn cid(id: &str) -> ComponentId {
    ComponentId(id.to_string())
}

/// Seeds the shared catalog plus a 40/60 grading scheme on sec-101 and
/// registers the named students into it.
fn grading_fixture(students: &[&str]) -> (Arc<MemoryStore>, Vec<EnrollmentId>) {
    let store = Arc::new(MemoryStore::new());
    seed_catalog(&store);
    store.insert_component(component("cmp-mid", "sec-101", "Midterm", 40.0));
    store.insert_component(component("cmp-fin", "sec-101", "Final", 60.0));

    let (service, _) = build_service(store.clone());
    let mut enrollments = Vec::new();
    for student in students {
        let ctx = RequestContext::student(*student, today());
        let outcome = service
            .register(&ctx, &uid(student), &sid("sec-101"))
            .expect("registration succeeds");
        enrollments.push(outcome.enrollment.id);
    }
    (store, enrollments)
}

fn instructor() -> RequestContext {
    RequestContext::instructor("inst-1", today())
}

#[test]
fn weighted_totals_map_to_letter_grades() {
    let (store, enrollments) = grading_fixture(&["stu-1"]);
    let (engine, sink) = build_engine(store.clone());
    let ctx = instructor();

    // 90 on the midterm, 93.33 on the final: 0.9*40 + 0.9333*60 = 92.0.
    engine
        .record_score(&ctx, &sid("sec-101"), &enrollments[0], &cid("cmp-mid"), 90.0)
        .expect("score recorded");
    engine
        .record_score(
            &ctx,
            &sid("sec-101"),
            &enrollments[0],
            &cid("cmp-fin"),
            93.33,
        )
        .expect("score recorded");

    let outcome = engine
        .compute_final_grades(&ctx, &sid("sec-101"))
        .expect("settlement succeeds");
    assert_eq!(outcome.settled.len(), 1);
    assert!(outcome.skipped.is_empty());
    assert_eq!(outcome.settled[0].letter, LetterGrade::A);
    assert!((outcome.settled[0].total - 92.0).abs() < 0.01);

    let row = store
        .enrollment(&enrollments[0])
        .expect("store read")
        .expect("row exists");
    assert_eq!(row.final_grade.as_deref(), Some("A"));

    let sent = sink.sent();
    assert!(sent
        .iter()
        .any(|(r, n)| *r == Recipient::User(uid("stu-1"))
            && n.kind == NoticeKind::FinalGradePosted));
    assert!(sent
        .iter()
        .any(|(r, n)| *r == Recipient::Role(Role::Admin) && n.kind == NoticeKind::SectionSettled));
}

#[test]
fn incomplete_weights_reject_before_anything_is_written() {
    let store = Arc::new(MemoryStore::new());
    seed_catalog(&store);
    store.insert_component(component("cmp-mid", "sec-101", "Midterm", 40.0));
    store.insert_component(component("cmp-fin", "sec-101", "Final", 59.0));

    let (service, _) = build_service(store.clone());
    let ctx = RequestContext::student("stu-1", today());
    let outcome = service
        .register(&ctx, &uid("stu-1"), &sid("sec-101"))
        .expect("register");

    let (engine, sink) = build_engine(store.clone());
    let err = engine
        .compute_final_grades(&instructor(), &sid("sec-101"))
        .expect_err("weights sum to 99");
    assert!(matches!(err, SettlementError::IncompleteWeights { total } if (total - 99.0).abs() < 0.01));

    let row = store
        .enrollment(&outcome.enrollment.id)
        .expect("store read")
        .expect("row exists");
    assert!(row.final_grade.is_none(), "no partial writes");
    assert!(sink.sent().is_empty());
}

#[test]
fn students_missing_a_score_are_skipped_not_failed() {
    let (store, enrollments) = grading_fixture(&["stu-1", "stu-2"]);
    let (engine, _) = build_engine(store.clone());
    let ctx = instructor();

    // Only stu-1 is fully graded.
    engine
        .record_score(&ctx, &sid("sec-101"), &enrollments[0], &cid("cmp-mid"), 70.0)
        .expect("score recorded");
    engine
        .record_score(&ctx, &sid("sec-101"), &enrollments[0], &cid("cmp-fin"), 80.0)
        .expect("score recorded");
    engine
        .record_score(&ctx, &sid("sec-101"), &enrollments[1], &cid("cmp-mid"), 95.0)
        .expect("score recorded");

    let outcome = engine
        .compute_final_grades(&ctx, &sid("sec-101"))
        .expect("settlement succeeds");
    assert_eq!(outcome.settled.len(), 1);
    assert_eq!(outcome.settled[0].enrollment_id, enrollments[0]);
    assert_eq!(outcome.skipped, vec![uid("stu-2")]);

    let ungraded = store
        .enrollment(&enrollments[1])
        .expect("store read")
        .expect("row exists");
    assert!(ungraded.final_grade.is_none());
}

#[test]
fn settlement_is_idempotent_for_already_graded_students() {
    let (store, enrollments) = grading_fixture(&["stu-1"]);
    let (engine, _) = build_engine(store.clone());
    let ctx = instructor();

    engine
        .record_score(&ctx, &sid("sec-101"), &enrollments[0], &cid("cmp-mid"), 75.0)
        .expect("score recorded");
    engine
        .record_score(&ctx, &sid("sec-101"), &enrollments[0], &cid("cmp-fin"), 75.0)
        .expect("score recorded");

    let first = engine
        .compute_final_grades(&ctx, &sid("sec-101"))
        .expect("first run");
    let second = engine
        .compute_final_grades(&ctx, &sid("sec-101"))
        .expect("second run");
    assert_eq!(first.settled[0].letter, second.settled[0].letter);

    let row = store
        .enrollment(&enrollments[0])
        .expect("store read")
        .expect("row exists");
    assert_eq!(row.final_grade.as_deref(), Some("C"));
}

#[test]
fn only_the_sections_instructor_may_settle() {
    let (store, _) = grading_fixture(&["stu-1"]);
    let (engine, _) = build_engine(store);

    let other = RequestContext::instructor("inst-9", today());
    let err = engine
        .compute_final_grades(&other, &sid("sec-101"))
        .expect_err("wrong instructor");
    assert!(matches!(err, SettlementError::Denied(_)));

    let student = RequestContext::student("stu-1", today());
    let err = engine
        .compute_final_grades(&student, &sid("sec-101"))
        .expect_err("students may not settle");
    assert!(matches!(err, SettlementError::Denied(_)));
}

#[test]
fn admins_may_settle_any_section() {
    let (store, enrollments) = grading_fixture(&["stu-1"]);
    let (engine, _) = build_engine(store);
    let ctx = instructor();

    engine
        .record_score(&ctx, &sid("sec-101"), &enrollments[0], &cid("cmp-mid"), 50.0)
        .expect("score recorded");
    engine
        .record_score(&ctx, &sid("sec-101"), &enrollments[0], &cid("cmp-fin"), 50.0)
        .expect("score recorded");

    let admin = RequestContext::admin("adm-1", today());
    let outcome = engine
        .compute_final_grades(&admin, &sid("sec-101"))
        .expect("admin override");
    assert_eq!(outcome.settled[0].letter, LetterGrade::F);
}

#[test]
fn record_score_validates_range_and_membership() {
    let (store, enrollments) = grading_fixture(&["stu-1"]);
    let (engine, _) = build_engine(store.clone());
    let ctx = instructor();

    let err = engine
        .record_score(
            &ctx,
            &sid("sec-101"),
            &enrollments[0],
            &cid("cmp-mid"),
            150.0,
        )
        .expect_err("above max_score");
    assert!(matches!(err, SettlementError::ScoreOutOfRange { .. }));

    let err = engine
        .record_score(
            &ctx,
            &sid("sec-101"),
            &enrollments[0],
            &cid("cmp-none"),
            50.0,
        )
        .expect_err("component of another section");
    assert!(matches!(err, SettlementError::ComponentMismatch { .. }));

    // Enrollment belongs to sec-101, not sec-201.
    store.insert_component(component("cmp-hw", "sec-201", "Homework", 100.0));
    let err = engine
        .record_score(&ctx, &sid("sec-201"), &enrollments[0], &cid("cmp-hw"), 50.0)
        .expect_err("enrollment from another section");
    assert!(matches!(err, SettlementError::EnrollmentMismatch { .. }));

    // Upsert: the last write wins.
    engine
        .record_score(&ctx, &sid("sec-101"), &enrollments[0], &cid("cmp-mid"), 60.0)
        .expect("initial score");
    engine
        .record_score(&ctx, &sid("sec-101"), &enrollments[0], &cid("cmp-mid"), 85.0)
        .expect("corrected score");
    let score = store
        .score(&enrollments[0], &cid("cmp-mid"))
        .expect("store read");
    assert_eq!(score, Some(85.0));
}
