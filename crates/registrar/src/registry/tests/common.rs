use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::registry::access::RolePermissionGate;
use crate::registry::domain::{
    ComponentId, Course, CourseId, Enrollment, EnrollmentId, EnrollmentStatus, GradeComponent,
    Season, Section, SectionId, Term, UserId,
};
use crate::registry::notify::{Notice, NotificationSink, NotifyError, Recipient};
use crate::registry::service::{EnrollmentService, RegistrarPolicy};
use crate::registry::settlement::SettlementEngine;
use crate::registry::registrar_router;
use crate::registry::store::memory::MemoryStore;

pub(super) const TODAY: &str = "2026-09-01";
pub(super) const ADD_DEADLINE: &str = "2026-09-08";
pub(super) const DROP_DEADLINE: &str = "2026-10-15";

pub(super) fn date(value: &str) -> NaiveDate {
    value.parse().expect("valid date")
}

pub(super) fn today() -> NaiveDate {
    date(TODAY)
}

pub(super) fn term() -> Term {
    Term::new(Season::Fall, 2026)
}

pub(super) fn course(id: &str, code: &str, prereqs: &[&str]) -> Course {
    Course {
        id: CourseId(id.to_string()),
        code: code.to_string(),
        title: format!("{code} lecture"),
        credits: 3,
        active: true,
        prerequisites: prereqs.iter().map(|p| CourseId(p.to_string())).collect(),
    }
}

pub(super) fn section(id: &str, course_id: &str, capacity: u32, schedule: &str) -> Section {
    Section {
        id: SectionId(id.to_string()),
        course_id: CourseId(course_id.to_string()),
        instructor_id: UserId("inst-1".to_string()),
        term: term(),
        capacity,
        enrolled_count: 0,
        schedule: schedule.to_string(),
        add_deadline: date(ADD_DEADLINE),
        drop_deadline: date(DROP_DEADLINE),
    }
}

pub(super) fn component(id: &str, section_id: &str, name: &str, weight: f64) -> GradeComponent {
    GradeComponent {
        id: ComponentId(id.to_string()),
        section_id: SectionId(section_id.to_string()),
        name: name.to_string(),
        weight,
        max_score: 100.0,
    }
}

/// Seeds a catalog with an introductory course, a follow-up course gated on
/// it, and one open section of each.
pub(super) fn seed_catalog(store: &MemoryStore) {
    store.insert_course(course("crs-101", "CS101", &[]));
    store.insert_course(course("crs-201", "CS201", &["crs-101"]));
    store.insert_section(section("sec-101", "crs-101", 30, "Mon/Wed 10:00-11:30"));
    store.insert_section(section("sec-201", "crs-201", 30, "Tue/Thu 14:00-15:30"));
}

/// Records a completed enrollment with a final grade, so the student's
/// transcript satisfies (or fails) a prerequisite.
pub(super) fn seed_passed(store: &MemoryStore, student: &str, section_id: &str, grade: &str) {
    store.insert_enrollment(Enrollment {
        id: EnrollmentId(format!("hist-{student}-{section_id}")),
        student_id: UserId(student.to_string()),
        section_id: SectionId(section_id.to_string()),
        status: EnrollmentStatus::Dropped,
        enrolled_at: Utc::now().naive_utc(),
        dropped_at: Some(Utc::now().naive_utc()),
        final_grade: Some(grade.to_string()),
    });
}

#[derive(Default)]
pub(super) struct RecordingSink {
    sent: Mutex<Vec<(Recipient, Notice)>>,
}

impl RecordingSink {
    pub(super) fn sent(&self) -> Vec<(Recipient, Notice)> {
        self.sent.lock().expect("sink mutex poisoned").clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, recipient: Recipient, notice: Notice) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("sink mutex poisoned")
            .push((recipient, notice));
        Ok(())
    }
}

/// Sink whose transport always fails; deliveries must be swallowed.
pub(super) struct FailingSink;

impl NotificationSink for FailingSink {
    fn notify(&self, _recipient: Recipient, _notice: Notice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay down".to_string()))
    }
}

pub(super) fn policy() -> RegistrarPolicy {
    RegistrarPolicy::new(Duration::from_millis(200), term())
}

pub(super) fn build_service(
    store: Arc<MemoryStore>,
) -> (
    EnrollmentService<MemoryStore, RecordingSink>,
    Arc<RecordingSink>,
) {
    let sink = Arc::new(RecordingSink::default());
    let gate = Arc::new(RolePermissionGate::default());
    let service = EnrollmentService::new(store, sink.clone(), gate, policy());
    (service, sink)
}

pub(super) fn build_engine(
    store: Arc<MemoryStore>,
) -> (
    SettlementEngine<MemoryStore, RecordingSink>,
    Arc<RecordingSink>,
) {
    let sink = Arc::new(RecordingSink::default());
    let gate = Arc::new(RolePermissionGate::default());
    let engine = SettlementEngine::new(store, sink.clone(), gate, policy());
    (engine, sink)
}

pub(super) fn build_router(store: Arc<MemoryStore>) -> axum::Router {
    let sink = Arc::new(RecordingSink::default());
    let gate: Arc<RolePermissionGate> = Arc::new(RolePermissionGate::default());
    let service = Arc::new(EnrollmentService::new(
        store.clone(),
        sink.clone(),
        gate.clone(),
        policy(),
    ));
    let engine = Arc::new(SettlementEngine::new(store, sink, gate, policy()));
    registrar_router(service, engine)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
