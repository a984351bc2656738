//! In-memory reference store.
//!
//! Per-section exclusivity comes from a condvar-backed lock table with a
//! bounded wait, mirroring the row-lock-plus-timeout behavior the production
//! deployment gets from its database driver. Transactions stage writes in an
//! overlay map and apply them under the state write lock only on commit, so
//! rollback is simply dropping the overlay.

use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex, RwLock};
use std::time::{Duration, Instant};

use super::{RegistryStore, RegistryTxn, StoreError};
use crate::registry::domain::{
    ComponentId, Course, CourseId, Enrollment, EnrollmentId, Grade, GradeComponent, Section,
    SectionId, Term, UserId,
};

#[derive(Default)]
struct State {
    courses: HashMap<CourseId, Course>,
    sections: HashMap<SectionId, Section>,
    enrollments: HashMap<EnrollmentId, Enrollment>,
    pair_index: HashMap<(UserId, SectionId), EnrollmentId>,
    components: HashMap<ComponentId, GradeComponent>,
    grades: HashMap<(EnrollmentId, ComponentId), f64>,
}

/// One-holder-per-section lock table with a bounded wait.
#[derive(Default)]
struct LockTable {
    held: Mutex<HashSet<SectionId>>,
    released: Condvar,
}

impl LockTable {
    fn acquire(&self, id: &SectionId, max_wait: Duration) -> Result<(), StoreError> {
        let started = Instant::now();
        let deadline = started + max_wait;
        let mut held = self.held.lock().expect("lock table poisoned");

        while held.contains(id) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(StoreError::LockTimeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            let (guard, wait) = self
                .released
                .wait_timeout(held, remaining)
                .expect("lock table poisoned");
            held = guard;
            if wait.timed_out() && held.contains(id) {
                return Err(StoreError::LockTimeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
        }

        held.insert(id.clone());
        Ok(())
    }

    fn release(&self, id: &SectionId) {
        self.held.lock().expect("lock table poisoned").remove(id);
        self.released.notify_all();
    }
}

/// Releases the section lock when the transaction scope ends, even on panic.
struct SectionLockGuard<'a> {
    table: &'a LockTable,
    id: SectionId,
}

impl Drop for SectionLockGuard<'_> {
    fn drop(&mut self) {
        self.table.release(&self.id);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    locks: LockTable,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding helpers for fixtures, demos, and catalog maintenance flows
    // that live outside this core.

    pub fn insert_course(&self, course: Course) {
        let mut state = self.state.write().expect("store poisoned");
        state.courses.insert(course.id.clone(), course);
    }

    pub fn insert_section(&self, section: Section) {
        let mut state = self.state.write().expect("store poisoned");
        state.sections.insert(section.id.clone(), section);
    }

    pub fn insert_enrollment(&self, enrollment: Enrollment) {
        let mut state = self.state.write().expect("store poisoned");
        state.pair_index.insert(
            (enrollment.student_id.clone(), enrollment.section_id.clone()),
            enrollment.id.clone(),
        );
        state.enrollments.insert(enrollment.id.clone(), enrollment);
    }

    pub fn insert_component(&self, component: GradeComponent) {
        let mut state = self.state.write().expect("store poisoned");
        state.components.insert(component.id.clone(), component);
    }

    pub fn upsert_grade(&self, grade: Grade) {
        let mut state = self.state.write().expect("store poisoned");
        state
            .grades
            .insert((grade.enrollment_id, grade.component_id), grade.score);
    }

    fn apply(&self, staged: Staged) {
        let mut state = self.state.write().expect("store poisoned");
        for (id, section) in staged.sections {
            state.sections.insert(id, section);
        }
        for (id, enrollment) in staged.enrollments {
            state.pair_index.insert(
                (enrollment.student_id.clone(), enrollment.section_id.clone()),
                id.clone(),
            );
            state.enrollments.insert(id, enrollment);
        }
        for (key, score) in staged.grades {
            state.grades.insert(key, score);
        }
    }
}

#[derive(Default)]
struct Staged {
    sections: HashMap<SectionId, Section>,
    enrollments: HashMap<EnrollmentId, Enrollment>,
    grades: HashMap<(EnrollmentId, ComponentId), f64>,
}

struct MemoryTxn<'a> {
    store: &'a MemoryStore,
    staged: Staged,
}

impl MemoryTxn<'_> {
    fn merged_enrollments<F>(&self, keep: F) -> Result<Vec<Enrollment>, StoreError>
    where
        F: Fn(&Enrollment) -> bool,
    {
        let state = self.store.state.read().expect("store poisoned");
        let mut merged: HashMap<EnrollmentId, Enrollment> = state
            .enrollments
            .iter()
            .map(|(id, e)| (id.clone(), e.clone()))
            .collect();
        drop(state);

        for (id, e) in &self.staged.enrollments {
            merged.insert(id.clone(), e.clone());
        }

        let mut rows: Vec<Enrollment> = merged.into_values().filter(|e| keep(e)).collect();
        rows.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(rows)
    }
}

impl RegistryTxn for MemoryTxn<'_> {
    fn course(&self, id: &CourseId) -> Result<Course, StoreError> {
        let state = self.store.state.read().expect("store poisoned");
        state
            .courses
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("course", id))
    }

    fn courses(&self, ids: &[CourseId]) -> Result<Vec<Course>, StoreError> {
        ids.iter().map(|id| self.course(id)).collect()
    }

    fn section(&self, id: &SectionId) -> Result<Section, StoreError> {
        if let Some(section) = self.staged.sections.get(id) {
            return Ok(section.clone());
        }
        let state = self.store.state.read().expect("store poisoned");
        state
            .sections
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("section", id))
    }

    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, StoreError> {
        if let Some(enrollment) = self.staged.enrollments.get(id) {
            return Ok(Some(enrollment.clone()));
        }
        let state = self.store.state.read().expect("store poisoned");
        Ok(state.enrollments.get(id).cloned())
    }

    fn enrollment_for_pair(
        &self,
        student: &UserId,
        section: &SectionId,
    ) -> Result<Option<Enrollment>, StoreError> {
        if let Some(enrollment) = self
            .staged
            .enrollments
            .values()
            .find(|e| e.student_id == *student && e.section_id == *section)
        {
            return Ok(Some(enrollment.clone()));
        }
        let state = self.store.state.read().expect("store poisoned");
        let id = state.pair_index.get(&(student.clone(), section.clone()));
        Ok(id.and_then(|id| state.enrollments.get(id)).cloned())
    }

    fn enrollments_for_student(&self, student: &UserId) -> Result<Vec<Enrollment>, StoreError> {
        self.merged_enrollments(|e| e.student_id == *student)
    }

    fn registered_enrollments_for_section(
        &self,
        section: &SectionId,
    ) -> Result<Vec<Enrollment>, StoreError> {
        self.merged_enrollments(|e| e.section_id == *section && e.is_registered())
    }

    fn components_for_section(
        &self,
        section: &SectionId,
    ) -> Result<Vec<GradeComponent>, StoreError> {
        let state = self.store.state.read().expect("store poisoned");
        let mut components: Vec<GradeComponent> = state
            .components
            .values()
            .filter(|c| c.section_id == *section)
            .cloned()
            .collect();
        components.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(components)
    }

    fn score(
        &self,
        enrollment: &EnrollmentId,
        component: &ComponentId,
    ) -> Result<Option<f64>, StoreError> {
        let key = (enrollment.clone(), component.clone());
        if let Some(score) = self.staged.grades.get(&key) {
            return Ok(Some(*score));
        }
        let state = self.store.state.read().expect("store poisoned");
        Ok(state.grades.get(&key).copied())
    }

    fn put_section(&mut self, section: Section) {
        self.staged.sections.insert(section.id.clone(), section);
    }

    fn put_enrollment(&mut self, enrollment: Enrollment) {
        self.staged
            .enrollments
            .insert(enrollment.id.clone(), enrollment);
    }

    fn put_grade(&mut self, grade: Grade) {
        self.staged
            .grades
            .insert((grade.enrollment_id, grade.component_id), grade.score);
    }
}

impl RegistryStore for MemoryStore {
    fn course(&self, id: &CourseId) -> Result<Option<Course>, StoreError> {
        let state = self.state.read().expect("store poisoned");
        Ok(state.courses.get(id).cloned())
    }

    fn section(&self, id: &SectionId) -> Result<Option<Section>, StoreError> {
        let state = self.state.read().expect("store poisoned");
        Ok(state.sections.get(id).cloned())
    }

    fn sections_for_term(&self, term: &Term) -> Result<Vec<Section>, StoreError> {
        let state = self.state.read().expect("store poisoned");
        let mut sections: Vec<Section> = state
            .sections
            .values()
            .filter(|s| s.term == *term)
            .cloned()
            .collect();
        sections.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(sections)
    }

    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, StoreError> {
        let state = self.state.read().expect("store poisoned");
        Ok(state.enrollments.get(id).cloned())
    }

    fn enrollments_for_student(&self, student: &UserId) -> Result<Vec<Enrollment>, StoreError> {
        let state = self.state.read().expect("store poisoned");
        let mut rows: Vec<Enrollment> = state
            .enrollments
            .values()
            .filter(|e| e.student_id == *student)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(rows)
    }

    fn registered_enrollments_for_section(
        &self,
        section: &SectionId,
    ) -> Result<Vec<Enrollment>, StoreError> {
        let state = self.state.read().expect("store poisoned");
        let mut rows: Vec<Enrollment> = state
            .enrollments
            .values()
            .filter(|e| e.section_id == *section && e.is_registered())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(rows)
    }

    fn components_for_section(
        &self,
        section: &SectionId,
    ) -> Result<Vec<GradeComponent>, StoreError> {
        let state = self.state.read().expect("store poisoned");
        let mut components: Vec<GradeComponent> = state
            .components
            .values()
            .filter(|c| c.section_id == *section)
            .cloned()
            .collect();
        components.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(components)
    }

    fn score(
        &self,
        enrollment: &EnrollmentId,
        component: &ComponentId,
    ) -> Result<Option<f64>, StoreError> {
        let state = self.state.read().expect("store poisoned");
        Ok(state
            .grades
            .get(&(enrollment.clone(), component.clone()))
            .copied())
    }

    fn with_section_lock<T, E, F>(
        &self,
        section_id: &SectionId,
        max_wait: Duration,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut dyn RegistryTxn) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.locks.acquire(section_id, max_wait).map_err(E::from)?;
        let _guard = SectionLockGuard {
            table: &self.locks,
            id: section_id.clone(),
        };

        let mut txn = MemoryTxn {
            store: self,
            staged: Staged::default(),
        };
        let value = body(&mut txn)?;
        self.apply(txn.staged);
        Ok(value)
    }
}
