//! Seat accounting for a section's capacity counter.
//!
//! Both operations mutate a `Section` that the caller fetched under that
//! section's exclusive lock; the check-then-increment is only safe inside
//! that scope.

use super::domain::Section;

/// Marker error: no seat was available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionFull;

/// Reserves one seat, failing if the section is at capacity.
pub fn try_reserve(section: &mut Section) -> Result<(), SectionFull> {
    if section.enrolled_count >= section.capacity {
        return Err(SectionFull);
    }
    section.enrolled_count += 1;
    Ok(())
}

/// Releases one seat. Not capacity-checked; the counter is floored at zero to
/// guard against double-release bugs.
pub fn release(section: &mut Section) {
    section.enrolled_count = section.enrolled_count.saturating_sub(1);
}

pub fn seats_remaining(section: &Section) -> u32 {
    section.capacity.saturating_sub(section.enrolled_count)
}

#[cfg(test)]
mod test {
    use super::{release, seats_remaining, try_reserve, SectionFull};
    use crate::registry::domain::{CourseId, Season, Section, SectionId, Term, UserId};
    use chrono::NaiveDate;

    fn section(capacity: u32, enrolled: u32) -> Section {
        let deadline = NaiveDate::from_ymd_opt(2026, 9, 8).expect("valid date");
        Section {
            id: SectionId("sec-1".to_string()),
            course_id: CourseId("crs-1".to_string()),
            instructor_id: UserId("inst-1".to_string()),
            term: Term::new(Season::Fall, 2026),
            capacity,
            enrolled_count: enrolled,
            schedule: "Mon 10:00-11:00".to_string(),
            add_deadline: deadline,
            drop_deadline: deadline,
        }
    }

    #[test]
    fn reserve_fails_at_capacity() {
        let mut sec = section(2, 1);
        assert_eq!(try_reserve(&mut sec), Ok(()));
        assert_eq!(sec.enrolled_count, 2);
        assert_eq!(try_reserve(&mut sec), Err(SectionFull));
        assert_eq!(sec.enrolled_count, 2);
    }

    #[test]
    fn release_floors_at_zero() {
        let mut sec = section(2, 1);
        release(&mut sec);
        assert_eq!(sec.enrolled_count, 0);
        release(&mut sec);
        assert_eq!(sec.enrolled_count, 0);
        assert_eq!(seats_remaining(&sec), 2);
    }
}
