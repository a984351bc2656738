//! Parsing and overlap testing for human-entered day/time strings.
//!
//! Strings look like `"Mon/Wed 10:00-11:30"` or `"Fri 09:00"` (a bare start
//! time defaults to a 60 minute slot). Parsing is deliberately forgiving:
//! malformed input yields `None` and callers treat it as "no conflict",
//! favoring availability over strict rejection.

use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

/// Days of the week a slot occupies, packed as a bitset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct DaySet(u8);

impl DaySet {
    pub const MONDAY: Self = DaySet(1 << 0);
    pub const TUESDAY: Self = DaySet(1 << 1);
    pub const WEDNESDAY: Self = DaySet(1 << 2);
    pub const THURSDAY: Self = DaySet(1 << 3);
    pub const FRIDAY: Self = DaySet(1 << 4);
    pub const SATURDAY: Self = DaySet(1 << 5);
    pub const SUNDAY: Self = DaySet(1 << 6);
    pub const NONE: Self = DaySet(0);

    const TOKENS: [(Self, &'static str); 7] = [
        (Self::MONDAY, "mon"),
        (Self::TUESDAY, "tue"),
        (Self::WEDNESDAY, "wed"),
        (Self::THURSDAY, "thu"),
        (Self::FRIDAY, "fri"),
        (Self::SATURDAY, "sat"),
        (Self::SUNDAY, "sun"),
    ];

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, day: Self) -> bool {
        (self & day) == day
    }

    pub fn intersects(self, other: Self) -> bool {
        !(self & other).is_empty()
    }
}

impl BitOr for DaySet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        DaySet(self.0 | rhs.0)
    }
}

impl BitOrAssign for DaySet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for DaySet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        DaySet(self.0 & rhs.0)
    }
}

impl FromStr for DaySet {
    type Err = ();

    /// Parses `/`-separated day tokens (`Mon/Wed`). Tokens are matched on
    /// their first three letters, case-insensitively; an unknown token fails
    /// the whole set.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut result = Self::NONE;

        for token in value.split('/') {
            let token = token.trim().to_ascii_lowercase();
            // starts_with stays on char boundaries, so non-ASCII tokens fall
            // through to Err instead of panicking on a byte slice.
            let day = Self::TOKENS
                .iter()
                .find(|(_, name)| token.starts_with(*name))
                .map(|(day, _)| *day)
                .ok_or(())?;
            result |= day;
        }

        if result.is_empty() {
            Err(())
        } else {
            Ok(result)
        }
    }
}

const MINUTES_PER_DAY: u16 = 24 * 60;
const DEFAULT_SLOT_MINUTES: u16 = 60;

/// One weekly timetable slot: a day set plus a half-open minute-of-day
/// interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub days: DaySet,
    pub start_minute: u16,
    pub end_minute: u16,
}

impl TimeSlot {
    /// Parses a day/time string, returning `None` for anything malformed.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        let days = DaySet::from_str(parts.next()?).ok()?;
        let time = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let (start_minute, end_minute) = match time.split_once('-') {
            Some((start, end)) => (parse_minute(start)?, parse_minute(end)?),
            None => {
                let start = parse_minute(time)?;
                (start, (start + DEFAULT_SLOT_MINUTES).min(MINUTES_PER_DAY))
            }
        };

        if start_minute >= end_minute {
            return None;
        }

        Some(TimeSlot {
            days,
            start_minute,
            end_minute,
        })
    }

    /// Two slots conflict iff they share at least one day and their minute
    /// intervals overlap.
    pub fn conflicts_with(&self, other: &TimeSlot) -> bool {
        self.days.intersects(other.days)
            && self.start_minute < other.end_minute
            && other.start_minute < self.end_minute
    }
}

fn parse_minute(raw: &str) -> Option<u16> {
    let (hours, minutes) = raw.split_once(':')?;
    let hours: u16 = hours.parse().ok()?;
    let minutes: u16 = minutes.parse().ok()?;
    if hours >= 24 || minutes >= 60 {
        return None;
    }
    Some(hours * 60 + minutes)
}

#[cfg(test)]
mod test {
    use super::{DaySet, TimeSlot};
    use std::str::FromStr;

    #[test]
    fn day_tokens_parse_case_insensitively() {
        let days = DaySet::from_str("Mon/wed/FRI").expect("valid days");
        assert!(days.contains(DaySet::MONDAY));
        assert!(days.contains(DaySet::WEDNESDAY));
        assert!(days.contains(DaySet::FRIDAY));
        assert!(!days.contains(DaySet::TUESDAY));
        assert!(DaySet::from_str("Mon/Xyz").is_err());
    }

    #[test]
    fn slot_parses_range_and_bare_start() {
        let slot = TimeSlot::parse("Mon/Wed 10:00-11:30").expect("range slot");
        assert_eq!(slot.start_minute, 600);
        assert_eq!(slot.end_minute, 690);

        let bare = TimeSlot::parse("Fri 09:00").expect("bare start slot");
        assert_eq!(bare.start_minute, 540);
        assert_eq!(bare.end_minute, 600);
    }

    #[test]
    fn malformed_strings_yield_none() {
        assert!(TimeSlot::parse("").is_none());
        assert!(TimeSlot::parse("TBA").is_none());
        assert!(TimeSlot::parse("Mon").is_none());
        assert!(TimeSlot::parse("Mon 25:00-26:00").is_none());
        assert!(TimeSlot::parse("Mon 11:00-10:00").is_none());
        assert!(TimeSlot::parse("Mon 10:00-11:00 extra").is_none());
        // multi-byte characters must degrade to None, never panic
        assert!(TimeSlot::parse("aaé 10:00-11:00").is_none());
        assert!(TimeSlot::parse("月曜 10:00-11:00").is_none());
        assert!(DaySet::from_str("Mé/Wed").is_err());
    }

    #[test]
    fn overlap_requires_shared_day_and_time() {
        let mw = TimeSlot::parse("Mon/Wed 10:00-11:30").expect("valid");
        let mon_late = TimeSlot::parse("Mon 11:00-12:00").expect("valid");
        let tue = TimeSlot::parse("Tue 10:00-11:30").expect("valid");
        let mon_after = TimeSlot::parse("Mon 11:30-12:30").expect("valid");

        assert!(mw.conflicts_with(&mon_late));
        assert!(mon_late.conflicts_with(&mw));
        assert!(!mw.conflicts_with(&tue));
        // [start, end): back-to-back slots do not conflict
        assert!(!mw.conflicts_with(&mon_after));
    }
}
