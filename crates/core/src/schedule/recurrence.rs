//! Recurrence arithmetic shared by budget items and schedule items.

use chrono::{Datelike, Duration, Months};
use serde::{Deserialize, Serialize};

use crate::sync::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceInterval {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrenceInterval {
    fn fixed_step(self) -> Option<Duration> {
        match self {
            Self::Daily => Some(Duration::days(1)),
            Self::Weekly => Some(Duration::weeks(1)),
            Self::Monthly | Self::Yearly => None,
        }
    }

    fn month_step(self) -> u32 {
        match self {
            Self::Yearly => 12,
            _ => 1,
        }
    }
}

/// First occurrence of the series anchored at `anchor` strictly after `after`.
///
/// Calendar steps are always taken from the anchor, so a series anchored on
/// the 31st lands on the last day of shorter months and returns to the 31st
/// afterwards. `None` only when the result is out of range.
pub fn next_occurrence(
    anchor: Timestamp,
    interval: RecurrenceInterval,
    after: Timestamp,
) -> Option<Timestamp> {
    if anchor > after {
        return Some(anchor);
    }

    if let Some(step) = interval.fixed_step() {
        let step_secs = step.num_seconds();
        let elapsed = (after - anchor).num_seconds();
        let mut steps = elapsed / step_secs + 1;
        loop {
            let offset = Duration::seconds(step_secs.checked_mul(steps)?);
            let candidate = anchor.checked_add_signed(offset)?;
            if candidate > after {
                return Some(candidate);
            }
            steps += 1;
        }
    }

    let step = interval.month_step();
    let months_apart = (after.year() - anchor.year()) * 12 + after.month() as i32
        - anchor.month() as i32;
    let mut steps = (months_apart.max(0) as u32) / step;
    loop {
        let candidate = anchor.checked_add_months(Months::new(steps.checked_mul(step)?))?;
        if candidate > after {
            return Some(candidate);
        }
        steps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn future_anchor_is_its_own_next_occurrence() {
        let anchor = at(2026, 5, 1, 9);
        assert_eq!(
            next_occurrence(anchor, RecurrenceInterval::Daily, at(2026, 4, 1, 0)),
            Some(anchor)
        );
    }

    #[test]
    fn daily_and_weekly_step_strictly_past_reference() {
        let anchor = at(2026, 1, 1, 9);
        assert_eq!(
            next_occurrence(anchor, RecurrenceInterval::Daily, at(2026, 1, 10, 9)),
            Some(at(2026, 1, 11, 9))
        );
        assert_eq!(
            next_occurrence(anchor, RecurrenceInterval::Daily, at(2026, 1, 10, 8)),
            Some(at(2026, 1, 10, 9))
        );
        assert_eq!(
            next_occurrence(anchor, RecurrenceInterval::Weekly, at(2026, 1, 9, 0)),
            Some(at(2026, 1, 15, 9))
        );
    }

    #[test]
    fn monthly_clamps_to_month_end_from_anchor() {
        let anchor = at(2026, 1, 31, 9);
        assert_eq!(
            next_occurrence(anchor, RecurrenceInterval::Monthly, at(2026, 2, 1, 0)),
            Some(at(2026, 2, 28, 9))
        );
        assert_eq!(
            next_occurrence(anchor, RecurrenceInterval::Monthly, at(2026, 3, 1, 0)),
            Some(at(2026, 3, 31, 9))
        );
    }

    #[test]
    fn yearly_handles_leap_day() {
        let anchor = at(2024, 2, 29, 9);
        assert_eq!(
            next_occurrence(anchor, RecurrenceInterval::Yearly, at(2024, 3, 1, 0)),
            Some(at(2025, 2, 28, 9))
        );
        assert_eq!(
            next_occurrence(anchor, RecurrenceInterval::Yearly, at(2027, 6, 1, 0)),
            Some(at(2028, 2, 29, 9))
        );
    }
}
