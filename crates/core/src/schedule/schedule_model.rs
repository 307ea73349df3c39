use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::{RecurrenceInterval, ReminderPlan};
use crate::sync::{TableName, Timestamp};

/// Number of items returned by [`upcoming`] when the caller does not choose.
pub const DEFAULT_UPCOMING_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Prayer,
    Work,
    Personal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub updated_at: Timestamp,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Weekdays a recurring item occurs on.
    #[serde(with = "weekday_names", default)]
    pub days: Vec<Weekday>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub recurrence: Option<RecurrenceInterval>,
    /// Minutes before `start_time` at which to remind.
    pub reminder_minutes: Option<u32>,
    pub is_enabled: bool,
}

crate::impl_sync_record!(ScheduleItem, TableName::ScheduleItems);

impl ScheduleItem {
    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Whether the item takes place on `date`.
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        if self.is_recurring() {
            self.days.contains(&date.weekday())
        } else {
            self.start_time.date_naive() == date
        }
    }

    /// Reminder for the item, if it is enabled and the reminder is still ahead.
    pub fn reminder_plan(&self, now: Timestamp) -> Option<ReminderPlan> {
        let minutes = self.reminder_minutes.filter(|m| *m > 0)?;
        if !self.is_enabled {
            return None;
        }
        let fire_at = self.start_time - Duration::minutes(i64::from(minutes));
        (fire_at > now).then(|| ReminderPlan {
            source_id: self.id.clone(),
            title: self.title.clone(),
            body: format!("Reminder: {} starts in {} minutes", self.title, minutes),
            fire_at,
        })
    }
}

/// Fields of a new schedule item. New items start enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScheduleItem {
    pub title: String,
    pub kind: ScheduleKind,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    #[serde(with = "weekday_names", default)]
    pub days: Vec<Weekday>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub recurrence: Option<RecurrenceInterval>,
    pub reminder_minutes: Option<u32>,
}

/// Enabled items taking place on `date`, in list order.
pub fn items_for_day(items: &[ScheduleItem], date: NaiveDate) -> Vec<ScheduleItem> {
    items
        .iter()
        .filter(|item| item.is_enabled && item.occurs_on(date))
        .cloned()
        .collect()
}

/// Up to `limit` enabled items starting after `now`, soonest first.
pub fn upcoming(items: &[ScheduleItem], now: Timestamp, limit: usize) -> Vec<ScheduleItem> {
    let mut upcoming: Vec<ScheduleItem> = items
        .iter()
        .filter(|item| item.is_enabled && item.start_time > now)
        .cloned()
        .collect();
    upcoming.sort_by_key(|item| item.start_time);
    upcoming.truncate(limit);
    upcoming
}

/// Weekdays as lowercase English names (`"monday"`).
mod weekday_names {
    use chrono::Weekday;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    fn name(day: &Weekday) -> &'static str {
        match day {
            Weekday::Mon => "monday",
            Weekday::Tue => "tuesday",
            Weekday::Wed => "wednesday",
            Weekday::Thu => "thursday",
            Weekday::Fri => "friday",
            Weekday::Sat => "saturday",
            Weekday::Sun => "sunday",
        }
    }

    pub fn serialize<S: Serializer>(days: &[Weekday], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(days.iter().map(name))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Weekday>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|raw| {
                raw.parse::<Weekday>()
                    .map_err(|_| D::Error::custom(format!("unknown weekday '{}'", raw)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(d: u32, h: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, d, h, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn item(id: &str, start: Timestamp) -> ScheduleItem {
        ScheduleItem {
            id: id.to_string(),
            owner_id: "u1".to_string(),
            updated_at: start,
            title: format!("Item {}", id),
            kind: ScheduleKind::Work,
            start_time: start,
            end_time: start + Duration::hours(1),
            days: Vec::new(),
            location: None,
            description: None,
            recurrence: None,
            reminder_minutes: None,
            is_enabled: true,
        }
    }

    #[test]
    fn days_serialize_as_lowercase_names() {
        let mut prayer = item("p", at(2, 5));
        prayer.kind = ScheduleKind::Prayer;
        prayer.days = vec![Weekday::Fri, Weekday::Mon];

        let json = serde_json::to_value(&prayer).expect("json");
        assert_eq!(json["days"], serde_json::json!(["friday", "monday"]));
        assert_eq!(json["type"], "prayer");
        assert_eq!(json["user_id"], "u1");

        let back: ScheduleItem = serde_json::from_value(json).expect("decode");
        assert_eq!(back, prayer);
    }

    #[test]
    fn unknown_weekday_is_rejected() {
        let mut json = serde_json::to_value(item("x", at(2, 5))).expect("json");
        json["days"] = serde_json::json!(["someday"]);
        assert!(serde_json::from_value::<ScheduleItem>(json).is_err());
    }

    #[test]
    fn day_view_matches_weekdays_and_dates() {
        // 2026-03-02 is a Monday.
        let mut weekly = item("weekly", at(2, 8));
        weekly.recurrence = Some(RecurrenceInterval::Weekly);
        weekly.days = vec![Weekday::Wed];
        let once = item("once", at(4, 10));
        let mut disabled = item("disabled", at(4, 11));
        disabled.is_enabled = false;
        let items = vec![weekly, once, disabled];

        let wednesday = NaiveDate::from_ymd_opt(2026, 3, 4).expect("date");
        let ids = items_for_day(&items, wednesday)
            .into_iter()
            .map(|i| i.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["weekly", "once"]);

        let thursday = NaiveDate::from_ymd_opt(2026, 3, 5).expect("date");
        assert!(items_for_day(&items, thursday).is_empty());
    }

    #[test]
    fn upcoming_sorts_and_limits() {
        let items = vec![
            item("late", at(9, 9)),
            item("past", at(1, 9)),
            item("soon", at(3, 9)),
            item("mid", at(5, 9)),
        ];
        let ids = upcoming(&items, at(2, 0), 2)
            .into_iter()
            .map(|i| i.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["soon", "mid"]);
    }

    #[test]
    fn reminder_fires_before_start_only_when_ahead() {
        let mut meeting = item("m", at(10, 9));
        assert!(meeting.reminder_plan(at(1, 0)).is_none());

        meeting.reminder_minutes = Some(15);
        let plan = meeting.reminder_plan(at(1, 0)).expect("plan");
        assert_eq!(plan.fire_at, at(10, 9) - Duration::minutes(15));
        assert_eq!(plan.body, "Reminder: Item m starts in 15 minutes");

        assert!(meeting.reminder_plan(at(10, 9)).is_none());
        meeting.is_enabled = false;
        assert!(meeting.reminder_plan(at(1, 0)).is_none());
    }
}
