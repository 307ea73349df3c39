//! Reminder planning. Delivery belongs to the host application.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::sync::Timestamp;

/// A notification the host should fire at `fire_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPlan {
    /// Id of the record that produced the reminder.
    pub source_id: String,
    pub title: String,
    pub body: String,
    pub fire_at: Timestamp,
}

/// Receives reminder plans produced by the budget and schedule services.
#[async_trait]
pub trait ReminderSink: Send + Sync {
    async fn schedule(&self, plan: ReminderPlan) -> Result<()>;
}

/// Drops every plan.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpReminderSink;

#[async_trait]
impl ReminderSink for NoOpReminderSink {
    async fn schedule(&self, _plan: ReminderPlan) -> Result<()> {
        Ok(())
    }
}

/// Keeps plans in memory, for hosts that poll instead of being called back.
#[derive(Debug, Default)]
pub struct MemoryReminderSink {
    plans: Mutex<Vec<ReminderPlan>>,
}

impl MemoryReminderSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plans(&self) -> Vec<ReminderPlan> {
        self.plans
            .lock()
            .map(|plans| plans.clone())
            .unwrap_or_default()
    }

    /// Removes and returns every plan due at `now`.
    pub fn take_due(&self, now: Timestamp) -> Vec<ReminderPlan> {
        let Ok(mut plans) = self.plans.lock() else {
            return Vec::new();
        };
        let (due, later): (Vec<_>, Vec<_>) =
            plans.drain(..).partition(|plan| plan.fire_at <= now);
        *plans = later;
        due
    }
}

#[async_trait]
impl ReminderSink for MemoryReminderSink {
    async fn schedule(&self, plan: ReminderPlan) -> Result<()> {
        let mut plans = self
            .plans
            .lock()
            .map_err(|_| Error::storage("reminder sink lock poisoned"))?;
        plans.retain(|existing| existing.source_id != plan.source_id);
        plans.push(plan);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_support::ts;

    fn plan(source_id: &str, secs: i64) -> ReminderPlan {
        ReminderPlan {
            source_id: source_id.to_string(),
            title: "Title".to_string(),
            body: "Body".to_string(),
            fire_at: ts(secs),
        }
    }

    #[tokio::test]
    async fn memory_sink_replaces_plans_per_source() {
        let sink = MemoryReminderSink::new();
        sink.schedule(plan("a", 10)).await.expect("schedule");
        sink.schedule(plan("a", 20)).await.expect("reschedule");
        sink.schedule(plan("b", 30)).await.expect("schedule");

        let plans = sink.plans();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].fire_at, ts(20));
    }

    #[tokio::test]
    async fn take_due_splits_by_fire_time() {
        let sink = MemoryReminderSink::new();
        sink.schedule(plan("a", 10)).await.expect("schedule");
        sink.schedule(plan("b", 30)).await.expect("schedule");

        let due = sink.take_due(ts(15));
        assert_eq!(due, vec![plan("a", 10)]);
        assert_eq!(sink.plans(), vec![plan("b", 30)]);
    }
}
