use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use log::warn;
use uuid::Uuid;

use super::{
    items_for_day, upcoming, NewScheduleItem, NoOpReminderSink, ReminderSink, ScheduleItem,
};
use crate::context::SharedSession;
use crate::errors::{Error, Result};
use crate::storage::StorageHandle;
use crate::sync::SyncOrchestrator;

pub struct ScheduleService {
    items: StorageHandle<ScheduleItem>,
    reminders: Arc<dyn ReminderSink>,
}

impl ScheduleService {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, session: SharedSession) -> Self {
        Self {
            items: StorageHandle::new(orchestrator, session),
            reminders: Arc::new(NoOpReminderSink),
        }
    }

    pub fn with_reminder_sink(mut self, reminders: Arc<dyn ReminderSink>) -> Self {
        self.reminders = reminders;
        self
    }

    pub async fn refresh(&self) -> Result<Vec<ScheduleItem>> {
        self.items.refresh_data().await
    }

    pub async fn items(&self) -> Vec<ScheduleItem> {
        self.items.data().await
    }

    pub async fn is_loading(&self) -> bool {
        self.items.is_loading().await
    }

    pub async fn add_item(&self, new_item: NewScheduleItem) -> Result<ScheduleItem> {
        validate(&new_item)?;
        let item = ScheduleItem {
            id: Uuid::new_v4().to_string(),
            owner_id: String::new(),
            updated_at: Utc::now(),
            title: new_item.title,
            kind: new_item.kind,
            start_time: new_item.start_time,
            end_time: new_item.end_time,
            days: new_item.days,
            location: new_item.location,
            description: new_item.description,
            recurrence: new_item.recurrence,
            reminder_minutes: new_item.reminder_minutes,
            is_enabled: true,
        };
        let saved = self.items.save_data(item).await?;
        self.plan_reminder(&saved).await;
        Ok(saved)
    }

    /// Replaces an existing item.
    pub async fn update_item(&self, item: ScheduleItem) -> Result<ScheduleItem> {
        if self.items.get(&item.id).await.is_none() {
            return Err(Error::not_found(format!("Schedule item '{}'", item.id)));
        }
        if item.title.trim().is_empty() {
            return Err(Error::validation("Schedule item title must not be empty"));
        }
        let saved = self.items.save_data(item).await?;
        self.plan_reminder(&saved).await;
        Ok(saved)
    }

    pub async fn delete_item(&self, id: &str) -> Result<bool> {
        self.items.remove(id).await
    }

    /// Flips `is_enabled`. Returns the updated item.
    pub async fn toggle_item(&self, id: &str) -> Result<ScheduleItem> {
        let mut item = self
            .items
            .get(id)
            .await
            .ok_or_else(|| Error::not_found(format!("Schedule item '{}'", id)))?;
        item.is_enabled = !item.is_enabled;
        self.update_item(item).await
    }

    pub async fn for_day(&self, date: NaiveDate) -> Vec<ScheduleItem> {
        items_for_day(&self.items.data().await, date)
    }

    pub async fn upcoming(&self, limit: usize) -> Vec<ScheduleItem> {
        upcoming(&self.items.data().await, Utc::now(), limit)
    }

    pub(crate) async fn clear(&self) {
        self.items.clear().await;
    }

    async fn plan_reminder(&self, item: &ScheduleItem) {
        let Some(plan) = item.reminder_plan(Utc::now()) else {
            return;
        };
        if let Err(err) = self.reminders.schedule(plan).await {
            warn!("[Schedule] Failed to plan reminder for {}: {}", item.id, err);
        }
    }
}

fn validate(item: &NewScheduleItem) -> Result<()> {
    if item.title.trim().is_empty() {
        return Err(Error::validation("Schedule item title must not be empty"));
    }
    if item.end_time < item.start_time {
        return Err(Error::validation("Schedule item ends before it starts"));
    }
    Ok(())
}
