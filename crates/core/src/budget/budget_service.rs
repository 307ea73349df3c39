use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::budget_model::validate_item;
use super::{
    category_breakdown, BudgetCategory, BudgetExport, BudgetGoal, BudgetItem, BudgetSummary,
    CategoryTotal, NewBudgetCategory, NewBudgetGoal, NewBudgetItem,
};
use crate::context::SharedSession;
use crate::errors::{Error, Result};
use crate::schedule::{NoOpReminderSink, ReminderSink};
use crate::storage::StorageHandle;
use crate::sync::{SyncOrchestrator, SyncRecord};

/// Budget items, categories and savings goals of the signed-in user.
///
/// Every write goes through the sync orchestrator, so it lands in the local
/// cache first and reaches the remote store when connectivity allows.
pub struct BudgetService {
    items: StorageHandle<BudgetItem>,
    categories: StorageHandle<BudgetCategory>,
    goals: StorageHandle<BudgetGoal>,
    reminders: Arc<dyn ReminderSink>,
}

impl BudgetService {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, session: SharedSession) -> Self {
        Self {
            items: StorageHandle::new(Arc::clone(&orchestrator), Arc::clone(&session)),
            categories: StorageHandle::new(Arc::clone(&orchestrator), Arc::clone(&session)),
            goals: StorageHandle::new(orchestrator, session),
            reminders: Arc::new(NoOpReminderSink),
        }
    }

    /// Sets the sink receiving reminders for recurring items.
    pub fn with_reminder_sink(mut self, reminders: Arc<dyn ReminderSink>) -> Self {
        self.reminders = reminders;
        self
    }

    /// Syncs the three budget tables.
    pub async fn refresh(&self) -> Result<()> {
        self.items.refresh_data().await?;
        self.categories.refresh_data().await?;
        self.goals.refresh_data().await?;
        Ok(())
    }

    pub async fn is_loading(&self) -> bool {
        self.items.is_loading().await
            || self.categories.is_loading().await
            || self.goals.is_loading().await
    }

    pub async fn items(&self) -> Vec<BudgetItem> {
        self.items.data().await
    }

    pub async fn categories(&self) -> Vec<BudgetCategory> {
        self.categories.data().await
    }

    pub async fn goals(&self) -> Vec<BudgetGoal> {
        self.goals.data().await
    }

    pub async fn add_item(&self, new_item: NewBudgetItem) -> Result<BudgetItem> {
        new_item.validate()?;
        let item = BudgetItem {
            id: Uuid::new_v4().to_string(),
            owner_id: String::new(),
            updated_at: Utc::now(),
            category: new_item.category,
            amount: new_item.amount,
            kind: new_item.kind,
            date: new_item.date,
            description: new_item.description,
            recurrence: new_item.recurrence,
        };
        let saved = self.items.save_data(item).await?;
        self.plan_reminder(&saved).await;
        Ok(saved)
    }

    pub async fn update_item(&self, item: BudgetItem) -> Result<BudgetItem> {
        validate_item(&item.category, item.amount)?;
        require(&self.items, &item.id, "Budget item").await?;
        self.items.save_data(item).await
    }

    pub async fn delete_item(&self, id: &str) -> Result<bool> {
        self.items.remove(id).await
    }

    pub async fn add_category(&self, new_category: NewBudgetCategory) -> Result<BudgetCategory> {
        if new_category.name.trim().is_empty() {
            return Err(Error::validation("Category name must not be empty"));
        }
        let category = BudgetCategory {
            id: Uuid::new_v4().to_string(),
            owner_id: String::new(),
            updated_at: Utc::now(),
            name: new_category.name,
            color: new_category.color,
            icon: new_category.icon,
        };
        self.categories.save_data(category).await
    }

    pub async fn update_category(&self, category: BudgetCategory) -> Result<BudgetCategory> {
        if category.name.trim().is_empty() {
            return Err(Error::validation("Category name must not be empty"));
        }
        require(&self.categories, &category.id, "Category").await?;
        self.categories.save_data(category).await
    }

    /// Deletes a category. Items filed under it keep their category name.
    pub async fn delete_category(&self, id: &str) -> Result<bool> {
        self.categories.remove(id).await
    }

    pub async fn add_goal(&self, new_goal: NewBudgetGoal) -> Result<BudgetGoal> {
        new_goal.validate()?;
        let mut goal = BudgetGoal {
            id: Uuid::new_v4().to_string(),
            owner_id: String::new(),
            updated_at: Utc::now(),
            name: new_goal.name,
            target_amount: new_goal.target_amount,
            current_amount: Decimal::ZERO,
            deadline: new_goal.deadline,
            category: new_goal.category,
        };
        goal.contribute(new_goal.current_amount);
        self.goals.save_data(goal).await
    }

    pub async fn update_goal(&self, goal: BudgetGoal) -> Result<BudgetGoal> {
        if goal.target_amount <= Decimal::ZERO {
            return Err(Error::validation("Goal target must be positive"));
        }
        require(&self.goals, &goal.id, "Goal").await?;
        self.goals.save_data(goal).await
    }

    pub async fn delete_goal(&self, id: &str) -> Result<bool> {
        self.goals.remove(id).await
    }

    /// Adds `amount` to a goal's saved total, capped at its target.
    pub async fn update_goal_progress(&self, id: &str, amount: Decimal) -> Result<BudgetGoal> {
        let mut goal = require(&self.goals, id, "Goal").await?;
        goal.contribute(amount);
        debug!(
            "[Budget] Goal {} progress {}/{}",
            goal.id, goal.current_amount, goal.target_amount
        );
        self.goals.save_data(goal).await
    }

    pub async fn summary(&self) -> BudgetSummary {
        BudgetSummary::from_items(&self.items.data().await)
    }

    pub async fn category_breakdown(&self) -> Vec<CategoryTotal> {
        category_breakdown(&self.items.data().await)
    }

    pub async fn export(&self) -> Result<String> {
        BudgetExport {
            budget_items: self.items.data().await,
            categories: self.categories.data().await,
            goals: self.goals.data().await,
        }
        .to_json()
    }

    /// Saves every record of an export as the current user.
    ///
    /// Records are upserted by id; existing records missing from the export
    /// are kept. Returns the number of imported records.
    pub async fn import(&self, raw: &str) -> Result<usize> {
        let export = BudgetExport::from_json(raw)?;
        for item in &export.budget_items {
            validate_item(&item.category, item.amount)?;
        }

        let total = export.len();
        for category in export.categories {
            self.categories.save_data(category).await?;
        }
        for goal in export.goals {
            self.goals.save_data(goal).await?;
        }
        for item in export.budget_items {
            let saved = self.items.save_data(item).await?;
            self.plan_reminder(&saved).await;
        }
        debug!("[Budget] Imported {} records", total);
        Ok(total)
    }

    pub(crate) async fn clear(&self) {
        self.items.clear().await;
        self.categories.clear().await;
        self.goals.clear().await;
    }

    async fn plan_reminder(&self, item: &BudgetItem) {
        let Some(plan) = item.reminder_plan(Utc::now()) else {
            return;
        };
        if let Err(err) = self.reminders.schedule(plan).await {
            warn!("[Budget] Failed to plan reminder for {}: {}", item.id, err);
        }
    }
}

async fn require<T: SyncRecord>(handle: &StorageHandle<T>, id: &str, label: &str) -> Result<T> {
    handle
        .get(id)
        .await
        .ok_or_else(|| Error::not_found(format!("{} '{}'", label, id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetItemKind;
    use crate::config::SyncSettings;
    use crate::context::UserSession;
    use crate::schedule::{MemoryReminderSink, RecurrenceInterval};
    use crate::storage::MemoryStore;
    use crate::sync::{MemoryRemoteStore, TableName};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tokio::sync::RwLock;

    struct Fixture {
        remote: Arc<MemoryRemoteStore>,
        reminders: Arc<MemoryReminderSink>,
        service: BudgetService,
    }

    fn fixture() -> Fixture {
        let remote = Arc::new(MemoryRemoteStore::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(MemoryStore::new()),
            remote.clone(),
            &SyncSettings::default(),
        ));
        let session: SharedSession = Arc::new(RwLock::new(Some(UserSession::signed_in(
            "user-1",
            Some("user@example.test".to_string()),
        ))));
        let reminders = Arc::new(MemoryReminderSink::new());
        let service = BudgetService::new(orchestrator, session).with_reminder_sink(reminders.clone());
        Fixture {
            remote,
            reminders,
            service,
        }
    }

    fn new_item(kind: BudgetItemKind, category: &str, amount: Decimal) -> NewBudgetItem {
        NewBudgetItem {
            category: category.to_string(),
            amount,
            kind,
            date: NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"),
            description: None,
            recurrence: None,
        }
    }

    fn new_goal(target: Decimal) -> NewBudgetGoal {
        NewBudgetGoal {
            name: "Emergency fund".to_string(),
            target_amount: target,
            current_amount: Decimal::ZERO,
            deadline: NaiveDate::from_ymd_opt(2027, 1, 1).expect("date"),
            category: "Savings".to_string(),
        }
    }

    #[tokio::test]
    async fn items_drive_summary_and_reach_remote() {
        let f = fixture();
        f.service
            .add_item(new_item(BudgetItemKind::Income, "Salary", dec!(15000)))
            .await
            .expect("income");
        let rent = f
            .service
            .add_item(new_item(BudgetItemKind::Expense, "Rent", dec!(5000)))
            .await
            .expect("expense");

        let summary = f.service.summary().await;
        assert_eq!(summary.balance, dec!(10000));
        assert!(f.remote.contains(TableName::BudgetItems, &rent.id));
        assert_eq!(rent.owner_id, "user-1");
        assert!(f.reminders.plans().is_empty());

        assert!(f.service.delete_item(&rent.id).await.expect("delete"));
        assert_eq!(f.service.summary().await.total_expenses, Decimal::ZERO);
    }

    #[tokio::test]
    async fn recurring_item_schedules_reminder() {
        let f = fixture();
        let mut salary = new_item(BudgetItemKind::Income, "Salary", dec!(15000));
        salary.recurrence = Some(RecurrenceInterval::Monthly);

        let saved = f.service.add_item(salary).await.expect("add");

        let plans = f.reminders.plans();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].source_id, saved.id);
        assert_eq!(plans[0].title, "Income Reminder");
        assert!(plans[0].fire_at > Utc::now());
    }

    #[tokio::test]
    async fn invalid_items_are_rejected() {
        let f = fixture();
        let result = f
            .service
            .add_item(new_item(BudgetItemKind::Expense, "Food", dec!(-3)))
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(f.service.items().await.is_empty());
    }

    #[tokio::test]
    async fn goal_progress_caps_at_target() {
        let f = fixture();
        let goal = f.service.add_goal(new_goal(dec!(500))).await.expect("goal");

        let goal = f
            .service
            .update_goal_progress(&goal.id, dec!(200))
            .await
            .expect("progress");
        assert_eq!(goal.current_amount, dec!(200));

        let goal = f
            .service
            .update_goal_progress(&goal.id, dec!(900))
            .await
            .expect("progress");
        assert_eq!(goal.current_amount, dec!(500));
        assert!(matches!(
            f.service.update_goal_progress("missing", dec!(1)).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn categories_can_be_added_updated_and_deleted() {
        let f = fixture();
        let mut category = f
            .service
            .add_category(NewBudgetCategory {
                name: "Groceries".to_string(),
                color: "#4caf50".to_string(),
                icon: "cart".to_string(),
            })
            .await
            .expect("category");

        category.color = "#2196f3".to_string();
        let updated = f
            .service
            .update_category(category.clone())
            .await
            .expect("update");
        assert_eq!(updated.color, "#2196f3");
        assert_eq!(f.service.categories().await.len(), 1);

        assert!(f
            .service
            .delete_category(&category.id)
            .await
            .expect("delete"));
        assert!(f.service.categories().await.is_empty());
    }

    #[tokio::test]
    async fn export_then_import_into_another_account() {
        let source = fixture();
        source
            .service
            .add_item(new_item(BudgetItemKind::Expense, "Fuel", dec!(320)))
            .await
            .expect("item");
        source
            .service
            .add_goal(new_goal(dec!(1000)))
            .await
            .expect("goal");
        let exported = source.service.export().await.expect("export");

        let target = fixture();
        let imported = target.service.import(&exported).await.expect("import");

        assert_eq!(imported, 2);
        assert_eq!(target.service.items().await.len(), 1);
        assert_eq!(target.service.goals().await.len(), 1);
        assert!(matches!(
            target.service.import("{broken").await,
            Err(Error::Validation(_))
        ));
    }
}
