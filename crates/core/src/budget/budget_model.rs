use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::schedule::{next_occurrence, RecurrenceInterval, ReminderPlan};
use crate::sync::{TableName, Timestamp};

/// Hour of day (UTC) at which budget reminders fire.
const REMINDER_HOUR: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetItemKind {
    Income,
    Expense,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetItem {
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub updated_at: Timestamp,
    pub category: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: BudgetItemKind,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub recurrence: Option<RecurrenceInterval>,
}

crate::impl_sync_record!(BudgetItem, TableName::BudgetItems);

impl BudgetItem {
    /// Next reminder for a recurring item, `None` for one-off items.
    pub fn reminder_plan(&self, now: Timestamp) -> Option<ReminderPlan> {
        let interval = self.recurrence?;
        let anchor = self
            .date
            .and_time(NaiveTime::from_hms_opt(REMINDER_HOUR, 0, 0)?)
            .and_utc();
        let fire_at = next_occurrence(anchor, interval, now)?;
        let title = match self.kind {
            BudgetItemKind::Income => "Income Reminder",
            BudgetItemKind::Expense => "Expense Reminder",
        };
        Some(ReminderPlan {
            source_id: self.id.clone(),
            title: title.to_string(),
            body: format!("{}: {}", self.category, self.amount),
            fire_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBudgetItem {
    pub category: String,
    pub amount: Decimal,
    pub kind: BudgetItemKind,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub recurrence: Option<RecurrenceInterval>,
}

impl NewBudgetItem {
    pub fn validate(&self) -> Result<()> {
        validate_item(&self.category, self.amount)
    }
}

pub(crate) fn validate_item(category: &str, amount: Decimal) -> Result<()> {
    if category.trim().is_empty() {
        return Err(Error::validation("Budget item category must not be empty"));
    }
    if amount <= Decimal::ZERO {
        return Err(Error::validation("Budget item amount must be positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCategory {
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub updated_at: Timestamp,
    pub name: String,
    pub color: String,
    pub icon: String,
}

crate::impl_sync_record!(BudgetCategory, TableName::BudgetCategories);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBudgetCategory {
    pub name: String,
    pub color: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetGoal {
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub updated_at: Timestamp,
    pub name: String,
    pub target_amount: Decimal,
    pub current_amount: Decimal,
    pub deadline: NaiveDate,
    pub category: String,
}

crate::impl_sync_record!(BudgetGoal, TableName::BudgetGoals);

impl BudgetGoal {
    /// Adds `amount` to the saved total, clamped to `[0, target_amount]`.
    pub fn contribute(&mut self, amount: Decimal) {
        self.current_amount = (self.current_amount + amount)
            .min(self.target_amount)
            .max(Decimal::ZERO);
    }

    pub fn is_achieved(&self) -> bool {
        self.current_amount >= self.target_amount
    }

    /// Progress in percent, rounded to two decimals.
    pub fn progress_percent(&self) -> Decimal {
        if self.target_amount.is_zero() {
            return Decimal::ZERO;
        }
        (self.current_amount / self.target_amount * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBudgetGoal {
    pub name: String,
    pub target_amount: Decimal,
    #[serde(default)]
    pub current_amount: Decimal,
    pub deadline: NaiveDate,
    pub category: String,
}

impl NewBudgetGoal {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Goal name must not be empty"));
        }
        if self.target_amount <= Decimal::ZERO {
            return Err(Error::validation("Goal target must be positive"));
        }
        if self.current_amount < Decimal::ZERO {
            return Err(Error::validation("Goal progress must not be negative"));
        }
        Ok(())
    }
}

/// Income, expenses and their difference over a set of items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSummary {
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub balance: Decimal,
}

impl BudgetSummary {
    pub fn from_items(items: &[BudgetItem]) -> Self {
        let (total_income, total_expenses) =
            items
                .iter()
                .fold((Decimal::ZERO, Decimal::ZERO), |(income, expenses), item| {
                    match item.kind {
                        BudgetItemKind::Income => (income + item.amount, expenses),
                        BudgetItemKind::Expense => (income, expenses + item.amount),
                    }
                });
        Self {
            total_income,
            total_expenses,
            balance: total_income - total_expenses,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub category: String,
    pub total: Decimal,
}

/// Expense totals per category, largest first, ties by name.
pub fn category_breakdown(items: &[BudgetItem]) -> Vec<CategoryTotal> {
    let mut totals: Vec<CategoryTotal> = Vec::new();
    for item in items.iter().filter(|i| i.kind == BudgetItemKind::Expense) {
        match totals.iter_mut().find(|t| t.category == item.category) {
            Some(total) => total.total += item.amount,
            None => totals.push(CategoryTotal {
                category: item.category.clone(),
                total: item.amount,
            }),
        }
    }
    totals.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.category.cmp(&b.category)));
    totals
}

/// Portable snapshot of a user's budget data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetExport {
    #[serde(default)]
    pub budget_items: Vec<BudgetItem>,
    #[serde(default)]
    pub categories: Vec<BudgetCategory>,
    #[serde(default)]
    pub goals: Vec<BudgetGoal>,
}

impl BudgetExport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an export. Missing collections are empty.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| Error::validation(format!("Invalid budget export: {}", err)))
    }

    pub fn len(&self) -> usize {
        self.budget_items.len() + self.categories.len() + self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
