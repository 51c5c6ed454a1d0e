//! Personal budgeting figures.
//!
//! Amounts are in currency units; providers that report milliunits convert
//! with [`from_milliunits`].

use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An open account and its balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub account_type: String,
    pub on_budget: bool,
    pub note: Option<String>,
    pub balance: f64,
    pub cleared_balance: f64,
    pub uncleared_balance: f64,
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

/// A visible budget category for the current month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub group_name: Option<String>,
    pub name: String,
    pub budgeted: f64,
    pub activity: f64,
    pub balance: f64,
    pub goal_type: Option<String>,
    pub goal_target: Option<f64>,
    pub goal_percentage_complete: Option<i64>,
}

/// Totals for one budget month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthSummary {
    /// First day of the month, `YYYY-MM-DD`.
    pub month: String,
    pub income: f64,
    pub budgeted: f64,
    pub activity: f64,
    pub ready_to_assign: f64,
    pub age_of_money: Option<i64>,
}

/// Converts thousandths of a currency unit to currency units.
#[must_use]
pub fn from_milliunits(milliunits: i64) -> f64 {
    milliunits as f64 / 1000.0
}

/// Read access to the user's budget.
#[async_trait]
pub trait BudgetProvider: Send + Sync {
    /// Open, undeleted accounts.
    async fn accounts(&self) -> Result<Vec<Account>, ProviderError>;

    /// Visible, undeleted categories.
    async fn categories(&self) -> Result<Vec<Category>, ProviderError>;

    /// Every budget month.
    async fn month_summaries(&self) -> Result<Vec<MonthSummary>, ProviderError>;
}
