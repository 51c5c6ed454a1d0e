//! YNAB client for the budget provider.

use crate::budget::{Account, BudgetProvider, Category, MonthSummary, from_milliunits};
use crate::error::ProviderError;
use crate::http::{json, transport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

const PROVIDER: &str = "ynab";

/// Default YNAB API base URL.
pub const DEFAULT_YNAB_URL: &str = "https://api.ynab.com/v1";

/// Budget alias YNAB resolves to the most recently used budget.
pub const LAST_USED_BUDGET: &str = "last-used";

/// Access settings for YNAB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YnabConfig {
    /// Personal access token.
    pub access_token: String,
    /// Budget id, or `last-used`.
    pub budget_id: String,
}

/// YNAB-backed [`BudgetProvider`].
pub struct YnabClient {
    http: Client,
    config: YnabConfig,
    base_url: String,
}

impl YnabClient {
    /// Creates a client against the public API.
    #[must_use]
    pub fn new(http: Client, config: YnabConfig) -> Self {
        Self {
            http,
            config,
            base_url: DEFAULT_YNAB_URL.to_string(),
        }
    }

    /// Overrides the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, resource: &str) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(format!(
                "{}/budgets/{}/{resource}",
                self.base_url, self.config.budget_id
            ))
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| transport(PROVIDER, &e))?;
        let envelope: Envelope<T> = json(PROVIDER, response).await?;
        Ok(envelope.data)
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct AccountsData {
    accounts: Vec<YnabAccount>,
}

#[derive(Deserialize)]
struct YnabAccount {
    name: String,
    #[serde(rename = "type")]
    account_type: String,
    on_budget: bool,
    closed: bool,
    deleted: bool,
    note: Option<String>,
    balance: i64,
    cleared_balance: i64,
    uncleared_balance: i64,
    last_reconciled_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct CategoriesData {
    category_groups: Vec<YnabCategoryGroup>,
}

#[derive(Deserialize)]
struct YnabCategoryGroup {
    #[serde(default)]
    categories: Vec<YnabCategory>,
}

#[derive(Deserialize)]
struct YnabCategory {
    category_group_name: Option<String>,
    name: String,
    hidden: bool,
    deleted: bool,
    budgeted: i64,
    activity: i64,
    balance: i64,
    goal_type: Option<String>,
    goal_target: Option<i64>,
    goal_percentage_complete: Option<i64>,
}

#[derive(Deserialize)]
struct MonthsData {
    months: Vec<YnabMonth>,
}

#[derive(Deserialize)]
struct YnabMonth {
    month: String,
    income: i64,
    budgeted: i64,
    activity: i64,
    to_be_budgeted: i64,
    age_of_money: Option<i64>,
}

#[async_trait]
impl BudgetProvider for YnabClient {
    #[instrument(skip(self))]
    async fn accounts(&self) -> Result<Vec<Account>, ProviderError> {
        let data: AccountsData = self.get("accounts").await?;
        Ok(data
            .accounts
            .into_iter()
            .filter(|a| !a.deleted && !a.closed)
            .map(|a| Account {
                name: a.name,
                account_type: a.account_type,
                on_budget: a.on_budget,
                note: a.note,
                balance: from_milliunits(a.balance),
                cleared_balance: from_milliunits(a.cleared_balance),
                uncleared_balance: from_milliunits(a.uncleared_balance),
                last_reconciled_at: a.last_reconciled_at,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn categories(&self) -> Result<Vec<Category>, ProviderError> {
        let data: CategoriesData = self.get("categories").await?;
        Ok(data
            .category_groups
            .into_iter()
            .flat_map(|g| g.categories)
            .filter(|c| !c.deleted && !c.hidden)
            .map(|c| Category {
                group_name: c.category_group_name,
                name: c.name,
                budgeted: from_milliunits(c.budgeted),
                activity: from_milliunits(c.activity),
                balance: from_milliunits(c.balance),
                goal_type: c.goal_type,
                goal_target: c.goal_target.map(from_milliunits),
                goal_percentage_complete: c.goal_percentage_complete,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn month_summaries(&self) -> Result<Vec<MonthSummary>, ProviderError> {
        let data: MonthsData = self.get("months").await?;
        Ok(data
            .months
            .into_iter()
            .map(|m| MonthSummary {
                month: m.month,
                income: from_milliunits(m.income),
                budgeted: from_milliunits(m.budgeted),
                activity: from_milliunits(m.activity),
                ready_to_assign: from_milliunits(m.to_be_budgeted),
                age_of_money: m.age_of_money,
            })
            .collect())
    }
}
