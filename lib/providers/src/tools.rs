//! Model-facing tools for the external providers.

use crate::budget::BudgetProvider;
use crate::error::ProviderError;
use crate::workspace::WorkspaceProvider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_ai::{Tool, ToolDefinition, ToolError};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

/// Capability line for the workspace tools.
pub const WORKSPACE_CAPABILITY: &str = "You can read the user's calendar, recent emails and \
     contacts, and send email on their behalf. Use RFC 3339 timestamps for calendar ranges.";

/// Capability line for the budget tools.
pub const BUDGET_CAPABILITY: &str = "You have read-only access to the user's budget: account \
     balances, category balances and monthly summaries. Amounts are in dollars.";

const DEFAULT_EMAIL_LIMIT: u64 = 10;
const DEFAULT_CONTACT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 100;

fn provider_error(tool: &str, err: ProviderError) -> ToolError {
    match err {
        ProviderError::Transport { .. } => ToolError::fatal(tool, err.to_string()),
        ProviderError::InvalidRequest { reason } => ToolError::invalid_input(tool, reason),
        _ => ToolError::failed(tool, err.to_string()),
    }
}

fn encode<T: serde::Serialize>(tool: &str, value: &T) -> Result<JsonValue, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::failed(tool, e.to_string()))
}

fn required_str<'a>(tool: &str, input: &'a JsonValue, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ToolError::invalid_input(tool, format!("'{key}' is required")))
}

fn timestamp_arg(tool: &str, input: &JsonValue, key: &str) -> Result<DateTime<Utc>, ToolError> {
    let raw = required_str(tool, input, key)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ToolError::invalid_input(tool, format!("'{key}' is not RFC 3339: {e}")))
}

fn limit_arg(tool: &str, input: &JsonValue, default: u64) -> Result<u32, ToolError> {
    let limit = match input.get("max_results") {
        None | Some(JsonValue::Null) => default,
        Some(value) => value
            .as_u64()
            .filter(|n| *n > 0)
            .ok_or_else(|| ToolError::invalid_input(tool, "'max_results' must be a positive integer"))?,
    };
    Ok(u32::try_from(limit.min(MAX_LIMIT)).unwrap_or(u32::MAX))
}

fn limit_schema(description: &str) -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "max_results": { "type": "integer", "minimum": 1, "description": description }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkspaceOp {
    CalendarEvents,
    RecentEmails,
    Contacts,
    ContactByName,
    SendEmail,
}

struct WorkspaceTool {
    provider: Arc<dyn WorkspaceProvider>,
    op: WorkspaceOp,
}

/// Binds the calendar, mail and contact tools to a provider.
#[must_use]
pub fn workspace_tools(provider: Arc<dyn WorkspaceProvider>) -> Vec<Arc<dyn Tool>> {
    [
        WorkspaceOp::CalendarEvents,
        WorkspaceOp::RecentEmails,
        WorkspaceOp::Contacts,
        WorkspaceOp::ContactByName,
        WorkspaceOp::SendEmail,
    ]
    .into_iter()
    .map(|op| {
        Arc::new(WorkspaceTool {
            provider: Arc::clone(&provider),
            op,
        }) as Arc<dyn Tool>
    })
    .collect()
}

impl WorkspaceTool {
    fn name(&self) -> &'static str {
        match self.op {
            WorkspaceOp::CalendarEvents => "get_calendar_events",
            WorkspaceOp::RecentEmails => "get_recent_emails",
            WorkspaceOp::Contacts => "get_contacts",
            WorkspaceOp::ContactByName => "get_contact_by_name",
            WorkspaceOp::SendEmail => "send_email",
        }
    }
}

#[async_trait]
impl Tool for WorkspaceTool {
    fn definition(&self) -> ToolDefinition {
        let name = self.name();
        match self.op {
            WorkspaceOp::CalendarEvents => ToolDefinition::new(
                name,
                "Lists calendar events between two instants, ordered by start.",
            )
            .with_input_schema(json!({
                "type": "object",
                "properties": {
                    "start": { "type": "string", "description": "Range start, RFC 3339." },
                    "end": { "type": "string", "description": "Range end, RFC 3339." }
                },
                "required": ["start", "end"]
            })),
            WorkspaceOp::RecentEmails => {
                ToolDefinition::new(name, "Lists the most recent emails, newest first.")
                    .with_input_schema(limit_schema("How many emails to return. Defaults to 10."))
            }
            WorkspaceOp::Contacts => {
                ToolDefinition::new(name, "Lists contacts ordered by display name.")
                    .with_input_schema(limit_schema("How many contacts to return. Defaults to 50."))
            }
            WorkspaceOp::ContactByName => ToolDefinition::new(
                name,
                "Finds the contact whose display, given or family name starts with the given name.",
            )
            .with_input_schema(json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "The name to look up." }
                },
                "required": ["name"]
            })),
            WorkspaceOp::SendEmail => ToolDefinition::new(
                name,
                "Sends a plain-text email. Confirm the recipient and content with the user first.",
            )
            .with_input_schema(json!({
                "type": "object",
                "properties": {
                    "to": { "type": "string", "description": "Recipient email address." },
                    "subject": { "type": "string" },
                    "body": { "type": "string" }
                },
                "required": ["to", "subject", "body"]
            })),
        }
    }

    async fn execute(&self, input: JsonValue) -> Result<JsonValue, ToolError> {
        let name = self.name();
        match self.op {
            WorkspaceOp::CalendarEvents => {
                let start = timestamp_arg(name, &input, "start")?;
                let end = timestamp_arg(name, &input, "end")?;
                let events = self
                    .provider
                    .calendar_events(start, end)
                    .await
                    .map_err(|e| provider_error(name, e))?;
                Ok(json!({ "events": encode(name, &events)? }))
            }
            WorkspaceOp::RecentEmails => {
                let limit = limit_arg(name, &input, DEFAULT_EMAIL_LIMIT)?;
                let emails = self
                    .provider
                    .recent_emails(limit)
                    .await
                    .map_err(|e| provider_error(name, e))?;
                Ok(json!({ "emails": encode(name, &emails)? }))
            }
            WorkspaceOp::Contacts => {
                let limit = limit_arg(name, &input, DEFAULT_CONTACT_LIMIT)?;
                let contacts = self
                    .provider
                    .contacts(limit)
                    .await
                    .map_err(|e| provider_error(name, e))?;
                Ok(json!({ "contacts": encode(name, &contacts)? }))
            }
            WorkspaceOp::ContactByName => {
                let query = required_str(name, &input, "name")?;
                let contact = self
                    .provider
                    .contact_by_name(query)
                    .await
                    .map_err(|e| provider_error(name, e))?
                    .ok_or_else(|| ToolError::failed(name, format!("no contact named '{query}'")))?;
                encode(name, &contact)
            }
            WorkspaceOp::SendEmail => {
                let to = required_str(name, &input, "to")?;
                let subject = required_str(name, &input, "subject")?;
                let body = input
                    .get("body")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| ToolError::invalid_input(name, "'body' is required"))?;
                let confirmation = self
                    .provider
                    .send_email(to, subject, body)
                    .await
                    .map_err(|e| provider_error(name, e))?;
                Ok(json!({ "result": confirmation }))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BudgetOp {
    Accounts,
    Categories,
    MonthSummaries,
}

struct BudgetTool {
    provider: Arc<dyn BudgetProvider>,
    op: BudgetOp,
}

/// Binds the budget tools to a provider.
#[must_use]
pub fn budget_tools(provider: Arc<dyn BudgetProvider>) -> Vec<Arc<dyn Tool>> {
    [BudgetOp::Accounts, BudgetOp::Categories, BudgetOp::MonthSummaries]
        .into_iter()
        .map(|op| {
            Arc::new(BudgetTool {
                provider: Arc::clone(&provider),
                op,
            }) as Arc<dyn Tool>
        })
        .collect()
}

impl BudgetTool {
    fn name(&self) -> &'static str {
        match self.op {
            BudgetOp::Accounts => "get_accounts",
            BudgetOp::Categories => "get_categories",
            BudgetOp::MonthSummaries => "get_month_summaries",
        }
    }
}

#[async_trait]
impl Tool for BudgetTool {
    fn definition(&self) -> ToolDefinition {
        let description = match self.op {
            BudgetOp::Accounts => "Lists open accounts with their balances.",
            BudgetOp::Categories => {
                "Lists budget categories with budgeted, spent and available amounts for the current month."
            }
            BudgetOp::MonthSummaries => {
                "Lists monthly totals: income, budgeted, activity and ready to assign."
            }
        };
        ToolDefinition::new(self.name(), description)
    }

    async fn execute(&self, _input: JsonValue) -> Result<JsonValue, ToolError> {
        let name = self.name();
        match self.op {
            BudgetOp::Accounts => {
                let accounts = self
                    .provider
                    .accounts()
                    .await
                    .map_err(|e| provider_error(name, e))?;
                Ok(json!({ "accounts": encode(name, &accounts)? }))
            }
            BudgetOp::Categories => {
                let categories = self
                    .provider
                    .categories()
                    .await
                    .map_err(|e| provider_error(name, e))?;
                Ok(json!({ "categories": encode(name, &categories)? }))
            }
            BudgetOp::MonthSummaries => {
                let months = self
                    .provider
                    .month_summaries()
                    .await
                    .map_err(|e| provider_error(name, e))?;
                Ok(json!({ "months": encode(name, &months)? }))
            }
        }
    }
}
