//! External data providers for recall.
//!
//! This crate provides:
//!
//! - **Workspace**: calendar, mail and contacts (`WorkspaceProvider`), backed
//!   by Microsoft Graph
//! - **Budget**: account balances, categories and month summaries
//!   (`BudgetProvider`), backed by YNAB
//! - **Tools**: the model-facing bindings for both providers

pub mod budget;
pub mod error;
pub mod graph;
pub mod tools;
pub mod workspace;
pub mod ynab;

mod http;

pub use budget::{Account, BudgetProvider, Category, MonthSummary};
pub use error::ProviderError;
pub use graph::{GraphClient, GraphConfig};
pub use tools::{BUDGET_CAPABILITY, WORKSPACE_CAPABILITY, budget_tools, workspace_tools};
pub use workspace::{CalendarEvent, Contact, Email, WorkspaceProvider};
pub use ynab::{YnabClient, YnabConfig};
