//! Calendar, mail and contacts.

use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// The event subject.
    pub description: String,
    /// Start, as reported by the provider.
    pub start: String,
    /// End, as reported by the provider.
    pub end: String,
    /// Timezone the start and end are expressed in.
    pub time_zone: String,
}

/// A received email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub subject: String,
    pub from: String,
    pub received: Option<DateTime<Utc>>,
    pub body_preview: String,
    pub is_read: bool,
}

/// An address book contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub display_name: String,
    pub email_addresses: Vec<String>,
    pub mobile_phone: String,
    pub business_phones: Vec<String>,
    pub company_name: String,
    pub job_title: String,
}

/// Read access to the user's calendar, mail and contacts, plus sending mail.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    /// Events overlapping `[start, end)`, ordered by start.
    async fn calendar_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, ProviderError>;

    /// The most recent emails, newest first.
    async fn recent_emails(&self, limit: u32) -> Result<Vec<Email>, ProviderError>;

    /// Contacts ordered by display name.
    async fn contacts(&self, limit: u32) -> Result<Vec<Contact>, ProviderError>;

    /// The best contact match for a display, given or family name.
    async fn contact_by_name(&self, name: &str) -> Result<Option<Contact>, ProviderError>;

    /// Sends a plain-text email and returns a confirmation.
    async fn send_email(&self, to: &str, subject: &str, body: &str)
    -> Result<String, ProviderError>;
}
