//! Microsoft Graph client for the workspace provider.
//!
//! Authenticates app-only with the client-credentials grant and acts on a
//! single configured user. The access token is cached until shortly before
//! it expires.

use crate::error::ProviderError;
use crate::http::{check, json, transport};
use crate::workspace::{CalendarEvent, Contact, Email, WorkspaceProvider};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

const PROVIDER: &str = "graph";

/// Default Graph API base URL.
pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default identity platform base URL.
pub const DEFAULT_LOGIN_URL: &str = "https://login.microsoftonline.com";

const SCOPE: &str = "https://graph.microsoft.com/.default";
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const CALENDAR_PAGE: u32 = 50;
const CONTACT_MATCHES: u32 = 10;

/// Credentials and target user for Graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// Directory id of the user whose data is read.
    pub user_id: String,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Graph-backed [`WorkspaceProvider`].
pub struct GraphClient {
    http: Client,
    config: GraphConfig,
    graph_url: String,
    login_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl GraphClient {
    /// Creates a client against the public Graph endpoints.
    #[must_use]
    pub fn new(http: Client, config: GraphConfig) -> Self {
        Self {
            http,
            config,
            graph_url: DEFAULT_GRAPH_URL.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Overrides both base URLs.
    #[must_use]
    pub fn with_base_urls(mut self, graph_url: impl Into<String>, login_url: impl Into<String>) -> Self {
        self.graph_url = graph_url.into().trim_end_matches('/').to_string();
        self.login_url = login_url.into().trim_end_matches('/').to_string();
        self
    }

    fn user_url(&self, path: &str) -> String {
        format!("{}/users/{}/{path}", self.graph_url, self.config.user_id)
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("requesting graph access token");
        let response = self
            .http
            .post(format!(
                "{}/{}/oauth2/v2.0/token",
                self.login_url, self.config.tenant_id
            ))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", SCOPE),
            ])
            .send()
            .await
            .map_err(|e| transport(PROVIDER, &e))?;

        let token: TokenResponse = match json(PROVIDER, response).await {
            Ok(token) => token,
            Err(ProviderError::Api { message, .. }) => {
                return Err(ProviderError::AuthenticationFailed {
                    provider: PROVIDER.to_string(),
                    reason: message,
                });
            }
            Err(err) => return Err(err),
        };

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.user_url(path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| transport(PROVIDER, &e))?;
        json(PROVIDER, response).await
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: Option<String>,
    time_zone: Option<String>,
}

#[derive(Deserialize)]
struct GraphEvent {
    subject: Option<String>,
    start: Option<GraphDateTime>,
    end: Option<GraphDateTime>,
}

#[derive(Deserialize)]
struct GraphEmailAddress {
    address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: Option<GraphEmailAddress>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    subject: Option<String>,
    from: Option<GraphRecipient>,
    received_date_time: Option<DateTime<Utc>>,
    body_preview: Option<String>,
    is_read: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphContact {
    display_name: Option<String>,
    #[serde(default)]
    email_addresses: Vec<GraphEmailAddress>,
    mobile_phone: Option<String>,
    #[serde(default)]
    business_phones: Vec<String>,
    company_name: Option<String>,
    job_title: Option<String>,
}

impl From<GraphContact> for Contact {
    fn from(c: GraphContact) -> Self {
        Self {
            display_name: c.display_name.unwrap_or_default(),
            email_addresses: c
                .email_addresses
                .into_iter()
                .filter_map(|e| e.address)
                .filter(|a| !a.is_empty())
                .collect(),
            mobile_phone: c.mobile_phone.unwrap_or_default(),
            business_phones: c
                .business_phones
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect(),
            company_name: c.company_name.unwrap_or_default(),
            job_title: c.job_title.unwrap_or_default(),
        }
    }
}

fn event_from_graph(event: GraphEvent) -> Option<CalendarEvent> {
    let start = event.start?;
    let end = event.end?;
    Some(CalendarEvent {
        description: event.subject.unwrap_or_default(),
        start: start.date_time?,
        end: end.date_time?,
        time_zone: start.time_zone.unwrap_or_else(|| "UTC".to_string()),
    })
}

/// Quotes a value for an OData string literal.
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl WorkspaceProvider for GraphClient {
    #[instrument(skip(self))]
    async fn calendar_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, ProviderError> {
        if end <= start {
            return Err(ProviderError::InvalidRequest {
                reason: "end must be after start".to_string(),
            });
        }

        let events: Collection<GraphEvent> = self
            .get(
                "calendarView",
                &[
                    ("startDateTime", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ("endDateTime", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ("$select", "subject,start,end".to_string()),
                    ("$orderby", "start/dateTime".to_string()),
                    ("$top", CALENDAR_PAGE.to_string()),
                ],
            )
            .await?;

        Ok(events.value.into_iter().filter_map(event_from_graph).collect())
    }

    #[instrument(skip(self))]
    async fn recent_emails(&self, limit: u32) -> Result<Vec<Email>, ProviderError> {
        let messages: Collection<GraphMessage> = self
            .get(
                "messages",
                &[
                    (
                        "$select",
                        "subject,from,receivedDateTime,bodyPreview,isRead".to_string(),
                    ),
                    ("$orderby", "receivedDateTime desc".to_string()),
                    ("$top", limit.to_string()),
                ],
            )
            .await?;

        Ok(messages
            .value
            .into_iter()
            .map(|m| Email {
                subject: m.subject.unwrap_or_default(),
                from: m
                    .from
                    .and_then(|f| f.email_address)
                    .and_then(|e| e.address)
                    .unwrap_or_default(),
                received: m.received_date_time,
                body_preview: m.body_preview.unwrap_or_default(),
                is_read: m.is_read.unwrap_or(false),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn contacts(&self, limit: u32) -> Result<Vec<Contact>, ProviderError> {
        let contacts: Collection<GraphContact> = self
            .get(
                "contacts",
                &[
                    (
                        "$select",
                        "displayName,emailAddresses,mobilePhone,businessPhones,companyName,jobTitle"
                            .to_string(),
                    ),
                    ("$orderby", "displayName".to_string()),
                    ("$top", limit.to_string()),
                ],
            )
            .await?;

        Ok(contacts.value.into_iter().map(Contact::from).collect())
    }

    #[instrument(skip(self))]
    async fn contact_by_name(&self, name: &str) -> Result<Option<Contact>, ProviderError> {
        let term = name.trim();
        if term.is_empty() {
            return Err(ProviderError::InvalidRequest {
                reason: "name is required".to_string(),
            });
        }

        let literal = odata_literal(term);
        let filter = format!(
            "startswith(displayName,'{literal}') or startswith(givenName,'{literal}') or startswith(surname,'{literal}')"
        );
        let contacts: Collection<GraphContact> = self
            .get(
                "contacts",
                &[
                    (
                        "$select",
                        "displayName,emailAddresses,mobilePhone,businessPhones,companyName,jobTitle,givenName,surname"
                            .to_string(),
                    ),
                    ("$filter", filter),
                    ("$top", CONTACT_MATCHES.to_string()),
                ],
            )
            .await?;

        let mut matches: Vec<Contact> = contacts.value.into_iter().map(Contact::from).collect();
        let needle = term.to_lowercase();
        let best = matches
            .iter()
            .position(|c| c.display_name.to_lowercase().contains(&needle))
            .unwrap_or(0);
        if matches.is_empty() {
            return Ok(None);
        }
        Ok(Some(matches.swap_remove(best)))
    }

    #[instrument(skip(self, body))]
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<String, ProviderError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(ProviderError::InvalidRequest {
                reason: "recipient address is required".to_string(),
            });
        }

        let token = self.access_token().await?;
        let payload = json!({
            "message": {
                "subject": subject,
                "body": { "contentType": "Text", "content": body },
                "toRecipients": [{ "emailAddress": { "address": to } }]
            },
            "saveToSentItems": true
        });

        let response = self
            .http
            .post(self.user_url("sendMail"))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport(PROVIDER, &e))?;
        check(PROVIDER, response).await?;

        Ok(format!("Email sent successfully to {to}"))
    }
}
