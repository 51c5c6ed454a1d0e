//! Inbound message contract.

use crate::error::InboundError;
use recall_core::{AgentAddress, UserAddress};
use serde::{Deserialize, Serialize};

/// A message received from a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The message text. May be empty when only media was sent.
    pub body: String,
    /// The sender.
    pub from: UserAddress,
    /// The agent the message was sent to.
    pub to: AgentAddress,
    /// Attached media references.
    pub media_urls: Vec<String>,
}

impl InboundMessage {
    /// Builds a message from raw channel fields.
    ///
    /// # Errors
    ///
    /// Returns `InboundError::Validation` if the sender or recipient is
    /// missing or blank.
    pub fn from_parts(
        body: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Self, InboundError> {
        let from = from.map(UserAddress::new).unwrap_or_else(|| UserAddress::new(""));
        let to = to.map(AgentAddress::new).unwrap_or_else(|| AgentAddress::new(""));

        if from.is_empty() || to.is_empty() {
            return Err(InboundError::Validation {
                reason: "missing required parameters".to_string(),
            });
        }

        Ok(Self {
            body: body.unwrap_or_default().to_string(),
            from,
            to,
            media_urls: Vec::new(),
        })
    }

    /// Attaches media references, dropping blank ones.
    #[must_use]
    pub fn with_media(mut self, media_urls: impl IntoIterator<Item = String>) -> Self {
        self.media_urls = media_urls
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        self
    }

    /// Returns true if media is attached.
    #[must_use]
    pub fn has_media(&self) -> bool {
        !self.media_urls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_message_is_built() {
        let message =
            InboundMessage::from_parts(Some("hi"), Some("+15551111111"), Some("+15550000000"))
                .unwrap();
        assert_eq!(message.body, "hi");
        assert_eq!(message.from.as_str(), "+15551111111");
        assert!(!message.has_media());
    }

    #[test]
    fn missing_body_is_empty_text() {
        let message =
            InboundMessage::from_parts(None, Some("+15551111111"), Some("+15550000000")).unwrap();
        assert_eq!(message.body, "");
    }

    #[test]
    fn blank_sender_is_rejected() {
        let err = InboundMessage::from_parts(Some("hi"), Some("  "), Some("+15550000000"))
            .unwrap_err();
        assert!(matches!(err, InboundError::Validation { .. }));
    }

    #[test]
    fn missing_recipient_is_rejected() {
        let err = InboundMessage::from_parts(Some("hi"), Some("+15551111111"), None).unwrap_err();
        assert!(matches!(err, InboundError::Validation { .. }));
    }

    #[test]
    fn blank_media_is_dropped() {
        let message =
            InboundMessage::from_parts(Some(""), Some("+15551111111"), Some("+15550000000"))
                .unwrap()
                .with_media(vec![
                    "https://media.example/1.jpg".to_string(),
                    " ".to_string(),
                ]);
        assert_eq!(message.media_urls, vec!["https://media.example/1.jpg"]);
    }
}
