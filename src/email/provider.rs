//! Email provider client.
//!
//! [`EmailProvider`] is the seam between the pipeline and the outbound
//! provider; the production implementation is a Resend-style JSON API
//! client. Provider-level failures of every shape (transport error, non-2xx
//! status, provider-reported error object) collapse into a single uniform
//! [`Error::ExternalService`] carrying a retryable flag; provider-reported
//! errors are retryable by default.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An outbound message handed to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEmail {
    /// Sender identity, e.g. `Waitlist <hello@example.com>`
    pub from: String,
    /// Recipient addresses
    pub to: Vec<String>,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html: String,
    /// Custom headers (dedupe key travels here)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<EmailHeader>,
    /// Provider-side tags (locale, pipeline stage)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<EmailTag>,
}

/// A custom header on an outbound message.
#[derive(Debug, Clone, Serialize)]
pub struct EmailHeader {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

/// A provider-side tag.
#[derive(Debug, Clone, Serialize)]
pub struct EmailTag {
    /// Tag name
    pub name: String,
    /// Tag value
    pub value: String,
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, Deserialize)]
pub struct SendReceipt {
    /// Message ID assigned by the provider
    #[serde(rename = "id")]
    pub message_id: String,
}

/// Seam for outbound email delivery.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send one message, returning the provider-assigned message id.
    async fn send(&self, message: &OutboundEmail) -> Result<SendReceipt>;
}

/// Error object reported by the provider API.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Resend-style HTTP API client.
#[derive(Debug, Clone)]
pub struct ResendClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ResendClient {
    const DEFAULT_ENDPOINT: &'static str = "https://api.resend.com/emails";

    /// Create a client for the production API.
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self::with_endpoint(api_key, Self::DEFAULT_ENDPOINT)
    }

    /// Create a client against a custom endpoint (local stubs, staging).
    pub fn with_endpoint<S: Into<String>, E: Into<String>>(api_key: S, endpoint: E) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EmailProvider for ResendClient {
    async fn send(&self, message: &OutboundEmail) -> Result<SendReceipt> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await
            .map_err(|e| Error::external("provider_transport", e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let receipt: SendReceipt = response
                .json()
                .await
                .map_err(|e| Error::external("provider_bad_response", e.to_string()))?;
            return Ok(receipt);
        }

        // Provider-reported errors are retryable by default; the DLQ and
        // breaker decide what to do with them.
        let body: ProviderErrorBody = response.json().await.unwrap_or(ProviderErrorBody {
            name: None,
            message: None,
        });
        let code = body
            .name
            .unwrap_or_else(|| format!("provider_http_{}", status.as_u16()));
        let message = body
            .message
            .unwrap_or_else(|| format!("provider returned HTTP {status}"));
        Err(Error::ExternalService {
            code,
            message,
            retryable: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_email_serialization() {
        let message = OutboundEmail {
            from: "Waitlist <hello@waitlist.test>".to_string(),
            to: vec!["user@example.com".to_string()],
            subject: "Confirm your signup".to_string(),
            html: "<p>hi</p>".to_string(),
            headers: vec![EmailHeader {
                name: "X-Entity-Ref-ID".to_string(),
                value: "abc123".to_string(),
            }],
            tags: vec![EmailTag {
                name: "locale".to_string(),
                value: "en".to_string(),
            }],
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["to"][0], "user@example.com");
        assert_eq!(json["headers"][0]["name"], "X-Entity-Ref-ID");
        assert_eq!(json["tags"][0]["value"], "en");
    }

    #[test]
    fn test_empty_headers_and_tags_omitted() {
        let message = OutboundEmail {
            from: "a@b.co".to_string(),
            to: vec!["c@d.co".to_string()],
            subject: "s".to_string(),
            html: "h".to_string(),
            headers: vec![],
            tags: vec![],
        };
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("headers").is_none());
        assert!(json.get("tags").is_none());
    }

    #[test]
    fn test_receipt_deserialization() {
        let receipt: SendReceipt =
            serde_json::from_str(r#"{"id":"msg_123"}"#).unwrap();
        assert_eq!(receipt.message_id, "msg_123");
    }
}
