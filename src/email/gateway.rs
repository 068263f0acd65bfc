//! Email gateway: normalized provider calls behind the circuit breaker.
//!
//! Every send is a live network attempt; there is no caching or batching.
//! The breaker is the only guard against overload of a struggling provider.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::email::provider::{EmailHeader, EmailProvider, EmailTag, OutboundEmail, SendReceipt};
use crate::error::Result;

/// Gateway routing outbound sends through the email-provider breaker.
#[derive(Clone)]
pub struct EmailGateway {
    provider: Arc<dyn EmailProvider>,
    breaker: Arc<CircuitBreaker>,
    sender: String,
}

impl EmailGateway {
    /// Create a gateway around a provider client and its breaker.
    pub fn new(provider: Arc<dyn EmailProvider>, breaker: Arc<CircuitBreaker>, sender: String) -> Self {
        Self {
            provider,
            breaker,
            sender,
        }
    }

    /// Send one message to `recipient`.
    ///
    /// The dedupe key travels as an `X-Entity-Ref-ID` header so the provider
    /// can correlate and deduplicate; the locale rides along as a tag.
    pub async fn send(
        &self,
        recipient: &str,
        subject: &str,
        html: &str,
        dedupe_key: &str,
        locale: &str,
    ) -> Result<SendReceipt> {
        let message = OutboundEmail {
            from: self.sender.clone(),
            to: vec![recipient.to_string()],
            subject: subject.to_string(),
            html: html.to_string(),
            headers: vec![EmailHeader {
                name: "X-Entity-Ref-ID".to_string(),
                value: dedupe_key.to_string(),
            }],
            tags: vec![EmailTag {
                name: "locale".to_string(),
                value: locale.to_string(),
            }],
        };

        let provider = self.provider.clone();
        let result = self
            .breaker
            .execute(|| async move { provider.send(&message).await })
            .await;

        match &result {
            Ok(receipt) => {
                counter!("emails_sent_total").increment(1);
                debug!(message_id = %receipt.message_id, "email accepted by provider");
            }
            Err(e) => {
                counter!("emails_failed_total").increment(1);
                warn!(error = %e, "email send failed");
            }
        }

        result
    }
}
