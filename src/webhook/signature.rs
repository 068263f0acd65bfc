//! Webhook signature verification.
//!
//! Signatures are HMAC-SHA256 over the exact raw request body under the
//! shared secret, hex-encoded. Two header conventions are accepted
//! depending on deployment: a Svix-style `webhook-signature: v1,<hex>`
//! header (possibly listing several space-separated candidates), or a
//! bearer-style `Authorization: Bearer <hex>` header. Comparison is
//! constant time; verification must happen on the raw bytes, before any
//! JSON parsing touches the payload.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::error::{Error, Result};
use crate::security::constant_time_compare;

type HmacSha256 = Hmac<Sha256>;

/// Verifies inbound webhook signatures against the shared secret.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    /// Create a verifier around the shared secret.
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Compute the expected hex signature for a body (test/tooling helper).
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("hmac accepts any key size");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify the signature headers against the raw body.
    ///
    /// # Errors
    ///
    /// [`Error::Signature`] when no signature header is present, none of
    /// the presented candidates decodes, or no candidate matches.
    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<()> {
        let candidates = extract_candidates(headers)?;
        let expected = self.digest(body);

        for candidate in &candidates {
            if let Ok(bytes) = hex::decode(candidate) {
                if constant_time_compare(&bytes, &expected) {
                    return Ok(());
                }
            }
        }

        warn!("webhook signature mismatch");
        Err(Error::Signature("signature mismatch".to_string()))
    }

    fn digest(&self, body: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("hmac accepts any key size");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Pull signature candidates out of the supported headers.
fn extract_candidates(headers: &HeaderMap) -> Result<Vec<String>> {
    // Svix-style: `v1,<hex>` entries, space separated.
    for name in ["webhook-signature", "svix-signature"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            let candidates: Vec<String> = value
                .split_whitespace()
                .filter_map(|entry| entry.strip_prefix("v1,"))
                .map(str::to_string)
                .collect();
            if candidates.is_empty() {
                return Err(Error::Signature(format!("malformed {name} header")));
            }
            return Ok(candidates);
        }
    }

    // Bearer-style deployment.
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Ok(vec![token.to_string()]);
            }
        }
        return Err(Error::Signature("malformed authorization header".to_string()));
    }

    Err(Error::Signature("missing signature header".to_string()))
}
