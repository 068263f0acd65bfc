//! Provider webhook ingestion: signature verification, typed events, and
//! the HTTP endpoint itself.

pub mod events;
pub mod handler;
pub mod signature;

pub use events::{WebhookEnvelope, MAX_PAYLOAD_BYTES};
pub use handler::receive;
pub use signature::SignatureVerifier;
