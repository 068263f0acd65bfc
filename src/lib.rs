//! Waitlist Mailer - Reliable Confirmation Email Delivery Pipeline
//!
//! This crate implements the delivery-reliability layer behind a waitlist
//! signup flow: idempotent confirmation dispatch, circuit-breaker-guarded
//! provider and store access, bounded dead-letter replay, HMAC-verified
//! webhook ingestion of delivery events, and an authenticated admin API.
//!
//! # Features
//!
//! - **Idempotent dispatch**: at-least-once triggers, at-most-one email
//! - **Circuit breakers**: fail fast when the provider or store degrades
//! - **Dead-letter replay**: bounded, sequential retry of failed sends
//! - **Webhook ingestion**: signed delivery events, bounce/complaint blocking
//! - **Admin API**: forced resends and on-demand replay passes
//!
//! # Architecture
//!
//! ```text
//! Trigger ──▶ ConfirmationDispatcher ──▶ EmailGateway ──▶ Provider
//!                    │                       │ (breaker)
//!                    ▼                       │
//!              ┌──────────┐                  │
//!              │ Datastore│◀─────────────────┤
//!              │ (breaker)│                  │
//!              └────┬─────┘            ┌─────┴──────┐
//!                   │                  │ DlqReplayer│
//!                   ▼                  └────────────┘
//!        waitlist / email_dlq /
//!        email_events collections
//!                   ▲
//!                   │
//!          WebhookIngestor ◀── signed provider events
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod admin;
pub mod breaker;
pub mod config;
pub mod dispatch;
pub mod email;
pub mod error;
pub mod security;
pub mod state;
pub mod store;
pub mod template;
pub mod webhook;

// Re-exports for convenience
pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use config::AppConfig;
pub use dispatch::{ConfirmationDispatcher, DispatchOutcome, DlqReplayer, ReplayReport};
pub use error::{Error, Result};
pub use state::{router, AppState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
