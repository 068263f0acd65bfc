//! Outbound email: address handling, provider client, and the gateway.

pub mod address;
pub mod gateway;
pub mod provider;

pub use gateway::EmailGateway;
pub use provider::{EmailProvider, OutboundEmail, ResendClient, SendReceipt};
