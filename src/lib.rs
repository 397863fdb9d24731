//! Trading Pal - multi-broker layer for a conversational trading assistant
//!
//! Messages are classified into trading intents, routed to one of the
//! user's connected brokerages (OANDA for forex, Alpaca for equities) and
//! answered with a normalized envelope that the narrator turns into text.

pub mod api;
pub mod broker;
pub mod config;
pub mod constants;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod intent;
pub mod llm;
pub mod registry;
pub mod session;

// Re-export commonly used types
pub use broker::{BrokerAdapter, BrokerCredentials, BrokerKind, ConnectionStatus, Connector, Market};
pub use config::AppConfig;
pub use dispatch::{BrokerResponseEnvelope, Outcome, Payload, RequestDispatcher, Selection};
pub use error::{BrokerError, BrokerResult};
pub use intent::{Intent, IntentKind, IntentRouter};
pub use registry::BrokerRegistry;
pub use session::SessionManager;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod registry_tests;
