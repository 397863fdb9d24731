pub mod factory;
pub mod http;
pub mod traits;
pub mod types;

pub mod timeframes;

pub mod alpaca;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod oanda;

pub use factory::RestConnector;
pub use traits::{BrokerAdapter, Connector};
pub use types::{BrokerCredentials, BrokerKind, ConnectionStatus, Market};

#[cfg(test)]
mod types_tests;
