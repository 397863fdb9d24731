//! Error types for the broker layer
//!
//! Every failure is a value. Adapters convert transport and brokerage
//! errors into [`BrokerError`] at their boundary so the dispatcher can hand
//! them to the narrator as ordinary data.

use serde::Serialize;
use thiserror::Error;

use crate::broker::types::BrokerKind;

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Broker-layer errors
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    /// Missing or invalid credentials. Never reaches the network.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{broker} connection failed: {message}")]
    Connection { broker: BrokerKind, message: String },

    #[error("{broker} did not answer within {secs}s")]
    Timeout { broker: BrokerKind, secs: u64 },

    #[error("{broker} is not connected")]
    NotConnected { broker: BrokerKind },

    /// The broker was connected once but its last probe or call failed.
    #[error("{broker} is disconnected, try again shortly")]
    Disconnected { broker: BrokerKind },

    #[error("No brokers configured. Please configure a broker.")]
    NoBrokerAvailable,

    #[error("Invalid order: {0}")]
    Validation(String),

    /// The brokerage understood the request and refused it.
    #[error("Order rejected by {broker}: {message}")]
    RemoteRejection {
        broker: BrokerKind,
        status: Option<u16>,
        message: String,
    },

    #[error("{broker}: {what} not found")]
    NotFound { broker: BrokerKind, what: String },

    #[error("Unexpected response from {broker}: {message}")]
    Decode { broker: BrokerKind, message: String },
}

impl BrokerError {
    /// Stable tag used in envelopes and HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerError::Configuration(_) => "configuration_error",
            BrokerError::Connection { .. } => "connection_error",
            BrokerError::Timeout { .. } => "timeout",
            BrokerError::NotConnected { .. } => "not_connected",
            BrokerError::Disconnected { .. } => "broker_disconnected",
            BrokerError::NoBrokerAvailable => "no_broker_available",
            BrokerError::Validation(_) => "validation_error",
            BrokerError::RemoteRejection { .. } => "remote_rejection",
            BrokerError::NotFound { .. } => "not_found",
            BrokerError::Decode { .. } => "decode_error",
        }
    }

    pub fn broker(&self) -> Option<BrokerKind> {
        match self {
            BrokerError::Connection { broker, .. }
            | BrokerError::Timeout { broker, .. }
            | BrokerError::NotConnected { broker }
            | BrokerError::Disconnected { broker }
            | BrokerError::RemoteRejection { broker, .. }
            | BrokerError::NotFound { broker, .. }
            | BrokerError::Decode { broker, .. } => Some(*broker),
            BrokerError::Configuration(_)
            | BrokerError::NoBrokerAvailable
            | BrokerError::Validation(_) => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrokerError::Connection { .. }
                | BrokerError::Timeout { .. }
                | BrokerError::Disconnected { .. }
        )
    }

    /// Errors that say something about the link to the brokerage rather
    /// than about the request.
    pub fn is_connection_class(&self) -> bool {
        matches!(
            self,
            BrokerError::Connection { .. } | BrokerError::Timeout { .. }
        )
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind().to_string(),
            message: self.to_string(),
            broker: self.broker(),
            retryable: self.is_retryable(),
        }
    }
}

/// Serializable form of a [`BrokerError`].
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
    pub broker: Option<BrokerKind>,
    pub retryable: bool,
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },
}

/// Persistence collaborator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Storage failure: {0}")]
    Backend(String),
}

/// Narration errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(#[from] async_openai::error::OpenAIError),

    #[error("LLM returned an empty response")]
    Empty,

    #[error("No LLM is configured")]
    NotConfigured,
}
