//! Request plumbing shared by the REST adapters.
//!
//! Sends a prepared request with the per-call timeout and turns every
//! outcome into either a JSON body or a [`BrokerError`].

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::constants::trading;
use crate::error::{BrokerError, BrokerResult};

use super::types::BrokerKind;

const MAX_ERROR_BODY: usize = 300;

#[derive(Clone)]
pub struct RestClient {
    client: Client,
    broker: BrokerKind,
    timeout: Duration,
}

impl RestClient {
    pub fn new(client: Client, broker: BrokerKind, timeout: Duration) -> Self {
        Self {
            client,
            broker,
            timeout,
        }
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    pub async fn send(&self, req: RequestBuilder) -> BrokerResult<Value> {
        let resp = req
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.transport_error(e))?;
        debug!("[{}] HTTP {} ({} bytes)", self.broker, status, text.len());

        if !status.is_success() {
            return Err(status_error(self.broker, status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| BrokerError::Decode {
            broker: self.broker,
            message: format!("{} (body: {})", e, truncate(&text)),
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> BrokerError {
        if err.is_timeout() {
            BrokerError::Timeout {
                broker: self.broker,
                secs: self.timeout.as_secs(),
            }
        } else {
            BrokerError::Connection {
                broker: self.broker,
                message: err.to_string(),
            }
        }
    }
}

/// Maps a non-2xx reply. Auth and server failures are connection problems;
/// any other 4xx is the brokerage refusing the request.
pub fn status_error(broker: BrokerKind, status: StatusCode, body: &str) -> BrokerError {
    let message = error_message(body);
    match status.as_u16() {
        403 if is_insufficient_funds(body) => BrokerError::RemoteRejection {
            broker,
            status: Some(403),
            message,
        },
        401 | 403 => BrokerError::Connection {
            broker,
            message: format!("authentication failed ({}): {}", status, message),
        },
        500..=599 => BrokerError::Connection {
            broker,
            message: format!("service error ({}): {}", status, message),
        },
        code => BrokerError::RemoteRejection {
            broker,
            status: Some(code),
            message,
        },
    }
}

/// Alpaca answers 403 both for bad keys and for orders the account can't afford.
pub fn is_insufficient_funds(body: &str) -> bool {
    body.contains(trading::ALPACA_INSUFFICIENT_BALANCE_CODE)
        || body.to_lowercase().contains("insufficient")
}

/// Turns a 404 rejection into `NotFound` for `what`.
pub fn not_found_on_404(err: BrokerError, what: &str) -> BrokerError {
    match err {
        BrokerError::RemoteRejection {
            broker,
            status: Some(404),
            ..
        } => BrokerError::NotFound {
            broker,
            what: what.to_string(),
        },
        other => other,
    }
}

/// OANDA reports `errorMessage`, Alpaca reports `message`.
fn error_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        for key in ["errorMessage", "message", "error"] {
            if let Some(msg) = v.get(key).and_then(|m| m.as_str()) {
                return msg.to_string();
            }
        }
    }
    truncate(body)
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Brokerages send numbers as strings ("1.0850") or as JSON numbers.
pub fn as_f64(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    v.as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| v.as_f64())
}

pub fn as_string(v: Option<&Value>) -> Option<String> {
    let v = v?;
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn require_f64(broker: BrokerKind, v: &Value, key: &str) -> BrokerResult<f64> {
    as_f64(v.get(key)).ok_or_else(|| BrokerError::Decode {
        broker,
        message: format!("missing numeric field '{}'", key),
    })
}
