//! Glue between router, registry and adapters for one message.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::broker::timeframes;
use crate::broker::types::{
    AccountSnapshot, BrokerKind, Candle, ConnectionStatus, Market, OrderResult, Position, Trade,
};
use crate::config::AppConfig;
use crate::error::{BrokerError, BrokerResult, ErrorReport};
use crate::intent::{Intent, IntentKind};
use crate::registry::BrokerRegistry;

/// Normalized result of one adapter operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Account(AccountSnapshot),
    Positions(Vec<Position>),
    Order(OrderResult),
    Candles(Vec<Candle>),
    Trades(Vec<Trade>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Data { payload: Payload },
    /// The intent needs parameters the message did not carry. No adapter
    /// call was made.
    NeedsMoreInput {
        missing: Vec<&'static str>,
        prompt: String,
    },
    Error { error: ErrorReport },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BrokerResponseEnvelope {
    pub intent: IntentKind,
    pub instrument: Option<String>,
    pub broker_used: BrokerKind,
    pub broker_status: ConnectionStatus,
    pub available_brokers: Vec<BrokerKind>,
    pub outcome: Outcome,
}

impl BrokerResponseEnvelope {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error { .. })
    }

    pub fn payload(&self) -> Option<&Payload> {
        match &self.outcome {
            Outcome::Data { payload } => Some(payload),
            _ => None,
        }
    }
}

/// Hints for broker selection that do not come from the message.
#[derive(Clone, Copy, Debug, Default)]
pub struct Selection {
    pub explicit: Option<BrokerKind>,
    pub preference: Option<Market>,
}

#[derive(Clone, Debug)]
pub struct RequestDispatcher {
    call_timeout: Duration,
    default_timeframe: String,
    candle_limit: u32,
}

impl RequestDispatcher {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            call_timeout,
            default_timeframe: timeframes::DEFAULT_TIMEFRAME.to_string(),
            candle_limit: timeframes::DEFAULT_CANDLE_LIMIT,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            default_timeframe: config.default_timeframe.clone(),
            candle_limit: config.candle_limit,
        }
    }

    /// Resolves a broker, checks it is connected and makes at most one
    /// adapter call.
    ///
    /// Selection and connectivity failures are returned as `Err`. Failures
    /// of the adapter call itself land in the envelope's `error` outcome.
    pub async fn dispatch(
        &self,
        intent: &Intent,
        message: &str,
        registry: &mut BrokerRegistry,
        selection: Selection,
    ) -> BrokerResult<BrokerResponseEnvelope> {
        let kind = registry.select(selection.explicit, selection.preference, Some(message))?;

        if !registry.refresh(kind).await.is_usable() {
            return Err(BrokerError::Disconnected { broker: kind });
        }

        if !intent.missing.is_empty() {
            info!(
                "[DISPATCH] {} needs more input: {:?}",
                intent.kind, intent.missing
            );
            return Ok(self.envelope(
                intent,
                kind,
                registry,
                Outcome::NeedsMoreInput {
                    missing: intent.missing.clone(),
                    prompt: needs_more_input_prompt(intent.kind, &intent.missing),
                },
            ));
        }

        let adapter = registry.get(Some(kind))?;
        info!("[DISPATCH] {} -> {}", intent.kind, kind);

        let result = match intent.kind {
            IntentKind::GetAccountDetails => self
                .call(kind, adapter.get_account_details())
                .await
                .map(Payload::Account),
            IntentKind::GetPositions => self
                .call(kind, adapter.get_positions())
                .await
                .map(Payload::Positions),
            IntentKind::GetTrades => self
                .call(kind, adapter.get_trades())
                .await
                .map(Payload::Trades),
            IntentKind::ClosePosition => {
                let instrument = intent.instrument.clone().unwrap_or_default();
                self.call(kind, adapter.close_position(&instrument))
                    .await
                    .map(Payload::Order)
            }
            IntentKind::GetCandlestickData => {
                let instrument = intent.instrument.clone().unwrap_or_default();
                let timeframe = intent
                    .timeframe
                    .clone()
                    .unwrap_or_else(|| self.default_timeframe.clone());
                let limit = intent.candle_limit.unwrap_or(self.candle_limit);
                self.call(
                    kind,
                    adapter.get_candlestick_data(&instrument, &timeframe, limit),
                )
                .await
                .map(Payload::Candles)
            }
            IntentKind::CreateOrder => match intent.order.clone() {
                Some(order) => self
                    .call(kind, adapter.create_order(order))
                    .await
                    .map(Payload::Order),
                None => {
                    return Ok(self.envelope(
                        intent,
                        kind,
                        registry,
                        Outcome::NeedsMoreInput {
                            missing: vec!["order"],
                            prompt: needs_more_input_prompt(intent.kind, &["order"]),
                        },
                    ))
                }
            },
        };

        let outcome = match result {
            Ok(payload) => Outcome::Data { payload },
            Err(e) => {
                warn!("[DISPATCH] {} on {} failed: {}", intent.kind, kind, e);
                registry.record_failure(kind, &e);
                Outcome::Error { error: e.report() }
            }
        };
        Ok(self.envelope(intent, kind, registry, outcome))
    }

    async fn call<T, F>(&self, kind: BrokerKind, fut: F) -> BrokerResult<T>
    where
        F: Future<Output = BrokerResult<T>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout {
                broker: kind,
                secs: self.call_timeout.as_secs(),
            }),
        }
    }

    fn envelope(
        &self,
        intent: &Intent,
        kind: BrokerKind,
        registry: &BrokerRegistry,
        outcome: Outcome,
    ) -> BrokerResponseEnvelope {
        BrokerResponseEnvelope {
            intent: intent.kind,
            instrument: intent.instrument.clone(),
            broker_used: kind,
            broker_status: registry.status(kind),
            available_brokers: registry.available(),
            outcome,
        }
    }
}

fn needs_more_input_prompt(kind: IntentKind, missing: &[&str]) -> String {
    let what = match kind {
        IntentKind::CreateOrder => "place the order",
        IntentKind::ClosePosition => "close the position",
        IntentKind::GetCandlestickData => "fetch candles",
        _ => "continue",
    };
    format!(
        "To {} I still need: {}.",
        what,
        missing.join(", ")
    )
}
