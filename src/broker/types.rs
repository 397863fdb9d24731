use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, BrokerResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Oanda,
    Alpaca,
}

impl BrokerKind {
    pub const ALL: [BrokerKind; 2] = [BrokerKind::Oanda, BrokerKind::Alpaca];

    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerKind::Oanda => "oanda",
            BrokerKind::Alpaca => "alpaca",
        }
    }

    pub fn markets(&self) -> &'static [Market] {
        match self {
            BrokerKind::Oanda => &[Market::Forex],
            BrokerKind::Alpaca => &[Market::Stocks],
        }
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrokerKind {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oanda" => Ok(BrokerKind::Oanda),
            "alpaca" => Ok(BrokerKind::Alpaca),
            other => Err(BrokerError::Configuration(format!(
                "Unsupported broker type: {}",
                other
            ))),
        }
    }
}

/// Market a user can state a preference for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Forex,
    Stocks,
}

impl FromStr for Market {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forex" | "fx" | "currencies" | "currency" => Ok(Market::Forex),
            "stocks" | "stock" | "equities" | "equity" => Ok(Market::Stocks),
            other => Err(BrokerError::Configuration(format!(
                "Unknown market preference: {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OandaEnvironment {
    #[default]
    Practice,
    Live,
}

/// Credentials as stored on the user's account. Shape depends on the broker.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "broker_type", rename_all = "lowercase")]
pub enum BrokerCredentials {
    Oanda {
        api_key: String,
        account_id: String,
        #[serde(default)]
        environment: OandaEnvironment,
    },
    Alpaca {
        api_key: String,
        api_secret: String,
        #[serde(default = "default_paper")]
        paper: bool,
    },
}

fn default_paper() -> bool {
    true
}

impl BrokerCredentials {
    pub fn kind(&self) -> BrokerKind {
        match self {
            BrokerCredentials::Oanda { .. } => BrokerKind::Oanda,
            BrokerCredentials::Alpaca { .. } => BrokerKind::Alpaca,
        }
    }

    pub fn validate(&self) -> BrokerResult<()> {
        let missing = match self {
            BrokerCredentials::Oanda {
                api_key,
                account_id,
                ..
            } => {
                if api_key.trim().is_empty() {
                    Some("OANDA api_key")
                } else if account_id.trim().is_empty() {
                    Some("OANDA account_id")
                } else {
                    None
                }
            }
            BrokerCredentials::Alpaca {
                api_key,
                api_secret,
                ..
            } => {
                if api_key.trim().is_empty() || api_secret.trim().is_empty() {
                    Some("Alpaca api_key and api_secret")
                } else {
                    None
                }
            }
        };

        match missing {
            Some(field) => Err(BrokerError::Configuration(format!("{} is required", field))),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerCredentials::Oanda {
                account_id,
                environment,
                ..
            } => f
                .debug_struct("Oanda")
                .field("api_key", &"***")
                .field("account_id", account_id)
                .field("environment", environment)
                .finish(),
            BrokerCredentials::Alpaca { paper, .. } => f
                .debug_struct("Alpaca")
                .field("api_key", &"***")
                .field("api_secret", &"***")
                .field("paper", paper)
                .finish(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    NotConfigured,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Applies the side to a magnitude: buys are positive, sells negative.
    pub fn signed(&self, magnitude: f64) -> f64 {
        match self {
            Side::Buy => magnitude,
            Side::Sell => -magnitude,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrderRequest {
    pub instrument: String,
    pub side: Side,
    /// Non-negative magnitude. Direction lives in `side`.
    pub size: f64,
    pub order_type: OrderType,
    /// Limit price for LIMIT, trigger price for STOP.
    pub price: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub trailing_stop_distance: Option<f64>,
}

impl NormalizedOrderRequest {
    pub fn market(instrument: impl Into<String>, side: Side, size: f64) -> Self {
        Self {
            instrument: instrument.into(),
            side,
            size,
            order_type: OrderType::Market,
            price: None,
            take_profit: None,
            stop_loss: None,
            trailing_stop_distance: None,
        }
    }

    pub fn validate(&self) -> BrokerResult<()> {
        if self.instrument.trim().is_empty() {
            return Err(BrokerError::Validation("instrument is required".into()));
        }
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(BrokerError::Validation(format!(
                "size must be a positive number, got {}",
                self.size
            )));
        }

        match (self.order_type, self.price) {
            (OrderType::Market, Some(_)) => {
                return Err(BrokerError::Validation(
                    "market orders do not take a price".into(),
                ))
            }
            (OrderType::Limit, None) => {
                return Err(BrokerError::Validation(
                    "limit orders require a price".into(),
                ))
            }
            (OrderType::Stop, None) => {
                return Err(BrokerError::Validation("stop orders require a price".into()))
            }
            _ => {}
        }

        let prices = [
            ("price", self.price),
            ("take_profit", self.take_profit),
            ("stop_loss", self.stop_loss),
            ("trailing_stop_distance", self.trailing_stop_distance),
        ];
        for (field, value) in prices {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(BrokerError::Validation(format!(
                        "{} must be positive, got {}",
                        field, v
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: f64,
    /// Margin available (OANDA) or buying power (Alpaca).
    pub margin_available: f64,
    pub open_position_count: u32,
    pub open_order_count: u32,
    pub unrealized_pl: f64,
    pub currency: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    /// Positive is long, negative is short.
    pub size: f64,
    pub current_price: Option<f64>,
    pub unrealized_pl: f64,
}

impl Position {
    pub fn side(&self) -> PositionSide {
        if self.size > 0.0 {
            PositionSide::Long
        } else if self.size < 0.0 {
            PositionSide::Short
        } else {
            PositionSide::Flat
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub instrument: String,
    /// Signed like [`Position::size`].
    pub filled_size: f64,
    pub timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// An open order or open trade at the brokerage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub instrument: String,
    pub size: f64,
    pub price: f64,
    pub timestamp: String,
}
