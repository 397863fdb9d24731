//! Message classification and parameter extraction.
//!
//! Classification is a case-insensitive phrase scan over a fixed table.
//! The first intent with a matching phrase wins, so the order of
//! [`INTENT_PHRASES`] decides routing:
//!
//! 1. `close_position`
//! 2. `get_account_details`
//! 3. `get_positions`
//! 4. `get_trades`
//! 5. `get_candlestick_data`
//! 6. `create_order`
//!
//! `create_order` is last so that "buying power" reads as an account query
//! and "close my position" is not taken as an order. One exception: a
//! message with an order verb ("buy", "sell", "go long", "open a short")
//! and a quantity is an order even when it also names a read-only intent,
//! as in "sell 50 AAPL from my positions". Close phrases still win.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::broker::timeframes;
use crate::broker::types::{NormalizedOrderRequest, OrderType, Side};
use crate::constants::instruments::{EQUITY_TICKERS, FOREX_PAIRS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    ClosePosition,
    GetAccountDetails,
    GetPositions,
    GetTrades,
    GetCandlestickData,
    CreateOrder,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::ClosePosition => "close_position",
            IntentKind::GetAccountDetails => "get_account_details",
            IntentKind::GetPositions => "get_positions",
            IntentKind::GetTrades => "get_trades",
            IntentKind::GetCandlestickData => "get_candlestick_data",
            IntentKind::CreateOrder => "create_order",
        }
    }

    pub fn needs_instrument(&self) -> bool {
        matches!(
            self,
            IntentKind::ClosePosition | IntentKind::GetCandlestickData | IntentKind::CreateOrder
        )
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phrase table in match order. Phrases are lowercase.
pub const INTENT_PHRASES: &[(IntentKind, &[&str])] = &[
    (
        IntentKind::ClosePosition,
        &[
            "close position",
            "close my",
            "close the",
            "close out",
            "exit position",
            "exit my",
            "flatten",
        ],
    ),
    (
        IntentKind::GetAccountDetails,
        &[
            "account details",
            "account balance",
            "account summary",
            "account info",
            "my account",
            "get accounts",
            "list accounts",
            "balance",
            "buying power",
            "margin available",
            "how much money",
        ],
    ),
    (
        IntentKind::GetPositions,
        &[
            "positions",
            "my position",
            "open position",
            "holdings",
            "what am i holding",
            "exposure",
        ],
    ),
    (
        IntentKind::GetTrades,
        &[
            "trades",
            "open orders",
            "pending orders",
            "my orders",
            "trade history",
        ],
    ),
    (
        IntentKind::GetCandlestickData,
        &[
            "candlestick",
            "candles",
            "candle",
            "chart",
            "price history",
            "historical",
            "ohlc",
            "price action",
        ],
    ),
    (
        IntentKind::CreateOrder,
        &[
            "buy",
            "sell",
            "go long",
            "go short",
            "open a long",
            "open a short",
            "place order",
            "place an order",
            "create order",
            "new order",
            "market order",
            "limit order",
        ],
    ),
];

/// Words that make a message with a quantity an order regardless of table
/// order. Matched as whole words so "buying power" stays an account query.
const ORDER_VERBS: &[&str] = &["buy", "sell"];
const ORDER_VERB_PHRASES: &[&str] = &["go long", "go short", "open a long", "open a short"];

/// A classified message plus whatever parameters could be read from it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub instrument: Option<String>,
    pub timeframe: Option<String>,
    pub candle_limit: Option<u32>,
    /// Set for `create_order` when side, instrument and size were all found.
    pub order: Option<NormalizedOrderRequest>,
    /// Parameters the intent needs but the message did not carry.
    pub missing: Vec<&'static str>,
}

impl Intent {
    pub fn new(kind: IntentKind) -> Self {
        Self {
            kind,
            instrument: None,
            timeframe: None,
            candle_limit: None,
            order: None,
            missing: Vec::new(),
        }
    }
}

/// Partial order read from free text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderDraft {
    pub side: Option<Side>,
    pub instrument: Option<String>,
    pub size: Option<f64>,
    pub order_type: Option<OrderType>,
    pub price: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub trailing_stop_distance: Option<f64>,
}

impl OrderDraft {
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.side.is_none() {
            missing.push("side");
        }
        if self.instrument.is_none() {
            missing.push("instrument");
        }
        if self.size.is_none() {
            missing.push("size");
        }
        if matches!(self.order_type, Some(OrderType::Limit | OrderType::Stop)) && self.price.is_none()
        {
            missing.push("price");
        }
        missing
    }

    pub fn complete(self) -> Option<NormalizedOrderRequest> {
        if !self.missing().is_empty() {
            return None;
        }
        Some(NormalizedOrderRequest {
            instrument: self.instrument?,
            side: self.side?,
            size: self.size?,
            order_type: self.order_type.unwrap_or(OrderType::Market),
            price: self.price,
            take_profit: self.take_profit,
            stop_loss: self.stop_loss,
            trailing_stop_distance: self.trailing_stop_distance,
        })
    }
}

#[derive(Clone, Debug)]
pub struct IntentRouter {
    phrases: Vec<(IntentKind, Vec<String>)>,
}

impl Default for IntentRouter {
    fn default() -> Self {
        Self::with_phrases(INTENT_PHRASES)
    }
}

impl IntentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table order is match order.
    pub fn with_phrases(table: &[(IntentKind, &[&str])]) -> Self {
        let phrases = table
            .iter()
            .map(|(kind, list)| (*kind, list.iter().map(|p| p.to_lowercase()).collect()))
            .collect();
        Self { phrases }
    }

    pub fn classify(&self, message: &str) -> Option<IntentKind> {
        let lowered = message.to_lowercase();
        let matched = self
            .phrases
            .iter()
            .find(|(_, phrases)| phrases.iter().any(|p| lowered.contains(p.as_str())))
            .map(|(kind, _)| *kind);
        if matched != Some(IntentKind::ClosePosition) && is_sized_order(&lowered) {
            return Some(IntentKind::CreateOrder);
        }
        matched
    }

    /// Classifies and fills in the parameters the intent uses.
    pub fn route(&self, message: &str) -> Option<Intent> {
        let kind = self.classify(message)?;
        let mut intent = Intent::new(kind);
        intent.instrument = extract_instrument(message).or_else(|| extract_ticker(message));

        match kind {
            IntentKind::GetCandlestickData => {
                intent.timeframe = extract_timeframe(message).map(str::to_string);
                intent.candle_limit = extract_candle_limit(message);
            }
            IntentKind::CreateOrder => {
                let draft = parse_order_draft(message);
                intent.missing = draft.missing();
                intent.order = draft.complete();
            }
            _ => {}
        }
        if kind.needs_instrument()
            && intent.instrument.is_none()
            && !intent.missing.contains(&"instrument")
        {
            intent.missing.push("instrument");
        }

        debug!(
            "[ROUTER] '{}' -> {} (instrument: {:?})",
            message, kind, intent.instrument
        );
        Some(intent)
    }
}

/// Order verb plus a number anywhere in the message.
fn is_sized_order(lowered: &str) -> bool {
    let words = tokens(lowered);
    let has_verb = words.iter().any(|w| ORDER_VERBS.contains(&w.as_str()))
        || ORDER_VERB_PHRASES.iter().any(|p| lowered.contains(p));
    has_verb && words.iter().any(|w| number(w).is_some())
}

/// First known forex pair mentioned, in `XXX_YYY` form. Accepts the
/// underscore, slash, dash and run-together spellings.
pub fn extract_instrument(message: &str) -> Option<String> {
    let lowered = message.to_lowercase();
    FOREX_PAIRS
        .iter()
        .find(|pair| {
            let code = pair.to_lowercase();
            let (base, quote) = code.split_once('_').unwrap_or((code.as_str(), ""));
            [
                code.clone(),
                format!("{}/{}", base, quote),
                format!("{}-{}", base, quote),
                format!("{}{}", base, quote),
            ]
            .iter()
            .any(|spelling| lowered.contains(spelling.as_str()))
        })
        .map(|pair| pair.to_string())
}

/// First known equity ticker mentioned as a whole word.
pub fn extract_ticker(message: &str) -> Option<String> {
    let words: Vec<String> = message
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_uppercase())
        .collect();
    EQUITY_TICKERS
        .iter()
        .find(|ticker| words.iter().any(|w| w == *ticker))
        .map(|ticker| ticker.to_string())
}

/// Canonical timeframe named in the message ("1h", "4 hour", "daily").
pub fn extract_timeframe(message: &str) -> Option<&'static str> {
    let words = tokens(message);
    for (i, word) in words.iter().enumerate() {
        if let Some(next) = words.get(i + 1) {
            if let Some(tf) = timeframes::normalize(&format!("{}{}", word, next)) {
                return Some(tf);
            }
        }
        // A bare "d" is too likely to be noise ("I'd").
        if word.len() > 1 {
            if let Some(tf) = timeframes::normalize(word) {
                return Some(tf);
            }
        }
    }
    None
}

/// "last 50 candles" / "20 bars"
pub fn extract_candle_limit(message: &str) -> Option<u32> {
    let words = tokens(message);
    words.windows(2).find_map(|pair| {
        let unit = pair[1].as_str();
        if matches!(unit, "candles" | "candle" | "bars" | "bar") {
            number(&pair[0]).filter(|n| *n >= 1.0 && n.fract() == 0.0).map(|n| n as u32)
        } else {
            None
        }
    })
}

/// Complete order from the message, or `None` if side, instrument or size
/// is missing.
pub fn parse_order(message: &str) -> Option<NormalizedOrderRequest> {
    parse_order_draft(message).complete()
}

pub fn parse_order_draft(message: &str) -> OrderDraft {
    let words = tokens(message);
    let mut draft = OrderDraft {
        instrument: extract_instrument(message).or_else(|| extract_ticker(message)),
        ..OrderDraft::default()
    };
    let mut consumed = vec![false; words.len()];

    let mut i = 0;
    while i < words.len() {
        let word = words[i].as_str();
        let next = words.get(i + 1).map(String::as_str);
        match word {
            "buy" | "long" | "bought" if draft.side.is_none() => draft.side = Some(Side::Buy),
            "sell" | "short" | "sold" if draft.side.is_none() => draft.side = Some(Side::Sell),
            "take" if next == Some("profit") => {
                draft.take_profit = price_after(&words, i + 2, &mut consumed);
                i += 1;
            }
            "tp" => draft.take_profit = price_after(&words, i + 1, &mut consumed),
            "stop" if next == Some("loss") => {
                draft.stop_loss = price_after(&words, i + 2, &mut consumed);
                i += 1;
            }
            "sl" => draft.stop_loss = price_after(&words, i + 1, &mut consumed),
            "trailing" => {
                if next == Some("stop") {
                    i += 1;
                }
                draft.trailing_stop_distance = price_after(&words, i + 1, &mut consumed);
            }
            "limit" => {
                draft.order_type = Some(OrderType::Limit);
                draft.price = price_after(&words, i + 1, &mut consumed);
            }
            "stop" => {
                draft.order_type = Some(OrderType::Stop);
                draft.price = price_after(&words, i + 1, &mut consumed);
            }
            _ => {
                if draft.size.is_none() && !consumed[i] {
                    if let Some(n) = number(word) {
                        draft.size = Some(n);
                        consumed[i] = true;
                    }
                }
            }
        }
        i += 1;
    }
    draft
}

/// Number at `start`, skipping connective words ("at a price of", "@").
fn price_after(words: &[String], start: usize, consumed: &mut [bool]) -> Option<f64> {
    let mut j = start;
    while let Some(word) = words.get(j) {
        match word.as_str() {
            "at" | "@" | "a" | "an" | "price" | "of" | "order" | "distance" => j += 1,
            w => {
                let value = number(w)?;
                consumed[j] = true;
                return Some(value);
            }
        }
    }
    None
}

fn number(word: &str) -> Option<f64> {
    word.replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

fn tokens(message: &str) -> Vec<String> {
    message
        .to_lowercase()
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| {
                !(c.is_alphanumeric() || matches!(c, '.' | '_' | '/' | '-' | '@'))
            })
            .trim_end_matches('.')
            .to_string()
        })
        .filter(|w| !w.is_empty())
        .collect()
}
