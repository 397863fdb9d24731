//! Candle granularity tables.
//!
//! Canonical timeframes follow OANDA's vocabulary. Each broker maps them
//! through a static table; values missing from a table pass through as-is.
//!
//! | canonical | OANDA | Alpaca |
//! |-----------|-------|--------|
//! | M1        | M1    | 1Min   |
//! | M5        | M5    | 5Min   |
//! | M15       | M15   | 15Min  |
//! | M30       | M30   | 30Min  |
//! | H1        | H1    | 1Hour  |
//! | H4        | H4    | 4Hour  |
//! | D         | D     | 1Day   |

use super::types::BrokerKind;

pub const DEFAULT_TIMEFRAME: &str = "M1";
pub const DEFAULT_CANDLE_LIMIT: u32 = 100;

pub const OANDA_GRANULARITY: &[(&str, &str)] = &[
    ("M1", "M1"),
    ("M5", "M5"),
    ("M15", "M15"),
    ("M30", "M30"),
    ("H1", "H1"),
    ("H4", "H4"),
    ("D", "D"),
];

pub const ALPACA_GRANULARITY: &[(&str, &str)] = &[
    ("M1", "1Min"),
    ("M5", "5Min"),
    ("M15", "15Min"),
    ("M30", "30Min"),
    ("H1", "1Hour"),
    ("H4", "4Hour"),
    ("D", "1Day"),
];

/// Loose spellings users type, keyed lowercase.
const ALIASES: &[(&str, &str)] = &[
    ("1m", "M1"),
    ("m1", "M1"),
    ("1min", "M1"),
    ("minute", "M1"),
    ("5m", "M5"),
    ("m5", "M5"),
    ("5min", "M5"),
    ("15m", "M15"),
    ("m15", "M15"),
    ("15min", "M15"),
    ("30m", "M30"),
    ("m30", "M30"),
    ("30min", "M30"),
    ("1h", "H1"),
    ("h1", "H1"),
    ("hour", "H1"),
    ("hourly", "H1"),
    ("1hour", "H1"),
    ("4h", "H4"),
    ("h4", "H4"),
    ("4hour", "H4"),
    ("1d", "D"),
    ("d1", "D"),
    ("d", "D"),
    ("day", "D"),
    ("daily", "D"),
    ("1day", "D"),
];

pub fn table(kind: BrokerKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        BrokerKind::Oanda => OANDA_GRANULARITY,
        BrokerKind::Alpaca => ALPACA_GRANULARITY,
    }
}

/// Canonical timeframe to the broker's native value. Unknown values pass through.
pub fn to_native(kind: BrokerKind, canonical: &str) -> String {
    table(kind)
        .iter()
        .find(|(c, _)| *c == canonical)
        .map(|(_, native)| native.to_string())
        .unwrap_or_else(|| canonical.to_string())
}

/// Native value back to canonical, if the table knows it.
pub fn from_native(kind: BrokerKind, native: &str) -> Option<&'static str> {
    table(kind)
        .iter()
        .find(|(_, n)| *n == native)
        .map(|(canonical, _)| *canonical)
}

/// Accepts a canonical value or a loose alias ("1h", "daily").
pub fn normalize(input: &str) -> Option<&'static str> {
    let trimmed = input.trim();
    if let Some((canonical, _)) = OANDA_GRANULARITY.iter().find(|(c, _)| *c == trimmed) {
        return Some(*canonical);
    }
    let lowered = trimmed.to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, canonical)| *canonical)
}
