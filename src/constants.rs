//! Application-wide constants
//!
//! Brokerage endpoints, the instrument vocabulary the router recognizes and
//! the keyword hints used for broker selection.

/// Brokerage REST endpoints
pub mod endpoints {
    pub const OANDA_PRACTICE_URL: &str = "https://api-fxpractice.oanda.com";
    pub const OANDA_LIVE_URL: &str = "https://api-fxtrade.oanda.com";

    pub const ALPACA_PAPER_URL: &str = "https://paper-api.alpaca.markets";
    pub const ALPACA_LIVE_URL: &str = "https://api.alpaca.markets";
    pub const ALPACA_DATA_URL: &str = "https://data.alpaca.markets";
}

/// Trading and brokerage constants
pub mod trading {
    /// Alpaca's insufficient balance error code
    pub const ALPACA_INSUFFICIENT_BALANCE_CODE: &str = "40310000";

    /// Default per-call timeout for brokerage requests
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
}

/// Instruments and hint words the router knows about
pub mod instruments {
    /// Forex pairs in canonical `XXX_YYY` form. Scan order is significant.
    pub const FOREX_PAIRS: &[&str] = &[
        "EUR_USD", "GBP_USD", "USD_JPY", "AUD_USD", "USD_CAD", "USD_CHF", "NZD_USD", "EUR_GBP",
        "EUR_JPY", "GBP_JPY",
    ];

    /// Equity tickers matched as whole words.
    pub const EQUITY_TICKERS: &[&str] = &[
        "AAPL", "MSFT", "TSLA", "AMZN", "GOOGL", "NVDA", "META", "NFLX", "AMD", "SPY", "QQQ",
    ];

    pub const OANDA_HINTS: &[&str] = &[
        "forex", "currency", "currencies", "oanda", "pips", "cable",
    ];

    pub const ALPACA_HINTS: &[&str] = &[
        "stock", "shares", "equities", "equity", "nasdaq", "nyse", "alpaca", "s&p",
    ];
}

/// Conversation/narration constants
pub mod chat {
    pub const SYSTEM_PROMPT: &str =
        "You are Trading Pal 1.0, a sophisticated AI trading assistant.";

    /// How far back conversation history is served
    pub const HISTORY_DAYS: i64 = 30;

    pub const NARRATION_FALLBACK: &str =
        "Sorry, I encountered an error processing your request.";
}
