use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BrokerResult;

use super::types::{
    AccountSnapshot, BrokerCredentials, BrokerKind, Candle, NormalizedOrderRequest, OrderResult,
    Position, Trade,
};

/// One brokerage behind the common operation set.
///
/// Every operation returns a [`BrokerResult`]; transport and brokerage
/// failures are converted before they leave the adapter.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    fn kind(&self) -> BrokerKind;

    /// Lightweight authenticated call. Expected failures yield `false`.
    async fn test_connection(&self) -> bool;

    async fn get_account_details(&self) -> BrokerResult<AccountSnapshot>;
    async fn get_positions(&self) -> BrokerResult<Vec<Position>>;

    /// Validates before any network call.
    async fn create_order(&self, order: NormalizedOrderRequest) -> BrokerResult<OrderResult>;

    /// Closes the whole position. `NotFound` when nothing is open.
    async fn close_position(&self, instrument: &str) -> BrokerResult<OrderResult>;

    /// `timeframe` is canonical (see [`super::timeframes`]).
    async fn get_candlestick_data(
        &self,
        instrument: &str,
        timeframe: &str,
        limit: u32,
    ) -> BrokerResult<Vec<Candle>>;

    /// Open orders/trades, not historical fills.
    async fn get_trades(&self) -> BrokerResult<Vec<Trade>>;
}

/// Builds adapters from credentials. Does not check reachability.
pub trait Connector: Send + Sync {
    fn connect(&self, credentials: BrokerCredentials) -> BrokerResult<Arc<dyn BrokerAdapter>>;
}
