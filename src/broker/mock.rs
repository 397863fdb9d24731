//! Mock broker for testing. Implements [`BrokerAdapter`] with canned data
//! and records every call that would have reached the network.
//!
//! ```ignore
//! use trading_pal::broker::mock::{MockAdapter, MockConnector};
//! use trading_pal::broker::types::BrokerKind;
//!
//! let oanda = MockAdapter::builder(BrokerKind::Oanda)
//!     .with_position("EUR_USD", 1000.0, 1.085)
//!     .build();
//! let connector = MockConnector::new().with_adapter(oanda);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{BrokerError, BrokerResult};

use super::traits::{BrokerAdapter, Connector};
use super::types::{
    AccountSnapshot, BrokerCredentials, BrokerKind, Candle, NormalizedOrderRequest, OrderResult,
    Position, Trade,
};

const MOCK_TIME: &str = "2025-01-01T00:00:00Z";

pub struct MockAdapterBuilder {
    kind: BrokerKind,
    reachable: bool,
    account: AccountSnapshot,
    positions: Vec<Position>,
    candles: Vec<Candle>,
    trades: Vec<Trade>,
    failure: Option<BrokerError>,
}

impl MockAdapterBuilder {
    pub fn reachable(mut self, reachable: bool) -> Self {
        self.reachable = reachable;
        self
    }

    pub fn with_account(mut self, account: AccountSnapshot) -> Self {
        self.account = account;
        self
    }

    pub fn with_position(mut self, instrument: &str, size: f64, current_price: f64) -> Self {
        self.positions.push(Position {
            instrument: instrument.to_string(),
            size,
            current_price: Some(current_price),
            unrealized_pl: 0.0,
        });
        self
    }

    pub fn with_candles(mut self, candles: Vec<Candle>) -> Self {
        self.candles = candles;
        self
    }

    pub fn with_trade(mut self, trade: Trade) -> Self {
        self.trades.push(trade);
        self
    }

    /// Every operation after the probe fails with `err`.
    pub fn failing_with(mut self, err: BrokerError) -> Self {
        self.failure = Some(err);
        self
    }

    pub fn build(self) -> MockAdapter {
        MockAdapter {
            kind: self.kind,
            reachable: AtomicBool::new(self.reachable),
            account: self.account,
            positions: Mutex::new(self.positions),
            candles: self.candles,
            trades: self.trades,
            failure: Mutex::new(self.failure),
            probes: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            orders: Mutex::new(Vec::new()),
            next_order_id: AtomicUsize::new(1),
        }
    }
}

pub struct MockAdapter {
    kind: BrokerKind,
    reachable: AtomicBool,
    account: AccountSnapshot,
    positions: Mutex<Vec<Position>>,
    candles: Vec<Candle>,
    trades: Vec<Trade>,
    failure: Mutex<Option<BrokerError>>,
    probes: AtomicUsize,
    calls: Mutex<Vec<String>>,
    orders: Mutex<Vec<NormalizedOrderRequest>>,
    next_order_id: AtomicUsize,
}

impl MockAdapter {
    pub fn builder(kind: BrokerKind) -> MockAdapterBuilder {
        MockAdapterBuilder {
            kind,
            reachable: true,
            account: AccountSnapshot {
                balance: 100_000.0,
                margin_available: 50_000.0,
                open_position_count: 0,
                open_order_count: 0,
                unrealized_pl: 0.0,
                currency: "USD".to_string(),
            },
            positions: Vec::new(),
            candles: Vec::new(),
            trades: Vec::new(),
            failure: None,
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_failure(&self, err: Option<BrokerError>) {
        *self.failure.lock().unwrap() = err;
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Operation names that would have hit the network, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submitted_orders(&self) -> Vec<NormalizedOrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    fn record(&self, op: &str) -> BrokerResult<()> {
        self.calls.lock().unwrap().push(op.to_string());
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn order_id(&self) -> String {
        format!("mock-{}", self.next_order_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl BrokerAdapter for MockAdapter {
    fn kind(&self) -> BrokerKind {
        self.kind
    }

    async fn test_connection(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }

    async fn get_account_details(&self) -> BrokerResult<AccountSnapshot> {
        self.record("get_account_details")?;
        let positions = self.positions.lock().unwrap();
        Ok(AccountSnapshot {
            open_position_count: positions.len() as u32,
            unrealized_pl: positions.iter().map(|p| p.unrealized_pl).sum(),
            ..self.account.clone()
        })
    }

    async fn get_positions(&self) -> BrokerResult<Vec<Position>> {
        self.record("get_positions")?;
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn create_order(&self, order: NormalizedOrderRequest) -> BrokerResult<OrderResult> {
        order.validate()?;
        self.record("create_order")?;
        let result = OrderResult {
            order_id: self.order_id(),
            instrument: order.instrument.clone(),
            filled_size: order.side.signed(order.size),
            timestamp: MOCK_TIME.to_string(),
        };
        self.orders.lock().unwrap().push(order);
        Ok(result)
    }

    async fn close_position(&self, instrument: &str) -> BrokerResult<OrderResult> {
        self.record("close_position")?;
        let mut positions = self.positions.lock().unwrap();
        let idx = positions
            .iter()
            .position(|p| p.instrument == instrument && p.size != 0.0)
            .ok_or_else(|| BrokerError::NotFound {
                broker: self.kind,
                what: format!("open position for {}", instrument),
            })?;
        let closed = positions.remove(idx);
        Ok(OrderResult {
            order_id: self.order_id(),
            instrument: closed.instrument,
            filled_size: -closed.size,
            timestamp: MOCK_TIME.to_string(),
        })
    }

    async fn get_candlestick_data(
        &self,
        _instrument: &str,
        _timeframe: &str,
        limit: u32,
    ) -> BrokerResult<Vec<Candle>> {
        self.record("get_candlestick_data")?;
        let skip = self.candles.len().saturating_sub(limit as usize);
        Ok(self.candles[skip..].to_vec())
    }

    async fn get_trades(&self) -> BrokerResult<Vec<Trade>> {
        self.record("get_trades")?;
        Ok(self.trades.clone())
    }
}

/// Hands out pre-built mocks by broker kind.
#[derive(Default)]
pub struct MockConnector {
    adapters: HashMap<BrokerKind, Arc<MockAdapter>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(mut self, adapter: MockAdapter) -> Self {
        self.adapters.insert(adapter.kind(), Arc::new(adapter));
        self
    }

    pub fn adapter(&self, kind: BrokerKind) -> Option<Arc<MockAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(&self, credentials: BrokerCredentials) -> BrokerResult<Arc<dyn BrokerAdapter>> {
        credentials.validate()?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        let kind = credentials.kind();
        match self.adapters.get(&kind) {
            Some(adapter) => Ok(adapter.clone()),
            None => Ok(Arc::new(MockAdapter::builder(kind).build())),
        }
    }
}

/// Credentials that pass validation, for tests.
pub fn test_credentials(kind: BrokerKind) -> BrokerCredentials {
    match kind {
        BrokerKind::Oanda => BrokerCredentials::Oanda {
            api_key: "test-oanda-key".to_string(),
            account_id: "101-001-0000000-001".to_string(),
            environment: Default::default(),
        },
        BrokerKind::Alpaca => BrokerCredentials::Alpaca {
            api_key: "test-alpaca-key".to_string(),
            api_secret: "test-alpaca-secret".to_string(),
            paper: true,
        },
    }
}
