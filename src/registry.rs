//! Per-session set of broker connections.
//!
//! A connection is kept only if its first probe succeeded. After that its
//! status moves between `connected` and `disconnected` as probes and calls
//! succeed or fail; removal drops it back to `not_configured`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::broker::traits::{BrokerAdapter, Connector};
use crate::broker::types::{BrokerCredentials, BrokerKind, ConnectionStatus, Market};
use crate::constants::instruments::{ALPACA_HINTS, OANDA_HINTS};
use crate::data::store::BrokerConfigStore;
use crate::error::{BrokerError, BrokerResult};
use crate::intent::{extract_instrument, extract_ticker};

/// Live pairing of credentials and the adapter built from them.
#[derive(Clone)]
pub struct BrokerConnection {
    pub kind: BrokerKind,
    pub credentials: BrokerCredentials,
    pub adapter: Arc<dyn BrokerAdapter>,
    pub status: ConnectionStatus,
    pub last_probe: Instant,
}

pub struct BrokerRegistry {
    connector: Arc<dyn Connector>,
    /// Registration order.
    connections: Vec<BrokerConnection>,
    /// Status of kinds whose last add failed. No adapter is kept for them.
    failed: HashMap<BrokerKind, ConnectionStatus>,
    current: Option<BrokerKind>,
    status_ttl: Option<Duration>,
}

impl BrokerRegistry {
    pub fn new(connector: Arc<dyn Connector>, status_ttl: Option<Duration>) -> Self {
        Self {
            connector,
            connections: Vec::new(),
            failed: HashMap::new(),
            current: None,
            status_ttl,
        }
    }

    /// Builds the adapter and probes it. The connection is stored only if
    /// the probe succeeds; a failed add replaces any previous connection of
    /// the same kind.
    pub async fn add(&mut self, credentials: BrokerCredentials) -> BrokerResult<()> {
        let kind = credentials.kind();
        info!("[REGISTRY] Connecting {} (status: connecting)", kind);

        let adapter = match self.connector.connect(credentials.clone()) {
            Ok(adapter) => adapter,
            Err(e) => {
                self.drop_connection(kind);
                self.failed.insert(kind, ConnectionStatus::Error);
                warn!("[REGISTRY] {} rejected before connecting: {}", kind, e);
                return Err(e);
            }
        };

        if !adapter.test_connection().await {
            self.drop_connection(kind);
            self.failed.insert(kind, ConnectionStatus::Error);
            warn!("[REGISTRY] ❌ {} failed its connection test", kind);
            return Err(BrokerError::Connection {
                broker: kind,
                message: "connection test failed".to_string(),
            });
        }

        let connection = BrokerConnection {
            kind,
            credentials,
            adapter,
            status: ConnectionStatus::Connected,
            last_probe: Instant::now(),
        };
        self.failed.remove(&kind);
        match self.connections.iter_mut().find(|c| c.kind == kind) {
            Some(existing) => *existing = connection,
            None => self.connections.push(connection),
        }
        if self.current.is_none() {
            self.current = Some(kind);
        }
        info!("[REGISTRY] ✅ {} connected", kind);
        Ok(())
    }

    /// The adapter for `kind`, or for the current broker when `kind` is
    /// `None`. Never substitutes another broker.
    pub fn get(&self, kind: Option<BrokerKind>) -> BrokerResult<Arc<dyn BrokerAdapter>> {
        let kind = match kind {
            Some(kind) => kind,
            None => self.current.ok_or(BrokerError::NoBrokerAvailable)?,
        };
        let conn = self.connection(kind)?;
        if conn.status.is_usable() {
            Ok(conn.adapter.clone())
        } else {
            Err(BrokerError::Disconnected { broker: kind })
        }
    }

    pub fn set_current(&mut self, kind: BrokerKind) -> BrokerResult<()> {
        let conn = self.connection(kind)?;
        if !conn.status.is_usable() {
            return Err(BrokerError::Disconnected { broker: kind });
        }
        self.current = Some(kind);
        Ok(())
    }

    pub fn current(&self) -> Option<BrokerKind> {
        self.current
    }

    pub fn status(&self, kind: BrokerKind) -> ConnectionStatus {
        self.connections
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.status)
            .or_else(|| self.failed.get(&kind).copied())
            .unwrap_or(ConnectionStatus::NotConfigured)
    }

    /// Status of every known broker kind.
    pub fn statuses(&self) -> Vec<(BrokerKind, ConnectionStatus)> {
        BrokerKind::ALL
            .iter()
            .map(|kind| (*kind, self.status(*kind)))
            .collect()
    }

    /// Registered kinds in registration order, whatever their status.
    pub fn list_active(&self) -> Vec<BrokerKind> {
        self.connections.iter().map(|c| c.kind).collect()
    }

    /// Connected kinds in registration order.
    pub fn available(&self) -> Vec<BrokerKind> {
        self.connections
            .iter()
            .filter(|c| c.status.is_usable())
            .map(|c| c.kind)
            .collect()
    }

    pub fn credentials(&self, kind: BrokerKind) -> Option<&BrokerCredentials> {
        self.connections
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| &c.credentials)
    }

    pub fn remove(&mut self, kind: BrokerKind) {
        self.drop_connection(kind);
        self.failed.remove(&kind);
        info!("[REGISTRY] {} removed", kind);
    }

    pub fn remove_all(&mut self) {
        self.connections.clear();
        self.failed.clear();
        self.current = None;
    }

    /// Resolves one broker for a request.
    ///
    /// Precedence: explicit choice, then broker keywords or instruments in
    /// the message, then the preferred market, then the first connected
    /// broker in registration order.
    pub fn select(
        &self,
        explicit: Option<BrokerKind>,
        preference: Option<Market>,
        message: Option<&str>,
    ) -> BrokerResult<BrokerKind> {
        if let Some(kind) = explicit {
            let conn = self.connection(kind)?;
            return if conn.status.is_usable() {
                Ok(kind)
            } else {
                Err(BrokerError::Disconnected { broker: kind })
            };
        }

        let available = self.available();
        if available.is_empty() {
            return Err(BrokerError::NoBrokerAvailable);
        }

        if let Some(message) = message {
            if let Some(kind) = message_hints(message)
                .into_iter()
                .find(|k| available.contains(k))
            {
                return Ok(kind);
            }
        }

        if let Some(market) = preference {
            if let Some(kind) = available
                .iter()
                .find(|k| k.markets().contains(&market))
            {
                return Ok(*kind);
            }
        }

        Ok(available[0])
    }

    /// Re-probes `kind` when its status is stale or not `connected`.
    pub async fn refresh(&mut self, kind: BrokerKind) -> ConnectionStatus {
        let Some(conn) = self.connections.iter().find(|c| c.kind == kind) else {
            return self.status(kind);
        };
        let stale = match self.status_ttl {
            Some(ttl) => conn.last_probe.elapsed() >= ttl,
            None => false,
        };
        if conn.status.is_usable() && !stale {
            return conn.status;
        }
        self.probe(kind).await
    }

    /// Probes `kind` now and records the result.
    pub async fn probe(&mut self, kind: BrokerKind) -> ConnectionStatus {
        let Some(adapter) = self
            .connections
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.adapter.clone())
        else {
            return self.status(kind);
        };

        let ok = adapter.test_connection().await;
        let Some(conn) = self.connections.iter_mut().find(|c| c.kind == kind) else {
            return ConnectionStatus::NotConfigured;
        };
        conn.last_probe = Instant::now();
        conn.status = if ok {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };
        if !ok {
            warn!("[REGISTRY] {} probe failed, marking disconnected", kind);
        }
        conn.status
    }

    pub async fn probe_all(&mut self) -> Vec<(BrokerKind, ConnectionStatus)> {
        for kind in self.list_active() {
            self.probe(kind).await;
        }
        self.statuses()
    }

    /// Feeds a failed call back into status. Only link failures count.
    pub fn record_failure(&mut self, kind: BrokerKind, err: &BrokerError) {
        if !err.is_connection_class() {
            return;
        }
        if let Some(conn) = self
            .connections
            .iter_mut()
            .find(|c| c.kind == kind && c.status == ConnectionStatus::Connected)
        {
            conn.status = ConnectionStatus::Disconnected;
            warn!("[REGISTRY] {} marked disconnected after: {}", kind, err);
        }
    }

    /// Adds every saved, active config for `user_id`. Returns how many
    /// connected.
    pub async fn rehydrate<S>(&mut self, store: &S, user_id: &str) -> usize
    where
        S: BrokerConfigStore + ?Sized,
    {
        let configs = match store.load_active_configs(user_id).await {
            Ok(configs) => configs,
            Err(e) => {
                warn!("[REGISTRY] Could not load saved brokers for {}: {}", user_id, e);
                return 0;
            }
        };

        let mut connected = 0;
        for credentials in configs {
            if self.add(credentials).await.is_ok() {
                connected += 1;
            }
        }
        info!(
            "[REGISTRY] Rehydrated {} broker(s) for {}",
            connected, user_id
        );
        connected
    }

    fn connection(&self, kind: BrokerKind) -> BrokerResult<&BrokerConnection> {
        self.connections
            .iter()
            .find(|c| c.kind == kind)
            .ok_or(BrokerError::NotConnected { broker: kind })
    }

    fn drop_connection(&mut self, kind: BrokerKind) {
        self.connections.retain(|c| c.kind != kind);
        if self.current == Some(kind) {
            self.current = self.available().first().copied();
        }
    }
}

/// Brokers the message points at, in [`BrokerKind::ALL`] order.
pub fn message_hints(message: &str) -> Vec<BrokerKind> {
    let lowered = message.to_lowercase();
    let forex = OANDA_HINTS.iter().any(|h| lowered.contains(h))
        || extract_instrument(message).is_some();
    let stocks = ALPACA_HINTS.iter().any(|h| lowered.contains(h))
        || extract_ticker(message).is_some();

    BrokerKind::ALL
        .iter()
        .copied()
        .filter(|kind| match kind {
            BrokerKind::Oanda => forex,
            BrokerKind::Alpaca => stocks,
        })
        .collect()
}
