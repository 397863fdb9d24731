//! One broker registry per user.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::broker::traits::Connector;
use crate::broker::types::BrokerCredentials;
use crate::data::store::Store;
use crate::registry::BrokerRegistry;

pub type SharedRegistry = Arc<Mutex<BrokerRegistry>>;

pub struct SessionManager {
    sessions: DashMap<String, SharedRegistry>,
    connector: Arc<dyn Connector>,
    store: Arc<dyn Store>,
    status_ttl: Option<Duration>,
    default_brokers: Vec<BrokerCredentials>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<dyn Store>,
        status_ttl: Option<Duration>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            connector,
            store,
            status_ttl,
            default_brokers: Vec::new(),
        }
    }

    /// Credentials tried for users who have nothing saved.
    pub fn with_default_brokers(mut self, brokers: Vec<BrokerCredentials>) -> Self {
        self.default_brokers = brokers;
        self
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }

    /// The user's registry, rehydrated from saved configs on first use.
    pub async fn session(&self, user_id: &str) -> SharedRegistry {
        if let Some(existing) = self.sessions.get(user_id) {
            return existing.clone();
        }

        let mut registry = BrokerRegistry::new(self.connector.clone(), self.status_ttl);
        let restored = registry.rehydrate(&*self.store, user_id).await;
        let defaults = if restored == 0 {
            self.connect_default_brokers(&mut registry, user_id).await
        } else {
            0
        };
        info!(
            "[SESSION] Started session for {} ({} saved, {} default broker(s) connected)",
            user_id, restored, defaults
        );

        // Another request may have built the session while we were probing.
        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(registry)))
            .clone()
    }

    /// Adds every default broker. Returns how many connected.
    pub(crate) async fn connect_default_brokers(
        &self,
        registry: &mut BrokerRegistry,
        user_id: &str,
    ) -> usize {
        let mut connected = 0;
        for credentials in &self.default_brokers {
            let kind = credentials.kind();
            match registry.add(credentials.clone()).await {
                Ok(()) => connected += 1,
                Err(e) => warn!(
                    "[SESSION] Default broker {} failed for {}: {}",
                    kind, user_id, e
                ),
            }
        }
        connected
    }

    /// Tears the session down. Returns whether one existed.
    pub async fn end(&self, user_id: &str) -> bool {
        match self.sessions.remove(user_id) {
            Some((_, registry)) => {
                registry.lock().await.remove_all();
                info!("[SESSION] Ended session for {}", user_id);
                true
            }
            None => false,
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}
