//! Persistence seams and the in-memory store behind them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::types::{BrokerCredentials, BrokerKind, Market};
use crate::error::StoreError;
use crate::intent::IntentKind;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub response: String,
    pub intent: Option<IntentKind>,
    pub broker_used: Option<BrokerKind>,
    pub timestamp: DateTime<Utc>,
}

impl Conversation {
    pub fn new(user_id: &str, message: &str, response: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            response: response.to_string(),
            intent: None,
            broker_used: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SavedBrokerConfig {
    pub id: String,
    pub credentials: BrokerCredentials,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait BrokerConfigStore: Send + Sync {
    /// Saves credentials for the user, replacing any config of the same
    /// broker kind. Returns the config id.
    async fn save_broker_config(
        &self,
        user_id: &str,
        credentials: BrokerCredentials,
    ) -> StoreResult<String>;

    async fn load_active_configs(&self, user_id: &str) -> StoreResult<Vec<BrokerCredentials>>;

    /// `false` when there was no active config to deactivate.
    async fn deactivate_broker_config(&self, user_id: &str, kind: BrokerKind)
        -> StoreResult<bool>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn preferred_market(&self, user_id: &str) -> StoreResult<Option<Market>>;
    async fn set_preferred_market(&self, user_id: &str, market: Market) -> StoreResult<()>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save_conversation(&self, conversation: Conversation) -> StoreResult<String>;

    /// Oldest first.
    async fn conversation_history(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Conversation>>;

    async fn delete_conversation(&self, user_id: &str, id: &str) -> StoreResult<()>;

    async fn update_conversation(
        &self,
        user_id: &str,
        id: &str,
        message: Option<String>,
        response: Option<String>,
    ) -> StoreResult<Conversation>;
}

/// Everything the service persists, in one place.
pub trait Store: BrokerConfigStore + PreferenceStore + ConversationStore {}

impl<T: BrokerConfigStore + PreferenceStore + ConversationStore> Store for T {}

#[derive(Default)]
pub struct InMemoryStore {
    broker_configs: DashMap<String, Vec<SavedBrokerConfig>>,
    preferences: DashMap<String, Market>,
    conversations: DashMap<String, Conversation>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BrokerConfigStore for InMemoryStore {
    async fn save_broker_config(
        &self,
        user_id: &str,
        credentials: BrokerCredentials,
    ) -> StoreResult<String> {
        let kind = credentials.kind();
        let mut configs = self.broker_configs.entry(user_id.to_string()).or_default();
        configs.retain(|c| c.credentials.kind() != kind);

        let id = Uuid::new_v4().to_string();
        configs.push(SavedBrokerConfig {
            id: id.clone(),
            credentials,
            is_active: true,
            updated_at: Utc::now(),
        });
        Ok(id)
    }

    async fn load_active_configs(&self, user_id: &str) -> StoreResult<Vec<BrokerCredentials>> {
        Ok(self
            .broker_configs
            .get(user_id)
            .map(|configs| {
                configs
                    .iter()
                    .filter(|c| c.is_active)
                    .map(|c| c.credentials.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn deactivate_broker_config(
        &self,
        user_id: &str,
        kind: BrokerKind,
    ) -> StoreResult<bool> {
        let Some(mut configs) = self.broker_configs.get_mut(user_id) else {
            return Ok(false);
        };
        let mut changed = false;
        for config in configs
            .iter_mut()
            .filter(|c| c.is_active && c.credentials.kind() == kind)
        {
            config.is_active = false;
            config.updated_at = Utc::now();
            changed = true;
        }
        Ok(changed)
    }
}

#[async_trait]
impl PreferenceStore for InMemoryStore {
    async fn preferred_market(&self, user_id: &str) -> StoreResult<Option<Market>> {
        Ok(self.preferences.get(user_id).map(|m| *m))
    }

    async fn set_preferred_market(&self, user_id: &str, market: Market) -> StoreResult<()> {
        self.preferences.insert(user_id.to_string(), market);
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn save_conversation(&self, conversation: Conversation) -> StoreResult<String> {
        let id = conversation.id.clone();
        self.conversations.insert(id.clone(), conversation);
        Ok(id)
    }

    async fn conversation_history(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Conversation>> {
        let mut history: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| c.user_id == user_id && c.timestamp >= since)
            .map(|c| c.value().clone())
            .collect();
        history.sort_by_key(|c| c.timestamp);
        Ok(history)
    }

    async fn delete_conversation(&self, user_id: &str, id: &str) -> StoreResult<()> {
        self.conversations
            .remove_if(id, |_, c| c.user_id == user_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                what: format!("conversation {}", id),
            })
    }

    async fn update_conversation(
        &self,
        user_id: &str,
        id: &str,
        message: Option<String>,
        response: Option<String>,
    ) -> StoreResult<Conversation> {
        let mut entry = self
            .conversations
            .get_mut(id)
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound {
                what: format!("conversation {}", id),
            })?;
        if let Some(message) = message {
            entry.message = message;
        }
        if let Some(response) = response {
            entry.response = response;
        }
        Ok(entry.clone())
    }
}
