use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trading_pal::api::{run_server, AppState};
use trading_pal::broker::RestConnector;
use trading_pal::config::AppConfig;
use trading_pal::data::store::{InMemoryStore, Store};
use trading_pal::dispatch::RequestDispatcher;
use trading_pal::error::ConfigError;
use trading_pal::intent::IntentRouter;
use trading_pal::llm::{LLMClient, Narrator, OfflineNarrator};
use trading_pal::session::SessionManager;

const CONFIG_PATH: &str = "config.yaml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    // Setup Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Trading Pal...");

    // Load Configuration
    let config = match AppConfig::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(ConfigError::Read { .. }) => {
            warn!("⚠️ {} not found, using defaults", CONFIG_PATH);
            let mut config = AppConfig::default();
            config.apply_env();
            config
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        "Loaded Configuration (bind: {}, model: {}, default brokers: {})",
        config.server.bind_addr,
        config.llm.model,
        config.default_brokers.len()
    );

    let connector = Arc::new(RestConnector::from_config(&config)?);
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let sessions = SessionManager::new(connector, store.clone(), config.status_ttl())
        .with_default_brokers(config.default_brokers.clone());

    let narrator: Arc<dyn Narrator> = match LLMClient::from_config(&config.llm) {
        Some(client) => {
            info!("🤖 Using LLM Model: {}", client.model);
            if let Some(url) = &config.llm.base_url {
                info!("Using Custom OpenAI Base URL: {}", url);
            }
            Arc::new(client)
        }
        None => {
            warn!("⚠️ No LLM API key set, replies will be plain text");
            Arc::new(OfflineNarrator)
        }
    };

    let app_state = Arc::new(AppState {
        sessions,
        store,
        router: IntentRouter::new(),
        dispatcher: RequestDispatcher::from_config(&config),
        narrator,
        config,
    });

    info!("Initializing API Server...");
    run_server(app_state).await?;

    Ok(())
}
