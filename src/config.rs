use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::broker::types::BrokerCredentials;
use crate::constants::{endpoints, trading};
use crate::error::ConfigError;

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: default_model(),
        }
    }
}

/// Brokerage base URLs. Overridable for sandboxes and tests.
#[derive(Clone, Debug, Deserialize)]
pub struct BrokerEndpoints {
    #[serde(default = "default_oanda_practice")]
    pub oanda_practice_url: String,
    #[serde(default = "default_oanda_live")]
    pub oanda_live_url: String,
    #[serde(default = "default_alpaca_paper")]
    pub alpaca_paper_url: String,
    #[serde(default = "default_alpaca_live")]
    pub alpaca_live_url: String,
    #[serde(default = "default_alpaca_data")]
    pub alpaca_data_url: String,
}

impl Default for BrokerEndpoints {
    fn default() -> Self {
        Self {
            oanda_practice_url: default_oanda_practice(),
            oanda_live_url: default_oanda_live(),
            alpaca_paper_url: default_alpaca_paper(),
            alpaca_live_url: default_alpaca_live(),
            alpaca_data_url: default_alpaca_data(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub endpoints: BrokerEndpoints,

    /// Timeout applied to every brokerage HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Deadline for one whole adapter operation inside a dispatch.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// How long a `connected` status is trusted before re-probing.
    /// Unset means the status from the last probe is kept.
    #[serde(default)]
    pub status_ttl_secs: Option<u64>,

    #[serde(default = "default_timeframe")]
    pub default_timeframe: String,
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,

    /// Credentials used for users with nothing saved yet.
    #[serde(default)]
    pub default_brokers: Vec<BrokerCredentials>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            endpoints: BrokerEndpoints::default(),
            request_timeout_secs: default_request_timeout_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            status_ttl_secs: None,
            default_timeframe: default_timeframe(),
            candle_limit: default_candle_limit(),
            default_brokers: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Secrets from the environment win over the file.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("LLM_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let urls = [
            ("endpoints.oanda_practice_url", &self.endpoints.oanda_practice_url),
            ("endpoints.oanda_live_url", &self.endpoints.oanda_live_url),
            ("endpoints.alpaca_paper_url", &self.endpoints.alpaca_paper_url),
            ("endpoints.alpaca_live_url", &self.endpoints.alpaca_live_url),
            ("endpoints.alpaca_data_url", &self.endpoints.alpaca_data_url),
        ];
        for (field, value) in urls {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidUrl {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn status_ttl(&self) -> Option<Duration> {
        self.status_ttl_secs.map(Duration::from_secs)
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_oanda_practice() -> String {
    endpoints::OANDA_PRACTICE_URL.to_string()
}

fn default_oanda_live() -> String {
    endpoints::OANDA_LIVE_URL.to_string()
}

fn default_alpaca_paper() -> String {
    endpoints::ALPACA_PAPER_URL.to_string()
}

fn default_alpaca_live() -> String {
    endpoints::ALPACA_LIVE_URL.to_string()
}

fn default_alpaca_data() -> String {
    endpoints::ALPACA_DATA_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    trading::DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_timeframe() -> String {
    crate::broker::timeframes::DEFAULT_TIMEFRAME.to_string()
}

fn default_candle_limit() -> u32 {
    crate::broker::timeframes::DEFAULT_CANDLE_LIMIT
}
