use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use crate::{
    config::{AppConfig, BrokerEndpoints},
    error::{BrokerError, BrokerResult},
};

use super::{
    alpaca::AlpacaAdapter,
    http::RestClient,
    oanda::OandaAdapter,
    traits::{BrokerAdapter, Connector},
    types::{BrokerCredentials, BrokerKind, OandaEnvironment},
};

/// Builds REST adapters. All adapters share one HTTP connection pool.
#[derive(Clone)]
pub struct RestConnector {
    client: Client,
    endpoints: BrokerEndpoints,
    timeout: Duration,
}

impl RestConnector {
    pub fn new(endpoints: BrokerEndpoints, timeout: Duration) -> BrokerResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("trading_pal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BrokerError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoints,
            timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> BrokerResult<Self> {
        Self::new(config.endpoints.clone(), config.request_timeout())
    }

    fn rest(&self, kind: BrokerKind) -> RestClient {
        RestClient::new(self.client.clone(), kind, self.timeout)
    }
}

impl Connector for RestConnector {
    fn connect(&self, credentials: BrokerCredentials) -> BrokerResult<Arc<dyn BrokerAdapter>> {
        credentials.validate()?;

        match credentials {
            BrokerCredentials::Oanda {
                api_key,
                account_id,
                environment,
            } => {
                let base_url = match environment {
                    OandaEnvironment::Practice => self.endpoints.oanda_practice_url.clone(),
                    OandaEnvironment::Live => self.endpoints.oanda_live_url.clone(),
                };
                info!("[CONNECT] OANDA adapter ({:?}) -> {}", environment, base_url);
                Ok(Arc::new(OandaAdapter::new(
                    self.rest(BrokerKind::Oanda),
                    base_url,
                    api_key,
                    account_id,
                )))
            }
            BrokerCredentials::Alpaca {
                api_key,
                api_secret,
                paper,
            } => {
                let base_url = if paper {
                    self.endpoints.alpaca_paper_url.clone()
                } else {
                    self.endpoints.alpaca_live_url.clone()
                };
                info!("[CONNECT] Alpaca adapter (paper: {}) -> {}", paper, base_url);
                Ok(Arc::new(AlpacaAdapter::new(
                    self.rest(BrokerKind::Alpaca),
                    base_url,
                    self.endpoints.alpaca_data_url.clone(),
                    api_key,
                    api_secret,
                )))
            }
        }
    }
}
