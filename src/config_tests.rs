//! Unit tests for configuration structures and parsing.

#[cfg(test)]
mod config_tests {
    use std::time::Duration;

    use crate::broker::types::{BrokerCredentials, BrokerKind, OandaEnvironment};
    use crate::config::*;
    use crate::constants::endpoints;
    use crate::error::ConfigError;

    // ============= Defaults Tests =============

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.endpoints.oanda_practice_url, endpoints::OANDA_PRACTICE_URL);
        assert_eq!(config.endpoints.alpaca_data_url, endpoints::ALPACA_DATA_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.status_ttl(), None);
        assert_eq!(config.default_timeframe, "M1");
        assert_eq!(config.candle_limit, 100);
        assert!(config.default_brokers.is_empty());
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.candle_limit, 100);
    }

    // ============= Parsing Tests =============

    #[test]
    fn test_app_config_deserialize() {
        let yaml = r#"
server:
  bind_addr: "127.0.0.1:8080"
llm:
  model: "gpt-4o"
  base_url: "http://localhost:11434/v1"
endpoints:
  oanda_practice_url: "http://127.0.0.1:9001"
request_timeout_secs: 5
call_timeout_secs: 12
status_ttl_secs: 60
default_timeframe: "M15"
candle_limit: 250
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.base_url.as_deref(), Some("http://localhost:11434/v1"));
        assert_eq!(config.endpoints.oanda_practice_url, "http://127.0.0.1:9001");
        // Unset endpoints keep their defaults
        assert_eq!(config.endpoints.alpaca_paper_url, endpoints::ALPACA_PAPER_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.call_timeout(), Duration::from_secs(12));
        assert_eq!(config.status_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(config.default_timeframe, "M15");
        assert_eq!(config.candle_limit, 250);
    }

    #[test]
    fn test_strips_bom() {
        let yaml = "\u{feff}candle_limit: 42\n";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.candle_limit, 42);
    }

    #[test]
    fn test_invalid_endpoint_url_rejected() {
        let yaml = r#"
endpoints:
  alpaca_live_url: "not a url"
"#;
        match AppConfig::from_yaml(yaml) {
            Err(ConfigError::InvalidUrl { field, value }) => {
                assert_eq!(field, "endpoints.alpaca_live_url");
                assert_eq!(value, "not a url");
            }
            other => panic!("expected InvalidUrl, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let result = AppConfig::from_yaml("candle_limit: [1, 2");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_default_brokers_are_tagged() {
        let yaml = r#"
default_brokers:
  - broker_type: oanda
    api_key: "oanda-key"
    account_id: "101-001-1234567-001"
  - broker_type: alpaca
    api_key: "PKTEST"
    api_secret: "secret"
    paper: false
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.default_brokers.len(), 2);

        match &config.default_brokers[0] {
            BrokerCredentials::Oanda { environment, .. } => {
                assert_eq!(*environment, OandaEnvironment::Practice)
            }
            other => panic!("expected oanda, got {:?}", other),
        }
        assert_eq!(config.default_brokers[1].kind(), BrokerKind::Alpaca);
        assert!(matches!(
            config.default_brokers[1],
            BrokerCredentials::Alpaca { paper: false, .. }
        ));
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let result = AppConfig::load("/nonexistent/trading_pal/config.yaml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
