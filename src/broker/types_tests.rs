//! Unit tests for broker types, credential validation and order validation.

#[cfg(test)]
mod types_tests {
    use crate::broker::types::*;
    use crate::error::BrokerError;

    // ============= BrokerKind Tests =============

    #[test]
    fn test_broker_kind_parse_and_display() {
        assert_eq!("oanda".parse::<BrokerKind>().unwrap(), BrokerKind::Oanda);
        assert_eq!(" Alpaca ".parse::<BrokerKind>().unwrap(), BrokerKind::Alpaca);
        assert_eq!(BrokerKind::Oanda.to_string(), "oanda");
        assert!(matches!(
            "binance".parse::<BrokerKind>(),
            Err(BrokerError::Configuration(_))
        ));
    }

    #[test]
    fn test_broker_kind_serde_lowercase() {
        let json = serde_json::to_string(&BrokerKind::Alpaca).unwrap();
        assert_eq!(json, "\"alpaca\"");
        let kind: BrokerKind = serde_json::from_str("\"oanda\"").unwrap();
        assert_eq!(kind, BrokerKind::Oanda);
    }

    #[test]
    fn test_broker_markets() {
        assert_eq!(BrokerKind::Oanda.markets(), &[Market::Forex]);
        assert_eq!(BrokerKind::Alpaca.markets(), &[Market::Stocks]);
    }

    #[test]
    fn test_market_aliases() {
        assert_eq!("forex".parse::<Market>().unwrap(), Market::Forex);
        assert_eq!("FX".parse::<Market>().unwrap(), Market::Forex);
        assert_eq!("equities".parse::<Market>().unwrap(), Market::Stocks);
        assert!("crypto".parse::<Market>().is_err());
    }

    // ============= Credentials Tests =============

    #[test]
    fn test_credentials_tagged_deserialize() {
        let json = r#"{"broker_type":"oanda","api_key":"k","account_id":"101-1"}"#;
        let creds: BrokerCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.kind(), BrokerKind::Oanda);
        match creds {
            BrokerCredentials::Oanda { environment, .. } => {
                assert_eq!(environment, OandaEnvironment::Practice)
            }
            _ => panic!("expected OANDA credentials"),
        }

        let json = r#"{"broker_type":"alpaca","api_key":"k","api_secret":"s"}"#;
        let creds: BrokerCredentials = serde_json::from_str(json).unwrap();
        match creds {
            BrokerCredentials::Alpaca { paper, .. } => assert!(paper),
            _ => panic!("expected Alpaca credentials"),
        }
    }

    #[test]
    fn test_credentials_validate_missing_fields() {
        let creds = BrokerCredentials::Oanda {
            api_key: "key".into(),
            account_id: "  ".into(),
            environment: OandaEnvironment::Practice,
        };
        let err = creds.validate().unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
        assert!(err.to_string().contains("account_id"));

        let creds = BrokerCredentials::Alpaca {
            api_key: "key".into(),
            api_secret: "".into(),
            paper: true,
        };
        assert!(creds.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = BrokerCredentials::Alpaca {
            api_key: "PKSECRETKEY".into(),
            api_secret: "verysecret".into(),
            paper: false,
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("PKSECRETKEY"));
        assert!(!printed.contains("verysecret"));
        assert!(printed.contains("paper: false"));
    }

    // ============= Order Validation Tests =============

    #[test]
    fn test_market_order_valid() {
        let order = NormalizedOrderRequest::market("EUR_USD", Side::Buy, 100.0);
        assert!(order.validate().is_ok());
    }

    #[test]
    fn test_limit_without_price_rejected() {
        let mut order = NormalizedOrderRequest::market("EUR_USD", Side::Buy, 100.0);
        order.order_type = OrderType::Limit;
        let err = order.validate().unwrap_err();
        assert!(matches!(err, BrokerError::Validation(_)));
    }

    #[test]
    fn test_stop_without_price_rejected() {
        let mut order = NormalizedOrderRequest::market("AAPL", Side::Sell, 5.0);
        order.order_type = OrderType::Stop;
        assert!(order.validate().is_err());
    }

    #[test]
    fn test_market_with_price_rejected() {
        let mut order = NormalizedOrderRequest::market("EUR_USD", Side::Buy, 100.0);
        order.price = Some(1.1);
        assert!(order.validate().is_err());
    }

    #[test]
    fn test_size_must_be_positive_magnitude() {
        let order = NormalizedOrderRequest::market("EUR_USD", Side::Sell, -100.0);
        assert!(order.validate().is_err());
        let order = NormalizedOrderRequest::market("EUR_USD", Side::Sell, f64::NAN);
        assert!(order.validate().is_err());
    }

    #[test]
    fn test_missing_instrument_rejected() {
        let order = NormalizedOrderRequest::market("", Side::Buy, 1.0);
        assert!(order.validate().unwrap_err().to_string().contains("instrument"));
    }

    #[test]
    fn test_negative_protective_price_rejected() {
        let mut order = NormalizedOrderRequest::market("EUR_USD", Side::Buy, 100.0);
        order.stop_loss = Some(-1.0);
        assert!(order.validate().is_err());
    }

    #[test]
    fn test_side_signed() {
        assert_eq!(Side::Buy.signed(10.0), 10.0);
        assert_eq!(Side::Sell.signed(10.0), -10.0);
    }

    #[test]
    fn test_position_side_from_signed_size() {
        let mut p = Position {
            instrument: "AAPL".into(),
            size: -50.0,
            current_price: Some(190.0),
            unrealized_pl: 12.5,
        };
        assert_eq!(p.side(), PositionSide::Short);
        p.size = 3.0;
        assert_eq!(p.side(), PositionSide::Long);
        p.size = 0.0;
        assert_eq!(p.side(), PositionSide::Flat);
    }

    #[test]
    fn test_connection_status_serde() {
        let json = serde_json::to_string(&ConnectionStatus::NotConfigured).unwrap();
        assert_eq!(json, "\"not_configured\"");
        assert!(ConnectionStatus::Connected.is_usable());
        assert!(!ConnectionStatus::Disconnected.is_usable());
    }
}
