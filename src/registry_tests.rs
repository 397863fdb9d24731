//! Unit tests for BrokerRegistry - connection lifecycle and selection.

#[cfg(test)]
mod registry_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::broker::mock::{test_credentials, MockAdapter, MockConnector};
    use crate::broker::types::{BrokerCredentials, BrokerKind, ConnectionStatus, Market};
    use crate::data::store::{BrokerConfigStore, InMemoryStore};
    use crate::error::BrokerError;
    use crate::registry::{message_hints, BrokerRegistry};

    fn connector(oanda_up: bool, alpaca_up: bool) -> Arc<MockConnector> {
        Arc::new(
            MockConnector::new()
                .with_adapter(MockAdapter::builder(BrokerKind::Oanda).reachable(oanda_up).build())
                .with_adapter(
                    MockAdapter::builder(BrokerKind::Alpaca)
                        .reachable(alpaca_up)
                        .build(),
                ),
        )
    }

    async fn registry_with(oanda_up: bool, alpaca_up: bool) -> (BrokerRegistry, Arc<MockConnector>) {
        let conn = connector(oanda_up, alpaca_up);
        let mut registry = BrokerRegistry::new(conn.clone(), None);
        let _ = registry.add(test_credentials(BrokerKind::Oanda)).await;
        let _ = registry.add(test_credentials(BrokerKind::Alpaca)).await;
        (registry, conn)
    }

    // ============= Add / Get Tests =============

    #[tokio::test]
    async fn test_add_reachable_connects() {
        let mut registry = BrokerRegistry::new(connector(true, true), None);
        assert_eq!(registry.status(BrokerKind::Oanda), ConnectionStatus::NotConfigured);

        registry.add(test_credentials(BrokerKind::Oanda)).await.unwrap();
        assert_eq!(registry.status(BrokerKind::Oanda), ConnectionStatus::Connected);
        assert_eq!(registry.current(), Some(BrokerKind::Oanda));
        assert_eq!(registry.list_active(), vec![BrokerKind::Oanda]);
    }

    #[tokio::test]
    async fn test_add_unreachable_is_not_retained() {
        for kind in BrokerKind::ALL {
            let mut registry = BrokerRegistry::new(connector(false, false), None);
            let err = registry.add(test_credentials(kind)).await.unwrap_err();
            assert_eq!(err.kind(), "connection_error");

            assert_eq!(registry.status(kind), ConnectionStatus::Error);
            assert!(registry.list_active().is_empty());
            assert!(matches!(
                registry.get(Some(kind)),
                Err(BrokerError::NotConnected { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_repeated_failed_adds_do_not_accumulate() {
        let mut registry = BrokerRegistry::new(connector(false, true), None);
        for _ in 0..3 {
            assert!(registry.add(test_credentials(BrokerKind::Oanda)).await.is_err());
        }
        assert!(registry.list_active().is_empty());
    }

    #[tokio::test]
    async fn test_add_invalid_credentials_fails_fast() {
        let conn = connector(true, true);
        let mut registry = BrokerRegistry::new(conn.clone(), None);
        let creds = BrokerCredentials::Alpaca {
            api_key: "".into(),
            api_secret: "".into(),
            paper: true,
        };
        let err = registry.add(creds).await.unwrap_err();
        assert!(matches!(err, BrokerError::Configuration(_)));
        assert_eq!(conn.connect_count(), 0);
        assert_eq!(conn.adapter(BrokerKind::Alpaca).unwrap().probe_count(), 0);
    }

    #[tokio::test]
    async fn test_get_returns_same_instance() {
        let (registry, conn) = registry_with(true, true).await;
        let connects = conn.connect_count();
        let a = registry.get(Some(BrokerKind::Oanda)).unwrap();
        let b = registry.get(Some(BrokerKind::Oanda)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let current = registry.get(None).unwrap();
        assert!(Arc::ptr_eq(&a, &current));
        assert_eq!(conn.connect_count(), connects);
    }

    #[tokio::test]
    async fn test_get_does_not_reconnect() {
        // No pre-built adapters: every connect builds a fresh instance.
        let conn = Arc::new(MockConnector::new());
        let mut registry = BrokerRegistry::new(conn.clone(), None);
        registry.add(test_credentials(BrokerKind::Alpaca)).await.unwrap();
        assert_eq!(conn.connect_count(), 1);

        let first = registry.get(Some(BrokerKind::Alpaca)).unwrap();
        for _ in 0..3 {
            let again = registry.get(Some(BrokerKind::Alpaca)).unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(conn.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_get_never_substitutes() {
        let (registry, _) = registry_with(true, false).await;
        assert!(matches!(
            registry.get(Some(BrokerKind::Alpaca)),
            Err(BrokerError::NotConnected {
                broker: BrokerKind::Alpaca
            })
        ));
    }

    #[tokio::test]
    async fn test_get_without_any_broker() {
        let registry = BrokerRegistry::new(connector(true, true), None);
        assert!(matches!(
            registry.get(None),
            Err(BrokerError::NoBrokerAvailable)
        ));
    }

    #[tokio::test]
    async fn test_set_current() {
        let (mut registry, _) = registry_with(true, false).await;
        assert!(registry.set_current(BrokerKind::Alpaca).is_err());
        assert_eq!(registry.current(), Some(BrokerKind::Oanda));

        let (mut registry, _) = registry_with(true, true).await;
        registry.set_current(BrokerKind::Alpaca).unwrap();
        assert_eq!(registry.get(None).unwrap().kind(), BrokerKind::Alpaca);
    }

    #[tokio::test]
    async fn test_remove_and_remove_all() {
        let (mut registry, _) = registry_with(true, true).await;
        registry.remove(BrokerKind::Oanda);
        assert_eq!(registry.status(BrokerKind::Oanda), ConnectionStatus::NotConfigured);
        assert_eq!(registry.current(), Some(BrokerKind::Alpaca));

        registry.remove_all();
        registry.remove_all();
        assert!(registry.list_active().is_empty());
        assert_eq!(registry.current(), None);
        for (_, status) in registry.statuses() {
            assert_eq!(status, ConnectionStatus::NotConfigured);
        }
    }

    // ============= Selection Policy Tests =============

    #[tokio::test]
    async fn test_explicit_beats_message_keyword() {
        let (registry, _) = registry_with(true, true).await;
        let kind = registry
            .select(Some(BrokerKind::Alpaca), None, Some("show my forex account"))
            .unwrap();
        assert_eq!(kind, BrokerKind::Alpaca);
    }

    #[tokio::test]
    async fn test_explicit_disconnected_is_error() {
        let (mut registry, conn) = registry_with(true, true).await;
        conn.adapter(BrokerKind::Alpaca).unwrap().set_reachable(false);
        registry.probe(BrokerKind::Alpaca).await;

        let err = registry
            .select(Some(BrokerKind::Alpaca), None, None)
            .unwrap_err();
        assert!(matches!(err, BrokerError::Disconnected { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_message_keyword_beats_preference() {
        let (registry, _) = registry_with(true, true).await;
        let kind = registry
            .select(None, Some(Market::Forex), Some("how many AAPL shares do I have"))
            .unwrap();
        assert_eq!(kind, BrokerKind::Alpaca);
    }

    #[tokio::test]
    async fn test_preference_beats_default() {
        let (registry, _) = registry_with(true, true).await;
        let kind = registry
            .select(None, Some(Market::Stocks), Some("what's my balance"))
            .unwrap();
        assert_eq!(kind, BrokerKind::Alpaca);
    }

    #[tokio::test]
    async fn test_default_is_first_registered() {
        let conn = connector(true, true);
        let mut registry = BrokerRegistry::new(conn, None);
        registry.add(test_credentials(BrokerKind::Alpaca)).await.unwrap();
        registry.add(test_credentials(BrokerKind::Oanda)).await.unwrap();
        assert_eq!(
            registry.select(None, None, Some("balance please")).unwrap(),
            BrokerKind::Alpaca
        );
    }

    #[tokio::test]
    async fn test_hint_for_unconnected_broker_falls_through() {
        let (registry, _) = registry_with(false, true).await;
        let kind = registry
            .select(None, None, Some("EUR/USD positions"))
            .unwrap();
        assert_eq!(kind, BrokerKind::Alpaca);
    }

    #[tokio::test]
    async fn test_select_with_nothing_connected() {
        let (registry, _) = registry_with(false, false).await;
        assert!(matches!(
            registry.select(None, Some(Market::Forex), Some("buy EUR/USD 100")),
            Err(BrokerError::NoBrokerAvailable)
        ));
    }

    #[test]
    fn test_message_hints() {
        assert_eq!(message_hints("buy EUR/USD"), vec![BrokerKind::Oanda]);
        assert_eq!(message_hints("NASDAQ stocks"), vec![BrokerKind::Alpaca]);
        assert_eq!(
            message_hints("forex or stocks?"),
            vec![BrokerKind::Oanda, BrokerKind::Alpaca]
        );
        assert!(message_hints("what's my balance").is_empty());
    }

    // ============= Status Refresh Tests =============

    #[tokio::test]
    async fn test_refresh_without_ttl_trusts_last_probe() {
        let (mut registry, conn) = registry_with(true, true).await;
        let oanda = conn.adapter(BrokerKind::Oanda).unwrap();
        let probes = oanda.probe_count();

        oanda.set_reachable(false);
        assert_eq!(
            registry.refresh(BrokerKind::Oanda).await,
            ConnectionStatus::Connected
        );
        assert_eq!(oanda.probe_count(), probes);
    }

    #[tokio::test]
    async fn test_refresh_with_expired_ttl_reprobes() {
        let conn = connector(true, true);
        let mut registry = BrokerRegistry::new(conn.clone(), Some(Duration::ZERO));
        registry.add(test_credentials(BrokerKind::Oanda)).await.unwrap();
        let oanda = conn.adapter(BrokerKind::Oanda).unwrap();

        oanda.set_reachable(false);
        assert_eq!(
            registry.refresh(BrokerKind::Oanda).await,
            ConnectionStatus::Disconnected
        );
        assert!(registry.available().is_empty());

        oanda.set_reachable(true);
        assert_eq!(
            registry.refresh(BrokerKind::Oanda).await,
            ConnectionStatus::Connected
        );
    }

    #[tokio::test]
    async fn test_probe_is_idempotent_for_reachable_broker() {
        let (mut registry, _) = registry_with(true, true).await;
        let first = registry.probe(BrokerKind::Alpaca).await;
        let second = registry.probe(BrokerKind::Alpaca).await;
        assert_eq!(first, second);
        assert_eq!(first, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_record_failure_only_for_link_errors() {
        let (mut registry, _) = registry_with(true, true).await;

        registry.record_failure(
            BrokerKind::Oanda,
            &BrokerError::Validation("bad order".into()),
        );
        assert_eq!(registry.status(BrokerKind::Oanda), ConnectionStatus::Connected);

        registry.record_failure(
            BrokerKind::Oanda,
            &BrokerError::Timeout {
                broker: BrokerKind::Oanda,
                secs: 10,
            },
        );
        assert_eq!(
            registry.status(BrokerKind::Oanda),
            ConnectionStatus::Disconnected
        );
        assert!(matches!(
            registry.get(Some(BrokerKind::Oanda)),
            Err(BrokerError::Disconnected { .. })
        ));
    }

    // ============= Rehydrate Tests =============

    #[tokio::test]
    async fn test_rehydrate_from_store() {
        let store = InMemoryStore::new();
        store
            .save_broker_config("u1", test_credentials(BrokerKind::Oanda))
            .await
            .unwrap();
        store
            .save_broker_config("u1", test_credentials(BrokerKind::Alpaca))
            .await
            .unwrap();

        let mut registry = BrokerRegistry::new(connector(true, false), None);
        let connected = registry.rehydrate(&store, "u1").await;
        assert_eq!(connected, 1);
        assert_eq!(registry.available(), vec![BrokerKind::Oanda]);
        assert_eq!(registry.status(BrokerKind::Alpaca), ConnectionStatus::Error);
    }
}
