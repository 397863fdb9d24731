//! OANDA v3 REST adapter (forex).

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::error::{BrokerError, BrokerResult};

use super::{
    http::{as_f64, as_string, not_found_on_404, require_f64, RestClient},
    timeframes,
    traits::BrokerAdapter,
    types::{
        AccountSnapshot, BrokerKind, Candle, NormalizedOrderRequest, OrderResult, OrderType,
        Position, Trade,
    },
};

/// Largest `count` the candles endpoint accepts.
const MAX_CANDLES: u32 = 5000;
/// Largest unit count an `f64` still holds exactly (2^53).
const MAX_UNITS: f64 = 9_007_199_254_740_992.0;

#[derive(Clone)]
pub struct OandaAdapter {
    rest: RestClient,
    base_url: String,
    api_key: String,
    account_id: String,
}

impl OandaAdapter {
    pub fn new(rest: RestClient, base_url: String, api_key: String, account_id: String) -> Self {
        Self {
            rest,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            account_id,
        }
    }

    fn account_url(&self, path: &str) -> String {
        format!("{}/v3/accounts/{}{}", self.base_url, self.account_id, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.api_key)
            .header("Accept-Datetime-Format", "RFC3339")
    }

    async fn get(&self, url: &str) -> BrokerResult<Value> {
        self.rest.send(self.authed(self.rest.http().get(url))).await
    }

    fn decode(&self, message: impl Into<String>) -> BrokerError {
        BrokerError::Decode {
            broker: BrokerKind::Oanda,
            message: message.into(),
        }
    }

    /// Result of a submitted order or a close, from the transaction set in the reply.
    fn order_outcome(&self, raw: &Value, fill_keys: &[&str], cancel_keys: &[&str]) -> BrokerResult<OrderResult> {
        for key in cancel_keys {
            if let Some(tx) = raw.get(*key) {
                let reason = tx
                    .get("reason")
                    .or_else(|| tx.get("rejectReason"))
                    .and_then(|r| r.as_str())
                    .unwrap_or("order cancelled")
                    .to_string();
                return Err(BrokerError::RemoteRejection {
                    broker: BrokerKind::Oanda,
                    status: None,
                    message: reason,
                });
            }
        }

        let fills: Vec<&Value> = fill_keys.iter().filter_map(|k| raw.get(*k)).collect();
        if let Some(first) = fills.first() {
            let filled_size = fills.iter().filter_map(|tx| as_f64(tx.get("units"))).sum();
            return Ok(OrderResult {
                order_id: as_string(first.get("id")).unwrap_or_else(|| "unknown".into()),
                instrument: as_string(first.get("instrument")).unwrap_or_default(),
                filled_size,
                timestamp: as_string(first.get("time")).unwrap_or_default(),
            });
        }

        // Pending LIMIT/STOP: accepted, nothing filled yet.
        if let Some(tx) = raw.get("orderCreateTransaction") {
            return Ok(OrderResult {
                order_id: as_string(tx.get("id")).unwrap_or_else(|| "unknown".into()),
                instrument: as_string(tx.get("instrument")).unwrap_or_default(),
                filled_size: 0.0,
                timestamp: as_string(tx.get("time")).unwrap_or_default(),
            });
        }

        Err(self.decode("response carried no order transaction"))
    }
}

/// Native order body for `POST /v3/accounts/{id}/orders`.
pub fn order_body(order: &NormalizedOrderRequest) -> BrokerResult<Value> {
    order.validate()?;
    if order.size.fract() != 0.0 {
        return Err(BrokerError::Validation(format!(
            "OANDA units must be whole numbers, got {}",
            order.size
        )));
    }
    if order.size > MAX_UNITS {
        return Err(BrokerError::Validation(format!(
            "OANDA units out of range: {}",
            order.size
        )));
    }

    let units = order.side.signed(order.size) as i64;
    let mut body = Map::new();
    let (type_, tif) = match order.order_type {
        OrderType::Market => ("MARKET", "FOK"),
        OrderType::Limit => ("LIMIT", "GTC"),
        OrderType::Stop => ("STOP", "GTC"),
    };
    body.insert("type".into(), json!(type_));
    body.insert("instrument".into(), json!(order.instrument));
    body.insert("units".into(), json!(units.to_string()));
    body.insert("timeInForce".into(), json!(tif));
    body.insert("positionFill".into(), json!("DEFAULT"));

    if let Some(price) = order.price {
        body.insert("price".into(), json!(price.to_string()));
    }
    if let Some(tp) = order.take_profit {
        body.insert(
            "takeProfitOnFill".into(),
            json!({ "price": tp.to_string(), "timeInForce": "GTC" }),
        );
    }
    if let Some(sl) = order.stop_loss {
        body.insert(
            "stopLossOnFill".into(),
            json!({ "price": sl.to_string(), "timeInForce": "GTC" }),
        );
    }
    if let Some(distance) = order.trailing_stop_distance {
        body.insert(
            "trailingStopLossOnFill".into(),
            json!({ "distance": distance.to_string() }),
        );
    }

    Ok(json!({ "order": Value::Object(body) }))
}

#[async_trait]
impl BrokerAdapter for OandaAdapter {
    fn kind(&self) -> BrokerKind {
        BrokerKind::Oanda
    }

    async fn test_connection(&self) -> bool {
        match self.get(&self.account_url("/summary")).await {
            Ok(_) => true,
            Err(e) => {
                warn!("[OANDA] Connection test failed: {}", e);
                false
            }
        }
    }

    async fn get_account_details(&self) -> BrokerResult<AccountSnapshot> {
        let raw = self.get(&self.account_url("/summary")).await?;
        let account = raw
            .get("account")
            .ok_or_else(|| self.decode("summary without 'account'"))?;

        Ok(AccountSnapshot {
            balance: require_f64(BrokerKind::Oanda, account, "balance")?,
            margin_available: as_f64(account.get("marginAvailable")).unwrap_or(0.0),
            open_position_count: as_f64(account.get("openPositionCount")).unwrap_or(0.0) as u32,
            open_order_count: as_f64(account.get("pendingOrderCount")).unwrap_or(0.0) as u32,
            unrealized_pl: as_f64(account.get("unrealizedPL")).unwrap_or(0.0),
            currency: as_string(account.get("currency")).unwrap_or_else(|| "USD".into()),
        })
    }

    async fn get_positions(&self) -> BrokerResult<Vec<Position>> {
        let raw = self.get(&self.account_url("/openPositions")).await?;
        let entries = raw
            .get("positions")
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        let mut out = Vec::with_capacity(entries.len());
        for p in entries {
            let instrument = as_string(p.get("instrument")).unwrap_or_default();
            // Hedged accounts can hold both legs at once.
            for leg in ["long", "short"] {
                let Some(side) = p.get(leg) else { continue };
                let units = as_f64(side.get("units")).unwrap_or(0.0);
                if units == 0.0 {
                    continue;
                }
                out.push(Position {
                    instrument: instrument.clone(),
                    size: units,
                    current_price: None,
                    unrealized_pl: as_f64(side.get("unrealizedPL")).unwrap_or(0.0),
                });
            }
        }
        Ok(out)
    }

    async fn create_order(&self, order: NormalizedOrderRequest) -> BrokerResult<OrderResult> {
        let body = order_body(&order)?;
        info!(
            "[OANDA] Submitting {:?} {:?} {} {}",
            order.order_type, order.side, order.size, order.instrument
        );

        let req = self.authed(self.rest.http().post(self.account_url("/orders"))).json(&body);
        let raw = self.rest.send(req).await?;
        self.order_outcome(
            &raw,
            &["orderFillTransaction"],
            &["orderCancelTransaction", "orderRejectTransaction"],
        )
    }

    async fn close_position(&self, instrument: &str) -> BrokerResult<OrderResult> {
        let what = format!("open position for {}", instrument);
        let raw = self
            .get(&self.account_url(&format!("/positions/{}", instrument)))
            .await
            .map_err(|e| not_found_on_404(e, &what))?;

        let position = raw.get("position").cloned().unwrap_or(Value::Null);
        let long_units = as_f64(position.pointer("/long/units")).unwrap_or(0.0);
        let short_units = as_f64(position.pointer("/short/units")).unwrap_or(0.0);

        let mut body = Map::new();
        if long_units != 0.0 {
            body.insert("longUnits".into(), json!("ALL"));
        }
        if short_units != 0.0 {
            body.insert("shortUnits".into(), json!("ALL"));
        }
        if body.is_empty() {
            return Err(BrokerError::NotFound {
                broker: BrokerKind::Oanda,
                what,
            });
        }

        info!("[OANDA] Closing position {}", instrument);
        let url = self.account_url(&format!("/positions/{}/close", instrument));
        let req = self.authed(self.rest.http().put(url)).json(&Value::Object(body));
        let raw = self.rest.send(req).await.map_err(|e| not_found_on_404(e, &what))?;
        self.order_outcome(
            &raw,
            &["longOrderFillTransaction", "shortOrderFillTransaction"],
            &["longOrderCancelTransaction", "shortOrderCancelTransaction"],
        )
    }

    async fn get_candlestick_data(
        &self,
        instrument: &str,
        timeframe: &str,
        limit: u32,
    ) -> BrokerResult<Vec<Candle>> {
        let granularity = timeframes::to_native(BrokerKind::Oanda, timeframe);
        let count = limit.clamp(1, MAX_CANDLES);
        let url = format!("{}/v3/instruments/{}/candles", self.base_url, instrument);
        let req = self.authed(self.rest.http().get(url)).query(&[
            ("granularity", granularity),
            ("count", count.to_string()),
            ("price", "M".to_string()),
        ]);
        let raw = self
            .rest
            .send(req)
            .await
            .map_err(|e| not_found_on_404(e, &format!("instrument {}", instrument)))?;

        let candles = raw
            .get("candles")
            .and_then(|c| c.as_array())
            .ok_or_else(|| self.decode("candles response without 'candles'"))?;

        candles
            .iter()
            .map(|c| {
                let mid = c
                    .get("mid")
                    .ok_or_else(|| self.decode("candle without midpoint prices"))?;
                Ok(Candle {
                    timestamp: as_string(c.get("time")).unwrap_or_default(),
                    open: require_f64(BrokerKind::Oanda, mid, "o")?,
                    high: require_f64(BrokerKind::Oanda, mid, "h")?,
                    low: require_f64(BrokerKind::Oanda, mid, "l")?,
                    close: require_f64(BrokerKind::Oanda, mid, "c")?,
                    volume: as_f64(c.get("volume")).unwrap_or(0.0),
                })
            })
            .collect()
    }

    async fn get_trades(&self) -> BrokerResult<Vec<Trade>> {
        let raw = self.get(&self.account_url("/openTrades")).await?;
        let trades = raw
            .get("trades")
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(trades
            .iter()
            .map(|t| Trade {
                id: as_string(t.get("id")).unwrap_or_default(),
                instrument: as_string(t.get("instrument")).unwrap_or_default(),
                size: as_f64(t.get("currentUnits")).unwrap_or(0.0),
                price: as_f64(t.get("price")).unwrap_or(0.0),
                timestamp: as_string(t.get("openTime")).unwrap_or_default(),
            })
            .collect())
    }
}
