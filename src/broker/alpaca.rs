//! Alpaca v2 REST adapter (US equities).

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{BrokerError, BrokerResult};

use super::{
    http::{as_f64, as_string, not_found_on_404, require_f64, RestClient},
    timeframes,
    traits::BrokerAdapter,
    types::{
        AccountSnapshot, BrokerKind, Candle, NormalizedOrderRequest, OrderResult, OrderType,
        Position, Side, Trade,
    },
};

const MAX_BARS: u32 = 10_000;

#[derive(Serialize, Debug, PartialEq)]
pub struct AlpacaOrderRequest {
    pub symbol: String,
    pub qty: String,
    pub side: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub time_in_force: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<TakeProfitLeg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<StopLossLeg>,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct TakeProfitLeg {
    pub limit_price: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct StopLossLeg {
    pub stop_price: String,
}

/// `EUR_USD` style codes lose their separator; tickers pass through.
pub fn to_alpaca_symbol(instrument: &str) -> String {
    instrument.replace('_', "").to_uppercase()
}

impl AlpacaOrderRequest {
    pub fn from_normalized(order: &NormalizedOrderRequest) -> BrokerResult<Self> {
        order.validate()?;
        if order.trailing_stop_distance.is_some() {
            return Err(BrokerError::Validation(
                "Alpaca does not support trailing stops attached on fill".into(),
            ));
        }

        let side = match order.side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        let (type_, limit_price, stop_price) = match order.order_type {
            OrderType::Market => ("market", None, None),
            OrderType::Limit => ("limit", order.price.map(|p| p.to_string()), None),
            OrderType::Stop => ("stop", None, order.price.map(|p| p.to_string())),
        };
        let order_class = match (order.take_profit, order.stop_loss) {
            (Some(_), Some(_)) => Some("bracket".to_string()),
            (Some(_), None) | (None, Some(_)) => Some("oto".to_string()),
            (None, None) => None,
        };

        Ok(Self {
            symbol: to_alpaca_symbol(&order.instrument),
            qty: order.size.to_string(),
            side: side.to_string(),
            type_: type_.to_string(),
            time_in_force: "day".to_string(),
            limit_price,
            stop_price,
            order_class,
            take_profit: order.take_profit.map(|p| TakeProfitLeg {
                limit_price: p.to_string(),
            }),
            stop_loss: order.stop_loss.map(|p| StopLossLeg {
                stop_price: p.to_string(),
            }),
        })
    }
}

#[derive(Clone)]
pub struct AlpacaAdapter {
    rest: RestClient,
    base_url: String,
    data_url: String,
    api_key: String,
    api_secret: String,
}

impl AlpacaAdapter {
    pub fn new(
        rest: RestClient,
        base_url: String,
        data_url: String,
        api_key: String,
        api_secret: String,
    ) -> Self {
        Self {
            rest,
            base_url: base_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
        }
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }

    async fn get(&self, path: &str) -> BrokerResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        self.rest.send(self.authed(self.rest.http().get(url))).await
    }

    async fn get_array(&self, path: &str) -> BrokerResult<Vec<Value>> {
        match self.get(path).await? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(BrokerError::Decode {
                broker: BrokerKind::Alpaca,
                message: format!("expected a list from {}, got {}", path, other),
            }),
        }
    }

    async fn open_orders(&self) -> BrokerResult<Vec<Value>> {
        self.get_array("/v2/orders?status=open").await
    }

    fn order_result(raw: &Value) -> OrderResult {
        let qty = as_f64(raw.get("qty")).unwrap_or(0.0);
        let side = match raw.get("side").and_then(|s| s.as_str()) {
            Some("sell") => Side::Sell,
            _ => Side::Buy,
        };
        OrderResult {
            order_id: as_string(raw.get("id")).unwrap_or_else(|| "unknown".into()),
            instrument: as_string(raw.get("symbol")).unwrap_or_default(),
            filled_size: side.signed(qty.abs()),
            timestamp: as_string(raw.get("submitted_at"))
                .or_else(|| as_string(raw.get("created_at")))
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl BrokerAdapter for AlpacaAdapter {
    fn kind(&self) -> BrokerKind {
        BrokerKind::Alpaca
    }

    async fn test_connection(&self) -> bool {
        match self.get("/v2/account").await {
            Ok(account) => {
                let status = account.get("status").and_then(|s| s.as_str()).unwrap_or("");
                if status != "ACTIVE" {
                    warn!("[ALPACA] Account not active. Status: {}", status);
                    return false;
                }
                true
            }
            Err(e) => {
                warn!("[ALPACA] Connection test failed: {}", e);
                false
            }
        }
    }

    async fn get_account_details(&self) -> BrokerResult<AccountSnapshot> {
        let account = self.get("/v2/account").await?;
        let positions = self.get_positions().await?;
        let orders = self.open_orders().await?;

        Ok(AccountSnapshot {
            balance: require_f64(BrokerKind::Alpaca, &account, "equity")?,
            margin_available: as_f64(account.get("buying_power")).unwrap_or(0.0),
            open_position_count: positions.len() as u32,
            open_order_count: orders.len() as u32,
            unrealized_pl: positions.iter().map(|p| p.unrealized_pl).sum(),
            currency: as_string(account.get("currency")).unwrap_or_else(|| "USD".into()),
        })
    }

    async fn get_positions(&self) -> BrokerResult<Vec<Position>> {
        let vals = self.get_array("/v2/positions").await?;
        let mut out = Vec::with_capacity(vals.len());
        for v in vals {
            // qty is already negative for shorts
            out.push(Position {
                instrument: as_string(v.get("symbol")).unwrap_or_default(),
                size: as_f64(v.get("qty")).unwrap_or(0.0),
                current_price: as_f64(v.get("current_price")),
                unrealized_pl: as_f64(v.get("unrealized_pl")).unwrap_or(0.0),
            });
        }
        Ok(out)
    }

    async fn create_order(&self, order: NormalizedOrderRequest) -> BrokerResult<OrderResult> {
        let api_req = AlpacaOrderRequest::from_normalized(&order)?;
        info!(
            "[ALPACA] Submitting {} {} {} {}",
            api_req.type_, api_req.side, api_req.qty, api_req.symbol
        );

        let url = format!("{}/v2/orders", self.base_url);
        let raw = self
            .rest
            .send(self.authed(self.rest.http().post(url)).json(&api_req))
            .await?;

        if raw.get("id").is_none() {
            return Err(BrokerError::Decode {
                broker: BrokerKind::Alpaca,
                message: format!("order response without id: {}", raw),
            });
        }
        Ok(Self::order_result(&raw))
    }

    async fn close_position(&self, instrument: &str) -> BrokerResult<OrderResult> {
        let symbol = to_alpaca_symbol(instrument);
        info!("[ALPACA] Closing position {}", symbol);

        let url = format!("{}/v2/positions/{}", self.base_url, symbol);
        let raw = self
            .rest
            .send(self.authed(self.rest.http().delete(url)))
            .await
            .map_err(|e| not_found_on_404(e, &format!("open position for {}", symbol)))?;
        Ok(Self::order_result(&raw))
    }

    async fn get_candlestick_data(
        &self,
        instrument: &str,
        timeframe: &str,
        limit: u32,
    ) -> BrokerResult<Vec<Candle>> {
        let symbol = to_alpaca_symbol(instrument);
        let url = format!("{}/v2/stocks/{}/bars", self.data_url, symbol);
        let req = self.authed(self.rest.http().get(url)).query(&[
            ("timeframe", timeframes::to_native(BrokerKind::Alpaca, timeframe)),
            ("limit", limit.clamp(1, MAX_BARS).to_string()),
        ]);
        let raw = self
            .rest
            .send(req)
            .await
            .map_err(|e| not_found_on_404(e, &format!("symbol {}", symbol)))?;

        let bars = match raw.get("bars") {
            Some(Value::Array(bars)) => bars.clone(),
            // Alpaca sends `"bars": null` when the window is empty.
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(BrokerError::Decode {
                    broker: BrokerKind::Alpaca,
                    message: format!("unexpected bars payload: {}", other),
                })
            }
        };

        bars.iter()
            .map(|b| {
                Ok(Candle {
                    timestamp: as_string(b.get("t")).unwrap_or_default(),
                    open: require_f64(BrokerKind::Alpaca, b, "o")?,
                    high: require_f64(BrokerKind::Alpaca, b, "h")?,
                    low: require_f64(BrokerKind::Alpaca, b, "l")?,
                    close: require_f64(BrokerKind::Alpaca, b, "c")?,
                    volume: as_f64(b.get("v")).unwrap_or(0.0),
                })
            })
            .collect()
    }

    async fn get_trades(&self) -> BrokerResult<Vec<Trade>> {
        let orders = self.open_orders().await?;
        Ok(orders
            .iter()
            .map(|o| {
                let result = Self::order_result(o);
                Trade {
                    id: result.order_id,
                    instrument: result.instrument,
                    size: result.filled_size,
                    price: as_f64(o.get("limit_price"))
                        .or_else(|| as_f64(o.get("stop_price")))
                        .unwrap_or(0.0),
                    timestamp: result.timestamp,
                }
            })
            .collect())
    }
}
