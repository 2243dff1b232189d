//! Binance USDⓈ-M futures gateway adapter

use super::user_stream;
use super::{EntryReceipt, OrderGateway, OrderSide, SymbolPrecision, UserStreamEvent};
use crate::candles::Candle;
use crate::error::{EngineError, Result};
use crate::state::TriggerSide;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

type HmacSha256 = Hmac<Sha256>;

/// Default request timeout for all REST calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Signed-request receive window in milliseconds
const RECV_WINDOW_MS: i64 = 5_000;

#[derive(Debug, Deserialize)]
struct ServerTime {
    #[serde(rename = "serverTime")]
    server_time: i64,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeSymbol {
    symbol: String,
    #[serde(rename = "pricePrecision")]
    price_precision: u32,
    #[serde(rename = "quantityPrecision")]
    quantity_precision: u32,
}

#[derive(Debug, Deserialize)]
struct OpenOrder {
    #[serde(rename = "type")]
    order_type: String,
    #[serde(rename = "stopPrice", default)]
    stop_price: String,
}

#[derive(Debug, Deserialize)]
struct PositionRisk {
    symbol: String,
    #[serde(rename = "positionAmt")]
    position_amt: String,
    #[serde(rename = "positionSide")]
    position_side: String,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    #[serde(rename = "availableBalance")]
    available_balance: String,
}

#[derive(Debug, Deserialize)]
struct BatchOrderOutcome {
    #[serde(rename = "orderId")]
    order_id: Option<i64>,
    code: Option<i64>,
    msg: Option<String>,
}

/// Live gateway for one account against Binance-compatible futures REST.
///
/// Holds the per-process precision cache and the server-time offset used
/// when signing requests.
pub struct BinanceGateway {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    account: String,
    precision: RwLock<HashMap<String, SymbolPrecision>>,
    time_offset_ms: AtomicI64,
}

impl BinanceGateway {
    pub fn new(
        account: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            account: account.into(),
            precision: RwLock::new(HashMap::new()),
            time_offset_ms: AtomicI64::new(0),
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub(super) fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(super) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(super) fn http(&self) -> &Client {
        &self.http
    }

    /// Sync the local clock offset against the exchange server time
    pub async fn sync_time(&self) -> Result<()> {
        let url = format!("{}/fapi/v1/time", self.base_url);
        let response: ServerTime = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let offset = response.server_time - Utc::now().timestamp_millis();
        self.time_offset_ms.store(offset, Ordering::Relaxed);
        tracing::debug!(account = %self.account, offset_ms = offset, "synced exchange time");
        Ok(())
    }

    fn timestamp_ms(&self) -> i64 {
        Utc::now().timestamp_millis() + self.time_offset_ms.load(Ordering::Relaxed)
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let mut query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencode(v)))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            RECV_WINDOW_MS,
            self.timestamp_ms()
        ));
        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }

    async fn signed_request(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}?{}", self.base_url, path, self.signed_query(params));
        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Transport(format!("{path}: {status}: {body}")));
        }
        Ok(response)
    }

    async fn ensure_precision_cache(&self) -> Result<()> {
        {
            let cache = self.precision.read().await;
            if !cache.is_empty() {
                return Ok(());
            }
        }
        let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);
        let info: ExchangeInfo = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut cache = self.precision.write().await;
        for symbol in info.symbols {
            cache.insert(
                symbol.symbol,
                SymbolPrecision {
                    price: symbol.price_precision,
                    quantity: symbol.quantity_precision,
                },
            );
        }
        tracing::debug!(symbols = cache.len(), "loaded exchange precision cache");
        Ok(())
    }

    async fn positions(&self, symbol: &str) -> Result<Vec<(Decimal, String)>> {
        let response = self
            .signed_request(
                reqwest::Method::GET,
                "/fapi/v3/positionRisk",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        let records: Vec<PositionRisk> = response.json().await?;
        let mut out = Vec::new();
        for record in records {
            if record.symbol != symbol {
                continue;
            }
            let amount = Decimal::from_str(&record.position_amt)
                .map_err(|e| EngineError::Transport(format!("bad positionAmt: {e}")))?;
            if !amount.is_zero() {
                out.push((amount, record.position_side));
            }
        }
        Ok(out)
    }

    /// Available USDT balance, logged at startup
    pub async fn available_usdt(&self) -> Result<Decimal> {
        let response = self
            .signed_request(reqwest::Method::GET, "/fapi/v3/balance", &[])
            .await?;
        let entries: Vec<BalanceEntry> = response.json().await?;
        for entry in entries {
            if entry.asset == "USDT" {
                return Decimal::from_str(&entry.available_balance)
                    .map_err(|e| EngineError::Transport(format!("bad balance: {e}")));
            }
        }
        Ok(Decimal::ZERO)
    }

    fn parse_kline_row(row: &serde_json::Value) -> Option<Candle> {
        let cells = row.as_array()?;
        let dec = |i: usize| Decimal::from_str(cells.get(i)?.as_str()?).ok();
        Some(Candle {
            open_time: cells.first()?.as_i64()?,
            close_time: cells.get(6)?.as_i64()?,
            open: dec(1)?,
            high: dec(2)?,
            low: dec(3)?,
            close: dec(4)?,
            volume: dec(5)?,
            quote_volume: dec(7).unwrap_or_default(),
            trade_count: cells.get(8).and_then(|v| v.as_u64()).unwrap_or(0),
        })
    }
}

#[async_trait]
impl OrderGateway for BinanceGateway {
    async fn symbol_precision(&self, symbol: &str) -> Result<SymbolPrecision> {
        self.ensure_precision_cache().await?;
        let cache = self.precision.read().await;
        cache
            .get(symbol)
            .copied()
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))
    }

    async fn submit_entry_with_stop(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Result<EntryReceipt> {
        let stop_side = side.opposite();
        let orders = serde_json::json!([
            {
                "symbol": symbol,
                "side": side.as_str(),
                "positionSide": side.position_side(),
                "type": "MARKET",
                "quantity": quantity.to_string(),
            },
            {
                "symbol": symbol,
                "side": stop_side.as_str(),
                "positionSide": side.position_side(),
                "type": "STOP_MARKET",
                "stopPrice": stop_price.to_string(),
                "closePosition": "true",
                "workingType": "MARK_PRICE",
            }
        ]);

        let response = self
            .signed_request(
                reqwest::Method::POST,
                "/fapi/v1/batchOrders",
                &[("batchOrders", orders.to_string())],
            )
            .await?;
        let outcomes: Vec<BatchOrderOutcome> = response.json().await?;
        if outcomes.len() != 2 {
            return Err(EngineError::Transport(format!(
                "batch order returned {} outcomes",
                outcomes.len()
            )));
        }

        let entry_order_id = match (outcomes[0].order_id, &outcomes[0].msg) {
            (Some(id), _) => id,
            (None, msg) => {
                return Err(EngineError::Transport(format!(
                    "entry order rejected: {} {}",
                    outcomes[0].code.unwrap_or_default(),
                    msg.clone().unwrap_or_default()
                )))
            }
        };
        let stop_order_id = match (outcomes[1].order_id, &outcomes[1].msg) {
            (Some(id), _) => id,
            (None, msg) => {
                return Err(EngineError::StopLossPlacementFailed {
                    symbol: symbol.to_string(),
                    reason: format!(
                        "{} {}",
                        outcomes[1].code.unwrap_or_default(),
                        msg.clone().unwrap_or_default()
                    ),
                })
            }
        };

        Ok(EntryReceipt {
            entry_order_id,
            stop_order_id,
        })
    }

    async fn place_trail_stop(
        &self,
        symbol: &str,
        position_side: TriggerSide,
        stop_price: Decimal,
    ) -> Result<()> {
        let response = self
            .signed_request(
                reqwest::Method::GET,
                "/fapi/v1/openOrders",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        let open_orders: Vec<OpenOrder> = response.json().await?;
        let already_placed = open_orders.iter().any(|order| {
            order.order_type == "STOP_MARKET"
                && Decimal::from_str(&order.stop_price)
                    .map(|p| p == stop_price)
                    .unwrap_or(false)
        });
        if already_placed {
            tracing::debug!(account = %self.account, symbol, %stop_price, "trail stop already in place");
            return Ok(());
        }

        self.cancel_all_open_orders(symbol).await?;

        let entry_side: OrderSide = position_side.into();
        let stop_side = entry_side.opposite();
        self.signed_request(
            reqwest::Method::POST,
            "/fapi/v1/order",
            &[
                ("symbol", symbol.to_string()),
                ("side", stop_side.as_str().to_string()),
                ("positionSide", entry_side.position_side().to_string()),
                ("type", "STOP_MARKET".to_string()),
                ("stopPrice", stop_price.to_string()),
                ("closePosition", "true".to_string()),
                ("workingType", "MARK_PRICE".to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn cancel_all_open_orders(&self, symbol: &str) -> Result<()> {
        self.signed_request(
            reqwest::Method::DELETE,
            "/fapi/v1/allOpenOrders",
            &[("symbol", symbol.to_string())],
        )
        .await?;
        Ok(())
    }

    async fn close_position(&self, symbol: &str) -> Result<()> {
        let precision = self.symbol_precision(symbol).await?;
        for (amount, position_side) in self.positions(symbol).await? {
            let side = if amount > Decimal::ZERO {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            };
            let quantity = super::round_quantity(amount.abs(), &precision);
            tracing::info!(
                account = %self.account,
                symbol,
                side = side.as_str(),
                %quantity,
                "closing position at market"
            );
            self.signed_request(
                reqwest::Method::POST,
                "/fapi/v1/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("side", side.as_str().to_string()),
                    ("positionSide", position_side.clone()),
                    ("type", "MARKET".to_string()),
                    ("quantity", quantity.to_string()),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn has_open_position(&self, symbol: &str) -> Result<bool> {
        Ok(!self.positions(symbol).await?.is_empty())
    }

    async fn recent_closed_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );
        let rows: serde_json::Value = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let rows = rows
            .as_array()
            .ok_or_else(|| EngineError::Transport("klines response is not an array".into()))?;

        let now_ms = Utc::now().timestamp_millis();
        let candles = rows
            .iter()
            .filter_map(Self::parse_kline_row)
            .filter(|c| c.close_time <= now_ms)
            .collect();
        Ok(candles)
    }

    async fn subscribe_user_stream(&self) -> Result<mpsc::Receiver<UserStreamEvent>> {
        user_stream::subscribe(self).await
    }
}

fn urlencode(value: &str) -> String {
    // Query values here are symbols, numbers, and JSON arrays; escape the
    // characters that matter for the signed query string.
    value
        .replace('%', "%25")
        .replace('&', "%26")
        .replace('+', "%2B")
        .replace('"', "%22")
        .replace('{', "%7B")
        .replace('}', "%7D")
        .replace('[', "%5B")
        .replace(']', "%5D")
        .replace(':', "%3A")
        .replace(',', "%2C")
        .replace(' ', "%20")
}
