//! Bybit v5 spot integration.
//!
//! API docs: https://bybit-exchange.github.io/docs/v5/intro
//! Base URL: https://api.bybit.com (testnet: https://api-testnet.bybit.com)
//! Auth: every private call carries `X-BAPI-API-KEY`, `X-BAPI-TIMESTAMP`,
//! `X-BAPI-RECV-WINDOW` and `X-BAPI-SIGN`, the hex HMAC-SHA256 of
//! `timestamp + api_key + recv_window + payload`. The payload is the query
//! string for GET requests and the raw JSON body for POST requests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::Exchange;
use crate::config::{Credentials, Network};
use crate::types::{CoinBalance, Execution, ExchangeError, OrderAck, OrderRequest, Side};

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const RECV_WINDOW: &str = "5000";
const CATEGORY: &str = "spot";

/// `retCode` for "Order quantity has too many decimals".
pub const PRECISION_ERROR_CODE: i64 = 170137;

// ---------------------------------------------------------------------------
// API response types (Bybit JSON → Rust)
// ---------------------------------------------------------------------------

/// Common v5 envelope. Failed calls usually carry an empty `result` object.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEnvelope<T> {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn into_result(self) -> Result<T, ExchangeError> {
        match self.ret_code {
            0 => self
                .result
                .ok_or_else(|| ExchangeError::Decode("response has no result".to_string())),
            PRECISION_ERROR_CODE => Err(ExchangeError::PrecisionExceeded {
                code: self.ret_code,
                message: self.ret_msg,
            }),
            code => Err(ExchangeError::Rejected {
                code,
                message: self.ret_msg,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WalletResult {
    #[serde(default)]
    list: Vec<WalletAccount>,
}

#[derive(Debug, Default, Deserialize)]
struct WalletAccount {
    #[serde(default)]
    coin: Vec<WalletCoin>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletCoin {
    #[serde(default)]
    coin: String,
    #[serde(default)]
    wallet_balance: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResult {
    #[serde(default)]
    order_id: String,
    #[serde(default)]
    order_link_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutionListResult {
    #[serde(default)]
    list: Vec<RawExecution>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExecution {
    #[serde(default)]
    order_id: String,
    #[serde(default)]
    exec_id: String,
    #[serde(default)]
    exec_qty: String,
    #[serde(default)]
    exec_price: String,
    #[serde(default)]
    exec_value: String,
}

impl RawExecution {
    fn into_execution(self) -> Result<Execution, ExchangeError> {
        let parse = |field: &str, raw: &str| {
            Decimal::from_str(raw.trim()).map_err(|e| {
                ExchangeError::Decode(format!(
                    "execution {} has invalid {field} '{raw}': {e}",
                    self.exec_id
                ))
            })
        };
        let exec_qty = parse("execQty", &self.exec_qty)?;
        let exec_price = parse("execPrice", &self.exec_price)?;
        let exec_value = Decimal::from_str(self.exec_value.trim()).ok();

        Ok(Execution {
            order_id: self.order_id,
            exec_id: self.exec_id,
            exec_qty,
            exec_price,
            exec_value,
        })
    }
}

/// Body of `POST /v5/order/create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderBody<'a> {
    category: &'a str,
    symbol: &'a str,
    side: &'a str,
    order_type: &'a str,
    qty: String,
    market_unit: &'a str,
    order_link_id: &'a str,
}

impl<'a> CreateOrderBody<'a> {
    fn market(order: &'a OrderRequest) -> Self {
        // Buys are sized in USD, sells in coins.
        let market_unit = match order.side {
            Side::Buy => "quoteCoin",
            Side::Sell => "baseCoin",
        };
        Self {
            category: CATEGORY,
            symbol: &order.symbol,
            side: order.side.as_str(),
            order_type: "Market",
            qty: order.quantity.to_string(),
            market_unit,
            order_link_id: &order.client_order_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Hex HMAC-SHA256 over `timestamp + api_key + recv_window + payload`.
pub fn sign_request(
    secret: &str,
    timestamp: i64,
    api_key: &str,
    recv_window: &str,
    payload: &str,
) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Signing(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(api_key.as_bytes());
    mac.update(recv_window.as_bytes());
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Bybit v5 REST client for spot trading.
pub struct BybitClient {
    http: Client,
    base_url: String,
    network: Network,
    api_key: String,
    api_secret: SecretString,
    /// Wallet account type for balance queries (`SPOT` or `UNIFIED`).
    account_type: String,
}

impl BybitClient {
    pub fn new(network: Network, credentials: Credentials, account_type: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("bybit-trader/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for Bybit")?;

        Ok(Self {
            http,
            base_url: network.base_url().to_string(),
            network,
            api_key: credentials.api_key,
            api_secret: credentials.api_secret,
            account_type,
        })
    }

    /// Point the client at a different host (proxies, local stubs).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    // -- Internal helpers ------------------------------------------------

    fn authenticate(&self, req: RequestBuilder, payload: &str) -> Result<RequestBuilder, ExchangeError> {
        let timestamp = Utc::now().timestamp_millis();
        let signature = sign_request(
            self.api_secret.expose_secret(),
            timestamp,
            &self.api_key,
            RECV_WINDOW,
            payload,
        )?;

        Ok(req
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T, ExchangeError> {
        let url = format!("{}{path}?{query}", self.base_url);
        debug!(url = %url, "Bybit GET");

        let req = self.authenticate(self.http.get(&url), query)?;
        Self::decode(req.send().await?).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ExchangeError> {
        let payload =
            serde_json::to_string(body).map_err(|e| ExchangeError::Decode(e.to_string()))?;
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, body = %payload, "Bybit POST");

        let req = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .body(payload.clone());
        let req = self.authenticate(req, &payload)?;
        Self::decode(req.send().await?).await
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ExchangeError> {
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::Decode(format!("{e}: {body}")))?;
        envelope.into_result()
    }
}

#[async_trait]
impl Exchange for BybitClient {
    async fn wallet_balance(&self, coin: &str) -> Result<Option<CoinBalance>, ExchangeError> {
        let query = format!(
            "accountType={}&coin={}",
            urlencoding::encode(&self.account_type),
            urlencoding::encode(coin),
        );
        let result: WalletResult = self.get("/v5/account/wallet-balance", &query).await?;
        Ok(pick_coin(result, coin))
    }

    async fn place_market_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        let body = CreateOrderBody::market(order);
        let result: CreateOrderResult = self.post("/v5/order/create", &body).await?;

        if result.order_id.is_empty() {
            return Err(ExchangeError::Decode(
                "order accepted without an orderId".to_string(),
            ));
        }

        info!(
            network = %self.network,
            order_id = %result.order_id,
            symbol = %order.symbol,
            side = %order.side,
            qty = %order.quantity,
            "Bybit order placed"
        );

        Ok(OrderAck {
            order_id: result.order_id,
            client_order_id: if result.order_link_id.is_empty() {
                order.client_order_id.clone()
            } else {
                result.order_link_id
            },
        })
    }

    async fn recent_executions(&self, limit: u32) -> Result<Vec<Execution>, ExchangeError> {
        let query = format!("category={CATEGORY}&limit={limit}");
        let result: ExecutionListResult = self.get("/v5/execution/list", &query).await?;
        Ok(decode_executions(result.list))
    }
}

/// Decode an execution page. A record that fails to parse is logged and
/// dropped; the rest of the page is still usable.
fn decode_executions(list: Vec<RawExecution>) -> Vec<Execution> {
    list.into_iter()
        .filter_map(|raw| match raw.into_execution() {
            Ok(execution) => Some(execution),
            Err(e) => {
                warn!(error = %e, "Skipping malformed execution record");
                None
            }
        })
        .collect()
}

/// The wallet entry for `coin` from the first account in the response.
fn pick_coin(result: WalletResult, coin: &str) -> Option<CoinBalance> {
    result
        .list
        .into_iter()
        .next()?
        .coin
        .into_iter()
        .find(|c| c.coin.eq_ignore_ascii_case(coin))
        .map(|c| CoinBalance {
            wallet_balance: c.wallet_balance,
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
