//! Shared types for the trader.
//!
//! The order, balance and execution shapes here are exchange-neutral so the
//! engine can be driven by the Bybit client or by a test double.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire value expected by Bybit (`"Buy"` / `"Sell"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    /// Past-tense verb used in fill reports.
    pub fn past_tense(&self) -> &'static str {
        match self {
            Side::Buy => "bought",
            Side::Sell => "sold",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    /// Case-insensitive: `buy`, `BUY` and `Buy` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(format!("unknown operation '{other}' (expected buy or sell)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// A spot market order ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub side: Side,
    /// Trading pair, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Quote amount (USD) for buys, base amount for sells.
    pub quantity: Decimal,
    /// Client-side order id (`orderLinkId`).
    pub client_order_id: String,
}

impl OrderRequest {
    pub fn market(side: Side, coin: &str, quantity: Decimal) -> Self {
        Self {
            side,
            symbol: spot_symbol(coin),
            quantity,
            client_order_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// USDT-quoted spot symbol for a coin.
pub fn spot_symbol(coin: &str) -> String {
    format!("{coin}USDT")
}

/// Exchange acknowledgement for an accepted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub client_order_id: String,
}

// ---------------------------------------------------------------------------
// Balances & executions
// ---------------------------------------------------------------------------

/// Wallet entry for one coin.
///
/// `wallet_balance` is kept verbatim: its fractional digits decide how
/// much precision a sell order may carry.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinBalance {
    pub wallet_balance: String,
}

/// A single fill reported by the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub order_id: String,
    pub exec_id: String,
    pub exec_qty: Decimal,
    pub exec_price: Decimal,
    /// Exchange-reported notional; absent or unparseable on some records.
    pub exec_value: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by an [`Exchange`](crate::exchange::Exchange).
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The quantity carries more decimals than the symbol allows.
    #[error("order quantity has too many decimals (retCode {code}): {message}")]
    PrecisionExceeded { code: i64, message: String },

    #[error("exchange rejected request (retCode {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("request signing failed: {0}")]
    Signing(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
