//! Exchange integrations.
//!
//! Defines the `Exchange` trait consumed by the order engine and the Bybit
//! v5 REST implementation.

pub mod bybit;

use async_trait::async_trait;

use crate::types::{CoinBalance, Execution, ExchangeError, OrderAck, OrderRequest};

/// The account operations the order engine needs from a spot exchange.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Wallet entry for `coin`, or `None` when the account holds nothing
    /// for it.
    async fn wallet_balance(&self, coin: &str) -> Result<Option<CoinBalance>, ExchangeError>;

    /// Submit a market order.
    async fn place_market_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError>;

    /// The most recent spot executions, newest first, at most `limit`.
    async fn recent_executions(&self, limit: u32) -> Result<Vec<Execution>, ExchangeError>;
}
