//! Mock exchange for integration testing.
//!
//! Provides a deterministic `Exchange` implementation with scripted order
//! responses, in-memory wallet balances and fills that become visible
//! after a configurable number of execution polls.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use bybit_trader::exchange::Exchange;
use bybit_trader::types::{CoinBalance, Execution, ExchangeError, OrderAck, OrderRequest, Side};

/// Scripted response for the next order submission.
#[derive(Debug, Clone)]
pub enum PlaceScript {
    Accept,
    PrecisionError,
    Reject { code: i64, message: String },
}

struct PendingFill {
    execution: Execution,
    /// Polls that must happen before this fill is listed.
    visible_after: usize,
}

/// A mock spot exchange.
///
/// All state is in-memory and fully controllable from test code.
pub struct MockExchange {
    balances: Mutex<HashMap<String, String>>,
    script: Mutex<VecDeque<PlaceScript>>,
    submitted: Mutex<Vec<OrderRequest>>,
    fills: Mutex<Vec<PendingFill>>,
    polls: Mutex<usize>,
    /// Fill price for every accepted order.
    fill_price: Decimal,
    /// Whether fills carry an exchange-reported value.
    report_value: bool,
    /// Polls before a new fill is listed.
    fill_delay: usize,
    /// If set, every call returns an HTTP 503 with this body.
    force_error: Mutex<Option<String>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            script: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            fills: Mutex::new(Vec::new()),
            polls: Mutex::new(0),
            fill_price: dec!(100),
            report_value: true,
            fill_delay: 0,
            force_error: Mutex::new(None),
        }
    }

    pub fn with_balance(self, coin: &str, balance: &str) -> Self {
        self.balances
            .lock()
            .unwrap()
            .insert(coin.to_string(), balance.to_string());
        self
    }

    pub fn with_fill_price(mut self, price: Decimal) -> Self {
        self.fill_price = price;
        self
    }

    pub fn without_exec_value(mut self) -> Self {
        self.report_value = false;
        self
    }

    pub fn with_fill_delay(mut self, polls: usize) -> Self {
        self.fill_delay = polls;
        self
    }

    /// Queue responses for the next submissions. Once the queue is drained
    /// every submission is accepted.
    pub fn script(&self, steps: impl IntoIterator<Item = PlaceScript>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Every order submitted so far, including rejected ones.
    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn polls(&self) -> usize {
        *self.polls.lock().unwrap()
    }

    fn check_error(&self) -> Result<(), ExchangeError> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(body) => Err(ExchangeError::Status {
                status: 503,
                body: body.clone(),
            }),
            None => Ok(()),
        }
    }

    fn record_fill(&self, order_id: &str, order: &OrderRequest) {
        // Buys are quoted in USD, sells in coins.
        let exec_qty = match order.side {
            Side::Buy => (order.quantity / self.fill_price).round_dp(8),
            Side::Sell => order.quantity,
        };
        let value = exec_qty * self.fill_price;
        let polls = *self.polls.lock().unwrap();

        self.fills.lock().unwrap().push(PendingFill {
            execution: Execution {
                order_id: order_id.to_string(),
                exec_id: format!("{order_id}-1"),
                exec_qty,
                exec_price: self.fill_price,
                exec_value: self.report_value.then_some(value),
            },
            visible_after: polls + self.fill_delay,
        });
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn wallet_balance(&self, coin: &str) -> Result<Option<CoinBalance>, ExchangeError> {
        self.check_error()?;
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(coin)
            .map(|balance| CoinBalance {
                wallet_balance: balance.clone(),
            }))
    }

    async fn place_market_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        self.check_error()?;
        self.submitted.lock().unwrap().push(order.clone());

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PlaceScript::Accept);

        match step {
            PlaceScript::Accept => {
                let order_id = format!("mock-{}", self.submitted.lock().unwrap().len());
                self.record_fill(&order_id, order);
                Ok(OrderAck {
                    order_id,
                    client_order_id: order.client_order_id.clone(),
                })
            }
            PlaceScript::PrecisionError => Err(ExchangeError::PrecisionExceeded {
                code: 170137,
                message: "Order quantity has too many decimals.".to_string(),
            }),
            PlaceScript::Reject { code, message } => Err(ExchangeError::Rejected { code, message }),
        }
    }

    async fn recent_executions(&self, limit: u32) -> Result<Vec<Execution>, ExchangeError> {
        self.check_error()?;
        let polls = {
            let mut polls = self.polls.lock().unwrap();
            *polls += 1;
            *polls
        };

        Ok(self
            .fills
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|f| polls > f.visible_after)
            .take(limit as usize)
            .map(|f| f.execution.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests for the mock itself
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_wallet_balance() {
        let exchange = MockExchange::new().with_balance("BTC", "0.5");
        let balance = exchange.wallet_balance("BTC").await.unwrap().unwrap();
        assert_eq!(balance.wallet_balance, "0.5");
        assert!(exchange.wallet_balance("ETH").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mock_script_then_accept() {
        let exchange = MockExchange::new();
        exchange.script([PlaceScript::PrecisionError]);
        let order = OrderRequest::market(Side::Sell, "ETH", dec!(1.5));

        let first = exchange.place_market_order(&order).await;
        assert!(matches!(first, Err(ExchangeError::PrecisionExceeded { .. })));

        let second = exchange.place_market_order(&order).await.unwrap();
        assert_eq!(second.order_id, "mock-2");
        assert_eq!(exchange.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_fill_delay() {
        let exchange = MockExchange::new().with_fill_delay(2);
        let order = OrderRequest::market(Side::Sell, "ETH", dec!(1));
        let ack = exchange.place_market_order(&order).await.unwrap();

        assert!(exchange.recent_executions(100).await.unwrap().is_empty());
        assert!(exchange.recent_executions(100).await.unwrap().is_empty());
        let listed = exchange.recent_executions(100).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].order_id, ack.order_id);
        assert_eq!(exchange.polls(), 3);
    }

    #[tokio::test]
    async fn test_mock_buy_fill_is_quote_sized() {
        let exchange = MockExchange::new().with_fill_price(dec!(25000));
        let order = OrderRequest::market(Side::Buy, "BTC", dec!(50));
        exchange.place_market_order(&order).await.unwrap();
        let fills = exchange.recent_executions(100).await.unwrap();
        assert_eq!(fills[0].exec_qty, dec!(0.002));
        assert_eq!(fills[0].exec_value, Some(dec!(50)));
    }

    #[tokio::test]
    async fn test_mock_forced_error() {
        let exchange = MockExchange::new().with_balance("BTC", "1");
        exchange.set_error("maintenance");
        assert!(exchange.wallet_balance("BTC").await.is_err());
        assert!(exchange.recent_executions(10).await.is_err());

        exchange.clear_error();
        assert!(exchange.wallet_balance("BTC").await.is_ok());
    }
}
