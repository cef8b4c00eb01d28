//! Order processor.
//!
//! Sizes one coin's order, submits it, resubmits with fewer decimals when
//! the exchange rejects the quantity's precision, then polls recent
//! executions until the fill shows up or the poll budget runs out.
//!
//! Every path ends in an [`OrderOutcome`]; nothing here returns an error to
//! the caller, so one coin failing never stops a batch.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::quantity;
use crate::config::CoinAmounts;
use crate::exchange::Exchange;
use crate::types::{Execution, ExchangeError, OrderAck, OrderRequest, Side};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Default decimal places allowed on a quantity before any retry.
pub const DEFAULT_MAX_DECIMALS: u32 = 8;

/// Hard ceiling on submissions for one order.
pub const MAX_SUBMIT_ATTEMPTS: u32 = 16;

/// Page size for the recent-executions query (Bybit's maximum).
pub const EXECUTION_PAGE_LIMIT: u32 = 100;

/// How long to wait for a submitted order's fill to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub max_decimals: u32,
    pub max_attempts: u32,
    pub execution_page_limit: u32,
    pub poll: PollPolicy,
    /// Size orders but never submit them.
    pub dry_run: bool,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            max_decimals: DEFAULT_MAX_DECIMALS,
            max_attempts: MAX_SUBMIT_ATTEMPTS,
            execution_page_limit: EXECUTION_PAGE_LIMIT,
            poll: PollPolicy::default(),
            dry_run: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Aggregate of every execution recorded against one order.
#[derive(Debug, Clone, PartialEq)]
pub struct FillSummary {
    pub order_id: String,
    pub fills: usize,
    pub quantity: Decimal,
    /// Single fill: its price. Several fills: value-weighted average.
    pub price: Decimal,
    pub total: Decimal,
    /// `true` when at least one fill lacked an exchange-reported value and
    /// the total was computed as quantity × price.
    pub estimated: bool,
}

impl FillSummary {
    /// Summarise `executions`, or `None` if the slice is empty.
    pub fn from_executions(order_id: &str, executions: &[&Execution]) -> Option<Self> {
        let first = executions.first()?;

        let quantity: Decimal = executions.iter().map(|e| e.exec_qty).sum();
        let estimated = executions.iter().any(|e| e.exec_value.is_none());
        let total: Decimal = executions
            .iter()
            .map(|e| e.exec_value.unwrap_or(e.exec_qty * e.exec_price))
            .sum();

        let price = if executions.len() == 1 || quantity.is_zero() {
            first.exec_price
        } else {
            (total / quantity).normalize()
        };

        Some(Self {
            order_id: order_id.to_string(),
            fills: executions.len(),
            quantity,
            price,
            total,
            estimated,
        })
    }
}

/// Terminal state of one coin's order.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Filled(FillSummary),
    /// Submitted, but no execution appeared within the poll budget.
    Unconfirmed { order_id: String },
    DryRun { symbol: String, quantity: Decimal },
    /// The account has no entry for the coin.
    WalletEmpty,
    ZeroQuantity,
    Rejected { code: i64, message: String },
    /// Precision retries ran out (precision floor or attempt ceiling).
    PrecisionExhausted { attempts: u32, last_quantity: Decimal },
    Failed(String),
}

impl OrderOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderOutcome::Filled(_))
    }

    /// Skipped before anything was submitted.
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            OrderOutcome::WalletEmpty | OrderOutcome::ZeroQuantity | OrderOutcome::DryRun { .. }
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OrderOutcome::Rejected { .. }
                | OrderOutcome::PrecisionExhausted { .. }
                | OrderOutcome::Failed(_)
        )
    }
}

/// Outcome tagged with the coin and side it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReport {
    pub coin: String,
    pub side: Side,
    pub outcome: OrderOutcome,
}

impl fmt::Display for OrderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coin = &self.coin;
        match &self.outcome {
            OrderOutcome::Filled(fill) => {
                writeln!(f, "Amount {}: {} {coin}", self.side.past_tense(), fill.quantity)?;
                writeln!(f, "Price per coin: {} USD", fill.price)?;
                if fill.fills > 1 {
                    writeln!(f, "Filled in {} executions", fill.fills)?;
                }
                let label = if fill.estimated { "Estimated" } else { "Exact" };
                write!(f, "{label} Operation Total: {} USD", fill.total)
            }
            OrderOutcome::Unconfirmed { order_id } => write!(
                f,
                "Execution details not found for order {order_id}, order might still be in \
                 progress and/or not filled. Please check manually."
            ),
            OrderOutcome::DryRun { symbol, quantity } => {
                let unit = match self.side {
                    Side::Buy => "USD worth",
                    Side::Sell => coin.as_str(),
                };
                write!(f, "[DRY RUN] Would {} {quantity} {unit} on {symbol}", self.side)
            }
            OrderOutcome::WalletEmpty => write!(f, "{coin}: Wallet empty, skipping."),
            OrderOutcome::ZeroQuantity => {
                write!(f, "{coin}: Quantity to trade is 0 AND/OR insufficient balance.")
            }
            OrderOutcome::Rejected { code, message } => {
                write!(f, "Failed to place order: {message} (retCode {code})")
            }
            OrderOutcome::PrecisionExhausted {
                attempts,
                last_quantity,
            } => write!(
                f,
                "Error: Could not place order with adjusted decimals \
                 ({attempts} attempts, last quantity {last_quantity})."
            ),
            OrderOutcome::Failed(message) => {
                write!(f, "Error occurred while trying to process order: {message}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Result of the submission loop.
enum Submission {
    Accepted(OrderAck),
    Stopped(OrderOutcome),
}

/// Drives the sizing → submit → retry → poll sequence for single coins.
pub struct OrderProcessor<'a> {
    exchange: &'a dyn Exchange,
    coins: &'a CoinAmounts,
    settings: ProcessorSettings,
}

impl<'a> OrderProcessor<'a> {
    pub fn new(exchange: &'a dyn Exchange, coins: &'a CoinAmounts, settings: ProcessorSettings) -> Self {
        Self {
            exchange,
            coins,
            settings,
        }
    }

    /// Process one coin.
    ///
    /// `quantity: None` sizes a sell from the wallet balance and a buy from
    /// the configured USD amount.
    pub async fn process(&self, side: Side, coin: &str, quantity: Option<Decimal>) -> OrderReport {
        let outcome = match self.run(side, coin, quantity).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(coin, side = %side, error = %format!("{e:#}"), "Order processing failed");
                OrderOutcome::Failed(format!("{e:#}"))
            }
        };

        debug!(coin, side = %side, outcome = ?outcome, "Order finished");
        OrderReport {
            coin: coin.to_string(),
            side,
            outcome,
        }
    }

    async fn run(&self, side: Side, coin: &str, quantity: Option<Decimal>) -> Result<OrderOutcome> {
        let quantity = match quantity {
            Some(q) => q,
            None => match side {
                Side::Sell => match self.wallet_quantity(coin).await? {
                    Some(q) => q,
                    None => return Ok(OrderOutcome::WalletEmpty),
                },
                Side::Buy => self.coins.amount_for(coin),
            },
        };

        match side {
            Side::Sell => println!("Selling {quantity} of {coin}..."),
            Side::Buy => println!("Buying {quantity} USD worth of {coin}..."),
        }

        if quantity <= Decimal::ZERO {
            return Ok(OrderOutcome::ZeroQuantity);
        }

        if self.settings.dry_run {
            let order = OrderRequest::market(side, coin, quantity);
            info!(symbol = %order.symbol, side = %side, qty = %quantity, "[DRY RUN] Would place order");
            return Ok(OrderOutcome::DryRun {
                symbol: order.symbol,
                quantity,
            });
        }

        let ack = match self.submit(side, coin, quantity).await? {
            Submission::Accepted(ack) => ack,
            Submission::Stopped(outcome) => return Ok(outcome),
        };

        println!("Order placed successfully.\nFetching execution price...");
        self.await_fill(&ack)
            .await
            .with_context(|| format!("order {} was placed but its execution lookup failed", ack.order_id))
    }

    /// Wallet-sized sell quantity, `None` when the wallet has no entry.
    async fn wallet_quantity(&self, coin: &str) -> Result<Option<Decimal>> {
        let balance = self
            .exchange
            .wallet_balance(coin)
            .await
            .with_context(|| format!("wallet balance query for {coin} failed"))?;

        let Some(balance) = balance else {
            return Ok(None);
        };

        let q = quantity::sell_quantity(&balance.wallet_balance, self.settings.max_decimals)?;
        debug!(coin, wallet_balance = %balance.wallet_balance, qty = %q, "Sized sell from wallet");
        Ok(Some(q))
    }

    /// Submit, shrinking precision on each precision rejection.
    async fn submit(&self, side: Side, coin: &str, initial: Decimal) -> Result<Submission> {
        let mut quantity = initial;
        let mut decimals = self.settings.max_decimals;
        let mut attempt = 0;

        while attempt < self.settings.max_attempts {
            let order = OrderRequest::market(side, coin, quantity);
            debug!(attempt, symbol = %order.symbol, qty = %quantity, decimals, "Submitting order");

            match self.exchange.place_market_order(&order).await {
                Ok(ack) => return Ok(Submission::Accepted(ack)),
                Err(ExchangeError::PrecisionExceeded { code, message }) => {
                    // Shrinking below the quantity's own scale changes nothing.
                    let current = decimals.min(quantity.scale());
                    if current == 0 {
                        warn!(coin, code, message = %message, "No decimals left to drop");
                        return Ok(Submission::Stopped(OrderOutcome::PrecisionExhausted {
                            attempts: attempt + 1,
                            last_quantity: quantity,
                        }));
                    }

                    println!(
                        "Error occurred: Order quantity has too many decimals. \
                         Retrying with fewer decimals..."
                    );
                    decimals = current - 1;
                    quantity = quantity::truncate(quantity, decimals);
                    attempt += 1;
                    info!(coin, attempt, decimals, qty = %quantity, "Retrying with fewer decimals");

                    if quantity <= Decimal::ZERO {
                        return Ok(Submission::Stopped(OrderOutcome::ZeroQuantity));
                    }
                }
                Err(ExchangeError::Rejected { code, message }) => {
                    warn!(coin, code, message = %message, "Order rejected");
                    return Ok(Submission::Stopped(OrderOutcome::Rejected { code, message }));
                }
                Err(e) => return Err(e).context("order submission failed"),
            }
        }

        warn!(coin, attempts = attempt, "Submission attempt ceiling reached");
        Ok(Submission::Stopped(OrderOutcome::PrecisionExhausted {
            attempts: attempt,
            last_quantity: quantity,
        }))
    }

    /// Poll recent executions until the order shows up.
    async fn await_fill(&self, ack: &OrderAck) -> Result<OrderOutcome> {
        let poll = self.settings.poll;

        for attempt in 1..=poll.attempts {
            let executions = self
                .exchange
                .recent_executions(self.settings.execution_page_limit)
                .await?;

            let matching: Vec<&Execution> = executions
                .iter()
                .filter(|e| e.order_id == ack.order_id)
                .collect();

            if let Some(fill) = FillSummary::from_executions(&ack.order_id, &matching) {
                info!(
                    order_id = %ack.order_id,
                    client_order_id = %ack.client_order_id,
                    attempt,
                    fills = fill.fills,
                    qty = %fill.quantity,
                    total = %fill.total,
                    "Execution found"
                );
                return Ok(OrderOutcome::Filled(fill));
            }

            debug!(order_id = %ack.order_id, attempt, "Execution not visible yet");
            if attempt < poll.attempts && !poll.interval.is_zero() {
                tokio::time::sleep(poll.interval).await;
            }
        }

        warn!(
            order_id = %ack.order_id,
            client_order_id = %ack.client_order_id,
            attempts = poll.attempts,
            "Execution not found"
        );
        Ok(OrderOutcome::Unconfirmed {
            order_id: ack.order_id.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
