//! Command dispatch: one coin or every configured coin.

use anyhow::{Context, Result};
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;
use tracing::info;

use super::processor::{OrderProcessor, OrderReport};
use crate::config::CoinAmounts;
use crate::types::Side;

/// Printed between coins and around a bulk batch.
pub const SEPARATOR: &str = "*****************************";

/// Keyword selecting every configured coin.
pub const EVERYTHING: &str = "EVERYTHING";

/// What the command operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Coin(String),
    Everything,
}

impl FromStr for Target {
    type Err = String;

    /// Coin symbols are uppercased; `everything` in any case is the bulk
    /// keyword.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let symbol = s.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err("empty coin symbol".to_string());
        }
        if symbol == EVERYTHING {
            Ok(Target::Everything)
        } else {
            Ok(Target::Coin(symbol))
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Coin(c) => f.write_str(c),
            Target::Everything => f.write_str(EVERYTHING),
        }
    }
}

/// The phrase a user must type to confirm a bulk run, e.g. `SELL EVERYTHING`.
pub fn confirmation_phrase(side: Side) -> String {
    format!("{} {EVERYTHING}", side.as_str().to_ascii_uppercase())
}

/// Prompt on `output` and read one line from `input`.
///
/// Only an exact match of [`confirmation_phrase`] (surrounding line
/// terminator aside) confirms.
pub fn confirm_bulk<R: BufRead, W: Write>(side: Side, mut input: R, mut output: W) -> Result<bool> {
    let phrase = confirmation_phrase(side);
    write!(
        output,
        "Are you sure you want to {} everything?\nType '{phrase}' to confirm: ",
        side.as_str().to_ascii_lowercase()
    )?;
    output.flush()?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read confirmation")?;
    let answer = line.trim_end_matches(&['\r', '\n'][..]);

    Ok(answer == phrase)
}

/// Counts across a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub filled: usize,
    pub unconfirmed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_reports(reports: &[OrderReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            if report.outcome.is_filled() {
                summary.filled += 1;
            } else if report.outcome.is_skipped() {
                summary.skipped += 1;
            } else if report.outcome.is_failure() {
                summary.failed += 1;
            } else {
                summary.unconfirmed += 1;
            }
        }
        summary
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Done: {} filled, {} unconfirmed, {} skipped, {} failed.",
            self.filled, self.unconfirmed, self.skipped, self.failed
        )
    }
}

/// Runs a confirmed command against the processor.
pub struct Dispatcher<'a> {
    processor: &'a OrderProcessor<'a>,
    coins: &'a CoinAmounts,
}

impl<'a> Dispatcher<'a> {
    pub fn new(processor: &'a OrderProcessor<'a>, coins: &'a CoinAmounts) -> Self {
        Self { processor, coins }
    }

    /// Ask for confirmation of a bulk run on `input`/`output`, then run it.
    ///
    /// A single coin runs without a prompt. A declined bulk run processes
    /// no coin and returns no reports.
    pub async fn confirm_and_run<R: BufRead, W: Write>(
        &self,
        side: Side,
        target: &Target,
        input: R,
        mut output: W,
    ) -> Result<Vec<OrderReport>> {
        if *target == Target::Everything {
            let confirmed = confirm_bulk(side, input, &mut output)?;
            writeln!(output, "{SEPARATOR}")?;
            if !confirmed {
                writeln!(output, "Operation canceled.")?;
                info!(side = %side, "Bulk run canceled at confirmation");
                return Ok(Vec::new());
            }
        }

        Ok(self.run(side, target).await)
    }

    /// Process `target` and print each report as it completes.
    ///
    /// Bulk sells size every coin from its wallet; bulk buys use each
    /// coin's configured amount.
    pub async fn run(&self, side: Side, target: &Target) -> Vec<OrderReport> {
        match target {
            Target::Coin(coin) => {
                let report = self.processor.process(side, coin, None).await;
                println!("{report}");
                vec![report]
            }
            Target::Everything => {
                info!(side = %side, coins = self.coins.len(), "Starting bulk run");
                let mut reports = Vec::with_capacity(self.coins.len());

                for (coin, amount) in self.coins.iter() {
                    let quantity = match side {
                        Side::Sell => None,
                        Side::Buy => Some(amount),
                    };
                    let report = self.processor.process(side, coin, quantity).await;
                    println!("{report}");
                    println!("{SEPARATOR}");
                    reports.push(report);
                }

                println!("{}", BatchSummary::from_reports(&reports));
                reports
            }
        }
    }
}
