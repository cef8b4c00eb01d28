//! bybit-trader: one-shot Bybit spot market orders.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod engine;
pub mod exchange;
pub mod types;
