//! Integration tests: order flows against an in-memory exchange.

mod mock_exchange;
