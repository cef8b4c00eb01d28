//! Order engine: quantity sizing, the submit/retry/poll state machine and
//! command dispatch.

pub mod dispatcher;
pub mod processor;
pub mod quantity;
