//! Client test support utilities
//!
//! Unified logging initialization for integration tests and helpers that mint
//! real signed session tokens.

pub mod test_logging;
pub mod tokens;
