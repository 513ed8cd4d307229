//! Core of a simulated single-pair crypto exchange.
//!
//! Wallets hold a fiat and a crypto balance, identified by a 12-word
//! recovery phrase. Market trades settle at the latest candle close, limit
//! orders escrow funds until a background matcher executes them, and
//! price history is served raw or downsampled from a minute-candle series.
//!
//! [`exchange::Exchange`] is the entry point; storage is injected through
//! the traits in [`store`].

pub mod clock;
pub mod config;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod money;
pub mod orders;
pub mod price;
pub mod profit;
pub mod store;
pub mod trade;

pub use error::{ExchangeError, Result};
