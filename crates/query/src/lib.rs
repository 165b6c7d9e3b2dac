//! Query layer: components E–G.
//!
//! - `tables`: `samples`/`metrics`/`metric_tags` as DataFusion
//!   `TableProvider`s.
//! - `udf`: the time-series scalar/window functions wrapping
//!   `ringtsdb_core::mathfns`.
//! - `orchestrator`: the five-step `query` entry point.

#![warn(missing_docs)]

pub mod orchestrator;
pub mod tables;
pub mod udf;

pub use orchestrator::{query, Selector};
