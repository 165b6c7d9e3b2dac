//! Core types shared by the ring storage engine and the query layer.
//!
//! This crate defines the foundational building blocks used throughout
//! ringtsdb:
//! - `error`: the unified error kind hierarchy
//! - `limits`: configurable size/time budgets (`RingConfig`)
//! - `types`: metric identity and sample-type types (`MetricId`, `SampleType`, `Tags`)
//! - `keycodec`: tagged-tuple key encoding for the `(1..6)` key families
//! - `record`: fixed-schema value encoding (descriptor, sample, counter state)
//! - `backend`: the transactional KV store abstraction (`KvBackend`/`KvTransaction`)
//! - `deadline`: operation deadlines threaded through every backend round-trip
//! - `mathfns`: pure time-series arithmetic shared by storage and the query UDFs

#![warn(missing_docs)]

pub mod backend;
pub mod deadline;
pub mod error;
pub mod keycodec;
pub mod limits;
pub mod mathfns;
pub mod record;
pub mod types;

pub use backend::{KvBackend, KvTransaction};
pub use deadline::Deadline;
pub use error::{Error, Result};
pub use limits::RingConfig;
pub use types::{MetricId, SampleType, Tags};
