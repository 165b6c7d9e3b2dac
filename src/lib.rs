//! ringtsdb: a bounded-storage-by-construction time-series database.
//!
//! Every metric is a fixed-length ring of slots in a transactional ordered
//! key-value store — writes always overwrite the previous value at a given
//! slot, so disk usage is `num_metrics * slots * record_size` regardless of
//! write volume. Query access is a vectorised SQL engine (DataFusion) fed by
//! the ring storage engine as three virtual tables: `samples`, `metrics`,
//! `metric_tags`.
//!
//! This crate is a thin re-export over the four crates that do the actual
//! work:
//!
//! - [`ringtsdb_core`]: key/value codecs, error kinds, config, the
//!   `KvBackend`/`KvTransaction` abstraction, and pure time-series math.
//! - [`ringtsdb_storage`]: the ring write/read path and counter state.
//! - [`ringtsdb_registry`]: metric creation, lookup, deletion, retention
//!   rewrite, and the dashboard blob store.
//! - [`ringtsdb_query`]: the SQL query orchestrator and its virtual
//!   tables/UDFs.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use ringtsdb::core::limits::RingConfig;
//! use ringtsdb::core::types::{SampleType, Tags};
//! use ringtsdb::storage::testing::MemoryBackend;
//! use ringtsdb::{registry, storage};
//!
//! # async fn run() -> ringtsdb::core::error::Result<()> {
//! let backend = Arc::new(MemoryBackend::default());
//! let config = RingConfig::default();
//!
//! let metric_id = registry::ensure(
//!     backend.as_ref(),
//!     &config,
//!     "cpu_usage",
//!     &Tags::new(),
//!     SampleType::Gauge,
//!     60,
//!     1440,
//! )
//! .await?;
//!
//! storage::write_sample(backend.as_ref(), metric_id, 1_700_000_000, 0.42).await?;
//! # Ok(())
//! # }
//! ```
//!
//! This workspace does not ship an HTTP surface, a persisted KV backend
//! client, or a browser front-end — those are out of scope here, left to a
//! binary crate built against this library.

#![warn(missing_docs)]

pub use ringtsdb_core as core;
pub use ringtsdb_query as query;
pub use ringtsdb_registry as registry;
pub use ringtsdb_storage as storage;
