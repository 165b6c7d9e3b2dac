//! Metric registry: component B.
//!
//! - `registry`: `ensure`/`lookup`/`get_descriptor`/`delete`/
//!   `retention_rewrite` over the `(2, metric_id)` descriptor, `(4, name)`
//!   name index, and `(5, name, tag_key, tag_value)` tag index key
//!   families.
//! - `dashboards`: the opaque `(6, slug)` blob store.

#![warn(missing_docs)]

pub mod dashboards;
pub mod registry;

pub use registry::{delete, ensure, get_descriptor, lookup, retention_rewrite};
