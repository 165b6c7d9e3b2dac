//! Opaque dashboard blob store: `(6, slug)`.
//!
//! Dashboards have no schema this crate understands — they're stored and
//! returned byte-for-byte, with a CRC32 integrity check on read.

use ringtsdb_core::backend::KvBackend;
use ringtsdb_core::error::{Error, Result};
use ringtsdb_core::keycodec::{dashboard_key, encode_key, prefix_range_end, KeyElem};
use ringtsdb_core::record::{decode_dashboard_blob, encode_dashboard_blob};

/// Store a dashboard's payload under `slug`, overwriting any prior value.
pub async fn put(backend: &dyn KvBackend, slug: &str, payload: &[u8]) -> Result<()> {
    let mut txn = backend.begin().await?;
    txn.set(dashboard_key(slug), encode_dashboard_blob(payload))
        .await?;
    txn.commit().await?;
    Ok(())
}

/// Fetch a dashboard's payload, `NOT_FOUND` if `slug` is unknown.
pub async fn get(backend: &dyn KvBackend, slug: &str) -> Result<Vec<u8>> {
    let mut txn = backend.begin_read_only().await?;
    let bytes = txn
        .get(&dashboard_key(slug))
        .await?
        .ok_or_else(|| Error::NotFound(format!("dashboard {slug} not found")))?;
    decode_dashboard_blob(&bytes)
}

/// Remove a dashboard. Idempotent: clearing an absent slug succeeds.
pub async fn delete(backend: &dyn KvBackend, slug: &str) -> Result<()> {
    let mut txn = backend.begin().await?;
    txn.clear(&dashboard_key(slug)).await?;
    txn.commit().await?;
    Ok(())
}

/// List every stored dashboard's raw key bytes; used only to discover
/// slugs, since family `6` keys carry the slug as their only payload.
pub async fn list_keys(backend: &dyn KvBackend) -> Result<Vec<Vec<u8>>> {
    let prefix = encode_key(&[KeyElem::U64(6)]);
    let end = prefix_range_end(&prefix);
    let mut txn = backend.begin_read_only().await?;
    let pairs = txn.get_range(&prefix, &end, None).await?;
    Ok(pairs.into_iter().map(|(k, _)| k).collect())
}
