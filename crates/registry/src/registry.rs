//! Metric creation, lookup, deletion, and retention rewrite.
//!
//! Every series is identified by `(name, tags)`; `ensure` is the only way a
//! `metric_id` comes into existence, and it's idempotent under concurrent
//! callers racing to create the same series (spec §4.B, scenario 4).

use ringtsdb_core::backend::KvBackend;
use ringtsdb_core::error::{Error, Result};
use ringtsdb_core::keycodec::{
    counter_key, descriptor_key, name_index_key, next_metric_id_key, prefix_range_end,
    sample_key, sample_range_prefix, tag_index_key,
};
use ringtsdb_core::limits::RingConfig;
use ringtsdb_core::record::{decode_metric_id_set, encode_metric_id_set, SampleRecord};
use ringtsdb_core::types::{MetricDescriptor, MetricId, SampleType, Tags};
use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Number of sample keys cleared (or rewritten) per backend transaction
/// while `delete`/`retention_rewrite` works through a metric's ring — keeps
/// each step comfortably under the transaction byte/time budget even for a
/// ring with hundreds of thousands of slots.
const CHUNK_SIZE: usize = 2048;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn validate_geometry(step: u32, slots: u32, config: &RingConfig) -> Result<()> {
    if step == 0 {
        return Err(Error::Validation("step must be >= 1".into()));
    }
    if slots == 0 {
        return Err(Error::Validation("slots must be >= 1".into()));
    }
    let window = step as i64 * slots as i64;
    if window > config.configured_max_window {
        return Err(Error::Validation(format!(
            "step * slots = {window} exceeds configured_max_window {}",
            config.configured_max_window
        )));
    }
    Ok(())
}

async fn find_existing(
    txn: &mut dyn ringtsdb_core::backend::KvTransaction,
    name: &str,
    tags: &Tags,
) -> Result<Option<(MetricId, MetricDescriptor)>> {
    let ids = match txn.get(&name_index_key(name)).await? {
        Some(bytes) => decode_metric_id_set(&bytes)?,
        None => Vec::new(),
    };
    for id in ids {
        if let Some(bytes) = txn.get(&descriptor_key(id)).await? {
            let descriptor = MetricDescriptor::decode(&bytes)?;
            if !descriptor.deleting && &descriptor.tags == tags {
                return Ok(Some((id, descriptor)));
            }
        }
    }
    Ok(None)
}

/// Create a series if it doesn't already exist, returning its `metric_id`
/// either way.
///
/// A second `ensure` for the same `(name, tags)` is a no-op that returns the
/// existing id, *except* that a type mismatch against the existing series
/// is rejected (invariant I5: sample type is immutable). Concurrent callers
/// racing to create the same series retry once on commit conflict
/// (`RingConfig::conflict_retry_attempts`) before surfacing `CONFLICT`.
pub async fn ensure(
    backend: &dyn KvBackend,
    config: &RingConfig,
    name: &str,
    tags: &Tags,
    sample_type: SampleType,
    step: u32,
    slots: u32,
) -> Result<MetricId> {
    if name.is_empty() {
        return Err(Error::Validation("metric name must not be empty".into()));
    }
    validate_geometry(step, slots, config)?;

    let attempts = config.conflict_retry_attempts + 1;
    for attempt in 0..attempts {
        let mut txn = backend.begin().await?;

        if let Some((id, existing)) = find_existing(txn.as_mut(), name, tags).await? {
            if existing.sample_type != sample_type {
                return Err(Error::TypeMismatch(format!(
                    "metric {name} already exists as {:?}, requested {:?}",
                    existing.sample_type, sample_type
                )));
            }
            return Ok(id);
        }

        let metric_id = match txn.get(&next_metric_id_key()).await? {
            Some(bytes) => u64::from_be_bytes(bytes.try_into().map_err(|_| {
                Error::BackendFatal("corrupt next_metric_id counter".into())
            })?) + 1,
            None => 1,
        };
        txn.set(next_metric_id_key(), metric_id.to_be_bytes().to_vec())
            .await?;

        let descriptor = MetricDescriptor {
            name: name.to_string(),
            tags: tags.clone(),
            step,
            slots,
            sample_type,
            created_at: now_unix(),
            deleting: false,
        };
        txn.set(descriptor_key(metric_id), descriptor.encode())
            .await?;

        let mut name_ids = match txn.get(&name_index_key(name)).await? {
            Some(bytes) => decode_metric_id_set(&bytes)?,
            None => Vec::new(),
        };
        name_ids.push(metric_id);
        txn.set(name_index_key(name), encode_metric_id_set(&name_ids))
            .await?;

        for (k, v) in tags {
            let key = tag_index_key(name, k, v);
            let mut ids = match txn.get(&key).await? {
                Some(bytes) => decode_metric_id_set(&bytes)?,
                None => Vec::new(),
            };
            ids.push(metric_id);
            txn.set(key, encode_metric_id_set(&ids)).await?;
        }

        match txn.commit().await {
            Ok(()) => {
                info!(metric_id, name, "created metric");
                return Ok(metric_id);
            }
            Err(Error::Conflict(reason)) => {
                debug!(name, attempt, reason, "ensure lost a commit race, retrying");
                continue;
            }
            Err(other) => return Err(other),
        }
    }

    Err(Error::Conflict(format!(
        "ensure({name}) lost the commit race {attempts} times in a row"
    )))
}

/// Look up every series named `name`, optionally filtered to an exact
/// (but partial) tag match — every `(k, v)` in `tags` must be present with
/// that value, but other tags on the series are unconstrained.
pub async fn lookup(
    backend: &dyn KvBackend,
    config: &RingConfig,
    name: &str,
    tags: Option<&Tags>,
    limit: usize,
    after_metric_id: Option<MetricId>,
) -> Result<Vec<(MetricId, MetricDescriptor)>> {
    let mut txn = backend.begin_read_only().await?;

    let mut ids: HashSet<MetricId> = match txn.get(&name_index_key(name)).await? {
        Some(bytes) => decode_metric_id_set(&bytes)?.into_iter().collect(),
        None => HashSet::new(),
    };

    if let Some(tags) = tags {
        for (k, v) in tags {
            let constrained: HashSet<MetricId> = match txn.get(&tag_index_key(name, k, v)).await? {
                Some(bytes) => decode_metric_id_set(&bytes)?.into_iter().collect(),
                None => HashSet::new(),
            };
            ids = ids.intersection(&constrained).copied().collect();
        }
    }

    let mut sorted: Vec<MetricId> = ids.into_iter().collect();
    sorted.sort_unstable();

    let effective_limit = limit.min(config.max_lookup_results);
    let mut out = Vec::new();
    for id in sorted {
        if let Some(cursor) = after_metric_id {
            if id <= cursor {
                continue;
            }
        }
        if out.len() >= effective_limit {
            break;
        }
        if let Some(bytes) = txn.get(&descriptor_key(id)).await? {
            let descriptor = MetricDescriptor::decode(&bytes)?;
            if !descriptor.deleting {
                out.push((id, descriptor));
            }
        }
    }
    Ok(out)
}

/// Fetch a single series' descriptor by `metric_id` directly, bypassing the
/// name/tag indexes — the counterpart to `lookup` for callers (like the
/// query orchestrator's `Selector::Id`) that already have a concrete id.
pub async fn get_descriptor(
    backend: &dyn KvBackend,
    metric_id: MetricId,
) -> Result<Option<MetricDescriptor>> {
    let mut txn = backend.begin_read_only().await?;
    match txn.get(&descriptor_key(metric_id)).await? {
        Some(bytes) => {
            let descriptor = MetricDescriptor::decode(&bytes)?;
            if descriptor.deleting {
                Ok(None)
            } else {
                Ok(Some(descriptor))
            }
        }
        None => Ok(None),
    }
}

/// Permanently remove a series: flips the descriptor to `deleting`, then
/// clears sample/counter/index keys in bounded batches. Safe to call more
/// than once, and safe to resume after a partial failure — every step is
/// individually idempotent.
pub async fn delete(backend: &dyn KvBackend, metric_id: MetricId) -> Result<()> {
    let descriptor = {
        let mut txn = backend.begin_read_only().await?;
        match txn.get(&descriptor_key(metric_id)).await? {
            Some(bytes) => Some(MetricDescriptor::decode(&bytes)?),
            None => None,
        }
    };
    let Some(mut descriptor) = descriptor else {
        debug!(metric_id, "delete of already-absent metric is a no-op");
        return Ok(());
    };

    if !descriptor.deleting {
        descriptor.deleting = true;
        let mut txn = backend.begin().await?;
        txn.set(descriptor_key(metric_id), descriptor.encode())
            .await?;
        txn.commit().await?;
    }

    let prefix = sample_range_prefix(metric_id);
    let end = prefix_range_end(&prefix);
    loop {
        let mut txn = backend.begin().await?;
        let batch = txn.get_range(&prefix, &end, Some(CHUNK_SIZE)).await?;
        if batch.is_empty() {
            txn.commit().await?;
            break;
        }
        for (key, _) in &batch {
            txn.clear(key).await?;
        }
        txn.commit().await?;
    }

    let mut txn = backend.begin().await?;
    txn.clear(&counter_key(metric_id)).await?;

    if let Some(bytes) = txn.get(&name_index_key(&descriptor.name)).await? {
        let mut ids = decode_metric_id_set(&bytes)?;
        ids.retain(|&id| id != metric_id);
        if ids.is_empty() {
            txn.clear(&name_index_key(&descriptor.name)).await?;
        } else {
            txn.set(name_index_key(&descriptor.name), encode_metric_id_set(&ids))
                .await?;
        }
    }

    for (k, v) in &descriptor.tags {
        let key = tag_index_key(&descriptor.name, k, v);
        if let Some(bytes) = txn.get(&key).await? {
            let mut ids = decode_metric_id_set(&bytes)?;
            ids.retain(|&id| id != metric_id);
            if ids.is_empty() {
                txn.clear(&key).await?;
            } else {
                txn.set(key, encode_metric_id_set(&ids)).await?;
            }
        }
    }

    txn.clear(&descriptor_key(metric_id)).await?;
    txn.commit().await?;
    info!(metric_id, "deleted metric");
    Ok(())
}

/// Re-bucket a gauge series onto new `(step, slots)` geometry in place.
///
/// Gauge-only (`TYPE_MISMATCH` on a counter). When two old samples map onto
/// the same new slot, the one with the *earlier* original timestamp is kept
/// — samples are replayed in ascending old-slot order and the first write
/// to a given new slot wins, matching the documented rewrite behavior
/// (spec §8 scenario 5: halving the slot width by doubling `step` keeps the
/// even-timestamped half of a densely-packed ring and drops the rest,
/// rather than always keeping the chronologically latest sample).
pub async fn retention_rewrite(
    backend: &dyn KvBackend,
    config: &RingConfig,
    metric_id: MetricId,
    new_step: u32,
    new_slots: u32,
) -> Result<()> {
    let mut descriptor = {
        let mut txn = backend.begin_read_only().await?;
        let bytes = txn
            .get(&descriptor_key(metric_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("metric {metric_id} has no descriptor")))?;
        MetricDescriptor::decode(&bytes)?
    };
    if descriptor.sample_type != SampleType::Gauge {
        return Err(Error::TypeMismatch(format!(
            "retention_rewrite is gauge-only, metric {metric_id} is {:?}",
            descriptor.sample_type
        )));
    }
    validate_geometry(new_step, new_slots, config)?;

    let prefix = sample_range_prefix(metric_id);
    let end = prefix_range_end(&prefix);
    let mut target_slots: HashMap<u32, SampleRecord> = HashMap::new();
    let mut scanned_old_slots: HashSet<Vec<u8>> = HashSet::new();

    let mut cursor = prefix.clone();
    loop {
        let batch = {
            let mut txn = backend.begin_read_only().await?;
            txn.get_range(&cursor, &end, Some(CHUNK_SIZE)).await?
        };
        if batch.is_empty() {
            break;
        }
        let last_key = batch.last().unwrap().0.clone();
        let short_batch = batch.len() < CHUNK_SIZE;
        for (key, value) in batch {
            scanned_old_slots.insert(key);
            let record = SampleRecord::decode(&value)?;
            let new_slot =
                (record.ts.div_euclid(new_step as i64)).rem_euclid(new_slots as i64) as u32;
            target_slots.entry(new_slot).or_insert(record);
        }
        if short_batch {
            break;
        }
        cursor = prefix_range_end(&last_key);
    }

    let mut txn = backend.begin().await?;
    for (slot, record) in &target_slots {
        txn.set(sample_key(metric_id, *slot), record.encode())
            .await?;
    }
    let written_keys: HashSet<Vec<u8>> = target_slots
        .keys()
        .map(|slot| sample_key(metric_id, *slot))
        .collect();
    for key in &scanned_old_slots {
        if !written_keys.contains(key) {
            txn.clear(key).await?;
        }
    }

    descriptor.step = new_step;
    descriptor.slots = new_slots;
    txn.set(descriptor_key(metric_id), descriptor.encode())
        .await?;
    txn.commit().await?;

    info!(metric_id, new_step, new_slots, "rewrote retention window");
    Ok(())
}
