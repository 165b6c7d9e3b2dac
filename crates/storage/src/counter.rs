//! Counter state: advisory last-raw-value tracking for cumulative counters.
//!
//! Reset detection itself is a query-time concern (`bucket_rate` in
//! `ringtsdb-core::mathfns` / the `counter_rate` window UDF in
//! `ringtsdb-query`); this module only stores the raw cumulative value in
//! the sample ring and maintains the advisory `(3, metric_id)` state that
//! `last_ts`/`last_raw` hints are read from.

use ringtsdb_core::backend::KvBackend;
use ringtsdb_core::error::{Error, Result};
use ringtsdb_core::keycodec::{counter_key, descriptor_key, sample_key};
use ringtsdb_core::record::{CounterStateRecord, SampleRecord};
use ringtsdb_core::types::{MetricDescriptor, MetricId};
use tracing::debug;

/// Ingest one raw cumulative counter value.
///
/// Writes the raw value into the sample ring exactly like a gauge write,
/// then updates `(3, metric_id)` to `{ts, raw_value}` *only if* `ts` is no
/// earlier than the counter state's current `last_ts` — this is what keeps
/// invariant I6 (`last_ts` never regresses below an earlier ingested
/// sample) even if ingests arrive out of order.
pub async fn ingest_counter(
    backend: &dyn KvBackend,
    metric_id: MetricId,
    ts: i64,
    raw_value: f64,
) -> Result<u32> {
    let mut txn = backend.begin().await?;
    let desc_bytes = txn
        .get(&descriptor_key(metric_id))
        .await?
        .ok_or_else(|| Error::NotFound(format!("metric {metric_id} has no descriptor")))?;
    let descriptor = MetricDescriptor::decode(&desc_bytes)?;
    if descriptor.deleting {
        return Err(Error::NotFound(format!(
            "metric {metric_id} is being deleted"
        )));
    }

    let slot = descriptor.slot_for(ts);
    let record = SampleRecord { ts, value: raw_value };
    txn.set(sample_key(metric_id, slot), record.encode()).await?;

    let prior = txn
        .get(&counter_key(metric_id))
        .await?
        .map(|bytes| CounterStateRecord::decode(&bytes))
        .transpose()?;
    if prior.map(|p| ts >= p.last_ts).unwrap_or(true) {
        let state = CounterStateRecord {
            last_ts: ts,
            last_raw: raw_value,
        };
        txn.set(counter_key(metric_id), state.encode()).await?;
    }

    txn.commit().await?;
    debug!(metric_id, ts, raw_value, slot, "ingested counter sample");
    Ok(slot)
}

/// Read the advisory counter state, if any has been recorded.
pub async fn read_counter_state(
    backend: &dyn KvBackend,
    metric_id: MetricId,
) -> Result<Option<CounterStateRecord>> {
    let mut txn = backend.begin_read_only().await?;
    txn.get(&counter_key(metric_id))
        .await?
        .map(|bytes| CounterStateRecord::decode(&bytes))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_metric;
    use crate::testing::MemoryBackend;
    use ringtsdb_core::mathfns::bucket_rate;
    use ringtsdb_core::types::{SampleType, Tags};

    #[tokio::test]
    async fn counter_rate_scenario_from_spec() {
        let backend = MemoryBackend::default();
        let id = create_metric(&backend, "c", Tags::new(), SampleType::Counter, 60, 10).await;

        let raws = [(0i64, 100.0), (60, 160.0), (120, 180.0), (180, 50.0)];
        for (ts, raw) in raws {
            ingest_counter(&backend, id, ts, raw).await.unwrap();
        }

        let mut prev = None;
        let mut rates = Vec::new();
        for (_, raw) in raws {
            rates.push(bucket_rate(raw, prev, 60));
            prev = Some(raw);
        }
        assert_eq!(rates[0], None);
        assert_eq!(rates[1], Some(1.0));
        assert!((rates[2].unwrap() - (20.0 / 60.0)).abs() < 1e-12);
        assert_eq!(rates[3], Some(0.0));
    }

    #[tokio::test]
    async fn out_of_order_ingest_never_regresses_last_ts() {
        let backend = MemoryBackend::default();
        let id = create_metric(&backend, "c", Tags::new(), SampleType::Counter, 1, 100).await;
        ingest_counter(&backend, id, 100, 50.0).await.unwrap();
        ingest_counter(&backend, id, 50, 10.0).await.unwrap();
        let state = read_counter_state(&backend, id).await.unwrap().unwrap();
        assert_eq!(state.last_ts, 100);
        assert_eq!(state.last_raw, 50.0);
    }
}
