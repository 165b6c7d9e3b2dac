//! Test-only helper to plant a descriptor directly, without going through
//! the registry crate (which depends on this one, so it can't be used
//! here without a cycle).

#![cfg(test)]

use ringtsdb_core::backend::KvBackend;
use ringtsdb_core::keycodec::descriptor_key;
use ringtsdb_core::types::{MetricDescriptor, MetricId, SampleType, Tags};

pub async fn create_metric(
    backend: &dyn KvBackend,
    name: &str,
    tags: Tags,
    sample_type: SampleType,
    step: u32,
    slots: u32,
) -> MetricId {
    let metric_id = 1;
    let descriptor = MetricDescriptor {
        name: name.to_string(),
        tags,
        step,
        slots,
        sample_type,
        created_at: 0,
        deleting: false,
    };
    let mut txn = backend.begin().await.unwrap();
    txn.set(descriptor_key(metric_id), descriptor.encode())
        .await
        .unwrap();
    txn.commit().await.unwrap();
    metric_id
}
