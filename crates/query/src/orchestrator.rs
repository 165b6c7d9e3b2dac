//! Query orchestrator: component G.
//!
//! Five steps, matching spec §4.G exactly: (1) build a session with only the
//! three virtual tables and the registered UDFs visible, rejecting anything
//! else as `VALIDATION`; (2) resolve `metric_ids`/selectors to a concrete,
//! aliased set of `metric_id`s, failing `NOT_FOUND` on an empty resolution;
//! (3) pre-fetch descriptors/tags into `metrics`/`metric_tags`; (4) build the
//! `samples` source; (5) execute and return rows.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use datafusion::arrow::record_batch::RecordBatch;
use datafusion::error::DataFusionError;
use datafusion::logical_expr::LogicalPlan;
use datafusion::prelude::SessionContext;
use tracing::debug;

use ringtsdb_core::backend::KvBackend;
use ringtsdb_core::error::{Error, Result};
use ringtsdb_core::limits::RingConfig;
use ringtsdb_core::types::{MetricDescriptor, MetricId, Tags};
use ringtsdb_registry::{get_descriptor, lookup};

use crate::tables::{
    is_qualifying_predicate, metric_tags_table, metrics_table, SamplesTable,
};
use crate::udf;

const ALLOWED_TABLES: [&str; 3] = ["samples", "metrics", "metric_tags"];

/// A `(name, tags)` pair resolved through the registry, tagged with the
/// `alias` a query's SQL addresses it by — the HTTP surface's `selectors?:
/// [{metric,alias,tags}]` payload shape (spec §6). Every series matched by
/// `(name, tags)` (a partial tag match, same rule as `lookup`) is tagged
/// with the same `alias`, so `PARTITION BY alias` in `counter_rate` and
/// `series_add`/`series_sub`/etc. across aliased series both have a column
/// to work with.
#[derive(Debug, Clone)]
pub struct Selector {
    /// Metric name to resolve via the name index.
    pub name: String,
    /// Tags every matched series must carry (a superset match).
    pub tags: Tags,
    /// The name this selector's rows are tagged with in `samples.alias`.
    pub alias: String,
}

fn to_validation(e: DataFusionError) -> Error {
    Error::Validation(e.to_string())
}

fn to_backend_fatal(e: DataFusionError) -> Error {
    Error::BackendFatal(e.to_string())
}

/// Walk a logical plan rejecting any table scan outside
/// `samples`/`metrics`/`metric_tags`, and rejecting a `samples` scan reached
/// with no predicate constraining `metric_id` or `ts` (scenario 6: no
/// unbounded scans, independent of the `[start_ts, end_ts]` function
/// arguments already enforced in `query`). Unregistered scalar/window
/// functions are already rejected earlier, by `SessionContext::sql` itself
/// failing to resolve them — DataFusion never builds a plan node for a
/// function it can't find.
fn validate_plan(plan: &LogicalPlan) -> Result<()> {
    walk_plan(plan, false)
}

fn walk_plan(plan: &LogicalPlan, predicate_seen: bool) -> Result<()> {
    match plan {
        LogicalPlan::TableScan(scan) => {
            let name = scan.table_name.table();
            if !ALLOWED_TABLES.contains(&name) {
                return Err(Error::Validation(format!(
                    "query references unknown table {name}"
                )));
            }
            if name == "samples" {
                let pushed_down = scan.filters.iter().any(is_qualifying_predicate);
                if !predicate_seen && !pushed_down {
                    return Err(Error::Validation(
                        "queries against samples must filter on metric_id or ts (no unbounded scans)"
                            .into(),
                    ));
                }
            }
            Ok(())
        }
        LogicalPlan::Filter(filter) => {
            let seen = predicate_seen || is_qualifying_predicate(&filter.predicate);
            walk_plan(&filter.input, seen)
        }
        other => {
            for input in other.inputs() {
                walk_plan(input, predicate_seen)?;
            }
            Ok(())
        }
    }
}

fn register_udfs(ctx: &SessionContext) {
    ctx.register_udf(udf::ts_bucket_udf());
    ctx.register_udf(udf::align_time_udf());
    ctx.register_udf(udf::bucket_rate_udf());
    ctx.register_udf(udf::clamp_udf());
    ctx.register_udf(udf::null_if_outside_udf());
    ctx.register_udf(udf::series_add_udf());
    ctx.register_udf(udf::series_sub_udf());
    ctx.register_udf(udf::series_mul_udf());
    ctx.register_udf(udf::series_div_udf());
    ctx.register_udwf(udf::counter_rate_udf());
}

async fn resolve_selectors(
    backend: &dyn KvBackend,
    config: &RingConfig,
    metric_ids: &[MetricId],
    selectors: &[Selector],
) -> Result<(Vec<(MetricId, MetricDescriptor)>, HashMap<MetricId, String>)> {
    let mut descriptors: Vec<(MetricId, MetricDescriptor)> = Vec::new();
    let mut aliases: HashMap<MetricId, String> = HashMap::new();
    let mut seen: HashSet<MetricId> = HashSet::new();

    for &metric_id in metric_ids {
        let descriptor = get_descriptor(backend, metric_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no series with metric_id={metric_id}")))?;
        aliases.insert(metric_id, metric_id.to_string());
        if seen.insert(metric_id) {
            descriptors.push((metric_id, descriptor));
        }
    }

    for selector in selectors {
        let matched = lookup(
            backend,
            config,
            &selector.name,
            Some(&selector.tags),
            config.max_lookup_results,
            None,
        )
        .await?;
        if matched.is_empty() {
            return Err(Error::NotFound(format!(
                "no series match name={}",
                selector.name
            )));
        }
        for (id, descriptor) in matched {
            aliases.insert(id, selector.alias.clone());
            if seen.insert(id) {
                descriptors.push((id, descriptor));
            }
        }
    }

    Ok((descriptors, aliases))
}

/// Run `sql` over the samples of every series named directly by
/// `metric_ids` and/or resolved through `selectors`, within `[start_ts,
/// end_ts]`.
///
/// `VALIDATION` if `metric_ids` and `selectors` are both empty, if `sql`
/// references anything but the three virtual tables or the registered UDFs,
/// if a `samples` reference carries no `metric_id`/`ts` predicate ("no
/// unbounded scans", spec §4.E/§8 scenario 6), or if the requested window
/// exceeds `configured_max_window`. `NOT_FOUND` if a selector or a direct
/// `metric_id` resolves to no series.
pub async fn query(
    backend: Arc<dyn KvBackend>,
    config: &RingConfig,
    metric_ids: Vec<MetricId>,
    selectors: &[Selector],
    start_ts: i64,
    end_ts: i64,
    sql: &str,
) -> Result<Vec<RecordBatch>> {
    if metric_ids.is_empty() && selectors.is_empty() {
        return Err(Error::Validation(
            "query needs at least one metric_id or selector".into(),
        ));
    }
    if end_ts < start_ts {
        return Err(Error::Validation("end_ts must be >= start_ts".into()));
    }
    let window = end_ts - start_ts;
    if window > config.configured_max_window {
        return Err(Error::LimitExceeded(format!(
            "requested window {window}s exceeds configured_max_window {}",
            config.configured_max_window
        )));
    }

    let (descriptors, aliases) =
        resolve_selectors(backend.as_ref(), config, &metric_ids, selectors).await?;
    let resolved_ids: Vec<MetricId> = descriptors.iter().map(|(id, _)| *id).collect();
    debug!(
        direct = metric_ids.len(),
        selectors = selectors.len(),
        matched = resolved_ids.len(),
        "resolved selectors"
    );

    let ctx = SessionContext::new();
    register_udfs(&ctx);
    ctx.register_table(
        "metrics",
        Arc::new(metrics_table(&descriptors).map_err(to_backend_fatal)?),
    )
    .map_err(to_backend_fatal)?;
    ctx.register_table(
        "metric_tags",
        Arc::new(metric_tags_table(&descriptors).map_err(to_backend_fatal)?),
    )
    .map_err(to_backend_fatal)?;
    ctx.register_table(
        "samples",
        Arc::new(SamplesTable::new(
            Arc::clone(&backend),
            config.clone(),
            resolved_ids,
            aliases,
            start_ts,
            end_ts,
        )),
    )
    .map_err(to_backend_fatal)?;

    let df = ctx.sql(sql).await.map_err(to_validation)?;
    validate_plan(df.logical_plan())?;
    df.collect().await.map_err(to_validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringtsdb_core::types::SampleType;
    use ringtsdb_registry::ensure;
    use ringtsdb_storage::testing::MemoryBackend;
    use ringtsdb_storage::write_sample;

    fn selector(name: &str) -> Selector {
        Selector {
            name: name.to_string(),
            tags: Tags::new(),
            alias: name.to_string(),
        }
    }

    #[tokio::test]
    async fn query_rejects_unbounded_window() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::default());
        let config = RingConfig::default();
        ensure(backend.as_ref(), &config, "cpu", &Tags::new(), SampleType::Gauge, 60, 10)
            .await
            .unwrap();
        let err = query(
            backend,
            &config,
            Vec::new(),
            &[selector("cpu")],
            0,
            config.configured_max_window + 1,
            "SELECT * FROM samples WHERE ts BETWEEN 0 AND 1",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::LimitExceeded(_)));
    }

    #[tokio::test]
    async fn query_rejects_unknown_metric_name() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::default());
        let config = RingConfig::default();
        let err = query(
            backend,
            &config,
            Vec::new(),
            &[selector("ghost")],
            0,
            60,
            "SELECT * FROM samples WHERE ts BETWEEN 0 AND 60",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn query_returns_rows_for_a_simple_select() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::default());
        let config = RingConfig::default();
        let id = ensure(backend.as_ref(), &config, "cpu", &Tags::new(), SampleType::Gauge, 1, 10)
            .await
            .unwrap();
        write_sample(backend.as_ref(), id, 0, 42.0).await.unwrap();

        let batches = query(
            backend,
            &config,
            Vec::new(),
            &[selector("cpu")],
            0,
            9,
            "SELECT * FROM samples WHERE ts BETWEEN 0 AND 9",
        )
        .await
        .unwrap();
        let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total_rows, 1);
    }

    #[tokio::test]
    async fn query_rejects_reference_to_unknown_table() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::default());
        let config = RingConfig::default();
        ensure(backend.as_ref(), &config, "cpu", &Tags::new(), SampleType::Gauge, 60, 10)
            .await
            .unwrap();
        let err = query(
            backend,
            &config,
            Vec::new(),
            &[selector("cpu")],
            0,
            60,
            "SELECT * FROM information_schema.tables",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn query_rejects_samples_scan_with_no_bounding_predicate() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::default());
        let config = RingConfig::default();
        ensure(backend.as_ref(), &config, "cpu", &Tags::new(), SampleType::Gauge, 60, 10)
            .await
            .unwrap();
        let err = query(
            backend,
            &config,
            Vec::new(),
            &[selector("cpu")],
            0,
            60,
            "SELECT * FROM samples",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn query_joins_two_aliased_series_with_series_add() {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::default());
        let config = RingConfig::default();
        let a = ensure(backend.as_ref(), &config, "a", &Tags::new(), SampleType::Gauge, 1, 10)
            .await
            .unwrap();
        let b = ensure(backend.as_ref(), &config, "b", &Tags::new(), SampleType::Gauge, 1, 10)
            .await
            .unwrap();
        write_sample(backend.as_ref(), a, 0, 1.0).await.unwrap();
        write_sample(backend.as_ref(), b, 0, 2.0).await.unwrap();

        let selectors = vec![
            Selector { name: "a".into(), tags: Tags::new(), alias: "a".into() },
            Selector { name: "b".into(), tags: Tags::new(), alias: "b".into() },
        ];
        let batches = query(
            backend,
            &config,
            Vec::new(),
            &selectors,
            0,
            9,
            "SELECT alias, value FROM samples WHERE ts BETWEEN 0 AND 9 ORDER BY alias",
        )
        .await
        .unwrap();
        let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total_rows, 2);
    }
}
