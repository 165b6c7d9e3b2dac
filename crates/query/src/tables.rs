//! Virtual tables: component E.
//!
//! `metrics` and `metric_tags` are bounded (spec says "small enough to
//! buffer") and backed by an Arrow `MemTable` built once per query from the
//! orchestrator's pre-fetched descriptor set. `samples` buffers each
//! `metric_id`'s `read_range` result into its own partition at `scan` time —
//! one partition per series, not one flat batch — so DataFusion can at least
//! schedule per-series work independently, even though each partition is
//! still materialized eagerly rather than yielded incrementally.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::datasource::memory::MemTable;
use datafusion::datasource::{TableProvider, TableType};
use datafusion::error::{DataFusionError, Result as DfResult};
use datafusion::execution::context::SessionState;
use datafusion::logical_expr::{Expr, Operator, TableProviderFilterPushDown};
use datafusion::physical_plan::memory::MemoryExec;
use datafusion::physical_plan::ExecutionPlan;

use ringtsdb_core::backend::KvBackend;
use ringtsdb_core::deadline::Deadline;
use ringtsdb_core::limits::RingConfig;
use ringtsdb_core::types::{MetricDescriptor, MetricId, SampleType};
use ringtsdb_storage::read_range;

/// `(metric_id, alias, ts, value)` — one row per stored sample. `alias` is
/// the name a query addresses this series by (the selector's `alias`, or
/// the `metric_id` itself for a directly-supplied id); `counter_rate`
/// partitions on it.
pub fn samples_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("metric_id", DataType::UInt64, false),
        Field::new("alias", DataType::Utf8, false),
        Field::new("ts", DataType::Int64, false),
        Field::new("value", DataType::Float64, false),
    ]))
}

/// `(metric_id, name, step, slots, sample_type)` — one row per descriptor.
pub fn metrics_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("metric_id", DataType::UInt64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("step", DataType::Int64, false),
        Field::new("slots", DataType::Int64, false),
        Field::new("sample_type", DataType::Utf8, false),
    ]))
}

/// `(metric_id, tag_key, tag_value)` — one row per tag on a descriptor.
pub fn metric_tags_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("metric_id", DataType::UInt64, false),
        Field::new("tag_key", DataType::Utf8, false),
        Field::new("tag_value", DataType::Utf8, false),
    ]))
}

fn sample_type_name(t: SampleType) -> &'static str {
    match t {
        SampleType::Gauge => "gauge",
        SampleType::Counter => "counter",
    }
}

/// Build the `metrics` table from a pre-fetched descriptor set.
pub fn metrics_table(descriptors: &[(MetricId, MetricDescriptor)]) -> DfResult<MemTable> {
    let ids: UInt64Array = descriptors.iter().map(|(id, _)| *id).collect();
    let names: StringArray = descriptors.iter().map(|(_, d)| Some(d.name.clone())).collect();
    let steps: Int64Array = descriptors.iter().map(|(_, d)| d.step as i64).collect();
    let slots: Int64Array = descriptors.iter().map(|(_, d)| d.slots as i64).collect();
    let types: StringArray = descriptors
        .iter()
        .map(|(_, d)| Some(sample_type_name(d.sample_type)))
        .collect();

    let batch = RecordBatch::try_new(
        metrics_schema(),
        vec![
            Arc::new(ids),
            Arc::new(names),
            Arc::new(steps),
            Arc::new(slots),
            Arc::new(types),
        ],
    )?;
    MemTable::try_new(metrics_schema(), vec![vec![batch]])
}

/// Build the `metric_tags` table from a pre-fetched descriptor set.
pub fn metric_tags_table(descriptors: &[(MetricId, MetricDescriptor)]) -> DfResult<MemTable> {
    let mut ids = Vec::new();
    let mut keys = Vec::new();
    let mut values = Vec::new();
    for (id, d) in descriptors {
        for (k, v) in &d.tags {
            ids.push(*id);
            keys.push(k.clone());
            values.push(v.clone());
        }
    }
    let batch = RecordBatch::try_new(
        metric_tags_schema(),
        vec![
            Arc::new(UInt64Array::from(ids)),
            Arc::new(StringArray::from(keys)),
            Arc::new(StringArray::from(values)),
        ],
    )?;
    MemTable::try_new(metric_tags_schema(), vec![vec![batch]])
}

/// Whether `expr` is (or, for a top-level `AND`, contains) a predicate that
/// constrains `metric_id` (`=`/`IN (...)`) or `ts` (comparison/`BETWEEN`) —
/// the two shapes spec names as proof a `samples` query isn't an unbounded
/// scan.
pub(crate) fn is_qualifying_predicate(expr: &Expr) -> bool {
    match expr {
        Expr::BinaryExpr(b) if b.op == Operator::And => {
            is_qualifying_predicate(&b.left) || is_qualifying_predicate(&b.right)
        }
        Expr::BinaryExpr(b) => {
            matches!(
                b.op,
                Operator::Eq | Operator::Gt | Operator::GtEq | Operator::Lt | Operator::LtEq
            ) && (is_metric_id_or_ts(&b.left) || is_metric_id_or_ts(&b.right))
        }
        Expr::Between(between) => is_metric_id_or_ts(&between.expr),
        Expr::InList(in_list) => column_name(&in_list.expr).as_deref() == Some("metric_id"),
        _ => false,
    }
}

fn is_metric_id_or_ts(expr: &Expr) -> bool {
    matches!(column_name(expr).as_deref(), Some("metric_id") | Some("ts"))
}

fn column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Column(c) => Some(c.name.clone()),
        _ => None,
    }
}

/// `samples` table: one `read_range` call per `metric_id`, resolved at
/// `scan` time into its own partition (the per-metric ring scans are
/// already bounded by the caller's `[start_ts, end_ts]` window — see
/// `orchestrator::query`'s rejection of unbounded windows — so buffering
/// each one is safe).
pub struct SamplesTable {
    backend: Arc<dyn KvBackend>,
    config: RingConfig,
    metric_ids: Vec<MetricId>,
    aliases: HashMap<MetricId, String>,
    start_ts: i64,
    end_ts: i64,
}

impl SamplesTable {
    /// Build a `samples` provider scoped to `metric_ids` and `[start_ts, end_ts]`,
    /// with each id's rows tagged by the `alias` it was resolved under.
    pub fn new(
        backend: Arc<dyn KvBackend>,
        config: RingConfig,
        metric_ids: Vec<MetricId>,
        aliases: HashMap<MetricId, String>,
        start_ts: i64,
        end_ts: i64,
    ) -> Self {
        SamplesTable {
            backend,
            config,
            metric_ids,
            aliases,
            start_ts,
            end_ts,
        }
    }
}

#[async_trait]
impl TableProvider for SamplesTable {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        samples_schema()
    }

    fn table_type(&self) -> TableType {
        TableType::Base
    }

    fn supports_filters_pushdown(
        &self,
        filters: &[&Expr],
    ) -> DfResult<Vec<TableProviderFilterPushDown>> {
        Ok(filters
            .iter()
            .map(|f| {
                if is_qualifying_predicate(f) {
                    TableProviderFilterPushDown::Inexact
                } else {
                    TableProviderFilterPushDown::Unsupported
                }
            })
            .collect())
    }

    async fn scan(
        &self,
        _state: &SessionState,
        projection: Option<&Vec<usize>>,
        _filters: &[Expr],
        _limit: Option<usize>,
    ) -> DfResult<Arc<dyn ExecutionPlan>> {
        let mut partitions: Vec<Vec<RecordBatch>> = Vec::with_capacity(self.metric_ids.len());
        for &metric_id in &self.metric_ids {
            let rows = read_range(
                self.backend.as_ref(),
                metric_id,
                self.start_ts,
                self.end_ts,
                &self.config,
                Deadline::far_future(),
            )
            .await
            .map_err(|e| DataFusionError::External(Box::new(e)))?;
            if rows.is_empty() {
                continue;
            }
            let alias = self
                .aliases
                .get(&metric_id)
                .cloned()
                .unwrap_or_else(|| metric_id.to_string());
            let ids = UInt64Array::from(vec![metric_id; rows.len()]);
            let aliases = StringArray::from(vec![alias; rows.len()]);
            let tss: Int64Array = rows.iter().map(|(ts, _)| *ts).collect();
            let values: Float64Array = rows.iter().map(|(_, v)| *v).collect();
            partitions.push(vec![RecordBatch::try_new(
                samples_schema(),
                vec![Arc::new(ids), Arc::new(aliases), Arc::new(tss), Arc::new(values)],
            )?]);
        }
        let exec = MemoryExec::try_new(&partitions, self.schema(), projection.cloned())?;
        Ok(Arc::new(exec))
    }
}
