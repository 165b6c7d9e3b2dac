//! Time-series UDFs: component F.
//!
//! Every scalar function here is a thin Arrow-array adapter over
//! `ringtsdb_core::mathfns` — the arithmetic itself lives there so it can be
//! unit-tested without a `SessionContext`. `counter_rate` is the one
//! windowed aggregate (`PARTITION BY alias ORDER BY bucket`), implemented
//! as a `WindowUDF`/`PartitionEvaluator` pair since it needs the previous
//! row's value, not just the current one.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array};
use arrow::datatypes::DataType;
use datafusion::common::cast::{as_float64_array, as_int64_array};
use datafusion::error::Result as DfResult;
use datafusion::logical_expr::{
    create_udf, ColumnarValue, PartitionEvaluator, ScalarFunctionImplementation, ScalarUDF,
    Signature, Volatility, WindowUDF, WindowUDFImpl,
};

use ringtsdb_core::mathfns;

fn resolve_num_rows(args: &[ColumnarValue]) -> usize {
    args.iter()
        .find_map(|a| match a {
            ColumnarValue::Array(arr) => Some(arr.len()),
            ColumnarValue::Scalar(_) => None,
        })
        .unwrap_or(1)
}

fn binary_i64_to_i64(
    args: &[ColumnarValue],
    f: impl Fn(i64, i64) -> i64,
) -> DfResult<ColumnarValue> {
    let rows = resolve_num_rows(args);
    let a = args[0].clone().into_array(rows)?;
    let b = args[1].clone().into_array(rows)?;
    let a = as_int64_array(&a)?;
    let b = as_int64_array(&b)?;
    let out: Int64Array = a
        .iter()
        .zip(b.iter())
        .map(|(x, w)| match (x, w) {
            (Some(x), Some(w)) if w >= 1 => Some(f(x, w)),
            _ => None,
        })
        .collect();
    Ok(ColumnarValue::Array(Arc::new(out)))
}

/// `ts_bucket(ts, width) = (ts // width) * width`.
pub fn ts_bucket_udf() -> ScalarUDF {
    let func: ScalarFunctionImplementation =
        Arc::new(|args| binary_i64_to_i64(args, mathfns::ts_bucket));
    create_udf(
        "ts_bucket",
        vec![DataType::Int64, DataType::Int64],
        Arc::new(DataType::Int64),
        Volatility::Immutable,
        func,
    )
}

/// `align_time(ts, step) = (ts // step) * step`.
pub fn align_time_udf() -> ScalarUDF {
    let func: ScalarFunctionImplementation =
        Arc::new(|args| binary_i64_to_i64(args, mathfns::align_time));
    create_udf(
        "align_time",
        vec![DataType::Int64, DataType::Int64],
        Arc::new(DataType::Int64),
        Volatility::Immutable,
        func,
    )
}

/// `bucket_rate(curr, prev, width) = max(0, curr - prev) / width`, `NULL`
/// if `prev` is `NULL` or `width <= 0`.
pub fn bucket_rate_udf() -> ScalarUDF {
    let func: ScalarFunctionImplementation = Arc::new(|args| {
        let rows = resolve_num_rows(args);
        let curr = args[0].clone().into_array(rows)?;
        let prev = args[1].clone().into_array(rows)?;
        let width = args[2].clone().into_array(rows)?;
        let curr = as_float64_array(&curr)?;
        let prev = as_float64_array(&prev)?;
        let width = as_int64_array(&width)?;
        let out: Float64Array = curr
            .iter()
            .zip(prev.iter())
            .zip(width.iter())
            .map(|((c, p), w)| c.and_then(|c| mathfns::bucket_rate(c, p, w.unwrap_or(0))))
            .collect();
        Ok(ColumnarValue::Array(Arc::new(out)))
    });
    create_udf(
        "bucket_rate",
        vec![DataType::Float64, DataType::Float64, DataType::Int64],
        Arc::new(DataType::Float64),
        Volatility::Immutable,
        func,
    )
}

/// `clamp(x, lo, hi)`, `NaN`-propagating.
pub fn clamp_udf() -> ScalarUDF {
    let func: ScalarFunctionImplementation = Arc::new(|args| {
        let rows = resolve_num_rows(args);
        let x = args[0].clone().into_array(rows)?;
        let lo = args[1].clone().into_array(rows)?;
        let hi = args[2].clone().into_array(rows)?;
        let x = as_float64_array(&x)?;
        let lo = as_float64_array(&lo)?;
        let hi = as_float64_array(&hi)?;
        let out: Float64Array = x
            .iter()
            .zip(lo.iter())
            .zip(hi.iter())
            .map(|((x, lo), hi)| match (x, lo, hi) {
                (Some(x), Some(lo), Some(hi)) => Some(mathfns::clamp(x, lo, hi)),
                _ => None,
            })
            .collect();
        Ok(ColumnarValue::Array(Arc::new(out)))
    });
    create_udf(
        "clamp",
        vec![DataType::Float64, DataType::Float64, DataType::Float64],
        Arc::new(DataType::Float64),
        Volatility::Immutable,
        func,
    )
}

/// `null_if_outside(x, lo, hi)`: `x` if `lo <= x <= hi`, else `NULL`.
pub fn null_if_outside_udf() -> ScalarUDF {
    let func: ScalarFunctionImplementation = Arc::new(|args| {
        let rows = resolve_num_rows(args);
        let x = args[0].clone().into_array(rows)?;
        let lo = args[1].clone().into_array(rows)?;
        let hi = args[2].clone().into_array(rows)?;
        let x = as_float64_array(&x)?;
        let lo = as_float64_array(&lo)?;
        let hi = as_float64_array(&hi)?;
        let out: Float64Array = x
            .iter()
            .zip(lo.iter())
            .zip(hi.iter())
            .map(|((x, lo), hi)| match (x, lo, hi) {
                (Some(x), Some(lo), Some(hi)) => mathfns::null_if_outside(x, lo, hi),
                _ => None,
            })
            .collect();
        Ok(ColumnarValue::Array(Arc::new(out)))
    });
    create_udf(
        "null_if_outside",
        vec![DataType::Float64, DataType::Float64, DataType::Float64],
        Arc::new(DataType::Float64),
        Volatility::Immutable,
        func,
    )
}

fn series_binary_udf(
    name: &'static str,
    f: impl Fn(Option<f64>, Option<f64>) -> Option<f64> + Send + Sync + 'static,
) -> ScalarUDF {
    let func: ScalarFunctionImplementation = Arc::new(move |args| {
        let rows = resolve_num_rows(args);
        let a = args[0].clone().into_array(rows)?;
        let b = args[1].clone().into_array(rows)?;
        let a = as_float64_array(&a)?;
        let b = as_float64_array(&b)?;
        let out: Float64Array = a.iter().zip(b.iter()).map(|(a, b)| f(a, b)).collect();
        Ok(ColumnarValue::Array(Arc::new(out)))
    });
    create_udf(
        name,
        vec![DataType::Float64, DataType::Float64],
        Arc::new(DataType::Float64),
        Volatility::Immutable,
        func,
    )
}

/// Element-wise `a + b`, `NULL` if either side is `NULL`.
pub fn series_add_udf() -> ScalarUDF {
    series_binary_udf("series_add", mathfns::series_add)
}

/// Element-wise `a - b`, `NULL` if either side is `NULL`.
pub fn series_sub_udf() -> ScalarUDF {
    series_binary_udf("series_sub", mathfns::series_sub)
}

/// Element-wise `a * b`, `NULL` if either side is `NULL`.
pub fn series_mul_udf() -> ScalarUDF {
    series_binary_udf("series_mul", mathfns::series_mul)
}

/// Element-wise `a / b`, `NULL` if either side is `NULL` or `b == 0`.
pub fn series_div_udf() -> ScalarUDF {
    series_binary_udf("series_div", mathfns::series_div)
}

#[derive(Debug)]
struct CounterRateUdf {
    signature: Signature,
}

impl CounterRateUdf {
    fn new() -> Self {
        CounterRateUdf {
            signature: Signature::exact(
                vec![DataType::Float64, DataType::Int64],
                Volatility::Immutable,
            ),
        }
    }
}

impl WindowUDFImpl for CounterRateUdf {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "counter_rate"
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn return_type(&self, _arg_types: &[DataType]) -> DfResult<DataType> {
        Ok(DataType::Float64)
    }

    fn partition_evaluator(&self) -> DfResult<Box<dyn PartitionEvaluator>> {
        Ok(Box::new(CounterRateEvaluator))
    }
}

/// Per-partition state for `counter_rate(raw_value, step) OVER (PARTITION
/// BY alias ORDER BY bucket)`: the rate between each row and the previous
/// row in the same partition, reset-clamped to zero like `bucket_rate`.
#[derive(Debug)]
struct CounterRateEvaluator;

impl PartitionEvaluator for CounterRateEvaluator {
    fn evaluate_all(&mut self, values: &[ArrayRef], num_rows: usize) -> DfResult<ArrayRef> {
        let raw = as_float64_array(&values[0])?;
        let step = as_int64_array(&values[1])?;
        let mut out = Vec::with_capacity(num_rows);
        let mut prev: Option<f64> = None;
        for i in 0..num_rows {
            let curr = if raw.is_valid(i) { Some(raw.value(i)) } else { None };
            let width = if step.is_valid(i) { step.value(i) } else { 0 };
            out.push(curr.and_then(|c| mathfns::bucket_rate(c, prev, width)));
            prev = curr;
        }
        Ok(Arc::new(Float64Array::from(out)))
    }
}

/// Build the `counter_rate` window UDF, ready to register into a
/// `SessionContext`.
pub fn counter_rate_udf() -> WindowUDF {
    WindowUDF::new_from_impl(CounterRateUdf::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_rate_evaluator_matches_scenario_from_spec() {
        let raw = Float64Array::from(vec![100.0, 160.0, 180.0, 50.0]);
        let step = Int64Array::from(vec![60, 60, 60, 60]);
        let values: Vec<ArrayRef> = vec![Arc::new(raw), Arc::new(step)];
        let mut evaluator = CounterRateEvaluator;
        let result = evaluator.evaluate_all(&values, 4).unwrap();
        let rates = as_float64_array(&result).unwrap();
        assert!(!rates.is_valid(0));
        assert_eq!(rates.value(1), 1.0);
        assert!((rates.value(2) - (20.0 / 60.0)).abs() < 1e-12);
        assert_eq!(rates.value(3), 0.0);
    }
}
