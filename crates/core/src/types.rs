//! Metric identity and sample-type types.

use std::collections::BTreeMap;

/// Stable identifier for a metric, allocated by the registry's atomic
/// counter on first `ensure`.
pub type MetricId = u64;

/// A metric's tag set. Stored and compared as a `BTreeMap` so that
/// insertion order never affects equality or the on-disk encoding —
/// the spec requires tag-set equality, not tag-list equality.
pub type Tags = BTreeMap<String, String>;

/// Sample semantics for a metric, frozen at creation (invariant I5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    /// Instantaneous value; every write overwrites the previous one.
    Gauge,
    /// Cumulative raw value; rates are derived at query time.
    Counter,
}

impl SampleType {
    /// On-disk discriminant: `gauge=0, counter=1`.
    pub fn as_u8(self) -> u8 {
        match self {
            SampleType::Gauge => 0,
            SampleType::Counter => 1,
        }
    }

    /// Decode the on-disk discriminant.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SampleType::Gauge),
            1 => Some(SampleType::Counter),
            _ => None,
        }
    }
}

/// Persistent record describing a metric's identity, schema, and ring
/// geometry (spec §3 "Metric descriptor").
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDescriptor {
    /// User-supplied metric name. Not unique alone — `(name, tags)` is.
    pub name: String,
    /// Tag set distinguishing this series from others with the same name.
    pub tags: Tags,
    /// Nominal sampling interval in seconds. Sets slot width.
    pub step: u32,
    /// Ring length. `step * slots` is the retention window.
    pub slots: u32,
    /// Gauge or counter. Immutable after creation.
    pub sample_type: SampleType,
    /// Unix seconds at creation time.
    pub created_at: i64,
    /// Set while `delete(metric_id)` is removing sample/counter/index keys.
    /// Writes to a `deleting` metric fail `NOT_FOUND`.
    pub deleting: bool,
}

impl MetricDescriptor {
    /// Slot a timestamp maps to under this descriptor's geometry
    /// (invariant I2: `slot = (ts // step) mod slots`).
    pub fn slot_for(&self, ts: i64) -> u32 {
        let step = self.step as i64;
        let slots = self.slots as i64;
        (ts.div_euclid(step)).rem_euclid(slots) as u32
    }

    /// Retention window in seconds (`step * slots`).
    pub fn window_seconds(&self) -> i64 {
        self.step as i64 * self.slots as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_type_roundtrips_through_u8() {
        assert_eq!(SampleType::from_u8(SampleType::Gauge.as_u8()), Some(SampleType::Gauge));
        assert_eq!(SampleType::from_u8(SampleType::Counter.as_u8()), Some(SampleType::Counter));
        assert_eq!(SampleType::from_u8(2), None);
    }

    #[test]
    fn slot_for_matches_scenario_2_from_spec() {
        let d = MetricDescriptor {
            name: "m".into(),
            tags: Tags::new(),
            step: 60,
            slots: 1440,
            sample_type: SampleType::Gauge,
            created_at: 0,
            deleting: false,
        };
        assert_eq!(d.slot_for(1_700_000_000), 1333);
    }

    #[test]
    fn slot_for_handles_negative_timestamps() {
        let d = MetricDescriptor {
            name: "m".into(),
            tags: Tags::new(),
            step: 1,
            slots: 4,
            sample_type: SampleType::Gauge,
            created_at: 0,
            deleting: false,
        };
        // div_euclid/rem_euclid keep the slot in range even for ts < 0.
        assert!(d.slot_for(-1) < 4);
    }
}
