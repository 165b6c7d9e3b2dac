//! Fixed-schema value records.
//!
//! Keeping each record's on-disk layout constant-size (or length-prefixed
//! with a pinned field order) is what makes `disk ≈ num_metrics * slots *
//! record_size` predictable, and lets `read_range` treat every slot's
//! record the same way regardless of what's actually stored there.

use crate::error::{Error, Result};
use crate::types::{MetricDescriptor, SampleType, Tags};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

/// `(1, metric_id, slot)` value: `(i64 BE ts, f64 LE value)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRecord {
    /// Timestamp the sample was ingested at.
    pub ts: i64,
    /// Gauge value, or counter raw cumulative.
    pub value: f64,
}

impl SampleRecord {
    /// Fixed encoded size in bytes.
    pub const ENCODED_LEN: usize = 16;

    /// Encode to the fixed 16-byte layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.write_i64::<BigEndian>(self.ts).expect("vec write cannot fail");
        out.extend_from_slice(&self.value.to_le_bytes());
        out
    }

    /// Decode from the fixed 16-byte layout.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(Error::BackendFatal(format!(
                "corrupt sample record: expected {} bytes, got {}",
                Self::ENCODED_LEN,
                bytes.len()
            )));
        }
        let ts = Cursor::new(&bytes[0..8]).read_i64::<BigEndian>().unwrap();
        let value = f64::from_le_bytes(bytes[8..16].try_into().unwrap());
        Ok(SampleRecord { ts, value })
    }
}

/// `(3, metric_id)` value: `(i64 ts, f64 last_raw)`. Same wire layout as
/// `SampleRecord`; kept as a distinct type so callers can't mix them up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterStateRecord {
    /// Timestamp of the last counter ingest that updated this record.
    pub last_ts: i64,
    /// Raw cumulative value observed at `last_ts`.
    pub last_raw: f64,
}

impl CounterStateRecord {
    /// Encode using the same layout as `SampleRecord`.
    pub fn encode(&self) -> Vec<u8> {
        SampleRecord {
            ts: self.last_ts,
            value: self.last_raw,
        }
        .encode()
    }

    /// Decode using the same layout as `SampleRecord`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let s = SampleRecord::decode(bytes)?;
        Ok(CounterStateRecord {
            last_ts: s.ts,
            last_raw: s.value,
        })
    }
}

const FIELD_NAME: u8 = 1;
const FIELD_TAGS: u8 = 2;
const FIELD_STEP: u8 = 3;
const FIELD_SLOTS: u8 = 4;
const FIELD_TYPE: u8 = 5;
const FIELD_CREATED_AT: u8 = 6;
const FIELD_DELETING: u8 = 7;

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.write_u32::<BigEndian>(s.len() as u32).unwrap();
    out.extend_from_slice(s.as_bytes());
}

fn read_string(cur: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cur
        .read_u32::<BigEndian>()
        .map_err(|e| Error::BackendFatal(format!("corrupt descriptor string length: {e}")))?;
    let mut buf = vec![0u8; len as usize];
    cur.read_exact(&mut buf)
        .map_err(|e| Error::BackendFatal(format!("corrupt descriptor string body: {e}")))?;
    String::from_utf8(buf).map_err(|e| Error::BackendFatal(format!("non-utf8 descriptor field: {e}")))
}

/// `(2, metric_id)` value: descriptor fields in a pinned order, each
/// prefixed by a 1-byte field tag so unknown future fields can be skipped
/// without breaking older readers.
impl MetricDescriptor {
    /// Encode to the on-disk descriptor record.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.push(FIELD_NAME);
        write_string(&mut out, &self.name);

        out.push(FIELD_TAGS);
        out.write_u32::<BigEndian>(self.tags.len() as u32).unwrap();
        for (k, v) in &self.tags {
            write_string(&mut out, k);
            write_string(&mut out, v);
        }

        out.push(FIELD_STEP);
        out.write_u32::<BigEndian>(self.step).unwrap();

        out.push(FIELD_SLOTS);
        out.write_u32::<BigEndian>(self.slots).unwrap();

        out.push(FIELD_TYPE);
        out.push(self.sample_type.as_u8());

        out.push(FIELD_CREATED_AT);
        out.write_i64::<BigEndian>(self.created_at).unwrap();

        out.push(FIELD_DELETING);
        out.push(self.deleting as u8);

        out
    }

    /// Decode a descriptor record.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        let mut name = None;
        let mut tags = Tags::new();
        let mut step = None;
        let mut slots = None;
        let mut sample_type = None;
        let mut created_at = None;
        let mut deleting = false;

        while (cur.position() as usize) < bytes.len() {
            let tag = cur
                .read_u8()
                .map_err(|e| Error::BackendFatal(format!("corrupt descriptor tag: {e}")))?;
            match tag {
                FIELD_NAME => name = Some(read_string(&mut cur)?),
                FIELD_TAGS => {
                    let count = cur
                        .read_u32::<BigEndian>()
                        .map_err(|e| Error::BackendFatal(format!("corrupt tag count: {e}")))?;
                    for _ in 0..count {
                        let k = read_string(&mut cur)?;
                        let v = read_string(&mut cur)?;
                        tags.insert(k, v);
                    }
                }
                FIELD_STEP => {
                    step = Some(cur.read_u32::<BigEndian>().map_err(|e| {
                        Error::BackendFatal(format!("corrupt step field: {e}"))
                    })?)
                }
                FIELD_SLOTS => {
                    slots = Some(cur.read_u32::<BigEndian>().map_err(|e| {
                        Error::BackendFatal(format!("corrupt slots field: {e}"))
                    })?)
                }
                FIELD_TYPE => {
                    let v = cur
                        .read_u8()
                        .map_err(|e| Error::BackendFatal(format!("corrupt type field: {e}")))?;
                    sample_type = Some(SampleType::from_u8(v).ok_or_else(|| {
                        Error::BackendFatal(format!("unknown sample type discriminant {v}"))
                    })?);
                }
                FIELD_CREATED_AT => {
                    created_at = Some(cur.read_i64::<BigEndian>().map_err(|e| {
                        Error::BackendFatal(format!("corrupt created_at field: {e}"))
                    })?)
                }
                FIELD_DELETING => {
                    deleting = cur
                        .read_u8()
                        .map_err(|e| Error::BackendFatal(format!("corrupt deleting field: {e}")))?
                        != 0
                }
                other => {
                    return Err(Error::BackendFatal(format!(
                        "unknown descriptor field tag {other}"
                    )))
                }
            }
        }

        Ok(MetricDescriptor {
            name: name
                .ok_or_else(|| Error::BackendFatal("descriptor missing name field".into()))?,
            tags,
            step: step
                .ok_or_else(|| Error::BackendFatal("descriptor missing step field".into()))?,
            slots: slots
                .ok_or_else(|| Error::BackendFatal("descriptor missing slots field".into()))?,
            sample_type: sample_type
                .ok_or_else(|| Error::BackendFatal("descriptor missing type field".into()))?,
            created_at: created_at
                .ok_or_else(|| Error::BackendFatal("descriptor missing created_at field".into()))?,
            deleting,
        })
    }
}

/// Encode the `metric_id` set stored under a name/tag index entry.
pub fn encode_metric_id_set(ids: &[u64]) -> Vec<u8> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut out = Vec::with_capacity(4 + sorted.len() * 8);
    out.write_u32::<BigEndian>(sorted.len() as u32).unwrap();
    for id in sorted {
        out.write_u64::<BigEndian>(id).unwrap();
    }
    out
}

/// Decode a `metric_id` set.
pub fn decode_metric_id_set(bytes: &[u8]) -> Result<Vec<u64>> {
    let mut cur = Cursor::new(bytes);
    let count = cur
        .read_u32::<BigEndian>()
        .map_err(|e| Error::BackendFatal(format!("corrupt metric id set count: {e}")))?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(
            cur.read_u64::<BigEndian>()
                .map_err(|e| Error::BackendFatal(format!("corrupt metric id set entry: {e}")))?,
        );
    }
    Ok(out)
}

/// Encode an opaque dashboard blob with a trailing CRC32 for integrity —
/// dashboards have no internal schema to validate against, so this is the
/// only corruption check available at read time.
pub fn encode_dashboard_blob(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(payload);
    out.write_u32::<BigEndian>(crc32fast::hash(payload)).unwrap();
    out
}

/// Decode and verify a dashboard blob.
pub fn decode_dashboard_blob(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() < 4 {
        return Err(Error::BackendFatal("dashboard blob too short".into()));
    }
    let (payload, crc_bytes) = bytes.split_at(bytes.len() - 4);
    let expected = u32::from_be_bytes(crc_bytes.try_into().unwrap());
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(Error::BackendFatal("dashboard blob failed crc32 check".into()));
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_record_roundtrips() {
        let s = SampleRecord { ts: 1_700_000_123, value: -3.5 };
        let bytes = s.encode();
        assert_eq!(bytes.len(), SampleRecord::ENCODED_LEN);
        assert_eq!(SampleRecord::decode(&bytes).unwrap(), s);
    }

    #[test]
    fn sample_record_rejects_wrong_length() {
        assert!(SampleRecord::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn descriptor_roundtrips_with_tags() {
        let mut tags = Tags::new();
        tags.insert("host".into(), "a".into());
        tags.insert("region".into(), "us".into());
        let d = MetricDescriptor {
            name: "cpu_usage".into(),
            tags,
            step: 60,
            slots: 1440,
            sample_type: SampleType::Counter,
            created_at: 1_700_000_000,
            deleting: false,
        };
        let bytes = d.encode();
        assert_eq!(MetricDescriptor::decode(&bytes).unwrap(), d);
    }

    #[test]
    fn descriptor_roundtrips_without_tags() {
        let d = MetricDescriptor {
            name: "m".into(),
            tags: Tags::new(),
            step: 1,
            slots: 10,
            sample_type: SampleType::Gauge,
            created_at: 0,
            deleting: true,
        };
        let bytes = d.encode();
        assert_eq!(MetricDescriptor::decode(&bytes).unwrap(), d);
    }

    #[test]
    fn metric_id_set_dedupes_and_sorts() {
        let bytes = encode_metric_id_set(&[5, 1, 5, 3]);
        assert_eq!(decode_metric_id_set(&bytes).unwrap(), vec![1, 3, 5]);
    }

    #[test]
    fn dashboard_blob_detects_corruption() {
        let bytes = encode_dashboard_blob(b"{\"widgets\":[]}");
        assert_eq!(decode_dashboard_blob(&bytes).unwrap(), b"{\"widgets\":[]}");
        let mut corrupted = bytes.clone();
        corrupted[0] ^= 0xFF;
        assert!(decode_dashboard_blob(&corrupted).is_err());
    }
}
