//! SenML record packs over CBOR (RFC 8428, section 6).
//!
//! A pack is a CBOR array of maps keyed by integer labels. Only the labels
//! needed by the property engine are produced; unknown labels are ignored
//! when decoding.

use crate::error::{CodecError, CodecResult};
use crate::record::Record;
use crate::value::Value;
use crate::PackCodec;
use ciborium::value::{Integer, Value as Cbor};

/// Base name label.
pub const LABEL_BASE_NAME: i64 = -2;
/// Base time label.
pub const LABEL_BASE_TIME: i64 = -3;
/// Name label.
pub const LABEL_NAME: i64 = 0;
/// Numeric value label.
pub const LABEL_VALUE: i64 = 2;
/// String value label.
pub const LABEL_STRING_VALUE: i64 = 3;
/// Boolean value label.
pub const LABEL_BOOL_VALUE: i64 = 4;
/// Time label.
pub const LABEL_TIME: i64 = 6;
/// Data value label.
pub const LABEL_DATA_VALUE: i64 = 8;

/// SenML-CBOR implementation of [`PackCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SenmlCodec;

impl SenmlCodec {
    /// Creates a new codec.
    pub fn new() -> Self {
        Self
    }
}

impl PackCodec for SenmlCodec {
    fn encode(&self, records: &[Record]) -> CodecResult<Vec<u8>> {
        let pack = Cbor::Array(records.iter().map(encode_record).collect());
        let mut buffer = Vec::new();
        ciborium::ser::into_writer(&pack, &mut buffer)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(buffer)
    }

    fn decode(&self, bytes: &[u8], sink: &mut dyn FnMut(Record)) -> CodecResult<()> {
        let pack: Cbor = ciborium::de::from_reader(bytes)
            .map_err(|e| CodecError::decoding_failed(e.to_string()))?;

        let entries = match pack {
            Cbor::Array(entries) => entries,
            // A single record is accepted without the enclosing array.
            map @ Cbor::Map(_) => vec![map],
            other => {
                return Err(CodecError::invalid_structure(format!(
                    "expected array of records, found {}",
                    cbor_type_name(&other)
                )))
            }
        };

        let mut base_name = String::new();
        let mut base_time: Option<i64> = None;

        for (index, entry) in entries.into_iter().enumerate() {
            let Cbor::Map(fields) = entry else {
                return Err(CodecError::invalid_structure(format!(
                    "record {index} is not a map"
                )));
            };

            let mut name: Option<String> = None;
            let mut value: Option<Value> = None;
            let mut time: Option<i64> = None;

            for (key, field) in fields {
                let Some(label) = label_of(&key) else {
                    continue;
                };
                match label {
                    LABEL_BASE_NAME => base_name = expect_text(label, field)?,
                    LABEL_BASE_TIME => base_time = Some(expect_time(label, field)?),
                    LABEL_NAME => name = Some(expect_text(label, field)?),
                    LABEL_VALUE => value = Some(decode_numeric(field)?),
                    LABEL_STRING_VALUE => value = Some(Value::Text(expect_text(label, field)?)),
                    LABEL_BOOL_VALUE => match field {
                        Cbor::Bool(b) => value = Some(Value::Bool(b)),
                        other => {
                            return Err(CodecError::unsupported_type(label, cbor_type_name(&other)))
                        }
                    },
                    LABEL_DATA_VALUE => match field {
                        Cbor::Bytes(b) => value = Some(Value::Bytes(b)),
                        other => {
                            return Err(CodecError::unsupported_type(label, cbor_type_name(&other)))
                        }
                    },
                    LABEL_TIME => time = Some(expect_time(label, field)?),
                    _ => {}
                }
            }

            let full_name = format!("{base_name}{}", name.unwrap_or_default());
            if full_name.is_empty() {
                return Err(CodecError::MissingName { index });
            }

            let timestamp = match (base_time, time) {
                (None, None) => None,
                (bt, t) => u64::try_from(bt.unwrap_or(0).saturating_add(t.unwrap_or(0))).ok(),
            };

            sink(Record {
                name: full_name,
                value,
                timestamp,
            });
        }

        Ok(())
    }
}

fn encode_record(record: &Record) -> Cbor {
    let mut fields = vec![(label(LABEL_NAME), Cbor::Text(record.name.clone()))];

    if let Some(value) = &record.value {
        let field = match value {
            Value::Bool(b) => (label(LABEL_BOOL_VALUE), Cbor::Bool(*b)),
            Value::Integer(n) => (label(LABEL_VALUE), Cbor::Integer(Integer::from(*n))),
            Value::Float(x) => (label(LABEL_VALUE), Cbor::Float(*x)),
            Value::Text(s) => (label(LABEL_STRING_VALUE), Cbor::Text(s.clone())),
            Value::Bytes(b) => (label(LABEL_DATA_VALUE), Cbor::Bytes(b.clone())),
        };
        fields.push(field);
    }

    if let Some(timestamp) = record.timestamp {
        fields.push((label(LABEL_TIME), Cbor::Integer(Integer::from(timestamp))));
    }

    Cbor::Map(fields)
}

fn label(n: i64) -> Cbor {
    Cbor::Integer(Integer::from(n))
}

fn label_of(key: &Cbor) -> Option<i64> {
    match key {
        Cbor::Integer(n) => i64::try_from(*n).ok(),
        _ => None,
    }
}

fn expect_text(label: i64, field: Cbor) -> CodecResult<String> {
    match field {
        Cbor::Text(s) => Ok(s),
        other => Err(CodecError::unsupported_type(label, cbor_type_name(&other))),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn expect_time(label: i64, field: Cbor) -> CodecResult<i64> {
    match field {
        Cbor::Integer(n) => i64::try_from(n).map_err(|_| CodecError::IntegerOverflow),
        // Fractional seconds are truncated, properties keep whole seconds.
        Cbor::Float(x) if x.is_finite() => Ok(x as i64),
        other => Err(CodecError::unsupported_type(label, cbor_type_name(&other))),
    }
}

fn decode_numeric(field: Cbor) -> CodecResult<Value> {
    match field {
        Cbor::Integer(n) => i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| CodecError::IntegerOverflow),
        Cbor::Float(x) => Ok(Value::Float(x)),
        other => Err(CodecError::unsupported_type(
            LABEL_VALUE,
            cbor_type_name(&other),
        )),
    }
}

fn cbor_type_name(value: &Cbor) -> &'static str {
    match value {
        Cbor::Integer(_) => "integer",
        Cbor::Bytes(_) => "bytes",
        Cbor::Float(_) => "float",
        Cbor::Text(_) => "text",
        Cbor::Bool(_) => "bool",
        Cbor::Null => "null",
        Cbor::Tag(_, _) => "tag",
        Cbor::Array(_) => "array",
        Cbor::Map(_) => "map",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> CodecResult<Vec<Record>> {
        let mut records = Vec::new();
        SenmlCodec.decode(bytes, &mut |r| records.push(r))?;
        Ok(records)
    }

    fn raw_pack(entries: Vec<Vec<(i64, Cbor)>>) -> Vec<u8> {
        let pack = Cbor::Array(
            entries
                .into_iter()
                .map(|fields| {
                    Cbor::Map(fields.into_iter().map(|(k, v)| (label(k), v)).collect())
                })
                .collect(),
        );
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&pack, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn encode_uses_value_labels() {
        let bytes = SenmlCodec
            .encode(&[
                Record::new("led", true),
                Record::new("count", 3),
                Record::new("clk", "12:00:00"),
            ])
            .unwrap();

        let pack: Cbor = ciborium::de::from_reader(&bytes[..]).unwrap();
        let Cbor::Array(entries) = pack else {
            panic!("expected array");
        };
        assert_eq!(entries.len(), 3);

        let Cbor::Map(first) = &entries[0] else {
            panic!("expected map");
        };
        assert_eq!(first[0], (label(LABEL_NAME), Cbor::Text("led".into())));
        assert_eq!(first[1], (label(LABEL_BOOL_VALUE), Cbor::Bool(true)));

        let Cbor::Map(third) = &entries[2] else {
            panic!("expected map");
        };
        assert_eq!(third[1].0, label(LABEL_STRING_VALUE));
    }

    #[test]
    fn name_only_record_has_no_value_field() {
        let bytes = SenmlCodec.encode(&[Record::name_only("light:hue")]).unwrap();
        let records = decode_all(&bytes).unwrap();
        assert_eq!(records, vec![Record::name_only("light:hue")]);
    }

    #[test]
    fn decode_mixed_pack() {
        let bytes = SenmlCodec
            .encode(&[
                Record::new("lat", 31.25).with_timestamp(100),
                Record::new("blob", vec![1u8, 2, 3]),
                Record::new("sw1", false),
            ])
            .unwrap();

        let records = decode_all(&bytes).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].value, Some(Value::Float(31.25)));
        assert_eq!(records[0].timestamp, Some(100));
        assert_eq!(records[1].value, Some(Value::Bytes(vec![1, 2, 3])));
        assert_eq!(records[2].value, Some(Value::Bool(false)));
    }

    #[test]
    fn integer_value_stays_integer() {
        let bytes = raw_pack(vec![vec![
            (LABEL_NAME, Cbor::Text("n".into())),
            (LABEL_VALUE, Cbor::Integer(Integer::from(42))),
        ]]);
        let records = decode_all(&bytes).unwrap();
        assert_eq!(records[0].value, Some(Value::Integer(42)));
    }

    #[test]
    fn base_name_and_time_apply_to_following_records() {
        let bytes = raw_pack(vec![
            vec![
                (LABEL_BASE_NAME, Cbor::Text("light:".into())),
                (LABEL_BASE_TIME, Cbor::Integer(Integer::from(1000))),
                (LABEL_NAME, Cbor::Text("hue".into())),
                (LABEL_VALUE, Cbor::Float(0.5)),
                (LABEL_TIME, Cbor::Integer(Integer::from(5))),
            ],
            vec![
                (LABEL_NAME, Cbor::Text("bri".into())),
                (LABEL_VALUE, Cbor::Float(10.0)),
            ],
        ]);

        let records = decode_all(&bytes).unwrap();
        assert_eq!(records[0].name, "light:hue");
        assert_eq!(records[0].timestamp, Some(1005));
        assert_eq!(records[1].name, "light:bri");
        assert_eq!(records[1].timestamp, Some(1000));
    }

    #[test]
    fn unknown_labels_are_ignored() {
        let bytes = raw_pack(vec![vec![
            (LABEL_NAME, Cbor::Text("x".into())),
            (1, Cbor::Text("Cel".into())),
            (LABEL_BOOL_VALUE, Cbor::Bool(true)),
        ]]);
        let records = decode_all(&bytes).unwrap();
        assert_eq!(records[0].value, Some(Value::Bool(true)));
    }

    #[test]
    fn missing_name_is_rejected() {
        let bytes = raw_pack(vec![vec![(LABEL_BOOL_VALUE, Cbor::Bool(true))]]);
        assert_eq!(
            decode_all(&bytes),
            Err(CodecError::MissingName { index: 0 })
        );
    }

    #[test]
    fn wrong_value_type_is_rejected() {
        let bytes = raw_pack(vec![vec![
            (LABEL_NAME, Cbor::Text("x".into())),
            (LABEL_BOOL_VALUE, Cbor::Text("yes".into())),
        ]]);
        assert!(matches!(
            decode_all(&bytes),
            Err(CodecError::UnsupportedType { label: 4, .. })
        ));
    }

    #[test]
    fn garbage_is_a_decoding_error() {
        assert!(matches!(
            decode_all(&[0xff, 0x00, 0x13]),
            Err(CodecError::DecodingFailed { .. })
        ));
        assert!(matches!(
            decode_all(&[0x05]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }
}
