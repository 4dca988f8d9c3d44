//! Decode command implementation.

use propsync_codec::{CodecError, PackCodec, SenmlCodec, Value};
use serde::Serialize;
use std::path::Path;

/// Record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Record name.
    pub name: String,
    /// Value type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Record value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Unix timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// Runs the decode command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("pack file not found: {}", path.display()).into());
    }

    let bytes = std::fs::read(path)?;
    let records = decode_pack(&bytes)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

/// Decodes a SenML-CBOR pack into printable records.
pub fn decode_pack(bytes: &[u8]) -> Result<Vec<RecordInfo>, CodecError> {
    let mut records = Vec::new();
    SenmlCodec::new().decode(bytes, &mut |record| {
        records.push(RecordInfo {
            kind: record.value.as_ref().map(|v| v.kind().to_string()),
            name: record.name,
            value: record.value,
            timestamp: record.timestamp,
        });
    })?;
    Ok(records)
}

fn print_text_output(records: &[RecordInfo]) {
    println!("Records: {}", records.len());
    println!();
    for record in records {
        let value = record
            .value
            .as_ref()
            .map_or_else(|| "-".to_string(), Value::to_string);
        let kind = record.kind.as_deref().unwrap_or("none");
        match record.timestamp {
            Some(ts) => println!("  {:<24} {:<8} {:<20} t={}", record.name, kind, value, ts),
            None => println!("  {:<24} {:<8} {}", record.name, kind, value),
        }
    }
}
