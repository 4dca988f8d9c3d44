//! # propsync codec
//!
//! Record pack encoding for propsync.
//!
//! A *record pack* is an ordered list of named, optionally timestamped
//! scalar values. The sync engine builds one pack per outbound batch and
//! decodes every inbound message into records that are merged back into
//! the property registry.
//!
//! The default wire format is SenML over CBOR ([`SenmlCodec`]). Other
//! formats plug in through the [`PackCodec`] trait.
//!
//! ## Usage
//!
//! ```
//! use propsync_codec::{PackCodec, Record, SenmlCodec, Value};
//!
//! let codec = SenmlCodec::new();
//! let bytes = codec.encode(&[Record::new("led", true)]).unwrap();
//!
//! let mut decoded = Vec::new();
//! codec.decode(&bytes, &mut |record| decoded.push(record)).unwrap();
//! assert_eq!(decoded[0].value, Some(Value::Bool(true)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod record;
mod senml;
mod value;

pub use error::{CodecError, CodecResult};
pub use record::Record;
pub use senml::SenmlCodec;
pub use value::{Value, ValueKind};

/// Encodes and decodes record packs.
pub trait PackCodec: Send + Sync {
    /// Encode records, in order, into a single pack.
    fn encode(&self, records: &[Record]) -> CodecResult<Vec<u8>>;

    /// Decode a pack, calling `sink` once per record in pack order.
    ///
    /// Records decoded before an error has been detected may already have
    /// been passed to `sink`.
    fn decode(&self, bytes: &[u8], sink: &mut dyn FnMut(Record)) -> CodecResult<()>;
}
