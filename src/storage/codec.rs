//! Serialization Layer
//!
//! Converts logical [`Term`]s to whatever a backend stores and back again.
//! Every adapter call goes through a [`Codec`]; the expiry engine uses the
//! same codec to turn a timed-out key back into a term before deleting it.
//!
//! Two strategies ship with the crate:
//!
//! - [`Passthrough`]: the backend stores terms as they are (in-process maps).
//! - [`Binary`]: terms are bincode-encoded into [`Bytes`], for backends that
//!   only hold byte strings. Values may additionally be zlib-compressed.
//!
//! ## Binary layout
//!
//! ```text
//! ┌────────┬──────────────────────────────┐
//! │ format │ payload                      │
//! │ 1 byte │ bincode, or zlib(bincode)    │
//! └────────┴──────────────────────────────┘
//! ```
//!
//! Keys are always written in the plain format so equal keys encode to equal
//! bytes. Decoding accepts either format, so turning compression on or off
//! does not strand values already stored.

use crate::error::CodecError;
use crate::term::Term;
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fmt::Debug;
use std::hash::Hash;
use std::io::{Read, Write};

/// Payload is bincode as-is.
const FORMAT_PLAIN: u8 = 0x00;

/// Payload is zlib-compressed bincode.
const FORMAT_ZLIB: u8 = 0x01;

/// Symmetric conversion between terms and a backend's storage representation.
///
/// Implementations must satisfy the round-trip law:
/// `deserialize_key(serialize_key(k)) == k` and likewise for values.
/// Key encoding must also be deterministic.
pub trait Codec: Clone + Send + Sync + 'static {
    /// What the backend actually stores.
    type Encoded: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    fn serialize_key(&self, key: &Term) -> Result<Self::Encoded, CodecError>;

    fn serialize_value(&self, value: &Term) -> Result<Self::Encoded, CodecError>;

    fn deserialize_key(&self, key: &Self::Encoded) -> Result<Term, CodecError>;

    fn deserialize_value(&self, value: &Self::Encoded) -> Result<Term, CodecError>;
}

/// Identity codec for backends that hold terms directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Codec for Passthrough {
    type Encoded = Term;

    fn serialize_key(&self, key: &Term) -> Result<Term, CodecError> {
        Ok(key.clone())
    }

    fn serialize_value(&self, value: &Term) -> Result<Term, CodecError> {
        Ok(value.clone())
    }

    fn deserialize_key(&self, key: &Term) -> Result<Term, CodecError> {
        Ok(key.clone())
    }

    fn deserialize_value(&self, value: &Term) -> Result<Term, CodecError> {
        Ok(value.clone())
    }
}

/// Bincode codec producing byte strings, with optional value compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct Binary {
    compression: Option<Compression>,
}

impl Binary {
    /// Creates a codec that never compresses.
    pub fn new() -> Self {
        Self { compression: None }
    }

    /// Creates a codec that zlib-compresses values at `level` (0-9).
    pub fn compressed(level: u32) -> Self {
        Self {
            compression: Some(Compression::new(level.min(9))),
        }
    }

    /// Returns `true` if values are compressed on write.
    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    fn encode(term: &Term, compression: Option<Compression>) -> Result<Bytes, CodecError> {
        let body = bincode::serialize(term)?;

        let out = match compression {
            None => {
                let mut out = Vec::with_capacity(body.len() + 1);
                out.push(FORMAT_PLAIN);
                out.extend_from_slice(&body);
                out
            }
            Some(level) => {
                let mut encoder = ZlibEncoder::new(vec![FORMAT_ZLIB], level);
                encoder.write_all(&body)?;
                encoder.finish()?
            }
        };

        Ok(Bytes::from(out))
    }

    fn decode(data: &Bytes) -> Result<Term, CodecError> {
        let (&format, payload) = data.split_first().ok_or(CodecError::Empty)?;

        match format {
            FORMAT_PLAIN => Ok(bincode::deserialize(payload)?),
            FORMAT_ZLIB => {
                let mut body = Vec::new();
                ZlibDecoder::new(payload).read_to_end(&mut body)?;
                Ok(bincode::deserialize(&body)?)
            }
            other => Err(CodecError::UnknownFormat(other)),
        }
    }
}

impl Codec for Binary {
    type Encoded = Bytes;

    fn serialize_key(&self, key: &Term) -> Result<Bytes, CodecError> {
        Self::encode(key, None)
    }

    fn serialize_value(&self, value: &Term) -> Result<Bytes, CodecError> {
        Self::encode(value, self.compression)
    }

    fn deserialize_key(&self, key: &Bytes) -> Result<Term, CodecError> {
        Self::decode(key)
    }

    fn deserialize_value(&self, value: &Bytes) -> Result<Term, CodecError> {
        Self::decode(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_terms() -> Vec<Term> {
        let mut map = BTreeMap::new();
        map.insert(Term::from("nested"), Term::from(vec![Term::from(1), Term::Nil]));
        map.insert(Term::from(3), Term::Bytes(vec![0, 255, 7]));

        vec![
            Term::Nil,
            Term::from(true),
            Term::from(-42),
            Term::from(i64::MAX),
            Term::from(""),
            Term::from("héllo wörld"),
            Term::Bytes(Vec::new()),
            Term::from(vec![Term::from("a"), Term::from(vec![Term::Nil])]),
            Term::Map(map),
        ]
    }

    #[test]
    fn test_passthrough_round_trip() {
        let codec = Passthrough;
        for term in sample_terms() {
            let key = codec.serialize_key(&term).unwrap();
            assert_eq!(codec.deserialize_key(&key).unwrap(), term);
            let value = codec.serialize_value(&term).unwrap();
            assert_eq!(codec.deserialize_value(&value).unwrap(), term);
        }
    }

    #[test]
    fn test_binary_round_trip() {
        for codec in [Binary::new(), Binary::compressed(6)] {
            for term in sample_terms() {
                let key = codec.serialize_key(&term).unwrap();
                assert_eq!(codec.deserialize_key(&key).unwrap(), term);
                let value = codec.serialize_value(&term).unwrap();
                assert_eq!(codec.deserialize_value(&value).unwrap(), term);
            }
        }
    }

    #[test]
    fn test_binary_keys_are_deterministic_and_uncompressed() {
        let codec = Binary::compressed(9);
        let key = Term::from("session:42");

        let a = codec.serialize_key(&key).unwrap();
        let b = codec.serialize_key(&key).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0], FORMAT_PLAIN);
    }

    #[test]
    fn test_compression_shrinks_repetitive_values() {
        let value = Term::from("x".repeat(4096));

        let plain = Binary::new().serialize_value(&value).unwrap();
        let packed = Binary::compressed(6).serialize_value(&value).unwrap();

        assert_eq!(packed[0], FORMAT_ZLIB);
        assert!(packed.len() < plain.len() / 4);
    }

    #[test]
    fn test_reads_either_format() {
        let value = Term::from("mixed");
        let packed = Binary::compressed(1).serialize_value(&value).unwrap();
        let plain = Binary::new().serialize_value(&value).unwrap();

        assert_eq!(Binary::new().deserialize_value(&packed).unwrap(), value);
        assert_eq!(Binary::compressed(1).deserialize_value(&plain).unwrap(), value);
    }

    #[test]
    fn test_decode_errors() {
        let codec = Binary::new();

        assert!(matches!(
            codec.deserialize_value(&Bytes::new()),
            Err(CodecError::Empty)
        ));
        assert!(matches!(
            codec.deserialize_value(&Bytes::from_static(&[0x7f, 1, 2])),
            Err(CodecError::UnknownFormat(0x7f))
        ));
        assert!(matches!(
            codec.deserialize_value(&Bytes::from_static(&[FORMAT_PLAIN, 0xff])),
            Err(CodecError::Bincode(_))
        ));
    }
}
