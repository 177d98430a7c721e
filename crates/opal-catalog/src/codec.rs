//! Row encoding, compression, and encryption.
//!
//! This module converts rows to and from the byte payloads stored in the
//! paged row file.
//!
//! # Encoding Format
//!
//! The encoding is self-describing: it carries both column names and value
//! tags so that a payload round-trips without consulting the schema.
//!
//! - Number of columns (4 bytes, little-endian)
//! - For each column:
//!   - Name length (2 bytes) + name bytes
//!   - Type tag (1 byte)
//!   - Tag-specific payload (integers and floats little-endian, strings and
//!     byte arrays length-prefixed, UUIDs 16 raw bytes, timestamps as
//!     microseconds since epoch)
//!
//! # Pipeline
//!
//! On write: encode, then compress (zstd) if the table opts in, then encrypt
//! (ChaCha20) if the table opts in. On read, the symmetric inverse. Index key
//! bytes pass through the same compress/encrypt stages.
//!
//! The cipher is an unauthenticated stream cipher and the nonce is fixed per
//! table (the last 12 bytes of the SHA-256 key digest), so all rows of a
//! table share a keystream. Callers own that tradeoff; this layer does not
//! authenticate payloads.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use chrono::DateTime;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use opal_common::error::{OpalError, OpalResult};
use opal_common::{TABLE_KEY_SIZE, TABLE_NONCE_SIZE};

use crate::value::{Row, Value};

/// Type tags for the binary row encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum TypeTag {
    Null = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    Text = 4,
    Bytes = 5,
    Uuid = 6,
    Timestamp = 7,
}

impl TypeTag {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TypeTag::Null),
            1 => Some(TypeTag::Bool),
            2 => Some(TypeTag::Int),
            3 => Some(TypeTag::Float),
            4 => Some(TypeTag::Text),
            5 => Some(TypeTag::Bytes),
            6 => Some(TypeTag::Uuid),
            7 => Some(TypeTag::Timestamp),
            _ => None,
        }
    }
}

/// Encodes a row to its self-describing byte form.
pub fn encode_row(row: &Row) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(&(row.len() as u32).to_le_bytes());

    for (name, value) in row {
        let name_bytes = name.as_bytes();
        buf.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(name_bytes);
        encode_value(value, &mut buf);
    }

    buf
}

fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null => buf.push(TypeTag::Null as u8),
        Value::Bool(b) => {
            buf.push(TypeTag::Bool as u8);
            buf.push(u8::from(*b));
        }
        Value::Int(i) => {
            buf.push(TypeTag::Int as u8);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            buf.push(TypeTag::Float as u8);
            buf.extend_from_slice(&f.to_le_bytes());
        }
        Value::Text(s) => {
            buf.push(TypeTag::Text as u8);
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            buf.push(TypeTag::Bytes as u8);
            buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
            buf.extend_from_slice(b);
        }
        Value::Uuid(u) => {
            buf.push(TypeTag::Uuid as u8);
            buf.extend_from_slice(u.as_bytes());
        }
        Value::Timestamp(ts) => {
            buf.push(TypeTag::Timestamp as u8);
            buf.extend_from_slice(&ts.timestamp_micros().to_le_bytes());
        }
    }
}

/// Decodes a row from its self-describing byte form.
pub fn decode_row(bytes: &[u8]) -> OpalResult<Row> {
    let mut cursor = Cursor::new(bytes);
    let count = cursor.read_u32()? as usize;

    let mut row = Row::new();
    for _ in 0..count {
        let name_len = cursor.read_u16()? as usize;
        let name = String::from_utf8(cursor.read_bytes(name_len)?.to_vec())
            .map_err(|e| OpalError::corruption("row", format!("column name: {e}")))?;
        let value = decode_value(&mut cursor)?;
        row.insert(name, value);
    }

    Ok(row)
}

fn decode_value(cursor: &mut Cursor<'_>) -> OpalResult<Value> {
    let tag = cursor.read_u8()?;
    let tag = TypeTag::from_u8(tag)
        .ok_or_else(|| OpalError::corruption("row", format!("unknown type tag {tag}")))?;

    let value = match tag {
        TypeTag::Null => Value::Null,
        TypeTag::Bool => Value::Bool(cursor.read_u8()? != 0),
        TypeTag::Int => Value::Int(i64::from_le_bytes(cursor.read_array()?)),
        TypeTag::Float => Value::Float(f64::from_le_bytes(cursor.read_array()?)),
        TypeTag::Text => {
            let len = cursor.read_u32()? as usize;
            let s = String::from_utf8(cursor.read_bytes(len)?.to_vec())
                .map_err(|e| OpalError::corruption("row", format!("text value: {e}")))?;
            Value::Text(s)
        }
        TypeTag::Bytes => {
            let len = cursor.read_u32()? as usize;
            Value::Bytes(cursor.read_bytes(len)?.to_vec())
        }
        TypeTag::Uuid => Value::Uuid(Uuid::from_bytes(cursor.read_array()?)),
        TypeTag::Timestamp => {
            let micros = i64::from_le_bytes(cursor.read_array()?);
            let ts = DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| OpalError::corruption("row", "timestamp out of range"))?;
            Value::Timestamp(ts)
        }
    };

    Ok(value)
}

/// Bounds-checked reader over a byte slice.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> OpalResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| OpalError::corruption("row", "payload truncated"))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self) -> OpalResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> OpalResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> OpalResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_array<const N: usize>(&mut self) -> OpalResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        Ok(bytes.try_into().expect("slice length checked"))
    }
}

/// Compresses a payload with zstd at the default level.
pub fn compress(data: &[u8]) -> OpalResult<Vec<u8>> {
    Ok(zstd::stream::encode_all(data, 0)?)
}

/// Decompresses a zstd payload.
pub fn decompress(data: &[u8]) -> OpalResult<Vec<u8>> {
    Ok(zstd::stream::decode_all(data)?)
}

/// Encrypts a payload with the ChaCha20 stream cipher.
///
/// Ciphertext length equals plaintext length.
pub fn encrypt(
    key: &[u8; TABLE_KEY_SIZE],
    nonce: &[u8; TABLE_NONCE_SIZE],
    data: &[u8],
) -> Vec<u8> {
    let mut out = data.to_vec();
    let mut cipher = ChaCha20::new(key.into(), nonce.into());
    cipher.apply_keystream(&mut out);
    out
}

/// Decrypts a ChaCha20 payload. The keystream XOR is its own inverse.
pub fn decrypt(
    key: &[u8; TABLE_KEY_SIZE],
    nonce: &[u8; TABLE_NONCE_SIZE],
    data: &[u8],
) -> Vec<u8> {
    encrypt(key, nonce, data)
}

/// Derives a table key and nonce from user-supplied key material.
///
/// The key is the SHA-256 digest of the material; the nonce reuses the last
/// 12 bytes of the same digest, so it is fixed for the table's lifetime.
pub fn derive_key(material: &[u8]) -> ([u8; TABLE_KEY_SIZE], [u8; TABLE_NONCE_SIZE]) {
    let digest = Sha256::digest(material);

    let mut key = [0u8; TABLE_KEY_SIZE];
    key.copy_from_slice(&digest);

    let mut nonce = [0u8; TABLE_NONCE_SIZE];
    nonce.copy_from_slice(&digest[TABLE_KEY_SIZE - TABLE_NONCE_SIZE..]);

    (key, nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_row() -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Int(42));
        row.insert("name".to_string(), Value::text("alice"));
        row.insert("score".to_string(), Value::Float(99.5));
        row.insert("active".to_string(), Value::Bool(true));
        row.insert("blob".to_string(), Value::Bytes(vec![1, 2, 3]));
        row.insert("tag".to_string(), Value::Uuid(Uuid::from_u128(7)));
        row.insert(
            "seen".to_string(),
            Value::Timestamp(Utc.with_ymd_and_hms(2024, 9, 14, 15, 32, 1).unwrap()),
        );
        row.insert("missing".to_string(), Value::Null);
        row
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let row = sample_row();
        let encoded = encode_row(&row);
        let decoded = decode_row(&encoded).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_decode_truncated() {
        let row = sample_row();
        let encoded = encode_row(&row);
        let result = decode_row(&encoded[..encoded.len() - 3]);
        assert!(matches!(result, Err(OpalError::Corruption { .. })));
    }

    #[test]
    fn test_decode_bad_tag() {
        // one column named "a" with an unknown tag
        let mut buf = 1u32.to_le_bytes().to_vec();
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.push(b'a');
        buf.push(0xEE);
        assert!(matches!(
            decode_row(&buf),
            Err(OpalError::Corruption { .. })
        ));
    }

    #[test]
    fn test_compress_roundtrip() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec();
        let compressed = compress(&data).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_encrypt_roundtrip() {
        let (key, nonce) = derive_key(b"password");
        let data = b"hello world".to_vec();

        let ciphertext = encrypt(&key, &nonce, &data);
        assert_eq!(ciphertext.len(), data.len());
        assert_ne!(ciphertext, data);
        assert_eq!(decrypt(&key, &nonce, &ciphertext), data);
    }

    #[test]
    fn test_full_pipeline_roundtrip() {
        let (key, nonce) = derive_key(b"pw");
        let row = sample_row();

        let encoded = encode_row(&row);
        let stored = encrypt(&key, &nonce, &compress(&encoded).unwrap());

        let recovered = decompress(&decrypt(&key, &nonce, &stored)).unwrap();
        assert_eq!(recovered, encoded);
        assert_eq!(decode_row(&recovered).unwrap(), row);
    }

    #[test]
    fn test_derive_key_nonce_suffix() {
        let (key, nonce) = derive_key(b"material");
        assert_eq!(&key[20..], &nonce[..]);

        let (key2, _) = derive_key(b"material");
        assert_eq!(key, key2);
    }
}
