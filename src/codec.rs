//! Record and hint framing.
//!
//! Segment record frame: `CRC32(payload) || payload || '\n'`, where
//! `payload = timestamp || key_size || value_size || key || value`, all
//! fixed-width hex for the header fields. Hint entries share the same
//! header shape but carry a `value_offset` instead of a CRC and value.

use crate::error::{Error, Result};

/// CRC header width, in hex digits.
const CRC_HEX_LEN: usize = 8;
/// Timestamp header width, in hex digits (nanosecond epoch).
const TIMESTAMP_HEX_LEN: usize = 16;
/// Key-size header width, in hex digits. Imposes a hard 255-byte max key.
const KEY_SIZE_HEX_LEN: usize = 2;
/// Value-size header width, in hex digits. Imposes a hard 4095-byte max
/// value.
const VALUE_SIZE_HEX_LEN: usize = 3;
/// Value-offset header width, in hex digits (hint entries only).
const VALUE_OFFSET_HEX_LEN: usize = 16;

/// Maximum key length the 2-hex-digit `key_size` field can represent.
pub const MAX_KEY_SIZE: usize = 0xFF;
/// Maximum value length the 3-hex-digit `value_size` field can represent.
pub const MAX_VALUE_SIZE: usize = 0xFFF;

/// Byte length of a record's header, before key and value bytes:
/// CRC + timestamp + key_size + value_size.
pub const RECORD_HEADER_LEN: usize = CRC_HEX_LEN + TIMESTAMP_HEX_LEN + KEY_SIZE_HEX_LEN + VALUE_SIZE_HEX_LEN;

/// Byte length of a hint's header, before the key bytes: timestamp +
/// key_size + value_size + value_offset.
pub const HINT_HEADER_LEN: usize =
    TIMESTAMP_HEX_LEN + KEY_SIZE_HEX_LEN + VALUE_SIZE_HEX_LEN + VALUE_OFFSET_HEX_LEN;

/// A decoded segment record. `value_size == 0` (`value.is_none()`) marks a
/// tombstone; `put` never writes an empty value (it's rejected at the API),
/// so the encoding is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: u64,
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

/// A decoded hint entry: everything recovery needs to place a key without
/// re-reading the segment's value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintEntry {
    pub timestamp: u64,
    pub key: Vec<u8>,
    pub value_size: usize,
    pub value_offset: u64,
}

fn check_key_value(key: &[u8], value_len: usize) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key must not be empty".into()));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(Error::InvalidArgument(format!(
            "key length {} exceeds maximum of {MAX_KEY_SIZE}",
            key.len()
        )));
    }
    if value_len > MAX_VALUE_SIZE {
        return Err(Error::InvalidArgument(format!(
            "value length {value_len} exceeds maximum of {MAX_VALUE_SIZE}"
        )));
    }
    if key.contains(&b'\n') {
        return Err(Error::InvalidArgument("key must not contain a newline byte".into()));
    }
    Ok(())
}

/// Encodes a record into its on-disk frame, including the trailing `'\n'`
/// delimiter. Returns the encoded bytes and the offset of the value within
/// them (0 for tombstones, where there's nothing to offset to).
pub fn encode_record(timestamp: u64, key: &[u8], value: Option<&[u8]>) -> Result<(Vec<u8>, usize)> {
    let value_len = value.map_or(0, |v| v.len());
    check_key_value(key, value_len)?;
    if let Some(v) = value {
        if v.contains(&b'\n') {
            return Err(Error::InvalidArgument("value must not contain a newline byte".into()));
        }
    }

    let mut payload = format!(
        "{:016x}{:02x}{:03x}",
        timestamp,
        key.len(),
        value_len
    )
    .into_bytes();
    payload.extend_from_slice(key);
    if let Some(v) = value {
        payload.extend_from_slice(v);
    }

    let crc = crc32fast::hash(&payload);
    let mut frame = format!("{crc:08x}").into_bytes();
    let value_offset_in_frame = frame.len() + payload.len() - value_len;
    frame.extend_from_slice(&payload);
    frame.push(b'\n');
    Ok((frame, value_offset_in_frame))
}

/// Decodes a single record frame, `line` including its trailing `'\n'`.
/// Returns the record and the byte offset of the value within `line`
/// (meaningful only when the record isn't a tombstone).
pub fn decode_record(line: &[u8]) -> Result<(Record, usize)> {
    let line = line
        .strip_suffix(b"\n")
        .ok_or_else(|| Error::CorruptRecord("record missing trailing newline".into()))?;
    if line.len() < CRC_HEX_LEN {
        return Err(Error::CorruptRecord("record shorter than CRC header".into()));
    }
    let (crc_hex, payload) = line.split_at(CRC_HEX_LEN);
    let expected_crc = parse_hex_u32(crc_hex, "crc")?;
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(Error::CorruptRecord(format!(
            "crc mismatch: header={expected_crc:08x} computed={actual_crc:08x}"
        )));
    }

    let header_len = TIMESTAMP_HEX_LEN + KEY_SIZE_HEX_LEN + VALUE_SIZE_HEX_LEN;
    if payload.len() < header_len {
        return Err(Error::CorruptRecord("payload shorter than record header".into()));
    }
    let (timestamp_hex, rest) = payload.split_at(TIMESTAMP_HEX_LEN);
    let (key_size_hex, rest) = rest.split_at(KEY_SIZE_HEX_LEN);
    let (value_size_hex, rest) = rest.split_at(VALUE_SIZE_HEX_LEN);

    let timestamp = parse_hex_u64(timestamp_hex, "timestamp")?;
    let key_size = parse_hex_usize(key_size_hex, "key_size")?;
    let value_size = parse_hex_usize(value_size_hex, "value_size")?;

    if rest.len() != key_size + value_size {
        return Err(Error::CorruptRecord(format!(
            "key/value length mismatch: header says {} bytes, found {}",
            key_size + value_size,
            rest.len()
        )));
    }
    let (key, value) = rest.split_at(key_size);
    let value_offset_in_frame = CRC_HEX_LEN + header_len + key_size;
    let record = Record {
        timestamp,
        key: key.to_vec(),
        value: if value_size > 0 { Some(value.to_vec()) } else { None },
    };
    Ok((record, value_offset_in_frame))
}

/// Encodes a hint entry, including the trailing `'\n'` delimiter.
pub fn encode_hint(entry: &HintEntry) -> Vec<u8> {
    let mut out = format!(
        "{:016x}{:02x}{:03x}{:016x}",
        entry.timestamp,
        entry.key.len(),
        entry.value_size,
        entry.value_offset,
    )
    .into_bytes();
    out.extend_from_slice(&entry.key);
    out.push(b'\n');
    out
}

/// Decodes a single hint entry, `line` including its trailing `'\n'`. Hints
/// carry no CRC: callers should treat a parse failure as "discard and fall
/// back to scanning the segment", not as fatal corruption.
pub fn decode_hint(line: &[u8]) -> Result<HintEntry> {
    let line = line
        .strip_suffix(b"\n")
        .ok_or_else(|| Error::CorruptRecord("hint missing trailing newline".into()))?;
    if line.len() < HINT_HEADER_LEN {
        return Err(Error::CorruptRecord("hint shorter than header".into()));
    }
    let (timestamp_hex, rest) = line.split_at(TIMESTAMP_HEX_LEN);
    let (key_size_hex, rest) = rest.split_at(KEY_SIZE_HEX_LEN);
    let (value_size_hex, rest) = rest.split_at(VALUE_SIZE_HEX_LEN);
    let (value_offset_hex, key) = rest.split_at(VALUE_OFFSET_HEX_LEN);

    let timestamp = parse_hex_u64(timestamp_hex, "timestamp")?;
    let key_size = parse_hex_usize(key_size_hex, "key_size")?;
    let value_size = parse_hex_usize(value_size_hex, "value_size")?;
    let value_offset = parse_hex_u64(value_offset_hex, "value_offset")?;

    if key.len() != key_size {
        return Err(Error::CorruptRecord(format!(
            "key length mismatch: header says {key_size}, found {}",
            key.len()
        )));
    }
    Ok(HintEntry { timestamp, key: key.to_vec(), value_size, value_offset })
}

fn parse_hex_u64(bytes: &[u8], field: &str) -> Result<u64> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| Error::CorruptRecord(format!("{field} is not valid UTF-8 hex")))?;
    u64::from_str_radix(s, 16).map_err(|_| Error::CorruptRecord(format!("{field} is not valid hex")))
}

fn parse_hex_u32(bytes: &[u8], field: &str) -> Result<u32> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| Error::CorruptRecord(format!("{field} is not valid UTF-8 hex")))?;
    u32::from_str_radix(s, 16).map_err(|_| Error::CorruptRecord(format!("{field} is not valid hex")))
}

fn parse_hex_usize(bytes: &[u8], field: &str) -> Result<usize> {
    Ok(parse_hex_u64(bytes, field)? as usize)
}
