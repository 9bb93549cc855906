//! Decode primitives. Mirrors the free-function, `&mut impl Read` style of
//! the teacher crate's `parser/primitive.rs`, operating on complete in-memory
//! buffers rather than a retrying socket-backed reader.

use std::collections::HashMap;
use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};

use super::{DecodeError, Result, MAX_FRAME_LEN};

pub fn u8(r: &mut impl Read) -> Result<u8> {
    Ok(ReadBytesExt::read_u8(r)?)
}

pub fn u64(r: &mut impl Read) -> Result<u64> {
    Ok(r.read_u64::<BigEndian>()?)
}

pub fn number(r: &mut impl Read) -> Result<u64> {
    u64(r)
}

/// 1-byte length-prefixed string, used for `path`, `filename`, and map keys.
pub fn short_string(r: &mut impl Read) -> Result<String> {
    let len = u8(r)? as usize;
    read_string(r, len)
}

/// 4-byte length-prefixed string, used for `reason` and map values.
pub fn long_string(r: &mut impl Read) -> Result<String> {
    let len = r.read_u32::<BigEndian>()? as usize;
    if len > MAX_FRAME_LEN {
        return Err(DecodeError::FieldTooLarge);
    }
    read_string(r, len)
}

fn read_string(r: &mut impl Read, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| DecodeError::BadUtf8)
}

/// A `string -> string` map: 4-byte entry count, then `(short key, long value)`
/// pairs. The entry count is never used to pre-size storage beyond a small
/// constant, so a bogus huge count cannot force an unbounded allocation.
pub fn map(r: &mut impl Read) -> Result<HashMap<String, String>> {
    let count = r.read_u32::<BigEndian>()? as usize;
    let mut out = HashMap::new();
    for _ in 0..count {
        let key = short_string(r)?;
        let value = long_string(r)?;
        out.insert(key, value);
    }
    Ok(out)
}

/// A chunk: 4-byte length prefix followed by that many raw bytes.
pub fn chunk(r: &mut impl Read) -> Result<Vec<u8>> {
    let len = r.read_u32::<BigEndian>()? as usize;
    if len > MAX_FRAME_LEN {
        return Err(DecodeError::FieldTooLarge);
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}
