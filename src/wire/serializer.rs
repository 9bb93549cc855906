//! Encode primitives, the write-side mirror of `primitive.rs`. Modeled on the
//! teacher crate's `serializer/mod.rs` free-function, `&mut dyn Write` style.

use std::collections::HashMap;
use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};

pub fn u8(w: &mut dyn Write, v: u8) -> std::io::Result<()> {
    WriteBytesExt::write_u8(w, v)
}

pub fn u64(w: &mut dyn Write, v: u64) -> std::io::Result<()> {
    w.write_u64::<BigEndian>(v)
}

pub fn number(w: &mut dyn Write, v: u64) -> std::io::Result<()> {
    u64(w, v)
}

pub fn short_string(w: &mut dyn Write, s: &str) -> std::io::Result<()> {
    debug_assert!(s.len() <= u8::MAX as usize, "short string exceeds 255 bytes");
    u8(w, s.len() as u8)?;
    w.write_all(s.as_bytes())
}

pub fn long_string(w: &mut dyn Write, s: &str) -> std::io::Result<()> {
    w.write_u32::<BigEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

pub fn map(w: &mut dyn Write, m: &HashMap<String, String>) -> std::io::Result<()> {
    w.write_u32::<BigEndian>(m.len() as u32)?;
    for (k, v) in m {
        short_string(w, k)?;
        long_string(w, v)?;
    }
    Ok(())
}

pub fn chunk(w: &mut dyn Write, bytes: &[u8]) -> std::io::Result<()> {
    w.write_u32::<BigEndian>(bytes.len() as u32)?;
    w.write_all(bytes)
}
