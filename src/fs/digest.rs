//! Content digest memoization.
//!
//! Rehashing every file on every refresh tick would make large mounts
//! expensive to watch; a digest is only recomputed when size or mtime
//! changed since it was last seen.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use moka::sync::Cache;
use sha2::{Digest as _, Sha256};

use crate::patch::Digest;

const READ_CHUNK: usize = 64 * 1024;
const MAX_ENTRIES: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    size: u64,
    mtime_secs: i64,
    mtime_nanos: u32,
}

/// Per-mount cache of `(path, size, mtime) -> digest`. Owned by a single
/// mount's snapshot walker; never shared across mounts or threads.
pub struct DigestCache {
    cache: Cache<CacheKey, Digest>,
}

impl DigestCache {
    pub fn new() -> Self {
        Self { cache: Cache::new(MAX_ENTRIES) }
    }

    pub fn digest_for(&self, path: &Path, size: u64, mtime: SystemTime) -> std::io::Result<Digest> {
        let (mtime_secs, mtime_nanos) = split_mtime(mtime);
        let key = CacheKey { path: path.to_path_buf(), size, mtime_secs, mtime_nanos };
        if let Some(digest) = self.cache.get(&key) {
            return Ok(digest);
        }
        let digest = compute_digest(path)?;
        self.cache.insert(key, digest.clone());
        Ok(digest)
    }
}

impl Default for DigestCache {
    fn default() -> Self {
        Self::new()
    }
}

fn split_mtime(mtime: SystemTime) -> (i64, u32) {
    match mtime.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(e) => (-(e.duration().as_secs() as i64), e.duration().subsec_nanos()),
    }
}

fn compute_digest(path: &Path) -> std::io::Result<Digest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn same_content_same_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();
        let cache = DigestCache::new();
        let meta = std::fs::metadata(&path).unwrap();
        let d1 = cache.digest_for(&path, meta.len(), meta.modified().unwrap()).unwrap();

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"").unwrap();
        let d2 = cache.digest_for(&path, meta.len(), meta.modified().unwrap()).unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn different_content_different_digest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"hello").unwrap();
        std::fs::write(&b, b"world").unwrap();
        let cache = DigestCache::new();
        let ma = std::fs::metadata(&a).unwrap();
        let mb = std::fs::metadata(&b).unwrap();
        let da = cache.digest_for(&a, ma.len(), ma.modified().unwrap()).unwrap();
        let db = cache.digest_for(&b, mb.len(), mb.modified().unwrap()).unwrap();
        assert_ne!(da, db);
    }
}
