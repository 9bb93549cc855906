//! A single create-or-delete instruction against a virtual path.

use std::sync::Arc;

/// Absolute, `/`-separated path in the published logical namespace.
pub type VirtualPath = String;

/// Opaque content digest. Computed lazily by the snapshot walker and carried
/// on a `Patch` once known.
pub type Digest = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Delete,
}

/// A create or delete against one virtual path.
///
/// Cheap to clone: the file contents are referenced by `handle`, an opaque
/// physical-path handle the session opens for reading when it actually
/// streams the chunk, not the bytes themselves.
#[derive(Debug, Clone)]
pub struct Patch {
    pub op: Op,
    pub vpath: VirtualPath,
    /// Physical path to read from, set for `Create` only.
    pub handle: Option<Arc<std::path::PathBuf>>,
    /// Content digest, present once computed.
    pub digest: Option<Digest>,
}

impl Patch {
    pub fn create(vpath: VirtualPath, handle: std::path::PathBuf, digest: Digest) -> Self {
        Self { op: Op::Create, vpath, handle: Some(Arc::new(handle)), digest: Some(digest) }
    }

    pub fn delete(vpath: VirtualPath) -> Self {
        Self { op: Op::Delete, vpath, handle: None, digest: None }
    }
}
