//! Directory snapshotting and diffing (component B).

pub mod diff;
pub mod digest;
pub mod snapshot;

pub use diff::diff;
pub use digest::DigestCache;
pub use snapshot::{walk, FileEntry, Snapshot};
