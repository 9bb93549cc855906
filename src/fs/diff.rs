//! Diffing two snapshots into an ordered patch list (component B).

use crate::fs::digest::DigestCache;
use crate::fs::snapshot::Snapshot;
use crate::patch::Patch;

/// Produces the patch list transforming `old` into `new`. All deletes come
/// first, then all creates, each sub-list in vpath order (both snapshots are
/// already sorted) — this avoids transient name collisions when a file is
/// replaced by a directory (or vice versa) at the same vpath.
pub fn diff(old: &Snapshot, new: &Snapshot, digests: &DigestCache) -> std::io::Result<Vec<Patch>> {
    let mut deletes = Vec::new();
    let mut creates = Vec::new();

    for old_entry in &old.entries {
        if new.get(&old_entry.vpath).is_none() {
            deletes.push(Patch::delete(old_entry.vpath.clone()));
        }
    }

    for new_entry in &new.entries {
        let changed = match old.get(&new_entry.vpath) {
            None => true,
            Some(old_entry) => {
                old_entry.size != new_entry.size || old_entry.mtime != new_entry.mtime
            }
        };
        if changed {
            let digest =
                digests.digest_for(&new_entry.physical_path, new_entry.size, new_entry.mtime)?;
            creates.push(Patch::create(
                new_entry.vpath.clone(),
                new_entry.physical_path.clone(),
                digest,
            ));
        }
    }

    deletes.extend(creates);
    Ok(deletes)
}
