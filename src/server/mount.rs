//! Mount and subscription registry (component D).
//!
//! Owned exclusively by [`crate::server::actor::ServerActor`]; nothing here
//! takes a lock because nothing else ever observes this state (see SPEC_FULL
//! §5).

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use crate::fs::{diff, snapshot, DigestCache, Snapshot};
use crate::patch::{Digest, Op, Patch, VirtualPath};

/// Identifies a connected client session within the server actor. Assigned
/// by the actor on connect; has no meaning outside one server process.
pub type ClientId = u64;

#[derive(Debug)]
pub enum Error {
    Snapshot(snapshot::Error),
}

impl From<snapshot::Error> for Error {
    fn from(e: snapshot::Error) -> Self {
        Error::Snapshot(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Snapshot(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

/// A client's declared interest in one virtual subtree, plus its hint of
/// which files it already has (`digest_cache`, keyed by absolute vpath).
#[derive(Debug, Clone)]
pub struct Subscription {
    pub client: ClientId,
    pub path: VirtualPath,
    pub digest_cache: HashMap<VirtualPath, Digest>,
}

impl Subscription {
    /// A client-advertised cache key that is not already absolute is
    /// rewritten to `sub.path + "/" + key` so every later comparison can
    /// assume absolute vpath keys.
    pub fn new(client: ClientId, path: VirtualPath, cache: HashMap<String, Digest>) -> Self {
        let digest_cache = cache
            .into_iter()
            .map(|(key, digest)| {
                let absolute = if key.starts_with('/') {
                    key
                } else {
                    format!("{}/{}", path.trim_end_matches('/'), key)
                };
                (absolute, digest)
            })
            .collect();
        Self { client, path, digest_cache }
    }
}

/// A published directory tree: a physical `location` exposed under virtual
/// `alias`, with its current snapshot and subscriber list.
pub struct Mount {
    pub alias: VirtualPath,
    pub location: PathBuf,
    pub snapshot: Snapshot,
    pub subscriptions: Vec<Subscription>,
    digests: DigestCache,
}

impl Mount {
    pub fn new(location: PathBuf, alias: VirtualPath) -> Self {
        Self { alias, location, snapshot: Snapshot::default(), subscriptions: Vec::new(), digests: DigestCache::new() }
    }
}

/// `sub_patch_add`: the core fan-out operation. Elides a Create the client
/// already has (by digest), supersedes any queued patch for the same vpath,
/// updates the subscription's digest cache for Creates, and appends a clone
/// of the patch to the client's queue.
pub fn sub_patch_add(sub: &mut Subscription, queue: &mut VecDeque<Patch>, patch: &Patch) {
    if patch.op == Op::Create {
        if let Some(known) = sub.digest_cache.get(&patch.vpath) {
            if Some(known) == patch.digest.as_ref() {
                return;
            }
        }
    }

    if let Some(pos) = queue.iter().position(|queued| queued.vpath == patch.vpath) {
        queue.remove(pos);
    }

    if patch.op == Op::Create {
        if let Some(digest) = &patch.digest {
            sub.digest_cache.insert(patch.vpath.clone(), digest.clone());
        }
    }

    queue.push_back(patch.clone());
}

fn is_prefix_path(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    let prefix = prefix.trim_end_matches('/');
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

/// `mount_sub_store`: coalesces overlapping subscriptions for the same
/// client. A new subscription covered by an existing broader one is
/// dropped; a new broader subscription replaces any existing narrower ones.
pub fn mount_sub_store(mount: &mut Mount, client: ClientId, path: VirtualPath, cache: HashMap<String, Digest>) {
    if mount
        .subscriptions
        .iter()
        .any(|s| s.client == client && is_prefix_path(&s.path, &path))
    {
        return;
    }

    mount
        .subscriptions
        .retain(|s| !(s.client == client && is_prefix_path(&path, &s.path)));

    mount.subscriptions.push(Subscription::new(client, path, cache));
}

/// `mount_sub_purge`: removes all subscriptions belonging to a departed
/// client.
pub fn mount_sub_purge(mount: &mut Mount, client: ClientId) {
    mount.subscriptions.retain(|s| s.client != client);
}

/// Selects, among all mounts whose alias is a prefix of `path`, the one with
/// the longest matching alias — so a server publishing both `/` and
/// `/photos` routes an `ICANHAZ /photos/2024` subscription to `/photos`.
pub fn select_mount<'a>(mounts: &'a mut [Mount], path: &str) -> Option<&'a mut Mount> {
    mounts
        .iter_mut()
        .filter(|m| is_prefix_path(&m.alias, path))
        .max_by_key(|m| m.alias.len())
}

/// `mount_refresh`: reconciles the mount's snapshot against disk and fans
/// out every resulting patch to each subscriber's queue. Returns whether any
/// patch was produced.
pub fn mount_refresh(mount: &mut Mount, queues: &mut HashMap<ClientId, VecDeque<Patch>>) -> Result<bool, Error> {
    let new_snapshot = snapshot::walk(&mount.location, &mount.alias)?;
    let patches = diff::diff(&mount.snapshot, &new_snapshot, &mount.digests)?;
    mount.snapshot = new_snapshot;

    if patches.is_empty() {
        return Ok(false);
    }

    for sub in &mut mount.subscriptions {
        let queue = queues.entry(sub.client).or_default();
        for patch in &patches {
            if is_prefix_path(&sub.path, &patch.vpath) {
                sub_patch_add(sub, queue, patch);
            }
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(vpath: &str, digest: &str) -> Patch {
        Patch::create(vpath.to_string(), PathBuf::from("/tmp/x"), digest.to_string())
    }

    #[test]
    fn elides_patch_already_in_cache() {
        let mut sub = Subscription::new(1, "/".to_string(), HashMap::new());
        sub.digest_cache.insert("/a.txt".to_string(), "d1".to_string());
        let mut queue = VecDeque::new();
        sub_patch_add(&mut sub, &mut queue, &patch("/a.txt", "d1"));
        assert!(queue.is_empty());
    }

    #[test]
    fn supersedes_queued_patch_for_same_vpath() {
        let mut sub = Subscription::new(1, "/".to_string(), HashMap::new());
        let mut queue = VecDeque::new();
        sub_patch_add(&mut sub, &mut queue, &patch("/a.txt", "d1"));
        sub_patch_add(&mut sub, &mut queue, &patch("/a.txt", "d2"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].digest.as_deref(), Some("d2"));
    }

    #[test]
    fn mount_sub_store_coalesces_by_prefix() {
        let mut mount = Mount::new(PathBuf::from("/tmp"), "/".to_string());
        mount_sub_store(&mut mount, 1, "/photos".to_string(), HashMap::new());
        mount_sub_store(&mut mount, 1, "/photos/2024".to_string(), HashMap::new());
        assert_eq!(mount.subscriptions.len(), 1);
        assert_eq!(mount.subscriptions[0].path, "/photos");

        mount_sub_store(&mut mount, 2, "/photos/2024".to_string(), HashMap::new());
        mount_sub_store(&mut mount, 2, "/photos".to_string(), HashMap::new());
        let client2: Vec<_> = mount.subscriptions.iter().filter(|s| s.client == 2).collect();
        assert_eq!(client2.len(), 1);
        assert_eq!(client2[0].path, "/photos");
    }

    #[test]
    fn select_mount_prefers_longest_alias() {
        let mut mounts = vec![Mount::new(PathBuf::from("/a"), "/".to_string()), Mount::new(PathBuf::from("/b"), "/photos".to_string())];
        let selected = select_mount(&mut mounts, "/photos/2024").unwrap();
        assert_eq!(selected.alias, "/photos");
    }
}
