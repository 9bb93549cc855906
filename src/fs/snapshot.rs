//! A point-in-time, sorted view of a mount's physical directory tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::patch::VirtualPath;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub vpath: VirtualPath,
    pub physical_path: PathBuf,
    pub size: u64,
    pub mtime: SystemTime,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub entries: Vec<FileEntry>,
}

impl Snapshot {
    pub fn get(&self, vpath: &str) -> Option<&FileEntry> {
        // Entries are vpath-sorted but small mounts don't warrant a binary
        // search; linear scan keeps this simple.
        self.entries.iter().find(|e| e.vpath == vpath)
    }
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "error walking mount: {e}"),
        }
    }
}

impl std::error::Error for Error {}

/// Walks `root`, producing a deterministic, vpath-sorted snapshot. Virtual
/// paths are `alias` joined with the entry's path relative to `root`, with
/// `/` separators regardless of platform. Symlinks are not traversed.
pub fn walk(root: &Path, alias: &str) -> Result<Snapshot, Error> {
    let mut entries = Vec::new();
    walk_dir(root, root, alias, &mut entries)?;
    entries.sort_by(|a, b| a.vpath.cmp(&b.vpath));
    Ok(Snapshot { entries })
}

fn walk_dir(root: &Path, dir: &Path, alias: &str, out: &mut Vec<FileEntry>) -> Result<(), Error> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        let path = entry.path();
        if file_type.is_dir() {
            walk_dir(root, &path, alias, out)?;
        } else if file_type.is_file() {
            let metadata = entry.metadata()?;
            let relative = path.strip_prefix(root).expect("walked path is under root");
            out.push(FileEntry {
                vpath: to_vpath(alias, relative),
                physical_path: path,
                size: metadata.len(),
                mtime: metadata.modified()?,
            });
        }
    }
    Ok(())
}

fn to_vpath(alias: &str, relative: &Path) -> String {
    let mut vpath = alias.trim_end_matches('/').to_string();
    for component in relative.components() {
        vpath.push('/');
        vpath.push_str(&component.as_os_str().to_string_lossy());
    }
    vpath
}
