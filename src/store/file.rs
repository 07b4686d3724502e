//! File-backed store: MessagePack snapshot rewritten on every mutation.
//!
//! Layout: a single MessagePack map `{version, identifiers}`. Writes go to
//! a sibling temp file which is fsynced and renamed over the snapshot, so a
//! crash leaves either the old or the new set on disk, never a torn file.
//! Every mutation blocks on disk I/O; async callers that should not stall
//! their runtime thread go through `spawn_blocking`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::asset::AssetId;

use super::{IdentifierStore, StoreError};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    identifiers: Vec<AssetId>,
}

/// Durable store persisted to a single snapshot file.
///
/// The full set is cached in memory; `read` never touches the disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    ids: Vec<AssetId>,
}

impl FileStore {
    /// Open the store at `path`, loading any existing snapshot.
    ///
    /// A missing file is an empty store. The parent directory is created
    /// if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let ids = match fs::read(&path) {
            Ok(bytes) => decode_snapshot(&path, &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        tracing::debug!(path = %path.display(), pending = ids.len(), "opened identifier store");
        Ok(Self { path, ids })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, ids: &[AssetId]) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            identifiers: ids.to_vec(),
        };
        let bytes = rmp_serde::to_vec_named(&snapshot)?;

        let parent = parent_dir(&self.path);
        let write_err = |source: std::io::Error| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        // The temp file is removed on drop unless `persist` succeeds.
        let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
        tmp.write_all(&bytes).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        if let Err(e) = sync_dir(parent) {
            tracing::warn!(path = %parent.display(), error = %e, "failed to sync store directory");
        }
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Flush directory metadata so a completed rename survives power loss.
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

fn decode_snapshot(path: &Path, bytes: &[u8]) -> Result<Vec<AssetId>, StoreError> {
    let snapshot: Snapshot = rmp_serde::from_slice(bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StoreError::Unavailable(format!(
            "{} has snapshot version {} (expected {SNAPSHOT_VERSION})",
            path.display(),
            snapshot.version
        )));
    }

    let mut ids: Vec<AssetId> = Vec::with_capacity(snapshot.identifiers.len());
    for id in snapshot.identifiers {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

impl IdentifierStore for FileStore {
    fn read(&self) -> Result<Vec<AssetId>, StoreError> {
        Ok(self.ids.clone())
    }

    fn insert(&mut self, id: &AssetId) -> Result<(), StoreError> {
        if self.ids.contains(id) {
            return Ok(());
        }
        let mut next = self.ids.clone();
        next.push(id.clone());
        self.persist(&next)?;
        self.ids = next;
        Ok(())
    }

    fn remove(&mut self, id: &AssetId) -> Result<(), StoreError> {
        if !self.ids.contains(id) {
            return Ok(());
        }
        let next: Vec<AssetId> = self.ids.iter().filter(|e| *e != id).cloned().collect();
        self.persist(&next)?;
        self.ids = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> AssetId {
        AssetId::parse(raw).unwrap()
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileStore::open(dir.path().join("pending.msgpack")).unwrap();
        assert!(s.read().unwrap().is_empty());
    }

    #[test]
    fn creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state").join("pending.msgpack");
        let mut s = FileStore::open(&path).unwrap();
        s.insert(&id("a1")).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.msgpack");
        {
            let mut s = FileStore::open(&path).unwrap();
            s.insert(&id("a1")).unwrap();
            s.insert(&id("a2")).unwrap();
            s.insert(&id("a3")).unwrap();
            s.remove(&id("a2")).unwrap();
        }
        let s = FileStore::open(&path).unwrap();
        assert_eq!(s.read().unwrap(), vec![id("a1"), id("a3")]);
    }

    #[test]
    fn duplicate_insert_does_not_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.msgpack");
        let mut s = FileStore::open(&path).unwrap();
        s.insert(&id("a1")).unwrap();
        let before = fs::read(&path).unwrap();
        s.insert(&id("a1")).unwrap();
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(s.read().unwrap().len(), 1);
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = FileStore::open(dir.path().join("pending.msgpack")).unwrap();
        s.insert(&id("a1")).unwrap();
        s.remove(&id("a1")).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("pending.msgpack")]);
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.msgpack");
        let mut s = FileStore::open(&path).unwrap();

        // A non-empty directory at the snapshot path makes the final rename fail.
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), b"x").unwrap();

        let err = s.insert(&id("a1")).unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }), "got {err:?}");
        assert!(s.read().unwrap().is_empty());

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("pending.msgpack")]);
    }

    #[test]
    fn directory_sync() {
        let dir = tempfile::tempdir().unwrap();
        sync_dir(dir.path()).unwrap();
        assert!(sync_dir(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn bare_file_name_uses_current_dir() {
        assert_eq!(parent_dir(Path::new("pending.msgpack")), Path::new("."));
        assert_eq!(parent_dir(Path::new("/s/pending.msgpack")), Path::new("/s"));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.msgpack");
        fs::write(&path, b"\xc1 not msgpack").unwrap();
        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "got {err:?}");
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.msgpack");
        let bytes = rmp_serde::to_vec_named(&Snapshot {
            version: 99,
            identifiers: vec![id("a1")],
        })
        .unwrap();
        fs::write(&path, bytes).unwrap();
        let err = FileStore::open(&path).unwrap_err();
        assert!(err.to_string().contains("snapshot version 99"));
    }

    #[test]
    fn failed_write_keeps_cached_set() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let mut s = FileStore::open(state_dir.join("pending.msgpack")).unwrap();
        s.insert(&id("a1")).unwrap();

        fs::remove_dir_all(&state_dir).unwrap();
        let err = s.insert(&id("a2")).unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }), "got {err:?}");
        assert_eq!(s.read().unwrap(), vec![id("a1")]);
    }
}
