use crate::hash::ObjectHash;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Version alias table kept next to the cached indexes. No `.json` suffix, so
/// it never collides with an index file.
pub const INDEX_ALIASES_FILE: &str = "versions.aliases";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid asset index id {0:?}")]
pub struct IndexIdError(pub String);

/// Content-addressed object store rooted at `<root>/objects/<shard>/<hash>`.
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    /// Where `hash` lives. Pure: never touches disk.
    pub fn locate(&self, hash: &ObjectHash) -> PathBuf {
        self.objects_dir().join(hash.shard()).join(hash.as_str())
    }

    pub fn contains(&self, hash: &ObjectHash) -> bool {
        self.locate(hash).is_file()
    }

    /// Recompute the digest of the stored object. `Ok(false)` on mismatch.
    pub fn verify(&self, hash: &ObjectHash) -> io::Result<bool> {
        Ok(ObjectHash::of_file(&self.locate(hash))? == *hash)
    }

    /// Local copy of the asset index `id`. The id must be a single plain
    /// file-name component.
    pub fn index_path(&self, id: &str) -> Result<PathBuf, IndexIdError> {
        let bad = id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0', ':']);
        if bad {
            return Err(IndexIdError(id.to_owned()));
        }
        Ok(self.root.join("indexes").join(format!("{id}.json")))
    }

    /// Version name -> asset index id, learned from catalog lookups.
    pub fn aliases_path(&self) -> PathBuf {
        self.root.join("indexes").join(INDEX_ALIASES_FILE)
    }

    /// Store `bytes` under `hash`: temp file in the shard dir, then rename.
    /// Concurrent writers of the same hash race benignly; the last rename wins.
    pub fn write_object(&self, hash: &ObjectHash, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.locate(hash);
        let shard_dir = path.parent().unwrap_or(&self.root);
        write_atomic(shard_dir, &path, bytes)?;
        Ok(path)
    }
}

/// Write `bytes` to `path` through a temp file created in `dir` (same filesystem).
pub(crate) fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
