use iota_core::{ArtifactKey, ArtifactStore, IotaError, IotaResult};
use rand::RngCore;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Artifacts as plain files under an instance directory.
///
/// Each `put` writes a uniquely named temp file next to the target, syncs
/// it and renames it over the target, so readers see either the old or the
/// new bytes. `ArtifactKey` segments cannot contain `..`, so every path
/// stays under `root`.
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> IotaResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            IotaError::Storage(format!("failed to create {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        key.segments().fold(self.root.clone(), |p, seg| p.join(seg))
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut suffix = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut suffix);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, hex::encode(suffix)))
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn io_err(key: &ArtifactKey, op: &str) -> impl Fn(io::Error) -> IotaError {
    let key = key.to_string();
    let op = op.to_string();
    move |e| IotaError::Storage(format!("{} {} failed: {}", op, key, e))
}

impl ArtifactStore for FileArtifactStore {
    fn get(&self, key: &ArtifactKey) -> IotaResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(key, "read")(e)),
        }
    }

    fn put(&self, key: &ArtifactKey, data: &[u8]) -> IotaResult<()> {
        write_atomic(&self.path_for(key), data).map_err(io_err(key, "write"))?;
        tracing::debug!(key = %key, bytes = data.len(), "artifact written");
        Ok(())
    }

    fn delete(&self, key: &ArtifactKey) -> IotaResult<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(key, "delete")(e)),
        }
    }

    fn exists(&self, key: &ArtifactKey) -> IotaResult<bool> {
        Ok(self.path_for(key).is_file())
    }
}
