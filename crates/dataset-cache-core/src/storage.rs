//! Cache directory IO.
//!
//! Paths inside a cache are always relative (see [`layout`]) and are resolved
//! against a [`CacheLocation`] here. Metadata files are committed with
//! [`write_atomic`]: a reader sees either the previous content or the new one.

pub mod error;
pub mod layout;

pub use error::{BackendError, StorageError};
pub(crate) use error::{NotFoundSnafu, OtherIoSnafu};

use snafu::prelude::*;
use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root directory of a dataset cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheLocation {
    /// A cache stored on the local filesystem at the given path.
    Local(PathBuf),
}

impl CacheLocation {
    /// Cache rooted at a local directory.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        CacheLocation::Local(root.into())
    }

    /// Parse the `--cache-dir` value given by a user. Blank input is rejected.
    pub fn parse(spec: &str) -> StorageResult<Self> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(BackendError::Local(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cache location is empty",
            )))
            .context(OtherIoSnafu {
                path: "<empty cache location>".to_string(),
            });
        }
        Ok(CacheLocation::local(trimmed))
    }

    /// Absolute path of `rel` inside the cache.
    pub fn join(&self, rel: &Path) -> PathBuf {
        match self {
            CacheLocation::Local(root) => root.join(rel),
        }
    }

    /// Root of the cache, for log lines and error messages.
    pub fn display(&self) -> String {
        match self {
            CacheLocation::Local(root) => root.display().to_string(),
        }
    }
}

/// Attaches `path` to a failed local IO result.
fn local_io<T>(res: io::Result<T>, path: &Path) -> StorageResult<T> {
    res.map_err(BackendError::Local).context(OtherIoSnafu {
        path: path.display().to_string(),
    })
}

/// Hidden sibling that receives the bytes before they are renamed into place.
fn staging_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(target.file_name().unwrap_or_default());
    name.push(".partial");
    target.with_file_name(name)
}

/// Staging file of an in-flight [`write_atomic`]; deleted on drop until committed.
struct StagedFile {
    path: PathBuf,
    committed: bool,
}

impl StagedFile {
    async fn write(path: PathBuf, contents: &[u8]) -> StorageResult<Self> {
        let staged = StagedFile {
            path,
            committed: false,
        };
        let mut file = local_io(fs::File::create(&staged.path).await, &staged.path)?;
        local_io(file.write_all(contents).await, &staged.path)?;
        local_io(file.sync_all().await, &staged.path)?;
        Ok(staged)
    }

    async fn commit(mut self, target: &Path) -> StorageResult<()> {
        local_io(fs::rename(&self.path, target).await, target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Create `rel_dir` (and all of its parents) under `location`.
pub async fn create_dir_all(location: &CacheLocation, rel_dir: &Path) -> StorageResult<()> {
    let abs = location.join(rel_dir);
    local_io(fs::create_dir_all(&abs).await, &abs)
}

/// Returns whether `rel_path` exists under `location`.
///
/// Errors other than "not found" (for example, permission denied on a parent
/// directory) are reported rather than folded into `false`.
pub async fn exists(location: &CacheLocation, rel_path: &Path) -> StorageResult<bool> {
    let abs = location.join(rel_path);
    match fs::metadata(&abs).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => local_io(Err(e), &abs),
    }
}

/// Replace the file at `rel_path` with `contents`.
///
/// The bytes are staged in a hidden `.<name>.partial` sibling, synced to disk,
/// then renamed over the target. Missing parent directories are created. On
/// failure the staging file is removed and the target is left untouched.
pub async fn write_atomic(
    location: &CacheLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let target = location.join(rel_path);
    if let Some(parent) = target.parent() {
        local_io(fs::create_dir_all(parent).await, parent)?;
    }
    StagedFile::write(staging_path(&target), contents)
        .await?
        .commit(&target)
        .await
}

/// Read a cache file as UTF-8. A missing file is `StorageError::NotFound`.
pub async fn read_to_string(location: &CacheLocation, rel_path: &Path) -> StorageResult<String> {
    let abs = location.join(rel_path);
    match fs::read_to_string(&abs).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(BackendError::Local(e)).context(NotFoundSnafu {
                path: abs.display().to_string(),
            })
        }
        res => local_io(res, &abs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn write_atomic_creates_parent_directories() -> TestResult {
        let tmp = TempDir::new()?;
        let location = CacheLocation::local(tmp.path());

        let rel_path = Path::new("shard_metadata/shard-00000-of-00002.json");
        write_atomic(&location, rel_path, b"{\"num_examples\":3}").await?;

        let abs = tmp.path().join(rel_path);
        assert!(abs.exists());
        let read_back = tokio::fs::read_to_string(&abs).await?;
        assert_eq!(read_back, "{\"num_examples\":3}");
        Ok(())
    }

    #[tokio::test]
    async fn write_atomic_overwrites_existing_file() -> TestResult {
        let tmp = TempDir::new()?;
        let location = CacheLocation::local(tmp.path());
        let rel_path = Path::new("cache_metadata.json");

        write_atomic(&location, rel_path, b"original").await?;
        write_atomic(&location, rel_path, b"updated").await?;

        let read_back = read_to_string(&location, rel_path).await?;
        assert_eq!(read_back, "updated");
        Ok(())
    }

    #[tokio::test]
    async fn write_atomic_leaves_no_tmp_file() -> TestResult {
        let tmp = TempDir::new()?;
        let location = CacheLocation::local(tmp.path());

        write_atomic(&location, Path::new("clean.json"), b"{}").await?;

        let names: Vec<_> = std::fs::read_dir(tmp.path())?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<Result<_, _>>()?;
        assert_eq!(names, vec![OsString::from("clean.json")]);
        Ok(())
    }

    #[tokio::test]
    async fn read_to_string_returns_not_found_for_missing_file() -> TestResult {
        let tmp = TempDir::new()?;
        let location = CacheLocation::local(tmp.path());

        let err = read_to_string(&location, Path::new("missing.json"))
            .await
            .expect_err("expected NotFound error");
        assert!(matches!(
            err,
            StorageError::NotFound { ref source, .. } if source.kind() == io::ErrorKind::NotFound
        ));
        assert!(err.path().ends_with("missing.json"));
        Ok(())
    }

    #[tokio::test]
    async fn exists_reports_presence() -> TestResult {
        let tmp = TempDir::new()?;
        let location = CacheLocation::local(tmp.path());
        let rel_path = Path::new("raw");

        assert!(!exists(&location, rel_path).await?);
        create_dir_all(&location, rel_path).await?;
        assert!(exists(&location, rel_path).await?);
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_content() -> TestResult {
        let tmp = TempDir::new()?;
        let location = CacheLocation::local(tmp.path());
        let rel_path = Path::new("cache_metadata.json");
        write_atomic(&location, rel_path, b"v1").await?;

        // A directory squatting on the staging path makes the write fail.
        std::fs::create_dir(tmp.path().join(".cache_metadata.json.partial"))?;
        let err = write_atomic(&location, rel_path, b"v2")
            .await
            .expect_err("staging must fail");
        assert!(matches!(err, StorageError::OtherIo { .. }));
        assert_eq!(read_to_string(&location, rel_path).await?, "v1");
        Ok(())
    }

    #[test]
    fn parse_rejects_empty_location() {
        let err = CacheLocation::parse("   ").expect_err("empty location must fail");
        assert!(matches!(err, StorageError::OtherIo { .. }));
    }
}
