use crate::presence::types::PeerId;

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Suffix of in-progress writes; reserved, so it can never collide with a stored file.
const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("storage I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Rejects names that could escape or alias a namespace directory.
pub fn validate_filename(filename: &str) -> Result<(), CacheError> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.ends_with(PARTIAL_SUFFIX)
        || filename.contains(['/', '\\', '\0']);

    if invalid {
        Err(CacheError::InvalidFilename(filename.to_string()))
    } else {
        Ok(())
    }
}

/// Per-peer on-disk file store rooted at `root`.
#[derive(Debug, Clone)]
pub struct LocalFileCache {
    root: PathBuf,
}

impl LocalFileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace(&self, id: &PeerId) -> PathBuf {
        self.root.join(&id.0)
    }

    /// Path of `filename` inside `id`'s namespace.
    pub fn path_for(&self, id: &PeerId, filename: &str) -> Result<PathBuf, CacheError> {
        validate_filename(filename)?;
        Ok(self.namespace(id).join(filename))
    }

    /// Creates the namespace directory for `id` if it does not exist yet.
    pub async fn ensure_namespace(&self, id: &PeerId) -> Result<PathBuf, CacheError> {
        let dir = self.namespace(id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;
        Ok(dir)
    }

    /// Streams `reader` into `id/filename`, replacing any previous content.
    ///
    /// Returns the number of bytes written.
    pub async fn save<R>(
        &self,
        id: &PeerId,
        filename: &str,
        reader: &mut R,
    ) -> Result<u64, CacheError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let target = self.path_for(id, filename)?;
        let dir = self.ensure_namespace(id).await?;
        // Independent of `filename`, so any name the filesystem accepts can be staged.
        let partial = dir.join(format!(".{}{}", uuid::Uuid::new_v4().simple(), PARTIAL_SUFFIX));

        let written = match write_file(&partial, reader).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(CacheError::io(&partial, e));
            }
        };

        if let Err(e) = fs::rename(&partial, &target).await {
            let _ = fs::remove_file(&partial).await;
            return Err(CacheError::io(&target, e));
        }

        tracing::info!("File {} saved at {} ({} bytes)", filename, target.display(), written);
        Ok(written)
    }

    /// Opens `id/filename` for reading.
    pub async fn get(&self, id: &PeerId, filename: &str) -> Result<File, CacheError> {
        let path = self.path_for(id, filename)?;

        match File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CacheError::NotFound(filename.to_string()))
            }
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Whether `id/filename` is currently stored.
    pub async fn contains(&self, id: &PeerId, filename: &str) -> bool {
        match self.path_for(id, filename) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

async fn write_file<R>(path: &Path, reader: &mut R) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut out = File::create(path).await?;
    let written = tokio::io::copy(reader, &mut out).await?;
    out.flush().await?;
    out.sync_all().await?;
    Ok(written)
}
