use crate::domain::{DownloadError, DownloadFailure, DownloadStage, DownloadTask};
use common::domain::ObjectStore;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Materializes objects under a fixed download root
///
/// Flow:
/// 1. Resolve the bucket's region
/// 2. Ensure the download root exists
/// 3. Map the key onto a path below the root, creating parent directories
/// 4. Fetch through the bucket's region into a temporary sibling file
/// 5. Rename the temporary file onto the target path
pub struct Downloader {
    object_store: Arc<dyn ObjectStore>,
    root: PathBuf,
}

/// Where an object key lands below the download root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalTarget {
    File(PathBuf),
    /// Keys ending in `/` are folder markers
    Directory(PathBuf),
}

impl Downloader {
    pub fn new(object_store: Arc<dyn ObjectStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            object_store,
            root: root.into(),
        }
    }

    /// Map an object key onto a path below the root
    ///
    /// Key segments become subdirectories. Empty, `.` and leading `/`
    /// segments are dropped; `..` is refused so no key can escape the root.
    pub fn local_target(&self, key: &str) -> Result<LocalTarget, String> {
        let mut target = self.root.clone();
        let mut segments = 0;

        for component in Path::new(key).components() {
            match component {
                Component::Normal(segment) => {
                    target.push(segment);
                    segments += 1;
                }
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(format!("object key {:?} escapes the download root", key));
                }
            }
        }

        if segments == 0 {
            return Err(format!("object key {:?} does not name a file", key));
        }

        if key.ends_with('/') {
            Ok(LocalTarget::Directory(target))
        } else {
            Ok(LocalTarget::File(target))
        }
    }

    #[instrument(skip(self, task), fields(bucket = %task.bucket, key = %task.key))]
    pub async fn download(&self, task: &DownloadTask) -> Result<PathBuf, DownloadError> {
        let fail = |stage: DownloadStage, source: DownloadFailure| DownloadError {
            stage,
            bucket: task.bucket.clone(),
            key: task.key.clone(),
            source,
        };

        let region = self
            .object_store
            .region_of(&task.bucket)
            .await
            .map_err(|e| fail(DownloadStage::RegionLookup, e.into()))?;

        // create_dir_all treats an existing directory as success
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| fail(DownloadStage::Io, e.into()))?;

        let target = match self
            .local_target(&task.key)
            .map_err(|reason| fail(DownloadStage::Io, DownloadFailure::InvalidKey(reason)))?
        {
            LocalTarget::Directory(dir) => {
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| fail(DownloadStage::Io, e.into()))?;
                debug!(path = %dir.display(), "created directory for folder marker");
                return Ok(dir);
            }
            LocalTarget::File(path) => path,
        };

        let parent = target.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| fail(DownloadStage::Io, e.into()))?;

        info!(
            region = %region,
            path = %target.display(),
            "Downloading s3://{}/{}",
            task.bucket,
            task.key
        );

        // Removed on drop, so a failed or abandoned fetch leaves nothing behind
        let partial = blocking_io(move || partial_file(&parent))
            .await
            .map_err(|e| fail(DownloadStage::Io, e.into()))?;

        let bytes = self
            .object_store
            .fetch(&task.bucket, &task.key, &region, partial.path())
            .await
            .map_err(|e| fail(DownloadStage::Fetch, e.into()))?;

        let destination = target.clone();
        blocking_io(move || partial.persist(&destination).map(drop).map_err(|e| e.error))
            .await
            .map_err(|e| fail(DownloadStage::Io, e.into()))?;

        debug!(bytes, path = %target.display(), "download complete");
        Ok(target)
    }
}

/// Hidden sibling file the object is fetched into before the rename
///
/// Created with the usual 0666-minus-umask mode rather than tempfile's 0600,
/// since the file becomes the artifact once persisted.
fn partial_file(parent: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".").suffix(".part");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(parent)
}

async fn blocking_io<T, F>(op: F) -> std::io::Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(std::io::Error::other)?
}
