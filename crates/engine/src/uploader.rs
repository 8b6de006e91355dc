//! Staging of input files into run directories.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rob_templates::{is_relative_path, TemplateError};
use tokio::fs;

use crate::error::EngineResult;

/// Stages a file or directory at a relative target path.
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(&self, source: &Path, target: &str) -> EngineResult<()>;
}

/// Uploader that copies files into a local destination directory. A source
/// directory is copied with its whole tree. Missing parent directories of the
/// target are created. Targets that leave the destination directory are
/// rejected.
#[derive(Debug, Clone)]
pub struct FileCopy {
    destination_dir: PathBuf,
}

impl FileCopy {
    pub fn new(destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            destination_dir: destination_dir.into(),
        }
    }
}

#[async_trait]
impl FileUploader for FileCopy {
    async fn upload(&self, source: &Path, target: &str) -> EngineResult<()> {
        if !is_relative_path(target) {
            return Err(TemplateError::InvalidArgument(format!(
                "target path '{}' is outside the run directory",
                target
            ))
            .into());
        }
        let dst = self.destination_dir.join(target);
        tracing::debug!(source = %source.display(), target = %dst.display(), "Copying input");
        if fs::metadata(source).await?.is_dir() {
            copy_tree(source, &dst).await
        } else {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::copy(source, &dst).await?;
            Ok(())
        }
    }
}

async fn copy_tree(source: &Path, target: &Path) -> EngineResult<()> {
    let mut pending = vec![(source.to_path_buf(), target.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        fs::create_dir_all(&dst).await?;
        let mut entries = fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let to = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((path, to));
            } else {
                fs::copy(&path, &to).await?;
            }
        }
    }
    Ok(())
}
