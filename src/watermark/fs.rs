// ABOUTME: Filesystem DocumentBackend - stores watermark documents under a local directory
// ABOUTME: Writes go to a uniquely named temp file and are renamed into place

use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::store::DocumentBackend;
use crate::error::BackendError;

/// Keeps each document as a pretty-printed JSON file, URI mapped to a path
/// relative to `root`.
///
/// Permissions and collections have no filesystem meaning and are ignored.
#[derive(Debug, Clone)]
pub struct FsDocumentBackend {
    root: PathBuf,
}

impl FsDocumentBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a document URI to a file below `root`, refusing anything that
    /// would escape it.
    pub fn path_for(&self, uri: &str) -> Result<PathBuf, BackendError> {
        let relative = Path::new(uri.trim_start_matches('/'));
        let mut path = self.root.clone();
        let mut segments = 0;
        for component in relative.components() {
            match component {
                Component::Normal(segment) => {
                    path.push(segment);
                    segments += 1;
                }
                Component::CurDir => {}
                _ => return Err(BackendError::InvalidUri(uri.to_string())),
            }
        }
        if segments == 0 {
            return Err(BackendError::InvalidUri(uri.to_string()));
        }
        Ok(path)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> BackendError {
    BackendError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl DocumentBackend for FsDocumentBackend {
    async fn write_document(
        &self,
        uri: &str,
        _permissions: &str,
        _collections: &[String],
        body: &Value,
    ) -> Result<(), BackendError> {
        let path = self.path_for(uri)?;
        let parent = path
            .parent()
            .ok_or_else(|| BackendError::InvalidUri(uri.to_string()))?;
        fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| BackendError::InvalidUri(uri.to_string()))?;
        let temp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let contents = serde_json::to_vec_pretty(body)?;
        fs::write(&temp_path, contents)
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(&path, e));
        }

        tracing::trace!("Wrote watermark document {} to {:?}", uri, path);
        Ok(())
    }

    async fn read_document(&self, uri: &str) -> Result<Option<String>, BackendError> {
        let path = self.path_for(uri)?;
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}
