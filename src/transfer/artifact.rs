//! Reassembled transfer output

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::error::{Result, TransferError};
use super::types::{SizeMismatch, TransferMetadata};

/// Fallback file name when the sender's name sanitizes to nothing
const DEFAULT_FILE_NAME: &str = "download";

/// The immutable file produced on `end`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Name declared by the sender
    pub name: String,

    /// MIME type declared by the sender
    pub mime_type: String,

    #[serde(skip)]
    pub data: Bytes,

    /// Hex SHA-256 of `data`
    pub sha256: String,

    /// Set when the received size differs from the declared size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mismatch: Option<SizeMismatch>,
}

impl Artifact {
    /// Build the artifact from the concatenated slices
    pub fn new(metadata: &TransferMetadata, data: Bytes) -> Self {
        let received = data.len() as u64;
        let size_mismatch = (received != metadata.size).then_some(SizeMismatch {
            declared: metadata.size,
            received,
        });

        Self {
            name: metadata.name.clone(),
            mime_type: metadata.mime_type.clone(),
            sha256: compute_hash(&data),
            data,
            size_mismatch,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fail if the received size differs from the declared size
    pub fn verify_size(&self) -> Result<()> {
        match self.size_mismatch {
            Some(mismatch) => Err(mismatch.into()),
            None => Ok(()),
        }
    }

    /// File name safe to create inside a download directory
    pub fn file_name(&self) -> String {
        sanitize_file_name(&self.name)
    }

    /// Write the artifact into `dir`, returning the written path
    pub async fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| TransferError::Io(e.to_string()))?;

        let path = dir.join(self.file_name());
        tokio::fs::write(&path, &self.data)
            .await
            .map_err(|e| TransferError::Io(e.to_string()))?;

        tracing::info!(
            path = %path.display(),
            bytes = self.data.len(),
            sha256 = %self.sha256,
            "Saved artifact"
        );

        Ok(path)
    }
}

/// Partial artifact built from the bytes received so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewArtifact {
    pub mime_type: String,
    pub data: Bytes,
    /// Increments each time the preview is rebuilt within one attempt
    pub generation: u64,
}

/// Compute SHA-256 hash of data
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Strip directory components and control/reserved characters
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| match c {
            c if c.is_control() => '_',
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        DEFAULT_FILE_NAME.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\a?.txt"), "a_.txt");
        assert_eq!(sanitize_file_name(".."), DEFAULT_FILE_NAME);
        assert_eq!(sanitize_file_name(""), DEFAULT_FILE_NAME);
        assert_eq!(sanitize_file_name(".bashrc"), "bashrc");
    }

    #[test]
    fn test_hash_and_size() {
        let meta = TransferMetadata::new("a.txt", "text/plain", 5);
        let artifact = Artifact::new(&meta, Bytes::from_static(b"hello"));

        assert_eq!(
            artifact.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(artifact.verify_size().is_ok());

        let short = Artifact::new(&meta, Bytes::from_static(b"hel"));
        assert_eq!(
            short.verify_size(),
            Err(TransferError::SizeMismatch { declared: 5, received: 3 })
        );
    }

    #[tokio::test]
    async fn test_save_to() {
        let dir = TempDir::new().unwrap();
        let meta = TransferMetadata::new("nested/../notes.txt", "text/plain", 5);
        let artifact = Artifact::new(&meta, Bytes::from_static(b"hello"));

        let path = artifact.save_to(dir.path().join("downloads")).await.unwrap();

        assert_eq!(path.file_name().unwrap(), "notes.txt");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");
    }
}
