//! Finished recordings and their revocable references
//!
//! An artifact is the concatenated recording of one session. The UI never
//! holds the bytes directly, only an [`ArtifactRef`] that stays valid until it
//! is revoked.

use crate::utils::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

const REF_PREFIX: &str = "blob:screen-recorder/";

/// Opaque, revocable reference to an artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    fn generate() -> Self {
        Self(format!("{}{}", REF_PREFIX, Uuid::new_v4()))
    }

    /// Parse a reference handed back by the frontend
    pub fn parse(value: &str) -> Option<Self> {
        let id = value.strip_prefix(REF_PREFIX)?;
        Uuid::parse_str(id).ok()?;
        Some(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ArtifactRef {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| AppError::InvalidArtifactRef(value.to_string()))
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A finished recording: bytes tagged with a MIME type
#[derive(Debug, Clone)]
pub struct Artifact {
    bytes: Arc<Vec<u8>>,
    mime_type: String,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::new(bytes),
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the recording into `dir` under `file_name`, creating `dir` if needed
    pub fn save_to(&self, dir: &Path, file_name: &str) -> std::io::Result<PathBuf> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }

        let path = dir.join(file_name);
        fs::write(&path, self.bytes.as_slice())?;

        tracing::info!("Saved {} bytes ({}) to {:?}", self.len(), self.mime_type, path);
        Ok(path)
    }
}

/// Holds artifacts until their reference is revoked
#[derive(Debug, Default)]
pub struct ArtifactStore {
    artifacts: HashMap<ArtifactRef, Artifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact and hand out a fresh reference to it
    pub fn insert(&mut self, artifact: Artifact) -> ArtifactRef {
        let reference = ArtifactRef::generate();
        tracing::debug!("Created artifact {} ({} bytes)", reference, artifact.len());
        self.artifacts.insert(reference.clone(), artifact);
        reference
    }

    pub fn get(&self, reference: &ArtifactRef) -> Option<Artifact> {
        self.artifacts.get(reference).cloned()
    }

    /// Release an artifact. Returns false if the reference was not live.
    pub fn revoke(&mut self, reference: &ArtifactRef) -> bool {
        let removed = self.artifacts.remove(reference).is_some();
        if removed {
            tracing::debug!("Revoked artifact {}", reference);
        }
        removed
    }

    /// Number of references that are still live
    pub fn live_count(&self) -> usize {
        self.artifacts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_insert_get_revoke() {
        let mut store = ArtifactStore::new();
        let reference = store.insert(Artifact::new(vec![1, 2, 3], "video/webm"));

        assert!(reference.as_str().starts_with("blob:screen-recorder/"));
        assert_eq!(store.live_count(), 1);

        let artifact = store.get(&reference).unwrap();
        assert_eq!(artifact.bytes(), &[1, 2, 3]);
        assert_eq!(artifact.mime_type(), "video/webm");

        assert!(store.revoke(&reference));
        assert!(!store.revoke(&reference));
        assert!(store.get(&reference).is_none());
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_references_are_unique() {
        let mut store = ArtifactStore::new();
        let a = store.insert(Artifact::new(vec![1], "video/webm"));
        let b = store.insert(Artifact::new(vec![1], "video/webm"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_reference() {
        let mut store = ArtifactStore::new();
        let reference = store.insert(Artifact::new(vec![], "video/webm"));

        assert_eq!(ArtifactRef::parse(reference.as_str()), Some(reference));
        assert_eq!(ArtifactRef::parse("blob:screen-recorder/not-a-uuid"), None);
        assert_eq!(ArtifactRef::parse("https://example.com/video.webm"), None);

        assert!(matches!(
            "blob:other/1".parse::<ArtifactRef>(),
            Err(AppError::InvalidArtifactRef(_))
        ));
    }

    #[test]
    fn test_save_to_disk() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("downloads");
        let artifact = Artifact::new(b"webm-bytes".to_vec(), "video/webm");

        let path = artifact.save_to(&target, "screenrecording.webm").unwrap();

        assert_eq!(path, target.join("screenrecording.webm"));
        assert_eq!(fs::read(&path).unwrap(), b"webm-bytes");
    }
}
