// Artifact stores - local directory and in-memory
use crate::application::data_source::ArtifactStore;
use crate::domain::error::{AnalyticsError, AnalyticsResult};
use crate::domain::report::{Artifact, ArtifactRef, ReportFormat};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Stores each artifact as a file named after it. The reference is the
/// file name.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::info!("Storing report artifacts in {}", root.display());
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> AnalyticsResult<PathBuf> {
        let plain = Path::new(name)
            .file_name()
            .is_some_and(|file_name| file_name == name);
        if name.is_empty() || !plain {
            return Err(AnalyticsError::ArtifactStoreError(format!(
                "invalid artifact name '{}'",
                name
            )));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn store(&self, artifact: Artifact) -> AnalyticsResult<ArtifactRef> {
        let path = self.path_for(&artifact.file_name)?;
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|e| AnalyticsError::ArtifactStoreError(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Stored artifact {} ({} bytes)", path.display(), artifact.bytes.len());
        Ok(ArtifactRef(artifact.file_name))
    }

    async fn fetch(&self, reference: &ArtifactRef) -> AnalyticsResult<Artifact> {
        let path = self.path_for(&reference.0)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AnalyticsError::NotFound(format!("artifact {}", reference.0)),
            _ => AnalyticsError::ArtifactStoreError(format!("{}: {}", path.display(), e)),
        })?;

        let content_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ReportFormat::from_extension)
            .map(|format| format.content_type())
            .unwrap_or("application/octet-stream");
        Ok(Artifact {
            file_name: reference.0.clone(),
            content_type: content_type.to_string(),
            bytes: Bytes::from(bytes),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStore {
    artifacts: Arc<RwLock<HashMap<String, Artifact>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn store(&self, artifact: Artifact) -> AnalyticsResult<ArtifactRef> {
        let reference = ArtifactRef(artifact.file_name.clone());
        self.artifacts
            .write()
            .await
            .insert(artifact.file_name.clone(), artifact);
        Ok(reference)
    }

    async fn fetch(&self, reference: &ArtifactRef) -> AnalyticsResult<Artifact> {
        self.artifacts
            .read()
            .await
            .get(&reference.0)
            .cloned()
            .ok_or_else(|| AnalyticsError::NotFound(format!("artifact {}", reference.0)))
    }
}
