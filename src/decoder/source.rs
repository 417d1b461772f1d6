//! Decoder sources for local files and in-memory images.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::{DecoderSource, ImageRegionDecoder, RegionDecoder};
use crate::error::DecoderError;

/// Decode encoded bytes on the blocking pool.
async fn open_encoded(data: Bytes) -> Result<Arc<dyn RegionDecoder>, DecoderError> {
    let decoder = tokio::task::spawn_blocking(move || ImageRegionDecoder::from_encoded(&data))
        .await
        .map_err(|e| DecoderError::Open(format!("Decoder task failed: {}", e)))??;

    Ok(Arc::new(decoder))
}

// =============================================================================
// FileSource
// =============================================================================

/// Opens images from the local filesystem.
///
/// Source identifiers are paths, resolved against an optional root directory.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    root: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative identifiers against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, source_id: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(source_id),
            None => PathBuf::from(source_id),
        }
    }
}

#[async_trait]
impl DecoderSource for FileSource {
    async fn open(&self, source_id: &str) -> Result<Arc<dyn RegionDecoder>, DecoderError> {
        let path = self.resolve(source_id);
        debug!(path = %path.display(), "Opening image file");

        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| DecoderError::Open(format!("{}: {}", path.display(), e)))?;

        open_encoded(Bytes::from(data)).await
    }
}

// =============================================================================
// MemorySource
// =============================================================================

/// Serves encoded images registered under a name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    images: HashMap<String, Bytes>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register encoded image bytes under `source_id`.
    pub fn with_image(mut self, source_id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.images.insert(source_id.into(), data.into());
        self
    }
}

#[async_trait]
impl DecoderSource for MemorySource {
    async fn open(&self, source_id: &str) -> Result<Arc<dyn RegionDecoder>, DecoderError> {
        let data = self
            .images
            .get(source_id)
            .cloned()
            .ok_or_else(|| DecoderError::Open(format!("Unknown source: {}", source_id)))?;

        open_encoded(data).await
    }
}

// =============================================================================
// Tests
// =============================================================================
