//! # Source Image Module
//!
//! Rappresentazione delle immagini sorgente inviate dal chiamante.
//!
//! ## Responsabilità:
//! - `SourceImage`: payload binario immutabile + nome dichiarato + MIME hint
//! - `SourceId`: identità esplicita di una sorgente (usata dalla cache)
//! - `TranscodeRequest`: richiesta per singolo item creata al momento dello scheduling
//!
//! I byte sono condivisi tramite `Arc`: il motore li referenzia, non li copia,
//! anche quando vengono passati ai task bloccanti del codec.

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Default maximum output dimension (pixels) for the larger side
pub const DEFAULT_MAX_DIMENSION: u32 = 3000;

/// Stable identity of a source: hash of declared name and content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(String);

impl SourceId {
    fn compute(name: &str, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize())[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An image submitted by the caller
#[derive(Clone)]
pub struct SourceImage {
    id: SourceId,
    name: String,
    mime_hint: Option<String>,
    bytes: Arc<[u8]>,
}

impl SourceImage {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let bytes = bytes.into();
        let id = SourceId::compute(&name, &bytes);
        Self {
            id,
            name,
            mime_hint: None,
            bytes,
        }
    }

    pub fn with_mime_hint(mut self, mime: impl Into<String>) -> Self {
        self.mime_hint = Some(mime.into());
        self
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_hint(&self) -> Option<&str> {
        self.mime_hint.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap handle on the shared payload
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceImage")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mime_hint", &self.mime_hint)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Per-item transcode request, consumed by the transcoder
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub source: SourceImage,
    pub quality: u8,
    pub max_dimension: u32,
}

impl TranscodeRequest {
    pub fn new(source: SourceImage, quality: u8) -> Self {
        Self {
            source,
            quality,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }
}
