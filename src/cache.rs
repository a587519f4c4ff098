//! # Conversion Cache Module
//!
//! Memoization esplicita delle conversioni, posseduta dal chiamante.
//!
//! ## Responsabilità:
//! - Evita di riconvertire la stessa sorgente alla stessa qualità (es. anteprima
//!   rigenerata e poi scaricata)
//! - Chiave `(SourceId, qualità)`: identità esplicita, non confronto di riferimenti
//! - Invalidazione esplicita quando la qualità cambia (`set_quality`)
//!
//! ## Esempio:
//! ```rust,ignore
//! let mut cache = ConversionCache::new(75);
//! let preview = converter.transcode_one_cached(&mut cache, &source).await?;
//! cache.set_quality(60); // scarta le entry calcolate a 75
//! ```

use crate::source::SourceId;
use crate::transcoder::TranscodeResult;
use std::collections::HashMap;
use tracing::debug;

/// Caller-owned memo of transcode results
#[derive(Debug, Clone)]
pub struct ConversionCache {
    quality: u8,
    entries: HashMap<(SourceId, u8), TranscodeResult>,
}

impl ConversionCache {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            entries: HashMap::new(),
        }
    }

    /// Current quality the cache is tracking
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Change quality, dropping every entry computed at another one.
    /// Returns the number of evicted entries.
    pub fn set_quality(&mut self, quality: u8) -> usize {
        if quality == self.quality {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|(_, q), _| *q == quality);
        self.quality = quality;
        let evicted = before - self.entries.len();
        debug!("Cache quality changed to {}, evicted {} entries", quality, evicted);
        evicted
    }

    pub fn get(&self, id: &SourceId, quality: u8) -> Option<&TranscodeResult> {
        self.entries.get(&(id.clone(), quality))
    }

    /// Only successful results are memoized
    pub fn insert(&mut self, id: SourceId, quality: u8, result: TranscodeResult) {
        if result.success {
            self.entries.insert((id, quality), result);
        }
    }

    pub fn invalidate(&mut self, id: &SourceId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(source, _), _| source != id);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
