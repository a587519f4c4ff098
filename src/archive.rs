//! # Archive Packager Module
//!
//! Raccoglie gli output convertiti con successo in un unico archivio ZIP in memoria.
//!
//! ## Regole:
//! - Solo i risultati `success: true` entrano nell'archivio, ognuno una sola volta
//! - Le entry sono STORED (nessuna compressione aggiuntiva)
//! - Collisioni di nome gestite da `CollisionPolicy`:
//!   - `Suffix` (default): `foto.webp`, `foto_2.webp`, `foto_3.webp`, ...
//!   - `FirstWins`: vince il primo, i byte dei successivi vengono scartati
//!
//! ## Esempio:
//! ```rust,ignore
//! let packed = ArchivePackager::new(CollisionPolicy::Suffix).pack(&results)?;
//! std::fs::write("out.zip", packed.bytes())?;
//! ```

use crate::error::ConvertError;
use crate::transcoder::TranscodeResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Cursor, Seek, Write};
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// How to handle two successes mapping to the same entry name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Keep the first entry, drop later bytes
    FirstWins,
    /// Rename later entries with a numeric suffix
    #[default]
    Suffix,
}

/// One stored entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    /// Index of the originating result
    pub result_index: usize,
    pub size: u64,
}

/// Serialized archive plus its table of contents.
///
/// `W` is the sink the ZIP was written into; the in-memory form is `Vec<u8>`.
#[derive(Debug, Clone)]
pub struct Archive<W = Vec<u8>> {
    sink: W,
    entries: Vec<ArchiveEntry>,
    dropped: Vec<usize>,
}

impl<W> Archive<W> {
    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    /// Swap the sink, keeping the table of contents
    pub fn map_sink<V>(self, f: impl FnOnce(W) -> V) -> Archive<V> {
        Archive {
            sink: f(self.sink),
            entries: self.entries,
            dropped: self.dropped,
        }
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Result indices whose bytes were dropped on a name collision
    pub fn dropped(&self) -> &[usize] {
        &self.dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Archive<Vec<u8>> {
    pub fn bytes(&self) -> &[u8] {
        &self.sink
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.sink
    }
}

/// Builds the archive from transcode results
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchivePackager {
    policy: CollisionPolicy,
}

impl ArchivePackager {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self { policy }
    }

    /// Serialize every successful result into an in-memory ZIP
    pub fn pack(&self, results: &[TranscodeResult]) -> Result<Archive, ConvertError> {
        Ok(self
            .pack_into(Cursor::new(Vec::new()), results)?
            .map_sink(Cursor::into_inner))
    }

    /// Assign entry names and serialize every successful result into `sink`
    pub fn pack_into<W: Write + Seek>(&self, sink: W, results: &[TranscodeResult]) -> Result<Archive<W>, ConvertError> {
        let mut writer = ZipWriter::new(sink);
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(false);

        let mut taken: HashSet<String> = HashSet::new();
        let mut entries = Vec::new();
        let mut dropped = Vec::new();

        for (index, result) in results.iter().enumerate().filter(|(_, r)| r.success) {
            let name = match self.assign_name(&result.output_name, &taken) {
                Some(name) => name,
                None => {
                    warn!(
                        "Duplicate output name {} (item {}), keeping the first entry",
                        result.output_name, index
                    );
                    dropped.push(index);
                    continue;
                }
            };

            if name != result.output_name {
                warn!("Duplicate output name {} renamed to {}", result.output_name, name);
            }

            writer.start_file(name.as_str(), options)?;
            writer.write_all(&result.output_bytes).map_err(ZipError::Io)?;
            debug!("Added {} ({} bytes) to archive", name, result.output_bytes.len());

            taken.insert(name.clone());
            entries.push(ArchiveEntry {
                name,
                result_index: index,
                size: result.output_bytes.len() as u64,
            });
        }

        let sink = writer.finish()?;
        debug!("Archive serialized: {} entries", entries.len());

        Ok(Archive {
            sink,
            entries,
            dropped,
        })
    }

    fn assign_name(&self, wanted: &str, taken: &HashSet<String>) -> Option<String> {
        if !taken.contains(wanted) {
            return Some(wanted.to_string());
        }
        match self.policy {
            CollisionPolicy::FirstWins => None,
            CollisionPolicy::Suffix => {
                let (stem, ext) = match wanted.rsplit_once('.') {
                    Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
                    _ => (wanted, None),
                };
                (2..)
                    .map(|n| match ext {
                        Some(ext) => format!("{}_{}.{}", stem, n, ext),
                        None => format!("{}_{}", stem, n),
                    })
                    .find(|candidate| !taken.contains(candidate))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn result(name: &str, bytes: &[u8], success: bool) -> TranscodeResult {
        TranscodeResult {
            output_name: name.to_string(),
            output_bytes: if success { bytes.to_vec() } else { Vec::new() },
            success,
            original_size: 100,
            compressed_size: if success { bytes.len() as u64 } else { 0 },
            error_message: if success { None } else { Some("Decode error: bad".to_string()) },
            quality_used: None,
            retried: false,
            dimensions: None,
        }
    }

    fn read_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>, CompressionMethod)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut content = Vec::new();
                file.read_to_end(&mut content).unwrap();
                (file.name().to_string(), content, file.compression())
            })
            .collect()
    }

    #[test]
    fn test_pack_only_successes() {
        let results = vec![
            result("a.webp", b"AAAA", true),
            result("b.webp", b"", false),
            result("c.webp", b"CC", true),
        ];

        let archive = ArchivePackager::default().pack(&results).unwrap();
        let entries = read_entries(archive.bytes());

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.entry_names(), vec!["a.webp", "c.webp"]);
        assert_eq!(entries[0].0, "a.webp");
        assert_eq!(entries[0].1, b"AAAA");
        assert_eq!(entries[1].1, b"CC");
        assert!(entries.iter().all(|(_, _, method)| *method == CompressionMethod::Stored));
        assert_eq!(archive.entries()[1].result_index, 2);
    }

    #[test]
    fn test_suffix_policy_disambiguates() {
        let results = vec![
            result("photo.webp", b"1", true),
            result("photo.webp", b"2", true),
            result("photo_2.webp", b"3", true),
            result("photo.webp", b"4", true),
        ];

        let archive = ArchivePackager::new(CollisionPolicy::Suffix).pack(&results).unwrap();

        assert_eq!(
            archive.entry_names(),
            vec!["photo.webp", "photo_2.webp", "photo_2_2.webp", "photo_3.webp"]
        );
        assert!(archive.dropped().is_empty());
        assert_eq!(read_entries(archive.bytes()).len(), 4);
    }

    #[test]
    fn test_first_wins_policy_drops_later_bytes() {
        let results = vec![result("dup.webp", b"first", true), result("dup.webp", b"second", true)];

        let archive = ArchivePackager::new(CollisionPolicy::FirstWins).pack(&results).unwrap();
        let entries = read_entries(archive.bytes());

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, b"first");
        assert_eq!(archive.dropped(), &[1]);
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let archive = ArchivePackager::default().pack(&[]).unwrap();
        assert!(archive.is_empty());
        assert!(read_entries(archive.bytes()).is_empty());
    }

    /// Sink that rejects every write
    #[derive(Debug)]
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for BrokenSink {
        fn seek(&mut self, _pos: std::io::SeekFrom) -> std::io::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_sink_failure_is_archive_error() {
        let results = vec![result("a.webp", b"AAAA", true)];

        let err = ArchivePackager::default().pack_into(BrokenSink, &results).unwrap_err();
        assert!(matches!(err, ConvertError::Archive(_)));
    }

    #[test]
    fn test_pack_into_custom_sink() {
        let results = vec![result("a.webp", b"AAAA", true), result("b.webp", b"BB", true)];

        let archive = ArchivePackager::default()
            .pack_into(Cursor::new(Vec::new()), &results)
            .unwrap();
        assert_eq!(archive.len(), 2);

        let bytes = archive.into_sink().into_inner();
        assert_eq!(read_entries(&bytes).len(), 2);

        let owned = ArchivePackager::default().pack(&results).unwrap().into_bytes();
        assert_eq!(read_entries(&owned).len(), 2);
    }
}
