//! Per-job segment storage.
//!
//! Every job owns one [`SegmentStore`]: a `pdf2audio-*` temporary directory
//! holding one audio file per synthesized chunk. Segments are written to
//! `<name>.part` and renamed into place, so a file at a segment path is
//! always complete.
//!
//! The store removes its directory on [`SegmentStore::cleanup`] and, as a
//! last resort, when dropped.

use crate::backend::AudioFormat;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// The stored audio for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    /// Index of the chunk this audio belongs to.
    pub index: usize,
    pub path: PathBuf,
    pub bytes: u64,
}

/// A job's temporary directory and the segments written into it so far.
#[derive(Debug)]
pub struct SegmentStore {
    dir: Option<TempDir>,
    path: PathBuf,
    format: AudioFormat,
    segments: Vec<AudioSegment>,
}

impl SegmentStore {
    /// Create a fresh `pdf2audio-*` directory under `parent` (or the system
    /// temp dir).
    pub fn create(parent: Option<&Path>, format: AudioFormat) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pdf2audio-");
        let dir = match parent {
            Some(p) => {
                std::fs::create_dir_all(p)?;
                builder.tempdir_in(p)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        debug!("Job directory: {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
            format,
            segments: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Segments stored so far, in chunk order.
    pub fn segments(&self) -> &[AudioSegment] {
        &self.segments
    }

    /// Path a segment for chunk `index` is stored at.
    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.path
            .join(format!("chunk_{index:05}.{}", self.format.extension()))
    }

    /// A path for auxiliary files (e.g. an ffmpeg list) inside the job dir.
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Write `audio` as the segment for chunk `index`.
    ///
    /// Chunks must be persisted in order, each exactly once.
    pub async fn persist(&mut self, index: usize, audio: &[u8]) -> std::io::Result<AudioSegment> {
        if index != self.segments.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "segment {index} persisted out of order (expected {})",
                    self.segments.len()
                ),
            ));
        }

        let final_path = self.segment_path(index);
        let mut part = final_path.clone().into_os_string();
        part.push(".part");
        let part = PathBuf::from(part);

        tokio::fs::write(&part, audio).await?;
        if let Err(e) = tokio::fs::rename(&part, &final_path).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }

        let segment = AudioSegment {
            index,
            path: final_path,
            bytes: audio.len() as u64,
        };
        self.segments.push(segment.clone());
        Ok(segment)
    }

    /// Total size of all stored segments.
    pub fn total_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.bytes).sum()
    }

    /// Delete the job directory and everything in it.
    ///
    /// Errors are logged, never returned: cleanup runs on failure paths
    /// where the original error is the one worth reporting.
    pub fn cleanup(&mut self) {
        self.segments.clear();
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("Removed job directory {}", path.display()),
                Err(e) => warn!("Could not remove job directory {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for SegmentStore {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persist_writes_final_name_only() {
        let parent = tempfile::tempdir().unwrap();
        let mut store = SegmentStore::create(Some(parent.path()), AudioFormat::Mp3).unwrap();
        assert!(store
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("pdf2audio-"));

        let seg = store.persist(0, b"ID3abc").await.unwrap();
        assert_eq!(seg.path, store.segment_path(0));
        assert!(seg.path.ends_with("chunk_00000.mp3"));
        assert_eq!(std::fs::read(&seg.path).unwrap(), b"ID3abc");

        let names: Vec<_> = std::fs::read_dir(store.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(store.total_bytes(), 6);
    }

    #[tokio::test]
    async fn out_of_order_persist_rejected() {
        let mut store = SegmentStore::create(None, AudioFormat::Wav).unwrap();
        let err = store.persist(1, b"x").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn cleanup_removes_directory() {
        let parent = tempfile::tempdir().unwrap();
        let mut store = SegmentStore::create(Some(parent.path()), AudioFormat::Mp3).unwrap();
        store.persist(0, b"a").await.unwrap();
        let dir = store.path().to_path_buf();
        store.cleanup();
        assert!(!dir.exists());
        assert!(store.segments().is_empty());
        store.cleanup();
    }

    #[test]
    fn drop_removes_directory() {
        let store = SegmentStore::create(None, AudioFormat::Mp3).unwrap();
        let dir = store.path().to_path_buf();
        drop(store);
        assert!(!dir.exists());
    }
}
