//! Audio assembly: join the job's segments into the output file.
//!
//! Segments are joined without re-encoding. MP3 is a sequence of
//! self-delimiting frames, so concatenating the bytes yields a valid
//! stream. Containers with a header (WAV) are joined with ffmpeg's concat
//! demuxer and `-c copy`, which rewrites the header once for the whole file.
//!
//! The output is built at a hidden sibling path (`.<name>.part`) and renamed
//! onto the destination only after it has been verified, so the destination
//! either holds the complete result or is left untouched.

use super::segments::SegmentStore;
use crate::backend::AudioFormat;
use crate::config::ConversionConfig;
use crate::error::Pdf2AudioError;
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How segments are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcatStrategy {
    /// Raw byte concatenation. Only valid for frame streams such as MP3.
    Bytes,
    /// ffmpeg concat demuxer with stream copy.
    Ffmpeg,
}

impl ConcatStrategy {
    /// `Bytes` for MP3, `Ffmpeg` for everything else.
    pub fn default_for(format: AudioFormat) -> Self {
        match format {
            AudioFormat::Mp3 => ConcatStrategy::Bytes,
            AudioFormat::Wav => ConcatStrategy::Ffmpeg,
        }
    }
}

/// Joins the segments of one [`SegmentStore`].
#[derive(Debug, Clone)]
pub struct AudioAssembler {
    strategy: ConcatStrategy,
    ffmpeg: PathBuf,
}

impl AudioAssembler {
    pub fn new(strategy: ConcatStrategy, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            strategy,
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Assembler for `format` honouring the config's strategy override.
    pub fn from_config(config: &ConversionConfig, format: AudioFormat) -> Self {
        Self::new(
            config
                .concat
                .unwrap_or_else(|| ConcatStrategy::default_for(format)),
            config.ffmpeg_path.clone(),
        )
    }

    pub fn strategy(&self) -> ConcatStrategy {
        self.strategy
    }

    /// Join every segment in `store` into `output` and return its size.
    ///
    /// The store is cleaned up whether or not assembly succeeds.
    pub async fn assemble(
        &self,
        store: &mut SegmentStore,
        output: &Path,
    ) -> Result<u64, Pdf2AudioError> {
        let result = self.assemble_inner(store, output).await;
        store.cleanup();
        result
    }

    async fn assemble_inner(
        &self,
        store: &SegmentStore,
        output: &Path,
    ) -> Result<u64, Pdf2AudioError> {
        let segments = store.segments();
        if segments.is_empty() {
            return Err(Pdf2AudioError::AssemblyFailed {
                path: output.to_path_buf(),
                detail: "no audio segments to assemble".into(),
            });
        }
        for seg in segments {
            match tokio::fs::metadata(&seg.path).await {
                Ok(meta) if meta.is_file() => {}
                _ => {
                    return Err(Pdf2AudioError::SegmentMissing {
                        chunk: seg.index,
                        path: seg.path.clone(),
                    })
                }
            }
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Pdf2AudioError::OutputWriteFailed {
                    path: output.to_path_buf(),
                    source: e,
                })?;
        }

        let pending = PendingOutput::new(output);
        match self.strategy {
            ConcatStrategy::Bytes => concat_bytes(store, &pending.path, output).await?,
            ConcatStrategy::Ffmpeg => self.concat_ffmpeg(store, &pending.path, output).await?,
        }

        let written = match tokio::fs::metadata(&pending.path).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => {
                return Err(Pdf2AudioError::AssemblyFailed {
                    path: output.to_path_buf(),
                    detail: "assembled file is missing or empty".into(),
                })
            }
        };

        pending.commit(output).await?;
        info!(
            "Assembled {} segments → {} ({} bytes)",
            segments.len(),
            output.display(),
            written
        );
        Ok(written)
    }

    async fn concat_ffmpeg(
        &self,
        store: &SegmentStore,
        target: &Path,
        output: &Path,
    ) -> Result<(), Pdf2AudioError> {
        let list_path = store.scratch_path("concat.txt");
        let list = concat_list(store.segments().iter().map(|s| s.path.as_path()));
        tokio::fs::write(&list_path, list)
            .await
            .map_err(|e| Pdf2AudioError::AssemblyFailed {
                path: output.to_path_buf(),
                detail: format!("writing concat list: {e}"),
            })?;

        let result = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy", "-f", store.format().ffmpeg_muxer()])
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let out = result.map_err(|e| Pdf2AudioError::AssemblyFailed {
            path: output.to_path_buf(),
            detail: format!("could not run '{}': {e}", self.ffmpeg.display()),
        })?;
        if !out.status.success() {
            return Err(Pdf2AudioError::AssemblyFailed {
                path: output.to_path_buf(),
                detail: format!(
                    "ffmpeg {}: {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            });
        }
        debug!("ffmpeg concatenated {} segments", store.segments().len());
        Ok(())
    }
}

async fn concat_bytes(
    store: &SegmentStore,
    target: &Path,
    output: &Path,
) -> Result<(), Pdf2AudioError> {
    let write_err = |e: std::io::Error| Pdf2AudioError::OutputWriteFailed {
        path: output.to_path_buf(),
        source: e,
    };

    let mut out = tokio::fs::File::create(target).await.map_err(write_err)?;
    for seg in store.segments() {
        let mut input = tokio::fs::File::open(&seg.path).await.map_err(|_| {
            Pdf2AudioError::SegmentMissing {
                chunk: seg.index,
                path: seg.path.clone(),
            }
        })?;
        tokio::io::copy(&mut input, &mut out)
            .await
            .map_err(write_err)?;
    }
    out.flush().await.map_err(write_err)?;
    out.sync_all().await.map_err(write_err)?;
    Ok(())
}

/// Build an ffmpeg concat-demuxer list for `paths`.
pub fn concat_list<'a>(paths: impl IntoIterator<Item = &'a Path>) -> String {
    let mut list = String::new();
    for path in paths {
        let escaped = path.to_string_lossy().replace('\'', "'\\''");
        list.push_str(&format!("file '{escaped}'\n"));
    }
    list
}

/// Hidden sibling of the destination, removed on drop unless committed.
struct PendingOutput {
    path: PathBuf,
    committed: bool,
}

impl PendingOutput {
    fn new(output: &Path) -> Self {
        let mut name = OsString::from(".");
        name.push(output.file_name().unwrap_or(OsStr::new("output")));
        name.push(".part");
        Self {
            path: output.with_file_name(name),
            committed: false,
        }
    }

    async fn commit(mut self, output: &Path) -> Result<(), Pdf2AudioError> {
        tokio::fs::rename(&self.path, output)
            .await
            .map_err(|e| Pdf2AudioError::OutputWriteFailed {
                path: output.to_path_buf(),
                source: e,
            })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PendingOutput {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove {}: {}", self.path.display(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(parent: &Path, blobs: &[&[u8]]) -> SegmentStore {
        let mut store = SegmentStore::create(Some(parent), AudioFormat::Mp3).unwrap();
        for (i, blob) in blobs.iter().enumerate() {
            store.persist(i, blob).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn bytes_strategy_concatenates_in_order() {
        let work = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("nested/book.mp3");
        let mut store = store_with(work.path(), &[b"first-", b"second"]).await;

        let assembler = AudioAssembler::new(ConcatStrategy::Bytes, "ffmpeg");
        let written = assembler.assemble(&mut store, &output).await.unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"first-second");
        assert_eq!(written, 12);
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(output.parent().unwrap()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn missing_segment_leaves_no_output() {
        let work = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("book.mp3");
        let mut store = store_with(work.path(), &[b"a", b"b"]).await;
        std::fs::remove_file(store.segment_path(1)).unwrap();

        let err = AudioAssembler::new(ConcatStrategy::Bytes, "ffmpeg")
            .assemble(&mut store, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::SegmentMissing { chunk: 1, .. }));
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_store_is_an_error() {
        let work = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("book.mp3");
        let mut store = store_with(work.path(), &[]).await;
        let err = AudioAssembler::new(ConcatStrategy::Bytes, "ffmpeg")
            .assemble(&mut store, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::AssemblyFailed { .. }));
    }

    #[tokio::test]
    async fn failed_ffmpeg_cleans_up() {
        let work = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("book.wav");
        let mut store = store_with(work.path(), &[b"RIFF"]).await;

        let err = AudioAssembler::new(ConcatStrategy::Ffmpeg, "/definitely/not/ffmpeg")
            .assemble(&mut store, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::AssemblyFailed { .. }));
        assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[test]
    fn concat_list_escapes_quotes() {
        let list = concat_list([Path::new("/tmp/a.wav"), Path::new("/tmp/it's.wav")]);
        assert_eq!(list, "file '/tmp/a.wav'\nfile '/tmp/it'\\''s.wav'\n");
    }

    #[test]
    fn default_strategy_per_format() {
        assert_eq!(ConcatStrategy::default_for(AudioFormat::Mp3), ConcatStrategy::Bytes);
        assert_eq!(ConcatStrategy::default_for(AudioFormat::Wav), ConcatStrategy::Ffmpeg);
    }
}
