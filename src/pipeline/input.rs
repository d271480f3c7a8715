//! Input resolution: normalise a user-supplied path or URL to a local PDF.
//!
//! pdfium opens documents from the file system, so URLs are downloaded into
//! a temporary directory owned by the returned [`ResolvedInput`] and removed
//! when it is dropped. Both paths check the `%PDF` signature up front so a
//! wrong file fails as an input error before any backend is started.

use crate::error::Pdf2AudioError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A local PDF ready to be opened.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the download lives in `_temp_dir` until drop.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to a local PDF path, downloading it if it is a URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2AudioError> {
    if input.trim().is_empty() {
        return Err(Pdf2AudioError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

fn check_magic(path: &Path, head: &[u8]) -> Result<(), Pdf2AudioError> {
    if head.len() >= 4 && &head[..4] == PDF_MAGIC {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    Err(Pdf2AudioError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

fn resolve_local(path: &Path) -> Result<ResolvedInput, Pdf2AudioError> {
    let path = path.to_path_buf();
    if !path.is_file() {
        return Err(Pdf2AudioError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2AudioError::PermissionDenied { path });
        }
        Err(_) => return Err(Pdf2AudioError::FileNotFound { path }),
    };

    let mut head = Vec::with_capacity(4);
    file.by_ref()
        .take(4)
        .read_to_end(&mut head)
        .map_err(|_| Pdf2AudioError::PermissionDenied { path: path.clone() })?;
    check_magic(&path, &head)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2AudioError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| Pdf2AudioError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let parsed = reqwest::Url::parse(url).map_err(|_| Pdf2AudioError::InvalidInput {
        input: url.to_string(),
    })?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(parsed.clone()).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2AudioError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2AudioError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    let temp_dir = tempfile::Builder::new()
        .prefix("pdf2audio-dl-")
        .tempdir()
        .map_err(|e| Pdf2AudioError::Internal(format!("temp dir: {e}")))?;
    let file_path = temp_dir.path().join(filename_from_url(&parsed));

    check_magic(&file_path, &bytes)?;
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| Pdf2AudioError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment when it looks like a file name, else `downloaded.pdf`.
fn filename_from_url(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|last| !last.is_empty() && last.contains('.'))
        .map(str::to_string)
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_filename_from_url() {
        let u = reqwest::Url::parse("https://example.com/papers/attention.pdf?x=1").unwrap();
        assert_eq!(filename_from_url(&u), "attention.pdf");
        let u = reqwest::Url::parse("https://example.com/download/").unwrap();
        assert_eq!(filename_from_url(&u), "downloaded.pdf");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = resolve_input("/no/such/file.pdf", 5).await.unwrap_err();
        assert!(matches!(err, Pdf2AudioError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let err = resolve_input("  ", 5).await.unwrap_err();
        assert!(matches!(err, Pdf2AudioError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_not_a_pdf() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04zip").unwrap();
        let err = resolve_input(f.path().to_str().unwrap(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[tokio::test]
    async fn test_short_file_is_not_a_pdf() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%P").unwrap();
        let err = resolve_input(f.path().to_str().unwrap(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn test_pdf_signature_accepted() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        let resolved = resolve_input(f.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.path(), f.path());
    }
}
