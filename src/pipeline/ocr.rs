//! Optical character recognition for pages without a text layer.
//!
//! OCR runs on the extraction thread (already off the async runtime), so
//! [`OcrEngine`] is a plain blocking trait. The bundled [`TesseractOcr`]
//! pipes a PNG-encoded page to `tesseract stdin stdout` and reads plain
//! text back.

use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Failure of one recognition call.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine binary could not be started.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// The page image could not be encoded for the engine.
    #[error("could not encode page image: {0}")]
    Encode(String),

    /// The engine ran but reported failure.
    #[error("OCR engine failed: {0}")]
    Engine(String),
}

/// Recognizes text in a rendered page image.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Return the recognized text, possibly empty.
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Tesseract command-line OCR.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
    language: String,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    /// Arguments for one invocation: image on stdin, text on stdout,
    /// fully automatic page segmentation.
    pub fn args(&self) -> Vec<String> {
        vec![
            "stdin".into(),
            "stdout".into(),
            "-l".into(),
            self.language.clone(),
            "--psm".into(),
            "3".into(),
        ]
    }
}

impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| OcrError::Encode(e.to_string()))?;

        let mut child = Command::new(&self.binary)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                OcrError::Unavailable(format!(
                    "could not run '{}': {e}. Install tesseract-ocr or set --tesseract-path.",
                    self.binary.display()
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .map_err(|e| OcrError::Engine(format!("writing image: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| OcrError::Engine(e.to_string()))?;
        if !output.status.success() {
            return Err(OcrError::Engine(format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract recognized {} chars", text.chars().count());
        Ok(text)
    }
}
