//! Pipeline stages for PDF-to-audio conversion.
//!
//! Each submodule implements one step; [`crate::convert`] drives them in
//! order and owns the job state between them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ normalize ──▶ chunk ──▶ backend ──▶ segments ──▶ assemble
//! (path/URL) (pdfium+OCR) (cleanup)  (split)   (per chunk)  (temp dir)   (concat)
//! ```
//!
//! 1. [`input`]    — canonicalise the user-supplied path or URL to a local PDF
//! 2. [`extract`]  — text layer via [`pdf`], OCR fallback via [`ocr`]; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`normalize`] — flatten layout artefacts into plain prose
//! 4. [`chunk`]    — split into backend-sized pieces on sentence boundaries
//! 5. [`segments`] — persist each chunk's audio in the job directory
//! 6. [`assemble`] — join segments into the output file, then clean up

pub mod assemble;
pub mod chunk;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod ocr;
pub mod pdf;
pub mod segments;
