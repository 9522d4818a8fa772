//! Reading contract text from disk.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read the text of a contract.
///
/// `.pdf` files go through text extraction. An extraction failure is logged
/// and yields empty text, which the job runner turns into a failed job.
pub fn read_text(path: &Path) -> Result<String> {
    if is_pdf(path) {
        return read_pdf(path);
    }

    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

#[cfg(feature = "pdf")]
fn read_pdf(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    match pdf_extract::extract_text_from_mem(&bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "PDF text extraction failed");
            Ok(String::new())
        }
    }
}

#[cfg(not(feature = "pdf"))]
fn read_pdf(path: &Path) -> Result<String> {
    anyhow::bail!(
        "{} is a PDF; rebuild with `--features pdf` to audit PDF documents",
        path.display()
    )
}
