//! OCR adapter: scan detection, PDF rasterization, and tesseract invocation.
//!
//! The adapter never throws past its boundary: total OCR failure yields an
//! empty string and a warning, and the document proceeds with whatever text
//! it already has.
//!
//! Multi-page PDFs are rasterized with `pdftoppm` (one PNG per page) and each
//! page image is OCR'd independently, in page order, with a form-feed
//! page-break marker between pages. Page order comes from the page number
//! parsed out of the generated filenames, not raw lexicographic order —
//! unpadded numbering would otherwise sort page 10 before page 2.
//!
//! The recognition language set is pipeline-wide configuration, passed to
//! tesseract as `-l eng+fra`; it is never auto-detected per document.

use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::config::PipelineConfig;

/// Marker inserted between OCR'd pages of a multi-page document.
pub const PAGE_BREAK: char = '\u{0C}';

/// Scan gate: extracted text shorter than `min_chars` is not trustworthy and
/// the source is treated as a scanned image. Deliberately crude — legitimate
/// very-short documents get OCR'd unnecessarily, which is a safe default.
pub fn needs_ocr(extracted_text: &str, min_chars: usize) -> bool {
    extracted_text.chars().count() < min_chars
}

/// OCRs a single image file. Empty string on failure.
pub async fn ocr_image(config: &PipelineConfig, image_path: &Path) -> String {
    match run_tesseract(config, image_path).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(path = %image_path.display(), error = %e, "image OCR failed");
            String::new()
        }
    }
}

/// Rasterizes a PDF and OCRs every page, concatenating page texts in page
/// order with [`PAGE_BREAK`] between them. Empty string on total failure.
pub async fn ocr_pdf(config: &PipelineConfig, pdf_path: &Path, scratch: &Path) -> String {
    let pages = match rasterize_pdf(config, pdf_path, scratch).await {
        Ok(pages) => pages,
        Err(e) => {
            tracing::warn!(path = %pdf_path.display(), error = %e, "PDF rasterization failed");
            return String::new();
        }
    };

    let mut page_texts: Vec<String> = Vec::with_capacity(pages.len());
    for (page_num, image_path) in pages {
        match run_tesseract(config, &image_path).await {
            Ok(text) => page_texts.push(text),
            Err(e) => {
                tracing::warn!(page = page_num, error = %e, "page OCR failed");
                page_texts.push(String::new());
            }
        }
    }

    join_pages(&page_texts)
}

/// Concatenates per-page OCR output: N pages yield N-1 [`PAGE_BREAK`]
/// markers, including empty pages (which keep their slot so page counts
/// survive).
fn join_pages(page_texts: &[String]) -> String {
    page_texts.join(&PAGE_BREAK.to_string())
}

/// Converts every PDF page to a PNG under `scratch` and returns the images
/// sorted by page number.
async fn rasterize_pdf(
    config: &PipelineConfig,
    pdf_path: &Path,
    scratch: &Path,
) -> anyhow::Result<Vec<(usize, PathBuf)>> {
    let prefix = scratch.join("page");
    let status = Command::new(&config.pdftoppm_path)
        .arg("-png")
        .arg("-r")
        .arg(config.raster_dpi.to_string())
        .arg(pdf_path)
        .arg(&prefix)
        .status()
        .await
        .map_err(|e| anyhow::anyhow!("failed to run pdftoppm: {}", e))?;

    if !status.success() {
        anyhow::bail!("pdftoppm exited with {}", status.code().unwrap_or(-1));
    }

    let mut pages = Vec::new();
    let mut read_dir = tokio::fs::read_dir(scratch).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        if let Some(num) = parse_page_number(&path) {
            pages.push((num, path));
        }
    }

    if pages.is_empty() {
        anyhow::bail!("pdftoppm produced no page images");
    }

    pages.sort_by_key(|(num, _)| *num);
    Ok(pages)
}

/// Parses the page number out of a rasterizer-generated filename
/// (`page-1.png`, `page-07.png`, `page-12.png`).
pub fn parse_page_number(path: &Path) -> Option<usize> {
    let stem = path.file_stem()?.to_str()?;
    let idx = stem.rfind('-')?;
    stem[idx + 1..].parse::<usize>().ok()
}

async fn run_tesseract(config: &PipelineConfig, image_path: &Path) -> anyhow::Result<String> {
    let languages = config.ocr_languages.join("+");
    let output = Command::new(&config.tesseract_path)
        .arg(image_path)
        .arg("stdout")
        .arg("-l")
        .arg(&languages)
        .output()
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "failed to run tesseract (path='{}'): {}",
                config.tesseract_path,
                e
            )
        })?;

    if !output.status.success() {
        anyhow::bail!(
            "tesseract exited with {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    // Tesseract terminates its output with a form feed; strip it so page
    // joins are the only source of PAGE_BREAK markers.
    Ok(String::from_utf8_lossy(&output.stdout)
        .trim_end_matches(PAGE_BREAK)
        .trim()
        .to_string())
}

/// Checks whether the configured tesseract binary responds.
pub async fn is_available(config: &PipelineConfig) -> bool {
    Command::new(&config.tesseract_path)
        .arg("--version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_gate_boundary() {
        let text_100: String = "a".repeat(100);
        let text_99: String = "a".repeat(99);
        assert!(!needs_ocr(&text_100, 100));
        assert!(needs_ocr(&text_99, 100));
        assert!(needs_ocr("", 100));
    }

    #[test]
    fn scan_gate_counts_chars_not_bytes() {
        // 100 two-byte characters must pass the gate
        let text: String = "é".repeat(100);
        assert!(!needs_ocr(&text, 100));
    }

    #[test]
    fn page_numbers_parse_from_generated_names() {
        assert_eq!(parse_page_number(Path::new("/t/page-1.png")), Some(1));
        assert_eq!(parse_page_number(Path::new("/t/page-07.png")), Some(7));
        assert_eq!(parse_page_number(Path::new("/t/page-12.png")), Some(12));
        assert_eq!(parse_page_number(Path::new("/t/noise.png")), None);
    }

    #[test]
    fn page_order_is_numeric_beyond_ten_pages() {
        // Unpadded names would sort page-10 before page-2 lexicographically.
        let mut pages: Vec<(usize, PathBuf)> = (1..=12)
            .map(|n| (n, PathBuf::from(format!("/t/page-{}.png", n))))
            .collect();
        pages.reverse();
        pages.sort_by_key(|(num, _)| *num);
        let order: Vec<usize> = pages.iter().map(|(n, _)| *n).collect();
        assert_eq!(order, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn three_pages_join_with_two_markers() {
        let pages = vec![
            "page one text".to_string(),
            "page two text".to_string(),
            "page three text".to_string(),
        ];
        let joined = join_pages(&pages);
        assert_eq!(joined.matches(PAGE_BREAK).count(), 2);
        assert!(joined.starts_with("page one"));
        assert!(joined.ends_with("three text"));
    }

    #[test]
    fn empty_pages_keep_their_slot() {
        let pages = vec!["a".to_string(), String::new(), "c".to_string()];
        assert_eq!(join_pages(&pages), format!("a{}{}c", PAGE_BREAK, PAGE_BREAK));
    }

    #[tokio::test]
    async fn missing_tesseract_yields_empty_text() {
        let config = PipelineConfig {
            tesseract_path: "/nonexistent/tesseract".to_string(),
            ..PipelineConfig::default()
        };
        let text = ocr_image(&config, Path::new("/tmp/whatever.png")).await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn missing_pdftoppm_yields_empty_text() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            pdftoppm_path: "/nonexistent/pdftoppm".to_string(),
            ..PipelineConfig::default()
        };
        let text = ocr_pdf(&config, Path::new("/tmp/whatever.pdf"), tmp.path()).await;
        assert_eq!(text, "");
    }
}
