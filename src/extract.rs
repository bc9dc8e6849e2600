//! Per-format direct text extraction.
//!
//! Extraction is best-effort by contract: any failure here (corrupt file,
//! unsupported sub-format, missing helper binary) is reported as an error to
//! the orchestrator, which logs it and continues with empty text — a bad
//! document must never block the processing queue.
//!
//! PDFs get a two-phase treatment: a cheap first-page sniff decides whether
//! the document has a usable text layer at all before the expensive
//! whole-document extraction runs. Obviously-scanned PDFs route straight to
//! OCR without a full pass.

use std::io::Read;
use std::path::Path;

/// Extraction failure. Recovered (never propagated past the orchestrator).
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Word(String),
    Io(String),
    Backend(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Word(e) => write!(f, "Word extraction failed: {}", e),
            ExtractError::Io(e) => write!(f, "I/O error during extraction: {}", e),
            ExtractError::Backend(e) => write!(f, "extraction backend failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

// ============ PDF: sniff + full ============

/// Outcome of the PDF sniff phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfRoute {
    /// Sniff found a real text layer; run the full direct extraction.
    DirectText,
    /// Sniff yield below threshold; treat as scanned, go to OCR.
    NeedsOcr,
}

/// Routes a PDF from its sniffed text. Yield strictly above `threshold`
/// characters means the text layer is trustworthy.
pub fn route_pdf(sniff_text: &str, threshold: usize) -> PdfRoute {
    if sniff_text.trim().chars().count() > threshold {
        PdfRoute::DirectText
    } else {
        PdfRoute::NeedsOcr
    }
}

/// Sniff-then-extract: runs `full` only when the sniff routed to direct
/// extraction. Returns `None` on the OCR route so the caller can tell
/// "no text layer" apart from "empty extraction".
pub fn resolve_pdf_text<F>(
    sniff_text: &str,
    threshold: usize,
    full: F,
) -> Option<Result<String, ExtractError>>
where
    F: FnOnce() -> Result<String, ExtractError>,
{
    match route_pdf(sniff_text, threshold) {
        PdfRoute::DirectText => Some(full()),
        PdfRoute::NeedsOcr => None,
    }
}

/// Cheap sniff: extract only the first page via `pdftotext -l 1` and cap the
/// yield at `sniff_chars` characters. Errors collapse to an empty sniff,
/// which routes the document to OCR.
pub async fn sniff_pdf(pdftotext_path: &str, path: &Path, sniff_chars: usize) -> String {
    let output = tokio::process::Command::new(pdftotext_path)
        .arg("-l")
        .arg("1")
        .arg(path)
        .arg("-")
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .chars()
            .take(sniff_chars)
            .collect(),
        Ok(out) => {
            tracing::debug!(
                status = out.status.code(),
                "pdftotext sniff failed, routing to OCR"
            );
            String::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "pdftotext unavailable, routing to OCR");
            String::new()
        }
    }
}

/// Full direct extraction of a PDF text layer (pure Rust).
pub fn extract_pdf_full(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

// ============ Word documents ============

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extracts the body text of a `.docx` (OOXML) document: every `w:t` run in
/// `word/document.xml`, with paragraph boundaries preserved as newlines.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Word(e.to_string()))?;

    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Word("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Word(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Word(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    extract_text_runs(&doc_xml)
}

/// Walks OOXML events collecting `w:t` text, inserting a newline at each
/// closing `w:p` so paragraphs do not run together.
fn extract_text_runs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !out.ends_with('\n') && !out.is_empty() {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Word(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

/// Extracts a legacy binary `.doc` by shelling out to `antiword`.
pub async fn extract_doc_legacy(antiword_path: &str, path: &Path) -> Result<String, ExtractError> {
    let output = tokio::process::Command::new(antiword_path)
        .arg(path)
        .output()
        .await
        .map_err(|e| ExtractError::Backend(format!("failed to run antiword: {}", e)))?;

    if !output.status.success() {
        return Err(ExtractError::Word(format!(
            "antiword exited with {}",
            output.status.code().unwrap_or(-1)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

// ============ Plain text ============

pub async fn extract_plain_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ExtractError::Io(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

// ============ Normalization ============

/// Collapses runs of spaces/tabs and strips control characters from
/// extracted text. Newlines and form feeds (page-break markers) survive.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.chars() {
        match ch {
            ' ' | '\t' => {
                if !last_was_space {
                    out.push(' ');
                    last_was_space = true;
                }
            }
            '\n' | '\u{0C}' => {
                out.push(ch);
                last_was_space = false;
            }
            '\r' => {}
            c if c.is_control() => {}
            c => {
                out.push(c);
                last_was_space = false;
            }
        }
    }
    out.trim_matches([' ', '\n']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn pdf_route_boundary() {
        let text_51: String = "a".repeat(51);
        let text_49: String = "a".repeat(49);
        let text_50: String = "a".repeat(50);
        assert_eq!(route_pdf(&text_51, 50), PdfRoute::DirectText);
        assert_eq!(route_pdf(&text_49, 50), PdfRoute::NeedsOcr);
        // Exactly at threshold is not "exceeds"
        assert_eq!(route_pdf(&text_50, 50), PdfRoute::NeedsOcr);
    }

    #[test]
    fn whitespace_only_sniff_routes_to_ocr() {
        let padded = format!("   {}   ", "\n".repeat(60));
        assert_eq!(route_pdf(&padded, 50), PdfRoute::NeedsOcr);
    }

    #[test]
    fn full_extraction_not_invoked_on_ocr_route() {
        let mut full_calls = 0;
        let sniff: String = "x".repeat(49);
        let result = resolve_pdf_text(&sniff, 50, || {
            full_calls += 1;
            Ok("full text".to_string())
        });
        assert!(result.is_none());
        assert_eq!(full_calls, 0);
    }

    #[test]
    fn full_extraction_invoked_on_direct_route() {
        let mut full_calls = 0;
        let sniff: String = "x".repeat(51);
        let result = resolve_pdf_text(&sniff, 50, || {
            full_calls += 1;
            Ok("full text".to_string())
        });
        assert_eq!(result.unwrap().unwrap(), "full text");
        assert_eq!(full_calls, 1);
    }

    #[test]
    fn invalid_pdf_returns_error() {
        assert!(extract_pdf_full(b"not a pdf").is_err());
    }

    /// Hand-assembled single-page PDF with a real text layer.
    fn pdf_with_phrase() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let o1 = out.len();
        out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        let o2 = out.len();
        out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
        let o3 = out.len();
        out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
        let o4 = out.len();
        out.extend_from_slice(b"4 0 obj << /Length 53 >> stream\nBT /F1 12 Tf 100 700 Td (annual budget report) Tj ET\nendstream endobj\n");
        let o5 = out.len();
        out.extend_from_slice(
            b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
        );
        let xref_start = out.len();
        out.extend_from_slice(b"xref\n0 6\n");
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for offset in [o1, o2, o3, o4, o5] {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
        out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
        out.extend_from_slice(b"%%EOF\n");
        out
    }

    #[test]
    fn pdf_text_layer_extracted() {
        let text = extract_pdf_full(&pdf_with_phrase()).unwrap();
        assert!(text.contains("annual budget report"), "got: {:?}", text);
    }

    fn docx_with_paragraphs(paras: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let body: String = paras
                .iter()
                .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
                .collect();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn docx_body_text_extracted_with_paragraph_breaks() {
        let bytes = docx_with_paragraphs(&["First paragraph.", "Second paragraph."]);
        let text = extract_docx(&bytes).unwrap();
        assert_eq!(text, "First paragraph.\nSecond paragraph.");
    }

    #[test]
    fn docx_entities_unescaped() {
        let bytes = docx_with_paragraphs(&["Fish &amp; chips"]);
        let text = extract_docx(&bytes).unwrap();
        assert_eq!(text, "Fish & chips");
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        assert!(extract_docx(b"not a zip").is_err());
    }

    #[test]
    fn docx_without_document_xml_returns_error() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        assert!(extract_docx(&buf).is_err());
    }

    #[test]
    fn normalize_collapses_spaces_keeps_page_breaks() {
        let input = "Page  one\ttext\u{0C}Page   two\r\n";
        assert_eq!(normalize_text(input), "Page one text\u{0C}Page two");
    }

    #[tokio::test]
    async fn missing_antiword_is_a_backend_error() {
        let err = extract_doc_legacy("/nonexistent/antiword", Path::new("cv.doc"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Backend(_)));
    }
}
