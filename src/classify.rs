//! Declared-type classification.
//!
//! Maps the MIME type supplied at upload time (falling back to the filename
//! extension when the type is empty or generic) onto an extraction strategy.
//! Unsupported non-image types skip extraction entirely and are marked
//! processed with empty text so one odd upload never blocks the queue.

/// Extraction strategy for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    /// Modern OOXML `.docx`.
    Word,
    /// Legacy binary `.doc`.
    WordLegacy,
    PlainText,
    /// Direct image upload; always OCR, no extraction attempt.
    Image,
    Unsupported,
}

impl DocumentKind {
    /// Stable label stored on index projections.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Word => "docx",
            DocumentKind::WordLegacy => "doc",
            DocumentKind::PlainText => "text",
            DocumentKind::Image => "image",
            DocumentKind::Unsupported => "unsupported",
        }
    }
}

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_DOC: &str = "application/msword";

/// Classifies a document from its declared MIME type and file name.
///
/// Empty and generic declared types (`application/octet-stream`) fall back
/// to the extension.
pub fn classify(declared_type: &str, file_name: &str) -> DocumentKind {
    let mime = declared_type.trim().to_ascii_lowercase();
    if !mime.is_empty() && mime != "application/octet-stream" {
        match mime.as_str() {
            MIME_PDF => return DocumentKind::Pdf,
            MIME_DOCX => return DocumentKind::Word,
            MIME_DOC => return DocumentKind::WordLegacy,
            m if m.starts_with("text/") => return DocumentKind::PlainText,
            m if m.starts_with("image/") => return DocumentKind::Image,
            _ => return classify_extension(file_name),
        }
    }
    classify_extension(file_name)
}

fn classify_extension(file_name: &str) -> DocumentKind {
    let ext = file_name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => DocumentKind::Pdf,
        "docx" => DocumentKind::Word,
        "doc" => DocumentKind::WordLegacy,
        "txt" | "md" | "csv" | "rtf" => DocumentKind::PlainText,
        "png" | "jpg" | "jpeg" | "tiff" | "tif" | "bmp" | "gif" | "webp" => DocumentKind::Image,
        _ => DocumentKind::Unsupported,
    }
}
