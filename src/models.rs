//! Core data models used throughout staffdex.
//!
//! These types represent the employee and document records that flow through
//! the ingestion pipeline, their denormalized index projections, and the
//! transient federated search results.

use serde::Serialize;

/// A document row as persisted in the record store.
///
/// Pipeline fields (`extracted_text`, `ocr_applied`, `detected_language`,
/// `processed_at`, `zero_yield`) are null/false until the first pipeline run
/// completes. A document is in the unprocessed queue iff `processed_at` is
/// null, regardless of the text content.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub storage_path: String,
    pub declared_type: String,
    pub raw_size_bytes: i64,
    pub uploaded_at: i64,
    pub extracted_text: Option<String>,
    pub ocr_applied: bool,
    pub detected_language: Option<String>,
    pub processed_at: Option<i64>,
    pub zero_yield: bool,
}

/// Minimal employee row. Full employee CRUD lives outside this crate; these
/// fields exist so documents have owners and the employee index has a corpus.
#[derive(Debug, Clone)]
pub struct EmployeeRecord {
    pub id: String,
    pub name: String,
    pub department: String,
    pub role: String,
    pub skills: String,
    pub bio: String,
}

/// Denormalized document projection written to the document index partition.
///
/// Rebuilt wholesale from the record on every publish, never patched.
/// `owner_name` is copied at index time and may go stale until reindex.
#[derive(Debug, Clone)]
pub struct DocumentIndexRecord {
    pub id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub file_name: String,
    pub file_type: String,
    pub content: String,
    pub detected_language: Option<String>,
    pub ocr_applied: bool,
    pub zero_yield: bool,
    pub uploaded_at: i64,
    pub size_bytes: i64,
}

/// Denormalized employee projection written to the employee index partition.
#[derive(Debug, Clone)]
pub struct EmployeeIndexRecord {
    pub id: String,
    pub name: String,
    pub department: String,
    pub role: String,
    pub skills: String,
    pub bio: String,
}

/// One ranked hit from the employee index.
#[derive(Debug, Clone)]
pub struct EmployeeHit {
    pub id: String,
    pub name: String,
    pub department: String,
    pub role: String,
    pub score: f64,
    pub snippet: String,
}

/// One ranked hit from the document index.
#[derive(Debug, Clone)]
pub struct DocumentHit {
    pub id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub file_name: String,
    pub score: f64,
    pub snippet: String,
}

/// How a merged result entry earned its place in the result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultKind {
    /// The employee record itself matched (documents may be nested).
    Employee,
    /// Only documents owned by this employee matched.
    DocumentOnly,
}

/// A matching document nested inside a merged result entry.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedDocument {
    pub id: String,
    pub file_name: String,
    pub score: f64,
    pub snippet: String,
}

/// One entry of the merged, ranked federated search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchEntry {
    pub kind: ResultKind,
    pub owner_id: String,
    pub owner_name: String,
    pub department: Option<String>,
    pub role: Option<String>,
    pub score: f64,
    pub snippet: Option<String>,
    pub documents: Vec<MatchedDocument>,
}
