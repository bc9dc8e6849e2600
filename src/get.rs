//! Document retrieval by ID.
//!
//! Fetches a full document record, its owner, and its pipeline status for
//! the `sdx get` CLI command, optionally with a presigned download URL.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::employees;
use crate::pipeline;
use crate::storage::BlobStore;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub file_name: String,
    pub declared_type: String,
    pub size_bytes: i64,
    pub uploaded_at: String, // ISO8601
    pub processed_at: Option<String>,
    pub ocr_applied: bool,
    pub detected_language: Option<String>,
    pub zero_yield: bool,
    pub extracted_text: Option<String>,
    pub download_url: Option<String>,
}

/// Core get function returning structured data.
pub async fn get_document(
    pool: &SqlitePool,
    store: Option<&dyn BlobStore>,
    id: &str,
) -> Result<DocumentResponse> {
    let record = match pipeline::fetch_document(pool, id).await? {
        Some(record) => record,
        None => bail!("document not found: {}", id),
    };

    let owner_name = employees::get_employee(pool, &record.owner_id)
        .await?
        .map(|e| e.name)
        .unwrap_or_default();

    let download_url = match store {
        Some(store) => Some(store.presigned_url(&record.storage_path).await?),
        None => None,
    };

    Ok(DocumentResponse {
        id: record.id,
        owner_id: record.owner_id,
        owner_name,
        file_name: record.file_name,
        declared_type: record.declared_type,
        size_bytes: record.raw_size_bytes,
        uploaded_at: format_ts_iso(record.uploaded_at),
        processed_at: record.processed_at.map(format_ts_iso),
        ocr_applied: record.ocr_applied,
        detected_language: record.detected_language,
        zero_yield: record.zero_yield,
        extracted_text: record.extracted_text,
        download_url,
    })
}

/// CLI entry point — calls get_document and prints to stdout.
pub async fn run_get(
    pool: &SqlitePool,
    store: Option<&dyn BlobStore>,
    id: &str,
) -> Result<()> {
    let doc = get_document(pool, store, id).await?;

    println!("--- Document ---");
    println!("id:            {}", doc.id);
    println!("file_name:     {}", doc.file_name);
    println!("owner:         {} ({})", doc.owner_name, doc.owner_id);
    println!("declared_type: {}", doc.declared_type);
    println!("size_bytes:    {}", doc.size_bytes);
    println!("uploaded_at:   {}", doc.uploaded_at);
    println!(
        "processed_at:  {}",
        doc.processed_at.as_deref().unwrap_or("(unprocessed)")
    );
    println!("ocr_applied:   {}", doc.ocr_applied);
    println!(
        "language:      {}",
        doc.detected_language.as_deref().unwrap_or("(unknown)")
    );
    println!("zero_yield:    {}", doc.zero_yield);
    if let Some(ref url) = doc.download_url {
        println!("download_url:  {}", url);
    }
    println!();

    println!("--- Extracted text ---");
    println!("{}", doc.extracted_text.as_deref().unwrap_or("(none)"));

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
