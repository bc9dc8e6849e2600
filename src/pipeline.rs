//! Document ingestion and processing pipeline.
//!
//! Upload and processing are decoupled: upload persists the raw blob and a
//! record row with null pipeline fields, making the document visible in the
//! unprocessed queue (`processed_at IS NULL`). A later processing pass claims
//! queue entries oldest-first and runs the full chain — fetch, classify,
//! extract, OCR gate, language detection — then stamps the record and
//! publishes it to the index in that order, so a publish failure never loses
//! the extraction work.
//!
//! Failure policy: content-level failures (corrupt file, zero-yield OCR) are
//! terminal and the document is marked processed with empty text; transport
//! failures (blob fetch, record store) and the per-document wall-clock budget
//! leave `processed_at` null so the next pass retries.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::classify::{self, DocumentKind};
use crate::config::PipelineConfig;
use crate::extract::{self, ExtractError};
use crate::index::IndexClient;
use crate::language;
use crate::models::{DocumentIndexRecord, DocumentRecord};
use crate::ocr;
use crate::storage::BlobStore;

// ============ Upload ============

pub struct UploadItem {
    pub file_name: String,
    pub declared_type: String,
    pub bytes: Vec<u8>,
}

/// Stores a batch of raw documents for one owner and enqueues them for
/// processing. Returns the new document ids in input order.
pub async fn upload_documents(
    pool: &SqlitePool,
    store: &dyn BlobStore,
    owner_id: &str,
    items: Vec<UploadItem>,
) -> Result<Vec<String>> {
    let owner_exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM employees WHERE id = ?")
        .bind(owner_id)
        .fetch_one(pool)
        .await?;
    if !owner_exists {
        anyhow::bail!("Unknown owner: {}", owner_id);
    }

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let id = Uuid::new_v4().to_string();
        let storage_path = format!("documents/{}/{}", id, item.file_name);
        let size = item.bytes.len() as i64;

        let content_type = if item.declared_type.is_empty() {
            "application/octet-stream"
        } else {
            &item.declared_type
        };
        store
            .put(&storage_path, &item.bytes, content_type)
            .await
            .with_context(|| format!("Failed to store blob for {}", item.file_name))?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, file_name, storage_path, declared_type,
                                   raw_size_bytes, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(owner_id)
        .bind(&item.file_name)
        .bind(&storage_path)
        .bind(&item.declared_type)
        .bind(size)
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await
        .context("Failed to insert document record")?;

        tracing::info!(doc_id = %id, file = %item.file_name, "document uploaded");
        ids.push(id);
    }
    Ok(ids)
}

// ============ Record store access ============

pub async fn fetch_document(pool: &SqlitePool, id: &str) -> Result<Option<DocumentRecord>> {
    let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_record))
}

/// Documents in the unprocessed queue, oldest first.
pub async fn list_pending(pool: &SqlitePool, limit: i64) -> Result<Vec<DocumentRecord>> {
    let rows = sqlx::query(
        "SELECT * FROM documents WHERE processed_at IS NULL ORDER BY uploaded_at, id LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_record).collect())
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> DocumentRecord {
    DocumentRecord {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        file_name: row.get("file_name"),
        storage_path: row.get("storage_path"),
        declared_type: row.get("declared_type"),
        raw_size_bytes: row.get("raw_size_bytes"),
        uploaded_at: row.get("uploaded_at"),
        extracted_text: row.get("extracted_text"),
        ocr_applied: row.get::<i64, _>("ocr_applied") != 0,
        detected_language: row.get("detected_language"),
        processed_at: row.get("processed_at"),
        zero_yield: row.get::<i64, _>("zero_yield") != 0,
    }
}

// ============ Processing ============

struct Extraction {
    text: String,
    ocr_applied: bool,
}

/// Runs the full pipeline for one document and publishes the result.
///
/// Safe to re-run on an already-processed document: every derived field is
/// overwritten and the index projection replaced. A timeout or transport
/// error returns `Err` without stamping `processed_at`, leaving the document
/// queued for the next pass.
pub async fn process_document(
    pool: &SqlitePool,
    store: &dyn BlobStore,
    index: &dyn IndexClient,
    pipeline: &PipelineConfig,
    doc_id: &str,
) -> Result<()> {
    let record = fetch_document(pool, doc_id)
        .await?
        .with_context(|| format!("Unknown document: {}", doc_id))?;

    let budget = Duration::from_secs(pipeline.timeout_secs);
    let extraction = match tokio::time::timeout(budget, extract_and_ocr(store, pipeline, &record))
        .await
    {
        Ok(result) => result?,
        Err(_) => anyhow::bail!(
            "Processing of {} exceeded {}s budget",
            doc_id,
            pipeline.timeout_secs
        ),
    };

    let detected_language =
        language::detect_language(&extraction.text, &pipeline.fallback_language);
    let zero_yield = extraction.text.trim().is_empty();
    if zero_yield {
        tracing::warn!(doc_id = %record.id, file = %record.file_name, "pipeline yielded no text");
    }

    sqlx::query(
        r#"
        UPDATE documents
        SET extracted_text = ?, ocr_applied = ?, detected_language = ?,
            processed_at = ?, zero_yield = ?
        WHERE id = ?
        "#,
    )
    .bind(&extraction.text)
    .bind(extraction.ocr_applied as i64)
    .bind(&detected_language)
    .bind(chrono::Utc::now().timestamp())
    .bind(zero_yield as i64)
    .bind(&record.id)
    .execute(pool)
    .await
    .context("Failed to update document record")?;

    let owner_name = crate::employees::get_employee(pool, &record.owner_id)
        .await?
        .map(|e| e.name)
        .unwrap_or_default();

    let kind = classify::classify(&record.declared_type, &record.file_name);
    let projection = DocumentIndexRecord {
        id: record.id.clone(),
        owner_id: record.owner_id.clone(),
        owner_name,
        file_name: record.file_name.clone(),
        file_type: kind.label().to_string(),
        content: extraction.text,
        detected_language: Some(detected_language),
        ocr_applied: extraction.ocr_applied,
        zero_yield,
        uploaded_at: record.uploaded_at,
        size_bytes: record.raw_size_bytes,
    };

    // The record write above is authoritative; an index publish failure is
    // logged and repaired by the next reindex, never rolled back.
    if let Err(e) = index.publish_document(&projection).await {
        tracing::warn!(doc_id = %record.id, error = %e, "index publish failed");
    }

    tracing::info!(
        doc_id = %record.id,
        ocr = projection.ocr_applied,
        language = %projection.detected_language.as_deref().unwrap_or(""),
        chars = projection.content.chars().count(),
        "document processed"
    );
    Ok(())
}

/// Fetch, classify, extract, OCR. Scratch files live in a per-document
/// temporary directory removed on drop, including every error path.
async fn extract_and_ocr(
    store: &dyn BlobStore,
    pipeline: &PipelineConfig,
    record: &DocumentRecord,
) -> Result<Extraction> {
    let bytes = store
        .get(&record.storage_path)
        .await
        .with_context(|| format!("Failed to fetch blob {}", record.storage_path))?;

    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let base_name = Path::new(&record.file_name)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "input".into());
    let local_path = scratch.path().join(base_name);
    tokio::fs::write(&local_path, &bytes)
        .await
        .context("Failed to write scratch file")?;

    let kind = classify::classify(&record.declared_type, &record.file_name);

    // Direct extraction phase. pdf_needs_ocr marks a PDF whose sniff found no
    // usable text layer, which skips the full extraction pass entirely.
    let mut pdf_needs_ocr = false;
    let direct_text = match kind {
        DocumentKind::PlainText => {
            recover(extract::extract_plain_text(&local_path).await, record)
        }
        DocumentKind::Word => recover(extract::extract_docx(&bytes), record),
        DocumentKind::WordLegacy => recover(
            extract::extract_doc_legacy(&pipeline.antiword_path, &local_path).await,
            record,
        ),
        DocumentKind::Pdf => {
            let sniff =
                extract::sniff_pdf(&pipeline.pdftotext_path, &local_path, pipeline.pdf_sniff_chars)
                    .await;
            match extract::resolve_pdf_text(&sniff, pipeline.pdf_sniff_threshold, || {
                extract::extract_pdf_full(&bytes)
            }) {
                Some(result) => recover(result, record),
                None => {
                    pdf_needs_ocr = true;
                    String::new()
                }
            }
        }
        DocumentKind::Image => String::new(),
        DocumentKind::Unsupported => {
            tracing::warn!(
                doc_id = %record.id,
                declared = %record.declared_type,
                file = %record.file_name,
                "unsupported document type, marking processed with empty text"
            );
            String::new()
        }
    };
    let mut text = extract::normalize_text(&direct_text);

    // Scan gate. OCR backends consume only PDFs and images; a short plain
    // text or Word document keeps its direct text.
    let wants_ocr = match kind {
        DocumentKind::Image => true,
        DocumentKind::Pdf => pdf_needs_ocr || ocr::needs_ocr(&text, pipeline.min_text_chars),
        _ => false,
    };

    let mut ocr_applied = false;
    if wants_ocr {
        let ocr_text = match kind {
            DocumentKind::Pdf => ocr::ocr_pdf(pipeline, &local_path, scratch.path()).await,
            _ => ocr::ocr_image(pipeline, &local_path).await,
        };
        let ocr_text = extract::normalize_text(&ocr_text);
        ocr_applied = true;
        // Keep whichever pass read more of the document.
        if ocr_text.chars().count() > text.chars().count() {
            text = ocr_text;
        }
    }

    Ok(Extraction { text, ocr_applied })
}

/// Content-level extraction failures are terminal for the document, not for
/// the queue: log and continue with empty text.
fn recover(result: Result<String, ExtractError>, record: &DocumentRecord) -> String {
    match result {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(doc_id = %record.id, file = %record.file_name, error = %e, "extraction failed");
            String::new()
        }
    }
}

// ============ Queue and maintenance passes ============

#[derive(Debug, Default)]
pub struct ProcessSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Processes every document in the unprocessed queue, oldest first. A failing
/// document is logged and left queued; the pass continues.
pub async fn process_pending(
    pool: &SqlitePool,
    store: &dyn BlobStore,
    index: &dyn IndexClient,
    pipeline: &PipelineConfig,
    limit: i64,
) -> Result<ProcessSummary> {
    let pending = list_pending(pool, limit).await?;
    let mut summary = ProcessSummary::default();

    for record in pending {
        match process_document(pool, store, index, pipeline, &record.id).await {
            Ok(()) => summary.processed += 1,
            Err(e) => {
                tracing::warn!(doc_id = %record.id, error = %e, "processing failed, will retry");
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}

#[derive(Debug, Default)]
pub struct ReindexSummary {
    pub employees: usize,
    pub documents: usize,
    pub failed: usize,
}

/// Republishes every employee and every processed document to the index.
///
/// Publishing is independent per record: a failing record is logged and
/// counted, and the pass continues, so one persistently bad record can
/// never starve later records of repair. Only record-store read errors
/// abort the pass.
pub async fn reindex(pool: &SqlitePool, index: &dyn IndexClient) -> Result<ReindexSummary> {
    let mut summary = ReindexSummary::default();

    let employees = crate::employees::list_employees(pool).await?;
    for employee in &employees {
        match index
            .publish_employee(&crate::employees::index_record(employee))
            .await
        {
            Ok(()) => summary.employees += 1,
            Err(e) => {
                tracing::warn!(employee_id = %employee.id, error = %e, "employee reindex failed");
                summary.failed += 1;
            }
        }
    }

    let rows = sqlx::query(
        r#"
        SELECT d.*, COALESCE(e.name, '') AS owner_name
        FROM documents d
        LEFT JOIN employees e ON e.id = d.owner_id
        WHERE d.processed_at IS NOT NULL
        ORDER BY d.uploaded_at, d.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    for row in &rows {
        let record = row_to_record(row);
        let owner_name: String = row.get("owner_name");
        let kind = classify::classify(&record.declared_type, &record.file_name);
        let result = index
            .publish_document(&DocumentIndexRecord {
                id: record.id.clone(),
                owner_id: record.owner_id.clone(),
                owner_name,
                file_name: record.file_name.clone(),
                file_type: kind.label().to_string(),
                content: record.extracted_text.clone().unwrap_or_default(),
                detected_language: record.detected_language.clone(),
                ocr_applied: record.ocr_applied,
                zero_yield: record.zero_yield,
                uploaded_at: record.uploaded_at,
                size_bytes: record.raw_size_bytes,
            })
            .await;
        match result {
            Ok(()) => summary.documents += 1,
            Err(e) => {
                tracing::warn!(doc_id = %record.id, error = %e, "document reindex failed");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Removes a document record and its index entry. The raw blob stays in
/// storage for audit.
pub async fn delete_document(
    pool: &SqlitePool,
    index: &dyn IndexClient,
    doc_id: &str,
) -> Result<()> {
    let deleted = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(doc_id)
        .execute(pool)
        .await?
        .rows_affected();
    if deleted == 0 {
        anyhow::bail!("Unknown document: {}", doc_id);
    }
    index.delete_document(doc_id).await?;
    Ok(())
}

/// Long-running poller: drains the unprocessed queue every `interval_secs`.
pub async fn run_watch(
    pool: &SqlitePool,
    store: &dyn BlobStore,
    index: &dyn IndexClient,
    pipeline: &PipelineConfig,
    interval_secs: u64,
    batch_size: i64,
) -> Result<()> {
    tracing::info!(interval_secs, "watching for unprocessed documents");
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        ticker.tick().await;
        let summary = process_pending(pool, store, index, pipeline, batch_size).await?;
        if summary.processed > 0 || summary.failed > 0 {
            tracing::info!(
                processed = summary.processed,
                failed = summary.failed,
                "processing pass complete"
            );
        }
    }
}
