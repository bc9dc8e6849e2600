//! Full-text index collaborator.
//!
//! [`IndexClient`] is the injected seam between the pipeline/search layers
//! and whatever index engine backs them — constructed once per process and
//! passed in explicitly, so both the publisher and the federator can be
//! exercised against a fake. The production implementation is two SQLite
//! FTS5 partitions (`docs_fts`, `employees_fts`).
//!
//! Publishing is upsert-by-id with wholesale replacement: the old row is
//! deleted and the new projection inserted in one transaction; there is no
//! field-level merge. SQLite makes writes visible to the next read
//! immediately, which satisfies the forced-visibility contract — an engine
//! with an async refresh cycle must flush inside `publish_*` before
//! returning.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::models::{DocumentHit, DocumentIndexRecord, EmployeeHit, EmployeeIndexRecord};

#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Upserts a document projection, fully replacing any prior record.
    async fn publish_document(&self, record: &DocumentIndexRecord) -> Result<()>;

    /// Upserts an employee projection, fully replacing any prior record.
    async fn publish_employee(&self, record: &EmployeeIndexRecord) -> Result<()>;

    /// Removes a document from the index (admin deletion path).
    async fn delete_document(&self, id: &str) -> Result<()>;

    /// Ranked multi-field employee query.
    async fn search_employees(&self, query: &str, limit: i64) -> Result<Vec<EmployeeHit>>;

    /// Ranked document query over content, filename, and owner name, with a
    /// substring channel for noisy OCR text.
    async fn search_documents(&self, query: &str, limit: i64) -> Result<Vec<DocumentHit>>;
}

// ============ SQLite FTS5 implementation ============

pub struct SqliteIndexClient {
    pool: SqlitePool,
}

impl SqliteIndexClient {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IndexClient for SqliteIndexClient {
    async fn publish_document(&self, record: &DocumentIndexRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM docs_fts WHERE doc_id = ?")
            .bind(&record.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO docs_fts (doc_id, owner_id, owner_name, file_name, content, extracted_text)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.owner_name)
        .bind(&record.file_name)
        .bind(&record.content)
        .bind(&record.content)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn publish_employee(&self, record: &EmployeeIndexRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM employees_fts WHERE employee_id = ?")
            .bind(&record.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO employees_fts (employee_id, name, department, role, skills, bio)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.department)
        .bind(&record.role)
        .bind(&record.skills)
        .bind(&record.bio)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM docs_fts WHERE doc_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn search_employees(&self, query: &str, limit: i64) -> Result<Vec<EmployeeHit>> {
        let match_expr = match build_match_query(query) {
            Some(m) => m,
            None => return Ok(Vec::new()),
        };

        // Column weights: name > skills > department = role > bio. Snippet
        // column -1 lets FTS5 pick the best-matching column, so a name-only
        // match highlights the name rather than an unrelated bio fragment.
        let rows = sqlx::query(
            r#"
            SELECT employee_id, name, department, role,
                   bm25(employees_fts, 0.0, 10.0, 4.0, 4.0, 6.0, 2.0) AS rank,
                   snippet(employees_fts, -1, '>>>', '<<<', '…', 16) AS snippet
            FROM employees_fts
            WHERE employees_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&match_expr)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                EmployeeHit {
                    id: row.get("employee_id"),
                    name: row.get("name"),
                    department: row.get("department"),
                    role: row.get("role"),
                    score: -rank, // negate so higher = better
                    snippet: row.get("snippet"),
                }
            })
            .collect())
    }

    async fn search_documents(&self, query: &str, limit: i64) -> Result<Vec<DocumentHit>> {
        let mut hits: Vec<DocumentHit> = Vec::new();

        if let Some(match_expr) = build_match_query(query) {
            let rows = sqlx::query(
                r#"
                SELECT doc_id, owner_id, owner_name, file_name,
                       bm25(docs_fts, 0.0, 0.0, 3.0, 5.0, 1.0, 1.0) AS rank,
                       snippet(docs_fts, -1, '>>>', '<<<', '…', 16) AS snippet
                FROM docs_fts
                WHERE docs_fts MATCH ?
                ORDER BY rank
                LIMIT ?
                "#,
            )
            .bind(&match_expr)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

            hits.extend(rows.iter().map(|row| {
                let rank: f64 = row.get("rank");
                DocumentHit {
                    id: row.get("doc_id"),
                    owner_id: row.get("owner_id"),
                    owner_name: row.get("owner_name"),
                    file_name: row.get("file_name"),
                    score: -rank,
                    snippet: row.get("snippet"),
                }
            }));
        }

        // Substring channel: OCR'd text is noisy, so partial-word matches on
        // the raw extracted text matter more here than on clean corpora.
        let trimmed = query.trim();
        if !trimmed.is_empty() {
            let like_pattern = format!("%{}%", escape_like(trimmed));
            let rows = sqlx::query(
                r#"
                SELECT doc_id, owner_id, owner_name, file_name,
                       substr(extracted_text,
                              max(1, instr(lower(extracted_text), lower(?1)) - 40),
                              120) AS snippet
                FROM docs_fts
                WHERE extracted_text LIKE ?2 ESCAPE '\'
                LIMIT ?3
                "#,
            )
            .bind(trimmed)
            .bind(&like_pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

            for row in &rows {
                let id: String = row.get("doc_id");
                if hits.iter().any(|h| h.id == id) {
                    continue;
                }
                hits.push(DocumentHit {
                    id,
                    owner_id: row.get("owner_id"),
                    owner_name: row.get("owner_name"),
                    file_name: row.get("file_name"),
                    // Substring-only matches rank below any bm25 hit.
                    score: SUBSTRING_CHANNEL_SCORE,
                    snippet: row.get("snippet"),
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        hits.truncate(limit as usize);
        Ok(hits)
    }
}

/// Fixed score assigned to hits found only by the LIKE substring channel.
const SUBSTRING_CHANNEL_SCORE: f64 = 0.1;

/// Builds an FTS5 MATCH expression from a free-text query: each alphanumeric
/// token becomes a quoted prefix term, OR-joined so partial multi-word
/// queries still match (prefix matching doubles as crude typo tolerance on
/// word endings). Returns `None` when the query has no usable tokens.
fn build_match_query(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"*", t))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_query_quotes_and_prefixes_tokens() {
        assert_eq!(
            build_match_query("budget report").unwrap(),
            "\"budget\"* OR \"report\"*"
        );
    }

    #[test]
    fn match_query_strips_fts_syntax() {
        // Punctuation that would be FTS5 operators must not survive.
        assert_eq!(
            build_match_query("c++ (budget) OR x").unwrap(),
            "\"c\"* OR \"budget\"* OR \"OR\"* OR \"x\"*"
        );
    }

    #[test]
    fn empty_query_builds_nothing() {
        assert!(build_match_query("").is_none());
        assert!(build_match_query("  ***  ").is_none());
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }
}
