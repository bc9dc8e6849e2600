use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates all tables and index partitions. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS employees (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department TEXT NOT NULL DEFAULT '',
            role TEXT NOT NULL DEFAULT '',
            skills TEXT NOT NULL DEFAULT '',
            bio TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            storage_path TEXT NOT NULL,
            declared_type TEXT NOT NULL DEFAULT '',
            raw_size_bytes INTEGER NOT NULL DEFAULT 0,
            uploaded_at INTEGER NOT NULL,
            extracted_text TEXT,
            ocr_applied INTEGER NOT NULL DEFAULT 0,
            detected_language TEXT,
            processed_at INTEGER,
            zero_yield INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (owner_id) REFERENCES employees(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let docs_fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='docs_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !docs_fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE docs_fts USING fts5(
                doc_id UNINDEXED,
                owner_id UNINDEXED,
                owner_name,
                file_name,
                content,
                extracted_text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    let employees_fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='employees_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !employees_fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE employees_fts USING fts5(
                employee_id UNINDEXED,
                name,
                department,
                role,
                skills,
                bio
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner_id ON documents(owner_id)")
        .execute(pool)
        .await?;
    // Partial index backs the unprocessed-queue membership test.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_unprocessed ON documents(uploaded_at) WHERE processed_at IS NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}
