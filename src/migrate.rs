use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Catalog
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_groups (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'proteomics',
            species TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            analysis_group TEXT NOT NULL,
            path TEXT NOT NULL,
            category TEXT NOT NULL,
            file_type TEXT NOT NULL,
            columns_json TEXT NOT NULL DEFAULT '{}',
            comparisons_json TEXT NOT NULL DEFAULT '[]',
            samples_json TEXT NOT NULL DEFAULT '[]',
            content_hash TEXT,
            indexed_at INTEGER,
            FOREIGN KEY (analysis_group) REFERENCES analysis_groups(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_segments (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            segment_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            UNIQUE(document_id, segment_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='document_segments_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE document_segments_fts USING fts5(
                segment_id UNINDEXED,
                document_id UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    // Sessions and results
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_sessions (
            id TEXT PRIMARY KEY,
            channel TEXT,
            expression TEXT NOT NULL,
            fold_change_cutoff REAL NOT NULL,
            p_value_cutoff REAL NOT NULL,
            mode TEXT NOT NULL,
            scope_json TEXT NOT NULL DEFAULT '{}',
            state TEXT NOT NULL,
            error TEXT,
            found_terms_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_results (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            analysis_group TEXT NOT NULL,
            document_id TEXT NOT NULL,
            primary_id TEXT NOT NULL,
            gene_name TEXT,
            uniprot_id TEXT,
            comparison_label TEXT,
            condition_a TEXT,
            condition_b TEXT,
            log2_fc REAL,
            neg_log10_p REAL,
            samples_json TEXT,
            copy_number REAL,
            rank INTEGER,
            ptm_json TEXT,
            search_terms_json TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY (session_id) REFERENCES search_sessions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_group ON documents(analysis_group)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_segments_document_id ON document_segments(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_results_session ON search_results(session_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_results_key ON search_results(session_id, primary_id, analysis_group, IFNULL(comparison_label, ''))",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON search_sessions(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
