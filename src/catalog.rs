//! Catalog indexing (`cinder index`).
//!
//! Copies the analysis groups and documents declared in the configuration
//! into SQLite and loads each document's content into the full-text index.
//! Content is split on whitespace into segments of [`SEGMENT_TOKENS`]
//! tokens; each segment becomes one FTS5 row. A SHA-256 of the file is kept
//! per document so unchanged files are skipped on the next run.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::{debug, info};

use cinder_search_core::models::{AnalysisGroup, SourceDocument};

use crate::config::Config;
use crate::db;
use crate::migrate;

/// Whitespace-separated tokens per full-text segment.
pub const SEGMENT_TOKENS: usize = 50_000;

/// Counts reported by [`index_catalog`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub groups: usize,
    pub documents: usize,
    pub reindexed: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub segments: usize,
}

/// Split content into segments of at most `tokens_per_segment` tokens.
pub fn segment_content(content: &str, tokens_per_segment: usize) -> Vec<String> {
    let tokens: Vec<&str> = content.split_whitespace().collect();
    tokens
        .chunks(tokens_per_segment.max(1))
        .map(|chunk| chunk.join(" "))
        .collect()
}

fn file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub async fn run_index(config: &Config, full: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let summary = index_catalog(&pool, config, full).await?;

    println!("index catalog{}", if full { " (full)" } else { "" });
    println!("  groups: {}", summary.groups);
    println!("  documents: {}", summary.documents);
    println!("  reindexed: {}", summary.reindexed);
    println!("  unchanged: {}", summary.unchanged);
    println!("  removed: {}", summary.removed);
    println!("  segments written: {}", summary.segments);
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Bring the database catalog in line with the configuration.
pub async fn index_catalog(pool: &SqlitePool, config: &Config, full: bool) -> Result<IndexSummary> {
    let mut summary = IndexSummary::default();

    let groups = config.analysis_groups();
    for group in &groups {
        upsert_group(pool, group).await?;
    }
    summary.groups = groups.len();

    let documents = config.source_documents();
    for doc in &documents {
        upsert_document(pool, doc).await?;
        summary.documents += 1;

        let bytes = std::fs::read(&doc.path)
            .with_context(|| format!("Failed to read document {}: {}", doc.id, doc.path.display()))?;
        let hash = file_hash(&bytes);
        if !full && stored_hash(pool, &doc.id).await?.as_deref() == Some(hash.as_str()) {
            debug!(document = %doc.id, "unchanged, skipping");
            summary.unchanged += 1;
            continue;
        }
        let segments = segment_content(&String::from_utf8_lossy(&bytes), SEGMENT_TOKENS);
        replace_segments(pool, &doc.id, &segments, &hash).await?;
        info!(document = %doc.id, segments = segments.len(), "indexed");
        summary.reindexed += 1;
        summary.segments += segments.len();
    }

    let keep_docs: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
    let keep_groups: HashSet<&str> = groups.iter().map(|g| g.id.as_str()).collect();
    summary.removed = remove_stale(pool, &keep_docs, &keep_groups).await?;
    Ok(summary)
}

async fn upsert_group(pool: &SqlitePool, group: &AnalysisGroup) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO analysis_groups (id, name, kind, species)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            kind = excluded.kind,
            species = excluded.species
        "#,
    )
    .bind(&group.id)
    .bind(&group.name)
    .bind(&group.kind)
    .bind(&group.species)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_document(pool: &SqlitePool, doc: &SourceDocument) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, analysis_group, path, category, file_type,
                               columns_json, comparisons_json, samples_json)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            analysis_group = excluded.analysis_group,
            path = excluded.path,
            category = excluded.category,
            file_type = excluded.file_type,
            columns_json = excluded.columns_json,
            comparisons_json = excluded.comparisons_json,
            samples_json = excluded.samples_json
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.analysis_group)
    .bind(doc.path.to_string_lossy().as_ref())
    .bind(doc.category.as_str())
    .bind(doc.file_type.as_str())
    .bind(serde_json::to_string(&doc.columns)?)
    .bind(serde_json::to_string(&doc.comparisons)?)
    .bind(serde_json::to_string(&doc.samples)?)
    .execute(pool)
    .await?;
    Ok(())
}

async fn stored_hash(pool: &SqlitePool, document_id: &str) -> Result<Option<String>> {
    let hash: Option<Option<String>> =
        sqlx::query_scalar("SELECT content_hash FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(pool)
            .await?;
    Ok(hash.flatten())
}

async fn replace_segments(
    pool: &SqlitePool,
    document_id: &str,
    segments: &[String],
    hash: &str,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM document_segments_fts WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM document_segments WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    for (i, text) in segments.iter().enumerate() {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO document_segments (id, document_id, segment_index, text) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(document_id)
        .bind(i as i64)
        .bind(text)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO document_segments_fts (segment_id, document_id, text) VALUES (?, ?, ?)",
        )
        .bind(&id)
        .bind(document_id)
        .bind(text)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE documents SET content_hash = ?, indexed_at = ? WHERE id = ?")
        .bind(hash)
        .bind(chrono::Utc::now().timestamp())
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Drop documents and groups no longer declared. Returns removed documents.
async fn remove_stale(
    pool: &SqlitePool,
    keep_docs: &HashSet<&str>,
    keep_groups: &HashSet<&str>,
) -> Result<usize> {
    let existing: Vec<String> = sqlx::query_scalar("SELECT id FROM documents")
        .fetch_all(pool)
        .await?;
    let mut removed = 0;
    for id in existing.iter().filter(|id| !keep_docs.contains(id.as_str())) {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM document_segments_fts WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM document_segments WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        removed += 1;
    }

    let existing_groups: Vec<String> = sqlx::query_scalar("SELECT id FROM analysis_groups")
        .fetch_all(pool)
        .await?;
    for id in existing_groups
        .iter()
        .filter(|id| !keep_groups.contains(id.as_str()))
    {
        sqlx::query("DELETE FROM analysis_groups WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
    }
    Ok(removed)
}
