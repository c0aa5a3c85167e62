//! SQLite-backed [`Store`] and [`FullTextIndex`] implementation.
//!
//! Catalog rows carry their column roles, comparisons, and sample maps as
//! JSON columns. Full-text search runs against the FTS5 table over document
//! segments; `highlight()` wraps every matched token with the highlight
//! markers the disambiguator expects.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use cinder_search_core::highlight::{HIGHLIGHT_START, HIGHLIGHT_STOP};
use cinder_search_core::models::{
    AnalysisGroup, FileType, ResultRecord, SearchScope, SearchSession, SourceDocument,
};
use cinder_search_core::store::{Candidate, FullTextIndex, Store};
use cinder_search_core::terms::split_alternatives;

/// SQLite implementation of the [`Store`] and [`FullTextIndex`] traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// FTS5 query matching any alternative of `expression` as a phrase.
pub fn fts_query(expression: &str) -> Option<String> {
    let phrases: Vec<String> = split_alternatives(expression)
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    (!phrases.is_empty()).then(|| phrases.join(" OR "))
}

fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_enum<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse::<T>().map_err(anyhow::Error::msg)
}

fn document_from_row(row: &SqliteRow) -> Result<SourceDocument> {
    let id: String = row.get("id");
    let category: String = row.get("category");
    let file_type: String = row.get("file_type");
    let columns: String = row.get("columns_json");
    let comparisons: String = row.get("comparisons_json");
    let samples: String = row.get("samples_json");
    let path: String = row.get("path");
    Ok(SourceDocument {
        analysis_group: row.get("analysis_group"),
        path: PathBuf::from(path),
        category: parse_enum(&category)?,
        file_type: serde_json::from_value::<FileType>(serde_json::Value::String(file_type))
            .unwrap_or_default(),
        columns: serde_json::from_str(&columns)
            .with_context(|| format!("document {}: invalid columns_json", id))?,
        comparisons: serde_json::from_str(&comparisons)
            .with_context(|| format!("document {}: invalid comparisons_json", id))?,
        samples: serde_json::from_str(&samples)
            .with_context(|| format!("document {}: invalid samples_json", id))?,
        id,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<SearchSession> {
    let id: String = row.get("id");
    let mode: String = row.get("mode");
    let state: String = row.get("state");
    let scope: String = row.get("scope_json");
    let found_terms: String = row.get("found_terms_json");
    Ok(SearchSession {
        channel: row.get("channel"),
        expression: row.get("expression"),
        fold_change_cutoff: row.get("fold_change_cutoff"),
        p_value_cutoff: row.get("p_value_cutoff"),
        mode: parse_enum(&mode)?,
        scope: serde_json::from_str(&scope)
            .with_context(|| format!("session {}: invalid scope_json", id))?,
        state: parse_enum(&state)?,
        error: row.get("error"),
        found_terms: serde_json::from_str(&found_terms)
            .with_context(|| format!("session {}: invalid found_terms_json", id))?,
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
        id,
    })
}

fn record_from_row(row: &SqliteRow) -> Result<ResultRecord> {
    let samples: Option<String> = row.get("samples_json");
    let ptm: Option<String> = row.get("ptm_json");
    let terms: String = row.get("search_terms_json");
    Ok(ResultRecord {
        id: row.get("id"),
        session_id: row.get("session_id"),
        analysis_group: row.get("analysis_group"),
        document_id: row.get("document_id"),
        primary_id: row.get("primary_id"),
        gene_name: row.get("gene_name"),
        uniprot_id: row.get("uniprot_id"),
        comparison_label: row.get("comparison_label"),
        condition_a: row.get("condition_a"),
        condition_b: row.get("condition_b"),
        log2_fc: row.get("log2_fc"),
        neg_log10_p: row.get("neg_log10_p"),
        samples: samples.map(|s| serde_json::from_str(&s)).transpose()?,
        copy_number: row.get("copy_number"),
        rank: row.get("rank"),
        ptm: ptm.map(|s| serde_json::from_str(&s)).transpose()?,
        search_terms: serde_json::from_str(&terms)?,
    })
}

async fn upsert_session(tx: &mut Transaction<'_, Sqlite>, session: &SearchSession) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO search_sessions (id, channel, expression, fold_change_cutoff, p_value_cutoff,
                                     mode, scope_json, state, error, found_terms_json,
                                     created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            state = excluded.state,
            error = excluded.error,
            found_terms_json = excluded.found_terms_json,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&session.id)
    .bind(&session.channel)
    .bind(&session.expression)
    .bind(session.fold_change_cutoff)
    .bind(session.p_value_cutoff)
    .bind(session.mode.as_str())
    .bind(serde_json::to_string(&session.scope)?)
    .bind(session.state.as_str())
    .bind(&session.error)
    .bind(serde_json::to_string(&session.found_terms)?)
    .bind(to_millis(&session.created_at))
    .bind(to_millis(&session.updated_at))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_record(tx: &mut Transaction<'_, Sqlite>, record: &ResultRecord) -> Result<()> {
    let samples = record
        .samples
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let ptm = record.ptm.as_ref().map(serde_json::to_string).transpose()?;
    sqlx::query(
        r#"
        INSERT INTO search_results (id, session_id, analysis_group, document_id, primary_id,
                                    gene_name, uniprot_id, comparison_label, condition_a,
                                    condition_b, log2_fc, neg_log10_p, samples_json,
                                    copy_number, rank, ptm_json, search_terms_json)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.session_id)
    .bind(&record.analysis_group)
    .bind(&record.document_id)
    .bind(&record.primary_id)
    .bind(&record.gene_name)
    .bind(&record.uniprot_id)
    .bind(&record.comparison_label)
    .bind(&record.condition_a)
    .bind(&record.condition_b)
    .bind(record.log2_fc)
    .bind(record.neg_log10_p)
    .bind(samples)
    .bind(record.copy_number)
    .bind(record.rank)
    .bind(ptm)
    .bind(serde_json::to_string(&record.search_terms)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn groups(&self) -> Result<Vec<AnalysisGroup>> {
        let rows = sqlx::query("SELECT id, name, kind, species FROM analysis_groups ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| AnalysisGroup {
                id: row.get("id"),
                name: row.get("name"),
                kind: row.get("kind"),
                species: row.get("species"),
            })
            .collect())
    }

    async fn documents(&self) -> Result<Vec<SourceDocument>> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn group_documents(&self, analysis_group: &str) -> Result<Vec<SourceDocument>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE analysis_group = ? ORDER BY id")
            .bind(analysis_group)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn create_session(&self, session: &SearchSession) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM search_sessions WHERE id = ?")
                .bind(&session.id)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            anyhow::bail!("session {} already exists", session.id);
        }
        upsert_session(&mut tx, session).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<SearchSession>> {
        let row = sqlx::query("SELECT * FROM search_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SearchSession>> {
        let rows = sqlx::query("SELECT * FROM search_sessions ORDER BY created_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(session_from_row).collect()
    }

    async fn update_session(&self, session: &SearchSession) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_session(&mut tx, session).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn complete_session(
        &self,
        session: &SearchSession,
        records: &[ResultRecord],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_session(&mut tx, session).await?;
        sqlx::query("DELETE FROM search_results WHERE session_id = ?")
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;
        for record in records {
            insert_record(&mut tx, record)
                .await
                .with_context(|| format!("Failed to store result {}", record.primary_id))?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn fail_session(&self, session: &SearchSession) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_session(&mut tx, session).await?;
        sqlx::query("DELETE FROM search_results WHERE session_id = ?")
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn results_for_session(&self, session_id: &str) -> Result<Vec<ResultRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM search_results
            WHERE session_id = ?
            ORDER BY primary_id, analysis_group, IFNULL(comparison_label, '')
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl FullTextIndex for SqliteStore {
    async fn find_candidates(
        &self,
        expression: &str,
        scope: &SearchScope,
    ) -> Result<Vec<Candidate>> {
        let Some(query) = fts_query(expression) else {
            return Ok(Vec::new());
        };
        let in_scope: HashSet<String> = self
            .documents_in_scope(scope)
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();

        let sql = format!(
            r#"
            SELECT document_segments_fts.document_id AS document_id,
                   highlight(document_segments_fts, 2, '{}', '{}') AS snippet
            FROM document_segments_fts
            JOIN document_segments ON document_segments.id = document_segments_fts.segment_id
            WHERE document_segments_fts MATCH ?
            ORDER BY document_segments_fts.document_id, document_segments.segment_index
            "#,
            HIGHLIGHT_START, HIGHLIGHT_STOP
        );
        let rows = sqlx::query(&sql)
            .bind(&query)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Full-text query failed: {}", query))?;

        let mut order: Vec<String> = Vec::new();
        let mut snippets: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let document_id: String = row.get("document_id");
            if !in_scope.contains(&document_id) {
                continue;
            }
            let snippet: String = row.get("snippet");
            if !snippets.contains_key(&document_id) {
                order.push(document_id.clone());
            }
            snippets.entry(document_id).or_default().push(snippet);
        }
        Ok(order
            .into_iter()
            .map(|document_id| Candidate {
                snippets: snippets.remove(&document_id).unwrap_or_default(),
                document_id,
            })
            .collect())
    }
}
