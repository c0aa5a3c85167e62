//! Reading back finished sessions (`cinder results`, `cinder sessions`).

use anyhow::Result;
use serde::Serialize;

use cinder_search_core::models::{ResultRecord, SearchSession};
use cinder_search_core::store::Store;
use cinder_search_core::SearchError;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Sessions listed by `cinder sessions`.
pub const SESSION_LIST_LIMIT: usize = 50;

/// A session with its fused records, as printed by `cinder results --json`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResults {
    pub session: SearchSession,
    pub records: Vec<ResultRecord>,
}

pub async fn load_results(store: &dyn Store, session_id: &str) -> Result<SessionResults> {
    let session = store
        .get_session(session_id)
        .await?
        .ok_or_else(|| SearchError::SessionNotFound(session_id.to_string()))?;
    let records = store.results_for_session(session_id).await?;
    Ok(SessionResults { session, records })
}

fn fmt_opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn record_line(record: &ResultRecord) -> String {
    let mut line = format!(
        "{}  {}  gene={}  uniprot={}",
        record.analysis_group,
        record.primary_id,
        fmt_opt(&record.gene_name),
        fmt_opt(&record.uniprot_id),
    );
    if let Some(label) = &record.comparison_label {
        line.push_str(&format!(
            "  [{}] log2fc={}  -log10p={}",
            label,
            record.log2_fc.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".into()),
            record.neg_log10_p.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".into()),
        ));
    }
    if let Some(copy_number) = record.copy_number {
        line.push_str(&format!("  copies={}", copy_number));
    }
    if let Some(rank) = record.rank {
        line.push_str(&format!("  rank={}", rank));
    }
    if let Some(samples) = &record.samples {
        line.push_str(&format!("  samples={}", samples.len()));
    }
    if let Some(ptm) = &record.ptm {
        line.push_str(&format!("  site={}", fmt_opt(&ptm.position_in_protein)));
    }
    if !record.search_terms.is_empty() {
        line.push_str(&format!("  terms={}", record.search_terms.join(",")));
    }
    line
}

pub async fn run_results(config: &Config, session_id: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);

    let outcome = load_results(&store, session_id).await;
    store.pool().close().await;
    let results = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    let session = &results.session;
    println!("session {}", session.id);
    println!("  expression: {}", session.expression);
    println!("  state: {}", session.state);
    if let Some(error) = &session.error {
        println!("  error: {}", error);
    }
    println!("  records: {}", results.records.len());
    if results.records.is_empty() {
        println!();
        println!("No results.");
        return Ok(());
    }
    println!();
    for record in &results.records {
        println!("{}", record_line(record));
    }
    Ok(())
}

pub async fn run_sessions(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);

    let outcome = store.list_sessions(SESSION_LIST_LIMIT).await;
    store.pool().close().await;
    let sessions = outcome?;

    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    println!(
        "{:<36}  {:<11}  {:<20}  EXPRESSION",
        "ID", "STATE", "CREATED"
    );
    for session in &sessions {
        println!(
            "{:<36}  {:<11}  {:<20}  {}",
            session.id,
            session.state.as_str(),
            session.created_at.format("%Y-%m-%d %H:%M:%S"),
            session.expression
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_search_core::models::PtmSite;
    use cinder_search_core::store::memory::InMemoryStore;

    fn record() -> ResultRecord {
        ResultRecord {
            id: "r1".into(),
            session_id: "s1".into(),
            analysis_group: "g1".into(),
            document_id: "diff".into(),
            primary_id: "P1".into(),
            gene_name: Some("BRCA1".into()),
            uniprot_id: None,
            comparison_label: Some("KO/WT".into()),
            condition_a: None,
            condition_b: None,
            log2_fc: Some(1.2),
            neg_log10_p: Some(2.0),
            samples: None,
            copy_number: None,
            rank: Some(4),
            ptm: Some(PtmSite {
                position_in_protein: Some("S15".into()),
                ..PtmSite::default()
            }),
            search_terms: vec!["brca1".into()],
        }
    }

    #[test]
    fn record_line_shows_present_fields() {
        let line = record_line(&record());
        assert_eq!(
            line,
            "g1  P1  gene=BRCA1  uniprot=-  [KO/WT] log2fc=1.200  -log10p=2.000  rank=4  site=S15  terms=brca1"
        );
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let store = InMemoryStore::new();
        let err = load_results(&store, "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "session nope not found");
    }
}
