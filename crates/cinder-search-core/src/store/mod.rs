//! Storage and full-text abstractions for Cinder Search.
//!
//! The [`Store`] trait covers the catalog (analysis groups and documents),
//! search sessions, and persisted result records. [`FullTextIndex`] is the
//! candidate locator: it returns the documents whose content matches an
//! expression, each with highlighted snippets.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AnalysisGroup, ResultRecord, SearchScope, SearchSession, SourceDocument};

/// A document whose indexed content matched an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub document_id: String,
    /// Snippets with every match wrapped in highlight markers.
    pub snippets: Vec<String>,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`groups`](Store::groups) | All analysis groups |
/// | [`documents`](Store::documents) | All catalogued documents |
/// | [`group_documents`](Store::group_documents) | Documents of one group |
/// | [`create_session`](Store::create_session) | Insert a new session |
/// | [`update_session`](Store::update_session) | Persist state and found terms |
/// | [`complete_session`](Store::complete_session) | Completed state and records in one write |
/// | [`fail_session`](Store::fail_session) | Failed state, no records |
/// | [`results_for_session`](Store::results_for_session) | Records of a completed session |
#[async_trait]
pub trait Store: Send + Sync {
    async fn groups(&self) -> Result<Vec<AnalysisGroup>>;

    async fn documents(&self) -> Result<Vec<SourceDocument>>;

    async fn group_documents(&self, analysis_group: &str) -> Result<Vec<SourceDocument>>;

    async fn create_session(&self, session: &SearchSession) -> Result<()>;

    async fn get_session(&self, id: &str) -> Result<Option<SearchSession>>;

    /// Most recent sessions first.
    async fn list_sessions(&self, limit: usize) -> Result<Vec<SearchSession>>;

    async fn update_session(&self, session: &SearchSession) -> Result<()>;

    /// Store the completed session and its records together.
    ///
    /// Readers never observe the completed state without the records, nor
    /// records of a session that is not completed.
    async fn complete_session(&self, session: &SearchSession, records: &[ResultRecord])
        -> Result<()>;

    /// Store the failed session. Any records of the session are removed.
    async fn fail_session(&self, session: &SearchSession) -> Result<()>;

    async fn results_for_session(&self, session_id: &str) -> Result<Vec<ResultRecord>>;

    /// Documents inside a search scope.
    async fn documents_in_scope(&self, scope: &SearchScope) -> Result<Vec<SourceDocument>> {
        let species: HashMap<String, Option<String>> = self
            .groups()
            .await?
            .into_iter()
            .map(|g| (g.id, g.species))
            .collect();
        Ok(self
            .documents()
            .await?
            .into_iter()
            .filter(|doc| {
                let sp = species.get(&doc.analysis_group).and_then(|s| s.as_deref());
                scope.includes(doc, sp)
            })
            .collect())
    }
}

/// Full-text candidate locator.
#[async_trait]
pub trait FullTextIndex: Send + Sync {
    /// Documents in `scope` whose content matches any term of `expression`.
    async fn find_candidates(&self, expression: &str, scope: &SearchScope)
        -> Result<Vec<Candidate>>;
}
