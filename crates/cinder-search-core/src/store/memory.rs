//! In-memory [`Store`] and [`FullTextIndex`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Full-text search tokenizes content on non-word characters and highlights
//! every token equal to a query token. There is no stemming.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::highlight::{HIGHLIGHT_START, HIGHLIGHT_STOP};
use crate::models::{
    AnalysisGroup, ResultRecord, SearchScope, SearchSession, SessionState, SourceDocument,
};
use crate::terms::split_alternatives;

use super::{Candidate, FullTextIndex, Store};

struct StoredDoc {
    doc: SourceDocument,
    content: String,
}

#[derive(Default)]
struct SessionTables {
    sessions: HashMap<String, SearchSession>,
    results: HashMap<String, Vec<ResultRecord>>,
}

/// In-memory store for tests and embedding.
pub struct InMemoryStore {
    groups: RwLock<Vec<AnalysisGroup>>,
    docs: RwLock<Vec<StoredDoc>>,
    sessions: RwLock<SessionTables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(Vec::new()),
            docs: RwLock::new(Vec::new()),
            sessions: RwLock::new(SessionTables::default()),
        }
    }

    pub fn add_group(&self, group: AnalysisGroup) {
        let mut groups = self.groups.write().unwrap();
        groups.retain(|g| g.id != group.id);
        groups.push(group);
    }

    /// Catalog a document with explicit indexed content.
    pub fn add_document(&self, doc: SourceDocument, content: impl Into<String>) {
        let mut docs = self.docs.write().unwrap();
        docs.retain(|d| d.doc.id != doc.id);
        docs.push(StoredDoc {
            doc,
            content: content.into(),
        });
    }

    /// Catalog a document, indexing the file it points to.
    pub fn load_document(&self, doc: SourceDocument) -> Result<()> {
        let content = std::fs::read_to_string(&doc.path)
            .with_context(|| format!("Failed to read document: {}", doc.path.display()))?;
        self.add_document(doc, content);
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lowercase word tokens of `text`.
fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !is_word_char(c))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Wrap every word token of `line` found in `wanted` with highlight markers.
/// Returns `None` when nothing was highlighted.
fn highlight_line(line: &str, wanted: &HashSet<String>) -> Option<String> {
    let mut out = String::with_capacity(line.len() + 16);
    let mut hit = false;
    let mut token_start: Option<usize> = None;
    let flush = |out: &mut String, token: &str, hit: &mut bool| {
        if wanted.contains(&token.to_lowercase()) {
            out.push_str(HIGHLIGHT_START);
            out.push_str(token);
            out.push_str(HIGHLIGHT_STOP);
            *hit = true;
        } else {
            out.push_str(token);
        }
    };
    for (i, c) in line.char_indices() {
        if is_word_char(c) {
            token_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = token_start.take() {
            flush(&mut out, &line[start..i], &mut hit);
        }
        out.push(c);
    }
    if let Some(start) = token_start {
        flush(&mut out, &line[start..], &mut hit);
    }
    hit.then_some(out)
}

#[async_trait]
impl Store for InMemoryStore {
    async fn groups(&self) -> Result<Vec<AnalysisGroup>> {
        Ok(self.groups.read().unwrap().clone())
    }

    async fn documents(&self) -> Result<Vec<SourceDocument>> {
        Ok(self
            .docs
            .read()
            .unwrap()
            .iter()
            .map(|d| d.doc.clone())
            .collect())
    }

    async fn group_documents(&self, analysis_group: &str) -> Result<Vec<SourceDocument>> {
        Ok(self
            .docs
            .read()
            .unwrap()
            .iter()
            .filter(|d| d.doc.analysis_group == analysis_group)
            .map(|d| d.doc.clone())
            .collect())
    }

    async fn create_session(&self, session: &SearchSession) -> Result<()> {
        let mut tables = self.sessions.write().unwrap();
        if tables.sessions.contains_key(&session.id) {
            anyhow::bail!("session {} already exists", session.id);
        }
        tables.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<SearchSession>> {
        Ok(self.sessions.read().unwrap().sessions.get(id).cloned())
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SearchSession>> {
        let tables = self.sessions.read().unwrap();
        let mut sessions: Vec<SearchSession> = tables.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn update_session(&self, session: &SearchSession) -> Result<()> {
        let mut tables = self.sessions.write().unwrap();
        tables
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn complete_session(
        &self,
        session: &SearchSession,
        records: &[ResultRecord],
    ) -> Result<()> {
        if session.state != SessionState::Completed {
            anyhow::bail!("session {} is {}, not completed", session.id, session.state);
        }
        let mut tables = self.sessions.write().unwrap();
        tables
            .sessions
            .insert(session.id.clone(), session.clone());
        tables.results.insert(session.id.clone(), records.to_vec());
        Ok(())
    }

    async fn fail_session(&self, session: &SearchSession) -> Result<()> {
        let mut tables = self.sessions.write().unwrap();
        tables
            .sessions
            .insert(session.id.clone(), session.clone());
        tables.results.remove(&session.id);
        Ok(())
    }

    async fn results_for_session(&self, session_id: &str) -> Result<Vec<ResultRecord>> {
        Ok(self
            .sessions
            .read()
            .unwrap()
            .results
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl FullTextIndex for InMemoryStore {
    async fn find_candidates(
        &self,
        expression: &str,
        scope: &SearchScope,
    ) -> Result<Vec<Candidate>> {
        let term_tokens: Vec<Vec<String>> = split_alternatives(expression)
            .iter()
            .map(|t| tokens(t))
            .filter(|t| !t.is_empty())
            .collect();
        if term_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: HashSet<String> = term_tokens.iter().flatten().cloned().collect();
        let in_scope: HashSet<String> = self
            .documents_in_scope(scope)
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();

        let docs = self.docs.read().unwrap();
        let mut candidates = Vec::new();
        for stored in docs.iter().filter(|d| in_scope.contains(&d.doc.id)) {
            let present: HashSet<String> = tokens(&stored.content).into_iter().collect();
            let matched = term_tokens
                .iter()
                .any(|term| term.iter().all(|t| present.contains(t)));
            if !matched {
                continue;
            }
            let snippets: Vec<String> = stored
                .content
                .lines()
                .filter_map(|line| highlight_line(line, &wanted))
                .collect();
            candidates.push(Candidate {
                document_id: stored.doc.id.clone(),
                snippets,
            });
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnRoles, FileCategory, FileType};
    use std::path::PathBuf;

    fn doc(id: &str, group: &str, category: FileCategory) -> SourceDocument {
        SourceDocument {
            id: id.into(),
            analysis_group: group.into(),
            path: PathBuf::from(format!("{}.csv", id)),
            category,
            file_type: FileType::Csv,
            columns: ColumnRoles::default(),
            comparisons: Vec::new(),
            samples: Vec::new(),
        }
    }

    #[test]
    fn highlights_every_matching_token() {
        let wanted: HashSet<String> = ["receptor", "binding"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            highlight_line("P1,Receptor-binding,x", &wanted).unwrap(),
            "P1,<b>Receptor</b>-<b>binding</b>,x"
        );
        assert!(highlight_line("nothing here", &wanted).is_none());
    }

    #[tokio::test]
    async fn candidates_respect_scope_and_all_tokens() {
        let store = InMemoryStore::new();
        store.add_group(AnalysisGroup {
            id: "g".into(),
            name: "G".into(),
            kind: "proteomics".into(),
            species: Some("human".into()),
        });
        store.add_document(
            doc("a", "g", FileCategory::Differential),
            "ID,Gene\nP1,BRCA1\n",
        );
        store.add_document(doc("b", "g", FileCategory::CopyNumber), "ID,Gene\nP1,BRCA1\n");
        store.add_document(doc("c", "g", FileCategory::Searched), "ID\nreceptor only\n");

        let found = store
            .find_candidates("brca1 or receptor-binding", &SearchScope::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].document_id, "a");
        assert_eq!(found[0].snippets, vec!["P1,<b>BRCA1</b>".to_string()]);

        let scope = SearchScope {
            species: Some("mouse".into()),
            ..Default::default()
        };
        assert!(store.find_candidates("brca1", &scope).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completion_and_failure_replace_state_atomically() {
        let store = InMemoryStore::new();
        let mut session = SearchSession::new("x");
        store.create_session(&session).await.unwrap();
        assert!(store.create_session(&session).await.is_err());

        session.start().unwrap();
        assert!(store.complete_session(&session, &[]).await.is_err());
        session.complete().unwrap();
        store.complete_session(&session, &[]).await.unwrap();
        let loaded = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, SessionState::Completed);

        let mut other = SearchSession::new("y");
        store.create_session(&other).await.unwrap();
        other.fail("bad column").unwrap();
        store.fail_session(&other).await.unwrap();
        assert!(store.results_for_session(&other.id).await.unwrap().is_empty());
        assert_eq!(store.list_sessions(10).await.unwrap().len(), 2);
    }
}
