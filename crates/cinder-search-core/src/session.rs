//! Search session orchestration.
//!
//! [`SearchEngine::run`] drives one [`SearchSession`] through
//! `Pending → InProgress → {Completed | Failed}`:
//!
//! 1. Persist the running state and emit `started`.
//! 2. Normalize the expression, ask the full-text index for candidate
//!    documents, and confirm terms in their snippets.
//! 3. For each anchor document: locate rows, extract, merge, then correlate
//!    the rest of its analysis group by primary id.
//! 4. Persist the completed session together with every record.
//!
//! Any error fails the session with nothing persisted and an `error` event.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SearchError};
use crate::extract::{matches_mode, Extractor};
use crate::fusion::{Correlator, ResultIndex};
use crate::highlight::{disambiguate_all, DEFAULT_CONTEXT_WINDOW};
use crate::models::{SearchSession, SourceDocument, TermContexts};
use crate::progress::{channel_group, NoProgress, ProgressReporter, SearchProgressEvent};
use crate::rows::{locate_rows, read_header, LineSearch};
use crate::store::{FullTextIndex, Store};
use crate::terms::split_terms;

static NO_PROGRESS: NoProgress = NoProgress;

/// Cooperative cancellation flag, checked between documents.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of a completed session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    /// Candidate documents returned by the full-text index.
    pub found_files: usize,
    /// Documents with at least one confirmed term.
    pub anchors: usize,
    pub found_terms: Vec<String>,
    pub records: usize,
}

/// Runs search sessions against a set of collaborators.
pub struct SearchEngine<'a> {
    store: &'a dyn Store,
    index: &'a dyn FullTextIndex,
    line_search: &'a dyn LineSearch,
    progress: &'a dyn ProgressReporter,
    context_window: usize,
}

impl<'a> SearchEngine<'a> {
    pub fn new(
        store: &'a dyn Store,
        index: &'a dyn FullTextIndex,
        line_search: &'a dyn LineSearch,
    ) -> Self {
        Self {
            store,
            index,
            line_search,
            progress: &NO_PROGRESS,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_context_window(mut self, window: usize) -> Self {
        self.context_window = window;
        self
    }

    /// Run a pending session to completion or failure.
    ///
    /// On failure the session is left in the `Failed` state, persisted without
    /// records, and the error is returned.
    pub async fn run(
        &self,
        session: &mut SearchSession,
        cancel: &CancelToken,
    ) -> Result<SessionReport> {
        let group = channel_group(session);
        session.start()?;
        self.progress
            .report(&group, &SearchProgressEvent::started(&session.id));

        let outcome = match self.store.update_session(session).await {
            Ok(()) => self.execute(session, cancel, &group).await,
            Err(e) => Err(SearchError::from(e)),
        };
        let outcome = match outcome {
            Ok((index, report)) => self.finish(session, index, report).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(report) => {
                self.progress
                    .report(&group, &SearchProgressEvent::complete(&session.id));
                info!(
                    session = %session.id,
                    found_files = report.found_files,
                    records = report.records,
                    "search session completed"
                );
                Ok(report)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(session = %session.id, error = %message, "search session failed");
                if session.fail(message.clone()).is_ok() {
                    if let Err(store_err) = self.store.fail_session(session).await {
                        warn!(session = %session.id, error = %store_err, "could not persist failed session");
                    }
                }
                self.progress
                    .report(&group, &SearchProgressEvent::error(&session.id, message));
                Err(e)
            }
        }
    }

    async fn finish(
        &self,
        session: &mut SearchSession,
        index: ResultIndex,
        mut report: SessionReport,
    ) -> Result<SessionReport> {
        let mut done = session.clone();
        done.complete()?;
        let records = index.records(&done.id);
        self.store.complete_session(&done, &records).await?;
        *session = done;
        report.records = records.len();
        Ok(report)
    }

    async fn execute(
        &self,
        session: &mut SearchSession,
        cancel: &CancelToken,
        group: &str,
    ) -> Result<(ResultIndex, SessionReport)> {
        let mut report = SessionReport {
            session_id: session.id.clone(),
            ..Default::default()
        };
        let mut index = ResultIndex::new();

        let prefixes = split_terms(&session.expression);
        if prefixes.is_empty() {
            debug!(session = %session.id, "empty expression");
            self.progress
                .report(group, &SearchProgressEvent::in_progress(&session.id, 0, 0));
            return Ok((index, report));
        }

        let in_scope = self.store.documents_in_scope(&session.scope).await?;
        let by_id: HashMap<&str, &SourceDocument> =
            in_scope.iter().map(|d| (d.id.as_str(), d)).collect();
        let candidates = self
            .index
            .find_candidates(&session.expression, &session.scope)
            .await?;

        let mut anchors: Vec<(&SourceDocument, TermContexts)> = Vec::new();
        for candidate in &candidates {
            let Some(doc) = by_id.get(candidate.document_id.as_str()) else {
                continue;
            };
            report.found_files += 1;
            let contexts = disambiguate_all(&candidate.snippets, &prefixes, self.context_window);
            for term in contexts.keys() {
                if !report.found_terms.contains(term) {
                    report.found_terms.push(term.clone());
                }
            }
            if !contexts.is_empty() {
                anchors.push((*doc, contexts));
            }
        }
        report.anchors = anchors.len();
        session.found_terms = report.found_terms.clone();
        self.progress.report(
            group,
            &SearchProgressEvent::in_progress(&session.id, report.found_files, 0),
        );

        let extractor = Extractor::for_session(session);
        let correlator = Correlator::new(&extractor);
        for (position, (anchor, contexts)) in anchors.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            self.progress.report(
                group,
                &SearchProgressEvent::in_progress(&session.id, report.found_files, position + 1),
            );
            if anchor.delimiter().is_none() {
                warn!(document = %anchor.id, file_type = anchor.file_type.as_str(), "unsupported file type, skipping");
                continue;
            }

            let terms: Vec<String> = contexts.keys().cloned().collect();
            let header = read_header(anchor)?;
            let rows = locate_rows(anchor, &terms, self.line_search).await?;
            debug!(document = %anchor.id, rows = rows.len(), provider = self.line_search.name(), "located rows");

            let mut primary_ids = BTreeSet::new();
            for row in &rows {
                for partial in extractor.extract(anchor, &header, &row.fields)? {
                    if !matches_mode(session.mode, &row.term, &partial) {
                        continue;
                    }
                    if let Some(pid) = partial.primary_id.clone() {
                        if index.merge(anchor, partial, Some(&row.term)) {
                            primary_ids.insert(pid);
                        }
                    }
                }
            }

            let group_docs = self.store.group_documents(&anchor.analysis_group).await?;
            correlator.correlate(anchor, &group_docs, &primary_ids, &mut index)?;
        }
        Ok((index, report))
    }
}
