//! Search sessions from the command line (`cinder search`).
//!
//! Builds a [`SearchSession`] from the configured defaults and the command
//! line overrides, persists it as pending, and hands it to the core
//! [`SearchEngine`] backed by [`SqliteStore`]. Ctrl-C cancels the running
//! session, which then ends in the `failed` state with nothing persisted.

use anyhow::{Context, Result};

use cinder_search_core::models::{FileCategory, SearchMode, SearchScope, SearchSession};
use cinder_search_core::store::Store;
use cinder_search_core::{CancelToken, SearchEngine, SessionReport};

use crate::config::Config;
use crate::db;
use crate::line_search::build_line_search;
use crate::migrate;
use crate::progress::ProgressMode;
use crate::sqlite_store::SqliteStore;

/// Command line overrides for a single search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub fold_change_cutoff: Option<f64>,
    pub p_value_cutoff: Option<f64>,
    pub mode: Option<SearchMode>,
    pub groups: Vec<String>,
    pub species: Option<String>,
    pub categories: Vec<FileCategory>,
    pub channel: Option<String>,
    pub progress: ProgressMode,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            fold_change_cutoff: None,
            p_value_cutoff: None,
            mode: None,
            groups: Vec::new(),
            species: None,
            categories: Vec::new(),
            channel: None,
            progress: ProgressMode::Off,
        }
    }
}

/// A pending session with config defaults overridden by `options`.
pub fn build_session(config: &Config, expression: &str, options: &SearchOptions) -> SearchSession {
    let categories = if options.categories.is_empty() {
        config.search.categories.clone()
    } else {
        options.categories.clone()
    };
    let scope = SearchScope {
        analysis_groups: options.groups.clone(),
        species: options.species.clone(),
        categories,
    };

    let session = SearchSession::new(expression.trim())
        .with_cutoffs(
            options
                .fold_change_cutoff
                .unwrap_or(config.search.fold_change_cutoff),
            options.p_value_cutoff.unwrap_or(config.search.p_value_cutoff),
        )
        .with_mode(options.mode.unwrap_or(config.search.mode))
        .with_scope(scope);

    match &options.channel {
        Some(channel) => session.with_channel(channel.clone()),
        None => session,
    }
}

/// Create and run one session against an open store.
pub async fn execute_search(
    config: &Config,
    store: &SqliteStore,
    session: &mut SearchSession,
    progress: ProgressMode,
    cancel: &CancelToken,
) -> Result<SessionReport> {
    let line_search = build_line_search(&config.line_search)?;
    let reporter = progress.reporter();

    store
        .create_session(session)
        .await
        .with_context(|| format!("Failed to create session {}", session.id))?;

    let engine = SearchEngine::new(store, store, line_search.as_ref())
        .with_progress(reporter.as_ref())
        .with_context_window(config.search.context_window);

    let report = engine.run(session, cancel).await?;
    Ok(report)
}

pub async fn run_search(config: &Config, expression: &str, options: SearchOptions) -> Result<()> {
    if let Some(fc) = options.fold_change_cutoff {
        anyhow::ensure!(fc.is_finite() && fc >= 0.0, "--fc must be a non-negative number");
    }
    if let Some(p) = options.p_value_cutoff {
        anyhow::ensure!(p.is_finite() && p >= 0.0, "--p must be a non-negative number");
    }

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);

    let mut session = build_session(config, expression, &options);
    println!("search {}", session.id);

    let cancel = CancelToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = execute_search(config, &store, &mut session, options.progress, &cancel).await;
    watcher.abort();
    store.pool().close().await;

    let report = outcome.with_context(|| format!("search {} failed", session.id))?;
    println!("  expression: {}", session.expression);
    println!("  mode: {}", session.mode.as_str());
    println!("  found files: {}", report.found_files);
    println!("  anchor files: {}", report.anchors);
    if report.found_terms.is_empty() {
        println!("  found terms: (none)");
    } else {
        println!("  found terms: {}", report.found_terms.join(", "));
    }
    println!("  records: {}", report.records);
    println!("ok");
    Ok(())
}
