//! Configuration parsing and validation.
//!
//! Cinder Search is configured by a single TOML file. Besides the database
//! location and search defaults it carries the document catalog: analysis
//! groups and the delimited files that belong to them, with their column
//! roles, comparison definitions, and sample maps.
//!
//! ```toml
//! [db]
//! path = "./data/cinder.sqlite"
//!
//! [search]
//! fold_change_cutoff = 0.6
//! p_value_cutoff = 1.31
//!
//! [line_search]
//! provider = "scan"
//!
//! [[groups]]
//! id = "ko-vs-wt"
//! species = "human"
//!
//! [[documents]]
//! id = "ko-diff"
//! group = "ko-vs-wt"
//! path = "files/diff.tsv"
//! category = "differential"
//! columns = { primary_id_col = "Protein" }
//! comparisons = [{ fold_change_col = "log2FC", p_value_col = "p", comparison_label = "KO/WT" }]
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use cinder_search_core::highlight::DEFAULT_CONTEXT_WINDOW;
use cinder_search_core::models::{
    default_categories, AnalysisGroup, ColumnRoles, ComparisonSpec, FileCategory, FileType,
    SampleMap, SearchMode, SourceDocument, DEFAULT_FOLD_CHANGE_CUTOFF, DEFAULT_P_VALUE_CUTOFF,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub line_search: LineSearchConfig,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub documents: Vec<DocumentConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_fold_change_cutoff")]
    pub fold_change_cutoff: f64,
    #[serde(default = "default_p_value_cutoff")]
    pub p_value_cutoff: f64,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default = "default_categories")]
    pub categories: Vec<FileCategory>,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fold_change_cutoff: DEFAULT_FOLD_CHANGE_CUTOFF,
            p_value_cutoff: DEFAULT_P_VALUE_CUTOFF,
            mode: SearchMode::Full,
            categories: default_categories(),
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

fn default_fold_change_cutoff() -> f64 {
    DEFAULT_FOLD_CHANGE_CUTOFF
}
fn default_p_value_cutoff() -> f64 {
    DEFAULT_P_VALUE_CUTOFF
}
fn default_context_window() -> usize {
    DEFAULT_CONTEXT_WINDOW
}

#[derive(Debug, Deserialize, Clone)]
pub struct LineSearchConfig {
    /// `scan` (in-process) or `command` (external program).
    #[serde(default = "default_line_search_provider")]
    pub provider: String,
    #[serde(default)]
    pub command: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            provider: default_line_search_provider(),
            command: None,
            args: Vec::new(),
        }
    }
}

fn default_line_search_provider() -> String {
    "scan".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_group_kind")]
    pub kind: String,
    #[serde(default)]
    pub species: Option<String>,
}

fn default_group_kind() -> String {
    "proteomics".to_string()
}

impl GroupConfig {
    pub fn to_group(&self) -> AnalysisGroup {
        AnalysisGroup {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            kind: self.kind.clone(),
            species: self.species.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentConfig {
    pub id: String,
    pub group: String,
    pub path: PathBuf,
    #[serde(default)]
    pub category: FileCategory,
    /// Inferred from the extension when omitted.
    #[serde(default)]
    pub file_type: Option<FileType>,
    #[serde(default)]
    pub columns: ColumnRoles,
    #[serde(default)]
    pub comparisons: Vec<ComparisonSpec>,
    #[serde(default)]
    pub samples: SampleMap,
}

impl DocumentConfig {
    pub fn to_document(&self) -> SourceDocument {
        SourceDocument {
            id: self.id.clone(),
            analysis_group: self.group.clone(),
            path: self.path.clone(),
            category: self.category,
            file_type: self
                .file_type
                .unwrap_or_else(|| FileType::from_path(&self.path)),
            columns: self.columns.clone(),
            comparisons: self.comparisons.clone(),
            samples: self.samples.clone(),
        }
    }
}

impl Config {
    pub fn analysis_groups(&self) -> Vec<AnalysisGroup> {
        self.groups.iter().map(GroupConfig::to_group).collect()
    }

    pub fn source_documents(&self) -> Vec<SourceDocument> {
        self.documents.iter().map(DocumentConfig::to_document).collect()
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.db.path = resolve(base, &config.db.path);
    for doc in &mut config.documents {
        doc.path = resolve(base, &doc.path);
    }
    if let Some(cmd) = &config.line_search.command {
        if cmd.components().count() > 1 {
            config.line_search.command = Some(resolve(base, cmd));
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate search
    let search = &config.search;
    if !search.fold_change_cutoff.is_finite() || search.fold_change_cutoff < 0.0 {
        bail!("search.fold_change_cutoff must be a finite number >= 0");
    }
    if !search.p_value_cutoff.is_finite() || search.p_value_cutoff < 0.0 {
        bail!("search.p_value_cutoff must be a finite number >= 0");
    }
    if search.context_window == 0 {
        bail!("search.context_window must be > 0");
    }

    // Validate line search
    match config.line_search.provider.as_str() {
        "scan" => {}
        "command" => {
            if config.line_search.command.is_none() {
                bail!("line_search.command must be specified when provider is 'command'");
            }
        }
        other => bail!(
            "Unknown line_search provider: '{}'. Must be scan or command.",
            other
        ),
    }

    // Validate catalog
    let mut group_ids = HashSet::new();
    for group in &config.groups {
        if group.id.trim().is_empty() {
            bail!("groups: id must not be empty");
        }
        if !group_ids.insert(group.id.as_str()) {
            bail!("groups: duplicate id '{}'", group.id);
        }
    }
    let mut doc_ids = HashSet::new();
    for doc in &config.documents {
        if doc.id.trim().is_empty() {
            bail!("documents: id must not be empty");
        }
        if !doc_ids.insert(doc.id.as_str()) {
            bail!("documents: duplicate id '{}'", doc.id);
        }
        if !group_ids.contains(doc.group.as_str()) {
            bail!(
                "documents.{}: group '{}' is not declared in [[groups]]",
                doc.id,
                doc.group
            );
        }
        if doc.category == FileCategory::Differential && doc.comparisons.is_empty() {
            bail!(
                "documents.{}: differential documents need at least one comparison",
                doc.id
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_search_core::models::PValueScale;

    fn write(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("cinder.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn parses_catalog_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"
[db]
path = "data/cinder.sqlite"

[[groups]]
id = "g1"
species = "human"

[[documents]]
id = "diff"
group = "g1"
path = "files/diff.tsv"
category = "df"
columns = { primary_id_col = "ID", gene_name_col = "Gene" }
comparisons = [{ fold_change_col = "FC", p_value_col = "P", comparison_label = "1", condition_A = "KO", condition_B = "WT", p_value_scale = "raw" }]

[[documents]]
id = "searched"
group = "g1"
path = "/abs/searched.csv"
category = "searched"
samples = [{ Sample = "S1", Condition = "ctrl" }]
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.db.path, dir.path().join("data/cinder.sqlite"));
        assert_eq!(cfg.search.fold_change_cutoff, 0.6);
        assert_eq!(cfg.search.p_value_cutoff, 1.31);
        assert_eq!(cfg.line_search.provider, "scan");

        let docs = cfg.source_documents();
        assert_eq!(docs[0].path, dir.path().join("files/diff.tsv"));
        assert_eq!(docs[0].file_type, FileType::Tsv);
        assert_eq!(docs[0].category, FileCategory::Differential);
        assert_eq!(docs[0].comparisons[0].condition_a, "KO");
        assert_eq!(docs[0].comparisons[0].p_value_scale, PValueScale::Raw);
        assert_eq!(docs[1].path, PathBuf::from("/abs/searched.csv"));
        assert_eq!(docs[1].samples[0].condition, "ctrl");
        assert_eq!(cfg.analysis_groups()[0].name, "g1");
    }

    #[test]
    fn rejects_undeclared_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"
[db]
path = "x.sqlite"

[[documents]]
id = "d"
group = "missing"
path = "d.csv"
"#,
        );
        let err = load_config(&path).unwrap_err().to_string();
        assert!(err.contains("missing"), "{}", err);
    }

    #[test]
    fn command_provider_needs_a_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"
[db]
path = "x.sqlite"

[line_search]
provider = "command"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_negative_cutoffs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"
[db]
path = "x.sqlite"

[search]
fold_change_cutoff = -1.0
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
