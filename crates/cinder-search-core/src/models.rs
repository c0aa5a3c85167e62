//! Core data models used throughout Cinder Search.
//!
//! Documents, comparison definitions, and sample maps describe the read-only
//! inputs of a search; [`SearchSession`] and [`ResultRecord`] are what a
//! search produces.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Default minimum absolute log2 fold-change.
pub const DEFAULT_FOLD_CHANGE_CUTOFF: f64 = 0.6;
/// Default minimum -log10 p-value (p <= ~0.049).
pub const DEFAULT_P_VALUE_CUTOFF: f64 = 1.31;

/// What kind of data a delimited file carries. Selects the extraction rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    /// Search engine output with per-sample intensities.
    Searched,
    /// Differential analysis with fold-change / p-value comparisons.
    #[serde(alias = "df")]
    Differential,
    CopyNumber,
    Raw,
    #[default]
    Other,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Searched => "searched",
            FileCategory::Differential => "differential",
            FileCategory::CopyNumber => "copy_number",
            FileCategory::Raw => "raw",
            FileCategory::Other => "other",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "searched" => Ok(FileCategory::Searched),
            "differential" | "df" => Ok(FileCategory::Differential),
            "copy_number" | "copy-number" => Ok(FileCategory::CopyNumber),
            "raw" => Ok(FileCategory::Raw),
            "other" => Ok(FileCategory::Other),
            other => Err(format!(
                "unknown file category '{}'. Use searched, differential, copy_number, raw, or other.",
                other
            )),
        }
    }
}

/// On-disk format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Csv,
    Tsv,
    Txt,
    #[default]
    Other,
}

impl FileType {
    /// Field delimiter, or `None` when rows of this type cannot be parsed.
    pub fn delimiter(&self) -> Option<u8> {
        match self {
            FileType::Csv => Some(b','),
            FileType::Tsv | FileType::Txt => Some(b'\t'),
            FileType::Other => None,
        }
    }

    /// Infer the type from a file extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => FileType::Csv,
            Some("tsv") => FileType::Tsv,
            Some("txt") => FileType::Txt,
            _ => FileType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Tsv => "tsv",
            FileType::Txt => "txt",
            FileType::Other => "other",
        }
    }
}

/// Named column roles of a document, as declared by its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    PrimaryId,
    GeneName,
    UniprotId,
    CopyNumber,
    Rank,
    PeptideSequence,
    PositionInPeptide,
    PositionInProtein,
    LocalizationProbability,
}

/// Column-role map supplied with every document.
///
/// Missing roles and roles set to an empty string are treated the same:
/// the corresponding field is never populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnRoles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_id_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_name_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniprot_id_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_number_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peptide_seq_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_position_in_peptide_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_position_in_protein_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localization_prob_col: Option<String>,
}

impl ColumnRoles {
    /// Column name declared for `role`, if any.
    pub fn get(&self, role: ColumnRole) -> Option<&str> {
        let value = match role {
            ColumnRole::PrimaryId => &self.primary_id_col,
            ColumnRole::GeneName => &self.gene_name_col,
            ColumnRole::UniprotId => &self.uniprot_id_col,
            ColumnRole::CopyNumber => &self.copy_number_col,
            ColumnRole::Rank => &self.rank_col,
            ColumnRole::PeptideSequence => &self.peptide_seq_col,
            ColumnRole::PositionInPeptide => &self.modification_position_in_peptide_col,
            ColumnRole::PositionInProtein => &self.modification_position_in_protein_col,
            ColumnRole::LocalizationProbability => &self.localization_prob_col,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }
}

/// How the p-value column of a comparison is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PValueScale {
    /// Already -log10 transformed.
    #[default]
    NegLog10,
    /// Plain p-value in (0, 1].
    Raw,
}

/// One fold-change / p-value comparison inside a differential file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSpec {
    pub fold_change_col: String,
    pub p_value_col: String,
    /// Column whose cell names the comparison of each row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_col: Option<String>,
    #[serde(default)]
    pub comparison_label: String,
    #[serde(default, alias = "condition_A")]
    pub condition_a: String,
    #[serde(default, alias = "condition_B")]
    pub condition_b: String,
    #[serde(default)]
    pub p_value_scale: PValueScale,
}

impl ComparisonSpec {
    /// Convert a p-value cell into -log10 space according to the declared scale.
    pub fn neg_log10_p(&self, cell: f64) -> f64 {
        match self.p_value_scale {
            PValueScale::NegLog10 => cell,
            PValueScale::Raw => -cell.log10(),
        }
    }
}

/// Assignment of one sample column to an experimental condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCondition {
    #[serde(alias = "Sample")]
    pub sample: String,
    #[serde(alias = "Condition")]
    pub condition: String,
}

/// Ordered sample → condition assignments of a searched or raw file.
pub type SampleMap = Vec<SampleCondition>;

/// A delimited data file belonging to an analysis group. Read-only during a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub analysis_group: String,
    pub path: PathBuf,
    #[serde(default)]
    pub category: FileCategory,
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default)]
    pub columns: ColumnRoles,
    #[serde(default)]
    pub comparisons: Vec<ComparisonSpec>,
    #[serde(default)]
    pub samples: SampleMap,
}

impl SourceDocument {
    pub fn delimiter(&self) -> Option<u8> {
        self.file_type.delimiter()
    }
}

/// Scoping unit for a set of related documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_group_kind")]
    pub kind: String,
    #[serde(default)]
    pub species: Option<String>,
}

fn default_group_kind() -> String {
    "proteomics".to_string()
}

/// Which cell a confirmed term must appear in for an anchor row to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Full,
    Gene,
    Uniprot,
    #[serde(alias = "pi")]
    PrimaryId,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Full => "full",
            SearchMode::Gene => "gene",
            SearchMode::Uniprot => "uniprot",
            SearchMode::PrimaryId => "primary_id",
        }
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(SearchMode::Full),
            "gene" => Ok(SearchMode::Gene),
            "uniprot" => Ok(SearchMode::Uniprot),
            "primary_id" | "primary-id" | "pi" => Ok(SearchMode::PrimaryId),
            other => Err(format!(
                "unknown search mode '{}'. Use full, gene, uniprot, or primary_id.",
                other
            )),
        }
    }
}

/// Which documents a session looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchScope {
    /// Restrict to these analysis groups (empty = all groups).
    #[serde(default)]
    pub analysis_groups: Vec<String>,
    /// Restrict to groups of this species.
    #[serde(default)]
    pub species: Option<String>,
    /// Document categories searched for anchor matches.
    #[serde(default = "default_categories")]
    pub categories: Vec<FileCategory>,
}

pub fn default_categories() -> Vec<FileCategory> {
    vec![FileCategory::Differential, FileCategory::Searched]
}

impl Default for SearchScope {
    fn default() -> Self {
        Self {
            analysis_groups: Vec::new(),
            species: None,
            categories: default_categories(),
        }
    }
}

impl SearchScope {
    /// Whether an analysis group (with its species) is inside the scope.
    pub fn includes_group(&self, group_id: &str, species: Option<&str>) -> bool {
        if !self.analysis_groups.is_empty() && !self.analysis_groups.iter().any(|g| g == group_id)
        {
            return false;
        }
        match &self.species {
            Some(wanted) => species.is_some_and(|s| s.eq_ignore_ascii_case(wanted)),
            None => true,
        }
    }

    /// Whether a document is a candidate for anchor matches.
    pub fn includes(&self, doc: &SourceDocument, species: Option<&str>) -> bool {
        self.categories.contains(&doc.category) && self.includes_group(&doc.analysis_group, species)
    }
}

/// Lifecycle state of a search session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::InProgress => "in_progress",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Pending, SessionState::InProgress)
                | (SessionState::InProgress, SessionState::Completed)
                | (SessionState::InProgress, SessionState::Failed)
                | (SessionState::Pending, SessionState::Failed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionState::Pending),
            "in_progress" => Ok(SessionState::InProgress),
            "completed" => Ok(SessionState::Completed),
            "failed" => Ok(SessionState::Failed),
            other => Err(format!("unknown session state '{}'", other)),
        }
    }
}

/// One user-initiated search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSession {
    pub id: String,
    /// Client channel key progress events are addressed to.
    pub channel: Option<String>,
    pub expression: String,
    pub fold_change_cutoff: f64,
    pub p_value_cutoff: f64,
    pub mode: SearchMode,
    pub scope: SearchScope,
    pub state: SessionState,
    pub error: Option<String>,
    pub found_terms: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SearchSession {
    pub fn new(expression: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel: None,
            expression: expression.into(),
            fold_change_cutoff: DEFAULT_FOLD_CHANGE_CUTOFF,
            p_value_cutoff: DEFAULT_P_VALUE_CUTOFF,
            mode: SearchMode::Full,
            scope: SearchScope::default(),
            state: SessionState::Pending,
            error: None,
            found_terms: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_cutoffs(mut self, fold_change: f64, p_value: f64) -> Self {
        self.fold_change_cutoff = fold_change;
        self.p_value_cutoff = p_value;
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SearchError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(SessionState::InProgress)
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition(SessionState::Completed)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(SessionState::Failed)?;
        self.error = Some(message.into());
        Ok(())
    }
}

/// Confirmed terms of one document: lowercase term → context windows.
pub type TermContexts = BTreeMap<String, Vec<String>>;

/// A data row that contains a confirmed term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedRow {
    /// 1-based row number; row 1 is the header.
    pub row: usize,
    pub term: String,
    /// Fields in header order.
    pub fields: Vec<String>,
}

/// A sample intensity cell together with its condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleValue {
    pub sample: String,
    pub condition: String,
    pub value: Option<f64>,
}

/// Post-translational modification site fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PtmSite {
    pub peptide_sequence: Option<String>,
    pub position_in_peptide: Option<String>,
    pub position_in_protein: Option<String>,
    pub localization_probability: Option<f64>,
}

impl PtmSite {
    pub fn is_empty(&self) -> bool {
        self.peptide_sequence.is_none()
            && self.position_in_peptide.is_none()
            && self.position_in_protein.is_none()
            && self.localization_probability.is_none()
    }
}

/// Identity of a fused record within one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultKey {
    pub primary_id: String,
    pub analysis_group: String,
    pub comparison_label: Option<String>,
}

/// Fused output unit of a search session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,
    pub session_id: String,
    pub analysis_group: String,
    /// Document that contributed the comparison (or the anchor document).
    pub document_id: String,
    pub primary_id: String,
    pub gene_name: Option<String>,
    pub uniprot_id: Option<String>,
    pub comparison_label: Option<String>,
    pub condition_a: Option<String>,
    pub condition_b: Option<String>,
    pub log2_fc: Option<f64>,
    pub neg_log10_p: Option<f64>,
    pub samples: Option<Vec<SampleValue>>,
    pub copy_number: Option<f64>,
    pub rank: Option<i64>,
    pub ptm: Option<PtmSite>,
    pub search_terms: Vec<String>,
}

impl ResultRecord {
    pub fn key(&self) -> ResultKey {
        ResultKey {
            primary_id: self.primary_id.clone(),
            analysis_group: self.analysis_group.clone(),
            comparison_label: self.comparison_label.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_follows_file_type() {
        assert_eq!(FileType::Csv.delimiter(), Some(b','));
        assert_eq!(FileType::Tsv.delimiter(), Some(b'\t'));
        assert_eq!(FileType::Txt.delimiter(), Some(b'\t'));
        assert_eq!(FileType::Other.delimiter(), None);
        assert_eq!(FileType::from_path(Path::new("a/b/DIFF.CSV")), FileType::Csv);
        assert_eq!(FileType::from_path(Path::new("x.xlsx")), FileType::Other);
    }

    #[test]
    fn empty_role_is_absent() {
        let roles = ColumnRoles {
            primary_id_col: Some("ID".into()),
            gene_name_col: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(roles.get(ColumnRole::PrimaryId), Some("ID"));
        assert_eq!(roles.get(ColumnRole::GeneName), None);
        assert_eq!(roles.get(ColumnRole::Rank), None);
    }

    #[test]
    fn raw_p_values_are_transformed() {
        let spec = ComparisonSpec {
            fold_change_col: "FC".into(),
            p_value_col: "P".into(),
            comparison_col: None,
            comparison_label: "1".into(),
            condition_a: String::new(),
            condition_b: String::new(),
            p_value_scale: PValueScale::Raw,
        };
        assert!((spec.neg_log10_p(0.01) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn session_lifecycle() {
        let mut session = SearchSession::new("BRCA1");
        assert_eq!(session.state, SessionState::Pending);
        assert!(session.complete().is_err());
        session.start().unwrap();
        session.complete().unwrap();
        assert!(session.state.is_terminal());
        assert!(matches!(
            session.fail("late"),
            Err(SearchError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn scope_filters_groups_species_and_categories() {
        let doc = SourceDocument {
            id: "d".into(),
            analysis_group: "g1".into(),
            path: PathBuf::from("d.csv"),
            category: FileCategory::CopyNumber,
            file_type: FileType::Csv,
            columns: ColumnRoles::default(),
            comparisons: Vec::new(),
            samples: Vec::new(),
        };
        let mut scope = SearchScope::default();
        assert!(!scope.includes(&doc, None));
        scope.categories.push(FileCategory::CopyNumber);
        assert!(scope.includes(&doc, None));
        scope.species = Some("Human".into());
        assert!(!scope.includes(&doc, None));
        assert!(scope.includes(&doc, Some("human")));
        scope.analysis_groups = vec!["g2".into()];
        assert!(!scope.includes(&doc, Some("human")));
    }

    #[test]
    fn category_accepts_legacy_df_name() {
        let cat: FileCategory = serde_json::from_str("\"df\"").unwrap();
        assert_eq!(cat, FileCategory::Differential);
        assert_eq!("copy-number".parse::<FileCategory>(), Ok(FileCategory::CopyNumber));
    }
}
