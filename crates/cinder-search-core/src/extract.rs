//! Per-category result extraction from one located row.
//!
//! The document category picks the rule set: differential files yield one
//! partial record per significant comparison, searched/raw files yield one
//! record with per-sample values, and copy-number files yield one record
//! with copy number and rank. Every partial carries the row's identity
//! columns (primary id, gene, UniProt accession, PTM site).

use crate::error::{Result, SearchError};
use crate::models::{
    ColumnRole, ComparisonSpec, FileCategory, PtmSite, SampleValue, SearchMode, SearchSession,
    SourceDocument,
};
use crate::rows::HeaderMap;

/// Fold-change / p-value slot of a partial record.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonValues {
    pub label: String,
    pub condition_a: String,
    pub condition_b: String,
    pub log2_fc: f64,
    pub neg_log10_p: f64,
}

/// Fields extracted from one row of one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    pub primary_id: Option<String>,
    pub gene_name: Option<String>,
    pub uniprot_id: Option<String>,
    pub comparison: Option<ComparisonValues>,
    pub samples: Option<Vec<SampleValue>>,
    pub copy_number: Option<f64>,
    pub rank: Option<i64>,
    pub ptm: Option<PtmSite>,
}

/// `|log2_fc| >= fc_cutoff AND neg_log10_p >= p_cutoff`.
pub fn passes_significance(log2_fc: f64, neg_log10_p: f64, fc_cutoff: f64, p_cutoff: f64) -> bool {
    log2_fc.abs() >= fc_cutoff && neg_log10_p >= p_cutoff
}

/// Whether an anchor partial satisfies the session's search mode for `term`.
pub fn matches_mode(mode: SearchMode, term: &str, partial: &PartialRecord) -> bool {
    let cell = match mode {
        SearchMode::Full => return true,
        SearchMode::Gene => partial.gene_name.as_deref(),
        SearchMode::Uniprot => partial.uniprot_id.as_deref(),
        SearchMode::PrimaryId => partial.primary_id.as_deref(),
    };
    cell.is_some_and(|value| value.to_lowercase().contains(&term.to_lowercase()))
}

/// Typed access to the cells of one row.
struct RowView<'a> {
    doc: &'a SourceDocument,
    header: &'a HeaderMap,
    fields: &'a [String],
}

impl<'a> RowView<'a> {
    fn cell(&self, column: &str) -> Result<&'a str> {
        let idx = self.header.require(&self.doc.id, column)?;
        Ok(self.fields.get(idx).map(|f| f.trim()).unwrap_or(""))
    }

    fn text(&self, column: &str) -> Result<Option<String>> {
        let value = self.cell(column)?;
        Ok((!value.is_empty()).then(|| value.to_string()))
    }

    fn number(&self, column: &str) -> Result<Option<f64>> {
        let value = self.cell(column)?;
        if value.is_empty() {
            return Ok(None);
        }
        value
            .parse::<f64>()
            .map(Some)
            .map_err(|_| self.invalid(column, value))
    }

    fn integer(&self, column: &str) -> Result<Option<i64>> {
        let value = self.cell(column)?;
        if value.is_empty() {
            return Ok(None);
        }
        if let Ok(n) = value.parse::<i64>() {
            return Ok(Some(n));
        }
        match value.parse::<f64>() {
            Ok(f) if f.is_finite() && f.fract() == 0.0 => Ok(Some(f as i64)),
            _ => Err(self.invalid(column, value)),
        }
    }

    fn role_text(&self, role: ColumnRole) -> Result<Option<String>> {
        match self.doc.columns.get(role) {
            Some(column) => self.text(column),
            None => Ok(None),
        }
    }

    fn role_number(&self, role: ColumnRole) -> Result<Option<f64>> {
        match self.doc.columns.get(role) {
            Some(column) => self.number(column),
            None => Ok(None),
        }
    }

    fn role_integer(&self, role: ColumnRole) -> Result<Option<i64>> {
        match self.doc.columns.get(role) {
            Some(column) => self.integer(column),
            None => Ok(None),
        }
    }

    fn invalid(&self, column: &str, value: &str) -> SearchError {
        SearchError::InvalidNumber {
            document: self.doc.id.clone(),
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}

/// Applies the extraction rules with a session's significance cutoffs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extractor {
    pub fold_change_cutoff: f64,
    pub p_value_cutoff: f64,
}

impl Extractor {
    pub fn new(fold_change_cutoff: f64, p_value_cutoff: f64) -> Self {
        Self {
            fold_change_cutoff,
            p_value_cutoff,
        }
    }

    pub fn for_session(session: &SearchSession) -> Self {
        Self::new(session.fold_change_cutoff, session.p_value_cutoff)
    }

    pub fn passes(&self, log2_fc: f64, neg_log10_p: f64) -> bool {
        passes_significance(log2_fc, neg_log10_p, self.fold_change_cutoff, self.p_value_cutoff)
    }

    /// Extract the partial records of one row.
    pub fn extract(
        &self,
        doc: &SourceDocument,
        header: &HeaderMap,
        fields: &[String],
    ) -> Result<Vec<PartialRecord>> {
        let row = RowView {
            doc,
            header,
            fields,
        };
        let base = identity(&row)?;
        match doc.category {
            FileCategory::Differential => {
                let mut out = Vec::new();
                for spec in &doc.comparisons {
                    if let Some(comparison) = self.comparison(&row, spec)? {
                        out.push(PartialRecord {
                            comparison: Some(comparison),
                            ..base.clone()
                        });
                    }
                }
                Ok(out)
            }
            FileCategory::Searched | FileCategory::Raw => {
                let samples = sample_values(&row)?;
                Ok(vec![PartialRecord {
                    samples: (!samples.is_empty()).then_some(samples),
                    ..base
                }])
            }
            FileCategory::CopyNumber => Ok(vec![PartialRecord {
                copy_number: row.role_number(ColumnRole::CopyNumber)?,
                rank: row.role_integer(ColumnRole::Rank)?,
                ..base
            }]),
            FileCategory::Other => Ok(Vec::new()),
        }
    }

    fn comparison(
        &self,
        row: &RowView<'_>,
        spec: &ComparisonSpec,
    ) -> Result<Option<ComparisonValues>> {
        let fold_change = row.number(&spec.fold_change_col)?;
        let p_value = row.number(&spec.p_value_col)?;
        let (Some(log2_fc), Some(p_cell)) = (fold_change, p_value) else {
            return Ok(None);
        };
        let neg_log10_p = spec.neg_log10_p(p_cell);
        if !self.passes(log2_fc, neg_log10_p) {
            return Ok(None);
        }
        let label = comparison_label(row, spec)?;
        if label.is_empty() {
            return Ok(None);
        }
        Ok(Some(ComparisonValues {
            label,
            condition_a: spec.condition_a.clone(),
            condition_b: spec.condition_b.clone(),
            log2_fc,
            neg_log10_p,
        }))
    }
}

/// Label from the selector column when the header has it (suffixed with
/// the configured label), else the configured label.
fn comparison_label(row: &RowView<'_>, spec: &ComparisonSpec) -> Result<String> {
    match spec.comparison_col.as_deref().filter(|c| !c.is_empty()) {
        Some(column) if row.header.index_of(column).is_some() => {
            let selected = row.cell(column)?;
            if spec.comparison_label.is_empty() || selected.is_empty() {
                Ok(selected.to_string())
            } else {
                Ok(format!("{}({})", selected, spec.comparison_label))
            }
        }
        _ => Ok(spec.comparison_label.clone()),
    }
}

fn identity(row: &RowView<'_>) -> Result<PartialRecord> {
    let ptm = PtmSite {
        peptide_sequence: row.role_text(ColumnRole::PeptideSequence)?,
        position_in_peptide: row.role_text(ColumnRole::PositionInPeptide)?,
        position_in_protein: row.role_text(ColumnRole::PositionInProtein)?,
        localization_probability: row.role_number(ColumnRole::LocalizationProbability)?,
    };
    Ok(PartialRecord {
        primary_id: row.role_text(ColumnRole::PrimaryId)?,
        gene_name: row.role_text(ColumnRole::GeneName)?,
        uniprot_id: row.role_text(ColumnRole::UniprotId)?,
        ptm: (!ptm.is_empty()).then_some(ptm),
        ..Default::default()
    })
}

fn sample_values(row: &RowView<'_>) -> Result<Vec<SampleValue>> {
    let mut values = Vec::with_capacity(row.doc.samples.len());
    for assignment in &row.doc.samples {
        if row.header.index_of(&assignment.sample).is_none() {
            continue;
        }
        values.push(SampleValue {
            sample: assignment.sample.clone(),
            condition: assignment.condition.clone(),
            value: row.number(&assignment.sample)?,
        });
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnRoles, FileType, PValueScale, SampleCondition};
    use std::path::PathBuf;

    fn header(names: &[&str]) -> HeaderMap {
        HeaderMap::new(names.iter().map(|s| s.to_string()).collect())
    }

    fn fields(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn doc(category: FileCategory) -> SourceDocument {
        SourceDocument {
            id: "doc".into(),
            analysis_group: "g".into(),
            path: PathBuf::from("doc.csv"),
            category,
            file_type: FileType::Csv,
            columns: ColumnRoles {
                primary_id_col: Some("ID".into()),
                ..Default::default()
            },
            comparisons: Vec::new(),
            samples: Vec::new(),
        }
    }

    fn spec(label: &str) -> ComparisonSpec {
        ComparisonSpec {
            fold_change_col: "FC".into(),
            p_value_col: "P".into(),
            comparison_col: None,
            comparison_label: label.into(),
            condition_a: "A".into(),
            condition_b: "B".into(),
            p_value_scale: PValueScale::NegLog10,
        }
    }

    #[test]
    fn significance_filter() {
        assert!(passes_significance(1.2, 2.0, 0.6, 1.31));
        assert!(passes_significance(-1.2, 2.0, 0.6, 1.31));
        assert!(!passes_significance(0.3, 2.0, 0.6, 1.31));
        assert!(!passes_significance(1.2, 1.0, 0.6, 1.31));
        assert!(passes_significance(0.6, 1.31, 0.6, 1.31));
    }

    #[test]
    fn differential_emits_one_partial_per_passing_spec() {
        let mut d = doc(FileCategory::Differential);
        d.comparisons = vec![spec("1"), spec(""), {
            let mut s = spec("2");
            s.fold_change_col = "FC2".into();
            s
        }];
        let h = header(&["ID", "FC", "P", "FC2"]);
        let out = Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1", "1.2", "2.0", "0.3"]))
            .unwrap();
        assert_eq!(out.len(), 1);
        let cmp = out[0].comparison.as_ref().unwrap();
        assert_eq!(cmp.label, "1");
        assert_eq!(cmp.log2_fc, 1.2);
        assert_eq!(out[0].primary_id.as_deref(), Some("P1"));
    }

    #[test]
    fn empty_cells_skip_the_comparison() {
        let mut d = doc(FileCategory::Differential);
        d.comparisons = vec![spec("1")];
        let h = header(&["ID", "FC", "P"]);
        let out = Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1", "", "3.0"]))
            .unwrap();
        assert!(out.is_empty());
        // Short rows behave like empty trailing cells.
        let out = Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1", "2.0"]))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn selector_column_names_the_comparison() {
        let mut d = doc(FileCategory::Differential);
        let mut s = spec("paired");
        s.comparison_col = Some("Comparison".into());
        d.comparisons = vec![s];
        let h = header(&["ID", "FC", "P", "Comparison"]);
        let out = Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1", "2", "3", "KO vs WT"]))
            .unwrap();
        assert_eq!(out[0].comparison.as_ref().unwrap().label, "KO vs WT(paired)");

        // Selector missing from the header falls back to the static label.
        let h = header(&["ID", "FC", "P"]);
        let out = Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1", "2", "3"]))
            .unwrap();
        assert_eq!(out[0].comparison.as_ref().unwrap().label, "paired");
    }

    #[test]
    fn raw_p_values_are_compared_in_neg_log10_space() {
        let mut d = doc(FileCategory::Differential);
        let mut s = spec("1");
        s.p_value_scale = PValueScale::Raw;
        d.comparisons = vec![s];
        let h = header(&["ID", "FC", "P"]);
        let out = Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1", "2.0", "0.01"]))
            .unwrap();
        assert!((out[0].comparison.as_ref().unwrap().neg_log10_p - 2.0).abs() < 1e-9);
    }

    #[test]
    fn searched_rows_carry_sample_values() {
        let mut d = doc(FileCategory::Searched);
        d.columns.gene_name_col = Some("Gene".into());
        d.samples = vec![
            SampleCondition {
                sample: "S1".into(),
                condition: "ctrl".into(),
            },
            SampleCondition {
                sample: "S2".into(),
                condition: "ko".into(),
            },
            SampleCondition {
                sample: "S9".into(),
                condition: "ko".into(),
            },
        ];
        let h = header(&["ID", "Gene", "S1", "S2"]);
        let out = Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1", "BRCA1", "10.5", ""]))
            .unwrap();
        assert_eq!(out.len(), 1);
        let samples = out[0].samples.as_ref().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, Some(10.5));
        assert_eq!(samples[1].value, None);
        assert_eq!(out[0].gene_name.as_deref(), Some("BRCA1"));
    }

    #[test]
    fn copy_number_rows() {
        let mut d = doc(FileCategory::CopyNumber);
        d.columns.copy_number_col = Some("Copies".into());
        d.columns.rank_col = Some("Rank".into());
        let h = header(&["ID", "Copies", "Rank"]);
        let out = Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1", "1500.5", "3"]))
            .unwrap();
        assert_eq!(out[0].copy_number, Some(1500.5));
        assert_eq!(out[0].rank, Some(3));
    }

    #[test]
    fn ptm_roles_fill_the_site() {
        let mut d = doc(FileCategory::Searched);
        d.columns.peptide_seq_col = Some("Peptide".into());
        d.columns.localization_prob_col = Some("Loc".into());
        let h = header(&["ID", "Peptide", "Loc"]);
        let out = Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1", "AS(ph)DK", "0.98"]))
            .unwrap();
        let ptm = out[0].ptm.as_ref().unwrap();
        assert_eq!(ptm.peptide_sequence.as_deref(), Some("AS(ph)DK"));
        assert_eq!(ptm.localization_probability, Some(0.98));
    }

    #[test]
    fn missing_declared_column_is_a_configuration_error() {
        let mut d = doc(FileCategory::Searched);
        d.columns.primary_id_col = Some("PID".into());
        let h = header(&["ID", "Gene"]);
        let err = Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1", "BRCA1"]))
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("PID"));
    }

    #[test]
    fn non_numeric_cells_are_rejected() {
        let mut d = doc(FileCategory::CopyNumber);
        d.columns.copy_number_col = Some("Copies".into());
        let h = header(&["ID", "Copies"]);
        let err = Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1", "many"]))
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidNumber { .. }));
    }

    #[test]
    fn other_category_yields_nothing() {
        let d = doc(FileCategory::Other);
        let h = header(&["ID"]);
        assert!(Extractor::new(0.6, 1.31)
            .extract(&d, &h, &fields(&["P1"]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn search_mode_restricts_the_matching_cell() {
        let partial = PartialRecord {
            primary_id: Some("P12345".into()),
            gene_name: Some("BRCA1".into()),
            ..Default::default()
        };
        assert!(matches_mode(SearchMode::Full, "anything", &partial));
        assert!(matches_mode(SearchMode::Gene, "brca1", &partial));
        assert!(!matches_mode(SearchMode::Gene, "p12345", &partial));
        assert!(matches_mode(SearchMode::PrimaryId, "p12345", &partial));
        assert!(!matches_mode(SearchMode::Uniprot, "brca1", &partial));
    }
}
