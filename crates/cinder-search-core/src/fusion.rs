//! Cross-file result fusion.
//!
//! [`ResultIndex`] accumulates partial records of one session keyed by
//! `(primary_id, analysis_group)`. Entity fields (gene, accession, samples,
//! copy number, rank, PTM site) live once per entity; fold-change and
//! p-value pairs live per comparison label. [`Correlator`] pulls rows from
//! the other documents of an anchor's analysis group whose primary id is
//! already known, so data split over several files lands on one record.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::Result;
use crate::extract::{Extractor, PartialRecord};
use crate::models::{
    ColumnRole, FileCategory, PtmSite, ResultRecord, SampleValue, SourceDocument,
};
use crate::rows::DelimitedFile;

#[derive(Debug, Clone, PartialEq)]
struct ComparisonEntry {
    document_id: String,
    condition_a: String,
    condition_b: String,
    log2_fc: f64,
    neg_log10_p: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct EntityEntry {
    /// First document that contributed to the entity.
    document_id: String,
    gene_name: Option<String>,
    uniprot_id: Option<String>,
    samples: Option<Vec<SampleValue>>,
    copy_number: Option<f64>,
    rank: Option<i64>,
    ptm: Option<PtmSite>,
    search_terms: Vec<String>,
    comparisons: BTreeMap<String, ComparisonEntry>,
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

impl EntityEntry {
    fn merge(&mut self, document_id: &str, partial: PartialRecord, term: Option<&str>) {
        overwrite(&mut self.gene_name, partial.gene_name);
        overwrite(&mut self.uniprot_id, partial.uniprot_id);
        overwrite(&mut self.samples, partial.samples);
        overwrite(&mut self.copy_number, partial.copy_number);
        overwrite(&mut self.rank, partial.rank);
        overwrite(&mut self.ptm, partial.ptm);
        if let Some(term) = term {
            let term = term.to_lowercase();
            if !self.search_terms.contains(&term) {
                self.search_terms.push(term);
            }
        }
        if let Some(cmp) = partial.comparison {
            self.comparisons.insert(
                cmp.label,
                ComparisonEntry {
                    document_id: document_id.to_string(),
                    condition_a: cmp.condition_a,
                    condition_b: cmp.condition_b,
                    log2_fc: cmp.log2_fc,
                    neg_log10_p: cmp.neg_log10_p,
                },
            );
        }
    }
}

/// Accumulator of one session's fused results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultIndex {
    entities: BTreeMap<(String, String), EntityEntry>,
}

impl ResultIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records [`records`](Self::records) would produce.
    pub fn len(&self) -> usize {
        self.entities
            .values()
            .map(|e| e.comparisons.len().max(1))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Primary ids already known in an analysis group.
    pub fn primary_ids(&self, analysis_group: &str) -> BTreeSet<String> {
        self.entities
            .keys()
            .filter(|(_, group)| group == analysis_group)
            .map(|(pid, _)| pid.clone())
            .collect()
    }

    /// Merge one partial extracted from `doc`.
    ///
    /// Returns `false` when the partial has no primary id and cannot be keyed.
    pub fn merge(&mut self, doc: &SourceDocument, partial: PartialRecord, term: Option<&str>) -> bool {
        let Some(primary_id) = partial.primary_id.clone() else {
            return false;
        };
        let entry = self
            .entities
            .entry((primary_id, doc.analysis_group.clone()))
            .or_insert_with(|| EntityEntry {
                document_id: doc.id.clone(),
                ..Default::default()
            });
        entry.merge(&doc.id, partial, term);
        true
    }

    /// Materialize the fused records, sorted by key.
    pub fn records(&self, session_id: &str) -> Vec<ResultRecord> {
        let mut out = Vec::with_capacity(self.len());
        for ((primary_id, group), entity) in &self.entities {
            let base = ResultRecord {
                id: String::new(),
                session_id: session_id.to_string(),
                analysis_group: group.clone(),
                document_id: entity.document_id.clone(),
                primary_id: primary_id.clone(),
                gene_name: entity.gene_name.clone(),
                uniprot_id: entity.uniprot_id.clone(),
                comparison_label: None,
                condition_a: None,
                condition_b: None,
                log2_fc: None,
                neg_log10_p: None,
                samples: entity.samples.clone(),
                copy_number: entity.copy_number,
                rank: entity.rank,
                ptm: entity.ptm.clone(),
                search_terms: entity.search_terms.clone(),
            };
            if entity.comparisons.is_empty() {
                out.push(ResultRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    ..base
                });
                continue;
            }
            for (label, cmp) in &entity.comparisons {
                out.push(ResultRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    document_id: cmp.document_id.clone(),
                    comparison_label: Some(label.clone()),
                    condition_a: Some(cmp.condition_a.clone()),
                    condition_b: Some(cmp.condition_b.clone()),
                    log2_fc: Some(cmp.log2_fc),
                    neg_log10_p: Some(cmp.neg_log10_p),
                    ..base.clone()
                });
            }
        }
        out
    }
}

/// Joins the other documents of an anchor's analysis group by primary id.
pub struct Correlator<'a> {
    extractor: &'a Extractor,
}

impl<'a> Correlator<'a> {
    pub fn new(extractor: &'a Extractor) -> Self {
        Self { extractor }
    }

    /// Merge every row of the anchor's sibling documents whose primary id is
    /// in `primary_ids`. Returns the number of partials merged.
    pub fn correlate(
        &self,
        anchor: &SourceDocument,
        group_docs: &[SourceDocument],
        primary_ids: &BTreeSet<String>,
        index: &mut ResultIndex,
    ) -> Result<usize> {
        if primary_ids.is_empty() {
            return Ok(0);
        }
        let mut merged = 0;
        for doc in group_docs {
            if doc.id == anchor.id || doc.analysis_group != anchor.analysis_group {
                continue;
            }
            if doc.category == FileCategory::Other {
                continue;
            }
            let Some(pid_col) = doc.columns.get(ColumnRole::PrimaryId) else {
                debug!(document = %doc.id, "no primary id column, skipping correlation");
                continue;
            };
            if doc.delimiter().is_none() {
                warn!(document = %doc.id, file_type = doc.file_type.as_str(), "unsupported file type, skipping correlation");
                continue;
            }

            let mut file = DelimitedFile::open(doc)?;
            let pid_idx = file.header().require(&doc.id, pid_col)?;
            let header = file.header().clone();
            while let Some(fields) = file.next_row()? {
                let matched = fields
                    .get(pid_idx)
                    .is_some_and(|cell| primary_ids.contains(cell.trim()));
                if !matched {
                    continue;
                }
                for partial in self.extractor.extract(doc, &header, &fields)? {
                    if index.merge(doc, partial, None) {
                        merged += 1;
                    }
                }
            }
            debug!(anchor = %anchor.id, document = %doc.id, merged, "correlated");
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ComparisonValues;
    use crate::models::{ColumnRoles, ComparisonSpec, FileType, PValueScale};
    use std::io::Write;
    use std::path::{Path, PathBuf};

    fn doc(id: &str, group: &str, category: FileCategory, path: PathBuf) -> SourceDocument {
        SourceDocument {
            id: id.into(),
            analysis_group: group.into(),
            file_type: FileType::from_path(&path),
            path,
            category,
            columns: ColumnRoles {
                primary_id_col: Some("ID".into()),
                ..Default::default()
            },
            comparisons: Vec::new(),
            samples: Vec::new(),
        }
    }

    fn comparison(label: &str, fc: f64) -> ComparisonValues {
        ComparisonValues {
            label: label.into(),
            condition_a: "A".into(),
            condition_b: "B".into(),
            log2_fc: fc,
            neg_log10_p: 2.0,
        }
    }

    fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn merge_is_idempotent() {
        let d = doc("d", "g", FileCategory::Differential, "d.csv".into());
        let partial = PartialRecord {
            primary_id: Some("P1".into()),
            gene_name: Some("BRCA1".into()),
            comparison: Some(comparison("1", 1.2)),
            ..Default::default()
        };
        let mut once = ResultIndex::new();
        once.merge(&d, partial.clone(), Some("brca1"));
        let mut twice = once.clone();
        twice.merge(&d, partial, Some("brca1"));
        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn one_record_per_key() {
        let d = doc("d", "g", FileCategory::Differential, "d.csv".into());
        let mut index = ResultIndex::new();
        for (label, fc) in [("1", 1.0), ("2", 2.0), ("1", 3.0)] {
            index.merge(
                &d,
                PartialRecord {
                    primary_id: Some("P1".into()),
                    comparison: Some(comparison(label, fc)),
                    ..Default::default()
                },
                None,
            );
        }
        let records = index.records("s");
        assert_eq!(records.len(), 2);
        let keys: BTreeSet<_> = records.iter().map(|r| r.key()).collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(records[0].log2_fc, Some(3.0));
    }

    #[test]
    fn entity_fields_survive_missing_values() {
        let d = doc("d", "g", FileCategory::Searched, "d.csv".into());
        let mut index = ResultIndex::new();
        index.merge(
            &d,
            PartialRecord {
                primary_id: Some("P1".into()),
                gene_name: Some("BRCA1".into()),
                copy_number: Some(12.0),
                ..Default::default()
            },
            Some("BRCA1"),
        );
        index.merge(
            &d,
            PartialRecord {
                primary_id: Some("P1".into()),
                uniprot_id: Some("P38398".into()),
                ..Default::default()
            },
            Some("p38398"),
        );
        let records = index.records("s");
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.gene_name.as_deref(), Some("BRCA1"));
        assert_eq!(r.uniprot_id.as_deref(), Some("P38398"));
        assert_eq!(r.copy_number, Some(12.0));
        assert_eq!(r.comparison_label, None);
        assert_eq!(r.search_terms, vec!["brca1", "p38398"]);
    }

    #[test]
    fn unkeyed_partials_are_rejected() {
        let d = doc("d", "g", FileCategory::Searched, "d.csv".into());
        let mut index = ResultIndex::new();
        assert!(!index.merge(&d, PartialRecord::default(), None));
        assert!(index.is_empty());
    }

    #[test]
    fn correlator_pulls_sibling_rows_by_primary_id() {
        let dir = tempfile::tempdir().unwrap();
        let anchor = doc(
            "anchor",
            "g",
            FileCategory::Searched,
            write_file(dir.path(), "searched.csv", "ID,Gene\nP1,BRCA1\n"),
        );
        let mut diff = doc(
            "diff",
            "g",
            FileCategory::Differential,
            write_file(
                dir.path(),
                "diff.tsv",
                "ID\tFC\tP\nP1\t1.2\t2.0\nP2\t3.0\t4.0\n",
            ),
        );
        diff.comparisons = vec![ComparisonSpec {
            fold_change_col: "FC".into(),
            p_value_col: "P".into(),
            comparison_col: None,
            comparison_label: "1".into(),
            condition_a: "KO".into(),
            condition_b: "WT".into(),
            p_value_scale: PValueScale::NegLog10,
        }];
        let other_group = doc(
            "elsewhere",
            "h",
            FileCategory::Differential,
            write_file(dir.path(), "other.csv", "ID\nP1\n"),
        );
        let mut no_pid = doc(
            "nopid",
            "g",
            FileCategory::Raw,
            write_file(dir.path(), "raw.csv", "X\nP1\n"),
        );
        no_pid.columns.primary_id_col = None;

        let mut index = ResultIndex::new();
        index.merge(
            &anchor,
            PartialRecord {
                primary_id: Some("P1".into()),
                gene_name: Some("BRCA1".into()),
                ..Default::default()
            },
            Some("brca1"),
        );
        let extractor = Extractor::new(0.6, 1.31);
        let siblings = vec![anchor.clone(), diff, other_group, no_pid];
        let merged = Correlator::new(&extractor)
            .correlate(&anchor, &siblings, &index.primary_ids("g"), &mut index)
            .unwrap();
        assert_eq!(merged, 1);

        let records = index.records("s");
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.primary_id, "P1");
        assert_eq!(r.gene_name.as_deref(), Some("BRCA1"));
        assert_eq!(r.comparison_label.as_deref(), Some("1"));
        assert_eq!(r.log2_fc, Some(1.2));
        assert_eq!(r.document_id, "diff");
    }

    #[test]
    fn correlating_twice_yields_the_same_records() {
        let dir = tempfile::tempdir().unwrap();
        let anchor = doc(
            "anchor",
            "g",
            FileCategory::Searched,
            write_file(dir.path(), "searched.csv", "ID,Gene\nP1,BRCA1\nP2,TP53\n"),
        );
        let mut diff = doc(
            "diff",
            "g",
            FileCategory::Differential,
            write_file(
                dir.path(),
                "diff.csv",
                "ID,FC_A,P_A,FC_B,P_B\nP1,1.2,2.0,-0.9,1.5\nP2,2.5,3.0,0.1,0.2\n",
            ),
        );
        diff.comparisons = ["A", "B"]
            .iter()
            .map(|label| ComparisonSpec {
                fold_change_col: format!("FC_{}", label),
                p_value_col: format!("P_{}", label),
                comparison_col: None,
                comparison_label: label.to_string(),
                condition_a: "KO".into(),
                condition_b: "WT".into(),
                p_value_scale: PValueScale::NegLog10,
            })
            .collect();

        let mut index = ResultIndex::new();
        for (pid, gene) in [("P1", "BRCA1"), ("P2", "TP53")] {
            index.merge(
                &anchor,
                PartialRecord {
                    primary_id: Some(pid.into()),
                    gene_name: Some(gene.into()),
                    ..Default::default()
                },
                Some(gene.to_lowercase().as_str()),
            );
        }
        let extractor = Extractor::new(0.6, 1.31);
        let correlator = Correlator::new(&extractor);
        let siblings = vec![anchor.clone(), diff];
        let pids = index.primary_ids("g");

        correlator.correlate(&anchor, &siblings, &pids, &mut index).unwrap();
        let first = index.clone();
        correlator.correlate(&anchor, &siblings, &pids, &mut index).unwrap();
        assert_eq!(index, first);

        let without_ids = |index: &ResultIndex| -> Vec<ResultRecord> {
            index
                .records("s")
                .into_iter()
                .map(|mut r| {
                    r.id.clear();
                    r
                })
                .collect()
        };
        let records = without_ids(&index);
        assert_eq!(records, without_ids(&first));
        let keys: Vec<(String, Option<String>)> = records
            .iter()
            .map(|r| (r.primary_id.clone(), r.comparison_label.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("P1".to_string(), Some("A".to_string())),
                ("P1".to_string(), Some("B".to_string())),
                ("P2".to_string(), Some("A".to_string())),
            ]
        );
    }

    #[test]
    fn correlator_reports_missing_primary_id_column() {
        let dir = tempfile::tempdir().unwrap();
        let anchor = doc(
            "anchor",
            "g",
            FileCategory::Searched,
            write_file(dir.path(), "a.csv", "ID\nP1\n"),
        );
        let mut broken = doc(
            "broken",
            "g",
            FileCategory::Searched,
            write_file(dir.path(), "b.csv", "ID\nP1\n"),
        );
        broken.columns.primary_id_col = Some("PID".into());
        let ids: BTreeSet<String> = ["P1".to_string()].into_iter().collect();
        let extractor = Extractor::new(0.6, 1.31);
        let err = Correlator::new(&extractor)
            .correlate(&anchor, &[broken], &ids, &mut ResultIndex::new())
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
