//! Gene Class Table Module
//!
//! Loads the reference table mapping gene variants to resistance classes.
//! The table is a CSV with a header row; the columns used are:
//!
//! ```text
//! Col  Field
//! 0    seqID
//! 1    clusterID
//! 2    gene
//! 3    allele (also used as the display symbol)
//! 8    resistance class
//! 13   beta-lactamase sub-class
//! ```
//!
//! The composite variant identifier is `clusterID__gene__allele__seqID`,
//! joined with double underscores in that exact order. This must match the
//! headers of the search database FASTA, since classification depends on
//! string equality with the search tool's subject accessions.

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::ClassifyError;

/// Umbrella class name carried by beta-lactamase records.
const BLA_CLASS: &str = "Bla";
/// Sub-class column value meaning "sub-class unknown".
const UNKNOWN_SUBCLASS: &str = "NA";

const MIN_FIELDS: usize = 14;

// ============================================================================
// Resistance Class
// ============================================================================

/// Resistance class of a gene record.
///
/// Beta-lactamases are not reported under their umbrella class but under a
/// finer sub-class when one is recorded. The reference CSV expresses this
/// with sentinel strings (`"Bla"` redirecting to column 13, `"NA"` meaning
/// no sub-class); here the three cases are explicit variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResistanceClass {
    /// Directly reportable class name.
    Simple(String),
    /// Beta-lactamase with a known sub-class; reported under the sub-class.
    BetaLactamase(String),
    /// Beta-lactamase without a recorded sub-class; reported under `Bla`.
    BetaLactamaseUnclassified,
}

impl ResistanceClass {
    /// The class name this record is reported under.
    pub fn report_class(&self) -> &str {
        match self {
            ResistanceClass::Simple(name) => name,
            ResistanceClass::BetaLactamase(sub) => sub,
            ResistanceClass::BetaLactamaseUnclassified => BLA_CLASS,
        }
    }
}

/// A single gene variant entry from the reference table.
#[derive(Debug, Clone)]
pub struct GeneRecord {
    /// Display symbol for the allele (column 3).
    pub allele_symbol: String,
    /// Resistance class, with beta-lactamase sub-classing resolved.
    pub class: ResistanceClass,
}

// ============================================================================
// Gene Class Table
// ============================================================================

/// Immutable variant-to-class lookup table, loaded once at startup.
#[derive(Debug)]
pub struct GeneClassTable {
    records: FxHashMap<String, GeneRecord>,
    report_classes: Vec<String>,
}

impl GeneClassTable {
    /// Loads the table from a CSV file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open class table: {}", path.as_ref().display()))?;
        Self::parse(BufReader::new(file))
    }

    /// Parses the table from any buffered reader.
    ///
    /// The first line is a header and is skipped. Class names are collected
    /// in two groups: plain resistance classes (sorted, with the `Bla`
    /// redirect sentinel removed) followed by beta-lactamase sub-classes
    /// (sorted, with the `NA` placeholder removed). The concatenation is the
    /// fixed column order of the final report.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut records = FxHashMap::default();
        let mut res_classes: Vec<String> = Vec::new();
        let mut bla_classes: Vec<String> = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line_no == 0 || line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < MIN_FIELDS {
                return Err(ClassifyError::MalformedRecord {
                    kind: "class table",
                    line,
                }
                .into());
            }

            let (seq_id, cluster_id, gene, allele) =
                (fields[0], fields[1], fields[2], fields[3]);
            let res_class = fields[8];
            let bla_class = fields[13];

            let variant_id = [cluster_id, gene, allele, seq_id].join("__");

            let class = if res_class == BLA_CLASS {
                if bla_class == UNKNOWN_SUBCLASS {
                    ResistanceClass::BetaLactamaseUnclassified
                } else {
                    ResistanceClass::BetaLactamase(bla_class.to_string())
                }
            } else {
                ResistanceClass::Simple(res_class.to_string())
            };

            // Sub-class column order must include the class these records
            // are actually reported under: a beta-lactamase without a
            // sub-class reports under the literal umbrella name, so that is
            // what goes in the column list, not the placeholder.
            let effective_bla = match &class {
                ResistanceClass::BetaLactamaseUnclassified => BLA_CLASS,
                _ => bla_class,
            };

            records.insert(
                variant_id,
                GeneRecord {
                    allele_symbol: allele.to_string(),
                    class,
                },
            );

            if !res_classes.iter().any(|c| c == res_class) {
                res_classes.push(res_class.to_string());
            }
            if !bla_classes.iter().any(|c| c == effective_bla) {
                bla_classes.push(effective_bla.to_string());
            }
        }

        res_classes.sort();
        res_classes.retain(|c| c != BLA_CLASS);
        bla_classes.sort();
        bla_classes.retain(|c| c != UNKNOWN_SUBCLASS);

        let mut report_classes = res_classes;
        report_classes.append(&mut bla_classes);

        Ok(Self {
            records,
            report_classes,
        })
    }

    /// Looks up a variant by its composite identifier.
    ///
    /// Absence is a hard error: a hit to an unknown variant means the class
    /// table and the search database are out of sync.
    pub fn lookup(&self, variant_id: &str) -> Result<&GeneRecord, ClassifyError> {
        self.records
            .get(variant_id)
            .ok_or_else(|| ClassifyError::UnknownVariant {
                variant_id: variant_id.to_string(),
            })
    }

    /// Reportable class names in final column order.
    pub fn report_classes(&self) -> &[String] {
        &self.report_classes
    }

    /// Number of variant entries.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn row(seq: &str, cluster: &str, gene: &str, allele: &str, class: &str, bla: &str) -> String {
        // 14 columns; unused ones left blank
        format!(
            "{seq},{cluster},{gene},{allele},0,0,1,{allele},{class},ACC,0-10,1000,x,{bla}"
        )
    }

    fn sample_table() -> GeneClassTable {
        let csv = [
            "seqID,clusterID,gene,allele,multi,multiclust,idInFile,symbol,class,accession,positions,size,Lahey,Bla_Class".to_string(),
            row("S1", "C1", "aph3", "a1", "Ami", "NA"),
            row("S2", "C2", "tetA", "t1", "Tet", "NA"),
            row("S3", "C3", "ctxm", "b1", "Bla", "ESBL"),
            row("S4", "C4", "shv", "b2", "Bla", "NA"),
        ]
        .join("\n");
        GeneClassTable::parse(Cursor::new(csv)).unwrap()
    }

    #[test]
    fn test_variant_id_join_order() {
        let table = sample_table();
        assert!(table.lookup("C1__aph3__a1__S1").is_ok());
        // Wrong join order must not resolve
        assert!(table.lookup("S1__C1__aph3__a1").is_err());
    }

    #[test]
    fn test_lookup_known() {
        let table = sample_table();
        let rec = table.lookup("C2__tetA__t1__S2").unwrap();
        assert_eq!(rec.allele_symbol, "t1");
        assert_eq!(rec.class.report_class(), "Tet");
    }

    #[test]
    fn test_unknown_variant_is_error() {
        let table = sample_table();
        let err = table.lookup("C9__nope__x__S9").unwrap_err();
        assert!(matches!(err, ClassifyError::UnknownVariant { .. }));
    }

    #[test]
    fn test_bla_subclass_redirect() {
        let table = sample_table();
        let rec = table.lookup("C3__ctxm__b1__S3").unwrap();
        assert_eq!(rec.class, ResistanceClass::BetaLactamase("ESBL".to_string()));
        assert_eq!(rec.class.report_class(), "ESBL");
    }

    #[test]
    fn test_bla_unknown_subclass_falls_back() {
        let table = sample_table();
        let rec = table.lookup("C4__shv__b2__S4").unwrap();
        assert_eq!(rec.class, ResistanceClass::BetaLactamaseUnclassified);
        assert_eq!(rec.class.report_class(), "Bla");
    }

    #[test]
    fn test_report_classes_sorted_without_sentinels() {
        let table = sample_table();
        // Simple classes sorted (the Bla redirect removed), then sub-classes
        // sorted (the NA placeholder removed). The unclassified
        // beta-lactamase row contributes a literal Bla column.
        assert_eq!(table.report_classes(), &["Ami", "Tet", "Bla", "ESBL"]);
    }

    #[test]
    fn test_unclassified_bla_gets_report_column() {
        // A table whose only beta-lactamase carries no sub-class must still
        // report it: the Bla umbrella becomes a reportable column
        let csv = [
            "header".to_string(),
            row("S4", "C4", "shv", "b2", "Bla", "NA"),
        ]
        .join("\n");
        let table = GeneClassTable::parse(Cursor::new(csv)).unwrap();

        assert_eq!(table.report_classes(), &["Bla"]);
        let rec = table.lookup("C4__shv__b2__S4").unwrap();
        assert_eq!(rec.class.report_class(), "Bla");
    }

    #[test]
    fn test_short_row_is_malformed() {
        let csv = "header\nS1,C1,aph3,a1,Ami";
        let err = GeneClassTable::parse(Cursor::new(csv)).unwrap_err();
        let err = err.downcast::<ClassifyError>().unwrap();
        assert!(matches!(err, ClassifyError::MalformedRecord { .. }));
    }
}
