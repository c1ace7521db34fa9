//! Hit Classification Module
//!
//! Turns raw nucleotide-search output into per-class allele calls.
//! Each tabular line is parsed into a [`GeneHit`], filtered by coverage,
//! resolved against the [`GeneClassTable`](crate::gene_table::GeneClassTable)
//! and accumulated into a per-sample [`ClassHitMap`].
//!
//! # Input Format
//! One hit per line, five tab-separated fields as produced by
//! `blastn -outfmt '6 sacc pident slen length score'`:
//!
//! ```text
//! Col  Field
//! 0    subject accession (composite variant identifier)
//! 1    percent identity
//! 2    subject (reference) length
//! 3    alignment length
//! 4    score
//! ```
//!
//! Identity filtering happens at the search invocation (`-perc_identity`)
//! and is not repeated here; only the coverage threshold is applied.

use anyhow::Result;
use rustc_hash::FxHashMap;

use crate::error::ClassifyError;
use crate::gene_table::{GeneClassTable, GeneRecord};

// ============================================================================
// Gene Hit
// ============================================================================

/// A single raw alignment record from the nucleotide search.
#[derive(Debug, Clone)]
pub struct GeneHit {
    /// Composite variant identifier (subject accession).
    pub variant_id: String,
    /// Percent identity of the alignment (0-100).
    pub percent_identity: f64,
    /// Reference (subject) sequence length.
    pub reference_length: f64,
    /// Aligned length.
    pub aligned_length: f64,
    /// Alignment score.
    pub score: f64,
}

impl GeneHit {
    /// Parses a hit from a tab-separated line.
    pub fn parse_line(line: &str) -> Result<Self, ClassifyError> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            return Err(malformed(line));
        }

        Ok(Self {
            variant_id: fields[0].to_string(),
            percent_identity: fields[1].parse().map_err(|_| malformed(line))?,
            reference_length: fields[2].parse().map_err(|_| malformed(line))?,
            aligned_length: fields[3].parse().map_err(|_| malformed(line))?,
            score: fields[4].parse().map_err(|_| malformed(line))?,
        })
    }

    /// Percent of the reference spanned by the alignment.
    pub fn coverage(&self) -> f64 {
        self.aligned_length / self.reference_length * 100.0
    }

    /// Coverage filter. The boundary is exclusive: a hit at exactly
    /// `min_coverage` is rejected.
    pub fn passes_coverage(&self, min_coverage: f64) -> bool {
        self.coverage() > min_coverage
    }
}

fn malformed(line: &str) -> ClassifyError {
    ClassifyError::MalformedRecord {
        kind: "gene hit",
        line: line.to_string(),
    }
}

// ============================================================================
// Allele Annotation
// ============================================================================

/// Builds the display string for an accepted hit.
///
/// Starts from the record's allele symbol and appends quality markers:
/// `*` for an imprecise match (identity below 100), then `?` for a partial
/// match (alignment shorter than the reference). Both may co-occur, `*`
/// always first.
pub fn annotate_allele(record: &GeneRecord, hit: &GeneHit) -> String {
    let mut display = record.allele_symbol.clone();
    if hit.percent_identity < 100.0 {
        display.push('*');
    }
    if hit.aligned_length < hit.reference_length {
        display.push('?');
    }
    display
}

// ============================================================================
// Class Hit Map
// ============================================================================

/// Per-sample accumulator of allele calls, keyed by resistance class.
///
/// Appends only, never deduplicates: identical alleles hit twice stay as two
/// entries so copy-number and multi-locus signals remain visible. Per-class
/// order is insertion order; rendering iterates the fixed class list, so no
/// iteration-order guarantee is needed from the map itself.
#[derive(Debug, Default)]
pub struct ClassHitMap {
    hits: FxHashMap<String, Vec<String>>,
}

impl ClassHitMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an allele string under a class, creating the class if absent.
    pub fn add(&mut self, class: &str, allele: String) {
        self.hits.entry(class.to_string()).or_default().push(allele);
    }

    /// Alleles recorded for a class, in the order the hits were seen.
    pub fn get(&self, class: &str) -> Option<&[String]> {
        self.hits.get(class).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

// ============================================================================
// Classification Sweep
// ============================================================================

/// Classifies one sample's worth of raw search output into `map`.
///
/// Streams over the tabular lines, applying the coverage filter, resolving
/// each accepted hit against the class table and appending the annotated
/// allele. Any unknown variant or malformed line aborts the sweep.
pub fn classify_hits(
    output: &str,
    table: &GeneClassTable,
    min_coverage: f64,
    map: &mut ClassHitMap,
) -> Result<()> {
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let hit = GeneHit::parse_line(line)?;
        if !hit.passes_coverage(min_coverage) {
            continue;
        }

        let record = table.lookup(&hit.variant_id)?;
        let allele = annotate_allele(record, &hit);
        map.add(record.class.report_class(), allele);
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
