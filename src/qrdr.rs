//! QRDR Mutation Detection Module
//!
//! Detects point mutations in quinolone-resistance-determining regions from
//! translated-search output. Each queried locus is compared per-residue
//! against its wild-type reference; when the search tool's own alignment is
//! not gap-free and full-length, the wild-type and hit sequences are
//! realigned with an external pairwise aligner and the mutation positions
//! are translated through gapped-alignment coordinates.
//!
//! # Input Format
//! One record per line, seven tab-separated fields as produced by
//! `blastx -outfmt '6 sacc sseq qseq gaps slen length sstart'`:
//!
//! ```text
//! Col  Field
//! 0    subject accession (locus identifier, e.g. "GyrA")
//! 1    subject aligned sequence (wild-type amino acids)
//! 2    query aligned sequence (hit amino acids)
//! 3    gap count
//! 4    subject length
//! 5    alignment length
//! 6    subject start (1-based)
//! ```
//!
//! Only the first record per locus is evaluated; later records for an
//! already-seen locus are skipped regardless of score.

use anyhow::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::LazyLock;

use crate::blast::PairwiseAligner;
use crate::classify::ClassHitMap;
use crate::error::ClassifyError;

/// Resistance class all QRDR mutations are reported under.
pub const FLQ_CLASS: &str = "Flq";

/// Gap character in pairwise alignment output.
const GAP: u8 = b'-';

// ============================================================================
// Mutation Loci
// ============================================================================

static GYRA_POSITIONS: [(usize, char); 2] = [(83, 'S'), (87, 'D')];
static PARC_POSITIONS: [(usize, char); 2] = [(80, 'S'), (84, 'E')];

/// Queried loci with their (1-based position, wild-type residue) pairs.
static QRDR_LOCI: LazyLock<FxHashMap<&'static str, &'static [(usize, char)]>> =
    LazyLock::new(|| {
        let mut loci = FxHashMap::default();
        loci.insert("GyrA", &GYRA_POSITIONS[..]);
        loci.insert("ParC", &PARC_POSITIONS[..]);
        loci
    });

// ============================================================================
// QRDR Record
// ============================================================================

/// A single raw record from the translated search.
#[derive(Debug, Clone)]
pub struct QrdrRecord {
    pub gene_id: String,
    /// Wild-type (subject) amino acids over the aligned region.
    pub wildtype_aa: String,
    /// Hit (query) amino acids over the aligned region.
    pub hit_aa: String,
    pub gap_count: usize,
    pub reference_length: usize,
    pub aligned_length: usize,
    /// 1-based start of the alignment on the wild-type reference.
    pub subject_start: usize,
}

impl QrdrRecord {
    /// Parses a record from a tab-separated line.
    pub fn parse_line(line: &str) -> Result<Self, ClassifyError> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 7 {
            return Err(malformed(line));
        }

        Ok(Self {
            gene_id: fields[0].to_string(),
            wildtype_aa: fields[1].to_string(),
            hit_aa: fields[2].to_string(),
            gap_count: fields[3].parse().map_err(|_| malformed(line))?,
            reference_length: fields[4].parse().map_err(|_| malformed(line))?,
            aligned_length: fields[5].parse().map_err(|_| malformed(line))?,
            subject_start: fields[6].parse().map_err(|_| malformed(line))?,
        })
    }

    /// The search tool's own alignment is usable directly when it contains
    /// no gaps and spans the full reference.
    fn is_simple_alignment(&self) -> bool {
        self.gap_count == 0 && self.reference_length == self.aligned_length
    }
}

fn malformed(line: &str) -> ClassifyError {
    ClassifyError::MalformedRecord {
        kind: "QRDR hit",
        line: line.to_string(),
    }
}

// ============================================================================
// Coordinate Mapping
// ============================================================================

/// Maps a 1-based ungapped position to the 0-based index of that residue
/// inside a gapped sequence.
///
/// Scans left to right counting non-gap characters, consuming one character
/// past the target residue before stopping; for a gap-free sequence this
/// yields `ungapped_index - 1`. When the target exceeds the number of
/// non-gap characters in the string the position cannot be located and
/// [`ClassifyError::CoordinateOutOfRange`] is returned rather than clamping
/// to the final index.
pub fn map_gapped_position(gapped: &str, ungapped_index: usize) -> Result<usize, ClassifyError> {
    let bytes = gapped.as_bytes();
    let mut num_chars = 0usize;
    let mut i = 0usize;

    if ungapped_index == 0 {
        return Err(ClassifyError::CoordinateOutOfRange {
            requested: 0,
            available: 0,
        });
    }

    while num_chars <= ungapped_index && i < bytes.len() {
        if bytes[i] != GAP {
            num_chars += 1;
        }
        i += 1;
    }

    if num_chars > ungapped_index {
        // One character past the target was consumed
        Ok(i - 2)
    } else if num_chars == ungapped_index {
        // Target residue reached exactly at the end of the string
        Ok(i - 1)
    } else {
        Err(ClassifyError::CoordinateOutOfRange {
            requested: ungapped_index,
            available: num_chars,
        })
    }
}

// ============================================================================
// Mutation Scans
// ============================================================================

/// Fast path: the hit sequence is positionally equivalent to the reference,
/// so each locus position indexes it directly (1-based to 0-based).
fn scan_direct(gene_id: &str, positions: &[(usize, char)], hit_aa: &str) -> Vec<String> {
    let bytes = hit_aa.as_bytes();
    let mut mutations = Vec::new();

    for &(pos, wildtype) in positions {
        match bytes.get(pos - 1) {
            Some(&observed) if observed as char != wildtype => {
                mutations.push(format!("{}-{}{}", gene_id, pos, observed as char));
            }
            _ => {}
        }
    }

    mutations
}

/// Fallback path: reads each mutation position out of a gapped pairwise
/// alignment of the wild-type and hit sequences.
///
/// Positions at or before `subject_start` lie outside the aligned region and
/// are silently skipped ("not observed", not an error). A position beyond
/// the non-gap characters of the gapped wild-type is likewise skipped, with
/// a warning in verbose mode.
pub fn scan_gapped(
    gene_id: &str,
    positions: &[(usize, char)],
    gapped_wildtype: &str,
    gapped_hit: &str,
    subject_start: usize,
    verbose: bool,
) -> Vec<String> {
    let hit_bytes = gapped_hit.as_bytes();
    let mut mutations = Vec::new();

    for &(pos, wildtype) in positions {
        if pos <= subject_start {
            continue;
        }
        let adjusted = pos - subject_start + 1;

        let index = match map_gapped_position(gapped_wildtype, adjusted) {
            Ok(index) => index,
            Err(e) => {
                if verbose {
                    eprintln!("WARNING: {}-{}: {}", gene_id, pos, e);
                }
                continue;
            }
        };

        match hit_bytes.get(index) {
            Some(&observed) if observed as char != wildtype => {
                mutations.push(format!("{}-{}{}", gene_id, pos, observed as char));
            }
            Some(_) => {}
            None => {
                if verbose {
                    eprintln!(
                        "WARNING: {}-{}: aligned hit shorter than wild-type alignment",
                        gene_id, pos
                    );
                }
            }
        }
    }

    mutations
}

// ============================================================================
// Detector
// ============================================================================

/// Per-sample QRDR mutation detector.
///
/// Holds the first-hit-seen set for one sample; create a fresh detector per
/// sample.
pub struct QrdrDetector<'a> {
    aligner: &'a PairwiseAligner,
    seen: FxHashSet<String>,
    verbose: bool,
}

impl<'a> QrdrDetector<'a> {
    pub fn new(aligner: &'a PairwiseAligner, verbose: bool) -> Self {
        Self {
            aligner,
            seen: FxHashSet::default(),
            verbose,
        }
    }

    /// Sweeps one sample's worth of translated-search output into `map`,
    /// appending mutation strings under [`FLQ_CLASS`].
    pub fn detect(&mut self, output: &str, map: &mut ClassHitMap) -> Result<()> {
        for line in output.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let record = QrdrRecord::parse_line(line)?;
            self.process(&record, map)?;
        }
        Ok(())
    }

    /// Evaluates a single record. First record per locus wins; unknown loci
    /// contribute nothing.
    pub fn process(&mut self, record: &QrdrRecord, map: &mut ClassHitMap) -> Result<()> {
        if !self.seen.insert(record.gene_id.clone()) {
            return Ok(());
        }

        let positions = match QRDR_LOCI.get(record.gene_id.as_str()) {
            Some(positions) => *positions,
            None => return Ok(()),
        };

        let mutations = if record.is_simple_alignment() {
            scan_direct(&record.gene_id, positions, &record.hit_aa)
        } else {
            match self.realign_and_scan(record, positions) {
                Ok(mutations) => mutations,
                Err(e) if is_tool_failure(&e) => {
                    eprintln!(
                        "WARNING: {}: realignment failed, skipping mutation check: {:#}",
                        record.gene_id, e
                    );
                    Vec::new()
                }
                Err(e) => return Err(e),
            }
        };

        for mutation in mutations {
            map.add(FLQ_CLASS, mutation);
        }

        Ok(())
    }

    fn realign_and_scan(
        &self,
        record: &QrdrRecord,
        positions: &[(usize, char)],
    ) -> Result<Vec<String>> {
        let (gapped_wildtype, gapped_hit) =
            self.aligner.align(&record.wildtype_aa, &record.hit_aa)?;

        Ok(scan_gapped(
            &record.gene_id,
            positions,
            &gapped_wildtype,
            &gapped_hit,
            record.subject_start,
            self.verbose,
        ))
    }
}

fn is_tool_failure(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<ClassifyError>(),
        Some(ClassifyError::ExternalToolFailure { .. })
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_aligner() -> PairwiseAligner {
        // Never invoked by the fast-path tests
        PairwiseAligner::new(PathBuf::from("edialign"), Duration::from_secs(1))
    }

    fn gyra_record(hit_aa: String) -> QrdrRecord {
        let len = hit_aa.len();
        QrdrRecord {
            gene_id: "GyrA".to_string(),
            wildtype_aa: hit_aa.clone(),
            hit_aa,
            gap_count: 0,
            reference_length: len,
            aligned_length: len,
            subject_start: 1,
        }
    }

    /// 87-residue hit with the given residues at positions 83 and 87.
    fn gyra_region(p83: char, p87: char) -> String {
        let mut residues = vec!['A'; 87];
        residues[82] = p83;
        residues[86] = p87;
        residues.into_iter().collect()
    }

    #[test]
    fn test_parse_qrdr_line() {
        let rec = QrdrRecord::parse_line("GyrA\tMKSER\tMKFER\t0\t87\t87\t1").unwrap();
        assert_eq!(rec.gene_id, "GyrA");
        assert_eq!(rec.wildtype_aa, "MKSER");
        assert_eq!(rec.hit_aa, "MKFER");
        assert_eq!(rec.gap_count, 0);
        assert_eq!(rec.reference_length, 87);
        assert_eq!(rec.aligned_length, 87);
        assert_eq!(rec.subject_start, 1);
    }

    #[test]
    fn test_parse_qrdr_malformed() {
        assert!(QrdrRecord::parse_line("GyrA\tMKSER\tMKFER\t0\t87").is_err());
        assert!(QrdrRecord::parse_line("GyrA\tMKSER\tMKFER\tx\t87\t87\t1").is_err());
    }

    #[test]
    fn test_map_position_no_gaps_round_trip() {
        for k in 1..=5 {
            assert_eq!(map_gapped_position("MKSER", k).unwrap(), k - 1);
        }
    }

    #[test]
    fn test_map_position_with_gap() {
        // 3rd non-gap character of "AC-GT" is 'G' at index 3
        assert_eq!(map_gapped_position("AC-GT", 3).unwrap(), 3);
    }

    #[test]
    fn test_map_position_target_at_end() {
        assert_eq!(map_gapped_position("AC-GT", 4).unwrap(), 4);
    }

    #[test]
    fn test_map_position_out_of_range() {
        let err = map_gapped_position("AC-GT", 5).unwrap_err();
        match err {
            ClassifyError::CoordinateOutOfRange {
                requested,
                available,
            } => {
                assert_eq!(requested, 5);
                assert_eq!(available, 4);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_map_position_zero_is_error() {
        assert!(map_gapped_position("ACGT", 0).is_err());
    }

    #[test]
    fn test_fast_path_emits_mutation() {
        let aligner = test_aligner();
        let mut detector = QrdrDetector::new(&aligner, false);
        let mut map = ClassHitMap::new();

        // F at position 83 instead of wild-type S
        let record = gyra_record(gyra_region('F', 'D'));
        detector.process(&record, &mut map).unwrap();

        assert_eq!(map.get(FLQ_CLASS).unwrap(), &["GyrA-83F"]);
    }

    #[test]
    fn test_fast_path_wildtype_silent() {
        let aligner = test_aligner();
        let mut detector = QrdrDetector::new(&aligner, false);
        let mut map = ClassHitMap::new();

        let record = gyra_record(gyra_region('S', 'D'));
        detector.process(&record, &mut map).unwrap();

        assert!(map.get(FLQ_CLASS).is_none());
    }

    #[test]
    fn test_both_positions_reported() {
        let aligner = test_aligner();
        let mut detector = QrdrDetector::new(&aligner, false);
        let mut map = ClassHitMap::new();

        let record = gyra_record(gyra_region('L', 'N'));
        detector.process(&record, &mut map).unwrap();

        assert_eq!(map.get(FLQ_CLASS).unwrap(), &["GyrA-83L", "GyrA-87N"]);
    }

    #[test]
    fn test_first_hit_wins() {
        let aligner = test_aligner();
        let mut detector = QrdrDetector::new(&aligner, false);
        let mut map = ClassHitMap::new();

        // First record is wild-type at both positions; the mutated second
        // record for the same locus must be ignored
        detector
            .process(&gyra_record(gyra_region('S', 'D')), &mut map)
            .unwrap();
        detector
            .process(&gyra_record(gyra_region('F', 'D')), &mut map)
            .unwrap();

        assert!(map.get(FLQ_CLASS).is_none());
    }

    #[test]
    fn test_unknown_locus_contributes_nothing() {
        let aligner = test_aligner();
        let mut detector = QrdrDetector::new(&aligner, false);
        let mut map = ClassHitMap::new();

        let mut record = gyra_record(gyra_region('F', 'D'));
        record.gene_id = "RpoB".to_string();
        detector.process(&record, &mut map).unwrap();

        assert!(map.is_empty());
    }

    #[test]
    fn test_scan_gapped_translates_coordinates() {
        // ParC positions 80 and 84 with the alignment starting at subject
        // position 79: adjusted positions 2 and 6 within the aligned region.
        // Wild-type non-gap residues cover subject positions 79..=84
        let mutations = scan_gapped(
            "ParC",
            &PARC_POSITIONS,
            "A-SCDXE",
            "ATTCDXF",
            79,
            false,
        );
        // Position 80 (adjusted 2) reads 'T' against wild-type 'S';
        // position 84 (adjusted 6) reads 'F' against wild-type 'E'
        assert_eq!(mutations, vec!["ParC-80T".to_string(), "ParC-84F".to_string()]);
    }

    #[test]
    fn test_scan_gapped_skips_positions_before_start() {
        // subject_start of 80 places position 80 outside the aligned region
        let mutations = scan_gapped("ParC", &PARC_POSITIONS, "ASCDEF", "ATCDEF", 80, false);
        // Only position 84 (adjusted 5) is evaluated: hit 'E'... wild-type 'E'
        assert!(mutations.is_empty());
    }

    #[test]
    fn test_scan_gapped_out_of_range_position_skipped() {
        // Adjusted position 11 exceeds the two aligned residues; skipped,
        // not an error
        let mutations = scan_gapped("ParC", &[(80, 'S')], "AS", "AT", 70, false);
        assert!(mutations.is_empty());
    }
}
