//! resclass - Resistance Gene Classification and QRDR Mutation Screening
//!
//! Screens assembled genome contigs for antimicrobial-resistance
//! determinants: gene hits from a nucleotide search are filtered, mapped to
//! resistance classes and annotated with allele-quality markers, while
//! quinolone-resistance loci are checked per-residue for point mutations,
//! realigning against the wild-type reference when the search alignment is
//! not gap-free.
//!
//! # Modules
//! - `gene_table`: reference table mapping gene variants to resistance classes
//! - `classify`: hit filtering, allele annotation and per-class aggregation
//! - `qrdr`: QRDR point-mutation detection with gapped coordinate mapping
//! - `blast`: BLAST and pairwise-aligner subprocess wrappers
//! - `seqio`: FASTA reading for aligner output
//! - `report`: delimited per-sample report rendering
//! - `error`: classification error taxonomy

pub mod blast;
pub mod classify;
pub mod error;
pub mod gene_table;
pub mod qrdr;
pub mod report;
pub mod seqio;
