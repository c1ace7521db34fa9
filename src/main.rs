use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use resclass::blast::{self, PairwiseAligner};
use resclass::classify::{classify_hits, ClassHitMap};
use resclass::gene_table::GeneClassTable;
use resclass::qrdr::QrdrDetector;
use resclass::report;

fn parse_percent(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.0..=100.0).contains(&val) {
        Err(format!("Percentage must be between 0 and 100, got {}", val))
    } else {
        Ok(val)
    }
}

#[derive(Parser)]
#[command(name = "resclass")]
#[command(version)]
#[command(about = "Screen assembled contigs for resistance genes, summarised by class")]
#[command(long_about = r#"
resclass - resistance gene classification from assembled contigs

Screens each contig file against a resistance gene database, maps accepted
hits to resistance classes via a reference class table, and optionally checks
quinolone-resistance loci (QRDR) for point mutations.

WORKFLOW:
  Contigs → blastn gene screen → class lookup + allele annotation
          → (optional) blastx QRDR screen → per-residue mutation check

OUTPUT (stdout, tab-delimited):
  One header row ("strain" + reportable classes), then one row per contig
  file. Cells hold ';'-joined allele calls in hit order, or '-' for none.
  Imprecise matches carry '*', partial matches '?'. QRDR mutations appear
  under the Flq column as gene-position-residue, e.g. GyrA-83F.

EXAMPLES:
  # Gene screen only
  resclass -s ARGannot.fasta -t ARGannot_clustered80.csv sampleA.fasta

  # With QRDR mutation detection
  resclass -s ARGannot.fasta -t ARGannot_clustered80.csv -q qrdr.fasta \
           sampleA.fasta sampleB.fasta
"#)]
struct Args {
    /// Resistance gene sequences to screen for
    #[arg(short = 's', long = "seqs", value_name = "FASTA", help_heading = "Databases")]
    seqs: PathBuf,

    /// Resistance gene class table (CSV)
    #[arg(short = 't', long = "classes", value_name = "CSV", help_heading = "Databases")]
    classes: PathBuf,

    /// QRDR sequences; supplying this enables mutation detection
    #[arg(short = 'q', long = "qrdr", value_name = "FASTA", help_heading = "Databases")]
    qrdr: Option<PathBuf>,

    /// Minimum percent identity for gene hits
    #[arg(short = 'm', long = "min-ident", value_name = "PERCENT",
          default_value = "90", value_parser = parse_percent, help_heading = "Thresholds")]
    min_identity: f64,

    /// Minimum percent coverage for gene hits (exclusive boundary)
    #[arg(short = 'c', long = "min-cov", value_name = "PERCENT",
          default_value = "80", value_parser = parse_percent, help_heading = "Thresholds")]
    min_coverage: f64,

    /// Pairwise aligner used for the QRDR realignment path
    #[arg(long, value_name = "PROG", default_value = "edialign", help_heading = "Runtime")]
    aligner: String,

    /// Kill the pairwise aligner after this many seconds
    #[arg(long = "aligner-timeout", value_name = "SECONDS", default_value = "60",
          help_heading = "Runtime")]
    aligner_timeout: u64,

    #[arg(short = 'v', long, help_heading = "Output")]
    verbose: bool,

    /// Assembled contig files, one sample each, processed in the order given
    #[arg(value_name = "CONTIGS", required = true)]
    contigs: Vec<PathBuf>,
}

/// Everything the QRDR sweep needs, resolved once at startup.
struct QrdrTools {
    blastx: PathBuf,
    db: PathBuf,
    aligner: PairwiseAligner,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let start_time = Instant::now();

    let table = GeneClassTable::from_path(&args.classes)
        .with_context(|| format!("Failed to load class table: {}", args.classes.display()))?;
    if table.is_empty() {
        anyhow::bail!("Class table contains no gene records: {}", args.classes.display());
    }

    if args.verbose {
        eprintln!(
            "Loaded {} gene variants, {} reportable classes",
            table.len(),
            table.report_classes().len()
        );
    }

    let blastn = blast::find_executable("blastn")?;
    blast::ensure_blast_db(&args.seqs)?;

    let qrdr_tools = match &args.qrdr {
        Some(db) => {
            let blastx = blast::find_executable("blastx")?;
            let aligner_path = blast::find_executable(&args.aligner)?;
            blast::ensure_blast_db(db)?;
            Some(QrdrTools {
                blastx,
                db: db.clone(),
                aligner: PairwiseAligner::new(
                    aligner_path,
                    Duration::from_secs(args.aligner_timeout),
                ),
            })
        }
        None => None,
    };

    println!("{}", report::header_row(table.report_classes()));

    let mut failures = 0usize;
    for contigs in &args.contigs {
        match process_sample(contigs, &args, &table, &blastn, qrdr_tools.as_ref()) {
            Ok(row) => println!("{}", row),
            Err(e) => {
                failures += 1;
                eprintln!("ERROR processing {}: {:#}", contigs.display(), e);
            }
        }
    }

    if args.verbose {
        eprintln!("\nTotal time: {:.1}s", start_time.elapsed().as_secs_f64());
    }

    if failures > 0 {
        anyhow::bail!("{} of {} samples failed", failures, args.contigs.len());
    }

    Ok(())
}

fn sample_name(contigs: &Path) -> String {
    contigs
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| contigs.display().to_string())
}

fn process_sample(
    contigs: &Path,
    args: &Args,
    table: &GeneClassTable,
    blastn: &Path,
    qrdr_tools: Option<&QrdrTools>,
) -> Result<String> {
    if !contigs.exists() {
        anyhow::bail!("Contig file not found: {}", contigs.display());
    }

    let name = sample_name(contigs);
    let mut hits = ClassHitMap::new();

    if args.verbose {
        eprintln!("=== Processing sample: {} ===", name);
    }

    let gene_output = blast::run_gene_screen(blastn, &args.seqs, contigs, args.min_identity)?;
    classify_hits(&gene_output, table, args.min_coverage, &mut hits)?;

    if let Some(tools) = qrdr_tools {
        let qrdr_output = blast::run_qrdr_screen(&tools.blastx, &tools.db, contigs)?;
        let mut detector = QrdrDetector::new(&tools.aligner, args.verbose);
        detector.detect(&qrdr_output, &mut hits)?;
    }

    Ok(report::render_row(&name, table.report_classes(), &hits))
}
