//! External Tool Wrappers
//!
//! Invokes the BLAST binaries and the fallback pairwise aligner as blocking
//! subprocesses. Every invocation checks the exit status explicitly and maps
//! failures to [`ClassifyError::ExternalToolFailure`]; nothing is assumed
//! from a tool's side effects.

use anyhow::{Context, Result};
use std::env;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::ClassifyError;
use crate::seqio::FastaReader;

/// Resolves a tool name to an executable path via PATH.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() && path.exists() {
        return Ok(path.to_path_buf());
    }

    if let Ok(paths) = env::var("PATH") {
        for dir in env::split_paths(&paths) {
            let full_path = dir.join(name);
            if full_path.exists() && full_path.is_file() {
                return Ok(full_path);
            }
        }
    }

    anyhow::bail!("{} not found in PATH. Please install it or add it to your PATH.", name)
}

fn tool_failure(tool: &Path, detail: impl Into<String>) -> ClassifyError {
    ClassifyError::ExternalToolFailure {
        tool: tool
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| tool.display().to_string()),
        detail: detail.into(),
    }
}

fn stderr_detail(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exit code {:?}", output.status.code())
    } else {
        format!("exit code {:?}: {}", output.status.code(), stderr)
    }
}

// ============================================================================
// BLAST Databases
// ============================================================================

/// Builds the BLAST nucleotide database for a FASTA unless its `.nin` index
/// already exists beside it.
pub fn ensure_blast_db(fasta: &Path) -> Result<()> {
    let index = PathBuf::from(format!("{}.nin", fasta.display()));
    if index.exists() {
        return Ok(());
    }

    let makeblastdb = find_executable("makeblastdb")?;
    let output = Command::new(&makeblastdb)
        .arg("-dbtype")
        .arg("nucl")
        .arg("-in")
        .arg(fasta)
        .output()
        .with_context(|| format!("Failed to run makeblastdb on {}", fasta.display()))?;

    if !output.status.success() {
        return Err(tool_failure(&makeblastdb, stderr_detail(&output)).into());
    }

    Ok(())
}

// ============================================================================
// Search Invocations
// ============================================================================

/// Runs the nucleotide gene screen and returns the raw tabular output.
///
/// Identity filtering is applied here via `-perc_identity`; coverage
/// filtering happens downstream in the classification sweep. An empty
/// stdout simply means no hits.
pub fn run_gene_screen(
    blastn: &Path,
    db: &Path,
    contigs: &Path,
    min_identity: f64,
) -> Result<String> {
    let output = Command::new(blastn)
        .arg("-task")
        .arg("blastn")
        .arg("-db")
        .arg(db)
        .arg("-query")
        .arg(contigs)
        .args([
            "-outfmt",
            "6 sacc pident slen length score",
            "-ungapped",
            "-dust",
            "no",
            "-evalue",
            "1E-20",
            "-word_size",
            "32",
            "-max_target_seqs",
            "10000",
            "-culling_limit",
            "1",
        ])
        .arg("-perc_identity")
        .arg(min_identity.to_string())
        .output()
        .context("Failed to run blastn")?;

    if !output.status.success() {
        return Err(tool_failure(blastn, stderr_detail(&output)).into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs the translated QRDR screen and returns the raw tabular output.
pub fn run_qrdr_screen(blastx: &Path, db: &Path, contigs: &Path) -> Result<String> {
    let output = Command::new(blastx)
        .arg("-db")
        .arg(db)
        .arg("-query")
        .arg(contigs)
        .args([
            "-outfmt",
            "6 sacc sseq qseq gaps slen length sstart",
            "-ungapped",
            "-comp_based_stats",
            "F",
            "-culling_limit",
            "1",
            "-max_hsps",
            "1",
        ])
        .output()
        .context("Failed to run blastx")?;

    if !output.status.success() {
        return Err(tool_failure(blastx, stderr_detail(&output)).into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ============================================================================
// Pairwise Aligner
// ============================================================================

/// Fallback pairwise aligner for the QRDR realignment path.
///
/// Each invocation runs in its own scoped temporary directory so the input,
/// report and output files are uniquely named and removed on every exit
/// path, including failure. The subprocess is bounded by a timeout; on
/// expiry the child is killed and the invocation reported as a failure.
pub struct PairwiseAligner {
    program: PathBuf,
    timeout: Duration,
}

impl PairwiseAligner {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    /// Aligns the wild-type and hit amino-acid sequences, returning the
    /// gapped (wild-type, hit) pair.
    pub fn align(&self, wildtype_aa: &str, hit_aa: &str) -> Result<(String, String)> {
        let dir = tempfile::tempdir().context("Failed to create aligner scratch dir")?;
        let input_path = dir.path().join("seqs.fas");
        let aligned_path = dir.path().join("seqs.aln");

        {
            let mut input = BufWriter::new(
                std::fs::File::create(&input_path).context("Failed to write aligner input")?,
            );
            writeln!(input, ">wt\n{}", wildtype_aa)?;
            writeln!(input, ">hit\n{}", hit_aa)?;
        }

        let mut child = Command::new(&self.program)
            .arg(&input_path)
            .arg("-outfile")
            .arg(dir.path().join("report.txt"))
            .arg("-outseq")
            .arg(&aligned_path)
            .arg("-auto")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        let status = self.wait_bounded(&mut child)?;
        if !status.success() {
            return Err(tool_failure(&self.program, format!("exit code {:?}", status.code())).into());
        }

        read_alignment_output(&aligned_path, &self.program)
    }

    /// Waits for the child, killing it when the timeout expires. The
    /// external aligner has no built-in bound of its own.
    fn wait_bounded(&self, child: &mut std::process::Child) -> Result<std::process::ExitStatus> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() > self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(tool_failure(
                    &self.program,
                    format!("timed out after {:.0}s", self.timeout.as_secs_f64()),
                )
                .into());
            }
            std::thread::sleep(Duration::from_millis(25));
        }
    }
}

/// Parses the aligner's two-record gapped output: first record is the
/// wild-type, second the hit. Header labels are not interpreted.
fn read_alignment_output(path: &Path, program: &Path) -> Result<(String, String)> {
    let mut reader = FastaReader::open(path)
        .map_err(|e| tool_failure(program, format!("no alignment output: {}", e)))?;

    let wt = reader.read_next()?;
    let hit = reader.read_next()?;

    match (wt, hit) {
        (Some(wt), Some(hit)) if !wt.seq.is_empty() && !hit.seq.is_empty() => {
            Ok((wt.seq, hit.seq))
        }
        _ => Err(tool_failure(program, "alignment output missing expected records").into()),
    }
}

// ============================================================================
// Tests
// ============================================================================
