// src/output.rs
//! Rebuild `summary.csv` and `details.csv` from the raw results of one or
//! more runs.

use std::path::{Path, PathBuf};

use crate::classify::{Coverage, Limits};
use crate::config::consts::{DETAILS_FILE, RAW_SUBDIR, SUMMARY_FILE};
use crate::error::Result;
use crate::record::QueryResult;
use crate::refine::IrreducibleReason;
use crate::store::{ensure_directory, scan_raw_dir, write_details_for, write_summary, SummaryRow};

#[derive(Debug, Default)]
pub struct OutputReport {
    pub results: usize,
    pub records: usize,
    /// Full six-character codes that are still censored.
    pub capped_full: Vec<String>,
    /// Raw files that could not be read; left out of both outputs.
    pub skipped: Vec<PathBuf>,
    pub summary_path: PathBuf,
    pub details_path: PathBuf,
}

/// A run directory (with a `raw/` subdirectory) or a raw directory itself.
fn raw_dir_of(dir: &Path) -> PathBuf {
    let nested = dir.join(RAW_SUBDIR);
    if nested.is_dir() { nested } else { dir.to_path_buf() }
}

pub fn summary_row(result: &QueryResult, limits: &Limits) -> SummaryRow {
    let coverage = result.coverage(limits);
    let irreducible = if coverage == Coverage::Censored && result.query.postal_code().is_full() {
        IrreducibleReason::FullPostalCode.to_string()
    } else {
        s!()
    };
    SummaryRow {
        postal_code: result.query.postal_code().to_string(),
        doctor_type: s!(result.query.doctor_type().key()),
        last_name: result.query.last_name().map(String::from).unwrap_or_default(),
        totalcount: result.total_count,
        coverage: s!(coverage.as_str()),
        round: None,
        irreducible,
    }
}

pub fn build_output(inputs: &[PathBuf], out_dir: &Path, limits: &Limits) -> Result<OutputReport> {
    let mut results = Vec::new();
    let mut skipped = Vec::new();
    for dir in inputs {
        let raw = raw_dir_of(dir);
        let (mut batch, mut bad) = scan_raw_dir(&raw, limits)?;
        logf!("{}: {} raw files, {} skipped", raw.display(), batch.len(), bad.len());
        results.append(&mut batch);
        skipped.append(&mut bad);
    }

    ensure_directory(out_dir)?;
    let rows: Vec<SummaryRow> = results.iter().map(|r| summary_row(r, limits)).collect();
    let capped_full: Vec<String> = rows
        .iter()
        .filter(|r| r.irreducible == IrreducibleReason::FullPostalCode.to_string())
        .map(|r| r.postal_code.clone())
        .collect();

    let summary_path = out_dir.join(SUMMARY_FILE);
    let details_path = out_dir.join(DETAILS_FILE);
    write_summary(&summary_path, &rows)?;
    let records = write_details_for(&details_path, &results)?;

    if !skipped.is_empty() {
        logw!("Skipped {} unreadable raw files", skipped.len());
    }
    if !capped_full.is_empty() {
        logw!("Found {} capped full postal codes", capped_full.len());
    }
    logf!(
        "Processed {} queries with {} unique records -> {}",
        results.len(),
        records,
        out_dir.display()
    );

    Ok(OutputReport { results: results.len(), records, capped_full, skipped, summary_path, details_path })
}
