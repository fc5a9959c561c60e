// src/permute.rs
//! One generation at a time: the manual counterpart of the closure driver.
//! Reads a summary of the previous run and writes the next generation of
//! postal codes to `FSA_LDU<level>.json`.

use std::path::{Path, PathBuf};

use crate::classify::{Coverage, Limits};
use crate::error::{Error, Result, StoreError};
use crate::input::{parse_entries, read_entries, Entry};
use crate::postal::{Alphabet, PostalCode, MAX_LDU_LEN};
use crate::query::{DoctorType, Query};
use crate::record::QueryResult;
use crate::refine::Refiner;

#[derive(Debug)]
pub struct Permutation {
    pub level: usize,
    /// Censored codes of depth `level - 1` that were expanded.
    pub parents: Vec<PostalCode>,
    pub codes: Vec<PostalCode>,
}

impl Permutation {
    pub fn file_name(&self) -> String {
        file_name(self.level)
    }
}

pub fn file_name(level: usize) -> String {
    format!("FSA_LDU{level}.json")
}

/// Entries without a count are taken as censored (a plain list of codes).
fn is_censored(entry: &Entry, limits: &Limits) -> bool {
    entry
        .totalcount
        .map_or(true, |n| crate::classify::classify(n, limits) == Coverage::Censored)
}

/// Next generation at `level` (1..=3) from summary entries.
pub fn permute(entries: &[Entry], source: &Path, level: usize, limits: &Limits, alphabet: &Alphabet) -> Result<Permutation> {
    if !(1..=MAX_LDU_LEN).contains(&level) {
        return Err(Error::Config(format!("level must be 1..={MAX_LDU_LEN}, got {level}")));
    }
    let censored: Vec<Entry> = entries.iter().filter(|e| is_censored(e, limits)).cloned().collect();
    let parents: Vec<PostalCode> = parse_entries(source, &censored)?
        .into_iter()
        .filter(|c| c.depth() == level - 1)
        .collect();
    logf!(
        "{} of {} entries censored, {} at depth {}",
        censored.len(),
        entries.len(),
        parents.len(),
        level - 1
    );

    // Reuse the refiner so the expansion matches what a crawl would issue.
    let refiner = Refiner::new(*limits, alphabet.clone());
    let results: Vec<QueryResult> = parents
        .iter()
        .map(|p| QueryResult::new(Query::new(p.clone(), DoctorType::Any, None), limits.sentinel(), Vec::new()))
        .collect();
    let next = refiner.generate_next_generation(results.iter())?;
    let codes = next.queries.into_iter().map(|q| q.postal_code().clone()).collect();

    Ok(Permutation { level, parents, codes })
}

/// Reads `summary`, writes `<out_dir>/FSA_LDU<level>.json`.
pub fn permute_file(summary: &Path, out_dir: &Path, level: usize, limits: &Limits, alphabet: &Alphabet) -> Result<(Permutation, PathBuf)> {
    let entries = read_entries(summary)?;
    let perm = permute(&entries, summary, level, limits, alphabet)?;

    let path = out_dir.join(perm.file_name());
    write_codes(&path, &perm.codes)?;
    logf!("Saved {} permutations to {}", perm.codes.len(), path.display());
    Ok((perm, path))
}

/// JSON array of compact codes; what `input` reads back.
pub fn write_codes(path: &Path, codes: &[PostalCode]) -> Result<(), StoreError> {
    let list: Vec<String> = codes.iter().map(PostalCode::to_string).collect();
    let json = serde_json::to_vec_pretty(&list).map_err(|e| StoreError::json(path, e))?;
    crate::store::write_atomic(path, &json)
}
