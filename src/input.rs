// src/input.rs
//! Seed files: postal codes to query, in whatever shape earlier steps left
//! them.
//!
//! * `.json`: an array of strings, or of objects with a `postal_code` field
//!   (and optionally `totalcount`)
//! * `.csv`: the `postal_code` column, or the first column
//! * anything else: one code per non-empty line

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result, StoreError};
use crate::postal::PostalCode;
use crate::query::{DoctorType, Query};

/// One entry of a seed file before parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub postal_code: String,
    pub totalcount: Option<i64>,
}

impl Entry {
    fn bare(code: &str) -> Self {
        Self { postal_code: s!(code.trim()), totalcount: None }
    }
}

pub fn read_entries(path: &Path) -> Result<Vec<Entry>> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let entries = match ext.as_str() {
        "json" => read_json(path)?,
        "csv" => read_csv(path)?,
        _ => {
            let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(Entry::bare)
                .collect()
        }
    };
    Ok(entries)
}

fn read_json(path: &Path) -> Result<Vec<Entry>> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let value: Value = serde_json::from_str(&text).map_err(|e| StoreError::json(path, e))?;
    let Value::Array(items) = value else {
        return Err(input_error(path, "expected a JSON array"));
    };

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item {
            Value::String(code) => out.push(Entry::bare(code)),
            Value::Object(obj) => {
                let Some(code) = obj.get("postal_code").and_then(Value::as_str) else {
                    return Err(input_error(path, format!("item {i}: no postal_code")));
                };
                out.push(Entry {
                    postal_code: s!(code.trim()),
                    totalcount: obj.get("totalcount").and_then(Value::as_i64),
                });
            }
            other => return Err(input_error(path, format!("item {i}: unexpected {other}"))),
        }
    }
    Ok(out)
}

fn read_csv(path: &Path) -> Result<Vec<Entry>> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| StoreError::csv(path, e))?;
    let headers = rdr.headers().map_err(|e| StoreError::csv(path, e))?.clone();
    let code_col = headers.iter().position(|h| h.trim() == "postal_code").unwrap_or(0);
    let count_col = headers.iter().position(|h| h.trim() == "totalcount");

    let mut out = Vec::new();
    for row in rdr.records() {
        let row = row.map_err(|e| StoreError::csv(path, e))?;
        let Some(code) = row.get(code_col).map(str::trim).filter(|c| !c.is_empty()) else {
            continue;
        };
        let totalcount = count_col
            .and_then(|c| row.get(c))
            .and_then(|v| v.trim().parse::<i64>().ok());
        out.push(Entry { postal_code: s!(code), totalcount });
    }
    Ok(out)
}

/// Parses every entry; any bad one rejects the whole file so nothing is
/// queried from a half-valid seed. Duplicates are dropped, order kept.
pub fn parse_entries(path: &Path, entries: &[Entry]) -> Result<Vec<PostalCode>> {
    let mut seen = HashSet::new();
    let mut codes = Vec::with_capacity(entries.len());
    let mut bad = Vec::new();
    for entry in entries {
        match PostalCode::parse(&entry.postal_code) {
            Ok(code) => {
                if seen.insert(code.clone()) {
                    codes.push(code);
                }
            }
            Err(e) => bad.push(e.to_string()),
        }
    }
    if !bad.is_empty() {
        for b in &bad {
            loge!("{}: {b}", path.display());
        }
        return Err(input_error(path, format!("{} invalid postal code(s), first: {}", bad.len(), bad[0])));
    }
    Ok(codes)
}

pub fn load_postal_codes(path: &Path) -> Result<Vec<PostalCode>> {
    let entries = read_entries(path)?;
    let codes = parse_entries(path, &entries)?;
    logf!("Loaded {} postal codes from {}", codes.len(), path.display());
    Ok(codes)
}

/// Every code of the file combined with the same filters.
pub fn load_queries(path: &Path, doctor_type: DoctorType, last_name: Option<&str>) -> Result<Vec<Query>> {
    Ok(load_postal_codes(path)?
        .into_iter()
        .map(|code| Query::new(code, doctor_type, last_name))
        .collect())
}

fn input_error(path: &Path, msg: impl Into<String>) -> Error {
    Error::Input { path: path.to_path_buf(), msg: msg.into() }
}
