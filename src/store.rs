// src/store.rs
//! Persistence for query results.
//!
//! Layout under a run directory:
//! ```text
//! <root>/raw/<query key>.json   one file per query, written before refinement
//! <root>/details.csv            every record seen, one row per cpsonumber
//! <root>/summary.csv            one row per query ever issued
//! ```
//! Writes go to a temp file and are renamed into place, so a crash never
//! leaves a half-written file behind.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::classify::Limits;
use crate::config::consts::{DETAILS_FILE, RAW_SUBDIR, SUMMARY_FILE};
use crate::core::sanitize::{format_phone, sanitize_filename};
use crate::error::StoreError;
use crate::postal::PostalCode;
use crate::query::{DoctorType, Query};
use crate::record::{QueryResult, Record, RECORD_ID_FIELD};

/// Columns reformatted as `(XXX) XXX-XXXX` in the consolidated output.
pub const PHONE_FIELDS: &[&str] = &["phonenumber", "fax"];

pub trait RecordStore {
    fn save_raw(&mut self, result: &QueryResult) -> Result<(), StoreError>;

    /// `None` when nothing was stored for this query.
    fn load_raw(&self, query: &Query) -> Result<Option<QueryResult>, StoreError>;

    /// Adds records whose id is new; returns how many were added.
    fn append_consolidated(&mut self, records: &[Record]) -> Result<usize, StoreError>;
}

/* ---------------- Raw files ---------------- */

/// On-disk shape of one query's result. Also reads files written by older
/// runs that only carried `postal_code`, `totalcount` and `results`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RawFile {
    pub postal_code: String,
    #[serde(default = "any_doctor")]
    pub doctor_type: String,
    #[serde(default)]
    pub last_name: Option<String>,
    pub totalcount: i64,
    #[serde(default)]
    pub results: Option<Vec<Value>>,
}

fn any_doctor() -> String {
    s!(DoctorType::Any.key())
}

impl RawFile {
    pub fn from_result(result: &QueryResult) -> Self {
        let q = &result.query;
        Self {
            postal_code: q.postal_code().to_string(),
            doctor_type: s!(q.doctor_type().key()),
            last_name: q.last_name().map(String::from),
            totalcount: result.total_count,
            results: Some(result.records.iter().map(Record::to_json).collect()),
        }
    }

    pub fn query(&self) -> Result<Query, String> {
        let postal = PostalCode::parse(&self.postal_code).map_err(|e| e.to_string())?;
        let doctor: DoctorType = self.doctor_type.parse()?;
        Ok(Query::new(postal, doctor, self.last_name.as_deref()))
    }

    pub fn into_result(self, limits: &Limits) -> Result<QueryResult, String> {
        let query = self.query()?;
        if !limits.is_valid_count(self.totalcount) {
            return Err(format!("totalcount {} is not a valid count", self.totalcount));
        }
        let records = self
            .results
            .unwrap_or_default()
            .into_iter()
            .map(Record::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryResult::new(query, self.totalcount, records))
    }
}

pub fn read_raw_file(path: &Path, limits: &Limits) -> Result<QueryResult, StoreError> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let raw: RawFile = serde_json::from_str(&text).map_err(|e| StoreError::json(path, e))?;
    raw.into_result(limits).map_err(|msg| StoreError::corrupt(path, msg))
}

/* ---------------- Summary ---------------- */

/// One line of `summary.csv`. Only `postal_code` and `totalcount` are
/// required when reading, so hand-made or older summaries load too.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub postal_code: String,
    #[serde(default)]
    pub doctor_type: String,
    #[serde(default)]
    pub last_name: String,
    pub totalcount: i64,
    #[serde(default)]
    pub coverage: String,
    #[serde(default)]
    pub round: Option<usize>,
    #[serde(default)]
    pub irreducible: String,
}

pub fn write_summary(path: &Path, rows: &[SummaryRow]) -> Result<(), StoreError> {
    let mut w = csv::Writer::from_writer(Vec::new());
    for row in rows {
        w.serialize(row).map_err(|e| StoreError::csv(path, e))?;
    }
    let bytes = w.into_inner().map_err(|e| StoreError::io(path, e.into_error()))?;
    write_atomic(path, &bytes)
}

pub fn read_summary(path: &Path) -> Result<Vec<SummaryRow>, StoreError> {
    let mut r = csv::Reader::from_path(path).map_err(|e| StoreError::csv(path, e))?;
    r.deserialize()
        .collect::<Result<Vec<SummaryRow>, _>>()
        .map_err(|e| StoreError::csv(path, e))
}

/* ---------------- Consolidated records ---------------- */

fn cell(field: &str, value: Option<&Value>) -> String {
    let text = match value {
        None | Some(Value::Null) => s!(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if PHONE_FIELDS.contains(&field) {
        format_phone(&text).unwrap_or_default()
    } else {
        text
    }
}

/// `cpsonumber` first, then every other field name in sorted order.
fn details_header(records: &BTreeMap<String, Map<String, Value>>) -> Vec<String> {
    let rest: BTreeSet<&String> = records
        .values()
        .flat_map(|m| m.keys())
        .filter(|k| k.as_str() != RECORD_ID_FIELD)
        .collect();
    std::iter::once(s!(RECORD_ID_FIELD))
        .chain(rest.into_iter().cloned())
        .collect()
}

fn write_details(path: &Path, records: &BTreeMap<String, Map<String, Value>>) -> Result<(), StoreError> {
    let header = details_header(records);
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(&header).map_err(|e| StoreError::csv(path, e))?;
    for (id, fields) in records {
        let row: Vec<String> = header
            .iter()
            .map(|h| if h == RECORD_ID_FIELD { id.clone() } else { cell(h, fields.get(h)) })
            .collect();
        w.write_record(&row).map_err(|e| StoreError::csv(path, e))?;
    }
    let bytes = w.into_inner().map_err(|e| StoreError::io(path, e.into_error()))?;
    write_atomic(path, &bytes)
}

fn read_details(path: &Path) -> Result<BTreeMap<String, Map<String, Value>>, StoreError> {
    let mut out = BTreeMap::new();
    let mut r = csv::Reader::from_path(path).map_err(|e| StoreError::csv(path, e))?;
    let header = r.headers().map_err(|e| StoreError::csv(path, e))?.clone();
    for row in r.records() {
        let row = row.map_err(|e| StoreError::csv(path, e))?;
        let fields: Map<String, Value> = header
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (s!(h), Value::String(s!(v))))
            .collect();
        match fields.get(RECORD_ID_FIELD).and_then(Value::as_str) {
            Some(id) if !id.is_empty() => {
                out.insert(s!(id), fields);
            }
            _ => logw!("{}: row without {RECORD_ID_FIELD} skipped", path.display()),
        }
    }
    Ok(out)
}

/// Merge records into `into`, first occurrence of an id wins.
fn merge_records(into: &mut BTreeMap<String, Map<String, Value>>, records: &[Record]) -> usize {
    let mut added = 0;
    for rec in records {
        if !into.contains_key(rec.id()) {
            into.insert(s!(rec.id()), rec.fields().clone());
            added += 1;
        }
    }
    added
}

/* ---------------- File store ---------------- */

pub struct FileStore {
    root: PathBuf,
    limits: Limits,
    consolidated: BTreeMap<String, Map<String, Value>>,
}

impl FileStore {
    /// Creates the layout if missing and loads ids already in `details.csv`.
    pub fn open(root: impl Into<PathBuf>, limits: Limits) -> Result<Self, StoreError> {
        let root = root.into();
        let raw = root.join(RAW_SUBDIR);
        ensure_directory(&raw)?;

        let details = root.join(DETAILS_FILE);
        let consolidated = if details.exists() { read_details(&details)? } else { BTreeMap::new() };
        if !consolidated.is_empty() {
            logd!("{}: {} records already consolidated", details.display(), consolidated.len());
        }
        Ok(Self { root, limits, consolidated })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join(RAW_SUBDIR)
    }

    pub fn raw_path(&self, query: &Query) -> PathBuf {
        self.raw_dir().join(format!("{}.json", sanitize_filename(&query.key())))
    }

    pub fn details_path(&self) -> PathBuf {
        self.root.join(DETAILS_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join(SUMMARY_FILE)
    }

    pub fn consolidated_len(&self) -> usize {
        self.consolidated.len()
    }

    pub fn contains_record(&self, id: &str) -> bool {
        self.consolidated.contains_key(id)
    }

    /// Every raw result in this store, in file-name order.
    pub fn raw_results(&self) -> Result<Vec<QueryResult>, StoreError> {
        read_raw_dir(&self.raw_dir(), &self.limits)
    }

    pub fn write_summary(&self, rows: &[SummaryRow]) -> Result<PathBuf, StoreError> {
        let path = self.summary_path();
        write_summary(&path, rows)?;
        Ok(path)
    }
}

impl RecordStore for FileStore {
    fn save_raw(&mut self, result: &QueryResult) -> Result<(), StoreError> {
        let path = self.raw_path(&result.query);
        let json = serde_json::to_vec_pretty(&RawFile::from_result(result))
            .map_err(|e| StoreError::json(&path, e))?;
        write_atomic(&path, &json)?;
        logd!("Saved {}", path.display());
        Ok(())
    }

    fn load_raw(&self, query: &Query) -> Result<Option<QueryResult>, StoreError> {
        let path = self.raw_path(query);
        if !path.exists() {
            return Ok(None);
        }
        let result = read_raw_file(&path, &self.limits)?;
        if &result.query != query {
            // Two keys that sanitize to the same file name.
            logw!("{} holds {}, not {}", path.display(), result.query.key(), query.key());
            return Ok(None);
        }
        Ok(Some(result))
    }

    fn append_consolidated(&mut self, records: &[Record]) -> Result<usize, StoreError> {
        let added = merge_records(&mut self.consolidated, records);
        if added > 0 {
            write_details(&self.details_path(), &self.consolidated)?;
        }
        Ok(added)
    }
}

/// Keeps everything in memory. For dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    raw: HashMap<String, QueryResult>,
    consolidated: BTreeMap<String, Map<String, Value>>,
    pub saves: usize,
}

impl MemoryStore {
    pub fn consolidated_ids(&self) -> Vec<String> {
        self.consolidated.keys().cloned().collect()
    }

    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }
}

impl RecordStore for MemoryStore {
    fn save_raw(&mut self, result: &QueryResult) -> Result<(), StoreError> {
        self.saves += 1;
        self.raw.insert(result.query.key(), result.clone());
        Ok(())
    }

    fn load_raw(&self, query: &Query) -> Result<Option<QueryResult>, StoreError> {
        Ok(self.raw.get(&query.key()).cloned())
    }

    fn append_consolidated(&mut self, records: &[Record]) -> Result<usize, StoreError> {
        Ok(merge_records(&mut self.consolidated, records))
    }
}

/* ---------------- helpers ---------------- */

fn raw_paths(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))? {
        let path = entry.map_err(|e| StoreError::io(dir, e))?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// All `*.json` results directly under `dir`, in file-name order. Any bad
/// file is an error.
pub fn read_raw_dir(dir: &Path, limits: &Limits) -> Result<Vec<QueryResult>, StoreError> {
    raw_paths(dir)?.iter().map(|p| read_raw_file(p, limits)).collect()
}

/// Like `read_raw_dir`, but a file that does not load is logged and
/// returned in the second list instead of failing the scan.
pub fn scan_raw_dir(dir: &Path, limits: &Limits) -> Result<(Vec<QueryResult>, Vec<PathBuf>), StoreError> {
    let mut results = Vec::new();
    let mut skipped = Vec::new();
    for path in raw_paths(dir)? {
        match read_raw_file(&path, limits) {
            Ok(r) => results.push(r),
            Err(e) => {
                loge!("Skipping {e}");
                skipped.push(path);
            }
        }
    }
    Ok((results, skipped))
}

/// Consolidated CSV for an arbitrary set of results (the `output` step).
pub fn write_details_for(path: &Path, results: &[QueryResult]) -> Result<usize, StoreError> {
    let mut all = BTreeMap::new();
    for r in results {
        merge_records(&mut all, &r.records);
    }
    write_details(path, &all)?;
    Ok(all.len())
}

pub fn ensure_directory(dir: &Path) -> Result<(), StoreError> {
    if dir.exists() && !dir.is_dir() {
        return Err(StoreError::corrupt(dir, "path exists but is not a directory"));
    }
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: i64, phone: &str) -> Record {
        Record::from_json(json!({ "cpsonumber": id, "name": format!("Dr {id}"), "phonenumber": phone }))
            .unwrap()
    }

    #[test]
    fn header_puts_id_first() {
        let mut m = BTreeMap::new();
        merge_records(&mut m, &[rec(1, "")]);
        assert_eq!(details_header(&m), vec!["cpsonumber", "name", "phonenumber"]);
    }

    #[test]
    fn phone_cells_formatted_or_blank() {
        assert_eq!(cell("phonenumber", Some(&json!("6135550100"))), "(613) 555-0100");
        assert_eq!(cell("fax", Some(&json!("12"))), "");
        assert_eq!(cell("name", Some(&json!(12))), "12");
        assert_eq!(cell("name", None), "");
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let mut m = BTreeMap::new();
        assert_eq!(merge_records(&mut m, &[rec(1, "a"), rec(2, "b"), rec(1, "c")]), 2);
        assert_eq!(m["1"]["phonenumber"], "a");
    }

    #[test]
    fn legacy_raw_file_loads() {
        let raw: RawFile = serde_json::from_str(
            r#"{"postal_code": "K1A+0", "totalcount": 1, "results": [{"cpsonumber": 7}]}"#,
        )
        .unwrap();
        let r = raw.into_result(&Limits::default()).unwrap();
        assert_eq!(r.query.key(), "K1A0+Any+Any");
        assert_eq!(r.records[0].id(), "7");
    }
}
