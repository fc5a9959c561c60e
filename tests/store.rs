// tests/store.rs
mod common;

use std::fs;

use cpso_scrape::input;
use cpso_scrape::output::build_output;
use cpso_scrape::permute::permute_file;
use cpso_scrape::store::{read_summary, SummaryRow};
use cpso_scrape::{Alphabet, FileStore, Limits, RecordStore, RegistryService};

use common::{root, FakeRegistry};

#[test]
fn raw_results_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeRegistry::new(2);
    let result = fake.query(&root("M5V")).unwrap();

    {
        let mut store = FileStore::open(dir.path(), Limits::default()).unwrap();
        store.save_raw(&result).unwrap();
        assert_eq!(store.append_consolidated(&result.records).unwrap(), 2);
    }

    let mut store = FileStore::open(dir.path(), Limits::default()).unwrap();
    assert_eq!(store.raw_results().unwrap(), vec![result.clone()]);
    assert_eq!(store.load_raw(&root("M5V")).unwrap(), Some(result.clone()));
    assert_eq!(store.load_raw(&root("M5W")).unwrap(), None);

    // Ids already in details.csv are not added twice.
    assert_eq!(store.consolidated_len(), 2);
    assert_eq!(store.append_consolidated(&result.records).unwrap(), 0);
}

#[test]
fn corrupt_raw_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path(), Limits::default()).unwrap();
    fs::write(store.raw_path(&root("K1A")), "{ not json").unwrap();
    assert!(store.load_raw(&root("K1A")).is_err());

    fs::write(store.raw_path(&root("K1A")), r#"{"postal_code": "K1A", "totalcount": -7}"#).unwrap();
    assert!(store.load_raw(&root("K1A")).is_err());
}

#[test]
fn output_merges_runs_and_reports_capped_codes() {
    let base = tempfile::tempdir().unwrap();
    let run_a = base.path().join("FSA_LDU0");
    let run_b = base.path().join("FSA_LDU3");
    let fake = FakeRegistry::new(1).with("K1A", -1).with("K1A0B1", -1);

    {
        let mut a = FileStore::open(&run_a, Limits::default()).unwrap();
        for q in ["K1A", "K1B", "L4C"] {
            a.save_raw(&fake.query(&root(q)).unwrap()).unwrap();
        }
        let mut b = FileStore::open(&run_b, Limits::default()).unwrap();
        let full = cpso_scrape::Query::new("K1A0B1".parse().unwrap(), Default::default(), None);
        b.save_raw(&fake.query(&full).unwrap()).unwrap();
    }

    let out = base.path().join("results");
    let report = build_output(&[run_a, run_b], &out, &Limits::default()).unwrap();

    assert_eq!(report.results, 4);
    assert_eq!(report.records, 2); // K1B0 and L4C0
    assert_eq!(report.capped_full, vec!["K1A0B1".to_string()]);
    assert!(report.skipped.is_empty());

    let rows: Vec<SummaryRow> = read_summary(&report.summary_path).unwrap();
    assert_eq!(rows.len(), 4);
    let k1a = rows.iter().find(|r| r.postal_code == "K1A").unwrap();
    assert_eq!(k1a.totalcount, -1);
    assert_eq!(k1a.coverage, "censored");
}

#[test]
fn summary_feeds_next_permutation() {
    let dir = tempfile::tempdir().unwrap();
    let summary = dir.path().join("summary.csv");
    fs::write(&summary, "postal_code,totalcount\nK1A,-1\nK1B,12\nK1C,0\nK1D0,-1\n").unwrap();

    let out = dir.path().join("search-criteria");
    let (perm, path) = permute_file(&summary, &out, 1, &Limits::default(), &Alphabet::default()).unwrap();
    assert_eq!(perm.parents.len(), 1);
    assert!(path.ends_with("FSA_LDU1.json"));

    let next = input::load_postal_codes(&path).unwrap();
    assert_eq!(next.len(), 10);
    assert_eq!(next[0].to_string(), "K1A0");
}

#[test]
fn output_skips_unreadable_raw_files() {
    let base = tempfile::tempdir().unwrap();
    let run = base.path().join("run");
    let fake = FakeRegistry::new(2);
    {
        let mut store = FileStore::open(&run, Limits::default()).unwrap();
        store.save_raw(&fake.query(&root("K1A")).unwrap()).unwrap();
    }
    let raw = run.join("raw");
    fs::write(raw.join("junk.json"), r#"{"postal_code": "K1B", "totalcount": 1, "results": [{"name": "x"}]}"#).unwrap();
    fs::write(raw.join("torn.json"), "{ \"postal_code\": ").unwrap();

    let out = base.path().join("results");
    let report = build_output(&[run], &out, &Limits::default()).unwrap();

    assert_eq!(report.results, 1);
    assert_eq!(report.records, 2);
    assert_eq!(report.skipped.len(), 2);
    assert!(report.skipped.iter().any(|p| p.ends_with("junk.json")));
    let details = fs::read_to_string(&report.details_path).unwrap();
    assert_eq!(details.lines().count(), 3);
    assert_eq!(read_summary(&report.summary_path).unwrap().len(), 1);
}
