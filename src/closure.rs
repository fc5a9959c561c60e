// src/closure.rs
//! Coverage closure: issue queries round by round until nothing censored is
//! left to refine.
//!
//! Each round dispatches its pending queries on a bounded pool of worker
//! threads, persists every result, classifies, and only then builds the next
//! round. The round boundary is a barrier. A query that fails is
//! re-dispatched on its own (never a query that already succeeded); if it
//! keeps failing the run stops at that round boundary, and a rerun against
//! the same store picks up where it left off because stored results are
//! reused instead of re-fetched.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use crate::classify::Coverage;
use crate::error::Result;
use crate::progress::Progress;
use crate::query::Query;
use crate::record::QueryResult;
use crate::refine::{IrreducibleReason, Refiner};
use crate::registry::{RegistryService, ServiceError};
use crate::store::{RecordStore, SummaryRow};

/* ---------------- Summary ---------------- */

/// What happened to one query. Written once, never replaced.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryEntry {
    pub query: Query,
    pub total_count: i64,
    pub coverage: Coverage,
    pub round: usize,
    pub irreducible: Option<IrreducibleReason>,
    /// Taken from the store instead of the register.
    pub resumed: bool,
}

impl SummaryEntry {
    /// Complete, empty or irreducible: what consolidation consumes.
    pub fn is_terminal(&self) -> bool {
        self.coverage != Coverage::Censored || self.irreducible.is_some()
    }

    pub fn to_row(&self) -> SummaryRow {
        SummaryRow {
            postal_code: self.query.postal_code().to_string(),
            doctor_type: s!(self.query.doctor_type().key()),
            last_name: self.query.last_name().map(String::from).unwrap_or_default(),
            totalcount: self.total_count,
            coverage: s!(self.coverage.as_str()),
            round: Some(self.round),
            irreducible: self.irreducible.map(|r| r.to_string()).unwrap_or_default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    pub empty: usize,
    pub complete: usize,
    pub censored: usize,
    pub irreducible: usize,
}

/// Append-only record of every query issued, in issue order.
#[derive(Debug, Default)]
pub struct Summary {
    entries: Vec<SummaryEntry>,
    index: HashMap<String, usize>,
    /// Queries that still had no result when the run stopped.
    pub failed: Vec<(Query, ServiceError)>,
    pub rounds: usize,
    pub stopped_at_round: Option<usize>,
}

impl Summary {
    /// `false` (and no change) if the query is already recorded.
    fn record(&mut self, entry: SummaryEntry) -> bool {
        let key = entry.query.key();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(entry);
        true
    }

    pub fn contains(&self, query: &Query) -> bool {
        self.index.contains_key(&query.key())
    }

    pub fn get(&self, query: &Query) -> Option<&SummaryEntry> {
        self.index.get(&query.key()).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[SummaryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn terminal(&self) -> impl Iterator<Item = &SummaryEntry> {
        self.entries.iter().filter(|e| e.is_terminal())
    }

    pub fn irreducible(&self) -> impl Iterator<Item = &SummaryEntry> {
        self.entries.iter().filter(|e| e.irreducible.is_some())
    }

    /// Every round ran to its barrier and nothing is left pending.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.stopped_at_round.is_none()
    }

    pub fn counts(&self) -> Counts {
        let mut c = Counts::default();
        for e in &self.entries {
            match e.coverage {
                Coverage::Empty => c.empty += 1,
                Coverage::Complete => c.complete += 1,
                Coverage::Censored => c.censored += 1,
            }
            if e.irreducible.is_some() {
                c.irreducible += 1;
            }
        }
        c
    }

    pub fn to_rows(&self) -> Vec<SummaryRow> {
        self.entries.iter().map(SummaryEntry::to_row).collect()
    }
}

/* ---------------- Dispatch ---------------- */

/// Run `queries` on up to `workers` threads. Results come back in input
/// order; `progress` is driven from the calling thread.
pub fn dispatch<S>(
    service: &S,
    queries: &[Query],
    workers: usize,
    progress: &mut dyn Progress,
) -> Vec<Result<QueryResult, ServiceError>>
where
    S: RegistryService + ?Sized,
{
    let n = queries.len();
    if n == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, n);
    let counter = AtomicUsize::new(0);
    let mut slots: Vec<Option<Result<QueryResult, ServiceError>>> = (0..n).map(|_| None).collect();

    progress.begin(n);

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<(usize, Result<QueryResult, ServiceError>)>();

        for _ in 0..workers {
            let tx = tx.clone();
            let counter = &counter;
            scope.spawn(move || {
                loop {
                    let i = counter.fetch_add(1, Ordering::Relaxed);
                    if i >= n {
                        break;
                    }
                    logd!("Dispatch {}", queries[i].key());
                    let result = service.query(&queries[i]);
                    if tx.send((i, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx); // this thread is sole receiver now

        for (i, result) in rx {
            match &result {
                Ok(_) => progress.item_done(&queries[i].key()),
                Err(e) => progress.item_failed(&queries[i].key(), &e.to_string()),
            }
            slots[i] = Some(result);
        }
    });

    progress.finish();

    slots
        .into_iter()
        .map(|s| s.unwrap_or_else(|| Err(ServiceError::Transport(s!("worker exited without a result")))))
        .collect()
}

/* ---------------- Driver ---------------- */

pub struct ClosureDriver<'a, S: ?Sized, R: ?Sized> {
    service: &'a S,
    store: &'a mut R,
    refiner: Refiner,
    workers: usize,
    round_attempts: usize,
}

impl<'a, S, R> ClosureDriver<'a, S, R>
where
    S: RegistryService + ?Sized,
    R: RecordStore + ?Sized,
{
    /// `refiner` carries the limits, alphabet and `max_depth`.
    pub fn new(service: &'a S, store: &'a mut R, refiner: Refiner) -> Self {
        Self { service, store, refiner, workers: 1, round_attempts: 1 }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Dispatch passes per round for queries that keep failing.
    pub fn round_attempts(mut self, attempts: usize) -> Self {
        self.round_attempts = attempts.max(1);
        self
    }

    /// Errors only for persistence failures and refinement invariant
    /// violations. Service failures end up in `Summary::failed`.
    pub fn run(&mut self, initial: Vec<Query>, progress: &mut dyn Progress) -> Result<Summary> {
        let mut summary = Summary::default();
        let mut pending = dedup(initial);
        let mut round = 0usize;

        while !pending.is_empty() {
            pending.retain(|q| !summary.contains(q));
            if pending.is_empty() {
                break;
            }
            progress.log(&format!("Round {round}: {} queries", pending.len()));

            let (results, resumed, failed) = self.collect_round(&pending, progress)?;

            // Barrier: every result of this round is persisted before refining.
            let records: Vec<_> = results.iter().flat_map(|r| r.records.iter().cloned()).collect();
            let added = self.store.append_consolidated(&records)?;

            let next = self.refiner.generate_next_generation(results.iter())?;
            let irreducible: HashMap<String, IrreducibleReason> =
                next.irreducible.iter().map(|(q, r)| (q.key(), *r)).collect();

            for result in &results {
                let key = result.query.key();
                summary.record(SummaryEntry {
                    query: result.query.clone(),
                    total_count: result.total_count,
                    coverage: result.coverage(self.refiner.limits()),
                    round,
                    irreducible: irreducible.get(&key).copied(),
                    resumed: resumed.contains(&key),
                });
            }
            for (q, reason) in &next.irreducible {
                logw!("Irreducible {} ({reason}): needs another filter", q.key());
            }

            let tally = |c: Coverage| results.iter().filter(|r| r.coverage(self.refiner.limits()) == c).count();
            logf!(
                "Round {round}: {} dispatched, {} resumed, {} complete, {} empty, {} censored, {} irreducible, {} failed; {} new records, {} queued",
                pending.len() - resumed.len(),
                resumed.len(),
                tally(Coverage::Complete),
                tally(Coverage::Empty),
                tally(Coverage::Censored),
                next.irreducible.len(),
                failed.len(),
                added,
                next.queries.len()
            );
            summary.rounds = round + 1;

            if !failed.is_empty() {
                summary.failed = failed;
                summary.stopped_at_round = Some(round);
                return Ok(summary);
            }

            pending = next.queries;
            round += 1;
        }

        Ok(summary)
    }

    /// Results for every pending query in input order, the keys that came
    /// from the store, and whatever still failed after all passes.
    fn collect_round(
        &mut self,
        pending: &[Query],
        progress: &mut dyn Progress,
    ) -> Result<(Vec<QueryResult>, HashSet<String>, Vec<(Query, ServiceError)>)> {
        let mut slots: Vec<Option<QueryResult>> = Vec::with_capacity(pending.len());
        let mut resumed = HashSet::new();
        for q in pending {
            let stored = self.store.load_raw(q)?;
            if stored.is_some() {
                resumed.insert(q.key());
            }
            slots.push(stored);
        }

        let mut last_errors: HashMap<usize, ServiceError> = HashMap::new();
        let mut gave_up: HashSet<usize> = HashSet::new();
        for pass in 0..self.round_attempts {
            let missing: Vec<usize> = (0..pending.len())
                .filter(|&i| slots[i].is_none() && !gave_up.contains(&i))
                .collect();
            if missing.is_empty() {
                break;
            }
            if pass > 0 {
                logw!("Re-dispatching {} failed queries (pass {})", missing.len(), pass + 1);
            }
            let batch: Vec<Query> = missing.iter().map(|&i| pending[i].clone()).collect();
            let outcomes = dispatch(self.service, &batch, self.workers, progress);

            for (&i, outcome) in missing.iter().zip(outcomes) {
                match outcome {
                    Ok(result) => {
                        self.store.save_raw(&result)?;
                        last_errors.remove(&i);
                        slots[i] = Some(result);
                    }
                    Err(e) => {
                        loge!("{}: {e}", pending[i].key());
                        if !e.is_retryable() {
                            logw!("{}: not retrying", pending[i].key());
                            gave_up.insert(i);
                        }
                        last_errors.insert(i, e);
                    }
                }
            }
            // Only retryable failures are worth another pass.
            if last_errors.values().all(|e| !e.is_retryable()) {
                break;
            }
        }

        let mut results = Vec::with_capacity(pending.len());
        let mut failed = Vec::new();
        for (i, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(r) => results.push(r),
                None => {
                    let err = last_errors
                        .remove(&i)
                        .unwrap_or_else(|| ServiceError::Transport(s!("no result")));
                    failed.push((pending[i].clone(), err));
                }
            }
        }
        Ok((results, resumed, failed))
    }
}

fn dedup(queries: Vec<Query>) -> Vec<Query> {
    let mut seen = HashSet::new();
    queries.into_iter().filter(|q| seen.insert(q.key())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postal::PostalCode;
    use crate::query::DoctorType;

    fn entry(code: &str, total: i64, coverage: Coverage, irreducible: Option<IrreducibleReason>) -> SummaryEntry {
        SummaryEntry {
            query: Query::new(PostalCode::parse(code).unwrap(), DoctorType::Any, None),
            total_count: total,
            coverage,
            round: 0,
            irreducible,
            resumed: false,
        }
    }

    #[test]
    fn summary_is_append_only() {
        let mut s = Summary::default();
        assert!(s.record(entry("K1A", 5, Coverage::Complete, None)));
        assert!(!s.record(entry("K1A", -1, Coverage::Censored, None)));
        assert_eq!(s.len(), 1);
        assert_eq!(s.entries()[0].total_count, 5);
    }

    #[test]
    fn terminal_excludes_refined_censored() {
        let mut s = Summary::default();
        s.record(entry("K1A", -1, Coverage::Censored, None));
        s.record(entry("K1B", 0, Coverage::Empty, None));
        s.record(entry("K1C0B1", 100, Coverage::Censored, Some(IrreducibleReason::FullPostalCode)));
        let keys: Vec<String> = s.terminal().map(|e| e.query.key()).collect();
        assert_eq!(keys, vec!["K1B+Any+Any", "K1C0B1+Any+Any"]);
        assert_eq!(s.counts(), Counts { empty: 1, complete: 0, censored: 2, irreducible: 1 });
    }

    #[test]
    fn row_carries_reason() {
        let row = entry("K1C0B1", 100, Coverage::Censored, Some(IrreducibleReason::FullPostalCode)).to_row();
        assert_eq!(row.postal_code, "K1C0B1");
        assert_eq!(row.coverage, "censored");
        assert_eq!(row.irreducible, "full_postal_code");
        assert_eq!(row.last_name, "");
    }
}
