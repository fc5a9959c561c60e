// src/progress.rs
/// Lightweight progress reporting used by long-running operations (rounds of
/// queries). Frontends implement this to surface status to users.
/// Called from the aggregating thread only.
pub trait Progress {
    /// Called at the start of a batch with the number of queries in it.
    fn begin(&mut self, _total: usize) {}

    /// Free-form status line for human eyes.
    fn log(&mut self, _msg: &str) {}

    /// One query came back with a result.
    fn item_done(&mut self, _key: &str) {}

    /// One query failed; it stays pending.
    fn item_failed(&mut self, _key: &str, _err: &str) {}

    /// Called at the end of the batch, successful or not.
    fn finish(&mut self) {}
}

/// A no-op progress sink.
pub struct NullProgress;
impl Progress for NullProgress {}

/// Counts and forwards to the log. What the CLI uses.
#[derive(Default)]
pub struct LogProgress {
    done: usize,
    failed: usize,
    total: usize,
}

impl Progress for LogProgress {
    fn begin(&mut self, total: usize) {
        self.total = total;
        self.done = 0;
        self.failed = 0;
    }
    fn log(&mut self, msg: &str) {
        logf!("{msg}");
    }
    fn item_done(&mut self, key: &str) {
        self.done += 1;
        logf!("Fetched {key} ({}/{})", self.done + self.failed, self.total);
    }
    fn item_failed(&mut self, key: &str, err: &str) {
        self.failed += 1;
        loge!("Failed {key} ({}/{}): {err}", self.done + self.failed, self.total);
    }
    fn finish(&mut self) {
        if self.total > 0 {
            logf!("Batch finished: {} ok, {} failed of {}", self.done, self.failed, self.total);
        }
    }
}
