// src/config/options.rs
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::consts::*;
use crate::classify::Limits;
use crate::error::{Error, Result};
use crate::postal::{Alphabet, MAX_LDU_LEN};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppOptions {
    pub registry: RegistryOptions,
    pub scrape: ScrapeOptions,
    pub crawl: CrawlOptions,
}

impl AppOptions {
    /// Defaults overlaid with whatever subset of fields the file sets.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let opts: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> Result<()> {
        self.registry.limits()?;
        self.registry.alphabet()?;
        if self.scrape.workers == 0 {
            return Err(Error::Config(s!("workers must be at least 1")));
        }
        if self.scrape.max_attempts == 0 {
            return Err(Error::Config(s!("max_attempts must be at least 1")));
        }
        if self.crawl.max_depth > MAX_LDU_LEN {
            return Err(Error::Config(format!(
                "max_depth {} exceeds {MAX_LDU_LEN}",
                self.crawl.max_depth
            )));
        }
        Ok(())
    }
}

/// Everything about the remote register that is an operational constant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryOptions {
    pub base_url: String,
    pub sentinel: i64,
    pub cap: i64,
    pub digits: String,
    pub letters: String,
    pub specialist_type: String,
    pub timeout_secs: u64,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            base_url: s!(BASE_URL),
            sentinel: SENTINEL,
            cap: CAP,
            digits: s!(DIGITS),
            letters: s!(LETTERS),
            specialist_type: s!(SPECIALIST_TYPE),
            timeout_secs: TIMEOUT_SECS,
        }
    }
}

impl RegistryOptions {
    pub fn limits(&self) -> Result<Limits> {
        Limits::new(self.sentinel, self.cap).map_err(Error::Config)
    }

    pub fn alphabet(&self) -> Result<Alphabet> {
        Alphabet::new(&self.digits, &self.letters).map_err(Error::Config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeOptions {
    pub workers: usize,
    pub pause_ms: u64,
    pub jitter_ms: u64,
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            workers: WORKERS,
            pause_ms: REQUEST_PAUSE_MS,
            jitter_ms: JITTER_MS,
            max_attempts: MAX_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlOptions {
    pub max_depth: usize,
    pub round_attempts: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            round_attempts: ROUND_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let opts: AppOptions =
            serde_json::from_str(r#"{ "registry": { "cap": 50 }, "crawl": { "max_depth": 2 } }"#)
                .unwrap();
        assert_eq!(opts.registry.cap, 50);
        assert_eq!(opts.registry.sentinel, SENTINEL);
        assert_eq!(opts.crawl.max_depth, 2);
        assert_eq!(opts.scrape.workers, WORKERS);
        opts.validate().unwrap();
    }

    #[test]
    fn rejects_depth_past_full_code() {
        let mut opts = AppOptions::default();
        opts.crawl.max_depth = 4;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn rejects_sentinel_inside_exact_range() {
        let mut opts = AppOptions::default();
        opts.registry.sentinel = 5;
        assert!(opts.validate().is_err());
    }
}
