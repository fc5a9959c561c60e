// src/classify.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::consts::{CAP, SENTINEL};

/// The register's result-count convention: `sentinel` means "too many to
/// say", and no more than `cap` records ever come back for one search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    sentinel: i64,
    cap: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self { sentinel: SENTINEL, cap: CAP }
    }
}

impl Limits {
    pub fn new(sentinel: i64, cap: i64) -> Result<Self, String> {
        if cap <= 0 {
            return Err(format!("cap must be positive, got {cap}"));
        }
        if (0..cap).contains(&sentinel) {
            return Err(format!("sentinel {sentinel} collides with exact counts below cap {cap}"));
        }
        Ok(Self { sentinel, cap })
    }

    pub fn sentinel(&self) -> i64 {
        self.sentinel
    }

    pub fn cap(&self) -> i64 {
        self.cap
    }

    /// Counts a well-formed result may carry.
    pub fn is_valid_count(&self, total_count: i64) -> bool {
        total_count >= 0 || total_count == self.sentinel
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    /// Nothing matches.
    Empty,
    /// Every match was returned.
    Complete,
    /// The true count may exceed what was returned.
    Censored,
}

impl Coverage {
    pub fn as_str(self) -> &'static str {
        match self {
            Coverage::Empty => "empty",
            Coverage::Complete => "complete",
            Coverage::Censored => "censored",
        }
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure; the only signal that drives refinement.
pub fn classify(total_count: i64, limits: &Limits) -> Coverage {
    if total_count == limits.sentinel || total_count >= limits.cap {
        Coverage::Censored
    } else if total_count == 0 {
        Coverage::Empty
    } else if total_count > 0 {
        Coverage::Complete
    } else {
        // Malformed negatives never reach here through a QueryResult; if one
        // does, asking for finer queries is the safe answer.
        Coverage::Censored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries() {
        let l = Limits::default();
        assert_eq!(classify(0, &l), Coverage::Empty);
        assert_eq!(classify(1, &l), Coverage::Complete);
        assert_eq!(classify(45, &l), Coverage::Complete);
        assert_eq!(classify(99, &l), Coverage::Complete);
        assert_eq!(classify(100, &l), Coverage::Censored);
        assert_eq!(classify(250, &l), Coverage::Censored);
        assert_eq!(classify(-1, &l), Coverage::Censored);
    }

    #[test]
    fn configured_limits() {
        let l = Limits::new(-9, 25).unwrap();
        assert_eq!(classify(24, &l), Coverage::Complete);
        assert_eq!(classify(25, &l), Coverage::Censored);
        assert_eq!(classify(-9, &l), Coverage::Censored);
        assert!(l.is_valid_count(-9));
        assert!(!l.is_valid_count(-1));
    }

    #[test]
    fn limits_reject_colliding_sentinel() {
        assert!(Limits::new(0, 100).is_err());
        assert!(Limits::new(50, 100).is_err());
        assert!(Limits::new(-1, 0).is_err());
        assert!(Limits::new(100, 100).is_ok());
    }
}
