// src/refine.rs
//! Turns one generation of results into the next generation of queries.
//!
//! Only censored results are refined. Each one yields a child per character
//! of the alphabet at the next LDU position, in alphabet order, with the
//! parent's filters. A censored result that cannot be refined any further
//! (full postal code, or the caller's depth limit) is irreducible and is
//! reported, never dropped.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::{Coverage, Limits};
use crate::postal::{Alphabet, PostalError, MAX_LDU_LEN};
use crate::query::Query;
use crate::record::QueryResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrreducibleReason {
    /// Censored at a complete six-character postal code.
    FullPostalCode,
    /// Censored at the caller's `max_depth`.
    DepthLimit,
}

impl fmt::Display for IrreducibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IrreducibleReason::FullPostalCode => "full_postal_code",
            IrreducibleReason::DepthLimit => "depth_limit",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Refinement {
    /// Complete or empty: nothing left to enumerate on this branch.
    Settled(Coverage),
    Children(Vec<Query>),
    Irreducible(IrreducibleReason),
}

impl Refinement {
    pub fn children(&self) -> &[Query] {
        match self {
            Refinement::Children(c) => c,
            _ => &[],
        }
    }

    pub fn irreducible(&self) -> Option<IrreducibleReason> {
        match self {
            Refinement::Irreducible(r) => Some(*r),
            _ => None,
        }
    }
}

/// Queries for the next round plus the censored leaves that stop here.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Generation {
    pub queries: Vec<Query>,
    pub irreducible: Vec<(Query, IrreducibleReason)>,
}

#[derive(Clone, Debug)]
pub struct Refiner {
    limits: Limits,
    alphabet: Alphabet,
    max_depth: usize,
}

impl Refiner {
    pub fn new(limits: Limits, alphabet: Alphabet) -> Self {
        Self { limits, alphabet, max_depth: MAX_LDU_LEN }
    }

    /// Clamped to a full postal code.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(MAX_LDU_LEN);
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Errors only on an internal invariant violation (`DepthExceeded`).
    pub fn refine(&self, result: &QueryResult) -> Result<Refinement, PostalError> {
        let coverage = result.coverage(&self.limits);
        if coverage != Coverage::Censored {
            return Ok(Refinement::Settled(coverage));
        }

        let depth = result.query.depth();
        if depth >= MAX_LDU_LEN {
            return Ok(Refinement::Irreducible(IrreducibleReason::FullPostalCode));
        }
        if depth >= self.max_depth {
            return Ok(Refinement::Irreducible(IrreducibleReason::DepthLimit));
        }

        let children = self
            .alphabet
            .at(depth + 1)
            .iter()
            .map(|&c| result.query.child(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Refinement::Children(children))
    }

    /// Input order, then per-result child order; first occurrence of a key wins.
    pub fn generate_next_generation<'a, I>(&self, results: I) -> Result<Generation, PostalError>
    where
        I: IntoIterator<Item = &'a QueryResult>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut next = Generation::default();

        for result in results {
            match self.refine(result)? {
                Refinement::Children(children) => {
                    for child in children {
                        if seen.insert(child.key()) {
                            next.queries.push(child);
                        }
                    }
                }
                Refinement::Irreducible(reason) => {
                    next.irreducible.push((result.query.clone(), reason));
                }
                Refinement::Settled(_) => {}
            }
        }
        Ok(next)
    }
}
