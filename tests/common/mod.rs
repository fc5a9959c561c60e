// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::json;

use cpso_scrape::{Limits, Query, QueryResult, Record, RegistryService, ServiceError};

/// Canned register: counts by compact postal code, everything else gets
/// `default`. Complete answers carry records whose ids repeat per FSA so
/// neighbouring codes overlap.
pub struct FakeRegistry {
    pub counts: HashMap<String, i64>,
    pub default: i64,
    pub failing: HashMap<String, ServiceError>,
    pub calls: Mutex<Vec<String>>,
    pub limits: Limits,
}

impl FakeRegistry {
    pub fn new(default: i64) -> Self {
        Self {
            counts: HashMap::new(),
            default,
            failing: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            limits: Limits::default(),
        }
    }

    pub fn with(mut self, code: &str, count: i64) -> Self {
        self.counts.insert(code.to_string(), count);
        self
    }

    pub fn failing(mut self, code: &str, err: ServiceError) -> Self {
        self.failing.insert(code.to_string(), err);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, code: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == code).count()
    }
}

impl RegistryService for FakeRegistry {
    fn query(&self, query: &Query) -> Result<QueryResult, ServiceError> {
        let code = query.postal_code().to_string();
        self.calls.lock().unwrap().push(code.clone());
        if let Some(err) = self.failing.get(&code) {
            return Err(err.clone());
        }
        let total = *self.counts.get(&code).unwrap_or(&self.default);
        let n = if total > 0 && total < self.limits.cap() { total } else { 0 };
        let records = (0..n)
            .map(|i| {
                Record::from_json(json!({
                    "cpsonumber": format!("{}{i}", query.postal_code().fsa()),
                    "name": format!("Dr {i}"),
                    "phonenumber": "416-555-0100",
                }))
                .unwrap()
            })
            .collect();
        Ok(QueryResult::new(query.clone(), total, records))
    }
}

pub fn root(fsa: &str) -> Query {
    Query::new(fsa.parse().unwrap(), Default::default(), None)
}
