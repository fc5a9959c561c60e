// src/registry.rs
//! The seam to the remote register. `core::net::HttpRegistry` is the live
//! implementation; tests plug in fakes.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::classify::Limits;
use crate::query::Query;
use crate::record::{QueryResult, Record};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("HTTP {status}: {msg}")]
    Http { status: u16, msg: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unusable response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Worth asking again later. Malformed bodies and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Timeout(_) | ServiceError::Transport(_) => true,
            ServiceError::Http { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Decode(_) => false,
        }
    }
}

/// Issue one query, get back the whole result or an error. Never a partial
/// or synthetic result.
pub trait RegistryService: Send + Sync {
    fn query(&self, query: &Query) -> Result<QueryResult, ServiceError>;
}

impl<T: RegistryService + ?Sized> RegistryService for &T {
    fn query(&self, query: &Query) -> Result<QueryResult, ServiceError> {
        (**self).query(query)
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    totalcount: i64,
    #[serde(default)]
    results: Option<Vec<Value>>,
}

/// Decode a search response body: `{"totalcount": n, "results": [...]}`.
pub fn decode_response(query: &Query, body: &str, limits: &Limits) -> Result<QueryResult, ServiceError> {
    let resp: SearchResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::Decode(format!("{}: {e}", query.key())))?;

    if !limits.is_valid_count(resp.totalcount) {
        return Err(ServiceError::Decode(format!(
            "{}: totalcount {} is neither a count nor the sentinel {}",
            query.key(),
            resp.totalcount,
            limits.sentinel()
        )));
    }

    // A row without an id cannot be consolidated; the count still stands.
    let mut records = Vec::new();
    let mut dropped = 0usize;
    for value in resp.results.unwrap_or_default() {
        match Record::from_json(value) {
            Ok(rec) => records.push(rec),
            Err(e) => {
                dropped += 1;
                logd!("{}: {e}", query.key());
            }
        }
    }
    if dropped > 0 {
        logw!("{}: dropped {dropped} record(s) without an id", query.key());
    }

    let exact = (0..limits.cap()).contains(&resp.totalcount);
    if exact && records.len() as i64 != resp.totalcount {
        logw!(
            "{}: totalcount {} but {} records returned",
            query.key(),
            resp.totalcount,
            records.len()
        );
    }

    Ok(QueryResult::new(query.clone(), resp.totalcount, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postal::PostalCode;
    use crate::query::DoctorType;

    fn q() -> Query {
        Query::new(PostalCode::parse("K1A").unwrap(), DoctorType::Any, None)
    }

    #[test]
    fn decodes_records_and_count() {
        let body = r#"{"totalcount": 2, "results": [{"cpsonumber": 1}, {"cpsonumber": "2"}]}"#;
        let r = decode_response(&q(), body, &Limits::default()).unwrap();
        assert_eq!(r.total_count, 2);
        assert_eq!(r.records.len(), 2);
        assert_eq!(r.records[1].id(), "2");
    }

    #[test]
    fn sentinel_with_null_results() {
        let body = r#"{"totalcount": -1, "results": null}"#;
        let r = decode_response(&q(), body, &Limits::default()).unwrap();
        assert_eq!(r.total_count, -1);
        assert!(r.records.is_empty());
    }

    #[test]
    fn rejects_unknown_negative_and_garbage() {
        let lim = Limits::default();
        assert!(matches!(
            decode_response(&q(), r#"{"totalcount": -7}"#, &lim),
            Err(ServiceError::Decode(_))
        ));
        assert!(matches!(
            decode_response(&q(), "not json\u{1}", &lim),
            Err(ServiceError::Decode(_))
        ));
    }

    #[test]
    fn record_without_id_is_dropped_not_fatal() {
        let body = r#"{"totalcount": 3, "results": [{"cpsonumber": 1}, {"name": "x"}, "odd", {"cpsonumber": 3}]}"#;
        let r = decode_response(&q(), body, &Limits::default()).unwrap();
        assert_eq!(r.total_count, 3);
        let ids: Vec<&str> = r.records.iter().map(|rec| rec.id()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn retryable_classes() {
        assert!(ServiceError::Timeout(s!()).is_retryable());
        assert!(ServiceError::Http { status: 429, msg: s!() }.is_retryable());
        assert!(ServiceError::Http { status: 503, msg: s!() }.is_retryable());
        assert!(!ServiceError::Http { status: 404, msg: s!() }.is_retryable());
        assert!(!ServiceError::Decode(s!()).is_retryable());
    }
}
