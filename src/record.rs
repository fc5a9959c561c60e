// src/record.rs
use serde_json::{Map, Value};

use crate::classify::{classify, Coverage, Limits};
use crate::query::Query;

/// Field carrying the register-issued identifier.
pub const RECORD_ID_FIELD: &str = "cpsonumber";

/// One physician as returned by the register. Only the id is interpreted.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    id: String,
    fields: Map<String, Value>,
}

impl Record {
    /// `cpsonumber` may arrive as a number or a string.
    pub fn from_json(value: Value) -> Result<Self, String> {
        let Value::Object(fields) = value else {
            return Err(s!("record is not a JSON object"));
        };
        let id = match fields.get(RECORD_ID_FIELD) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(format!("record has no usable {RECORD_ID_FIELD}")),
        };
        Ok(Self { id, fields })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Outcome of issuing one `Query` exactly once.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    pub query: Query,
    pub total_count: i64,
    pub records: Vec<Record>,
}

impl QueryResult {
    pub fn new(query: Query, total_count: i64, records: Vec<Record>) -> Self {
        Self { query, total_count, records }
    }

    pub fn coverage(&self, limits: &Limits) -> Coverage {
        classify(self.total_count, limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_from_number_or_string() {
        let a = Record::from_json(json!({ "cpsonumber": 12345, "name": "A" })).unwrap();
        let b = Record::from_json(json!({ "cpsonumber": " 12345 " })).unwrap();
        assert_eq!(a.id(), "12345");
        assert_eq!(b.id(), "12345");
        assert_eq!(a.fields()["name"], "A");
    }

    #[test]
    fn missing_id_is_rejected() {
        assert!(Record::from_json(json!({ "name": "A" })).is_err());
        assert!(Record::from_json(json!({ "cpsonumber": "" })).is_err());
        assert!(Record::from_json(json!([1, 2])).is_err());
    }
}
