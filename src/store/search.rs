//! Search requests and the boolean query wire form.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::store::{ApiError, Client};

/// Body of a `_search` request.
#[derive(Debug, Clone, Serialize)]
pub struct Search {
    pub query: serde_json::Value,
    #[serde(rename = "stored_fields", skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

/// One hit of a search response. `fields` holds the stored fields as
/// arrays, the way the store returns them.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: f64,
    #[serde(default)]
    pub fields: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    hits: SearchHits,
}

/// Build the wire form of a boolean node:
/// `{"bool": {"must": [...], "should": [...], "minimum_should_match": N}}`.
/// `minimum_should_match` is 1 whenever there are `should` clauses.
pub fn bool_query(must: Vec<serde_json::Value>, should: Vec<serde_json::Value>) -> serde_json::Value {
    let minimum = if should.is_empty() { 0 } else { 1 };
    let mut body = serde_json::Map::new();
    if !must.is_empty() {
        body.insert("must".to_string(), serde_json::Value::Array(must));
    }
    if !should.is_empty() {
        body.insert("should".to_string(), serde_json::Value::Array(should));
    }
    body.insert("minimum_should_match".to_string(), minimum.into());
    serde_json::json!({ "bool": body })
}

/// `{"term": {field: {"value": value}}}`.
pub fn term_query(field: &str, value: &str) -> serde_json::Value {
    serde_json::json!({ "term": { field: { "value": value } } })
}

impl Client {
    /// Run a search returning at most `size` hits. A search against an
    /// index that does not exist yet returns no hits rather than an
    /// error.
    pub fn search(&self, search: &Search, size: usize) -> Result<Vec<SearchHit>> {
        let req = self
            .http
            .post(self.index_url("/_search"))
            .query(&[("size", size.to_string())])
            .json(search);
        let resp = match self.send(req) {
            Ok(resp) => resp,
            Err(err) => {
                if let Some(api) = err.downcast_ref::<ApiError>() {
                    if api.is_index_not_found() {
                        return Ok(Vec::new());
                    }
                }
                return Err(err.context("search"));
            }
        };
        let result: SearchResult = resp.json()?;
        Ok(result.hits.hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_wire_form() {
        let t = term_query("data", "abc");
        assert_eq!(
            serde_json::to_string(&t).unwrap(),
            r#"{"term":{"data":{"value":"abc"}}}"#
        );
    }

    #[test]
    fn bool_wire_form_with_should_sets_minimum() {
        let q = bool_query(vec![], vec![term_query("data", "abc")]);
        let s = serde_json::to_string(&q).unwrap();
        assert!(s.contains(r#""minimum_should_match":1"#));
        assert!(s.contains(r#""should""#));
        assert!(!s.contains(r#""must""#));
    }

    #[test]
    fn bool_wire_form_must_only() {
        let q = bool_query(vec![term_query("data", "abc")], vec![]);
        let s = serde_json::to_string(&q).unwrap();
        assert!(s.contains(r#""minimum_should_match":0"#));
        assert!(s.contains(r#""must""#));
    }

    #[test]
    fn search_body_omits_empty_fields() {
        let s = Search {
            query: serde_json::json!({"match_all": {}}),
            fields: Vec::new(),
        };
        let body = serde_json::to_string(&s).unwrap();
        assert!(!body.contains("stored_fields"));
    }

    #[test]
    fn hit_decodes_stored_fields() {
        let hit: SearchHit = serde_json::from_str(
            r#"{"_index": "files", "_id": "abc", "_score": 1.5,
                "fields": {"name": ["a.txt"], "path": ["/tmp"]}}"#,
        )
        .unwrap();
        assert_eq!(hit.id, "abc");
        assert_eq!(hit.fields["name"][0], "a.txt");
    }
}
