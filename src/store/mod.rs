//! HTTP client for the backing full-text store.
//!
//! The store speaks an Elasticsearch-compatible JSON API. This module
//! holds the shared client plumbing and delete-by-query; bulk uploads
//! live in [`bulk`] and searches in [`search`].

pub mod bulk;
pub mod search;

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub use bulk::BulkStream;
pub use search::{Search, SearchHit};

/// Error type strings the client treats specially.
const ERR_INDEX_EXISTS: &str = "resource_already_exists_exception";
const ERR_INDEX_NOT_FOUND: &str = "index_not_found_exception";

/// A client bound to one index of one store.
#[derive(Debug, Clone)]
pub struct Client {
    pub base: String,
    pub index: String,
    http: reqwest::blocking::Client,
    timeout: Duration,
}

/// Error detail inside the store's error body.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ErrorDetail {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reason: String,
}

/// A non-2xx response from the store, with the decoded error body.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub detail: ErrorDetail,
}

impl ApiError {
    pub fn is_index_exists(&self) -> bool {
        self.detail.kind == ERR_INDEX_EXISTS
    }

    pub fn is_index_not_found(&self) -> bool {
        self.detail.kind == ERR_INDEX_NOT_FOUND
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.reason.is_empty() {
            write!(f, "store returned status {} ({})", self.status, self.detail.kind)
        } else {
            write!(
                f,
                "store returned status {} ({}): {}",
                self.status, self.detail.kind, self.detail.reason
            )
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: ErrorDetail,
}

/// Counts reported by a delete-by-query call.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ByQueryResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub batches: u64,
    #[serde(default)]
    pub noops: u64,
}

impl Client {
    /// Build a client. `timeout` applies per request to the short
    /// calls (create, search, delete); bulk uploads run without a
    /// deadline since a stream stays open for the whole upload.
    pub fn new(base: &str, index: &str, timeout: Duration) -> Result<Client> {
        let http = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .context("building HTTP client")?;
        Ok(Client {
            base: base.trim_end_matches('/').to_string(),
            index: index.to_string(),
            http,
            timeout,
        })
    }

    fn index_url(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.base, self.index, suffix)
    }

    /// Send a request; a ≥400 status decodes the error body into an
    /// [`ApiError`].
    fn send(&self, req: reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::Response> {
        let resp = req.timeout(self.timeout).send()?;
        let status = resp.status();
        if status.as_u16() >= 400 {
            let detail = resp
                .json::<ErrorBody>()
                .map(|body| body.error)
                .unwrap_or_default();
            return Err(ApiError {
                status: status.as_u16(),
                detail,
            }
            .into());
        }
        Ok(resp)
    }

    /// PUT the index settings/mappings document. Creating an index that
    /// already exists is not an error.
    pub fn create_index(&self, schema: &serde_json::Value) -> Result<()> {
        let req = self.http.put(self.index_url("")).json(schema);
        match self.send(req) {
            Ok(_) => Ok(()),
            Err(err) => {
                if let Some(api) = err.downcast_ref::<ApiError>() {
                    if api.is_index_exists() {
                        return Ok(());
                    }
                }
                Err(err.context("creating index"))
            }
        }
    }

    /// Start a bulk upload stream for this index.
    pub fn bulk(&self) -> BulkStream {
        BulkStream::new(self.http.clone(), self.index_url("/_bulk"))
    }

    /// Delete every document matching `query`.
    pub fn delete_by_query(&self, query: &serde_json::Value) -> Result<ByQueryResponse> {
        let body = serde_json::json!({ "query": query });
        let req = self.http.post(self.index_url("/_delete_by_query")).json(&body);
        let resp = self.send(req).context("delete by query")?;
        Ok(resp.json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = ApiError {
            status: 400,
            detail: ErrorDetail {
                kind: "mapper_parsing_exception".to_string(),
                reason: "bad field".to_string(),
            },
        };
        let s = err.to_string();
        assert!(s.contains("400"));
        assert!(s.contains("mapper_parsing_exception"));
        assert!(s.contains("bad field"));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let c = Client::new("http://localhost:9200/", "files", Duration::from_secs(1)).unwrap();
        assert_eq!(c.index_url("/_search"), "http://localhost:9200/files/_search");
    }

    #[test]
    fn by_query_response_tolerates_extra_fields() {
        let resp: ByQueryResponse = serde_json::from_str(
            r#"{"took": 12, "timed_out": false, "total": 3, "deleted": 3,
                "batches": 1, "noops": 0, "version_conflicts": 0,
                "retries": {"bulk": 0, "search": 0}, "failures": []}"#,
        )
        .unwrap();
        assert_eq!(resp.deleted, 3);
        assert_eq!(resp.total, 3);
    }
}
