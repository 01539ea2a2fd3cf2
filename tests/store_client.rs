//! Store client behavior against a mock HTTP server.

use std::time::Duration;

use mockito::{Matcher, Server};

use idxgrep::index::RegexpIndex;
use idxgrep::query::plan;
use idxgrep::store::Client;

fn client(server: &Server) -> Client {
    Client::new(&server.url(), "files", Duration::from_secs(5)).unwrap()
}

fn index(server: &Server) -> RegexpIndex {
    RegexpIndex {
        client: client(server),
        max_filesize: 10 * 1024 * 1024,
    }
}

#[test]
fn create_index_puts_schema() {
    let mut server = Server::new();
    let mock = server
        .mock("PUT", "/files")
        .match_body(Matcher::PartialJsonString(
            r#"{"settings": {"number_of_shards": 1}}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"acknowledged": true}"#)
        .create();

    index(&server).create_index().unwrap();
    mock.assert();
}

#[test]
fn create_index_swallows_already_exists() {
    let mut server = Server::new();
    server
        .mock("PUT", "/files")
        .with_status(400)
        .with_body(
            r#"{"error": {"type": "resource_already_exists_exception",
                          "reason": "index [files/abc] already exists"},
                "status": 400}"#,
        )
        .create();

    index(&server).create_index().unwrap();
}

#[test]
fn create_index_surfaces_other_errors() {
    let mut server = Server::new();
    server
        .mock("PUT", "/files")
        .with_status(400)
        .with_body(
            r#"{"error": {"type": "mapper_parsing_exception",
                          "reason": "bad mapping"}, "status": 400}"#,
        )
        .create();

    let err = index(&server).create_index().unwrap_err();
    assert!(err.to_string().contains("creating index"));
    let api = err
        .chain()
        .find_map(|c| c.downcast_ref::<idxgrep::store::ApiError>())
        .expect("ApiError in chain");
    assert_eq!(api.status, 400);
    assert_eq!(api.detail.kind, "mapper_parsing_exception");
}

#[test]
fn search_returns_typed_hits() {
    let mut server = Server::new();
    server
        .mock("POST", "/files/_search")
        .match_query(Matcher::UrlEncoded("size".into(), "10".into()))
        .match_body(Matcher::PartialJsonString(
            r#"{"stored_fields": ["name", "path"]}"#.to_string(),
        ))
        .with_status(200)
        .with_body(
            r#"{"took": 3, "hits": {"total": 2, "hits": [
                {"_index": "files", "_id": "aaa", "_score": 1.2,
                 "fields": {"name": ["a.txt"], "path": ["/corpus"]}},
                {"_index": "files", "_id": "bbb", "_score": 0.8,
                 "fields": {"name": ["b.txt"], "path": ["/corpus"]}}
            ]}}"#,
        )
        .create();

    let q = plan("hello").unwrap();
    let hits = index(&server).search(&q, 10).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].name, "a.txt");
    assert_eq!(hits[0].path, "/corpus");
    assert_eq!(hits[1].id, "bbb");
}

#[test]
fn search_missing_index_is_empty() {
    let mut server = Server::new();
    server
        .mock("POST", "/files/_search")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(
            r#"{"error": {"type": "index_not_found_exception",
                          "reason": "no such index [files]"}, "status": 404}"#,
        )
        .create();

    let q = plan("hello").unwrap();
    let hits = index(&server).search(&q, 10).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn search_sends_planned_trigrams() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/files/_search")
        .match_query(Matcher::Any)
        .match_body(Matcher::Regex(r#""value":"hel""#.to_string()))
        .with_status(200)
        .with_body(r#"{"hits": {"hits": []}}"#)
        .create();

    let q = plan("(?i)HELLO").unwrap();
    index(&server).search(&q, 10).unwrap();
    mock.assert();
}

#[test]
fn match_all_for_degenerate_patterns() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/files/_search")
        .match_query(Matcher::Any)
        .match_body(Matcher::PartialJsonString(
            r#"{"query": {"match_all": {}}}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"hits": {"hits": []}}"#)
        .create();

    let q = plan(".*").unwrap();
    index(&server).search(&q, 10).unwrap();
    mock.assert();
}

#[test]
fn delete_by_query_strips_nul_and_reports_counts() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/files/_delete_by_query")
        .match_body(Matcher::PartialJsonString(
            r#"{"query": {"term": {"path": {"value": "/corpus/vendor.ziplib"}}}}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"took": 10, "total": 2, "deleted": 2, "batches": 1, "noops": 0}"#)
        .create();

    let resp = index(&server).delete("/corpus/vendor.zip\0lib").unwrap();
    assert_eq!(resp.deleted, 2);
    assert_eq!(resp.total, 2);
    mock.assert();
}

#[test]
fn bulk_stream_uploads_ndjson() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/files/_bulk")
        .match_header("content-type", "application/x-ndjson")
        .match_body(Matcher::Regex(r#""_id":"deadbeef""#.to_string()))
        .with_status(200)
        .with_body(r#"{"took": 5, "errors": false, "items": []}"#)
        .create();

    let mut bulk = client(&server).bulk();
    bulk.index(
        &serde_json::json!({"data": "hello", "name": "a.txt", "path": "/corpus"}),
        "deadbeef",
    )
    .unwrap();
    bulk.close().unwrap();
    mock.assert();
}

#[test]
fn bulk_stream_with_no_writes_sends_nothing() {
    let mut server = Server::new();
    let mock = server.mock("POST", "/files/_bulk").expect(0).create();

    let mut bulk = client(&server).bulk();
    bulk.close().unwrap();
    mock.assert();
}

#[test]
fn bulk_error_surfaces_at_close() {
    let mut server = Server::new();
    server
        .mock("POST", "/files/_bulk")
        .with_status(400)
        .with_body(r#"{"error": "malformed action line"}"#)
        .create();

    let mut bulk = client(&server).bulk();
    // The failure belongs to the background request; depending on how
    // fast the server answers it surfaces at the write or at close.
    let write = bulk.index(&serde_json::json!({"data": "x"}), "1");
    let close = bulk.close();
    let err = write.and(close).unwrap_err();
    assert!(err.to_string().contains("400"), "got: {err:#}");
}

#[test]
fn unreachable_store_is_an_error() {
    // Nothing listens on this port.
    let client = Client::new("http://127.0.0.1:1", "files", Duration::from_secs(1)).unwrap();
    let index = RegexpIndex {
        client,
        max_filesize: 1024,
    };
    let q = plan("hello").unwrap();
    assert!(index.search(&q, 10).is_err());
}
