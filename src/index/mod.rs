//! The regexp file index.
//!
//! Ties the walker, the store client and the query planner together:
//! creating the index schema, streaming a file tree into the store
//! through a pool of bulk-upload workers, searching for candidate
//! documents and pruning stale entries.

use std::io::Read;
use std::path::Path;
use std::thread;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, select};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::query::{Query, QueryOp};
use crate::store::search::{bool_query, term_query};
use crate::store::{ByQueryResponse, Client, Search};
use crate::walk::{base_name, dir_name, File, OsFile, Walker};

/// Size of the bulk-upload worker pool.
const NUM_WORKERS: usize = 4;

/// Counters reported by an indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub indexed: usize,
    pub skipped: usize,
}

/// A file document as stored in the index.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub data: String,
    pub name: String,
    pub path: String,
}

/// One candidate returned by a search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub path: String,
    pub score: f64,
}

/// The regexp index bound to a store client.
pub struct RegexpIndex {
    pub client: Client,
    pub max_filesize: u64,
}

/// External identifier of a document: hex SHA-256 of its (virtual)
/// absolute path. Re-indexing the same tree overwrites in place.
pub fn document_id(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// The index settings/mappings document.
///
/// `data` is tokenized into overlapping trigrams (lowercased, so the
/// planner can emit case-folded trigrams for both case modes) with
/// document-level postings only. `path` tokenizes as a `/` hierarchy
/// after a char filter deletes the NUL bytes that delimit archive
/// members in virtual paths. Documents are not stored; only the
/// `name` and `path` fields come back from searches.
fn schema() -> serde_json::Value {
    serde_json::json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "analysis": {
                "tokenizer": {
                    "trigram": {
                        "type": "ngram",
                        "min_gram": 3,
                        "max_gram": 3
                    },
                    "path": {
                        "type": "path_hierarchy",
                        "delimiter": "/"
                    }
                },
                "char_filter": {
                    "drop_nul": {
                        "type": "pattern_replace",
                        "pattern": "\u{0}",
                        "replacement": ""
                    }
                },
                "analyzer": {
                    "trigram": {
                        "type": "custom",
                        "tokenizer": "trigram",
                        "filter": ["lowercase"]
                    },
                    "path": {
                        "type": "custom",
                        "tokenizer": "path",
                        "char_filter": ["drop_nul"]
                    }
                }
            }
        },
        "mappings": {
            "_doc": {
                "_source": { "enabled": false },
                "_all": { "enabled": false },
                "properties": {
                    "name": { "type": "keyword", "store": true },
                    "path": { "type": "text", "analyzer": "path", "store": true },
                    "data": { "type": "text", "analyzer": "trigram", "index_options": "docs" }
                }
            }
        }
    })
}

/// Serialize a planner query into the store's boolean form.
pub fn query_to_wire(q: &Query) -> serde_json::Value {
    match q.op {
        QueryOp::All => serde_json::json!({ "match_all": {} }),
        QueryOp::None => serde_json::json!({ "match_none": {} }),
        QueryOp::And => {
            let mut must: Vec<serde_json::Value> =
                q.trigram.iter().map(|t| term_query("data", t)).collect();
            must.extend(q.sub.iter().map(query_to_wire));
            bool_query(must, Vec::new())
        }
        QueryOp::Or => {
            let mut should: Vec<serde_json::Value> =
                q.trigram.iter().map(|t| term_query("data", t)).collect();
            should.extend(q.sub.iter().map(query_to_wire));
            bool_query(Vec::new(), should)
        }
    }
}

impl RegexpIndex {
    /// Create the index with the schema above. Idempotent.
    pub fn create_index(&self) -> Result<()> {
        self.client.create_index(&schema())
    }

    /// Walk `root` and stream every surviving file into the store.
    ///
    /// The walker feeds a rendezvous channel consumed by a fixed pool
    /// of workers, each owning its own bulk stream. The first fatal
    /// worker error stops the walk early; read failures only skip the
    /// affected file.
    pub fn add_tree(&self, root: &Path) -> Result<Statistics> {
        let root = root
            .canonicalize()
            .with_context(|| format!("resolving {}", root.display()))?;
        let root = root.to_string_lossy().into_owned();

        let (work_tx, work_rx) = bounded::<Box<dyn File>>(0);
        let (err_tx, err_rx) = bounded::<anyhow::Error>(NUM_WORKERS);
        let walker = Walker::with_default_processors(self.max_filesize);

        let mut stats = Statistics::default();

        let walk_result = thread::scope(|scope| -> Result<()> {
            let mut handles = Vec::with_capacity(NUM_WORKERS);
            for _ in 0..NUM_WORKERS {
                let work_rx = work_rx.clone();
                let err_tx = err_tx.clone();
                let client = &self.client;
                handles.push(scope.spawn(move || {
                    let mut bulk = client.bulk();
                    let mut indexed = 0usize;
                    let mut skipped = 0usize;
                    for file in work_rx {
                        let mut data = Vec::new();
                        let read = file.open().and_then(|mut r| r.read_to_end(&mut data));
                        if let Err(err) = read {
                            skipped += 1;
                            log::warn!(
                                "skipping {:?} because of read error: {}",
                                file.path(),
                                err
                            );
                            continue;
                        }
                        log::info!("indexing {:?}", file.path());
                        let doc = Document {
                            data: String::from_utf8_lossy(&data).into_owned(),
                            name: base_name(file.path()).to_string(),
                            path: dir_name(file.path()).to_string(),
                        };
                        if let Err(err) = bulk.index(&doc, &document_id(file.path())) {
                            let _ = err_tx.send(err);
                            return (indexed, skipped);
                        }
                        indexed += 1;
                    }
                    if let Err(err) = bulk.close() {
                        let _ = err_tx.send(err);
                    }
                    (indexed, skipped)
                }));
            }
            drop(work_rx);

            let walked = walker.walk(
                Box::new(OsFile(root)),
                &mut |file| {
                    select! {
                        send(work_tx, file) -> sent => {
                            sent.map_err(|_| anyhow!("indexing workers exited early"))
                        }
                        recv(err_rx) -> err => {
                            Err(err.unwrap_or_else(|_| anyhow!("indexing workers exited early")))
                        }
                    }
                },
                &mut |file, processor| {
                    stats.skipped += 1;
                    log::info!("filtered {:?} by {}", file.path(), processor);
                },
            );
            drop(work_tx);

            for handle in handles {
                match handle.join() {
                    Ok((indexed, skipped)) => {
                        stats.indexed += indexed;
                        stats.skipped += skipped;
                    }
                    Err(_) => return Err(anyhow!("indexing worker panicked")),
                }
            }
            walked
        });

        walk_result?;
        // A worker may have failed while draining after the walk ended.
        if let Ok(err) = err_rx.try_recv() {
            return Err(err);
        }
        Ok(stats)
    }

    /// Fetch up to `size` candidate documents for a planned query.
    pub fn search(&self, query: &Query, size: usize) -> Result<Vec<SearchHit>> {
        let search = Search {
            query: query_to_wire(query),
            fields: vec!["name".to_string(), "path".to_string()],
        };
        let raw = self.client.search(&search, size)?;

        let mut hits = Vec::with_capacity(raw.len());
        for hit in raw {
            let name = stored_field(&hit.fields, "name")
                .with_context(|| format!("hit {} has no stored name", hit.id))?;
            let path = stored_field(&hit.fields, "path")
                .with_context(|| format!("hit {} has no stored path", hit.id))?;
            hits.push(SearchHit {
                id: hit.id,
                name,
                path,
                score: hit.score,
            });
        }
        Ok(hits)
    }

    /// Delete every document whose `path` keyword equals `path`.
    /// Virtual-path NUL delimiters are stripped to mirror the store's
    /// path analyzer.
    pub fn delete(&self, path: &str) -> Result<ByQueryResponse> {
        let path = path.replace('\0', "");
        self.client
            .delete_by_query(&term_query("path", &path))
    }
}

fn stored_field(fields: &serde_json::Value, name: &str) -> Option<String> {
    fields
        .get(name)?
        .get(0)?
        .as_str()
        .map(|s| s.to_string())
}
