//! # idxgrep - regexp search over a trigram index
//!
//! idxgrep answers regular-expression searches across a large corpus of
//! files far faster than a linear scan. Indexing pushes file contents
//! into an external full-text store that tokenizes them as overlapping
//! trigrams; searching translates the regexp into a boolean query over
//! those trigrams, fetches the candidate files it cannot rule out, and
//! greps only those with the real pattern.
//!
//! ## Architecture
//!
//! - [`query`] - regexp analysis and trigram query planning
//! - [`store`] - HTTP client for the backing store (bulk, search, delete)
//! - [`walk`] - file-tree traversal through a filter/generator chain
//! - [`index`] - the regexp index: schema, parallel indexing, candidates
//! - [`grep`] - line-oriented matching over candidate files
//! - [`search`] - the executor tying planning, candidates and grep together
//! - [`config`] - TOML configuration
//!
//! The planner is the interesting part: it guarantees that the boolean
//! trigram query never excludes a file the regexp would match, while
//! rejecting as many others as it can. See [`query::planner`].

pub mod config;
pub mod exits;
pub mod grep;
pub mod index;
pub mod query;
pub mod search;
pub mod store;
pub mod walk;

/// Initialize logging for a command-line tool. `verbose` raises the
/// default level so per-file progress and planned queries show up;
/// `RUST_LOG` still overrides.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .format_target(false)
        .init();
}
