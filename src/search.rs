//! The search executor: plan, fetch candidates, grep them in parallel.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::bounded;
use regex::bytes::RegexBuilder;

use crate::grep::{Grep, Options};
use crate::index::RegexpIndex;
use crate::query::plan;
use crate::walk::{join, open_virtual};

/// Knobs of one search run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub case_insensitive: bool,
    pub list_only: bool,
    pub line_numbers: bool,
    pub omit_names: bool,
    /// Maximum number of candidate documents to fetch.
    pub limit: usize,
}

/// Run `pattern` against the index, printing matches to `out`.
/// Returns the number of files with at least one match.
///
/// Candidates whose files have vanished since indexing trigger a
/// delete-by-query on their parent directory, lazily pruning the index.
pub fn run<W: Write + Send + Clone>(
    index: &RegexpIndex,
    pattern: &str,
    options: &SearchOptions,
    out: W,
) -> Result<u64> {
    let mut pattern = format!("(?m){}", pattern);
    if options.case_insensitive {
        pattern = format!("(?i){}", pattern);
    }

    let query = plan(&pattern).context("couldn't parse regexp")?;
    log::info!("executing query: {}", query);

    let hits = index.search(&query, options.limit)?;
    log::info!("searching through {} candidate files", hits.len());

    let workers = thread::available_parallelism().map_or(1, |n| n.get());
    let (work_tx, work_rx) = bounded::<String>(workers * 2);
    let matched_files = AtomicU64::new(0);

    let grep_options = Options {
        list_only: options.list_only,
        line_numbers: options.line_numbers,
        omit_names: options.omit_names,
    };

    thread::scope(|scope| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let mut out = out.clone();
            let matched_files = &matched_files;
            let pattern = pattern.as_str();
            scope.spawn(move || {
                // Each worker compiles its own regex.
                let regex = match RegexBuilder::new(pattern).build() {
                    Ok(regex) => regex,
                    Err(err) => {
                        log::error!("couldn't compile regexp: {}", err);
                        return;
                    }
                };
                let mut grep = Grep::new(regex, grep_options);

                for path in work_rx {
                    let reader = match open_virtual(&path) {
                        Ok(reader) => reader,
                        Err(_) => {
                            log::info!("deleting missing file {:?}", path);
                            if let Err(err) = index.delete(crate::walk::dir_name(&path)) {
                                log::warn!("couldn't prune index for {:?}: {}", path, err);
                            }
                            continue;
                        }
                    };
                    if let Err(err) = grep.reader(reader, &path, &mut out) {
                        log::warn!("error grepping {:?}: {}", path, err);
                    }
                    if grep.matched {
                        matched_files.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
        drop(work_rx);

        for hit in &hits {
            if work_tx.send(join(&hit.path, &hit.name)).is_err() {
                break;
            }
        }
        drop(work_tx);
    });

    let matched = matched_files.load(Ordering::Relaxed);
    log::info!("found matches in {} files", matched);
    Ok(matched)
}
