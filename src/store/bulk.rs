//! Streaming bulk uploads.
//!
//! A [`BulkStream`] feeds ndjson header/body line pairs into the body
//! of a long-lived POST. The request is opened lazily on first write
//! and its body is the read end of an in-process pipe; a background
//! thread drives the request and delivers its single success-or-error
//! outcome on a one-shot channel, which [`BulkStream::close`] returns.
//! Exceeding the buffered-size threshold closes the current request
//! (an implicit flush) and a fresh one opens on the next write.

use std::io::{self, Read};
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, Result};
use serde::Serialize;

/// Body bytes after which the current request is flushed.
const FLUSH_THRESHOLD: usize = 8 * 1024 * 1024;

pub struct BulkStream {
    http: reqwest::blocking::Client,
    url: String,
    active: Option<Active>,
}

struct Active {
    chunks: mpsc::Sender<Vec<u8>>,
    done: mpsc::Receiver<Result<()>>,
    worker: thread::JoinHandle<()>,
    size: usize,
}

impl BulkStream {
    pub(crate) fn new(http: reqwest::blocking::Client, url: String) -> BulkStream {
        BulkStream {
            http,
            url,
            active: None,
        }
    }

    fn start(&mut self) -> &mut Active {
        let (chunks_tx, chunks_rx) = mpsc::channel::<Vec<u8>>();
        let (done_tx, done_rx) = mpsc::sync_channel::<Result<()>>(1);

        let reader = ChannelReader {
            chunks: chunks_rx,
            buf: Vec::new(),
            pos: 0,
        };
        let request = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(reqwest::blocking::Body::new(reader));

        let worker = thread::spawn(move || {
            let outcome = match request.send() {
                Err(err) => Err(err.into()),
                Ok(resp) if resp.status().as_u16() >= 400 => {
                    let status = resp.status();
                    match resp.text() {
                        Ok(body) => Err(anyhow!("bulk upload failed with {}: {}", status, body)),
                        Err(_) => Err(anyhow!(
                            "bulk upload failed with {} and an unreadable error body",
                            status
                        )),
                    }
                }
                Ok(_) => Ok(()),
            };
            let _ = done_tx.send(outcome);
        });

        self.active = Some(Active {
            chunks: chunks_tx,
            done: done_rx,
            worker,
            size: 0,
        });
        self.active.as_mut().unwrap()
    }

    /// Queue one document for indexing under the given external id.
    /// An error reported here may belong to the background request of
    /// a previous write.
    pub fn index<T: Serialize>(&mut self, doc: &T, id: &str) -> Result<()> {
        let header = serde_json::json!({ "index": { "_id": id } });
        let body = serde_json::to_vec(doc)?;
        let body_len = body.len();

        let mut chunk = serde_json::to_vec(&header)?;
        chunk.push(b'\n');
        chunk.extend_from_slice(&body);
        chunk.push(b'\n');

        if self.active.is_none() {
            self.start();
        }
        let active = self.active.as_mut().unwrap();
        let needs_finish = match active.chunks.send(chunk) {
            // The request ended early; surface its error now.
            Err(_) => true,
            Ok(()) => {
                active.size += body_len;
                active.size > FLUSH_THRESHOLD
            }
        };
        if needs_finish {
            return self.finish();
        }
        Ok(())
    }

    /// Terminate the stream: write the final newline, close the pipe
    /// and return the outcome of the background request. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.active.is_none() {
            return Ok(());
        }
        let active = self.active.as_mut().unwrap();
        let _ = active.chunks.send(vec![b'\n']);
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        // Dropping the sender is EOF for the request body.
        drop(active.chunks);
        let outcome = active
            .done
            .recv()
            .unwrap_or_else(|_| Err(anyhow!("bulk upload worker vanished")));
        let _ = active.worker.join();
        outcome
    }
}

impl Drop for BulkStream {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// Read end of the pipe feeding a bulk request body.
struct ChannelReader {
    chunks: mpsc::Receiver<Vec<u8>>,
    buf: Vec<u8>,
    pos: usize,
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.buf.len() {
            match self.chunks.recv() {
                Ok(chunk) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                // Sender dropped: end of body.
                Err(_) => return Ok(0),
            }
        }
        let n = (self.buf.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
