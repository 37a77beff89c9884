//! Streaming delivery: every fragment of the response body is a chunk.

use std::sync::OnceLock;

use futures::{Stream, StreamExt};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::types::{Delivery, DeliveryEvent};

use super::http::header_value;

/// How much of the body is searched for an embedded run id.
const RUN_ID_SCAN_LIMIT: usize = 4096;

fn run_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""id"\s*:\s*"([^"]+)""#).expect("valid run id pattern"))
}

/// Turn a successful streamed response into a delivery.
///
/// The run id is taken from `run_id_header` when present, otherwise from the
/// first `"id":"…"` found near the start of the body.
pub fn deliver(resp: reqwest::Response, run_id_header: &str) -> Delivery {
    let header_run_id = header_value(resp.headers(), run_id_header);
    let bytes = resp
        .bytes_stream()
        .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ChatError::Network));
    deliver_bytes(bytes, header_run_id)
}

/// Decode a byte stream into delivery events.
pub fn deliver_bytes<S>(byte_stream: S, header_run_id: Option<String>) -> Delivery
where
    S: Stream<Item = Result<Vec<u8>, ChatError>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut decoder = Utf8Decoder::default();
        let mut scanner = RunIdScanner::new(header_run_id.is_none());
        futures::pin_mut!(byte_stream);

        if let Some(run_id) = header_run_id {
            debug!(%run_id, "Run id from response header");
            yield Ok(DeliveryEvent::RunIdentified(run_id));
        }

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = match chunk_result {
                Ok(b) => b,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let text = decoder.decode(&bytes);
            if text.is_empty() {
                continue;
            }

            if let Some(run_id) = scanner.feed(&text) {
                debug!(%run_id, "Run id recovered from response body");
                yield Ok(DeliveryEvent::RunIdentified(run_id));
            }
            yield Ok(DeliveryEvent::Chunk(text));
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            yield Ok(DeliveryEvent::Chunk(tail));
        }
        if scanner.still_searching() {
            warn!("Streamed response carried no run id; next turn will start a new run");
        }
        yield Ok(DeliveryEvent::completed());
    };

    Box::pin(stream)
}

/// Incremental UTF-8 decoder that holds back a character split across frames.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to marks a char boundary, so this slice is valid UTF-8.
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is left when the stream ends.
    pub(crate) fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Looks for an embedded run id in the first few KiB of a body.
#[derive(Debug)]
struct RunIdScanner {
    active: bool,
    seen: String,
}

impl RunIdScanner {
    fn new(active: bool) -> Self {
        Self {
            active,
            seen: String::new(),
        }
    }

    fn feed(&mut self, text: &str) -> Option<String> {
        if !self.active {
            return None;
        }
        self.seen.push_str(text);
        let found = run_id_pattern()
            .captures(&self.seen)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        if found.is_some() {
            self.active = false;
            self.seen.clear();
            return found;
        }
        if self.seen.len() >= RUN_ID_SCAN_LIMIT {
            self.active = false;
            self.seen.clear();
        }
        None
    }

    fn still_searching(&self) -> bool {
        self.active
    }
}
