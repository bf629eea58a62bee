//! Event encoding and incremental stream demultiplexing.
//!
//! The encoder appends each event to the output with the configured [`Framing`].
//! The demultiplexer consumes chunks of arbitrary size (including chunks that
//! split a value or a UTF-8 sequence) and yields each complete value exactly once.
//!
//! For [`Framing::Concatenated`] there is no separator on the wire. Boundaries are
//! recovered by scanning for the point where a top-level object or array closes,
//! i.e. the `}` of a `}{` adjacency at depth zero. String literals are tracked so
//! braces inside them never count.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use hottake_shared::{Framing, HotTakeError, Result};

use crate::event::Event;

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Serializes events onto an append-only byte stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventEncoder {
    framing: Framing,
}

impl EventEncoder {
    pub fn new(framing: Framing) -> Self {
        Self { framing }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Media type for a stream produced by this encoder.
    pub fn content_type(&self) -> &'static str {
        self.framing.content_type()
    }

    /// Encode one value, including its trailing separator if the framing has one.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(value)
            .map_err(|e| HotTakeError::framing(format!("failed to encode event: {e}")))?;
        if self.framing == Framing::Ndjson {
            bytes.push(b'\n');
        }
        Ok(bytes)
    }

    /// Encode a sequence of values into one contiguous buffer.
    pub fn encode_all<'a, T, I>(&self, values: I) -> Result<Vec<u8>>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut out = Vec::new();
        for value in values {
            out.extend(self.encode(value)?);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Demultiplexer
// ---------------------------------------------------------------------------

/// Incremental decoder recovering discrete values from a byte stream.
#[derive(Debug)]
pub struct StreamDemux<T = Event> {
    framing: Framing,
    buf: Vec<u8>,
    /// Next byte of `buf` to examine.
    pos: usize,
    /// Start of the value currently being scanned (concatenated framing).
    start: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// Values decoded by a call that then failed, handed out by the next call.
    ready: Vec<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> StreamDemux<T> {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buf: Vec::new(),
            pos: 0,
            start: 0,
            depth: 0,
            in_string: false,
            escaped: false,
            ready: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Bytes received but not yet part of a decoded value.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Feed one chunk; returns every value completed by it, in order.
    ///
    /// An undecodable value is dropped and reported as a framing error. Values
    /// completed before it in the same call are returned by the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<T>> {
        self.buf.extend_from_slice(chunk);
        let mut values = std::mem::take(&mut self.ready);
        let outcome = match self.framing {
            Framing::Ndjson => self.drain_lines(&mut values),
            Framing::Concatenated => self.drain_concatenated(&mut values),
        };
        trace!(
            chunk_len = chunk.len(),
            decoded = values.len(),
            buffered = self.buf.len(),
            "demux chunk"
        );
        if let Err(e) = outcome {
            self.ready = values;
            return Err(e);
        }
        Ok(values)
    }

    /// Signal end of stream. Returns a final unterminated line for NDJSON;
    /// any other leftover is a framing error.
    pub fn finish(mut self) -> Result<Option<T>> {
        let rest = std::mem::take(&mut self.buf);
        let trimmed = rest.trim_ascii();
        if trimmed.is_empty() {
            return Ok(None);
        }

        match self.framing {
            Framing::Ndjson => decode(trimmed).map(Some),
            Framing::Concatenated => Err(HotTakeError::framing(format!(
                "stream ended inside a value ({} bytes buffered)",
                trimmed.len()
            ))),
        }
    }

    fn drain_lines(&mut self, values: &mut Vec<T>) -> Result<()> {
        let mut consumed = 0;
        let mut failure = None;

        while let Some(offset) = self.buf[self.pos..].iter().position(|&b| b == b'\n') {
            let end = self.pos + offset;
            let line = self.buf[consumed..end].trim_ascii();
            let decoded = (!line.is_empty()).then(|| decode(line));
            consumed = end + 1;
            self.pos = consumed;
            match decoded {
                Some(Ok(value)) => values.push(value),
                Some(Err(e)) => {
                    failure = Some(e);
                    break;
                }
                None => {}
            }
        }

        self.buf.drain(..consumed);
        match failure {
            // Lines after the bad one are rescanned on the next call.
            Some(e) => {
                self.pos = 0;
                Err(e)
            }
            None => {
                self.pos = self.buf.len();
                Ok(())
            }
        }
    }

    fn drain_concatenated(&mut self, values: &mut Vec<T>) -> Result<()> {
        let mut consumed = 0;
        let mut failure = None;

        while self.pos < self.buf.len() {
            let b = self.buf[self.pos];

            if self.depth == 0 {
                match b {
                    b if b.is_ascii_whitespace() => consumed = self.pos + 1,
                    b'{' | b'[' => {
                        self.start = self.pos;
                        self.depth = 1;
                    }
                    other => {
                        failure = Some(HotTakeError::framing(format!(
                            "unexpected byte {:?} between values",
                            other as char
                        )));
                        consumed = self.pos + 1;
                        self.pos += 1;
                        break;
                    }
                }
                self.pos += 1;
                continue;
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
            } else {
                match b {
                    b'"' => self.in_string = true,
                    b'{' | b'[' => self.depth += 1,
                    b'}' | b']' => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            let decoded = decode(&self.buf[self.start..=self.pos]);
                            consumed = self.pos + 1;
                            self.pos += 1;
                            match decoded {
                                Ok(value) => values.push(value),
                                Err(e) => {
                                    failure = Some(e);
                                    break;
                                }
                            }
                            continue;
                        }
                    }
                    _ => {}
                }
            }
            self.pos += 1;
        }

        self.buf.drain(..consumed);
        self.pos -= consumed;
        self.start = self.start.saturating_sub(consumed);
        failure.map_or(Ok(()), Err)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| HotTakeError::framing(format!("undecodable value: {e}")))
}

/// Decode a complete buffer in one pass.
pub fn decode_all<T: DeserializeOwned>(framing: Framing, bytes: &[u8]) -> Result<Vec<T>> {
    let mut demux = StreamDemux::new(framing);
    let mut values = demux.push(bytes)?;
    values.extend(demux.finish()?);
    Ok(values)
}
