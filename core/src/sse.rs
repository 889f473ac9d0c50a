/// Incremental Server-Sent-Events framing for the live event stream
///
/// Frames are separated by a blank line. Only `data:` fields are used; multiple
/// data lines in one frame are joined with `\n`. Comment lines (`:`) and other
/// fields (`event:`, `id:`, `retry:`) are ignored.
use crate::error::{ChatError, Result};
use crate::event::StreamEvent;
use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

#[derive(Default)]
pub struct SseDecoder {
    buf: BytesMut,
    /// Bytes of `buf` already known to contain no newline
    scanned: usize,
    data: Vec<String>,
    /// First non-UTF-8 `data:` line of the current frame
    invalid: Option<std::str::Utf8Error>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it, in order.
    ///
    /// A frame that fails to parse yields an `Err` in its slot; later frames are unaffected.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent>> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let nl = self.scanned + offset;
            self.scanned = 0;
            let line = self.buf.split_to(nl);
            self.buf.advance(1);
            let line = strip_cr(&line);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    out.push(event);
                }
                continue;
            }
            self.field(line);
        }
        self.scanned = self.buf.len();
        out
    }

    /// Flush a trailing frame that was not terminated by a blank line
    pub fn finish(&mut self) -> Option<Result<StreamEvent>> {
        if !self.buf.is_empty() {
            let rest = self.buf.split();
            self.field(strip_cr(&rest));
        }
        self.scanned = 0;
        self.dispatch()
    }

    fn field(&mut self, line: &[u8]) {
        if line.first() == Some(&b':') {
            return;
        }
        let (name, value) = match line.iter().position(|b| *b == b':') {
            Some(i) => {
                let value = &line[i + 1..];
                (&line[..i], value.strip_prefix(b" ").unwrap_or(value))
            }
            None => (line, &b""[..]),
        };

        if name == b"data" {
            match std::str::from_utf8(value) {
                Ok(text) => self.data.push(text.to_string()),
                Err(e) => {
                    self.invalid.get_or_insert(e);
                }
            }
        } else {
            debug!("Ignoring SSE field {}", String::from_utf8_lossy(name));
        }
    }

    fn dispatch(&mut self) -> Option<Result<StreamEvent>> {
        if let Some(e) = self.invalid.take() {
            self.data.clear();
            warn!("Rejected SSE frame: data is not UTF-8 ({})", e);
            return Some(Err(ChatError::Decode(format!(
                "SSE data is not valid UTF-8: {}",
                e
            ))));
        }
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();

        let parsed = StreamEvent::from_json(&payload);
        if let Err(ChatError::Decode(reason)) = &parsed {
            warn!("Rejected SSE frame: {}", reason);
        }
        Some(parsed)
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
