//! Incremental parser for Server-Sent Events bodies (`alt=sse` chat streams).
//!
//! Events are separated by a blank line; CRLF line endings are normalised so
//! both `\n\n` and `\r\n\r\n` boundaries work.

/// A single parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Holds raw bytes until a whole event has arrived. Decoding waits for the
/// blank line, so a UTF-8 sequence split across chunks stays intact.
#[derive(Default)]
pub struct SseParser {
    pending: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one body chunk and return the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        if self.pending.contains(&b'\r') {
            // a CRLF may straddle two chunks, so normalise the whole buffer
            self.pending = strip_crlf(&self.pending);
        }

        let mut events = Vec::new();
        while let Some(boundary) = self.pending.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.pending.drain(..boundary + 2).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.pending);
        parse_block(&String::from_utf8_lossy(&rest))
    }
}

fn strip_crlf(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(b);
    }
    out
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event_type = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if let Some(val) = line.strip_prefix("event:") {
            event_type = Some(val.trim().to_string());
        } else if let Some(val) = line.strip_prefix("data:") {
            data_lines.push(val.strip_prefix(' ').unwrap_or(val));
        }
        // id:, retry: and ":" comments are ignored
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event: event_type,
        data: data_lines.join("\n"),
    })
}
