// crates/client/src/sse.rs
//! Incremental decoder for the server-sent-events wire format.
//!
//! The push path delivers one ProgressEvent JSON per SSE message. This
//! decoder is transport-agnostic: feed it raw body chunks, get back the
//! `data` payloads of completed messages. Comment lines and keep-alive
//! events carry no data and produce nothing.

/// Accumulates body chunks and yields completed `data` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning the data payloads of every message
    /// completed by it. Multi-line data fields are joined with `\n` per
    /// the SSE spec.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        // Normalize line terminators so the frame split below only deals
        // with `\n`. A carriage return is a terminator on its own too,
        // except a trailing one, which may pair with a newline arriving
        // in the next chunk and is held back until then.
        if self.buf.contains('\r') {
            self.buf = self.buf.replace("\r\n", "\n");
            let hold_trailing_cr = self.buf.ends_with('\r');
            if hold_trailing_cr {
                self.buf.truncate(self.buf.len() - 1);
            }
            self.buf = self.buf.replace('\r', "\n");
            if hold_trailing_cr {
                self.buf.push('\r');
            }
        }

        let mut messages = Vec::new();
        while let Some(end) = self.buf.find("\n\n") {
            let frame: String = self.buf.drain(..end + 2).collect();
            let mut data_lines = Vec::new();
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("data:") {
                    data_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
                }
            }
            if !data_lines.is_empty() {
                messages.push(data_lines.join("\n"));
            }
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_message() {
        let mut dec = SseDecoder::new();
        let out = dec.feed(b"data: {\"a\":1}\n\n");
        assert_eq!(out, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_message_split_across_chunks() {
        let mut dec = SseDecoder::new();
        assert!(dec.feed(b"data: {\"comp").is_empty());
        assert!(dec.feed(b"leted\":3}").is_empty());
        let out = dec.feed(b"\n\n");
        assert_eq!(out, vec!["{\"completed\":3}"]);
    }

    #[test]
    fn test_multiple_messages_in_one_chunk() {
        let mut dec = SseDecoder::new();
        let out = dec.feed(b"data: one\n\ndata: two\n\n");
        assert_eq!(out, vec!["one", "two"]);
    }

    #[test]
    fn test_comment_and_event_lines_ignored() {
        let mut dec = SseDecoder::new();
        let out = dec.feed(b": heartbeat\n\nevent: tick\ndata: payload\n\n");
        assert_eq!(out, vec!["payload"]);
    }

    #[test]
    fn test_crlf_normalized() {
        let mut dec = SseDecoder::new();
        let out = dec.feed(b"data: x\r\n\r\n");
        assert_eq!(out, vec!["x"]);
    }

    #[test]
    fn test_bare_cr_line_terminators() {
        let mut dec = SseDecoder::new();
        let out = dec.feed(b"data: x\r\rdata: y\n\n");
        assert_eq!(out, vec!["x", "y"]);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut dec = SseDecoder::new();
        // The trailing carriage return must wait for the next chunk; it
        // could be the first half of a CRLF pair.
        assert!(dec.feed(b"data: x\r").is_empty());
        let out = dec.feed(b"\ndata: y\r\n\r\n");
        assert_eq!(out, vec!["x\ny"]);
    }

    #[test]
    fn test_multi_line_data_joined() {
        let mut dec = SseDecoder::new();
        let out = dec.feed(b"data: line1\ndata: line2\n\n");
        assert_eq!(out, vec!["line1\nline2"]);
    }
}
