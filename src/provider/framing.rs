//! Frame boundary detection for backend byte streams.
//!
//! Handles both SSE (`data:` lines terminated by a blank line) and bare
//! record-per-line JSON. Bytes are buffered until a full line is available so
//! multi-byte UTF-8 sequences split across network chunks survive intact.

/// Incremental splitter turning raw bytes into frame payloads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every payload completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.accept_line(line.trim_end_matches(['\n', '\r']), &mut payloads);
        }
        payloads
    }

    /// Flush whatever remains once the input ends.
    pub fn finish(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            self.accept_line(line.trim_end_matches('\r'), &mut payloads);
        }
        self.flush_event(&mut payloads);
        payloads
    }

    fn accept_line(&mut self, line: &str, payloads: &mut Vec<String>) {
        if line.trim().is_empty() {
            self.flush_event(payloads);
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(data) = line.strip_prefix("data:") {
            self.data_lines
                .push(data.strip_prefix(' ').unwrap_or(data).to_string());
            return;
        }
        if ["event:", "id:", "retry:"]
            .iter()
            .any(|field| line.starts_with(field))
        {
            return;
        }
        // Record-per-line input: every line is its own frame.
        self.flush_event(payloads);
        payloads.push(line.trim().to_string());
    }

    fn flush_event(&mut self, payloads: &mut Vec<String>) {
        if self.data_lines.is_empty() {
            return;
        }
        payloads.push(self.data_lines.join("\n"));
        self.data_lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_events_end_at_blank_lines() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder.push(b"data: {\"a\":1}\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn multi_line_data_joins_with_newline() {
        let mut decoder = FrameDecoder::new();

        let payloads = decoder.push(b"data: line1\ndata:line2\n\n");

        assert_eq!(payloads, vec!["line1\nline2".to_string()]);
    }

    #[test]
    fn comments_and_fields_are_ignored() {
        let mut decoder = FrameDecoder::new();

        let payloads = decoder.push(b": keep-alive\nevent: message\nid: 7\ndata: x\r\n\r\n");

        assert_eq!(payloads, vec!["x".to_string()]);
    }

    #[test]
    fn bare_json_lines_are_frames() {
        let mut decoder = FrameDecoder::new();

        let payloads = decoder.push(b"{\"response\":\"a\"}\n{\"response\":\"b\"}\n");

        assert_eq!(payloads.len(), 2);
    }

    #[test]
    fn utf8_split_across_chunks_survives() {
        let mut decoder = FrameDecoder::new();
        let bytes = "data: héllo\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["héllo".to_string()]);
    }

    #[test]
    fn finish_flushes_unterminated_tail() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec!["[DONE]".to_string()]);
    }
}
