/// Reassembles server-sent event lines from arbitrarily split byte chunks.
///
/// Splitting happens on raw bytes so a multi-byte character cut across two
/// chunks is decoded only once the line is complete.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Returns whatever is left once the body has ended without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[derive(Debug, PartialEq, Eq)]
pub enum SseEvent<'a> {
    Data(&'a str),
    Done,
}

/// Blank lines, comments and fields other than `data` yield `None`.
pub fn parse_line(line: &str) -> Option<SseEvent<'_>> {
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    if data.is_empty() {
        return None;
    }
    Some(SseEvent::Data(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: {\"a\":").is_empty());
        let lines = buffer.push(b"1}\r\n\r\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string(), String::new()]);
        assert_eq!(buffer.push(b"NE]\n"), vec!["data: [DONE]".to_string()]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn keeps_multibyte_characters_intact() {
        let bytes = "data: héllo\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(&bytes[..split]).is_empty());
        assert_eq!(buffer.push(&bytes[split..]), vec!["data: héllo".to_string()]);
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut buffer = SseLineBuffer::new();
        buffer.push(b"data: [DONE]");
        assert_eq!(buffer.finish().as_deref(), Some("data: [DONE]"));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn parses_data_and_done() {
        assert_eq!(parse_line("data: {\"x\":1}"), Some(SseEvent::Data("{\"x\":1}")));
        assert_eq!(parse_line("data:{\"x\":1}"), Some(SseEvent::Data("{\"x\":1}")));
        assert_eq!(parse_line("data: [DONE]"), Some(SseEvent::Done));
    }

    #[test]
    fn ignores_blank_comment_and_other_fields() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line(": keep-alive"), None);
        assert_eq!(parse_line("event: message"), None);
        assert_eq!(parse_line("data: "), None);
    }
}
