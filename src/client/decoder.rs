use crate::transport::EventLine;

/// Splits a chunked newline-delimited JSON body into event lines
///
/// Chunk boundaries may fall anywhere, including inside a UTF-8 sequence.
/// Bytes after the last newline stay buffered until more data arrives; if the
/// stream ends first they are simply never decoded.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Decodes the next complete line, skipping blank ones
    pub fn next_line(&mut self) -> Option<Result<EventLine, serde_json::Error>> {
        loop {
            let end = self.buf.iter().position(|b| *b == b'\n')?;
            let line: Vec<u8> = self.buf.drain(..=end).collect();
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            return Some(serde_json::from_slice(line));
        }
    }

    /// Bytes of an incomplete trailing line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_lines_split_across_chunks() {
        let mut decoder = LineDecoder::new();
        decoder.push(br#"{"index":0,"time":"0000000000000001","da"#);
        assert!(decoder.next_line().is_none());

        decoder.push(b"ta\":\"a\"}\n{\"index\":1,\"time\":\"0000000000000002\",\"data\":\"b\"}\n");
        let first = decoder.next_line().unwrap().unwrap();
        let second = decoder.next_line().unwrap().unwrap();
        assert_eq!((first.index, first.data.as_str()), (0, "a"));
        assert_eq!((second.index, second.data.as_str()), (1, "b"));
        assert!(decoder.next_line().is_none());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_partial_trailing_line_stays_pending() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"{\"index\":0,\"time\":\"0000000000000001\",\"data\":\"a\"}\n{\"index\":1");

        assert!(decoder.next_line().unwrap().is_ok());
        assert!(decoder.next_line().is_none());
        assert_eq!(decoder.pending(), "{\"index\":1".len());
    }

    #[test]
    fn test_skips_blank_lines_and_reports_garbage() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"\n\r\nnot json\n");

        assert!(decoder.next_line().unwrap().is_err());
        assert!(decoder.next_line().is_none());
    }

    #[test]
    fn test_multibyte_text_split_mid_character() {
        let line = "{\"index\":4,\"time\":\"0000000000000005\",\"data\":\"caf\u{e9}\"}\n";
        let bytes = line.as_bytes();
        let split = line.find('\u{e9}').unwrap() + 1;

        let mut decoder = LineDecoder::new();
        decoder.push(&bytes[..split]);
        assert!(decoder.next_line().is_none());
        decoder.push(&bytes[split..]);

        let event = decoder.next_line().unwrap().unwrap();
        assert_eq!(event.data, "caf\u{e9}");
    }
}
