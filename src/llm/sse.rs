// Server-sent events decoding for the Gemini stream
//
// Gemini sends one JSON payload per `data:` line. Network chunks may split
// lines (and multi-byte characters) anywhere, so bytes are buffered until a
// full line is available.

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning the payloads of every completed `data:` line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            payloads.extend(Self::payload(&line));
        }
        payloads
    }

    /// Flush a trailing `data:` line that arrived without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        Self::payload(&rest)
    }

    fn payload(line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(&['\n', '\r'][..]);
        let data = line.strip_prefix("data:")?;
        let data = data.strip_prefix(' ').unwrap_or(data);
        (!data.is_empty()).then(|| data.to_string())
    }
}
