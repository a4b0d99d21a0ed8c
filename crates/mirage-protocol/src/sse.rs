use bytes::Bytes;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Line-oriented decoder for `data: ` frames.
///
/// Bytes are buffered until a newline arrives, so a chunk may end anywhere:
/// mid-line, mid-frame, or inside a multi-byte UTF-8 sequence. Only lines that
/// start with the exact `data: ` prefix yield a payload; `event:` lines,
/// comments and blank separators are dropped.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<String> {
        self.push_slice(chunk.as_ref())
    }

    pub fn push_slice(&mut self, chunk: &[u8]) -> Vec<String> {
        let scan_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer[scan_from..]
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map(|pos| scan_from + pos)
        else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split(|byte| *byte == b'\n')
            .filter_map(data_payload)
            .collect()
    }

    /// Flushes a trailing line that never saw its newline.
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line).into_iter().collect()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let payload = line.strip_prefix(DATA_PREFIX.as_bytes())?;
    Some(String::from_utf8_lossy(payload).into_owned())
}
