//! Incremental Server-Sent Events decoder.
//!
//! Bytes are fed in whatever chunks the transport delivers; complete records
//! come out as soon as their terminating blank line has been seen.

/// One decoded server event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseRecord {
    /// Value of the last `event:` field, if any.
    pub event: Option<String>,
    /// All `data:` values joined with `\n`.
    pub data: String,
    /// Every non-comment line that contributed to this record.
    pub raw_lines: Vec<String>,
}

/// Pure line-oriented SSE transducer. Performs no I/O.
///
/// Use one decoder per stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    current: SseRecord,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers `chunk` and returns every record completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        self.buf.extend_from_slice(chunk);
        let mut records = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = decode_line(&self.buf[start..end]);
            start = end + 1;
            self.process_line(&line, &mut records);
        }
        self.buf.drain(..start);
        records
    }

    /// Flushes a trailing line and record that never saw their terminator.
    ///
    /// Call once when the transport closes. The decoder is empty afterwards.
    pub fn finalize(&mut self) -> Vec<SseRecord> {
        let mut records = Vec::new();
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let line = decode_line(&rest);
            self.process_line(&line, &mut records);
        }
        self.flush(&mut records);
        records
    }

    fn process_line(&mut self, line: &str, records: &mut Vec<SseRecord>) {
        if line.is_empty() {
            self.flush(records);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        self.current.raw_lines.push(line.to_string());
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.current.event = Some(value.to_string()),
            "data" => {
                if !self.current.data.is_empty() {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
            }
            _ => {}
        }
    }

    fn flush(&mut self, records: &mut Vec<SseRecord>) {
        if self.current.raw_lines.is_empty() {
            return;
        }
        records.push(std::mem::take(&mut self.current));
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decodes a complete payload in one go.
pub fn parse_sse(payload: &[u8]) -> Vec<SseRecord> {
    let mut decoder = SseDecoder::new();
    let mut records = decoder.feed(payload);
    records.extend(decoder.finalize());
    records
}
