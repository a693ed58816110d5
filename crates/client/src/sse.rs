//! Minimal SSE frame decoder for the daemon's event stream.
//!
//! Operates on raw bytes so a chunk boundary landing inside a multi-byte
//! path name cannot corrupt the frame; UTF-8 decoding happens only once a
//! complete frame is buffered.

pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed one network chunk; returns the data payloads of every frame that
    /// completed. Comment lines (keep-alives) and non-data fields are
    /// dropped; multi-line data fields are joined with newlines per the SSE
    /// framing rules.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(end) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&frame);
            let mut data = String::new();
            for line in text.lines() {
                if let Some(rest) = line.strip_prefix("data:") {
                    if !data.is_empty() {
                        data.push('\n');
                    }
                    data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
                }
            }
            if !data.is_empty() {
                payloads.push(data);
            }
        }
        payloads
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}
