use super::logging::emit_frame_parse_error;
use crate::types::WireFrame;
use bytes::{Buf, BytesMut};

pub const DATA_PREFIX: &str = "data:";

/// Incremental decoder for the `data: <json>` line protocol.
///
/// Network chunks are split at arbitrary byte offsets, so both an incomplete
/// UTF-8 sequence and an incomplete line are carried over to the next chunk.
#[derive(Default)]
pub struct FrameDecoder {
    pending_bytes: BytesMut,
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<WireFrame> {
        self.decode_utf8(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(end) = self.buffer[start..].find('\n') {
            let line_end = start + end;
            if let Some(frame) = parse_line(&self.buffer[start..line_end]) {
                frames.push(frame);
            }
            start = line_end + 1;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        frames
    }

    /// Drains whatever is left once the body has ended, including a final
    /// line that never received its newline.
    pub fn finish(&mut self) -> Vec<WireFrame> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.buffer.push_str(&tail);
            self.pending_bytes.clear();
        }

        let remainder = std::mem::take(&mut self.buffer);
        remainder.lines().filter_map(parse_line).collect()
    }

    pub fn has_partial_line(&self) -> bool {
        !self.buffer.is_empty() || !self.pending_bytes.is_empty()
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending_bytes.clear();
                    return;
                }
                Err(error) => {
                    let valid_up_to = error.valid_up_to();
                    if let Ok(prefix) = std::str::from_utf8(&self.pending_bytes[..valid_up_to]) {
                        self.buffer.push_str(prefix);
                    }
                    match error.error_len() {
                        // Sequence cut by the chunk boundary; wait for more bytes.
                        None => {
                            self.pending_bytes.advance(valid_up_to);
                            return;
                        }
                        Some(invalid_len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.advance(valid_up_to + invalid_len);
                        }
                    }
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Option<WireFrame> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<WireFrame>(payload) {
        Ok(frame) => Some(frame),
        Err(error) => {
            emit_frame_parse_error(payload, &error);
            None
        }
    }
}
