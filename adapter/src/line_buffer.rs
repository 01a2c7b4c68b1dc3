//! Reassembles complete lines from arbitrarily chunked output.

/// Bytes-in, lines-out buffer.
///
/// Chunks are joined until a `\n` arrives. A trailing `\r` is dropped from
/// each line. Decoding happens per complete line, so a multi-byte character
/// split across two chunks survives intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    max_buffer_bytes: Option<usize>,
    overflowed_bytes: usize,
}

impl LineBuffer {
    /// Cap the unterminated tail; older bytes are dropped past the cap.
    #[must_use]
    pub fn with_max_buffer_bytes(max_buffer_bytes: usize) -> Self {
        Self {
            max_buffer_bytes: Some(max_buffer_bytes),
            ..Self::default()
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            let mut line = &self.buffer[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
        }
        self.buffer.drain(..start);

        if let Some(max) = self.max_buffer_bytes
            && self.buffer.len() > max
        {
            let excess = self.buffer.len() - max;
            self.buffer.drain(..excess);
            self.overflowed_bytes = self.overflowed_bytes.saturating_add(excess);
        }

        lines
    }

    /// Take whatever unterminated text remains, if any.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&tail);
        Some(text.strip_suffix('\r').unwrap_or(&text).to_string())
    }

    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn take_overflowed_bytes(&mut self) -> usize {
        std::mem::take(&mut self.overflowed_bytes)
    }
}
