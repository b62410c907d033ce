// patrol-stream-rs/src/tail.rs
// Bounded content tail: keeps the newest bytes and remembers whether
// anything was dropped from the front.

/// Default tail budget in bytes.
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct OutputTail {
    buf: String,
    max_bytes: usize,
    truncated: bool,
}

impl Default for OutputTail {
    fn default() -> Self {
        Self::new(MAX_OUTPUT_BYTES)
    }
}

impl OutputTail {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: String::new(),
            max_bytes,
            truncated: false,
        }
    }

    pub fn push(&mut self, text: &str) {
        self.buf.push_str(text);
        if self.buf.len() <= self.max_bytes {
            return;
        }

        let mut cut = self.buf.len() - self.max_bytes;
        while !self.buf.is_char_boundary(cut) {
            cut += 1;
        }
        self.buf.drain(..cut);
        self.truncated = true;
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.truncated = false;
    }
}
