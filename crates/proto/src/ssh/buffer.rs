//! Owned contiguous byte buffer for packet assembly.
//!
//! The reassembly and staging paths need a buffer with operations that
//! go beyond what a plain `Vec<u8>` offers in one place: zero-filled
//! tail allocation that hands back a writable slice for in-place
//! decryption, header prepending, and consuming bytes from either end
//! without shifting the underlying storage.
//!
//! The readable region is `data[pos..]`; `pass_bytes` advances `pos`
//! and `pass_bytes_end` truncates the tail. No slice handed out by
//! this type survives a growth operation.

/// Growable byte buffer with a read cursor.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl PacketBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Number of readable bytes.
    pub fn len(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true if no bytes are readable.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all content and resets the read cursor.
    pub fn clear(&mut self) {
        self.data.clear();
        self.pos = 0;
    }

    /// Appends `count` zero bytes and returns the writable slice over
    /// them, for in-place decryption into the buffer tail.
    pub fn allocate(&mut self, count: usize) -> &mut [u8] {
        let start = self.data.len();
        self.data.resize(start + count, 0);
        &mut self.data[start..]
    }

    /// Appends bytes to the end of the readable region.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Inserts bytes in front of the readable region.
    pub fn prepend(&mut self, bytes: &[u8]) {
        if self.pos >= bytes.len() {
            // Reuse the already-consumed head instead of shifting.
            self.pos -= bytes.len();
            self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        } else {
            self.data.splice(self.pos..self.pos, bytes.iter().copied());
        }
    }

    /// Consumes `count` bytes from the front of the readable region.
    ///
    /// Returns false (and consumes nothing) if fewer bytes are
    /// available.
    pub fn pass_bytes(&mut self, count: usize) -> bool {
        if self.len() < count {
            return false;
        }
        self.pos += count;
        true
    }

    /// Truncates `count` bytes from the end of the readable region.
    ///
    /// Returns false (and truncates nothing) if fewer bytes are
    /// available.
    pub fn pass_bytes_end(&mut self, count: usize) -> bool {
        if self.len() < count {
            return false;
        }
        self.data.truncate(self.data.len() - count);
        true
    }

    /// Reads one byte from the front of the readable region.
    pub fn get_u8(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Some(byte)
    }

    /// The readable region.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// The readable region, writable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.pos..]
    }

    /// Replaces the whole content with `bytes`.
    pub fn replace(&mut self, bytes: &[u8]) {
        self.clear();
        self.data.extend_from_slice(bytes);
    }
}
