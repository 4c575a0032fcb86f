//! Streaming packet compression (zlib).
//!
//! SSH compresses each packet payload with a single zlib stream per
//! direction that lives for the rest of the session: dictionary state
//! carries from packet to packet, so the contexts here are created once
//! and never reset. Deflate uses partial flush so every packet is
//! decodable on its own without terminating the stream.
//!
//! Inbound inflation is bounded by a caller-supplied `maxlen`; output
//! growth beyond it aborts the packet (decompression-bomb guard), and
//! the output buffer is never grown past the cap.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use skiff_platform::{SkiffError, SkiffResult};

/// Transit chunk size for deflate output.
const CHUNK_SIZE: usize = 4 * 1024;

/// Outbound streaming deflate context.
pub struct DeflateStream {
    ctx: Compress,
}

impl std::fmt::Debug for DeflateStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateStream").finish()
    }
}

impl DeflateStream {
    /// Creates a deflate context with the given zlib level (1-9).
    pub fn new(level: u32) -> Self {
        Self {
            ctx: Compress::new(Compression::new(level), true),
        }
    }

    /// Compresses one packet payload with partial flush.
    ///
    /// The returned bytes are a self-contained continuation of the
    /// stream: the peer can inflate them without a final flush.
    pub fn compress(&mut self, data: &[u8]) -> SkiffResult<Vec<u8>> {
        let mut out = Vec::with_capacity(CHUNK_SIZE);
        let mut chunk = [0u8; CHUNK_SIZE];
        let start_in = self.ctx.total_in();

        loop {
            let consumed = (self.ctx.total_in() - start_in) as usize;
            let before_out = self.ctx.total_out();
            let status = self
                .ctx
                .compress(&data[consumed..], &mut chunk, FlushCompress::Partial)
                .map_err(|e| SkiffError::Protocol(format!("deflate error: {}", e)))?;
            let produced = (self.ctx.total_out() - before_out) as usize;
            out.extend_from_slice(&chunk[..produced]);

            let consumed = (self.ctx.total_in() - start_in) as usize;
            match status {
                Status::StreamEnd => break,
                // Output chunk not filled: all pending data flushed.
                _ if consumed == data.len() && produced < chunk.len() => break,
                Status::BufError if consumed == data.len() => break,
                _ => {}
            }
        }

        Ok(out)
    }
}

/// Inbound streaming inflate context.
pub struct InflateStream {
    ctx: Decompress,
}

impl std::fmt::Debug for InflateStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InflateStream").finish()
    }
}

impl Default for InflateStream {
    fn default() -> Self {
        Self::new()
    }
}

impl InflateStream {
    /// Creates an inflate context.
    pub fn new() -> Self {
        Self {
            ctx: Decompress::new(true),
        }
    }

    /// Inflates one packet payload, bounded by `maxlen`.
    ///
    /// Input exhaustion is the normal termination for a partial-flush
    /// stream. Output exceeding `maxlen` aborts the packet.
    pub fn decompress(&mut self, data: &[u8], maxlen: usize) -> SkiffResult<Vec<u8>> {
        // In practice payloads never inflate into less than this.
        let mut out_cap = (data.len() * 4).max(25).min(maxlen);
        let mut out = vec![0u8; out_cap];
        let mut written = 0usize;
        let start_in = self.ctx.total_in();

        loop {
            let consumed = (self.ctx.total_in() - start_in) as usize;
            let before_out = self.ctx.total_out();
            let status = self
                .ctx
                .decompress(&data[consumed..], &mut out[written..], FlushDecompress::None)
                .map_err(|e| SkiffError::Protocol(format!("inflate error: {}", e)))?;
            written += (self.ctx.total_out() - before_out) as usize;

            match status {
                Status::StreamEnd => break,
                // The input has been exhausted.
                Status::BufError => break,
                Status::Ok => {
                    if written < out.len() {
                        // Output not exhausted: the packet is fully inflated.
                        break;
                    }
                }
            }

            if out_cap >= maxlen {
                return Err(SkiffError::Protocol(
                    "Excessive growth in decompression phase".to_string(),
                ));
            }
            out_cap = (out_cap * 2).min(maxlen);
            out.resize(out_cap, 0);
        }

        out.truncate(written);
        Ok(out)
    }
}
