//! Transparent streaming compression for the wire, negotiated once per
//! connection at handshake time.
//!
//! Both directions run independent zlib streams. The outbound filter
//! consumes a whole XDR buffer and forces a sync point whenever the packet
//! layer flushes, so the peer can always decode up to the last packet
//! boundary. The inbound filter keeps decoded-but-undelivered bytes in a
//! pending buffer which must be drained before any blocking transport read.

use crate::FbResult;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

const CHUNK: usize = 8_192;

/// Outbound half of the compression filter.
pub struct Deflater {
    c: Compress,
}

impl Deflater {
    pub fn new() -> Self {
        Self {
            c: Compress::new(Compression::default(), true),
        }
    }

    /// Compresses `input` completely, handing every produced chunk to
    /// `sink`. With `flush` set, ends on a sync point.
    pub fn run(
        &mut self,
        mut input: &[u8],
        flush: bool,
        sink: &mut dyn FnMut(&[u8]) -> FbResult<()>,
    ) -> FbResult<()> {
        let mut out = [0_u8; CHUNK];
        while !input.is_empty() {
            let (consumed, produced) = self.step(input, &mut out, FlushCompress::None)?;
            input = &input[consumed..];
            if produced > 0 {
                sink(&out[..produced])?;
            }
        }
        if flush {
            loop {
                let (_, produced) = self.step(&[], &mut out, FlushCompress::Sync)?;
                if produced == 0 {
                    break;
                }
                sink(&out[..produced])?;
            }
        }
        Ok(())
    }

    fn step(
        &mut self,
        input: &[u8],
        out: &mut [u8],
        flush: FlushCompress,
    ) -> FbResult<(usize, usize)> {
        let before_in = self.c.total_in();
        let before_out = self.c.total_out();
        self.c.compress(input, out, flush)?;
        #[allow(clippy::cast_possible_truncation)]
        Ok((
            (self.c.total_in() - before_in) as usize,
            (self.c.total_out() - before_out) as usize,
        ))
    }
}

impl Default for Deflater {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Deflater {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Deflater(total_out={})", self.c.total_out())
    }
}

/// Inbound half of the compression filter.
pub struct Inflater {
    d: Decompress,
    pending: Vec<u8>,
    pos: usize,
}

impl Inflater {
    pub fn new() -> Self {
        Self {
            d: Decompress::new(true),
            pending: Vec::new(),
            pos: 0,
        }
    }

    /// True when decoded output is buffered but not yet delivered; such
    /// bytes must be consumed before the transport is read again.
    pub fn has_pending(&self) -> bool {
        self.pos < self.pending.len()
    }

    /// Delivers at least one decoded byte into `out`. `fill` supplies raw
    /// compressed bytes from the transport and must return at least one.
    pub fn read(
        &mut self,
        out: &mut [u8],
        fill: &mut dyn FnMut(&mut [u8]) -> FbResult<usize>,
    ) -> FbResult<usize> {
        loop {
            if self.has_pending() {
                let n = (self.pending.len() - self.pos).min(out.len());
                out[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            self.pending.clear();
            self.pos = 0;
            let mut raw = [0_u8; CHUNK];
            let n = fill(&mut raw)?;
            self.decode(&raw[..n])?;
        }
    }

    fn decode(&mut self, mut input: &[u8]) -> FbResult<()> {
        let mut out = [0_u8; CHUNK];
        loop {
            let before_in = self.d.total_in();
            let before_out = self.d.total_out();
            self.d.decompress(input, &mut out, FlushDecompress::None)?;
            #[allow(clippy::cast_possible_truncation)]
            let consumed = (self.d.total_in() - before_in) as usize;
            #[allow(clippy::cast_possible_truncation)]
            let produced = (self.d.total_out() - before_out) as usize;
            input = &input[consumed..];
            self.pending.extend_from_slice(&out[..produced]);
            if input.is_empty() && produced < out.len() {
                return Ok(());
            }
            if consumed == 0 && produced == 0 {
                return Ok(());
            }
        }
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Inflater {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Inflater(pending={}, pos={})",
            self.pending.len(),
            self.pos
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_with_sync_points() {
        let mut deflater = Deflater::new();
        let mut wire = Vec::new();
        let first: Vec<u8> = (0..40_000_u32).map(|i| (i % 251) as u8).collect();
        let second = b"second packet".to_vec();

        for part in [&first, &second] {
            deflater
                .run(part, true, &mut |chunk| {
                    wire.extend_from_slice(chunk);
                    Ok(())
                })
                .unwrap();
        }
        assert!(wire.len() < first.len(), "compressible data must shrink");

        // feed the compressed stream back in small slices
        let mut inflater = Inflater::new();
        let mut offset = 0_usize;
        let mut fill = |buf: &mut [u8]| {
            let n = (wire.len() - offset).min(buf.len()).min(1_000);
            buf[..n].copy_from_slice(&wire[offset..offset + n]);
            offset += n;
            Ok(n)
        };
        let mut decoded = Vec::new();
        let mut out = [0_u8; 512];
        while decoded.len() < first.len() + second.len() {
            let n = inflater.read(&mut out, &mut fill).unwrap();
            decoded.extend_from_slice(&out[..n]);
        }
        assert_eq!(&decoded[..first.len()], &first[..]);
        assert_eq!(&decoded[first.len()..], &second[..]);
        assert!(!inflater.has_pending());
    }
}
