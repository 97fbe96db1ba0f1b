//! BLOB packets.

use crate::wire::xdr::{self, XdrCtx};
use crate::FbResult;

// seek origins of op_seek_blob
pub const SEEK_FROM_HEAD: i32 = 0;
pub const SEEK_RELATIVE: i32 = 1;
pub const SEEK_FROM_TAIL: i32 = 2;

/// `op_create_blob2` / `op_open_blob2`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobOpen {
    pub transaction: u32,
    pub id: u64,
    pub bpb: Vec<u8>,
}

impl BlobOpen {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_cstring(w, ctx, &self.bpb)?;
        xdr::put_u32(w, self.transaction)?;
        xdr::put_u64(w, self.id)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            bpb: xdr::get_cstring(r, ctx)?,
            transaction: xdr::get_u32(r)?,
            id: xdr::get_u64(r)?,
        })
    }
}

/// `op_get_segment`: ask for segments filling at most `length` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GetSegment {
    pub blob: u32,
    pub length: u32,
}

impl GetSegment {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.blob)?;
        xdr::put_u32(w, self.length)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            blob: xdr::get_u32(r)?,
            length: xdr::get_u32(r)?,
        })
    }
}

/// `op_put_segment` / `op_batch_segments`: one or more segments packed as
/// `{u16 length, bytes}` pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutSegment {
    pub blob: u32,
    pub segments: Vec<u8>,
}

impl PutSegment {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.blob)?;
        xdr::put_cstring(w, ctx, &self.segments)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            blob: xdr::get_u32(r)?,
            segments: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_seek_blob`: reposition a stream blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeekBlob {
    pub blob: u32,
    pub mode: i32,
    pub offset: i32,
}

impl SeekBlob {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.blob)?;
        xdr::put_i32(w, self.mode)?;
        xdr::put_i32(w, self.offset)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            blob: xdr::get_u32(r)?,
            mode: xdr::get_i32(r)?,
            offset: xdr::get_i32(r)?,
        })
    }
}

/// Packs one segment into the `{u16 length, bytes}` stream form.
pub fn pack_segment(out: &mut Vec<u8>, segment: &[u8]) {
    debug_assert!(segment.len() <= u16::MAX as usize);
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(segment.len() as u16).to_le_bytes());
    out.extend_from_slice(segment);
}

/// Splits a packed segment stream back into segments.
pub fn unpack_segments(mut data: &[u8]) -> Vec<Vec<u8>> {
    let mut segments = Vec::new();
    while data.len() >= 2 {
        let len = u16::from_le_bytes([data[0], data[1]]) as usize;
        if data.len() < 2 + len {
            break;
        }
        segments.push(data[2..2 + len].to_vec());
        data = &data[2 + len..];
    }
    segments
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn segment_packing_round_trip() {
        let mut packed = Vec::new();
        pack_segment(&mut packed, b"one");
        pack_segment(&mut packed, b"");
        pack_segment(&mut packed, &[7_u8; 65_535]);
        let back = unpack_segments(&packed);
        assert_eq!(back.len(), 3);
        assert_eq!(back[0], b"one");
        assert_eq!(back[1], b"");
        assert_eq!(back[2].len(), 65_535);
    }
}
