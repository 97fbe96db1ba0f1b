//! XDR codec primitives.
//!
//! Everything on the wire is big-endian and 4-byte aligned; counted byte
//! strings are a `u32` length followed by the bytes and zero padding up to
//! the next 4-byte boundary. Packet bodies compose these primitives through
//! `std::io::{Read, Write}`, which is also where buffered port I/O plugs in:
//! when a port's inbound buffer runs dry its `Read` implementation refills
//! from the transport, and its `Write` implementation spills on flush.

use crate::{FbError, FbResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Largest counted field a pre-v13 peer accepts.
pub const MAX_USHORT: usize = 65_535;

/// Protocol-dependent codec context.
///
/// Carries the masked protocol version (10..=16, or 0 while the connection
/// is still negotiating), which gates length checking and the few packet
/// fields that exist only on recent versions.
#[derive(Clone, Copy, Debug)]
pub struct XdrCtx {
    pub protocol: u16,
}

impl XdrCtx {
    /// Context used before version negotiation has completed.
    pub fn bootstrap() -> Self {
        Self { protocol: 0 }
    }

    pub fn with_protocol(protocol: u16) -> Self {
        Self { protocol }
    }

    /// Rejects counted fields the negotiated protocol cannot carry.
    pub(crate) fn check_length(self, len: usize) -> FbResult<()> {
        if len > MAX_USHORT && self.protocol < 13 {
            return Err(FbError::Limit("field length exceeds negotiated maximum"));
        }
        Ok(())
    }
}

pub(crate) fn pad_of(len: usize) -> usize {
    (4 - len % 4) % 4
}

pub(crate) fn put_u8(w: &mut dyn std::io::Write, v: u8) -> FbResult<()> {
    Ok(w.write_u8(v)?)
}

pub(crate) fn put_i32(w: &mut dyn std::io::Write, v: i32) -> FbResult<()> {
    Ok(w.write_i32::<BigEndian>(v)?)
}

pub(crate) fn put_u32(w: &mut dyn std::io::Write, v: u32) -> FbResult<()> {
    Ok(w.write_u32::<BigEndian>(v)?)
}

pub(crate) fn put_u64(w: &mut dyn std::io::Write, v: u64) -> FbResult<()> {
    Ok(w.write_u64::<BigEndian>(v)?)
}

pub(crate) fn get_i32(r: &mut dyn std::io::Read) -> FbResult<i32> {
    Ok(r.read_i32::<BigEndian>()?)
}

pub(crate) fn get_u32(r: &mut dyn std::io::Read) -> FbResult<u32> {
    Ok(r.read_u32::<BigEndian>()?)
}

pub(crate) fn get_u64(r: &mut dyn std::io::Read) -> FbResult<u64> {
    Ok(r.read_u64::<BigEndian>()?)
}

/// Counted byte string: `u32` length, bytes, zero padding to 4 bytes.
pub(crate) fn put_cstring(w: &mut dyn std::io::Write, ctx: XdrCtx, bytes: &[u8]) -> FbResult<()> {
    ctx.check_length(bytes.len())?;
    #[allow(clippy::cast_possible_truncation)]
    w.write_u32::<BigEndian>(bytes.len() as u32)?;
    w.write_all(bytes)?;
    for _ in 0..pad_of(bytes.len()) {
        w.write_u8(0)?;
    }
    Ok(())
}

pub(crate) fn get_cstring(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Vec<u8>> {
    let len = r.read_u32::<BigEndian>()? as usize;
    ctx.check_length(len)?;
    let bytes = parse_bytes(len, r)?;
    skip_bytes(pad_of(len), r)?;
    Ok(bytes)
}

// Read n bytes, return as Vec<u8>
pub(crate) fn parse_bytes(len: usize, r: &mut dyn std::io::Read) -> FbResult<Vec<u8>> {
    let mut vec = vec![0_u8; len];
    r.read_exact(&mut vec)?;
    Ok(vec)
}

pub(crate) fn skip_bytes(n: usize, r: &mut dyn std::io::Read) -> FbResult<()> {
    let mut buffer = [0_u8; 8];
    debug_assert!(n <= buffer.len());
    Ok(r.read_exact(&mut buffer[0..n])?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cstring_is_padded_to_four_bytes() {
        let ctx = XdrCtx::with_protocol(13);
        for len in 0..9_usize {
            let payload = vec![0xAB_u8; len];
            let mut buf = Vec::new();
            put_cstring(&mut buf, ctx, &payload).unwrap();
            assert_eq!(buf.len() % 4, 0, "len {len} not aligned");
            let mut rdr = std::io::Cursor::new(buf);
            assert_eq!(get_cstring(&mut rdr, ctx).unwrap(), payload);
        }
    }

    #[test]
    fn old_protocols_reject_oversized_fields() {
        let big = vec![0_u8; MAX_USHORT + 1];
        let mut buf = Vec::new();
        assert!(put_cstring(&mut buf, XdrCtx::with_protocol(12), &big).is_err());
        assert!(put_cstring(&mut buf, XdrCtx::with_protocol(13), &big).is_ok());
    }
}
