//! Event registration and delivery, cancellation, and the auxiliary-channel
//! bootstrap request.

use crate::wire::xdr::{self, XdrCtx};
use crate::FbResult;

/// Version byte of an event parameter buffer.
pub const EPB_VERSION1: u8 = 1;

/// Sub-kinds of `op_cancel`.
pub const CANCEL_DISABLE: i32 = 1;
pub const CANCEL_ENABLE: i32 = 2;
pub const CANCEL_RAISE: i32 = 3;
pub const CANCEL_ABORT: i32 = 4;

/// Request type inside `op_connect_request`: open an auxiliary channel.
pub const REQ_ASYNC: i32 = 1;

/// `op_que_events` (client → server) and `op_event` (server → client, on
/// the auxiliary port).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventsBody {
    pub database: u32,
    /// Event parameter buffer: version byte, then per event a counted name
    /// followed by its little-endian count.
    pub items: Vec<u8>,
    pub ast: i32,
    pub arg: i32,
    pub rid: i32,
}

impl EventsBody {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.database)?;
        xdr::put_cstring(w, ctx, &self.items)?;
        xdr::put_i32(w, self.ast)?;
        xdr::put_i32(w, self.arg)?;
        xdr::put_i32(w, self.rid)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            database: xdr::get_u32(r)?,
            items: xdr::get_cstring(r, ctx)?,
            ast: xdr::get_i32(r)?,
            arg: xdr::get_i32(r)?,
            rid: xdr::get_i32(r)?,
        })
    }
}

/// `op_cancel_events`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CancelEvents {
    pub database: u32,
    pub rid: i32,
}

impl CancelEvents {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.database)?;
        xdr::put_i32(w, self.rid)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            database: xdr::get_u32(r)?,
            rid: xdr::get_i32(r)?,
        })
    }
}

/// `op_cancel`: out-of-queue cancellation, sent on the auxiliary port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancel {
    pub kind: i32,
}

impl Cancel {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_i32(w, self.kind)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            kind: xdr::get_i32(r)?,
        })
    }
}

/// `op_connect_request`: ask the server to open an auxiliary endpoint; the
/// response's data blob carries the peer address to dial back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    pub req_type: i32,
    pub object: u32,
    pub partner: i32,
}

impl ConnectRequest {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_i32(w, self.req_type)?;
        xdr::put_u32(w, self.object)?;
        xdr::put_i32(w, self.partner)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            req_type: xdr::get_i32(r)?,
            object: xdr::get_u32(r)?,
            partner: xdr::get_i32(r)?,
        })
    }
}

/// Builds an event parameter buffer from `(name, count)` pairs.
pub fn build_epb(events: &[(&str, u32)]) -> Vec<u8> {
    let mut epb = vec![EPB_VERSION1];
    for (name, count) in events {
        let bytes = name.as_bytes();
        #[allow(clippy::cast_possible_truncation)]
        epb.push(bytes.len().min(255) as u8);
        epb.extend_from_slice(&bytes[..bytes.len().min(255)]);
        epb.extend_from_slice(&count.to_le_bytes());
    }
    epb
}

/// Decodes an event parameter buffer into `(name, count)` pairs.
pub fn parse_epb(data: &[u8]) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    let Some((&version, mut rest)) = data.split_first() else {
        return out;
    };
    if version != EPB_VERSION1 {
        return out;
    }
    while let Some((&len, tail)) = rest.split_first() {
        let len = len as usize;
        if tail.len() < len + 4 {
            break;
        }
        let name = String::from_utf8_lossy(&tail[..len]).into_owned();
        let count = u32::from_le_bytes([tail[len], tail[len + 1], tail[len + 2], tail[len + 3]]);
        out.push((name, count));
        rest = &tail[len + 4..];
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn epb_round_trip() {
        let epb = build_epb(&[("E1", 0), ("ORDER_SHIPPED", 7)]);
        let back = parse_epb(&epb);
        assert_eq!(
            back,
            vec![("E1".to_owned(), 0), ("ORDER_SHIPPED".to_owned(), 7)]
        );
    }
}
