//! Compiled-request (BLR) packets.

use crate::wire::xdr::{self, XdrCtx};
use crate::FbResult;

/// `op_compile`: hand a BLR program to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Compile {
    pub database: u32,
    pub blr: Vec<u8>,
}

impl Compile {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.database)?;
        xdr::put_cstring(w, ctx, &self.blr)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            database: xdr::get_u32(r)?,
            blr: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// Common body of `op_start`, `op_start_and_receive` and `op_receive`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestIo {
    pub request: u32,
    pub incarnation: i32,
    pub transaction: u32,
    pub message_number: i32,
    pub messages: i32,
}

impl RequestIo {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.request)?;
        xdr::put_i32(w, self.incarnation)?;
        xdr::put_u32(w, self.transaction)?;
        xdr::put_i32(w, self.message_number)?;
        xdr::put_i32(w, self.messages)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            request: xdr::get_u32(r)?,
            incarnation: xdr::get_i32(r)?,
            transaction: xdr::get_u32(r)?,
            message_number: xdr::get_i32(r)?,
            messages: xdr::get_i32(r)?,
        })
    }
}

/// `op_send`, `op_start_and_send`, `op_start_send_and_receive` and
/// `op_insert`: request I/O plus one pre-formatted message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSend {
    pub io: RequestIo,
    pub data: Vec<u8>,
}

impl RequestSend {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        self.io.emit(w, ctx)?;
        xdr::put_cstring(w, ctx, &self.data)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            io: RequestIo::parse(r, ctx)?,
            data: xdr::get_cstring(r, ctx)?,
        })
    }
}
