//! Response packets.

use crate::protocol::status_vector::StatusVector;
use crate::wire::xdr::{self, XdrCtx};
use crate::FbResult;

/// Sentinel for "no object was created by this operation".
pub const INVALID_OBJECT: u32 = 0xFFFF;

/// `op_response` / `op_response_piggyback`: the universal reply: a handle
/// for any newly created resource, a status vector, and an opaque data
/// payload (info reply, blob segments, BLR output).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub object: u32,
    pub blob_id: u64,
    pub data: Vec<u8>,
    pub status: StatusVector,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            object: INVALID_OBJECT,
            blob_id: 0,
            data: Vec::new(),
            status: StatusVector::success(),
        }
    }

    pub fn with_object(object: u32) -> Self {
        Self {
            object,
            ..Self::ok()
        }
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::ok()
        }
    }

    pub fn error(status: StatusVector) -> Self {
        Self {
            status,
            ..Self::ok()
        }
    }

    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.object)?;
        xdr::put_u64(w, self.blob_id)?;
        xdr::put_cstring(w, ctx, &self.data)?;
        self.status.emit(w, ctx)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            object: xdr::get_u32(r)?,
            blob_id: xdr::get_u64(r)?,
            data: xdr::get_cstring(r, ctx)?,
            status: StatusVector::parse(r, ctx)?,
        })
    }
}

/// Row-stream status inside `op_fetch_response`: a row follows.
pub const FETCH_OK: i32 = 0;
/// Row-stream status inside `op_fetch_response`: no more rows.
pub const FETCH_NO_MORE: i32 = 100;

/// `op_fetch_response`: header of one element of the row stream; the row
/// data itself (when `status == FETCH_OK`) follows in the negotiated output
/// format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: i32,
    pub messages: i32,
}

impl FetchResponse {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_i32(w, self.status)?;
        xdr::put_i32(w, self.messages)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            status: xdr::get_i32(r)?,
            messages: xdr::get_i32(r)?,
        })
    }
}

/// `op_sql_response`: reply to singleton execution; `messages` rows follow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SqlResponse {
    pub messages: i32,
}

impl SqlResponse {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_i32(w, self.messages)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            messages: xdr::get_i32(r)?,
        })
    }
}

/// `op_slice`: reply to `op_get_slice`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SliceResponse {
    pub elements: u32,
    pub data: Vec<u8>,
}

impl SliceResponse {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.elements)?;
        xdr::put_cstring(w, ctx, &self.data)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            elements: xdr::get_u32(r)?,
            data: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_transact_response`: output message of `op_transact`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactResponse {
    pub messages: i32,
    pub data: Vec<u8>,
}

impl TransactResponse {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_i32(w, self.messages)?;
        xdr::put_cstring(w, ctx, &self.data)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            messages: xdr::get_i32(r)?,
            data: xdr::get_cstring(r, ctx)?,
        })
    }
}
