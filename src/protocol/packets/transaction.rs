//! Attachment, transaction, DDL and slice packets, plus the generic
//! single-object body shared by every release-style operation.

use crate::wire::xdr::{self, XdrCtx};
use crate::FbResult;

/// `op_attach` / `op_create` / `op_service_attach`: a path plus the
/// matching parameter block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachBody {
    pub object: u32,
    pub path: String,
    pub pb: Vec<u8>,
}

impl AttachBody {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.object)?;
        xdr::put_cstring(w, ctx, self.path.as_bytes())?;
        xdr::put_cstring(w, ctx, &self.pb)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            object: xdr::get_u32(r)?,
            path: String::from_utf8_lossy(&xdr::get_cstring(r, ctx)?).into_owned(),
            pb: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// Body of every operation that names exactly one object: detach, drop,
/// commit, rollback, close/cancel blob, release, unwind, batch release…
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    pub object: u32,
}

impl ObjectRef {
    pub fn new(object: u32) -> Self {
        Self { object }
    }

    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.object)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            object: xdr::get_u32(r)?,
        })
    }
}

/// `op_transaction`: start a transaction on a database object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartTransaction {
    pub database: u32,
    pub tpb: Vec<u8>,
}

impl StartTransaction {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.database)?;
        xdr::put_cstring(w, ctx, &self.tpb)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            database: xdr::get_u32(r)?,
            tpb: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_reconnect`: reattach to a limbo transaction by its id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconnect {
    pub database: u32,
    /// Transaction id, little-endian payload bytes.
    pub id: Vec<u8>,
}

impl Reconnect {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.database)?;
        xdr::put_cstring(w, ctx, &self.id)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            database: xdr::get_u32(r)?,
            id: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_prepare2`: first phase of two-phase commit, with recovery data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prepare2 {
    pub transaction: u32,
    pub data: Vec<u8>,
}

impl Prepare2 {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.transaction)?;
        xdr::put_cstring(w, ctx, &self.data)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            transaction: xdr::get_u32(r)?,
            data: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_transact`: execute a compiled request in one round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactRq {
    pub database: u32,
    pub transaction: u32,
    pub blr: Vec<u8>,
    pub in_msg: Vec<u8>,
    pub out_expected: i32,
}

impl TransactRq {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.database)?;
        xdr::put_u32(w, self.transaction)?;
        xdr::put_cstring(w, ctx, &self.blr)?;
        xdr::put_cstring(w, ctx, &self.in_msg)?;
        xdr::put_i32(w, self.out_expected)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            database: xdr::get_u32(r)?,
            transaction: xdr::get_u32(r)?,
            blr: xdr::get_cstring(r, ctx)?,
            in_msg: xdr::get_cstring(r, ctx)?,
            out_expected: xdr::get_i32(r)?,
        })
    }
}

/// `op_ddl`: dynamic DDL dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ddl {
    pub database: u32,
    pub transaction: u32,
    pub data: Vec<u8>,
}

impl Ddl {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.database)?;
        xdr::put_u32(w, self.transaction)?;
        xdr::put_cstring(w, ctx, &self.data)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            database: xdr::get_u32(r)?,
            transaction: xdr::get_u32(r)?,
            data: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_get_slice`: fetch an array slice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetSlice {
    pub transaction: u32,
    pub id: u64,
    pub sdl: Vec<u8>,
    pub param: Vec<u8>,
    pub length: u32,
}

impl GetSlice {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.transaction)?;
        xdr::put_u64(w, self.id)?;
        xdr::put_cstring(w, ctx, &self.sdl)?;
        xdr::put_cstring(w, ctx, &self.param)?;
        xdr::put_u32(w, self.length)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            transaction: xdr::get_u32(r)?,
            id: xdr::get_u64(r)?,
            sdl: xdr::get_cstring(r, ctx)?,
            param: xdr::get_cstring(r, ctx)?,
            length: xdr::get_u32(r)?,
        })
    }
}

/// `op_put_slice`: store an array slice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutSlice {
    pub transaction: u32,
    pub id: u64,
    pub sdl: Vec<u8>,
    pub param: Vec<u8>,
    pub data: Vec<u8>,
}

impl PutSlice {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.transaction)?;
        xdr::put_u64(w, self.id)?;
        xdr::put_cstring(w, ctx, &self.sdl)?;
        xdr::put_cstring(w, ctx, &self.param)?;
        xdr::put_cstring(w, ctx, &self.data)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            transaction: xdr::get_u32(r)?,
            id: xdr::get_u64(r)?,
            sdl: xdr::get_cstring(r, ctx)?,
            param: xdr::get_cstring(r, ctx)?,
            data: xdr::get_cstring(r, ctx)?,
        })
    }
}
