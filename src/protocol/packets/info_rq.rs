//! Info-subprotocol request packets and the service action packet.

use crate::wire::xdr::{self, XdrCtx};
use crate::FbResult;

/// `op_info_database` / `op_info_transaction` / `op_info_request` /
/// `op_info_blob` / `op_info_sql`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoRq {
    pub object: u32,
    pub incarnation: i32,
    pub items: Vec<u8>,
    pub buffer_length: u32,
}

impl InfoRq {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.object)?;
        xdr::put_i32(w, self.incarnation)?;
        xdr::put_cstring(w, ctx, &self.items)?;
        xdr::put_u32(w, self.buffer_length)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            object: xdr::get_u32(r)?,
            incarnation: xdr::get_i32(r)?,
            items: xdr::get_cstring(r, ctx)?,
            buffer_length: xdr::get_u32(r)?,
        })
    }
}

/// `op_service_info`: like [`InfoRq`] but with a separate send-items
/// block, as the service query interface demands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInfoRq {
    pub object: u32,
    pub incarnation: i32,
    pub send_items: Vec<u8>,
    pub recv_items: Vec<u8>,
    pub buffer_length: u32,
}

impl ServiceInfoRq {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.object)?;
        xdr::put_i32(w, self.incarnation)?;
        xdr::put_cstring(w, ctx, &self.send_items)?;
        xdr::put_cstring(w, ctx, &self.recv_items)?;
        xdr::put_u32(w, self.buffer_length)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            object: xdr::get_u32(r)?,
            incarnation: xdr::get_i32(r)?,
            send_items: xdr::get_cstring(r, ctx)?,
            recv_items: xdr::get_cstring(r, ctx)?,
            buffer_length: xdr::get_u32(r)?,
        })
    }
}

/// `op_service_start`: invoke a service-manager action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceStart {
    pub object: u32,
    pub spb: Vec<u8>,
}

impl ServiceStart {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.object)?;
        xdr::put_cstring(w, ctx, &self.spb)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            object: xdr::get_u32(r)?,
            spb: xdr::get_cstring(r, ctx)?,
        })
    }
}
