//! Connection establishment: version negotiation, authentication rounds and
//! wire-encryption bootstrap.

use crate::protocol::ops::OpCode;
use crate::protocol::versions::ProtocolOffer;
use crate::wire::xdr::{self, XdrCtx};
use crate::{FbError, FbResult};

/// `op_connect`: the client's opening offer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connect {
    /// The operation the client intends after acceptance
    /// (attach, create, or service attach).
    pub operation: OpCode,
    pub connect_version: i32,
    pub architecture: i32,
    pub path: String,
    /// Connect user identification block (CNCT clumplets).
    pub user_id: Vec<u8>,
    pub offers: Vec<ProtocolOffer>,
}

impl Connect {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_i32(w, self.operation as i32)?;
        xdr::put_i32(w, self.connect_version)?;
        xdr::put_i32(w, self.architecture)?;
        xdr::put_cstring(w, ctx, self.path.as_bytes())?;
        #[allow(clippy::cast_possible_truncation)]
        xdr::put_i32(w, self.offers.len() as i32)?;
        xdr::put_cstring(w, ctx, &self.user_id)?;
        for offer in &self.offers {
            xdr::put_u32(w, u32::from(offer.version))?;
            xdr::put_i32(w, offer.architecture)?;
            xdr::put_i32(w, offer.min_type)?;
            xdr::put_i32(w, offer.max_type)?;
            xdr::put_i32(w, offer.weight)?;
        }
        Ok(())
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        let operation = OpCode::from_i32(xdr::get_i32(r)?)?;
        let connect_version = xdr::get_i32(r)?;
        let architecture = xdr::get_i32(r)?;
        let path = String::from_utf8_lossy(&xdr::get_cstring(r, ctx)?).into_owned();
        let count = xdr::get_i32(r)?;
        if !(0..=32).contains(&count) {
            return Err(FbError::Protocol(format!(
                "implausible protocol offer count {count}"
            )));
        }
        let user_id = xdr::get_cstring(r, ctx)?;
        let mut offers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            #[allow(clippy::cast_possible_truncation)]
            let version = xdr::get_u32(r)? as u16;
            offers.push(ProtocolOffer {
                version,
                architecture: xdr::get_i32(r)?,
                min_type: xdr::get_i32(r)?,
                max_type: xdr::get_i32(r)?,
                weight: xdr::get_i32(r)?,
            });
        }
        Ok(Self {
            operation,
            connect_version,
            architecture,
            path,
            user_id,
            offers,
        })
    }
}

/// `op_accept`: legacy acceptance without authentication payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Accept {
    pub version: u16,
    pub architecture: i32,
    /// Accepted transport style plus feature flag bits.
    pub accept_type: i32,
}

impl Accept {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, u32::from(self.version))?;
        xdr::put_i32(w, self.architecture)?;
        xdr::put_i32(w, self.accept_type)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        #[allow(clippy::cast_possible_truncation)]
        let version = xdr::get_u32(r)? as u16;
        Ok(Self {
            version,
            architecture: xdr::get_i32(r)?,
            accept_type: xdr::get_i32(r)?,
        })
    }
}

/// `op_accept_data` / `op_cond_accept`: acceptance bundled with an
/// authentication payload and negotiated key identifiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptData {
    pub accept: Accept,
    pub data: Vec<u8>,
    pub plugin: String,
    /// Non-zero when the server considers authentication complete.
    pub authenticated: i32,
    pub keys: Vec<u8>,
}

impl AcceptData {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        self.accept.emit(w, ctx)?;
        xdr::put_cstring(w, ctx, &self.data)?;
        xdr::put_cstring(w, ctx, self.plugin.as_bytes())?;
        xdr::put_i32(w, self.authenticated)?;
        xdr::put_cstring(w, ctx, &self.keys)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            accept: Accept::parse(r, ctx)?,
            data: xdr::get_cstring(r, ctx)?,
            plugin: String::from_utf8_lossy(&xdr::get_cstring(r, ctx)?).into_owned(),
            authenticated: xdr::get_i32(r)?,
            keys: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_cont_auth`: one additional authentication round (protocol 13+).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContAuth {
    pub data: Vec<u8>,
    /// Plugin the sender wants the conversation to continue with.
    pub name: String,
    pub list: String,
    pub keys: Vec<u8>,
}

impl ContAuth {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_cstring(w, ctx, &self.data)?;
        xdr::put_cstring(w, ctx, self.name.as_bytes())?;
        xdr::put_cstring(w, ctx, self.list.as_bytes())?;
        xdr::put_cstring(w, ctx, &self.keys)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            data: xdr::get_cstring(r, ctx)?,
            name: String::from_utf8_lossy(&xdr::get_cstring(r, ctx)?).into_owned(),
            list: String::from_utf8_lossy(&xdr::get_cstring(r, ctx)?).into_owned(),
            keys: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_trusted_auth`: the single-step legacy round (protocol < 13).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedAuth {
    pub data: Vec<u8>,
}

impl TrustedAuth {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_cstring(w, ctx, &self.data)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            data: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_crypt`: client request to switch the connection to the named wire
/// cipher with the named session key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Crypt {
    pub plugin: String,
    pub key: String,
}

impl Crypt {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_cstring(w, ctx, self.plugin.as_bytes())?;
        xdr::put_cstring(w, ctx, self.key.as_bytes())
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            plugin: String::from_utf8_lossy(&xdr::get_cstring(r, ctx)?).into_owned(),
            key: String::from_utf8_lossy(&xdr::get_cstring(r, ctx)?).into_owned(),
        })
    }
}

/// `op_crypt_key_callback`: the server asks the client for key material;
/// the client answers with the same operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CryptKeyCallback {
    pub data: Vec<u8>,
    /// Size the peer should reserve for the reply; only on the wire from
    /// protocol 15 on.
    pub reply_len: i32,
}

impl CryptKeyCallback {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_cstring(w, ctx, &self.data)?;
        if ctx.protocol >= 15 {
            xdr::put_i32(w, self.reply_len)?;
        }
        Ok(())
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            data: xdr::get_cstring(r, ctx)?,
            reply_len: if ctx.protocol >= 15 {
                xdr::get_i32(r)?
            } else {
                0
            },
        })
    }
}
