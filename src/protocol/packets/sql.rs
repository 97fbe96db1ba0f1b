//! DSQL statement packets.

use crate::wire::xdr::{self, XdrCtx};
use crate::FbResult;

// options of op_free_statement
pub const DSQL_CLOSE: u32 = 1;
pub const DSQL_DROP: u32 = 2;
pub const DSQL_UNPREPARE: u32 = 4;

/// `op_allocate_statement`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocateStatement {
    pub database: u32,
}

impl AllocateStatement {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.database)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            database: xdr::get_u32(r)?,
        })
    }
}

/// `op_prepare_statement` / `op_exec_immediate`: SQL text plus the info
/// items the reply buffer should describe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrepareSql {
    pub transaction: u32,
    pub statement: u32,
    pub dialect: u32,
    pub sql: String,
    pub items: Vec<u8>,
    pub buffer_length: u32,
}

impl PrepareSql {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.transaction)?;
        xdr::put_u32(w, self.statement)?;
        xdr::put_u32(w, self.dialect)?;
        xdr::put_cstring(w, ctx, self.sql.as_bytes())?;
        xdr::put_cstring(w, ctx, &self.items)?;
        xdr::put_u32(w, self.buffer_length)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            transaction: xdr::get_u32(r)?,
            statement: xdr::get_u32(r)?,
            dialect: xdr::get_u32(r)?,
            sql: String::from_utf8_lossy(&xdr::get_cstring(r, ctx)?).into_owned(),
            items: xdr::get_cstring(r, ctx)?,
            buffer_length: xdr::get_u32(r)?,
        })
    }
}

/// `op_exec_immediate2`: immediate execution with bound parameters and a
/// singleton output row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecImmediate2 {
    pub base: PrepareSql,
    pub in_format: Vec<u8>,
    /// Number of parameter messages that follow the packet body.
    pub in_messages: i32,
    pub out_format: Vec<u8>,
}

impl ExecImmediate2 {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_cstring(w, ctx, &self.in_format)?;
        xdr::put_i32(w, self.in_messages)?;
        xdr::put_cstring(w, ctx, &self.out_format)?;
        self.base.emit(w, ctx)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            in_format: xdr::get_cstring(r, ctx)?,
            in_messages: xdr::get_i32(r)?,
            out_format: xdr::get_cstring(r, ctx)?,
            base: PrepareSql::parse(r, ctx)?,
        })
    }
}

/// `op_execute`: execute a prepared statement; `messages` parameter rows
/// in the format described by `format` follow the body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execute {
    pub statement: u32,
    pub transaction: u32,
    /// Bind format description, empty when the statement takes no input.
    pub format: Vec<u8>,
    pub message_number: i32,
    pub messages: i32,
    /// Statement timeout in milliseconds; on the wire from protocol 16 on.
    pub timeout: u32,
}

impl Execute {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.statement)?;
        xdr::put_u32(w, self.transaction)?;
        xdr::put_cstring(w, ctx, &self.format)?;
        xdr::put_i32(w, self.message_number)?;
        xdr::put_i32(w, self.messages)?;
        if ctx.protocol >= 16 {
            xdr::put_u32(w, self.timeout)?;
        }
        Ok(())
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            statement: xdr::get_u32(r)?,
            transaction: xdr::get_u32(r)?,
            format: xdr::get_cstring(r, ctx)?,
            message_number: xdr::get_i32(r)?,
            messages: xdr::get_i32(r)?,
            timeout: if ctx.protocol >= 16 {
                xdr::get_u32(r)?
            } else {
                0
            },
        })
    }
}

/// `op_execute2`: like [`Execute`] but expecting a singleton output row
/// (`op_sql_response`) in the given output format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execute2 {
    pub exec: Execute,
    pub out_format: Vec<u8>,
    pub out_message_number: i32,
}

impl Execute2 {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        self.exec.emit(w, ctx)?;
        xdr::put_cstring(w, ctx, &self.out_format)?;
        xdr::put_i32(w, self.out_message_number)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            exec: Execute::parse(r, ctx)?,
            out_format: xdr::get_cstring(r, ctx)?,
            out_message_number: xdr::get_i32(r)?,
        })
    }
}

/// `op_fetch`: ask for up to `messages` rows of the open cursor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fetch {
    pub statement: u32,
    pub format: Vec<u8>,
    pub message_number: i32,
    pub messages: i32,
}

impl Fetch {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.statement)?;
        xdr::put_cstring(w, ctx, &self.format)?;
        xdr::put_i32(w, self.message_number)?;
        xdr::put_i32(w, self.messages)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            statement: xdr::get_u32(r)?,
            format: xdr::get_cstring(r, ctx)?,
            message_number: xdr::get_i32(r)?,
            messages: xdr::get_i32(r)?,
        })
    }
}

/// `op_free_statement`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeStatement {
    pub statement: u32,
    pub option: u32,
}

impl FreeStatement {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.statement)?;
        xdr::put_u32(w, self.option)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            statement: xdr::get_u32(r)?,
            option: xdr::get_u32(r)?,
        })
    }
}

/// `op_set_cursor`: give the open cursor a name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetCursor {
    pub statement: u32,
    pub name: String,
    pub cursor_type: u32,
}

impl SetCursor {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.statement)?;
        xdr::put_cstring(w, ctx, self.name.as_bytes())?;
        xdr::put_u32(w, self.cursor_type)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            statement: xdr::get_u32(r)?,
            name: String::from_utf8_lossy(&xdr::get_cstring(r, ctx)?).into_owned(),
            cursor_type: xdr::get_u32(r)?,
        })
    }
}
