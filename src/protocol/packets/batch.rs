//! Bulk-insert batch packets.

use crate::protocol::status_vector::StatusVector;
use crate::wire::xdr::{self, XdrCtx};
use crate::{FbError, FbResult};

/// `op_batch_create`: open a batch over a prepared statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchCreate {
    pub statement: u32,
    /// Bind format description of one batch message.
    pub format: Vec<u8>,
    pub msg_length: u32,
    pub pb: Vec<u8>,
}

impl BatchCreate {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.statement)?;
        xdr::put_cstring(w, ctx, &self.format)?;
        xdr::put_u32(w, self.msg_length)?;
        xdr::put_cstring(w, ctx, &self.pb)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            statement: xdr::get_u32(r)?,
            format: xdr::get_cstring(r, ctx)?,
            msg_length: xdr::get_u32(r)?,
            pb: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_batch_msg`: a block of `messages` equally sized rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchMsg {
    pub statement: u32,
    pub messages: u32,
    pub data: Vec<u8>,
}

impl BatchMsg {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.statement)?;
        xdr::put_u32(w, self.messages)?;
        xdr::put_cstring(w, ctx, &self.data)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            statement: xdr::get_u32(r)?,
            messages: xdr::get_u32(r)?,
            data: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_batch_exec`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchExec {
    pub statement: u32,
    pub transaction: u32,
}

impl BatchExec {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.statement)?;
        xdr::put_u32(w, self.transaction)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            statement: xdr::get_u32(r)?,
            transaction: xdr::get_u32(r)?,
        })
    }
}

/// `op_batch_regblob`: map an existing blob id to a batch-temporary id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchRegblob {
    pub statement: u32,
    pub existing_id: u64,
    pub batch_id: u64,
}

impl BatchRegblob {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, _ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.statement)?;
        xdr::put_u64(w, self.existing_id)?;
        xdr::put_u64(w, self.batch_id)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, _ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            statement: xdr::get_u32(r)?,
            existing_id: xdr::get_u64(r)?,
            batch_id: xdr::get_u64(r)?,
        })
    }
}

/// `op_batch_blob_stream`: a slice of the batch blob stream. The stream
/// is a sequence of `{blob id, par length, par length again, par bytes}`
/// headers each followed by segment data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchBlobStream {
    pub statement: u32,
    pub data: Vec<u8>,
}

impl BatchBlobStream {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.statement)?;
        xdr::put_cstring(w, ctx, &self.data)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            statement: xdr::get_u32(r)?,
            data: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_batch_set_bpb`: default blob parameter block for the batch stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchSetBpb {
    pub statement: u32,
    pub bpb: Vec<u8>,
}

impl BatchSetBpb {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.statement)?;
        xdr::put_cstring(w, ctx, &self.bpb)
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(Self {
            statement: xdr::get_u32(r)?,
            bpb: xdr::get_cstring(r, ctx)?,
        })
    }
}

/// `op_batch_cs`: the completion state: how many messages the batch
/// processed, how many updated something, and the status vector of every
/// failed record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchCompletion {
    pub statement: u32,
    pub total: u32,
    pub updated: u32,
    pub errors: Vec<(u32, StatusVector)>,
}

impl BatchCompletion {
    /// True when every record went through.
    pub fn all_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_u32(w, self.statement)?;
        xdr::put_u32(w, self.total)?;
        xdr::put_u32(w, self.updated)?;
        #[allow(clippy::cast_possible_truncation)]
        xdr::put_u32(w, self.errors.len() as u32)?;
        for (rec, status) in &self.errors {
            xdr::put_u32(w, *rec)?;
            status.emit(w, ctx)?;
        }
        Ok(())
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        let statement = xdr::get_u32(r)?;
        let total = xdr::get_u32(r)?;
        let updated = xdr::get_u32(r)?;
        let error_count = xdr::get_u32(r)?;
        if error_count > total {
            return Err(FbError::Protocol(
                "batch completion reports more errors than records".to_owned(),
            ));
        }
        let mut errors = Vec::with_capacity(error_count as usize);
        for _ in 0..error_count {
            let rec = xdr::get_u32(r)?;
            errors.push((rec, StatusVector::parse(r, ctx)?));
        }
        Ok(Self {
            statement,
            total,
            updated,
            errors,
        })
    }
}

/// One entry of the batch blob stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobStreamHeader {
    pub blob_id: u64,
    pub parameters: Vec<u8>,
}

impl BlobStreamHeader {
    /// Fixed-layout header: blob id, parameter length twice, parameters.
    pub fn emit(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.blob_id.to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        let par_len = self.parameters.len() as u32;
        out.extend_from_slice(&par_len.to_le_bytes());
        out.extend_from_slice(&par_len.to_le_bytes());
        out.extend_from_slice(&self.parameters);
    }

    /// Parses a header off the front of a stream slice; returns the header
    /// and the number of bytes it occupied.
    pub fn parse(data: &[u8]) -> FbResult<(Self, usize)> {
        if data.len() < 16 {
            return Err(FbError::Protocol("short blob stream header".to_owned()));
        }
        let blob_id = u64::from_le_bytes(data[..8].try_into().unwrap());
        let par_len = u32::from_le_bytes(data[8..12].try_into().unwrap()) as usize;
        let par_len2 = u32::from_le_bytes(data[12..16].try_into().unwrap()) as usize;
        if par_len != par_len2 || data.len() < 16 + par_len {
            return Err(FbError::Protocol("malformed blob stream header".to_owned()));
        }
        Ok((
            Self {
                blob_id,
                parameters: data[16..16 + par_len].to_vec(),
            },
            16 + par_len,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blob_stream_header_round_trip() {
        let header = BlobStreamHeader {
            blob_id: 0x0102_0304_0506_0708,
            parameters: vec![1, 0, 3, 1],
        };
        let mut out = Vec::new();
        header.emit(&mut out);
        let (back, used) = BlobStreamHeader::parse(&out).unwrap();
        assert_eq!(back, header);
        assert_eq!(used, out.len());
    }
}
