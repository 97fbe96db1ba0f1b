//! Tagged parameter blocks ("clumplets"): the `{tag, length, bytes}` items
//! that make up DPBs, TPBs, SPBs, BPBs, the connect user-identification
//! block and event parameter buffers.

use crate::{FbError, FbResult};

// ---- database parameter block -------------------------------------------

pub const DPB_VERSION1: u8 = 1;

pub const DPB_DUMMY_PACKET_INTERVAL: u8 = 58;
pub const DPB_LC_CTYPE: u8 = 48;
pub const DPB_SQL_ROLE_NAME: u8 = 60;
pub const DPB_USER_NAME: u8 = 28;
pub const DPB_PASSWORD: u8 = 29;
pub const DPB_PASSWORD_ENC: u8 = 30;
pub const DPB_PROCESS_ID: u8 = 71;
pub const DPB_PROCESS_NAME: u8 = 72;
pub const DPB_TRUSTED_AUTH: u8 = 73;
pub const DPB_ORG_FILENAME: u8 = 74;
pub const DPB_WORKING_DIRECTORY: u8 = 76;
pub const DPB_UTF8_FILENAME: u8 = 77;
pub const DPB_CLIENT_VERSION: u8 = 80;
pub const DPB_REMOTE_PROTOCOL: u8 = 81;
pub const DPB_HOST_NAME: u8 = 82;
pub const DPB_OS_USER: u8 = 83;
pub const DPB_SPECIFIC_AUTH_DATA: u8 = 84;
pub const DPB_AUTH_PLUGIN_LIST: u8 = 85;
pub const DPB_AUTH_PLUGIN_NAME: u8 = 86;
pub const DPB_EXPECTED_DB: u8 = 92;

// ---- transaction parameter block ----------------------------------------

pub const TPB_VERSION3: u8 = 3;

pub const TPB_CONSISTENCY: u8 = 1;
pub const TPB_CONCURRENCY: u8 = 2;
pub const TPB_WAIT: u8 = 6;
pub const TPB_NOWAIT: u8 = 7;
pub const TPB_READ: u8 = 8;
pub const TPB_WRITE: u8 = 9;
pub const TPB_READ_COMMITTED: u8 = 15;
pub const TPB_REC_VERSION: u8 = 17;
pub const TPB_NO_REC_VERSION: u8 = 18;
pub const TPB_LOCK_TIMEOUT: u8 = 21;

// ---- service parameter block --------------------------------------------

pub const SPB_CURRENT_VERSION: u8 = 2;

pub const SPB_USER_NAME: u8 = 28;
pub const SPB_PASSWORD: u8 = 29;
pub const SPB_COMMAND_LINE: u8 = 105;
pub const SPB_DBNAME: u8 = 106;
pub const SPB_VERBOSE: u8 = 107;
pub const SPB_OPTIONS: u8 = 108;
pub const SPB_EXPECTED_DB: u8 = 124;
pub const SPB_UTF8_FILENAME: u8 = 125;

// ---- blob parameter block ------------------------------------------------

pub const BPB_VERSION1: u8 = 1;

pub const BPB_SOURCE_TYPE: u8 = 1;
pub const BPB_TARGET_TYPE: u8 = 2;
pub const BPB_TYPE: u8 = 3;
pub const BPB_SOURCE_INTERP: u8 = 4;
pub const BPB_TARGET_INTERP: u8 = 5;

pub const BPB_TYPE_SEGMENTED: u8 = 0;
pub const BPB_TYPE_STREAM: u8 = 1;

// ---- connect user identification block -----------------------------------

pub const CNCT_USER: u8 = 1;
pub const CNCT_PASSWD: u8 = 2;
pub const CNCT_HOST: u8 = 4;
pub const CNCT_GROUP: u8 = 5;
pub const CNCT_UID: u8 = 6;
pub const CNCT_LOGIN: u8 = 7;
pub const CNCT_PLUGIN_NAME: u8 = 8;
pub const CNCT_PLUGIN_LIST: u8 = 9;
pub const CNCT_SPECIFIC_DATA: u8 = 10;
pub const CNCT_CLIENT_CRYPT: u8 = 11;

/// Specific-data clumplets are chunked: a sequence byte precedes each slice.
const CHUNK_PAYLOAD: usize = 254;

/// Builder for tagged parameter blocks.
///
/// Every item is `{tag, u8 length, bytes}`; numeric payloads are
/// little-endian and trimmed, as the parameter-block convention demands
/// (parameter blocks predate the XDR layer and are carried through it as
/// opaque byte strings).
#[derive(Debug, Clone)]
pub struct ClumpletWriter {
    buf: Vec<u8>,
}

impl ClumpletWriter {
    /// Starts a block with the given version byte.
    pub fn new(version: u8) -> Self {
        Self { buf: vec![version] }
    }

    /// Starts a block without a version byte (connect user-id block).
    pub fn untagged() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn insert_bytes(&mut self, tag: u8, bytes: &[u8]) -> &mut Self {
        debug_assert!(bytes.len() <= u8::MAX as usize);
        self.buf.push(tag);
        #[allow(clippy::cast_possible_truncation)]
        self.buf.push(bytes.len() as u8);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn insert_str(&mut self, tag: u8, s: &str) -> &mut Self {
        self.insert_bytes(tag, s.as_bytes())
    }

    /// Little-endian, shortest-form integer payload.
    pub fn insert_int(&mut self, tag: u8, value: i32) -> &mut Self {
        let le = value.to_le_bytes();
        let len = match value {
            0..=0xFF => 1,
            0x100..=0xFFFF => 2,
            _ => 4,
        };
        self.insert_bytes(tag, &le[..len])
    }

    /// A bare tag without payload (TPB style).
    pub fn insert_tag(&mut self, tag: u8) -> &mut Self {
        self.buf.push(tag);
        self
    }

    /// Splits oversized payloads into numbered chunks of at most 255 bytes.
    pub fn insert_chunked(&mut self, tag: u8, bytes: &[u8]) -> &mut Self {
        for (seq, chunk) in bytes.chunks(CHUNK_PAYLOAD).enumerate() {
            let mut payload = Vec::with_capacity(chunk.len() + 1);
            #[allow(clippy::cast_possible_truncation)]
            payload.push(seq as u8);
            payload.extend_from_slice(chunk);
            self.insert_bytes(tag, &payload);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() <= 1
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// One decoded clumplet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clumplet<'a> {
    pub tag: u8,
    pub data: &'a [u8],
}

impl Clumplet<'_> {
    /// Little-endian trimmed integer payload.
    pub fn as_int(&self) -> i32 {
        let mut le = [0_u8; 4];
        let n = self.data.len().min(4);
        le[..n].copy_from_slice(&self.data[..n]);
        i32::from_le_bytes(le)
    }

    pub fn as_str(&self) -> String {
        String::from_utf8_lossy(self.data).into_owned()
    }
}

/// Iterates `{tag, u8 length, bytes}` items, optionally after a version
/// byte.
#[derive(Debug)]
pub struct ClumpletReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ClumpletReader<'a> {
    /// Reads a versioned block; fails when the version byte differs.
    pub fn versioned(buf: &'a [u8], expected_version: u8) -> FbResult<Self> {
        match buf.first() {
            Some(&v) if v == expected_version => Ok(Self { buf, pos: 1 }),
            Some(_) | None => Err(FbError::Protocol(
                "parameter block version mismatch".to_owned(),
            )),
        }
    }

    /// Reads a block without a version byte.
    pub fn untagged(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Finds the first clumplet with the given tag.
    pub fn find(buf: &'a [u8], skip_version: bool, tag: u8) -> Option<Clumplet<'a>> {
        let mut rdr = Self {
            buf,
            pos: usize::from(skip_version),
        };
        rdr.find_map(|c| match c {
            Ok(c) if c.tag == tag => Some(c),
            _ => None,
        })
    }

    /// Reassembles a chunked payload written by
    /// [`ClumpletWriter::insert_chunked`].
    pub fn collect_chunked(buf: &'a [u8], skip_version: bool, tag: u8) -> Vec<u8> {
        let rdr = Self {
            buf,
            pos: usize::from(skip_version),
        };
        let mut out = Vec::new();
        for c in rdr.flatten() {
            if c.tag == tag && !c.data.is_empty() {
                out.extend_from_slice(&c.data[1..]);
            }
        }
        out
    }
}

impl<'a> Iterator for ClumpletReader<'a> {
    type Item = FbResult<Clumplet<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let tag = self.buf[self.pos];
        let Some(&len) = self.buf.get(self.pos + 1) else {
            self.pos = self.buf.len();
            return Some(Err(FbError::Protocol(
                "truncated parameter block".to_owned(),
            )));
        };
        let start = self.pos + 2;
        let end = start + len as usize;
        if end > self.buf.len() {
            self.pos = self.buf.len();
            return Some(Err(FbError::Protocol(
                "clumplet length beyond buffer".to_owned(),
            )));
        }
        self.pos = end;
        Some(Ok(Clumplet {
            tag,
            data: &self.buf[start..end],
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_and_find() {
        let mut dpb = ClumpletWriter::new(DPB_VERSION1);
        dpb.insert_str(DPB_USER_NAME, "SYSDBA")
            .insert_str(DPB_LC_CTYPE, "UTF8")
            .insert_int(DPB_PROCESS_ID, 0x1234);

        let bytes = dpb.into_bytes();
        let user = ClumpletReader::find(&bytes, true, DPB_USER_NAME).unwrap();
        assert_eq!(user.as_str(), "SYSDBA");
        let pid = ClumpletReader::find(&bytes, true, DPB_PROCESS_ID).unwrap();
        assert_eq!(pid.as_int(), 0x1234);
        assert!(ClumpletReader::find(&bytes, true, DPB_PASSWORD).is_none());
    }

    #[test]
    fn int_payloads_are_trimmed_little_endian() {
        let mut w = ClumpletWriter::new(DPB_VERSION1);
        w.insert_int(DPB_PROCESS_ID, 5);
        w.insert_int(DPB_DUMMY_PACKET_INTERVAL, 0x0203);
        let bytes = w.into_bytes();
        let mut rdr = ClumpletReader::versioned(&bytes, DPB_VERSION1).unwrap();
        let first = rdr.next().unwrap().unwrap();
        assert_eq!(first.data, &[5]);
        let second = rdr.next().unwrap().unwrap();
        assert_eq!(second.data, &[3, 2]);
        assert_eq!(second.as_int(), 0x0203);
    }

    #[test]
    fn chunked_round_trip() {
        let payload: Vec<u8> = (0..600_u32).map(|i| (i % 256) as u8).collect();
        let mut w = ClumpletWriter::untagged();
        w.insert_chunked(CNCT_SPECIFIC_DATA, &payload);
        let bytes = w.into_bytes();
        let collected = ClumpletReader::collect_chunked(&bytes, false, CNCT_SPECIFIC_DATA);
        assert_eq!(collected, payload);
    }

    #[test]
    fn malformed_block_reports_error() {
        let bytes = [DPB_VERSION1, DPB_USER_NAME, 10, b'x'];
        let mut rdr = ClumpletReader::versioned(&bytes, DPB_VERSION1).unwrap();
        assert!(rdr.next().unwrap().is_err());
        assert!(rdr.next().is_none());
    }
}
