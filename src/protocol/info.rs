//! The info sub-protocol: request buffers are a sequence of single-byte
//! items, response buffers are `{item, length, bytes}` triplets terminated
//! by an end marker or cut short by a truncation marker.
//!
//! Payload integers are little-endian, as parameter buffers predate XDR.

use crate::protocol::format::{FieldType, Format};
use crate::{FbError, FbResult};

// generic markers
pub const INFO_END: u8 = 1;
pub const INFO_TRUNCATED: u8 = 2;
pub const INFO_ERROR: u8 = 3;
pub const INFO_DATA_NOT_READY: u8 = 4;

// database items
pub const INFO_DB_ID: u8 = 4;
pub const INFO_IMPLEMENTATION: u8 = 11;
pub const INFO_VERSION: u8 = 12;
pub const INFO_PAGE_SIZE: u8 = 14;
pub const INFO_ODS_VERSION: u8 = 32;
pub const INFO_FIREBIRD_VERSION: u8 = 103;

// transaction items
pub const INFO_TRA_ID: u8 = 4;

// blob items
pub const INFO_BLOB_NUM_SEGMENTS: u8 = 4;
pub const INFO_BLOB_MAX_SEGMENT: u8 = 5;
pub const INFO_BLOB_TOTAL_LENGTH: u8 = 6;
pub const INFO_BLOB_TYPE: u8 = 7;

// statement items
pub const INFO_SQL_SELECT: u8 = 4;
pub const INFO_SQL_BIND: u8 = 5;
pub const INFO_SQL_STMT_TYPE: u8 = 21;
pub const INFO_SQL_RECORDS: u8 = 23;

// service items
pub const INFO_SVC_VERSION: u8 = 54;
pub const INFO_SVC_SERVER_VERSION: u8 = 55;
pub const INFO_SVC_IMPLEMENTATION: u8 = 56;

// statement types
pub const STMT_SELECT: i32 = 1;
pub const STMT_INSERT: i32 = 2;
pub const STMT_UPDATE: i32 = 3;
pub const STMT_DELETE: i32 = 4;
pub const STMT_DDL: i32 = 5;
pub const STMT_EXEC_PROCEDURE: i32 = 8;

/// Builds an info response into a caller-sized buffer; items that do not
/// fit leave a truncation marker behind the partial content.
#[derive(Debug)]
pub struct InfoReplyBuilder {
    buf: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl InfoReplyBuilder {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: Vec::new(),
            cap,
            truncated: false,
        }
    }

    /// Appends one `{item, length, bytes}` triplet; returns false (and
    /// records truncation) when the buffer cannot take it.
    pub fn append(&mut self, item: u8, payload: &[u8]) -> bool {
        if self.truncated {
            return false;
        }
        // one byte is always reserved for the trailing end marker
        if self.buf.len() + 3 + payload.len() + 1 > self.cap {
            self.truncated = true;
            if self.buf.len() < self.cap {
                self.buf.push(INFO_TRUNCATED);
            }
            return false;
        }
        self.buf.push(item);
        #[allow(clippy::cast_possible_truncation)]
        self.buf
            .extend_from_slice(&(payload.len() as u16).to_le_bytes());
        self.buf.extend_from_slice(payload);
        true
    }

    pub fn append_int(&mut self, item: u8, value: i32) -> bool {
        self.append(item, &value.to_le_bytes())
    }

    pub fn finish(mut self) -> Vec<u8> {
        if !self.truncated {
            self.buf.push(INFO_END);
        }
        self.buf
    }
}

/// One decoded info triplet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoItem<'a> {
    pub item: u8,
    pub data: &'a [u8],
}

impl InfoItem<'_> {
    pub fn as_int(&self) -> i32 {
        let mut le = [0_u8; 4];
        let n = self.data.len().min(4);
        le[..n].copy_from_slice(&self.data[..n]);
        i32::from_le_bytes(le)
    }
}

/// Walks an info response buffer.
#[derive(Debug)]
pub struct InfoWalker<'a> {
    buf: &'a [u8],
    pos: usize,
    truncated: bool,
}

impl<'a> InfoWalker<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            truncated: false,
        }
    }

    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    /// Finds a specific item in a response buffer.
    pub fn find(buf: &'a [u8], item: u8) -> Option<InfoItem<'a>> {
        InfoWalker::new(buf).flatten().find(|i| i.item == item)
    }
}

impl<'a> Iterator for InfoWalker<'a> {
    type Item = FbResult<InfoItem<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = *self.buf.get(self.pos)?;
        match item {
            INFO_END => return None,
            INFO_TRUNCATED => {
                self.truncated = true;
                return None;
            }
            _ => {}
        }
        if self.pos + 3 > self.buf.len() {
            self.pos = self.buf.len();
            return Some(Err(FbError::Protocol("truncated info triplet".to_owned())));
        }
        let len = u16::from_le_bytes([self.buf[self.pos + 1], self.buf[self.pos + 2]]) as usize;
        let start = self.pos + 3;
        let end = start + len;
        if end > self.buf.len() {
            self.pos = self.buf.len();
            return Some(Err(FbError::Protocol(
                "info item length beyond buffer".to_owned(),
            )));
        }
        self.pos = end;
        Some(Ok(InfoItem {
            item,
            data: &self.buf[start..end],
        }))
    }
}

/// Version payloads carry a counted list of text lines; the local merge of
/// client-side knowledge appends lines to the server's list.
pub fn version_payload(lines: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    #[allow(clippy::cast_possible_truncation)]
    out.push(lines.len() as u8);
    for line in lines {
        let bytes = line.as_bytes();
        #[allow(clippy::cast_possible_truncation)]
        out.push(bytes.len().min(255) as u8);
        out.extend_from_slice(&bytes[..bytes.len().min(255)]);
    }
    out
}

pub fn parse_version_payload(data: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let Some((&count, mut rest)) = data.split_first() else {
        return lines;
    };
    for _ in 0..count {
        let Some((&len, tail)) = rest.split_first() else {
            break;
        };
        let len = len as usize;
        if tail.len() < len {
            break;
        }
        lines.push(String::from_utf8_lossy(&tail[..len]).into_owned());
        rest = &tail[len..];
    }
    lines
}

/// Appends one locally known line to an existing version payload.
pub fn merge_version_line(payload: &[u8], line: &str) -> Vec<u8> {
    let mut lines = parse_version_payload(payload);
    lines.push(line.to_owned());
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    version_payload(&refs)
}

// ---- statement describe data ---------------------------------------------
//
// The prepare response describes the statement type and both message
// formats, nested inside the regular info envelope: the bind/select items
// carry a u16 field count followed by 8 bytes per field
// {type, length, scale+pad, subtype}, all little-endian.

pub fn emit_describe(stmt_type: i32, in_fmt: &Format, out_fmt: &Format) -> Vec<u8> {
    let mut builder = InfoReplyBuilder::new(usize::MAX);
    builder.append_int(INFO_SQL_STMT_TYPE, stmt_type);
    builder.append(INFO_SQL_BIND, &describe_block(in_fmt));
    builder.append(INFO_SQL_SELECT, &describe_block(out_fmt));
    builder.finish()
}

/// Packs one message format as an opaque blob for the packets that carry a
/// format (`op_execute`, `op_batch_create`, …).
pub fn pack_format(fmt: &Format) -> Vec<u8> {
    describe_block(fmt)
}

/// Reverse of [`pack_format`].
pub fn unpack_format(data: &[u8]) -> FbResult<Format> {
    parse_describe_block(data)
}

fn describe_block(fmt: &Format) -> Vec<u8> {
    let mut out = Vec::new();
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(fmt.field_count() as u16).to_le_bytes());
    for f in fmt.fields() {
        out.extend_from_slice(&(f.dtype as u16).to_le_bytes());
        out.extend_from_slice(&f.length.to_le_bytes());
        #[allow(clippy::cast_sign_loss)]
        out.push(f.scale as u8);
        out.push(0);
        out.extend_from_slice(&f.subtype.to_le_bytes());
    }
    out
}

fn parse_describe_block(data: &[u8]) -> FbResult<Format> {
    if data.len() < 2 {
        return Err(FbError::Protocol("short describe block".to_owned()));
    }
    let count = u16::from_le_bytes([data[0], data[1]]) as usize;
    let mut descs = Vec::with_capacity(count);
    let mut rest = &data[2..];
    for _ in 0..count {
        if rest.len() < 8 {
            return Err(FbError::Protocol("short field descriptor".to_owned()));
        }
        let dtype = FieldType::from_code(u16::from_le_bytes([rest[0], rest[1]]))?;
        let length = u16::from_le_bytes([rest[2], rest[3]]);
        #[allow(clippy::cast_possible_wrap)]
        let scale = rest[4] as i8;
        let subtype = u16::from_le_bytes([rest[6], rest[7]]);
        descs.push((dtype, length, scale, subtype));
        rest = &rest[8..];
    }
    Ok(Format::new(descs))
}

/// Decodes a prepare response into `(statement type, bind format, select
/// format)`.
pub fn parse_describe(data: &[u8]) -> FbResult<(i32, Format, Format)> {
    let mut stmt_type = 0;
    let mut in_fmt = Format::default();
    let mut out_fmt = Format::default();
    for item in InfoWalker::new(data) {
        let item = item?;
        match item.item {
            INFO_SQL_STMT_TYPE => stmt_type = item.as_int(),
            INFO_SQL_BIND => in_fmt = parse_describe_block(item.data)?,
            INFO_SQL_SELECT => out_fmt = parse_describe_block(item.data)?,
            _ => {}
        }
    }
    Ok((stmt_type, in_fmt, out_fmt))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reply_walks_back_to_items() {
        let mut b = InfoReplyBuilder::new(64);
        assert!(b.append_int(INFO_PAGE_SIZE, 8192));
        assert!(b.append(INFO_VERSION, &version_payload(&["WI-V4.0"])));
        let buf = b.finish();

        let page = InfoWalker::find(&buf, INFO_PAGE_SIZE).unwrap();
        assert_eq!(page.as_int(), 8192);
        let version = InfoWalker::find(&buf, INFO_VERSION).unwrap();
        assert_eq!(parse_version_payload(version.data), vec!["WI-V4.0"]);
    }

    #[test]
    fn overflow_leaves_truncation_marker_and_partial_content() {
        let mut b = InfoReplyBuilder::new(16);
        assert!(b.append_int(INFO_PAGE_SIZE, 4096));
        assert!(!b.append(INFO_VERSION, &[0_u8; 64]));
        let buf = b.finish();
        assert_eq!(*buf.last().unwrap(), INFO_TRUNCATED);

        let mut walker = InfoWalker::new(&buf);
        let first = walker.next().unwrap().unwrap();
        assert_eq!(first.item, INFO_PAGE_SIZE);
        assert!(walker.next().is_none());
        assert!(walker.was_truncated());
    }

    #[test]
    fn version_merge_appends_a_line() {
        let server = version_payload(&["LI-V4.0.2"]);
        let merged = merge_version_line(&server, "remote client 0.9");
        assert_eq!(
            parse_version_payload(&merged),
            vec!["LI-V4.0.2", "remote client 0.9"]
        );
    }

    #[test]
    fn describe_round_trip() {
        use crate::protocol::format::FieldType;
        let in_fmt = Format::new(vec![(FieldType::Long, 4, 0, 0)]);
        let out_fmt = Format::new(vec![
            (FieldType::Varying, 32, 0, 0),
            (FieldType::Int64, 8, 0, 0),
        ]);
        let data = emit_describe(STMT_SELECT, &in_fmt, &out_fmt);
        let (stmt_type, back_in, back_out) = parse_describe(&data).unwrap();
        assert_eq!(stmt_type, STMT_SELECT);
        assert_eq!(back_in, in_fmt);
        assert_eq!(back_out, out_fmt);
    }
}
