//! Message formats: the ordered field descriptors used to marshal parameter
//! messages and to reconstruct fetched rows.
//!
//! A format describes one message. Locally a message is a flat byte buffer
//! laid out by [`Format::offsets`]; on the wire each field travels in its
//! XDR form behind a null bitmap, so the local layout never leaks.

use crate::wire::xdr::{self, XdrCtx};
use crate::{FbError, FbResult};

/// Field data types, identified by their SQL type codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    Text = 452,
    Varying = 448,
    Short = 500,
    Long = 496,
    Float = 482,
    Double = 480,
    Timestamp = 510,
    Blob = 520,
    Int64 = 580,
}

impl FieldType {
    pub fn from_code(code: u16) -> FbResult<Self> {
        Ok(match code & !1 {
            452 => Self::Text,
            448 => Self::Varying,
            500 => Self::Short,
            496 => Self::Long,
            482 => Self::Float,
            480 => Self::Double,
            510 => Self::Timestamp,
            520 => Self::Blob,
            580 => Self::Int64,
            other => {
                return Err(FbError::Protocol(format!("unknown SQL type code {other}")));
            }
        })
    }

    /// Size of the field inside the local message buffer; `declared` is the
    /// declared length for text types.
    fn local_size(self, declared: u16) -> usize {
        match self {
            Self::Text => declared as usize,
            Self::Varying => declared as usize + 2,
            Self::Short => 2,
            Self::Long | Self::Float => 4,
            Self::Double | Self::Int64 | Self::Blob | Self::Timestamp => 8,
        }
    }

    fn alignment(self, declared: u16) -> usize {
        match self {
            Self::Text => 1,
            Self::Short | Self::Varying => 2,
            Self::Long | Self::Float => 4,
            Self::Double | Self::Int64 | Self::Blob | Self::Timestamp => 8,
        }
        .min(declared.max(1) as usize)
        .max(1)
    }
}

/// One field of a message format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FieldDesc {
    pub dtype: FieldType,
    pub length: u16,
    pub scale: i8,
    pub subtype: u16,
    /// Byte offset of the value inside the local message buffer.
    pub offset: u32,
    /// Byte offset of the 16-bit null indicator word.
    pub null_offset: u32,
}

/// An ordered array of field descriptors plus the resulting buffer length.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Format {
    fields: Vec<FieldDesc>,
    length: usize,
}

impl Format {
    pub fn new(descs: Vec<(FieldType, u16, i8, u16)>) -> Self {
        let mut fields = Vec::with_capacity(descs.len());
        let mut offset = 0_usize;
        for (dtype, length, scale, subtype) in &descs {
            let align = dtype.alignment(*length);
            offset = (offset + align - 1) / align * align;
            #[allow(clippy::cast_possible_truncation)]
            fields.push(FieldDesc {
                dtype: *dtype,
                length: *length,
                scale: *scale,
                subtype: *subtype,
                offset: offset as u32,
                null_offset: 0,
            });
            offset += dtype.local_size(*length);
        }
        // null indicator words trail the values
        offset = (offset + 1) / 2 * 2;
        for field in &mut fields {
            #[allow(clippy::cast_possible_truncation)]
            {
                field.null_offset = offset as u32;
            }
            offset += 2;
        }
        offset = (offset + 3) / 4 * 4;
        Self {
            fields,
            length: offset,
        }
    }

    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Length in bytes of one local message buffer.
    pub fn buffer_length(&self) -> usize {
        self.length
    }

    pub fn alloc_buffer(&self) -> Vec<u8> {
        vec![0_u8; self.length]
    }

    pub fn is_null(&self, msg: &[u8], index: usize) -> bool {
        let off = self.fields[index].null_offset as usize;
        i16::from_le_bytes([msg[off], msg[off + 1]]) != 0
    }

    pub fn set_null(&self, msg: &mut [u8], index: usize) {
        let off = self.fields[index].null_offset as usize;
        msg[off..off + 2].copy_from_slice(&(-1_i16).to_le_bytes());
    }

    /// The value bytes of a field inside a local message buffer.
    pub fn field_bytes<'a>(&self, msg: &'a [u8], index: usize) -> &'a [u8] {
        let f = &self.fields[index];
        let start = f.offset as usize;
        match f.dtype {
            FieldType::Varying => {
                let len = u16::from_le_bytes([msg[start], msg[start + 1]]) as usize;
                &msg[start + 2..start + 2 + len.min(f.length as usize)]
            }
            other => &msg[start..start + other.local_size(f.length)],
        }
    }

    pub fn set_field_bytes(&self, msg: &mut [u8], index: usize, value: &[u8]) {
        let f = &self.fields[index];
        let start = f.offset as usize;
        match f.dtype {
            FieldType::Varying => {
                let len = value.len().min(f.length as usize);
                #[allow(clippy::cast_possible_truncation)]
                msg[start..start + 2].copy_from_slice(&(len as u16).to_le_bytes());
                msg[start + 2..start + 2 + len].copy_from_slice(&value[..len]);
            }
            other => {
                let size = other.local_size(f.length);
                let len = value.len().min(size);
                msg[start..start + len].copy_from_slice(&value[..len]);
                for b in &mut msg[start + len..start + size] {
                    *b = if other == FieldType::Text { b' ' } else { 0 };
                }
            }
        }
    }

    /// Marshals a local message buffer into its wire form: a null bitmap
    /// followed by the XDR form of every non-null field.
    pub(crate) fn emit_row(
        &self,
        w: &mut dyn std::io::Write,
        ctx: XdrCtx,
        msg: &[u8],
    ) -> FbResult<()> {
        let mut bitmap = vec![0_u8; (self.fields.len() + 7) / 8];
        for (i, _) in self.fields.iter().enumerate() {
            if self.is_null(msg, i) {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        w.write_all(&bitmap)?;
        for _ in 0..xdr::pad_of(bitmap.len()) {
            xdr::put_u8(w, 0)?;
        }
        for (i, f) in self.fields.iter().enumerate() {
            if self.is_null(msg, i) {
                continue;
            }
            let bytes = self.field_bytes(msg, i);
            match f.dtype {
                FieldType::Varying => xdr::put_cstring(w, ctx, bytes)?,
                _ => {
                    w.write_all(bytes)?;
                    for _ in 0..xdr::pad_of(bytes.len()) {
                        xdr::put_u8(w, 0)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Unmarshals one wire row into a fresh local message buffer.
    pub(crate) fn parse_row(&self, r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Vec<u8>> {
        let bitmap_len = (self.fields.len() + 7) / 8;
        let bitmap = xdr::parse_bytes(bitmap_len, r)?;
        xdr::skip_bytes(xdr::pad_of(bitmap_len), r)?;
        let mut msg = self.alloc_buffer();
        for (i, f) in self.fields.iter().enumerate() {
            if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                self.set_null(&mut msg, i);
                continue;
            }
            match f.dtype {
                FieldType::Varying => {
                    let bytes = xdr::get_cstring(r, ctx)?;
                    self.set_field_bytes(&mut msg, i, &bytes);
                }
                other => {
                    let size = other.local_size(f.length);
                    let bytes = xdr::parse_bytes(size, r)?;
                    xdr::skip_bytes(xdr::pad_of(size), r)?;
                    self.set_field_bytes(&mut msg, i, &bytes);
                }
            }
        }
        Ok(msg)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_format() -> Format {
        Format::new(vec![
            (FieldType::Long, 4, 0, 0),
            (FieldType::Varying, 20, 0, 0),
            (FieldType::Int64, 8, -2, 0),
            (FieldType::Text, 3, 0, 0),
        ])
    }

    #[test]
    fn offsets_are_aligned_and_disjoint() {
        let fmt = sample_format();
        let mut last_end = 0_u32;
        for f in fmt.fields() {
            assert!(f.offset >= last_end);
            assert_eq!(f.offset as usize % f.dtype.alignment(f.length), 0);
            #[allow(clippy::cast_possible_truncation)]
            {
                last_end = f.offset + f.dtype.local_size(f.length) as u32;
            }
        }
        assert!(fmt.buffer_length() >= last_end as usize + 2 * fmt.field_count());
    }

    #[test]
    fn row_round_trip() {
        let fmt = sample_format();
        let ctx = XdrCtx::with_protocol(15);
        let mut msg = fmt.alloc_buffer();
        fmt.set_field_bytes(&mut msg, 0, &42_i32.to_le_bytes());
        fmt.set_field_bytes(&mut msg, 1, b"hello");
        fmt.set_null(&mut msg, 2);
        fmt.set_field_bytes(&mut msg, 3, b"ab");

        let mut wire = Vec::new();
        fmt.emit_row(&mut wire, ctx, &msg).unwrap();
        assert_eq!(wire.len() % 4, 0);

        let mut rdr = std::io::Cursor::new(wire);
        let back = fmt.parse_row(&mut rdr, ctx).unwrap();
        assert_eq!(fmt.field_bytes(&back, 0), 42_i32.to_le_bytes());
        assert_eq!(fmt.field_bytes(&back, 1), b"hello");
        assert!(fmt.is_null(&back, 2));
        assert_eq!(fmt.field_bytes(&back, 3), b"ab ");
    }
}
