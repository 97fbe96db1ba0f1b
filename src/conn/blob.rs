//! BLOBs: segment-preserving reads with prefetch, locally buffered writes
//! flushed as multi-segment batch packets.

use crate::conn::transaction::Transaction;
use crate::port::object_map::ObjectEntry;
use crate::port::RemotePort;
use crate::protocol::packets::blob::{pack_segment, unpack_segments, SEEK_FROM_HEAD};
use crate::protocol::packets::{BlobOpen, GetSegment, InfoRq, ObjectRef, PutSegment, SeekBlob};
use crate::protocol::Packet;
use crate::wire::xdr::MAX_USHORT;
use crate::{FbError, FbResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Result of one segment read.
#[derive(Debug, PartialEq, Eq)]
pub enum Segment {
    /// A complete segment, boundaries preserved.
    Whole(Vec<u8>),
    /// The head of a segment larger than the caller's buffer; the tail
    /// comes with the next read.
    Fragment(Vec<u8>),
    /// No more segments.
    Eof,
}

#[derive(Debug, Default)]
struct ReadState {
    segments: VecDeque<Vec<u8>>,
    /// Tail of a segment the caller is consuming piecewise.
    fragment: Option<Vec<u8>>,
    server_eof: bool,
}

pub(crate) struct BlobCore {
    pub port: RemotePort,
    pub id: u32,
    pub blob_id: u64,
    writable: bool,
    read: Mutex<ReadState>,
    write_buf: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for BlobCore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "BlobCore(id={}, blob_id={})", self.id, self.blob_id)
    }
}

/// An open blob, reading or writing.
#[derive(Debug)]
pub struct Blob {
    core: Arc<BlobCore>,
}

impl Blob {
    pub(crate) fn create(transaction: &Transaction, bpb: &[u8]) -> FbResult<Self> {
        Self::open_internal(transaction, 0, bpb, true)
    }

    pub(crate) fn open(transaction: &Transaction, blob_id: u64, bpb: &[u8]) -> FbResult<Self> {
        Self::open_internal(transaction, blob_id, bpb, false)
    }

    fn open_internal(
        transaction: &Transaction,
        blob_id: u64,
        bpb: &[u8],
        create: bool,
    ) -> FbResult<Self> {
        let port = transaction.core.port.clone();
        let body = BlobOpen {
            transaction: transaction.id(),
            id: blob_id,
            bpb: bpb.to_vec(),
        };
        let packet = if create {
            Packet::CreateBlob2(body)
        } else {
            Packet::OpenBlob2(body)
        };
        let response = port.exchange_response(&packet)?;
        let core = Arc::new(BlobCore {
            port: port.clone(),
            id: response.object,
            blob_id: if create { response.blob_id } else { blob_id },
            writable: create,
            read: Mutex::new(ReadState::default()),
            write_buf: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        port.objects()?
            .register(core.id, ObjectEntry::Blob(Arc::downgrade(&core)));
        Ok(Self { core })
    }

    /// The 64-bit id to store in a record (valid once the blob is closed).
    pub fn blob_id(&self) -> u64 {
        self.core.blob_id
    }

    /// Appends one segment. Segments are buffered locally and flushed as a
    /// multi-segment packet once the buffer threshold is crossed; segments
    /// longer than the wire maximum are split.
    pub fn put_segment(&self, data: &[u8]) -> FbResult<()> {
        if !self.core.writable {
            return Err(FbError::Usage("blob is open for reading"));
        }
        let mut buf = self.core.write_buf.lock()?;
        for chunk in data.chunks(MAX_USHORT).chain(if data.is_empty() {
            Some(&[][..])
        } else {
            None
        }) {
            pack_segment(&mut buf, chunk);
        }
        if buf.len() >= crate::BLOB_FLUSH_THRESHOLD {
            let packed = std::mem::take(&mut *buf);
            drop(buf);
            self.flush_segments(packed)?;
        }
        Ok(())
    }

    fn flush_segments(&self, packed: Vec<u8>) -> FbResult<()> {
        if packed.is_empty() {
            return Ok(());
        }
        self.core
            .port
            .exchange_response(&Packet::BatchSegments(PutSegment {
                blob: self.core.id,
                segments: packed,
            }))
            .map(drop)
    }

    /// Reads the next segment, asking for at most `max_len` bytes of it.
    /// Oversized segments come back piecewise as [`Segment::Fragment`]s.
    pub fn get_segment(&self, max_len: usize) -> FbResult<Segment> {
        if self.core.writable {
            return Err(FbError::Usage("blob is open for writing"));
        }
        let mut read = self.core.read.lock()?;

        loop {
            if let Some(fragment) = read.fragment.take() {
                return Ok(deliver(fragment, max_len, &mut read));
            }
            if let Some(segment) = read.segments.pop_front() {
                return Ok(deliver(segment, max_len, &mut read));
            }
            if read.server_eof {
                return Ok(Segment::Eof);
            }
            // prefetch a buffer's worth of segments
            #[allow(clippy::cast_possible_truncation)]
            let hint = (max_len.max(crate::BLOB_FLUSH_THRESHOLD)).min(MAX_USHORT) as u32;
            let response = self
                .core
                .port
                .exchange_response(&Packet::GetSegment(GetSegment {
                    blob: self.core.id,
                    length: hint,
                }))?;
            // object 2 flags end of blob, 1 a trailing fragment
            if response.object == 2 {
                read.server_eof = true;
            }
            for segment in unpack_segments(&response.data) {
                read.segments.push_back(segment);
            }
            if read.segments.is_empty() && !read.server_eof {
                return Err(FbError::Protocol("empty segment batch".to_owned()));
            }
        }
    }

    /// Repositions a stream blob; returns the new offset.
    pub fn seek(&self, mode: i32, offset: i32) -> FbResult<u32> {
        let response = self.core.port.exchange_response(&Packet::SeekBlob(SeekBlob {
            blob: self.core.id,
            mode,
            offset,
        }))?;
        let mut read = self.core.read.lock()?;
        read.segments.clear();
        read.fragment = None;
        read.server_eof = false;
        Ok(response.object)
    }

    /// Repositions to an absolute offset from the blob head.
    pub fn seek_absolute(&self, offset: i32) -> FbResult<u32> {
        self.seek(SEEK_FROM_HEAD, offset)
    }

    pub fn info(&self, items: &[u8], buffer_length: u32) -> FbResult<Vec<u8>> {
        self.core
            .port
            .exchange_response(&Packet::InfoBlob(InfoRq {
                object: self.core.id,
                incarnation: 0,
                items: items.to_vec(),
                buffer_length,
            }))
            .map(|r| r.data)
    }

    /// Flushes buffered segments and closes the blob.
    pub fn close(self) -> FbResult<()> {
        self.release(false)
    }

    /// Discards the blob without materializing it.
    pub fn cancel(self) -> FbResult<()> {
        self.release(true)
    }

    fn release(&self, cancel: bool) -> FbResult<()> {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.core.port.is_usable() {
            if let Ok(mut objects) = self.core.port.objects() {
                objects.remove(self.core.id);
            }
            return Ok(());
        }
        let mut result = Ok(());
        if !cancel {
            let packed = std::mem::take(&mut *self.core.write_buf.lock()?);
            result = self.flush_segments(packed);
        }
        let body = ObjectRef::new(self.core.id);
        let packet = if cancel {
            Packet::CancelBlob(body)
        } else {
            Packet::CloseBlob(body)
        };
        let close_result = self.core.port.exchange_response(&packet).map(drop);
        if let Ok(mut objects) = self.core.port.objects() {
            objects.remove(self.core.id);
        }
        result.and(close_result)
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        if !self.core.closed.load(Ordering::SeqCst) {
            let _ = self.release(!self.core.writable);
        }
    }
}

fn deliver(segment: Vec<u8>, max_len: usize, read: &mut ReadState) -> Segment {
    if segment.len() <= max_len {
        Segment::Whole(segment)
    } else {
        let (head, tail) = segment.split_at(max_len);
        read.fragment = Some(tail.to_vec());
        Segment::Fragment(head.to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deliver_splits_oversized_segments() {
        let mut state = ReadState::default();
        let segment = vec![7_u8; 10];
        match deliver(segment, 4, &mut state) {
            Segment::Fragment(head) => assert_eq!(head.len(), 4),
            other => panic!("expected fragment, got {other:?}"),
        }
        assert_eq!(state.fragment.as_ref().unwrap().len(), 6);
    }
}
