//! Bulk-insert batches: a locally buffered row stream and blob stream,
//! both flushed at execution, answered by a per-record completion state.

use crate::conn::statement::StatementCore;
use crate::conn::transaction::Transaction;
use crate::protocol::clumplet::{self, ClumpletReader};
use crate::protocol::info;
use crate::protocol::packets::blob::pack_segment;
use crate::protocol::packets::{
    BatchBlobStream, BatchCompletion, BatchCreate, BatchExec, BatchMsg, BatchRegblob, BatchSetBpb,
    BlobStreamHeader, ObjectRef,
};
use crate::protocol::Packet;
use crate::{FbError, FbResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Staged {
    messages: u32,
    msg_data: Vec<u8>,
    /// One stream slice per blob: header plus its segment data.
    blob_streams: Vec<Vec<u8>>,
    regblobs: Vec<(u64, u64)>,
}

/// A bulk-insert batch over one prepared statement.
pub struct Batch {
    stmt: Arc<StatementCore>,
    msg_length: usize,
    staged: Mutex<Staged>,
    segmented: AtomicBool,
    next_blob_id: AtomicU64,
    released: AtomicBool,
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Batch(statement={})", self.stmt.id)
    }
}

impl Batch {
    pub(crate) fn create(stmt: Arc<StatementCore>, pb: &[u8]) -> FbResult<Self> {
        // the batch feeds the statement's input messages
        let in_fmt = stmt.in_format();
        let msg_length = in_fmt.buffer_length();
        #[allow(clippy::cast_possible_truncation)]
        let wire_msg_length = msg_length as u32;
        stmt.port
            .exchange_response(&Packet::BatchCreate(BatchCreate {
                statement: stmt.id,
                format: info::pack_format(&in_fmt),
                msg_length: wire_msg_length,
                pb: pb.to_vec(),
            }))?;
        Ok(Self {
            stmt,
            msg_length,
            staged: Mutex::new(Staged::default()),
            segmented: AtomicBool::new(true),
            next_blob_id: AtomicU64::new(1),
            released: AtomicBool::new(false),
        })
    }

    /// Appends one message (a buffer in the statement's input format).
    pub fn add(&self, msg: &[u8]) -> FbResult<()> {
        if msg.len() != self.msg_length {
            return Err(FbError::Usage("batch message has the wrong length"));
        }
        let mut staged = self.staged.lock()?;
        staged.messages += 1;
        staged.msg_data.extend_from_slice(msg);
        Ok(())
    }

    /// Sets the default blob parameter block for subsequent blob-stream
    /// entries; a stream-typed BPB switches off per-segment framing.
    pub fn set_default_bpb(&self, bpb: &[u8]) -> FbResult<()> {
        let stream_typed = ClumpletReader::find(bpb, true, clumplet::BPB_TYPE)
            .map(|c| c.as_int() == i32::from(clumplet::BPB_TYPE_STREAM))
            .unwrap_or(false);
        self.segmented.store(!stream_typed, Ordering::SeqCst);
        self.stmt
            .port
            .exchange_response(&Packet::BatchSetBpb(BatchSetBpb {
                statement: self.stmt.id,
                bpb: bpb.to_vec(),
            }))
            .map(drop)
    }

    /// Adds an inline blob to the blob stream; returns its batch-temporary
    /// id for use inside messages.
    pub fn add_blob(&self, parameters: &[u8], segments: &[&[u8]]) -> FbResult<u64> {
        let blob_id = self.next_blob_id.fetch_add(1, Ordering::SeqCst);
        let mut stream = Vec::new();
        BlobStreamHeader {
            blob_id,
            parameters: parameters.to_vec(),
        }
        .emit(&mut stream);
        let segmented = self.segmented.load(Ordering::SeqCst);
        for segment in segments {
            if segmented {
                pack_segment(&mut stream, segment);
            } else {
                stream.extend_from_slice(segment);
            }
        }
        self.staged.lock()?.blob_streams.push(stream);
        Ok(blob_id)
    }

    /// Maps an existing materialized blob into the batch.
    pub fn register_blob(&self, existing_id: u64) -> FbResult<u64> {
        let batch_id = self.next_blob_id.fetch_add(1, Ordering::SeqCst);
        let mut staged = self.staged.lock()?;
        staged.regblobs.push((existing_id, batch_id));
        Ok(batch_id)
    }

    /// Flushes both streams and executes the batch; the completion state
    /// encodes per-record success or failure.
    pub fn execute(&self, transaction: &Transaction) -> FbResult<BatchCompletion> {
        let staged = {
            let mut guard = self.staged.lock()?;
            std::mem::take(&mut *guard)
        };
        let port = &self.stmt.port;

        for (existing_id, batch_id) in staged.regblobs {
            port.defer_sent(Packet::BatchRegblob(BatchRegblob {
                statement: self.stmt.id,
                existing_id,
                batch_id,
            }))?;
        }
        for stream in staged.blob_streams {
            port.defer_sent(Packet::BatchBlobStream(BatchBlobStream {
                statement: self.stmt.id,
                data: stream,
            }))?;
        }
        if staged.messages > 0 {
            port.defer_sent(Packet::BatchMsg(BatchMsg {
                statement: self.stmt.id,
                messages: staged.messages,
                data: staged.msg_data,
            }))?;
        }

        let reply = port.exchange(&Packet::BatchExec(BatchExec {
            statement: self.stmt.id,
            transaction: transaction.id(),
        }))?;
        match reply {
            Packet::BatchCs(completion) => Ok(completion),
            other => {
                port.expect_response(other)?;
                Err(FbError::Protocol(
                    "batch execution returned no completion state".to_owned(),
                ))
            }
        }
    }

    /// Round trip that forces all buffered batch errors out.
    pub fn sync(&self) -> FbResult<()> {
        self.stmt
            .port
            .exchange_response(&Packet::BatchSync)
            .map(drop)
    }

    /// Releases the server-side batch state.
    pub fn release(&self) -> FbResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.stmt.port.is_usable() {
            return Ok(());
        }
        self.stmt
            .port
            .exchange_response(&Packet::BatchRls(ObjectRef::new(self.stmt.id)))
            .map(drop)
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

