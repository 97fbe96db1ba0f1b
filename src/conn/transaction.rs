//! Transactions and their parameter blocks.

use crate::conn::attachment::AttachCore;
use crate::conn::blob::Blob;
use crate::port::object_map::ObjectEntry;
use crate::port::RemotePort;
use crate::protocol::clumplet::{self, ClumpletWriter};
use crate::protocol::ops::OpCode;
use crate::protocol::packets::{
    GetSlice, InfoRq, ObjectRef, Prepare2, PutSlice, Reconnect, StartTransaction,
};
use crate::protocol::Packet;
use crate::FbResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Isolation level of a [`Transaction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Isolation {
    Concurrency,
    Consistency,
    ReadCommitted { rec_version: bool },
}

/// Wait mode of a [`Transaction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitMode {
    NoWait,
    Wait,
    WaitFor(u32),
}

/// Builds a transaction parameter block.
#[derive(Clone, Debug)]
pub struct TransactionBuilder {
    isolation: Isolation,
    wait: WaitMode,
    read_only: bool,
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            isolation: Isolation::Concurrency,
            wait: WaitMode::Wait,
            read_only: false,
        }
    }

    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn wait(mut self, wait: WaitMode) -> Self {
        self.wait = wait;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn to_tpb(&self) -> Vec<u8> {
        let mut tpb = ClumpletWriter::new(clumplet::TPB_VERSION3);
        match self.isolation {
            Isolation::Concurrency => tpb.insert_tag(clumplet::TPB_CONCURRENCY),
            Isolation::Consistency => tpb.insert_tag(clumplet::TPB_CONSISTENCY),
            Isolation::ReadCommitted { rec_version } => {
                tpb.insert_tag(clumplet::TPB_READ_COMMITTED);
                tpb.insert_tag(if rec_version {
                    clumplet::TPB_REC_VERSION
                } else {
                    clumplet::TPB_NO_REC_VERSION
                })
            }
        };
        match self.wait {
            WaitMode::NoWait => {
                tpb.insert_tag(clumplet::TPB_NOWAIT);
            }
            WaitMode::Wait => {
                tpb.insert_tag(clumplet::TPB_WAIT);
            }
            WaitMode::WaitFor(seconds) => {
                tpb.insert_tag(clumplet::TPB_WAIT);
                #[allow(clippy::cast_possible_wrap)]
                tpb.insert_int(clumplet::TPB_LOCK_TIMEOUT, seconds as i32);
            }
        }
        tpb.insert_tag(if self.read_only {
            clumplet::TPB_READ
        } else {
            clumplet::TPB_WRITE
        });
        tpb.into_bytes()
    }
}

pub(crate) struct TransactionCore {
    pub port: RemotePort,
    pub id: u32,
    pub open: AtomicBool,
}

impl std::fmt::Debug for TransactionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "TransactionCore(id={})", self.id)
    }
}

/// An active transaction.
#[derive(Debug)]
pub struct Transaction {
    pub(crate) core: Arc<TransactionCore>,
    pub(crate) att: Arc<AttachCore>,
}

impl Transaction {
    pub(crate) fn start(att: Arc<AttachCore>, tpb: &[u8]) -> FbResult<Self> {
        let response = att.port.exchange_response(&Packet::Transaction(StartTransaction {
            database: att.id,
            tpb: tpb.to_vec(),
        }))?;
        Self::from_response(att, response.object)
    }

    pub(crate) fn reconnect(att: Arc<AttachCore>, id: i32) -> FbResult<Self> {
        let response = att.port.exchange_response(&Packet::Reconnect(Reconnect {
            database: att.id,
            id: id.to_le_bytes().to_vec(),
        }))?;
        Self::from_response(att, response.object)
    }

    fn from_response(att: Arc<AttachCore>, id: u32) -> FbResult<Self> {
        let core = Arc::new(TransactionCore {
            port: att.port.clone(),
            id,
            open: AtomicBool::new(true),
        });
        att.port
            .objects()?
            .register(id, ObjectEntry::Transaction(Arc::downgrade(&core)));
        Ok(Self { core, att })
    }

    pub fn id(&self) -> u32 {
        self.core.id
    }

    pub fn commit(self) -> FbResult<()> {
        self.finish(OpCode::Commit)
    }

    pub fn rollback(self) -> FbResult<()> {
        self.finish(OpCode::Rollback)
    }

    /// Commits while keeping the handle (and server context) usable.
    pub fn commit_retaining(&self) -> FbResult<()> {
        self.core
            .port
            .exchange_response(&Packet::CommitRetaining(ObjectRef::new(self.core.id)))
            .map(drop)
    }

    /// Rolls back while keeping the handle usable.
    pub fn rollback_retaining(&self) -> FbResult<()> {
        self.core
            .port
            .exchange_response(&Packet::RollbackRetaining(ObjectRef::new(self.core.id)))
            .map(drop)
    }

    /// First phase of two-phase commit, with recovery data.
    pub fn prepare_2pc(&self, data: &[u8]) -> FbResult<()> {
        self.core
            .port
            .exchange_response(&Packet::Prepare2(Prepare2 {
                transaction: self.core.id,
                data: data.to_vec(),
            }))
            .map(drop)
    }

    pub fn info(&self, items: &[u8], buffer_length: u32) -> FbResult<Vec<u8>> {
        self.core
            .port
            .exchange_response(&Packet::InfoTransaction(InfoRq {
                object: self.core.id,
                incarnation: 0,
                items: items.to_vec(),
                buffer_length,
            }))
            .map(|r| r.data)
    }

    /// Creates a new blob under this transaction.
    pub fn create_blob(&self, bpb: &[u8]) -> FbResult<Blob> {
        Blob::create(self, bpb)
    }

    /// Opens an existing blob by its 64-bit id.
    pub fn open_blob(&self, blob_id: u64, bpb: &[u8]) -> FbResult<Blob> {
        Blob::open(self, blob_id, bpb)
    }

    /// Stores an array slice.
    pub fn put_slice(&self, id: u64, sdl: &[u8], data: &[u8]) -> FbResult<u64> {
        self.core
            .port
            .exchange_response(&Packet::PutSlice(PutSlice {
                transaction: self.core.id,
                id,
                sdl: sdl.to_vec(),
                param: Vec::new(),
                data: data.to_vec(),
            }))
            .map(|r| r.blob_id)
    }

    /// Fetches an array slice.
    pub fn get_slice(&self, id: u64, sdl: &[u8], length: u32) -> FbResult<Vec<u8>> {
        let reply = self.core.port.exchange(&Packet::GetSlice(GetSlice {
            transaction: self.core.id,
            id,
            sdl: sdl.to_vec(),
            param: Vec::new(),
            length,
        }))?;
        match reply {
            Packet::SliceResponse(slice) => Ok(slice.data),
            other => self.core.port.expect_response(other).map(|r| r.data),
        }
    }

    fn finish(self, op: OpCode) -> FbResult<()> {
        finish_core(&self.core, op)
    }
}

fn finish_core(core: &TransactionCore, op: OpCode) -> FbResult<()> {
    if !core.open.swap(false, Ordering::SeqCst) {
        return Ok(());
    }
    let result = if core.port.is_usable() {
        let body = ObjectRef::new(core.id);
        let packet = match op {
            OpCode::Commit => Packet::Commit(body),
            _ => Packet::Rollback(body),
        };
        core.port.exchange_response(&packet).map(drop)
    } else {
        Ok(())
    };
    if let Ok(mut objects) = core.port.objects() {
        objects.remove(core.id);
    }
    result
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.core.open.load(Ordering::SeqCst) {
            let _ = finish_core(&self.core, OpCode::Rollback);
        }
    }
}

impl Transaction {
    pub fn attachment_id(&self) -> u32 {
        self.att.id
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tpb_shapes() {
        let tpb = TransactionBuilder::new().to_tpb();
        assert_eq!(tpb[0], clumplet::TPB_VERSION3);
        assert!(tpb.contains(&clumplet::TPB_CONCURRENCY));
        assert!(tpb.contains(&clumplet::TPB_WRITE));

        let tpb = TransactionBuilder::new()
            .isolation(Isolation::ReadCommitted { rec_version: true })
            .wait(WaitMode::WaitFor(10))
            .read_only(true)
            .to_tpb();
        assert!(tpb.contains(&clumplet::TPB_READ_COMMITTED));
        assert!(tpb.contains(&clumplet::TPB_LOCK_TIMEOUT));
        assert!(tpb.contains(&clumplet::TPB_READ));
    }
}
