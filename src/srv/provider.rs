//! The contract between the protocol session and the database engine
//! behind it.
//!
//! Everything the wire can express appears here; a provider implements
//! what it supports and inherits "feature is not supported" responses for
//! the rest. Handles are provider-assigned and opaque to the session,
//! which maps them into the port's object id space.

use crate::auth::UserStore;
use crate::port::RemotePort;
use crate::protocol::packets::events::build_epb;
use crate::protocol::packets::{BatchCompletion, EventsBody};
use crate::protocol::{Format, Packet};
use crate::{gds, FbError, FbResult};
use std::sync::{Arc, Mutex};

fn unsupported<T>() -> FbResult<T> {
    Err(FbError::gds(gds::WISH_LIST))
}

/// Statement metadata returned by a prepare.
#[derive(Debug)]
pub struct PreparedStatement {
    pub handle: u32,
    pub stmt_type: i32,
    pub in_format: Format,
    pub out_format: Format,
}

/// Factory for engine sessions, plus the account store the authentication
/// mirror validates against.
pub trait Provider: Send + Sync + 'static {
    fn accounts(&self) -> Arc<dyn UserStore>;

    fn events(&self) -> Arc<EventBoard>;

    fn attach(&self, database: &str, user: &str) -> FbResult<Box<dyn Session>>;

    fn create(&self, _database: &str, _user: &str) -> FbResult<Box<dyn Session>> {
        unsupported()
    }

    fn service_attach(&self, _service: &str, _user: &str) -> FbResult<Box<dyn ServiceSession>> {
        unsupported()
    }
}

/// One attached engine session. Handle arguments are the provider's own.
#[allow(unused_variables)]
pub trait Session: Send {
    fn database_info(&mut self, items: &[u8], buffer_length: usize) -> FbResult<Vec<u8>>;

    // transactions
    fn start_transaction(&mut self, tpb: &[u8]) -> FbResult<u32>;
    fn reconnect_transaction(&mut self, id: &[u8]) -> FbResult<u32> {
        unsupported()
    }
    fn transaction_info(
        &mut self,
        tran: u32,
        items: &[u8],
        buffer_length: usize,
    ) -> FbResult<Vec<u8>> {
        unsupported()
    }
    fn commit(&mut self, tran: u32, retaining: bool) -> FbResult<()>;
    fn rollback(&mut self, tran: u32, retaining: bool) -> FbResult<()>;
    fn prepare_2pc(&mut self, tran: u32, data: &[u8]) -> FbResult<()> {
        unsupported()
    }

    // statements
    fn prepare_statement(&mut self, tran: u32, sql: &str) -> FbResult<PreparedStatement>;
    fn execute(&mut self, stmt: u32, tran: u32, params: Option<Vec<u8>>) -> FbResult<()>;
    fn execute_singleton(
        &mut self,
        stmt: u32,
        tran: u32,
        params: Option<Vec<u8>>,
    ) -> FbResult<Option<Vec<u8>>> {
        unsupported()
    }
    fn exec_immediate(&mut self, tran: u32, sql: &str) -> FbResult<()>;
    /// One-shot execution with bound parameters and an optional singleton
    /// output row.
    fn exec_immediate2(
        &mut self,
        tran: u32,
        sql: &str,
        params: Option<Vec<u8>>,
    ) -> FbResult<Option<Vec<u8>>> {
        unsupported()
    }
    fn fetch(&mut self, stmt: u32, max: usize) -> FbResult<(Vec<Vec<u8>>, bool)>;
    fn free_statement(&mut self, stmt: u32, option: u32) -> FbResult<()>;
    fn set_cursor_name(&mut self, stmt: u32, name: &str) -> FbResult<()> {
        Ok(())
    }
    fn statement_info(&mut self, stmt: u32, items: &[u8], buffer_length: usize) -> FbResult<Vec<u8>> {
        unsupported()
    }

    // blobs and slices
    fn create_blob(&mut self, tran: u32, bpb: &[u8]) -> FbResult<(u32, u64)> {
        unsupported()
    }
    fn open_blob(&mut self, tran: u32, blob_id: u64, bpb: &[u8]) -> FbResult<u32> {
        unsupported()
    }
    fn put_segments(&mut self, blob: u32, segments: Vec<Vec<u8>>) -> FbResult<()> {
        unsupported()
    }
    fn get_segments(&mut self, blob: u32, max_bytes: usize) -> FbResult<(Vec<Vec<u8>>, bool)> {
        unsupported()
    }
    fn seek_blob(&mut self, blob: u32, mode: i32, offset: i32) -> FbResult<u32> {
        unsupported()
    }
    fn close_blob(&mut self, blob: u32, cancel: bool) -> FbResult<()> {
        unsupported()
    }
    fn blob_info(&mut self, blob: u32, items: &[u8], buffer_length: usize) -> FbResult<Vec<u8>> {
        unsupported()
    }
    fn put_slice(
        &mut self,
        tran: u32,
        id: u64,
        sdl: &[u8],
        param: &[u8],
        data: &[u8],
    ) -> FbResult<u64> {
        unsupported()
    }
    fn get_slice(
        &mut self,
        tran: u32,
        id: u64,
        sdl: &[u8],
        param: &[u8],
        length: usize,
    ) -> FbResult<(Vec<u8>, u32)> {
        unsupported()
    }

    // DDL and one-shot transact
    fn ddl(&mut self, tran: u32, data: &[u8]) -> FbResult<()> {
        unsupported()
    }
    fn transact(&mut self, tran: u32, blr: &[u8], in_msg: &[u8]) -> FbResult<Vec<u8>> {
        unsupported()
    }

    // compiled requests
    fn compile(&mut self, blr: &[u8]) -> FbResult<u32> {
        unsupported()
    }
    fn start_request(&mut self, req: u32, tran: u32) -> FbResult<()> {
        unsupported()
    }
    fn send_message(&mut self, req: u32, message_number: i32, data: Vec<u8>) -> FbResult<()> {
        unsupported()
    }
    fn receive_messages(
        &mut self,
        req: u32,
        message_number: i32,
        count: usize,
    ) -> FbResult<Vec<Vec<u8>>> {
        unsupported()
    }
    fn unwind_request(&mut self, req: u32) -> FbResult<()> {
        unsupported()
    }
    fn release_request(&mut self, req: u32) -> FbResult<()> {
        unsupported()
    }
    fn request_info(&mut self, req: u32, items: &[u8], buffer_length: usize) -> FbResult<Vec<u8>> {
        unsupported()
    }

    // batches
    fn batch_create(&mut self, stmt: u32, format: &[u8], msg_length: u32, pb: &[u8]) -> FbResult<()> {
        unsupported()
    }
    fn batch_msg(&mut self, stmt: u32, messages: u32, data: &[u8]) -> FbResult<()> {
        unsupported()
    }
    fn batch_blob_stream(&mut self, stmt: u32, data: &[u8]) -> FbResult<()> {
        unsupported()
    }
    fn batch_regblob(&mut self, stmt: u32, existing_id: u64, batch_id: u64) -> FbResult<()> {
        unsupported()
    }
    fn batch_set_bpb(&mut self, stmt: u32, bpb: &[u8]) -> FbResult<()> {
        unsupported()
    }
    fn batch_exec(&mut self, stmt: u32, tran: u32) -> FbResult<BatchCompletion> {
        unsupported()
    }
    fn batch_release(&mut self, stmt: u32) -> FbResult<()> {
        unsupported()
    }
}

/// One service-manager session.
pub trait ServiceSession: Send {
    fn start(&mut self, spb: &[u8]) -> FbResult<()>;
    fn query(
        &mut self,
        send_items: &[u8],
        recv_items: &[u8],
        buffer_length: usize,
    ) -> FbResult<Vec<u8>>;
}

struct EventRegistration {
    rid: i32,
    database: u32,
    names: Vec<String>,
    aux: Arc<Mutex<Option<RemotePort>>>,
}

/// Server-side event fan-out: sessions register interests, the engine
/// posts counts, registered aux ports get one `op_event` each.
#[derive(Default)]
pub struct EventBoard {
    registrations: Mutex<Vec<EventRegistration>>,
}

impl std::fmt::Debug for EventBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let count = self.registrations.lock().map(|r| r.len()).unwrap_or(0);
        write!(f, "EventBoard({count} registrations)")
    }
}

impl EventBoard {
    pub(crate) fn register(
        &self,
        rid: i32,
        database: u32,
        names: Vec<String>,
        aux: Arc<Mutex<Option<RemotePort>>>,
    ) {
        if let Ok(mut regs) = self.registrations.lock() {
            regs.push(EventRegistration {
                rid,
                database,
                names,
                aux,
            });
        }
    }

    pub(crate) fn cancel(&self, rid: i32) {
        if let Ok(mut regs) = self.registrations.lock() {
            regs.retain(|r| r.rid != rid);
        }
    }

    /// Posts one occurrence of the named event. Each matching
    /// registration is notified exactly once and then dropped (clients
    /// re-register after every delivery). Returns how many notifications
    /// went out.
    pub fn post(&self, name: &str) -> usize {
        let matches: Vec<EventRegistration> = {
            let Ok(mut regs) = self.registrations.lock() else {
                return 0;
            };
            let (hit, miss): (Vec<_>, Vec<_>) = regs
                .drain(..)
                .partition(|r| r.names.iter().any(|n| n == name));
            *regs = miss;
            hit
        };
        let mut notified = 0;
        for registration in matches {
            let port = registration.aux.lock().ok().and_then(|a| a.clone());
            if let Some(port) = port {
                let packet = Packet::Event(EventsBody {
                    database: registration.database,
                    items: build_epb(&[(name, 1)]),
                    ast: 0,
                    arg: 0,
                    rid: registration.rid,
                });
                // the aux port's reader thread owns its I/O lock, so event
                // delivery writes on the raw handle
                if port.send_packet_raw(&packet).is_ok() {
                    notified += 1;
                }
            }
        }
        notified
    }
}
