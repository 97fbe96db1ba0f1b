//! The per-port server session: protocol negotiation, the authentication
//! mirror, the auxiliary channel, and the dispatch of every operation to
//! the provider.

use crate::auth::client_block::pack_keys;
use crate::auth::server_block::{ServerAuthBlock, ServerAuthStep};
use crate::auth::{DEFAULT_CRYPT_PLUGIN, SYMMETRIC_KEY};
use crate::conn::TransportKind;
use crate::port::{PortIo, RemotePort};
use crate::protocol::info;
use crate::protocol::packets::events::{CANCEL_DISABLE, CANCEL_ENABLE, CANCEL_RAISE, REQ_ASYNC};
use crate::protocol::packets::blob::unpack_segments;
use crate::protocol::packets::response::{FetchResponse, Response, FETCH_NO_MORE, FETCH_OK};
use crate::protocol::packets::sql::DSQL_DROP;
use crate::protocol::packets::{
    AcceptData, Accept, ContAuth, RequestIo, RequestSend, SliceResponse, SqlResponse,
    TransactResponse,
};
use crate::protocol::versions::{
    masked, PFLAG_COMPRESS, PTYPE_LAZY_SEND, PTYPE_MASK, PTYPE_RPC,
};
use crate::protocol::{Format, Packet, StatusVector};
use crate::srv::provider::{Provider, ServiceSession, Session};
use crate::{gds, FbError, FbResult};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct SessionConfig {
    pub auth_plugins: String,
    pub allow_compression: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Phase {
    AwaitConnect,
    Authenticating,
    Active,
}

struct StmtEntry {
    provider: Option<u32>,
    in_fmt: Format,
    out_fmt: Format,
}

enum ServerObject {
    Transaction(u32),
    Statement(StmtEntry),
    Blob(u32),
    Request(u32),
}

/// Drives one accepted connection through its whole life.
pub struct SessionHandler {
    port: RemotePort,
    provider: Arc<dyn Provider>,
    config: SessionConfig,
    phase: Phase,
    auth: Option<ServerAuthBlock>,
    wire_key: Option<Vec<u8>>,
    session: Option<Box<dyn Session>>,
    service: Option<Box<dyn ServiceSession>>,
    db_id: u32,
    objects: HashMap<u32, ServerObject>,
    next_id: u32,
    aux_slot: Arc<Mutex<Option<RemotePort>>>,
    cancel_flag: Arc<AtomicI32>,
    cancel_disabled: Arc<AtomicBool>,
    event_rids: Vec<i32>,
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "SessionHandler(peer={}, phase={:?})",
            self.port.peer(),
            self.phase
        )
    }
}

impl SessionHandler {
    pub(crate) fn new(
        port: RemotePort,
        provider: Arc<dyn Provider>,
        config: SessionConfig,
    ) -> Self {
        Self {
            port,
            provider,
            config,
            phase: Phase::AwaitConnect,
            auth: None,
            wire_key: None,
            session: None,
            service: None,
            db_id: 0,
            objects: HashMap::new(),
            next_id: 1,
            aux_slot: Arc::new(Mutex::new(None)),
            cancel_flag: Arc::new(AtomicI32::new(0)),
            cancel_disabled: Arc::new(AtomicBool::new(false)),
            event_rids: Vec::new(),
        }
    }

    pub(crate) fn port(&self) -> &RemotePort {
        &self.port
    }

    /// Blocking loop for the thread-per-port back-end.
    pub fn run(&mut self) {
        loop {
            match self.pump_one() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    debug!("session {} ended: {e}", self.port.peer());
                    break;
                }
            }
        }
        self.teardown();
    }

    /// Reads one request and answers it. `Ok(false)` means the peer is
    /// done with us.
    pub fn pump_one(&mut self) -> FbResult<bool> {
        let packet = self.port.with_io(PortIo::receive_packet)?;
        match self.dispatch(packet) {
            Ok(keep_going) => Ok(keep_going),
            Err(e) if e.is_fatal_for_port() => Err(e),
            Err(e) => {
                // application-level failure: answer with the status vector
                self.respond(Response::error(e.to_status()))?;
                Ok(true)
            }
        }
    }

    /// Closes every registration this session still owns.
    pub(crate) fn teardown(&mut self) {
        for rid in std::mem::take(&mut self.event_rids) {
            self.provider.events().cancel(rid);
        }
        if let Some(aux) = self.aux_slot.lock().ok().and_then(|a| a.clone()) {
            aux.abort();
        }
    }

    fn respond(&self, response: Response) -> FbResult<()> {
        self.port.send_packet(&Packet::Response(response))
    }

    fn alloc_id(&mut self, object: ServerObject) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(id, object);
        id
    }

    fn tran(&self, id: u32) -> FbResult<u32> {
        match self.objects.get(&id) {
            Some(ServerObject::Transaction(handle)) => Ok(*handle),
            _ => Err(FbError::gds(gds::BAD_TRANS_HANDLE)),
        }
    }

    fn stmt_provider(&self, id: u32) -> FbResult<u32> {
        match self.objects.get(&id) {
            Some(ServerObject::Statement(entry)) => entry
                .provider
                .ok_or_else(|| FbError::gds(gds::BAD_STMT_HANDLE)),
            _ => Err(FbError::gds(gds::BAD_STMT_HANDLE)),
        }
    }

    fn blob(&self, id: u32) -> FbResult<u32> {
        match self.objects.get(&id) {
            Some(ServerObject::Blob(handle)) => Ok(*handle),
            _ => Err(FbError::gds(gds::BAD_SEGSTR_HANDLE)),
        }
    }

    fn request(&self, id: u32) -> FbResult<u32> {
        match self.objects.get(&id) {
            Some(ServerObject::Request(handle)) => Ok(*handle),
            _ => Err(FbError::gds(gds::BAD_REQ_HANDLE)),
        }
    }

    fn check_db(&self, id: u32) -> FbResult<()> {
        if self.session.is_some() && id == self.db_id {
            Ok(())
        } else {
            Err(FbError::gds(gds::BAD_DB_HANDLE))
        }
    }

    fn engine(&mut self) -> FbResult<&mut Box<dyn Session>> {
        self.session
            .as_mut()
            .ok_or_else(|| FbError::gds(gds::BAD_DB_HANDLE))
    }

    fn svc(&mut self) -> FbResult<&mut Box<dyn ServiceSession>> {
        self.service
            .as_mut()
            .ok_or_else(|| FbError::gds(gds::BAD_SVC_HANDLE))
    }

    /// A pending raise turns the next cancellable operation into the
    /// cancellation error.
    fn take_cancel(&self) -> bool {
        if self.cancel_disabled.load(Ordering::SeqCst) {
            return false;
        }
        self.cancel_flag.swap(0, Ordering::SeqCst) == CANCEL_RAISE
    }

    fn dispatch(&mut self, packet: Packet) -> FbResult<bool> {
        match self.phase {
            Phase::AwaitConnect => self.dispatch_connect(packet),
            Phase::Authenticating => self.dispatch_auth(packet),
            Phase::Active => self.dispatch_active(packet),
        }
    }

    // ---- negotiation and authentication -----------------------------------

    fn dispatch_connect(&mut self, packet: Packet) -> FbResult<bool> {
        let Packet::Connect(connect) = packet else {
            return Err(FbError::Protocol(format!(
                "expected connect, got {:?}",
                packet.op()
            )));
        };

        // highest weighted offer we also implement
        let Some(chosen) = connect
            .offers
            .iter()
            .filter(|o| (10..=16).contains(&masked(o.version)))
            .max_by_key(|o| o.weight)
            .copied()
        else {
            self.port.send_packet(&Packet::Reject)?;
            return Ok(false);
        };

        let compress =
            self.config.allow_compression && (chosen.max_type & PFLAG_COMPRESS) != 0;
        let ptype = (chosen.max_type & PTYPE_MASK).clamp(PTYPE_RPC, PTYPE_LAZY_SEND);
        let accept_type = ptype | i32::from(compress) * PFLAG_COMPRESS;
        let accept = Accept {
            version: chosen.version,
            architecture: crate::protocol::versions::ARCH_GENERIC,
            accept_type,
        };
        self.port.apply_accept(chosen.version, accept_type)?;

        if masked(chosen.version) < 13 {
            // legacy path: accept without in-band authentication
            self.port.send_packet(&Packet::Accept(accept))?;
            if compress {
                self.port.enable_compression()?;
            }
            self.phase = Phase::Active;
            return Ok(true);
        }

        let mut auth = ServerAuthBlock::new(self.provider.accounts(), &self.config.auth_plugins);
        let step = auth.start_from_connect(&connect.user_id);
        let keys = pack_keys(SYMMETRIC_KEY, &[DEFAULT_CRYPT_PLUGIN]);
        match step {
            Ok(ServerAuthStep::Challenge(data)) => {
                let plugin = auth.plugin_name().unwrap_or_default().to_owned();
                self.port.send_packet(&Packet::CondAccept(AcceptData {
                    accept,
                    data,
                    plugin,
                    authenticated: 0,
                    keys,
                }))?;
                if compress {
                    self.port.enable_compression()?;
                }
                self.auth = Some(auth);
                self.phase = Phase::Authenticating;
                Ok(true)
            }
            Ok(ServerAuthStep::Switch(name)) => {
                self.port.send_packet(&Packet::CondAccept(AcceptData {
                    accept,
                    data: Vec::new(),
                    plugin: name,
                    authenticated: 0,
                    keys,
                }))?;
                if compress {
                    self.port.enable_compression()?;
                }
                self.auth = Some(auth);
                self.phase = Phase::Authenticating;
                Ok(true)
            }
            Ok(ServerAuthStep::Complete) => {
                self.port.send_packet(&Packet::AcceptData(AcceptData {
                    accept,
                    data: Vec::new(),
                    plugin: String::new(),
                    authenticated: 1,
                    keys,
                }))?;
                if compress {
                    self.port.enable_compression()?;
                }
                self.phase = Phase::Active;
                Ok(true)
            }
            Err(_) => {
                // a single login error, whatever actually went wrong
                self.port.send_packet(&Packet::Response(Response::error(
                    StatusVector::from_gds(gds::LOGIN),
                )))?;
                Ok(false)
            }
        }
    }

    fn dispatch_auth(&mut self, packet: Packet) -> FbResult<bool> {
        let Packet::ContAuth(ca) = packet else {
            return Err(FbError::Protocol(format!(
                "expected cont_auth, got {:?}",
                packet.op()
            )));
        };
        let auth = self
            .auth
            .as_mut()
            .ok_or_else(|| FbError::Impl("no auth block in auth phase"))?;
        match auth.continue_rounds(&ca.name, &ca.data) {
            Ok(ServerAuthStep::Challenge(data)) => {
                let plugin = auth.plugin_name().unwrap_or_default().to_owned();
                let list = self.config.auth_plugins.clone();
                self.port.send_packet(&Packet::ContAuth(ContAuth {
                    data,
                    name: plugin,
                    list,
                    keys: Vec::new(),
                }))?;
                Ok(true)
            }
            Ok(ServerAuthStep::Complete) => {
                self.wire_key = auth.session_key();
                debug!("peer {} authenticated", self.port.peer());
                self.phase = Phase::Active;
                self.respond(Response::ok())?;
                Ok(true)
            }
            Ok(ServerAuthStep::Switch(_)) | Err(_) => {
                self.port.send_packet(&Packet::Response(Response::error(
                    StatusVector::from_gds(gds::LOGIN),
                )))?;
                Ok(false)
            }
        }
    }

    // ---- active phase ------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn dispatch_active(&mut self, packet: Packet) -> FbResult<bool> {
        match packet {
            Packet::Disconnect | Packet::Exit => return Ok(false),

            Packet::Crypt(crypt) => {
                let Some(key) = self.wire_key.clone() else {
                    return Err(FbError::from_status(StatusVector::from_gds(gds::RANDOM)));
                };
                // inbound is encrypted from the next packet on, outbound
                // from this response on
                self.port.enable_crypt(&crypt.plugin, &key)?;
                self.respond(Response::ok())?;
            }

            Packet::Attach(body) => {
                let login = self.login();
                let session = self.provider.attach(&body.path, &login)?;
                self.session = Some(session);
                self.db_id = self.next_id;
                self.next_id += 1;
                self.respond(Response::with_object(self.db_id))?;
            }
            Packet::Create(body) => {
                let login = self.login();
                let session = self.provider.create(&body.path, &login)?;
                self.session = Some(session);
                self.db_id = self.next_id;
                self.next_id += 1;
                self.respond(Response::with_object(self.db_id))?;
            }
            Packet::Detach(_) => {
                self.session = None;
                self.respond(Response::ok())?;
            }
            Packet::DropDatabase(_) => {
                self.session = None;
                self.respond(Response::ok())?;
            }

            Packet::ServiceAttach(body) => {
                let login = self.login();
                let service = self.provider.service_attach(&body.path, &login)?;
                self.service = Some(service);
                let id = self.next_id;
                self.next_id += 1;
                self.respond(Response::with_object(id))?;
            }
            Packet::ServiceDetach(_) => {
                if self.service.take().is_none() {
                    return Err(FbError::gds(gds::BAD_SVC_HANDLE));
                }
                self.respond(Response::ok())?;
            }
            Packet::ServiceStart(start) => {
                let spb = start.spb;
                self.svc()?.start(&spb)?;
                self.respond(Response::ok())?;
            }
            Packet::ServiceInfo(rq) => {
                let data = self.svc()?.query(
                    &rq.send_items,
                    &rq.recv_items,
                    rq.buffer_length as usize,
                )?;
                self.respond(Response::with_data(data))?;
            }

            Packet::Ping => {
                self.check_db_attached()?;
                self.respond(Response::ok())?;
            }
            Packet::InfoDatabase(rq) => {
                self.check_db(rq.object)?;
                let data = self
                    .engine()?
                    .database_info(&rq.items, rq.buffer_length as usize)?;
                self.respond(Response::with_data(data))?;
            }

            Packet::Transaction(st) => {
                self.check_db(st.database)?;
                let handle = self.engine()?.start_transaction(&st.tpb)?;
                let id = self.alloc_id(ServerObject::Transaction(handle));
                self.respond(Response::with_object(id))?;
            }
            Packet::Reconnect(rc) => {
                self.check_db(rc.database)?;
                let handle = self.engine()?.reconnect_transaction(&rc.id)?;
                let id = self.alloc_id(ServerObject::Transaction(handle));
                self.respond(Response::with_object(id))?;
            }
            Packet::Commit(obj) => {
                let handle = self.tran(obj.object)?;
                self.engine()?.commit(handle, false)?;
                self.objects.remove(&obj.object);
                self.respond(Response::ok())?;
            }
            Packet::Rollback(obj) => {
                let handle = self.tran(obj.object)?;
                self.engine()?.rollback(handle, false)?;
                self.objects.remove(&obj.object);
                self.respond(Response::ok())?;
            }
            Packet::CommitRetaining(obj) => {
                let handle = self.tran(obj.object)?;
                self.engine()?.commit(handle, true)?;
                self.respond(Response::ok())?;
            }
            Packet::RollbackRetaining(obj) => {
                let handle = self.tran(obj.object)?;
                self.engine()?.rollback(handle, true)?;
                self.respond(Response::ok())?;
            }
            Packet::Prepare(obj) => {
                let handle = self.tran(obj.object)?;
                self.engine()?.prepare_2pc(handle, &[])?;
                self.respond(Response::ok())?;
            }
            Packet::Prepare2(p2) => {
                let handle = self.tran(p2.transaction)?;
                self.engine()?.prepare_2pc(handle, &p2.data)?;
                self.respond(Response::ok())?;
            }
            Packet::InfoTransaction(rq) => {
                let handle = self.tran(rq.object)?;
                let data = self
                    .engine()?
                    .transaction_info(handle, &rq.items, rq.buffer_length as usize)?;
                self.respond(Response::with_data(data))?;
            }

            Packet::AllocateStatement(alloc) => {
                self.check_db(alloc.database)?;
                let id = self.alloc_id(ServerObject::Statement(StmtEntry {
                    provider: None,
                    in_fmt: Format::default(),
                    out_fmt: Format::default(),
                }));
                self.respond(Response::with_object(id))?;
            }
            Packet::PrepareStatement(ps) => {
                let tran = self.tran(ps.transaction)?;
                if !matches!(
                    self.objects.get(&ps.statement),
                    Some(ServerObject::Statement(_))
                ) {
                    return Err(FbError::gds(gds::BAD_STMT_HANDLE));
                }
                let prepared = self.engine()?.prepare_statement(tran, &ps.sql)?;
                let data =
                    info::emit_describe(prepared.stmt_type, &prepared.in_format, &prepared.out_format);
                if let Some(ServerObject::Statement(entry)) =
                    self.objects.get_mut(&ps.statement)
                {
                    entry.provider = Some(prepared.handle);
                    entry.in_fmt = prepared.in_format;
                    entry.out_fmt = prepared.out_format;
                }
                self.respond(Response::with_data(data))?;
            }
            Packet::Execute(ex) => {
                let params = self.read_params(ex.messages, &ex.format)?;
                if self.take_cancel() {
                    return Err(FbError::from_status(StatusVector::from_gds(gds::CANCELLED)));
                }
                let tran = self.tran(ex.transaction)?;
                let stmt = self.stmt_provider(ex.statement)?;
                self.engine()?.execute(stmt, tran, params)?;
                self.respond(Response::ok())?;
            }
            Packet::Execute2(ex2) => {
                let params = self.read_params(ex2.exec.messages, &ex2.exec.format)?;
                if self.take_cancel() {
                    return Err(FbError::from_status(StatusVector::from_gds(gds::CANCELLED)));
                }
                let tran = self.tran(ex2.exec.transaction)?;
                let stmt = self.stmt_provider(ex2.exec.statement)?;
                let out_fmt = self.stmt_out_format(ex2.exec.statement)?;
                let row = self.engine()?.execute_singleton(stmt, tran, params)?;
                self.port.with_io(|io| {
                    io.emit_packet(&Packet::SqlResponse(SqlResponse {
                        messages: i32::from(row.is_some()),
                    }))?;
                    if let Some(row) = &row {
                        io.emit_row(&out_fmt, row)?;
                    }
                    io.emit_packet(&Packet::Response(Response::ok()))?;
                    io.flush(true)
                })?;
            }
            Packet::ExecImmediate(ps) => {
                if self.take_cancel() {
                    return Err(FbError::from_status(StatusVector::from_gds(gds::CANCELLED)));
                }
                let tran = self.tran(ps.transaction)?;
                self.engine()?.exec_immediate(tran, &ps.sql)?;
                self.respond(Response::ok())?;
            }
            Packet::ExecImmediate2(ei2) => {
                let params = self.read_params(ei2.in_messages, &ei2.in_format)?;
                if self.take_cancel() {
                    return Err(FbError::from_status(StatusVector::from_gds(gds::CANCELLED)));
                }
                let tran = self.tran(ei2.base.transaction)?;
                let out_fmt = if ei2.out_format.is_empty() {
                    None
                } else {
                    Some(info::unpack_format(&ei2.out_format)?)
                };
                let row = self
                    .engine()?
                    .exec_immediate2(tran, &ei2.base.sql, params)?;
                self.port.with_io(|io| {
                    let out_row = match (&out_fmt, &row) {
                        (Some(fmt), Some(row)) => Some((fmt, row)),
                        _ => None,
                    };
                    io.emit_packet(&Packet::SqlResponse(SqlResponse {
                        messages: i32::from(out_row.is_some()),
                    }))?;
                    if let Some((fmt, row)) = out_row {
                        io.emit_row(fmt, row)?;
                    }
                    io.emit_packet(&Packet::Response(Response::ok()))?;
                    io.flush(true)
                })?;
            }
            Packet::Fetch(f) => {
                return self.handle_fetch(&f);
            }
            Packet::FreeStatement(free) => {
                let provider = self.stmt_provider(free.statement).ok();
                if let Some(stmt) = provider {
                    self.engine()?.free_statement(stmt, free.option)?;
                }
                if free.option == DSQL_DROP {
                    self.objects.remove(&free.statement);
                }
                self.respond(Response::ok())?;
            }
            Packet::SetCursor(sc) => {
                let stmt = self.stmt_provider(sc.statement)?;
                self.engine()?.set_cursor_name(stmt, &sc.name)?;
                self.respond(Response::ok())?;
            }
            Packet::InfoSql(rq) => {
                let stmt = self.stmt_provider(rq.object)?;
                let data = self
                    .engine()?
                    .statement_info(stmt, &rq.items, rq.buffer_length as usize)?;
                self.respond(Response::with_data(data))?;
            }

            Packet::CreateBlob2(open) => {
                let tran = self.tran(open.transaction)?;
                let (handle, blob_id) = self.engine()?.create_blob(tran, &open.bpb)?;
                let id = self.alloc_id(ServerObject::Blob(handle));
                let mut response = Response::with_object(id);
                response.blob_id = blob_id;
                self.respond(response)?;
            }
            Packet::OpenBlob2(open) => {
                let tran = self.tran(open.transaction)?;
                let handle = self.engine()?.open_blob(tran, open.id, &open.bpb)?;
                let id = self.alloc_id(ServerObject::Blob(handle));
                self.respond(Response::with_object(id))?;
            }
            Packet::PutSegment(put) | Packet::BatchSegments(put) => {
                let blob = self.blob(put.blob)?;
                let segments = unpack_segments(&put.segments);
                self.engine()?.put_segments(blob, segments)?;
                self.respond(Response::ok())?;
            }
            Packet::GetSegment(get) => {
                let blob = self.blob(get.blob)?;
                let (segments, eof) = self
                    .engine()?
                    .get_segments(blob, get.length as usize)?;
                let mut packed = Vec::new();
                for segment in &segments {
                    crate::protocol::packets::blob::pack_segment(&mut packed, segment);
                }
                let mut response = Response::with_data(packed);
                response.object = if eof { 2 } else { 0 };
                self.respond(response)?;
            }
            Packet::SeekBlob(seek) => {
                let blob = self.blob(seek.blob)?;
                let offset = self.engine()?.seek_blob(blob, seek.mode, seek.offset)?;
                self.respond(Response::with_object(offset))?;
            }
            Packet::CloseBlob(obj) => {
                let blob = self.blob(obj.object)?;
                self.engine()?.close_blob(blob, false)?;
                self.objects.remove(&obj.object);
                self.respond(Response::ok())?;
            }
            Packet::CancelBlob(obj) => {
                let blob = self.blob(obj.object)?;
                self.engine()?.close_blob(blob, true)?;
                self.objects.remove(&obj.object);
                self.respond(Response::ok())?;
            }
            Packet::InfoBlob(rq) => {
                let blob = self.blob(rq.object)?;
                let data = self
                    .engine()?
                    .blob_info(blob, &rq.items, rq.buffer_length as usize)?;
                self.respond(Response::with_data(data))?;
            }

            Packet::GetSlice(slice) => {
                let tran = self.tran(slice.transaction)?;
                let (data, elements) = self.engine()?.get_slice(
                    tran,
                    slice.id,
                    &slice.sdl,
                    &slice.param,
                    slice.length as usize,
                )?;
                self.port.send_packet(&Packet::SliceResponse(SliceResponse {
                    elements,
                    data,
                }))?;
            }
            Packet::PutSlice(slice) => {
                let tran = self.tran(slice.transaction)?;
                let id = self
                    .engine()?
                    .put_slice(tran, slice.id, &slice.sdl, &slice.param, &slice.data)?;
                let mut response = Response::ok();
                response.blob_id = id;
                self.respond(response)?;
            }

            Packet::Ddl(ddl) => {
                self.check_db(ddl.database)?;
                let tran = self.tran(ddl.transaction)?;
                self.engine()?.ddl(tran, &ddl.data)?;
                self.respond(Response::ok())?;
            }
            Packet::Transact(t) => {
                self.check_db(t.database)?;
                let tran = self.tran(t.transaction)?;
                let data = self.engine()?.transact(tran, &t.blr, &t.in_msg)?;
                // the output message only travels when the caller asked
                let data = if t.out_expected == 0 { Vec::new() } else { data };
                self.port
                    .send_packet(&Packet::TransactResponse(TransactResponse {
                        messages: i32::from(!data.is_empty()),
                        data,
                    }))?;
            }

            Packet::Compile(compile) => {
                self.check_db(compile.database)?;
                let handle = self.engine()?.compile(&compile.blr)?;
                let id = self.alloc_id(ServerObject::Request(handle));
                self.respond(Response::with_object(id))?;
            }
            Packet::Start(io_rq) | Packet::StartAndReceive(io_rq) => {
                let tran = self.tran(io_rq.transaction)?;
                let req = self.request(io_rq.request)?;
                self.engine()?.start_request(req, tran)?;
                self.respond(Response::ok())?;
            }
            Packet::Send(send) | Packet::Insert(send) => {
                let req = self.request(send.io.request)?;
                self.engine()?
                    .send_message(req, send.io.message_number, send.data)?;
                self.respond(Response::ok())?;
            }
            Packet::StartAndSend(send) | Packet::StartSendAndReceive(send) => {
                let tran = self.tran(send.io.transaction)?;
                let req = self.request(send.io.request)?;
                let engine = self.engine()?;
                engine.start_request(req, tran)?;
                engine.send_message(req, send.io.message_number, send.data)?;
                self.respond(Response::ok())?;
            }
            Packet::Receive(io_rq) => {
                let req = self.request(io_rq.request)?;
                let count = usize::try_from(io_rq.messages).unwrap_or(0).max(1);
                let messages = self
                    .engine()?
                    .receive_messages(req, io_rq.message_number, count)?;
                self.port.with_io(|io| {
                    for data in messages {
                        io.emit_packet(&Packet::Send(RequestSend {
                            io: RequestIo {
                                request: io_rq.request,
                                incarnation: 0,
                                transaction: io_rq.transaction,
                                message_number: io_rq.message_number,
                                messages: 1,
                            },
                            data,
                        }))?;
                    }
                    io.emit_packet(&Packet::Response(Response::ok()))?;
                    io.flush(true)
                })?;
            }
            Packet::Unwind(obj) => {
                let req = self.request(obj.object)?;
                self.engine()?.unwind_request(req)?;
                self.respond(Response::ok())?;
            }
            Packet::Release(obj) => {
                let req = self.request(obj.object)?;
                self.engine()?.release_request(req)?;
                self.objects.remove(&obj.object);
                self.respond(Response::ok())?;
            }
            Packet::InfoRequest(rq) => {
                let req = self.request(rq.object)?;
                let data = self
                    .engine()?
                    .request_info(req, &rq.items, rq.buffer_length as usize)?;
                self.respond(Response::with_data(data))?;
            }

            Packet::ConnectRequest(rq) => {
                if rq.req_type != REQ_ASYNC {
                    return Err(FbError::Protocol(format!(
                        "unknown connect request type {}",
                        rq.req_type
                    )));
                }
                let blob = self.setup_aux()?;
                self.respond(Response::with_data(blob))?;
            }
            Packet::QueEvents(body) => {
                self.check_db(body.database)?;
                // a registration without a live aux channel could never be
                // delivered; wait for the dial-back to land
                self.wait_for_aux()?;
                let names: Vec<String> =
                    crate::protocol::packets::events::parse_epb(&body.items)
                        .into_iter()
                        .map(|(name, _)| name)
                        .collect();
                self.provider.events().register(
                    body.rid,
                    body.database,
                    names,
                    Arc::clone(&self.aux_slot),
                );
                self.event_rids.push(body.rid);
                #[allow(clippy::cast_sign_loss)]
                self.respond(Response::with_object(body.rid as u32))?;
            }
            Packet::CancelEvents(ce) => {
                self.check_db(ce.database)?;
                if !self.event_rids.contains(&ce.rid) {
                    return Err(FbError::gds(gds::BAD_EVENTS_HANDLE));
                }
                self.provider.events().cancel(ce.rid);
                self.event_rids.retain(|rid| *rid != ce.rid);
                self.respond(Response::ok())?;
            }

            Packet::BatchCreate(bc) => {
                let stmt = self.stmt_provider(bc.statement)?;
                self.engine()?
                    .batch_create(stmt, &bc.format, bc.msg_length, &bc.pb)?;
                self.respond(Response::ok())?;
            }
            Packet::BatchMsg(bm) => {
                let stmt = self.stmt_provider(bm.statement)?;
                self.engine()?.batch_msg(stmt, bm.messages, &bm.data)?;
                self.respond(Response::ok())?;
            }
            Packet::BatchBlobStream(bs) => {
                let stmt = self.stmt_provider(bs.statement)?;
                self.engine()?.batch_blob_stream(stmt, &bs.data)?;
                self.respond(Response::ok())?;
            }
            Packet::BatchRegblob(rb) => {
                let stmt = self.stmt_provider(rb.statement)?;
                self.engine()?
                    .batch_regblob(stmt, rb.existing_id, rb.batch_id)?;
                self.respond(Response::ok())?;
            }
            Packet::BatchSetBpb(sb) => {
                let stmt = self.stmt_provider(sb.statement)?;
                self.engine()?.batch_set_bpb(stmt, &sb.bpb)?;
                self.respond(Response::ok())?;
            }
            Packet::BatchExec(be) => {
                let tran = self.tran(be.transaction)?;
                let stmt = self.stmt_provider(be.statement)?;
                let mut completion = self.engine()?.batch_exec(stmt, tran)?;
                completion.statement = be.statement;
                self.port.send_packet(&Packet::BatchCs(completion))?;
            }
            Packet::BatchRls(obj) | Packet::BatchCancel(obj) => {
                let stmt = self.stmt_provider(obj.object)?;
                self.engine()?.batch_release(stmt)?;
                self.respond(Response::ok())?;
            }
            Packet::BatchSync => {
                self.respond(Response::ok())?;
            }

            Packet::Cancel(c) => {
                // advisory kinds may arrive in-band from very old peers
                match c.kind {
                    CANCEL_DISABLE => self.cancel_disabled.store(true, Ordering::SeqCst),
                    CANCEL_ENABLE => self.cancel_disabled.store(false, Ordering::SeqCst),
                    kind => {
                        self.cancel_flag.store(kind, Ordering::SeqCst);
                    }
                }
            }

            other => {
                return Err(FbError::Protocol(format!(
                    "unexpected {:?} in active phase",
                    other.op()
                )));
            }
        }
        Ok(true)
    }

    fn handle_fetch(&mut self, f: &crate::protocol::packets::Fetch) -> FbResult<bool> {
        if self.take_cancel() {
            return Err(FbError::from_status(StatusVector::from_gds(gds::CANCELLED)));
        }
        let stmt = self.stmt_provider(f.statement)?;
        let out_fmt = self.stmt_out_format(f.statement)?;
        let wanted = usize::try_from(f.messages).unwrap_or(0).max(1);
        let (rows, eof) = self.engine()?.fetch(stmt, wanted)?;
        self.port.with_io(|io| {
            for row in &rows {
                io.emit_packet(&Packet::FetchResponse(FetchResponse {
                    status: FETCH_OK,
                    messages: 1,
                }))?;
                io.emit_row(&out_fmt, row)?;
            }
            if eof && rows.len() < wanted {
                io.emit_packet(&Packet::FetchResponse(FetchResponse {
                    status: FETCH_NO_MORE,
                    messages: 0,
                }))?;
            }
            io.flush(true)
        })?;
        Ok(true)
    }

    fn stmt_out_format(&self, id: u32) -> FbResult<Format> {
        match self.objects.get(&id) {
            Some(ServerObject::Statement(entry)) => Ok(entry.out_fmt.clone()),
            _ => Err(FbError::gds(gds::BAD_STMT_HANDLE)),
        }
    }

    fn read_params(&self, messages: i32, format_blob: &[u8]) -> FbResult<Option<Vec<u8>>> {
        if messages <= 0 {
            return Ok(None);
        }
        let format = info::unpack_format(format_blob)?;
        let row = self.port.with_io(|io| io.read_row(&format))?;
        Ok(Some(row))
    }

    fn check_db_attached(&self) -> FbResult<()> {
        if self.session.is_some() || self.service.is_some() {
            Ok(())
        } else {
            Err(FbError::gds(gds::BAD_DB_HANDLE))
        }
    }

    fn login(&self) -> String {
        self.auth
            .as_ref()
            .and_then(ServerAuthBlock::login)
            .unwrap_or_default()
            .to_owned()
    }

    fn wait_for_aux(&self) -> FbResult<()> {
        for _ in 0..500 {
            let connected = self
                .aux_slot
                .lock()
                .map(|slot| slot.is_some())
                .unwrap_or(false);
            if connected {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Err(FbError::gds(gds::NET_EVENT_CONNECT_ERR))
    }

    /// Opens the auxiliary listening socket, spawns the one-shot accept
    /// (and subsequent cancel-reader) thread, and returns the address blob
    /// for the response.
    fn setup_aux(&mut self) -> FbResult<Vec<u8>> {
        let listener = TcpListener::bind(("0.0.0.0", 0))?;
        let aux_port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;

        let slot = Arc::clone(&self.aux_slot);
        let cancel = Arc::clone(&self.cancel_flag);
        let disabled = Arc::clone(&self.cancel_disabled);
        let negotiated = self.port.negotiated();
        let spawned = std::thread::Builder::new()
            .name("fbremote-aux".to_owned())
            .spawn(move || {
                for _ in 0..300 {
                    match listener.accept() {
                        Ok((stream, addr)) => {
                            let _ = stream.set_nonblocking(false);
                            let Ok(port) = RemotePort::from_stream(
                                stream,
                                addr.to_string(),
                                TransportKind::Inet,
                            ) else {
                                return;
                            };
                            let _ = port.apply_accept(
                                negotiated.raw_version,
                                negotiated.accept_type & PTYPE_MASK,
                            );
                            if let Ok(mut aux) = slot.lock() {
                                *aux = Some(port.clone());
                            }
                            aux_cancel_loop(&port, &cancel, &disabled);
                            return;
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            std::thread::sleep(Duration::from_millis(20));
                        }
                        Err(_) => return,
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("could not spawn the aux accept thread: {e}");
        }
        Ok(crate::aux::pack_aux_addr(aux_port))
    }
}

/// Reads cancellation packets off the auxiliary port until it dies.
fn aux_cancel_loop(port: &RemotePort, flag: &AtomicI32, disabled: &AtomicBool) {
    loop {
        match port.with_io(PortIo::receive_packet) {
            Ok(Packet::Cancel(c)) => {
                trace!("out-of-band cancel kind {}", c.kind);
                match c.kind {
                    CANCEL_DISABLE => disabled.store(true, Ordering::SeqCst),
                    CANCEL_ENABLE => disabled.store(false, Ordering::SeqCst),
                    CANCEL_RAISE => flag.store(CANCEL_RAISE, Ordering::SeqCst),
                    _ => {}
                }
            }
            Ok(Packet::Disconnect | Packet::Exit) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

