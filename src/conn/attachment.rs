//! Attachments: session establishment (version negotiation, multi-round
//! authentication, opportunistic wire encryption) and the database-level
//! operations.

use crate::auth::{self, ClientAuthBlock};
use crate::conn::params::{ConnectParams, IntoConnectParams};
use crate::conn::request::Request;
use crate::conn::statement::Statement;
use crate::conn::transaction::{Transaction, TransactionBuilder};
use crate::port::{CancelKind, RemotePort};
use crate::protocol::clumplet::{self, ClumpletWriter};
use crate::protocol::info;
use crate::protocol::ops::OpCode;
use crate::protocol::packets::{
    AttachBody, ContAuth, Crypt, CryptKeyCallback, Ddl, ExecImmediate2, InfoRq, ObjectRef,
    PrepareSql, TransactRq,
};
use crate::protocol::versions::{
    ProtocolOffer, ARCH_GENERIC, CONNECT_VERSION, PFLAG_COMPRESS, SUPPORTED_PROTOCOLS,
};
use crate::protocol::{Format, Packet};
use crate::{gds, FbError, FbResult};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

/// User-supplied hook answering `op_crypt_key_callback` requests.
pub type CryptKeyCallbackFn = Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// An open database session.
#[derive(Debug)]
pub struct Attachment {
    pub(crate) core: Arc<AttachCore>,
}

pub(crate) struct AttachCore {
    pub port: RemotePort,
    pub params: ConnectParams,
    pub id: u32,
    pub next_rid: AtomicI32,
    detached: AtomicBool,
}

impl std::fmt::Debug for AttachCore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "AttachCore(id={}, peer={})", self.id, self.port.peer())
    }
}

impl Attachment {
    /// Connects, authenticates and attaches to an existing database.
    pub fn connect<P: IntoConnectParams>(params: P) -> FbResult<Self> {
        Self::attach_internal(params.into_connect_params()?, false, None)
    }

    /// Connects, authenticates and creates a new database.
    pub fn create_database<P: IntoConnectParams>(params: P) -> FbResult<Self> {
        Self::attach_internal(params.into_connect_params()?, true, None)
    }

    /// Like [`Attachment::connect`], with a hook for server-initiated
    /// encryption-key callbacks.
    pub fn connect_with_crypt_callback<P: IntoConnectParams>(
        params: P,
        callback: CryptKeyCallbackFn,
    ) -> FbResult<Self> {
        Self::attach_internal(params.into_connect_params()?, false, Some(callback))
    }

    fn attach_internal(
        params: ConnectParams,
        create: bool,
        crypt_cb: Option<CryptKeyCallbackFn>,
    ) -> FbResult<Self> {
        let operation = if create {
            OpCode::Create
        } else {
            OpCode::Attach
        };
        let port = establish(&params, operation, crypt_cb.as_ref())?;

        let dpb = build_dpb(&params);
        let body = AttachBody {
            object: 0,
            path: params.database.clone(),
            pb: dpb,
        };
        let packet = if create {
            Packet::Create(body)
        } else {
            Packet::Attach(body)
        };
        let response = port.exchange_response(&packet)?;
        debug!(
            "attached to {} as object {}",
            params.database, response.object
        );
        port.set_dummy_interval(params.dummy_packet_interval);
        Ok(Self {
            core: Arc::new(AttachCore {
                port,
                params,
                id: response.object,
                next_rid: AtomicI32::new(1),
                detached: AtomicBool::new(false),
            }),
        })
    }

    pub fn id(&self) -> u32 {
        self.core.id
    }

    /// The masked protocol version negotiated for this session.
    pub fn protocol(&self) -> u16 {
        self.core.port.protocol()
    }

    /// Validates the session with a round trip.
    pub fn ping(&self) -> FbResult<()> {
        if self.protocol() < 13 {
            return Err(FbError::VersionUnsupported("ping"));
        }
        self.core.port.exchange_response(&Packet::Ping).map(drop)
    }

    /// Runs a database info request; certain version items are merged with
    /// locally known values instead of relying on the server alone.
    pub fn info_database(&self, items: &[u8], buffer_length: u32) -> FbResult<Vec<u8>> {
        let response = self
            .core
            .port
            .exchange_response(&Packet::InfoDatabase(InfoRq {
                object: self.core.id,
                incarnation: 0,
                items: items.to_vec(),
                buffer_length,
            }))?;
        Ok(merge_local_info(&response.data, buffer_length as usize))
    }

    /// Starts a transaction with default options (concurrency, wait,
    /// read-write).
    pub fn start_transaction(&self) -> FbResult<Transaction> {
        self.start_transaction_with(&TransactionBuilder::new())
    }

    pub fn start_transaction_with(&self, builder: &TransactionBuilder) -> FbResult<Transaction> {
        Transaction::start(Arc::clone(&self.core), &builder.to_tpb())
    }

    /// Reattaches a limbo transaction by id for two-phase recovery.
    pub fn reconnect_transaction(&self, id: i32) -> FbResult<Transaction> {
        Transaction::reconnect(Arc::clone(&self.core), id)
    }

    /// Prepares an SQL statement for repeated execution.
    pub fn prepare(&self, transaction: &Transaction, sql: &str) -> FbResult<Statement> {
        Statement::prepare(Arc::clone(&self.core), transaction, sql)
    }

    /// Executes an SQL statement without keeping a handle around.
    pub fn exec_immediate(&self, transaction: &Transaction, sql: &str) -> FbResult<()> {
        self.core
            .port
            .exchange_response(&Packet::ExecImmediate(PrepareSql {
                transaction: transaction.id(),
                statement: 0,
                dialect: 3,
                sql: sql.to_owned(),
                items: Vec::new(),
                buffer_length: 0,
            }))
            .map(drop)
    }

    /// Executes SQL in one round trip with bound parameters and an
    /// optional singleton output row.
    ///
    /// `params` must be a buffer in `in_format` layout; the returned row,
    /// if any, is in `out_format` layout. Pass empty formats for sides the
    /// statement does not have.
    pub fn exec_immediate2(
        &self,
        transaction: &Transaction,
        sql: &str,
        in_format: &Format,
        params: Option<&[u8]>,
        out_format: &Format,
    ) -> FbResult<Option<Vec<u8>>> {
        let packet = Packet::ExecImmediate2(ExecImmediate2 {
            base: PrepareSql {
                transaction: transaction.id(),
                statement: 0,
                dialect: 3,
                sql: sql.to_owned(),
                items: Vec::new(),
                buffer_length: 0,
            },
            in_format: if params.is_some() {
                info::pack_format(in_format)
            } else {
                Vec::new()
            },
            in_messages: i32::from(params.is_some()),
            out_format: if out_format.field_count() > 0 {
                info::pack_format(out_format)
            } else {
                Vec::new()
            },
        });

        let holder;
        let rows: &[&[u8]] = match params {
            Some(msg) => {
                holder = [msg];
                &holder
            }
            None => &[],
        };
        let reply = self
            .core
            .port
            .exchange_with_rows(&packet, in_format, rows)?;
        let row = match reply {
            Packet::SqlResponse(sql_resp) if sql_resp.messages > 0 => Some(
                self.core
                    .port
                    .with_io(|io| io.read_row(out_format))?,
            ),
            Packet::SqlResponse(_) => None,
            other => {
                self.core.port.expect_response(other)?;
                return Ok(None);
            }
        };
        // the closing response follows the data
        let trailer = self.core.port.receive_packet()?;
        self.core.port.expect_response(trailer)?;
        Ok(row)
    }

    /// Executes a compiled request program in a single round trip; returns
    /// the output message, empty unless one was requested.
    pub fn transact(
        &self,
        transaction: &Transaction,
        blr: &[u8],
        in_msg: &[u8],
        out_expected: bool,
    ) -> FbResult<Vec<u8>> {
        let reply = self.core.port.exchange(&Packet::Transact(TransactRq {
            database: self.core.id,
            transaction: transaction.id(),
            blr: blr.to_vec(),
            in_msg: in_msg.to_vec(),
            out_expected: i32::from(out_expected),
        }))?;
        match reply {
            Packet::TransactResponse(tr) => Ok(tr.data),
            other => self.core.port.expect_response(other).map(|r| r.data),
        }
    }

    /// Submits a DDL blob for execution in the given transaction.
    pub fn ddl(&self, transaction: &Transaction, data: &[u8]) -> FbResult<()> {
        self.core
            .port
            .exchange_response(&Packet::Ddl(Ddl {
                database: self.core.id,
                transaction: transaction.id(),
                data: data.to_vec(),
            }))
            .map(drop)
    }

    /// Compiles a BLR request program on the server.
    pub fn compile(&self, blr: &[u8]) -> FbResult<Request> {
        Request::compile(Arc::clone(&self.core), blr)
    }

    /// Sets the session idle timeout. Peers too old for native timeouts
    /// get the SQL fallback; if they reject even that, the feature is
    /// reported as unsupported without breaking the session.
    pub fn set_idle_timeout(&self, transaction: &Transaction, seconds: u32) -> FbResult<()> {
        match self.exec_immediate(
            transaction,
            &format!("SET SESSION IDLE TIMEOUT {seconds}"),
        ) {
            Err(FbError::Db { status }) if status.primary_gds() == Some(gds::TOKEN_ERR) => {
                Err(FbError::VersionUnsupported("idle timeout"))
            }
            other => other,
        }
    }

    /// Registers interest in the named events; the callback fires once
    /// with the serialized counts, or once with an empty buffer when the
    /// connection dies first.
    pub fn que_events(
        &self,
        names: &[&str],
        callback: impl FnOnce(Vec<u8>) + Send + 'static,
    ) -> FbResult<crate::conn::events::EventGuard> {
        crate::conn::events::que_events(Arc::clone(&self.core), names, Box::new(callback))
    }

    /// Cancels an event registration by its id. An id without a live
    /// registration on this attachment raises the events-handle error
    /// without touching the wire.
    pub fn cancel_events(&self, rid: i32) -> FbResult<()> {
        crate::conn::events::cancel_registration(&self.core, rid)
    }

    /// Out-of-band cancellation of whatever this attachment is doing.
    pub fn cancel_operation(&self, kind: CancelKind) -> FbResult<()> {
        self.core.port.send_cancel(kind)
    }

    /// Warnings carried by successful responses since the last call.
    pub fn pop_warnings(&self) -> Vec<crate::StatusVector> {
        self.core.port.pop_warnings()
    }

    /// Detaches from the database. A second call is a local no-op and
    /// never touches the wire; on a broken port only client state is
    /// released.
    pub fn detach(&self) -> FbResult<()> {
        release_attachment(&self.core, OpCode::Detach)
    }

    /// Drops the attached database.
    pub fn drop_database(&self) -> FbResult<()> {
        release_attachment(&self.core, OpCode::DropDatabase)
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        if !self.core.detached.load(Ordering::SeqCst) {
            let _ = release_attachment(&self.core, OpCode::Detach);
        }
    }
}

fn release_attachment(core: &AttachCore, op: OpCode) -> FbResult<()> {
    if core.detached.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    let result = if core.port.is_usable() {
        let body = ObjectRef::new(core.id);
        let packet = match op {
            OpCode::DropDatabase => Packet::DropDatabase(body),
            _ => Packet::Detach(body),
        };
        core.port.exchange_response(&packet).map(drop)
    } else {
        // broken connection: releasing is a client-side cleanup only
        Ok(())
    };
    core.port.disconnect();
    result
}

// ---- session establishment ------------------------------------------------

/// Builds the TCP connection and runs version negotiation, the
/// authentication loop and the optional wire-encryption bootstrap.
pub(crate) fn establish(
    params: &ConnectParams,
    operation: OpCode,
    crypt_cb: Option<&CryptKeyCallbackFn>,
) -> FbResult<RemotePort> {
    let port = RemotePort::connect(
        params.kind,
        &params.host,
        params.port,
        params.connect_timeout,
    )?;

    let mut auth = ClientAuthBlock::new(
        &params.user,
        params.password.clone(),
        &params.auth_plugin_list,
    )?;
    let initial = auth.initial_payload()?;

    let mut user_id = ClumpletWriter::untagged();
    user_id
        .insert_str(clumplet::CNCT_LOGIN, &params.user)
        .insert_str(
            clumplet::CNCT_PLUGIN_NAME,
            auth.plugin_name().unwrap_or_default(),
        )
        .insert_str(clumplet::CNCT_PLUGIN_LIST, &auth.plugin_list())
        .insert_chunked(clumplet::CNCT_SPECIFIC_DATA, &initial)
        .insert_bytes(
            clumplet::CNCT_CLIENT_CRYPT,
            &u32::from(params.wire_crypt).to_le_bytes(),
        )
        .insert_str(clumplet::CNCT_USER, &os_user())
        .insert_str(
            clumplet::CNCT_HOST,
            &std::env::var("HOSTNAME").unwrap_or_default(),
        );

    let mut offers: Vec<ProtocolOffer> = SUPPORTED_PROTOCOLS.clone();
    if params.wire_compression {
        for offer in &mut offers {
            if crate::protocol::versions::masked(offer.version) >= 13 {
                offer.max_type |= PFLAG_COMPRESS;
            }
        }
    }

    port.send_packet(&Packet::Connect(crate::protocol::packets::Connect {
        operation,
        connect_version: CONNECT_VERSION,
        architecture: ARCH_GENERIC,
        path: params.database.clone(),
        user_id: user_id.into_bytes(),
        offers,
    }))?;

    match port.receive_packet()? {
        Packet::Accept(accept) => {
            port.apply_accept(accept.version, accept.accept_type)?;
            // legacy acceptance: nothing further to negotiate
        }
        Packet::AcceptData(ad) | Packet::CondAccept(ad) => {
            port.apply_accept(ad.accept.version, ad.accept.accept_type)?;
            if ad.accept.accept_type & PFLAG_COMPRESS != 0 {
                port.enable_compression()?;
            }
            auth.store_server_keys(&ad.keys);
            if ad.authenticated == 0 {
                continue_authentication(&port, &mut auth, &ad.plugin, &ad.data, crypt_cb)?;
            }
        }
        Packet::Response(r) => {
            return Err(login_error(FbError::from_status(r.status)));
        }
        Packet::Reject => {
            return Err(FbError::gds(gds::CONNECT_REJECT));
        }
        other => {
            return Err(FbError::Protocol(format!(
                "connect answered by {:?}",
                other.op()
            )));
        }
    }
    auth.set_complete();

    start_wire_crypt(&port, params, &auth)?;
    Ok(port)
}

/// The multi-round loop: feed server data to the plugin, switch plugins on
/// server demand, answer crypt-key callbacks, stop on the final response.
fn continue_authentication(
    port: &RemotePort,
    auth: &mut ClientAuthBlock,
    server_plugin: &str,
    server_data: &[u8],
    crypt_cb: Option<&CryptKeyCallbackFn>,
) -> FbResult<()> {
    let mut reply = next_auth_data(auth, server_plugin, server_data)?;
    loop {
        port.send_packet(&Packet::ContAuth(ContAuth {
            data: reply,
            name: auth.plugin_name().unwrap_or_default().to_owned(),
            list: auth.plugin_list(),
            keys: Vec::new(),
        }))?;

        match port.receive_packet()? {
            Packet::ContAuth(ca) => {
                auth.store_server_keys(&ca.keys);
                reply = next_auth_data(auth, &ca.name, &ca.data)?;
            }
            Packet::CryptKeyCallback(cc) => {
                let answer = crypt_cb.map(|cb| cb(&cc.data)).unwrap_or_default();
                port.send_packet(&Packet::CryptKeyCallback(CryptKeyCallback {
                    data: answer,
                    reply_len: 0,
                }))?;
                // the awaited auth packet follows the callback exchange
                reply = match port.receive_packet()? {
                    Packet::ContAuth(ca) => {
                        auth.store_server_keys(&ca.keys);
                        next_auth_data(auth, &ca.name, &ca.data)?
                    }
                    Packet::Response(r) => {
                        return if r.status.is_success() {
                            Ok(())
                        } else {
                            Err(login_error(FbError::from_status(r.status)))
                        };
                    }
                    other => {
                        return Err(FbError::Protocol(format!(
                            "authentication interrupted by {:?}",
                            other.op()
                        )));
                    }
                };
            }
            Packet::Response(r) => {
                return if r.status.is_success() {
                    Ok(())
                } else {
                    Err(login_error(FbError::from_status(r.status)))
                };
            }
            other => {
                return Err(FbError::Protocol(format!(
                    "authentication interrupted by {:?}",
                    other.op()
                )));
            }
        }
    }
}

/// Produces the next client payload, honoring a server-demanded plugin
/// switch (validated against our own list).
fn next_auth_data(
    auth: &mut ClientAuthBlock,
    server_plugin: &str,
    server_data: &[u8],
) -> FbResult<Vec<u8>> {
    if !server_plugin.is_empty() && auth.plugin_name() != Some(server_plugin) {
        if !auth.check_plugin_name(server_plugin) {
            return Err(FbError::gds(gds::LOGIN));
        }
        auth.switch_plugin(server_plugin)?;
        return auth.initial_for_current().map_err(login_error);
    }
    auth.process(server_data).map_err(login_error)
}

/// Every non-success exit of the handshake surfaces as the single login
/// error; nothing leaks which plugin rejected what.
fn login_error(e: FbError) -> FbError {
    match e {
        e @ (FbError::Login { .. } | FbError::Net { .. } | FbError::PeerClosed { .. }) => e,
        other => {
            debug!("authentication failed: {other}");
            FbError::gds(gds::LOGIN)
        }
    }
}

/// Attempts the accumulated crypt keys in order; the first one the port
/// accepts becomes the wire-encryption key.
fn start_wire_crypt(
    port: &RemotePort,
    params: &ConnectParams,
    auth: &ClientAuthBlock,
) -> FbResult<()> {
    if !params.wire_crypt || port.protocol() < 13 {
        return Ok(());
    }
    let Some(plugin) = auth
        .offered_ciphers()
        .iter()
        .find(|p| p.as_str() == auth::DEFAULT_CRYPT_PLUGIN)
    else {
        trace!("peer offered no usable wire crypt plugin");
        return Ok(());
    };
    for key in auth.keys() {
        port.send_packet(&Packet::Crypt(Crypt {
            plugin: plugin.clone(),
            key: key.key_type.clone(),
        }))?;
        // the peer enables its side after reading the request; everything
        // from the response on is encrypted
        port.enable_crypt(plugin, &key.key)?;
        let reply = port.receive_packet()?;
        port.expect_response(reply)?;
        debug!("wire encryption active ({plugin})");
        return Ok(());
    }
    Ok(())
}

// ---- parameter blocks -----------------------------------------------------

fn build_dpb(params: &ConnectParams) -> Vec<u8> {
    let mut dpb = ClumpletWriter::new(clumplet::DPB_VERSION1);
    dpb.insert_str(clumplet::DPB_USER_NAME, &params.user)
        .insert_str(clumplet::DPB_LC_CTYPE, &params.charset)
        .insert_str(clumplet::DPB_CLIENT_VERSION, client_version())
        .insert_str(clumplet::DPB_OS_USER, &os_user());
    #[allow(clippy::cast_possible_wrap)]
    dpb.insert_int(clumplet::DPB_PROCESS_ID, std::process::id() as i32);
    if let Ok(exe) = std::env::current_exe() {
        dpb.insert_str(clumplet::DPB_PROCESS_NAME, &exe.to_string_lossy());
    }
    if let Some(role) = &params.role {
        dpb.insert_str(clumplet::DPB_SQL_ROLE_NAME, role);
    }
    if let Some(expected) = &params.expected_db {
        dpb.insert_str(clumplet::DPB_EXPECTED_DB, expected);
    }
    if params.utf8_filename {
        dpb.insert_bytes(clumplet::DPB_UTF8_FILENAME, &[]);
    }
    if let Some(interval) = params.dummy_packet_interval {
        #[allow(clippy::cast_possible_truncation)]
        #[allow(clippy::cast_possible_wrap)]
        dpb.insert_int(
            clumplet::DPB_DUMMY_PACKET_INTERVAL,
            interval.as_secs() as i32,
        );
    }
    dpb.into_bytes()
}

pub(crate) fn client_version() -> &'static str {
    concat!("fbremote ", env!("CARGO_PKG_VERSION"))
}

fn os_user() -> String {
    username::get_user_name().unwrap_or_default()
}

/// Re-emits an info reply, merging locally known lines into the version
/// items so callers see both the server's and this engine's identity.
fn merge_local_info(data: &[u8], cap: usize) -> Vec<u8> {
    let needs_merge = info::InfoWalker::new(data).flatten().any(|item| {
        matches!(
            item.item,
            info::INFO_FIREBIRD_VERSION | info::INFO_VERSION
        )
    });
    if !needs_merge {
        return data.to_vec();
    }

    let mut builder = info::InfoReplyBuilder::new(cap);
    let mut walker = info::InfoWalker::new(data);
    let mut failed = false;
    for item in &mut walker {
        let Ok(item) = item else {
            failed = true;
            break;
        };
        let ok = match item.item {
            info::INFO_FIREBIRD_VERSION | info::INFO_VERSION => builder.append(
                item.item,
                &info::merge_version_line(item.data, client_version()),
            ),
            _ => builder.append(item.item, item.data),
        };
        if !ok {
            break;
        }
    }
    if failed || walker.was_truncated() {
        return data.to_vec();
    }
    builder.finish()
}
