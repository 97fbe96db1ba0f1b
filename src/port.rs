//! The port: one endpoint of a protocol connection and its session state
//! machine: buffered XDR I/O through the compression and encryption
//! filters, the deferred-packet FIFO, the pipelined-fetch expectation
//! queue, the object map, and cancellation.

pub(crate) mod object_map;

use crate::auth::wire_crypt::{self, WireCipher};
use crate::conn::TransportKind;
use crate::protocol::packets::events::{CANCEL_ABORT, CANCEL_DISABLE, CANCEL_ENABLE, CANCEL_RAISE};
use crate::protocol::packets::response::{Response, FETCH_NO_MORE, FETCH_OK};
use crate::protocol::versions::{PTYPE_LAZY_SEND, PTYPE_MASK, PTYPE_OUT_OF_BAND};
use crate::protocol::{Format, Packet, StatusVector};
use crate::wire::compress::{Deflater, Inflater};
use crate::wire::transport::TcpTransport;
use crate::wire::xdr::XdrCtx;
use crate::{FbError, FbResult};
use std::collections::VecDeque;
use std::net::TcpStream;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Lifecycle of a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortState {
    /// Established and usable.
    Pending,
    /// A terminal error occured; no further I/O happens.
    Broken,
    /// Orderly shutdown completed.
    Disconnected,
}

/// Cancellation sub-kinds of [`crate::Attachment::cancel_operation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelKind {
    /// Advisory: ignore raise requests until enabled again.
    Disable,
    /// Advisory: honor raise requests again.
    Enable,
    /// Ask the server to abort the running operation; the next response
    /// carries the cancellation error.
    Raise,
    /// Sever the connection immediately.
    Abort,
}

impl CancelKind {
    pub(crate) fn to_wire(self) -> i32 {
        match self {
            Self::Disable => CANCEL_DISABLE,
            Self::Enable => CANCEL_ENABLE,
            Self::Raise => CANCEL_RAISE,
            Self::Abort => CANCEL_ABORT,
        }
    }
}

/// A response the peer owes us, in request order.
#[derive(Debug)]
pub(crate) enum Expected {
    /// A deferred packet's response; the original request is kept so the
    /// outcome can be routed to the owning object.
    Deferred(Packet),
    /// Rows of a pipelined fetch; the statement core is kept alive until
    /// its rows are off the wire.
    Rows {
        stmt: Arc<crate::conn::statement::StatementCore>,
        count: usize,
    },
}

/// Buffered, filtered I/O state of a port. Lives under the port's I/O lock;
/// one synchronous exchange holds the lock from first deferred send to the
/// caller's response.
pub(crate) struct PortIo {
    transport: TcpTransport,
    pub ctx: XdrCtx,
    out_buf: Vec<u8>,
    deflater: Option<Deflater>,
    inflater: Option<Inflater>,
    tx_cipher: Option<Box<dyn WireCipher>>,
    rx_cipher: Option<Box<dyn WireCipher>>,
    /// Unsent deferred packets, flushed ahead of the next real send.
    pub unsent: VecDeque<Packet>,
    /// Responses owed by the peer, consumed ahead of the next real receive.
    pub expected: VecDeque<Expected>,
    pub lazy_send: bool,
    pub oob: bool,
    last_activity: Instant,
}

impl std::fmt::Debug for PortIo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "PortIo(protocol={}, unsent={}, expected={})",
            self.ctx.protocol,
            self.unsent.len(),
            self.expected.len()
        )
    }
}

impl PortIo {
    fn new(transport: TcpTransport) -> Self {
        Self {
            transport,
            ctx: XdrCtx::bootstrap(),
            out_buf: Vec::with_capacity(crate::WIRE_BUFFER_SIZE),
            deflater: None,
            inflater: None,
            tx_cipher: None,
            rx_cipher: None,
            unsent: VecDeque::new(),
            expected: VecDeque::new(),
            lazy_send: false,
            oob: false,
            last_activity: Instant::now(),
        }
    }

    pub fn peer(&self) -> &str {
        self.transport.peer()
    }

    pub fn transport(&mut self) -> &mut TcpTransport {
        &mut self.transport
    }

    /// Encodes a packet into the outbound buffer without flushing.
    pub fn emit_packet(&mut self, packet: &Packet) -> FbResult<()> {
        trace!("emit {:?}", packet.op());
        let ctx = self.ctx;
        packet.emit(&mut self.out_buf, ctx)
    }

    /// Encodes one row message in the given format behind the last packet.
    pub fn emit_row(&mut self, format: &Format, msg: &[u8]) -> FbResult<()> {
        let ctx = self.ctx;
        format.emit_row(&mut self.out_buf, ctx, msg)
    }

    /// Pushes the outbound buffer through the filters to the wire. With
    /// `sync`, the compressor ends on a sync point so the peer can decode
    /// the packet boundary.
    pub fn flush(&mut self, sync: bool) -> FbResult<()> {
        if self.out_buf.is_empty() && !sync {
            return Ok(());
        }
        self.last_activity = Instant::now();
        let buf = std::mem::take(&mut self.out_buf);
        if let Some(deflater) = self.deflater.as_mut() {
            let transport = &mut self.transport;
            let mut tx_cipher = self.tx_cipher.take();
            let result = deflater.run(&buf, sync, &mut |chunk| {
                let mut owned = chunk.to_vec();
                transport_send(transport, &mut owned, &mut tx_cipher)
            });
            self.tx_cipher = tx_cipher;
            result
        } else {
            let mut owned = buf;
            transport_send(&mut self.transport, &mut owned, &mut self.tx_cipher)
        }
    }

    /// Delivers at least one decoded (decrypted, decompressed) byte.
    fn read_decoded(&mut self, buf: &mut [u8]) -> FbResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.last_activity = Instant::now();
        let transport = &mut self.transport;
        let mut rx_cipher = self.rx_cipher.take();
        let result = if let Some(inflater) = self.inflater.as_mut() {
            inflater.read(buf, &mut |raw| {
                let n = transport.recv(raw)?;
                if let Some(cipher) = rx_cipher.as_mut() {
                    cipher.transform(&mut raw[..n]);
                }
                Ok(n)
            })
        } else {
            let n = transport.recv(buf);
            match n {
                Ok(n) => {
                    if let Some(cipher) = rx_cipher.as_mut() {
                        cipher.transform(&mut buf[..n]);
                    }
                    Ok(n)
                }
                Err(e) => Err(e),
            }
        };
        self.rx_cipher = rx_cipher;
        result
    }

    /// Decoded output is buffered in the decompressor and must be consumed
    /// before blocking on the transport again.
    pub fn has_buffered_input(&self) -> bool {
        self.inflater
            .as_ref()
            .map(Inflater::has_pending)
            .unwrap_or(false)
    }

    /// Reads the next packet, transparently swallowing keepalive dummies.
    pub fn receive_packet(&mut self) -> FbResult<Packet> {
        loop {
            let ctx = self.ctx;
            let mut reader = DecodedReader {
                io: self,
                err: None,
            };
            let parsed = Packet::parse(&mut reader, ctx);
            let packet = match parsed {
                Ok(p) => p,
                Err(e) => {
                    return Err(match reader.err.take() {
                        Some(inner) => inner,
                        None => e,
                    });
                }
            };
            match packet {
                Packet::Dummy => {
                    trace!("swallowed keepalive dummy");
                }
                p => return Ok(p),
            }
        }
    }

    /// Reads one row message in the given format.
    pub fn read_row(&mut self, format: &Format) -> FbResult<Vec<u8>> {
        let ctx = self.ctx;
        let mut reader = DecodedReader {
            io: self,
            err: None,
        };
        let parsed = format.parse_row(&mut reader, ctx);
        match parsed {
            Ok(row) => Ok(row),
            Err(e) => Err(match reader.err.take() {
                Some(inner) => inner,
                None => e,
            }),
        }
    }

    pub fn enable_compression(&mut self) {
        debug!("wire compression enabled");
        self.deflater = Some(Deflater::new());
        self.inflater = Some(Inflater::new());
    }

    pub fn enable_crypt(&mut self, plugin: &str, key: &[u8]) -> FbResult<()> {
        debug!("wire encryption enabled via {plugin}");
        self.tx_cipher = Some(wire_crypt::new_cipher(plugin, key)?);
        self.rx_cipher = Some(wire_crypt::new_cipher(plugin, key)?);
        Ok(())
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

fn transport_send(
    transport: &mut TcpTransport,
    bytes: &mut [u8],
    cipher: &mut Option<Box<dyn WireCipher>>,
) -> FbResult<()> {
    if let Some(cipher) = cipher.as_mut() {
        cipher.transform(bytes);
    }
    transport.send(bytes)
}

/// Adapter exposing the decoded byte stream as `std::io::Read` for the
/// packet parsers, preserving the engine error across the trait boundary.
struct DecodedReader<'a> {
    io: &'a mut PortIo,
    err: Option<FbError>,
}

impl std::io::Read for DecodedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.io.read_decoded(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                let msg = e.to_string();
                self.err = Some(e);
                Err(std::io::Error::new(std::io::ErrorKind::Other, msg))
            }
        }
    }
}

/// Feature level and flags agreed at handshake.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Negotiated {
    pub raw_version: u16,
    pub protocol: u16,
    pub accept_type: i32,
    pub oob: bool,
    pub compressed: bool,
    pub encrypted: bool,
}

/// One endpoint of a connection. Cheap to clone; all state is shared.
#[derive(Clone, Debug)]
pub struct RemotePort {
    inner: Arc<PortInner>,
}

#[derive(Debug)]
pub(crate) struct PortInner {
    peer: String,
    kind: TransportKind,
    state: Mutex<PortState>,
    io: Mutex<PortIo>,
    objects: Mutex<object_map::ObjectMap>,
    aux: Mutex<Option<RemotePort>>,
    async_guard: Mutex<()>,
    oob_handle: Mutex<Option<TcpStream>>,
    warnings: Mutex<Vec<StatusVector>>,
    negotiated: Mutex<Negotiated>,
    dummy_interval: Mutex<Option<Duration>>,
}

impl RemotePort {
    pub(crate) fn connect(
        kind: TransportKind,
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
    ) -> FbResult<Self> {
        let transport = TcpTransport::connect(host, port, kind.addr_family()?, connect_timeout)?;
        Self::from_transport(transport, kind)
    }

    pub(crate) fn from_stream(stream: TcpStream, peer: String, kind: TransportKind) -> FbResult<Self> {
        let transport = TcpTransport::from_stream(stream, peer)?;
        Self::from_transport(transport, kind)
    }

    fn from_transport(transport: TcpTransport, kind: TransportKind) -> FbResult<Self> {
        let oob_handle = transport.shutdown_handle().ok();
        let peer = transport.peer().to_owned();
        Ok(Self {
            inner: Arc::new(PortInner {
                peer,
                kind,
                state: Mutex::new(PortState::Pending),
                io: Mutex::new(PortIo::new(transport)),
                objects: Mutex::new(object_map::ObjectMap::default()),
                aux: Mutex::new(None),
                async_guard: Mutex::new(()),
                oob_handle: Mutex::new(oob_handle),
                warnings: Mutex::new(Vec::new()),
                negotiated: Mutex::new(Negotiated::default()),
                dummy_interval: Mutex::new(None),
            }),
        })
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    pub(crate) fn kind(&self) -> TransportKind {
        self.inner.kind
    }

    pub fn state(&self) -> PortState {
        self.inner
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(PortState::Broken)
    }

    pub(crate) fn set_state(&self, state: PortState) {
        if let Ok(mut s) = self.inner.state.lock() {
            *s = state;
        }
    }

    pub(crate) fn mark_broken(&self) {
        self.set_state(PortState::Broken);
    }

    pub fn is_usable(&self) -> bool {
        self.state() == PortState::Pending
    }

    fn check_usable(&self) -> FbResult<()> {
        match self.state() {
            PortState::Pending => Ok(()),
            PortState::Broken | PortState::Disconnected => Err(FbError::PeerClosed {
                peer: self.inner.peer.clone(),
            }),
        }
    }

    /// Runs one I/O step under the port's I/O lock; fatal errors flip the
    /// port to broken.
    pub(crate) fn with_io<T>(&self, f: impl FnOnce(&mut PortIo) -> FbResult<T>) -> FbResult<T> {
        self.check_usable()?;
        let mut io = self.inner.io.lock()?;
        match f(&mut io) {
            Ok(v) => Ok(v),
            Err(e) => {
                if e.is_fatal_for_port() {
                    drop(io);
                    warn!("port {} broken: {e}", self.inner.peer);
                    self.mark_broken();
                }
                Err(e)
            }
        }
    }

    pub(crate) fn objects(&self) -> FbResult<MutexGuard<'_, object_map::ObjectMap>> {
        Ok(self.inner.objects.lock()?)
    }

    // ---- negotiation ----------------------------------------------------

    pub(crate) fn negotiated(&self) -> Negotiated {
        self.inner
            .negotiated
            .lock()
            .map(|n| *n)
            .unwrap_or_default()
    }

    /// The masked protocol version (10..=16), 0 before negotiation.
    pub fn protocol(&self) -> u16 {
        self.negotiated().protocol
    }

    pub(crate) fn apply_accept(&self, raw_version: u16, accept_type: i32) -> FbResult<()> {
        let masked = crate::protocol::versions::masked(raw_version);
        let ptype = accept_type & PTYPE_MASK;
        self.with_io(|io| {
            io.ctx = XdrCtx::with_protocol(masked);
            io.lazy_send = ptype >= PTYPE_LAZY_SEND;
            io.oob = ptype >= PTYPE_OUT_OF_BAND;
            Ok(())
        })?;
        let mut negotiated = self.inner.negotiated.lock()?;
        negotiated.raw_version = raw_version;
        negotiated.protocol = masked;
        negotiated.accept_type = accept_type;
        negotiated.oob = ptype >= PTYPE_OUT_OF_BAND;
        debug!(
            "negotiated protocol {masked} (type {ptype}) with {}",
            self.inner.peer
        );
        Ok(())
    }

    pub(crate) fn enable_compression(&self) -> FbResult<()> {
        self.with_io(|io| {
            io.enable_compression();
            Ok(())
        })?;
        self.inner.negotiated.lock()?.compressed = true;
        Ok(())
    }

    pub(crate) fn enable_crypt(&self, plugin: &str, key: &[u8]) -> FbResult<()> {
        self.with_io(|io| io.enable_crypt(plugin, key))?;
        self.inner.negotiated.lock()?.encrypted = true;
        Ok(())
    }

    pub(crate) fn set_dummy_interval(&self, interval: Option<Duration>) {
        if let Ok(mut slot) = self.inner.dummy_interval.lock() {
            *slot = interval;
        }
    }

    pub(crate) fn dummy_interval(&self) -> Option<Duration> {
        self.inner.dummy_interval.lock().ok().and_then(|s| *s)
    }

    // ---- session discipline ---------------------------------------------

    /// Queues a lazy packet without writing it; it goes out ahead of the
    /// next real send.
    pub(crate) fn defer_unsent(&self, packet: Packet) -> FbResult<()> {
        self.with_io(|io| {
            io.unsent.push_back(packet);
            Ok(())
        })
    }

    /// Writes a lazy packet immediately (without a sync flush) and queues
    /// the expectation of its response. Queued-but-unsent packets go first
    /// so operation order is preserved.
    pub(crate) fn defer_sent(&self, packet: Packet) -> FbResult<()> {
        self.with_io(|io| {
            self.drain_unsent(io)?;
            io.emit_packet(&packet)?;
            io.flush(false)?;
            io.expected.push_back(Expected::Deferred(packet));
            Ok(())
        })
    }

    fn drain_unsent(&self, io: &mut PortIo) -> FbResult<()> {
        while let Some(packet) = io.unsent.pop_front() {
            io.emit_packet(&packet)?;
            io.flush(false)?;
            io.expected.push_back(Expected::Deferred(packet));
        }
        Ok(())
    }

    /// Consumes every response the peer owes ahead of the caller's own, in
    /// FIFO order.
    fn drain_expected(&self, io: &mut PortIo) -> FbResult<()> {
        while let Some(expected) = io.expected.pop_front() {
            match expected {
                Expected::Deferred(request) => self.complete_deferred(io, &request)?,
                Expected::Rows { stmt, count } => self.absorb_rows(io, &stmt, count)?,
            }
        }
        Ok(())
    }

    fn complete_deferred(&self, io: &mut PortIo, request: &Packet) -> FbResult<()> {
        let packet = io.receive_packet()?;
        let outcome = match packet {
            Packet::Response(r) | Packet::ResponsePiggyback(r) => r,
            other => {
                return Err(FbError::Protocol(format!(
                    "deferred {:?} answered by {:?}",
                    request.op(),
                    other.op()
                )));
            }
        };
        let error = if outcome.status.is_success() {
            None
        } else {
            Some(FbError::from_status(outcome.status.clone()))
        };
        match request {
            Packet::FreeStatement(free) => {
                let objects = self.objects()?;
                if let Ok(stmt) = objects.statement(free.statement) {
                    if let Some(e) = error {
                        stmt.save_error(e);
                    }
                }
                drop(objects);
                if free.option == crate::protocol::packets::sql::DSQL_DROP {
                    self.objects()?.remove(free.statement);
                }
            }
            Packet::Execute(exec) => {
                let objects = self.objects()?;
                if let Ok(stmt) = objects.statement(exec.statement) {
                    if let Some(e) = error {
                        stmt.save_error(e);
                    }
                }
            }
            other => {
                if let Some(e) = error {
                    warn!(
                        "deferred {:?} failed with {e}; no object to attach it to",
                        other.op()
                    );
                }
            }
        }
        Ok(())
    }

    fn absorb_rows(
        &self,
        io: &mut PortIo,
        stmt: &crate::conn::statement::StatementCore,
        count: usize,
    ) -> FbResult<()> {
        let format = stmt.out_format();
        let mut received = 0_usize;
        while received < count {
            match io.receive_packet()? {
                Packet::FetchResponse(fr) if fr.status == FETCH_OK => {
                    let row = io.read_row(&format)?;
                    stmt.push_row(row);
                    received += 1;
                }
                Packet::FetchResponse(fr) if fr.status == FETCH_NO_MORE => {
                    stmt.set_eof();
                    break;
                }
                Packet::Response(r) | Packet::ResponsePiggyback(r) => {
                    // the server turned the fetch into an error
                    let err = if r.status.is_success() {
                        FbError::Protocol("fetch answered by plain response".to_owned())
                    } else {
                        FbError::from_status(r.status)
                    };
                    stmt.save_error(err);
                    break;
                }
                other => {
                    return Err(FbError::Protocol(format!(
                        "row stream interrupted by {:?}",
                        other.op()
                    )));
                }
            }
        }
        stmt.note_rows_settled();
        Ok(())
    }

    /// Consumes every outstanding deferred response and pipelined row batch
    /// without sending anything.
    pub(crate) fn settle_expectations(&self) -> FbResult<()> {
        self.with_io(|io| self.drain_expected(io))
    }

    /// A round trip whose request is followed by message rows in the given
    /// format.
    pub(crate) fn exchange_with_rows(
        &self,
        packet: &Packet,
        format: &Format,
        rows: &[&[u8]],
    ) -> FbResult<Packet> {
        self.with_io(|io| {
            self.drain_unsent(io)?;
            io.emit_packet(packet)?;
            for row in rows {
                io.emit_row(format, row)?;
            }
            io.flush(true)?;
            self.drain_expected(io)?;
            io.receive_packet()
        })
    }

    /// Sends a packet right now, after flushing the lazy queue.
    pub(crate) fn send_packet(&self, packet: &Packet) -> FbResult<()> {
        self.with_io(|io| {
            self.drain_unsent(io)?;
            io.emit_packet(packet)?;
            io.flush(true)
        })
    }

    /// Registers the expectation of `count` pipelined row responses.
    pub(crate) fn expect_rows(
        &self,
        stmt: Arc<crate::conn::statement::StatementCore>,
        count: usize,
    ) -> FbResult<()> {
        self.with_io(|io| {
            io.expected.push_back(Expected::Rows { stmt, count });
            Ok(())
        })
    }

    /// Receives the next packet addressed to the caller, after settling the
    /// expectation queue.
    pub(crate) fn receive_packet(&self) -> FbResult<Packet> {
        self.with_io(|io| {
            self.drain_expected(io)?;
            io.receive_packet()
        })
    }

    /// The complete synchronous round trip.
    pub(crate) fn exchange(&self, packet: &Packet) -> FbResult<Packet> {
        self.with_io(|io| {
            self.drain_unsent(io)?;
            io.emit_packet(packet)?;
            io.flush(true)?;
            self.drain_expected(io)?;
            io.receive_packet()
        })
    }

    /// Round trip whose reply must be a plain response; a non-success
    /// status becomes the matching error, warnings are retained.
    pub(crate) fn exchange_response(&self, packet: &Packet) -> FbResult<Response> {
        let reply = self.exchange(packet)?;
        self.expect_response(reply)
    }

    pub(crate) fn expect_response(&self, packet: Packet) -> FbResult<Response> {
        match packet {
            Packet::Response(r) | Packet::ResponsePiggyback(r) => {
                if r.status.is_success() {
                    if r.status.has_warnings() {
                        if let Ok(mut w) = self.inner.warnings.lock() {
                            w.push(r.status.clone());
                        }
                    }
                    Ok(r)
                } else {
                    Err(FbError::from_status(r.status))
                }
            }
            other => Err(FbError::Protocol(format!(
                "expected a response, got {:?}",
                other.op()
            ))),
        }
    }

    /// Warnings that rode on successful responses since the last call.
    pub fn pop_warnings(&self) -> Vec<StatusVector> {
        self.inner
            .warnings
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default()
    }

    // ---- aux port and cancellation ---------------------------------------

    pub(crate) fn set_aux(&self, aux: RemotePort) {
        if let Ok(mut slot) = self.inner.aux.lock() {
            *slot = Some(aux);
        }
    }

    pub(crate) fn aux(&self) -> Option<RemotePort> {
        self.inner.aux.lock().ok().and_then(|a| a.clone())
    }

    /// Writes a packet on the raw socket handle, bypassing the I/O lock.
    ///
    /// Legal only on plain ports (the aux channel), whose reader thread
    /// camps on the I/O lock while cancellations and events must still go
    /// out the other direction.
    pub(crate) fn send_packet_raw(&self, packet: &Packet) -> FbResult<()> {
        let ctx = XdrCtx::with_protocol(self.protocol());
        let mut bytes = Vec::new();
        packet.emit(&mut bytes, ctx)?;
        let guard = self.inner.oob_handle.lock()?;
        let Some(stream) = guard.as_ref() else {
            return Err(FbError::Usage("port has no raw handle"));
        };
        let mut w: &TcpStream = stream;
        std::io::Write::write_all(&mut w, &bytes)
            .map_err(|e| FbError::net(self.peer(), e))
    }

    /// Sends a one-way cancellation. Only one async operation may be in
    /// flight; concurrent attempts fail fast.
    pub(crate) fn send_cancel(&self, kind: CancelKind) -> FbResult<()> {
        if kind == CancelKind::Abort {
            self.abort();
            return Ok(());
        }
        let _guard = self
            .inner
            .async_guard
            .try_lock()
            .map_err(|_| FbError::AsyncActive)?;
        if let Some(aux) = self.aux() {
            let packet = Packet::Cancel(crate::protocol::packets::Cancel {
                kind: kind.to_wire(),
            });
            return aux.send_packet_raw(&packet);
        }
        // no aux channel: fall back to the urgent byte when negotiated.
        // the negotiation snapshot is consulted, never the I/O lock;
        // the call being cancelled may be holding that lock
        if self.negotiated().oob {
            if let Ok(guard) = self.inner.oob_handle.lock() {
                if let Some(stream) = guard.as_ref() {
                    return send_oob_on(stream, self.peer());
                }
            }
        }
        Err(FbError::VersionUnsupported("out-of-queue cancellation"))
    }

    /// Severs the socket; every outstanding call fails with a network
    /// error.
    pub(crate) fn abort(&self) {
        debug!("aborting port {}", self.inner.peer);
        if let Ok(guard) = self.inner.oob_handle.lock() {
            if let Some(stream) = guard.as_ref() {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
        }
        if let Some(aux) = self.aux() {
            aux.abort();
        }
        self.mark_broken();
    }

    /// Orderly shutdown: best-effort disconnect packet, graceful close,
    /// fire-once-with-zero for every still-registered event.
    pub(crate) fn disconnect(&self) {
        if self.is_usable() {
            let _ = self.with_io(|io| {
                io.emit_packet(&Packet::Disconnect)?;
                io.flush(true)
            });
        }
        if let Ok(mut io) = self.inner.io.lock() {
            io.transport().close(true);
        }
        self.set_state(PortState::Disconnected);
        if let Some(aux) = self.aux() {
            // unblock the event thread camping on the aux reader
            aux.set_state(PortState::Disconnected);
            if let Ok(guard) = aux.inner.oob_handle.lock() {
                if let Some(stream) = guard.as_ref() {
                    let _ = stream.shutdown(std::net::Shutdown::Both);
                }
            }
        }
        let events = self
            .inner
            .objects
            .lock()
            .map(|mut o| o.drain_events())
            .unwrap_or_default();
        for event in events {
            event.fire(Vec::new());
        }
    }

    /// Server-death handling driven from the aux listener thread.
    pub(crate) fn on_server_death(&self) {
        warn!("server death detected on {}", self.inner.peer);
        self.mark_broken();
        let events = self
            .inner
            .objects
            .lock()
            .map(|mut o| o.drain_events())
            .unwrap_or_default();
        for event in events {
            event.fire(Vec::new());
        }
    }
}

#[cfg(unix)]
fn send_oob_on(stream: &TcpStream, peer: &str) -> FbResult<()> {
    use std::os::unix::io::AsRawFd;
    let byte = [1_u8];
    // SAFETY: plain send(2) on a socket fd we own.
    let rc = unsafe {
        libc::send(
            stream.as_raw_fd(),
            byte.as_ptr().cast(),
            1,
            libc::MSG_OOB,
        )
    };
    if rc == 1 {
        Ok(())
    } else {
        Err(FbError::net(peer, std::io::Error::last_os_error()))
    }
}

#[cfg(not(unix))]
fn send_oob_on(_stream: &TcpStream, _peer: &str) -> FbResult<()> {
    Err(FbError::VersionUnsupported("out-of-band data"))
}
