//! The multiplexed listener: accept sockets, hand ports to a back-end,
//! keep idle ports alive with dummy packets, and close broken sockets on
//! the next tick rather than immediately.

use crate::conn::TransportKind;
use crate::port::RemotePort;
use crate::srv::provider::Provider;
use crate::srv::session::{SessionConfig, SessionHandler};
use crate::{FbError, FbResult};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How the listener schedules accepted ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// One worker thread per accepted port.
    ThreadPerPort,
    /// A single thread polling the whole port set (Unix only).
    #[cfg(unix)]
    Multiplex,
}

/// Listener configuration.
#[derive(Clone, Debug)]
pub struct ListenConfig {
    /// Bind address, e.g. `127.0.0.1:3050`; port 0 picks an ephemeral one.
    pub bind: String,
    pub backend: Backend,
    /// Plugins the authentication mirror accepts.
    pub auth_plugins: String,
    pub allow_compression: bool,
    /// Idle interval after which a keepalive dummy is written.
    pub dummy_interval: Duration,
    /// IPV6_V6ONLY for v6 binds; None keeps the system default.
    pub ipv6_v6only: Option<bool>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:0".to_owned(),
            backend: Backend::ThreadPerPort,
            auth_plugins: crate::auth::DEFAULT_PLUGIN_LIST.to_owned(),
            allow_compression: true,
            dummy_interval: Duration::from_secs(60),
            ipv6_v6only: None,
        }
    }
}

/// A running listener.
#[derive(Debug)]
pub struct Listener {
    local_addr: std::net::SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Listener {
    pub fn start(config: ListenConfig, provider: Arc<dyn Provider>) -> FbResult<Self> {
        if let Ok(home) = std::env::var("ISC_INET_SERVER_HOME") {
            if let Err(e) = std::env::set_current_dir(&home) {
                warn!("cannot change to server home {home}: {e}");
            }
        }
        let listener = bind(&config)?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        info!("listening on {local_addr} ({:?})", config.backend);

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let backend = config.backend;
        let thread = std::thread::Builder::new()
            .name("fbremote-listener".to_owned())
            .spawn(move || match backend {
                Backend::ThreadPerPort => accept_loop(&listener, &provider, &config, &flag),
                #[cfg(unix)]
                Backend::Multiplex => {
                    multiplex::run(&listener, &provider, &config, &flag);
                }
            })?;
        Ok(Self {
            local_addr,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Stops accepting and winds the listener thread down.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn bind(config: &ListenConfig) -> FbResult<TcpListener> {
    use std::net::ToSocketAddrs;
    let addr = config
        .bind
        .to_socket_addrs()
        .map_err(|e| FbError::ConnParams(e.to_string()))?
        .next()
        .ok_or_else(|| FbError::ConnParams(format!("cannot resolve {}", config.bind)))?;

    if let (true, Some(v6only)) = (addr.is_ipv6(), config.ipv6_v6only) {
        let socket = socket2::Socket::new(
            socket2::Domain::IPV6,
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;
        socket.set_only_v6(v6only)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(64)?;
        return Ok(socket.into());
    }
    Ok(TcpListener::bind(addr)?)
}

fn make_session(
    stream: TcpStream,
    peer: String,
    provider: &Arc<dyn Provider>,
    config: &ListenConfig,
) -> FbResult<SessionHandler> {
    let _ = stream.set_nonblocking(false);
    let port = RemotePort::from_stream(stream, peer, TransportKind::Inet)?;
    port.set_dummy_interval(Some(config.dummy_interval));
    Ok(SessionHandler::new(
        port,
        Arc::clone(provider),
        SessionConfig {
            auth_plugins: config.auth_plugins.clone(),
            allow_compression: config.allow_compression,
        },
    ))
}

// ---- thread-per-port back-end ---------------------------------------------

fn accept_loop(
    listener: &TcpListener,
    provider: &Arc<dyn Provider>,
    config: &ListenConfig,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("accepted {addr}");
                match make_session(stream, addr.to_string(), provider, config) {
                    Ok(mut session) => {
                        let spawned = std::thread::Builder::new()
                            .name(format!("fbremote-port-{addr}"))
                            .spawn(move || session.run());
                        if let Err(e) = spawned {
                            warn!("could not spawn a port thread: {e}");
                        }
                    }
                    Err(e) => warn!("dropping {addr}: {e}"),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                warn!("accept failed: {e}");
                std::thread::sleep(Duration::from_millis(200));
            }
        }
    }
}

// ---- single-threaded poll back-end ----------------------------------------

#[cfg(unix)]
mod multiplex {
    use super::{make_session, Provider, SessionHandler};
    use super::{AtomicBool, Duration, ListenConfig, Ordering, TcpListener};
    use crate::protocol::Packet;
    use std::net::TcpStream;
    use std::os::unix::io::{AsRawFd, RawFd};
    use std::sync::Arc;
    use std::time::Instant;

    /// Wake interval of the poll loop; keepalive bookkeeping runs on this
    /// tick whether or not traffic arrived.
    const TICK: Duration = Duration::from_secs(1);

    struct MuxPort {
        session: SessionHandler,
        fd: RawFd,
    }

    pub(super) fn run(
        listener: &TcpListener,
        provider: &Arc<dyn Provider>,
        config: &ListenConfig,
        shutdown: &AtomicBool,
    ) {
        let mut ports: Vec<MuxPort> = Vec::new();
        let mut deferred_close: Vec<TcpStream> = Vec::new();
        let mut last_scan = Instant::now();

        while !shutdown.load(Ordering::SeqCst) {
            // sockets of ports broken on the previous pass are closed now,
            // one tick later, so accept() cannot recycle the handle while
            // the port object is still being torn down
            deferred_close.clear();

            let mut fds: Vec<libc::pollfd> = Vec::with_capacity(ports.len() + 1);
            fds.push(libc::pollfd {
                fd: listener.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
            for port in &ports {
                fds.push(libc::pollfd {
                    fd: port.fd,
                    events: libc::POLLIN,
                    revents: 0,
                });
            }

            #[allow(clippy::cast_possible_truncation)]
            #[allow(clippy::cast_possible_wrap)]
            // SAFETY: fds points at a live, correctly sized array.
            let rc = unsafe {
                libc::poll(
                    fds.as_mut_ptr(),
                    fds.len() as libc::nfds_t,
                    TICK.as_millis() as libc::c_int,
                )
            };
            if rc < 0 {
                let e = std::io::Error::last_os_error();
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                warn!("poll failed: {e}");
                return;
            }

            if fds[0].revents & libc::POLLIN != 0 {
                accept_ready(listener, provider, config, &mut ports);
            }

            let ready: Vec<RawFd> = fds[1..]
                .iter()
                .filter(|p| p.revents != 0)
                .map(|p| p.fd)
                .collect();
            let mut broken: Vec<RawFd> = Vec::new();
            for fd in ready {
                if let Some(port) = ports.iter_mut().find(|p| p.fd == fd) {
                    match port.session.pump_one() {
                        Ok(true) => {}
                        Ok(false) | Err(_) => broken.push(fd),
                    }
                }
            }
            if !broken.is_empty() {
                let (dead, alive): (Vec<MuxPort>, Vec<MuxPort>) = ports
                    .drain(..)
                    .partition(|p| broken.contains(&p.fd));
                ports = alive;
                for mut port in dead {
                    port.session.teardown();
                    if let Ok(stream) = port
                        .session
                        .port()
                        .with_io(|io| io.transport().shutdown_handle())
                    {
                        deferred_close.push(stream);
                    }
                }
            }

            keepalive_scan(&mut ports, &mut last_scan);
        }
    }

    fn accept_ready(
        listener: &TcpListener,
        provider: &Arc<dyn Provider>,
        config: &ListenConfig,
        ports: &mut Vec<MuxPort>,
    ) {
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    let fd = stream.as_raw_fd();
                    match make_session(stream, addr.to_string(), provider, config) {
                        Ok(session) => ports.push(MuxPort { session, fd }),
                        Err(e) => warn!("dropping {addr}: {e}"),
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!("accept failed: {e}");
                    return;
                }
            }
        }
    }

    /// Subtracts the elapsed wall time from each port's keepalive budget
    /// and writes a dummy packet where it ran out; a socket that fails the
    /// linger probe is dead and gets dropped from the set.
    fn keepalive_scan(ports: &mut Vec<MuxPort>, last_scan: &mut Instant) {
        let elapsed = last_scan.elapsed();
        if elapsed < TICK {
            return;
        }
        *last_scan = Instant::now();

        ports.retain_mut(|port| {
            let remote = port.session.port();
            let Some(interval) = remote.dummy_interval() else {
                return true;
            };
            // undrained decoder output counts as pending data
            let idle = remote
                .with_io(|io| {
                    Ok(if io.has_buffered_input() {
                        Duration::ZERO
                    } else {
                        io.idle_for()
                    })
                })
                .unwrap_or(Duration::ZERO);
            if idle < interval {
                return true;
            }
            if !linger_probe(port.fd) {
                debug!("port {} failed the liveness probe", remote.peer());
                return false;
            }
            match remote.with_io(|io| {
                io.emit_packet(&Packet::Dummy)?;
                io.flush(true)
            }) {
                Ok(()) => true,
                Err(e) => {
                    debug!("keepalive write failed on {}: {e}", remote.peer());
                    false
                }
            }
        });
    }

    /// `getsockopt(SO_LINGER)` failing with ENOTSOCK means the handle no
    /// longer names a socket.
    fn linger_probe(fd: RawFd) -> bool {
        let mut linger = libc::linger {
            l_onoff: 0,
            l_linger: 0,
        };
        #[allow(clippy::cast_possible_truncation)]
        let mut len = std::mem::size_of::<libc::linger>() as libc::socklen_t;
        // SAFETY: out-parameters point at properly sized locals.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                std::ptr::addr_of_mut!(linger).cast(),
                &mut len,
            )
        };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::ENOTSOCK)
    }
}
