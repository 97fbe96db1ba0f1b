//! Stream-socket transport: byte-level I/O with retry semantics, socket
//! option management, out-of-band delivery and graceful vs forcible close.

use crate::wire::subsys;
use crate::{FbError, FbResult};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

/// Address family restriction derived from the connection string scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddrFamily {
    /// `inet://`: first address the resolver returns, v4 or v6.
    Any,
    /// `inet4://`
    V4,
    /// `inet6://`
    V6,
}

impl AddrFamily {
    fn admits(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

/// One endpoint of a stream connection.
///
/// The reader and writer are cloned handles of the same socket so the two
/// directions can be driven from different locks.
#[derive(Debug)]
pub struct TcpTransport {
    reader: TcpStream,
    writer: TcpStream,
    peer: String,
}

impl TcpTransport {
    pub fn connect(
        host: &str,
        port: u16,
        family: AddrFamily,
        connect_timeout: Option<Duration>,
    ) -> FbResult<Self> {
        use std::net::ToSocketAddrs;

        let peer = format!("{host}:{port}");
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| FbError::net(&peer, e))?
            .filter(|a| family.admits(a))
            .collect();
        if addrs.is_empty() {
            return Err(FbError::net(
                &peer,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no address of the requested family",
                ),
            ));
        }

        let mut last_err = None;
        for addr in &addrs {
            let attempt = match connect_timeout {
                Some(t) => TcpStream::connect_timeout(addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Self::from_stream(stream, peer),
                Err(e) => last_err = Some(e),
            }
        }
        Err(FbError::net(
            &peer,
            last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "connect failed")
            }),
        ))
    }

    /// Wraps an already connected socket (server accept path, aux ports).
    pub fn from_stream(stream: TcpStream, peer: String) -> FbResult<Self> {
        stream.set_nodelay(true).map_err(|e| FbError::net(&peer, e))?;
        let sock = socket2::SockRef::from(&stream);
        sock.set_keepalive(true).map_err(|e| FbError::net(&peer, e))?;
        let writer = stream.try_clone().map_err(|e| FbError::net(&peer, e))?;
        subsys::subsystem().register_port();
        Ok(Self {
            reader: stream,
            writer,
            peer,
        })
    }

    /// The peer identity carried into every network error message.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn local_addr(&self) -> FbResult<SocketAddr> {
        self.reader
            .local_addr()
            .map_err(|e| FbError::net(&self.peer, e))
    }

    pub fn peer_addr(&self) -> FbResult<SocketAddr> {
        self.reader
            .peer_addr()
            .map_err(|e| FbError::net(&self.peer, e))
    }

    /// Writes all bytes or fails; transient `EINTR`/`EAGAIN` conditions are
    /// retried.
    pub fn send(&mut self, mut bytes: &[u8]) -> FbResult<()> {
        subsys::subsystem()
            .check_fault()
            .map_err(|e| FbError::net(&self.peer, e))?;
        while !bytes.is_empty() {
            match self.writer.write(bytes) {
                Ok(0) => {
                    return Err(FbError::PeerClosed {
                        peer: self.peer.clone(),
                    });
                }
                Ok(n) => bytes = &bytes[n..],
                Err(e) if retryable(&e) => continue,
                Err(e) => return Err(FbError::net(&self.peer, e)),
            }
        }
        Ok(())
    }

    /// Returns at least one byte or fails; an orderly close by the peer is
    /// reported as [`FbError::PeerClosed`].
    pub fn recv(&mut self, buf: &mut [u8]) -> FbResult<usize> {
        subsys::subsystem()
            .check_fault()
            .map_err(|e| FbError::net(&self.peer, e))?;
        loop {
            match self.reader.read(buf) {
                Ok(0) => {
                    return Err(FbError::PeerClosed {
                        peer: self.peer.clone(),
                    });
                }
                Ok(n) => return Ok(n),
                Err(e) if retryable(&e) => continue,
                Err(e) => return Err(FbError::net(&self.peer, e)),
            }
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> FbResult<()> {
        self.reader
            .set_read_timeout(timeout)
            .map_err(|e| FbError::net(&self.peer, e))
    }

    /// A third handle on the socket, used by the cancel path to sever the
    /// connection without taking the I/O locks.
    pub fn shutdown_handle(&self) -> FbResult<TcpStream> {
        self.reader
            .try_clone()
            .map_err(|e| FbError::net(&self.peer, e))
    }

    /// Single urgent byte used for out-of-band cancellation.
    #[cfg(unix)]
    pub fn send_oob(&self, byte: u8) -> FbResult<()> {
        use std::os::unix::io::AsRawFd;
        let buf = [byte];
        // SAFETY: plain send(2) on a socket fd we own.
        let rc = unsafe {
            libc::send(
                self.writer.as_raw_fd(),
                buf.as_ptr().cast(),
                1,
                libc::MSG_OOB,
            )
        };
        if rc == 1 {
            Ok(())
        } else {
            Err(FbError::net(&self.peer, std::io::Error::last_os_error()))
        }
    }

    #[cfg(not(unix))]
    pub fn send_oob(&self, _byte: u8) -> FbResult<()> {
        Err(FbError::VersionUnsupported("out-of-band data"))
    }

    /// Graceful close honors the configured linger; a forcible close resets
    /// the connection so the peer fails fast.
    pub fn close(&mut self, graceful: bool) {
        let sock = socket2::SockRef::from(&self.writer);
        if graceful {
            let _ = self.writer.flush();
        } else {
            let _ = sock.set_linger(Some(Duration::from_secs(0)));
        }
        let _ = self.reader.shutdown(Shutdown::Both);
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        subsys::subsystem().unregister_port();
    }
}

fn retryable(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
    )
}
