//! Byte-level machinery below the packet model: the XDR codec primitives,
//! the TCP transport, the streaming compression filter and the per-process
//! socket subsystem.

pub mod compress;
pub mod subsys;
pub mod transport;
pub mod xdr;

pub use compress::{Inflater, Deflater};
pub use transport::TcpTransport;
pub use xdr::XdrCtx;
