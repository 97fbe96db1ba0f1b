//! A pure-rust engine for the Firebird-style remote database wire protocol.
//!
//! The crate implements both endpoints of the protocol:
//!
//! * the client side: [`Attachment`]s with their dependent transactions,
//!   statements, BLOBs, events, services and batches, talking to a server
//!   over TCP with XDR marshalling, optional zlib wire compression,
//!   multi-round SRP authentication and opportunistic wire encryption;
//! * the server side: a [`srv::Listener`] with interchangeable
//!   thread-per-port and poll-multiplex back-ends, driving per-port
//!   sessions against a [`srv::Provider`] implementation.
//!
//! The engine is synchronous and thread-based; every blocking API reaches
//! the wire through the port's send/receive discipline, and asynchronous
//! traffic (events, cancellation) travels on a dedicated auxiliary port.

#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

mod aux;
mod conn;
mod fb_error;
mod port;
mod util;

pub mod auth;
pub mod gds;
pub mod protocol;
pub mod srv;
pub mod wire;

pub use crate::conn::blob::Segment;
pub use crate::conn::transaction::{Isolation, TransactionBuilder, WaitMode};
pub use crate::conn::{
    Attachment, Batch, BatchCompletion, Blob, ConnectParams, ConnectParamsBuilder, EventGuard,
    IntoConnectParams, Request, ServiceAttachment, Statement, Transaction, TransportKind,
};
pub use crate::fb_error::{FbError, FbResult};
pub use crate::port::CancelKind;
pub use crate::protocol::{Format, StatusVector};

/// Default TCP service name looked up before falling back to [`DEFAULT_PORT`].
pub const DEFAULT_SERVICE: &str = "gds_db";

/// Default TCP port of the remote protocol.
pub const DEFAULT_PORT: u16 = 3050;

/// Default number of rows asked for in a single pipelined fetch round trip.
///
/// The effective batch size also depends on the negotiated output row width
/// and on the transport class; see [`Statement`].
pub const DEFAULT_FETCH_ROWS: usize = 20;

/// Number of bytes buffered locally for outgoing blob segments before a
/// multi-segment batch packet is sent.
pub const BLOB_FLUSH_THRESHOLD: usize = 16_384;

/// Size in bytes of the I/O buffers each port allocates for its inbound and
/// outbound XDR streams.
pub const WIRE_BUFFER_SIZE: usize = 32_768;
