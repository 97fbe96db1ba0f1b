//! The server side of the engine: a listener with interchangeable
//! back-ends, per-port protocol sessions, the server half of the
//! authentication handshake, and the [`Provider`] contract to the engine
//! proper (which is an external collaborator; an in-memory implementation
//! ships for tests and demos).

mod listener;
mod memory;
mod provider;
mod session;

pub use listener::{Backend, ListenConfig, Listener};
pub use memory::MemoryProvider;
pub use provider::{
    EventBoard, PreparedStatement, Provider, ServiceSession, Session,
};
pub use session::SessionHandler;
