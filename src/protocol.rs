//! The packet model and its supporting codecs: operation codes, protocol
//! version negotiation data, status vectors, parameter-block clumplets,
//! message formats and the info sub-protocol.

pub mod clumplet;
pub mod format;
pub mod info;
pub mod ops;
pub mod packet;
pub mod packets;
pub mod status_vector;
pub mod versions;

pub use format::{FieldDesc, Format};
pub use ops::OpCode;
pub use packet::Packet;
pub use status_vector::{StatusVector, StatusWord};
