//! Client-side object managers: attachments and everything they own.

pub mod params;

pub(crate) mod attachment;
pub(crate) mod batch;
pub(crate) mod blob;
pub(crate) mod events;
pub(crate) mod request;
pub(crate) mod service;
pub(crate) mod statement;
pub(crate) mod transaction;

pub use crate::protocol::packets::BatchCompletion;
pub use attachment::Attachment;
pub use batch::Batch;
pub use blob::Blob;
pub use events::EventGuard;
pub use params::{ConnectParams, ConnectParamsBuilder, IntoConnectParams, TransportKind};
pub use request::Request;
pub use service::ServiceAttachment;
pub use statement::Statement;
pub use transaction::Transaction;
