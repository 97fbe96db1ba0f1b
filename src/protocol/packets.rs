//! Per-operation packet bodies.
//!
//! Every body is a plain struct with an `emit`/`parse` pair; the dispatch on
//! the operation tag lives in [`super::packet`].

pub mod batch;
pub mod blob;
pub mod events;
pub mod handshake;
pub mod info_rq;
pub mod request;
pub mod response;
pub mod sql;
pub mod transaction;

pub use batch::{
    BatchBlobStream, BatchCompletion, BatchCreate, BatchExec, BatchMsg, BatchRegblob, BatchSetBpb,
    BlobStreamHeader,
};
pub use blob::{BlobOpen, GetSegment, PutSegment, SeekBlob};
pub use events::{Cancel, CancelEvents, ConnectRequest, EventsBody};
pub use handshake::{Accept, AcceptData, Connect, ContAuth, Crypt, CryptKeyCallback, TrustedAuth};
pub use info_rq::{InfoRq, ServiceInfoRq, ServiceStart};
pub use request::{Compile, RequestIo, RequestSend};
pub use response::{FetchResponse, Response, SliceResponse, SqlResponse, TransactResponse};
pub use sql::{
    AllocateStatement, ExecImmediate2, Execute, Execute2, Fetch, FreeStatement, PrepareSql,
    SetCursor,
};
pub use transaction::{
    AttachBody, Ddl, GetSlice, ObjectRef, Prepare2, PutSlice, Reconnect, StartTransaction,
    TransactRq,
};
