//! The packet: a discriminated union over every wire operation.
//!
//! Encoding writes the operation tag and dispatches to the arm's body
//! writer; decoding reads the tag and dispatches the matching parser. Bulk
//! payloads (parameter and row messages) are not part of the packet body;
//! they follow it on the stream in the negotiated message format, which only
//! the owning statement knows.

use crate::protocol::ops::OpCode;
use crate::protocol::packets::{
    Accept, AcceptData, AllocateStatement, AttachBody, BatchBlobStream, BatchCompletion,
    BatchCreate, BatchExec, BatchMsg, BatchRegblob, BatchSetBpb, BlobOpen, Cancel, CancelEvents,
    Compile, Connect, ConnectRequest, ContAuth, Crypt, CryptKeyCallback, Ddl, EventsBody,
    ExecImmediate2, Execute, Execute2, Fetch, FetchResponse, FreeStatement, GetSegment, GetSlice,
    InfoRq, ObjectRef, Prepare2, PrepareSql, PutSegment, PutSlice, Reconnect, RequestIo,
    RequestSend, Response, ServiceInfoRq, ServiceStart, SetCursor, SliceResponse, SqlResponse,
    StartTransaction, TransactResponse, TransactRq, TrustedAuth,
};
use crate::wire::xdr::{self, XdrCtx};
use crate::{FbError, FbResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    // handshake
    Connect(Connect),
    Accept(Accept),
    AcceptData(AcceptData),
    CondAccept(AcceptData),
    ContAuth(ContAuth),
    TrustedAuth(TrustedAuth),
    Crypt(Crypt),
    CryptKeyCallback(CryptKeyCallback),

    // responses
    Response(Response),
    ResponsePiggyback(Response),
    FetchResponse(FetchResponse),
    SqlResponse(SqlResponse),
    SliceResponse(SliceResponse),
    TransactResponse(TransactResponse),
    BatchCs(BatchCompletion),

    // attachments and services
    Attach(AttachBody),
    Create(AttachBody),
    ServiceAttach(AttachBody),
    Detach(ObjectRef),
    DropDatabase(ObjectRef),
    ServiceDetach(ObjectRef),
    ServiceInfo(ServiceInfoRq),
    ServiceStart(ServiceStart),

    // transactions
    Transaction(StartTransaction),
    Reconnect(Reconnect),
    Commit(ObjectRef),
    CommitRetaining(ObjectRef),
    Rollback(ObjectRef),
    RollbackRetaining(ObjectRef),
    Prepare(ObjectRef),
    Prepare2(Prepare2),
    Transact(TransactRq),

    // compiled requests
    Compile(Compile),
    Start(RequestIo),
    StartAndReceive(RequestIo),
    Receive(RequestIo),
    Send(RequestSend),
    StartAndSend(RequestSend),
    StartSendAndReceive(RequestSend),
    Insert(RequestSend),
    Unwind(ObjectRef),
    Release(ObjectRef),

    // statements
    AllocateStatement(AllocateStatement),
    PrepareStatement(PrepareSql),
    ExecImmediate(PrepareSql),
    ExecImmediate2(ExecImmediate2),
    Execute(Execute),
    Execute2(Execute2),
    Fetch(Fetch),
    FreeStatement(FreeStatement),
    SetCursor(SetCursor),

    // blobs and slices
    CreateBlob2(BlobOpen),
    OpenBlob2(BlobOpen),
    GetSegment(GetSegment),
    PutSegment(PutSegment),
    BatchSegments(PutSegment),
    SeekBlob(crate::protocol::packets::SeekBlob),
    CancelBlob(ObjectRef),
    CloseBlob(ObjectRef),
    GetSlice(GetSlice),
    PutSlice(PutSlice),

    // info
    InfoDatabase(InfoRq),
    InfoTransaction(InfoRq),
    InfoRequest(InfoRq),
    InfoBlob(InfoRq),
    InfoSql(InfoRq),
    Ddl(Ddl),

    // events, cancellation, aux channel
    QueEvents(EventsBody),
    Event(EventsBody),
    CancelEvents(CancelEvents),
    Cancel(Cancel),
    ConnectRequest(ConnectRequest),

    // batches
    BatchCreate(BatchCreate),
    BatchMsg(BatchMsg),
    BatchExec(BatchExec),
    BatchRls(ObjectRef),
    BatchCancel(ObjectRef),
    BatchSync,
    BatchRegblob(BatchRegblob),
    BatchBlobStream(BatchBlobStream),
    BatchSetBpb(BatchSetBpb),

    // supervision
    Partial,
    Reject,
    Dummy,
    Ping,
    Disconnect,
    Exit,
}

impl Packet {
    /// The operation tag of this packet.
    pub fn op(&self) -> OpCode {
        match self {
            Self::Connect(_) => OpCode::Connect,
            Self::Accept(_) => OpCode::Accept,
            Self::AcceptData(_) => OpCode::AcceptData,
            Self::CondAccept(_) => OpCode::CondAccept,
            Self::ContAuth(_) => OpCode::ContAuth,
            Self::TrustedAuth(_) => OpCode::TrustedAuth,
            Self::Crypt(_) => OpCode::Crypt,
            Self::CryptKeyCallback(_) => OpCode::CryptKeyCallback,
            Self::Response(_) => OpCode::Response,
            Self::ResponsePiggyback(_) => OpCode::ResponsePiggyback,
            Self::FetchResponse(_) => OpCode::FetchResponse,
            Self::SqlResponse(_) => OpCode::SqlResponse,
            Self::SliceResponse(_) => OpCode::SliceResponse,
            Self::TransactResponse(_) => OpCode::TransactResponse,
            Self::BatchCs(_) => OpCode::BatchCs,
            Self::Attach(_) => OpCode::Attach,
            Self::Create(_) => OpCode::Create,
            Self::ServiceAttach(_) => OpCode::ServiceAttach,
            Self::Detach(_) => OpCode::Detach,
            Self::DropDatabase(_) => OpCode::DropDatabase,
            Self::ServiceDetach(_) => OpCode::ServiceDetach,
            Self::ServiceInfo(_) => OpCode::ServiceInfo,
            Self::ServiceStart(_) => OpCode::ServiceStart,
            Self::Transaction(_) => OpCode::Transaction,
            Self::Reconnect(_) => OpCode::Reconnect,
            Self::Commit(_) => OpCode::Commit,
            Self::CommitRetaining(_) => OpCode::CommitRetaining,
            Self::Rollback(_) => OpCode::Rollback,
            Self::RollbackRetaining(_) => OpCode::RollbackRetaining,
            Self::Prepare(_) => OpCode::Prepare,
            Self::Prepare2(_) => OpCode::Prepare2,
            Self::Transact(_) => OpCode::Transact,
            Self::Compile(_) => OpCode::Compile,
            Self::Start(_) => OpCode::Start,
            Self::StartAndReceive(_) => OpCode::StartAndReceive,
            Self::Receive(_) => OpCode::Receive,
            Self::Send(_) => OpCode::Send,
            Self::StartAndSend(_) => OpCode::StartAndSend,
            Self::StartSendAndReceive(_) => OpCode::StartSendAndReceive,
            Self::Insert(_) => OpCode::Insert,
            Self::Unwind(_) => OpCode::Unwind,
            Self::Release(_) => OpCode::Release,
            Self::AllocateStatement(_) => OpCode::AllocateStatement,
            Self::PrepareStatement(_) => OpCode::PrepareStatement,
            Self::ExecImmediate(_) => OpCode::ExecImmediate,
            Self::ExecImmediate2(_) => OpCode::ExecImmediate2,
            Self::Execute(_) => OpCode::Execute,
            Self::Execute2(_) => OpCode::Execute2,
            Self::Fetch(_) => OpCode::Fetch,
            Self::FreeStatement(_) => OpCode::FreeStatement,
            Self::SetCursor(_) => OpCode::SetCursor,
            Self::CreateBlob2(_) => OpCode::CreateBlob2,
            Self::OpenBlob2(_) => OpCode::OpenBlob2,
            Self::GetSegment(_) => OpCode::GetSegment,
            Self::PutSegment(_) => OpCode::PutSegment,
            Self::BatchSegments(_) => OpCode::BatchSegments,
            Self::SeekBlob(_) => OpCode::SeekBlob,
            Self::CancelBlob(_) => OpCode::CancelBlob,
            Self::CloseBlob(_) => OpCode::CloseBlob,
            Self::GetSlice(_) => OpCode::GetSlice,
            Self::PutSlice(_) => OpCode::PutSlice,
            Self::InfoDatabase(_) => OpCode::InfoDatabase,
            Self::InfoTransaction(_) => OpCode::InfoTransaction,
            Self::InfoRequest(_) => OpCode::InfoRequest,
            Self::InfoBlob(_) => OpCode::InfoBlob,
            Self::InfoSql(_) => OpCode::InfoSql,
            Self::Ddl(_) => OpCode::Ddl,
            Self::QueEvents(_) => OpCode::QueEvents,
            Self::Event(_) => OpCode::Event,
            Self::CancelEvents(_) => OpCode::CancelEvents,
            Self::Cancel(_) => OpCode::Cancel,
            Self::ConnectRequest(_) => OpCode::ConnectRequest,
            Self::BatchCreate(_) => OpCode::BatchCreate,
            Self::BatchMsg(_) => OpCode::BatchMsg,
            Self::BatchExec(_) => OpCode::BatchExec,
            Self::BatchRls(_) => OpCode::BatchRls,
            Self::BatchCancel(_) => OpCode::BatchCancel,
            Self::BatchSync => OpCode::BatchSync,
            Self::BatchRegblob(_) => OpCode::BatchRegblob,
            Self::BatchBlobStream(_) => OpCode::BatchBlobStream,
            Self::BatchSetBpb(_) => OpCode::BatchSetBpb,
            Self::Partial => OpCode::Partial,
            Self::Reject => OpCode::Reject,
            Self::Dummy => OpCode::Dummy,
            Self::Ping => OpCode::Ping,
            Self::Disconnect => OpCode::Disconnect,
            Self::Exit => OpCode::Exit,
        }
    }

    pub(crate) fn emit(&self, w: &mut dyn std::io::Write, ctx: XdrCtx) -> FbResult<()> {
        xdr::put_i32(w, self.op() as i32)?;
        match self {
            Self::Connect(body) => body.emit(w, ctx),
            Self::Accept(body) => body.emit(w, ctx),
            Self::AcceptData(body) | Self::CondAccept(body) => body.emit(w, ctx),
            Self::ContAuth(body) => body.emit(w, ctx),
            Self::TrustedAuth(body) => body.emit(w, ctx),
            Self::Crypt(body) => body.emit(w, ctx),
            Self::CryptKeyCallback(body) => body.emit(w, ctx),
            Self::Response(body) | Self::ResponsePiggyback(body) => body.emit(w, ctx),
            Self::FetchResponse(body) => body.emit(w, ctx),
            Self::SqlResponse(body) => body.emit(w, ctx),
            Self::SliceResponse(body) => body.emit(w, ctx),
            Self::TransactResponse(body) => body.emit(w, ctx),
            Self::BatchCs(body) => body.emit(w, ctx),
            Self::Attach(body) | Self::Create(body) | Self::ServiceAttach(body) => {
                body.emit(w, ctx)
            }
            Self::Detach(body)
            | Self::DropDatabase(body)
            | Self::ServiceDetach(body)
            | Self::Commit(body)
            | Self::CommitRetaining(body)
            | Self::Rollback(body)
            | Self::RollbackRetaining(body)
            | Self::Prepare(body)
            | Self::Unwind(body)
            | Self::Release(body)
            | Self::CancelBlob(body)
            | Self::CloseBlob(body)
            | Self::BatchRls(body)
            | Self::BatchCancel(body) => body.emit(w, ctx),
            Self::ServiceInfo(body) => body.emit(w, ctx),
            Self::ServiceStart(body) => body.emit(w, ctx),
            Self::Transaction(body) => body.emit(w, ctx),
            Self::Reconnect(body) => body.emit(w, ctx),
            Self::Prepare2(body) => body.emit(w, ctx),
            Self::Transact(body) => body.emit(w, ctx),
            Self::Compile(body) => body.emit(w, ctx),
            Self::Start(body) | Self::StartAndReceive(body) | Self::Receive(body) => {
                body.emit(w, ctx)
            }
            Self::Send(body)
            | Self::StartAndSend(body)
            | Self::StartSendAndReceive(body)
            | Self::Insert(body) => body.emit(w, ctx),
            Self::AllocateStatement(body) => body.emit(w, ctx),
            Self::PrepareStatement(body) | Self::ExecImmediate(body) => body.emit(w, ctx),
            Self::ExecImmediate2(body) => body.emit(w, ctx),
            Self::Execute(body) => body.emit(w, ctx),
            Self::Execute2(body) => body.emit(w, ctx),
            Self::Fetch(body) => body.emit(w, ctx),
            Self::FreeStatement(body) => body.emit(w, ctx),
            Self::SetCursor(body) => body.emit(w, ctx),
            Self::CreateBlob2(body) | Self::OpenBlob2(body) => body.emit(w, ctx),
            Self::GetSegment(body) => body.emit(w, ctx),
            Self::PutSegment(body) | Self::BatchSegments(body) => body.emit(w, ctx),
            Self::SeekBlob(body) => body.emit(w, ctx),
            Self::GetSlice(body) => body.emit(w, ctx),
            Self::PutSlice(body) => body.emit(w, ctx),
            Self::InfoDatabase(body)
            | Self::InfoTransaction(body)
            | Self::InfoRequest(body)
            | Self::InfoBlob(body)
            | Self::InfoSql(body) => body.emit(w, ctx),
            Self::Ddl(body) => body.emit(w, ctx),
            Self::QueEvents(body) | Self::Event(body) => body.emit(w, ctx),
            Self::CancelEvents(body) => body.emit(w, ctx),
            Self::Cancel(body) => body.emit(w, ctx),
            Self::ConnectRequest(body) => body.emit(w, ctx),
            Self::BatchCreate(body) => body.emit(w, ctx),
            Self::BatchMsg(body) => body.emit(w, ctx),
            Self::BatchExec(body) => body.emit(w, ctx),
            Self::BatchRegblob(body) => body.emit(w, ctx),
            Self::BatchBlobStream(body) => body.emit(w, ctx),
            Self::BatchSetBpb(body) => body.emit(w, ctx),
            Self::BatchSync
            | Self::Partial
            | Self::Reject
            | Self::Dummy
            | Self::Ping
            | Self::Disconnect
            | Self::Exit => Ok(()),
        }
    }

    pub(crate) fn parse(r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        let op = OpCode::from_i32(xdr::get_i32(r)?)?;
        Self::parse_body(op, r, ctx)
    }

    pub(crate) fn parse_body(op: OpCode, r: &mut dyn std::io::Read, ctx: XdrCtx) -> FbResult<Self> {
        Ok(match op {
            OpCode::Connect => Self::Connect(Connect::parse(r, ctx)?),
            OpCode::Accept => Self::Accept(Accept::parse(r, ctx)?),
            OpCode::AcceptData => Self::AcceptData(AcceptData::parse(r, ctx)?),
            OpCode::CondAccept => Self::CondAccept(AcceptData::parse(r, ctx)?),
            OpCode::ContAuth => Self::ContAuth(ContAuth::parse(r, ctx)?),
            OpCode::TrustedAuth => Self::TrustedAuth(TrustedAuth::parse(r, ctx)?),
            OpCode::Crypt => Self::Crypt(Crypt::parse(r, ctx)?),
            OpCode::CryptKeyCallback => Self::CryptKeyCallback(CryptKeyCallback::parse(r, ctx)?),
            OpCode::Response => Self::Response(Response::parse(r, ctx)?),
            OpCode::ResponsePiggyback => Self::ResponsePiggyback(Response::parse(r, ctx)?),
            OpCode::FetchResponse => Self::FetchResponse(FetchResponse::parse(r, ctx)?),
            OpCode::SqlResponse => Self::SqlResponse(SqlResponse::parse(r, ctx)?),
            OpCode::SliceResponse => Self::SliceResponse(SliceResponse::parse(r, ctx)?),
            OpCode::TransactResponse => Self::TransactResponse(TransactResponse::parse(r, ctx)?),
            OpCode::BatchCs => Self::BatchCs(BatchCompletion::parse(r, ctx)?),
            OpCode::Attach => Self::Attach(AttachBody::parse(r, ctx)?),
            OpCode::Create => Self::Create(AttachBody::parse(r, ctx)?),
            OpCode::ServiceAttach => Self::ServiceAttach(AttachBody::parse(r, ctx)?),
            OpCode::Detach => Self::Detach(ObjectRef::parse(r, ctx)?),
            OpCode::DropDatabase => Self::DropDatabase(ObjectRef::parse(r, ctx)?),
            OpCode::ServiceDetach => Self::ServiceDetach(ObjectRef::parse(r, ctx)?),
            OpCode::ServiceInfo => Self::ServiceInfo(ServiceInfoRq::parse(r, ctx)?),
            OpCode::ServiceStart => Self::ServiceStart(ServiceStart::parse(r, ctx)?),
            OpCode::Transaction => Self::Transaction(StartTransaction::parse(r, ctx)?),
            OpCode::Reconnect => Self::Reconnect(Reconnect::parse(r, ctx)?),
            OpCode::Commit => Self::Commit(ObjectRef::parse(r, ctx)?),
            OpCode::CommitRetaining => Self::CommitRetaining(ObjectRef::parse(r, ctx)?),
            OpCode::Rollback => Self::Rollback(ObjectRef::parse(r, ctx)?),
            OpCode::RollbackRetaining => Self::RollbackRetaining(ObjectRef::parse(r, ctx)?),
            OpCode::Prepare => Self::Prepare(ObjectRef::parse(r, ctx)?),
            OpCode::Prepare2 => Self::Prepare2(Prepare2::parse(r, ctx)?),
            OpCode::Transact => Self::Transact(TransactRq::parse(r, ctx)?),
            OpCode::Compile => Self::Compile(Compile::parse(r, ctx)?),
            OpCode::Start => Self::Start(RequestIo::parse(r, ctx)?),
            OpCode::StartAndReceive => Self::StartAndReceive(RequestIo::parse(r, ctx)?),
            OpCode::Receive => Self::Receive(RequestIo::parse(r, ctx)?),
            OpCode::Send => Self::Send(RequestSend::parse(r, ctx)?),
            OpCode::StartAndSend => Self::StartAndSend(RequestSend::parse(r, ctx)?),
            OpCode::StartSendAndReceive => {
                Self::StartSendAndReceive(RequestSend::parse(r, ctx)?)
            }
            OpCode::Insert => Self::Insert(RequestSend::parse(r, ctx)?),
            OpCode::Unwind => Self::Unwind(ObjectRef::parse(r, ctx)?),
            OpCode::Release => Self::Release(ObjectRef::parse(r, ctx)?),
            OpCode::AllocateStatement => {
                Self::AllocateStatement(AllocateStatement::parse(r, ctx)?)
            }
            OpCode::PrepareStatement => Self::PrepareStatement(PrepareSql::parse(r, ctx)?),
            OpCode::ExecImmediate => Self::ExecImmediate(PrepareSql::parse(r, ctx)?),
            OpCode::ExecImmediate2 => Self::ExecImmediate2(ExecImmediate2::parse(r, ctx)?),
            OpCode::Execute => Self::Execute(Execute::parse(r, ctx)?),
            OpCode::Execute2 => Self::Execute2(Execute2::parse(r, ctx)?),
            OpCode::Fetch => Self::Fetch(Fetch::parse(r, ctx)?),
            OpCode::FreeStatement => Self::FreeStatement(FreeStatement::parse(r, ctx)?),
            OpCode::SetCursor => Self::SetCursor(SetCursor::parse(r, ctx)?),
            OpCode::CreateBlob2 => Self::CreateBlob2(BlobOpen::parse(r, ctx)?),
            OpCode::OpenBlob2 => Self::OpenBlob2(BlobOpen::parse(r, ctx)?),
            OpCode::GetSegment => Self::GetSegment(GetSegment::parse(r, ctx)?),
            OpCode::PutSegment => Self::PutSegment(PutSegment::parse(r, ctx)?),
            OpCode::BatchSegments => Self::BatchSegments(PutSegment::parse(r, ctx)?),
            OpCode::SeekBlob => {
                Self::SeekBlob(crate::protocol::packets::SeekBlob::parse(r, ctx)?)
            }
            OpCode::CancelBlob => Self::CancelBlob(ObjectRef::parse(r, ctx)?),
            OpCode::CloseBlob => Self::CloseBlob(ObjectRef::parse(r, ctx)?),
            OpCode::GetSlice => Self::GetSlice(GetSlice::parse(r, ctx)?),
            OpCode::PutSlice => Self::PutSlice(PutSlice::parse(r, ctx)?),
            OpCode::InfoDatabase => Self::InfoDatabase(InfoRq::parse(r, ctx)?),
            OpCode::InfoTransaction => Self::InfoTransaction(InfoRq::parse(r, ctx)?),
            OpCode::InfoRequest => Self::InfoRequest(InfoRq::parse(r, ctx)?),
            OpCode::InfoBlob => Self::InfoBlob(InfoRq::parse(r, ctx)?),
            OpCode::InfoSql => Self::InfoSql(InfoRq::parse(r, ctx)?),
            OpCode::Ddl => Self::Ddl(Ddl::parse(r, ctx)?),
            OpCode::QueEvents => Self::QueEvents(EventsBody::parse(r, ctx)?),
            OpCode::Event => Self::Event(EventsBody::parse(r, ctx)?),
            OpCode::CancelEvents => Self::CancelEvents(CancelEvents::parse(r, ctx)?),
            OpCode::Cancel => Self::Cancel(Cancel::parse(r, ctx)?),
            OpCode::ConnectRequest => Self::ConnectRequest(ConnectRequest::parse(r, ctx)?),
            OpCode::BatchCreate => Self::BatchCreate(BatchCreate::parse(r, ctx)?),
            OpCode::BatchMsg => Self::BatchMsg(BatchMsg::parse(r, ctx)?),
            OpCode::BatchExec => Self::BatchExec(BatchExec::parse(r, ctx)?),
            OpCode::BatchRls => Self::BatchRls(ObjectRef::parse(r, ctx)?),
            OpCode::BatchCancel => Self::BatchCancel(ObjectRef::parse(r, ctx)?),
            OpCode::BatchSync => Self::BatchSync,
            OpCode::BatchRegblob => Self::BatchRegblob(BatchRegblob::parse(r, ctx)?),
            OpCode::BatchBlobStream => Self::BatchBlobStream(BatchBlobStream::parse(r, ctx)?),
            OpCode::BatchSetBpb => Self::BatchSetBpb(BatchSetBpb::parse(r, ctx)?),
            OpCode::Partial => Self::Partial,
            OpCode::Reject => Self::Reject,
            OpCode::Dummy => Self::Dummy,
            OpCode::Ping => Self::Ping,
            OpCode::Disconnect => Self::Disconnect,
            OpCode::Exit => Self::Exit,
            other => {
                return Err(FbError::Protocol(format!(
                    "unexpected operation {other:?} on the wire"
                )));
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::packets::{self, BlobStreamHeader};
    use crate::protocol::status_vector::StatusVector;
    use crate::protocol::versions::SUPPORTED_PROTOCOLS;
    use crate::{gds, DEFAULT_SERVICE};

    fn round_trip(packet: &Packet, ctx: XdrCtx) {
        let mut buf = Vec::new();
        packet.emit(&mut buf, ctx).unwrap();
        let mut rdr = std::io::Cursor::new(&buf);
        let back = Packet::parse(&mut rdr, ctx).unwrap();
        assert_eq!(&back, packet);
        assert_eq!(rdr.position() as usize, buf.len(), "trailing bytes left");
    }

    #[test]
    fn connect_offer_round_trip() {
        assert_eq!(DEFAULT_SERVICE, "gds_db");
        let packet = Packet::Connect(Connect {
            operation: OpCode::Attach,
            connect_version: crate::protocol::versions::CONNECT_VERSION,
            architecture: crate::protocol::versions::ARCH_GENERIC,
            path: "/data/employee.fdb".to_owned(),
            user_id: vec![1, 2, 3, 4, 5],
            offers: SUPPORTED_PROTOCOLS.clone(),
        });
        round_trip(&packet, XdrCtx::bootstrap());
    }

    #[test]
    fn response_with_status_round_trip() {
        let mut status = StatusVector::from_gds(gds::BAD_TRANS_HANDLE);
        status.push_str("stale handle");
        let packet = Packet::Response(Response {
            object: 7,
            blob_id: 0xDEAD_BEEF_0102_0304,
            data: b"info-bytes".to_vec(),
            status,
        });
        round_trip(&packet, XdrCtx::with_protocol(15));
    }

    #[test]
    fn every_arm_survives_a_round_trip() {
        let ctx = XdrCtx::with_protocol(16);
        let object = ObjectRef::new(3);
        let attach = AttachBody {
            object: 0,
            path: "inetdb".to_owned(),
            pb: vec![1, 28, 2, b'A', b'B'],
        };
        let io = RequestIo {
            request: 4,
            incarnation: 0,
            transaction: 2,
            message_number: 1,
            messages: 5,
        };
        let exec = Execute {
            statement: 9,
            transaction: 2,
            format: vec![2, 0],
            message_number: 0,
            messages: 1,
            timeout: 2_500,
        };
        let prepare = PrepareSql {
            transaction: 2,
            statement: 9,
            dialect: 3,
            sql: "SELECT 1 FROM RDB$DATABASE".to_owned(),
            items: vec![21, 4, 5],
            buffer_length: 1_024,
        };
        let mut stream = Vec::new();
        BlobStreamHeader {
            blob_id: 11,
            parameters: vec![],
        }
        .emit(&mut stream);

        let packets = vec![
            Packet::Accept(Accept {
                version: crate::protocol::versions::PROTOCOL_VERSION13,
                architecture: 1,
                accept_type: 5,
            }),
            Packet::CondAccept(AcceptData {
                accept: Accept {
                    version: crate::protocol::versions::PROTOCOL_VERSION15,
                    architecture: 1,
                    accept_type: 0x105,
                },
                data: vec![9, 9, 9],
                plugin: "Srp256".to_owned(),
                authenticated: 0,
                keys: vec![],
            }),
            Packet::ContAuth(ContAuth {
                data: vec![1],
                name: "Srp".to_owned(),
                list: "Srp256,Srp".to_owned(),
                keys: vec![],
            }),
            Packet::TrustedAuth(TrustedAuth { data: vec![5, 6] }),
            Packet::Crypt(Crypt {
                plugin: "Arc4".to_owned(),
                key: "Symmetric".to_owned(),
            }),
            Packet::CryptKeyCallback(CryptKeyCallback {
                data: vec![1, 2],
                reply_len: 64,
            }),
            Packet::ResponsePiggyback(Response::with_object(1)),
            Packet::FetchResponse(FetchResponse {
                status: 0,
                messages: 1,
            }),
            Packet::SqlResponse(SqlResponse { messages: 1 }),
            Packet::SliceResponse(SliceResponse {
                elements: 3,
                data: vec![0_u8; 12],
            }),
            Packet::TransactResponse(TransactResponse {
                messages: 0,
                data: vec![],
            }),
            Packet::BatchCs(BatchCompletion {
                statement: 9,
                total: 3,
                updated: 2,
                errors: vec![(1, StatusVector::from_gds(gds::RANDOM))],
            }),
            Packet::Attach(attach.clone()),
            Packet::Create(attach.clone()),
            Packet::ServiceAttach(attach),
            Packet::Detach(object),
            Packet::DropDatabase(object),
            Packet::ServiceDetach(object),
            Packet::ServiceInfo(ServiceInfoRq {
                object: 1,
                incarnation: 0,
                send_items: vec![],
                recv_items: vec![55],
                buffer_length: 256,
            }),
            Packet::ServiceStart(ServiceStart {
                object: 1,
                spb: vec![2, 105, 3, b'f', b'o', b'o'],
            }),
            Packet::Transaction(StartTransaction {
                database: 0,
                tpb: vec![3, 9, 6],
            }),
            Packet::Reconnect(Reconnect {
                database: 0,
                id: 77_i32.to_le_bytes().to_vec(),
            }),
            Packet::Commit(object),
            Packet::CommitRetaining(object),
            Packet::Rollback(object),
            Packet::RollbackRetaining(object),
            Packet::Prepare(object),
            Packet::Prepare2(Prepare2 {
                transaction: 2,
                data: vec![1, 2, 3],
            }),
            Packet::Transact(TransactRq {
                database: 0,
                transaction: 2,
                blr: vec![4, 5],
                in_msg: vec![6],
                out_expected: 1,
            }),
            Packet::Compile(Compile {
                database: 0,
                blr: vec![1, 2, 3, 4],
            }),
            Packet::Start(io),
            Packet::StartAndReceive(io),
            Packet::Receive(io),
            Packet::Send(RequestSend {
                io,
                data: vec![1, 2, 3],
            }),
            Packet::StartAndSend(RequestSend { io, data: vec![] }),
            Packet::StartSendAndReceive(RequestSend { io, data: vec![9] }),
            Packet::Insert(RequestSend { io, data: vec![8] }),
            Packet::Unwind(object),
            Packet::Release(object),
            Packet::AllocateStatement(AllocateStatement { database: 0 }),
            Packet::PrepareStatement(prepare.clone()),
            Packet::ExecImmediate(prepare.clone()),
            Packet::ExecImmediate2(ExecImmediate2 {
                base: prepare,
                in_format: vec![1, 0],
                in_messages: 1,
                out_format: vec![2, 0],
            }),
            Packet::Execute(exec.clone()),
            Packet::Execute2(Execute2 {
                exec,
                out_format: vec![1],
                out_message_number: 0,
            }),
            Packet::Fetch(Fetch {
                statement: 9,
                format: vec![],
                message_number: 0,
                messages: 20,
            }),
            Packet::FreeStatement(FreeStatement {
                statement: 9,
                option: packets::sql::DSQL_DROP,
            }),
            Packet::SetCursor(SetCursor {
                statement: 9,
                name: "C1".to_owned(),
                cursor_type: 0,
            }),
            Packet::CreateBlob2(BlobOpen {
                transaction: 2,
                id: 0,
                bpb: vec![1, 3, 1, 1],
            }),
            Packet::OpenBlob2(BlobOpen {
                transaction: 2,
                id: 0x55,
                bpb: vec![],
            }),
            Packet::GetSegment(GetSegment {
                blob: 6,
                length: 65_535,
            }),
            Packet::PutSegment(PutSegment {
                blob: 6,
                segments: vec![3, 0, b'a', b'b', b'c'],
            }),
            Packet::BatchSegments(PutSegment {
                blob: 6,
                segments: vec![],
            }),
            Packet::SeekBlob(packets::SeekBlob {
                blob: 6,
                mode: packets::blob::SEEK_FROM_HEAD,
                offset: 128,
            }),
            Packet::CancelBlob(object),
            Packet::CloseBlob(object),
            Packet::GetSlice(GetSlice {
                transaction: 2,
                id: 10,
                sdl: vec![1],
                param: vec![],
                length: 400,
            }),
            Packet::PutSlice(PutSlice {
                transaction: 2,
                id: 10,
                sdl: vec![1],
                param: vec![],
                data: vec![0; 16],
            }),
            Packet::InfoDatabase(InfoRq {
                object: 0,
                incarnation: 0,
                items: vec![12, 11, 1],
                buffer_length: 512,
            }),
            Packet::InfoTransaction(InfoRq {
                object: 2,
                incarnation: 0,
                items: vec![4],
                buffer_length: 64,
            }),
            Packet::InfoRequest(InfoRq {
                object: 4,
                incarnation: 0,
                items: vec![],
                buffer_length: 32,
            }),
            Packet::InfoBlob(InfoRq {
                object: 6,
                incarnation: 0,
                items: vec![4, 5, 6, 7],
                buffer_length: 128,
            }),
            Packet::InfoSql(InfoRq {
                object: 9,
                incarnation: 0,
                items: vec![21],
                buffer_length: 128,
            }),
            Packet::Ddl(Ddl {
                database: 0,
                transaction: 2,
                data: vec![1, 2],
            }),
            Packet::QueEvents(EventsBody {
                database: 0,
                items: packets::events::build_epb(&[("E1", 0)]),
                ast: 0,
                arg: 0,
                rid: 1,
            }),
            Packet::Event(EventsBody {
                database: 0,
                items: packets::events::build_epb(&[("E1", 1)]),
                ast: 0,
                arg: 0,
                rid: 1,
            }),
            Packet::CancelEvents(CancelEvents {
                database: 0,
                rid: 1,
            }),
            Packet::Cancel(Cancel {
                kind: packets::events::CANCEL_RAISE,
            }),
            Packet::ConnectRequest(ConnectRequest {
                req_type: packets::events::REQ_ASYNC,
                object: 0,
                partner: 0,
            }),
            Packet::BatchCreate(BatchCreate {
                statement: 9,
                format: vec![1, 0],
                msg_length: 24,
                pb: vec![],
            }),
            Packet::BatchMsg(BatchMsg {
                statement: 9,
                messages: 2,
                data: vec![0; 48],
            }),
            Packet::BatchExec(BatchExec {
                statement: 9,
                transaction: 2,
            }),
            Packet::BatchRls(object),
            Packet::BatchCancel(object),
            Packet::BatchSync,
            Packet::BatchRegblob(BatchRegblob {
                statement: 9,
                existing_id: 3,
                batch_id: 4,
            }),
            Packet::BatchBlobStream(BatchBlobStream {
                statement: 9,
                data: stream,
            }),
            Packet::BatchSetBpb(BatchSetBpb {
                statement: 9,
                bpb: vec![1],
            }),
            Packet::Partial,
            Packet::Reject,
            Packet::Dummy,
            Packet::Ping,
            Packet::Disconnect,
            Packet::Exit,
        ];
        for packet in &packets {
            round_trip(packet, ctx);
        }
    }

    #[test]
    fn version_gated_fields_stay_off_old_wires() {
        let exec = Execute {
            statement: 1,
            transaction: 1,
            format: vec![],
            message_number: 0,
            messages: 1,
            timeout: 9_000,
        };
        let mut old = Vec::new();
        exec.emit(&mut old, XdrCtx::with_protocol(13)).unwrap();
        let mut new = Vec::new();
        exec.emit(&mut new, XdrCtx::with_protocol(16)).unwrap();
        assert_eq!(new.len(), old.len() + 4);

        let mut rdr = std::io::Cursor::new(old);
        let back = Execute::parse(&mut rdr, XdrCtx::with_protocol(13)).unwrap();
        assert_eq!(back.timeout, 0);
    }
}
