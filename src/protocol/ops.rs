//! Operation codes of the remote protocol.

use crate::{FbError, FbResult};

/// Discriminates every packet on the wire.
///
/// The numbers are fixed by the protocol; gaps belong to operations of
/// retired protocol generations that no current peer emits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OpCode {
    Void = 0,
    Connect = 1,
    Exit = 2,
    Accept = 3,
    Reject = 4,
    Disconnect = 6,
    Response = 9,
    Attach = 19,
    Create = 20,
    Detach = 21,
    Compile = 22,
    Start = 23,
    StartAndSend = 24,
    Send = 25,
    Receive = 26,
    Unwind = 27,
    Release = 28,
    Transaction = 29,
    Commit = 30,
    Rollback = 31,
    Prepare = 32,
    Reconnect = 33,
    CreateBlob = 34,
    OpenBlob = 35,
    GetSegment = 36,
    PutSegment = 37,
    CancelBlob = 38,
    CloseBlob = 39,
    InfoDatabase = 40,
    InfoRequest = 41,
    InfoTransaction = 42,
    InfoBlob = 43,
    BatchSegments = 44,
    QueEvents = 48,
    CancelEvents = 49,
    CommitRetaining = 50,
    Prepare2 = 51,
    Event = 52,
    ConnectRequest = 53,
    AuxConnect = 54,
    Ddl = 55,
    OpenBlob2 = 56,
    CreateBlob2 = 57,
    GetSlice = 58,
    PutSlice = 59,
    SliceResponse = 60,
    SeekBlob = 61,
    AllocateStatement = 62,
    Execute = 63,
    ExecImmediate = 64,
    Fetch = 65,
    FetchResponse = 66,
    FreeStatement = 67,
    PrepareStatement = 68,
    SetCursor = 69,
    InfoSql = 70,
    Dummy = 71,
    ResponsePiggyback = 72,
    StartAndReceive = 73,
    StartSendAndReceive = 74,
    ExecImmediate2 = 75,
    Execute2 = 76,
    Insert = 77,
    SqlResponse = 78,
    Transact = 79,
    TransactResponse = 80,
    DropDatabase = 81,
    ServiceAttach = 82,
    ServiceDetach = 83,
    ServiceInfo = 84,
    ServiceStart = 85,
    RollbackRetaining = 86,
    Partial = 89,
    TrustedAuth = 90,
    Cancel = 91,
    ContAuth = 92,
    Ping = 93,
    AcceptData = 94,
    AbortAuxConnection = 95,
    Crypt = 96,
    CryptKeyCallback = 97,
    CondAccept = 98,
    BatchCreate = 99,
    BatchMsg = 100,
    BatchExec = 101,
    BatchRls = 102,
    BatchCs = 103,
    BatchRegblob = 104,
    BatchBlobStream = 105,
    BatchSetBpb = 106,
    BatchCancel = 109,
    BatchSync = 110,
}

impl OpCode {
    pub fn from_i32(val: i32) -> FbResult<Self> {
        Ok(match val {
            0 => Self::Void,
            1 => Self::Connect,
            2 => Self::Exit,
            3 => Self::Accept,
            4 => Self::Reject,
            6 => Self::Disconnect,
            9 => Self::Response,
            19 => Self::Attach,
            20 => Self::Create,
            21 => Self::Detach,
            22 => Self::Compile,
            23 => Self::Start,
            24 => Self::StartAndSend,
            25 => Self::Send,
            26 => Self::Receive,
            27 => Self::Unwind,
            28 => Self::Release,
            29 => Self::Transaction,
            30 => Self::Commit,
            31 => Self::Rollback,
            32 => Self::Prepare,
            33 => Self::Reconnect,
            34 => Self::CreateBlob,
            35 => Self::OpenBlob,
            36 => Self::GetSegment,
            37 => Self::PutSegment,
            38 => Self::CancelBlob,
            39 => Self::CloseBlob,
            40 => Self::InfoDatabase,
            41 => Self::InfoRequest,
            42 => Self::InfoTransaction,
            43 => Self::InfoBlob,
            44 => Self::BatchSegments,
            48 => Self::QueEvents,
            49 => Self::CancelEvents,
            50 => Self::CommitRetaining,
            51 => Self::Prepare2,
            52 => Self::Event,
            53 => Self::ConnectRequest,
            54 => Self::AuxConnect,
            55 => Self::Ddl,
            56 => Self::OpenBlob2,
            57 => Self::CreateBlob2,
            58 => Self::GetSlice,
            59 => Self::PutSlice,
            60 => Self::SliceResponse,
            61 => Self::SeekBlob,
            62 => Self::AllocateStatement,
            63 => Self::Execute,
            64 => Self::ExecImmediate,
            65 => Self::Fetch,
            66 => Self::FetchResponse,
            67 => Self::FreeStatement,
            68 => Self::PrepareStatement,
            69 => Self::SetCursor,
            70 => Self::InfoSql,
            71 => Self::Dummy,
            72 => Self::ResponsePiggyback,
            73 => Self::StartAndReceive,
            74 => Self::StartSendAndReceive,
            75 => Self::ExecImmediate2,
            76 => Self::Execute2,
            77 => Self::Insert,
            78 => Self::SqlResponse,
            79 => Self::Transact,
            80 => Self::TransactResponse,
            81 => Self::DropDatabase,
            82 => Self::ServiceAttach,
            83 => Self::ServiceDetach,
            84 => Self::ServiceInfo,
            85 => Self::ServiceStart,
            86 => Self::RollbackRetaining,
            89 => Self::Partial,
            90 => Self::TrustedAuth,
            91 => Self::Cancel,
            92 => Self::ContAuth,
            93 => Self::Ping,
            94 => Self::AcceptData,
            95 => Self::AbortAuxConnection,
            96 => Self::Crypt,
            97 => Self::CryptKeyCallback,
            98 => Self::CondAccept,
            99 => Self::BatchCreate,
            100 => Self::BatchMsg,
            101 => Self::BatchExec,
            102 => Self::BatchRls,
            103 => Self::BatchCs,
            104 => Self::BatchRegblob,
            105 => Self::BatchBlobStream,
            106 => Self::BatchSetBpb,
            109 => Self::BatchCancel,
            110 => Self::BatchSync,
            unknown => {
                return Err(FbError::Protocol(format!(
                    "unknown operation code {unknown}"
                )));
            }
        })
    }
}
