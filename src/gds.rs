//! Status codes and status-vector tag words of the wire protocol.
//!
//! Only the codes the engine itself raises or inspects are listed; server
//! side status vectors are transported verbatim whatever their codes.

/// Terminates a status vector.
pub const ARG_END: i32 = 0;
/// The following word is an engine status code.
pub const ARG_GDS: i32 = 1;
/// The following word is a string argument.
pub const ARG_STRING: i32 = 2;
/// The following word is a counted string argument.
pub const ARG_CSTRING: i32 = 3;
/// The following word is a numeric argument.
pub const ARG_NUMBER: i32 = 4;
/// The following word is pre-interpreted text.
pub const ARG_INTERPRETED: i32 = 5;
/// The following word starts a warning, not an error.
pub const ARG_WARNING: i32 = 18;
/// The following word is an SQLSTATE string.
pub const ARG_SQL_STATE: i32 = 19;

pub const BAD_DB_HANDLE: i32 = 335_544_324;
pub const BAD_DPB_CONTENT: i32 = 335_544_326;
pub const BAD_REQ_HANDLE: i32 = 335_544_328;
pub const BAD_SEGSTR_HANDLE: i32 = 335_544_329;
pub const BAD_TRANS_HANDLE: i32 = 335_544_332;
pub const UNAVAILABLE: i32 = 335_544_375;
pub const WISH_LIST: i32 = 335_544_378;
pub const RANDOM: i32 = 335_544_382;
pub const SEGMENT: i32 = 335_544_366;
pub const SEGSTR_EOF: i32 = 335_544_367;
pub const CONNECT_REJECT: i32 = 335_544_421;
pub const LOGIN: i32 = 335_544_472;
pub const BAD_STMT_HANDLE: i32 = 335_544_485;
pub const TOKEN_ERR: i32 = 335_544_634;
pub const BAD_SVC_HANDLE: i32 = 335_544_559;
pub const BAD_EVENTS_HANDLE: i32 = 335_544_853;
pub const NETWORK_ERROR: i32 = 335_544_721;
pub const NET_CONNECT_ERR: i32 = 335_544_722;
pub const NET_EVENT_CONNECT_ERR: i32 = 335_544_723;
pub const NET_READ_ERR: i32 = 335_544_726;
pub const NET_WRITE_ERR: i32 = 335_544_727;
pub const CANCELLED: i32 = 335_544_794;
pub const ASYNC_ACTIVE: i32 = 335_545_017;

/// Short text for the codes above, used when a status vector is formatted
/// into its user-visible text block.
pub fn text_for(code: i32) -> &'static str {
    match code {
        BAD_DB_HANDLE => "invalid database handle (no active connection)",
        BAD_DPB_CONTENT => "unrecognized database parameter block",
        BAD_REQ_HANDLE => "invalid request handle",
        BAD_SEGSTR_HANDLE => "invalid BLOB handle",
        BAD_TRANS_HANDLE => "invalid transaction handle (expecting explicit transaction start)",
        UNAVAILABLE => "unavailable database",
        WISH_LIST => "feature is not supported",
        RANDOM => "internal error",
        SEGMENT => "segment buffer length shorter than expected",
        SEGSTR_EOF => "attempted retrieval of more segments than exist",
        CONNECT_REJECT => "connection rejected by remote interface",
        LOGIN => "Your user name and password are not defined. \
                  Ask your database administrator to set up a Firebird login.",
        BAD_STMT_HANDLE => "invalid statement handle",
        TOKEN_ERR => "token unknown",
        BAD_SVC_HANDLE => "invalid service handle",
        BAD_EVENTS_HANDLE => "invalid events handle",
        NETWORK_ERROR => "network error",
        NET_CONNECT_ERR => "failed to establish a connection",
        NET_EVENT_CONNECT_ERR => "failed to establish a secondary connection for event processing",
        NET_READ_ERR => "error reading data from the connection",
        NET_WRITE_ERR => "error writing data to the connection",
        CANCELLED => "operation was cancelled",
        ASYNC_ACTIVE => "async operation is in progress",
        _ => "unknown error",
    }
}
