mod test_utils;

use fbremote::protocol::packets::sql::DSQL_DROP;
use fbremote::srv::Backend;
use fbremote::Attachment;

// A lazily freed statement rides ahead of the detach, and both responses
// are consumed in order.
#[test]
fn deferred_statement_free_is_flushed_by_detach() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();
    let stmt = att.prepare(&tran, "SELECT 1 FROM RDB$DATABASE").unwrap();
    stmt.execute(&tran, None).unwrap();
    assert!(stmt.fetch().unwrap().is_some());

    // queued, not answered yet
    stmt.free(DSQL_DROP).unwrap();
    drop(stmt);
    tran.commit().unwrap();

    // the commit and detach above can only have succeeded if the deferred
    // free response was consumed first
    att.detach().unwrap();
    listener.shutdown();
}

#[test]
fn deferred_responses_drain_in_fifo_order() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();

    // several lazy packets before one blocking operation
    let first = att.prepare(&tran, "SELECT 1 FROM RDB$DATABASE").unwrap();
    let second = att.prepare(&tran, "SELECT 1 FROM RDB$DATABASE").unwrap();
    first.free(DSQL_DROP).unwrap();
    second.free(DSQL_DROP).unwrap();
    drop(first);
    drop(second);

    // the blocking call still sees its own response
    att.ping().unwrap();

    tran.commit().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}
