mod test_utils;

use fbremote::srv::Backend;
use fbremote::{Attachment, CancelKind, FbError};
use std::time::Duration;

// cancel(raise) travels on the aux channel and the next server response
// carries the cancellation error; the statement can still be closed
// afterwards.
#[test]
fn cancel_raise_surfaces_on_the_next_fetch() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();

    // the aux channel comes up with the first registration
    let _guard = att.que_events(&["UNUSED"], |_| {}).unwrap();

    let tran = att.start_transaction().unwrap();
    let stmt = att.prepare(&tran, "SELECT 1 FROM RDB$DATABASE").unwrap();
    stmt.execute(&tran, None).unwrap();

    att.cancel_operation(CancelKind::Raise).unwrap();
    // the one-way packet needs a moment to cross the aux channel
    std::thread::sleep(Duration::from_millis(300));

    let err = stmt.fetch().unwrap_err();
    assert!(matches!(err, FbError::Cancelled { .. }), "got {err:?}");

    // the statement survives in a closeable state
    stmt.close_cursor().unwrap();
    drop(stmt);
    tran.rollback().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

// Advisory disable suppresses a raise.
#[test]
fn cancel_disable_is_honored() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let _guard = att.que_events(&["UNUSED"], |_| {}).unwrap();

    att.cancel_operation(CancelKind::Disable).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    att.cancel_operation(CancelKind::Raise).unwrap();
    std::thread::sleep(Duration::from_millis(300));

    // the raise was ignored; ordinary traffic goes through
    att.ping().unwrap();

    att.cancel_operation(CancelKind::Enable).unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

// After cancel(abort) every outstanding synchronous call fails with a
// network error in bounded time; nothing hangs.
#[test]
fn cancel_abort_severs_the_port() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();

    att.cancel_operation(CancelKind::Abort).unwrap();

    let err = att.ping().unwrap_err();
    assert!(
        matches!(err, FbError::PeerClosed { .. } | FbError::Net { .. }),
        "got {err:?}"
    );

    // releases on the broken port still deallocate client state
    tran.rollback().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}
