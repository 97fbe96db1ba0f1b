// The single-threaded poll back-end serves the same protocol as the
// thread-per-port one.
#![cfg(unix)]

mod test_utils;

use fbremote::srv::Backend;
use fbremote::Attachment;

#[test]
fn multiplex_backend_serves_sessions() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::Multiplex);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    att.ping().unwrap();

    let tran = att.start_transaction().unwrap();
    let stmt = att.prepare(&tran, "SELECT 1 FROM RDB$DATABASE").unwrap();
    stmt.execute(&tran, None).unwrap();
    let fmt = stmt.output_format();
    let row = stmt.fetch().unwrap().unwrap();
    assert_eq!(fmt.field_bytes(&row, 0), 1_i32.to_le_bytes());
    drop(stmt);
    tran.commit().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

#[test]
fn multiplex_backend_serves_two_ports() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::Multiplex);

    let first =
        Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let second =
        Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    first.ping().unwrap();
    second.ping().unwrap();
    first.detach().unwrap();
    second.ping().unwrap();
    second.detach().unwrap();
    listener.shutdown();
}
