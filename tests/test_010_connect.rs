mod test_utils;

use fbremote::protocol::info;
use fbremote::srv::Backend;
use fbremote::Attachment;

// The happy path: connect, authenticate, attach, run a singleton select,
// detach.
#[test]
fn attach_query_detach() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let params = test_utils::params_for(&listener).build().unwrap();
    let att = Attachment::connect(params).unwrap();
    assert!(att.id() > 0, "attachment id must be assigned");
    assert_eq!(att.protocol(), 16, "both sides speak 16");

    // server version string, merged with the locally known client line
    let items = [
        info::INFO_FIREBIRD_VERSION,
        info::INFO_PAGE_SIZE,
        info::INFO_END,
    ];
    let reply = att.info_database(&items, 1_024).unwrap();
    let version = info::InfoWalker::find(&reply, info::INFO_FIREBIRD_VERSION).unwrap();
    let lines = info::parse_version_payload(version.data);
    assert!(lines.len() >= 2, "server line plus client line: {lines:?}");
    assert!(lines[0].contains("memory provider"));
    assert!(lines[1].contains("fbremote"));
    let page = info::InfoWalker::find(&reply, info::INFO_PAGE_SIZE).unwrap();
    assert_eq!(page.as_int(), 8_192);

    att.ping().unwrap();

    let tran = att.start_transaction().unwrap();
    let stmt = att.prepare(&tran, "SELECT 1 FROM RDB$DATABASE").unwrap();
    assert_eq!(stmt.statement_type(), info::STMT_SELECT);

    stmt.execute(&tran, None).unwrap();
    let fmt = stmt.output_format();
    let row = stmt.fetch().unwrap().expect("one row");
    assert_eq!(fmt.field_bytes(&row, 0), 1_i32.to_le_bytes());

    // end of cursor, and the EOF bit is sticky without wire traffic
    assert!(stmt.fetch().unwrap().is_none());
    assert!(stmt.fetch().unwrap().is_none());

    // re-execution resets the cursor
    stmt.execute(&tran, None).unwrap();
    assert!(stmt.fetch().unwrap().is_some());

    drop(stmt);
    tran.commit().unwrap();

    att.detach().unwrap();
    // the second detach is a client-side no-op
    att.detach().unwrap();

    listener.shutdown();
}

#[test]
fn idle_timeout_falls_back_to_sql_and_reports_unsupported() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();
    let err = att.set_idle_timeout(&tran, 60).unwrap_err();
    assert!(
        matches!(err, fbremote::FbError::VersionUnsupported(_)),
        "got {err:?}"
    );
    // the port must remain usable after the failed fallback
    att.ping().unwrap();
    tran.rollback().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

#[test]
fn warnings_do_not_fail_calls() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);
    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    assert!(att.pop_warnings().is_empty());
    att.detach().unwrap();
    listener.shutdown();
}
