mod test_utils;

use fbremote::protocol::format::FieldType;
use fbremote::protocol::info;
use fbremote::srv::Backend;
use fbremote::{Attachment, Format};

// Compiled-request round trips against the echoing provider: messages
// sent under a message number come back in order on receive.
#[test]
fn request_messages_echo_in_order() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();

    let request = att.compile(&[4, 2, 0, 0]).unwrap();
    request.start(&tran).unwrap();
    request.send(&tran, 0, b"message one").unwrap();
    request.send(&tran, 0, b"message two").unwrap();
    request.send(&tran, 1, b"other stream").unwrap();

    let batch = request.receive(&tran, 0, 2).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0], b"message one");
    assert_eq!(batch[1], b"message two");

    let other = request.receive(&tran, 1, 1).unwrap();
    assert_eq!(other[0], b"other stream");

    request.release().unwrap();
    tran.commit().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

#[test]
fn transact_ddl_and_slices() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider.clone(), Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();

    // ddl is dispatched and recorded by the provider
    att.ddl(&tran, b"create-table-blob").unwrap();
    assert_eq!(provider.ddl_log(), vec![b"create-table-blob".to_vec()]);

    // one-shot transact echoes its message when output was asked for
    let out = att.transact(&tran, &[4, 2], b"payload", true).unwrap();
    assert_eq!(out, b"payload");
    let none = att.transact(&tran, &[4, 2], b"payload", false).unwrap();
    assert!(none.is_empty());

    // slices round trip
    let id = tran.put_slice(0, &[1, 2], &[9_u8; 64]).unwrap();
    let back = tran.get_slice(id, &[1, 2], 64).unwrap();
    assert_eq!(back, vec![9_u8; 64]);

    tran.commit().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

// exec_immediate2 binds one parameter message and brings back the
// singleton output row.
#[test]
fn exec_immediate2_binds_parameters_and_returns_a_row() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let in_format = Format::new(vec![(FieldType::Long, 4, 0, 0)]);
    let out_format = Format::new(vec![(FieldType::Long, 4, 0, 0)]);
    let mut row = out_format.alloc_buffer();
    out_format.set_field_bytes(&mut row, 0, &77_i32.to_le_bytes());
    provider.set_query_result(
        "SELECT X FROM T WHERE ID = ?",
        info::STMT_SELECT,
        in_format.clone(),
        out_format.clone(),
        vec![row],
    );
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();

    let mut msg = in_format.alloc_buffer();
    in_format.set_field_bytes(&mut msg, 0, &1_i32.to_le_bytes());
    let out = att
        .exec_immediate2(
            &tran,
            "SELECT X FROM T WHERE ID = ?",
            &in_format,
            Some(&msg),
            &out_format,
        )
        .unwrap()
        .expect("a singleton row");
    assert_eq!(out_format.field_bytes(&out, 0), 77_i32.to_le_bytes());

    // without an output format requested, no row travels
    let none = att
        .exec_immediate2(
            &tran,
            "INSERT INTO T(X) VALUES(1)",
            &Format::default(),
            None,
            &Format::default(),
        )
        .unwrap();
    assert!(none.is_none());

    tran.commit().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

#[test]
fn transaction_variants() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();

    let tran = att.start_transaction().unwrap();
    tran.commit_retaining().unwrap();
    tran.rollback_retaining().unwrap();
    tran.prepare_2pc(b"recovery data").unwrap();
    tran.commit().unwrap();

    let limbo = att.reconnect_transaction(42).unwrap();
    limbo.rollback().unwrap();

    att.detach().unwrap();
    listener.shutdown();
}
