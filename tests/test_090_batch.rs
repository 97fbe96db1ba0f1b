mod test_utils;

use fbremote::protocol::format::FieldType;
use fbremote::protocol::info;
use fbremote::srv::Backend;
use fbremote::{Attachment, Format};

// JDBC-style bulk insert: buffered messages and blob stream, flushed by
// execute, answered by a per-record completion state.
#[test]
fn batch_insert_reports_completion_counts() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let in_format = Format::new(vec![(FieldType::Long, 4, 0, 0)]);
    provider.set_query_result(
        "INSERT INTO T(X) VALUES(?)",
        info::STMT_INSERT,
        in_format.clone(),
        Format::default(),
        Vec::new(),
    );
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();
    let stmt = att.prepare(&tran, "INSERT INTO T(X) VALUES(?)").unwrap();

    let batch = stmt.create_batch(&[]).unwrap();
    for value in [10_i32, 20, 30] {
        let mut msg = in_format.alloc_buffer();
        in_format.set_field_bytes(&mut msg, 0, &value.to_le_bytes());
        batch.add(&msg).unwrap();
    }
    let blob_id = batch
        .add_blob(&[], &[b"blob segment one".as_slice(), b"two".as_slice()])
        .unwrap();
    assert!(blob_id > 0);

    let completion = batch.execute(&tran).unwrap();
    assert_eq!(completion.total, 3);
    assert_eq!(completion.updated, 3);
    assert!(completion.all_ok());

    batch.release().unwrap();
    drop(stmt);
    tran.commit().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

#[test]
fn batch_message_length_is_validated_client_side() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let in_format = Format::new(vec![(FieldType::Long, 4, 0, 0)]);
    provider.set_query_result(
        "INSERT INTO T(X) VALUES(?)",
        info::STMT_INSERT,
        in_format,
        Format::default(),
        Vec::new(),
    );
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();
    let stmt = att.prepare(&tran, "INSERT INTO T(X) VALUES(?)").unwrap();
    let batch = stmt.create_batch(&[]).unwrap();

    assert!(batch.add(&[0_u8; 3]).is_err(), "wrong-sized message");

    batch.release().unwrap();
    drop(stmt);
    tran.rollback().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}
