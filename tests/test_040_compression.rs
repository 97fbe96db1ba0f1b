mod test_utils;

use fbremote::protocol::clumplet::{ClumpletWriter, BPB_TYPE, BPB_TYPE_SEGMENTED, BPB_VERSION1};
use fbremote::srv::Backend;
use fbremote::{Attachment, Segment};

fn bpb() -> Vec<u8> {
    let mut bpb = ClumpletWriter::new(BPB_VERSION1);
    bpb.insert_int(BPB_TYPE, i32::from(BPB_TYPE_SEGMENTED));
    bpb.into_bytes()
}

// Compression changes byte counts on the wire, never observable results.
// A 64 KiB blob survives the compressed round trip.
#[test]
fn compressed_connection_round_trips_bulk_data() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let mut builder = test_utils::params_for(&listener);
    builder.wire_compression(true);
    let att = Attachment::connect(builder.build().unwrap()).unwrap();

    // highly compressible bulk payload
    let payload: Vec<u8> = (0..65_536_u32).map(|i| (i / 1_024) as u8).collect();

    let tran = att.start_transaction().unwrap();
    let blob = tran.create_blob(&bpb()).unwrap();
    for chunk in payload.chunks(8_192) {
        blob.put_segment(chunk).unwrap();
    }
    let blob_id = blob.blob_id();
    blob.close().unwrap();

    let read = tran.open_blob(blob_id, &bpb()).unwrap();
    let mut back = Vec::new();
    loop {
        match read.get_segment(16_384).unwrap() {
            Segment::Whole(s) | Segment::Fragment(s) => back.extend_from_slice(&s),
            Segment::Eof => break,
        }
    }
    assert_eq!(back, payload, "decoded blob must equal the sent bytes");

    read.close().unwrap();
    tran.commit().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

// The same API calls behave identically with and without the filter.
#[test]
fn compression_is_transparent_to_queries() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let mut results = Vec::new();
    for compress in [false, true] {
        let mut builder = test_utils::params_for(&listener);
        builder.wire_compression(compress);
        let att = Attachment::connect(builder.build().unwrap()).unwrap();
        let tran = att.start_transaction().unwrap();
        let stmt = att.prepare(&tran, "SELECT 1 FROM RDB$DATABASE").unwrap();
        stmt.execute(&tran, None).unwrap();
        let fmt = stmt.output_format();
        let row = stmt.fetch().unwrap().unwrap();
        results.push(fmt.field_bytes(&row, 0).to_vec());
        drop(stmt);
        tran.commit().unwrap();
        att.detach().unwrap();
    }
    assert_eq!(results[0], results[1]);
    listener.shutdown();
}
