mod test_utils;

use fbremote::Segment;
use fbremote::protocol::clumplet::{ClumpletWriter, BPB_TYPE, BPB_TYPE_SEGMENTED, BPB_VERSION1};
use fbremote::protocol::info;
use fbremote::srv::Backend;
use fbremote::Attachment;

fn segmented_bpb() -> Vec<u8> {
    let mut bpb = ClumpletWriter::new(BPB_VERSION1);
    bpb.insert_int(BPB_TYPE, i32::from(BPB_TYPE_SEGMENTED));
    bpb.into_bytes()
}

// Segment boundaries survive the round trip; a 2^16-1 byte segment is
// representable and 2^16 bytes split across packets.
#[test]
fn blob_round_trip_preserves_segments() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();

    let exact: Vec<u8> = (0..65_535_u32).map(|i| (i % 251) as u8).collect();
    let oversized: Vec<u8> = (0..65_536_u32).map(|i| (i % 13) as u8).collect();

    let blob = tran.create_blob(&segmented_bpb()).unwrap();
    blob.put_segment(b"first segment").unwrap();
    blob.put_segment(&exact).unwrap();
    blob.put_segment(&oversized).unwrap();
    let blob_id = blob.blob_id();
    blob.close().unwrap();

    let read = tran.open_blob(blob_id, &segmented_bpb()).unwrap();
    let mut segments = Vec::new();
    loop {
        match read.get_segment(70_000).unwrap() {
            Segment::Whole(s) => segments.push(s),
            Segment::Fragment(_) => panic!("buffer was large enough"),
            Segment::Eof => break,
        }
    }
    // the oversized segment was split into 65535 + 1 at the wire cap
    assert_eq!(segments.len(), 4);
    assert_eq!(segments[0], b"first segment");
    assert_eq!(segments[1], exact);
    assert_eq!(segments[2], oversized[..65_535]);
    assert_eq!(segments[3], oversized[65_535..]);

    read.close().unwrap();
    tran.commit().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

#[test]
fn oversized_segment_is_delivered_as_fragments() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();

    let blob = tran.create_blob(&segmented_bpb()).unwrap();
    blob.put_segment(&[7_u8; 1_000]).unwrap();
    let blob_id = blob.blob_id();
    blob.close().unwrap();

    let read = tran.open_blob(blob_id, &segmented_bpb()).unwrap();
    let Segment::Fragment(head) = read.get_segment(600).unwrap() else {
        panic!("expected the head fragment");
    };
    assert_eq!(head.len(), 600);
    let Segment::Whole(tail) = read.get_segment(600).unwrap() else {
        panic!("expected the tail");
    };
    assert_eq!(tail.len(), 400);
    assert!(matches!(read.get_segment(600).unwrap(), Segment::Eof));

    read.close().unwrap();
    tran.commit().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

#[test]
fn blob_info_reports_sizes() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let tran = att.start_transaction().unwrap();

    let blob = tran.create_blob(&segmented_bpb()).unwrap();
    blob.put_segment(b"0123456789").unwrap();
    blob.put_segment(b"abc").unwrap();
    let blob_id = blob.blob_id();
    blob.close().unwrap();

    let read = tran.open_blob(blob_id, &segmented_bpb()).unwrap();
    let reply = read
        .info(
            &[
                info::INFO_BLOB_TOTAL_LENGTH,
                info::INFO_BLOB_NUM_SEGMENTS,
                info::INFO_BLOB_MAX_SEGMENT,
                info::INFO_BLOB_TYPE,
                info::INFO_END,
            ],
            256,
        )
        .unwrap();
    assert_eq!(
        info::InfoWalker::find(&reply, info::INFO_BLOB_TOTAL_LENGTH)
            .unwrap()
            .as_int(),
        13
    );
    assert_eq!(
        info::InfoWalker::find(&reply, info::INFO_BLOB_NUM_SEGMENTS)
            .unwrap()
            .as_int(),
        2
    );
    assert_eq!(
        info::InfoWalker::find(&reply, info::INFO_BLOB_MAX_SEGMENT)
            .unwrap()
            .as_int(),
        10
    );
    // the type comes from the BPB the handle was opened with
    assert_eq!(
        info::InfoWalker::find(&reply, info::INFO_BLOB_TYPE)
            .unwrap()
            .as_int(),
        i32::from(BPB_TYPE_SEGMENTED)
    );

    read.close().unwrap();
    tran.commit().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}
