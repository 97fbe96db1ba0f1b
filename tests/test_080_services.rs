mod test_utils;

use fbremote::protocol::clumplet::{ClumpletWriter, SPB_COMMAND_LINE, SPB_DBNAME};
use fbremote::protocol::info;
use fbremote::srv::Backend;
use fbremote::ServiceAttachment;

// The service manager is a near-mirror of an attachment, over the SPB tag
// set.
#[test]
fn service_attach_query_start_detach() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let mut builder = test_utils::params_for(&listener);
    builder.database("service_mgr");
    let svc = ServiceAttachment::connect(builder.build().unwrap()).unwrap();
    assert!(svc.id() > 0);

    let reply = svc
        .query(
            &[],
            &[
                info::INFO_SVC_VERSION,
                info::INFO_SVC_SERVER_VERSION,
                info::INFO_END,
            ],
            512,
        )
        .unwrap();
    let version = info::InfoWalker::find(&reply, info::INFO_SVC_VERSION).unwrap();
    assert_eq!(version.as_int(), 2);
    let server = info::InfoWalker::find(&reply, info::INFO_SVC_SERVER_VERSION).unwrap();
    assert!(!server.data.is_empty());

    // a backup-style action invocation
    let mut action = ClumpletWriter::untagged();
    action.insert_str(SPB_DBNAME, "employee");
    action.insert_str(SPB_COMMAND_LINE, "backup");
    svc.start(action.as_bytes()).unwrap();

    svc.detach().unwrap();
    // second detach is a local no-op
    svc.detach().unwrap();
    listener.shutdown();
}
