mod test_utils;

use fbremote::srv::Backend;
use fbremote::wire::subsys;
use fbremote::{Attachment, FbError};

// The counter-based fault hook (armed via INET_force_error in real runs)
// turns the next transport operation into a network error; the port goes
// broken and releases still clean up client state. One test per file: the
// counter is process-global.
#[test]
fn forced_network_error_breaks_the_port() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    att.ping().unwrap();

    subsys::subsystem().force_error_after(0);
    let err = att.ping().unwrap_err();
    subsys::subsystem().force_error_after(-1);
    assert!(
        matches!(err, FbError::Net { .. } | FbError::PeerClosed { .. }),
        "got {err:?}"
    );

    // the port is broken now; further calls fail without hanging and
    // detach degrades to local cleanup
    assert!(att.ping().is_err());
    att.detach().unwrap();
    listener.shutdown();
}
