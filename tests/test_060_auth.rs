mod test_utils;

use fbremote::srv::{Backend, ListenConfig, Listener, MemoryProvider};
use fbremote::{Attachment, FbError};
use std::sync::Arc;

fn start_with_plugins(provider: Arc<MemoryProvider>, plugins: &str) -> Listener {
    let config = ListenConfig {
        bind: "127.0.0.1:0".to_owned(),
        backend: Backend::ThreadPerPort,
        auth_plugins: plugins.to_owned(),
        ..ListenConfig::default()
    };
    Listener::start(config, provider).unwrap()
}

// Wrong credentials end in a single login error and no attachment.
#[test]
fn wrong_password_is_a_single_login_error() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let mut builder = test_utils::params_for(&listener);
    builder.password("wrong");
    let err = Attachment::connect(builder.build().unwrap()).unwrap_err();
    assert!(matches!(err, FbError::Login { .. }), "got {err:?}");
    listener.shutdown();
}

#[test]
fn unknown_user_fails_the_same_way() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let mut builder = test_utils::params_for(&listener);
    builder.user("NOBODY").password("masterkey");
    let err = Attachment::connect(builder.build().unwrap()).unwrap_err();
    assert!(matches!(err, FbError::Login { .. }), "got {err:?}");
    listener.shutdown();
}

// The server demands a switch when the client's preferred plugin is not
// registered but another list entry is.
#[test]
fn server_demanded_plugin_switch_succeeds() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = start_with_plugins(provider, "Srp");

    let mut builder = test_utils::params_for(&listener);
    builder.auth_plugin_list("Srp256,Srp");
    let att = Attachment::connect(builder.build().unwrap()).unwrap();
    att.ping().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

// No overlap between the plugin lists: one login error, nothing leaked.
#[test]
fn no_common_plugin_is_a_login_error() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = start_with_plugins(provider, "Srp256");

    let mut builder = test_utils::params_for(&listener);
    builder.auth_plugin_list("Srp");
    let err = Attachment::connect(builder.build().unwrap()).unwrap_err();
    assert!(matches!(err, FbError::Login { .. }), "got {err:?}");
    listener.shutdown();
}

// Encryption is negotiated opportunistically out of the auth session key;
// traffic keeps working after the switch.
#[test]
fn wire_crypt_session_stays_usable() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let mut builder = test_utils::params_for(&listener);
    builder.wire_crypt(true);
    let att = Attachment::connect(builder.build().unwrap()).unwrap();
    for _ in 0..3 {
        att.ping().unwrap();
    }
    let tran = att.start_transaction().unwrap();
    let stmt = att.prepare(&tran, "SELECT 1 FROM RDB$DATABASE").unwrap();
    stmt.execute(&tran, None).unwrap();
    assert!(stmt.fetch().unwrap().is_some());
    drop(stmt);
    tran.commit().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}
