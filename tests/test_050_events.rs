mod test_utils;

use fbremote::protocol::packets::events::parse_epb;
use fbremote::srv::Backend;
use fbremote::Attachment;
use std::sync::mpsc;
use std::time::Duration;

// Registration, one post, exactly one callback with a non-empty buffer;
// no further callbacks after cancellation.
#[test]
fn event_is_delivered_once() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider.clone(), Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();

    let (tx, rx) = mpsc::channel();
    let guard = att
        .que_events(&["E1"], move |buffer| {
            let _ = tx.send(buffer);
        })
        .unwrap();

    // registration is synchronous, the post may take a moment to travel
    assert_eq!(provider.events().post("E1"), 1);
    let buffer = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("event must arrive");
    assert!(!buffer.is_empty(), "posted events carry the counts buffer");
    let counts = parse_epb(&buffer);
    assert_eq!(counts, vec![("E1".to_owned(), 1)]);

    // delivery is one-shot; a second post finds no registration
    assert_eq!(provider.events().post("E1"), 0);
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    guard.cancel().unwrap();
    att.detach().unwrap();
    listener.shutdown();
}

// A registration cancelled before any post fires exactly once with an
// empty buffer.
#[test]
fn cancelled_event_fires_once_with_zero_length() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider.clone(), Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();

    let (tx, rx) = mpsc::channel();
    let guard = att
        .que_events(&["NEVER_POSTED"], move |buffer| {
            let _ = tx.send(buffer);
        })
        .unwrap();
    guard.cancel().unwrap();

    let buffer = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("cancel must fire the callback");
    assert!(buffer.is_empty(), "never-posted events fire with zero length");
    // and only once
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    att.detach().unwrap();
    listener.shutdown();
}

// Cancelling an id that was never registered raises the events-handle
// error and leaves the session usable.
#[test]
fn unknown_event_id_is_a_bad_handle() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();

    let (tx, rx) = mpsc::channel();
    let guard = att
        .que_events(&["E3"], move |buffer| {
            let _ = tx.send(buffer);
        })
        .unwrap();

    let err = att.cancel_events(guard.rid() + 1_000).unwrap_err();
    assert_eq!(
        err.status().and_then(|s| s.primary_gds()),
        Some(fbremote::gds::BAD_EVENTS_HANDLE)
    );

    // the failed cancel touched nothing: the real registration still
    // cancels cleanly and the port keeps working
    att.ping().unwrap();
    guard.cancel().unwrap();
    let buffer = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(buffer.is_empty());

    att.detach().unwrap();
    listener.shutdown();
}

// Tearing the attachment down with a live registration also fires it once
// with zero length ("server gone, retry from scratch").
#[test]
fn teardown_fires_registered_events_with_zero_length() {
    let _log = test_utils::init_logger();
    let provider = test_utils::provider_with_sysdba();
    let listener = test_utils::start_server(provider, Backend::ThreadPerPort);

    let att = Attachment::connect(test_utils::params_for(&listener).build().unwrap()).unwrap();
    let (tx, rx) = mpsc::channel();
    let guard = att
        .que_events(&["E2"], move |buffer| {
            let _ = tx.send(buffer);
        })
        .unwrap();

    att.detach().unwrap();
    let buffer = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("teardown must fire the callback");
    assert!(buffer.is_empty());

    drop(guard);
    listener.shutdown();
}
