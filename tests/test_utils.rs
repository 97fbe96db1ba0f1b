// Helpers shared by the loopback integration tests: an in-process server
// over 127.0.0.1 with the in-memory provider, and connection parameters
// pointing at it.
#![allow(dead_code)]

use fbremote::srv::{Backend, ListenConfig, Listener, MemoryProvider};
use fbremote::{ConnectParams, ConnectParamsBuilder};
use std::sync::Arc;

pub fn init_logger() -> Option<flexi_logger::LoggerHandle> {
    flexi_logger::Logger::try_with_env_or_str("info")
        .ok()
        .and_then(|logger| logger.start().ok())
}

pub fn provider_with_sysdba() -> Arc<MemoryProvider> {
    let provider = MemoryProvider::new();
    provider.add_user("SYSDBA", "masterkey");
    Arc::new(provider)
}

pub fn start_server(provider: Arc<MemoryProvider>, backend: Backend) -> Listener {
    let config = ListenConfig {
        bind: "127.0.0.1:0".to_owned(),
        backend,
        ..ListenConfig::default()
    };
    Listener::start(config, provider).expect("listener must start")
}

pub fn params_for(listener: &Listener) -> ConnectParamsBuilder {
    let addr = listener.local_addr();
    let mut builder = ConnectParams::builder();
    builder
        .host("127.0.0.1")
        .port(addr.port())
        .database("employee")
        .user("SYSDBA")
        .password("masterkey");
    builder
}
