//! Per-process socket subsystem state.
//!
//! The subsystem tracks the number of live ports and carries the
//! counter-based fault hook used by test harnesses: when the environment
//! variable `INET_force_error` holds a positive number, that many transport
//! operations succeed and the next one fails with a synthetic I/O error.
//! The hook is part of the test surface, not of the user API.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

#[derive(Debug)]
pub struct SocketSubsystem {
    initialized: AtomicBool,
    live_ports: AtomicUsize,
    force_error: AtomicI64,
}

lazy_static! {
    static ref SUBSYSTEM: SocketSubsystem = SocketSubsystem {
        initialized: AtomicBool::new(false),
        live_ports: AtomicUsize::new(0),
        force_error: AtomicI64::new(-1),
    };
}

pub fn subsystem() -> &'static SocketSubsystem {
    let subsys = &*SUBSYSTEM;
    subsys.init();
    subsys
}

impl SocketSubsystem {
    /// Idempotent; called implicitly the first time any port is created.
    pub fn init(&self) {
        if !self.initialized.swap(true, Ordering::SeqCst) {
            let armed = std::env::var("INET_force_error")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(-1);
            self.force_error.store(armed, Ordering::SeqCst);
            debug!("socket subsystem initialized (fault counter = {armed})");
        }
    }

    /// Releases process-wide state; ports still alive keep working but are
    /// no longer counted.
    pub fn fini(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.live_ports.store(0, Ordering::SeqCst);
    }

    pub fn live_ports(&self) -> usize {
        self.live_ports.load(Ordering::SeqCst)
    }

    pub(crate) fn register_port(&self) {
        self.live_ports.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn unregister_port(&self) {
        let _ = self
            .live_ports
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Re-arms the fault counter; `-1` disarms it.
    pub fn force_error_after(&self, ops: i64) {
        self.force_error.store(ops, Ordering::SeqCst);
    }

    /// Counts down on every transport operation and injects one failure
    /// when the counter strikes zero.
    pub(crate) fn check_fault(&self) -> std::io::Result<()> {
        if self.force_error.load(Ordering::SeqCst) < 0 {
            return Ok(());
        }
        if self.force_error.fetch_sub(1, Ordering::SeqCst) == 0 {
            warn!("injecting forced network error");
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "forced network error",
            ));
        }
        Ok(())
    }
}
