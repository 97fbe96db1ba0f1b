//! Client-side event registration.

use crate::conn::attachment::AttachCore;
use crate::port::object_map::{EventCallback, EventEntry, ObjectEntry};
use crate::protocol::packets::events::build_epb;
use crate::protocol::packets::{CancelEvents, EventsBody};
use crate::protocol::Packet;
use crate::{gds, FbResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Event registrations live in the high key range of the object map so
/// client-assigned ids never collide with server-assigned handles.
const EVENT_KEY_BASE: u32 = 0x8000_0000;

#[allow(clippy::cast_sign_loss)]
pub(crate) fn event_key(rid: i32) -> u32 {
    EVENT_KEY_BASE | rid as u32
}

pub(crate) fn que_events(
    att: Arc<AttachCore>,
    names: &[&str],
    callback: EventCallback,
) -> FbResult<EventGuard> {
    crate::aux::ensure_aux(&att)?;

    let rid = att.next_rid.fetch_add(1, Ordering::SeqCst);
    let pairs: Vec<(&str, u32)> = names.iter().map(|n| (*n, 0)).collect();
    let epb = build_epb(&pairs);
    let entry = Arc::new(EventEntry::new(rid, epb.clone(), callback));
    att.port
        .objects()?
        .register(event_key(rid), ObjectEntry::Event(Arc::clone(&entry)));

    let registered = att.port.exchange_response(&Packet::QueEvents(EventsBody {
        database: att.id,
        items: epb,
        ast: 0,
        arg: 0,
        rid,
    }));
    if let Err(e) = registered {
        att.port.objects()?.remove(event_key(rid));
        return Err(e);
    }

    Ok(EventGuard {
        att,
        entry,
        rid,
        cancelled: AtomicBool::new(false),
    })
}

/// Cancels a registration by id. The id is validated against the port's
/// object map first; an id with no live registration raises the
/// events-handle error without touching the wire. A registration that is
/// cancelled before it ever fired runs its callback exactly once with an
/// empty buffer.
pub(crate) fn cancel_registration(att: &AttachCore, rid: i32) -> FbResult<()> {
    let entry = att.port.objects()?.event(rid)?;
    let result = if att.port.is_usable() {
        att.port
            .exchange_response(&Packet::CancelEvents(CancelEvents {
                database: att.id,
                rid,
            }))
            .map(drop)
    } else {
        Ok(())
    };
    if let Ok(mut objects) = att.port.objects() {
        objects.remove(event_key(rid));
    }
    entry.fire(Vec::new());
    result
}

/// Handle on one event registration; dropping it cancels the
/// registration.
pub struct EventGuard {
    att: Arc<AttachCore>,
    entry: Arc<EventEntry>,
    rid: i32,
    cancelled: AtomicBool,
}

impl std::fmt::Debug for EventGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "EventGuard(rid={})", self.rid)
    }
}

impl EventGuard {
    /// The registration id, as known to both sides of the connection.
    pub fn rid(&self) -> i32 {
        self.rid
    }

    /// Cancels the registration. If the event never fired, the callback
    /// runs exactly once with an empty buffer; if it already fired (or a
    /// cancel raced the fire), nothing further happens.
    pub fn cancel(&self) -> FbResult<()> {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match cancel_registration(&self.att, self.rid) {
            // delivery already consumed the registration; there is nothing
            // left to cancel and that is not an error for the holder
            Err(e)
                if self.entry.has_fired()
                    && e.status().and_then(|s| s.primary_gds())
                        == Some(gds::BAD_EVENTS_HANDLE) =>
            {
                Ok(())
            }
            other => other,
        }
    }
}

impl Drop for EventGuard {
    fn drop(&mut self) {
        let _ = self.cancel();
    }
}
