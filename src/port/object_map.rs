//! The port's object map: every live object a peer handed a handle for,
//! keyed by its server-assigned id and validated by kind on every lookup.

use crate::conn::blob::BlobCore;
use crate::conn::statement::StatementCore;
use crate::conn::transaction::TransactionCore;
use crate::{gds, FbError, FbResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Callback sink of one event registration; invoked at most once.
pub(crate) type EventCallback = Box<dyn FnOnce(Vec<u8>) + Send>;

/// One `que_events` registration owned by the port until it fires or is
/// cancelled.
pub(crate) struct EventEntry {
    pub rid: i32,
    /// The event parameter buffer as registered, replayed with zero counts
    /// when the server dies before posting.
    pub items: Vec<u8>,
    callback: Mutex<Option<EventCallback>>,
}

impl EventEntry {
    pub fn new(rid: i32, items: Vec<u8>, callback: EventCallback) -> Self {
        Self {
            rid,
            items,
            callback: Mutex::new(Some(callback)),
        }
    }

    /// Delivers the buffer to the sink exactly once; later calls are
    /// no-ops, which is what makes cancel racing a fire safe.
    pub fn fire(&self, data: Vec<u8>) {
        let taken = self.callback.lock().ok().and_then(|mut cb| cb.take());
        if let Some(cb) = taken {
            cb(data);
        }
    }

    /// True once the callback has been consumed.
    pub fn has_fired(&self) -> bool {
        self.callback.lock().map(|cb| cb.is_none()).unwrap_or(true)
    }
}

impl std::fmt::Debug for EventEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "EventEntry(rid={})", self.rid)
    }
}

/// What a map slot holds. Dependent objects are held weakly; the user owns
/// them; event registrations are owned by the port so teardown can still
/// fire them.
#[derive(Debug)]
pub(crate) enum ObjectEntry {
    Statement(Weak<StatementCore>),
    Transaction(Weak<TransactionCore>),
    Blob(Weak<BlobCore>),
    Event(Arc<EventEntry>),
}

#[derive(Debug, Default)]
pub(crate) struct ObjectMap {
    map: HashMap<u32, ObjectEntry>,
}

impl ObjectMap {
    pub fn register(&mut self, id: u32, entry: ObjectEntry) {
        if self.map.insert(id, entry).is_some() {
            warn!("object id {id} re-registered while still mapped");
        }
    }

    pub fn remove(&mut self, id: u32) {
        self.map.remove(&id);
    }

    pub fn statement(&self, id: u32) -> FbResult<Arc<StatementCore>> {
        match self.map.get(&id) {
            Some(ObjectEntry::Statement(weak)) => weak
                .upgrade()
                .ok_or_else(|| FbError::gds(gds::BAD_STMT_HANDLE)),
            _ => Err(FbError::gds(gds::BAD_STMT_HANDLE)),
        }
    }

    pub fn transaction(&self, id: u32) -> FbResult<Arc<TransactionCore>> {
        match self.map.get(&id) {
            Some(ObjectEntry::Transaction(weak)) => weak
                .upgrade()
                .ok_or_else(|| FbError::gds(gds::BAD_TRANS_HANDLE)),
            _ => Err(FbError::gds(gds::BAD_TRANS_HANDLE)),
        }
    }

    pub fn blob(&self, id: u32) -> FbResult<Arc<BlobCore>> {
        match self.map.get(&id) {
            Some(ObjectEntry::Blob(weak)) => weak
                .upgrade()
                .ok_or_else(|| FbError::gds(gds::BAD_SEGSTR_HANDLE)),
            _ => Err(FbError::gds(gds::BAD_SEGSTR_HANDLE)),
        }
    }

    pub fn event_by_rid(&self, rid: i32) -> Option<Arc<EventEntry>> {
        self.map.values().find_map(|entry| match entry {
            ObjectEntry::Event(ev) if ev.rid == rid => Some(Arc::clone(ev)),
            _ => None,
        })
    }

    /// Kind-checked lookup; an id with no live registration is a stale
    /// events handle.
    pub fn event(&self, rid: i32) -> FbResult<Arc<EventEntry>> {
        self.event_by_rid(rid)
            .ok_or_else(|| FbError::gds(gds::BAD_EVENTS_HANDLE))
    }

    /// Removes and returns every event registration; used for the
    /// server-death fire-once-with-zero sweep.
    pub fn drain_events(&mut self) -> Vec<Arc<EventEntry>> {
        let ids: Vec<u32> = self
            .map
            .iter()
            .filter(|(_, e)| matches!(e, ObjectEntry::Event(_)))
            .map(|(id, _)| *id)
            .collect();
        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(ObjectEntry::Event(ev)) = self.map.remove(&id) {
                events.push(ev);
            }
        }
        events
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn event_lookup_is_kind_checked() {
        let mut map = ObjectMap::default();
        let entry = Arc::new(EventEntry::new(7, vec![1], Box::new(|_| {})));
        map.register(
            crate::conn::events::event_key(7),
            ObjectEntry::Event(Arc::clone(&entry)),
        );

        assert!(map.event(7).is_ok());
        let err = map.event(8).unwrap_err();
        assert_eq!(
            err.status().and_then(|s| s.primary_gds()),
            Some(gds::BAD_EVENTS_HANDLE)
        );
        assert!(!entry.has_fired());
        entry.fire(Vec::new());
        assert!(entry.has_fired());
    }
}
