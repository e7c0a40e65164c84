use crate::Object;

/// Kind of mutation a watch event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
        }
    }
}

/// Event delivered to watch subscribers, carrying the post-mutation object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: EventType,
    pub object: Object,
}

impl WatchEvent {
    pub fn added(object: Object) -> Self {
        Self {
            event_type: EventType::Added,
            object,
        }
    }

    pub fn modified(object: Object) -> Self {
        Self {
            event_type: EventType::Modified,
            object,
        }
    }

    pub fn deleted(object: Object) -> Self {
        Self {
            event_type: EventType::Deleted,
            object,
        }
    }
}

/// Broadcast unit: the event plus, for modifications, the object as it was
/// before the mutation so filtered watches can detect entering/leaving.
#[derive(Debug, Clone)]
pub(crate) struct EventWrapper {
    pub(crate) ev: WatchEvent,
    pub(crate) old_object: Option<Object>,
}

impl EventWrapper {
    pub(crate) fn new(ev: WatchEvent) -> Self {
        Self {
            ev,
            old_object: None,
        }
    }
}
