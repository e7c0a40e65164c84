use std::time::Duration;

use tokio::time::timeout;

use crate::Object;
use crate::WatchEvent;
use crate::WatchHandle;

/// Namespaced object with the given resource version.
pub(crate) fn object(
    name: &str,
    namespace: &str,
    rv: u64,
) -> Object {
    Object::new(name).with_namespace(namespace).with_resource_version(rv.to_string())
}

/// Waits up to one second for the next event.
pub(crate) async fn next_event(handle: &mut WatchHandle) -> Option<WatchEvent> {
    timeout(Duration::from_secs(1), handle.recv()).await.ok().flatten()
}

/// Asserts nothing is delivered within a short grace period.
pub(crate) async fn assert_no_event(handle: &mut WatchHandle) {
    if let Ok(Some(ev)) = timeout(Duration::from_millis(50), handle.recv()).await {
        panic!("unexpected event: {:?}", ev);
    }
}

/// Collects `n` events or panics after the per-event timeout.
pub(crate) async fn collect_events(
    handle: &mut WatchHandle,
    n: usize,
) -> Vec<WatchEvent> {
    let mut events = Vec::with_capacity(n);
    for i in 0..n {
        match next_event(handle).await {
            Some(ev) => events.push(ev),
            None => panic!("expected {} events, got {}: {:?}", n, i, events),
        }
    }
    events
}
