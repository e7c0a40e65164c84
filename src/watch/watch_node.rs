//! Per-subscriber pipeline: positional filters (resume cursor, namespace),
//! predicate filtering with enter/leave rewriting, and the worker task that
//! moves events from the inbound queue to the subscriber.

use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::trace;

use super::EventType;
use super::EventWrapper;
use super::NodeEntry;
use super::WatchEvent;
use super::WatchSet;
use crate::metrics::WATCH_EVENTS_SENT;
use crate::Predicate;
use crate::Result;
use crate::WatchError;

/// State shared between the broadcaster and the node worker.
#[derive(Debug, Default)]
pub(crate) struct NodeState {
    /// Events broadcast after registration but before the worker began draining
    pub(crate) buffered: Vec<EventWrapper>,
    /// Set once by the worker; afterwards events go through the inbound queue
    pub(crate) started: bool,
}

/// Filtering rules of a single subscription.
pub(crate) struct NodeFilter {
    pub(crate) requested_rv: u64,
    /// Always `None` for cluster-wide watches
    pub(crate) namespace: Option<String>,
    pub(crate) predicate: Arc<dyn Predicate>,
}

impl NodeFilter {
    /// Returns `(matches_now, past_positional_filters)`.
    ///
    /// The second flag is only true once the resource version and namespace
    /// checks pass; it tells the caller whether checking the old object
    /// against the predicate may matter for a modification.
    pub(crate) fn is_valid(
        &self,
        e: &EventWrapper,
    ) -> Result<(bool, bool)> {
        let obj = &e.ev.object;
        let event_rv = obj.parsed_resource_version()?;

        if event_rv <= self.requested_rv {
            return Ok((false, false));
        }

        if let Some(ns) = &self.namespace {
            if ns != obj.namespace() {
                return Ok((false, false));
            }
        }

        let valid = self.predicate.matches(obj)?;
        Ok((valid, true))
    }

    /// Decides what, if anything, the subscriber sees for this event.
    pub(crate) fn process_event(
        &self,
        e: EventWrapper,
    ) -> Result<Option<WatchEvent>> {
        let (valid, past_positional_filters) = self.is_valid(&e)?;
        let EventWrapper { mut ev, old_object } = e;

        if valid {
            if ev.event_type == EventType::Modified {
                let old = old_object.as_ref().ok_or(WatchError::MissingOldObject)?;
                // Entering the filtered view
                if !self.predicate.matches(old)? {
                    ev.event_type = EventType::Added;
                }
            }
            return Ok(Some(ev));
        }

        if past_positional_filters && ev.event_type == EventType::Modified {
            let mut old = old_object.ok_or(WatchError::MissingOldObject)?;
            if !self.predicate.matches(&old)? {
                return Ok(None);
            }
            // Leaving the filtered view: report the last visible state at the
            // version that removed it.
            old.meta.resource_version = ev.object.meta.resource_version;
            return Ok(Some(WatchEvent::deleted(old)));
        }

        Ok(None)
    }
}

/// A watch that has an id but does not receive events until [`start`].
///
/// [`start`]: WatchNode::start
pub struct WatchNode {
    pub(crate) id: u64,
    pub(crate) set: WatchSet,
    pub(crate) filter: NodeFilter,
    pub(crate) state: Arc<Mutex<NodeState>>,
    pub(crate) update_tx: mpsc::Sender<EventWrapper>,
    pub(crate) update_rx: mpsc::Receiver<EventWrapper>,
    pub(crate) out_tx: mpsc::Sender<WatchEvent>,
    pub(crate) out_rx: mpsc::Receiver<WatchEvent>,
}

impl WatchNode {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Registers the node and spawns its worker.
    ///
    /// The worker first emits `initial_events` (the list half of a
    /// list-then-watch), then replays events buffered since registration, then
    /// follows the live inbound queue until the node is stopped.
    pub async fn start(
        self,
        initial_events: Vec<WatchEvent>,
    ) -> WatchHandle {
        let WatchNode {
            id,
            set,
            filter,
            state,
            update_tx,
            update_rx,
            out_tx,
            out_rx,
        } = self;

        set.register(
            id,
            NodeEntry {
                update_tx,
                state: state.clone(),
            },
        )
        .await;

        let worker = NodeWorker {
            id,
            set: set.clone(),
            filter,
            state,
            update_rx,
            out_tx,
        };
        tokio::spawn(worker.run(initial_events));

        WatchHandle {
            id,
            set,
            result_rx: out_rx,
        }
    }
}

struct SubscriberGone;

struct NodeWorker {
    id: u64,
    set: WatchSet,
    filter: NodeFilter,
    state: Arc<Mutex<NodeState>>,
    update_rx: mpsc::Receiver<EventWrapper>,
    out_tx: mpsc::Sender<WatchEvent>,
}

impl NodeWorker {
    async fn run(
        mut self,
        initial_events: Vec<WatchEvent>,
    ) {
        debug!(watch_id = self.id, "watch worker started");

        if self.drain(initial_events).await.is_err() {
            return self.subscriber_gone().await;
        }

        let buffered = {
            let mut state = self.state.lock();
            state.started = true;
            std::mem::take(&mut state.buffered)
        };
        for e in buffered {
            if self.deliver(e).await.is_err() {
                return self.subscriber_gone().await;
            }
        }

        while let Some(e) = self.update_rx.recv().await {
            if self.deliver(e).await.is_err() {
                return self.subscriber_gone().await;
            }
        }

        // Dropping out_tx ends the subscriber stream.
        debug!(watch_id = self.id, "watch worker stopped");
    }

    async fn drain(
        &mut self,
        initial_events: Vec<WatchEvent>,
    ) -> std::result::Result<(), SubscriberGone> {
        let mut snapshot_rv = 0;
        for ev in initial_events {
            if let Ok(rv) = ev.object.parsed_resource_version() {
                snapshot_rv = snapshot_rv.max(rv);
            }
            self.deliver(EventWrapper::new(ev)).await?;
        }
        // Buffered events already reflected in the snapshot must not repeat.
        self.filter.requested_rv = self.filter.requested_rv.max(snapshot_rv);
        Ok(())
    }

    async fn deliver(
        &mut self,
        e: EventWrapper,
    ) -> std::result::Result<(), SubscriberGone> {
        match self.filter.process_event(e) {
            Ok(Some(ev)) => {
                let event_type = ev.event_type;
                self.out_tx.send(ev).await.map_err(|_| SubscriberGone)?;
                WATCH_EVENTS_SENT.with_label_values(&[event_type.as_str()]).inc();
            }
            Ok(None) => {}
            Err(e) => {
                error!(watch_id = self.id, "Could not process event: {:?}", e);
            }
        }
        Ok(())
    }

    async fn subscriber_gone(mut self) {
        trace!(watch_id = self.id, "subscriber dropped its stream");
        // Unblock any broadcaster waiting on our queue before taking the
        // registry write lock.
        self.update_rx.close();
        self.set.deregister(self.id).await;
    }
}

/// Subscriber side of a started watch.
///
/// Events arrive in broadcast order. The stream ends once the node is
/// stopped, either through [`WatchHandle::stop`] or
/// [`WatchSet::cleanup_watchers`].
pub struct WatchHandle {
    id: u64,
    set: WatchSet,
    result_rx: mpsc::Receiver<WatchEvent>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

impl WatchHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.result_rx.recv().await
    }

    pub fn result_chan(&mut self) -> &mut mpsc::Receiver<WatchEvent> {
        &mut self.result_rx
    }

    /// Deregisters the node and closes its queues. Consuming the handle
    /// makes a second stop impossible.
    pub async fn stop(self) {
        let WatchHandle { id, set, result_rx } = self;
        // Closing our side first fails the worker's pending send, which in
        // turn releases a broadcaster blocked on this node.
        drop(result_rx);
        set.deregister(id).await;
        debug!(watch_id = id, "watch stopped");
    }
}

impl Stream for WatchHandle {
    type Item = WatchEvent;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.get_mut().result_rx.poll_recv(cx)
    }
}
