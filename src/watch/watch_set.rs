use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::trace;

use super::EventWrapper;
use super::NodeFilter;
use super::NodeState;
use super::WatchEvent;
use super::WatchNode;
use crate::metrics::WATCH_ACTIVE_NODES;
use crate::Object;
use crate::Predicate;
use crate::WatchConfig;

/// Registry-side view of a started node.
pub(crate) struct NodeEntry {
    pub(crate) update_tx: mpsc::Sender<EventWrapper>,
    pub(crate) state: Arc<Mutex<NodeState>>,
}

struct Inner {
    /// Broadcast holds the read side for its whole pass, so registration,
    /// stop and cleanup wait for an in-flight broadcast to finish.
    nodes: RwLock<HashMap<u64, NodeEntry>>,
    counter: AtomicU64,
    config: WatchConfig,
}

/// Registry of active watch nodes for one storage backend.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct WatchSet {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WatchSet {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchSet")
            .field("counter", &self.inner.counter.load(Ordering::Relaxed))
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Default for WatchSet {
    fn default() -> Self {
        Self::new(WatchConfig::default())
    }
}

impl WatchSet {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                nodes: RwLock::new(HashMap::with_capacity(config.initial_watch_nodes_size)),
                counter: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// Allocates an id and builds an unstarted node. The node is invisible to
    /// broadcasts until [`WatchNode::start`] registers it.
    ///
    /// `namespace` is `None` for cluster-wide watches.
    pub fn new_watch(
        &self,
        requested_rv: u64,
        predicate: Arc<dyn Predicate>,
        namespace: Option<String>,
    ) -> WatchNode {
        let id = self.inner.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let config = &self.inner.config;
        let (update_tx, update_rx) = mpsc::channel(config.update_channel_size);
        let (out_tx, out_rx) = mpsc::channel(config.update_channel_size);

        trace!(watch_id = id, requested_rv, ?namespace, "new watch node");

        WatchNode {
            id,
            set: self.clone(),
            filter: NodeFilter {
                requested_rv,
                namespace,
                predicate,
            },
            state: Arc::new(Mutex::new(NodeState {
                buffered: Vec::with_capacity(config.initial_buffered_events_size),
                started: false,
            })),
            update_tx,
            update_rx,
            out_tx,
            out_rx,
        }
    }

    /// Delivers `ev` to every registered node, in registration-map order.
    ///
    /// Nodes whose worker has not begun draining keep the event in their
    /// buffer; started nodes get it through their bounded queue, so one slow
    /// subscriber delays the whole broadcast. Nodes that are going away are
    /// skipped.
    pub async fn notify_watchers(
        &self,
        ev: WatchEvent,
        old_object: Option<Object>,
    ) {
        let nodes = self.inner.nodes.read().await;
        let wrapped = EventWrapper { ev, old_object };

        for (id, node) in nodes.iter() {
            {
                let mut state = node.state.lock();
                if !state.started {
                    state.buffered.push(wrapped.clone());
                    continue;
                }
            }

            if node.update_tx.send(wrapped.clone()).await.is_err() {
                trace!(watch_id = id, "watch node closed, event skipped");
            }
        }
    }

    /// Stops every node. Their subscriber streams end once the pending events
    /// are drained.
    pub async fn cleanup_watchers(&self) {
        let mut nodes = self.inner.nodes.write().await;
        let count = nodes.len();
        nodes.clear();
        WATCH_ACTIVE_NODES.sub(count as i64);
        debug!(count, "all watch nodes stopped");
    }

    pub async fn len(&self) -> usize {
        self.inner.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub(crate) async fn register(
        &self,
        id: u64,
        entry: NodeEntry,
    ) {
        let mut nodes = self.inner.nodes.write().await;
        if nodes.insert(id, entry).is_none() {
            WATCH_ACTIVE_NODES.inc();
        }
        trace!(watch_id = id, "watch node registered");
    }

    /// Returns false when the node was already gone.
    pub(crate) async fn deregister(
        &self,
        id: u64,
    ) -> bool {
        let mut nodes = self.inner.nodes.write().await;
        let removed = nodes.remove(&id).is_some();
        if removed {
            WATCH_ACTIVE_NODES.dec();
        }
        removed
    }
}
