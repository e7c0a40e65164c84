//! Fan-out of storage mutations to many filtered, resumable subscribers.
//!
//! A [`WatchSet`] owns the registry; each [`WatchNode`] filters the broadcast
//! by resume cursor, namespace and predicate and forwards what survives to
//! its [`WatchHandle`].

mod event;
mod watch_node;
mod watch_set;

#[doc(hidden)]
pub use event::*;
#[doc(hidden)]
pub use watch_node::*;
#[doc(hidden)]
pub use watch_set::*;
