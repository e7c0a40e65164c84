//! # dual-store
//!
//! Storage plumbing for migrating a resource API from a legacy backend to a
//! unified backend without downtime.
//!
//! - [`DualWriter`] routes every storage call to one or both backends
//!   according to a [`DualWriterMode`].
//! - [`WatchSet`] fans committed mutations out to many filtered, resumable
//!   watch subscriptions.
//! - [`MemoryStorage`] is a watch-capable in-memory backend usable on either
//!   side of the migration.
//!
//! ```ignore
//! let config = DualStoreConfig::new()?.validate()?;
//! let legacy = Arc::new(MemoryStorage::new(config.watch.clone()));
//! let unified = Arc::new(MemoryStorage::new(config.watch.clone()));
//! let writer = select_dual_writer(config.dual_writer.mode, legacy, unified.clone());
//!
//! let mut handle = unified.watch(&RequestContext::namespaced("ns1"), &ListOptions::default()).await?;
//! writer.create(&RequestContext::namespaced("ns1"), Object::new("a"), allow_all(), &CreateOptions::default()).await?;
//! let event = handle.recv().await;
//! ```

mod config;
mod constants;
mod dual_writer;
mod errors;
pub mod metrics;
mod model;
mod predicate;
mod storage;
mod watch;

pub use config::*;
pub use dual_writer::*;
pub use errors::*;
pub use model::*;
pub use predicate::*;
pub use storage::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
