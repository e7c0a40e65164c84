//! Storage contracts consumed by the dual writer, plus an in-memory,
//! watch-capable reference backend.

mod legacy_storage;
mod memory;
mod unified_storage;
mod update_info;

use std::sync::Arc;

use async_trait::async_trait;
#[doc(hidden)]
pub use legacy_storage::*;
#[doc(hidden)]
pub use memory::*;
#[doc(hidden)]
pub use unified_storage::*;
#[doc(hidden)]
pub use update_info::*;

use crate::ListOptions;
use crate::Object;
use crate::RequestContext;
use crate::Result;
use crate::WatchHandle;

/// Validation hook run by a backend against the object about to be written.
pub type ValidateObjectFn = Arc<dyn Fn(&Object) -> Result<()> + Send + Sync>;

/// Validation hook run against `(new, old)` before an update is stored.
pub type ValidateObjectUpdateFn = Arc<dyn Fn(&Object, &Object) -> Result<()> + Send + Sync>;

/// Validation that accepts every object.
pub fn allow_all() -> ValidateObjectFn {
    Arc::new(|_| Ok(()))
}

/// Update validation that accepts every transition.
pub fn allow_all_updates() -> ValidateObjectUpdateFn {
    Arc::new(|_, _| Ok(()))
}

/// Backends that can serve list-then-watch subscriptions.
#[async_trait]
pub trait Watcher: Send + Sync + 'static {
    /// Opens a subscription scoped to the request namespace and filtered by
    /// the selectors in `options`. A zero or empty resource version first
    /// replays the current matching objects as `Added` events.
    async fn watch(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<WatchHandle>;
}
