use std::fmt;
use std::sync::Arc;

use crate::Object;
use crate::Preconditions;
use crate::Result;

/// Computes the object an update should store, given the current one.
pub trait UpdatedObjectInfo: Send + Sync {
    fn preconditions(&self) -> Option<Preconditions> {
        None
    }

    fn updated_object(
        &self,
        old: &Object,
    ) -> Result<Object>;
}

/// Replaces the stored object with a fixed one (a plain PUT).
#[derive(Debug, Clone)]
pub struct DefaultUpdatedObjectInfo {
    obj: Object,
}

impl DefaultUpdatedObjectInfo {
    pub fn new(obj: Object) -> Self {
        Self { obj }
    }
}

impl UpdatedObjectInfo for DefaultUpdatedObjectInfo {
    fn updated_object(
        &self,
        _old: &Object,
    ) -> Result<Object> {
        Ok(self.obj.clone())
    }
}

/// Derives the new object from the old one with a closure.
pub struct UpdateFn<F> {
    f: F,
    preconditions: Option<Preconditions>,
}

impl<F> UpdateFn<F>
where
    F: Fn(&Object) -> Result<Object> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f, preconditions: None }
    }

    /// Guards the update against the stored object's uid and version.
    pub fn with_preconditions(
        mut self,
        preconditions: Preconditions,
    ) -> Self {
        self.preconditions = Some(preconditions);
        self
    }
}

impl<F> UpdatedObjectInfo for UpdateFn<F>
where
    F: Fn(&Object) -> Result<Object> + Send + Sync,
{
    fn preconditions(&self) -> Option<Preconditions> {
        self.preconditions.clone()
    }

    fn updated_object(
        &self,
        old: &Object,
    ) -> Result<Object> {
        (self.f)(old)
    }
}

/// Always yields an already computed object, ignoring the caller's
/// transform, so both backends see the identical logical update and a
/// side-effecting transform runs only once.
pub struct ForcedUpdate {
    upstream: Arc<dyn UpdatedObjectInfo>,
    updated: Object,
}

impl ForcedUpdate {
    pub fn new(
        upstream: Arc<dyn UpdatedObjectInfo>,
        updated: Object,
    ) -> Self {
        Self { upstream, updated }
    }
}

impl fmt::Debug for ForcedUpdate {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ForcedUpdate").field("updated", &self.updated).finish_non_exhaustive()
    }
}

impl UpdatedObjectInfo for ForcedUpdate {
    fn preconditions(&self) -> Option<Preconditions> {
        self.upstream.preconditions()
    }

    fn updated_object(
        &self,
        _old: &Object,
    ) -> Result<Object> {
        Ok(self.updated.clone())
    }
}
