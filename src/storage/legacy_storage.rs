//! Pre-migration backend contract. Only `get` is guaranteed; the remaining
//! operations are probed through [`Capabilities`] before use.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::UpdatedObjectInfo;
use super::ValidateObjectFn;
use super::ValidateObjectUpdateFn;
use crate::CreateOptions;
use crate::DeleteOptions;
use crate::GetOptions;
use crate::ListOptions;
use crate::Object;
use crate::ObjectList;
use crate::RequestContext;
use crate::Result;
use crate::UpdateOptions;

/// Operations a legacy backend supports beyond `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub create: bool,
    pub list: bool,
    pub update: bool,
    pub delete: bool,
}

impl Capabilities {
    pub const fn all() -> Self {
        Self {
            create: true,
            list: true,
            update: true,
            delete: true,
        }
    }

    /// Only `get` is available.
    pub const fn read_only() -> Self {
        Self {
            create: false,
            list: false,
            update: false,
            delete: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait LegacyStorage: Send + Sync + 'static {
    /// Reports which optional operations may be called.
    fn capabilities(&self) -> Capabilities;

    async fn create(
        &self,
        ctx: &RequestContext,
        obj: Object,
        create_validation: ValidateObjectFn,
        options: &CreateOptions,
    ) -> Result<Object>;

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> Result<Object>;

    async fn list(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<ObjectList>;

    /// Returns the stored object and whether it was created.
    #[allow(clippy::too_many_arguments)]
    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        obj_info: Arc<dyn UpdatedObjectInfo>,
        create_validation: ValidateObjectFn,
        update_validation: ValidateObjectUpdateFn,
        force_allow_create: bool,
        options: &UpdateOptions,
    ) -> Result<(Object, bool)>;

    /// Returns the deleted object and whether deletion completed immediately.
    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        delete_validation: ValidateObjectFn,
        options: &DeleteOptions,
    ) -> Result<(Object, bool)>;
}
