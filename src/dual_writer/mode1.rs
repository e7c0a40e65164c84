use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::CapabilityError;
use crate::CreateOptions;
use crate::DeleteOptions;
use crate::GetOptions;
use crate::LegacyStorage;
use crate::ListOptions;
use crate::Object;
use crate::ObjectList;
use crate::RequestContext;
use crate::Result;
use crate::Storage;
use crate::UpdateOptions;
use crate::UpdatedObjectInfo;
use crate::ValidateObjectFn;
use crate::ValidateObjectUpdateFn;

/// Reads and writes go to legacy storage only. The unified backend is never
/// touched.
pub struct DualWriterMode1 {
    legacy: Arc<dyn LegacyStorage>,
}

impl DualWriterMode1 {
    pub fn new(legacy: Arc<dyn LegacyStorage>) -> Self {
        Self { legacy }
    }
}

#[async_trait]
impl Storage for DualWriterMode1 {
    async fn create(
        &self,
        ctx: &RequestContext,
        obj: Object,
        create_validation: ValidateObjectFn,
        options: &CreateOptions,
    ) -> Result<Object> {
        if !self.legacy.capabilities().create {
            return Err(CapabilityError::NoCreateMethod.into());
        }

        self.legacy.create(ctx, obj, create_validation, options).await.inspect_err(|e| {
            error!(mode = 1, "unable to create object in legacy storage: {:?}", e);
        })
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> Result<Object> {
        self.legacy.get(ctx, name, options).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<ObjectList> {
        if !self.legacy.capabilities().list {
            return Err(CapabilityError::NotImplemented { method: "list" }.into());
        }

        self.legacy.list(ctx, options).await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        obj_info: Arc<dyn UpdatedObjectInfo>,
        create_validation: ValidateObjectFn,
        update_validation: ValidateObjectUpdateFn,
        force_allow_create: bool,
        options: &UpdateOptions,
    ) -> Result<(Object, bool)> {
        if !self.legacy.capabilities().update {
            return Err(CapabilityError::NoUpdateMethod.into());
        }

        self.legacy
            .update(
                ctx,
                name,
                obj_info,
                create_validation,
                update_validation,
                force_allow_create,
                options,
            )
            .await
            .inspect_err(|e| {
                error!(mode = 1, name, "unable to update object in legacy storage: {:?}", e);
            })
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        delete_validation: ValidateObjectFn,
        options: &DeleteOptions,
    ) -> Result<(Object, bool)> {
        if !self.legacy.capabilities().delete {
            return Err(CapabilityError::DeleterMissing.into());
        }

        self.legacy.delete(ctx, name, delete_validation, options).await
    }
}
