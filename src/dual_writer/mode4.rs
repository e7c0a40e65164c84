use std::sync::Arc;

use async_trait::async_trait;

use crate::CreateOptions;
use crate::DeleteOptions;
use crate::GetOptions;
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

/// Migration finished: every call is served by unified storage.
pub struct DualWriterMode4 {
    storage: Arc<dyn Storage>,
}

impl DualWriterMode4 {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Storage for DualWriterMode4 {
    async fn create(
        &self,
        ctx: &RequestContext,
        obj: Object,
        create_validation: ValidateObjectFn,
        options: &CreateOptions,
    ) -> Result<Object> {
        self.storage.create(ctx, obj, create_validation, options).await
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> Result<Object> {
        self.storage.get(ctx, name, options).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<ObjectList> {
        self.storage.list(ctx, options).await
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
        self.storage
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
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        delete_validation: ValidateObjectFn,
        options: &DeleteOptions,
    ) -> Result<(Object, bool)> {
        self.storage.delete(ctx, name, delete_validation, options).await
    }
}
