use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::error;

use super::mirror_for_create;
use super::record_mirror_failure;
use super::DualWriterMode;
use crate::constants::METHOD_CREATE;
use crate::constants::METHOD_DELETE;
use crate::constants::METHOD_UPDATE;
use crate::CreateOptions;
use crate::DeleteOptions;
use crate::ForcedUpdate;
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

const MODE: DualWriterMode = DualWriterMode::Mode3;

/// Unified storage is authoritative. Writes are mirrored to legacy storage
/// when it supports the operation; legacy failures are logged and counted but
/// never returned.
pub struct DualWriterMode3 {
    legacy: Arc<dyn LegacyStorage>,
    storage: Arc<dyn Storage>,
}

impl DualWriterMode3 {
    pub fn new(
        legacy: Arc<dyn LegacyStorage>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self { legacy, storage }
    }
}

#[async_trait]
impl Storage for DualWriterMode3 {
    async fn create(
        &self,
        ctx: &RequestContext,
        obj: Object,
        create_validation: ValidateObjectFn,
        options: &CreateOptions,
    ) -> Result<Object> {
        let created = self
            .storage
            .create(ctx, obj.clone(), create_validation.clone(), options)
            .await
            .inspect_err(|e| {
                error!(mode = 3, "unable to create object in unified storage: {:?}", e);
            })?;

        if !self.legacy.capabilities().create {
            debug!(mode = 3, "legacy storage cannot create, mirror skipped");
            return Ok(created);
        }

        let mirror = mirror_for_create(&obj, created.clone());
        if let Err(e) = self.legacy.create(ctx, mirror, create_validation, options).await {
            record_mirror_failure(MODE, METHOD_CREATE);
            error!(mode = 3, "unable to create object in legacy storage: {:?}", e);
        }

        Ok(created)
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
        let (obj, created) = self
            .storage
            .update(
                ctx,
                name,
                obj_info.clone(),
                create_validation.clone(),
                update_validation.clone(),
                force_allow_create,
                options,
            )
            .await
            .inspect_err(|e| {
                error!(mode = 3, name, "could not update in unified storage: {:?}", e);
            })?;

        if !self.legacy.capabilities().update {
            debug!(mode = 3, name, "legacy storage cannot update, mirror skipped");
            return Ok((obj, created));
        }

        // Legacy keeps its own identity chain.
        let mut mirror = obj.clone();
        mirror.meta.resource_version.clear();
        mirror.meta.uid.clear();

        if let Err(e) = self
            .legacy
            .update(
                ctx,
                name,
                Arc::new(ForcedUpdate::new(obj_info, mirror)),
                create_validation,
                update_validation,
                force_allow_create,
                options,
            )
            .await
        {
            record_mirror_failure(MODE, METHOD_UPDATE);
            error!(mode = 3, name, "could not update in legacy storage: {:?}", e);
        }

        Ok((obj, created))
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        delete_validation: ValidateObjectFn,
        options: &DeleteOptions,
    ) -> Result<(Object, bool)> {
        let unified_result = self.storage.delete(ctx, name, delete_validation.clone(), options).await;
        if let Err(e) = &unified_result {
            if !e.is_not_found() {
                error!(mode = 3, name, "could not delete from unified storage: {:?}", e);
                return unified_result;
            }
        }

        if !self.legacy.capabilities().delete {
            debug!(mode = 3, name, "legacy storage cannot delete, mirror skipped");
            return unified_result;
        }

        if let Err(e) = self.legacy.delete(ctx, name, delete_validation, options).await {
            if !e.is_not_found() {
                record_mirror_failure(MODE, METHOD_DELETE);
                error!(mode = 3, name, "could not delete from legacy storage: {:?}", e);
            }
        }

        unified_result
    }
}
