use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;
use tracing::info;

use super::enrich_object;
use super::mirror_for_create;
use super::record_mirror_failure;
use super::DualWriterMode;
use crate::constants::METHOD_CREATE;
use crate::constants::METHOD_DELETE;
use crate::constants::METHOD_UPDATE;
use crate::CapabilityError;
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

const MODE: DualWriterMode = DualWriterMode::Mode2;

/// Writes to legacy storage first and mirrors successful writes into unified
/// storage. Reads prefer unified storage and fall back to legacy.
///
/// The two writes are not atomic: a unified failure after a legacy success is
/// reported to the caller and leaves the backends diverged.
pub struct DualWriterMode2 {
    legacy: Arc<dyn LegacyStorage>,
    storage: Arc<dyn Storage>,
}

impl DualWriterMode2 {
    pub fn new(
        legacy: Arc<dyn LegacyStorage>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self { legacy, storage }
    }
}

#[async_trait]
impl Storage for DualWriterMode2 {
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

        let created = self
            .legacy
            .create(ctx, obj.clone(), create_validation.clone(), options)
            .await
            .inspect_err(|e| {
                error!(mode = 2, "unable to create object in legacy storage: {:?}", e);
            })?;

        let mirror = mirror_for_create(&obj, created);
        self.storage.create(ctx, mirror, create_validation, options).await.inspect_err(|e| {
            record_mirror_failure(MODE, METHOD_CREATE);
            error!(mode = 2, "unable to create object in unified storage: {:?}", e);
        })
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> Result<Object> {
        match self.storage.get(ctx, name, options).await {
            Ok(obj) => return Ok(obj),
            Err(e) if e.is_not_found() => {
                info!(mode = 2, name, "object not found in unified storage");
            }
            Err(e) => {
                error!(mode = 2, name, "unable to fetch object from unified storage: {:?}", e);
            }
        }

        self.legacy.get(ctx, name, options).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<ObjectList> {
        if !self.legacy.capabilities().list {
            return Err(CapabilityError::ListerMissing.into());
        }

        let mut legacy_list = self.legacy.list(ctx, options).await?;
        let unified_list = self.storage.list(ctx, options).await?;

        // Keyed by namespace too, so cluster-wide lists do not mix up
        // same-named objects.
        let mut unified_items: HashMap<(String, String), Object> = unified_list
            .items
            .into_iter()
            .map(|obj| ((obj.meta.namespace.clone(), obj.meta.name.clone()), obj))
            .collect();

        // Keep legacy order and metadata; prefer the unified copy of each item.
        for item in legacy_list.items.iter_mut() {
            let key = (item.meta.namespace.clone(), item.meta.name.clone());
            if let Some(unified) = unified_items.remove(&key) {
                *item = unified;
            }
        }

        Ok(legacy_list)
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

        let old = self.get(ctx, name, &GetOptions::default()).await?;
        let updated = obj_info.updated_object(&old)?;

        let (obj, _created) = self
            .legacy
            .update(
                ctx,
                name,
                Arc::new(ForcedUpdate::new(obj_info.clone(), updated.clone())),
                create_validation.clone(),
                update_validation.clone(),
                force_allow_create,
                options,
            )
            .await
            .inspect_err(|e| {
                error!(mode = 2, name, "could not update in legacy storage: {:?}", e);
            })?;

        let mut mirror = enrich_object(&updated, obj);
        mirror.meta.resource_version = old.meta.resource_version;
        mirror.meta.uid = old.meta.uid;

        self.storage
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
            .inspect_err(|e| {
                record_mirror_failure(MODE, METHOD_UPDATE);
                error!(mode = 2, name, "could not update in unified storage: {:?}", e);
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

        let legacy_result = self.legacy.delete(ctx, name, delete_validation.clone(), options).await;
        if let Err(e) = &legacy_result {
            if !e.is_not_found() {
                error!(mode = 2, name, "could not delete from legacy storage: {:?}", e);
                return legacy_result;
            }
        }

        if let Err(e) = self.storage.delete(ctx, name, delete_validation, options).await {
            if !e.is_not_found() {
                record_mirror_failure(MODE, METHOD_DELETE);
                error!(mode = 2, name, "could not delete from unified storage: {:?}", e);
            }
        }

        legacy_result
    }
}
