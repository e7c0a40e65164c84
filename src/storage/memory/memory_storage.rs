use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use nanoid::nanoid;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::trace;

use crate::parse_resource_version;
use crate::Capabilities;
use crate::CapabilityError;
use crate::CreateOptions;
use crate::DeleteOptions;
use crate::GetOptions;
use crate::LegacyStorage;
use crate::ListMeta;
use crate::ListOptions;
use crate::Object;
use crate::ObjectList;
use crate::Preconditions;
use crate::Predicate;
use crate::RequestContext;
use crate::Result;
use crate::SelectionPredicate;
use crate::Storage;
use crate::StorageError;
use crate::UpdateOptions;
use crate::UpdatedObjectInfo;
use crate::ValidateObjectFn;
use crate::ValidateObjectUpdateFn;
use crate::WatchConfig;
use crate::WatchEvent;
use crate::WatchHandle;
use crate::WatchSet;
use crate::Watcher;

/// (namespace, name)
type ObjectKey = (String, String);

#[derive(Debug, Default)]
struct Store {
    objects: BTreeMap<ObjectKey, Object>,
    /// Last assigned resource version for the whole collection
    revision: u64,
}

impl Store {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

/// In-memory collection that assigns resource versions and UIDs and
/// publishes every committed mutation to its own [`WatchSet`].
///
/// Usable as either side of a dual writer. Restricting its
/// [`Capabilities`] makes it behave like a partial legacy backend.
#[derive(Debug)]
pub struct MemoryStorage {
    /// Mutations notify watchers while still holding the write side, so
    /// subscribers observe resource versions in commit order.
    store: RwLock<Store>,
    watchers: WatchSet,
    capabilities: Capabilities,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(WatchConfig::default())
    }
}

impl MemoryStorage {
    pub fn new(watch_config: WatchConfig) -> Self {
        Self {
            store: RwLock::new(Store::default()),
            watchers: WatchSet::new(watch_config),
            capabilities: Capabilities::all(),
        }
    }

    pub fn with_capabilities(
        mut self,
        capabilities: Capabilities,
    ) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.watchers
    }

    /// Number of stored objects across all namespaces.
    pub async fn len(&self) -> usize {
        self.store.read().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stops every open watch.
    pub async fn shutdown(&self) {
        self.watchers.cleanup_watchers().await;
    }

    async fn create_object(
        &self,
        ctx: &RequestContext,
        mut obj: Object,
        create_validation: ValidateObjectFn,
        options: &CreateOptions,
    ) -> Result<Object> {
        bind_namespace(ctx, &mut obj)?;
        if !obj.meta.resource_version.is_empty() {
            return Err(invalid(obj.name(), "resource version must not be set on create"));
        }

        let mut store = self.store.write().await;
        let key = key_of(&obj);
        if store.objects.contains_key(&key) {
            return Err(StorageError::AlreadyExists { name: obj.meta.name }.into());
        }
        create_validation(&obj)?;
        if options.dry_run {
            return Ok(obj);
        }

        let rv = store.next_revision();
        obj.meta.resource_version = rv.to_string();
        obj.meta.uid = nanoid!();
        store.objects.insert(key, obj.clone());
        trace!(name = obj.name(), rv, "object created");

        self.watchers.notify_watchers(WatchEvent::added(obj.clone()), None).await;
        Ok(obj)
    }

    async fn get_object(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Object> {
        let store = self.store.read().await;
        store
            .objects
            .get(&key_for(ctx, name))
            .cloned()
            .ok_or_else(|| StorageError::not_found(name).into())
    }

    async fn list_objects(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<ObjectList> {
        let predicate = SelectionPredicate::from_list_options(options)?;
        let offset = if options.continue_token.is_empty() {
            0
        } else {
            options
                .continue_token
                .parse::<usize>()
                .map_err(|_| invalid("list", "malformed continue token"))?
        };

        let store = self.store.read().await;
        let mut items = matching_objects(&store, ctx, &predicate)?;

        let mut meta = ListMeta {
            resource_version: store.revision.to_string(),
            ..Default::default()
        };
        items.drain(..offset.min(items.len()));
        if options.limit > 0 && items.len() > options.limit {
            let remaining = items.split_off(options.limit);
            meta.continue_token = (offset + options.limit).to_string();
            meta.remaining_item_count = Some(remaining.len() as u64);
        }

        Ok(ObjectList { meta, items })
    }

    #[allow(clippy::too_many_arguments)]
    async fn update_object(
        &self,
        ctx: &RequestContext,
        name: &str,
        obj_info: Arc<dyn UpdatedObjectInfo>,
        create_validation: ValidateObjectFn,
        update_validation: ValidateObjectUpdateFn,
        force_allow_create: bool,
        options: &UpdateOptions,
    ) -> Result<(Object, bool)> {
        let key = key_for(ctx, name);
        let mut store = self.store.write().await;

        let Some(old) = store.objects.get(&key).cloned() else {
            if !force_allow_create {
                return Err(StorageError::not_found(name).into());
            }
            let mut obj = obj_info.updated_object(&Object::default())?;
            obj.meta.name = key.1.clone();
            obj.meta.namespace = key.0.clone();
            create_validation(&obj)?;
            if options.dry_run {
                return Ok((obj, true));
            }

            let rv = store.next_revision();
            obj.meta.resource_version = rv.to_string();
            obj.meta.uid = nanoid!();
            store.objects.insert(key, obj.clone());
            debug!(name, rv, "object created through update");

            self.watchers.notify_watchers(WatchEvent::added(obj.clone()), None).await;
            return Ok((obj, true));
        };

        check_preconditions(&old, obj_info.preconditions().as_ref())?;
        let mut obj = obj_info.updated_object(&old)?;
        if issued_here(&obj, &old) && obj.meta.resource_version != old.meta.resource_version {
            return Err(StorageError::Conflict {
                name: name.to_string(),
                expected: obj.meta.resource_version,
                actual: old.meta.resource_version,
            }
            .into());
        }
        obj.meta.name = old.meta.name.clone();
        obj.meta.namespace = old.meta.namespace.clone();
        obj.meta.uid = old.meta.uid.clone();
        update_validation(&obj, &old)?;
        if options.dry_run {
            return Ok((obj, false));
        }

        let rv = store.next_revision();
        obj.meta.resource_version = rv.to_string();
        store.objects.insert(key, obj.clone());
        trace!(name, rv, "object updated");

        self.watchers.notify_watchers(WatchEvent::modified(obj.clone()), Some(old)).await;
        Ok((obj, false))
    }

    async fn delete_object(
        &self,
        ctx: &RequestContext,
        name: &str,
        delete_validation: ValidateObjectFn,
        options: &DeleteOptions,
    ) -> Result<(Object, bool)> {
        let key = key_for(ctx, name);
        let mut store = self.store.write().await;

        let old = store
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(name))?;
        check_preconditions(&old, options.preconditions.as_ref())?;
        delete_validation(&old)?;
        if options.dry_run {
            return Ok((old, true));
        }

        store.objects.remove(&key);
        let rv = store.next_revision();
        let mut deleted = old;
        deleted.meta.resource_version = rv.to_string();
        trace!(name, rv, "object deleted");

        self.watchers.notify_watchers(WatchEvent::deleted(deleted.clone()), None).await;
        Ok((deleted, true))
    }
}

fn key_of(obj: &Object) -> ObjectKey {
    (obj.meta.namespace.clone(), obj.meta.name.clone())
}

fn key_for(
    ctx: &RequestContext,
    name: &str,
) -> ObjectKey {
    (ctx.namespace_or_empty().to_string(), name.to_string())
}

fn invalid(
    name: &str,
    reason: &str,
) -> crate::Error {
    StorageError::Invalid {
        name: name.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Objects inherit the request namespace; a conflicting one is rejected.
fn bind_namespace(
    ctx: &RequestContext,
    obj: &mut Object,
) -> Result<()> {
    if obj.meta.name.is_empty() {
        return Err(invalid("", "name is required"));
    }
    match &ctx.namespace {
        Some(ns) if obj.meta.namespace.is_empty() => obj.meta.namespace = ns.clone(),
        Some(ns) if *ns != obj.meta.namespace => {
            return Err(invalid(obj.name(), "namespace does not match the request"));
        }
        _ => {}
    }
    Ok(())
}

fn check_preconditions(
    obj: &Object,
    preconditions: Option<&Preconditions>,
) -> Result<()> {
    let Some(p) = preconditions else {
        return Ok(());
    };
    if let Some(uid) = &p.uid {
        if *uid != obj.meta.uid {
            return Err(StorageError::Conflict {
                name: obj.meta.name.clone(),
                expected: format!("uid {}", uid),
                actual: format!("uid {}", obj.meta.uid),
            }
            .into());
        }
    }
    if let Some(rv) = &p.resource_version {
        if *rv != obj.meta.resource_version {
            return Err(StorageError::Conflict {
                name: obj.meta.name.clone(),
                expected: rv.clone(),
                actual: obj.meta.resource_version.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// True when `obj` carries a resource version this store can compare against
/// `current`. Versions stamped by another backend (a different uid) are
/// ignored; optimistic concurrency for those goes through preconditions.
fn issued_here(
    obj: &Object,
    current: &Object,
) -> bool {
    !obj.meta.resource_version.is_empty() && (obj.meta.uid.is_empty() || obj.meta.uid == current.meta.uid)
}

/// Objects visible to `ctx` that satisfy `predicate`, in key order.
fn matching_objects(
    store: &Store,
    ctx: &RequestContext,
    predicate: &SelectionPredicate,
) -> Result<Vec<Object>> {
    let mut items = Vec::new();
    for ((namespace, _), obj) in store.objects.iter() {
        if ctx.namespace.as_ref().is_some_and(|ns| ns != namespace) {
            continue;
        }
        if predicate.matches(obj)? {
            items.push(obj.clone());
        }
    }
    Ok(items)
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create(
        &self,
        ctx: &RequestContext,
        obj: Object,
        create_validation: ValidateObjectFn,
        options: &CreateOptions,
    ) -> Result<Object> {
        self.create_object(ctx, obj, create_validation, options).await
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        _options: &GetOptions,
    ) -> Result<Object> {
        self.get_object(ctx, name).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<ObjectList> {
        self.list_objects(ctx, options).await
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
        self.update_object(
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
        self.delete_object(ctx, name, delete_validation, options).await
    }
}

#[async_trait]
impl LegacyStorage for MemoryStorage {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        obj: Object,
        create_validation: ValidateObjectFn,
        options: &CreateOptions,
    ) -> Result<Object> {
        if !self.capabilities.create {
            return Err(CapabilityError::NoCreateMethod.into());
        }
        self.create_object(ctx, obj, create_validation, options).await
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        _options: &GetOptions,
    ) -> Result<Object> {
        self.get_object(ctx, name).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<ObjectList> {
        if !self.capabilities.list {
            return Err(CapabilityError::ListerMissing.into());
        }
        self.list_objects(ctx, options).await
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
        if !self.capabilities.update {
            return Err(CapabilityError::NoUpdateMethod.into());
        }
        self.update_object(
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
        if !self.capabilities.delete {
            return Err(CapabilityError::DeleterMissing.into());
        }
        self.delete_object(ctx, name, delete_validation, options).await
    }
}

#[async_trait]
impl Watcher for MemoryStorage {
    async fn watch(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<WatchHandle> {
        let predicate = SelectionPredicate::from_list_options(options)?;
        let requested_rv = match options.resource_version.as_str() {
            "" => 0,
            rv => parse_resource_version(rv)?,
        };

        // Holding the read side keeps writers out until the node is
        // registered, so nothing falls between the list and the watch.
        let store = self.store.read().await;
        let initial_events = if requested_rv == 0 {
            matching_objects(&store, ctx, &predicate)?
                .into_iter()
                .map(WatchEvent::added)
                .collect()
        } else {
            Vec::new()
        };

        let node = self.watchers.new_watch(requested_rv, Arc::new(predicate), ctx.namespace.clone());
        let handle = node.start(initial_events).await;
        drop(store);

        debug!(watch_id = handle.id(), requested_rv, "watch opened");
        Ok(handle)
    }
}
