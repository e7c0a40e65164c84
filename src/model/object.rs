use std::collections::BTreeMap;

use bytes::Bytes;

use crate::Result;
use crate::WatchError;

/// Metadata shared by every stored resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub name: String,
    /// Empty for cluster-scoped objects
    pub namespace: String,
    /// Immutable for the lifetime of the object, assigned by the backend
    pub uid: String,
    /// Decimal integer assigned by the backend on every mutation
    pub resource_version: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// A versioned resource with an opaque payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Object {
    pub meta: ObjectMeta,
    pub payload: Bytes,
}

impl Object {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta {
                name: name.into(),
                ..Default::default()
            },
            payload: Bytes::new(),
        }
    }

    pub fn with_namespace(
        mut self,
        namespace: impl Into<String>,
    ) -> Self {
        self.meta.namespace = namespace.into();
        self
    }

    pub fn with_label(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.meta.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.meta.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_payload(
        mut self,
        payload: impl Into<Bytes>,
    ) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_resource_version(
        mut self,
        resource_version: impl Into<String>,
    ) -> Self {
        self.meta.resource_version = resource_version.into();
        self
    }

    pub fn with_uid(
        mut self,
        uid: impl Into<String>,
    ) -> Self {
        self.meta.uid = uid.into();
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.meta.namespace
    }

    #[inline]
    pub fn resource_version(&self) -> &str {
        &self.meta.resource_version
    }

    /// Parses the resource version as an unsigned integer.
    pub fn parsed_resource_version(&self) -> Result<u64> {
        parse_resource_version(&self.meta.resource_version)
    }
}

/// Parses a decimal resource version. An empty string is rejected.
pub fn parse_resource_version(value: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|source| {
        WatchError::InvalidResourceVersion {
            value: value.to_string(),
            source,
        }
        .into()
    })
}

/// Metadata describing a list response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMeta {
    /// Resource version of the collection at the time of the list
    pub resource_version: String,
    /// Opaque token to fetch the next page, empty on the last page
    pub continue_token: String,
    pub remaining_item_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectList {
    pub meta: ListMeta,
    pub items: Vec<Object>,
}

impl ObjectList {
    pub fn new(items: Vec<Object>) -> Self {
        Self {
            meta: ListMeta::default(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
