//! Dual writer: a [`Storage`] that routes every call to a legacy backend, a
//! unified backend, or both, depending on the migration mode.
//!
//! | mode | writes                      | reads                  |
//! |------|-----------------------------|------------------------|
//! | 1    | legacy                      | legacy                 |
//! | 2    | legacy, then unified mirror | unified, legacy backup |
//! | 3    | unified, then legacy mirror | unified                |
//! | 4    | unified                     | unified                |

mod mode1;
mod mode2;
mod mode3;
mod mode4;

#[doc(hidden)]
pub use mode1::*;
#[doc(hidden)]
pub use mode2::*;
#[doc(hidden)]
pub use mode3::*;
#[doc(hidden)]
pub use mode4::*;

#[cfg(test)]
mod mode2_test;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::METHOD_CREATE;
use crate::constants::METHOD_DELETE;
use crate::constants::METHOD_GET;
use crate::constants::METHOD_LIST;
use crate::constants::METHOD_UPDATE;
use crate::metrics::DUAL_WRITER_MIRROR_FAILURES;
use crate::metrics::DUAL_WRITER_REQUESTS;
use crate::metrics::DUAL_WRITER_REQUEST_DURATION_MS;
use crate::CreateOptions;
use crate::DeleteOptions;
use crate::Error;
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

/// Migration stage. Configured as an integer; unknown values are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DualWriterMode {
    /// Legacy only
    #[default]
    Mode1,
    /// Legacy authoritative, unified mirrored, reads prefer unified
    Mode2,
    /// Unified authoritative, legacy mirrored
    Mode3,
    /// Unified only
    Mode4,
}

impl DualWriterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DualWriterMode::Mode1 => "mode1",
            DualWriterMode::Mode2 => "mode2",
            DualWriterMode::Mode3 => "mode3",
            DualWriterMode::Mode4 => "mode4",
        }
    }
}

impl fmt::Display for DualWriterMode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for DualWriterMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(DualWriterMode::Mode1),
            2 => Ok(DualWriterMode::Mode2),
            3 => Ok(DualWriterMode::Mode3),
            4 => Ok(DualWriterMode::Mode4),
            other => Err(Error::InvalidConfig(format!("unknown dual writer mode {}", other))),
        }
    }
}

impl From<DualWriterMode> for u8 {
    fn from(mode: DualWriterMode) -> Self {
        match mode {
            DualWriterMode::Mode1 => 1,
            DualWriterMode::Mode2 => 2,
            DualWriterMode::Mode3 => 3,
            DualWriterMode::Mode4 => 4,
        }
    }
}

/// One strategy per mode. Holds no mutable state between calls.
pub enum DualWriter {
    Mode1(DualWriterMode1),
    Mode2(DualWriterMode2),
    Mode3(DualWriterMode3),
    Mode4(DualWriterMode4),
}

impl fmt::Debug for DualWriter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("DualWriter").field(&self.mode()).finish()
    }
}

/// Builds the strategy for `mode` over the two backends.
pub fn select_dual_writer(
    mode: DualWriterMode,
    legacy: Arc<dyn LegacyStorage>,
    storage: Arc<dyn Storage>,
) -> DualWriter {
    match mode {
        DualWriterMode::Mode1 => DualWriter::Mode1(DualWriterMode1::new(legacy)),
        DualWriterMode::Mode2 => DualWriter::Mode2(DualWriterMode2::new(legacy, storage)),
        DualWriterMode::Mode3 => DualWriter::Mode3(DualWriterMode3::new(legacy, storage)),
        DualWriterMode::Mode4 => DualWriter::Mode4(DualWriterMode4::new(storage)),
    }
}

impl DualWriter {
    pub fn mode(&self) -> DualWriterMode {
        match self {
            DualWriter::Mode1(_) => DualWriterMode::Mode1,
            DualWriter::Mode2(_) => DualWriterMode::Mode2,
            DualWriter::Mode3(_) => DualWriterMode::Mode3,
            DualWriter::Mode4(_) => DualWriterMode::Mode4,
        }
    }

    fn strategy(&self) -> &dyn Storage {
        match self {
            DualWriter::Mode1(w) => w,
            DualWriter::Mode2(w) => w,
            DualWriter::Mode3(w) => w,
            DualWriter::Mode4(w) => w,
        }
    }
}

/// Records outcome and latency of one dual writer call.
async fn observe<T>(
    mode: DualWriterMode,
    method: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    let started = Instant::now();
    let result = call.await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    DUAL_WRITER_REQUESTS.with_label_values(&[mode.as_str(), method, outcome]).inc();
    DUAL_WRITER_REQUEST_DURATION_MS
        .with_label_values(&[mode.as_str(), method])
        .observe(started.elapsed().as_secs_f64() * 1000.0);
    result
}

pub(crate) fn record_mirror_failure(
    mode: DualWriterMode,
    method: &'static str,
) {
    DUAL_WRITER_MIRROR_FAILURES.with_label_values(&[mode.as_str(), method]).inc();
}

/// Builds the secondary copy of an object from the authoritative result.
///
/// Labels are taken from `submitted` as a whole; its annotations are merged
/// over the result's annotations, `submitted` winning on conflicting keys.
pub(crate) fn enrich_object(
    submitted: &Object,
    mut mirror: Object,
) -> Object {
    mirror.meta.labels = submitted.meta.labels.clone();
    mirror
        .meta
        .annotations
        .extend(submitted.meta.annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
    mirror
}

/// Mirror for a create: identity is assigned by the receiving backend.
pub(crate) fn mirror_for_create(
    submitted: &Object,
    authoritative: Object,
) -> Object {
    let mut mirror = enrich_object(submitted, authoritative);
    mirror.meta.resource_version.clear();
    mirror.meta.uid.clear();
    mirror
}

#[async_trait]
impl Storage for DualWriter {
    async fn create(
        &self,
        ctx: &RequestContext,
        obj: Object,
        create_validation: ValidateObjectFn,
        options: &CreateOptions,
    ) -> Result<Object> {
        observe(
            self.mode(),
            METHOD_CREATE,
            self.strategy().create(ctx, obj, create_validation, options),
        )
        .await
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> Result<Object> {
        observe(self.mode(), METHOD_GET, self.strategy().get(ctx, name, options)).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<ObjectList> {
        observe(self.mode(), METHOD_LIST, self.strategy().list(ctx, options)).await
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
        observe(
            self.mode(),
            METHOD_UPDATE,
            self.strategy().update(
                ctx,
                name,
                obj_info,
                create_validation,
                update_validation,
                force_allow_create,
                options,
            ),
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
        observe(
            self.mode(),
            METHOD_DELETE,
            self.strategy().delete(ctx, name, delete_validation, options),
        )
        .await
    }
}
