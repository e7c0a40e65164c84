//! Migration scenarios driven through the public API: two in-memory
//! backends behind a dual writer, observed through a watch on the unified
//! side.

use std::sync::Arc;
use std::time::Duration;

use dual_store::allow_all;
use dual_store::allow_all_updates;
use dual_store::select_dual_writer;
use dual_store::Capabilities;
use dual_store::CreateOptions;
use dual_store::DefaultUpdatedObjectInfo;
use dual_store::DeleteOptions;
use dual_store::DualWriter;
use dual_store::DualWriterMode;
use dual_store::EventType;
use dual_store::GetOptions;
use dual_store::LegacyStorage;
use dual_store::ListOptions;
use dual_store::MemoryStorage;
use dual_store::Object;
use dual_store::RequestContext;
use dual_store::Storage;
use dual_store::UpdateFn;
use dual_store::UpdateOptions;
use dual_store::WatchConfig;
use dual_store::WatchEvent;
use dual_store::WatchHandle;
use dual_store::Watcher;
use tokio::time::timeout;

struct Backends {
    legacy: Arc<MemoryStorage>,
    unified: Arc<MemoryStorage>,
}

impl Backends {
    fn new() -> Self {
        Self {
            legacy: Arc::new(MemoryStorage::new(WatchConfig::default())),
            unified: Arc::new(MemoryStorage::new(WatchConfig::default())),
        }
    }

    fn writer(
        &self,
        mode: DualWriterMode,
    ) -> DualWriter {
        select_dual_writer(mode, self.legacy.clone(), self.unified.clone())
    }
}

fn ctx() -> RequestContext {
    RequestContext::namespaced("ns1")
}

async fn next(handle: &mut WatchHandle) -> WatchEvent {
    timeout(Duration::from_secs(1), handle.recv())
        .await
        .expect("timed out waiting for watch event")
        .expect("watch closed")
}

async fn put(
    writer: &DualWriter,
    obj: Object,
) -> Object {
    let name = obj.name().to_string();
    writer
        .update(
            &ctx(),
            &name,
            Arc::new(DefaultUpdatedObjectInfo::new(obj)),
            allow_all(),
            allow_all_updates(),
            false,
            &UpdateOptions::default(),
        )
        .await
        .unwrap()
        .0
}

#[tokio::test]
async fn test_mode2_mirrors_writes_into_unified_watchers() {
    let backends = Backends::new();
    let writer = backends.writer(DualWriterMode::Mode2);
    let mut watch = backends
        .unified
        .watch(
            &ctx(),
            &ListOptions {
                label_selector: "app=web".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let created = writer
        .create(
            &ctx(),
            Object::new("foo").with_label("app", "web"),
            allow_all(),
            &CreateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(created.namespace(), "ns1");

    let ev = next(&mut watch).await;
    assert_eq!(ev.event_type, EventType::Added);
    assert_eq!(ev.object.name(), "foo");

    // Both backends hold their own copy.
    assert!(Storage::get(backends.legacy.as_ref(), &ctx(), "foo", &GetOptions::default())
        .await
        .is_ok());
    assert_eq!(backends.unified.len().await, 1);

    let updated = put(
        &writer,
        Object::new("foo").with_label("app", "web").with_annotation("owner", "me"),
    )
    .await;
    assert_eq!(updated.meta.uid, created.meta.uid);

    let ev = next(&mut watch).await;
    assert_eq!(ev.event_type, EventType::Modified);
    assert_eq!(ev.object.meta.annotations.get("owner").map(String::as_str), Some("me"));

    // Leaving the selector is reported as a delete.
    put(&writer, Object::new("foo").with_label("app", "db")).await;
    assert_eq!(next(&mut watch).await.event_type, EventType::Deleted);

    writer
        .delete(&ctx(), "foo", allow_all(), &DeleteOptions::default())
        .await
        .unwrap();
    assert!(backends.legacy.is_empty().await);
    assert!(backends.unified.is_empty().await);

    watch.stop().await;
}

#[tokio::test]
async fn test_mode2_transform_update_after_legacy_only_history() {
    let backends = Backends::new();
    backends
        .writer(DualWriterMode::Mode1)
        .create(&ctx(), Object::new("old"), allow_all(), &CreateOptions::default())
        .await
        .unwrap();

    // Legacy revisions now run ahead of unified ones.
    let writer = backends.writer(DualWriterMode::Mode2);
    writer
        .create(&ctx(), Object::new("b"), allow_all(), &CreateOptions::default())
        .await
        .unwrap();

    let (obj, created) = writer
        .update(
            &ctx(),
            "b",
            Arc::new(UpdateFn::new(|old: &Object| Ok(old.clone().with_label("app", "web")))),
            allow_all(),
            allow_all_updates(),
            false,
            &UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(obj.resource_version(), "2");
    assert_eq!(obj.meta.labels.get("app").map(String::as_str), Some("web"));

    let legacy_b = Storage::get(backends.legacy.as_ref(), &ctx(), "b", &GetOptions::default())
        .await
        .unwrap();
    assert_eq!(legacy_b.resource_version(), "3");
    assert_eq!(legacy_b.meta.labels.get("app").map(String::as_str), Some("web"));
}

#[tokio::test]
async fn test_mode2_reads_fall_back_to_legacy() {
    let backends = Backends::new();
    LegacyStorage::create(
        backends.legacy.as_ref(),
        &ctx(),
        Object::new("legacy-only"),
        allow_all(),
        &CreateOptions::default(),
    )
    .await
    .unwrap();

    let writer = backends.writer(DualWriterMode::Mode2);
    writer
        .create(
            &ctx(),
            Object::new("both").with_annotation("owner", "me"),
            allow_all(),
            &CreateOptions::default(),
        )
        .await
        .unwrap();

    let obj = writer.get(&ctx(), "legacy-only", &GetOptions::default()).await.unwrap();
    assert_eq!(obj.name(), "legacy-only");

    let list = writer.list(&ctx(), &ListOptions::default()).await.unwrap();
    let names: Vec<_> = list.items.iter().map(|o| o.name().to_string()).collect();
    assert_eq!(names, vec!["both".to_string(), "legacy-only".to_string()]);

    let err = writer.get(&ctx(), "missing", &GetOptions::default()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_migration_from_mode2_to_mode4_keeps_unified_authoritative() {
    let backends = Backends::new();

    let mode2 = backends.writer(DualWriterMode::Mode2);
    mode2
        .create(&ctx(), Object::new("a"), allow_all(), &CreateOptions::default())
        .await
        .unwrap();

    // Unified becomes authoritative; legacy only receives mirrors.
    let mode3 = backends.writer(DualWriterMode::Mode3);
    mode3
        .create(&ctx(), Object::new("b"), allow_all(), &CreateOptions::default())
        .await
        .unwrap();
    put(&mode3, Object::new("a").with_label("stage", "3")).await;
    let legacy_a = Storage::get(backends.legacy.as_ref(), &ctx(), "a", &GetOptions::default())
        .await
        .unwrap();
    assert_eq!(legacy_a.meta.labels.get("stage").map(String::as_str), Some("3"));

    let mut watch = backends
        .unified
        .watch(&ctx(), &ListOptions::default())
        .await
        .unwrap();
    let mut initial = vec![next(&mut watch).await, next(&mut watch).await];
    initial.sort_by(|x, y| x.object.name().cmp(y.object.name()));
    assert!(initial.iter().all(|ev| ev.event_type == EventType::Added));
    assert_eq!(initial[0].object.name(), "a");
    assert_eq!(initial[1].object.name(), "b");

    let mode4 = backends.writer(DualWriterMode::Mode4);
    mode4
        .delete(&ctx(), "a", allow_all(), &DeleteOptions::default())
        .await
        .unwrap();
    assert_eq!(next(&mut watch).await.event_type, EventType::Deleted);

    // Legacy is no longer written to.
    assert_eq!(backends.legacy.len().await, 2);
    assert_eq!(backends.unified.len().await, 1);

    backends.unified.shutdown().await;
    assert!(timeout(Duration::from_secs(1), watch.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_mode3_tolerates_read_only_legacy() {
    let legacy = Arc::new(MemoryStorage::new(WatchConfig::default()).with_capabilities(Capabilities::read_only()));
    let unified = Arc::new(MemoryStorage::new(WatchConfig::default()));
    let writer = select_dual_writer(DualWriterMode::Mode3, legacy.clone(), unified.clone());

    writer
        .create(&ctx(), Object::new("foo"), allow_all(), &CreateOptions::default())
        .await
        .unwrap();
    writer
        .delete(&ctx(), "foo", allow_all(), &DeleteOptions::default())
        .await
        .unwrap();

    assert!(legacy.is_empty().await);
    assert!(unified.is_empty().await);
}
