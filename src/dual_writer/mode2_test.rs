use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing_test::traced_test;

use crate::allow_all;
use crate::allow_all_updates;
use crate::select_dual_writer;
use crate::test_utils::mock_legacy;
use crate::test_utils::test_ctx;
use crate::Capabilities;
use crate::CapabilityError;
use crate::CreateOptions;
use crate::DeleteOptions;
use crate::DualWriter;
use crate::DualWriterMode;
use crate::Error;
use crate::GetOptions;
use crate::ListMeta;
use crate::ListOptions;
use crate::MockLegacyStorage;
use crate::MockStorage;
use crate::Object;
use crate::ObjectList;
use crate::RequestContext;
use crate::Storage;
use crate::StorageError;
use crate::UpdateFn;
use crate::UpdateOptions;

fn mode2(
    legacy: MockLegacyStorage,
    storage: MockStorage,
) -> DualWriter {
    select_dual_writer(DualWriterMode::Mode2, Arc::new(legacy), Arc::new(storage))
}

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn backend_error() -> Error {
    StorageError::Backend("boom".to_string()).into()
}

#[tokio::test]
#[traced_test]
async fn test_mode2_create_mirrors_legacy_result() {
    let submitted = Object::new("foo")
        .with_label("app", "submitted")
        .with_annotation("x", "submitted");

    let mut legacy = mock_legacy(Capabilities::all());
    legacy.expect_create().times(1).returning(|_, _, _, _| {
        Ok(Object::new("foo")
            .with_resource_version("1")
            .with_uid("legacy-uid")
            .with_label("app", "legacy")
            .with_label("tier", "legacy")
            .with_annotation("x", "legacy")
            .with_annotation("y", "legacy")
            .with_payload("legacy-payload"))
    });

    let mut storage = MockStorage::new();
    storage
        .expect_create()
        .times(1)
        .withf(|_, mirror, _, _| {
            mirror.resource_version().is_empty()
                && mirror.meta.uid.is_empty()
                && mirror.meta.labels == map(&[("app", "submitted")])
                && mirror.meta.annotations == map(&[("x", "submitted"), ("y", "legacy")])
                && mirror.payload == "legacy-payload"
        })
        .returning(|_, mirror, _, _| Ok(mirror.with_resource_version("7").with_uid("unified-uid")));

    let obj = mode2(legacy, storage)
        .create(&test_ctx(), submitted, allow_all(), &CreateOptions::default())
        .await
        .unwrap();

    // The caller sees the unified copy
    assert_eq!(obj.resource_version(), "7");
    assert_eq!(obj.meta.uid, "unified-uid");
}

#[tokio::test]
#[traced_test]
async fn test_mode2_create_legacy_failure_skips_unified() {
    let mut legacy = mock_legacy(Capabilities::all());
    legacy.expect_create().returning(|_, _, _, _| Err(backend_error()));
    let mut storage = MockStorage::new();
    storage.expect_create().never();

    let err = mode2(legacy, storage)
        .create(&test_ctx(), Object::new("foo"), allow_all(), &CreateOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Storage(StorageError::Backend(_))));
}

#[tokio::test]
#[traced_test]
async fn test_mode2_create_unified_failure_is_surfaced() {
    let mut legacy = mock_legacy(Capabilities::all());
    legacy.expect_create().returning(|_, obj, _, _| Ok(obj.with_resource_version("1")));
    let mut storage = MockStorage::new();
    storage
        .expect_create()
        .returning(|_, obj, _, _| Err(StorageError::AlreadyExists { name: obj.meta.name }.into()));

    let err = mode2(legacy, storage)
        .create(&test_ctx(), Object::new("foo"), allow_all(), &CreateOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_already_exists());
    assert!(logs_contain("unable to create object in unified storage"));
}

#[tokio::test]
async fn test_mode2_create_without_capability() {
    let mut legacy = mock_legacy(Capabilities::read_only());
    legacy.expect_create().never();
    let mut storage = MockStorage::new();
    storage.expect_create().never();

    let err = mode2(legacy, storage)
        .create(&test_ctx(), Object::new("foo"), allow_all(), &CreateOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Capability(CapabilityError::NoCreateMethod)));
}

#[tokio::test]
async fn test_mode2_get_prefers_unified() {
    let legacy = {
        let mut legacy = mock_legacy(Capabilities::all());
        legacy.expect_get().never();
        legacy
    };
    let mut storage = MockStorage::new();
    storage
        .expect_get()
        .returning(|_, name, _| Ok(Object::new(name).with_resource_version("3")));

    let obj = mode2(legacy, storage)
        .get(&test_ctx(), "foo", &GetOptions::default())
        .await
        .unwrap();

    assert_eq!(obj.resource_version(), "3");
}

#[tokio::test]
#[traced_test]
async fn test_mode2_get_falls_back_to_legacy() {
    let mut legacy = mock_legacy(Capabilities::all());
    legacy
        .expect_get()
        .times(2)
        .returning(|_, name, _| Ok(Object::new(name).with_resource_version("legacy")));

    let mut storage = MockStorage::new();
    storage
        .expect_get()
        .withf(|_, name, _| name == "missing")
        .returning(|_, name, _| Err(StorageError::not_found(name).into()));
    storage
        .expect_get()
        .withf(|_, name, _| name == "broken")
        .returning(|_, _, _| Err(backend_error()));

    let dw = mode2(legacy, storage);

    let obj = dw.get(&test_ctx(), "missing", &GetOptions::default()).await.unwrap();
    assert_eq!(obj.resource_version(), "legacy");
    assert!(logs_contain("object not found in unified storage"));

    let obj = dw.get(&test_ctx(), "broken", &GetOptions::default()).await.unwrap();
    assert_eq!(obj.resource_version(), "legacy");
    assert!(logs_contain("unable to fetch object from unified storage"));
}

#[tokio::test]
async fn test_mode2_get_fails_only_when_both_fail() {
    let mut legacy = mock_legacy(Capabilities::all());
    legacy
        .expect_get()
        .returning(|_, name, _| Err(StorageError::not_found(name).into()));
    let mut storage = MockStorage::new();
    storage.expect_get().returning(|_, _, _| Err(backend_error()));

    let err = mode2(legacy, storage)
        .get(&test_ctx(), "foo", &GetOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_mode2_list_merges_by_legacy_order() {
    let mut legacy = mock_legacy(Capabilities::all());
    legacy.expect_list().returning(|_, _| {
        Ok(ObjectList {
            meta: ListMeta {
                resource_version: "legacy-rv".to_string(),
                continue_token: "next".to_string(),
                remaining_item_count: Some(4),
            },
            items: vec![
                Object::new("a").with_resource_version("l1"),
                Object::new("b").with_resource_version("l2"),
                Object::new("c").with_resource_version("l3"),
            ],
        })
    });

    let mut storage = MockStorage::new();
    storage.expect_list().returning(|_, _| {
        Ok(ObjectList::new(vec![
            Object::new("d").with_resource_version("u4"),
            Object::new("b").with_resource_version("u2"),
        ]))
    });

    let list = mode2(legacy, storage)
        .list(&test_ctx(), &ListOptions::default())
        .await
        .unwrap();

    let got: Vec<_> = list
        .items
        .iter()
        .map(|o| (o.name(), o.resource_version()))
        .collect();
    assert_eq!(got, vec![("a", "l1"), ("b", "u2"), ("c", "l3")]);
    assert_eq!(list.meta.resource_version, "legacy-rv");
    assert_eq!(list.meta.continue_token, "next");
}

#[tokio::test]
async fn test_mode2_cluster_list_keeps_namespaces_apart() {
    let mut legacy = mock_legacy(Capabilities::all());
    legacy.expect_list().returning(|_, _| {
        Ok(ObjectList::new(vec![
            Object::new("a").with_namespace("ns1").with_resource_version("l1"),
            Object::new("a").with_namespace("ns2").with_resource_version("l2"),
        ]))
    });

    let mut storage = MockStorage::new();
    storage.expect_list().returning(|_, _| {
        Ok(ObjectList::new(vec![Object::new("a")
            .with_namespace("ns2")
            .with_resource_version("u2")]))
    });

    let list = mode2(legacy, storage)
        .list(&RequestContext::cluster(), &ListOptions::default())
        .await
        .unwrap();

    let got: Vec<_> = list
        .items
        .iter()
        .map(|o| (o.namespace(), o.resource_version()))
        .collect();
    assert_eq!(got, vec![("ns1", "l1"), ("ns2", "u2")]);
}

#[tokio::test]
async fn test_mode2_list_errors() {
    let legacy = mock_legacy(Capabilities {
        list: false,
        ..Capabilities::all()
    });
    let mut storage = MockStorage::new();
    storage.expect_list().never();
    let err = mode2(legacy, storage)
        .list(&test_ctx(), &ListOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Capability(CapabilityError::ListerMissing)));

    let mut legacy = mock_legacy(Capabilities::all());
    legacy.expect_list().returning(|_, _| Ok(ObjectList::default()));
    let mut storage = MockStorage::new();
    storage.expect_list().returning(|_, _| Err(backend_error()));
    let err = mode2(legacy, storage)
        .list(&test_ctx(), &ListOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(StorageError::Backend(_))));
}

#[tokio::test]
#[traced_test]
async fn test_mode2_delete_resilience() {
    // legacy ok, unified misses the object: legacy result wins
    let mut legacy = mock_legacy(Capabilities::all());
    legacy
        .expect_delete()
        .withf(|_, name, _, _| name == "foo")
        .returning(|_, name, _, _| Ok((Object::new(name).with_resource_version("l9"), true)));
    // legacy misses the object: unified is still cleaned up
    legacy
        .expect_delete()
        .withf(|_, name, _, _| name == "only-unified")
        .returning(|_, name, _, _| Err(StorageError::not_found(name).into()));
    // legacy broken: unified untouched
    legacy
        .expect_delete()
        .withf(|_, name, _, _| name == "broken")
        .returning(|_, _, _, _| Err(backend_error()));

    let mut storage = MockStorage::new();
    storage
        .expect_delete()
        .withf(|_, name, _, _| name == "foo")
        .times(1)
        .returning(|_, name, _, _| Err(StorageError::not_found(name).into()));
    storage
        .expect_delete()
        .withf(|_, name, _, _| name == "only-unified")
        .times(1)
        .returning(|_, _, _, _| Err(backend_error()));
    storage
        .expect_delete()
        .withf(|_, name, _, _| name == "broken")
        .never();

    let dw = mode2(legacy, storage);

    let (obj, _) = dw
        .delete(&test_ctx(), "foo", allow_all(), &DeleteOptions::default())
        .await
        .unwrap();
    assert_eq!(obj.resource_version(), "l9");

    let err = dw
        .delete(&test_ctx(), "only-unified", allow_all(), &DeleteOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(logs_contain("could not delete from unified storage"));

    let err = dw
        .delete(&test_ctx(), "broken", allow_all(), &DeleteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(StorageError::Backend(_))));
}

#[tokio::test]
async fn test_mode2_update_computes_once_and_mirrors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let obj_info = {
        let calls = calls.clone();
        Arc::new(UpdateFn::new(move |old: &Object| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(old
                .clone()
                .with_label("app", "web")
                .with_annotation("x", "updated")
                .with_resource_version(""))
        }))
    };

    let mut storage = MockStorage::new();
    storage.expect_get().returning(|_, name, _| {
        Ok(Object::new(name)
            .with_resource_version("5")
            .with_uid("unified-uid")
            .with_annotation("x", "old"))
    });
    storage
        .expect_update()
        .times(1)
        .withf(|_, _, obj_info, _, _, _, _| {
            let mirror = obj_info.updated_object(&Object::default()).unwrap();
            mirror.resource_version() == "5"
                && mirror.meta.uid == "unified-uid"
                && mirror.meta.labels == map(&[("app", "web")])
                && mirror.meta.annotations == map(&[("x", "updated"), ("y", "legacy")])
        })
        .returning(|_, _, obj_info, _, _, _, _| {
            let mirror = obj_info.updated_object(&Object::default())?;
            Ok((mirror.with_resource_version("6"), false))
        });

    let mut legacy = mock_legacy(Capabilities::all());
    legacy
        .expect_update()
        .times(1)
        .returning(|_, _, obj_info, _, _, _, _| {
            // The forced update ignores whatever the backend passes in
            let updated = obj_info.updated_object(&Object::new("ignored"))?;
            assert_eq!(updated.meta.labels.get("app").map(String::as_str), Some("web"));
            Ok((
                updated
                    .with_resource_version("40")
                    .with_uid("legacy-uid")
                    .with_annotation("y", "legacy"),
                false,
            ))
        });

    let (obj, created) = mode2(legacy, storage)
        .update(
            &test_ctx(),
            "foo",
            obj_info,
            allow_all(),
            allow_all_updates(),
            false,
            &UpdateOptions::default(),
        )
        .await
        .unwrap();

    assert!(!created);
    assert_eq!(obj.resource_version(), "6");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mode2_update_legacy_failure_skips_unified() {
    let mut storage = MockStorage::new();
    storage
        .expect_get()
        .returning(|_, name, _| Ok(Object::new(name).with_resource_version("5")));
    storage.expect_update().never();

    let mut legacy = mock_legacy(Capabilities::all());
    legacy
        .expect_update()
        .returning(|_, name, _, _, _, _, _| Err(StorageError::not_found(name).into()));

    let err = mode2(legacy, storage)
        .update(
            &test_ctx(),
            "foo",
            Arc::new(UpdateFn::new(|old: &Object| Ok(old.clone()))),
            allow_all(),
            allow_all_updates(),
            false,
            &UpdateOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_mode2_update_without_current_object() {
    let mut legacy = mock_legacy(Capabilities::all());
    legacy
        .expect_get()
        .returning(|_, name, _| Err(StorageError::not_found(name).into()));
    legacy.expect_update().never();
    let mut storage = MockStorage::new();
    storage
        .expect_get()
        .returning(|_, name, _| Err(StorageError::not_found(name).into()));
    storage.expect_update().never();

    let err = mode2(legacy, storage)
        .update(
            &test_ctx(),
            "foo",
            Arc::new(UpdateFn::new(|old: &Object| Ok(old.clone()))),
            allow_all(),
            allow_all_updates(),
            true,
            &UpdateOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}
