use crate::Capabilities;
use crate::MockLegacyStorage;
use crate::MockStorage;
use crate::RequestContext;

pub(crate) fn test_ctx() -> RequestContext {
    RequestContext::namespaced("default")
}

/// Legacy mock reporting `capabilities` on every probe.
pub(crate) fn mock_legacy(capabilities: Capabilities) -> MockLegacyStorage {
    let mut legacy = MockLegacyStorage::new();
    legacy.expect_capabilities().return_const(capabilities);
    legacy
}

/// Unified mock that fails the test if any method is called.
pub(crate) fn untouched_storage() -> MockStorage {
    let mut storage = MockStorage::new();
    storage.expect_create().never();
    storage.expect_get().never();
    storage.expect_list().never();
    storage.expect_update().never();
    storage.expect_delete().never();
    storage
}

/// Legacy mock that fails the test if any data method is called.
pub(crate) fn untouched_legacy() -> MockLegacyStorage {
    let mut legacy = MockLegacyStorage::new();
    legacy.expect_capabilities().never();
    legacy.expect_create().never();
    legacy.expect_get().never();
    legacy.expect_list().never();
    legacy.expect_update().never();
    legacy.expect_delete().never();
    legacy
}
