mod memory_storage;

#[doc(hidden)]
pub use memory_storage::*;
