//! Object-store seam for exchange records and health results.
//!
//! The relay treats the store as a best-effort, fire-and-forget dependency:
//! callers log failures and move on, nothing here retries.

pub mod fs;
pub mod memory;
pub mod store;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use store::{JSON_CONTENT_TYPE, ObjectStore, SharedObjectStore, StorageError, StorageResult, put_json};
