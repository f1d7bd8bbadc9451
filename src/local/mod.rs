//! Local backup store.
//!
//! Two independently keyed collections (`images`, `notes`) in a versioned
//! directory. Records are sharded by the SHA-256 of their key, like Git
//! objects, and every file carries a CRC32 of its payload.

mod format;
mod storage;

pub use storage::{Availability, LocalStore, LocalStoreConfig, SCHEMA_VERSION};
