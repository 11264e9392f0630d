pub mod connection;
pub mod keys;
pub mod kv;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, ping, DbPool};
pub use kv::{scan_prefix, InMemoryKeyValueStore, KeyValueStore, KvError, SqlKeyValueStore};
pub use repositories::{ApprovalRepository, ApprovalStore, RecordListing, SkippedRecord};
