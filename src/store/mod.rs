pub mod keys;
pub mod kv;
pub mod policy_store;

pub use kv::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use policy_store::PolicyStore;
