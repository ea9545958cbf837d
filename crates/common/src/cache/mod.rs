//! Query-cache contract, in-memory store, and optimistic update utilities.

pub mod optimistic;
pub mod store;

pub use optimistic::{
    begin_optimistic, current_object, object_exists, shallow_merge, write_object,
    OptimisticUpdate,
};
pub use store::{MemoryStore, MemoryStoreConfig, QueryKey, QueryStore, SizeHint, StoreStats};
