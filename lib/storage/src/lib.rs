//! Persistent [`Store`](ontomatch_core::Store) implementations.

pub mod lmdb_store;

pub use lmdb_store::{LmdbStore, DEFAULT_MAP_SIZE};
