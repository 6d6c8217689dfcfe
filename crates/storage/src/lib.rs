//! Performance registry for the self-optimization engine.
//!
//! This crate provides the `PerformanceStore` trait with an in-memory
//! implementation and a JSON-file implementation.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod json_storage;

pub use trait_::{PerformanceStore, RecordUpdate, Result, StorageError};
pub use memory::InMemoryStore;
pub use json_storage::JsonStore;
