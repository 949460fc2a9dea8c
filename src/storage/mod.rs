//! Storage module for persisting crawl jobs
//!
//! This module handles all durable state of the engine, including:
//! - One directory per job holding its manifest, log and page records
//! - Atomic, per-job serialized manifest updates
//! - The SQLite job registry used for lookup and listing
//! - JSONL and zip exports

mod export;
mod fs;
mod registry;
mod schema;
mod traits;

pub use fs::{url_key, FsJobStore};
pub use registry::{JobRegistry, RegistryEntry};
pub use traits::{JobFilter, JobStore, PageList, StorageError, StorageResult};
