//! Storage traits and error types
//!
//! This module defines the job store interface used by the engine and its
//! workers, and the associated error types.

use crate::models::{Job, JobConfig, JobCounters, JobStatus, PageRecord};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Any storage error raised while a job is running is fatal to that job.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid status transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<zip::result::ZipError> for StorageError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Filter for job listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub domain: Option<String>,
}

/// One page of page records plus the total count
#[derive(Debug, Clone, PartialEq)]
pub struct PageList {
    pub pages: Vec<PageRecord>,
    pub total: usize,
}

/// Durable job, page and log persistence
///
/// Manifest mutations are atomic read-modify-write updates serialized per
/// job; counters are incremented, never overwritten. Implementations must be
/// safe to share between the workers of every running job.
pub trait JobStore: Send + Sync {
    // ===== Job Lifecycle =====

    /// Persists a new pending job and registers it
    ///
    /// # Arguments
    ///
    /// * `config` - Validated job configuration
    /// * `domain` - Registrable domain of the seed (storage grouping key)
    fn create(&self, config: JobConfig, domain: &str) -> StorageResult<Job>;

    /// Reads a job manifest
    fn read(&self, job_id: &str) -> StorageResult<Job>;

    /// Lists jobs newest first
    fn list(&self, filter: &JobFilter, limit: usize, offset: usize) -> StorageResult<Vec<Job>>;

    /// Removes every persisted file of a job and unregisters it
    fn delete(&self, job_id: &str) -> StorageResult<()>;

    /// Moves a job to `status`, stamping start/finish times
    ///
    /// Fails with `InvalidTransition` if the move is not allowed.
    fn update_status(&self, job_id: &str, status: JobStatus) -> StorageResult<Job>;

    /// Appends to the job's error list
    fn record_error(&self, job_id: &str, error: &str) -> StorageResult<()>;

    /// Stamps the job as alive, so other engines leave it alone
    fn heartbeat(&self, job_id: &str) -> StorageResult<()>;

    // ===== Progress =====

    /// Adds newly admitted frontier URLs to `pages_found`
    fn add_found(&self, job_id: &str, count: u64) -> StorageResult<JobCounters>;

    /// Writes a page record keyed by the hash of its URL
    ///
    /// Returns true if this URL had no record yet. Re-writing a URL replaces
    /// the record without touching the counters.
    fn append_page(&self, job_id: &str, page: &PageRecord) -> StorageResult<bool>;

    /// Lists page records in crawl order
    fn list_pages(&self, job_id: &str, limit: usize, offset: usize) -> StorageResult<PageList>;

    // ===== Logs and Artifacts =====

    /// Appends a timestamped line to the job log
    fn append_log(&self, job_id: &str, message: &str) -> StorageResult<()>;

    /// Reads the full job log
    fn read_logs(&self, job_id: &str) -> StorageResult<String>;

    /// Stores an asset body; returns its file name within the assets directory
    fn save_asset(
        &self,
        job_id: &str,
        url: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> StorageResult<String>;

    /// Writes `exports/results.jsonl`
    fn export_jsonl(&self, job_id: &str) -> StorageResult<PathBuf>;

    /// Writes `exports/results.zip`
    fn export_archive(&self, job_id: &str) -> StorageResult<PathBuf>;
}
