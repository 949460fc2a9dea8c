//! Shared value types for jobs and pages
//!
//! - `JobConfig`, `ScopePolicy`: validated per-job settings
//! - `Job`, `JobCounters`, `JobStatus`: the manifest and its lifecycle
//! - `PageRecord`, `SkipReason`: the outcome of one fetch attempt

mod job;
mod page;
mod status;

pub use job::{CustomPatterns, Job, JobConfig, JobCounters, ScopePolicy};
pub use page::{PageRecord, SkipReason};
pub use status::JobStatus;
