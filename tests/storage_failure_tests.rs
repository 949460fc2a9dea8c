//! A job whose store stops accepting writes must end up `failed`

mod common;

use common::{engine_config, job_config, FakeSite};
use std::path::PathBuf;
use std::sync::Arc;
use sumi_sitecrawl::models::{Job, JobConfig, JobCounters, JobStatus, PageRecord};
use sumi_sitecrawl::storage::{
    FsJobStore, JobFilter, JobStore, PageList, StorageError, StorageResult,
};
use sumi_sitecrawl::CrawlEngine;

/// Delegates to a real store, but rejects every page write
struct BrokenDisk {
    inner: FsJobStore,
}

impl JobStore for BrokenDisk {
    fn create(&self, config: JobConfig, domain: &str) -> StorageResult<Job> {
        self.inner.create(config, domain)
    }

    fn read(&self, job_id: &str) -> StorageResult<Job> {
        self.inner.read(job_id)
    }

    fn list(&self, filter: &JobFilter, limit: usize, offset: usize) -> StorageResult<Vec<Job>> {
        self.inner.list(filter, limit, offset)
    }

    fn delete(&self, job_id: &str) -> StorageResult<()> {
        self.inner.delete(job_id)
    }

    fn update_status(&self, job_id: &str, status: JobStatus) -> StorageResult<Job> {
        self.inner.update_status(job_id, status)
    }

    fn record_error(&self, job_id: &str, error: &str) -> StorageResult<()> {
        self.inner.record_error(job_id, error)
    }

    fn heartbeat(&self, job_id: &str) -> StorageResult<()> {
        self.inner.heartbeat(job_id)
    }

    fn add_found(&self, job_id: &str, count: u64) -> StorageResult<JobCounters> {
        self.inner.add_found(job_id, count)
    }

    fn append_page(&self, job_id: &str, page: &PageRecord) -> StorageResult<bool> {
        let _ = (job_id, page);
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }

    fn list_pages(&self, job_id: &str, limit: usize, offset: usize) -> StorageResult<PageList> {
        self.inner.list_pages(job_id, limit, offset)
    }

    fn append_log(&self, job_id: &str, message: &str) -> StorageResult<()> {
        self.inner.append_log(job_id, message)
    }

    fn read_logs(&self, job_id: &str) -> StorageResult<String> {
        self.inner.read_logs(job_id)
    }

    fn save_asset(
        &self,
        job_id: &str,
        url: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> StorageResult<String> {
        self.inner.save_asset(job_id, url, bytes, content_type)
    }

    fn export_jsonl(&self, job_id: &str) -> StorageResult<PathBuf> {
        self.inner.export_jsonl(job_id)
    }

    fn export_archive(&self, job_id: &str) -> StorageResult<PathBuf> {
        self.inner.export_archive(job_id)
    }
}

#[tokio::test]
async fn test_storage_error_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(BrokenDisk {
        inner: FsJobStore::open(dir.path()).unwrap(),
    });
    let site = Arc::new(
        FakeSite::new()
            .page("https://site.test/", &["/a"])
            .page("https://site.test/a", &[]),
    );
    let engine = CrawlEngine::with_store(engine_config(dir.path()), store, site).unwrap();

    let job_id = engine.start_job(job_config("https://site.test/")).unwrap();
    let job = engine.wait(&job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors[0].contains("disk full"), "{:?}", job.errors);
    assert_eq!(job.counters.pages_crawled, 0);
    assert!(engine.get_logs(&job_id).unwrap().contains("Status changed to failed"));
}
