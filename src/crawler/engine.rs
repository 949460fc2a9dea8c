//! Crawl engine: the job lifecycle operations
//!
//! The engine owns the process-wide resources shared by every job (robots
//! cache, rate limiter, global fetch ceiling, job store, extractor) and the
//! table of running jobs. Callers interact with it through job ids only.

use crate::config::{validate, validate_job_config, EngineConfig};
use crate::crawler::backoff::ExponentialBackoff;
use crate::crawler::extractor::Extractor;
use crate::crawler::fetcher::build_http_client;
use crate::crawler::orchestrator::JobRunner;
use crate::models::{Job, JobConfig, JobStatus};
use crate::ratelimit::RateLimiter;
use crate::robots::RobotsManager;
use crate::storage::{FsJobStore, JobFilter, JobStore, PageList};
use crate::url::{registrable_domain, Normalizer};
use crate::{CrawlError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Error recorded on jobs found unfinished at startup with no pages
pub const INTERRUPTED_ERROR: &str = "interrupted before completion";

/// Fetch tuning taken from the engine configuration
#[derive(Debug, Clone)]
pub(crate) struct FetchSettings {
    pub fetch_timeout: Duration,
    pub max_retries: u32,
    pub backoff: ExponentialBackoff,
    pub max_asset_bytes: u64,
    pub progress_interval: Duration,
}

/// Resources shared by all jobs in the process
pub(crate) struct Resources {
    pub store: Arc<dyn JobStore>,
    pub extractor: Arc<dyn Extractor>,
    pub robots: RobotsManager,
    pub limiter: RateLimiter,
    /// Global ceiling on concurrent extractor calls across all jobs
    pub fetch_permits: Semaphore,
    pub settings: FetchSettings,
}

/// Result of a StopJob request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The job was running and has now unwound to `stopped`
    Stopped,
    /// The job had already finished; nothing changed
    AlreadyTerminal(JobStatus),
}

struct ActiveJob {
    stop: CancellationToken,
    done: watch::Receiver<Option<JobStatus>>,
}

type ActiveJobs = Arc<Mutex<HashMap<String, ActiveJob>>>;

/// The crawl orchestration engine
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use sumi_sitecrawl::{CrawlEngine, EngineConfig, HttpExtractor, JobConfig};
///
/// # async fn run() -> sumi_sitecrawl::Result<()> {
/// let config = EngineConfig::default();
/// let extractor = HttpExtractor::from_config(&config.user_agent, std::time::Duration::from_secs(30))?;
/// let engine = CrawlEngine::new(config, Arc::new(extractor))?;
///
/// let job_id = engine.start_job(JobConfig::new("https://example.com/"))?;
/// let job = engine.wait(&job_id).await?;
/// println!("{} pages crawled", job.counters.pages_crawled);
/// # Ok(())
/// # }
/// ```
pub struct CrawlEngine {
    resources: Arc<Resources>,
    active: ActiveJobs,
    /// Heartbeat age after which a persisted job counts as abandoned
    stale_after: chrono::Duration,
}

impl CrawlEngine {
    /// Creates an engine persisting jobs under the configured data directory
    ///
    /// Unfinished jobs whose owner stopped sending heartbeats are finalized
    /// first.
    pub fn new(config: EngineConfig, extractor: Arc<dyn Extractor>) -> Result<Self> {
        let store = FsJobStore::open(&config.engine.data_dir)?;
        Self::with_store(config, Arc::new(store), extractor)
    }

    /// Opens the data directory without finalizing any job
    ///
    /// For processes that inspect or manage jobs another engine may be
    /// crawling.
    pub fn attach(config: EngineConfig, extractor: Arc<dyn Extractor>) -> Result<Self> {
        let store = FsJobStore::open(&config.engine.data_dir)?;
        Self::build(config, Arc::new(store), extractor)
    }

    /// Creates an engine on top of an arbitrary job store
    ///
    /// Jobs the store still reports as pending or running, and whose last
    /// heartbeat is older than `stale-job-secs`, are finalized since no
    /// engine is driving them any more.
    pub fn with_store(
        config: EngineConfig,
        store: Arc<dyn JobStore>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        let engine = Self::build(config, store, extractor)?;
        recover_unfinished_jobs(engine.resources.store.as_ref(), engine.stale_after)?;
        Ok(engine)
    }

    fn build(
        config: EngineConfig,
        store: Arc<dyn JobStore>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        validate(&config)?;

        let engine = &config.engine;
        let robots_client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.robots.fetch_timeout_secs),
        )?;
        let robots = RobotsManager::new(
            robots_client,
            config.user_agent.crawler_name.clone(),
            Duration::from_secs(config.robots.cache_ttl_secs),
            Duration::from_secs(config.robots.fetch_timeout_secs),
        );

        let resources = Resources {
            store,
            extractor,
            robots,
            limiter: RateLimiter::new(Duration::from_secs(config.rate_limit.bucket_idle_secs)),
            fetch_permits: Semaphore::new(engine.max_concurrent_fetches as usize),
            settings: FetchSettings {
                fetch_timeout: Duration::from_secs(engine.fetch_timeout_secs),
                max_retries: engine.max_retries,
                backoff: ExponentialBackoff::new(engine.retry_base_delay_ms, engine.retry_max_delay_ms),
                max_asset_bytes: engine.max_asset_bytes,
                progress_interval: Duration::from_secs(engine.progress_interval_secs),
            },
        };

        Ok(Self {
            resources: Arc::new(resources),
            active: Arc::new(Mutex::new(HashMap::new())),
            stale_after: chrono::Duration::seconds(
                i64::try_from(engine.stale_job_secs).unwrap_or(i64::MAX),
            ),
        })
    }

    /// Validates `config`, persists a pending job and starts crawling it
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// * `CrawlError::Validation` - bad start URL or out-of-range limits;
    ///   no job is created
    /// * `CrawlError::Storage` - the job could not be persisted
    pub fn start_job(&self, config: JobConfig) -> Result<String> {
        validate_job_config(&config).map_err(|e| CrawlError::Validation(e.to_string()))?;
        let seed = Normalizer::new(&config.ignore_query_params)
            .normalize(&config.start_url, None)
            .map_err(|e| CrawlError::Validation(e.to_string()))?;
        let domain = registrable_domain(&seed).unwrap_or_else(|| "unknown".to_string());

        let job = self.resources.store.create(config, &domain)?;
        let job_id = job.id.clone();
        tracing::info!("Starting job {} for {}", job_id, job.config.start_url);

        let stop = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);
        self.lock_active().insert(
            job_id.clone(),
            ActiveJob {
                stop: stop.clone(),
                done: done_rx,
            },
        );

        let runner = JobRunner::new(Arc::clone(&self.resources), job, stop);
        let active = Arc::clone(&self.active);
        tokio::spawn(async move {
            let job_id = runner.job_id().to_string();
            let status = runner.run().await;
            active
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&job_id);
            done_tx.send_replace(Some(status));
        });

        Ok(job_id)
    }

    /// Returns the persisted job: status, counters, timestamps and errors
    pub fn get_status(&self, job_id: &str) -> Result<Job> {
        Ok(self.resources.store.read(job_id)?)
    }

    /// Requests a job stop and waits until its in-flight work has unwound
    ///
    /// Idempotent: a job that already finished (including one stopped by an
    /// earlier call) reports `AlreadyTerminal`.
    pub async fn stop_job(&self, job_id: &str) -> Result<StopOutcome> {
        let running = self.lock_active().get(job_id).map(|active| {
            let first_request = !active.stop.is_cancelled();
            active.stop.cancel();
            (first_request, active.done.clone())
        });

        let Some((first_request, mut done)) = running else {
            let job = self.resources.store.read(job_id)?;
            if job.status.is_terminal() {
                return Ok(StopOutcome::AlreadyTerminal(job.status));
            }
            if !job.is_orphaned(self.stale_after, Utc::now()) {
                return Err(CrawlError::OwnedElsewhere(job_id.to_string()));
            }
            self.resources.store.update_status(job_id, JobStatus::Stopped)?;
            return Ok(StopOutcome::Stopped);
        };

        tracing::info!("Stop requested for job {}", job_id);
        let status = wait_done(&mut done).await;
        match status {
            Some(JobStatus::Stopped) if first_request => Ok(StopOutcome::Stopped),
            Some(status) => Ok(StopOutcome::AlreadyTerminal(status)),
            None => {
                let job = self.resources.store.read(job_id)?;
                Ok(StopOutcome::AlreadyTerminal(job.status))
            }
        }
    }

    /// Removes all persisted data of a finished job
    ///
    /// # Errors
    ///
    /// * `CrawlError::NotFound` - unknown job id
    /// * `CrawlError::JobRunning` - the job is still active; stop it first
    /// * `CrawlError::OwnedElsewhere` - another live engine is crawling it
    pub fn delete_job(&self, job_id: &str) -> Result<()> {
        if self.lock_active().contains_key(job_id) {
            return Err(CrawlError::JobRunning(job_id.to_string()));
        }
        let job = self.resources.store.read(job_id)?;
        if !job.status.is_terminal() && !job.is_orphaned(self.stale_after, Utc::now()) {
            return Err(CrawlError::OwnedElsewhere(job_id.to_string()));
        }
        self.resources.store.delete(job_id)?;
        tracing::info!("Deleted job {}", job_id);
        Ok(())
    }

    /// Lists jobs newest first
    pub fn list_jobs(&self, filter: &JobFilter, limit: usize, offset: usize) -> Result<Vec<Job>> {
        Ok(self.resources.store.list(filter, limit, offset)?)
    }

    /// Returns a page of the job's records in crawl order, plus the total
    pub fn list_pages(&self, job_id: &str, limit: usize, offset: usize) -> Result<PageList> {
        Ok(self.resources.store.list_pages(job_id, limit, offset)?)
    }

    /// Returns the job's event log
    pub fn get_logs(&self, job_id: &str) -> Result<String> {
        Ok(self.resources.store.read_logs(job_id)?)
    }

    /// Writes the JSON-lines export and returns its path
    pub fn export_jsonl(&self, job_id: &str) -> Result<PathBuf> {
        Ok(self.resources.store.export_jsonl(job_id)?)
    }

    /// Writes the zip archive export and returns its path
    pub fn export_archive(&self, job_id: &str) -> Result<PathBuf> {
        Ok(self.resources.store.export_archive(job_id)?)
    }

    /// Returns true while the job is being crawled by this engine
    pub fn is_active(&self, job_id: &str) -> bool {
        self.lock_active().contains_key(job_id)
    }

    /// Waits for a job to reach a terminal state and returns it
    pub async fn wait(&self, job_id: &str) -> Result<Job> {
        let done = self.lock_active().get(job_id).map(|a| a.done.clone());
        if let Some(mut done) = done {
            wait_done(&mut done).await;
        }
        self.get_status(job_id)
    }

    /// Robots.txt sitemap URLs advertised by the host of `url`
    pub async fn sitemaps(&self, url: &Url) -> Vec<String> {
        self.resources.robots.sitemaps(url).await
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActiveJob>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for CrawlEngine {
    fn drop(&mut self) {
        for active in self.lock_active().values() {
            active.stop.cancel();
        }
    }
}

async fn wait_done(done: &mut watch::Receiver<Option<JobStatus>>) -> Option<JobStatus> {
    loop {
        if let Some(status) = *done.borrow_and_update() {
            return Some(status);
        }
        if done.changed().await.is_err() {
            return *done.borrow();
        }
    }
}

/// Finalizes unfinished jobs whose engine has gone away
///
/// Jobs with a recent heartbeat belong to a live engine, possibly in another
/// process, and are left untouched.
fn recover_unfinished_jobs(store: &dyn JobStore, stale_after: chrono::Duration) -> Result<()> {
    let now = Utc::now();
    for status in [JobStatus::Pending, JobStatus::Running] {
        let filter = JobFilter {
            status: Some(status),
            domain: None,
        };
        for job in store.list(&filter, usize::MAX, 0)? {
            if !job.is_orphaned(stale_after, now) {
                tracing::debug!("Job {} is still alive (last heartbeat {})", job.id, job.last_alive());
                continue;
            }
            let next = if status == JobStatus::Running && job.counters.pages_crawled > 0 {
                JobStatus::Completed
            } else {
                store.record_error(&job.id, INTERRUPTED_ERROR)?;
                JobStatus::Failed
            };
            store.update_status(&job.id, next)?;
            tracing::warn!("Recovered interrupted job {} as {}", job.id, next);
        }
    }
    Ok(())
}
