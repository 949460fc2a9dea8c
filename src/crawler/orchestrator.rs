//! Per-job orchestration
//!
//! A [`JobRunner`] drives one job through its state machine:
//!
//! ```text
//! pending -> running -> completed | failed | stopped
//! ```
//!
//! It seeds the frontier, runs the job's worker pool, enforces the duration
//! limit, reports progress and writes the terminal status. Every progress
//! tick doubles as the job's heartbeat.

use crate::crawler::engine::Resources;
use crate::crawler::worker::{run_worker, JobContext};
use crate::models::{Job, JobStatus};
use crate::scope::ScopeFilter;
use crate::url::Normalizer;
use crate::{CrawlError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Drives a single job from `pending` to a terminal status
pub(crate) struct JobRunner {
    resources: Arc<Resources>,
    job: Job,
    stop: CancellationToken,
}

impl JobRunner {
    pub fn new(resources: Arc<Resources>, job: Job, stop: CancellationToken) -> Self {
        Self {
            resources,
            job,
            stop,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job.id
    }

    /// Runs the job to completion and returns its terminal status
    ///
    /// Never returns an error: job-fatal failures are recorded on the job,
    /// which is then marked `failed`.
    pub async fn run(self) -> JobStatus {
        match self.execute().await {
            Ok(status) => {
                tracing::info!("Job {} finished as {}", self.job.id, status);
                status
            }
            Err(e) => {
                tracing::error!("Job {} failed: {}", self.job.id, e);
                self.fail(&e.to_string());
                JobStatus::Failed
            }
        }
    }

    async fn execute(&self) -> Result<JobStatus> {
        let store = &self.resources.store;
        let job_id = self.job.id.as_str();
        let config = &self.job.config;

        store.update_status(job_id, JobStatus::Running)?;

        let normalizer = Normalizer::new(&config.ignore_query_params);
        let seed = normalizer.normalize(&config.start_url, None)?;
        let scope = ScopeFilter::new(&seed, config)?;

        if config.respect_robots {
            let sitemaps = self.resources.robots.sitemaps(&seed).await;
            if !sitemaps.is_empty() {
                store.append_log(
                    job_id,
                    &format!("robots.txt advertises {} sitemap(s): {}", sitemaps.len(), sitemaps.join(", ")),
                )?;
            }
        }

        let crawl = self.stop.child_token();
        let ctx = Arc::new(JobContext::new(
            job_id.to_string(),
            config.clone(),
            scope,
            normalizer,
            Arc::clone(&self.resources),
            crawl.clone(),
        ));
        if ctx.frontier.enqueue(seed.clone(), 0, None) {
            store.add_found(job_id, 1)?;
        }
        store.append_log(
            job_id,
            &format!("Crawl started at {} with {} workers", seed, config.concurrency),
        )?;

        let mut workers = JoinSet::new();
        for worker_id in 0..config.concurrency as usize {
            workers.spawn(run_worker(Arc::clone(&ctx), worker_id));
        }

        let started = Instant::now();
        let deadline = tokio::time::sleep(Duration::from_secs(config.max_duration_secs));
        tokio::pin!(deadline);
        let mut progress = tokio::time::interval_at(
            started + self.resources.settings.progress_interval,
            self.resources.settings.progress_interval,
        );
        progress.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut deadline_hit = false;
        let mut stop_seen = false;
        let mut fatal: Option<CrawlError> = None;

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        tracing::error!("Worker of job {} hit a storage error: {}", job_id, e);
                        if fatal.is_none() {
                            fatal = Some(e.into());
                        }
                        crawl.cancel();
                    }
                    Some(Err(e)) => {
                        tracing::error!("Worker of job {} panicked: {}", job_id, e);
                        if fatal.is_none() {
                            fatal = Some(CrawlError::Worker(e.to_string()));
                        }
                        crawl.cancel();
                    }
                },
                _ = &mut deadline, if !deadline_hit => {
                    deadline_hit = true;
                    if !crawl.is_cancelled() {
                        tracing::info!("Job {} reached its duration limit", job_id);
                        store.append_log(
                            job_id,
                            &format!(
                                "Duration limit of {}s reached; abandoning {} queued URLs",
                                config.max_duration_secs,
                                ctx.frontier.pending()
                            ),
                        )?;
                        crawl.cancel();
                    }
                }
                _ = self.stop.cancelled(), if !stop_seen => {
                    stop_seen = true;
                    store.append_log(job_id, "Stop requested")?;
                }
                _ = progress.tick() => {
                    store.heartbeat(job_id)?;
                    let job = store.read(job_id)?;
                    tracing::info!(
                        "Job {}: {} found, {} crawled, {} queued, {} in flight, {:.0}s elapsed",
                        job_id,
                        job.counters.pages_found,
                        job.counters.pages_crawled,
                        ctx.frontier.pending(),
                        ctx.frontier.in_flight(),
                        started.elapsed().as_secs_f64()
                    );
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        let status = if self.stop.is_cancelled() {
            JobStatus::Stopped
        } else {
            JobStatus::Completed
        };
        store.update_status(job_id, status)?;
        Ok(status)
    }

    /// Records a job-fatal error and marks the job failed
    fn fail(&self, error: &str) {
        let store = &self.resources.store;
        if let Err(e) = store.record_error(&self.job.id, error) {
            tracing::error!("Could not record error on job {}: {}", self.job.id, e);
        }
        if let Err(e) = store.update_status(&self.job.id, JobStatus::Failed) {
            tracing::error!("Could not mark job {} failed: {}", self.job.id, e);
        }
    }
}
