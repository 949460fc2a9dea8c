//! Per-job worker loop
//!
//! Each worker repeatedly takes an entry from the job's frontier and runs it
//! through scope, robots, rate limiting and extraction, then records the
//! outcome and feeds discovered links back into the frontier. Per-page
//! failures become page records; only storage failures escape the loop.

use crate::crawler::engine::Resources;
use crate::crawler::extractor::{ExtractError, Extraction};
use crate::frontier::{Frontier, FrontierEntry};
use crate::models::{JobConfig, PageRecord, SkipReason};
use crate::ratelimit::effective_rate;
use crate::scope::ScopeFilter;
use crate::storage::StorageResult;
use crate::url::{host_key, Normalizer};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::SemaphorePermit;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Everything a worker needs to crawl one job
pub(crate) struct JobContext {
    pub job_id: String,
    pub config: JobConfig,
    pub frontier: Frontier,
    pub scope: ScopeFilter,
    pub normalizer: Normalizer,
    pub resources: Arc<Resources>,
    /// Fires on stop requests and when the duration limit expires
    pub cancel: CancellationToken,
    assets_seen: Mutex<HashSet<String>>,
}

impl JobContext {
    pub fn new(
        job_id: String,
        config: JobConfig,
        scope: ScopeFilter,
        normalizer: Normalizer,
        resources: Arc<Resources>,
        cancel: CancellationToken,
    ) -> Self {
        let frontier = Frontier::new(u64::from(config.max_pages));
        Self {
            job_id,
            config,
            frontier,
            scope,
            normalizer,
            resources,
            cancel,
            assets_seen: Mutex::new(HashSet::new()),
        }
    }
}

/// Drains the frontier until it is exhausted or the job is cancelled
pub(crate) async fn run_worker(ctx: Arc<JobContext>, worker_id: usize) -> StorageResult<()> {
    tracing::debug!("Worker {} started for job {}", worker_id, ctx.job_id);

    while let Some(entry) = ctx.frontier.next_entry(&ctx.cancel).await {
        let result = process_entry(&ctx, &entry).await;
        ctx.frontier.finish();
        result?;
    }

    tracing::debug!("Worker {} finished for job {}", worker_id, ctx.job_id);
    Ok(())
}

async fn process_entry(ctx: &JobContext, entry: &FrontierEntry) -> StorageResult<()> {
    let url = &entry.url;

    if !ctx.scope.in_scope(url) {
        return record_skip(ctx, entry, SkipReason::OutOfScope, None);
    }

    if !ctx
        .resources
        .robots
        .is_allowed(url, ctx.config.respect_robots)
        .await
    {
        return record_skip(ctx, entry, SkipReason::RobotsDisallowed, None);
    }

    let Some(result) = fetch_with_retries(ctx, url).await else {
        // Cancelled mid-flight: nothing is recorded for this page
        tracing::debug!("Abandoned {} (job {} cancelled)", url, ctx.job_id);
        return Ok(());
    };

    match result {
        Ok(extraction) => handle_extraction(ctx, entry, extraction).await,
        Err(e) => record_failure(ctx, entry, &e),
    }
}

/// Runs the extractor, retrying transient failures with backoff
///
/// Returns None if the job was cancelled before an outcome was reached.
async fn fetch_with_retries(ctx: &JobContext, url: &Url) -> Option<Result<Extraction, ExtractError>> {
    let settings = &ctx.resources.settings;
    let mut attempt = 0;

    loop {
        match fetch_once(ctx, url).await? {
            Err(e) if e.is_retryable() && attempt < settings.max_retries => {
                let delay = settings.backoff.delay(attempt);
                attempt += 1;
                tracing::warn!(
                    "Fetch of {} failed ({}), retry {}/{} in {:?}",
                    url,
                    e,
                    attempt,
                    settings.max_retries,
                    delay
                );
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            outcome => return Some(outcome),
        }
    }
}

/// One politely scheduled extractor call
async fn fetch_once(ctx: &JobContext, url: &Url) -> Option<Result<Extraction, ExtractError>> {
    let _permit = admit(ctx, url).await?;
    let resources = &ctx.resources;

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => None,
        result = tokio::time::timeout(
            resources.settings.fetch_timeout,
            resources.extractor.extract(url),
        ) => Some(result.unwrap_or(Err(ExtractError::Timeout))),
    }
}

/// Waits until the URL's host has a rate-limit token and a global fetch
/// slot is free, then takes both
///
/// No slot is held while the host's bucket refills, and the token is only
/// consumed once the slot is granted, so the dispatch follows it directly.
async fn admit<'a>(ctx: &'a JobContext, url: &Url) -> Option<SemaphorePermit<'a>> {
    let resources = &ctx.resources;
    let host = host_key(url).unwrap_or_default();

    let crawl_delay = resources
        .robots
        .crawl_delay(url, ctx.config.respect_robots)
        .await;
    let rate = effective_rate(ctx.config.rate_limit, crawl_delay);
    let permits = &resources.fetch_permits;
    let slot = async move { permits.acquire().await.ok() };
    let (ticket, permit) = resources
        .limiter
        .acquire_gated(&host, rate, &ctx.cancel, slot)
        .await
        .ok()?;
    if !ticket.waited.is_zero() {
        tracing::trace!("Waited {:?} to dispatch to {}", ticket.waited, ticket.domain);
    }
    Some(permit)
}

async fn handle_extraction(
    ctx: &JobContext,
    entry: &FrontierEntry,
    extraction: Extraction,
) -> StorageResult<()> {
    let store = &ctx.resources.store;
    let url = &entry.url;

    let final_url = extraction
        .final_url
        .as_deref()
        .and_then(|raw| ctx.normalizer.normalize(raw, Some(url)).ok())
        .filter(|target| target != url);

    if let Some(target) = &final_url {
        if !ctx.scope.in_scope(target) {
            return record_skip(ctx, entry, SkipReason::OutOfScope, Some(target));
        }
        if !ctx.frontier.mark_seen(target) {
            return record_skip(ctx, entry, SkipReason::Duplicate, Some(target));
        }
    }

    let mut record = PageRecord::success(
        url.as_str(),
        entry.depth,
        entry.parent.clone(),
        entry.enqueued_at,
        extraction.status_code,
        extraction.content_length,
        extraction.title.clone(),
    );
    record.final_url = final_url.as_ref().map(|u| u.to_string());
    store.append_page(&ctx.job_id, &record)?;
    tracing::debug!(
        "Crawled {} (status {}, depth {}, {} links, {:?} chars of text)",
        url,
        extraction.status_code,
        entry.depth,
        extraction.links.len(),
        extraction.text_length
    );

    let base = final_url.as_ref().unwrap_or(url);
    let follow_links = ctx.config.max_depth.map_or(true, |max| entry.depth < max);
    if follow_links {
        enqueue_links(ctx, entry, base, &extraction.links)?;
    }

    if ctx.config.include_assets {
        capture_assets(ctx, base, &extraction.assets).await?;
    }
    Ok(())
}

fn enqueue_links(
    ctx: &JobContext,
    entry: &FrontierEntry,
    base: &Url,
    links: &[String],
) -> StorageResult<()> {
    let parent = entry.url.to_string();
    let mut admitted = 0u64;

    for raw in links {
        let link = match ctx.normalizer.normalize(raw, Some(base)) {
            Ok(link) => link,
            Err(e) => {
                tracing::trace!("Dropping link {:?} on {}: {}", raw, entry.url, e);
                continue;
            }
        };
        if !ctx.scope.in_scope(&link) {
            continue;
        }
        if ctx.frontier.enqueue(link, entry.depth + 1, Some(parent.clone())) {
            admitted += 1;
        }
    }

    if admitted > 0 {
        ctx.resources.store.add_found(&ctx.job_id, admitted)?;
    }
    Ok(())
}

async fn capture_assets(ctx: &JobContext, base: &Url, assets: &[String]) -> StorageResult<()> {
    let resources = &ctx.resources;

    for raw in assets {
        let Ok(asset_url) = ctx.normalizer.normalize(raw, Some(base)) else {
            continue;
        };
        if !ctx.scope.in_scope(&asset_url) {
            continue;
        }
        {
            let mut seen = ctx.assets_seen.lock().unwrap_or_else(|e| e.into_inner());
            if !seen.insert(asset_url.to_string()) {
                continue;
            }
        }
        if !resources
            .robots
            .is_allowed(&asset_url, ctx.config.respect_robots)
            .await
        {
            continue;
        }

        let Some(_permit) = admit(ctx, &asset_url).await else {
            return Ok(());
        };
        let fetched = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(
                resources.settings.fetch_timeout,
                resources.extractor.fetch_asset(&asset_url, resources.settings.max_asset_bytes),
            ) => result.unwrap_or(Err(ExtractError::Timeout)),
        };

        match fetched {
            Ok(asset) => {
                let name = resources.store.save_asset(
                    &ctx.job_id,
                    asset_url.as_str(),
                    &asset.bytes,
                    &asset.content_type,
                )?;
                tracing::debug!("Saved asset {} as {}", asset_url, name);
            }
            Err(e) => {
                tracing::debug!("Asset {} not captured: {}", asset_url, e);
                resources
                    .store
                    .append_log(&ctx.job_id, &format!("Asset {} not captured: {}", asset_url, e))?;
            }
        }
    }
    Ok(())
}

fn record_skip(
    ctx: &JobContext,
    entry: &FrontierEntry,
    reason: SkipReason,
    final_url: Option<&Url>,
) -> StorageResult<()> {
    let mut record = PageRecord::failure(
        entry.url.as_str(),
        entry.depth,
        entry.parent.clone(),
        entry.enqueued_at,
        reason,
    );
    record.final_url = final_url.map(|u| u.to_string());

    let store = &ctx.resources.store;
    store.append_page(&ctx.job_id, &record)?;
    store.append_log(&ctx.job_id, &format!("Skipped {} ({})", entry.url, reason))?;
    tracing::debug!("Skipped {} ({})", entry.url, reason);
    Ok(())
}

fn record_failure(ctx: &JobContext, entry: &FrontierEntry, error: &ExtractError) -> StorageResult<()> {
    let reason = if error.is_retryable() {
        SkipReason::RetriesExhausted
    } else if error.status_code().is_some() {
        SkipReason::HttpStatus
    } else {
        SkipReason::ExtractionFailed
    };

    let mut record = PageRecord::failure(
        entry.url.as_str(),
        entry.depth,
        entry.parent.clone(),
        entry.enqueued_at,
        reason,
    )
    .with_error(error.to_string());
    if let Some(code) = error.status_code() {
        record = record.with_status(code);
    }

    let store = &ctx.resources.store;
    store.append_page(&ctx.job_id, &record)?;
    store.append_log(&ctx.job_id, &format!("Failed {} ({}): {}", entry.url, reason, error))?;
    tracing::info!("Failed {} ({}): {}", entry.url, reason, error);
    Ok(())
}
