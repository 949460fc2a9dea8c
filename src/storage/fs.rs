//! Filesystem job store
//!
//! Layout under the data directory:
//!
//! ```text
//! registry.db
//! crawls/{domain}/{YYYY-MM-DD_HH-MM-SS}_{id8}/
//!     manifest.json
//!     logs.txt
//!     pages/{sha256(url)}.json
//!     assets/{sha256(url)}.{ext}
//!     exports/results.jsonl
//!     exports/results.zip
//! ```

use crate::models::{Job, JobConfig, JobCounters, JobStatus, PageRecord};
use crate::storage::export;
use crate::storage::registry::{JobRegistry, RegistryEntry};
use crate::storage::traits::{JobFilter, JobStore, PageList, StorageError, StorageResult};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub(crate) const MANIFEST_FILE: &str = "manifest.json";
pub(crate) const LOG_FILE: &str = "logs.txt";
pub(crate) const PAGES_DIR: &str = "pages";
pub(crate) const ASSETS_DIR: &str = "assets";
pub(crate) const EXPORTS_DIR: &str = "exports";

/// Job store keeping one directory per job
///
/// Every manifest update runs under a per-job mutex and is written to a
/// temporary file that is then renamed over the manifest, so concurrent
/// workers never lose a counter increment and readers never see a torn
/// file.
pub struct FsJobStore {
    crawls_dir: PathBuf,
    registry: JobRegistry,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FsJobStore {
    /// Opens the store rooted at `data_dir`, creating it if needed
    pub fn open(data_dir: &Path) -> StorageResult<Self> {
        let crawls_dir = data_dir.join("crawls");
        fs::create_dir_all(&crawls_dir)?;
        let registry = JobRegistry::open(&data_dir.join("registry.db"))?;
        Ok(Self {
            crawls_dir,
            registry,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Absolute directory of a registered job
    pub fn job_dir(&self, job_id: &str) -> StorageResult<PathBuf> {
        self.registry
            .get(job_id)
            .map(|entry| self.crawls_dir.join(entry.dir))
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))
    }

    fn job_lock(&self, job_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(job_id.to_string()).or_default())
    }

    /// Applies `f` to the manifest under the job lock and persists the result
    fn update_manifest<F>(&self, job_id: &str, f: F) -> StorageResult<Job>
    where
        F: FnOnce(&mut Job) -> StorageResult<()>,
    {
        let dir = self.job_dir(job_id)?;
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        modify_manifest(&dir, f)
    }
}

impl JobStore for FsJobStore {
    fn create(&self, config: JobConfig, domain: &str) -> StorageResult<Job> {
        let job = Job::new(config, domain);
        let rel_dir = format!(
            "{}/{}_{}",
            sanitize_component(domain),
            job.created_at.format("%Y-%m-%d_%H-%M-%S"),
            &job.id[..8]
        );
        let dir = self.crawls_dir.join(&rel_dir);
        fs::create_dir_all(dir.join(PAGES_DIR))?;
        write_manifest(&dir, &job)?;

        self.registry.insert(RegistryEntry {
            job_id: job.id.clone(),
            domain: job.domain.clone(),
            dir: rel_dir,
            status: job.status,
            created_at: job.created_at,
        })?;

        self.append_log(&job.id, &format!("Job created for {}", job.config.start_url))?;
        tracing::debug!("Created job {} in {}", job.id, dir.display());
        Ok(job)
    }

    fn read(&self, job_id: &str) -> StorageResult<Job> {
        let dir = self.job_dir(job_id)?;
        read_manifest(&dir)
    }

    fn list(&self, filter: &JobFilter, limit: usize, offset: usize) -> StorageResult<Vec<Job>> {
        let ids = self.registry.list(filter, limit, offset)?;
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read(&id) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!("Skipping unreadable job {}: {}", id, e),
            }
        }
        Ok(jobs)
    }

    fn delete(&self, job_id: &str) -> StorageResult<()> {
        let dir = self.job_dir(job_id)?;
        let lock = self.job_lock(job_id);
        {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            self.registry.remove(job_id)?;
        }
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(job_id);
        tracing::debug!("Deleted job {}", job_id);
        Ok(())
    }

    fn update_status(&self, job_id: &str, status: JobStatus) -> StorageResult<Job> {
        let job = self.update_manifest(job_id, |job| {
            if !job.status.can_transition_to(status) {
                return Err(StorageError::InvalidTransition {
                    job_id: job.id.clone(),
                    from: job.status,
                    to: status,
                });
            }
            let now = Utc::now();
            if status == JobStatus::Running {
                job.started_at = Some(now);
                job.heartbeat_at = Some(now);
            }
            if status.is_terminal() {
                job.finished_at = Some(now);
            }
            job.status = status;
            Ok(())
        })?;
        self.registry.update_status(job_id, status)?;
        self.append_log(job_id, &format!("Status changed to {}", status))?;
        Ok(job)
    }

    fn record_error(&self, job_id: &str, error: &str) -> StorageResult<()> {
        self.update_manifest(job_id, |job| {
            job.errors.push(error.to_string());
            Ok(())
        })?;
        Ok(())
    }

    fn heartbeat(&self, job_id: &str) -> StorageResult<()> {
        self.update_manifest(job_id, |job| {
            job.heartbeat_at = Some(Utc::now());
            Ok(())
        })?;
        Ok(())
    }

    fn add_found(&self, job_id: &str, count: u64) -> StorageResult<JobCounters> {
        let job = self.update_manifest(job_id, |job| {
            job.counters.pages_found += count;
            job.counters.refresh_remaining();
            Ok(())
        })?;
        Ok(job.counters)
    }

    fn append_page(&self, job_id: &str, page: &PageRecord) -> StorageResult<bool> {
        let dir = self.job_dir(job_id)?;
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let path = dir.join(PAGES_DIR).join(format!("{}.json", url_key(&page.url)));
        let is_new = !path.exists();
        write_atomic(&path, &serde_json::to_vec_pretty(page)?)?;

        if is_new {
            modify_manifest(&dir, |job| {
                let counters = &mut job.counters;
                counters.pages_crawled += 1;
                if page.success {
                    counters.pages_ok += 1;
                } else if page.is_skipped() {
                    counters.pages_skipped += 1;
                } else {
                    counters.pages_failed += 1;
                }
                counters.refresh_remaining();
                Ok(())
            })?;
        }
        Ok(is_new)
    }

    fn list_pages(&self, job_id: &str, limit: usize, offset: usize) -> StorageResult<PageList> {
        let dir = self.job_dir(job_id)?;
        let pages = read_all_pages(&dir)?;
        let total = pages.len();
        Ok(PageList {
            pages: pages.into_iter().skip(offset).take(limit).collect(),
            total,
        })
    }

    fn append_log(&self, job_id: &str, message: &str) -> StorageResult<()> {
        let dir = self.job_dir(job_id)?;
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))?;
        writeln!(file, "[{}] {}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"), message)?;
        Ok(())
    }

    fn read_logs(&self, job_id: &str) -> StorageResult<String> {
        let dir = self.job_dir(job_id)?;
        match fs::read_to_string(dir.join(LOG_FILE)) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_asset(
        &self,
        job_id: &str,
        url: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> StorageResult<String> {
        let dir = self.job_dir(job_id)?.join(ASSETS_DIR);
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        fs::create_dir_all(&dir)?;
        let name = format!("{}.{}", url_key(url), asset_extension(url, content_type));
        write_atomic(&dir.join(&name), bytes)?;
        Ok(name)
    }

    fn export_jsonl(&self, job_id: &str) -> StorageResult<PathBuf> {
        let dir = self.job_dir(job_id)?;
        let pages = read_all_pages(&dir)?;
        export::write_jsonl(&dir, &pages)
    }

    fn export_archive(&self, job_id: &str) -> StorageResult<PathBuf> {
        let dir = self.job_dir(job_id)?;
        let pages = read_all_pages(&dir)?;
        export::write_jsonl(&dir, &pages)?;
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        export::write_archive(&dir)
    }
}

/// Stable storage key of a canonical URL (hex SHA-256)
pub fn url_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

fn read_manifest(dir: &Path) -> StorageResult<Job> {
    let bytes = fs::read(dir.join(MANIFEST_FILE))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_manifest(dir: &Path, job: &Job) -> StorageResult<()> {
    write_atomic(&dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(job)?)
}

/// Read-modify-write of the manifest; the caller holds the job lock
fn modify_manifest<F>(dir: &Path, f: F) -> StorageResult<Job>
where
    F: FnOnce(&mut Job) -> StorageResult<()>,
{
    let mut job = read_manifest(dir)?;
    f(&mut job)?;
    write_manifest(dir, &job)?;
    Ok(job)
}

/// Writes to a sibling temp file, then renames it into place
fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads every page record, sorted in crawl order
pub(crate) fn read_all_pages(dir: &Path) -> StorageResult<Vec<PageRecord>> {
    let pages_dir = dir.join(PAGES_DIR);
    let entries = match fs::read_dir(&pages_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut pages = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let bytes = fs::read(&path)?;
        pages.push(serde_json::from_slice::<PageRecord>(&bytes)?);
    }

    pages.sort_by(|a, b| {
        a.discovered_at
            .cmp(&b.discovered_at)
            .then_with(|| a.depth.cmp(&b.depth))
            .then_with(|| a.url.cmp(&b.url))
    });
    Ok(pages)
}

/// Makes a domain usable as a single path component
fn sanitize_component(domain: &str) -> String {
    let cleaned: String = domain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

fn asset_extension(url: &str, content_type: &str) -> String {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    let from_mime = match mime.as_str() {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "image/x-icon" | "image/vnd.microsoft.icon" => Some("ico"),
        "text/css" => Some("css"),
        "application/javascript" | "text/javascript" => Some("js"),
        "application/pdf" => Some("pdf"),
        _ => None,
    };
    if let Some(ext) = from_mime {
        return ext.to_string();
    }

    // Fall back to the URL's own extension
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            let segment = u.path_segments()?.last()?.to_string();
            let (_, ext) = segment.rsplit_once('.')?;
            let ext = ext.to_ascii_lowercase();
            (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .then_some(ext)
        })
        .unwrap_or_else(|| "bin".to_string())
}
