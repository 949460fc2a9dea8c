//! SQLite-backed job registry
//!
//! Maps job ids to their domain and directory. The table is loaded into
//! memory when the registry is opened and mutated only through the job
//! store's create/status/delete paths.

use crate::models::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobFilter, StorageResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// One registered job
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub job_id: String,
    pub domain: String,
    /// Job directory relative to the `crawls/` root
    pub dir: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

struct Inner {
    conn: Connection,
    entries: HashMap<String, RegistryEntry>,
}

/// Process-wide job registry
pub struct JobRegistry {
    inner: Mutex<Inner>,
}

impl JobRegistry {
    /// Opens (or creates) the registry database and loads every entry
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory registry (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        initialize_schema(&conn)?;
        let entries = load_entries(&conn)?;
        tracing::debug!("Loaded {} jobs from registry", entries.len());
        Ok(Self {
            inner: Mutex::new(Inner { conn, entries }),
        })
    }

    pub fn insert(&self, entry: RegistryEntry) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.conn.execute(
            "INSERT OR REPLACE INTO jobs (job_id, domain, dir, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.job_id,
                entry.domain,
                entry.dir,
                entry.status.to_db_string(),
                format_timestamp(&entry.created_at),
            ],
        )?;
        inner.entries.insert(entry.job_id.clone(), entry);
        Ok(())
    }

    pub fn update_status(&self, job_id: &str, status: JobStatus) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.conn.execute(
            "UPDATE jobs SET status = ?1 WHERE job_id = ?2",
            params![status.to_db_string(), job_id],
        )?;
        if let Some(entry) = inner.entries.get_mut(job_id) {
            entry.status = status;
        }
        Ok(())
    }

    /// Unregisters a job; returns false if it was not registered
    pub fn remove(&self, job_id: &str) -> StorageResult<bool> {
        let mut inner = self.lock();
        inner
            .conn
            .execute("DELETE FROM jobs WHERE job_id = ?1", params![job_id])?;
        Ok(inner.entries.remove(job_id).is_some())
    }

    pub fn get(&self, job_id: &str) -> Option<RegistryEntry> {
        self.lock().entries.get(job_id).cloned()
    }

    /// Returns job ids matching `filter`, newest first
    pub fn list(&self, filter: &JobFilter, limit: usize, offset: usize) -> StorageResult<Vec<String>> {
        let inner = self.lock();
        let mut stmt = inner.conn.prepare(
            "SELECT job_id FROM jobs
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR domain = ?2)
             ORDER BY created_at DESC, job_id DESC
             LIMIT ?3 OFFSET ?4",
        )?;

        let status = filter.status.map(|s| s.to_db_string());
        let ids = stmt
            .query_map(
                params![
                    status,
                    filter.domain.as_deref(),
                    i64::try_from(limit).unwrap_or(i64::MAX),
                    i64::try_from(offset).unwrap_or(i64::MAX)
                ],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn load_entries(conn: &Connection) -> StorageResult<HashMap<String, RegistryEntry>> {
    let mut stmt = conn.prepare("SELECT job_id, domain, dir, status, created_at FROM jobs")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut entries = HashMap::new();
    for row in rows {
        let (job_id, domain, dir, status, created_at) = row?;
        let Some(status) = JobStatus::from_db_string(&status) else {
            tracing::warn!("Skipping registry entry {} with unknown status '{}'", job_id, status);
            continue;
        };
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        entries.insert(
            job_id.clone(),
            RegistryEntry {
                job_id,
                domain,
                dir,
                status,
                created_at,
            },
        );
    }
    Ok(entries)
}

/// Fixed-width RFC 3339 so that lexical order matches time order
fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(id: &str, domain: &str, status: JobStatus, age_secs: i64) -> RegistryEntry {
        RegistryEntry {
            job_id: id.to_string(),
            domain: domain.to_string(),
            dir: format!("{}/{}", domain, id),
            status,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = JobRegistry::open_in_memory().unwrap();
        registry.insert(entry("j1", "a.test", JobStatus::Pending, 0)).unwrap();
        assert_eq!(registry.get("j1").unwrap().domain, "a.test");

        registry.update_status("j1", JobStatus::Running).unwrap();
        assert_eq!(registry.get("j1").unwrap().status, JobStatus::Running);

        assert!(registry.remove("j1").unwrap());
        assert!(!registry.remove("j1").unwrap());
        assert!(registry.get("j1").is_none());
    }

    #[test]
    fn test_list_newest_first_with_filters() {
        let registry = JobRegistry::open_in_memory().unwrap();
        registry.insert(entry("old", "a.test", JobStatus::Completed, 30)).unwrap();
        registry.insert(entry("mid", "b.test", JobStatus::Running, 20)).unwrap();
        registry.insert(entry("new", "a.test", JobStatus::Running, 10)).unwrap();

        let all = registry.list(&JobFilter::default(), 10, 0).unwrap();
        assert_eq!(all, vec!["new", "mid", "old"]);

        let page = registry.list(&JobFilter::default(), 1, 1).unwrap();
        assert_eq!(page, vec!["mid"]);

        let running = JobFilter {
            status: Some(JobStatus::Running),
            domain: None,
        };
        assert_eq!(registry.list(&running, 10, 0).unwrap(), vec!["new", "mid"]);

        let a_running = JobFilter {
            status: Some(JobStatus::Running),
            domain: Some("a.test".to_string()),
        };
        assert_eq!(registry.list(&a_running, 10, 0).unwrap(), vec!["new"]);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        {
            let registry = JobRegistry::open(&path).unwrap();
            registry.insert(entry("j1", "a.test", JobStatus::Stopped, 0)).unwrap();
        }
        let registry = JobRegistry::open(&path).unwrap();
        let loaded = registry.get("j1").unwrap();
        assert_eq!(loaded.status, JobStatus::Stopped);
        assert_eq!(loaded.dir, "a.test/j1");
    }
}
