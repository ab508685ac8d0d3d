//! In-memory job registry.
//!
//! The registry is the only owner of job state. All reads hand out clones
//! and all writes go through [`JobRegistry::mutate`], which applies a
//! transform to a working copy and commits it only if the transform
//! succeeds. The lock is never held across I/O or an `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use extracta_core::{Error, Job, Result};

/// Lock-guarded store of jobs keyed by id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, Job>>,
    /// Jobs idle this long are treated as absent. `None` disables expiry.
    ttl: Option<chrono::Duration>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that hides jobs idle for at least `ttl`. Zero disables expiry.
    pub fn with_ttl(ttl: Duration) -> Self {
        let ttl = (!ttl.is_zero())
            .then(|| chrono::Duration::from_std(ttl).ok())
            .flatten();
        Self {
            jobs: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Job>> {
        // A panicking transform never commits, so the map is still consistent.
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, job: &Job, now: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| now - job.updated_at >= ttl)
    }

    /// Store a pre-built job and return its id.
    pub fn create(&self, job: Job) -> Uuid {
        let id = job.id;
        self.lock().insert(id, job);
        id
    }

    /// Independent snapshot of a job.
    pub fn get(&self, id: Uuid) -> Result<Job> {
        let jobs = self.lock();
        match jobs.get(&id) {
            Some(job) if !self.is_expired(job, Utc::now()) => Ok(job.clone()),
            _ => Err(not_found(id)),
        }
    }

    /// Apply `transform` atomically to the job with `id`.
    ///
    /// The transform runs against a copy; the stored job is replaced only
    /// when it returns `Ok`, so a rejected transition changes nothing.
    pub fn mutate<T, F>(&self, id: Uuid, transform: F) -> Result<T>
    where
        F: FnOnce(&mut Job) -> Result<T>,
    {
        let mut jobs = self.lock();
        let current = match jobs.get(&id) {
            Some(job) if !self.is_expired(job, Utc::now()) => job,
            _ => return Err(not_found(id)),
        };

        let mut working = current.clone();
        let value = transform(&mut working)?;
        jobs.insert(id, working);
        Ok(value)
    }

    /// Snapshots ordered by `updated_at`, newest first. `limit == 0` returns all.
    pub fn list(&self, limit: usize) -> Vec<Job> {
        let now = Utc::now();
        let mut snapshot: Vec<Job> = self
            .lock()
            .values()
            .filter(|job| !self.is_expired(job, now))
            .cloned()
            .collect();

        snapshot.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if limit > 0 {
            snapshot.truncate(limit);
        }
        snapshot
    }

    /// Remove and return every job last updated at or before `cutoff`.
    pub fn remove_stale(&self, cutoff: DateTime<Utc>) -> Vec<Job> {
        let mut jobs = self.lock();
        let stale: Vec<Uuid> = jobs
            .values()
            .filter(|job| job.updated_at <= cutoff)
            .map(|job| job.id)
            .collect();

        stale.iter().filter_map(|id| jobs.remove(id)).collect()
    }

    /// Number of stored jobs, including expired ones not yet reaped.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn not_found(id: Uuid) -> Error {
    Error::NotFound(format!("job {id}"))
}
