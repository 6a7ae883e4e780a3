//! Coalescing of concurrent source tile loads.
//!
//! Every in-flight load is keyed by its covering source quadkey. A request
//! whose covering tile (or an ancestor of it) is already in flight joins that
//! job instead of starting another one, so each source tile is loaded and
//! clustered at most once per cycle.

use crate::error::{ClusterError, Result};
use futures::FutureExt;
use futures::future::{AbortHandle, Abortable, BoxFuture, Shared};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use spatio_cluster_types::bbox::BoundingBox2D;
use spatio_cluster_types::quadkey::Quadkey;
use std::sync::atomic::{AtomicU64, Ordering};

/// Completion of a job, shared by every waiter.
pub type JobFuture = Shared<BoxFuture<'static, Result<()>>>;

struct Job {
    id: u64,
    future: JobFuture,
    abort: AbortHandle,
}

/// Handle passed to a starting job so it can deregister itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    pub covering: Quadkey,
    pub id: u64,
}

#[derive(Default)]
pub struct JobCoordinator {
    jobs: Mutex<FxHashMap<Quadkey, Job>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for JobCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCoordinator")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl JobCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the job covering `source_tile`, or start one with `start`.
    ///
    /// `start` only builds the future; nothing runs until a waiter polls it.
    /// Aborted jobs resolve to [`ClusterError::TileEvicted`].
    pub fn join<F>(&self, source_tile: &Quadkey, start: F) -> JobFuture
    where
        F: FnOnce(JobTicket) -> BoxFuture<'static, Result<()>>,
    {
        let mut jobs = self.jobs.lock();

        if let Some(job) = covering_job(&jobs, source_tile) {
            log::trace!("joining in-flight job {} for {}", job.id, source_tile);
            return job.future.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let ticket = JobTicket {
            covering: source_tile.clone(),
            id,
        };
        let evicted = source_tile.clone();
        let (abort, registration) = AbortHandle::new_pair();
        let future = Abortable::new(start(ticket), registration)
            .map(move |outcome| outcome.unwrap_or(Err(ClusterError::TileEvicted(evicted))))
            .boxed()
            .shared();

        log::debug!("starting job {} for source tile {}", id, source_tile);
        jobs.insert(
            source_tile.clone(),
            Job {
                id,
                future: future.clone(),
                abort,
            },
        );
        future
    }

    /// Deregister a finished job. A newer job under the same key is kept.
    pub fn finish(&self, ticket: &JobTicket) {
        let mut jobs = self.jobs.lock();
        if jobs.get(&ticket.covering).is_some_and(|job| job.id == ticket.id) {
            jobs.remove(&ticket.covering);
        }
    }

    /// Abort and drop the job keyed by `quadkey`. Returns whether one existed.
    pub fn abort(&self, quadkey: &Quadkey) -> bool {
        match self.jobs.lock().remove(quadkey) {
            Some(job) => {
                job.abort.abort();
                log::debug!("aborted job {} for evicted tile {}", job.id, quadkey);
                true
            }
            None => false,
        }
    }

    /// Abort every job whose source tile intersects `bbox`, or all of them.
    pub fn abort_within(&self, bbox: Option<&BoundingBox2D>) -> usize {
        let mut jobs = self.jobs.lock();
        let doomed: Vec<Quadkey> = jobs
            .keys()
            .filter(|q| bbox.is_none_or(|b| q.bounds().intersects(b)))
            .cloned()
            .collect();
        for quadkey in &doomed {
            if let Some(job) = jobs.remove(quadkey) {
                job.abort.abort();
            }
        }
        doomed.len()
    }

    pub fn is_pending(&self, quadkey: &Quadkey) -> bool {
        self.jobs.lock().contains_key(quadkey)
    }

    /// In-flight job covering `source_tile`, if any.
    pub fn covering(&self, source_tile: &Quadkey) -> Option<Quadkey> {
        let jobs = self.jobs.lock();
        std::iter::once(source_tile.clone())
            .chain(source_tile.ancestors())
            .find(|q| jobs.contains_key(q))
    }

    pub fn in_flight(&self) -> usize {
        self.jobs.lock().len()
    }
}

/// Nearest in-flight ancestor-or-self of `quadkey`.
fn covering_job<'a>(jobs: &'a FxHashMap<Quadkey, Job>, quadkey: &Quadkey) -> Option<&'a Job> {
    std::iter::once(quadkey.clone())
        .chain(quadkey.ancestors())
        .find_map(|q| jobs.get(&q))
}
