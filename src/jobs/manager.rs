use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

use super::job::{Job, JobInfo, JobMessage, JobStatus};
use crate::contracts::FeatureRequest;
use crate::error::{AsgaError, Result};
use crate::workflow::{StageEvent, WorkflowEngine};

#[derive(Default)]
struct Registry {
    jobs: HashMap<Uuid, Job>,
    /// Ids that were consumed or expired, with the time they were retired.
    /// Subscribing to them is `Gone` until they age out of the retention
    /// window.
    retired: HashMap<Uuid, DateTime<Utc>>,
}

impl Registry {
    fn retire(&mut self, id: Uuid) {
        if self.jobs.remove(&id).is_some() {
            self.retired.insert(id, Utc::now());
            debug!(job_id = %id, "job retired");
        }
    }

    /// Retire expired jobs and forget retired ids older than `retention`.
    /// Returns the number of jobs evicted.
    fn sweep(&mut self, retention: chrono::Duration) -> usize {
        let now = Utc::now();
        let before = self.retired.len();
        self.retired.retain(|_, retired_at| now - *retired_at <= retention);
        let forgotten = before - self.retired.len();
        if forgotten > 0 {
            debug!(forgotten, "retired job ids pruned");
        }

        let expired: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.expired(now, retention))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.retire(*id);
        }
        expired.len()
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Runs workflows in the background and hands each job's events to exactly
/// one subscriber.
pub struct JobManager {
    engine: Arc<WorkflowEngine>,
    registry: Arc<Mutex<Registry>>,
    retention: chrono::Duration,
}

impl JobManager {
    pub fn new(engine: Arc<WorkflowEngine>, retention: std::time::Duration) -> Self {
        Self {
            engine,
            registry: Arc::default(),
            retention: chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Launch a run on a blocking worker and return its id immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: FeatureRequest) -> Uuid {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut registry = lock(&self.registry);
            registry.sweep(self.retention);
            registry.jobs.insert(id, Job::new(rx));
        }

        let engine = Arc::clone(&self.engine);
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || {
            let span = info_span!("job", job_id = %id);
            let _enter = span.enter();

            // Sends fail once the subscriber is gone; the run still completes.
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                engine.run_with(request, |event| {
                    let _ = tx.send(JobMessage::Event(event));
                })
            }));
            let outcome = match result {
                Ok(Ok(run)) => {
                    info!(outcome = %run.outcome, attempts = run.state.attempts, "job finished");
                    Some(run.outcome)
                }
                Ok(Err(err)) => {
                    error!(%err, "job failed");
                    None
                }
                Err(payload) => {
                    error!(panic = panic_message(payload.as_ref()), "job worker panicked");
                    None
                }
            };
            if let Some(job) = lock(&registry).jobs.get_mut(&id) {
                job.finish(outcome);
            }
            let _ = tx.send(JobMessage::Done);
        });

        info!(job_id = %id, "job started");
        id
    }

    /// Status, outcome and timestamps of job `id`. Same errors as
    /// [`subscribe`](Self::subscribe) for retired and unknown ids.
    pub fn info(&self, id: Uuid) -> Result<JobInfo> {
        let registry = lock(&self.registry);
        if registry.retired.contains_key(&id) {
            return Err(AsgaError::Gone(id));
        }
        registry
            .jobs
            .get(&id)
            .map(Job::info)
            .ok_or_else(|| AsgaError::NotFound(id.to_string()))
    }

    /// Claim the event stream of job `id`.
    pub fn subscribe(&self, id: Uuid) -> Result<JobSubscription> {
        let mut registry = lock(&self.registry);
        registry.sweep(self.retention);
        if registry.retired.contains_key(&id) {
            return Err(AsgaError::Gone(id));
        }
        let job = registry
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AsgaError::NotFound(id.to_string()))?;
        let receiver = job
            .receiver
            .take()
            .ok_or(AsgaError::AlreadySubscribed(id))?;
        debug!(job_id = %id, "subscribed");
        Ok(JobSubscription {
            id,
            receiver,
            registry: Arc::clone(&self.registry),
            done: false,
        })
    }

    /// `None` once the job is retired or if it never existed.
    pub fn status(&self, id: Uuid) -> Option<JobStatus> {
        lock(&self.registry).jobs.get(&id).map(|job| job.status)
    }

    pub fn live_jobs(&self) -> usize {
        lock(&self.registry).jobs.len()
    }

    /// Evict finished jobs nobody subscribed to within the retention window.
    pub fn sweep(&self) -> usize {
        let evicted = lock(&self.registry).sweep(self.retention);
        if evicted > 0 {
            info!(evicted, "expired jobs evicted");
        }
        evicted
    }
}

/// The single, finite event stream of one job.
///
/// Ends at the sentinel. Dropping it early, or reaching the end, retires the
/// job.
pub struct JobSubscription {
    id: Uuid,
    receiver: UnboundedReceiver<JobMessage>,
    registry: Arc<Mutex<Registry>>,
    done: bool,
}

impl JobSubscription {
    pub fn job_id(&self) -> Uuid {
        self.id
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            self.receiver.close();
            lock(&self.registry).retire(self.id);
        }
    }
}

impl Stream for JobSubscription {
    type Item = StageEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StageEvent>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(JobMessage::Event(event))) => Poll::Ready(Some(event)),
            Poll::Ready(Some(JobMessage::Done)) | Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        self.finish();
    }
}
