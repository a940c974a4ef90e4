use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::workflow::{Outcome, StageEvent};

/// Tracks the lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Finished,
}

/// Point-in-time view of a job, served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub status: JobStatus,
    /// `None` while running, or when the run failed.
    pub outcome: Option<Outcome>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// What a worker puts on a job's queue.
#[derive(Debug)]
pub(crate) enum JobMessage {
    Event(StageEvent),
    /// Terminating sentinel; sent exactly once per job.
    Done,
}

/// A single workflow execution owned by the job manager.
#[derive(Debug)]
pub(crate) struct Job {
    pub status: JobStatus,
    pub outcome: Option<Outcome>,
    /// Taken by the first subscriber; `None` while a stream holds it.
    pub receiver: Option<UnboundedReceiver<JobMessage>>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(receiver: UnboundedReceiver<JobMessage>) -> Self {
        Self {
            status: JobStatus::Running,
            outcome: None,
            receiver: Some(receiver),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            status: self.status,
            outcome: self.outcome,
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }

    pub fn finish(&mut self, outcome: Option<Outcome>) {
        self.status = JobStatus::Finished;
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }

    /// Finished, never subscribed, and older than `retention`.
    pub fn expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        match (self.status, self.finished_at) {
            (JobStatus::Finished, Some(finished_at)) => {
                self.receiver.is_some() && now - finished_at >= retention
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn running_job_never_expires() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let job = Job::new(rx);
        assert_eq!(job.status, JobStatus::Running);
        assert!(!job.expired(Utc::now() + Duration::days(1), Duration::zero()));
    }

    #[test]
    fn finished_job_expires_after_retention() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut job = Job::new(rx);
        job.finish(Some(Outcome::Passed));
        let finished_at = job.finished_at.unwrap();
        assert!(!job.expired(finished_at, Duration::seconds(60)));
        assert!(job.expired(finished_at + Duration::seconds(60), Duration::seconds(60)));
    }

    #[test]
    fn subscribed_job_is_not_swept() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut job = Job::new(rx);
        job.finish(None);
        job.receiver.take();
        assert!(!job.expired(Utc::now() + Duration::days(1), Duration::zero()));
    }

    #[test]
    fn info_reflects_finish() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut job = Job::new(rx);
        let info = job.info();
        assert_eq!(info.status, JobStatus::Running);
        assert_eq!(info.outcome, None);
        assert!(info.finished_at.is_none());

        job.finish(Some(Outcome::Exhausted));
        let info = job.info();
        assert_eq!(info.status, JobStatus::Finished);
        assert_eq!(info.outcome, Some(Outcome::Exhausted));
        assert!(info.finished_at.unwrap() >= info.created_at);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Finished).unwrap(),
            "\"finished\""
        );
    }
}
