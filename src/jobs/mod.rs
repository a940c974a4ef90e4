mod job;
mod manager;

pub use job::{JobInfo, JobStatus};
pub use manager::{JobManager, JobSubscription};
