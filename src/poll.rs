// Waiting for an uploaded document to finish processing on the server.

use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::api::{Job, JobState, Session};
use crate::config::ClientConfig;
use crate::error::PrintError;

/// Anything that can list the user's print jobs.
pub trait JobSource {
    fn list_jobs(&self, session: &Session) -> Result<Vec<Job>, PrintError>;
}

/// How often to check, and when to give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` keeps polling until the job reaches a final state.
    pub timeout: Option<Duration>,
}

impl From<&ClientConfig> for PollPolicy {
    fn from(config: &ClientConfig) -> Self {
        PollPolicy {
            interval: config.poll_interval,
            timeout: config.poll_timeout,
        }
    }
}

pub fn find_job<'a>(jobs: &'a [Job], id: &str) -> Option<&'a Job> {
    jobs.iter().find(|job| job.id == id)
}

/// Sleep, list jobs, repeat until `job_id` is `Completed`. Returns the
/// completed job with its final cost.
///
/// A job the server marks `Failed` ends the wait with [`PrintError::JobFailed`];
/// running past `policy.timeout` ends it with [`PrintError::PollTimeout`].
/// A job missing from the listing is treated as not done yet.
pub fn wait_for_completion<S: JobSource + ?Sized>(
    source: &S,
    session: &Session,
    job_id: &str,
    policy: &PollPolicy,
) -> Result<Job, PrintError> {
    let started = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        thread::sleep(policy.interval);
        attempts += 1;

        let jobs = source.list_jobs(session)?;
        match find_job(&jobs, job_id) {
            Some(job) if job.state == JobState::Completed => {
                info!(job = job_id, cost = job.cost, attempts, "Job completed");
                return Ok(job.clone());
            }
            Some(job) if job.state == JobState::Failed => {
                return Err(PrintError::JobFailed(job_id.to_string()));
            }
            Some(job) => debug!(job = job_id, state = %job.state, attempts, "Job not done yet"),
            None => debug!(job = job_id, attempts, "Job not listed yet"),
        }

        if let Some(limit) = policy.timeout {
            let waited = started.elapsed();
            if waited >= limit {
                return Err(PrintError::PollTimeout {
                    job: job_id.to_string(),
                    waited,
                });
            }
        }
    }
}
