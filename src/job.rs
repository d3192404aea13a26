//! Remote job lifecycle: the forward-only state machine, the poll loop that
//! drives it, and the clock and cancellation seams the loop depends on.
//!
//! The loop sleeps one interval before every status check, so a job that never
//! finishes is abandoned after `max_attempts` checks, roughly
//! `max_attempts * interval` after submission.

use crate::error::AnnotationError;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, SystemTime},
};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const STANDARD_MAX_ATTEMPTS: usize = 36;
pub const PATIENT_MAX_ATTEMPTS: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Submitted,
    Running,
    Finished,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Finished | JobState::Failed | JobState::TimedOut
        )
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Submitted, Running)
                | (Running, Running)
                | (Running, Finished)
                | (Running, Failed)
                | (Submitted, TimedOut)
                | (Running, TimedOut)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobState::Submitted => "SUBMITTED",
            JobState::Running => "RUNNING",
            JobState::Finished => "FINISHED",
            JobState::Failed => "FAILED",
            JobState::TimedOut => "TIMED_OUT",
        };
        f.write_str(text)
    }
}

/// A job accepted by a remote service, alive for one request only.
#[derive(Debug, Clone, Serialize)]
pub struct ExternalJob {
    job_id: String,
    state: JobState,
    submitted_at: SystemTime,
    attempts: usize,
}

impl ExternalJob {
    pub fn submitted(job_id: impl Into<String>, submitted_at: SystemTime) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Submitted,
            submitted_at,
            attempts: 0,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn submitted_at(&self) -> SystemTime {
        self.submitted_at
    }

    /// Status checks performed so far.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn transition(&mut self, next: JobState) -> Result<(), AnnotationError> {
        if !self.state.can_transition_to(next) {
            return Err(AnnotationError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        if self.state != next {
            debug!(job_id = %self.job_id, from = %self.state, to = %next, "job state change");
        }
        self.state = next;
        Ok(())
    }

    /// A status report implies the job has left the queue.
    fn observe(&mut self, next: JobState) -> Result<(), AnnotationError> {
        if self.state == JobState::Submitted {
            self.transition(JobState::Running)?;
        }
        self.transition(next)
    }
}

/// What one status check learned about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Running(String),
    Finished(T),
    Failed(String),
}

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Shared flag a caller sets to abandon its request.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_attempts: usize,
}

impl PollSchedule {
    pub fn standard() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: STANDARD_MAX_ATTEMPTS,
        }
    }

    pub fn patient() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: PATIENT_MAX_ATTEMPTS,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.interval * self.max_attempts as u32
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

pub struct JobPoller<'a> {
    schedule: PollSchedule,
    clock: &'a dyn Clock,
    cancel: &'a CancellationToken,
}

impl<'a> JobPoller<'a> {
    pub fn new(schedule: PollSchedule, clock: &'a dyn Clock, cancel: &'a CancellationToken) -> Self {
        Self {
            schedule,
            clock,
            cancel,
        }
    }

    /// Drives `job` to a terminal state. `check` performs one status request;
    /// a [`AnnotationError::TransientNetwork`] from it only costs that attempt.
    pub fn run<T>(
        &self,
        job: &mut ExternalJob,
        mut check: impl FnMut(&ExternalJob) -> Result<PollOutcome<T>, AnnotationError>,
    ) -> Result<T, AnnotationError> {
        for attempt in 1..=self.schedule.max_attempts {
            if self.cancel.is_cancelled() {
                info!(job_id = job.job_id(), "job abandoned before status check");
                return Err(AnnotationError::Cancelled);
            }
            self.clock.sleep(self.schedule.interval);
            if self.cancel.is_cancelled() {
                info!(job_id = job.job_id(), "job abandoned before status check");
                return Err(AnnotationError::Cancelled);
            }
            job.attempts = attempt;
            debug!(
                job_id = job.job_id(),
                attempt,
                max_attempts = self.schedule.max_attempts,
                "checking job status"
            );
            match check(&*job) {
                Ok(PollOutcome::Running(status)) => {
                    debug!(job_id = job.job_id(), %status, "job still running");
                    job.observe(JobState::Running)?;
                }
                Ok(PollOutcome::Finished(value)) => {
                    job.observe(JobState::Finished)?;
                    info!(job_id = job.job_id(), attempt, "job finished");
                    return Ok(value);
                }
                Ok(PollOutcome::Failed(status)) => {
                    job.observe(JobState::Failed)?;
                    warn!(job_id = job.job_id(), %status, "job failed remotely");
                    return Err(AnnotationError::JobFailed {
                        job_id: job.job_id().to_string(),
                        status,
                    });
                }
                Err(AnnotationError::TransientNetwork(message)) => {
                    warn!(job_id = job.job_id(), attempt, %message, "status check failed");
                }
                Err(other) => return Err(other),
            }
        }
        job.transition(JobState::TimedOut)?;
        warn!(
            job_id = job.job_id(),
            attempts = self.schedule.max_attempts,
            deadline_secs = self.schedule.deadline().as_secs(),
            "job timed out"
        );
        Err(AnnotationError::TimeoutExceeded {
            attempts: self.schedule.max_attempts,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records requested sleeps instead of blocking.
    #[derive(Debug, Default)]
    pub(crate) struct FakeClock {
        pub slept: Mutex<Vec<Duration>>,
    }

    impl FakeClock {
        pub(crate) fn total_slept(&self) -> Duration {
            self.slept.lock().unwrap().iter().sum()
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }

        fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn job() -> ExternalJob {
        ExternalJob::submitted("job-1", SystemTime::UNIX_EPOCH)
    }

    #[test]
    fn test_transitions_are_forward_only() {
        let mut j = job();
        assert!(j.transition(JobState::Finished).is_err());
        j.transition(JobState::Running).unwrap();
        j.transition(JobState::Running).unwrap();
        j.transition(JobState::Finished).unwrap();
        assert!(j.state().is_terminal());
        assert!(j.transition(JobState::Running).is_err());
        assert!(j.transition(JobState::TimedOut).is_err());
        assert!(!JobState::Failed.can_transition_to(JobState::Finished));
        assert!(JobState::Submitted.can_transition_to(JobState::TimedOut));
    }

    #[test]
    fn test_always_running_times_out_after_max_attempts() {
        let clock = FakeClock::default();
        let cancel = CancellationToken::new();
        let schedule = PollSchedule::standard();
        let poller = JobPoller::new(schedule, &clock, &cancel);
        let mut j = job();
        let mut checks = 0;
        let res: Result<(), _> = poller.run(&mut j, |_| {
            checks += 1;
            Ok(PollOutcome::Running("RUNNING".to_string()))
        });
        assert!(matches!(res, Err(AnnotationError::TimeoutExceeded { attempts: 36 })));
        assert_eq!(checks, STANDARD_MAX_ATTEMPTS);
        assert_eq!(j.attempts(), STANDARD_MAX_ATTEMPTS);
        assert_eq!(j.state(), JobState::TimedOut);
        assert_eq!(clock.total_slept(), schedule.deadline());
        assert_eq!(schedule.deadline(), Duration::from_secs(180));
    }

    #[test]
    fn test_finishes_after_some_polls() {
        let clock = FakeClock::default();
        let cancel = CancellationToken::new();
        let poller = JobPoller::new(PollSchedule::patient(), &clock, &cancel);
        let mut j = job();
        let mut checks = 0;
        let res = poller.run(&mut j, |_| {
            checks += 1;
            if checks < 3 {
                Ok(PollOutcome::Running("QUEUED".to_string()))
            } else {
                Ok(PollOutcome::Finished("payload"))
            }
        });
        assert_eq!(res.unwrap(), "payload");
        assert_eq!(j.state(), JobState::Finished);
        assert_eq!(j.attempts(), 3);
    }

    #[test]
    fn test_first_poll_finished_passes_through_running() {
        let clock = FakeClock::default();
        let cancel = CancellationToken::new();
        let poller = JobPoller::new(PollSchedule::standard(), &clock, &cancel);
        let mut j = job();
        poller
            .run(&mut j, |_| Ok(PollOutcome::Finished(())))
            .unwrap();
        assert_eq!(j.state(), JobState::Finished);
    }

    #[test]
    fn test_remote_failure_is_terminal() {
        let clock = FakeClock::default();
        let cancel = CancellationToken::new();
        let poller = JobPoller::new(PollSchedule::standard(), &clock, &cancel);
        let mut j = job();
        let res: Result<(), _> =
            poller.run(&mut j, |_| Ok(PollOutcome::Failed("FAILURE".to_string())));
        assert!(matches!(res, Err(AnnotationError::JobFailed { ref status, .. }) if status == "FAILURE"));
        assert_eq!(j.state(), JobState::Failed);
    }

    #[test]
    fn test_network_fault_costs_one_attempt() {
        let clock = FakeClock::default();
        let cancel = CancellationToken::new();
        let poller = JobPoller::new(PollSchedule::standard(), &clock, &cancel);
        let mut j = job();
        let mut checks = 0;
        let res = poller.run(&mut j, |_| {
            checks += 1;
            match checks {
                1 => Err(AnnotationError::TransientNetwork("reset".to_string())),
                _ => Ok(PollOutcome::Finished(checks)),
            }
        });
        assert_eq!(res.unwrap(), 2);
    }

    #[test]
    fn test_cancellation_stops_at_next_boundary() {
        let clock = FakeClock::default();
        let cancel = CancellationToken::new();
        let poller = JobPoller::new(PollSchedule::standard(), &clock, &cancel);
        let mut j = job();
        let mut checks = 0;
        let res: Result<(), _> = poller.run(&mut j, |_| {
            checks += 1;
            if checks == 2 {
                cancel.cancel();
            }
            Ok(PollOutcome::Running("RUNNING".to_string()))
        });
        assert!(matches!(res, Err(AnnotationError::Cancelled)));
        assert_eq!(checks, 2);
        assert_eq!(j.state(), JobState::Running);
    }
}
