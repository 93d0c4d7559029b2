//! Capture job state machine.
//!
//! ```text
//! NotStarted ──▶ Running ──▶ Done | Failed
//!                   │
//!                   └──▶ Cancelling ──▶ Cancelled | Failed
//! ```
//!
//! `NotStarted` may also go straight to `Cancelled` when a capture is
//! abandoned before its process was spawned.

use std::fmt;

use chrono::{DateTime, Utc};
use lipsync_common::error::LipsyncError;

/// Lifecycle state of a capture job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    NotStarted,
    Running,
    /// Cancel requested; the process is reclaimed on the next poll.
    Cancelling,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::NotStarted => "not started",
            JobStatus::Running => "running",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Category of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-zero exit or an explicit `failure` status line.
    Process,
    /// Unreadable cue document.
    Protocol,
    /// Pipe or process handling failed on our side.
    Io,
}

/// Why a job ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub reason: String,
    pub exit_code: Option<i32>,
}

impl JobFailure {
    pub fn process(reason: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            kind: FailureKind::Process,
            reason: reason.into(),
            exit_code,
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Protocol,
            reason: reason.into(),
            exit_code: None,
        }
    }

    pub fn io(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Io,
            reason: reason.into(),
            exit_code: None,
        }
    }

    /// Error value handed to the caller.
    pub fn to_error(&self) -> LipsyncError {
        match self.kind {
            FailureKind::Process => LipsyncError::process_failure(&self.reason, self.exit_code),
            FailureKind::Protocol => LipsyncError::protocol(&self.reason),
            FailureKind::Io => LipsyncError::Io(std::io::Error::other(self.reason.clone())),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} (exit code {code})", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

/// Observable state of one recognizer invocation.
#[derive(Debug, Clone)]
pub struct Job {
    /// Percent complete, `-1` before the process starts.
    progress: i32,
    status: JobStatus,
    error: Option<JobFailure>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

impl Job {
    pub fn new() -> Self {
        Self {
            progress: -1,
            status: JobStatus::NotStarted,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn progress(&self) -> i32 {
        self.progress
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn error(&self) -> Option<&JobFailure> {
        self.error.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Wall-clock run time, up to now while the job is active.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        Some(self.finished_at.unwrap_or_else(Utc::now) - start)
    }

    /// `NotStarted -> Running`.
    pub(crate) fn begin(&mut self) {
        debug_assert_eq!(self.status, JobStatus::NotStarted);
        self.status = JobStatus::Running;
        self.progress = 0;
        self.started_at = Some(Utc::now());
    }

    /// Record progress while running. Capped at 99 until the job is done.
    pub(crate) fn set_progress(&mut self, fraction: f64) {
        if self.status == JobStatus::Running {
            let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as i32;
            self.progress = percent.min(99);
        }
    }

    /// `Running -> Cancelling`, `NotStarted -> Cancelled`. Returns whether
    /// this call changed anything.
    pub(crate) fn request_cancel(&mut self) -> bool {
        match self.status {
            JobStatus::NotStarted => {
                self.finish(JobStatus::Cancelled);
                true
            }
            JobStatus::Running => {
                self.status = JobStatus::Cancelling;
                true
            }
            _ => false,
        }
    }

    /// `Running -> Done`.
    pub(crate) fn complete(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Running);
        self.progress = 100;
        self.finish(JobStatus::Done);
    }

    /// `Cancelling -> Cancelled`.
    pub(crate) fn mark_cancelled(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Cancelling);
        self.finish(JobStatus::Cancelled);
    }

    /// Any active state `-> Failed`.
    pub(crate) fn fail(&mut self, failure: JobFailure) {
        debug_assert!(!self.status.is_terminal());
        self.error = Some(failure);
        self.finish(JobStatus::Failed);
    }

    fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Short human-readable state for status bars.
    pub fn status_line(&self) -> String {
        match self.status {
            JobStatus::NotStarted => "Not started".to_string(),
            JobStatus::Running => format!("Capturing {}%", self.progress.max(0)),
            JobStatus::Cancelling => "Cancelling...".to_string(),
            JobStatus::Done => "Capture complete".to_string(),
            JobStatus::Failed => match &self.error {
                Some(failure) => format!("Capture failed: {failure}"),
                None => "Capture failed".to_string(),
            },
            JobStatus::Cancelled => "Capture cancelled".to_string(),
        }
    }
}
