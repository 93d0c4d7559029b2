//! Lipsync Capture Engine
//!
//! Runs the external phoneme recognizer for one audio file and turns its
//! output into mouth cues. The host drives the job by calling
//! [`CaptureJob::poll_progress`] at its own cadence. While the recognizer runs
//! the call never blocks; the tick that completes a cancel waits a bounded
//! time for the process to exit and the reader threads to join.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   CaptureJob                      │
//! │                                                   │
//! │   recognizer process ──stdout──▶ output drainer ─┐│
//! │          │                                       ││
//! │          └─────────stderr──▶ status reader ──────┤│
//! │                                                  ▼│
//! │                                     mpsc queue    │
//! │                                         │         │
//! │   host tick ──▶ poll_progress() ◀──try_recv       │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod command;
pub mod executable;
pub mod job;
pub mod runner;

pub use command::CaptureCommand;
pub use executable::{ensure_executable, resolve_executable, ExecutableInfo};
pub use job::{Job, JobFailure, JobStatus};
pub use runner::CaptureJob;
