//! The recognizer process and its reader threads.
//!
//! All blocking I/O happens on two dedicated threads: one drains stdout (the
//! cue document) so the recognizer never stalls on a full pipe, the other
//! reads stderr status lines. Both report through one mpsc queue that the
//! coordinating thread empties with `try_recv` from [`CaptureJob::poll_progress`].

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use lipsync_common::error::{LipsyncError, LipsyncResult};
use lipsync_cue_model::cue::MouthCue;
use lipsync_cue_model::protocol::{parse_status_line, CueDocument, StatusKind, ToolLog, ToolLogLevel};

use crate::command::CaptureCommand;
use crate::executable::ensure_executable;
use crate::job::{Job, JobFailure, JobStatus};

/// Default bound on joining a reader thread.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Time a recognizer gets to exit after SIGTERM before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Which pipe a reader thread owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Output,
    Status,
}

impl Stream {
    fn name(&self) -> &'static str {
        match self {
            Stream::Output => "output",
            Stream::Status => "status",
        }
    }
}

/// Messages from the reader threads to the coordinator.
#[derive(Debug)]
enum JobMessage {
    /// Fraction complete from a `progress` line.
    Progress(f64),
    /// Reason from a `failure` line.
    Failure(String),
    /// Tool log to relay.
    Log(ToolLog),
    /// A read failed; the thread has stopped.
    Exception { stream: Stream, message: String },
    /// Complete stdout as raw bytes, sent once at EOF.
    Output(Vec<u8>),
    /// Status stream reached EOF.
    StatusClosed,
}

/// One run of the recognizer, driven by a host tick.
pub struct CaptureJob {
    program: PathBuf,
    args: Vec<String>,
    job: Job,
    join_timeout: Duration,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    stop_flag: Arc<AtomicBool>,
    receiver: Option<Receiver<JobMessage>>,
    readers: Vec<(Stream, JoinHandle<()>)>,
    output: Option<Vec<u8>>,
    status_closed: bool,
    failure_reason: Option<String>,
    document: Option<CueDocument>,
}

impl CaptureJob {
    /// Prepare a job for an arbitrary program; nothing runs until [`CaptureJob::start`].
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            job: Job::new(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            child: None,
            stdout: None,
            stderr: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            receiver: None,
            readers: Vec::new(),
            output: None,
            status_closed: false,
            failure_reason: None,
            document: None,
        }
    }

    /// Prepare a capture-mode job.
    pub fn for_command(command: &CaptureCommand) -> Self {
        Self::new(command.executable.clone(), command.args())
    }

    /// Validate the input and start capturing in one step.
    pub fn spawn(command: &CaptureCommand) -> LipsyncResult<Self> {
        if !command.input.exists() {
            return Err(LipsyncError::FileNotFound {
                path: command.input.clone(),
            });
        }
        let mut job = Self::for_command(command);
        job.start()?;
        Ok(job)
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn status(&self) -> JobStatus {
        self.job.status()
    }

    pub fn progress(&self) -> i32 {
        self.job.progress()
    }

    pub fn error(&self) -> Option<&JobFailure> {
        self.job.error()
    }

    pub fn status_line(&self) -> String {
        self.job.status_line()
    }

    /// Spawn the recognizer.
    pub fn start(&mut self) -> LipsyncResult<()> {
        if self.job.status() != JobStatus::NotStarted {
            return Err(LipsyncError::invalid_state(format!(
                "capture job already {}",
                self.job.status()
            )));
        }

        ensure_executable(&self.program)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                LipsyncError::config(format!(
                    "failed to start recognizer {}: {e}",
                    self.program.display()
                ))
            })?;

        self.stdout = child.stdout.take();
        self.stderr = child.stderr.take();

        tracing::info!(
            pid = child.id(),
            program = %self.program.display(),
            args = ?self.args,
            "Recognizer process started"
        );

        self.child = Some(child);
        self.job.begin();
        Ok(())
    }

    /// Advance the job.
    ///
    /// A running job never blocks here. The tick that completes a cancel
    /// waits a bounded time: up to half a second for the recognizer to exit
    /// after SIGTERM, then the reader join timeout.
    ///
    /// Returns the percent complete once known (`Some(100)` when done), or
    /// the job's failure. Polling a finished job repeats its outcome;
    /// polling a cancelled or unstarted job returns `Ok(None)`.
    pub fn poll_progress(&mut self) -> LipsyncResult<Option<u8>> {
        match self.job.status() {
            JobStatus::NotStarted | JobStatus::Cancelled => return Ok(None),
            JobStatus::Done => return Ok(Some(100)),
            JobStatus::Failed => return Err(self.failure_error()),
            JobStatus::Cancelling => {
                self.finish_cancel();
                return match self.job.status() {
                    JobStatus::Failed => Err(self.failure_error()),
                    _ => Ok(None),
                };
            }
            JobStatus::Running => {}
        }

        if let Err(failure) = self.spawn_readers() {
            return Err(self.abort(failure));
        }

        if let Err(failure) = self.drain_messages() {
            return Err(self.abort(failure));
        }

        if self.output.is_some() && self.status_closed {
            let exited = match self.child.as_mut().map(Child::try_wait) {
                Some(Ok(status)) => status,
                Some(Err(e)) => {
                    return Err(self.abort(JobFailure::io(format!(
                        "failed to query recognizer status: {e}"
                    ))))
                }
                None => None,
            };
            if let Some(status) = exited {
                self.finalize(status)?;
                return Ok(Some(100));
            }
        }

        Ok(self.current_progress())
    }

    /// Request cancellation. Idempotent.
    ///
    /// The reader threads see the stop flag immediately; the process itself
    /// is terminated on the next [`CaptureJob::poll_progress`], so hosts can
    /// show a "cancelling" state for one tick.
    pub fn cancel(&mut self) {
        let previous = self.job.status();
        if self.job.request_cancel() {
            self.stop_flag.store(true, Ordering::SeqCst);
            tracing::info!(from = %previous, "Capture cancel requested");
        }
    }

    /// Cues from a successful run.
    pub fn get_cues(&self) -> LipsyncResult<Vec<MouthCue>> {
        self.document().map(|doc| doc.cues.clone())
    }

    /// Full cue document from a successful run.
    pub fn document(&self) -> LipsyncResult<&CueDocument> {
        match (&self.document, self.job.status()) {
            (Some(doc), JobStatus::Done) => Ok(doc),
            (_, status) => Err(LipsyncError::invalid_state(format!(
                "cues are only available after a successful capture (job is {status})"
            ))),
        }
    }

    fn current_progress(&self) -> Option<u8> {
        u8::try_from(self.job.progress()).ok()
    }

    fn failure_error(&self) -> LipsyncError {
        self.job
            .error()
            .map(JobFailure::to_error)
            .unwrap_or_else(|| LipsyncError::invalid_state("capture failed without a reason"))
    }

    /// Start the reader threads on the first poll.
    fn spawn_readers(&mut self) -> Result<(), JobFailure> {
        if self.receiver.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();

        let stdout = self
            .stdout
            .take()
            .ok_or_else(|| JobFailure::io("recognizer stdout was not captured"))?;
        let stderr = self
            .stderr
            .take()
            .ok_or_else(|| JobFailure::io("recognizer stderr was not captured"))?;

        let output_tx = tx.clone();
        let output_stop = Arc::clone(&self.stop_flag);
        let output = std::thread::Builder::new()
            .name("lipsync-output".to_string())
            .spawn(move || drain_output(stdout, output_stop, output_tx))
            .map_err(|e| JobFailure::io(format!("failed to spawn output reader: {e}")))?;
        self.readers.push((Stream::Output, output));

        let status_stop = Arc::clone(&self.stop_flag);
        let status = std::thread::Builder::new()
            .name("lipsync-status".to_string())
            .spawn(move || read_status(stderr, status_stop, tx))
            .map_err(|e| JobFailure::io(format!("failed to spawn status reader: {e}")))?;
        self.readers.push((Stream::Status, status));

        self.receiver = Some(rx);
        tracing::debug!("Recognizer reader threads started");
        Ok(())
    }

    /// Empty the queue without blocking.
    fn drain_messages(&mut self) -> Result<(), JobFailure> {
        let Some(receiver) = self.receiver.as_ref() else {
            return Ok(());
        };

        loop {
            match receiver.try_recv() {
                Ok(JobMessage::Progress(fraction)) => self.job.set_progress(fraction),
                Ok(JobMessage::Failure(reason)) => {
                    tracing::warn!(reason = %reason, "Recognizer reported failure");
                    self.failure_reason = Some(reason);
                }
                Ok(JobMessage::Log(log)) => relay_tool_log(&log),
                Ok(JobMessage::Exception { stream, message }) => match stream {
                    Stream::Output => {
                        return Err(JobFailure::io(format!(
                            "failed reading recognizer output: {message}"
                        )))
                    }
                    Stream::Status => {
                        tracing::warn!(error = %message, "Status stream failed; progress unavailable");
                        self.status_closed = true;
                    }
                },
                Ok(JobMessage::Output(output)) => self.output = Some(output),
                Ok(JobMessage::StatusClosed) => self.status_closed = true,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    if self.output.is_none() {
                        return Err(JobFailure::io(
                            "recognizer readers stopped before output was complete",
                        ));
                    }
                    self.status_closed = true;
                    return Ok(());
                }
            }
        }
    }

    /// The process has exited and both streams are drained.
    fn finalize(&mut self, status: ExitStatus) -> LipsyncResult<()> {
        self.join_readers();
        self.child = None;

        let exit_code = status.code();
        if !status.success() || self.failure_reason.is_some() {
            let reason = self
                .failure_reason
                .take()
                .unwrap_or_else(|| format!("recognizer exited with {status}"));
            let failure = JobFailure::process(reason, exit_code);
            tracing::error!(exit_code = ?exit_code, reason = %failure.reason, "Capture failed");
            self.job.fail(failure);
            return Err(self.failure_error());
        }

        let output = match String::from_utf8(self.output.take().unwrap_or_default()) {
            Ok(output) => output,
            Err(e) => {
                let failure = JobFailure::protocol(format!("recognizer output is not UTF-8: {e}"));
                tracing::error!(reason = %failure.reason, "Recognizer output could not be decoded");
                self.job.fail(failure);
                return Err(self.failure_error());
            }
        };
        match CueDocument::parse(&output) {
            Ok(document) => {
                tracing::info!(
                    cues = document.cues.len(),
                    duration_secs = document.metadata.duration,
                    "Capture complete"
                );
                self.document = Some(document);
                self.job.complete();
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Recognizer output could not be parsed");
                self.job.fail(JobFailure::protocol(e.to_string()));
                Err(e)
            }
        }
    }

    /// Stop everything after a coordinator-side failure.
    fn abort(&mut self, failure: JobFailure) -> LipsyncError {
        tracing::error!(reason = %failure.reason, "Aborting capture");
        self.shutdown();
        self.job.fail(failure);
        self.failure_error()
    }

    /// Second half of a cancel, one tick after the request.
    fn finish_cancel(&mut self) {
        match self.terminate_process() {
            Ok(()) => {
                self.join_readers();
                self.job.mark_cancelled();
                tracing::info!("Capture cancelled");
            }
            Err(e) => {
                self.join_readers();
                self.job
                    .fail(JobFailure::io(format!("failed to stop recognizer: {e}")));
            }
        }
    }

    /// Best-effort teardown of the process and readers.
    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Err(e) = self.terminate_process() {
            tracing::warn!(error = %e, "Failed to stop recognizer");
        }
        self.join_readers();
    }

    fn terminate_process(&mut self) -> std::io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(status) = child.try_wait()? {
            tracing::debug!(%status, "Recognizer already exited");
            return Ok(());
        }

        request_exit(&child);
        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        tracing::debug!(pid = child.id(), "Recognizer ignored terminate; killing");
        match child.kill() {
            Ok(()) => {}
            // Exited between the last check and the kill.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        child.wait()?;
        Ok(())
    }

    fn join_readers(&mut self) {
        for (stream, handle) in self.readers.drain(..) {
            join_with_timeout(stream, handle, self.join_timeout);
        }
        self.receiver = None;
    }
}

impl Drop for CaptureJob {
    fn drop(&mut self) {
        if self.child.is_some() || !self.readers.is_empty() {
            self.shutdown();
        }
    }
}

/// Politely ask the process to exit.
#[cfg(unix)]
fn request_exit(child: &Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: plain syscall on a pid we spawned and have not reaped yet.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        tracing::debug!(
            pid,
            error = %std::io::Error::last_os_error(),
            "SIGTERM to recognizer failed"
        );
    }
}

#[cfg(not(unix))]
fn request_exit(_child: &Child) {}

/// Join a reader, giving up after `timeout`. A thread that does not finish is
/// left running and reported as leaked.
fn join_with_timeout(stream: Stream, handle: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(
                reader = stream.name(),
                timeout_ms = timeout.as_millis() as u64,
                "Reader thread did not stop in time; leaking it"
            );
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        tracing::warn!(reader = stream.name(), "Reader thread panicked");
    }
}

/// Read stdout to EOF, one line per iteration, and hand it over whole.
/// Decoding is left to the coordinator.
fn drain_output(stdout: ChildStdout, stop: Arc<AtomicBool>, tx: Sender<JobMessage>) {
    let mut reader = BufReader::new(stdout);
    let mut output = Vec::new();

    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        match reader.read_until(b'\n', &mut output) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(JobMessage::Exception {
                    stream: Stream::Output,
                    message: e.to_string(),
                });
                return;
            }
        }
    }

    let _ = tx.send(JobMessage::Output(output));
}

/// Parse stderr status lines until EOF. Lines that are not UTF-8 are
/// decoded lossily; the stream is never abandoned over one bad line.
fn read_status(stderr: ChildStderr, stop: Arc<AtomicBool>, tx: Sender<JobMessage>) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();

    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let Some(event) = parse_status_line(&line) else {
                    continue;
                };
                if let Some(log) = event.log {
                    if tx.send(JobMessage::Log(log)).is_err() {
                        return;
                    }
                }
                let message = match event.kind {
                    StatusKind::Progress(value) => JobMessage::Progress(value),
                    StatusKind::Failure(reason) => JobMessage::Failure(reason),
                    StatusKind::Start | StatusKind::Other => continue,
                };
                if tx.send(message).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(JobMessage::Exception {
                    stream: Stream::Status,
                    message: e.to_string(),
                });
                return;
            }
        }
    }

    let _ = tx.send(JobMessage::StatusClosed);
}

/// Re-emit a recognizer log message through tracing.
fn relay_tool_log(log: &ToolLog) {
    let message = log.message.as_str();
    match log.level {
        ToolLogLevel::Fatal | ToolLogLevel::Error => {
            tracing::error!(target: "lipsync::tool", level = ?log.level, "{message}")
        }
        ToolLogLevel::Warn => tracing::warn!(target: "lipsync::tool", "{message}"),
        ToolLogLevel::Info => tracing::info!(target: "lipsync::tool", "{message}"),
        ToolLogLevel::Trace | ToolLogLevel::Debug | ToolLogLevel::Unknown => {
            tracing::debug!(target: "lipsync::tool", level = ?log.level, "{message}")
        }
    }
}
