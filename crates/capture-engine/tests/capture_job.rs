//! Drives real processes through `CaptureJob`. The recognizer is stood in
//! for by `/bin/sh -c <script>` speaking the same protocol.
#![cfg(unix)]

use std::time::{Duration, Instant};

use lipsync_capture_engine::job::JobStatus;
use lipsync_capture_engine::CaptureJob;
use lipsync_common::error::LipsyncError;
use lipsync_cue_model::cue::MouthShape;

fn shell_job(script: &str) -> CaptureJob {
    CaptureJob::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
        .with_join_timeout(Duration::from_secs(5))
}

/// Poll like a host timer would until the job reaches a terminal state.
fn poll_until_terminal(job: &mut CaptureJob) -> Vec<Result<Option<u8>, String>> {
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut seen = Vec::new();
    while !job.status().is_terminal() {
        assert!(Instant::now() < deadline, "job never finished: {}", job.status_line());
        seen.push(job.poll_progress().map_err(|e| e.to_string()));
        std::thread::sleep(Duration::from_millis(10));
    }
    seen
}

const SUCCESS_SCRIPT: &str = r#"
printf '%s\n' '{"type":"start","log":{"level":"Info","message":"Application startup."}}' >&2
printf '%s\n' '{"type":"progress","value":0.5}' >&2
printf '%s\n' 'not json at all' >&2
printf '%s\n' '{"type":"progress","value":1.0}' >&2
printf '%s\n' '{"metadata":{"soundFile":"line.wav","duration":"2.00"},"mouthCues":['
printf '%s\n' '{"start":"0.00","end":"0.50","value":"X"},'
printf '%s\n' '{"start":"0.50","end":"0.60","value":"A"},'
printf '%s\n' '{"start":"0.60","end":"2.00","value":"X"}]}'
exit 0
"#;

#[test]
fn successful_capture_reports_done_and_cues() {
    let mut job = shell_job(SUCCESS_SCRIPT);
    assert_eq!(job.status(), JobStatus::NotStarted);
    assert_eq!(job.progress(), -1);

    job.start().unwrap();
    assert_eq!(job.status(), JobStatus::Running);

    let polls = poll_until_terminal(&mut job);
    assert!(polls.iter().all(Result::is_ok), "unexpected failure: {polls:?}");
    assert_eq!(job.status(), JobStatus::Done);
    assert_eq!(job.progress(), 100);
    assert_eq!(job.poll_progress().unwrap(), Some(100));

    let cues = job.get_cues().unwrap();
    assert_eq!(cues.len(), 3);
    assert_eq!(cues[1].shape, MouthShape::A);
    assert!((cues[1].start - 0.5).abs() < 1e-9);

    // Cached: asking again yields the same cues.
    assert_eq!(job.get_cues().unwrap(), cues);
    assert_eq!(job.document().unwrap().metadata.sound_file, "line.wav");
}

#[test]
fn failure_line_and_exit_code_fail_the_job() {
    let mut job = shell_job(
        r#"
printf '%s\n' '{"type":"start"}' >&2
printf '%s\n' '{"type":"failure","reason":"bad audio","log":{"level":"Fatal","message":"bad audio"}}' >&2
exit 2
"#,
    );
    job.start().unwrap();
    let polls = poll_until_terminal(&mut job);

    assert_eq!(job.status(), JobStatus::Failed);
    let failure = job.error().unwrap();
    assert_eq!(failure.reason, "bad audio");
    assert_eq!(failure.exit_code, Some(2));
    assert!(polls.last().unwrap().is_err());

    match job.poll_progress() {
        Err(LipsyncError::ProcessFailure { reason, exit_code }) => {
            assert_eq!(reason, "bad audio");
            assert_eq!(exit_code, Some(2));
        }
        other => panic!("expected process failure, got {other:?}"),
    }

    assert!(matches!(
        job.get_cues().unwrap_err(),
        LipsyncError::InvalidState { .. }
    ));
}

#[test]
fn failure_line_fails_the_job_even_on_clean_exit() {
    let mut job = shell_job(
        r#"
printf '%s\n' '{"type":"failure","reason":"dialog file unreadable"}' >&2
printf '%s\n' '{"mouthCues":[]}'
exit 0
"#,
    );
    job.start().unwrap();
    poll_until_terminal(&mut job);

    assert_eq!(job.status(), JobStatus::Failed);
    let failure = job.error().unwrap();
    assert_eq!(failure.reason, "dialog file unreadable");
    assert_eq!(failure.exit_code, Some(0));
    assert!(matches!(
        job.poll_progress().unwrap_err(),
        LipsyncError::ProcessFailure { .. }
    ));
    assert!(job.get_cues().is_err());
}

#[test]
fn progress_reaches_the_host_while_running() {
    let mut job = shell_job(
        r#"
printf '%s\n' '{"type":"progress","value":0.5}' >&2
sleep 1
printf '%s\n' '{"mouthCues":[{"start":"0.00","end":"0.30","value":"C"}]}'
"#,
    );
    job.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut seen_midway = false;
    while job.status() == JobStatus::Running && Instant::now() < deadline {
        if job.poll_progress().unwrap() == Some(50) && job.status() == JobStatus::Running {
            seen_midway = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(seen_midway, "never saw 50% while running: {}", job.status_line());
    assert_eq!(job.progress(), 50);

    poll_until_terminal(&mut job);
    assert_eq!(job.status(), JobStatus::Done);
    assert_eq!(job.progress(), 100);
}

#[test]
fn status_line_with_invalid_utf8_is_skipped() {
    // The recognizer keeps writing to stderr after the bad line, so the
    // status reader must stay attached to the pipe.
    let mut job = shell_job(
        r#"
printf '{"type":"start","log":{"level":"Info","message":"file \377\376.wav"}}\n' >&2
printf '\377 garbage\n' >&2
sleep 0.3
printf '%s\n' '{"type":"progress","value":0.8}' >&2
printf '%s\n' '{"mouthCues":[{"start":"0.00","end":"0.40","value":"D"}]}'
exit 0
"#,
    );
    job.start().unwrap();
    let polls = poll_until_terminal(&mut job);

    assert!(polls.iter().all(Result::is_ok), "unexpected failure: {polls:?}");
    assert_eq!(job.status(), JobStatus::Done);
    assert_eq!(job.get_cues().unwrap()[0].shape, MouthShape::D);
}

#[test]
fn document_with_invalid_utf8_is_a_protocol_failure() {
    let mut job = shell_job(
        r#"
printf '{"metadata":{"soundFile":"\377.wav"},"mouthCues":[]}\n'
exit 0
"#,
    );
    job.start().unwrap();
    poll_until_terminal(&mut job);

    assert_eq!(job.status(), JobStatus::Failed);
    assert!(matches!(
        job.poll_progress().unwrap_err(),
        LipsyncError::Protocol { .. }
    ));
}

#[test]
fn non_zero_exit_without_reason_still_fails() {
    let mut job = shell_job("exit 3");
    job.start().unwrap();
    poll_until_terminal(&mut job);

    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.error().unwrap().exit_code, Some(3));
}

#[test]
fn unparsable_document_is_a_protocol_failure() {
    let mut job = shell_job(r#"printf '%s\n' '{"metadata":{}}'"#);
    job.start().unwrap();
    poll_until_terminal(&mut job);

    assert_eq!(job.status(), JobStatus::Failed);
    assert!(matches!(
        job.poll_progress().unwrap_err(),
        LipsyncError::Protocol { .. }
    ));
}

#[test]
fn large_output_is_drained_while_running() {
    // Far more than a pipe buffer of padding before the document.
    let mut job = shell_job(
        r#"
head -c 300000 /dev/zero | tr '\0' ' '
printf '%s\n' '{"mouthCues":[{"start":"0.00","end":"0.20","value":"B"}]}'
"#,
    );
    job.start().unwrap();
    poll_until_terminal(&mut job);

    assert_eq!(job.status(), JobStatus::Done);
    assert_eq!(job.get_cues().unwrap().len(), 1);
}

#[test]
fn cancel_is_deferred_one_tick_and_idempotent() {
    let mut job = shell_job("exec sleep 30");
    job.start().unwrap();
    assert_eq!(job.poll_progress().unwrap(), Some(0));

    job.cancel();
    job.cancel();
    assert_eq!(job.status(), JobStatus::Cancelling);
    assert_eq!(job.status_line(), "Cancelling...");

    let started = Instant::now();
    assert_eq!(job.poll_progress().unwrap(), None);
    assert_eq!(job.status(), JobStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));

    job.cancel();
    assert_eq!(job.status(), JobStatus::Cancelled);
    assert_eq!(job.poll_progress().unwrap(), None);
    assert!(job.get_cues().is_err());
}

#[test]
fn cancel_before_first_poll_still_reclaims_process() {
    let mut job = shell_job("exec sleep 30");
    job.start().unwrap();
    job.cancel();
    assert_eq!(job.poll_progress().unwrap(), None);
    assert_eq!(job.status(), JobStatus::Cancelled);
}

#[test]
fn dropping_a_running_job_does_not_hang() {
    let started = Instant::now();
    {
        let mut job = shell_job("exec sleep 30");
        job.start().unwrap();
        job.poll_progress().unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn starting_twice_is_rejected() {
    let mut job = shell_job("exit 0");
    job.start().unwrap();
    assert!(matches!(
        job.start().unwrap_err(),
        LipsyncError::InvalidState { .. }
    ));
    job.cancel();
    job.poll_progress().unwrap();
}
