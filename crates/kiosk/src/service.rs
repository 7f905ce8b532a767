use crate::camera::{CaptureError, FrameSource};
use crate::recognize::Recognizer;
use crate::scheduler::TickScheduler;
use crate::state_machine::{CycleContext, CycleState, ResultOutcome, TickGate};
use crate::status::{Severity, StatusSink};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

pub const READY_MESSAGE: &str = "Ready to capture. Please look at the camera.";
pub const PROCESSING_MESSAGE: &str = "Processing face recognition...";
pub const SCANNING_MESSAGE: &str = "Scanning for faces...";
pub const CAPTURE_RETRY_MESSAGE: &str = "Scanning...";
pub const CAMERA_NOT_READY_MESSAGE: &str = "Waiting for camera...";

/// Transient status for a failed capture: a camera that is not ready yet
/// reads differently from a stream or encode fault.
fn capture_status(error: &CaptureError) -> &'static str {
    match error {
        CaptureError::NotReady => CAMERA_NOT_READY_MESSAGE,
        _ => CAPTURE_RETRY_MESSAGE,
    }
}

/// What a single tick did. Returned for logging and tests; the loop itself
/// only consults its `CycleContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped,
    Resumed,
    CaptureFailed,
    SubmitFailed,
    Recognized,
    NoSubject,
    NoMatch,
}

/// The capture loop: on each tick, capture a frame, submit it, classify the
/// response, adjust cadence. Generic over its collaborators so it runs
/// headlessly under test.
pub struct CaptureLoop<S, R, T> {
    source: S,
    recognizer: R,
    status: T,
    cycle: CycleContext,
}

impl<S, R, T> CaptureLoop<S, R, T>
where
    S: FrameSource,
    R: Recognizer,
    T: StatusSink,
{
    pub fn new(source: S, recognizer: R, status: T, pause_duration: Duration) -> Self {
        Self {
            source,
            recognizer,
            status,
            cycle: CycleContext::new(pause_duration),
        }
    }

    pub fn state(&self) -> CycleState {
        self.cycle.state()
    }

    /// Give the frame source back, for teardown after the loop stops.
    pub fn into_source(self) -> S {
        self.source
    }

    /// One full tick. Never re-entered: the state gate skips ticks that
    /// arrive while a cycle is in flight or the cool-down is running.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        match self.cycle.begin_tick(now) {
            TickGate::Skip => return TickOutcome::Skipped,
            TickGate::Resumed => {
                tracing::debug!("Cool-down elapsed, resuming capture");
                self.status.status_changed(READY_MESSAGE, Severity::Info);
                return TickOutcome::Resumed;
            }
            TickGate::Capture => {}
        }

        let frame = match self.source.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "Frame capture failed, retrying next tick");
                self.status.status_changed(capture_status(&e), Severity::Info);
                self.cycle.capture_failed();
                return TickOutcome::CaptureFailed;
            }
        };

        self.cycle.frame_captured();
        self.status.status_changed(PROCESSING_MESSAGE, Severity::Info);

        let result = match self.recognizer.recognize(&frame) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Recognition submit failed, retrying next tick");
                self.status.status_changed(SCANNING_MESSAGE, Severity::Error);
                self.cycle.submit_failed();
                return TickOutcome::SubmitFailed;
            }
        };

        match self.cycle.apply_result(&result, now) {
            ResultOutcome::Recognized { name, id } => {
                let text = match id {
                    Some(id) => format!("Welcome {name} ({id})!"),
                    None => format!("Welcome {name}!"),
                };
                tracing::info!(subject = %name, "Attendance marked, pausing capture");
                self.status.status_changed(&text, Severity::Success);
                TickOutcome::Recognized
            }
            ResultOutcome::NoSubject => {
                // No visible success message: avoids flashing a false positive.
                tracing::debug!("Recognition succeeded without a subject");
                self.status.status_changed(READY_MESSAGE, Severity::Info);
                TickOutcome::NoSubject
            }
            ResultOutcome::Rejected { message } => {
                let text = message.as_deref().unwrap_or(SCANNING_MESSAGE);
                tracing::debug!(message = %text, "No match");
                self.status.status_changed(text, Severity::Info);
                TickOutcome::NoMatch
            }
        }
    }

    /// Drive ticks off the scheduler until shutdown is requested.
    pub fn run(&mut self, scheduler: &mut TickScheduler, shutdown: &AtomicBool) {
        tracing::info!("Capture loop started");
        self.status.status_changed(READY_MESSAGE, Severity::Info);

        let mut ticks = 0u64;
        while scheduler.wait(shutdown) {
            let outcome = self.tick(Instant::now());
            ticks += 1;
            tracing::trace!(ticks, ?outcome, state = ?self.cycle.state(), "Tick complete");
        }

        tracing::info!(ticks, "Capture loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CaptureError, Frame};
    use crate::recognize::{RecognitionResult, RecognizeError};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    const PAUSE: Duration = Duration::from_secs(10);

    struct ScriptedSource {
        frames: VecDeque<Result<Frame, CaptureError>>,
    }

    impl ScriptedSource {
        fn ok(count: usize) -> Self {
            let mut frames = VecDeque::new();
            for _ in 0..count {
                frames.push_back(Ok(test_frame()));
            }
            Self { frames }
        }

        fn erroring(error: CaptureError) -> Self {
            let mut frames = VecDeque::new();
            frames.push_back(Err(error));
            Self { frames }
        }
    }

    impl FrameSource for ScriptedSource {
        fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
            self.frames
                .pop_front()
                .unwrap_or(Err(CaptureError::NotReady))
        }
    }

    struct ScriptedRecognizer {
        responses: VecDeque<Result<RecognitionResult, RecognizeError>>,
        submissions: usize,
    }

    impl ScriptedRecognizer {
        fn with(responses: Vec<Result<RecognitionResult, RecognizeError>>) -> Self {
            Self {
                responses: responses.into(),
                submissions: 0,
            }
        }
    }

    impl Recognizer for ScriptedRecognizer {
        fn recognize(&mut self, _frame: &Frame) -> Result<RecognitionResult, RecognizeError> {
            self.submissions += 1;
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(RecognizeError::HttpStatus(500)))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        events: Rc<RefCell<Vec<(String, Severity)>>>,
    }

    impl RecordingSink {
        fn last(&self) -> Option<(String, Severity)> {
            self.events.borrow().last().cloned()
        }

        fn texts(&self) -> Vec<String> {
            self.events.borrow().iter().map(|(t, _)| t.clone()).collect()
        }
    }

    impl StatusSink for RecordingSink {
        fn status_changed(&self, text: &str, severity: Severity) {
            self.events.borrow_mut().push((text.to_string(), severity));
        }
    }

    fn test_frame() -> Frame {
        Frame {
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
            mime: "image/jpeg",
            width: 640,
            height: 480,
        }
    }

    fn alice() -> RecognitionResult {
        RecognitionResult {
            success: true,
            subject_name: Some("Alice".to_string()),
            subject_id: Some("42".to_string()),
            message: Some("Welcome Alice! Attendance marked.".to_string()),
        }
    }

    #[test]
    fn recognized_subject_shows_welcome_and_pauses() {
        let sink = RecordingSink::default();
        let mut capture_loop = CaptureLoop::new(
            ScriptedSource::ok(1),
            ScriptedRecognizer::with(vec![Ok(alice())]),
            sink.clone(),
            PAUSE,
        );

        let outcome = capture_loop.tick(Instant::now());

        assert_eq!(outcome, TickOutcome::Recognized);
        assert_eq!(capture_loop.state(), CycleState::Paused);
        assert_eq!(
            sink.last(),
            Some(("Welcome Alice (42)!".to_string(), Severity::Success))
        );
    }

    #[test]
    fn pause_window_ignores_ticks_then_resets_to_ready() {
        let t0 = Instant::now();
        let sink = RecordingSink::default();
        let mut capture_loop = CaptureLoop::new(
            ScriptedSource::ok(2),
            ScriptedRecognizer::with(vec![Ok(alice())]),
            sink.clone(),
            PAUSE,
        );

        assert_eq!(capture_loop.tick(t0), TickOutcome::Recognized);
        assert_eq!(
            capture_loop.tick(t0 + Duration::from_secs(3)),
            TickOutcome::Skipped
        );
        assert_eq!(
            capture_loop.tick(t0 + Duration::from_secs(11)),
            TickOutcome::Resumed
        );
        assert_eq!(capture_loop.state(), CycleState::Idle);
        assert_eq!(sink.last(), Some((READY_MESSAGE.to_string(), Severity::Info)));
    }

    #[test]
    fn no_submission_happens_during_the_pause() {
        let t0 = Instant::now();
        let mut recognizer = ScriptedRecognizer::with(vec![Ok(alice()), Ok(alice())]);
        recognizer.submissions = 0;
        let mut capture_loop = CaptureLoop::new(
            ScriptedSource::ok(5),
            recognizer,
            RecordingSink::default(),
            PAUSE,
        );

        capture_loop.tick(t0);
        for secs in [2u64, 4, 6, 8] {
            capture_loop.tick(t0 + Duration::from_secs(secs));
        }

        // Only the first tick reached the recognizer.
        assert_eq!(capture_loop.recognizer.submissions, 1);
    }

    #[test]
    fn success_without_subject_shows_no_success_message() {
        let sink = RecordingSink::default();
        let result = RecognitionResult {
            success: true,
            ..Default::default()
        };
        let mut capture_loop = CaptureLoop::new(
            ScriptedSource::ok(1),
            ScriptedRecognizer::with(vec![Ok(result)]),
            sink.clone(),
            PAUSE,
        );

        let outcome = capture_loop.tick(Instant::now());

        assert_eq!(outcome, TickOutcome::NoSubject);
        assert_eq!(capture_loop.state(), CycleState::Idle);
        assert!(
            sink.events
                .borrow()
                .iter()
                .all(|(_, severity)| *severity != Severity::Success)
        );
    }

    #[test]
    fn camera_not_ready_emits_waiting_status_and_goes_idle() {
        let sink = RecordingSink::default();
        let mut capture_loop = CaptureLoop::new(
            ScriptedSource::erroring(CaptureError::NotReady),
            ScriptedRecognizer::with(vec![]),
            sink.clone(),
            PAUSE,
        );

        let outcome = capture_loop.tick(Instant::now());

        assert_eq!(outcome, TickOutcome::CaptureFailed);
        assert_eq!(capture_loop.state(), CycleState::Idle);
        assert_eq!(
            sink.last(),
            Some((CAMERA_NOT_READY_MESSAGE.to_string(), Severity::Info))
        );
    }

    #[test]
    fn stream_fault_emits_scanning_status() {
        let sink = RecordingSink::default();
        let fault = CaptureError::Stream(std::io::Error::other("VIDIOC_DQBUF fault"));
        let mut capture_loop = CaptureLoop::new(
            ScriptedSource::erroring(fault),
            ScriptedRecognizer::with(vec![]),
            sink.clone(),
            PAUSE,
        );

        assert_eq!(capture_loop.tick(Instant::now()), TickOutcome::CaptureFailed);
        assert_eq!(
            sink.last(),
            Some((CAPTURE_RETRY_MESSAGE.to_string(), Severity::Info))
        );
    }

    #[test]
    fn http_error_goes_idle_immediately_not_paused() {
        let sink = RecordingSink::default();
        let mut capture_loop = CaptureLoop::new(
            ScriptedSource::ok(1),
            ScriptedRecognizer::with(vec![Err(RecognizeError::HttpStatus(500))]),
            sink.clone(),
            PAUSE,
        );

        let outcome = capture_loop.tick(Instant::now());

        assert_eq!(outcome, TickOutcome::SubmitFailed);
        assert_eq!(capture_loop.state(), CycleState::Idle);
        assert_eq!(
            sink.last(),
            Some((SCANNING_MESSAGE.to_string(), Severity::Error))
        );
    }

    #[test]
    fn rejection_shows_the_endpoint_message() {
        let sink = RecordingSink::default();
        let result = RecognitionResult {
            success: false,
            message: Some("Face not recognized".to_string()),
            ..Default::default()
        };
        let mut capture_loop = CaptureLoop::new(
            ScriptedSource::ok(1),
            ScriptedRecognizer::with(vec![Ok(result)]),
            sink.clone(),
            PAUSE,
        );

        assert_eq!(capture_loop.tick(Instant::now()), TickOutcome::NoMatch);
        assert!(sink.texts().contains(&"Face not recognized".to_string()));
    }

    #[test]
    fn run_stops_on_shutdown_flag() {
        let shutdown = AtomicBool::new(true);
        let mut scheduler = TickScheduler::new(Duration::from_millis(1));
        let mut capture_loop = CaptureLoop::new(
            ScriptedSource::ok(0),
            ScriptedRecognizer::with(vec![]),
            RecordingSink::default(),
            PAUSE,
        );

        capture_loop.run(&mut scheduler, &shutdown);

        // Only the initial ready status was emitted; no tick ran.
        assert_eq!(capture_loop.state(), CycleState::Idle);
    }
}
