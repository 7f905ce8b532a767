use crate::recognize::RecognitionResult;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Capturing,
    AwaitingResult,
    Paused,
}

/// Decision taken at the top of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickGate {
    /// Start a capture/submit cycle.
    Capture,
    /// Cool-down elapsed; back to `Idle`, capture resumes next tick.
    Resumed,
    /// Nothing to do: still cooling down, or a cycle is already in flight.
    Skip,
}

/// How a recognition response was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultOutcome {
    /// A subject was identified; the cycle enters its cool-down.
    Recognized { name: String, id: Option<String> },
    /// The endpoint succeeded but named nobody. Treated as silence.
    NoSubject,
    /// The endpoint reported no match.
    Rejected { message: Option<String> },
}

/// The capture cycle state machine. Purely clock-driven: every method takes
/// effect immediately, `begin_tick` alone consults the passed-in `now`.
pub struct CycleContext {
    state: CycleState,
    paused_until: Option<Instant>,
    pause_duration: Duration,
}

impl CycleContext {
    pub fn new(pause_duration: Duration) -> Self {
        Self {
            state: CycleState::Idle,
            paused_until: None,
            pause_duration,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Gate a timer tick. The state check here is the loop's sole
    /// concurrency guard: at most one capture/submit cycle is in flight.
    pub fn begin_tick(&mut self, now: Instant) -> TickGate {
        match self.state {
            CycleState::Idle => {
                self.state = CycleState::Capturing;
                TickGate::Capture
            }
            CycleState::Paused => match self.paused_until {
                Some(until) if now < until => TickGate::Skip,
                _ => {
                    self.state = CycleState::Idle;
                    self.paused_until = None;
                    TickGate::Resumed
                }
            },
            CycleState::Capturing | CycleState::AwaitingResult => TickGate::Skip,
        }
    }

    /// Frame capture failed; the next tick is the retry.
    pub fn capture_failed(&mut self) {
        self.state = CycleState::Idle;
    }

    /// A frame is in hand and about to be submitted.
    pub fn frame_captured(&mut self) {
        self.state = CycleState::AwaitingResult;
    }

    /// Submission failed (transport, HTTP status, or malformed body).
    pub fn submit_failed(&mut self) {
        self.state = CycleState::Idle;
    }

    /// Classify the endpoint's response and transition accordingly.
    pub fn apply_result(&mut self, result: &RecognitionResult, now: Instant) -> ResultOutcome {
        if !result.success {
            self.state = CycleState::Idle;
            return ResultOutcome::Rejected {
                message: result.message.clone(),
            };
        }

        match result.subject() {
            Some(name) => {
                self.state = CycleState::Paused;
                self.paused_until = Some(now + self.pause_duration);
                ResultOutcome::Recognized {
                    name: name.to_string(),
                    id: result.subject_id.clone(),
                }
            }
            None => {
                self.state = CycleState::Idle;
                ResultOutcome::NoSubject
            }
        }
    }
}
