use crate::camera::Frame;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("recognition endpoint returned HTTP {0}")]
    HttpStatus(u16),

    #[error("malformed recognition response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

impl RecognizeError {
    /// Only transport errors are worth retrying within a tick. An HTTP error
    /// status or a bad body will not improve on an immediate resend; the
    /// next scheduled tick covers those.
    fn is_retryable(&self) -> bool {
        matches!(self, RecognizeError::Transport(_))
    }
}

#[derive(Debug, Serialize)]
struct RecognizeRequest {
    image: String,
}

/// Outcome reported by the recognition endpoint.
///
/// Accepts the `student_*` field names of the original attendance backend
/// as aliases.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognitionResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "student_name")]
    pub subject_name: Option<String>,
    #[serde(default, alias = "student_id")]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RecognitionResult {
    /// The identified subject's name, if the response carries a non-empty one.
    pub fn subject(&self) -> Option<&str> {
        self.subject_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Submits a captured frame for recognition.
pub trait Recognizer {
    fn recognize(&mut self, frame: &Frame) -> Result<RecognitionResult, RecognizeError>;
}

/// HTTP client for the recognition endpoint. Every request carries an
/// explicit timeout so a hung endpoint cannot stall the capture cycle
/// indefinitely.
pub struct RecognizeClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    max_attempts: u32,
    retry_base_delay: Duration,
}

/// Backoff cap between submit attempts within a single tick.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

impl RecognizeClient {
    pub fn new(
        endpoint: String,
        timeout: Duration,
        max_attempts: u32,
        retry_base_delay: Duration,
    ) -> Result<Self, RecognizeError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            max_attempts: max_attempts.max(1),
            retry_base_delay,
        })
    }

    fn submit(&self, request: &RecognizeRequest) -> Result<RecognitionResult, RecognizeError> {
        let response = self.http.post(&self.endpoint).json(request).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecognizeError::HttpStatus(status.as_u16()));
        }

        let body = response.text()?;
        parse_response(&body)
    }
}

impl Recognizer for RecognizeClient {
    fn recognize(&mut self, frame: &Frame) -> Result<RecognitionResult, RecognizeError> {
        let request = RecognizeRequest {
            image: to_data_url(frame),
        };

        submit_with_retry(
            || self.submit(&request),
            self.max_attempts,
            self.retry_base_delay,
        )
    }
}

/// Bounded submit retry within a single tick. Transport errors back off and
/// try again up to `max_attempts`; an HTTP error status or a malformed body
/// returns immediately, since a resend will not improve either.
fn submit_with_retry<F>(
    mut submit: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<RecognitionResult, RecognizeError>
where
    F: FnMut() -> Result<RecognitionResult, RecognizeError>,
{
    let max_attempts = max_attempts.max(1);

    let mut attempt = 1;
    loop {
        match submit() {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff_with_jitter(base_delay, attempt);
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis(),
                    "Recognition submit failed, retrying"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn parse_response(body: &str) -> Result<RecognitionResult, RecognizeError> {
    Ok(serde_json::from_str(body)?)
}

/// Encode a frame the way the recognition endpoint expects it: a base64
/// data URL embedded in a JSON body.
fn to_data_url(frame: &Frame) -> String {
    format!("data:{};base64,{}", frame.mime, BASE64.encode(&frame.data))
}

/// Exponential backoff with jitter, capped at `MAX_RETRY_DELAY`.
fn backoff_with_jitter(base: Duration, attempt: u32) -> Duration {
    let exp = base
        .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .min(MAX_RETRY_DELAY);

    let jitter_ms = (exp.as_millis() as u64 / 10).max(1);
    exp + Duration::from_millis(fastrand::u64(0..jitter_ms))
}
