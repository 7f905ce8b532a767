use std::time::Duration;

/// Retry a fallible operation with exponential backoff.
///
/// `should_retry` decides whether an error is worth another attempt;
/// terminal errors are returned immediately without sleeping. The delay
/// doubles after each failed attempt, capped at `max_delay`. A
/// `max_attempts` of 0 is treated as 1.
pub fn retry_with_backoff<F, P, T, E>(
    mut op: F,
    mut should_retry: P,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    operation_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: FnMut(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut delay = base_delay.min(max_delay);

    for attempt in 1..=max_attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && should_retry(&e) => {
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name,
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                std::thread::sleep(delay);
                delay = (delay * 2).min(max_delay);
            }
            Err(e) => {
                if attempt < max_attempts {
                    tracing::error!("{} failed with a terminal error: {}", operation_name, e);
                } else {
                    tracing::error!(
                        "{} failed after {} attempts: {}",
                        operation_name,
                        max_attempts,
                        e
                    );
                }
                return Err(e);
            }
        }
    }

    unreachable!("the final attempt returns above")
}
