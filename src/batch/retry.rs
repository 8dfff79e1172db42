//! Bounded retry with a fixed backoff, and the pause seam it sleeps through.

use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

/// Where the orchestrator suspends between units, batches and attempts.
pub trait Pause {
    fn pause(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingPause {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pauses requested so far, in order.
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.pauses.lock().iter().sum()
    }
}

impl Pause for RecordingPause {
    fn pause(&self, duration: Duration) {
        self.pauses.lock().push(duration);
    }
}

impl<P: Pause + ?Sized> Pause for &P {
    fn pause(&self, duration: Duration) {
        (**self).pause(duration)
    }
}

/// Result of the last attempt and how many attempts were made.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Call `attempt` until it succeeds, `should_retry` rejects the error, or
/// `max_attempts` calls have been made.
///
/// At least one attempt is always made. `backoff` is paused after each failed
/// attempt that will be retried, never after the last one. `attempt` receives
/// the 1-based attempt number.
pub fn retry<T, E, F, S>(
    max_attempts: u32,
    backoff: Duration,
    pause: &dyn Pause,
    should_retry: S,
    mut attempt: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    S: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match attempt(attempts) {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                }
            }
            Err(err) if attempts < max_attempts && should_retry(&err) => {
                tracing::warn!(
                    attempt = attempts,
                    max_attempts,
                    error = %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "Attempt failed, retrying"
                );
                pause.pause(backoff);
            }
            Err(err) => {
                return RetryOutcome {
                    result: Err(err),
                    attempts,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always(_: &String) -> bool {
        true
    }

    #[test]
    fn always_failing_attempt_uses_every_attempt() {
        let pause = RecordingPause::new();
        let outcome: RetryOutcome<(), String> =
            retry(3, Duration::from_secs(1), &pause, always, |n| Err(format!("boom {n}")));

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap_err(), "boom 3");
        assert_eq!(pause.pauses(), vec![Duration::from_secs(1); 2]);
    }

    #[test]
    fn fail_once_then_succeed_takes_two_attempts() {
        let pause = RecordingPause::new();
        let outcome = retry(3, Duration::from_millis(10), &pause, always, |n| {
            if n == 1 {
                Err("transient".to_string())
            } else {
                Ok(n)
            }
        });

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result.expect("second attempt succeeds"), 2);
        assert_eq!(pause.pauses().len(), 1);
    }

    #[test]
    fn zero_max_attempts_still_tries_once() {
        let pause = RecordingPause::new();
        let outcome: RetryOutcome<(), String> =
            retry(0, Duration::from_secs(1), &pause, always, |_| Err("no".to_string()));
        assert_eq!(outcome.attempts, 1);
        assert!(pause.pauses().is_empty());
    }

    #[test]
    fn rejected_errors_are_not_retried() {
        let pause = RecordingPause::new();
        let outcome: RetryOutcome<(), String> = retry(
            5,
            Duration::from_secs(1),
            &pause,
            |err: &String| err != "fatal",
            |_| Err("fatal".to_string()),
        );
        assert_eq!(outcome.attempts, 1);
        assert!(pause.pauses().is_empty());
    }

    #[test]
    fn first_success_makes_no_pause() {
        let pause = RecordingPause::new();
        let outcome: RetryOutcome<u8, String> = retry(3, Duration::from_secs(1), &pause, always, |_| Ok(7));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(pause.total(), Duration::ZERO);
    }
}
