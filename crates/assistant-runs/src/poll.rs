//! Deadline and cancellation controls for polling helpers.
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::ClientError;
use crate::transport::HttpHeaders;

/// Response header carrying the server's suggested poll delay.
pub const POLL_AFTER_HEADER: &str = "openai-poll-after-ms";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Deadline used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Handle used to request cancellation of polling helpers.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Requests cancellation.
    ///
    /// Helpers observing a signal from this handle return
    /// `ClientError::Cancelled` at their next suspension point.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns a signal that observes this handle.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of an `AbortHandle`.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once abort has been requested. Never resolves if the handle is
    /// dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Bounds a polling conversation in time and lets callers cancel it.
#[derive(Clone, Debug)]
pub struct PollOptions {
    /// Overall deadline for the whole helper call.
    pub timeout: Duration,
    /// Delay between retrievals when the server gives no hint.
    pub interval: Duration,
    pub abort: Option<AbortSignal>,
}

impl PollOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
            abort: None,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    pub(crate) fn guard(&self) -> PollGuard<'_> {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        PollGuard {
            deadline,
            options: self,
        }
    }
}

/// Deadline fixed at the start of a helper call.
pub(crate) struct PollGuard<'a> {
    deadline: Instant,
    options: &'a PollOptions,
}

impl PollGuard<'_> {
    pub fn interval(&self) -> Duration {
        self.options.interval
    }

    /// Runs `fut` unless abort or the deadline happens first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        if self.is_aborted() {
            return Err(ClientError::Cancelled);
        }
        let deadline = self.deadline;
        let abort = self.options.abort.as_ref();
        tokio::select! {
            biased;
            _ = wait_abort(abort) => Err(ClientError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Err(ClientError::TimedOut {
                timeout: self.options.timeout,
            }),
            result = fut => result,
        }
    }

    pub async fn sleep(&self, delay: Duration) -> Result<(), ClientError> {
        self.run(async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await
    }

    fn is_aborted(&self) -> bool {
        self.options
            .abort
            .as_ref()
            .is_some_and(AbortSignal::is_aborted)
    }
}

async fn wait_abort(signal: Option<&AbortSignal>) {
    match signal {
        Some(signal) => signal.aborted().await,
        None => std::future::pending().await,
    }
}

/// Reads the poll-after hint, falling back to `default` when absent or
/// malformed.
pub(crate) fn poll_delay(headers: &HttpHeaders, default: Duration) -> Duration {
    let Some(raw) = headers.get(POLL_AFTER_HEADER) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(err) => {
            debug!(
                event = "run.poll_hint_ignored",
                value = raw,
                error = %err,
                "ignoring malformed poll-after header"
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HttpHeaders {
        [(POLL_AFTER_HEADER, value)].into_iter().collect()
    }

    #[test]
    fn poll_delay_prefers_valid_header() {
        let default = Duration::from_secs(5);
        assert_eq!(
            poll_delay(&headers("250"), default),
            Duration::from_millis(250)
        );
        assert_eq!(poll_delay(&headers("0"), default), Duration::ZERO);
        assert_eq!(poll_delay(&HttpHeaders::new(), default), default);
    }

    #[test]
    fn poll_delay_ignores_malformed_values() {
        let default = Duration::from_millis(40);
        for value in ["soon", "-5", "1.5", ""] {
            assert_eq!(poll_delay(&headers(value), default), default, "{value}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn guard_times_out_pending_work() {
        let options = PollOptions::new(Duration::from_secs(2));
        let guard = options.guard();
        let err = guard
            .run(std::future::pending::<Result<(), ClientError>>())
            .await
            .expect_err("deadline");
        assert_eq!(
            err,
            ClientError::TimedOut {
                timeout: Duration::from_secs(2)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abort_wakes_sleeping_guard() {
        let handle = AbortHandle::new();
        let options = PollOptions::new(Duration::from_secs(60)).abort_signal(handle.signal());
        let guard = options.guard();
        let aborter = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            aborter.abort();
        });
        let err = guard
            .sleep(Duration::from_secs(30))
            .await
            .expect_err("aborted");
        assert_eq!(err, ClientError::Cancelled);
        assert!(handle.is_aborted());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_does_not_overflow_deadline() {
        let options = PollOptions::new(Duration::MAX);
        let guard = options.guard();
        guard.sleep(Duration::from_secs(3600)).await.expect("sleep");
        assert_eq!(guard.run(async { Ok(7) }).await, Ok(7));
    }

    #[tokio::test]
    async fn pre_aborted_guard_skips_work() {
        let handle = AbortHandle::new();
        handle.abort();
        let options = PollOptions::new(Duration::from_secs(1)).abort_signal(handle.signal());
        let mut ran = false;
        let result = options
            .guard()
            .run(async {
                ran = true;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(ClientError::Cancelled));
        assert!(!ran);
    }
}
