// Fixed-delay reconnect timer shared by the event stream and the command
// channel.
//
// Both channels retry forever on a constant delay. The wait can be cut
// short by a manual reconnect request or abandoned on shutdown.

use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Delay between a channel closing and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Why a reconnect wait finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectTrigger {
    /// The fixed delay elapsed.
    Scheduled,
    /// A manual reconnect was requested; the pending attempt is discarded.
    Manual,
    /// The owning task is shutting down.
    Shutdown,
}

/// Wait out one reconnect delay.
///
/// Shutdown wins over a manual request, which wins over the timer. Each
/// call schedules exactly one attempt.
pub async fn wait_for_reconnect(
    delay: Duration,
    manual: &Notify,
    cancel: &CancellationToken,
) -> ReconnectTrigger {
    tokio::select! {
        biased;
        () = cancel.cancelled() => ReconnectTrigger::Shutdown,
        () = manual.notified() => ReconnectTrigger::Manual,
        () = tokio::time::sleep(delay) => ReconnectTrigger::Scheduled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn scheduled_attempt_fires_after_the_full_delay() {
        let manual = Notify::new();
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let trigger = wait_for_reconnect(DEFAULT_RECONNECT_DELAY, &manual, &cancel).await;

        assert_eq!(trigger, ReconnectTrigger::Scheduled);
        let waited = started.elapsed();
        assert!(waited >= DEFAULT_RECONNECT_DELAY);
        assert!(waited < DEFAULT_RECONNECT_DELAY + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_request_cancels_the_pending_attempt() {
        let manual = Notify::new();
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();

        // A stored permit is consumed by the next wait.
        manual.notify_one();
        let trigger = wait_for_reconnect(DEFAULT_RECONNECT_DELAY, &manual, &cancel).await;

        assert_eq!(trigger, ReconnectTrigger::Manual);
        assert!(started.elapsed() < DEFAULT_RECONNECT_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_beats_manual() {
        let manual = Notify::new();
        let cancel = CancellationToken::new();
        manual.notify_one();
        cancel.cancel();

        let trigger = wait_for_reconnect(DEFAULT_RECONNECT_DELAY, &manual, &cancel).await;
        assert_eq!(trigger, ReconnectTrigger::Shutdown);
    }
}
