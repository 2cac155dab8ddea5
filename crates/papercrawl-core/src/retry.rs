//! Capped exponential backoff and cancellable sleeps

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Exponential backoff capped at `cap`: `min(base * 2^attempt, cap)`.
///
/// Saturates instead of overflowing, so the sequence is non-decreasing for
/// every `attempt`.
pub fn backoff_duration(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `true` if the full duration elapsed, `false` if interrupted.
/// A zero duration is no sleep at all: it returns `true` without looking
/// at `cancel`, so work that already finished is never turned into a stop.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(1000);
    const CAP: Duration = Duration::from_millis(30_000);

    #[test]
    fn backoff_exponential() {
        assert_eq!(backoff_duration(BASE, CAP, 0), Duration::from_millis(1000));
        assert_eq!(backoff_duration(BASE, CAP, 1), Duration::from_millis(2000));
        assert_eq!(backoff_duration(BASE, CAP, 2), Duration::from_millis(4000));
        assert_eq!(backoff_duration(BASE, CAP, 3), Duration::from_millis(8000));
        assert_eq!(backoff_duration(BASE, CAP, 4), Duration::from_millis(16_000));
    }

    #[test]
    fn backoff_capped() {
        assert_eq!(backoff_duration(BASE, CAP, 5), CAP);
        assert_eq!(backoff_duration(BASE, CAP, 31), CAP);
        assert_eq!(backoff_duration(BASE, CAP, 64), CAP);
        assert_eq!(backoff_duration(BASE, CAP, u32::MAX), CAP);
    }

    #[test]
    fn backoff_non_decreasing() {
        let mut prev = Duration::ZERO;
        for attempt in 0..200 {
            let d = backoff_duration(BASE, CAP, attempt);
            assert!(d >= prev, "backoff({attempt}) = {d:?} < {prev:?}");
            prev = d;
        }
    }

    #[test]
    fn backoff_zero_base() {
        assert_eq!(backoff_duration(Duration::ZERO, CAP, 10), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes() {
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();
        assert!(sleep_or_cancel(Duration::from_secs(5), &cancel).await);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_interrupted() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let start = tokio::time::Instant::now();
        assert!(!sleep_or_cancel(Duration::from_secs(60), &cancel).await);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn zero_sleep_ignores_token() {
        let cancel = CancellationToken::new();
        assert!(sleep_or_cancel(Duration::ZERO, &cancel).await);
        cancel.cancel();
        assert!(sleep_or_cancel(Duration::ZERO, &cancel).await);
        // A real sleep still observes the stop
        assert!(!sleep_or_cancel(Duration::from_millis(1), &cancel).await);
    }
}
