//! Client-side payment status polling.
//!
//! Storefront clients that cannot receive the webhook themselves poll the
//! `by-order` endpoint until the latest payment attempt settles. The poller
//! runs as a spawned task with a cancellation handle so navigation away stops
//! the polling immediately.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep_until};
use uuid::Uuid;

use crate::lifecycle::PaymentStatus;

const INITIAL_INTERVAL: Duration = Duration::from_secs(2);
const INTERVAL_GROWTH: Duration = Duration::from_millis(500);
const MAX_INTERVAL: Duration = Duration::from_secs(10);
const POLL_BUDGET: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

/// The slice of a payment attempt the poller needs.
#[derive(Debug, Clone)]
pub struct AttemptView {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait AttemptSource: Send + Sync {
    async fn attempts(&self, order_id: Uuid) -> anyhow::Result<Vec<AttemptView>>;
}

/// Fetches attempts over HTTP from the order service itself.
pub struct HttpAttemptSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAttemptSource {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct AttemptRow {
    id: Uuid,
    status: String,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(serde::Deserialize)]
struct AttemptsEnvelope {
    data: Option<Vec<AttemptRow>>,
}

#[async_trait]
impl AttemptSource for HttpAttemptSource {
    async fn attempts(&self, order_id: Uuid) -> anyhow::Result<Vec<AttemptView>> {
        let envelope: AttemptsEnvelope = self
            .http
            .get(format!("{}/payments/by-order/{order_id}", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let rows = envelope.data.unwrap_or_default();
        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            let status = row
                .status
                .parse::<PaymentStatus>()
                .map_err(anyhow::Error::msg)?;
            views.push(AttemptView {
                id: row.id,
                status,
                resolved_at: row.completed_at,
            });
        }
        Ok(views)
    }
}

/// Polls until the most recently resolved attempt is terminal, the budget is
/// spent, or the task is cancelled from outside. The first poll fires after
/// the initial interval; a tick that would overshoot the deadline is pulled
/// back to it, so the last poll lands exactly when the budget elapses.
/// Transient read errors are tolerated; the next tick retries.
pub async fn poll_until_settled(source: &dyn AttemptSource, order_id: Uuid) -> PollOutcome {
    let deadline = Instant::now() + POLL_BUDGET;
    let mut interval = INITIAL_INTERVAL;

    loop {
        let next_tick = Instant::now() + interval;
        let last_tick = next_tick >= deadline;
        sleep_until(next_tick.min(deadline)).await;

        match source.attempts(order_id).await {
            Ok(attempts) => {
                if let Some(latest) = latest_resolved(&attempts) {
                    return if latest.status == PaymentStatus::Completed {
                        PollOutcome::Completed
                    } else {
                        PollOutcome::Failed
                    };
                }
            }
            Err(e) => {
                tracing::warn!("payment status read failed for order {order_id}: {e:#}");
            }
        }

        if last_tick {
            return PollOutcome::TimedOut;
        }
        interval = (interval + INTERVAL_GROWTH).min(MAX_INTERVAL);
    }
}

/// The terminal attempt with the latest resolution time, if any. Pending
/// attempts never count, even when they are newer.
fn latest_resolved(attempts: &[AttemptView]) -> Option<&AttemptView> {
    attempts
        .iter()
        .filter(|a| a.status.is_terminal())
        .max_by_key(|a| a.resolved_at)
}

/// A running poll with a cancellation handle.
pub struct StatusPoller {
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<PollOutcome>>,
}

impl StatusPoller {
    pub fn spawn<S>(source: S, order_id: Uuid) -> Self
    where
        S: AttemptSource + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            tokio::select! {
                outcome = poll_until_settled(&source, order_id) => outcome,
                _ = cancel_rx => PollOutcome::Cancelled,
            }
        });

        Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    /// Requests cancellation. The task resolves to `Cancelled` unless it had
    /// already settled.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Waits for the poll to finish and returns its outcome.
    pub async fn outcome(mut self) -> PollOutcome {
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(PollOutcome::Cancelled),
            None => PollOutcome::Cancelled,
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct ScriptedSource {
        // One entry per poll tick; the last entry repeats.
        script: Mutex<Vec<anyhow::Result<Vec<AttemptView>>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<anyhow::Result<Vec<AttemptView>>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl AttemptSource for ScriptedSource {
        async fn attempts(&self, _order_id: Uuid) -> anyhow::Result<Vec<AttemptView>> {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                match script.first() {
                    Some(Ok(v)) => Ok(v.clone()),
                    Some(Err(e)) => Err(anyhow::anyhow!("{e}")),
                    None => Ok(vec![]),
                }
            }
        }
    }

    fn attempt(status: PaymentStatus, resolved_secs: Option<i64>) -> AttemptView {
        AttemptView {
            id: Uuid::new_v4(),
            status,
            resolved_at: resolved_secs.map(|s| DateTime::from_timestamp(s, 0).unwrap()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn settles_on_completed_attempt() {
        let source = ScriptedSource::new(vec![
            Ok(vec![attempt(PaymentStatus::Pending, None)]),
            Ok(vec![attempt(PaymentStatus::Completed, Some(100))]),
        ]);
        let outcome = poll_until_settled(&source, Uuid::new_v4()).await;
        assert_eq!(outcome, PollOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn newest_terminal_attempt_wins() {
        let source = ScriptedSource::new(vec![Ok(vec![
            attempt(PaymentStatus::Failed, Some(100)),
            attempt(PaymentStatus::Completed, Some(200)),
            attempt(PaymentStatus::Pending, None),
        ])]);
        let outcome = poll_until_settled(&source, Uuid::new_v4()).await;
        assert_eq!(outcome, PollOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_exactly_at_the_budget() {
        let source = ScriptedSource::new(vec![Ok(vec![attempt(PaymentStatus::Pending, None)])]);
        let started = Instant::now();
        let outcome = poll_until_settled(&source, Uuid::new_v4()).await;
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(started.elapsed(), POLL_BUDGET);
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_waits_the_initial_interval() {
        let source =
            ScriptedSource::new(vec![Ok(vec![attempt(PaymentStatus::Completed, Some(100))])]);
        let started = Instant::now();
        let outcome = poll_until_settled(&source, Uuid::new_v4()).await;
        assert_eq!(outcome, PollOutcome::Completed);
        assert_eq!(started.elapsed(), INITIAL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn settlement_at_the_deadline_is_still_observed() {
        // Pending on every tick before the deadline; terminal on the last one.
        let ticks_before_deadline = {
            let mut elapsed = Duration::ZERO;
            let mut interval = INITIAL_INTERVAL;
            let mut count = 0usize;
            while elapsed + interval < POLL_BUDGET {
                elapsed += interval;
                interval = (interval + INTERVAL_GROWTH).min(MAX_INTERVAL);
                count += 1;
            }
            count
        };
        let mut script: Vec<anyhow::Result<Vec<AttemptView>>> = (0..ticks_before_deadline)
            .map(|_| Ok(vec![attempt(PaymentStatus::Pending, None)]))
            .collect();
        script.push(Ok(vec![attempt(PaymentStatus::Failed, Some(100))]));

        let source = ScriptedSource::new(script);
        let started = Instant::now();
        let outcome = poll_until_settled(&source, Uuid::new_v4()).await;
        assert_eq!(outcome, PollOutcome::Failed);
        assert_eq!(started.elapsed(), POLL_BUDGET);
    }

    #[tokio::test(start_paused = true)]
    async fn tolerates_read_errors_until_settled() {
        let source = ScriptedSource::new(vec![
            Err(anyhow::anyhow!("connection refused")),
            Err(anyhow::anyhow!("connection refused")),
            Ok(vec![attempt(PaymentStatus::Failed, Some(100))]),
        ]);
        let outcome = poll_until_settled(&source, Uuid::new_v4()).await;
        assert_eq!(outcome, PollOutcome::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_a_running_poll() {
        let source = ScriptedSource::new(vec![Ok(vec![attempt(PaymentStatus::Pending, None)])]);
        let mut poller = StatusPoller::spawn(source, Uuid::new_v4());
        tokio::time::sleep(Duration::from_secs(5)).await;
        poller.stop();
        assert_eq!(poller.outcome().await, PollOutcome::Cancelled);
    }

    #[test]
    fn latest_resolved_ignores_pending() {
        let attempts = vec![
            attempt(PaymentStatus::Pending, None),
            attempt(PaymentStatus::Pending, None),
        ];
        assert!(latest_resolved(&attempts).is_none());
    }
}
