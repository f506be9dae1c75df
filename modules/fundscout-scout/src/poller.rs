//! Poll loop for asynchronous extraction jobs.
//!
//! Modeled as an explicit state machine — Submitted → Polling → Completed |
//! Failed | TimedOut — driven by an injected clock so the loop is testable
//! without real sleeps. This is the single blocking point in the pipeline;
//! it blocks its own task only, and the attempt ceiling guarantees it
//! terminates.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use fundscout_common::FundScoutError;

use crate::traits::{ExtractClient, ExtractPoll};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Timer abstraction so tests can drive the poll loop without waiting.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    /// 5s × 60 attempts ⇒ five-minute ceiling.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

/// Observable poll states, mostly for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling { attempt: u32 },
    Completed,
    Failed,
    TimedOut,
}

pub struct ExtractionPoller<'a> {
    client: &'a dyn ExtractClient,
    clock: &'a dyn Clock,
    config: PollConfig,
}

impl<'a> ExtractionPoller<'a> {
    pub fn new(client: &'a dyn ExtractClient, clock: &'a dyn Clock, config: PollConfig) -> Self {
        Self {
            client,
            clock,
            config,
        }
    }

    /// Drive the job to a terminal state. Returns the payload on completion;
    /// upstream failure and the attempt ceiling both surface as errors.
    pub async fn wait(&self, job_id: &str) -> Result<serde_json::Value, FundScoutError> {
        let mut state = PollState::Submitted;
        debug!(job_id, state = ?state, "Awaiting extraction job");

        for attempt in 1..=self.config.max_attempts {
            state = PollState::Polling { attempt };

            match self.client.status(job_id).await {
                Ok(ExtractPoll::Completed(payload)) => {
                    debug!(job_id, attempt, "Extraction job completed");
                    return Ok(payload);
                }
                Ok(ExtractPoll::Failed(detail)) => {
                    warn!(job_id, attempt, detail = detail.as_str(), "Extraction job failed");
                    return Err(FundScoutError::UpstreamUnavailable(format!(
                        "extraction job {job_id} failed: {detail}"
                    )));
                }
                Ok(ExtractPoll::Pending) | Ok(ExtractPoll::Processing) => {
                    debug!(job_id, attempt, state = ?state, "Extraction job still running");
                }
                Err(e) => {
                    return Err(FundScoutError::UpstreamUnavailable(format!(
                        "extraction status check failed for {job_id}: {e}"
                    )));
                }
            }

            self.clock.sleep(self.config.interval).await;
        }

        state = PollState::TimedOut;
        warn!(job_id, attempts = self.config.max_attempts, state = ?state, "Extraction poll ceiling exceeded");
        Err(FundScoutError::Timeout {
            attempts: self.config.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, MockExtract};

    fn payload() -> serde_json::Value {
        serde_json::json!([{"title": "Award"}])
    }

    #[tokio::test]
    async fn returns_payload_on_completion() {
        let extract = MockExtract::new().script(vec![
            ExtractPoll::Processing,
            ExtractPoll::Processing,
            ExtractPoll::Completed(payload()),
        ]);
        let clock = ManualClock::new();
        let job = extract
            .submit(&["https://a.example.org".to_string()], "p", serde_json::json!({}))
            .await
            .unwrap();

        let poller = ExtractionPoller::new(&extract, &clock, PollConfig::default());
        let result = poller.wait(&job).await.unwrap();

        assert_eq!(result, payload());
        // Two in-flight polls means two sleeps before the final check.
        assert_eq!(clock.sleep_count(), 2);
    }

    #[tokio::test]
    async fn pending_states_keep_polling() {
        let extract = MockExtract::new().script(vec![
            ExtractPoll::Pending,
            ExtractPoll::Pending,
            ExtractPoll::Processing,
            ExtractPoll::Completed(payload()),
        ]);
        let clock = ManualClock::new();
        let job = extract
            .submit(&["https://a.example.org".to_string()], "p", serde_json::json!({}))
            .await
            .unwrap();

        let poller = ExtractionPoller::new(&extract, &clock, PollConfig::default());
        assert!(poller.wait(&job).await.is_ok());
        assert_eq!(clock.sleep_count(), 3);
    }

    #[tokio::test]
    async fn failure_surfaces_upstream_detail() {
        let extract = MockExtract::new().script(vec![
            ExtractPoll::Processing,
            ExtractPoll::Failed("llm refused".to_string()),
        ]);
        let clock = ManualClock::new();
        let job = extract
            .submit(&["https://a.example.org".to_string()], "p", serde_json::json!({}))
            .await
            .unwrap();

        let poller = ExtractionPoller::new(&extract, &clock, PollConfig::default());
        let err = poller.wait(&job).await.unwrap_err();

        match err {
            FundScoutError::UpstreamUnavailable(msg) => assert!(msg.contains("llm refused")),
            other => panic!("expected UpstreamUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ceiling_exceeded_times_out() {
        // Never completes.
        let extract = MockExtract::new().script(vec![ExtractPoll::Processing]);
        let clock = ManualClock::new();
        let job = extract
            .submit(&["https://a.example.org".to_string()], "p", serde_json::json!({}))
            .await
            .unwrap();

        let config = PollConfig {
            interval: Duration::from_secs(5),
            max_attempts: 7,
        };
        let poller = ExtractionPoller::new(&extract, &clock, config);
        let err = poller.wait(&job).await.unwrap_err();

        assert!(matches!(err, FundScoutError::Timeout { attempts: 7 }));
        assert_eq!(clock.sleep_count(), 7);
    }
}
