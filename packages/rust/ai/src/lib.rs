//! Remote text generation for LessonForge.
//!
//! Every section of a lesson is produced by one bounded call to an external
//! generation service. This crate defines the seam ([`TextGenerator`]), an
//! OpenAI-compatible HTTP implementation ([`ChatClient`]) and the call policy
//! (per-call timeout, at most one retry) that every caller goes through.

mod client;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use lessonforge_shared::{LessonError, MAX_CALL_RETRIES, Result};

pub use client::ChatClient;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Sampling options for one remote call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    /// Hard ceiling on generated tokens.
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl GenerationOptions {
    pub fn new(max_output_tokens: u32, temperature: f32) -> Self {
        Self {
            max_output_tokens,
            temperature,
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of output.
    Stop,
    /// Stopped at `max_output_tokens`; structured output is likely truncated.
    Length,
    /// Anything else the service reported (content filter, tool call, ...).
    Other,
}

impl FinishReason {
    pub fn from_api(raw: Option<&str>) -> Self {
        match raw {
            Some("stop") | Some("end_turn") | Some("STOP") | None => Self::Stop,
            Some("length") | Some("max_tokens") | Some("MAX_TOKENS") => Self::Length,
            Some(_) => Self::Other,
        }
    }
}

/// Raw, untrusted output of one remote call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub model: String,
}

// ---------------------------------------------------------------------------
// Generator trait
// ---------------------------------------------------------------------------

/// A remote generation endpoint.
///
/// Implementations return the model's text as-is. Callers must treat it as
/// untrusted input that needs parsing and validation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Label used in logs and usage accounting.
    fn name(&self) -> &str;

    /// Run a single generation request. No retries, no timeout.
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<Completion>;
}

// ---------------------------------------------------------------------------
// Call policy
// ---------------------------------------------------------------------------

/// Timeout and retry budget applied to every remote call.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    /// Timeout for each attempt.
    pub timeout: Duration,
    /// Extra attempts after a transient failure. Clamped to 1.
    pub max_retries: u32,
    /// Pause before the retry.
    pub retry_delay: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: MAX_CALL_RETRIES,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl CallPolicy {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries: max_retries.min(MAX_CALL_RETRIES),
            ..Self::default()
        }
    }
}

/// Call `generator` under `policy`.
///
/// Each attempt is bounded by `policy.timeout`. A transient failure
/// (timeout, transport error, 429/5xx) gets at most one more attempt.
/// A response with only whitespace is reported as [`LessonError::EmptyOutput`].
pub async fn call_with_policy(
    generator: &dyn TextGenerator,
    prompt: &str,
    options: &GenerationOptions,
    policy: &CallPolicy,
) -> Result<Completion> {
    let attempts = 1 + policy.max_retries.min(MAX_CALL_RETRIES);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.timeout, generator.generate(prompt, options))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(LessonError::UpstreamTimeout {
                after_ms: policy.timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(completion) if completion.text.trim().is_empty() => {
                return Err(LessonError::EmptyOutput);
            }
            Ok(completion) => {
                debug!(
                    endpoint = generator.name(),
                    attempt,
                    tokens_out = completion.tokens_out,
                    finish = ?completion.finish_reason,
                    "generation call succeeded"
                );
                return Ok(completion);
            }
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(endpoint = generator.name(), attempt, error = %e, "transient failure, retrying once");
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given errors in order, then answers "ok".
    struct Flaky {
        failures: std::sync::Mutex<Vec<LessonError>>,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(mut failures: Vec<LessonError>) -> Self {
            failures.reverse();
            Self {
                failures: std::sync::Mutex::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.failures.lock().unwrap().pop() {
                return Err(err);
            }
            Ok(Completion {
                text: "ok".into(),
                finish_reason: FinishReason::Stop,
                tokens_in: 1,
                tokens_out: 1,
                model: "test".into(),
            })
        }
    }

    struct Silent;

    #[async_trait]
    impl TextGenerator for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<Completion> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("timeout should fire first")
        }
    }

    fn fast_policy() -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(50),
            max_retries: 1,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn opts() -> GenerationOptions {
        GenerationOptions::new(100, 0.5)
    }

    #[tokio::test]
    async fn retries_transient_failure_once() {
        let generator = Flaky::new(vec![LessonError::UpstreamStatus {
            status: 503,
            body: "busy".into(),
        }]);
        let completion = call_with_policy(&generator, "p", &opts(), &fast_policy())
            .await
            .expect("second attempt succeeds");
        assert_eq!(completion.text, "ok");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_one_retry() {
        let generator = Flaky::new(vec![
            LessonError::Upstream("reset".into()),
            LessonError::Upstream("reset".into()),
            LessonError::Upstream("reset".into()),
        ]);
        let result = call_with_policy(&generator, "p", &opts(), &fast_policy()).await;
        assert!(result.is_err());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let generator = Flaky::new(vec![LessonError::UpstreamStatus {
            status: 400,
            body: "bad request".into(),
        }]);
        let result = call_with_policy(&generator, "p", &opts(), &fast_policy()).await;
        assert!(matches!(result, Err(LessonError::UpstreamStatus { status: 400, .. })));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn times_out_hung_calls() {
        let policy = CallPolicy {
            max_retries: 0,
            ..fast_policy()
        };
        let result = call_with_policy(&Silent, "p", &opts(), &policy).await;
        assert!(matches!(result, Err(LessonError::UpstreamTimeout { .. })));
    }

    #[test]
    fn policy_clamps_retries() {
        let policy = CallPolicy::new(Duration::from_secs(1), 5);
        assert_eq!(policy.max_retries, 1);
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(FinishReason::from_api(Some("length")), FinishReason::Length);
        assert_eq!(FinishReason::from_api(Some("MAX_TOKENS")), FinishReason::Length);
        assert_eq!(FinishReason::from_api(Some("stop")), FinishReason::Stop);
        assert_eq!(FinishReason::from_api(Some("content_filter")), FinishReason::Other);
    }
}
