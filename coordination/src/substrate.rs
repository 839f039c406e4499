//! Agent call substrate: bounded, retrying, timing-out completion calls
//!
//! Agents never talk to a model client directly. They call
//! [`AgentCallSubstrate::call`] with a role, two prompts and a result type;
//! the substrate
//!
//! 1. waits for a process-wide slot (semaphore),
//! 2. resolves the role's model from the [`ModelRegistry`],
//! 3. sends the request with the result type's JSON schema,
//! 4. retries rate-limit and transient failures with exponential backoff,
//!    all under one per-call timeout,
//! 5. decodes the structured output and stamps an [`AgentRunMetrics`].
//!
//! ```text
//! agent ──call()──▶ [semaphore] ──▶ CompletionService ──▶ decode ──▶ (T, metrics)
//!                       ▲                 │
//!                       └── backoff ◀─────┘ RateLimited / Transient
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::metrics::{AgentRunMetrics, ChunkPosition};
use crate::registry::{CallRole, ModelRegistry};

/// Failure taxonomy of the completion boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompletionError {
    #[error("Completion timed out after {elapsed_ms}ms")]
    TimedOut { elapsed_ms: u64 },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Transient completion failure: {0}")]
    Transient(String),

    #[error("Fatal completion failure: {0}")]
    Fatal(String),

    #[error("Malformed {role} output: {reason}")]
    MalformedOutput { role: CallRole, reason: String },
}

impl CompletionError {
    /// Only rate limits and transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompletionError::RateLimited(_) | CompletionError::Transient(_)
        )
    }
}

/// Result type for completion calls
pub type CompletionResult<T> = Result<T, CompletionError>;

/// A single structured completion request.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub role: CallRole,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    /// JSON schema the output must satisfy.
    pub schema: serde_json::Value,
    pub max_tokens: u32,
    pub chunk: Option<ChunkPosition>,
}

/// Raw structured output plus token accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub output: serde_json::Value,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The network boundary. Implementations perform one attempt per call;
/// retry and timeout policy live in the substrate.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<CompletionResponse>;
}

/// Substrate limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstrateSettings {
    /// Maximum completion calls in flight across the process.
    pub max_in_flight: usize,
    /// Wall-clock budget for one call including its retries.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub max_tokens: u32,
}

impl Default for SubstrateSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            timeout_ms: 120_000,
            max_retries: 2,
            backoff_base_ms: 1_000,
            backoff_max_ms: 10_000,
            max_tokens: 4_096,
        }
    }
}

impl SubstrateSettings {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.backoff_base_ms
                .saturating_mul(factor)
                .min(self.backoff_max_ms),
        )
    }
}

/// Shared, cloneable entry point for every agent call.
#[derive(Clone)]
pub struct AgentCallSubstrate {
    service: Arc<dyn CompletionService>,
    registry: Arc<ModelRegistry>,
    permits: Arc<Semaphore>,
    settings: SubstrateSettings,
}

impl AgentCallSubstrate {
    pub fn new(
        service: Arc<dyn CompletionService>,
        registry: ModelRegistry,
        settings: SubstrateSettings,
    ) -> Self {
        Self {
            service,
            registry: Arc::new(registry),
            permits: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
            settings,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SubstrateSettings {
        &self.settings
    }

    /// Free call slots right now.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run one structured completion and decode it into `T`.
    pub async fn call<T>(
        &self,
        role: CallRole,
        system_prompt: &str,
        user_prompt: &str,
        chunk: Option<ChunkPosition>,
    ) -> CompletionResult<(T, AgentRunMetrics)>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CompletionError::Fatal("call substrate closed".to_string()))?;

        let model = self.registry.model_for(role).to_string();
        let schema = serde_json::to_value(schemars::schema_for!(T)).map_err(|e| {
            CompletionError::MalformedOutput {
                role,
                reason: format!("schema generation failed: {e}"),
            }
        })?;
        let request = CompletionRequest {
            role,
            model: model.clone(),
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            schema,
            max_tokens: self.settings.max_tokens,
            chunk,
        };

        let started = Instant::now();
        let budget = Duration::from_millis(self.settings.timeout_ms);
        let response = tokio::time::timeout(budget, self.send_with_retry(request))
            .await
            .map_err(|_| CompletionError::TimedOut {
                elapsed_ms: started.elapsed().as_millis() as u64,
            })??;
        let latency_ms = started.elapsed().as_millis() as u64;

        let value: T = serde_json::from_value(response.output).map_err(|e| {
            CompletionError::MalformedOutput {
                role,
                reason: e.to_string(),
            }
        })?;

        let cost_usd =
            self.registry
                .cost_usd(&model, response.input_tokens, response.output_tokens);
        info!(
            role = %role,
            model = %model,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            latency_ms,
            cost_usd,
            "Completion call finished"
        );

        let metrics = AgentRunMetrics {
            agent_id: role.agent(),
            role,
            model,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            latency_ms,
            cost_usd,
            chunk_index: chunk.map(|c| c.index),
            chunk_total: chunk.map(|c| c.total),
            timestamp: Utc::now(),
        };
        Ok((value, metrics))
    }

    async fn send_with_retry(
        &self,
        request: CompletionRequest,
    ) -> CompletionResult<CompletionResponse> {
        let max_attempts = self.settings.max_retries + 1;
        let mut attempt = 1;
        loop {
            match self.service.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.settings.backoff(attempt);
                    warn!(
                        role = %request.role,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying completion call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(role = %request.role, attempt, error = %err, "Completion call failed");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Echo {
        word: String,
    }

    /// Fails the first `failures` calls with the given error, then echoes.
    struct Flaky {
        failures: usize,
        error: CompletionError,
        calls: AtomicUsize,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Flaky {
        fn new(failures: usize, error: CompletionError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionService for Flaky {
        async fn complete(&self, req: CompletionRequest) -> CompletionResult<CompletionResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(self.error.clone());
            }
            assert!(req.schema.is_object());
            Ok(CompletionResponse {
                output: serde_json::json!({ "word": "ok" }),
                input_tokens: 1_000_000,
                output_tokens: 0,
            })
        }
    }

    fn substrate(service: Arc<Flaky>, settings: SubstrateSettings) -> AgentCallSubstrate {
        AgentCallSubstrate::new(service, ModelRegistry::default(), settings)
    }

    fn fast_settings() -> SubstrateSettings {
        SubstrateSettings {
            backoff_base_ms: 10,
            backoff_max_ms: 40,
            ..Default::default()
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let s = SubstrateSettings::default();
        assert_eq!(s.backoff(1), Duration::from_millis(1_000));
        assert_eq!(s.backoff(2), Duration::from_millis(2_000));
        assert_eq!(s.backoff(3), Duration::from_millis(4_000));
        assert_eq!(s.backoff(10), Duration::from_millis(10_000));
    }

    #[test]
    fn test_retryable_taxonomy() {
        assert!(CompletionError::RateLimited("x".into()).is_retryable());
        assert!(CompletionError::Transient("x".into()).is_retryable());
        assert!(!CompletionError::Fatal("x".into()).is_retryable());
        assert!(!CompletionError::TimedOut { elapsed_ms: 1 }.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limit_then_succeeds() {
        let service = Arc::new(Flaky::new(2, CompletionError::RateLimited("slow".into())));
        let sub = substrate(service.clone(), fast_settings());

        let (echo, metrics): (Echo, _) = sub
            .call(CallRole::Clarity, "sys", "user", Some(ChunkPosition::new(1, 3)))
            .await
            .unwrap();

        assert_eq!(echo.word, "ok");
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.agent_id, crate::finding::AgentId::Clarity);
        assert_eq!(metrics.model, "claude-haiku-4-5");
        assert!((metrics.cost_usd - 0.80).abs() < 1e-9);
        assert_eq!(metrics.chunk_index, Some(1));
        assert_eq!(metrics.chunk_total, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let service = Arc::new(Flaky::new(10, CompletionError::Transient("503".into())));
        let sub = substrate(service.clone(), fast_settings());

        let err = sub
            .call::<Echo>(CallRole::Briefing, "s", "u", None)
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::Transient(_)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let service = Arc::new(Flaky::new(1, CompletionError::Fatal("bad key".into())));
        let sub = substrate(service.clone(), fast_settings());

        let err = sub
            .call::<Echo>(CallRole::Briefing, "s", "u", None)
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::Fatal(_)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_covers_whole_call() {
        let mut flaky = Flaky::new(0, CompletionError::Fatal("unused".into()));
        flaky.delay = Duration::from_secs(5);
        let service = Arc::new(flaky);
        let sub = substrate(
            service,
            SubstrateSettings {
                timeout_ms: 1_000,
                ..fast_settings()
            },
        );

        let err = sub
            .call::<Echo>(CallRole::Adversary, "s", "u", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::TimedOut { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_output() {
        #[derive(Debug, Deserialize, JsonSchema)]
        #[allow(dead_code)]
        struct Strict {
            count: u32,
        }

        let sub = substrate(
            Arc::new(Flaky::new(0, CompletionError::Fatal("unused".into()))),
            fast_settings(),
        );
        let err = sub
            .call::<Strict>(CallRole::Clarity, "s", "u", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompletionError::MalformedOutput { role: CallRole::Clarity, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_calls_are_capped() {
        let mut flaky = Flaky::new(0, CompletionError::Fatal("unused".into()));
        flaky.delay = Duration::from_millis(50);
        let service = Arc::new(flaky);
        let sub = substrate(
            service.clone(),
            SubstrateSettings {
                max_in_flight: 2,
                ..fast_settings()
            },
        );

        let calls = (0..8).map(|_| {
            let sub = sub.clone();
            tokio::spawn(async move { sub.call::<Echo>(CallRole::Clarity, "s", "u", None).await })
        });
        for handle in futures::future::join_all(calls).await {
            assert!(handle.unwrap().is_ok());
        }

        assert_eq!(service.peak.load(Ordering::SeqCst), 2);
        assert_eq!(sub.available_slots(), 2);
    }
}
