//! Provider Client: adapts a single upstream model back-end to a uniform
//! call shape the Orchestrator can fan out to in parallel.
//!
//! Built on [`crate::llm::LlmProvider`]: this layer adds the deadline,
//! classification of failure into a [`RejectKind`], and response packaging
//! the rest of the pipeline expects. It deliberately does not retry — a
//! rejected provider
//! is simply absent from the round; the Voter and Synthesizer operate on
//! however many responses did arrive. A round with zero fulfilled
//! responses is valid input to the Orchestrator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use crate::model::RejectKind;
use crate::llm::{LlmProvider, Message};
use crate::model::{Prompt, ProviderResponse, ResponseStatus};

/// Uniform adapter a registered upstream model back-end implements.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable role tag this client answers to (e.g. "gpt4o").
    fn role(&self) -> &str;

    /// Upstream provider name (e.g. "openai").
    fn provider_name(&self) -> &str;

    /// Upstream model name (e.g. "gpt-4o-mini").
    fn model_name(&self) -> &str;

    /// Invoke the upstream model, honoring `deadline` and `cancellation`.
    /// Never returns an `Err` for ordinary upstream failure — those are
    /// represented as `ResponseStatus::Rejected` so a failed provider
    /// never aborts the round for the others. The Admission Queue cancels
    /// `cancellation` when the caller disconnects, which this call must
    /// observe promptly rather than running to its full deadline.
    async fn invoke(
        &self,
        prompt: &Prompt,
        deadline: Duration,
        cancellation: CancellationToken,
    ) -> ProviderResponse;
}

/// A [`ProviderClient`] wrapping any [`LlmProvider`] transport.
pub struct LlmProviderClient<P: LlmProvider> {
    role: String,
    provider_name: String,
    transport: P,
    /// Rolling count of invocations, used to derive a cheap default
    /// confidence proxy when the transport reports none.
    invocation_count: AtomicU64,
}

impl<P: LlmProvider> LlmProviderClient<P> {
    pub fn new(role: impl Into<String>, provider_name: impl Into<String>, transport: P) -> Self {
        Self {
            role: role.into(),
            provider_name: provider_name.into(),
            transport,
            invocation_count: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl<P: LlmProvider + Send + Sync> ProviderClient for LlmProviderClient<P> {
    fn role(&self) -> &str {
        &self.role
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model_name(&self) -> &str {
        self.transport.model()
    }

    async fn invoke(
        &self,
        prompt: &Prompt,
        deadline: Duration,
        cancellation: CancellationToken,
    ) -> ProviderResponse {
        self.invocation_count.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let messages = [Message::user(prompt.text.clone())];

        let result = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                return self.rejected(RejectKind::Cancelled, elapsed_ms);
            }
            r = tokio::time::timeout(deadline, self.transport.chat(&messages)) => r,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Err(_) => self.rejected(RejectKind::Timeout, elapsed_ms),
            Ok(Err(e)) => self.rejected(classify(&e), elapsed_ms),
            Ok(Ok(response)) => {
                if response.content.trim().is_empty() {
                    return self.rejected(RejectKind::Malformed, elapsed_ms);
                }
                let (prompt_tokens, response_tokens) = response
                    .usage
                    .as_ref()
                    .map(|u| (u.prompt_tokens, u.completion_tokens))
                    .unwrap_or((0, 0));
                ProviderResponse {
                    role: self.role.clone().into(),
                    provider_name: self.provider_name.clone(),
                    model_name: self.model_name().to_string(),
                    status: ResponseStatus::Fulfilled,
                    content: response.content,
                    response_time_ms: elapsed_ms,
                    prompt_tokens,
                    response_tokens,
                    raw_confidence: default_raw_confidence(&response.finish_reason),
                }
            }
        }
    }
}

impl<P: LlmProvider> LlmProviderClient<P> {
    fn rejected(&self, reason: RejectKind, elapsed_ms: u64) -> ProviderResponse {
        ProviderResponse {
            role: self.role.clone().into(),
            provider_name: self.provider_name.clone(),
            model_name: self.model_name().to_string(),
            status: ResponseStatus::Rejected { reason },
            content: String::new(),
            response_time_ms: elapsed_ms,
            prompt_tokens: 0,
            response_tokens: 0,
            raw_confidence: 0.0,
        }
    }
}

/// Map a transport-level error to the coarse [`RejectKind`] the rest of
/// the pipeline reasons about.
fn classify(err: &crate::error::Error) -> RejectKind {
    match err {
        crate::error::Error::Http(e) if e.is_timeout() => RejectKind::Timeout,
        crate::error::Error::Http(e) if e.is_connect() => RejectKind::Transport,
        crate::error::Error::Http(e) => match e.status().map(|s| s.as_u16()) {
            Some(s) if (500..600).contains(&s) => RejectKind::Upstream5xx,
            Some(429) => RejectKind::Quota,
            Some(_) => RejectKind::Upstream4xx,
            None => RejectKind::Transport,
        },
        crate::error::Error::Provider(msg) if msg.to_lowercase().contains("quota") => {
            RejectKind::Quota
        }
        crate::error::Error::Provider(msg) if msg.to_lowercase().contains("api error") => {
            RejectKind::Upstream5xx
        }
        _ => RejectKind::Transport,
    }
}

fn default_raw_confidence(finish_reason: &Option<String>) -> f64 {
    match finish_reason.as_deref() {
        Some("stop") => 0.75,
        Some("length") => 0.55,
        _ => 0.6,
    }
}

/// A [`ProviderClient`] whose outcome is pre-scripted, for tests.
pub struct MockProviderClient {
    role: String,
    provider_name: String,
    model_name: String,
    outcome: ResponseStatus,
    content: String,
    response_time_ms: u64,
    raw_confidence: f64,
}

impl MockProviderClient {
    pub fn fulfilled(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            provider_name: "mock".into(),
            model_name: "mock-model".into(),
            outcome: ResponseStatus::Fulfilled,
            content: content.into(),
            response_time_ms: 100,
            raw_confidence: 0.7,
        }
    }

    pub fn rejected(role: impl Into<String>, reason: RejectKind) -> Self {
        Self {
            role: role.into(),
            provider_name: "mock".into(),
            model_name: "mock-model".into(),
            outcome: ResponseStatus::Rejected { reason },
            content: String::new(),
            response_time_ms: 50,
            raw_confidence: 0.0,
        }
    }

    pub fn response_time_ms(mut self, ms: u64) -> Self {
        self.response_time_ms = ms;
        self
    }

    pub fn raw_confidence(mut self, c: f64) -> Self {
        self.raw_confidence = c;
        self
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    fn role(&self) -> &str {
        &self.role
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn invoke(
        &self,
        _prompt: &Prompt,
        _deadline: Duration,
        _cancellation: CancellationToken,
    ) -> ProviderResponse {
        ProviderResponse {
            role: self.role.clone().into(),
            provider_name: self.provider_name.clone(),
            model_name: self.model_name.clone(),
            status: self.outcome.clone(),
            content: self.content.clone(),
            response_time_ms: self.response_time_ms,
            prompt_tokens: self.content.split_whitespace().count() as u32,
            response_tokens: self.content.split_whitespace().count() as u32,
            raw_confidence: self.raw_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn llm_provider_client_wraps_mock_transport() {
        let transport = crate::llm::MockLlmProvider::with_response("hello there");
        let client = LlmProviderClient::new("gpt4o", "openai", transport);
        let prompt = Prompt::new("hi");
        let response = client.invoke(&prompt, Duration::from_secs(5), CancellationToken::new()).await;
        assert!(response.is_fulfilled());
        assert_eq!(response.content, "hello there");
    }

    #[tokio::test]
    async fn empty_transport_response_is_malformed() {
        let transport = crate::llm::MockLlmProvider::with_response("");
        let client = LlmProviderClient::new("gpt4o", "openai", transport);
        let prompt = Prompt::new("hi");
        let response = client.invoke(&prompt, Duration::from_secs(5), CancellationToken::new()).await;
        assert_eq!(response.status, ResponseStatus::Rejected { reason: RejectKind::Malformed });
    }

    #[tokio::test]
    async fn mock_provider_client_reports_scripted_outcome() {
        let client = MockProviderClient::rejected("claude", RejectKind::Quota);
        let prompt = Prompt::new("hi");
        let response = client.invoke(&prompt, Duration::from_secs(5), CancellationToken::new()).await;
        assert!(!response.is_fulfilled());
    }

    #[tokio::test]
    async fn cancelled_token_rejects_before_deadline() {
        let transport = crate::llm::MockLlmProvider::with_response("hello there");
        let client = LlmProviderClient::new("gpt4o", "openai", transport);
        let prompt = Prompt::new("hi");
        let token = CancellationToken::new();
        token.cancel();
        let response = client.invoke(&prompt, Duration::from_secs(5), token).await;
        assert_eq!(response.status, ResponseStatus::Rejected { reason: RejectKind::Cancelled });
    }
}
