//! Completion client: one seam to the model, with timeout and retry.
//!
//! The pipeline never talks to a provider directly. It goes through a
//! [`CompletionService`] (one request → one text blob), wrapped by a
//! [`CompletionClient`] that owns the retry policy. Tests swap in stub
//! services; production uses [`ProviderCompletionService`] over an
//! `edgequake_llm` provider.
//!
//! ## Retry Strategy
//!
//! Each attempt yields `Result<_, CompletionFailure>` and the loop matches on
//! the failure to choose the pause before the next attempt:
//!
//! | Failure                    | Pause                                   |
//! |----------------------------|-----------------------------------------|
//! | `Transport`, `Timeout`     | `transport_backoff_ms * 2^(attempt-1)`  |
//! | `MalformedJson`            | `retry_backoff_ms * 2^(attempt-1)`      |
//! | `EmptyResult`              | none                                    |
//!
//! After `max_retries` extra attempts the structured call returns an empty
//! vector: fewer records, never an aborted run.

use crate::config::{CompletionSettings, LanguageMode};
use crate::error::{CompletionFailure, Pdf2QaError};
use crate::output::QaRecord;
use crate::pipeline::normalize::normalize;
use crate::pipeline::postprocess::{prepare_json, strip_code_fences};
use crate::prompts::{qa_system_message, JSON_OUTPUT_REMINDER};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

// ── Service seam ─────────────────────────────────────────────────────────────

/// One request to the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Ask for a bare JSON document.
    pub json_output: bool,
}

/// A text-completion endpoint.
///
/// Implementations report provider and network errors as
/// [`CompletionFailure::Transport`]; everything else is the client's job.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionFailure>;
}

/// [`CompletionService`] over an `edgequake_llm` chat provider.
pub struct ProviderCompletionService {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderCompletionService {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CompletionService for ProviderCompletionService {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionFailure> {
        let mut messages = vec![ChatMessage::system(request.system.as_str())];
        if request.json_output {
            messages.push(ChatMessage::system(JSON_OUTPUT_REMINDER));
        }
        messages.push(ChatMessage::user(request.prompt.as_str()));

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let start = Instant::now();
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| CompletionFailure::Transport(e.to_string()))?;
        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

// ── Provider resolution ──────────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2QaError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2QaError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `settings.provider` — a pre-built provider, used as-is
/// 2. `settings.provider_name` + `settings.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. `OPENAI_API_KEY` → OpenAI with the configured or default model
/// 5. [`ProviderFactory::from_env`] auto-detection
pub fn resolve_provider(settings: &CompletionSettings) -> Result<Arc<dyn LLMProvider>, Pdf2QaError> {
    if let Some(ref provider) = settings.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = settings.provider_name {
        return create_provider(name, settings.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", settings.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2QaError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Retrying front-end to a [`CompletionService`].
///
/// Cheap to clone; clones share the service.
#[derive(Clone)]
pub struct CompletionClient {
    service: Arc<dyn CompletionService>,
    settings: CompletionSettings,
}

impl CompletionClient {
    pub fn new(service: Arc<dyn CompletionService>, settings: CompletionSettings) -> Self {
        Self { service, settings }
    }

    /// Build a client over the provider resolved from `settings`.
    pub fn from_settings(settings: CompletionSettings) -> Result<Self, Pdf2QaError> {
        let provider = resolve_provider(&settings)?;
        Ok(Self::new(
            Arc::new(ProviderCompletionService::new(provider)),
            settings,
        ))
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    /// A client over the same service with a different output token cap.
    pub fn with_max_tokens(&self, max_tokens: usize) -> Self {
        let mut settings = self.settings.clone();
        settings.max_tokens = max_tokens;
        Self::new(Arc::clone(&self.service), settings)
    }

    /// Ask for QA records and keep those in `mode`'s record family.
    ///
    /// `label` names the call in logs (a document source, or
    /// `cross-document`). Runs at most `max_retries + 1` attempts. Returns an
    /// empty vector when every attempt failed.
    pub async fn complete_records(
        &self,
        label: &str,
        prompt: &str,
        mode: LanguageMode,
        max_retries: u32,
    ) -> Vec<QaRecord> {
        let request = CompletionRequest {
            system: qa_system_message(mode).to_string(),
            prompt: prompt.to_string(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            json_output: true,
        };

        let mut last_failure: Option<CompletionFailure> = None;
        for attempt in 0..=max_retries {
            if let Some(ref failure) = last_failure {
                let backoff = self.backoff_ms(failure, attempt);
                warn!(
                    "{}: QA retry {}/{} after {}ms ({})",
                    label, attempt, max_retries, backoff, failure
                );
                if backoff > 0 {
                    sleep(Duration::from_millis(backoff)).await;
                }
            }

            match self.records_attempt(label, &request, mode).await {
                Ok(records) => {
                    debug!("{}: {} records on attempt {}", label, records.len(), attempt + 1);
                    return records;
                }
                Err(failure) => {
                    warn!("{}: QA attempt {} failed: {}", label, attempt + 1, failure);
                    last_failure = Some(failure);
                }
            }
        }

        warn!(
            "{}: giving up after {} attempts, returning no records",
            label,
            max_retries + 1
        );
        Vec::new()
    }

    async fn records_attempt(
        &self,
        label: &str,
        request: &CompletionRequest,
        mode: LanguageMode,
    ) -> Result<Vec<QaRecord>, CompletionFailure> {
        let raw = self.call(request).await?;
        let cleaned = prepare_json(&raw);
        let value: serde_json::Value = serde_json::from_str(&cleaned)
            .map_err(|e| CompletionFailure::MalformedJson(e.to_string()))?;

        let parsed = normalize(&value);
        let total = parsed.len();
        let records: Vec<QaRecord> = parsed
            .into_iter()
            .filter(|r| r.is_bilingual() == mode.is_bilingual())
            .collect();
        if records.len() < total {
            debug!(
                "{}: dropped {} records outside the {} family",
                label,
                total - records.len(),
                mode
            );
        }

        if records.is_empty() {
            Err(CompletionFailure::EmptyResult)
        } else {
            Ok(records)
        }
    }

    /// Plain-text completion for cleaning and title extraction.
    ///
    /// Transport failures and timeouts are retried; an empty answer is
    /// returned as [`CompletionFailure::EmptyResult`] so the caller can
    /// fall back without another round trip.
    pub async fn complete_text(&self, system: &str, prompt: &str) -> Result<String, CompletionFailure> {
        let request = CompletionRequest {
            system: system.to_string(),
            prompt: prompt.to_string(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            json_output: false,
        };

        let max_retries = self.settings.max_retries;
        let mut attempt = 0;
        loop {
            match self.call(&request).await {
                Ok(raw) => {
                    let text = strip_code_fences(&raw);
                    return if text.is_empty() {
                        Err(CompletionFailure::EmptyResult)
                    } else {
                        Ok(text)
                    };
                }
                Err(failure) if failure.is_transport() && attempt < max_retries => {
                    attempt += 1;
                    let backoff = self.backoff_ms(&failure, attempt);
                    warn!(
                        "Text call: retry {}/{} after {}ms ({})",
                        attempt, max_retries, backoff, failure
                    );
                    if backoff > 0 {
                        sleep(Duration::from_millis(backoff)).await;
                    }
                }
                Err(failure) => return Err(failure),
            }
        }
    }

    /// One call with the configured timeout.
    async fn call(&self, request: &CompletionRequest) -> Result<String, CompletionFailure> {
        let secs = self.settings.api_timeout_secs;
        match timeout(Duration::from_secs(secs), self.service.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionFailure::Timeout { secs }),
        }
    }

    fn backoff_ms(&self, failure: &CompletionFailure, attempt: u32) -> u64 {
        let base = match failure {
            CompletionFailure::Transport(_) | CompletionFailure::Timeout { .. } => {
                self.settings.transport_backoff_ms
            }
            CompletionFailure::MalformedJson(_) => self.settings.retry_backoff_ms,
            CompletionFailure::EmptyResult => 0,
        };
        base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays canned responses in order, then repeats the last one.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, CompletionFailure>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<&str, CompletionFailure>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionService for Scripted {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap()
            }
        }
    }

    struct Slow;

    #[async_trait]
    impl CompletionService for Slow {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionFailure> {
            sleep(Duration::from_secs(5)).await;
            Ok("too late".into())
        }
    }

    fn fast_settings() -> CompletionSettings {
        CompletionSettings {
            max_retries: 2,
            retry_backoff_ms: 0,
            transport_backoff_ms: 0,
            ..CompletionSettings::for_generation()
        }
    }

    const TWO_PAIRS: &str = r#"```json
[{"question": "Q1", "answer": "A1"},
 {"question": "Q2", "answer": "A2"}]
```"#;

    #[tokio::test]
    async fn records_on_first_attempt() {
        let svc = Scripted::new(vec![Ok(TWO_PAIRS)]);
        let client = CompletionClient::new(svc.clone(), fast_settings());
        let records = client.complete_records("doc.txt", "p", LanguageMode::English, 2).await;
        assert_eq!(records.len(), 2);
        assert_eq!(svc.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_then_valid_retries_once() {
        let svc = Scripted::new(vec![Ok("[{\"question\": "), Ok(TWO_PAIRS)]);
        let client = CompletionClient::new(svc.clone(), fast_settings());
        let records = client.complete_records("doc.txt", "p", LanguageMode::Chinese, 2).await;
        assert_eq!(records.len(), 2);
        assert_eq!(svc.calls(), 2);
    }

    #[tokio::test]
    async fn exhaustion_returns_empty() {
        let svc = Scripted::new(vec![Ok("{\"unrelated\": true}")]);
        let client = CompletionClient::new(svc.clone(), fast_settings());
        let records = client.complete_records("doc.txt", "p", LanguageMode::English, 2).await;
        assert!(records.is_empty());
        assert_eq!(svc.calls(), 3);
    }

    #[tokio::test]
    async fn transport_failure_is_retried() {
        let svc = Scripted::new(vec![
            Err(CompletionFailure::Transport("503".into())),
            Ok(TWO_PAIRS),
        ]);
        let client = CompletionClient::new(svc.clone(), fast_settings());
        let records = client.complete_records("doc.txt", "p", LanguageMode::English, 2).await;
        assert_eq!(records.len(), 2);
        assert_eq!(svc.calls(), 2);
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn retry_and_give_up_logs_name_the_call() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let svc = Scripted::new(vec![Err(CompletionFailure::Transport("503".into()))]);
        let client = CompletionClient::new(svc.clone(), fast_settings());
        let records = client
            .complete_records("paper_a.txt", "p", LanguageMode::English, 1)
            .await;
        assert!(records.is_empty());
        assert_eq!(svc.calls(), 2);

        let out = logs.contents();
        assert!(out.contains("paper_a.txt: QA attempt 1 failed"), "{out}");
        assert!(out.contains("paper_a.txt: QA retry 1/1"), "{out}");
        assert!(out.contains("paper_a.txt: giving up after 2 attempts"), "{out}");
    }

    #[tokio::test]
    async fn wrong_family_counts_as_empty() {
        let svc = Scripted::new(vec![Ok(TWO_PAIRS)]);
        let client = CompletionClient::new(svc.clone(), fast_settings());
        let records = client.complete_records("doc.txt", "p", LanguageMode::Bilingual, 1).await;
        assert!(records.is_empty());
        assert_eq!(svc.calls(), 2);
    }

    #[tokio::test]
    async fn timeout_becomes_failure() {
        let settings = CompletionSettings {
            api_timeout_secs: 1,
            max_retries: 0,
            ..fast_settings()
        };
        let client = CompletionClient::new(Arc::new(Slow), settings);
        let err = client.complete_text("sys", "prompt").await.unwrap_err();
        assert_eq!(err, CompletionFailure::Timeout { secs: 1 });
    }

    #[tokio::test]
    async fn complete_text_strips_fences() {
        let svc = Scripted::new(vec![Ok("```\nCleaned body text.\n```")]);
        let client = CompletionClient::new(svc, fast_settings());
        assert_eq!(
            client.complete_text("sys", "prompt").await.unwrap(),
            "Cleaned body text."
        );
    }

    #[tokio::test]
    async fn complete_text_does_not_retry_empty() {
        let svc = Scripted::new(vec![Ok("   ")]);
        let client = CompletionClient::new(svc.clone(), fast_settings());
        let err = client.complete_text("sys", "prompt").await.unwrap_err();
        assert_eq!(err, CompletionFailure::EmptyResult);
        assert_eq!(svc.calls(), 1);
    }

    #[test]
    fn backoff_grows_and_depends_on_failure() {
        let settings = CompletionSettings {
            retry_backoff_ms: 100,
            transport_backoff_ms: 1000,
            ..CompletionSettings::for_generation()
        };
        let client = CompletionClient::new(Scripted::new(vec![Ok("")]), settings);
        let transport = CompletionFailure::Transport("x".into());
        assert_eq!(client.backoff_ms(&transport, 1), 1000);
        assert_eq!(client.backoff_ms(&transport, 3), 4000);
        assert_eq!(client.backoff_ms(&CompletionFailure::MalformedJson("e".into()), 2), 200);
        assert_eq!(client.backoff_ms(&CompletionFailure::EmptyResult, 2), 0);
    }
}
