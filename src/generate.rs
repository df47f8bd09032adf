//! QA generation: fan documents out to the model, fan results back in.
//!
//! A run has four phases:
//!
//! ```text
//! reset progress ──▶ per-document pool ──▶ cross-document pass ──▶ truncate
//!                    (buffer_unordered,     (one call over the
//!                     worker_count)          whole corpus)
//! ```
//!
//! Single-document corpora skip the pool and the cross pass: the one
//! document is asked for the full requested total.
//!
//! The coordinator owns the [`Progress`] counters. Workers never touch them;
//! each task hands back its records and the coordinator does the counting,
//! including for tasks that panicked.

use crate::config::{GenerationConfig, LanguageMode};
use crate::domain::DomainAnalyzer;
use crate::error::Pdf2QaError;
use crate::output::{Corpus, DomainProfile, GenerationOutput, QaRecord};
use crate::pipeline::llm::CompletionClient;
use crate::progress::{GenerationCallback, NoopProgressCallback, Progress};
use crate::prompts::QaPromptBuilder;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Log label for the synthesis call over the whole corpus.
const CROSS_DOCUMENT_LABEL: &str = "cross-document";

/// One document's share of a run. Owned by exactly one worker.
#[derive(Debug, Clone)]
struct GenerationTask {
    source: String,
    text: String,
    requested: usize,
    mode: LanguageMode,
    profile: Arc<DomainProfile>,
}

impl GenerationTask {
    async fn run(self, client: CompletionClient, prompts: QaPromptBuilder) -> Vec<QaRecord> {
        let prompt =
            prompts.single_document_prompt(&self.text, self.requested, self.mode, &self.profile);
        let max_retries = client.settings().max_retries;
        let mut records = client
            .complete_records(&self.source, &prompt, self.mode, max_retries)
            .await;
        records.truncate(self.requested);
        if records.is_empty() {
            warn!("{}: no usable records from the model", self.source);
        } else {
            debug!("{}: {} records", self.source, records.len());
        }
        records
    }
}

/// Drives QA generation over a corpus.
pub struct QaGenerator {
    client: CompletionClient,
    config: GenerationConfig,
    prompts: QaPromptBuilder,
    progress: Arc<Progress>,
    callback: GenerationCallback,
}

impl QaGenerator {
    pub fn new(client: CompletionClient, config: GenerationConfig) -> Self {
        let prompts = QaPromptBuilder::new(config.budget);
        Self {
            client,
            config,
            prompts,
            progress: Arc::new(Progress::new()),
            callback: Arc::new(NoopProgressCallback),
        }
    }

    /// Share an existing progress handle, e.g. one a status endpoint reads.
    pub fn with_progress(mut self, progress: Arc<Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_callback(mut self, callback: GenerationCallback) -> Self {
        self.callback = callback;
        self
    }

    /// Handle to the run counters. Read it with [`Progress::snapshot`].
    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    /// Generate up to `requested_total` records from `corpus`.
    ///
    /// # Errors
    /// Only configuration errors, raised before any completion call:
    /// - [`Pdf2QaError::InvalidConfig`] when `worker_count` is zero
    /// - [`Pdf2QaError::WorkersExceedDocuments`] when `worker_count` is larger
    ///   than the corpus (this includes an empty corpus)
    ///
    /// Failed model calls shrink the result instead of failing the run; an
    /// empty vector is a valid outcome.
    pub async fn generate(
        &self,
        corpus: &Corpus,
        requested_total: usize,
        mode: LanguageMode,
        profile: &DomainProfile,
        worker_count: usize,
    ) -> Result<Vec<QaRecord>, Pdf2QaError> {
        if worker_count == 0 {
            return Err(Pdf2QaError::InvalidConfig(
                "worker_count must be at least 1".into(),
            ));
        }
        if worker_count > corpus.len() {
            return Err(Pdf2QaError::WorkersExceedDocuments {
                workers: worker_count,
                documents: corpus.len(),
            });
        }

        let start = Instant::now();
        info!(
            "Generating {} {} QA records from {} documents ({} workers)",
            requested_total,
            mode,
            corpus.len(),
            worker_count
        );

        // ── Step 1: Reset shared progress ────────────────────────────────
        self.progress.reset(corpus.len(), requested_total);
        self.callback.on_run_start(corpus.len(), requested_total);

        let max_retries = self.client.settings().max_retries;

        // ── Step 2: Single document, no pool ─────────────────────────────
        if corpus.len() == 1 {
            let mut records = Vec::new();
            if let Some((source, text)) = corpus.iter().next() {
                self.callback.on_document_start(source);
                let prompt =
                    self.prompts
                        .single_document_prompt(text, requested_total, mode, profile);
                records = self
                    .client
                    .complete_records(source, &prompt, mode, max_retries)
                    .await;
                records.truncate(requested_total);
                if records.is_empty() {
                    warn!("{}: no usable records from the model", source);
                }
                self.progress.record_file(records.len());
                self.callback.on_document_complete(source, records.len());
            }
            return Ok(self.finish(records, requested_total, start));
        }

        // ── Step 3: Per-document pool ────────────────────────────────────
        let per_document = self
            .config
            .min_per_document
            .max(requested_total / (corpus.len() * 2));
        self.callback.on_pool_start(worker_count, per_document);
        debug!("Pool of {} workers, {} per document", worker_count, per_document);

        let shared_profile = Arc::new(profile.clone());
        let tasks: Vec<GenerationTask> = corpus
            .iter()
            .map(|(source, text)| GenerationTask {
                source: source.clone(),
                text: text.clone(),
                requested: per_document,
                mode,
                profile: Arc::clone(&shared_profile),
            })
            .collect();

        let mut records: Vec<QaRecord> = Vec::new();
        let mut finished = stream::iter(tasks)
            .map(|task| {
                let client = self.client.clone();
                let prompts = self.prompts;
                let source = task.source.clone();
                self.callback.on_document_start(&source);
                async move { (source, tokio::spawn(task.run(client, prompts)).await) }
            })
            .buffer_unordered(worker_count);

        // ── Step 4: Fan in, arrival order ────────────────────────────────
        while let Some((source, joined)) = finished.next().await {
            match joined {
                Ok(batch) => {
                    self.progress.record_file(batch.len());
                    self.callback.on_document_complete(&source, batch.len());
                    records.extend(batch);
                }
                Err(e) => {
                    warn!("{}: generation task failed: {}", source, e);
                    self.progress.record_file(0);
                    self.callback.on_document_error(&source, &e.to_string());
                }
            }
        }

        // ── Step 5: Cross-document synthesis ─────────────────────────────
        let cross = self
            .config
            .min_cross_document
            .max(requested_total.saturating_sub(records.len()));
        self.callback.on_cross_synthesis_start(cross);
        info!(
            "Collected {} per-document records, requesting {} cross-document",
            records.len(),
            cross
        );

        let prompt = self
            .prompts
            .cross_document_prompt(corpus, cross, mode, profile);
        let mut synthesis = self
            .client
            .complete_records(CROSS_DOCUMENT_LABEL, &prompt, mode, max_retries)
            .await;
        if synthesis.is_empty() {
            warn!("{}: no usable records from the model", CROSS_DOCUMENT_LABEL);
        }
        synthesis.truncate(cross);
        self.progress.record_generated(synthesis.len());
        records.extend(synthesis);

        Ok(self.finish(records, requested_total, start))
    }

    /// Truncate to the requested total and reconcile the counters.
    fn finish(&self, mut records: Vec<QaRecord>, requested_total: usize, start: Instant) -> Vec<QaRecord> {
        records.truncate(requested_total);
        self.progress.reconcile_generated(records.len());
        self.callback.on_run_complete(records.len());
        info!(
            "Generated {} QA records in {:.1}s",
            records.len(),
            start.elapsed().as_secs_f64()
        );
        records
    }

    /// Analyze the corpus, then generate.
    pub async fn generate_dataset(
        &self,
        corpus: &Corpus,
        requested_total: usize,
        mode: LanguageMode,
        worker_count: usize,
    ) -> Result<GenerationOutput, Pdf2QaError> {
        let profile = DomainAnalyzer::new(self.config.analyzer.clone()).analyze(corpus);
        debug!(
            "Domains {:?}, themes {:?}",
            profile.primary_domains, profile.primary_themes
        );
        let records = self
            .generate(corpus, requested_total, mode, &profile, worker_count)
            .await?;
        Ok(GenerationOutput {
            records,
            profile,
            progress: self.progress.snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionSettings;
    use crate::error::CompletionFailure;
    use crate::pipeline::llm::{CompletionRequest, CompletionService};
    use crate::output::QaContent;
    use crate::progress::GenerationProgressCallback;
    use crate::prompts::MATERIAL_LABEL;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every call with `n` monolingual pairs.
    struct Pairs {
        n: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionService for Pairs {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionFailure> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let items: Vec<serde_json::Value> = (0..self.n)
                .map(|i| {
                    serde_json::json!({
                        "question": format!("Q{call}-{i}"),
                        "answer": format!("A{call}-{i}"),
                    })
                })
                .collect();
            Ok(serde_json::Value::Array(items).to_string())
        }
    }

    fn generator(n: usize) -> (QaGenerator, Arc<Pairs>) {
        let svc = Arc::new(Pairs {
            n,
            calls: AtomicUsize::new(0),
        });
        let settings = CompletionSettings {
            retry_backoff_ms: 0,
            transport_backoff_ms: 0,
            ..CompletionSettings::for_generation()
        };
        let client = CompletionClient::new(svc.clone(), settings);
        (QaGenerator::new(client, GenerationConfig::default()), svc)
    }

    fn corpus(n: usize) -> Corpus {
        (0..n)
            .map(|i| (format!("doc{i}.txt"), format!("Body of document {i}.")))
            .collect()
    }

    #[derive(Default)]
    struct Pools(AtomicUsize);

    impl GenerationProgressCallback for Pools {
        fn on_pool_start(&self, _workers: usize, _per_document: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Tags each pair with the document it was asked about and panics on
    /// `doc1.txt`'s single-document prompt.
    struct PanicsOnSecond;

    #[async_trait]
    impl CompletionService for PanicsOnSecond {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionFailure> {
            let tag = if request.prompt.contains(MATERIAL_LABEL) {
                "cross".to_string()
            } else {
                match (0..3).find(|i| request.prompt.contains(&format!("Body of document {i}."))) {
                    Some(1) => panic!("worker blew up"),
                    Some(i) => format!("doc{i}"),
                    None => "unknown".to_string(),
                }
            };
            Ok(serde_json::json!([
                {"question": format!("{tag} q1"), "answer": "a1"},
                {"question": format!("{tag} q2"), "answer": "a2"},
            ])
            .to_string())
        }
    }

    #[derive(Default)]
    struct Errors(std::sync::Mutex<Vec<String>>);

    impl GenerationProgressCallback for Errors {
        fn on_document_error(&self, source: &str, _error: &str) {
            self.0.lock().unwrap().push(source.to_string());
        }
    }

    #[tokio::test]
    async fn panicked_worker_still_counts_as_processed() {
        let settings = CompletionSettings {
            retry_backoff_ms: 0,
            transport_backoff_ms: 0,
            ..CompletionSettings::for_generation()
        };
        let client = CompletionClient::new(Arc::new(PanicsOnSecond), settings);
        let errors = Arc::new(Errors::default());
        let gen = QaGenerator::new(client, GenerationConfig::default()).with_callback(errors.clone());

        let records = gen
            .generate(&corpus(3), 12, LanguageMode::English, &DomainProfile::default(), 3)
            .await
            .unwrap();

        assert_eq!(*errors.0.lock().unwrap(), vec!["doc1.txt".to_string()]);

        let questions: Vec<String> = records
            .iter()
            .map(|r| match &r.content {
                QaContent::Monolingual { question, .. } => question.clone(),
                other => panic!("unexpected record {other:?}"),
            })
            .collect();
        // two from each surviving document, two from the cross pass
        assert_eq!(questions.len(), 6);
        assert_eq!(questions.iter().filter(|q| q.starts_with("doc0")).count(), 2);
        assert_eq!(questions.iter().filter(|q| q.starts_with("doc2")).count(), 2);
        assert_eq!(questions.iter().filter(|q| q.starts_with("cross")).count(), 2);
        assert!(!questions.iter().any(|q| q.starts_with("doc1")));

        let snap = gen.progress().snapshot();
        assert_eq!(snap.processed_files, 3);
        assert_eq!(snap.generated_questions, records.len());
    }

    #[tokio::test]
    async fn zero_workers_is_rejected_without_calls() {
        let (gen, svc) = generator(2);
        let err = gen
            .generate(&corpus(2), 10, LanguageMode::English, &DomainProfile::default(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2QaError::InvalidConfig(_)));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn too_many_workers_is_rejected_without_calls() {
        let (gen, svc) = generator(2);
        let err = gen
            .generate(&corpus(2), 10, LanguageMode::English, &DomainProfile::default(), 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Pdf2QaError::WorkersExceedDocuments {
                workers: 3,
                documents: 2
            }
        ));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
        assert_eq!(gen.progress().snapshot().total_files, 0);
    }

    #[tokio::test]
    async fn single_document_skips_pool_and_cross_pass() {
        let (gen, svc) = generator(5);
        let pools = Arc::new(Pools::default());
        let gen = gen.with_callback(pools.clone());
        let records = gen
            .generate(&corpus(1), 3, LanguageMode::English, &DomainProfile::default(), 1)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(svc.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pools.0.load(Ordering::SeqCst), 0);

        let snap = gen.progress().snapshot();
        assert_eq!(snap.processed_files, 1);
        assert_eq!(snap.generated_questions, 3);
    }

    #[tokio::test]
    async fn never_exceeds_requested_total() {
        let (gen, svc) = generator(10);
        let records = gen
            .generate(&corpus(4), 7, LanguageMode::Chinese, &DomainProfile::default(), 2)
            .await
            .unwrap();
        assert_eq!(records.len(), 7);
        // four documents plus one cross-document call
        assert_eq!(svc.calls.load(Ordering::SeqCst), 5);

        let snap = gen.progress().snapshot();
        assert_eq!(snap.total_files, 4);
        assert_eq!(snap.processed_files, 4);
        assert_eq!(snap.generated_questions, records.len());
    }

    #[tokio::test]
    async fn per_document_share_is_truncated() {
        // 3 documents, 30 requested: 5 per document, 15 from the cross pass.
        let (gen, _svc) = generator(100);
        let records = gen
            .generate(&corpus(3), 30, LanguageMode::English, &DomainProfile::default(), 3)
            .await
            .unwrap();
        assert_eq!(records.len(), 30);
    }

    #[tokio::test]
    async fn generate_dataset_reports_profile_and_progress() {
        let (gen, _svc) = generator(2);
        let out = gen
            .generate_dataset(&corpus(2), 4, LanguageMode::English, 2)
            .await
            .unwrap();
        assert_eq!(out.profile.document_count, 2);
        assert_eq!(out.progress.processed_files, 2);
        assert_eq!(out.progress.generated_questions, out.records.len());
        assert!(out.records.len() <= 4);
    }
}
