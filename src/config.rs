//! Configuration types for PDF cleaning and QA generation.
//!
//! Two top-level configs mirror the two pipeline halves:
//!
//! * [`ConversionConfig`] — PDF → cleaned text (chunk size, cleaning model,
//!   fallback thresholds, document concurrency).
//! * [`GenerationConfig`] — corpus → QA records (prompt budgets, per-document
//!   minimums, generation model).
//!
//! Both embed a [`CompletionSettings`] describing how to reach the completion
//! service, and both are built via a builder so callers set only what they
//! care about and rely on documented defaults for the rest.
//!
//! The heuristic thresholds (`SanitizerConfig`, `AnalyzerConfig`,
//! [`PromptBudget`]) were tuned empirically on academic papers. They are
//! defaults, not correctness properties.

use crate::error::Pdf2QaError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Model used when neither the caller nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

// ── Language mode ────────────────────────────────────────────────────────

/// Which language(s) the generated QA records are written in.
///
/// `Chinese` is the source language of the original corpus and `English` the
/// target language; `Bilingual` asks for both in one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageMode {
    /// Target language: flat `[{question, answer}]` in English.
    English,
    /// Source language: flat `[{question, answer}]` in Chinese.
    Chinese,
    /// `[{question_en, answer_en, question_zh, answer_zh}]`. (default)
    #[default]
    Bilingual,
}

impl LanguageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageMode::English => "english",
            LanguageMode::Chinese => "chinese",
            LanguageMode::Bilingual => "bilingual",
        }
    }

    /// Whether records for this mode carry both languages.
    pub fn is_bilingual(&self) -> bool {
        matches!(self, LanguageMode::Bilingual)
    }
}

impl fmt::Display for LanguageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageMode {
    type Err = Pdf2QaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" | "target" => Ok(LanguageMode::English),
            "chinese" | "zh" | "source" => Ok(LanguageMode::Chinese),
            "bilingual" | "both" => Ok(LanguageMode::Bilingual),
            other => Err(Pdf2QaError::InvalidConfig(format!(
                "unknown language mode '{other}' (expected english, chinese or bilingual)"
            ))),
        }
    }
}

// ── Completion settings ──────────────────────────────────────────────────

/// How to reach the completion service and how patiently to retry it.
#[derive(Clone)]
pub struct CompletionSettings {
    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Output-length cap per call.
    pub max_tokens: usize,

    /// Additional attempts after the first one fails. Default: 2.
    pub max_retries: u32,

    /// Pause before retrying after malformed output, in milliseconds. Default: 2000.
    pub retry_backoff_ms: u64,

    /// Pause before retrying after a transport failure or timeout. Default: 5000.
    pub transport_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,
}

impl CompletionSettings {
    /// Low temperature, moderate output: text cleaning is transcription.
    pub fn for_cleaning() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 4000,
            ..Self::base()
        }
    }

    /// Slightly warmer and a large output cap: a JSON array of long answers.
    pub fn for_generation() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 8192,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4000,
            max_retries: 2,
            retry_backoff_ms: 2000,
            transport_backoff_ms: 5000,
            api_timeout_secs: 120,
        }
    }

    /// The model to ask for, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self::for_generation()
    }
}

impl fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("transport_backoff_ms", &self.transport_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

// ── Heuristic thresholds ─────────────────────────────────────────────────

/// Line-classification thresholds for [`crate::pipeline::sanitize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// How many lines at each end of a page may be header/footer. Default: 3.
    pub edge_lines: usize,
    /// A header containing a year must be shorter than this. Default: 50.
    pub header_year_max_chars: usize,
    /// An all-caps header must be shorter than this. Default: 100.
    pub header_caps_max_chars: usize,
    /// Lines shorter than this are dropped as non-content. Default: 5.
    pub min_line_chars: usize,
    /// Drop a line when symbol characters exceed this share of it. Default: 0.3.
    pub max_symbol_ratio: f64,
    /// Titles are shorter than this. Default: 100.
    pub title_max_chars: usize,
    /// Unpunctuated lines shorter than this count as titles. Default: 50.
    pub short_title_chars: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            edge_lines: 3,
            header_year_max_chars: 50,
            header_caps_max_chars: 100,
            min_line_chars: 5,
            max_symbol_ratio: 0.3,
            title_max_chars: 100,
            short_title_chars: 50,
        }
    }
}

/// Thresholds for [`crate::domain::DomainAnalyzer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Distinct keyword hits needed before a domain/theme label is attributed. Default: 2.
    pub min_keyword_matches: usize,
    /// Only this many leading characters are tokenised for keywords. Default: 5000.
    pub keyword_window_chars: usize,
    /// Extra weight for tokens that also appear in the filename. Default: 5.
    pub filename_weight: usize,
    /// Candidates considered before the generic-word filter. Default: 20.
    pub keyword_candidates: usize,
    /// Keywords kept per document. Default: 8.
    pub keywords_per_document: usize,
    /// Domains in the profile. Default: 2.
    pub top_domains: usize,
    /// Themes in the profile. Default: 3.
    pub top_themes: usize,
    /// Keywords in the profile. Default: 10.
    pub top_keywords: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_keyword_matches: 2,
            keyword_window_chars: 5000,
            filename_weight: 5,
            keyword_candidates: 20,
            keywords_per_document: 8,
            top_domains: 2,
            top_themes: 3,
            top_keywords: 10,
        }
    }
}

/// Character budgets that bound prompt size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBudget {
    /// Excerpt quoted in a single-document prompt. Default: 4000.
    pub single_excerpt_chars: usize,
    /// Excerpt per source in a cross-document prompt. Default: 2000.
    pub cross_source_chars: usize,
    /// Total material in a cross-document prompt. Default: 6000.
    pub cross_total_chars: usize,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            single_excerpt_chars: 4000,
            cross_source_chars: 2000,
            cross_total_chars: 6000,
        }
    }
}

// ── Conversion config ────────────────────────────────────────────────────

/// Configuration for PDF → cleaned text conversion.
///
/// # Example
/// ```rust
/// use pdf2qa::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .max_chunk_size(6000)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_chunk_size, 6000);
/// ```
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Upper bound on characters per chunk sent for cleaning. Default: 8000.
    ///
    /// A chunk plus the cleaning instructions must fit the model's input
    /// window, and the cleaned chunk must fit `completion.max_tokens`.
    pub max_chunk_size: usize,

    /// Cleaned output shorter than this is treated as degenerate and replaced
    /// by the local rule-based cleaner. Default: 50.
    pub min_chunk_output_chars: usize,

    /// Concurrent cleaning calls within one document. Default: 1.
    pub chunk_concurrency: usize,

    /// Documents converted at once by [`crate::convert::PdfDocumentProcessor::convert_batch`]. Default: 3.
    pub concurrency: usize,

    /// Send chunks to the completion service. When false the sanitised text
    /// is written as-is. Default: true.
    pub ai_cleaning: bool,

    /// Run the page sanitiser before chunking. Default: true.
    pub sanitize: bool,

    /// Ask the model for the paper title to name the output file. Default: true.
    pub extract_title: bool,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page-level heuristics.
    pub sanitizer: SanitizerConfig,

    /// Completion settings for cleaning and title calls.
    pub completion: CompletionSettings,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 8000,
            min_chunk_output_chars: 50,
            chunk_concurrency: 1,
            concurrency: 3,
            ai_cleaning: true,
            sanitize: true,
            extract_title: true,
            password: None,
            sanitizer: SanitizerConfig::default(),
            completion: CompletionSettings::for_cleaning(),
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_chunk_size(mut self, n: usize) -> Self {
        self.config.max_chunk_size = n;
        self
    }

    pub fn min_chunk_output_chars(mut self, n: usize) -> Self {
        self.config.min_chunk_output_chars = n;
        self
    }

    pub fn chunk_concurrency(mut self, n: usize) -> Self {
        self.config.chunk_concurrency = n.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn ai_cleaning(mut self, v: bool) -> Self {
        self.config.ai_cleaning = v;
        self
    }

    pub fn sanitize(mut self, v: bool) -> Self {
        self.config.sanitize = v;
        self
    }

    pub fn extract_title(mut self, v: bool) -> Self {
        self.config.extract_title = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn sanitizer(mut self, sanitizer: SanitizerConfig) -> Self {
        self.config.sanitizer = sanitizer;
        self
    }

    pub fn completion(mut self, completion: CompletionSettings) -> Self {
        self.config.completion = completion;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2QaError> {
        let c = &self.config;
        if c.max_chunk_size < 500 {
            return Err(Pdf2QaError::InvalidConfig(format!(
                "max_chunk_size must be ≥ 500, got {}",
                c.max_chunk_size
            )));
        }
        validate_completion(&c.completion)?;
        Ok(self.config)
    }
}

// ── Generation config ────────────────────────────────────────────────────

/// Configuration for corpus → QA generation.
///
/// Per-run parameters (requested total, language, worker count) are passed
/// to [`crate::generate::QaGenerator::generate`] directly; this struct holds
/// what stays constant across runs.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Minimum questions requested per document in multi-document runs. Default: 2.
    pub min_per_document: usize,

    /// Minimum questions requested from the cross-document pass. Default: 3.
    pub min_cross_document: usize,

    /// Prompt size bounds.
    pub budget: PromptBudget,

    /// Domain-analysis thresholds.
    pub analyzer: AnalyzerConfig,

    /// Completion settings for QA calls.
    pub completion: CompletionSettings,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            min_per_document: 2,
            min_cross_document: 3,
            budget: PromptBudget::default(),
            analyzer: AnalyzerConfig::default(),
            completion: CompletionSettings::for_generation(),
        }
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn min_per_document(mut self, n: usize) -> Self {
        self.config.min_per_document = n;
        self
    }

    pub fn min_cross_document(mut self, n: usize) -> Self {
        self.config.min_cross_document = n;
        self
    }

    pub fn budget(mut self, budget: PromptBudget) -> Self {
        self.config.budget = budget;
        self
    }

    pub fn analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.config.analyzer = analyzer;
        self
    }

    pub fn completion(mut self, completion: CompletionSettings) -> Self {
        self.config.completion = completion;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, Pdf2QaError> {
        let c = &self.config;
        if c.budget.cross_source_chars == 0 || c.budget.single_excerpt_chars == 0 {
            return Err(Pdf2QaError::InvalidConfig(
                "prompt budgets must be non-zero".into(),
            ));
        }
        validate_completion(&c.completion)?;
        Ok(self.config)
    }
}

fn validate_completion(c: &CompletionSettings) -> Result<(), Pdf2QaError> {
    if !(0.0..=2.0).contains(&c.temperature) {
        return Err(Pdf2QaError::InvalidConfig(format!(
            "temperature must be 0.0–2.0, got {}",
            c.temperature
        )));
    }
    if c.api_timeout_secs == 0 {
        return Err(Pdf2QaError::InvalidConfig(
            "api_timeout_secs must be ≥ 1".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_mode_parses_aliases() {
        assert_eq!("en".parse::<LanguageMode>().unwrap(), LanguageMode::English);
        assert_eq!("source".parse::<LanguageMode>().unwrap(), LanguageMode::Chinese);
        assert_eq!("Both".parse::<LanguageMode>().unwrap(), LanguageMode::Bilingual);
        assert!("klingon".parse::<LanguageMode>().is_err());
    }

    #[test]
    fn completion_presets_differ() {
        let clean = CompletionSettings::for_cleaning();
        let gen = CompletionSettings::for_generation();
        assert!(clean.temperature < gen.temperature);
        assert!(gen.max_tokens > clean.max_tokens);
        assert_eq!(clean.model_or_default(), DEFAULT_MODEL);
    }

    #[test]
    fn conversion_builder_rejects_tiny_chunks() {
        assert!(ConversionConfig::builder().max_chunk_size(10).build().is_err());
    }

    #[test]
    fn conversion_builder_clamps_concurrency() {
        let c = ConversionConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn generation_builder_rejects_bad_temperature() {
        let completion = CompletionSettings {
            temperature: 3.5,
            ..CompletionSettings::for_generation()
        };
        assert!(GenerationConfig::builder()
            .completion(completion)
            .build()
            .is_err());
    }

    #[test]
    fn generation_defaults() {
        let c = GenerationConfig::default();
        assert_eq!(c.min_per_document, 2);
        assert_eq!(c.min_cross_document, 3);
        assert_eq!(c.budget.single_excerpt_chars, 4000);
        assert_eq!(c.analyzer.min_keyword_matches, 2);
    }
}
