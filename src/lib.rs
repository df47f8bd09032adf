//! # pdf2qa
//!
//! Turn a folder of academic PDFs into an instruction-tuning dataset of
//! question/answer pairs.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract    per-page text layer via pdfium (spawn_blocking)
//!  ├─ 2. Sanitize   headers, footers, captions, tables, reference markers
//!  ├─ 3. Chunk      page-aligned chunks under a character budget
//!  ├─ 4. Clean      LLM rewrite per chunk, local rule-based fallback
//!  │
//!  ▼
//! Corpus (file name → cleaned text)
//!  │
//!  ├─ 5. Analyze    dominant domains, themes, keywords
//!  ├─ 6. Generate   per-document QA on a bounded worker pool,
//!  │                then one cross-document synthesis pass
//!  └─ 7. Write      JSONL: instruction / input / output / metadata
//! ```
//!
//! Model calls go through [`CompletionClient`], which owns timeouts and
//! retries. A failed call degrades to fewer records or to the local cleaner;
//! only configuration problems fail a run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2qa::{
//!     load_corpus, CompletionClient, DatasetWriter, GenerationConfig, LanguageMode, QaGenerator,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = GenerationConfig::default();
//!     let client = CompletionClient::from_settings(config.completion.clone())?;
//!     let generator = QaGenerator::new(client, config);
//!
//!     let corpus = load_corpus(Path::new("txt"))?;
//!     let output = generator
//!         .generate_dataset(&corpus, 50, LanguageMode::English, 2)
//!         .await?;
//!
//!     let writer = DatasetWriter::new("Answer the research question.", LanguageMode::English);
//!     let lines = writer.write_file(&output.records, Path::new("qa.jsonl"))?;
//!     eprintln!("{} lines, domains: {:?}", lines, output.profile.primary_domains);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2qa` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2qa = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    AnalyzerConfig, CompletionSettings, ConversionConfig, ConversionConfigBuilder,
    GenerationConfig, GenerationConfigBuilder, LanguageMode, PromptBudget, SanitizerConfig,
};
pub use convert::{sanitize_filename, PdfDocumentProcessor};
pub use dataset::{load_corpus, DatasetWriter};
pub use domain::DomainAnalyzer;
pub use error::{CompletionFailure, DocumentError, Pdf2QaError};
pub use generate::QaGenerator;
pub use output::{
    CleanedDocument, ConversionOutcome, Corpus, DocumentStats, DomainProfile, GenerationOutput,
    QaContent, QaRecord, RawPage, TextChunk,
};
pub use pipeline::extract::{PageExtractor, PdfiumExtractor};
pub use pipeline::llm::{CompletionClient, CompletionRequest, CompletionService};
pub use progress::{
    ConversionProgressCallback, GenerationProgressCallback, NoopProgressCallback, Progress,
    ProgressSnapshot,
};
pub use prompts::QaPromptBuilder;
