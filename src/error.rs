//! Error types for the pdf2qa library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`Pdf2QaError`] — **Fatal**: the operation cannot start or cannot
//!   finish (bad configuration, provider not configured, output file not
//!   writable). Returned as `Err(Pdf2QaError)` from top-level entry points.
//!
//! * [`DocumentError`] — **Per document**: one PDF could not be turned into
//!   text, but the rest of a batch is unaffected. Reported alongside the
//!   other documents' results.
//!
//! * [`CompletionFailure`] — **Per call**: one request to the completion
//!   service produced nothing usable. The retry loop in
//!   [`crate::pipeline::llm`] consumes these; callers only ever see an empty
//!   result once retries are exhausted.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2qa library.
#[derive(Debug, Error)]
pub enum Pdf2QaError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// A corpus folder could not be listed.
    #[error("Failed to read corpus folder '{path}': {source}")]
    CorpusReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or run-parameter validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// More workers were requested than there are documents to give them.
    #[error("Worker count {workers} exceeds document count {documents}\nReduce --workers or add more documents.")]
    WorkersExceedDocuments { workers: usize, documents: usize },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
///
/// A batch conversion keeps going when one document fails; the failure is
/// stored next to the document's name so callers can report it.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The extraction primitive returned no pages.
    #[error("{source_name}: no text could be extracted from the PDF")]
    ExtractionFailed { source_name: String },

    /// Every chunk came back empty, even after the local fallback.
    #[error("{source_name}: all {chunks} chunks produced empty output")]
    NoContent { source_name: String, chunks: usize },

    /// The cleaned text could not be written to disk.
    #[error("{source_name}: failed to write '{path}': {detail}")]
    WriteFailed {
        source_name: String,
        path: PathBuf,
        detail: String,
    },
}

/// Why one completion attempt produced no usable output.
///
/// This is an expected outcome, not an exception: the retry loop matches on
/// it to pick a backoff, and after the last attempt it degrades to "no
/// records".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionFailure {
    /// Network, HTTP, or provider-side error.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The call did not finish within the configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The response was not valid JSON after cleanup.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// The response parsed but contained no recognisable records or text.
    #[error("empty result")]
    EmptyResult,
}

impl CompletionFailure {
    /// Transport failures and timeouts warrant the longer backoff.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workers_exceed_documents_display() {
        let e = Pdf2QaError::WorkersExceedDocuments {
            workers: 5,
            documents: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("5"), "got: {msg}");
        assert!(msg.contains("2"), "got: {msg}");
    }

    #[test]
    fn document_error_names_the_source() {
        let e = DocumentError::ExtractionFailed {
            source_name: "paper.pdf".into(),
        };
        assert!(e.to_string().starts_with("paper.pdf"));
    }

    #[test]
    fn timeout_counts_as_transport() {
        assert!(CompletionFailure::Timeout { secs: 60 }.is_transport());
        assert!(CompletionFailure::Transport("503".into()).is_transport());
        assert!(!CompletionFailure::MalformedJson("eof".into()).is_transport());
        assert!(!CompletionFailure::EmptyResult.is_transport());
    }

    #[test]
    fn timeout_display() {
        let e = CompletionFailure::Timeout { secs: 90 };
        assert!(e.to_string().contains("90s"));
    }
}
