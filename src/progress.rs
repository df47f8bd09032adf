//! Shared run progress and progress-callback traits.
//!
//! Two mechanisms coexist:
//!
//! * [`Progress`] — counters owned by the generation coordinator and read by
//!   anyone holding an `Arc<Progress>` (a CLI status line, a web handler).
//!   Reads take a [`ProgressSnapshot`] so no caller ever sees a half-updated
//!   set of counters.
//! * Callback traits ([`ConversionProgressCallback`],
//!   [`GenerationProgressCallback`]) — push-style events for callers that
//!   want to react as work happens.
//!
//! Both callback traits are `Send + Sync` and every method has a no-op
//! default, so implementations override only what they need.
//!
//! # Example
//!
//! ```rust
//! use pdf2qa::GenerationProgressCallback;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, source: &str, records: usize) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{source}: {records} records");
//!     }
//! }
//!
//! let cb: Arc<dyn GenerationProgressCallback> =
//!     Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//! cb.on_document_complete("a.txt", 4);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

// ── Counters ─────────────────────────────────────────────────────────────

/// A consistent copy of the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total_files: usize,
    pub processed_files: usize,
    pub total_questions: usize,
    pub generated_questions: usize,
}

/// Run counters behind a single mutex.
///
/// Counters only grow during a run. [`Progress::reset`] is called by the
/// coordinator at run start and nowhere else; [`Progress::reconcile_generated`]
/// sets the final record count once the result has been truncated.
#[derive(Debug, Default)]
pub struct Progress {
    inner: Mutex<ProgressSnapshot>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProgressSnapshot> {
        // A panic while holding the guard cannot leave the counters torn.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn reset(&self, total_files: usize, total_questions: usize) {
        *self.lock() = ProgressSnapshot {
            total_files,
            processed_files: 0,
            total_questions,
            generated_questions: 0,
        };
    }

    /// One document finished (successfully or not) with `generated` records.
    pub(crate) fn record_file(&self, generated: usize) {
        let mut p = self.lock();
        p.processed_files += 1;
        p.generated_questions += generated;
    }

    /// Records produced outside the per-document pool.
    pub(crate) fn record_generated(&self, generated: usize) {
        self.lock().generated_questions += generated;
    }

    pub(crate) fn reconcile_generated(&self, final_count: usize) {
        self.lock().generated_questions = final_count;
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.lock()
    }
}

// ── Conversion callbacks ─────────────────────────────────────────────────

/// Events emitted while PDFs are converted to cleaned text.
///
/// With `chunk_concurrency > 1` or batch conversion, methods may be called
/// concurrently from different tasks.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once per document after chunking.
    fn on_document_start(&self, source: &str, total_chunks: usize) {
        let _ = (source, total_chunks);
    }

    /// Called when a chunk has been cleaned.
    ///
    /// # Arguments
    /// * `chunk_index` — 0-based chunk index
    /// * `fallback`    — true when the local cleaner produced the text
    fn on_chunk_complete(&self, source: &str, chunk_index: usize, total_chunks: usize, fallback: bool) {
        let _ = (source, chunk_index, total_chunks, fallback);
    }

    fn on_document_complete(&self, source: &str, chars: usize) {
        let _ = (source, chars);
    }

    fn on_document_error(&self, source: &str, error: &str) {
        let _ = (source, error);
    }
}

// ── Generation callbacks ─────────────────────────────────────────────────

/// Events emitted by [`crate::generate::QaGenerator`].
pub trait GenerationProgressCallback: Send + Sync {
    fn on_run_start(&self, total_files: usize, requested_total: usize) {
        let _ = (total_files, requested_total);
    }

    /// Fired when the worker pool is created. Never fired for
    /// single-document runs.
    fn on_pool_start(&self, workers: usize, per_document: usize) {
        let _ = (workers, per_document);
    }

    fn on_document_start(&self, source: &str) {
        let _ = source;
    }

    fn on_document_complete(&self, source: &str, records: usize) {
        let _ = (source, records);
    }

    /// A worker task panicked or otherwise failed to report back.
    fn on_document_error(&self, source: &str, error: &str) {
        let _ = (source, error);
    }

    fn on_cross_synthesis_start(&self, requested: usize) {
        let _ = requested;
    }

    fn on_run_complete(&self, records: usize) {
        let _ = records;
    }
}

/// A no-op implementation of both callback traits.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}
impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type stored by [`crate::convert::PdfDocumentProcessor`].
pub type ConversionCallback = Arc<dyn ConversionProgressCallback>;

/// Convenience alias for the type stored by [`crate::generate::QaGenerator`].
pub type GenerationCallback = Arc<dyn GenerationProgressCallback>;
