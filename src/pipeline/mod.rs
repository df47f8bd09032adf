//! Pipeline stages shared by PDF cleaning and QA generation.
//!
//! Each submodule implements one transformation step and is testable on its
//! own.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ sanitize ──▶ chunk ──▶ llm ──▶ postprocess
//! (pdfium)    (heuristics)  (pages)   (clean)  (final format)
//!
//!                            prompt ──▶ llm ──▶ normalize
//!                                       (QA)    (records)
//! ```
//!
//! 1. [`extract`]     — per-page text layer; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 2. [`sanitize`]    — strip headers, footers, tables, captions, references
//! 3. [`chunk`]       — page-aligned chunks under a character budget
//! 4. [`llm`]         — the completion seam with timeout and retry; the only
//!    stage with network I/O
//! 5. [`postprocess`] — fence stripping, local fallback cleaner, math
//!    delimiter repair
//! 6. [`normalize`]   — heterogeneous JSON responses → QA records

pub mod chunk;
pub mod extract;
pub mod llm;
pub mod normalize;
pub mod postprocess;
pub mod sanitize;
