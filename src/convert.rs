//! PDF → cleaned text conversion.
//!
//! [`PdfDocumentProcessor::process`] turns one PDF into a
//! [`CleanedDocument`]; [`PdfDocumentProcessor::convert_to_dir`] also writes
//! it to `<title>.txt`, and [`PdfDocumentProcessor::convert_batch`] does that
//! for many PDFs at once.
//!
//! A failed document is reported as a [`DocumentError`] next to its path and
//! never stops the rest of a batch.

use crate::config::ConversionConfig;
use crate::error::{DocumentError, Pdf2QaError};
use crate::output::{CleanedDocument, ConversionOutcome, DocumentStats, RawPage, TextChunk};
use crate::pipeline::chunk::{join_pages, split};
use crate::pipeline::extract::{extract_pages, PageExtractor, PdfiumExtractor};
use crate::pipeline::llm::CompletionClient;
use crate::pipeline::postprocess::{count_math_expressions, final_format, local_clean};
use crate::pipeline::sanitize::TextSanitizer;
use crate::progress::{ConversionCallback, NoopProgressCallback};
use crate::prompts::{cleaning_prompt, title_prompt, CLEANING_SYSTEM_PROMPT, TITLE_SYSTEM_PROMPT};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Output token cap for the title request.
const TITLE_MAX_TOKENS: usize = 200;

/// Longest file stem produced by [`sanitize_filename`].
const MAX_FILENAME_CHARS: usize = 100;

/// Converts PDFs to cleaned text.
pub struct PdfDocumentProcessor {
    extractor: Arc<dyn PageExtractor>,
    client: Option<CompletionClient>,
    sanitizer: TextSanitizer,
    config: ConversionConfig,
    callback: ConversionCallback,
}

impl PdfDocumentProcessor {
    /// Build a processor with the pdfium extractor and a provider resolved
    /// from `config.completion`.
    ///
    /// No provider is needed (or resolved) when both `ai_cleaning` and
    /// `extract_title` are off.
    pub fn new(config: ConversionConfig) -> Result<Self, Pdf2QaError> {
        let client = if config.ai_cleaning || config.extract_title {
            Some(CompletionClient::from_settings(config.completion.clone())?)
        } else {
            None
        };
        Ok(Self::with_client(config, client))
    }

    /// Build a processor around an existing client (or none).
    pub fn with_client(config: ConversionConfig, client: Option<CompletionClient>) -> Self {
        Self {
            extractor: Arc::new(PdfiumExtractor),
            client,
            sanitizer: TextSanitizer::new(config.sanitizer.clone()),
            config,
            callback: Arc::new(NoopProgressCallback),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PageExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_callback(mut self, callback: ConversionCallback) -> Self {
        self.callback = callback;
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert one PDF to cleaned text.
    ///
    /// # Errors
    /// - [`DocumentError::ExtractionFailed`] when the file is missing or has
    ///   no extractable text
    /// - [`DocumentError::NoContent`] when every chunk came back empty
    pub async fn process(&self, pdf_path: &Path) -> Result<CleanedDocument, DocumentError> {
        let result = self.process_inner(pdf_path).await;
        if let Err(ref e) = result {
            warn!("{}", e);
            self.callback
                .on_document_error(&source_name(pdf_path), &e.to_string());
        }
        result
    }

    async fn process_inner(&self, pdf_path: &Path) -> Result<CleanedDocument, DocumentError> {
        let start = Instant::now();
        let source = source_name(pdf_path);
        info!("Converting {}", pdf_path.display());

        // ── Step 1: Extract pages ────────────────────────────────────────
        if !pdf_path.is_file() {
            warn!("{}: file not found", pdf_path.display());
            return Err(DocumentError::ExtractionFailed {
                source_name: source,
            });
        }
        let pages = extract_pages(
            Arc::clone(&self.extractor),
            pdf_path,
            self.config.password.clone(),
        )
        .await;
        if pages.is_empty() {
            return Err(DocumentError::ExtractionFailed {
                source_name: source,
            });
        }
        debug!("{}: {} pages extracted", source, pages.len());

        // ── Step 2: Sanitize and chunk ───────────────────────────────────
        let page_texts: Vec<(usize, String)> = pages
            .iter()
            .map(|p| {
                let text = if self.config.sanitize {
                    self.sanitizer.sanitize_page(p)
                } else {
                    p.text.clone()
                };
                (p.page_number, text)
            })
            .collect();
        let joined = join_pages(page_texts.iter().map(|(n, t)| (*n, t.as_str())));
        let chunks = split(&joined, self.config.max_chunk_size);
        let total_chunks = chunks.len();
        self.callback.on_document_start(&source, total_chunks);
        debug!("{}: {} chunks", source, total_chunks);

        // ── Step 3: Clean chunks ─────────────────────────────────────────
        let mut cleaned: Vec<(usize, String, bool)> = stream::iter(chunks)
            .map(|chunk| self.clean_chunk(&source, chunk, total_chunks))
            .buffer_unordered(self.config.chunk_concurrency.max(1))
            .collect()
            .await;
        cleaned.sort_by_key(|(index, _, _)| *index);

        let fallback_chunks = cleaned.iter().filter(|(_, _, fallback)| *fallback).count();
        if cleaned.iter().all(|(_, text, _)| text.trim().is_empty()) {
            return Err(DocumentError::NoContent {
                source_name: source,
                chunks: total_chunks,
            });
        }

        // ── Step 4: Assemble and format ──────────────────────────────────
        let body = cleaned
            .into_iter()
            .map(|(_, text, _)| text)
            .collect::<Vec<_>>()
            .join("\n\n");
        let text = final_format(&body);
        if text.is_empty() {
            return Err(DocumentError::NoContent {
                source_name: source,
                chunks: total_chunks,
            });
        }

        // ── Step 5: Title ────────────────────────────────────────────────
        let title = self.extract_title(&pages, pdf_path).await;

        let stats = DocumentStats {
            pages: pages.len(),
            chunks: total_chunks,
            fallback_chunks,
            chars: text.chars().count(),
            words: text.split_whitespace().count(),
            lines: text.lines().count(),
            math_expressions: count_math_expressions(&text),
        };

        info!(
            "{}: {} chars from {} pages ({} of {} chunks by fallback) in {}ms",
            source,
            stats.chars,
            stats.pages,
            fallback_chunks,
            total_chunks,
            start.elapsed().as_millis()
        );
        self.callback.on_document_complete(&source, stats.chars);

        Ok(CleanedDocument {
            source,
            title,
            text,
            stats,
        })
    }

    /// Clean one chunk. Returns `(index, text, used_fallback)`.
    async fn clean_chunk(
        &self,
        source: &str,
        chunk: TextChunk,
        total_chunks: usize,
    ) -> (usize, String, bool) {
        let index = chunk.index;

        let (text, fallback) = if !self.config.ai_cleaning {
            (chunk.text, false)
        } else if let Some(ref client) = self.client {
            match client
                .complete_text(CLEANING_SYSTEM_PROMPT, &cleaning_prompt(&chunk.text))
                .await
            {
                Ok(out) if out.chars().count() >= self.config.min_chunk_output_chars => {
                    (out, false)
                }
                Ok(out) => {
                    warn!(
                        "{}: chunk {}/{} cleaned to {} chars, using local cleaner",
                        source,
                        index + 1,
                        total_chunks,
                        out.chars().count()
                    );
                    (local_clean(&chunk.text), true)
                }
                Err(e) => {
                    warn!(
                        "{}: chunk {}/{} cleaning failed ({}), using local cleaner",
                        source,
                        index + 1,
                        total_chunks,
                        e
                    );
                    (local_clean(&chunk.text), true)
                }
            }
        } else {
            (local_clean(&chunk.text), true)
        };

        self.callback
            .on_chunk_complete(source, index, total_chunks, fallback);
        (index, text, fallback)
    }

    /// Paper title for naming the output file.
    ///
    /// Asks the model about the first two pages when title extraction is on;
    /// falls back to the cleaned file stem.
    pub async fn extract_title(&self, pages: &[RawPage], pdf_path: &Path) -> String {
        let fallback = filename_title(pdf_path);
        let client = match self.client {
            Some(ref client) if self.config.extract_title => client,
            _ => return fallback,
        };

        let excerpt = pages
            .iter()
            .take(2)
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if excerpt.trim().is_empty() {
            return fallback;
        }

        match client
            .with_max_tokens(TITLE_MAX_TOKENS)
            .complete_text(TITLE_SYSTEM_PROMPT, &title_prompt(&excerpt))
            .await
        {
            Ok(raw) => match clean_title_response(&raw) {
                Some(title) => title,
                None => {
                    debug!("Rejected title response {:?}", raw);
                    fallback
                }
            },
            Err(e) => {
                warn!("{}: title extraction failed: {}", pdf_path.display(), e);
                fallback
            }
        }
    }

    /// Convert one PDF and write it to `<out_dir>/<title>.txt`.
    ///
    /// An existing file is never overwritten: `_1`, `_2`, … is appended to
    /// the stem until the name is free.
    pub async fn convert_to_dir(&self, pdf_path: &Path, out_dir: &Path) -> ConversionOutcome {
        let input = pdf_path.to_path_buf();
        let document = match self.process(pdf_path).await {
            Ok(doc) => doc,
            Err(e) => {
                return ConversionOutcome {
                    input,
                    output: None,
                    result: Err(e),
                }
            }
        };

        let mut stem = sanitize_filename(&document.title);
        if stem.is_empty() {
            stem = sanitize_filename(&filename_title(pdf_path));
        }
        if stem.is_empty() {
            stem = "document".to_string();
        }

        let dir = out_dir.to_path_buf();
        let text = document.text.clone();
        let written = tokio::task::spawn_blocking(move || write_unique(&dir, &stem, &text)).await;

        let detail = match written {
            Ok(Ok(path)) => {
                info!("{} → {}", pdf_path.display(), path.display());
                return ConversionOutcome {
                    input,
                    output: Some(path),
                    result: Ok(document),
                };
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("write task failed: {e}"),
        };

        let error = DocumentError::WriteFailed {
            source_name: document.source,
            path: out_dir.to_path_buf(),
            detail,
        };
        warn!("{}", error);
        self.callback
            .on_document_error(&source_name(pdf_path), &error.to_string());
        ConversionOutcome {
            input,
            output: None,
            result: Err(error),
        }
    }

    /// Convert many PDFs into `out_dir`, `config.concurrency` at a time.
    ///
    /// Outcomes are returned in input order.
    pub async fn convert_batch(&self, paths: &[PathBuf], out_dir: &Path) -> Vec<ConversionOutcome> {
        let start = Instant::now();
        info!(
            "Converting {} PDFs ({} at a time)",
            paths.len(),
            self.config.concurrency
        );

        let mut outcomes: Vec<(usize, ConversionOutcome)> = stream::iter(paths.iter().enumerate())
            .map(|(i, path)| async move { (i, self.convert_to_dir(path, out_dir).await) })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(i, _)| *i);

        let ok = outcomes.iter().filter(|(_, o)| o.is_success()).count();
        info!(
            "Batch complete: {}/{} documents in {:.1}s",
            ok,
            paths.len(),
            start.elapsed().as_secs_f64()
        );
        outcomes.into_iter().map(|(_, o)| o).collect()
    }
}

// ── Naming helpers ───────────────────────────────────────────────────────

static RE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^["'“”‘’《](.*)["'“”‘’》]$"#).unwrap());
static RE_TITLE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:标题|(?i:title))[:：]\s*").unwrap());
static RE_NOT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static RE_ILLEGAL_FILENAME: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Clean a model's title answer. `None` when it does not look like a title.
pub fn clean_title_response(raw: &str) -> Option<String> {
    let title = raw.trim();
    let title = RE_QUOTED.replace(title, "$1");
    let title = RE_TITLE_PREFIX.replace(&title, "");
    let title = title.trim();

    let len = title.chars().count();
    let apology = title.starts_with("抱歉") || title.starts_with("I cannot");
    if len > 10 && len < 200 && !apology {
        Some(title.to_string())
    } else {
        None
    }
}

/// The file stem with everything but word characters, spaces and dashes removed.
pub fn filename_title(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    RE_NOT_WORD.replace_all(&stem, "").trim().to_string()
}

/// Make `title` safe to use as a file stem.
pub fn sanitize_filename(title: &str) -> String {
    let s = RE_ILLEGAL_FILENAME.replace_all(title, "_");
    let s = RE_WHITESPACE.replace_all(&s, " ");
    let s = s.trim();
    match s.char_indices().nth(MAX_FILENAME_CHARS) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Write `text` to the first free `<stem>[_N].txt` in `dir`, atomically.
fn write_unique(dir: &Path, stem: &str, text: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.flush()?;

    let mut counter = 0usize;
    loop {
        let name = if counter == 0 {
            format!("{stem}.txt")
        } else {
            format!("{stem}_{counter}.txt")
        };
        let candidate = dir.join(name);
        match tmp.persist_noclobber(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                tmp = e.file;
                counter += 1;
            }
            Err(e) => return Err(e.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_response_cleanup() {
        assert_eq!(
            clean_title_response("\"Carbon Pricing and Crop Yields\"").as_deref(),
            Some("Carbon Pricing and Crop Yields")
        );
        assert_eq!(
            clean_title_response("Title: Carbon Pricing and Crop Yields").as_deref(),
            Some("Carbon Pricing and Crop Yields")
        );
        assert_eq!(
            clean_title_response("标题：气候变化对农业产量的影响研究").as_deref(),
            Some("气候变化对农业产量的影响研究")
        );
    }

    #[test]
    fn title_response_rejections() {
        assert_eq!(clean_title_response("Short"), None);
        assert_eq!(
            clean_title_response("I cannot determine the title from this text."),
            None
        );
        assert_eq!(clean_title_response(&"x".repeat(250)), None);
    }

    #[test]
    fn filename_title_drops_punctuation() {
        assert_eq!(
            filename_title(Path::new("/tmp/smith (2021), draft!.pdf")),
            "smith 2021 draft"
        );
    }

    #[test]
    fn sanitize_filename_rules() {
        assert_eq!(sanitize_filename("A/B: C?  \t D"), "A_B_ C_ D");
        let long = "word ".repeat(40);
        assert!(sanitize_filename(&long).chars().count() <= MAX_FILENAME_CHARS);
    }

    #[test]
    fn write_unique_adds_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_unique(dir.path(), "paper", "one").unwrap();
        let second = write_unique(dir.path(), "paper", "two").unwrap();
        let third = write_unique(dir.path(), "paper", "three").unwrap();
        assert_eq!(first.file_name().unwrap(), "paper.txt");
        assert_eq!(second.file_name().unwrap(), "paper_1.txt");
        assert_eq!(third.file_name().unwrap(), "paper_2.txt");
        assert_eq!(std::fs::read_to_string(first).unwrap(), "one");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
