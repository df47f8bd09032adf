//! PDF text extraction: per-page text layer via pdfium.
//!
//! Extraction is a black box to the rest of the pipeline: given a path it
//! returns the pages it could read, or nothing. Errors are logged here and
//! never propagated, so a corrupt PDF degrades to
//! [`crate::error::DocumentError::ExtractionFailed`] for that document only.
//!
//! pdfium is a blocking C library with thread-local state, so
//! [`extract_pages`] runs the extractor on Tokio's blocking pool.

use crate::output::RawPage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of per-page text for a PDF.
pub trait PageExtractor: Send + Sync {
    /// Text of every page in order. Empty when the file cannot be read.
    fn extract(&self, path: &Path, password: Option<&str>) -> Vec<RawPage>;
}

/// Text-layer extraction with `pdfium-render`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumExtractor;

impl PageExtractor for PdfiumExtractor {
    fn extract(&self, path: &Path, password: Option<&str>) -> Vec<RawPage> {
        let pdfium = Pdfium::default();

        let document = match pdfium.load_pdf_from_file(path, password) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("{}: failed to open PDF: {:?}", path.display(), e);
                return Vec::new();
            }
        };

        let mut pages = Vec::new();
        for (idx, page) in document.pages().iter().enumerate() {
            match page.text() {
                Ok(text) => pages.push(RawPage::new(idx + 1, text.all())),
                Err(e) => {
                    // One unreadable page keeps its slot so numbering stays aligned.
                    warn!("{}: page {} has no readable text: {:?}", path.display(), idx + 1, e);
                    pages.push(RawPage::new(idx + 1, String::new()));
                }
            }
        }

        if pages.iter().all(|p| p.text.trim().is_empty()) {
            debug!("{}: no text layer on any page", path.display());
            return Vec::new();
        }
        pages
    }
}

/// Run `extractor` on the blocking pool.
pub async fn extract_pages(
    extractor: Arc<dyn PageExtractor>,
    path: &Path,
    password: Option<String>,
) -> Vec<RawPage> {
    let owned: PathBuf = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        extractor.extract(&owned, password.as_deref())
    })
    .await;

    match result {
        Ok(pages) => pages,
        Err(e) => {
            warn!("{}: extraction task panicked: {}", path.display(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Panicking;

    impl PageExtractor for Panicking {
        fn extract(&self, _path: &Path, _password: Option<&str>) -> Vec<RawPage> {
            panic!("pdfium exploded");
        }
    }

    struct Fixed;

    impl PageExtractor for Fixed {
        fn extract(&self, _path: &Path, password: Option<&str>) -> Vec<RawPage> {
            vec![RawPage::new(1, password.unwrap_or("no password"))]
        }
    }

    #[tokio::test]
    async fn panicking_extractor_yields_no_pages() {
        let pages = extract_pages(Arc::new(Panicking), Path::new("x.pdf"), None).await;
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn password_is_forwarded() {
        let pages = extract_pages(Arc::new(Fixed), Path::new("x.pdf"), Some("s3cret".into())).await;
        assert_eq!(pages, vec![RawPage::new(1, "s3cret")]);
    }
}
