//! Data types flowing between pipeline stages.
//!
//! Everything here is plain data: produced by one stage, consumed by the
//! next, and serializable so callers can persist intermediate results.

use crate::error::DocumentError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Ordered mapping from source filename to cleaned text.
pub type Corpus = BTreeMap<String, String>;

/// Text of one PDF page as returned by the extraction primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPage {
    /// 1-indexed.
    pub page_number: usize,
    pub text: String,
}

impl RawPage {
    pub fn new(page_number: usize, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// A bounded slice of a document, sent to the cleaner as one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based position in the document.
    pub index: usize,
    pub text: String,
}

impl TextChunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Statistics about a cleaned document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Pages returned by the extractor.
    pub pages: usize,
    /// Chunks sent for cleaning.
    pub chunks: usize,
    /// Chunks cleaned by the local rule-based cleaner instead of the model.
    pub fallback_chunks: usize,
    pub chars: usize,
    pub words: usize,
    pub lines: usize,
    /// `$…$` and `$$…$$` spans in the final text.
    pub math_expressions: usize,
}

/// The cleaned text of one PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedDocument {
    /// Source filename, e.g. `paper.pdf`.
    pub source: String,
    /// Title used to name the output file.
    pub title: String,
    pub text: String,
    pub stats: DocumentStats,
}

/// Outcome of converting one document in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub input: PathBuf,
    /// Where the text was written, when it was written.
    pub output: Option<PathBuf>,
    pub result: Result<CleanedDocument, DocumentError>,
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of a corpus: what it is about, computed once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainProfile {
    pub primary_domains: Vec<String>,
    pub primary_themes: Vec<String>,
    pub top_keywords: Vec<String>,
    pub document_count: usize,
}

impl Default for DomainProfile {
    fn default() -> Self {
        Self {
            primary_domains: vec!["general research".into()],
            primary_themes: vec!["general study".into()],
            top_keywords: Vec::new(),
            document_count: 0,
        }
    }
}

/// The question/answer payload of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QaContent {
    Bilingual {
        question_en: String,
        answer_en: String,
        question_zh: String,
        answer_zh: String,
    },
    Monolingual {
        question: String,
        answer: String,
    },
}

/// One question/answer record with its (currently always empty) metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    #[serde(flatten)]
    pub content: QaContent,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl QaRecord {
    pub fn monolingual(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            content: QaContent::Monolingual {
                question: question.into(),
                answer: answer.into(),
            },
            metadata: Map::new(),
        }
    }

    pub fn bilingual(
        question_en: impl Into<String>,
        answer_en: impl Into<String>,
        question_zh: impl Into<String>,
        answer_zh: impl Into<String>,
    ) -> Self {
        Self {
            content: QaContent::Bilingual {
                question_en: question_en.into(),
                answer_en: answer_en.into(),
                question_zh: question_zh.into(),
                answer_zh: answer_zh.into(),
            },
            metadata: Map::new(),
        }
    }

    pub fn is_bilingual(&self) -> bool {
        matches!(self.content, QaContent::Bilingual { .. })
    }
}

/// Everything a generation run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub records: Vec<QaRecord>,
    pub profile: DomainProfile,
    pub progress: crate::progress::ProgressSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_flat() {
        let r = QaRecord::monolingual("Q?", "A.");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["question"], "Q?");
        assert_eq!(v["answer"], "A.");
        assert!(v["metadata"].as_object().unwrap().is_empty());
    }

    #[test]
    fn bilingual_record_round_trips_through_serde() {
        let r = QaRecord::bilingual("Q", "A", "问", "答");
        let s = serde_json::to_string(&r).unwrap();
        let back: QaRecord = serde_json::from_str(&s).unwrap();
        assert!(back.is_bilingual());
        assert_eq!(back, r);
    }

    #[test]
    fn default_profile_names_general_labels() {
        let p = DomainProfile::default();
        assert_eq!(p.primary_domains, vec!["general research".to_string()]);
        assert_eq!(p.primary_themes, vec!["general study".to_string()]);
    }
}
