//! JSONL dataset output and corpus loading.
//!
//! Each output line is one training example:
//!
//! ```json
//! {"instruction": "...", "input": "<question>", "output": "<answer>", "metadata": {}}
//! ```
//!
//! Bilingual records expand to two lines, English first, sharing the
//! record's metadata.

use crate::config::LanguageMode;
use crate::error::Pdf2QaError;
use crate::output::{Corpus, QaContent, QaRecord};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One JSONL line.
#[derive(Debug, Serialize)]
struct DatasetLine<'a> {
    instruction: &'a str,
    input: &'a str,
    output: &'a str,
    metadata: &'a Map<String, Value>,
}

/// Writes QA records as instruction-tuning JSONL.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    instruction: String,
    mode: LanguageMode,
}

impl DatasetWriter {
    pub fn new(instruction: impl Into<String>, mode: LanguageMode) -> Self {
        Self {
            instruction: instruction.into(),
            mode,
        }
    }

    /// Render `records` to JSON lines (without trailing newlines).
    ///
    /// Records outside the writer's family are skipped with a warning.
    pub fn render_lines(&self, records: &[QaRecord]) -> Vec<String> {
        let mut lines = Vec::with_capacity(records.len() * 2);
        let mut skipped = 0usize;

        for record in records {
            let pairs: Vec<(&str, &str)> = match (&record.content, self.mode.is_bilingual()) {
                (
                    QaContent::Bilingual {
                        question_en,
                        answer_en,
                        question_zh,
                        answer_zh,
                    },
                    true,
                ) => vec![
                    (question_en.as_str(), answer_en.as_str()),
                    (question_zh.as_str(), answer_zh.as_str()),
                ],
                (QaContent::Monolingual { question, answer }, false) => {
                    vec![(question.as_str(), answer.as_str())]
                }
                _ => {
                    skipped += 1;
                    continue;
                }
            };

            for (input, output) in pairs {
                let line = DatasetLine {
                    instruction: &self.instruction,
                    input,
                    output,
                    metadata: &record.metadata,
                };
                match serde_json::to_string(&line) {
                    Ok(json) => lines.push(json),
                    Err(e) => warn!("Skipping unserializable record: {}", e),
                }
            }
        }

        if skipped > 0 {
            warn!(
                "Skipped {} records that do not match the {} output mode",
                skipped, self.mode
            );
        }
        lines
    }

    /// Write the dataset to any writer. Returns the number of lines.
    pub fn write_to<W: Write>(&self, records: &[QaRecord], writer: W) -> std::io::Result<usize> {
        let lines = self.render_lines(records);
        let mut out = BufWriter::new(writer);
        for line in &lines {
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(lines.len())
    }

    /// Write the dataset to `path` atomically.
    ///
    /// The data goes to a temp file in the destination directory which is
    /// then renamed over `path`, so readers never see a partial file.
    pub fn write_file(&self, records: &[QaRecord], path: &Path) -> Result<usize, Pdf2QaError> {
        let write_failed = |source: std::io::Error| Pdf2QaError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_failed)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_failed)?;
        let count = self.write_to(records, tmp.as_file_mut()).map_err(write_failed)?;
        tmp.persist(path).map_err(|e| write_failed(e.error))?;

        info!("Wrote {} lines to {}", count, path.display());
        Ok(count)
    }
}

/// Load every `*.txt` file in `dir` into a corpus keyed by file name.
///
/// Files are read in name order. A file that cannot be read as UTF-8 text is
/// logged and skipped; only a folder that cannot be listed is an error.
pub fn load_corpus(dir: &Path) -> Result<Corpus, Pdf2QaError> {
    let entries = std::fs::read_dir(dir).map_err(|e| Pdf2QaError::CorpusReadFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let mut corpus = Corpus::new();
    for path in paths {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!("Loaded {} ({} chars)", name, text.chars().count());
                corpus.insert(name, text);
            }
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    info!("Loaded {} documents from {}", corpus.len(), dir.display());
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Value {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn monolingual_line_shape() {
        let writer = DatasetWriter::new("Answer the question.", LanguageMode::English);
        let lines = writer.render_lines(&[QaRecord::monolingual("What rose?", "Prices.")]);
        assert_eq!(lines.len(), 1);
        let v = parse(&lines[0]);
        assert_eq!(v["instruction"], "Answer the question.");
        assert_eq!(v["input"], "What rose?");
        assert_eq!(v["output"], "Prices.");
        assert_eq!(v["metadata"], serde_json::json!({}));
    }

    #[test]
    fn bilingual_record_expands_english_first() {
        let mut record = QaRecord::bilingual("Q en", "A en", "问题", "答案");
        record.metadata.insert("topic".into(), Value::from("climate"));
        let writer = DatasetWriter::new("inst", LanguageMode::Bilingual);
        let lines = writer.render_lines(&[record]);
        assert_eq!(lines.len(), 2);
        assert_eq!(parse(&lines[0])["input"], "Q en");
        assert_eq!(parse(&lines[1])["output"], "答案");
        assert_eq!(parse(&lines[1])["metadata"]["topic"], "climate");
    }

    #[test]
    fn non_ascii_is_written_verbatim() {
        let writer = DatasetWriter::new("回答问题", LanguageMode::Chinese);
        let lines = writer.render_lines(&[QaRecord::monolingual("什么是碳税？", "一种税。")]);
        assert!(lines[0].contains("什么是碳税？"));
        assert!(!lines[0].contains("\\u"));
    }

    #[test]
    fn mismatched_family_is_skipped() {
        let writer = DatasetWriter::new("inst", LanguageMode::English);
        let records = vec![
            QaRecord::bilingual("a", "b", "c", "d"),
            QaRecord::monolingual("q", "a"),
        ];
        assert_eq!(writer.render_lines(&records).len(), 1);
    }

    #[test]
    fn write_file_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("qa.jsonl");
        let writer = DatasetWriter::new("inst", LanguageMode::English);

        let records = vec![QaRecord::monolingual("q1", "a1"), QaRecord::monolingual("q2", "a2")];
        assert_eq!(writer.write_file(&records, &path).unwrap(), 2);
        assert_eq!(writer.write_file(&records[..1], &path).unwrap(), 1);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.ends_with('\n'));
        // no temp files left next to the output
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn write_file_reports_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let writer = DatasetWriter::new("inst", LanguageMode::English);
        let err = writer
            .write_file(&[QaRecord::monolingual("q", "a")], &blocker.join("qa.jsonl"))
            .unwrap_err();
        assert!(matches!(err, Pdf2QaError::OutputWriteFailed { .. }));
    }

    #[test]
    fn load_corpus_reads_sorted_txt_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "second").unwrap();
        std::fs::write(dir.path().join("a.txt"), "first").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        std::fs::write(dir.path().join("bad.txt"), b"\xff\xfe\x00").unwrap();

        let corpus = load_corpus(dir.path()).unwrap();
        let names: Vec<&str> = corpus.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(corpus["a.txt"], "first");
    }

    #[test]
    fn load_corpus_missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_corpus(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Pdf2QaError::CorpusReadFailed { .. }));
    }
}
