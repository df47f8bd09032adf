//! Page sanitiser: strips non-body text from raw extracted pages.
//!
//! PDF text layers carry everything printed on the page: running headers,
//! page numbers, table cells, figure captions, reference lists. None of that
//! is useful to the cleaning model, and all of it costs tokens. Three
//! passes run per page, in order:
//!
//! 1. [`TextSanitizer::remove_header_footer`] — leading/trailing decoration
//! 2. [`TextSanitizer::filter_non_content`] — line-level exclusion predicates
//! 3. [`TextSanitizer::format_text_structure`] — blank lines around titles
//!
//! Every pass accepts empty input, never panics, and treats a line it cannot
//! classify as body content.

use crate::config::SanitizerConfig;
use crate::output::RawPage;
use once_cell::sync::Lazy;
use regex::Regex;

/// Heuristic line classifier for one page of extracted text.
#[derive(Debug, Clone, Default)]
pub struct TextSanitizer {
    config: SanitizerConfig,
}

impl TextSanitizer {
    pub fn new(config: SanitizerConfig) -> Self {
        Self { config }
    }

    /// Run all three passes over one page.
    pub fn sanitize_page(&self, page: &RawPage) -> String {
        let s = self.remove_header_footer(&page.text, page.page_number);
        let s = self.filter_non_content(&s);
        self.format_text_structure(&s)
    }

    // ── Pass 1: Headers and footers ──────────────────────────────────────

    /// Strip running headers from the top and page numbers from the bottom.
    ///
    /// Only the first and last `edge_lines` lines are examined. Everything up
    /// to the last qualifying header line is removed, and everything from
    /// the first qualifying footer line onwards. Pages of two lines or fewer
    /// are returned unchanged.
    pub fn remove_header_footer(&self, text: &str, page_number: usize) -> String {
        if text.is_empty() {
            return String::new();
        }
        let lines: Vec<&str> = text.split('\n').collect();
        if lines.len() <= 2 {
            return text.to_string();
        }

        let edge = self.config.edge_lines.min(lines.len());

        let mut start = 0;
        for (i, line) in lines.iter().take(edge).enumerate() {
            if self.is_header_line(line.trim()) {
                start = i + 1;
            }
        }

        let mut end = lines.len();
        for i in (lines.len() - edge..lines.len()).rev() {
            if i < start {
                break;
            }
            if self.is_footer_line(lines[i].trim()) {
                end = i;
            }
        }

        if start == 0 && end == lines.len() {
            return text.to_string();
        }
        tracing::trace!(
            "Page {}: stripped {} header and {} footer lines",
            page_number,
            start,
            lines.len() - end
        );
        lines[start..end.max(start)].join("\n")
    }

    fn is_header_line(&self, line: &str) -> bool {
        let len = line.chars().count();
        if len < 2 {
            return false;
        }
        (len < self.config.header_year_max_chars && RE_YEAR.is_match(line))
            || RE_CHAPTER_HEADING.is_match(line)
            || (len < self.config.header_caps_max_chars && is_all_upper(line))
            || (len < self.config.header_caps_max_chars && RE_HEADER_MARKER.is_match(line))
    }

    fn is_footer_line(&self, line: &str) -> bool {
        if line.chars().count() < 2 {
            return false;
        }
        RE_BARE_NUMBER.is_match(line)
            || RE_DECORATED_NUMBER.is_match(line)
            || RE_PAGE_FRACTION.is_match(line)
            || RE_PAGE_MARKER.is_match(line)
    }

    // ── Pass 2: Non-content lines ────────────────────────────────────────

    /// Drop table, figure, reference, boilerplate and code lines.
    ///
    /// Lines are trimmed; empty and very short lines go. A line is dropped
    /// when any predicate fires, so predicate order is irrelevant.
    pub fn filter_non_content(&self, text: &str) -> String {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| line.chars().count() >= self.config.min_line_chars)
            .filter(|line| !is_non_content(line))
            .filter(|line| symbol_ratio(line) <= self.config.max_symbol_ratio)
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ── Pass 3: Title spacing ────────────────────────────────────────────

    /// Put a blank line before and after every detected title and collapse
    /// blank runs to one. Leading and trailing blanks are dropped.
    pub fn format_text_structure(&self, text: &str) -> String {
        let mut out: Vec<&str> = Vec::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if self.is_title(line) {
                push_blank(&mut out);
                out.push(line);
                push_blank(&mut out);
            } else {
                out.push(line);
            }
        }
        while out.last() == Some(&"") {
            out.pop();
        }
        out.join("\n")
    }

    /// Whether `line` looks like a section title.
    pub fn is_title(&self, line: &str) -> bool {
        let len = line.chars().count();
        if len == 0 || len >= self.config.title_max_chars {
            return false;
        }
        if TITLE_INDICATORS.iter().any(|re| re.is_match(line)) {
            return true;
        }
        len < self.config.short_title_chars && !RE_SENTENCE_PUNCT.is_match(line)
    }
}

fn push_blank<'a>(out: &mut Vec<&'a str>) {
    if matches!(out.last(), Some(last) if !last.is_empty()) {
        out.push("");
    }
}

/// Has at least one cased letter and no lower-case ones.
fn is_all_upper(line: &str) -> bool {
    line.chars().any(char::is_uppercase) && !line.chars().any(char::is_lowercase)
}

fn symbol_ratio(line: &str) -> f64 {
    let total = line.chars().count();
    if total == 0 {
        return 0.0;
    }
    let symbols = line.chars().filter(|c| "|+=-*/><{}".contains(*c)).count();
    symbols as f64 / total as f64
}

fn is_non_content(line: &str) -> bool {
    NON_CONTENT.iter().any(|re| re.is_match(line))
}

// ── Patterns ─────────────────────────────────────────────────────────────

static RE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}\b").unwrap());

static RE_CHAPTER_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:第[一二三四五六七八九十百\d]+[章节条]|chapter\s+\d+)").unwrap()
});

static RE_HEADER_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:report|paper|abstract|contents)\b|报告|论文|摘要|目录|致谢").unwrap()
});

static RE_BARE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

static RE_DECORATED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-–—•·\s]*\d+[-–—•·\s]*$").unwrap());

static RE_PAGE_FRACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\s*/\s*\d+$").unwrap());

static RE_PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bpage\b|页码|第\s*\d+\s*页").unwrap());

static NON_CONTENT: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Tables
        r"[\u{2500}-\u{257F}]",
        r"\+-+\+",
        r"\|.*\|",
        r"(?i)^(?:table|表格?)\s*\d+",
        // Figures
        r"(?i)^(?:figure|fig\.?|图表?|图片)\s*\d+",
        // References
        r"\[\d+(?:\s*[,\u{2013}-]\s*\d+)*\]",
        r"(?i)\b(?:references|bibliography)\b|参考文献|参考书目",
        // Boilerplate
        r"(?i)©|\bcopyright\b|版权|\bconfidential\b|机密",
        // Source code
        r"^(?:def|class|function)\s+\w+",
        r"^import\s+[\w.]+",
        r"^return\b.*;\s*$",
        r"#include\b",
        // Links and paths
        r"(?i)https?://|\bwww\.",
        r"[A-Za-z]:\\",
        r"(?:^|\s)/(?:[\w.-]+/)+[\w.-]*",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static TITLE_INDICATORS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^第[一二三四五六七八九十百\d]+[章节条]",
        r"^[一二三四五六七八九十]+、",
        r"^\d+(?:\.\d+)*\.?\s+\S",
        r"^[A-Z][A-Z\s]{5,}",
        r"^(?:摘要|目录|引言|前言|结论|参考文献|致谢)",
        r"(?i)^(?:abstract|introduction|conclusions?|references|acknowledge?ments?)\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static RE_SENTENCE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.,;!?。，；！？]").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> TextSanitizer {
        TextSanitizer::default()
    }

    fn body(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("Body sentence number {i} describes the results in detail."))
            .collect()
    }

    #[test]
    fn test_header_and_footer_stripped() {
        let mut lines = vec!["2023 Annual Report".to_string()];
        lines.extend(body(8));
        lines.push("- 7 -".to_string());
        let page = lines.join("\n");

        let out = sanitizer().remove_header_footer(&page, 7);
        let expected = body(8).join("\n");
        assert_eq!(out, expected);
    }

    #[test]
    fn test_short_page_unchanged() {
        let page = "2023 Annual Report\n- 7 -";
        assert_eq!(sanitizer().remove_header_footer(page, 1), page);
    }

    #[test]
    fn test_interior_lines_untouched() {
        let mut lines = body(3);
        lines.push("42".to_string());
        lines.push("2019 results".to_string());
        lines.extend(body(3));
        let page = lines.join("\n");
        assert_eq!(sanitizer().remove_header_footer(&page, 3), page);
    }

    #[test]
    fn test_footer_fraction_and_page_word() {
        let mut lines = body(5);
        lines.push("Page 3".to_string());
        lines.push("3/12".to_string());
        let out = sanitizer().remove_header_footer(&lines.join("\n"), 3);
        assert_eq!(out, body(5).join("\n"));
    }

    #[test]
    fn test_chinese_chapter_header() {
        let mut lines = vec!["第三章 实证分析".to_string()];
        lines.extend(body(4));
        let out = sanitizer().remove_header_footer(&lines.join("\n"), 1);
        assert_eq!(out, body(4).join("\n"));
    }

    #[test]
    fn test_empty_input() {
        let s = sanitizer();
        assert_eq!(s.remove_header_footer("", 1), "");
        assert_eq!(s.filter_non_content(""), "");
        assert_eq!(s.format_text_structure(""), "");
        assert_eq!(s.sanitize_page(&RawPage::new(1, "")), "");
    }

    #[test]
    fn test_filter_drops_tables_figures_refs() {
        let text = "\
Real paragraph text that should survive.
| a | b | c |
+-----+-----+
Table 2: Summary statistics
Figure 3. Price trends over time
[12] Smith, J. Some cited work.
References
Copyright 2021 Elsevier Ltd.
def compute(x):
See https://example.org for data.
Stored under /usr/local/share/data files.
x=y+z-w*v/u
abc
Another real paragraph with enough words.";
        let out = sanitizer().filter_non_content(text);
        assert_eq!(
            out,
            "Real paragraph text that should survive.\nAnother real paragraph with enough words."
        );
    }

    #[test]
    fn test_filter_keeps_prose_with_numbers() {
        let text = "GDP grew by 3.5 percent in 2019 according to estimates.";
        assert_eq!(sanitizer().filter_non_content(text), text);
    }

    #[test]
    fn test_filter_chinese_caption() {
        let text = "图 1 样本分布\n气候变化对农业产出具有显著的负面影响。";
        assert_eq!(
            sanitizer().filter_non_content(text),
            "气候变化对农业产出具有显著的负面影响。"
        );
    }

    #[test]
    fn test_title_detection() {
        let s = sanitizer();
        assert!(s.is_title("1. Introduction"));
        assert!(s.is_title("第二章 文献综述"));
        assert!(s.is_title("METHODOLOGY AND DATA"));
        assert!(s.is_title("摘要"));
        assert!(s.is_title("Results and discussion"));
        assert!(!s.is_title("This sentence ends with a period, so it is body text."));
    }

    #[test]
    fn test_format_inserts_single_blank_lines() {
        let text = "1. Introduction\nClimate shocks reduce yields, as many studies report.\n\n\n2. Data\nWe use county panels, covering two decades.";
        let out = sanitizer().format_text_structure(text);
        assert_eq!(
            out,
            "1. Introduction\n\nClimate shocks reduce yields, as many studies report.\n\n2. Data\n\nWe use county panels, covering two decades."
        );
    }

    #[test]
    fn test_symbol_ratio() {
        assert!(symbol_ratio("a+b=c") > 0.3);
        assert_eq!(symbol_ratio(""), 0.0);
    }
}
