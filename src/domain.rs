//! Corpus analysis: dominant research domains, themes and keywords.
//!
//! The profile steers prompt wording ("generate questions in the climate
//! science, agriculture field …"). It is a cheap lexical heuristic, not a
//! classifier:
//!
//! * a document is attributed a **domain** or **theme** label when at least
//!   `min_keyword_matches` distinct indicator words occur in it as
//!   substrings of the lower-cased text;
//! * **keywords** are frequent tokens of three or more Latin or CJK letters
//!   from the start of the document, minus stop words, with a bonus for
//!   tokens that also appear in the filename.
//!
//! Corpus-wide lists rank labels by how many documents carry them, ties
//! broken by first occurrence.

use crate::config::AnalyzerConfig;
use crate::output::{Corpus, DomainProfile};
use crate::prompts::truncate_chars;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

const DEFAULT_DOMAIN: &str = "general research";
const DEFAULT_THEME: &str = "general study";

static DOMAINS: &[(&str, &[&str])] = &[
    (
        "economics",
        &[
            "economic", "economy", "gdp", "market", "financial", "investment", "price", "cost",
            "income", "revenue", "profit", "trade",
        ],
    ),
    (
        "climate science",
        &[
            "climate", "temperature", "weather", "precipitation", "emission", "carbon", "warming",
            "greenhouse", "atmospheric",
        ],
    ),
    (
        "agriculture",
        &[
            "agriculture", "crop", "farm", "food", "yield", "harvest", "rural", "farming",
            "irrigation", "fertilizer",
        ],
    ),
    (
        "environmental science",
        &[
            "environment", "pollution", "sustainability", "ecology", "conservation", "ecosystem",
            "biodiversity", "environmental",
        ],
    ),
    (
        "risk management",
        &[
            "risk", "management", "mitigation", "uncertainty", "vulnerability", "resilience",
            "exposure", "hazard",
        ],
    ),
    (
        "policy analysis",
        &[
            "policy", "regulation", "governance", "intervention", "strategy", "measure",
            "implementation", "enforcement",
        ],
    ),
];

static THEMES: &[(&str, &[&str])] = &[
    (
        "impact assessment",
        &["impact", "effect", "evaluation", "assessment", "consequence", "outcome", "result"],
    ),
    (
        "mechanism analysis",
        &["mechanism", "pathway", "channel", "transmission", "causal", "causality", "mediation"],
    ),
    (
        "empirical research",
        &[
            "empirical", "evidence", "data analysis", "statistical", "regression", "estimation",
            "empirically",
        ],
    ),
    (
        "policy recommendations",
        &[
            "policy", "recommendation", "suggestion", "implication", "application", "recommend",
            "suggest",
        ],
    ),
    (
        "model building",
        &["model", "framework", "theoretical", "conceptual", "simulation", "modeling"],
    ),
];

/// Words too generic to be useful keywords even after stop-word removal.
const GENERIC_ACADEMIC: &[&str] = &[
    "analysis", "method", "results", "study", "research", "model", "data", "effect", "impact",
];

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // English
        "the", "and", "for", "with", "this", "that", "from", "have", "has", "were", "are", "was",
        "been", "being", "which", "what", "when", "where", "why", "how", "who", "whom", "whose",
        "will", "would", "could", "should", "may", "might", "must", "can", "cannot", "able",
        "about", "above", "after", "again", "against", "all", "any", "because", "before", "below",
        "between", "both", "but", "during", "each", "few", "more", "most", "other", "some", "such",
        "than", "then", "there", "these", "they", "those", "through", "until", "very", "while",
        "within", "without", "based", "using", "study", "research", "paper", "article",
        "analysis", "method", "result", "conclusion", "introduction", "abstract", "background",
        "objective", "purpose", "aim", "goal", "find", "found", "show", "showed", "demonstrate",
        "demonstrated", "indicate", "indicated", "suggest", "suggested", "reveal", "revealed",
        "provide", "provided", "present", "presented", "discuss", "discussed", "explain",
        "explained", "describe", "described", "examine", "examined", "investigate",
        "investigated", "explore", "explored", "assess", "assessed", "evaluate", "evaluated",
        "measure", "measured", "test", "tested", "model", "models", "data", "dataset", "sample",
        "samples",
        // Chinese
        "其中", "通过", "基于", "使用", "采用", "进行", "具有", "包括", "包含", "涉及", "关于",
        "对于", "因此", "所以", "然而", "但是", "虽然", "尽管", "如果", "那么", "因为", "本文",
        "本研究", "我们", "作者", "论文", "文章", "研究", "分析", "方法", "结果", "结论", "引言",
        "摘要", "背景", "目的", "目标", "发现", "表明", "证明", "显示", "揭示", "提供", "提出",
        "讨论", "解释", "描述", "考察", "调查", "探讨", "评估", "测量", "测试", "模型", "数据",
        "样本", "资料",
    ]
    .into_iter()
    .collect()
});

static RE_CONTENT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z\u{4e00}-\u{9fff}]{3,}").unwrap());

static RE_FILENAME_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z\u{4e00}-\u{9fff}]{2,}").unwrap());

/// Lexical domain/theme/keyword profiler.
#[derive(Debug, Clone, Default)]
pub struct DomainAnalyzer {
    config: AnalyzerConfig,
}

impl DomainAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Profile the whole corpus.
    pub fn analyze(&self, corpus: &Corpus) -> DomainProfile {
        let mut domains: Vec<String> = Vec::new();
        let mut themes: Vec<String> = Vec::new();
        let mut keywords: Vec<String> = Vec::new();

        for (source, content) in corpus {
            let lower = content.to_lowercase();
            let doc_domains = self.matching_labels(&lower, DOMAINS);
            let doc_themes = self.matching_labels(&lower, THEMES);
            let doc_keywords = self.extract_keywords(content, source);
            debug!(
                "{}: domains {:?}, themes {:?}, keywords {:?}",
                source, doc_domains, doc_themes, doc_keywords
            );
            domains.extend(doc_domains.into_iter().map(str::to_string));
            themes.extend(doc_themes.into_iter().map(str::to_string));
            keywords.extend(doc_keywords);
        }

        let mut primary_domains = rank(domains, self.config.top_domains);
        if primary_domains.is_empty() {
            primary_domains.push(DEFAULT_DOMAIN.to_string());
        }
        let mut primary_themes = rank(themes, self.config.top_themes);
        if primary_themes.is_empty() {
            primary_themes.push(DEFAULT_THEME.to_string());
        }

        DomainProfile {
            primary_domains,
            primary_themes,
            top_keywords: rank(keywords, self.config.top_keywords),
            document_count: corpus.len(),
        }
    }

    /// Labels whose indicator words occur at least `min_keyword_matches`
    /// times (distinct words) in the lower-cased text.
    fn matching_labels(
        &self,
        lower: &str,
        table: &'static [(&'static str, &'static [&'static str])],
    ) -> Vec<&'static str> {
        table
            .iter()
            .filter(|(_, words)| {
                words.iter().filter(|w| lower.contains(*w)).count()
                    >= self.config.min_keyword_matches
            })
            .map(|(label, _)| *label)
            .collect()
    }

    /// Salient keywords for one document.
    pub fn extract_keywords(&self, content: &str, source: &str) -> Vec<String> {
        let window = truncate_chars(content, self.config.keyword_window_chars).to_lowercase();

        let mut counts = Counter::default();
        for token in RE_CONTENT_TOKEN.find_iter(&window).map(|m| m.as_str()) {
            if !STOP_WORDS.contains(token) {
                counts.add(token, 1);
            }
        }

        let stem = Path::new(source)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(source);
        for token in RE_FILENAME_TOKEN.find_iter(stem).map(|m| m.as_str().to_lowercase()) {
            if token.chars().count() > 2 && !STOP_WORDS.contains(token.as_str()) {
                counts.add(&token, self.config.filename_weight);
            }
        }

        counts
            .most_common(self.config.keyword_candidates)
            .into_iter()
            .filter(|w| !GENERIC_ACADEMIC.contains(&w.as_str()))
            .take(self.config.keywords_per_document)
            .collect()
    }
}

/// Frequency counter that remembers first-insertion order for tie-breaking.
#[derive(Default)]
struct Counter {
    index: HashMap<String, usize>,
    entries: Vec<(String, usize)>,
}

impl Counter {
    fn add(&mut self, key: &str, weight: usize) {
        match self.index.get(key) {
            Some(&i) => self.entries[i].1 += weight,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), weight));
            }
        }
    }

    fn most_common(mut self, n: usize) -> Vec<String> {
        // Stable sort keeps first-occurrence order among equal counts.
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries.into_iter().take(n).map(|(k, _)| k).collect()
    }
}

fn rank(items: Vec<String>, top: usize) -> Vec<String> {
    let mut counts = Counter::default();
    for item in &items {
        counts.add(item, 1);
    }
    counts.most_common(top)
}
