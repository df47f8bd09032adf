//! Prompts for text cleaning, title extraction and QA generation.
//!
//! Centralising every prompt here keeps wording changes out of the retry
//! and scheduling code, and lets unit tests inspect prompts without a model.
//!
//! QA prompts come in two families built by [`QaPromptBuilder`]:
//!
//! * **single-document** — deep questions about one paper excerpt
//! * **cross-document** — synthesis questions over excerpts of every paper
//!
//! Both are parameterised by the corpus [`DomainProfile`] and the
//! [`LanguageMode`], and both demand exactly one JSON shape.

use crate::config::{LanguageMode, PromptBudget};
use crate::output::{Corpus, DomainProfile};
use std::fmt::Write as _;

/// Label that introduces each source in a cross-document prompt.
pub const MATERIAL_LABEL: &str = "Research Material";

// ── Cleaning ─────────────────────────────────────────────────────────────────

/// System prompt for the chunk-cleaning call.
pub const CLEANING_SYSTEM_PROMPT: &str = "You are an academic text editor. You turn raw text extracted from research papers into clean body text and you are fluent in LaTeX.";

/// Build the user prompt that asks the model to clean one chunk.
pub fn cleaning_prompt(chunk: &str) -> String {
    format!(
        r#"Clean the following text extracted from an academic paper.

Rules:
1. Remove page headers, footers, page numbers, figure and table captions, tables and the reference list.
2. Keep the body: introduction, methods, experiments, results, discussion, conclusions.
3. Separate paragraphs with a blank line.
4. Mathematics:
   - Convert every formula to correct LaTeX
   - Wrap inline formulas in $...$
   - Wrap display formulas in $$...$$
   - Repair formulas the extraction garbled (α, β, γ, ∑, ∫, ∂, ∞, →, ≤, ≥, ≠)
5. Keep technical terms and the original language.
6. Output only the cleaned text, with no commentary and no code fences.

Example: "f(x) = x^2 + 2x + 1" becomes "$f(x) = x^2 + 2x + 1$".

Text:
{chunk}"#
    )
}

// ── Title extraction ─────────────────────────────────────────────────────────

/// Maximum characters of leading text shown to the title model.
pub const TITLE_EXCERPT_CHARS: usize = 3000;

pub const TITLE_SYSTEM_PROMPT: &str =
    "You are an assistant that identifies the exact title of academic papers.";

/// Build the prompt asking for the title of the paper that starts with `excerpt`.
pub fn title_prompt(excerpt: &str) -> String {
    format!(
        "Extract the formal title of the academic paper below. Output the title only, without explanation.\n\nPaper excerpt:\n{}",
        truncate_chars(excerpt, TITLE_EXCERPT_CHARS)
    )
}

// ── QA system messages ───────────────────────────────────────────────────────

/// Extra system message sent with every structured request.
pub const JSON_OUTPUT_REMINDER: &str =
    "Respond with a single valid JSON document. No prose, no markdown fences.";

/// System message for QA generation in `mode`.
pub fn qa_system_message(mode: LanguageMode) -> &'static str {
    match mode {
        LanguageMode::Chinese => {
            r#"你是一名专业研究人员。只输出严格的 JSON 问答数组，不要包含任何其他文本：
[{"question": "问题1", "answer": "答案1"}, {"question": "问题2", "answer": "答案2"}]
每个元素必须包含 question 和 answer 字段。"#
        }
        LanguageMode::English => {
            r#"You are a professional researcher. Output question/answer pairs as strict JSON only:
[{"question": "question1", "answer": "answer1"}, {"question": "question2", "answer": "answer2"}]
Return ONLY a JSON array whose elements have question and answer fields."#
        }
        LanguageMode::Bilingual => {
            r#"You are a bilingual research expert. Output strict JSON only:
[{"question_en": "q1", "answer_en": "a1", "question_zh": "问题1", "answer_zh": "答案1"}]
Return ONLY a JSON array."#
        }
    }
}

fn output_shape(mode: LanguageMode) -> &'static str {
    match mode {
        LanguageMode::English => {
            r#"[{"question": "question1", "answer": "answer1"}, {"question": "question2", "answer": "answer2"}]"#
        }
        LanguageMode::Chinese => {
            r#"[{"question": "问题1", "answer": "答案1"}, {"question": "问题2", "answer": "答案2"}]"#
        }
        LanguageMode::Bilingual => {
            r#"[{"question_en": "q1", "answer_en": "a1", "question_zh": "问题1", "answer_zh": "答案1"}]"#
        }
    }
}

// ── QA prompts ───────────────────────────────────────────────────────────────

const SINGLE_DIMENSIONS_EN: [&str; 6] = [
    "Theoretical mechanisms: the core frameworks and causal pathways",
    "Methodological critique: rigour and novelty of the research design",
    "Empirical interpretation: what the findings mean for theory",
    "Policy and practice: implications and applications",
    "Field positioning: where the work sits in the discipline",
    "Future directions: questions worth investigating next",
];

const SINGLE_DIMENSIONS_ZH: [&str; 6] = [
    "理论机制：核心理论框架与因果路径",
    "方法论批判：研究设计的严谨性与创新性",
    "实证解读：研究发现的理论意义",
    "政策与实践：政策含义与实践价值",
    "学科定位：该研究在领域发展中的位置",
    "未来方向：值得后续探索的问题",
];

const CROSS_DIMENSIONS_EN: [&str; 6] = [
    "Theoretical integration: shared and diverging frameworks across studies",
    "Methodological reflection: strengths and fit of the different approaches",
    "Evidence synthesis: what the combined findings imply",
    "Integrated recommendations: policy advice drawn from several sources",
    "Field assessment: state, challenges and frontiers of the discipline",
    "Cross-domain implications: lessons for neighbouring fields",
];

const CROSS_DIMENSIONS_ZH: [&str; 6] = [
    "理论整合：不同研究在理论框架上的共性与差异",
    "方法论反思：各类研究方法的优劣与适用性",
    "证据综合：多项研究发现的整体含义",
    "综合建议：基于多源证据的政策建议",
    "学科研判：领域的现状、挑战与前沿",
    "跨领域启示：对相关领域的借鉴意义",
];

/// Builds single- and cross-document QA prompts within a [`PromptBudget`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QaPromptBuilder {
    budget: PromptBudget,
}

impl QaPromptBuilder {
    pub fn new(budget: PromptBudget) -> Self {
        Self { budget }
    }

    /// Deep questions about one document.
    pub fn single_document_prompt(
        &self,
        excerpt: &str,
        count: usize,
        mode: LanguageMode,
        profile: &DomainProfile,
    ) -> String {
        let excerpt = truncate_chars(excerpt, self.budget.single_excerpt_chars);
        let keywords = keyword_list(profile, 5);

        match mode {
            LanguageMode::Chinese => {
                let domains = profile.primary_domains.join("、");
                let mut p = String::new();
                let _ = writeln!(p, "请基于以下{domains}领域的研究内容，生成{count}个具有学术深度的问题与答案。\n");
                header_zh(&mut p, profile, &keywords, None);
                let _ = writeln!(p, "研究内容：\n{excerpt}\n");
                dimensions(&mut p, "问题应覆盖以下学术维度：", &SINGLE_DIMENSIONS_ZH);
                requirements_zh(&mut p, &domains);
                footer_zh(&mut p, count);
                p
            }
            LanguageMode::English | LanguageMode::Bilingual => {
                let domains = profile.primary_domains.join(", ");
                let mut p = String::new();
                let _ = writeln!(
                    p,
                    "Generate {count} {}academically rigorous questions with answers based on the following {domains} research.\n",
                    if mode.is_bilingual() { "bilingual (English and Chinese) " } else { "" }
                );
                header_en(&mut p, profile, &keywords, None);
                let _ = writeln!(p, "Content:\n{excerpt}\n");
                dimensions(&mut p, "Cover these academic dimensions:", &SINGLE_DIMENSIONS_EN);
                requirements_en(&mut p, mode, &domains);
                footer_en(&mut p, mode, count);
                p
            }
        }
    }

    /// Synthesis questions over the whole corpus.
    ///
    /// Each source contributes at most `cross_source_chars` characters and the
    /// combined material is capped at `cross_total_chars`.
    pub fn cross_document_prompt(
        &self,
        corpus: &Corpus,
        count: usize,
        mode: LanguageMode,
        profile: &DomainProfile,
    ) -> String {
        let mut material = String::new();
        for (i, text) in corpus.values().enumerate() {
            let _ = write!(
                material,
                "{MATERIAL_LABEL} {}:\n{}\n\n",
                i + 1,
                truncate_chars(text, self.budget.cross_source_chars)
            );
        }
        let material = truncate_chars(&material, self.budget.cross_total_chars);
        let keywords = keyword_list(profile, 8);
        let documents = Some(profile.document_count);

        match mode {
            LanguageMode::Chinese => {
                let domains = profile.primary_domains.join("、");
                let mut p = String::new();
                let _ = writeln!(p, "基于以下多份{domains}领域的研究资料，生成{count}个具有学术深度的综合性问题与答案。\n");
                header_zh(&mut p, profile, &keywords, documents);
                let _ = writeln!(p, "研究资料：\n{material}");
                dimensions(&mut p, "问题应覆盖以下综合维度：", &CROSS_DIMENSIONS_ZH);
                requirements_zh(&mut p, &domains);
                let _ = writeln!(p, "- 不要提及资料编号，答案应综合多份资料进行推理");
                footer_zh(&mut p, count);
                p
            }
            LanguageMode::English | LanguageMode::Bilingual => {
                let domains = profile.primary_domains.join(", ");
                let mut p = String::new();
                let _ = writeln!(
                    p,
                    "Based on the following research materials in {domains}, generate {count} {}comprehensive academic questions with answers.\n",
                    if mode.is_bilingual() { "bilingual (English and Chinese) " } else { "" }
                );
                header_en(&mut p, profile, &keywords, documents);
                let _ = writeln!(p, "Materials:\n{material}");
                dimensions(&mut p, "Cover these synthesis dimensions:", &CROSS_DIMENSIONS_EN);
                requirements_en(&mut p, mode, &domains);
                let _ = writeln!(p, "- Do not refer to material numbers; reason across several sources");
                footer_en(&mut p, mode, count);
                p
            }
        }
    }
}

fn keyword_list(profile: &DomainProfile, max: usize) -> String {
    profile
        .top_keywords
        .iter()
        .take(max)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn header_en(p: &mut String, profile: &DomainProfile, keywords: &str, documents: Option<usize>) {
    let _ = writeln!(p, "Research domains: {}", profile.primary_domains.join(", "));
    let _ = writeln!(p, "Core themes: {}", profile.primary_themes.join(", "));
    let _ = writeln!(p, "Keywords: {keywords}");
    if let Some(n) = documents {
        let _ = writeln!(p, "Number of materials: {n}");
    }
    p.push('\n');
}

fn header_zh(p: &mut String, profile: &DomainProfile, keywords: &str, documents: Option<usize>) {
    let _ = writeln!(p, "研究领域：{}", profile.primary_domains.join("、"));
    let _ = writeln!(p, "核心主题：{}", profile.primary_themes.join("、"));
    let _ = writeln!(p, "关键词：{keywords}");
    if let Some(n) = documents {
        let _ = writeln!(p, "研究资料数量：{n}份");
    }
    p.push('\n');
}

fn dimensions(p: &mut String, heading: &str, items: &[&str]) {
    let _ = writeln!(p, "{heading}");
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(p, "{}. {}", i + 1, item);
    }
    p.push('\n');
}

fn requirements_en(p: &mut String, mode: LanguageMode, domains: &str) {
    p.push_str("REQUIREMENTS:\n");
    if mode.is_bilingual() {
        p.push_str("- Write every question and answer in both English and Chinese\n");
    }
    p.push_str("- Use professional academic language and never name specific authors\n");
    p.push_str("- Never use self-referential phrases such as \"this paper\" or \"this study\"\n");
    let _ = writeln!(p, "- Show domain depth in {domains} while staying broadly applicable");
    p.push_str("- Answers must show the reasoning, not restate isolated facts\n");
}

fn requirements_zh(p: &mut String, domains: &str) {
    p.push_str("重要要求：\n");
    p.push_str("- 使用专业学术语言，不要提及具体作者姓名\n");
    p.push_str("- 不要使用“本文”“本研究”等自指表述\n");
    let _ = writeln!(p, "- 体现{domains}领域的专业深度与普适性");
    p.push_str("- 答案应展示严谨的推理过程，而非简单的事实陈述\n");
}

fn footer_en(p: &mut String, mode: LanguageMode, count: usize) {
    let _ = writeln!(p, "\nOutput strictly in this JSON format:\n{}\n", output_shape(mode));
    let _ = write!(p, "Generate exactly {count} pairs:");
}

fn footer_zh(p: &mut String, count: usize) {
    let _ = writeln!(
        p,
        "\n请严格按照以下 JSON 格式输出：\n{}\n",
        output_shape(LanguageMode::Chinese)
    );
    let _ = write!(p, "请生成 {count} 个问答对：");
}

/// The first `max` characters of `s`, cut on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
