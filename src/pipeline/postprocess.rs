//! Post-processing: deterministic cleanup of model output and the local
//! rule-based cleaner.
//!
//! Three families of rules live here:
//!
//! * **Response unwrapping** — models wrap answers in ` ```json ` fences
//!   and pretty-print JSON with newlines, despite being told not to.
//!   [`strip_code_fences`] and [`prepare_json`] undo that before parsing.
//! * **Local cleaner** — [`local_clean`] is the fallback used when the model
//!   fails to clean a chunk. It drops page numbers and stray short lines,
//!   wraps recognisable math in `$…$`, and breaks paragraphs after
//!   sentences.
//! * **Final formatting** — [`final_format`] runs once over the joined
//!   document: blank-line collapse, `$` delimiter repair, line trimming.
//!
//! Every rule is a pure `&str → String` function and is tested on its own.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// ── Rule 1: Strip code fences ────────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z]*\n?").unwrap());
static RE_LEADING_JSON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^json\s*").unwrap());

/// Remove every ` ``` ` fence (with its language tag) and a leading bare
/// `json` token left behind by some models.
pub fn strip_code_fences(input: &str) -> String {
    let s = RE_FENCE.replace_all(input.trim(), "");
    let s = RE_LEADING_JSON.replace(s.trim_start(), "");
    s.trim().to_string()
}

// ── Rule 2: Collapse JSON whitespace ─────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Fence-strip a structured response and flatten it onto one line.
///
/// Newlines inside JSON string literals are invalid; models emit them
/// anyway. Replacing every whitespace run with a single space keeps the
/// document parseable at the cost of the model's own line breaks.
pub fn prepare_json(input: &str) -> String {
    let s = strip_code_fences(input);
    RE_WHITESPACE.replace_all(&s, " ").trim().to_string()
}

// ── Rule 3: Local fallback cleaner ───────────────────────────────────────────

static RE_BARE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static RE_PAGE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^page\s*\d+$").unwrap());
static RE_ZH_PAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^第\s*\d+\s*页$").unwrap());
static RE_MATH_GLYPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[α-ωΑ-Ω∑∫∂∞]").unwrap());
static RE_LATIN_SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?])\s+").unwrap());
static RE_CJK_SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"([。！？])\s*").unwrap());

/// Rule-based cleaning for a chunk the model could not clean.
///
/// Latin sentence ends only break when followed by whitespace, so decimals
/// like `3.5` stay intact.
pub fn local_clean(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_page_noise(line))
        .map(enhance_math)
        .collect();

    let joined = lines.join("\n");
    let s = collapse_blank_lines(&joined);
    let s = RE_LATIN_SENTENCE_END.replace_all(&s, "$1\n\n");
    let s = RE_CJK_SENTENCE_END.replace_all(&s, "$1\n\n");
    collapse_blank_lines(&s).trim().to_string()
}

fn is_page_noise(line: &str) -> bool {
    RE_BARE_NUMBER.is_match(line)
        || RE_PAGE_WORD.is_match(line)
        || RE_ZH_PAGE.is_match(line)
        || (line.chars().count() < 5 && !RE_MATH_GLYPH.is_match(line))
}

// ── Rule 4: Math delimiting ──────────────────────────────────────────────────

static RE_FUNC_EQ: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\(([^)]+)\)\s*=\s*([^,.;!?\s]+)").unwrap());
static RE_SUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"sum_\{([^}]+)\}").unwrap());
static RE_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"int_\{([^}]+)\}").unwrap());
static RE_FRACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)/(\d+)").unwrap());
static RE_POWER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)\^(\d+)").unwrap());
static RE_GREEK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(alpha|beta|gamma)").unwrap());

/// Wrap recognisable plain-text math in `$…$`.
///
/// Handles `f(x) = y`, `sum_{…}`, `int_{…}`, `a/b`, `x^n` and the
/// `\alpha`, `\beta`, `\gamma` commands, applied in that order. Text already
/// inside `$…$` is left alone, so later rules never nest delimiters.
pub fn enhance_math(line: &str) -> String {
    let s = outside_math(line, &RE_FUNC_EQ, &|c: &Captures<'_>| {
        format!("${}({}) = {}$", &c[1], &c[2], &c[3])
    });
    let s = outside_math(&s, &RE_SUM, &|c: &Captures<'_>| format!("$\\sum_{{{}}}$", &c[1]));
    let s = outside_math(&s, &RE_INT, &|c: &Captures<'_>| format!("$\\int_{{{}}}$", &c[1]));
    let s = outside_math(&s, &RE_FRACTION, &|c: &Captures<'_>| {
        format!("$\\frac{{{}}}{{{}}}$", &c[1], &c[2])
    });
    let s = outside_math(&s, &RE_POWER, &|c: &Captures<'_>| format!("${}^{{{}}}$", &c[1], &c[2]));
    outside_math(&s, &RE_GREEK, &|c: &Captures<'_>| format!("$\\{}$", &c[1]))
}

/// Apply `re` only to the segments between `$…$` spans.
fn outside_math(line: &str, re: &Regex, wrap: &dyn Fn(&Captures<'_>) -> String) -> String {
    line.split('$')
        .enumerate()
        .map(|(i, segment)| {
            if i % 2 == 0 {
                re.replace_all(segment, |c: &Captures<'_>| wrap(c)).into_owned()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("$")
}

// ── Rule 5: Delimiter repair ─────────────────────────────────────────────────

static RE_DOLLAR_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\${2,}").unwrap());

/// Close an unbalanced `$` and collapse runs of `$$+` to `$$`.
pub fn fix_broken_latex(input: &str) -> String {
    let mut s = input.to_string();
    if s.matches('$').count() % 2 != 0 {
        s.push('$');
    }
    RE_DOLLAR_RUN.replace_all(&s, "$$$$").into_owned()
}

// ── Rule 6: Final formatting ─────────────────────────────────────────────────

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

/// Whole-document cleanup after chunk outputs are joined.
pub fn final_format(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }
    let s = collapse_blank_lines(input);
    let s = fix_broken_latex(&s);

    let mut out: Vec<&str> = Vec::new();
    for line in s.lines().map(str::trim) {
        if line.is_empty() && matches!(out.last(), Some(prev) if prev.is_empty()) {
            continue;
        }
        out.push(line);
    }
    out.join("\n").trim().to_string()
}

// ── Statistics ───────────────────────────────────────────────────────────────

static RE_MATH_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\$\$.+?\$\$|\$[^$\n]+?\$").unwrap());

/// Number of `$…$` and `$$…$$` spans in `text`.
pub fn count_math_expressions(text: &str) -> usize {
    RE_MATH_SPAN.find_iter(text).count()
}
