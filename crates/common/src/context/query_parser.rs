//! Query Parser - turns a question into the signals sentence scoring uses
//!
//! Provides:
//! - Keyword extraction with per-language stopwords
//! - Question type classification
//! - Language detection

use crate::text::{self, Script};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Share of Japanese characters above which text counts as Japanese
pub const JAPANESE_RATIO_THRESHOLD: f64 = 0.10;

/// Runs of word characters: hiragana, katakana (without `・`), CJK
/// ideographs and `々`, ASCII and full-width alphanumerics
const WORD_RUN_PATTERN: &str = "[\u{3005}\u{3040}-\u{309F}\u{30A0}-\u{30FA}\u{30FC}-\u{30FF}\u{4E00}-\u{9FAF}0-9A-Za-z\u{FF10}-\u{FF19}\u{FF21}-\u{FF3A}\u{FF41}-\u{FF5A}]+";

const JAPANESE_STOPWORDS: &[&str] = &[
    "とは", "何", "です", "ます", "について", "ですか", "でしょうか", "いくつ",
    "ありますか", "説明", "教えて", "ください", "何故", "どれ", "どの",
];

const ENGLISH_STOPWORDS: &[&str] = &[
    "what", "is", "are", "was", "were", "the", "a", "an", "of", "about", "please",
    "explain", "tell", "me", "how", "why", "which", "who", "when", "where", "do",
    "does", "did", "describe", "define", "can", "you", "in", "on", "for", "to",
    "and", "or", "it", "its", "this", "that", "there", "many", "much",
];

const DEFINITION_MARKERS: &[&str] = &["とは何", "とは", "何ですか", "何でしょうか", "定義"];

/// English definition questions are recognised only by how they open
const DEFINITION_OPENERS: &[&str] = &[
    "what is ", "what's ", "define ", "definition of ", "meaning of ", "what does ",
];

const COUNTING_MARKERS: &[&str] = &[
    "いくつ", "何種類", "何個", "何つ", "分類", "how many", "number of",
];

const COUNTING_HINTS: &[&str] = &["いくつ", "何", "数"];

const ENUMERATION_MARKERS: &[&str] = &[
    "どのよう", "何があり", "作物", "対応", "what kinds of", "which ", "list ", "examples of",
];

const PROCEDURE_MARKERS: &[&str] = &[
    "手順", "方法", "ステップ", "how to", "how do", "steps", "procedure",
];

const QUESTION_ENDINGS: &[&str] = &["ですか", "でしょうか", "?", "？"];

const ATTRIBUTE_TOPICS: &[&str] = &[
    "日本独自", "独自", "日本", "特徴", "固有", "特有", "unique", "feature", "characteristic",
];

/// Coarse question category driving the sentence bonuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// "What is X"
    Definition,
    /// "How many kinds of X"
    Classification,
    /// "What kinds of X are there"
    Enumeration,
    /// "How do I X"
    Procedure,
    /// "Is X unique to Japan"
    AttributeQuestion,
    Generic,
}

impl QuestionType {
    /// Classify a query by marker phrases. Order matters: counting
    /// questions mention kinds too, so they are checked before enumeration.
    pub fn classify(query: &str) -> Self {
        let q = query.to_lowercase();

        if contains_any(&q, DEFINITION_MARKERS) || DEFINITION_OPENERS.iter().any(|o| q.starts_with(o)) {
            return QuestionType::Definition;
        }
        if contains_any(&q, COUNTING_MARKERS) || (q.contains("種類") && contains_any(&q, COUNTING_HINTS)) {
            return QuestionType::Classification;
        }
        if contains_any(&q, ENUMERATION_MARKERS) && !q.contains("種類") {
            return QuestionType::Enumeration;
        }
        if contains_any(&q, PROCEDURE_MARKERS) {
            return QuestionType::Procedure;
        }
        if contains_any(&q, QUESTION_ENDINGS) && contains_any(&q, ATTRIBUTE_TOPICS) {
            return QuestionType::AttributeQuestion;
        }
        QuestionType::Generic
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Definition => "definition",
            QuestionType::Classification => "classification",
            QuestionType::Enumeration => "enumeration",
            QuestionType::Procedure => "procedure",
            QuestionType::AttributeQuestion => "attribute_question",
            QuestionType::Generic => "generic",
        }
    }
}

/// Supported answer languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Japanese,
    English,
}

impl Language {
    /// Japanese when more than 10% of the characters are kana or kanji
    pub fn detect(text: &str) -> Self {
        let total = text.chars().count();
        if total == 0 {
            return Language::English;
        }
        let japanese = text.chars().filter(|&c| text::is_japanese(c)).count();
        if japanese as f64 / total as f64 > JAPANESE_RATIO_THRESHOLD {
            Language::Japanese
        } else {
            Language::English
        }
    }

    /// Sentence terminator appended to answers missing one
    pub fn full_stop(&self) -> char {
        match self {
            Language::Japanese => '。',
            Language::English => '.',
        }
    }
}

/// Everything sentence scoring and answer composition need from a query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnalysis {
    /// Trimmed query text
    pub text: String,
    pub keywords: Vec<String>,
    pub question_type: QuestionType,
    pub language: Language,
}

impl QueryAnalysis {
    pub fn from_query(query: &str) -> Self {
        let text = query.trim().to_string();
        Self {
            keywords: extract_keywords(&text),
            question_type: QuestionType::classify(&text),
            language: Language::detect(&text),
            text,
        }
    }

    /// Lower-cased query for marker matching
    pub fn normalized(&self) -> String {
        self.text.to_lowercase()
    }
}

fn word_run_regex() -> &'static Regex {
    static WORD_RUN: OnceLock<Regex> = OnceLock::new();
    WORD_RUN.get_or_init(|| Regex::new(WORD_RUN_PATTERN).expect("word run pattern is valid"))
}

/// Extract query keywords.
///
/// Word runs are cut at script boundaries so `コンバインは何種類に大別`
/// yields `コンバイン`, `何種類`, `大別`. Pure hiragana segments,
/// stopwords and single characters are dropped. Latin tokens are
/// lower-cased. Order of first occurrence is kept.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();

    for run in word_run_regex().find_iter(query) {
        for (segment, script) in segments(run.as_str()) {
            if script == Script::Hiragana {
                continue;
            }
            let token = if script == Script::Latin {
                segment.to_lowercase()
            } else {
                segment.to_string()
            };
            if token.chars().count() <= 1 || is_stopword(&token) || keywords.contains(&token) {
                continue;
            }
            keywords.push(token);
        }
    }

    keywords
}

/// Split a word run into maximal same-script segments
fn segments(run: &str) -> Vec<(&str, Script)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut current: Option<Script> = None;

    for (idx, c) in run.char_indices() {
        let script = text::script_of(c);
        match current {
            Some(prev) if prev != script => {
                out.push((&run[start..idx], prev));
                start = idx;
                current = Some(script);
            }
            None => current = Some(script),
            _ => {}
        }
    }
    if let Some(script) = current {
        out.push((&run[start..], script));
    }
    out
}

fn is_stopword(token: &str) -> bool {
    JAPANESE_STOPWORDS.contains(&token) || ENGLISH_STOPWORDS.contains(&token)
}

pub(crate) fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_split_on_script_boundaries() {
        assert_eq!(extract_keywords("コンバインとは何ですか"), vec!["コンバイン"]);
        assert_eq!(
            extract_keywords("コンバインは何種類に大別されますか"),
            vec!["コンバイン", "何種類", "大別"]
        );
        assert_eq!(
            extract_keywords("どのような作物に対応していますか"),
            vec!["作物", "対応"]
        );
    }

    #[test]
    fn test_keywords_only_stopwords() {
        assert!(extract_keywords("何ですか").is_empty());
        assert!(extract_keywords("").is_empty());
        assert!(extract_keywords("？？").is_empty());
    }

    #[test]
    fn test_keywords_english_and_dedup() {
        assert_eq!(
            extract_keywords("What is a Combine harvester? A combine!"),
            vec!["combine", "harvester"]
        );
    }

    #[test]
    fn test_middle_dot_separates_keywords() {
        assert_eq!(extract_keywords("大豆・トウモロコシ"), vec!["大豆", "トウモロコシ"]);
    }

    #[test]
    fn test_classify_question_types() {
        assert_eq!(QuestionType::classify("コンバインとは何ですか"), QuestionType::Definition);
        assert_eq!(QuestionType::classify("What is a combine harvester?"), QuestionType::Definition);
        assert_eq!(
            QuestionType::classify("コンバインは何種類に大別されますか"),
            QuestionType::Classification
        );
        assert_eq!(
            QuestionType::classify("コンバインの種類はいくつありますか"),
            QuestionType::Classification
        );
        assert_eq!(
            QuestionType::classify("どのような作物に対応していますか"),
            QuestionType::Enumeration
        );
        assert_eq!(QuestionType::classify("脱穀の手順を教えて"), QuestionType::Procedure);
        assert_eq!(
            QuestionType::classify("自立型は日本独自のものですか"),
            QuestionType::AttributeQuestion
        );
        assert_eq!(QuestionType::classify("コンバインの歴史"), QuestionType::Generic);
    }

    #[test]
    fn test_classify_polite_definition() {
        assert_eq!(QuestionType::classify("コンバインは何でしょうか"), QuestionType::Definition);
        assert_eq!(QuestionType::classify("Define threshing."), QuestionType::Definition);
    }

    #[test]
    fn test_english_definition_markers_must_open_the_question() {
        assert_eq!(
            QuestionType::classify("How do I define the threshing steps?"),
            QuestionType::Procedure
        );
        assert_eq!(
            QuestionType::classify("How many types exist and what is each used for?"),
            QuestionType::Classification
        );
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(Language::detect("コンバインとは何ですか"), Language::Japanese);
        assert_eq!(Language::detect("What is a combine harvester?"), Language::English);
        // one kana in a long English sentence stays below 10%
        assert_eq!(Language::detect("The word for rice is 稲 in Japanese text"), Language::English);
        assert_eq!(Language::detect(""), Language::English);
    }

    #[test]
    fn test_analysis() {
        let analysis = QueryAnalysis::from_query("  コンバインとは何ですか \n");
        assert_eq!(analysis.text, "コンバインとは何ですか");
        assert_eq!(analysis.question_type, QuestionType::Definition);
        assert_eq!(analysis.language, Language::Japanese);
        assert_eq!(analysis.keywords, vec!["コンバイン"]);
    }
}
