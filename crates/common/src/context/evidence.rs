//! Evidence extraction - picks the sentence that best justifies an answer
//!
//! Two scorers share one selection and offset routine:
//! - `Rich` adds question-type bonuses on top of keyword overlap
//! - `Fast` counts keywords with a couple of list heuristics
//!
//! Whatever the scorer, the returned span satisfies
//! `source[start_char..end_char] == text` in characters, and `text` is the
//! whitespace-stripped sentence including its terminator.

use super::query_parser::{contains_any, QueryAnalysis, QuestionType};
use crate::errors::AppError;
use crate::models::EvidenceSpan;
use crate::text::{self, Script, Sentence};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Characters returned when the source has no sentences at all
const FALLBACK_PREFIX_CHARS: usize = 100;

const LONG_SENTENCE_CHARS: usize = 240;
const LONG_SENTENCE_PENALTY: f32 = 0.5;

const FAST_LONG_SENTENCE_CHARS: usize = 200;
const FAST_LONG_SENTENCE_PENALTY: f32 = 1.0;

const COPULA_ENDINGS: &[&str] = &["です", "である"];
const ENGLISH_COPULAS: &[&str] = &[" is a ", " is an ", " refers to ", " is defined as ", " means "];

const CLASSIFICATION_MARKERS: &[&str] = &[
    "種類", "分類", "大別", "型", "つに", "個に", "種に", "に分け", "kinds", "types",
    "categories", "classified",
];
const NUMERALS: &[&str] = &["2", "3", "4", "5", "二", "三", "四", "五", "２", "３", "４", "５"];
const LIST_SEPARATORS: &[char] = &['・', '、', ','];

const LIST_MARKERS: &[&str] = &["・", "、", "など", "や", "と", "の他にも", ", ", " and ", " such as ", "etc"];
const HYPERNYM_MARKERS: &[&str] = &["種類", "分類", "大別", "型"];
const PROCESS_MARKERS: &[&str] = &["脱穀", "選別", "自走機能", "工程", "処理"];

const SEQUENCE_MARKERS: &[&str] = &["まず", "次に", "最後に", "手順", "first", "then", "finally"];

const SPECIFIC_ATTRIBUTES: &[&str] = &["日本独自", "独自", "固有", "特有"];

const ENUMERATION_PHRASING: &[&str] = &["作物", "どのようなもの", "何があります", "対応した"];
const FAST_LIST_MARKERS: &[&str] = &["作物", "稲", "麦", "大豆", "小豆", "菜種", "トウモロコシ", "など", "・"];

/// Sentence scoring mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorMode {
    /// Question-type aware scoring (reference behaviour)
    #[default]
    Rich,
    /// Keyword overlap with light list heuristics
    Fast,
}

impl ExtractorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorMode::Rich => "rich",
            ExtractorMode::Fast => "fast",
        }
    }
}

impl FromStr for ExtractorMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rich" => Ok(ExtractorMode::Rich),
            "fast" | "ultra-fast" | "ultra_fast" => Ok(ExtractorMode::Fast),
            other => Err(AppError::Configuration {
                message: format!("unknown extraction mode '{}', expected 'rich' or 'fast'", other),
            }),
        }
    }
}

/// Selects one evidence sentence from a source text
#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceExtractor {
    mode: ExtractorMode,
}

impl EvidenceExtractor {
    pub fn new(mode: ExtractorMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ExtractorMode {
        self.mode
    }

    /// Extract the evidence span for `query` from `source_text`
    pub fn extract(&self, source_text: &str, query: &str) -> EvidenceSpan {
        self.extract_with(source_text, &QueryAnalysis::from_query(query))
    }

    /// Extract with an already analysed query
    pub fn extract_with(&self, source_text: &str, analysis: &QueryAnalysis) -> EvidenceSpan {
        let sentences = text::split_sentences(source_text);
        if sentences.is_empty() {
            let len = text::char_len(source_text).min(FALLBACK_PREFIX_CHARS);
            return EvidenceSpan::from_source(source_text, 0, len);
        }

        let scores = match self.mode {
            ExtractorMode::Rich => score_rich(&sentences, analysis),
            ExtractorMode::Fast => score_fast(&sentences, analysis),
        };

        let best = best_index(&scores);
        tracing::trace!(
            mode = self.mode.as_str(),
            question_type = analysis.question_type.as_str(),
            sentences = sentences.len(),
            best,
            score = scores[best],
            "Evidence sentence selected"
        );

        locate(source_text, &sentences, best)
    }
}

/// Index of the highest score; the earliest wins ties
fn best_index(scores: &[f32]) -> usize {
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = i;
        }
    }
    best
}

/// Turn the winning sentence into a span of the source.
///
/// Sentences carry their own offsets; they are checked against the source
/// and, failing that, the sentence is searched from where the previous one
/// ended so an earlier duplicate is not picked up.
fn locate(source_text: &str, sentences: &[Sentence<'_>], best: usize) -> EvidenceSpan {
    let sentence = &sentences[best];
    if text::char_slice(source_text, sentence.start, sentence.end) == sentence.text {
        return EvidenceSpan::from_source(source_text, sentence.start, sentence.end);
    }

    let scan_from = best
        .checked_sub(1)
        .map(|prev| sentences[prev].end)
        .unwrap_or(0);
    if let Some(start) = text::find_from(source_text, sentence.text, scan_from) {
        return EvidenceSpan::from_source(source_text, start, start + sentence.char_len());
    }

    tracing::warn!("Evidence sentence not found in source, using first sentence");
    EvidenceSpan::from_source(source_text, 0, sentences[0].char_len())
}

/// Per-sentence facts reused by several rules
struct SentenceFeatures<'a> {
    text: &'a str,
    lower: String,
    chars: usize,
    separators: usize,
}

impl<'a> SentenceFeatures<'a> {
    fn new(sentence: &Sentence<'a>) -> Self {
        Self {
            text: sentence.text,
            lower: sentence.text.to_lowercase(),
            chars: sentence.char_len(),
            separators: sentence.text.chars().filter(|c| LIST_SEPARATORS.contains(c)).count(),
        }
    }

    fn contains(&self, needle: &str) -> bool {
        self.lower.contains(needle)
    }

    fn keyword_count(&self, keywords: &[String]) -> usize {
        keywords.iter().filter(|k| self.contains(k.as_str())).count()
    }
}

struct ScoringContext<'q> {
    analysis: &'q QueryAnalysis,
    query_lower: String,
    /// Keywords present in every sentence; they do not discriminate
    generic_keywords: Vec<&'q str>,
}

fn score_rich(sentences: &[Sentence<'_>], analysis: &QueryAnalysis) -> Vec<f32> {
    let features: Vec<SentenceFeatures<'_>> = sentences.iter().map(SentenceFeatures::new).collect();

    let generic_keywords = analysis
        .keywords
        .iter()
        .filter(|k| features.iter().all(|f| f.contains(k.as_str())))
        .map(String::as_str)
        .collect();
    let ctx = ScoringContext {
        analysis,
        query_lower: analysis.normalized(),
        generic_keywords,
    };

    features
        .iter()
        .map(|f| {
            let mut score = f.keyword_count(&analysis.keywords) as f32;
            score += question_type_bonus(analysis.question_type, f, &ctx);
            if f.chars > LONG_SENTENCE_CHARS {
                score -= LONG_SENTENCE_PENALTY;
            }
            score
        })
        .collect()
}

fn question_type_bonus(question_type: QuestionType, f: &SentenceFeatures<'_>, ctx: &ScoringContext<'_>) -> f32 {
    match question_type {
        QuestionType::Definition => definition_bonus(f),
        QuestionType::Classification => classification_bonus(f),
        QuestionType::Enumeration => enumeration_bonus(f),
        QuestionType::Procedure => procedure_bonus(f),
        QuestionType::AttributeQuestion => attribute_bonus(f, ctx),
        QuestionType::Generic => 0.0,
    }
}

fn definition_bonus(f: &SentenceFeatures<'_>) -> f32 {
    let body = text::sentence_body(f.text);
    let declarative = f.text.contains("とは")
        || COPULA_ENDINGS.iter().any(|e| body.ends_with(e))
        || contains_any(&f.lower, ENGLISH_COPULAS);
    if declarative {
        1.5
    } else {
        0.0
    }
}

/// Favour the summary sentence ("2種類に大別") over the itemised list
fn classification_bonus(f: &SentenceFeatures<'_>) -> f32 {
    let mut bonus = 0.0;
    if contains_any(&f.lower, CLASSIFICATION_MARKERS) {
        bonus += 5.0;
    }
    if contains_any(f.text, NUMERALS) {
        bonus += 3.0;
    }
    if f.separators >= 3 {
        bonus -= 2.0;
    }
    bonus
}

/// Favour sentences that actually list items over ones naming the category
fn enumeration_bonus(f: &SentenceFeatures<'_>) -> f32 {
    let mut bonus = 0.0;
    if contains_any(&f.lower, LIST_MARKERS) {
        bonus += 3.0;
    }
    if contains_any(f.text, HYPERNYM_MARKERS) {
        bonus -= 1.0;
    }
    if f.separators >= 2 && concrete_items(f.text) >= 2 {
        bonus += 4.0;
    }
    if contains_any(f.text, PROCESS_MARKERS) {
        bonus -= 1.5;
    }
    bonus
}

/// Count separator-delimited segments that read as a bare noun:
/// no hiragana, short, and not process vocabulary
fn concrete_items(sentence: &str) -> usize {
    sentence
        .split(LIST_SEPARATORS)
        .map(|seg| seg.trim_matches(|c: char| c.is_whitespace() || text::is_terminator(c)))
        .filter(|seg| !seg.is_empty())
        .filter(|seg| !contains_any(seg, PROCESS_MARKERS))
        .filter(|seg| {
            if seg.is_ascii() {
                seg.split_whitespace().count() <= 3 && seg.len() <= 24
            } else {
                text::char_len(seg) <= 8 && !seg.chars().any(|c| text::script_of(c) == Script::Hiragana)
            }
        })
        .count()
}

fn procedure_bonus(f: &SentenceFeatures<'_>) -> f32 {
    if contains_any(&f.lower, SEQUENCE_MARKERS) {
        1.5
    } else {
        0.0
    }
}

fn attribute_bonus(f: &SentenceFeatures<'_>, ctx: &ScoringContext<'_>) -> f32 {
    let specific = ctx
        .analysis
        .keywords
        .iter()
        .filter(|k| !ctx.generic_keywords.contains(&k.as_str()) && f.contains(k.as_str()))
        .count() as f32;

    let mut bonus = 2.0 * specific;
    if SPECIFIC_ATTRIBUTES
        .iter()
        .any(|attr| ctx.query_lower.contains(attr) && f.text.contains(attr))
    {
        bonus += 5.0;
    }
    bonus
}

fn score_fast(sentences: &[Sentence<'_>], analysis: &QueryAnalysis) -> Vec<f32> {
    let enumeration_phrasing = contains_any(&analysis.text, ENUMERATION_PHRASING);

    sentences
        .iter()
        .map(|sentence| {
            let f = SentenceFeatures::new(sentence);
            let mut score = f.keyword_count(&analysis.keywords) as f32;
            if enumeration_phrasing {
                let markers = FAST_LIST_MARKERS.iter().filter(|m| f.text.contains(*m)).count();
                score += 2.0 * markers as f32;
            }
            if f.chars > FAST_LONG_SENTENCE_CHARS {
                score -= FAST_LONG_SENTENCE_PENALTY;
            }
            score
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SENTENCES: &str = "コンバインは、一台で穀物の収穫・脱穀・選別をする自走機能を有した農業機械です。日本で使われているコンバインは普通型と自立型の2種類に大別されます。";

    const COMBINE_DOC: &str = "コンバインは、一台で穀物の収穫・脱穀・選別をする自走機能を有した農業機械です。日本で使われているコンバインは普通型と自立型の2種類に大別されます。普通型は主にアメリカやヨーロッパ等大規模農業で使われていて、稲・麦・大豆の他にも小豆・菜種・トウモロコシなどの幅広い作物に対応した汎用性の農業機械です。自立型は収穫時に水分含有率が高い稲の収穫に対応するために開発された日本独自の農業機械です。";

    fn first_sentence() -> &'static str {
        "コンバインは、一台で穀物の収穫・脱穀・選別をする自走機能を有した農業機械です。"
    }

    fn assert_in_bounds(source: &str, span: &EvidenceSpan) {
        assert!(span.end_char > span.start_char);
        assert!(span.end_char <= text::char_len(source));
        assert_eq!(text::char_slice(source, span.start_char, span.end_char), span.text);
    }

    #[test]
    fn test_definition_picks_first_sentence() {
        let span = EvidenceExtractor::default().extract(TWO_SENTENCES, "コンバインとは何ですか");
        assert_eq!(span.text, first_sentence());
        assert_eq!(span.start_char, 0);
        assert_eq!(span.end_char, text::char_len(first_sentence()));
        assert!(span.text.ends_with('。'));
    }

    #[test]
    fn test_classification_picks_summary_sentence() {
        let span = EvidenceExtractor::default().extract(TWO_SENTENCES, "コンバインは何種類に大別されますか");
        assert!(span.text.contains("2種類に大別"));
        assert_eq!(span.start_char, text::char_len(first_sentence()));
        assert_in_bounds(TWO_SENTENCES, &span);
    }

    #[test]
    fn test_enumeration_prefers_item_list() {
        let span = EvidenceExtractor::default().extract(COMBINE_DOC, "どのような作物に対応していますか");
        assert!(span.text.starts_with("普通型は主に"));
        assert!(span.text.contains("トウモロコシ"));
        assert_in_bounds(COMBINE_DOC, &span);
    }

    #[test]
    fn test_attribute_question_matches_specific_phrase() {
        let span = EvidenceExtractor::default().extract(COMBINE_DOC, "自立型は日本独自のものですか");
        assert!(span.text.starts_with("自立型は収穫時に"));
        assert!(span.text.contains("日本独自"));
        assert_in_bounds(COMBINE_DOC, &span);
    }

    #[test]
    fn test_stopword_only_query_falls_back_to_first_sentence() {
        let span = EvidenceExtractor::default().extract(TWO_SENTENCES, "何ですか");
        assert_eq!(span.start_char, 0);
        assert_eq!(span.text, first_sentence());
        assert_in_bounds(TWO_SENTENCES, &span);

        let generic = EvidenceExtractor::default().extract(TWO_SENTENCES, "？");
        assert_eq!(generic.start_char, 0);
        assert_in_bounds(TWO_SENTENCES, &generic);
    }

    #[test]
    fn test_text_without_terminators() {
        let source = "終止符のない短い説明文";
        let span = EvidenceExtractor::default().extract(source, "説明文");
        assert_eq!(span.start_char, 0);
        assert_eq!(span.text, source);
    }

    #[test]
    fn test_whitespace_source_uses_prefix() {
        let source = "   ";
        let span = EvidenceExtractor::default().extract(source, "コンバイン");
        assert_eq!(span.start_char, 0);
        assert_eq!(span.end_char, 3);
        assert_eq!(span.text, source);
    }

    #[test]
    fn test_empty_source() {
        let span = EvidenceExtractor::default().extract("", "コンバイン");
        assert!(span.is_empty());
        assert_eq!(span.text, "");
    }

    #[test]
    fn test_long_sentence_penalty_is_deterministic() {
        let long = format!("コンバイン{}。", "の".repeat(250));
        let source = format!("{}コンバインは便利です。", long);
        let extractor = EvidenceExtractor::default();

        let first = extractor.extract(&source, "コンバインの歴史");
        let second = extractor.extract(&source, "コンバインの歴史");
        assert_eq!(first, second);
        assert_eq!(first.text, "コンバインは便利です。");
        assert_eq!(first.start_char, text::char_len(&long));
    }

    #[test]
    fn test_duplicate_sentences_resolve_to_first_occurrence() {
        let source = "稲を収穫する。麦を収穫する。稲を収穫する。";
        let span = EvidenceExtractor::default().extract(source, "稲の収穫");
        assert_eq!(span.start_char, 0);
        assert_in_bounds(source, &span);
    }

    #[test]
    fn test_surrounding_whitespace_is_stripped() {
        let source = "  前置き。\n  稲・麦・大豆などの作物に対応する。 ";
        let span = EvidenceExtractor::default().extract(source, "どのような作物に対応していますか");
        assert_eq!(span.text, "稲・麦・大豆などの作物に対応する。");
        assert_in_bounds(source, &span);
    }

    #[test]
    fn test_fast_mode_prefers_crop_list() {
        let extractor = EvidenceExtractor::new(ExtractorMode::Fast);
        let span = extractor.extract(COMBINE_DOC, "どのような作物に対応していますか");
        assert!(span.text.starts_with("普通型は主に"));
        assert_in_bounds(COMBINE_DOC, &span);
    }

    #[test]
    fn test_fast_mode_keyword_overlap() {
        let extractor = EvidenceExtractor::new(ExtractorMode::Fast);
        let span = extractor.extract(TWO_SENTENCES, "日本のコンバインの大別");
        assert!(span.text.starts_with("日本で使われている"));
    }

    #[test]
    fn test_english_definition() {
        let source = "Harvest season starts in autumn. A combine is a machine that reaps and threshes grain.";
        let span = EvidenceExtractor::default().extract(source, "What is a combine?");
        assert_eq!(span.text, "A combine is a machine that reaps and threshes grain.");
        assert_in_bounds(source, &span);
    }

    /// Small deterministic generator so failures reproduce
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0 >> 33
        }

        fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
            &items[self.next() as usize % items.len()]
        }
    }

    const ALPHABET: &[char] = &[
        'コ', 'ン', 'バ', 'イ', '稲', '麦', '収', '穫', '機', '械', '、', '・', '「', '」', 'a', 'b', 'z', '1', '9', '.',
        '。', '！', '？', '!', '?', ' ', '　', '\n', '\t',
    ];

    const QUERIES: &[&str] = &[
        "コンバインとは何ですか",
        "稲の種類を教えて",
        "収穫機械の手順は？",
        "What is a combine?",
        "",
        "   ",
        "の",
    ];

    #[test]
    fn test_random_sources_keep_span_invariants() {
        let mut rng = Lcg(0x6b6f6e6b796f);
        let extractors = [
            EvidenceExtractor::new(ExtractorMode::Rich),
            EvidenceExtractor::new(ExtractorMode::Fast),
        ];

        for _ in 0..3000 {
            let len = rng.next() as usize % 80;
            let source: String = (0..len).map(|_| *rng.pick(ALPHABET)).collect();
            let query = *rng.pick(QUERIES);

            for extractor in &extractors {
                let span = extractor.extract(&source, query);
                assert!(span.start_char <= span.end_char, "{source:?}");
                assert!(span.end_char <= text::char_len(&source), "{source:?}");
                assert_eq!(text::char_slice(&source, span.start_char, span.end_char), span.text);
                if !source.trim().is_empty() {
                    assert!(!span.text.is_empty(), "{source:?}");
                    assert_eq!(span.text, span.text.trim(), "{source:?}");
                }
            }
        }
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("rich".parse::<ExtractorMode>().unwrap(), ExtractorMode::Rich);
        assert_eq!("ultra-fast".parse::<ExtractorMode>().unwrap(), ExtractorMode::Fast);
        assert!("smart".parse::<ExtractorMode>().is_err());
    }
}
