//! Character-level text helpers
//!
//! Every offset in konkyo is a character offset (Unicode scalar values),
//! 0-indexed and half-open. Byte offsets only appear inside this module,
//! at the moment a `&str` is sliced.

/// Sentence-terminal punctuation, Japanese and Western
pub const SENTENCE_TERMINATORS: &[char] = &['。', '！', '？', '．', '.', '!', '?'];

/// Closing brackets and quotes that stay with the sentence they close
const CLOSING_MARKS: &[char] = &['」', '』', '）', ')', '"', '\'', '”', '’', '】'];

/// Script class of a word character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Hiragana,
    Katakana,
    Kanji,
    Latin,
    Other,
}

/// Classify a character. The katakana middle dot `・` is a list
/// separator, not part of a word.
pub fn script_of(c: char) -> Script {
    match c {
        '\u{3040}'..='\u{309F}' => Script::Hiragana,
        '\u{30FB}' => Script::Other,
        '\u{30A0}'..='\u{30FF}' => Script::Katakana,
        '\u{4E00}'..='\u{9FAF}' | '々' => Script::Kanji,
        '0'..='9' | 'A'..='Z' | 'a'..='z' => Script::Latin,
        '０'..='９' | 'Ａ'..='Ｚ' | 'ａ'..='ｚ' => Script::Latin,
        _ => Script::Other,
    }
}

/// Japanese syllabary or CJK ideograph, as counted by language detection
pub fn is_japanese(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}' | '\u{4E00}'..='\u{9FAF}')
}

pub fn is_terminator(c: char) -> bool {
    SENTENCE_TERMINATORS.contains(&c)
}

/// Number of characters in `text`
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of character `char_idx`, or `text.len()` past the end
fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(b, _)| b)
        .unwrap_or(text.len())
}

/// Slice `text` by character offsets `[start, end)`, clamped to the text
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let start_byte = byte_offset(text, start);
    let end_byte = byte_offset(text, end.max(start));
    &text[start_byte..end_byte]
}

/// Convert a byte offset on a char boundary into a character offset
pub fn byte_to_char(text: &str, byte: usize) -> usize {
    text.get(..byte).map(char_len).unwrap_or_else(|| char_len(text))
}

/// Character offset of the first occurrence of `needle` at or after
/// character `from`
pub fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let from_byte = byte_offset(haystack, from);
    let tail = &haystack[from_byte..];
    tail.find(needle).map(|b| from + byte_to_char(tail, b))
}

/// `text` without trailing terminators, closing marks and whitespace
pub fn sentence_body(text: &str) -> &str {
    text.trim_end_matches(|c: char| is_terminator(c) || CLOSING_MARKS.contains(&c) || c.is_whitespace())
}

pub fn ends_with_terminator(text: &str) -> bool {
    text.trim_end_matches(|c: char| CLOSING_MARKS.contains(&c) || c.is_whitespace())
        .chars()
        .next_back()
        .is_some_and(is_terminator)
}

/// A trimmed sentence and its character range in the text it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl Sentence<'_> {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Split text into sentences.
///
/// A run of terminators and any closing marks right after it belong to the
/// sentence they end. A `.` between two ASCII digits is a decimal point.
/// Sentences are trimmed and empty ones dropped; `start`/`end` address the
/// trimmed text.
pub fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut segment_start = 0;
    let mut i = 0;

    while i < chars.len() {
        if !ends_sentence(&chars, i) {
            i += 1;
            continue;
        }

        let mut end = i + 1;
        while end < chars.len() && is_terminator(chars[end].1) {
            end += 1;
        }
        while end < chars.len() && CLOSING_MARKS.contains(&chars[end].1) {
            end += 1;
        }

        push_trimmed(text, &chars, segment_start, end, &mut sentences);
        segment_start = end;
        i = end;
    }

    push_trimmed(text, &chars, segment_start, chars.len(), &mut sentences);
    sentences
}

fn ends_sentence(chars: &[(usize, char)], i: usize) -> bool {
    let c = chars[i].1;
    if !is_terminator(c) {
        return false;
    }
    if c == '.' {
        let prev_digit = i > 0 && chars[i - 1].1.is_ascii_digit();
        let next_digit = chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit());
        if prev_digit && next_digit {
            return false;
        }
    }
    true
}

fn push_trimmed<'a>(
    text: &'a str,
    chars: &[(usize, char)],
    start: usize,
    end: usize,
    out: &mut Vec<Sentence<'a>>,
) {
    if start >= end {
        return;
    }
    let start_byte = chars[start].0;
    let end_byte = chars.get(end).map(|(b, _)| *b).unwrap_or(text.len());
    let raw = &text[start_byte..end_byte];

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }

    let leading = raw.chars().take_while(|c| c.is_whitespace()).count();
    let sentence_start = start + leading;
    out.push(Sentence {
        text: trimmed,
        start: sentence_start,
        end: sentence_start + char_len(trimmed),
    });
}

/// Lexical terms for term-frequency vectors and hashed embeddings.
///
/// Latin words are lower-cased whole words. Kanji and katakana runs become
/// character bigrams (a lone character is kept as a unigram). Hiragana is
/// skipped: it carries particles and inflection rather than content.
pub fn terms(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut run: Vec<char> = Vec::new();
    let mut run_script = Script::Other;

    for c in text.chars() {
        let script = match script_of(c) {
            // kanji compounds often mix in katakana; keep them in one run
            Script::Katakana | Script::Kanji => Script::Kanji,
            other => other,
        };
        if script != run_script && !run.is_empty() {
            flush_run(&mut run, run_script, &mut out);
        }
        run_script = script;
        if script != Script::Other {
            run.push(c);
        }
    }
    if !run.is_empty() {
        flush_run(&mut run, run_script, &mut out);
    }

    out
}

fn flush_run(run: &mut Vec<char>, script: Script, out: &mut Vec<String>) {
    match script {
        Script::Latin => out.push(run.iter().collect::<String>().to_lowercase()),
        Script::Kanji | Script::Katakana if run.len() == 1 => out.push(run[0].to_string()),
        Script::Kanji | Script::Katakana => {
            out.extend(run.windows(2).map(|pair| pair.iter().collect::<String>()));
        }
        Script::Hiragana | Script::Other => {}
    }
    run.clear();
}
