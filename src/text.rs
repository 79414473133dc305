//! Character-class helpers, whitespace normalization, language detection and the
//! tokenizer shared by the indexer, the local vectorizer and the link matcher.

use crate::document::{DocumentKind, Language};

/// Share of Japanese characters above which text is classified as Japanese.
pub const DEFAULT_JAPANESE_THRESHOLD: f64 = 0.2;

/// Hiragana block (U+3040..U+309F).
pub fn is_hiragana(ch: char) -> bool {
    ('\u{3040}'..='\u{309F}').contains(&ch)
}

/// Katakana block (U+30A0..U+30FF), including the prolonged sound mark.
pub fn is_katakana(ch: char) -> bool {
    ('\u{30A0}'..='\u{30FF}').contains(&ch) && ch != '・'
}

/// CJK unified ideographs plus extension A and the iteration mark.
pub fn is_kanji(ch: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&ch)
        || ('\u{3400}'..='\u{4DBF}').contains(&ch)
        || ch == '々'
}

/// Any character counted as Japanese script.
pub fn is_japanese(ch: char) -> bool {
    is_hiragana(ch) || is_katakana(ch) || is_kanji(ch)
}

/// Latin-script letter (ASCII plus Latin-1/Extended-A/B).
pub fn is_latin_letter(ch: char) -> bool {
    ch.is_ascii_alphabetic() || (ch.is_alphabetic() && (ch as u32) < 0x0250)
}

/// Characters that glue Latin words together for boundary purposes.
pub fn is_latin_word_char(ch: char) -> bool {
    is_latin_letter(ch) || ch.is_ascii_digit() || ch == '_'
}

/// True when the phrase contains at least one Japanese character.
pub fn contains_japanese(text: &str) -> bool {
    text.chars().any(is_japanese)
}

/// Collapses whitespace runs into single spaces and trims the result.
pub fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim().to_string()
}

/// Returns the first `max_chars` characters of `text` without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Classifies text by the ratio of Japanese characters to Latin letters.
///
/// Only products may come back as [`Language::Both`]; posts are forced to a
/// single language.
pub fn detect_language(text: &str, kind: DocumentKind, threshold: f64) -> Language {
    let mut japanese = 0usize;
    let mut latin = 0usize;
    for ch in text.chars() {
        if is_japanese(ch) {
            japanese += 1;
        } else if is_latin_letter(ch) {
            latin += 1;
        }
    }
    let total = japanese + latin;
    if total == 0 {
        return Language::En;
    }
    let japanese_share = japanese as f64 / total as f64;
    let latin_share = latin as f64 / total as f64;
    match kind {
        DocumentKind::Product if japanese_share > threshold && latin_share > threshold => {
            Language::Both
        }
        _ if japanese_share > threshold => Language::Ja,
        _ => Language::En,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenClass {
    Word,
    Hiragana,
    Katakana,
    Kanji,
}

impl TokenClass {
    fn of(ch: char) -> Option<Self> {
        if is_katakana(ch) {
            Some(Self::Katakana)
        } else if is_hiragana(ch) {
            Some(Self::Hiragana)
        } else if is_kanji(ch) {
            Some(Self::Kanji)
        } else if ch.is_alphanumeric() || ch == '_' {
            Some(Self::Word)
        } else {
            None
        }
    }
}

/// Lowercases and splits text into word runs and same-script CJK runs.
///
/// Tokens shorter than two characters are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_class: Option<TokenClass> = None;
    for ch in lowered.chars() {
        let class = TokenClass::of(ch);
        if class != current_class {
            flush_token(&mut tokens, &mut current);
            current_class = class;
        }
        if class.is_some() {
            current.push(ch);
        }
    }
    flush_token(&mut tokens, &mut current);
    tokens
}

fn flush_token(tokens: &mut Vec<String>, current: &mut String) {
    if current.chars().count() >= 2 {
        tokens.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_japanese_posts() {
        let lang = detect_language("スコアカードの管理方法", DocumentKind::Post, 0.2);
        assert_eq!(lang, Language::Ja);
        let lang = detect_language("How to keep a scorecard", DocumentKind::Post, 0.2);
        assert_eq!(lang, Language::En);
    }

    #[test]
    fn mixed_products_are_both_but_posts_are_not() {
        let text = "Titleist Pro V1 ゴルフボール ダース";
        assert_eq!(
            detect_language(text, DocumentKind::Product, 0.2),
            Language::Both
        );
        assert_eq!(detect_language(text, DocumentKind::Post, 0.2), Language::Ja);
    }

    #[test]
    fn empty_text_defaults_to_english() {
        assert_eq!(detect_language("", DocumentKind::Post, 0.2), Language::En);
    }

    #[test]
    fn tokenizer_splits_scripts() {
        let tokens = tokenize("スコアカードの管理方法 Golf-Swing x");
        assert_eq!(tokens, vec!["スコアカード", "管理方法", "golf", "swing"]);
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("ゴルフ練習", 3), "ゴルフ");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
