//! Indexer stage: flattens documents, detects language and extracts keywords
//! and anchor-candidate phrases.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use crc32fast::Hasher as Crc32;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactHeader};
use crate::document::{Document, DocumentId, DocumentKind, Language, LinkTarget, PublishStatus};
use crate::richtext::RichText;
use crate::summary::StageSummary;
use crate::text::{
    collapse_whitespace, detect_language, is_kanji, is_katakana, DEFAULT_JAPANESE_THRESHOLD,
};

/// Default cap on anchor phrases per document.
pub const DEFAULT_MAX_PHRASES: usize = 100;

static NOUN_PARTICLE_NOUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ァ-ヶー一-龠]{2,}[のとで][ァ-ヶー一-龠]{2,}").expect("valid regex"));
static KATAKANA_KANJI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ァ-ヶー]{3,}[一-龠]{1,4}").expect("valid regex"));
static KATAKANA_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ァ-ヶー]{3,}").expect("valid regex"));
static NUMBER_UNIT_NOUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9０-９]+(?:ヤード|メートル|番|度|打|本|回|球|yd|m)[ァ-ヶー一-龠]{2,6}")
        .expect("valid regex")
});
static ENGLISH_OF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z]{3,}\s+of\s+(?:the\s+)?[a-z]{3,}\b").expect("valid regex")
});
static ENGLISH_POSSESSIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[a-z]{2,}'s\s+[a-z]{3,}\b").expect("valid regex"));
static PARTICLES_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[のがをはでにへとも]+$").expect("valid regex"));

const DEFAULT_COMPOUNDS: &[&str] = &[
    "ゴルフスイング", "スイングプレーン", "バックスイング", "ダウンスイング",
    "フォロースルー", "インパクトゾーン", "スイングアーク", "テークバック",
    "アドレスポジション", "トップオブスイング", "スイングパス", "スイングテンポ",
    "ドライバーショット", "アイアンショット", "パターストローク", "ウェッジショット",
    "フェアウェイウッド", "ユーティリティクラブ", "サンドウェッジ", "ピッチングウェッジ",
    "ロブウェッジ", "ギャップウェッジ", "ティーショット", "アプローチショット",
    "バンカーショット", "グリーン周り", "ピンポジション", "コースマネジメント",
    "クラブ選択", "ショット選択", "コース戦略", "ホールレイアウト",
    "グリーンリーディング", "ゴルフ練習", "ゴルフレッスン", "練習方法", "上達方法",
    "飛距離アップ", "方向性向上", "スコアメイク", "ミスショット", "スイング改善",
    "グリップ練習", "パッティング練習", "ショートゲーム", "ゴルフクラブ",
    "ゴルフボール", "ゴルフシューズ", "ゴルフグローブ", "キャディバッグ",
    "ゴルフウェア", "レンジファインダー", "スコアカード", "ゴルフルール",
    "ゴルフマナー", "エチケット", "ローカルルール", "ペナルティストローク",
    "アンプレイアブル", "ウォーターハザード", "OBライン", "メンタルゲーム",
    "プレッシャー対処", "集中力向上", "ルーティン確立", "プレショットルーティン",
    "ポストショットルーティン", "ビジュアライゼーション", "初心者ゴルファー",
    "初心者向け", "ゴルフ入門", "ゴルフデビュー", "基本スイング", "基本グリップ",
    "基本スタンス", "基本アドレス", "ヘッドカバー", "距離計", "グリーンフォーク",
    "ポロシャツ", "ゴルフパンツ", "レインウェア", "サンバイザー", "ゴルフソックス",
    "練習器具", "スイング練習", "トレーニング用品", "練習マット", "ゴルフ用品",
    "ゴルフグッズ", "ゴルフアクセサリー",
];

const DEFAULT_TERMS: &[&str] = &[
    "ドライバー", "アイアン", "パター", "ウェッジ", "フェアウェイ", "グリーン",
    "バンカー", "ラフ", "ティー", "ピン", "カップ", "スイング", "グリップ",
    "スタンス", "アドレス", "インパクト", "フォロー", "フィニッシュ", "テンポ",
    "リズム", "タイミング", "スライス", "フック", "ドロー", "フェード",
    "プッシュ", "プル", "トップ", "ダフり", "シャンク", "チーピン", "テンプラ",
    "パー", "バーディ", "イーグル", "ボギー", "アルバトロス", "ハンディキャップ",
    "スコア", "ストローク", "ヤード", "メートル", "ユーティリティ", "マーカー",
    "シャフト", "キャップ", "素振り", "ネット",
];

/// Curated domain vocabulary scanned literally against each document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gazetteer {
    /// Multi-part terms added as-is when present.
    #[serde(default)]
    pub compounds: Vec<String>,
    /// Short terms; an occurrence is widened to the surrounding katakana/kanji run.
    #[serde(default)]
    pub terms: Vec<String>,
}

impl Default for Gazetteer {
    fn default() -> Self {
        Self {
            compounds: DEFAULT_COMPOUNDS.iter().map(|s| s.to_string()).collect(),
            terms: DEFAULT_TERMS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Gazetteer {
    /// Loads `{"compounds": [...], "terms": [...]}` from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read gazetteer {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid gazetteer {:?}", path))
    }

    fn all_terms(&self) -> impl Iterator<Item = &str> {
        self.compounds
            .iter()
            .chain(self.terms.iter())
            .map(String::as_str)
    }
}

/// Indexer tunables.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Japanese share above which text counts as Japanese.
    pub japanese_threshold: f64,
    /// Cap on anchor phrases per entry.
    pub max_phrases: usize,
    /// Index drafts as well as published documents.
    pub include_drafts: bool,
    /// Domain vocabulary.
    pub gazetteer: Gazetteer,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            japanese_threshold: DEFAULT_JAPANESE_THRESHOLD,
            max_phrases: DEFAULT_MAX_PHRASES,
            include_drafts: false,
            gazetteer: Gazetteer::default(),
        }
    }
}

/// Normalized, derived view of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Store id.
    pub id: DocumentId,
    /// Post or product.
    pub kind: DocumentKind,
    /// Title.
    pub title: String,
    /// Excerpt or description.
    #[serde(default)]
    pub summary: String,
    /// Effective language.
    pub language: Language,
    /// Ordered unique keywords; the first is the primary keyword.
    pub keywords: Vec<String>,
    /// Anchor-candidate phrases, longest first.
    pub anchor_phrases: Vec<String>,
    /// Category titles.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Where links to this document point.
    pub link: LinkTarget,
    /// Publication state.
    pub status: PublishStatus,
    /// Flattened body text.
    pub text: String,
    /// CRC32 of the normalized title, summary and body.
    pub content_hash: u32,
}

/// Output of the `indexer` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexArtifact {
    /// Shared header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// One entry per indexed document.
    pub entries: Vec<IndexEntry>,
}

impl IndexArtifact {
    /// Wraps entries with a fresh header.
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self {
            header: ArtifactHeader::now(),
            entries,
        }
    }

    /// Looks an entry up by id.
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }
}

impl Artifact for IndexArtifact {
    const PRODUCER: &'static str = "indexer";

    fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    fn validate(&self) -> Result<(), String> {
        let mut seen = BTreeSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(format!("duplicate index entry {}", entry.id));
            }
        }
        Ok(())
    }
}

/// Indexes every eligible document.
///
/// Drafts are skipped unless configured otherwise. A document whose tree
/// cannot be read still yields an entry, with empty text and phrases, and is
/// counted as errored.
pub fn build_index(
    documents: &[Document],
    config: &IndexConfig,
) -> (Vec<IndexEntry>, StageSummary) {
    let mut summary = StageSummary::default();
    let mut entries = Vec::with_capacity(documents.len());
    for doc in documents {
        if !config.include_drafts && doc.status != PublishStatus::Published {
            summary.skipped += 1;
            continue;
        }
        summary.processed += 1;
        let body = match &doc.content {
            None => Ok(String::new()),
            Some(value) => RichText::from_value(value).map(|tree| tree.flatten()),
        };
        let entry = match body {
            Ok(body) => index_document(doc, &collapse_whitespace(&body), config),
            Err(err) => {
                tracing::warn!(
                    id = %doc.id,
                    error = %err,
                    "malformed rich text; indexing metadata only"
                );
                summary.errored += 1;
                degraded_entry(doc, config)
            }
        };
        tracing::debug!(
            id = %entry.id,
            language = %entry.language,
            phrases = entry.anchor_phrases.len(),
            keywords = entry.keywords.len(),
            "indexed document"
        );
        entries.push(entry);
    }
    (entries, summary)
}

fn index_document(doc: &Document, body: &str, config: &IndexConfig) -> IndexEntry {
    let corpus = format!("{} {} {}", doc.title, doc.summary, body);
    let language = effective_language(doc, &corpus, config.japanese_threshold);

    let mut phrases = extract_phrases(&corpus, &config.gazetteer);
    if doc.kind == DocumentKind::Product {
        phrases.extend(doc.keywords.iter().map(|kw| kw.trim().to_string()));
    }

    IndexEntry {
        id: doc.id.clone(),
        kind: doc.kind,
        title: doc.title.clone(),
        summary: doc.summary.clone(),
        language,
        keywords: derive_keywords(doc, &config.gazetteer),
        anchor_phrases: finalize_phrases(phrases, config.max_phrases),
        categories: doc.categories.clone(),
        link: doc.link_target(),
        status: doc.status,
        text: body.to_string(),
        content_hash: content_hash(&doc.title, &doc.summary, body),
    }
}

fn degraded_entry(doc: &Document, config: &IndexConfig) -> IndexEntry {
    let corpus = format!("{} {}", doc.title, doc.summary);
    IndexEntry {
        id: doc.id.clone(),
        kind: doc.kind,
        title: doc.title.clone(),
        summary: doc.summary.clone(),
        language: effective_language(doc, &corpus, config.japanese_threshold),
        keywords: derive_keywords(doc, &config.gazetteer),
        anchor_phrases: Vec::new(),
        categories: doc.categories.clone(),
        link: doc.link_target(),
        status: doc.status,
        text: String::new(),
        content_hash: content_hash(&doc.title, &doc.summary, ""),
    }
}

fn effective_language(doc: &Document, corpus: &str, threshold: f64) -> Language {
    let detected = detect_language(corpus, doc.kind, threshold);
    match (doc.kind, doc.language) {
        (DocumentKind::Product, Some(hint)) => hint,
        (DocumentKind::Post, Some(hint)) if hint != Language::Both => hint,
        _ => detected,
    }
}

/// CRC32 over the whitespace-normalized title, summary and body.
pub fn content_hash(title: &str, summary: &str, body: &str) -> u32 {
    let normalized = collapse_whitespace(&format!("{} {} {}", title, summary, body));
    let mut hasher = Crc32::new();
    hasher.update(normalized.as_bytes());
    hasher.finalize()
}

/// Raw phrase candidates from the gazetteer, regex shapes and katakana runs.
pub fn extract_phrases(text: &str, gazetteer: &Gazetteer) -> Vec<String> {
    let mut phrases = Vec::new();

    for compound in &gazetteer.compounds {
        if !compound.is_empty() && text.contains(compound.as_str()) {
            phrases.push(compound.clone());
        }
    }
    for term in &gazetteer.terms {
        phrases.extend(widened_occurrences(text, term));
    }

    for found in NOUN_PARTICLE_NOUN.find_iter(text) {
        let len = found.as_str().chars().count();
        if (4..=15).contains(&len) {
            phrases.push(found.as_str().to_string());
        }
    }
    for found in KATAKANA_KANJI.find_iter(text) {
        let len = found.as_str().chars().count();
        if (4..=12).contains(&len) {
            phrases.push(found.as_str().to_string());
        }
    }
    for pattern in [&*NUMBER_UNIT_NOUN, &*ENGLISH_OF, &*ENGLISH_POSSESSIVE] {
        phrases.extend(
            pattern
                .find_iter(text)
                .map(|found| collapse_whitespace(found.as_str())),
        );
    }
    phrases.extend(
        KATAKANA_RUN
            .find_iter(text)
            .map(|found| found.as_str().to_string()),
    );
    phrases
}

/// Each occurrence of `term`, widened to the katakana/kanji run around it.
fn widened_occurrences(text: &str, term: &str) -> Vec<String> {
    if term.is_empty() {
        return Vec::new();
    }
    let is_run_char = |ch: char| is_katakana(ch) || is_kanji(ch);
    let mut out = Vec::new();
    for (start, _) in text.match_indices(term) {
        let end = start + term.len();
        let left = text[..start]
            .char_indices()
            .rev()
            .take_while(|(_, ch)| is_run_char(*ch))
            .last()
            .map(|(idx, _)| idx)
            .unwrap_or(start);
        let right = text[end..]
            .char_indices()
            .take_while(|(_, ch)| is_run_char(*ch))
            .last()
            .map(|(idx, ch)| end + idx + ch.len_utf8())
            .unwrap_or(end);
        out.push(text[left..right].to_string());
    }
    out
}

/// Dedupes, drops particles and one-character noise, sorts longest first and caps.
pub fn finalize_phrases(phrases: Vec<String>, max: usize) -> Vec<String> {
    let unique: BTreeSet<String> = phrases
        .into_iter()
        .map(|phrase| phrase.trim().to_string())
        .filter(|phrase| phrase.chars().count() >= 2 && !PARTICLES_ONLY.is_match(phrase))
        .collect();
    let mut sorted: Vec<String> = unique.into_iter().collect();
    sorted.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    sorted.truncate(max);
    sorted
}

fn derive_keywords(doc: &Document, gazetteer: &Gazetteer) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let mut push = |value: &str| {
        let value = value.trim();
        if value.chars().count() >= 2
            && !keywords
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(value))
        {
            keywords.push(value.to_string());
        }
    };
    for keyword in &doc.keywords {
        push(keyword);
    }
    for category in &doc.categories {
        push(category);
    }
    for term in gazetteer.all_terms() {
        if !term.is_empty() && doc.title.contains(term) {
            push(term);
        }
    }
    for found in KATAKANA_RUN.find_iter(&doc.title) {
        push(found.as_str());
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn post(id: &str, title: &str, body: &str) -> Document {
        Document {
            id: id.into(),
            kind: DocumentKind::Post,
            title: title.into(),
            slug: id.into(),
            summary: String::new(),
            content: Some(json!({"root": {"type": "root", "children": [
                {"type": "paragraph", "children": [{"type": "text", "text": body}]}
            ]}})),
            language: None,
            status: PublishStatus::Published,
            keywords: Vec::new(),
            categories: Vec::new(),
            url: None,
        }
    }

    #[test]
    fn indexes_japanese_post() {
        let doc = post("a", "スコアカードの書き方", "スコアカードの管理方法を解説します。");
        let (entries, summary) = build_index(&[doc], &IndexConfig::default());
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.errored, 0);
        let entry = &entries[0];
        assert_eq!(entry.language, Language::Ja);
        assert_eq!(entry.text, "スコアカードの管理方法を解説します。");
        assert!(entry.anchor_phrases.contains(&"スコアカード".to_string()));
        assert!(entry.anchor_phrases.contains(&"スコアカードの管理方法".to_string()));
        assert_eq!(entry.keywords[0], "スコアカード");
        assert_eq!(entry.link.url, "/posts/a");
    }

    #[test]
    fn malformed_tree_yields_empty_entry() {
        let mut doc = post("b", "Broken", "");
        doc.content = Some(json!({"children": []}));
        let (entries, summary) = build_index(&[doc], &IndexConfig::default());
        assert_eq!(summary.errored, 1);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].text.is_empty());
        assert!(entries[0].anchor_phrases.is_empty());
    }

    #[test]
    fn drafts_are_skipped_unless_requested() {
        let mut doc = post("c", "t", "body");
        doc.status = PublishStatus::Draft;
        let (entries, summary) = build_index(&[doc.clone()], &IndexConfig::default());
        assert!(entries.is_empty());
        assert_eq!(summary.skipped, 1);

        let config = IndexConfig {
            include_drafts: true,
            ..IndexConfig::default()
        };
        let (entries, _) = build_index(&[doc], &config);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn product_keywords_become_phrases_and_hint_wins() {
        let product = Document {
            id: "p".into(),
            kind: DocumentKind::Product,
            title: "Titleist ゴルフボール".into(),
            slug: String::new(),
            summary: String::new(),
            content: None,
            language: Some(Language::Both),
            status: PublishStatus::Published,
            keywords: vec!["ゴルフボール".into(), "golf ball".into()],
            categories: vec!["ボール".into()],
            url: Some("https://shop.example/ball".into()),
        };
        let (entries, _) = build_index(&[product], &IndexConfig::default());
        let entry = &entries[0];
        assert_eq!(entry.language, Language::Both);
        assert!(entry.anchor_phrases.contains(&"golf ball".to_string()));
        assert_eq!(entry.keywords[..3], ["ゴルフボール", "golf ball", "ボール"]);
        assert!(entry.link.sponsored);
    }

    #[test]
    fn phrases_are_filtered_sorted_and_capped() {
        let phrases = vec![
            "の".to_string(),
            "x".to_string(),
            "ab".to_string(),
            "abcd".to_string(),
            "abc".to_string(),
            "abcd".to_string(),
            "のが".to_string(),
        ];
        assert_eq!(finalize_phrases(phrases.clone(), 10), vec!["abcd", "abc", "ab"]);
        assert_eq!(finalize_phrases(phrases, 2), vec!["abcd", "abc"]);
    }

    #[test]
    fn extracts_pattern_shapes() {
        let gazetteer = Gazetteer {
            compounds: Vec::new(),
            terms: vec!["アイアン".into()],
        };
        let phrases = extract_phrases(
            "7番アイアンの打ち方 and the rules of golf, Hogan's swing",
            &gazetteer,
        );
        assert!(phrases.contains(&"7番アイアン".to_string()));
        assert!(phrases.contains(&"アイアン".to_string()));
        assert!(phrases.contains(&"rules of golf".to_string()));
        assert!(phrases.contains(&"Hogan's swing".to_string()));
    }

    #[test]
    fn content_hash_ignores_whitespace_noise() {
        assert_eq!(content_hash("a", "b", "c  d"), content_hash("a ", " b", "c d"));
        assert_ne!(content_hash("a", "b", "c"), content_hash("a", "b", "d"));
    }
}
