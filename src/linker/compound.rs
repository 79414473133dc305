//! Known compound words that a shorter anchor must never be cut out of.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::text::is_katakana;

const DEFAULT_COMPOUNDS: &[(&str, &[&str])] = &[
    ("スコア", &["スコアカード", "スコアリング", "スコアボード", "スコアメイク", "スコアアップ"]),
    ("プレー", &["プレーヤー", "プレースタイル", "プレーオフ", "プレーイング"]),
    (
        "ゴルフ",
        &[
            "ゴルファー",
            "ゴルフ場",
            "ゴルフクラブ",
            "ゴルフボール",
            "ゴルフバッグ",
            "ゴルフコース",
        ],
    ),
    ("ショット", &["ショットガン", "ショットメーカー", "ショットセレクション"]),
    ("パット", &["パッティング", "パッター", "パットライン"]),
    ("クラブ", &["クラブハウス", "クラブフェース", "クラブヘッド", "クラブセット"]),
    ("アイアン", &["アイアンショット", "アイアンセット"]),
    ("ドライバー", &["ドライバーショット"]),
    ("コース", &["コースマネジメント", "コースレコード", "コースレート", "コースコンディション"]),
    ("グリーン", &["グリーンキーパー", "グリーンフィー", "グリーンサイド", "グリーンスピード"]),
    ("フェアウェイ", &["フェアウェイウッド", "フェアウェイバンカー"]),
    ("スイング", &["スイングプレーン", "スイングスピード", "スイングアーク", "スイングテンポ"]),
    ("バック", &["バックスイング", "バックスピン", "バックティー"]),
    ("ボール", &["ボールマーカー", "ボールポジション", "ボールフライト"]),
    ("ラウンド", &["ラウンドレッスン"]),
    ("ハンディ", &["ハンディキャップ"]),
    ("ティー", &["ティーショット", "ティーグラウンド", "ティーアップ"]),
    ("アプローチ", &["アプローチショット", "アプローチウェッジ"]),
    ("フォロー", &["フォロースルー"]),
];

/// Mapping from a short phrase to the longer compounds it appears in.
///
/// Besides the table, a katakana phrase is never cut out of a longer katakana
/// run, so unknown loanword compounds are protected as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl Default for CompoundTable {
    fn default() -> Self {
        let entries = DEFAULT_COMPOUNDS
            .iter()
            .map(|(short, compounds)| {
                (
                    short.to_string(),
                    compounds.iter().map(|c| c.to_string()).collect(),
                )
            })
            .collect();
        Self { entries }
    }
}

impl CompoundTable {
    /// Table with no entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Loads a `{"short": ["longer", ...]}` JSON object and merges it over the defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read compound table {:?}", path))?;
        let extra: BTreeMap<String, Vec<String>> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid compound table {:?}", path))?;
        let mut table = Self::default();
        for (short, compounds) in extra {
            table.insert(short, compounds);
        }
        Ok(table)
    }

    /// Registers more compounds for `short`.
    pub fn insert(
        &mut self,
        short: impl Into<String>,
        compounds: impl IntoIterator<Item = String>,
    ) {
        let list = self.entries.entry(short.into()).or_default();
        for compound in compounds {
            if !compound.is_empty() && !list.contains(&compound) {
                list.push(compound);
            }
        }
    }

    /// Number of short phrases with registered compounds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no compounds are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `phrase`, found at byte offset `start` of `context`, is part
    /// of a longer word there.
    pub fn cuts_compound(&self, context: &str, start: usize, phrase: &str) -> bool {
        self.in_known_compound(context, start, phrase)
            || splits_katakana_run(context, start, phrase)
    }

    fn in_known_compound(&self, context: &str, start: usize, phrase: &str) -> bool {
        let Some(compounds) = self.entries.get(phrase) else {
            return false;
        };
        compounds.iter().any(|compound| {
            compound.match_indices(phrase).any(|(offset, _)| {
                start
                    .checked_sub(offset)
                    .and_then(|compound_start| context.get(compound_start..))
                    .is_some_and(|rest| rest.starts_with(compound.as_str()))
            })
        })
    }
}

fn splits_katakana_run(context: &str, start: usize, phrase: &str) -> bool {
    let end = start + phrase.len();
    let (Some(before), Some(after)) = (context.get(..start), context.get(end..)) else {
        return false;
    };
    let starts_katakana = phrase.chars().next().is_some_and(is_katakana);
    let ends_katakana = phrase.chars().next_back().is_some_and(is_katakana);
    (starts_katakana && before.chars().next_back().is_some_and(is_katakana))
        || (ends_katakana && after.chars().next().is_some_and(is_katakana))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(context: &str, phrase: &str) -> usize {
        context.find(phrase).expect("phrase present")
    }

    #[test]
    fn protects_known_compounds() {
        let table = CompoundTable::default();
        let text = "今日のスコアカードを確認";
        assert!(table.cuts_compound(text, at(text, "スコア"), "スコア"));
        let text = "今日のスコアを確認";
        assert!(!table.cuts_compound(text, at(text, "スコア"), "スコア"));
    }

    #[test]
    fn protects_kanji_suffixed_compounds() {
        let table = CompoundTable::default();
        let text = "近くのゴルフ場に行く";
        assert!(table.cuts_compound(text, at(text, "ゴルフ"), "ゴルフ"));
        let empty = CompoundTable::empty();
        assert!(!empty.cuts_compound(text, at(text, "ゴルフ"), "ゴルフ"));
    }

    #[test]
    fn protects_unlisted_katakana_runs() {
        let table = CompoundTable::empty();
        let text = "新しいパターカバー";
        assert!(table.cuts_compound(text, at(text, "パター"), "パター"));
        let text = "新しいパターを買う";
        assert!(!table.cuts_compound(text, at(text, "パター"), "パター"));
    }

    #[test]
    fn merges_custom_entries() {
        let mut table = CompoundTable::empty();
        table.insert("練習", vec!["練習場".to_string()]);
        let text = "練習場で打つ";
        assert!(table.cuts_compound(text, 0, "練習"));
        assert_eq!(table.len(), 1);
    }
}
