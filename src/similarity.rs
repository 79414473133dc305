//! Similarity engine: pairwise scoring of indexed documents.
//!
//! Each candidate pair gets a keyword score (literal hits of the target's
//! keywords in the source), a semantic score (cosine of the two embeddings)
//! and a metadata score (category Jaccard). Their weighted blend decides
//! acceptance and rank.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactHeader};
use crate::document::{DocumentId, DocumentKind};
use crate::embed::EmbeddingArtifact;
use crate::indexer::IndexEntry;
use crate::pool::run_ordered;
use crate::summary::StageSummary;

/// Scoring weights, gates and output limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight of the cosine similarity.
    pub semantic_weight: f64,
    /// Weight of the keyword score.
    pub keyword_weight: f64,
    /// Weight of the category overlap.
    pub metadata_weight: f64,
    /// Added when both documents have the same language.
    pub same_language_bonus: f64,
    /// Keyword-score contribution of the target's primary keyword.
    pub primary_keyword_weight: f64,
    /// Base contribution of further keywords, divided by `rank + 1`.
    pub secondary_keyword_weight: f64,
    /// How many further keywords and phrases are tried.
    pub secondary_keyword_limit: usize,
    /// Minimum combined score.
    pub threshold: f64,
    /// Keyword score that is accepted regardless of the combined score.
    pub standalone_keyword_score: f64,
    /// Candidates kept per source.
    pub top_k: usize,
    /// Cap for the keyword-diversity filter; `None` disables it.
    pub diversity_cap: Option<usize>,
    /// Kinds of documents that may be recommended.
    pub target_kinds: Vec<DocumentKind>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.6,
            keyword_weight: 0.3,
            metadata_weight: 0.1,
            same_language_bonus: 0.05,
            primary_keyword_weight: 0.4,
            secondary_keyword_weight: 0.3,
            secondary_keyword_limit: 10,
            threshold: 0.3,
            standalone_keyword_score: 0.4,
            top_k: 10,
            diversity_cap: None,
            target_kinds: vec![DocumentKind::Post, DocumentKind::Product],
        }
    }
}

/// Which signal carried a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Mostly literal keyword hits.
    Keyword,
    /// Mostly embedding similarity.
    Semantic,
    /// Keyword hits backed by a meaningful semantic score.
    Both,
}

/// One recommended target for a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Recommended document.
    pub target_id: DocumentId,
    /// Combined score in `[0, 1]`.
    pub score: f64,
    /// Keyword component.
    pub keyword_score: f64,
    /// Cosine component (negative similarities clamp to 0).
    pub semantic_score: f64,
    /// Category overlap component.
    pub metadata_score: f64,
    /// Target keywords found in the source, in target order.
    pub matched_keywords: Vec<String>,
    /// Dominant signal.
    pub match_type: MatchType,
}

/// Ranked candidates for one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Source document.
    pub source_id: DocumentId,
    /// Candidates, best first.
    pub candidates: Vec<MatchCandidate>,
}

/// Output of the `similarity` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchArtifact {
    /// Shared header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Settings the matches were computed with.
    pub scoring: ScoringConfig,
    /// One result per source document.
    pub results: Vec<MatchResult>,
}

impl Artifact for MatchArtifact {
    const PRODUCER: &'static str = "similarity";

    fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    fn validate(&self) -> Result<(), String> {
        for result in &self.results {
            for candidate in &result.candidates {
                if !(0.0..=1.0).contains(&candidate.score) {
                    return Err(format!(
                        "{} -> {} has score {} outside [0, 1]",
                        result.source_id, candidate.target_id, candidate.score
                    ));
                }
            }
            if result
                .candidates
                .windows(2)
                .any(|pair| pair[0].score < pair[1].score)
            {
                return Err(format!(
                    "candidates of {} are not sorted by score",
                    result.source_id
                ));
            }
        }
        Ok(())
    }
}

/// Cosine similarity; 0 when either vector has zero norm or lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Jaccard similarity of two case-insensitive label sets; 0 when both are empty.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let left: BTreeSet<String> = a.iter().map(|s| s.trim().to_lowercase()).collect();
    let right: BTreeSet<String> = b.iter().map(|s| s.trim().to_lowercase()).collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// Literal keyword hits of `target` inside the lowercased source text.
///
/// Returns the score (capped at 1) and the matched keywords in target order.
pub fn keyword_score(
    source_text: &str,
    target: &IndexEntry,
    config: &ScoringConfig,
) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut matched = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    if let Some(primary) = target.keywords.first() {
        let lowered = primary.trim().to_lowercase();
        if !lowered.is_empty() {
            if source_text.contains(&lowered) {
                score += config.primary_keyword_weight;
                matched.push(primary.trim().to_string());
            }
            seen.insert(lowered);
        }
    }

    let secondary = target
        .keywords
        .iter()
        .skip(1)
        .chain(target.anchor_phrases.iter())
        .filter_map(|term| {
            let lowered = term.trim().to_lowercase();
            (!lowered.is_empty() && seen.insert(lowered.clone())).then(|| (term, lowered))
        })
        .take(config.secondary_keyword_limit);
    for (rank, (term, lowered)) in secondary.enumerate() {
        if source_text.contains(&lowered) {
            score += config.secondary_keyword_weight / (rank as f64 + 1.0);
            matched.push(term.trim().to_string());
        }
    }
    (score.min(1.0), matched)
}

fn classify(keyword: f64, semantic: f64) -> MatchType {
    if keyword > 0.0 && semantic > 0.3 {
        MatchType::Both
    } else if keyword > semantic {
        MatchType::Keyword
    } else {
        MatchType::Semantic
    }
}

/// Scores one ordered pair; `None` when the pair is ineligible or below both gates.
pub fn score_pair(
    source: &IndexEntry,
    source_text: &str,
    source_vector: Option<&[f32]>,
    target: &IndexEntry,
    target_vector: Option<&[f32]>,
    config: &ScoringConfig,
) -> Option<MatchCandidate> {
    if source.id == target.id || !source.language.is_compatible(target.language) {
        return None;
    }
    let (keyword, matched_keywords) = keyword_score(source_text, target, config);
    let semantic = match (source_vector, target_vector) {
        (Some(a), Some(b)) => cosine(a, b).clamp(0.0, 1.0),
        _ => 0.0,
    };
    let metadata = jaccard(&source.categories, &target.categories);
    let bonus = if source.language == target.language {
        config.same_language_bonus
    } else {
        0.0
    };
    let score = (config.semantic_weight * semantic
        + config.keyword_weight * keyword
        + config.metadata_weight * metadata
        + bonus)
        .clamp(0.0, 1.0);

    if score < config.threshold && keyword < config.standalone_keyword_score {
        return None;
    }
    Some(MatchCandidate {
        target_id: target.id.clone(),
        score,
        keyword_score: keyword,
        semantic_score: semantic,
        metadata_score: metadata,
        matched_keywords,
        match_type: classify(keyword, semantic),
    })
}

/// Keeps a candidate only when it brings at least one keyword no earlier
/// kept candidate matched, narrowing its keywords to the new ones.
pub fn diversify(candidates: Vec<MatchCandidate>, cap: usize) -> Vec<MatchCandidate> {
    let (kept, _claimed) = candidates.into_iter().fold(
        (Vec::new(), BTreeSet::<String>::new()),
        |(mut kept, mut claimed), mut candidate| {
            if kept.len() >= cap {
                return (kept, claimed);
            }
            let fresh: Vec<String> = candidate
                .matched_keywords
                .iter()
                .filter(|keyword| !claimed.contains(&keyword.to_lowercase()))
                .cloned()
                .collect();
            if fresh.is_empty() {
                return (kept, claimed);
            }
            claimed.extend(fresh.iter().map(|keyword| keyword.to_lowercase()));
            candidate.matched_keywords = fresh;
            kept.push(candidate);
            (kept, claimed)
        },
    );
    kept
}

fn rank(mut candidates: Vec<MatchCandidate>, config: &ScoringConfig) -> Vec<MatchCandidate> {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.target_id.cmp(&b.target_id))
    });
    let mut candidates = match config.diversity_cap {
        Some(cap) => diversify(candidates, cap),
        None => candidates,
    };
    candidates.truncate(config.top_k);
    candidates
}

/// Computes ranked matches for every post in `entries`.
///
/// Sources are scored in parallel on `workers` threads; output order follows
/// the index. Documents without an embedding score 0 semantically.
pub fn compute_matches(
    entries: &[IndexEntry],
    embeddings: &EmbeddingArtifact,
    config: &ScoringConfig,
    workers: usize,
) -> (Vec<MatchResult>, StageSummary) {
    let vectors: HashMap<&str, &[f32]> = embeddings
        .embeddings
        .iter()
        .map(|embedding| (embedding.document_id.as_str(), embedding.vector.as_slice()))
        .collect();
    let targets: Vec<&IndexEntry> = entries
        .iter()
        .filter(|entry| config.target_kinds.contains(&entry.kind))
        .collect();
    let sources: Vec<&IndexEntry> = entries
        .iter()
        .filter(|entry| entry.kind == DocumentKind::Post)
        .collect();

    let summary = StageSummary {
        processed: sources.len(),
        skipped: entries.len() - sources.len(),
        errored: 0,
    };
    for source in &sources {
        if !vectors.contains_key(source.id.as_str()) {
            tracing::warn!(id = %source.id, "no embedding for source; keyword scoring only");
        }
    }

    let results = run_ordered(sources, workers, |_, source| {
        let source_text = format!("{} {}", source.title, source.text).to_lowercase();
        let source_vector = vectors.get(source.id.as_str()).copied();
        let candidates: Vec<MatchCandidate> = targets
            .iter()
            .filter_map(|target| {
                score_pair(
                    source,
                    &source_text,
                    source_vector,
                    target,
                    vectors.get(target.id.as_str()).copied(),
                    config,
                )
            })
            .collect();
        let candidates = rank(candidates, config);
        tracing::debug!(id = %source.id, candidates = candidates.len(), "scored source");
        MatchResult {
            source_id: source.id.clone(),
            candidates,
        }
    });
    (results, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Language, LinkTarget, PublishStatus};
    use crate::embed::{Embedding, EmbeddingSource};
    use pretty_assertions::assert_eq;

    fn entry(id: &str, kind: DocumentKind, keywords: &[&str], text: &str) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            kind,
            title: id.into(),
            summary: String::new(),
            language: Language::Ja,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            anchor_phrases: Vec::new(),
            categories: Vec::new(),
            link: LinkTarget {
                url: format!("/posts/{id}"),
                sponsored: false,
                new_tab: false,
            },
            status: PublishStatus::Published,
            text: text.into(),
            content_hash: 0,
        }
    }

    fn artifact(vectors: &[(&str, Vec<f32>)]) -> EmbeddingArtifact {
        EmbeddingArtifact {
            header: ArtifactHeader::now(),
            source: EmbeddingSource {
                provider: "local".into(),
                model: "hashed-tf".into(),
                dimension: 2,
                fallback: false,
            },
            dimension: 2,
            embeddings: vectors
                .iter()
                .map(|(id, vector)| Embedding {
                    document_id: id.to_string(),
                    vector: vector.clone(),
                    source_text_hash: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn cosine_properties() {
        assert!((cosine(&[0.3, 0.4], &[0.3, 0.4]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn keyword_score_decays_and_caps() {
        let target = entry("t", DocumentKind::Product, &["スコア", "管理", "方法"], "");
        let config = ScoringConfig::default();
        let (score, matched) = keyword_score("スコアの管理方法", &target, &config);
        assert!((score - (0.4 + 0.3 + 0.15)).abs() < 1e-9);
        assert_eq!(matched, vec!["スコア", "管理", "方法"]);

        let many: Vec<String> = (0..20).map(|i| format!("k{i}")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let target = entry("t", DocumentKind::Product, &refs, "");
        let text = many.join(" ");
        let (score, _) = keyword_score(&text, &target, &config);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn threshold_gate_and_standalone_bar() {
        let source = entry("s", DocumentKind::Post, &[], "今日はスコアを確認");
        let strong = entry("a", DocumentKind::Post, &["スコア"], "");
        let weak = entry("b", DocumentKind::Post, &["パター"], "");
        let config = ScoringConfig {
            same_language_bonus: 0.0,
            ..ScoringConfig::default()
        };
        let text = "s 今日はスコアを確認".to_lowercase();
        let hit = score_pair(&source, &text, None, &strong, None, &config).expect("kept");
        assert_eq!(hit.match_type, MatchType::Keyword);
        assert!(hit.score < config.threshold);
        assert!(score_pair(&source, &text, None, &weak, None, &config).is_none());
    }

    #[test]
    fn incompatible_languages_and_self_pairs_are_skipped() {
        let source = entry("s", DocumentKind::Post, &["golf"], "golf");
        let mut english = entry("e", DocumentKind::Post, &["golf"], "golf");
        english.language = Language::En;
        let config = ScoringConfig::default();
        assert!(score_pair(&source, "golf", None, &english, None, &config).is_none());
        assert!(score_pair(&source, "golf", None, &source, None, &config).is_none());
        english.language = Language::Both;
        assert!(score_pair(&source, "golf", None, &english, None, &config).is_some());
    }

    #[test]
    fn diversity_filter_narrows_and_skips() {
        let candidate = |id: &str, score: f64, keywords: &[&str]| MatchCandidate {
            target_id: id.into(),
            score,
            keyword_score: 0.5,
            semantic_score: 0.0,
            metadata_score: 0.0,
            matched_keywords: keywords.iter().map(|s| s.to_string()).collect(),
            match_type: MatchType::Keyword,
        };
        let kept = diversify(
            vec![
                candidate("a", 0.9, &["スコア", "管理"]),
                candidate("b", 0.8, &["スコア"]),
                candidate("c", 0.7, &["管理", "パター"]),
                candidate("d", 0.6, &[]),
            ],
            10,
        );
        let ids: Vec<_> = kept.iter().map(|c| c.target_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(kept[1].matched_keywords, vec!["パター"]);
    }

    #[test]
    fn computes_sorted_matches_with_tie_break() {
        let entries = vec![
            entry("s", DocumentKind::Post, &[], "スコアの話"),
            entry("b", DocumentKind::Post, &["スコア"], ""),
            entry("a", DocumentKind::Post, &["スコア"], ""),
            entry("p", DocumentKind::Product, &["パター"], ""),
        ];
        let vectors = artifact(&[
            ("s", vec![1.0, 0.0]),
            ("a", vec![1.0, 0.0]),
            ("b", vec![1.0, 0.0]),
            ("p", vec![0.0, 1.0]),
        ]);
        let (results, summary) = compute_matches(&entries, &vectors, &ScoringConfig::default(), 2);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.skipped, 1);
        let source = results.iter().find(|r| r.source_id == "s").unwrap();
        let ids: Vec<_> = source.candidates.iter().map(|c| c.target_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(source.candidates[0].match_type, MatchType::Both);
        for result in &results {
            for candidate in &result.candidates {
                assert!((0.0..=1.0).contains(&candidate.score));
            }
        }
    }

    #[test]
    fn artifact_rejects_unsorted_candidates() {
        let candidate = |score: f64| MatchCandidate {
            target_id: "t".into(),
            score,
            keyword_score: 0.0,
            semantic_score: score,
            metadata_score: 0.0,
            matched_keywords: Vec::new(),
            match_type: MatchType::Semantic,
        };
        let artifact = MatchArtifact {
            header: ArtifactHeader::now(),
            scoring: ScoringConfig::default(),
            results: vec![MatchResult {
                source_id: "s".into(),
                candidates: vec![candidate(0.4), candidate(0.9)],
            }],
        };
        assert!(artifact.validate().is_err());
    }
}
