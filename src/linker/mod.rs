//! Link applier: inserts anchors for ranked match candidates into a
//! document's rich-text body.
//!
//! Each document goes through four steps:
//!
//! 1. scan: every text leaf outside a link node becomes a search buffer,
//!    tagged with its enclosing block; headings are left out unless enabled;
//! 2. match: candidate phrases are located in each buffer, subject to the
//!    Latin word-boundary rule and the compound-word table;
//! 3. resolve: spans are ranked (score, document order, start, length) and
//!    taken greedily while they do not overlap, do not reuse a target, an
//!    anchor text or (by default) a block, and stay under the per-document
//!    cap. With spreading on, a first pass visits evenly spaced blocks;
//! 4. splice: each affected leaf is replaced by its leading text, the link
//!    and its trailing text, all carrying the leaf's formatting.
//!
//! The input tree is never modified; a new tree is returned.

pub mod compound;
pub mod unlink;

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::artifact::{Artifact, ArtifactHeader};
use crate::controls::LinkControls;
use crate::document::{DocumentId, LinkTarget};
use crate::indexer::IndexArtifact;
use crate::richtext::{Node, NodeKind, RichText, TreeError};
use crate::similarity::MatchResult;
use crate::store::{ContentStore, DocumentPatch};
use crate::summary::StageSummary;
use crate::text::is_latin_word_char;

pub use compound::CompoundTable;
pub use unlink::{unlink, unlink_documents, UnlinkReport, UnlinkScope};

/// A target the applier may link to from one source document.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkCandidate {
    /// Target document.
    pub target_id: DocumentId,
    /// Match score from the similarity stage.
    pub score: f64,
    /// Destination and link behaviour.
    pub link: LinkTarget,
    /// Phrases that may become anchor text, longest first.
    pub phrases: Vec<String>,
}

/// An anchor inserted by [`apply_links`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorSpan {
    /// Target document.
    pub target_id: DocumentId,
    /// Visible anchor text, exactly as it appears in the document.
    pub text: String,
    /// Link destination.
    pub url: String,
    /// Sponsored link.
    pub sponsored: bool,
    /// Score of the candidate the anchor was inserted for.
    pub score: f64,
}

/// Result of linking one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkOutcome {
    /// The rewritten tree (equal to the input when nothing was inserted).
    pub tree: RichText,
    /// Inserted anchors in resolution order.
    pub anchors: Vec<AnchorSpan>,
}

struct Buffer {
    path: Vec<usize>,
    block: usize,
    text: String,
    context: String,
    offset: usize,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    buffer: usize,
    start: usize,
    end: usize,
    candidate: usize,
    score: f64,
}

impl Span {
    fn overlaps(&self, other: &Span) -> bool {
        self.buffer == other.buffer && self.start < other.end && other.start < self.end
    }
}

/// Builds the candidates for one source from its match result.
///
/// Targets missing from the index, scoring below the minimum or without a
/// usable phrase are left out.
pub fn build_candidates(
    result: &MatchResult,
    index: &IndexArtifact,
    controls: &LinkControls,
) -> Vec<LinkCandidate> {
    let mut out = Vec::new();
    for matched in &result.candidates {
        if out.len() >= controls.max_candidates() {
            break;
        }
        if matched.score < controls.min_score() {
            continue;
        }
        let Some(target) = index.get(&matched.target_id) else {
            tracing::debug!(target = %matched.target_id, "match target missing from index");
            continue;
        };
        let mut seen = HashSet::new();
        let mut phrases: Vec<String> = target
            .anchor_phrases
            .iter()
            .chain(target.keywords.iter())
            .map(|phrase| phrase.trim().to_string())
            .filter(|phrase| controls.is_anchor_allowed(phrase))
            .filter(|phrase| seen.insert(phrase.to_lowercase()))
            .collect();
        if phrases.is_empty() {
            continue;
        }
        phrases.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        out.push(LinkCandidate {
            target_id: target.id.clone(),
            score: matched.score,
            link: target.link.clone(),
            phrases,
        });
    }
    out
}

/// Inserts links for `candidates` into `tree`.
pub fn apply_links(
    tree: &RichText,
    candidates: &[LinkCandidate],
    compounds: &CompoundTable,
    controls: &LinkControls,
) -> LinkOutcome {
    let unchanged = || LinkOutcome {
        tree: tree.clone(),
        anchors: Vec::new(),
    };

    let existing = tree.links();
    let budget = controls
        .max_links_per_document()
        .saturating_sub(existing.len());
    if budget == 0 || candidates.is_empty() {
        return unchanged();
    }
    let linked_urls: HashSet<&str> = existing
        .iter()
        .filter_map(|link| link.url.as_deref())
        .collect();
    let used_anchors: HashSet<String> = existing
        .iter()
        .map(|link| link.text.trim().to_lowercase())
        .filter(|text| !text.is_empty())
        .collect();

    let buffers = scan(tree, controls.link_headings());
    let spans = find_spans(&buffers, candidates, &linked_urls, compounds);
    if spans.is_empty() {
        return unchanged();
    }

    let mut resolver = Resolver {
        buffers: &buffers,
        candidates,
        budget,
        one_per_block: controls.one_link_per_block(),
        kept: Vec::new(),
        used_targets: HashSet::new(),
        used_anchors,
        used_blocks: HashSet::new(),
    };
    if controls.spread_links() {
        let mut blocks: Vec<usize> = spans
            .iter()
            .map(|span| buffers[span.buffer].block)
            .collect();
        blocks.sort_unstable();
        blocks.dedup();
        let step = (blocks.len() / budget).max(1);
        for block in blocks.into_iter().step_by(step) {
            if resolver.is_full() {
                break;
            }
            for span in spans.iter().filter(|span| buffers[span.buffer].block == block) {
                if resolver.offer(*span) {
                    break;
                }
            }
        }
    }
    for span in &spans {
        if resolver.is_full() {
            break;
        }
        resolver.offer(*span);
    }
    let kept = resolver.kept;

    let anchors: Vec<AnchorSpan> = kept
        .iter()
        .map(|span| {
            let candidate = &candidates[span.candidate];
            AnchorSpan {
                target_id: candidate.target_id.clone(),
                text: buffers[span.buffer].text[span.start..span.end].to_string(),
                url: candidate.link.url.clone(),
                sponsored: candidate.link.sponsored,
                score: candidate.score,
            }
        })
        .collect();

    let mut by_path: HashMap<&[usize], Vec<Span>> = HashMap::new();
    for span in &kept {
        by_path
            .entry(buffers[span.buffer].path.as_slice())
            .or_default()
            .push(*span);
    }
    let tree = tree.rewrite(&mut |path, node| match by_path.get(path) {
        Some(spans) if node.is_text() => splice(node, spans, candidates),
        _ => vec![node],
    });

    LinkOutcome { tree, anchors }
}

struct Resolver<'a> {
    buffers: &'a [Buffer],
    candidates: &'a [LinkCandidate],
    budget: usize,
    one_per_block: bool,
    kept: Vec<Span>,
    used_targets: HashSet<&'a str>,
    used_anchors: HashSet<String>,
    used_blocks: HashSet<usize>,
}

impl Resolver<'_> {
    fn is_full(&self) -> bool {
        self.kept.len() >= self.budget
    }

    /// Keeps `span` when it breaks none of the placement rules.
    fn offer(&mut self, span: Span) -> bool {
        if self.is_full() {
            return false;
        }
        let (buffers, candidates) = (self.buffers, self.candidates);
        let buffer = &buffers[span.buffer];
        let target = candidates[span.candidate].target_id.as_str();
        if self.used_targets.contains(target)
            || (self.one_per_block && self.used_blocks.contains(&buffer.block))
            || self.kept.iter().any(|other| other.overlaps(&span))
        {
            return false;
        }
        if !self
            .used_anchors
            .insert(buffer.text[span.start..span.end].to_lowercase())
        {
            return false;
        }
        self.used_targets.insert(target);
        self.used_blocks.insert(buffer.block);
        self.kept.push(span);
        true
    }
}

struct Scanner {
    link_headings: bool,
    next_block: usize,
    out: Vec<Buffer>,
}

fn scan(tree: &RichText, link_headings: bool) -> Vec<Buffer> {
    let mut scanner = Scanner {
        link_headings,
        next_block: 1,
        out: Vec::new(),
    };
    scanner.visit(&tree.root, &mut Vec::new(), 0);
    scanner.out
}

impl Scanner {
    fn visit(&mut self, node: &Node, path: &mut Vec<usize>, block: usize) {
        if node.kind.is_link() {
            return;
        }
        let children = node.children();
        let context = if children.iter().any(Node::is_text) {
            node.visible_text()
        } else {
            String::new()
        };
        let mut offset = 0;
        for (idx, child) in children.iter().enumerate() {
            path.push(idx);
            if child.is_text() {
                if let Some(text) = child.text.as_deref().filter(|text| !text.is_empty()) {
                    self.out.push(Buffer {
                        path: path.clone(),
                        block,
                        text: text.to_string(),
                        context: context.clone(),
                        offset,
                    });
                }
            } else if child.kind.is_inline() {
                self.visit(child, path, block);
            } else if self.link_headings || !matches!(child.kind, NodeKind::Heading) {
                let inner = self.next_block;
                self.next_block += 1;
                self.visit(child, path, inner);
            }
            offset += child.visible_text().len();
            path.pop();
        }
    }
}

fn find_spans(
    buffers: &[Buffer],
    candidates: &[LinkCandidate],
    linked_urls: &HashSet<&str>,
    compounds: &CompoundTable,
) -> Vec<Span> {
    let mut spans = Vec::new();
    for (b, buffer) in buffers.iter().enumerate() {
        let haystack = buffer.text.to_ascii_lowercase();
        for (c, candidate) in candidates.iter().enumerate() {
            if linked_urls.contains(candidate.link.url.as_str()) {
                continue;
            }
            for phrase in &candidate.phrases {
                let needle = phrase.to_ascii_lowercase();
                if needle.is_empty() {
                    continue;
                }
                let mut from = 0;
                while let Some(found) = haystack[from..].find(needle.as_str()) {
                    let start = from + found;
                    let end = start + needle.len();
                    from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
                    let at = buffer.offset + start;
                    let matched = &buffer.text[start..end];
                    if !latin_boundaries_hold(&buffer.context, at, at + matched.len()) {
                        continue;
                    }
                    if compounds.cuts_compound(&buffer.context, at, matched) {
                        continue;
                    }
                    spans.push(Span {
                        buffer: b,
                        start,
                        end,
                        candidate: c,
                        score: candidate.score,
                    });
                }
            }
        }
    }
    spans.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.buffer.cmp(&b.buffer))
            .then_with(|| a.start.cmp(&b.start))
            .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
            .then_with(|| a.candidate.cmp(&b.candidate))
    });
    spans
}

/// A span whose edge character is a Latin word character must not continue
/// a Latin word on that side.
fn latin_boundaries_hold(context: &str, start: usize, end: usize) -> bool {
    let (Some(before), Some(inner), Some(after)) =
        (context.get(..start), context.get(start..end), context.get(end..))
    else {
        return false;
    };
    let glued_before = inner.chars().next().is_some_and(is_latin_word_char)
        && before.chars().next_back().is_some_and(is_latin_word_char);
    let glued_after = inner.chars().next_back().is_some_and(is_latin_word_char)
        && after.chars().next().is_some_and(is_latin_word_char);
    !glued_before && !glued_after
}

fn splice(node: Node, spans: &[Span], candidates: &[LinkCandidate]) -> Vec<Node> {
    let Some(text) = node.text.as_deref() else {
        return vec![node];
    };
    let mut ordered = spans.to_vec();
    ordered.sort_by_key(|span| span.start);

    let attrs: &Map<String, Value> = &node.attrs;
    let mut out = Vec::with_capacity(ordered.len() * 2 + 1);
    let mut cursor = 0;
    for span in ordered {
        if span.start > cursor {
            out.push(Node::text_with_attrs(&text[cursor..span.start], attrs.clone()));
        }
        let inner = Node::text_with_attrs(&text[span.start..span.end], attrs.clone());
        out.push(Node::link(&candidates[span.candidate].link, inner));
        cursor = span.end;
    }
    if cursor < text.len() {
        out.push(Node::text_with_attrs(&text[cursor..], attrs.clone()));
    }
    out
}

/// Per-document entry of the link report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLinks {
    /// Source document.
    pub source_id: DocumentId,
    /// Number of links inserted (0 when the write failed).
    pub links_added: usize,
    /// Inserted anchors.
    pub anchors: Vec<AnchorSpan>,
    /// Failure message, if the document could not be linked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of the `linker` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkReport {
    /// Shared header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// True when nothing was written to the store.
    pub dry_run: bool,
    /// Stage counters.
    pub totals: StageSummary,
    /// Links inserted across all documents.
    pub links_added: usize,
    /// One entry per attempted document.
    pub documents: Vec<DocumentLinks>,
}

impl Artifact for LinkReport {
    const PRODUCER: &'static str = "linker";

    fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    fn validate(&self) -> Result<(), String> {
        let added: usize = self.documents.iter().map(|doc| doc.links_added).sum();
        if added != self.links_added {
            return Err(format!(
                "total links_added {} does not match per-document sum {}",
                self.links_added, added
            ));
        }
        Ok(())
    }
}

/// Links every source in `matches` and writes the results back to `store`
/// unless `dry_run` is set.
///
/// Failures are per document: they are logged, counted and recorded in the
/// report, and the stored document is left as it was.
pub fn apply_matches(
    store: &dyn ContentStore,
    index: &IndexArtifact,
    matches: &[MatchResult],
    compounds: &CompoundTable,
    controls: &LinkControls,
    dry_run: bool,
) -> (LinkReport, StageSummary) {
    let mut summary = StageSummary::default();
    let mut documents = Vec::new();

    for result in matches {
        let candidates = build_candidates(result, index, controls);
        if candidates.is_empty() {
            summary.skipped += 1;
            continue;
        }
        summary.processed += 1;
        match link_document(store, &result.source_id, &candidates, compounds, controls, dry_run) {
            Ok(anchors) => {
                tracing::info!(
                    source = %result.source_id,
                    links = anchors.len(),
                    dry_run,
                    "document linked"
                );
                documents.push(DocumentLinks {
                    source_id: result.source_id.clone(),
                    links_added: anchors.len(),
                    anchors,
                    error: None,
                });
            }
            Err(err) => {
                tracing::warn!(source = %result.source_id, error = %err, "failed to link document");
                summary.errored += 1;
                documents.push(DocumentLinks {
                    source_id: result.source_id.clone(),
                    links_added: 0,
                    anchors: Vec::new(),
                    error: Some(format!("{err:#}")),
                });
            }
        }
    }

    let report = LinkReport {
        header: ArtifactHeader::now(),
        dry_run,
        totals: summary,
        links_added: documents.iter().map(|doc| doc.links_added).sum(),
        documents,
    };
    (report, summary)
}

fn link_document(
    store: &dyn ContentStore,
    source_id: &str,
    candidates: &[LinkCandidate],
    compounds: &CompoundTable,
    controls: &LinkControls,
    dry_run: bool,
) -> anyhow::Result<Vec<AnchorSpan>> {
    let doc = store.find_by_id(source_id)?;
    let content = doc
        .content
        .as_ref()
        .ok_or(TreeError::MissingContent)?;
    let tree = RichText::from_value(content).context("cannot read rich text")?;
    let outcome = apply_links(&tree, candidates, compounds, controls);
    if outcome.anchors.is_empty() || dry_run {
        return Ok(outcome.anchors);
    }
    let value = outcome.tree.to_value()?;
    store.update(source_id, &DocumentPatch::content(value))?;
    Ok(outcome.anchors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paragraph(texts: &[&str]) -> RichText {
        RichText::from_blocks(vec![Node::block(
            NodeKind::Paragraph,
            texts.iter().map(|text| Node::text(*text)).collect(),
        )])
    }

    fn candidate(id: &str, score: f64, phrases: &[&str]) -> LinkCandidate {
        LinkCandidate {
            target_id: id.into(),
            score,
            link: LinkTarget {
                url: format!("/posts/{id}"),
                sponsored: false,
                new_tab: false,
            },
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn link(tree: &RichText, candidates: &[LinkCandidate]) -> LinkOutcome {
        apply_links(
            tree,
            candidates,
            &CompoundTable::default(),
            &LinkControls::default(),
        )
    }

    fn paragraphs(texts: &[&str]) -> RichText {
        RichText::from_blocks(
            texts
                .iter()
                .map(|text| Node::block(NodeKind::Paragraph, vec![Node::text(*text)]))
                .collect(),
        )
    }

    fn anchor_texts(outcome: &LinkOutcome) -> Vec<String> {
        outcome.tree.links().into_iter().map(|l| l.text).collect()
    }

    #[test]
    fn never_cuts_a_compound() {
        let tree = paragraph(&["今日のスコアカードを確認"]);
        let outcome = link(&tree, &[candidate("b", 0.8, &["スコア"])]);
        assert!(outcome.anchors.is_empty());
        assert_eq!(outcome.tree, tree);

        let tree = paragraph(&["今日のスコアを確認"]);
        let outcome = link(&tree, &[candidate("b", 0.8, &["スコア"])]);
        assert_eq!(anchor_texts(&outcome), vec!["スコア"]);
        assert_eq!(outcome.tree.flatten(), tree.flatten());
    }

    #[test]
    fn compound_context_spans_sibling_leaves() {
        let tree = paragraph(&["今日のスコア", "カードを確認"]);
        let outcome = link(&tree, &[candidate("b", 0.8, &["スコア"])]);
        assert!(outcome.anchors.is_empty());
    }

    #[test]
    fn higher_score_wins_overlap() {
        let tree = paragraph(&["golf score card tips"]);
        let outcome = link(
            &tree,
            &[
                candidate("low", 0.5, &["score card"]),
                candidate("high", 0.9, &["card tips"]),
            ],
        );
        assert_eq!(anchor_texts(&outcome), vec!["card tips"]);
        assert_eq!(outcome.anchors[0].target_id, "high");
    }

    #[test]
    fn tie_keeps_earlier_span() {
        let tree = paragraph(&["golf score card tips"]);
        let outcome = link(
            &tree,
            &[
                candidate("late", 0.7, &["card tips"]),
                candidate("early", 0.7, &["score card"]),
            ],
        );
        assert_eq!(anchor_texts(&outcome), vec!["score card"]);
    }

    #[test]
    fn latin_phrases_need_word_boundaries() {
        let tree = paragraph(&["Keep scorecards tidy"]);
        let outcome = link(&tree, &[candidate("b", 0.8, &["score"])]);
        assert!(outcome.anchors.is_empty());

        let tree = paragraph(&["Your Score matters"]);
        let outcome = link(&tree, &[candidate("b", 0.8, &["score"])]);
        assert_eq!(anchor_texts(&outcome), vec!["Score"]);
    }

    #[test]
    fn second_pass_adds_nothing() {
        let tree = paragraphs(&["スコアの付け方", "パターの選び方"]);
        let candidates = [
            candidate("score", 0.8, &["スコア"]),
            candidate("putter", 0.6, &["パター"]),
        ];
        let first = link(&tree, &candidates);
        assert_eq!(first.anchors.len(), 2);
        let second = link(&first.tree, &candidates);
        assert!(second.anchors.is_empty());
        assert_eq!(second.tree, first.tree);
    }

    #[test]
    fn overlapping_occurrence_after_rejected_one_is_found() {
        let tree = paragraph(&["ago go go"]);
        let outcome = link(&tree, &[candidate("b", 0.8, &["go go"])]);
        assert_eq!(anchor_texts(&outcome), vec!["go go"]);
        let children = outcome.tree.root.children()[0].children();
        assert_eq!(children[0].text.as_deref(), Some("ago "));
        assert_eq!(outcome.tree.flatten(), tree.flatten());
    }

    #[test]
    fn headings_are_left_alone_by_default() {
        let tree = RichText::from_blocks(vec![
            Node::block(NodeKind::Heading, vec![Node::text("スコアの基本")]),
            Node::block(NodeKind::Paragraph, vec![Node::text("今日のパターを確認")]),
        ]);
        let candidates = [
            candidate("score", 0.9, &["スコア"]),
            candidate("putter", 0.5, &["パター"]),
        ];
        let outcome = link(&tree, &candidates);
        assert_eq!(anchor_texts(&outcome), vec!["パター"]);
        assert!(outcome.tree.root.children()[0].children()[0].is_text());

        let controls = LinkControls::default().with_link_headings(true);
        let outcome = apply_links(&tree, &candidates, &CompoundTable::default(), &controls);
        assert_eq!(anchor_texts(&outcome), vec!["スコア", "パター"]);
    }

    #[test]
    fn one_link_per_paragraph_unless_relaxed() {
        let tree = paragraph(&["スコアの付け方とパターの選び方"]);
        let candidates = [
            candidate("score", 0.8, &["スコア"]),
            candidate("putter", 0.6, &["パター"]),
        ];
        let outcome = link(&tree, &candidates);
        assert_eq!(anchor_texts(&outcome), vec!["スコア"]);

        let controls = LinkControls::default().with_one_link_per_block(false);
        let outcome = apply_links(&tree, &candidates, &CompoundTable::default(), &controls);
        assert_eq!(anchor_texts(&outcome), vec!["スコア", "パター"]);
    }

    #[test]
    fn links_spread_over_paragraphs() {
        let tree = paragraphs(&["スコアの話", "パターの話", "ドライバーの話", "アイアンの話"]);
        let candidates = [
            candidate("score", 0.9, &["スコア"]),
            candidate("putter", 0.8, &["パター"]),
            candidate("driver", 0.7, &["ドライバー"]),
            candidate("iron", 0.6, &["アイアン"]),
        ];
        let two = LinkControls::new(2, 10, 0.3, 3, Vec::new());
        let targets = |controls: &LinkControls| -> Vec<String> {
            apply_links(&tree, &candidates, &CompoundTable::default(), controls)
                .anchors
                .into_iter()
                .map(|anchor| anchor.target_id)
                .collect()
        };
        assert_eq!(targets(&two), vec!["score", "driver"]);
        assert_eq!(targets(&two.clone().with_spread_links(false)), vec!["score", "putter"]);
    }

    #[test]
    fn one_link_per_target_and_cap_counts_existing() {
        let tree = paragraph(&["パター選びとパター練習"]);
        let outcome = link(&tree, &[candidate("putter", 0.8, &["パター"])]);
        assert_eq!(outcome.anchors.len(), 1);

        let capped = LinkControls::new(1, 10, 0.3, 3, Vec::new());
        let outcome = apply_links(
            &outcome.tree,
            &[candidate("score", 0.9, &["練習"])],
            &CompoundTable::default(),
            &capped,
        );
        assert!(outcome.anchors.is_empty());
    }

    #[test]
    fn splice_keeps_formatting() {
        let mut bold = Node::text("太字のスコアです");
        bold.attrs.insert("format".into(), Value::from(1));
        let tree = RichText::from_blocks(vec![Node::block(NodeKind::Paragraph, vec![bold])]);
        let outcome = link(&tree, &[candidate("b", 0.8, &["スコア"])]);
        let children = outcome.tree.root.children()[0].children();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].attrs["format"], Value::from(1));
        assert_eq!(children[1].children()[0].attrs["format"], Value::from(1));
        assert_eq!(children[1].children()[0].text.as_deref(), Some("スコア"));
        assert_eq!(children[2].text.as_deref(), Some("です"));
    }

    #[test]
    fn input_tree_is_not_mutated() {
        let tree = paragraph(&["今日のスコアを確認"]);
        let before = tree.clone();
        let _ = link(&tree, &[candidate("b", 0.8, &["スコア"])]);
        assert_eq!(tree, before);
    }
}
