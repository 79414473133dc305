//! Rollback of inserted links.

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactHeader};
use crate::document::{DocumentId, DocumentKind};
use crate::richtext::{Node, RichText};
use crate::store::{ContentStore, DocumentPatch, Query};
use crate::summary::StageSummary;

/// Marker glyphs stripped from link text by default.
pub const DEFAULT_MARKERS: &[&str] = &["🛒 ", "🛒"];

/// Which links to remove.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UnlinkScope {
    /// Every link node.
    All,
    /// Only links marked sponsored.
    Sponsored,
    /// Only same-site links (relative URLs, not sponsored).
    Internal,
}

impl UnlinkScope {
    fn covers(self, node: &Node) -> bool {
        match self {
            Self::All => true,
            Self::Sponsored => node.is_sponsored_link(),
            Self::Internal => {
                !node.is_sponsored_link()
                    && node
                        .link_url()
                        .is_some_and(|url| url.starts_with('/') && !url.starts_with("//"))
            }
        }
    }
}

/// Replaces every link in `scope` with its text content, minus `markers`,
/// and merges the text nodes left next to each other.
///
/// Returns the new tree and the number of links removed.
pub fn unlink(tree: &RichText, scope: UnlinkScope, markers: &[String]) -> (RichText, usize) {
    let mut removed = 0;
    let rewritten = tree.rewrite(&mut |_, node| {
        if !node.kind.is_link() || !scope.covers(&node) {
            return vec![node];
        }
        removed += 1;
        node.children
            .unwrap_or_default()
            .into_iter()
            .filter_map(|child| strip_markers(child, markers))
            .collect()
    });
    if removed == 0 {
        return (tree.clone(), 0);
    }
    (rewritten.merge_adjacent_text(), removed)
}

fn strip_markers(mut node: Node, markers: &[String]) -> Option<Node> {
    if !node.is_text() {
        return Some(node);
    }
    let mut text = node.text.take().unwrap_or_default();
    for marker in markers.iter().filter(|marker| !marker.is_empty()) {
        text = text.replace(marker.as_str(), "");
    }
    if text.is_empty() {
        return None;
    }
    node.text = Some(text);
    Some(node)
}

/// Per-document entry of the unlink report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentUnlinks {
    /// Document id.
    pub id: DocumentId,
    /// Links removed (0 when the write failed).
    pub links_removed: usize,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of the `unlink` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlinkReport {
    /// Shared header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Scope that was applied.
    pub scope: UnlinkScope,
    /// True when nothing was written to the store.
    pub dry_run: bool,
    /// Stage counters.
    pub totals: StageSummary,
    /// Documents that had links in scope.
    pub documents: Vec<DocumentUnlinks>,
}

impl Artifact for UnlinkReport {
    const PRODUCER: &'static str = "unlink";

    fn header(&self) -> &ArtifactHeader {
        &self.header
    }
}

/// Unlinks every post in `store` with rich-text content.
///
/// Only documents that actually change are written; nothing is written when
/// `dry_run` is set.
pub fn unlink_documents(
    store: &dyn ContentStore,
    scope: UnlinkScope,
    markers: &[String],
    dry_run: bool,
) -> anyhow::Result<(UnlinkReport, StageSummary)> {
    let posts = store
        .find(&Query::default().with_kind(DocumentKind::Post))
        .context("failed to list posts")?;
    let mut summary = StageSummary::default();
    let mut documents = Vec::new();

    for doc in posts {
        let Some(content) = doc.content.as_ref() else {
            summary.skipped += 1;
            continue;
        };
        summary.processed += 1;
        let tree = match RichText::from_value(content) {
            Ok(tree) => tree,
            Err(err) => {
                tracing::warn!(id = %doc.id, error = %err, "skipping unreadable rich text");
                summary.errored += 1;
                documents.push(DocumentUnlinks {
                    id: doc.id.clone(),
                    links_removed: 0,
                    error: Some(err.to_string()),
                });
                continue;
            }
        };
        let (unlinked, removed) = unlink(&tree, scope, markers);
        if removed == 0 {
            continue;
        }
        let written = if dry_run {
            Ok(())
        } else {
            persist(store, &doc.id, &unlinked)
        };
        match written {
            Ok(()) => {
                tracing::info!(id = %doc.id, removed, dry_run, "links removed");
                documents.push(DocumentUnlinks {
                    id: doc.id.clone(),
                    links_removed: removed,
                    error: None,
                });
            }
            Err(err) => {
                tracing::warn!(
                    id = %doc.id,
                    error = %format!("{err:#}"),
                    "failed to persist unlinked document"
                );
                summary.errored += 1;
                documents.push(DocumentUnlinks {
                    id: doc.id.clone(),
                    links_removed: 0,
                    error: Some(format!("{err:#}")),
                });
            }
        }
    }

    let report = UnlinkReport {
        header: ArtifactHeader::now(),
        scope,
        dry_run,
        totals: summary,
        documents,
    };
    Ok((report, summary))
}

fn persist(store: &dyn ContentStore, id: &str, tree: &RichText) -> anyhow::Result<()> {
    let value = tree.to_value()?;
    store.update(id, &DocumentPatch::content(value))?;
    Ok(())
}
