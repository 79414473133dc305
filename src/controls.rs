//! Link-insertion controls and the content-store flags shared across stage binaries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use crate::store::{ContentStore, FileStore, PayloadStore};

/// Tunable knobs that bound link insertion.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkControls {
    max_links_per_document: usize,
    max_candidates: usize,
    min_score: f64,
    min_anchor_chars: usize,
    stop_phrases: Vec<String>,
    link_headings: bool,
    one_link_per_block: bool,
    spread_links: bool,
}

impl LinkControls {
    /// Constructs a new set of link controls.
    pub fn new(
        max_links_per_document: usize,
        max_candidates: usize,
        min_score: f64,
        min_anchor_chars: usize,
        stop_phrases: Vec<String>,
    ) -> Self {
        Self {
            max_links_per_document,
            max_candidates,
            min_score,
            min_anchor_chars,
            stop_phrases: stop_phrases
                .into_iter()
                .map(|phrase| phrase.trim().to_lowercase())
                .filter(|phrase| !phrase.is_empty())
                .collect(),
            link_headings: false,
            one_link_per_block: true,
            spread_links: true,
        }
    }

    /// Allows anchors inside heading blocks.
    pub fn with_link_headings(mut self, enabled: bool) -> Self {
        self.link_headings = enabled;
        self
    }

    /// Limits each block (paragraph, list item, ..) to a single new link.
    pub fn with_one_link_per_block(mut self, enabled: bool) -> Self {
        self.one_link_per_block = enabled;
        self
    }

    /// Spreads new links over evenly spaced blocks before filling by score.
    pub fn with_spread_links(mut self, enabled: bool) -> Self {
        self.spread_links = enabled;
        self
    }

    /// Maximum links a document may carry, existing ones included.
    pub fn max_links_per_document(&self) -> usize {
        self.max_links_per_document
    }

    /// Maximum match candidates considered per source document.
    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    /// Minimum match score for a candidate to be considered.
    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    /// Minimum anchor length in characters.
    pub fn min_anchor_chars(&self) -> usize {
        self.min_anchor_chars
    }

    /// Determines whether a phrase may become anchor text.
    pub fn is_anchor_allowed(&self, phrase: &str) -> bool {
        let phrase = phrase.trim();
        phrase.chars().count() >= self.min_anchor_chars
            && !self
                .stop_phrases
                .iter()
                .any(|stop| *stop == phrase.to_lowercase())
    }

    /// Whether heading text may carry anchors.
    pub fn link_headings(&self) -> bool {
        self.link_headings
    }

    /// Whether a block takes at most one new link.
    pub fn one_link_per_block(&self) -> bool {
        self.one_link_per_block
    }

    /// Whether links are spread across the document.
    pub fn spread_links(&self) -> bool {
        self.spread_links
    }
}

impl Default for LinkControls {
    fn default() -> Self {
        Self {
            max_links_per_document: 5,
            max_candidates: 10,
            min_score: 0.3,
            min_anchor_chars: 3,
            stop_phrases: Vec::new(),
            link_headings: false,
            one_link_per_block: true,
            spread_links: true,
        }
    }
}

/// Command-line flags for binaries that insert links.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Maximum links per document, existing links included
    #[arg(long, env = "ANCHORLINK_MAX_LINKS", default_value_t = 5)]
    pub max_links: usize,

    /// Maximum match candidates considered per source document
    #[arg(long, env = "ANCHORLINK_MAX_CANDIDATES", default_value_t = 10)]
    pub max_candidates: usize,

    /// Minimum match score for a candidate to be linked
    #[arg(long, env = "ANCHORLINK_MIN_SCORE", default_value_t = 0.3)]
    pub min_score: f64,

    /// Minimum anchor length in characters
    #[arg(long, env = "ANCHORLINK_MIN_ANCHOR_CHARS", default_value_t = 3)]
    pub min_anchor_chars: usize,

    /// Phrases never used as anchor text, comma separated
    #[arg(long, env = "ANCHORLINK_STOP_PHRASES", default_value = "")]
    pub stop_phrases: String,

    /// JSON object mapping short phrases to the compounds they must not be cut from
    #[arg(long, env = "ANCHORLINK_COMPOUNDS")]
    pub compounds: Option<PathBuf>,

    /// Allow anchors inside headings
    #[arg(long, default_value_t = false)]
    pub link_headings: bool,

    /// Allow several new links in the same paragraph
    #[arg(long, default_value_t = false)]
    pub multiple_per_block: bool,

    /// Place links strictly by score instead of spreading them over the document
    #[arg(long, default_value_t = false)]
    pub no_spread: bool,
}

impl LinkArgs {
    /// Converts the parsed flags into `LinkControls`.
    pub fn build_controls(&self) -> LinkControls {
        LinkControls::new(
            self.max_links,
            self.max_candidates,
            self.min_score,
            self.min_anchor_chars,
            self.stop_phrases_vec(),
        )
        .with_link_headings(self.link_headings)
        .with_one_link_per_block(!self.multiple_per_block)
        .with_spread_links(!self.no_spread)
    }

    fn stop_phrases_vec(&self) -> Vec<String> {
        self.stop_phrases
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Content store backends selectable from the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum StoreKind {
    /// JSON export on local disk (default).
    File,
    /// Payload CMS REST API.
    Payload,
}

/// Command-line flags selecting the content store.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Content store backend
    #[arg(long, env = "ANCHORLINK_STORE", value_enum, default_value = "file")]
    pub store: StoreKind,

    /// Store file used by the `file` backend
    #[arg(long, env = "ANCHORLINK_STORE_PATH", default_value = "data/store.json")]
    pub store_path: PathBuf,

    /// Base URL of the Payload instance (e.g. http://localhost:3000)
    #[arg(long, env = "ANCHORLINK_PAYLOAD_URL")]
    pub payload_url: Option<String>,

    /// Value sent as the Authorization header to Payload
    #[arg(long, env = "ANCHORLINK_PAYLOAD_TOKEN")]
    pub payload_token: Option<String>,

    /// Max seconds to wait for each store request
    #[arg(long, env = "ANCHORLINK_STORE_TIMEOUT_SECS", default_value_t = 30)]
    pub store_timeout_secs: u64,
}

impl StoreArgs {
    /// Opens the selected store.
    pub fn open(&self) -> Result<Box<dyn ContentStore>> {
        match self.store {
            StoreKind::File => {
                let store = open_file_store(&self.store_path)?;
                Ok(Box::new(store))
            }
            StoreKind::Payload => {
                let url = self
                    .payload_url
                    .as_deref()
                    .filter(|url| !url.trim().is_empty())
                    .context("--payload-url is required with --store payload")?;
                let store = PayloadStore::new(
                    url,
                    self.payload_token.as_deref(),
                    Duration::from_secs(self.store_timeout_secs.max(1)),
                )
                .context("failed to build Payload client")?;
                Ok(Box::new(store))
            }
        }
    }
}

fn open_file_store(path: &Path) -> Result<FileStore> {
    FileStore::open(path).with_context(|| format!("failed to open store file {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        link: LinkArgs,
        #[command(flatten)]
        store: StoreArgs,
    }

    #[test]
    fn defaults_match_controls_default() {
        let cli = Harness::parse_from(["test"]);
        assert_eq!(cli.link.build_controls(), LinkControls::default());
        assert_eq!(cli.store.store, StoreKind::File);
    }

    #[test]
    fn stop_phrases_and_min_length_gate_anchors() {
        let cli = Harness::parse_from([
            "test",
            "--stop-phrases",
            "ゴルフ, Golf Tips",
            "--min-anchor-chars",
            "2",
        ]);
        let controls = cli.link.build_controls();
        assert!(!controls.is_anchor_allowed("ゴルフ"));
        assert!(!controls.is_anchor_allowed("golf tips"));
        assert!(controls.is_anchor_allowed("スコア"));
        assert!(!controls.is_anchor_allowed("ス"));
    }

    #[test]
    fn placement_flags_relax_defaults() {
        let defaults = Harness::parse_from(["test"]).link.build_controls();
        assert!(!defaults.link_headings());
        assert!(defaults.one_link_per_block());
        assert!(defaults.spread_links());

        let cli = Harness::parse_from([
            "test",
            "--link-headings",
            "--multiple-per-block",
            "--no-spread",
        ]);
        let controls = cli.link.build_controls();
        assert!(controls.link_headings());
        assert!(!controls.one_link_per_block());
        assert!(!controls.spread_links());
    }

    #[test]
    fn payload_store_requires_url() {
        let cli = Harness::parse_from(["test", "--store", "payload"]);
        assert!(cli.store.open().is_err());
    }
}
