use std::path::PathBuf;

use anchorlink::artifact;
use anchorlink::indexer::{build_index, Gazetteer, IndexArtifact, IndexConfig, DEFAULT_MAX_PHRASES};
use anchorlink::store::Query;
use anchorlink::telemetry::init_tracing;
use anchorlink::text::DEFAULT_JAPANESE_THRESHOLD;
use anchorlink::StoreArgs;
use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "anchorlink-indexer",
    about = "Index posts and products from the content store"
)]
struct IndexCli {
    #[command(flatten)]
    store: StoreArgs,

    /// Index artifact to write
    #[arg(long, env = "ANCHORLINK_INDEX_OUTPUT", default_value = "data/index.json")]
    output: PathBuf,

    /// Japanese character share above which text counts as Japanese
    #[arg(
        long,
        env = "ANCHORLINK_JAPANESE_THRESHOLD",
        default_value_t = DEFAULT_JAPANESE_THRESHOLD
    )]
    japanese_threshold: f64,

    /// Maximum anchor phrases kept per document
    #[arg(long, env = "ANCHORLINK_MAX_PHRASES", default_value_t = DEFAULT_MAX_PHRASES)]
    max_phrases: usize,

    /// JSON file with `compounds` and `terms` lists replacing the built-in vocabulary
    #[arg(long, env = "ANCHORLINK_GAZETTEER")]
    gazetteer: Option<PathBuf>,

    /// Index drafts as well as published documents
    #[arg(long, default_value_t = false)]
    include_drafts: bool,

    /// Only read this many documents from the store
    #[arg(long)]
    limit: Option<usize>,

    /// Build the index without writing the artifact
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = IndexCli::parse();

    let gazetteer = match &cli.gazetteer {
        Some(path) => Gazetteer::from_path(path)?,
        None => Gazetteer::default(),
    };
    let config = IndexConfig {
        japanese_threshold: cli.japanese_threshold,
        max_phrases: cli.max_phrases.max(1),
        include_drafts: cli.include_drafts,
        gazetteer,
    };

    let store = cli.store.open()?;
    // Drafts are filtered and counted by `build_index`.
    let mut query = Query::default();
    if let Some(limit) = cli.limit {
        query = query.with_limit(limit);
    }
    let documents = store
        .find(&query)
        .context("failed to read documents from the content store")?;
    tracing::info!(documents = documents.len(), "loaded documents");

    let (entries, summary) = build_index(&documents, &config);
    let index = IndexArtifact::new(entries);
    if !cli.dry_run {
        artifact::save(&cli.output, &index)?;
    }

    summary.render("indexer", Some(&cli.output), cli.dry_run);
    summary.ensure_progress("indexer")
}
