use std::path::PathBuf;

use anchorlink::artifact;
use anchorlink::indexer::IndexArtifact;
use anchorlink::linker::{apply_matches, CompoundTable};
use anchorlink::similarity::MatchArtifact;
use anchorlink::telemetry::init_tracing;
use anchorlink::{LinkArgs, StoreArgs};
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "anchorlink-linker",
    about = "Insert anchor links for matched documents into their rich text"
)]
struct LinkerCli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    link: LinkArgs,

    /// Match artifact produced by `similarity`
    #[arg(long, env = "ANCHORLINK_LINKER_INPUT", default_value = "data/matches.json")]
    input: PathBuf,

    /// Index artifact produced by `indexer`
    #[arg(long, env = "ANCHORLINK_INDEX", default_value = "data/index.json")]
    index: PathBuf,

    /// Link report to write
    #[arg(long, env = "ANCHORLINK_LINKER_OUTPUT", default_value = "data/link_report.json")]
    output: PathBuf,

    /// Resolve links without touching the store or writing the report
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = LinkerCli::parse();

    let matches: MatchArtifact = artifact::load(&cli.input)?;
    let index: IndexArtifact = artifact::load(&cli.index)?;
    let compounds = match &cli.link.compounds {
        Some(path) => CompoundTable::from_path(path)?,
        None => CompoundTable::default(),
    };
    let controls = cli.link.build_controls();
    let store = cli.store.open()?;

    let (report, summary) = apply_matches(
        store.as_ref(),
        &index,
        &matches.results,
        &compounds,
        &controls,
        cli.dry_run,
    );
    if cli.dry_run {
        for doc in &report.documents {
            for anchor in &doc.anchors {
                println!("{}: \"{}\" -> {}", doc.source_id, anchor.text, anchor.url);
            }
        }
    } else {
        artifact::save(&cli.output, &report)?;
    }
    println!("links added: {}", report.links_added);

    summary.render("linker", Some(&cli.output), cli.dry_run);
    summary.ensure_progress("linker")
}
