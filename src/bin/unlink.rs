use std::path::PathBuf;

use anchorlink::artifact;
use anchorlink::linker::unlink::DEFAULT_MARKERS;
use anchorlink::linker::{unlink_documents, UnlinkScope};
use anchorlink::telemetry::init_tracing;
use anchorlink::StoreArgs;
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "anchorlink-unlink",
    about = "Remove links from stored rich text, keeping their visible text"
)]
struct UnlinkCli {
    #[command(flatten)]
    store: StoreArgs,

    /// Links to remove
    #[arg(long, env = "ANCHORLINK_UNLINK_SCOPE", value_enum, default_value = "all")]
    scope: UnlinkScope,

    /// Marker text stripped from removed links (repeatable; replaces the defaults)
    #[arg(long = "marker")]
    markers: Vec<String>,

    /// Unlink report to write
    #[arg(long, env = "ANCHORLINK_UNLINK_OUTPUT", default_value = "data/unlink_report.json")]
    output: PathBuf,

    /// Count links without touching the store or writing the report
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = UnlinkCli::parse();

    let markers: Vec<String> = if cli.markers.is_empty() {
        DEFAULT_MARKERS.iter().map(|marker| marker.to_string()).collect()
    } else {
        cli.markers.clone()
    };
    let store = cli.store.open()?;
    let (report, summary) = unlink_documents(store.as_ref(), cli.scope, &markers, cli.dry_run)?;
    let removed: usize = report.documents.iter().map(|doc| doc.links_removed).sum();
    if !cli.dry_run {
        artifact::save(&cli.output, &report)?;
    }
    println!("links removed: {}", removed);

    summary.render("unlink", Some(&cli.output), cli.dry_run);
    summary.ensure_progress("unlink")
}
