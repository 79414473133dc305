use std::path::PathBuf;
use std::time::Duration;

use anchorlink::artifact;
use anchorlink::embed::command::DEFAULT_COMMAND_MODEL;
use anchorlink::embed::{
    embed_entries, CommandProvider, EmbedConfig, EmbeddingArtifact, EmbeddingProvider,
    LocalVectorizer, OpenAiProvider, ProviderError, DEFAULT_BATCH_SIZE, DEFAULT_DIMENSION,
};
use anchorlink::indexer::IndexArtifact;
use anchorlink::telemetry::init_tracing;
use anyhow::Result;
use clap::{Parser, ValueEnum};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ProviderKind {
    /// OpenAI-compatible `/embeddings` endpoint
    Openai,
    /// External helper process
    Command,
    /// Built-in hashed vectorizer
    Local,
}

#[derive(Parser, Debug)]
#[command(
    name = "anchorlink-embedder",
    about = "Embed indexed documents, falling back to the local vectorizer"
)]
struct EmbedCli {
    /// Index artifact produced by `indexer`
    #[arg(long, env = "ANCHORLINK_EMBED_INPUT", default_value = "data/index.json")]
    input: PathBuf,

    /// Embeddings artifact to write (also read for incremental reuse)
    #[arg(long, env = "ANCHORLINK_EMBED_OUTPUT", default_value = "data/embeddings.json")]
    output: PathBuf,

    /// Embedding provider
    #[arg(long, env = "ANCHORLINK_EMBED_PROVIDER", value_enum, default_value = "local")]
    provider: ProviderKind,

    /// Model name (defaults to the provider's usual model)
    #[arg(long, env = "ANCHORLINK_EMBED_MODEL")]
    model: Option<String>,

    /// Vector dimension
    #[arg(long, env = "ANCHORLINK_EMBED_DIMENSION", default_value_t = DEFAULT_DIMENSION)]
    dimension: usize,

    /// Max number of texts per provider call
    #[arg(long, env = "ANCHORLINK_EMBED_BATCH", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Max seconds to wait for each provider call
    #[arg(long, env = "ANCHORLINK_EMBED_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Number of attempts for rate limits or transient errors
    #[arg(long, env = "ANCHORLINK_EMBED_MAX_RETRIES", default_value_t = 5)]
    max_retries: usize,

    /// Number of concurrent provider calls
    #[arg(
        long = "workers",
        env = "ANCHORLINK_EMBED_WORKERS",
        default_value_t = 1,
        alias = "worker-threads"
    )]
    workers: usize,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Base URL for the OpenAI-compatible API
    #[arg(
        long,
        env = "ANCHORLINK_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    openai_base_url: String,

    /// Program run by the `command` provider
    #[arg(long, env = "ANCHORLINK_EMBED_COMMAND", default_value = "python3")]
    command: PathBuf,

    /// Argument passed to the program before `embed_batch` (repeatable)
    #[arg(long = "command-arg")]
    command_args: Vec<String>,

    /// Re-embed everything instead of reusing unchanged vectors
    #[arg(long, default_value_t = false)]
    full: bool,

    /// Compute embeddings without writing the artifact
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn build_provider(cli: &EmbedCli) -> Result<Box<dyn EmbeddingProvider>, ProviderError> {
    let dimension = cli.dimension.max(1);
    let timeout = Duration::from_secs(cli.timeout_secs.max(1));
    match cli.provider {
        ProviderKind::Openai => {
            let key = cli.openai_api_key.as_deref().unwrap_or_default();
            let model = cli.model.as_deref().unwrap_or("text-embedding-3-small");
            let provider = OpenAiProvider::new(
                key,
                &cli.openai_base_url,
                model,
                dimension,
                timeout,
                cli.max_retries.max(1),
            )?;
            Ok(Box::new(provider))
        }
        ProviderKind::Command => Ok(Box::new(CommandProvider::new(
            cli.command.clone(),
            cli.command_args.clone(),
            cli.model.as_deref().unwrap_or(DEFAULT_COMMAND_MODEL),
            dimension,
            timeout,
        ))),
        ProviderKind::Local => Ok(Box::new(LocalVectorizer::new(dimension))),
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = EmbedCli::parse();

    let index: IndexArtifact = artifact::load(&cli.input)?;
    let prior = if cli.full {
        None
    } else {
        match artifact::load_optional::<EmbeddingArtifact>(&cli.output) {
            Ok(prior) => prior,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable prior embeddings");
                None
            }
        }
    };

    let local = LocalVectorizer::new(cli.dimension.max(1));
    let config = EmbedConfig {
        batch_size: cli.batch_size.max(1),
        workers: cli.workers.max(1),
        incremental: !cli.full,
    };
    tracing::info!(
        entries = index.entries.len(),
        provider = ?cli.provider,
        batch_size = config.batch_size,
        workers = config.workers,
        "launching embedder"
    );

    let (embeddings, summary) = match build_provider(&cli) {
        Ok(provider) => embed_entries(
            &index.entries,
            provider.as_ref(),
            &local,
            prior.as_ref(),
            &config,
        ),
        Err(err) => {
            tracing::warn!(error = %err, "embedding provider unavailable; using local vectorizer");
            let (mut embeddings, summary) =
                embed_entries(&index.entries, &local, &local, prior.as_ref(), &config);
            embeddings.source.fallback = true;
            (embeddings, summary)
        }
    };
    if embeddings.source.fallback {
        println!(
            "embedder degraded to the local vectorizer ({} dims)",
            embeddings.dimension
        );
    }
    if !cli.dry_run {
        artifact::save(&cli.output, &embeddings)?;
    }

    summary.render("embedder", Some(&cli.output), cli.dry_run);
    summary.ensure_progress("embedder")
}
