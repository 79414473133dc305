use std::path::PathBuf;

use anchorlink::artifact::{self, ArtifactHeader};
use anchorlink::document::DocumentKind;
use anchorlink::embed::EmbeddingArtifact;
use anchorlink::indexer::IndexArtifact;
use anchorlink::similarity::{compute_matches, MatchArtifact, ScoringConfig};
use anchorlink::telemetry::init_tracing;
use anyhow::Result;
use clap::{Parser, ValueEnum};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum TargetKind {
    Post,
    Product,
}

impl From<TargetKind> for DocumentKind {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Post => DocumentKind::Post,
            TargetKind::Product => DocumentKind::Product,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "anchorlink-similarity",
    about = "Score posts against posts and products and keep the best matches"
)]
struct SimilarityCli {
    /// Index artifact produced by `indexer`
    #[arg(long, env = "ANCHORLINK_SIMILARITY_INPUT", default_value = "data/index.json")]
    input: PathBuf,

    /// Embeddings artifact produced by `embedder`
    #[arg(long, env = "ANCHORLINK_EMBEDDINGS", default_value = "data/embeddings.json")]
    embeddings: PathBuf,

    /// Match artifact to write
    #[arg(long, env = "ANCHORLINK_SIMILARITY_OUTPUT", default_value = "data/matches.json")]
    output: PathBuf,

    /// Weight of the embedding cosine
    #[arg(long, env = "ANCHORLINK_SEMANTIC_WEIGHT", default_value_t = 0.6)]
    semantic_weight: f64,

    /// Weight of the keyword score
    #[arg(long, env = "ANCHORLINK_KEYWORD_WEIGHT", default_value_t = 0.3)]
    keyword_weight: f64,

    /// Weight of the category overlap
    #[arg(long, env = "ANCHORLINK_METADATA_WEIGHT", default_value_t = 0.1)]
    metadata_weight: f64,

    /// Bonus when source and target share a language
    #[arg(long, env = "ANCHORLINK_SAME_LANGUAGE_BONUS", default_value_t = 0.05)]
    same_language_bonus: f64,

    /// Keyword score for a hit on the target's primary keyword
    #[arg(long, env = "ANCHORLINK_PRIMARY_KEYWORD_WEIGHT", default_value_t = 0.4)]
    primary_keyword_weight: f64,

    /// Base keyword score for further keywords, divided by rank + 1
    #[arg(long, env = "ANCHORLINK_SECONDARY_KEYWORD_WEIGHT", default_value_t = 0.3)]
    secondary_keyword_weight: f64,

    /// How many further keywords and phrases are tried per target
    #[arg(long, env = "ANCHORLINK_SECONDARY_KEYWORD_LIMIT", default_value_t = 10)]
    secondary_keyword_limit: usize,

    /// Minimum combined score
    #[arg(long, env = "ANCHORLINK_THRESHOLD", default_value_t = 0.3)]
    threshold: f64,

    /// Keyword score accepted regardless of the combined score
    #[arg(long, env = "ANCHORLINK_STANDALONE_KEYWORD_SCORE", default_value_t = 0.4)]
    standalone_keyword_score: f64,

    /// Candidates kept per source
    #[arg(long, env = "ANCHORLINK_TOP_K", default_value_t = 10)]
    top_k: usize,

    /// Skip candidates whose matched keywords were all claimed already
    #[arg(long, default_value_t = false)]
    diversity: bool,

    /// Candidates kept by the diversity filter
    #[arg(long, env = "ANCHORLINK_DIVERSITY_CAP", default_value_t = 10)]
    diversity_cap: usize,

    /// Kinds of documents that may be recommended
    #[arg(long, value_enum, value_delimiter = ',', default_values = ["post", "product"])]
    targets: Vec<TargetKind>,

    /// Number of scoring threads
    #[arg(long, env = "ANCHORLINK_SIMILARITY_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Compute matches without writing the artifact
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

impl SimilarityCli {
    fn scoring(&self) -> ScoringConfig {
        ScoringConfig {
            semantic_weight: self.semantic_weight,
            keyword_weight: self.keyword_weight,
            metadata_weight: self.metadata_weight,
            same_language_bonus: self.same_language_bonus,
            primary_keyword_weight: self.primary_keyword_weight,
            secondary_keyword_weight: self.secondary_keyword_weight,
            secondary_keyword_limit: self.secondary_keyword_limit,
            threshold: self.threshold,
            standalone_keyword_score: self.standalone_keyword_score,
            top_k: self.top_k.max(1),
            diversity_cap: self.diversity.then_some(self.diversity_cap.max(1)),
            target_kinds: self.targets.iter().copied().map(DocumentKind::from).collect(),
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = SimilarityCli::parse();

    let index: IndexArtifact = artifact::load(&cli.input)?;
    let embeddings: EmbeddingArtifact = artifact::load(&cli.embeddings)?;
    if embeddings.source.fallback {
        tracing::warn!(
            provider = %embeddings.source.provider,
            "embeddings were produced by the fallback vectorizer"
        );
    }

    let scoring = cli.scoring();
    let (results, summary) = compute_matches(&index.entries, &embeddings, &scoring, cli.workers);
    let candidates: usize = results.iter().map(|result| result.candidates.len()).sum();
    tracing::info!(sources = results.len(), candidates, "matches computed");

    let matches = MatchArtifact {
        header: ArtifactHeader::now(),
        scoring,
        results,
    };
    if !cli.dry_run {
        artifact::save(&cli.output, &matches)?;
    }

    summary.render("similarity", Some(&cli.output), cli.dry_run);
    summary.ensure_progress("similarity")
}
