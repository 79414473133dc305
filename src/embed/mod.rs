//! Embedder stage: one fixed-dimension vector per indexed document.
//!
//! A run uses exactly one source of vectors. When the configured provider
//! fails at any point, every pending document is re-embedded with the local
//! vectorizer instead, and the artifact records the fallback.

pub mod command;
pub mod local;
pub mod openai;

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactHeader};
use crate::document::DocumentId;
use crate::indexer::IndexEntry;
use crate::pool::try_run_ordered;
use crate::summary::StageSummary;
use crate::text::truncate_chars;

pub use command::CommandProvider;
pub use local::LocalVectorizer;
pub use openai::OpenAiProvider;

/// Default vector length (matches the MiniLM family and the local vectorizer).
pub const DEFAULT_DIMENSION: usize = 384;
/// Default number of texts per provider call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

const EMBED_PHRASES: usize = 20;
const EMBED_KEYWORDS: usize = 10;
const EMBED_BODY_CHARS: usize = 2000;

/// Structured failure reported by an embedding provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider could not be reached or started.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),
    /// The provider did not answer in time.
    #[error("embedding provider timed out after {0:?}")]
    Timeout(Duration),
    /// The provider answered with an error or an unreadable payload.
    #[error("embedding provider returned a bad response: {0}")]
    BadResponse(String),
    /// Wrong number of vectors for the batch.
    #[error("embedding provider returned {found} vectors for {expected} inputs")]
    CountMismatch {
        /// Inputs sent.
        expected: usize,
        /// Vectors received.
        found: usize,
    },
    /// A vector had the wrong length.
    #[error("embedding provider returned dimension {found}, expected {expected}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Received dimension.
        found: usize,
    },
    /// Transport failure.
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Identity of the embedding space a provider produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Provider family (`openai`, `command`, `local`).
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Vector length.
    pub dimension: usize,
}

/// Something that turns texts into vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Space this provider embeds into.
    fn descriptor(&self) -> ProviderDescriptor;

    /// Embeds one batch; the result has one vector per input, in order.
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Vector for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Indexed document id.
    pub document_id: DocumentId,
    /// The vector.
    pub vector: Vec<f32>,
    /// CRC32 of the text that was embedded.
    pub source_text_hash: u32,
}

/// Which provider produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSource {
    /// Provider family that actually produced the vectors.
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Vector length.
    pub dimension: usize,
    /// True when the configured provider failed and the local vectorizer was used.
    pub fallback: bool,
}

impl EmbeddingSource {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            provider: self.provider.clone(),
            model: self.model.clone(),
            dimension: self.dimension,
        }
    }
}

/// Output of the `embedder` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingArtifact {
    /// Shared header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Provenance of every vector in the file.
    pub source: EmbeddingSource,
    /// Vector length shared by all embeddings.
    pub dimension: usize,
    /// One embedding per indexed document.
    pub embeddings: Vec<Embedding>,
}

impl EmbeddingArtifact {
    /// Vectors keyed by document id.
    pub fn by_id(&self) -> HashMap<&str, &Embedding> {
        self.embeddings
            .iter()
            .map(|embedding| (embedding.document_id.as_str(), embedding))
            .collect()
    }
}

impl Artifact for EmbeddingArtifact {
    const PRODUCER: &'static str = "embedder";

    fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    fn validate(&self) -> Result<(), String> {
        if self.source.dimension != self.dimension {
            return Err(format!(
                "source dimension {} differs from artifact dimension {}",
                self.source.dimension, self.dimension
            ));
        }
        let mut seen = BTreeSet::new();
        for embedding in &self.embeddings {
            if embedding.vector.len() != self.dimension {
                return Err(format!(
                    "embedding for {} has dimension {}, expected {}",
                    embedding.document_id,
                    embedding.vector.len(),
                    self.dimension
                ));
            }
            if !seen.insert(embedding.document_id.as_str()) {
                return Err(format!("duplicate embedding for {}", embedding.document_id));
            }
        }
        Ok(())
    }
}

/// Text sent to the provider for one entry.
pub fn embedding_text(entry: &IndexEntry) -> String {
    let mut parts: Vec<&str> = Vec::new();
    parts.push(&entry.title);
    if !entry.summary.is_empty() {
        parts.push(&entry.summary);
    }
    parts.extend(entry.anchor_phrases.iter().take(EMBED_PHRASES).map(String::as_str));
    parts.extend(entry.keywords.iter().take(EMBED_KEYWORDS).map(String::as_str));
    let body = truncate_chars(&entry.text, EMBED_BODY_CHARS);
    if !body.is_empty() {
        parts.push(body);
    }
    parts.join(" ")
}

fn text_hash(text: &str) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(text.as_bytes());
    hasher.finalize()
}

/// Embedder tunables.
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    /// Texts per provider call.
    pub batch_size: usize,
    /// Concurrent provider calls.
    pub workers: usize,
    /// Reuse vectors from a compatible prior artifact.
    pub incremental: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: 1,
            incremental: true,
        }
    }
}

struct Pending {
    id: DocumentId,
    text: String,
    hash: u32,
}

/// Embeds every entry with `provider`, degrading to `fallback` for the whole
/// run when the provider fails.
///
/// With `prior` set and incremental mode on, entries whose embedded text is
/// unchanged keep the vector from the prior artifact, provided that artifact
/// was produced in the same space. Counts: `processed` are freshly embedded
/// entries, `skipped` are reused ones.
pub fn embed_entries(
    entries: &[IndexEntry],
    provider: &dyn EmbeddingProvider,
    fallback: &LocalVectorizer,
    prior: Option<&EmbeddingArtifact>,
    config: &EmbedConfig,
) -> (EmbeddingArtifact, StageSummary) {
    let pending: Vec<Pending> = entries
        .iter()
        .map(|entry| {
            let text = embedding_text(entry);
            let hash = text_hash(&text);
            Pending {
                id: entry.id.clone(),
                text,
                hash,
            }
        })
        .collect();

    let primary = provider.descriptor();
    match run_with(&pending, provider, prior, config) {
        Ok((embeddings, summary)) => (artifact(primary, false, embeddings), summary),
        Err(err) => {
            tracing::warn!(
                provider = %primary.provider,
                model = %primary.model,
                error = %err,
                "embedding provider failed; falling back to local vectorizer for the whole run"
            );
            let local = fallback.descriptor();
            match run_with(&pending, fallback, prior, config) {
                Ok((embeddings, summary)) => (artifact(local, true, embeddings), summary),
                Err(err) => {
                    tracing::error!(error = %err, "local vectorizer failed");
                    let summary = StageSummary {
                        processed: pending.len(),
                        skipped: 0,
                        errored: pending.len(),
                    };
                    (artifact(local, true, Vec::new()), summary)
                }
            }
        }
    }
}

fn artifact(
    descriptor: ProviderDescriptor,
    fallback: bool,
    embeddings: Vec<Embedding>,
) -> EmbeddingArtifact {
    EmbeddingArtifact {
        header: ArtifactHeader::now(),
        dimension: descriptor.dimension,
        source: EmbeddingSource {
            provider: descriptor.provider,
            model: descriptor.model,
            dimension: descriptor.dimension,
            fallback,
        },
        embeddings,
    }
}

fn run_with(
    pending: &[Pending],
    provider: &dyn EmbeddingProvider,
    prior: Option<&EmbeddingArtifact>,
    config: &EmbedConfig,
) -> Result<(Vec<Embedding>, StageSummary), ProviderError> {
    let descriptor = provider.descriptor();
    let reusable: HashMap<&str, &Embedding> = match prior {
        Some(prior) if config.incremental && prior.source.descriptor() == descriptor => {
            prior.by_id()
        }
        _ => HashMap::new(),
    };

    let mut vectors: Vec<Option<Vec<f32>>> = vec![None; pending.len()];
    let mut todo: Vec<usize> = Vec::new();
    for (idx, item) in pending.iter().enumerate() {
        match reusable.get(item.id.as_str()) {
            Some(previous) if previous.source_text_hash == item.hash => {
                vectors[idx] = Some(previous.vector.clone());
            }
            _ => todo.push(idx),
        }
    }
    let summary = StageSummary {
        processed: todo.len(),
        skipped: pending.len() - todo.len(),
        errored: 0,
    };

    let batch_size = config.batch_size.max(1);
    let batches: Vec<Vec<usize>> = todo.chunks(batch_size).map(<[usize]>::to_vec).collect();
    tracing::info!(
        provider = %descriptor.provider,
        batches = batches.len(),
        reused = summary.skipped,
        "embedding documents"
    );
    let results = try_run_ordered(batches, config.workers, |batch_id, batch| {
        let inputs: Vec<&str> = batch.iter().map(|&idx| pending[idx].text.as_str()).collect();
        let output = provider.embed_batch(&inputs)?;
        if output.len() != inputs.len() {
            return Err(ProviderError::CountMismatch {
                expected: inputs.len(),
                found: output.len(),
            });
        }
        if let Some(bad) = output.iter().find(|v| v.len() != descriptor.dimension) {
            return Err(ProviderError::DimensionMismatch {
                expected: descriptor.dimension,
                found: bad.len(),
            });
        }
        tracing::debug!(batch_id, size = inputs.len(), "embedded batch");
        Ok(batch.into_iter().zip(output).collect::<Vec<_>>())
    })?;
    for (idx, vector) in results.into_iter().flatten() {
        vectors[idx] = Some(vector);
    }

    let embeddings = pending
        .iter()
        .zip(vectors)
        .filter_map(|(item, vector)| {
            vector.map(|vector| Embedding {
                document_id: item.id.clone(),
                vector,
                source_text_hash: item.hash,
            })
        })
        .collect();
    Ok((embeddings, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentKind, Language, LinkTarget, PublishStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(id: &str, text: &str) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            kind: DocumentKind::Post,
            title: format!("title {id}"),
            summary: String::new(),
            language: Language::En,
            keywords: vec!["golf".into()],
            anchor_phrases: vec!["golf swing".into()],
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

    struct Failing;

    impl EmbeddingProvider for Failing {
        fn descriptor(&self) -> ProviderDescriptor {
            ProviderDescriptor {
                provider: "command".into(),
                model: "broken".into(),
                dimension: 8,
            }
        }

        fn embed_batch(&self, _inputs: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Err(ProviderError::Unavailable("service down".into()))
        }
    }

    struct Counting {
        calls: AtomicUsize,
        dimension: usize,
    }

    impl EmbeddingProvider for Counting {
        fn descriptor(&self) -> ProviderDescriptor {
            ProviderDescriptor {
                provider: "fake".into(),
                model: "unit".into(),
                dimension: self.dimension,
            }
        }

        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(inputs.len(), Ordering::SeqCst);
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[test]
    fn embedding_text_bounds_body() {
        let long = "x".repeat(5000);
        let text = embedding_text(&entry("a", &long));
        assert!(text.starts_with("title a golf swing golf "));
        assert_eq!(text.chars().filter(|&c| c == 'x').count(), 2000);
    }

    #[test]
    fn provider_failure_falls_back_for_whole_run() {
        let entries = vec![entry("a", "golf swing basics"), entry("b", "putting drills")];
        let local = LocalVectorizer::new(8);
        let (artifact, summary) =
            embed_entries(&entries, &Failing, &local, None, &EmbedConfig::default());
        assert!(artifact.source.fallback);
        assert_eq!(artifact.source.provider, "local");
        assert_eq!(artifact.embeddings.len(), 2);
        assert!(artifact.validate().is_ok());
        assert_eq!(summary.processed, 2);
    }

    #[test]
    fn wrong_dimension_triggers_fallback() {
        let provider = Counting {
            calls: AtomicUsize::new(0),
            dimension: 4,
        };
        let local = LocalVectorizer::new(4);
        let (artifact, _) = embed_entries(
            &[entry("a", "text")],
            &provider,
            &local,
            None,
            &EmbedConfig::default(),
        );
        assert!(artifact.source.fallback);
        assert!(artifact.embeddings.iter().all(|e| e.vector.len() == 4));
    }

    #[test]
    fn unchanged_entries_reuse_prior_vectors() {
        let provider = Counting {
            calls: AtomicUsize::new(0),
            dimension: 2,
        };
        let local = LocalVectorizer::new(2);
        let entries = vec![entry("a", "one"), entry("b", "two")];
        let (first, _) =
            embed_entries(&entries, &provider, &local, None, &EmbedConfig::default());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let changed = vec![entry("a", "one"), entry("b", "two, revised")];
        let (second, summary) = embed_entries(
            &changed,
            &provider,
            &local,
            Some(&first),
            &EmbedConfig::default(),
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(second.embeddings.len(), 2);
        assert!(!second.source.fallback);
    }

    #[test]
    fn prior_from_other_space_is_ignored() {
        let provider = Counting {
            calls: AtomicUsize::new(0),
            dimension: 2,
        };
        let local = LocalVectorizer::new(2);
        let entries = vec![entry("a", "one")];
        let (fallback_run, _) = embed_entries(
            &entries,
            &Failing,
            &LocalVectorizer::new(2),
            None,
            &EmbedConfig::default(),
        );
        let (_, summary) = embed_entries(
            &entries,
            &provider,
            &local,
            Some(&fallback_run),
            &EmbedConfig::default(),
        );
        assert_eq!(summary.skipped, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn validate_rejects_mixed_dimensions() {
        let mut artifact = artifact(
            LocalVectorizer::new(3).descriptor(),
            false,
            vec![Embedding {
                document_id: "a".into(),
                vector: vec![0.0; 3],
                source_text_hash: 1,
            }],
        );
        assert!(artifact.validate().is_ok());
        artifact.embeddings.push(Embedding {
            document_id: "b".into(),
            vector: vec![0.0; 4],
            source_text_hash: 2,
        });
        assert!(artifact.validate().is_err());
    }
}
