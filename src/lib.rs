#![warn(missing_docs)]
//! Core library for the anchorlink content-matching pipeline.
//!
//! Stages run as separate binaries and hand results to each other through
//! JSON artifacts: `indexer` → `embedder` → `similarity` → `linker`, with
//! `unlink` as the rollback for inserted links.

pub mod artifact;
pub mod controls;
pub mod document;
pub mod embed;
pub mod indexer;
pub mod linker;
mod pool;
pub mod richtext;
pub mod similarity;
pub mod store;
pub mod summary;
pub mod telemetry;
pub mod text;

pub use artifact::{Artifact, ArtifactError, ArtifactHeader};
pub use controls::{LinkArgs, LinkControls, StoreArgs};
pub use document::{Document, DocumentId, DocumentKind, Language, LinkTarget, PublishStatus};
pub use embed::{EmbeddingArtifact, EmbeddingProvider, ProviderError};
pub use indexer::{build_index, IndexArtifact, IndexConfig, IndexEntry};
pub use linker::{apply_links, apply_matches, CompoundTable, LinkReport};
pub use richtext::{Node, NodeKind, RichText, TreeError};
pub use similarity::{compute_matches, MatchArtifact, MatchResult, ScoringConfig};
pub use store::{ContentStore, DocumentPatch, FileStore, Query, StoreError};
pub use summary::StageSummary;
