//! Content store collaborator: the only place documents are read from and
//! written back to.

pub mod file;
pub mod payload;

use std::path::PathBuf;

use serde_json::Value;

use crate::document::{Document, DocumentKind, Language, PublishStatus};

pub use file::FileStore;
pub use payload::PayloadStore;

/// Errors surfaced by store adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No document with this id.
    #[error("document {0} not found")]
    NotFound(String),
    /// Local file access failed.
    #[error("store file {path:?}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Stored data could not be decoded into the canonical schema.
    #[error("store data invalid: {0}")]
    Invalid(String),
    /// Remote request failed before a response was received.
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The store refused the update (validation error, conflict).
    #[error("update of {id} rejected: {reason}")]
    Rejected {
        /// Document id.
        id: String,
        /// Reason reported by the store.
        reason: String,
    },
}

/// Filter for [`ContentStore::find`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Restrict to posts or products.
    pub kind: Option<DocumentKind>,
    /// Restrict by publication state.
    pub status: Option<PublishStatus>,
    /// Restrict by declared language (documents without one always pass).
    pub language: Option<Language>,
    /// Maximum number of documents returned.
    pub limit: Option<usize>,
}

impl Query {
    /// Published documents of every kind.
    pub fn published() -> Self {
        Self {
            status: Some(PublishStatus::Published),
            ..Self::default()
        }
    }

    /// Narrows to one kind.
    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Caps the result count.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Client-side predicate shared by adapters.
    pub fn matches(&self, doc: &Document) -> bool {
        if self.kind.is_some_and(|kind| kind != doc.kind) {
            return false;
        }
        if self.status.is_some_and(|status| status != doc.status) {
            return false;
        }
        match (self.language, doc.language) {
            (Some(wanted), Some(declared)) => declared.is_compatible(wanted),
            _ => true,
        }
    }
}

/// Partial update applied by [`ContentStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    /// Replacement rich-text content.
    pub content: Option<Value>,
}

impl DocumentPatch {
    /// Patch replacing the rich-text body.
    pub fn content(value: Value) -> Self {
        Self {
            content: Some(value),
        }
    }
}

/// Document read/write API. Writes are scoped to one document id.
pub trait ContentStore: Send + Sync {
    /// Documents matching `query`, in store order.
    fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// One document by id.
    fn find_by_id(&self, id: &str) -> Result<Document, StoreError>;

    /// Applies `patch` to one document and returns the stored result.
    ///
    /// On error the stored document is unchanged.
    fn update(&self, id: &str, patch: &DocumentPatch) -> Result<Document, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(kind: DocumentKind, status: PublishStatus, language: Option<Language>) -> Document {
        Document {
            id: "1".into(),
            kind,
            title: "t".into(),
            slug: String::new(),
            summary: String::new(),
            content: None,
            language,
            status,
            keywords: Vec::new(),
            categories: Vec::new(),
            url: None,
        }
    }

    #[test]
    fn query_filters_kind_status_and_language() {
        let query = Query::published().with_kind(DocumentKind::Product);
        assert!(query.matches(&doc(DocumentKind::Product, PublishStatus::Published, None)));
        assert!(!query.matches(&doc(DocumentKind::Post, PublishStatus::Published, None)));
        assert!(!query.matches(&doc(DocumentKind::Product, PublishStatus::Draft, None)));

        let ja = Query {
            language: Some(Language::Ja),
            ..Query::default()
        };
        assert!(ja.matches(&doc(
            DocumentKind::Product,
            PublishStatus::Published,
            Some(Language::Both)
        )));
        assert!(!ja.matches(&doc(
            DocumentKind::Product,
            PublishStatus::Published,
            Some(Language::En)
        )));
    }
}
