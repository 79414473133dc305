//! JSON-file backed content store, used for exports, fixtures and offline runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::{ContentStore, DocumentPatch, Query, StoreError};
use crate::artifact::write_json_atomic;
use crate::document::Document;
use crate::richtext::RichText;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    documents: Vec<Document>,
}

/// Store holding every document in one `{"documents": [...]}` file.
///
/// Updates are serialized through a mutex and rewrite the file atomically;
/// the in-memory copy only changes once the write succeeded.
pub struct FileStore {
    path: PathBuf,
    documents: Mutex<Vec<Document>>,
}

impl FileStore {
    /// Opens an existing store file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let raw = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let parsed: StoreFile = serde_json::from_str(&raw)
            .map_err(|err| StoreError::Invalid(format!("{}: {}", path.display(), err)))?;
        Ok(Self {
            path,
            documents: Mutex::new(parsed.documents),
        })
    }

    /// Creates (or replaces) a store file holding `documents`.
    pub fn create(path: impl Into<PathBuf>, documents: Vec<Document>) -> Result<Self, StoreError> {
        let path = path.into();
        persist(&path, &documents)?;
        Ok(Self {
            path,
            documents: Mutex::new(documents),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of every stored document.
    pub fn documents(&self) -> Vec<Document> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Document>> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn persist(path: &Path, documents: &[Document]) -> Result<(), StoreError> {
    #[derive(Serialize)]
    struct StoreFileRef<'a> {
        documents: &'a [Document],
    }
    write_json_atomic(path, &StoreFileRef { documents }).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl ContentStore for FileStore {
    fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let documents = self.lock();
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(documents
            .iter()
            .filter(|doc| query.matches(doc))
            .take(limit)
            .cloned()
            .collect())
    }

    fn find_by_id(&self, id: &str) -> Result<Document, StoreError> {
        self.lock()
            .iter()
            .find(|doc| doc.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn update(&self, id: &str, patch: &DocumentPatch) -> Result<Document, StoreError> {
        let mut documents = self.lock();
        let position = documents
            .iter()
            .position(|doc| doc.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut updated = documents[position].clone();
        if let Some(content) = &patch.content {
            RichText::from_value(content).map_err(|err| StoreError::Rejected {
                id: id.to_string(),
                reason: err.to_string(),
            })?;
            updated.content = Some(content.clone());
        }

        let mut next = documents.clone();
        next[position] = updated.clone();
        persist(&self.path, &next)?;
        *documents = next;
        Ok(updated)
    }
}
