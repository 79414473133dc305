//! Inter-stage artifact files: shared header, validated loading and atomic writes.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Format version written into every artifact.
pub const ARTIFACT_VERSION: u32 = 1;

/// Errors raised while loading or saving artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// An upstream artifact has not been produced yet.
    #[error("required artifact {path:?} is missing; run `{producer}` first")]
    Missing {
        /// Expected location.
        path: PathBuf,
        /// Binary that produces it.
        producer: &'static str,
    },
    /// The file exists but could not be read.
    #[error("failed to read artifact {path:?}: {source}")]
    Read {
        /// Artifact location.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The file is not valid JSON or lacks required fields.
    #[error("artifact {path:?} is not valid: {source}")]
    Decode {
        /// Artifact location.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Written by an incompatible version.
    #[error("artifact {path:?} has version {found}, expected {expected}")]
    Version {
        /// Artifact location.
        path: PathBuf,
        /// Version in the file.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },
    /// Decoded fine but breaks a structural invariant.
    #[error("artifact {path:?} is inconsistent: {reason}")]
    Invalid {
        /// Artifact location.
        path: PathBuf,
        /// What is wrong.
        reason: String,
    },
    /// Writing failed; the previous file (if any) is left in place.
    #[error("failed to write artifact {path:?}: {source}")]
    Write {
        /// Artifact location.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Header carried at the top level of every artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Format version.
    pub version: u32,
    /// Generation timestamp.
    pub generated_at: DateTime<Utc>,
}

impl ArtifactHeader {
    /// Header stamped with the current time.
    pub fn now() -> Self {
        Self {
            version: ARTIFACT_VERSION,
            generated_at: Utc::now(),
        }
    }
}

/// A stage output that can be saved and loaded with validation.
pub trait Artifact: Serialize + DeserializeOwned {
    /// Binary that produces this artifact, named in "missing" errors.
    const PRODUCER: &'static str;

    /// Shared header.
    fn header(&self) -> &ArtifactHeader;

    /// Structural checks run after decoding.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Loads a required artifact, failing fast when it is absent or invalid.
pub fn load<A: Artifact>(path: &Path) -> Result<A, ArtifactError> {
    if !path.exists() {
        return Err(ArtifactError::Missing {
            path: path.to_path_buf(),
            producer: A::PRODUCER,
        });
    }
    let raw = fs::read_to_string(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let artifact: A = serde_json::from_str(&raw).map_err(|source| ArtifactError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let found = artifact.header().version;
    if found != ARTIFACT_VERSION {
        return Err(ArtifactError::Version {
            path: path.to_path_buf(),
            found,
            expected: ARTIFACT_VERSION,
        });
    }
    artifact
        .validate()
        .map_err(|reason| ArtifactError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
    Ok(artifact)
}

/// Loads an artifact that may legitimately not exist yet.
pub fn load_optional<A: Artifact>(path: &Path) -> Result<Option<A>, ArtifactError> {
    match load(path) {
        Ok(artifact) => Ok(Some(artifact)),
        Err(ArtifactError::Missing { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Saves an artifact atomically.
pub fn save<A: Artifact>(path: &Path, artifact: &A) -> Result<(), ArtifactError> {
    write_json_atomic(path, artifact).map_err(|source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), producer = A::PRODUCER, "artifact written");
    Ok(())
}

/// Serializes `value` as pretty JSON into a sibling temp file, then renames it
/// over `path`, so readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Sample {
        #[serde(flatten)]
        header: ArtifactHeader,
        items: Vec<u32>,
    }

    impl Artifact for Sample {
        const PRODUCER: &'static str = "sample-producer";

        fn header(&self) -> &ArtifactHeader {
            &self.header
        }

        fn validate(&self) -> Result<(), String> {
            if self.items.contains(&0) {
                return Err("zero item".into());
            }
            Ok(())
        }
    }

    #[test]
    fn missing_artifact_names_producer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load::<Sample>(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ArtifactError::Missing { .. }));
        assert!(err.to_string().contains("sample-producer"));
    }

    #[test]
    fn saves_and_loads_with_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("sample.json");
        let sample = Sample {
            header: ArtifactHeader::now(),
            items: vec![1, 2],
        };
        save(&path, &sample).expect("save");
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"version\": 1"));
        assert!(raw.contains("generated_at"));
        let loaded: Sample = load(&path).expect("load");
        assert_eq!(loaded.items, vec![1, 2]);
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn rejects_missing_fields_and_bad_versions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sample.json");
        fs::write(&path, r#"{"version": 1, "generated_at": "2024-01-01T00:00:00Z"}"#).unwrap();
        assert!(matches!(
            load::<Sample>(&path).unwrap_err(),
            ArtifactError::Decode { .. }
        ));

        fs::write(
            &path,
            r#"{"version": 9, "generated_at": "2024-01-01T00:00:00Z", "items": []}"#,
        )
        .unwrap();
        assert!(matches!(
            load::<Sample>(&path).unwrap_err(),
            ArtifactError::Version { found: 9, .. }
        ));

        fs::write(
            &path,
            r#"{"version": 1, "generated_at": "2024-01-01T00:00:00Z", "items": [0]}"#,
        )
        .unwrap();
        assert!(matches!(
            load::<Sample>(&path).unwrap_err(),
            ArtifactError::Invalid { .. }
        ));
    }

    #[test]
    fn optional_load_tolerates_absence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = load_optional::<Sample>(&dir.path().join("none.json")).expect("load");
        assert!(loaded.is_none());
    }
}
