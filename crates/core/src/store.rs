use crate::embeddings::cosine_similarity;
use crate::error::IndexError;
use crate::models::{IndexedChunk, ScoredChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const INDEX_FORMAT_VERSION: u32 = 1;

const INDEX_FILE: &str = "index.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Caller-chosen name of a persisted index. Restricted to characters that are
/// safe as a single directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(value: impl Into<String>) -> Result<Self, IndexError> {
        let value = value.into();
        let valid = !value.is_empty()
            && value != "."
            && value != ".."
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

        if valid {
            Ok(Self(value))
        } else {
            Err(IndexError::InvalidNamespace(value))
        }
    }

    /// `index_<role>` with the role lowercased and whitespace collapsed to `_`.
    pub fn for_role(role: &str) -> Result<Self, IndexError> {
        let role = role
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("_");
        Self::new(format!("index_{role}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub namespace: String,
    pub model: String,
    pub dimensions: usize,
    pub entries: usize,
    pub sha256: String,
    pub build_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: IndexedChunk,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexPayload {
    model: String,
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

/// Brute-force cosine index over chunk embeddings. Immutable once built.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn build(
        model: impl Into<String>,
        chunks: Vec<IndexedChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                embeddings: vectors.len(),
            });
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or_default();
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();

        Ok(Self {
            model: model.into(),
            dimensions,
            entries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &IndexedChunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    /// Top `top_k` chunks by cosine similarity; ties keep insertion order.
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query_vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                score: cosine_similarity(query_vector, &entry.vector),
                chunk: entry.chunk.clone(),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Directory-backed home for indexes, one subdirectory per namespace.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, namespace: &Namespace) -> PathBuf {
        self.root.join(namespace.as_str())
    }

    pub fn exists(&self, namespace: &Namespace) -> bool {
        self.path_for(namespace).join(MANIFEST_FILE).is_file()
    }

    /// Replaces whatever is stored under `namespace`.
    pub fn save(&self, namespace: &Namespace, index: &VectorIndex) -> Result<IndexManifest, IndexError> {
        let dir = self.path_for(namespace);
        fs::create_dir_all(&dir)?;

        let payload = IndexPayload {
            model: index.model.clone(),
            dimensions: index.dimensions,
            entries: index.entries.clone(),
        };
        let bytes = serde_json::to_vec(&payload)?;

        let manifest = IndexManifest {
            format_version: INDEX_FORMAT_VERSION,
            namespace: namespace.to_string(),
            model: index.model.clone(),
            dimensions: index.dimensions,
            entries: index.len(),
            sha256: sha256_hex(&bytes),
            build_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };

        write_replacing(&dir.join(INDEX_FILE), &bytes)?;
        write_replacing(&dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;

        Ok(manifest)
    }

    pub fn manifest(&self, namespace: &Namespace) -> Result<IndexManifest, IndexError> {
        let bytes = read_existing(&self.path_for(namespace).join(MANIFEST_FILE), namespace)?;
        serde_json::from_slice(&bytes).map_err(|error| IndexError::Deserialization {
            namespace: namespace.to_string(),
            details: format!("manifest: {error}"),
        })
    }

    /// Loads `namespace`, refusing payloads whose digest does not match the
    /// manifest or that were built with a model other than `expected_model`.
    pub fn load(&self, namespace: &Namespace, expected_model: &str) -> Result<VectorIndex, IndexError> {
        let manifest = self.manifest(namespace)?;
        if manifest.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::Deserialization {
                namespace: namespace.to_string(),
                details: format!("unsupported format version {}", manifest.format_version),
            });
        }

        let bytes = read_existing(&self.path_for(namespace).join(INDEX_FILE), namespace)?;
        let actual = sha256_hex(&bytes);
        if actual != manifest.sha256 {
            return Err(IndexError::Integrity {
                namespace: namespace.to_string(),
                expected: manifest.sha256,
                actual,
            });
        }

        if manifest.model != expected_model {
            return Err(IndexError::ModelMismatch {
                namespace: namespace.to_string(),
                stored: manifest.model,
                requested: expected_model.to_string(),
            });
        }

        let payload: IndexPayload =
            serde_json::from_slice(&bytes).map_err(|error| IndexError::Deserialization {
                namespace: namespace.to_string(),
                details: error.to_string(),
            })?;

        if payload.model != manifest.model || payload.entries.len() != manifest.entries {
            return Err(IndexError::Deserialization {
                namespace: namespace.to_string(),
                details: "payload disagrees with manifest".to_string(),
            });
        }

        let chunks = payload.entries.iter().map(|entry| entry.chunk.clone()).collect();
        let vectors = payload.entries.into_iter().map(|entry| entry.vector).collect();
        let index = VectorIndex::build(payload.model, chunks, vectors)?;

        if !index.is_empty() && index.dimensions != payload.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: payload.dimensions,
                actual: index.dimensions,
            });
        }

        Ok(index)
    }
}

fn read_existing(path: &Path, namespace: &Namespace) -> Result<Vec<u8>, IndexError> {
    fs::read(path).map_err(|error| match error.kind() {
        ErrorKind::NotFound => IndexError::NotFound(namespace.to_string()),
        _ => IndexError::Io(error),
    })
}

fn write_replacing(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, bytes)?;
    fs::rename(&staging, path)?;
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
