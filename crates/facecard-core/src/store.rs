//! Enrollment store: labeled reference embeddings, built once and persisted
//! to a single SQLite file.
//!
//! Labels and embeddings are index-aligned: row `position` holds entry
//! `position`'s label and its full-precision embedding.

use crate::dataset::LabeledImage;
use crate::error::ErrorKind;
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::types::{Embedding, EnrollmentEntry, FaceRegion};
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
    CREATE TABLE enrollment (
        position      INTEGER PRIMARY KEY,
        label         TEXT NOT NULL,
        embedding     BLOB NOT NULL,
        model_version TEXT
    );
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("enrollment store not found: {0} — run `facecard train` first")]
    NotFound(PathBuf),
    #[error("unsupported store schema version {0}")]
    UnsupportedVersion(i64),
    #[error("corrupt embedding at position {position}: {reason}")]
    Corrupt { position: usize, reason: String },
    #[error("embedding dimension mismatch: expected {expected}, got {actual} (label {label})")]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Provider(e) => e.kind(),
            StoreError::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Storage,
        }
    }
}

/// Ordered collection of labeled embeddings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrollmentStore {
    entries: Vec<EnrollmentEntry>,
}

impl EnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing entries, checking they share a dimension.
    pub fn from_entries(entries: Vec<EnrollmentEntry>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for entry in entries {
            store.push(entry)?;
        }
        Ok(store)
    }

    /// Run the provider over every labeled image, in order, appending one
    /// entry per detected face.
    ///
    /// Images without a detectable face contribute nothing. `observe` is
    /// called once per image with its 0-based processing index and the
    /// regions found, so callers can persist annotated copies.
    pub fn build<P, F>(
        provider: &mut P,
        images: &[LabeledImage],
        mut observe: F,
    ) -> Result<Self, StoreError>
    where
        P: EmbeddingProvider + ?Sized,
        F: FnMut(usize, &LabeledImage, &[FaceRegion]),
    {
        let mut store = Self::new();

        for (i, sample) in images.iter().enumerate() {
            tracing::info!(
                image = i + 1,
                total = images.len(),
                label = %sample.label,
                "processing image"
            );

            let detections = provider.detect_and_embed(&sample.image)?;
            if detections.is_empty() {
                tracing::debug!(path = %sample.path.display(), "no face detected; skipping");
            }

            let regions: Vec<FaceRegion> = detections.iter().map(|d| d.region).collect();
            for detection in detections {
                store.push(EnrollmentEntry::new(sample.label.clone(), detection.embedding))?;
            }

            observe(i, sample, &regions);
        }

        tracing::info!(
            entries = store.len(),
            identities = store.distinct_labels().len(),
            "enrollment store built"
        );
        Ok(store)
    }

    /// Append an entry; its dimension must match the entries already present.
    pub fn push(&mut self, entry: EnrollmentEntry) -> Result<(), StoreError> {
        if let Some(expected) = self.dim() {
            if entry.embedding.dim() != expected {
                return Err(StoreError::DimensionMismatch {
                    label: entry.label,
                    expected,
                    actual: entry.embedding.dim(),
                });
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[EnrollmentEntry] {
        &self.entries
    }

    /// Labels in entry order (same length as [`entries`](Self::entries)).
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    /// Unique labels in first-seen order.
    pub fn distinct_labels(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for label in self.labels() {
            if !seen.contains(&label) {
                seen.push(label);
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension shared by every entry, if any.
    pub fn dim(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.dim())
    }

    /// Write the store to `path`, replacing any existing file.
    ///
    /// The database is written next to the target and renamed over it.
    pub fn persist(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = tmp_path(path);
        if tmp.exists() {
            std::fs::remove_file(&tmp)?;
        }

        {
            let mut conn = Connection::open(&tmp)?;
            conn.execute_batch(SCHEMA)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO enrollment (position, label, embedding, model_version)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (i, entry) in self.entries.iter().enumerate() {
                    stmt.execute(params![
                        i as i64,
                        entry.label,
                        encode_values(&entry.embedding.values),
                        entry.embedding.model_version,
                    ])?;
                }
            }
            tx.commit()?;
        }

        std::fs::rename(&tmp, path)?;
        tracing::info!(path = %path.display(), entries = self.len(), "enrollment store persisted");
        Ok(())
    }

    /// Load a store previously written by [`persist`](Self::persist).
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version != SCHEMA_VERSION {
            return Err(StoreError::UnsupportedVersion(version));
        }

        let mut stmt = conn.prepare(
            "SELECT position, label, embedding, model_version FROM enrollment ORDER BY position",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut store = Self::new();
        for (expected_pos, row) in rows.enumerate() {
            let (position, label, blob, model_version) = row?;
            if position != expected_pos as i64 {
                return Err(StoreError::Corrupt {
                    position: expected_pos,
                    reason: format!("found position {position}"),
                });
            }
            let values = decode_values(&blob).ok_or_else(|| StoreError::Corrupt {
                position: expected_pos,
                reason: format!("blob length {} is not a multiple of 4", blob.len()),
            })?;
            store.push(EnrollmentEntry::new(
                label,
                Embedding {
                    values,
                    model_version,
                },
            ))?;
        }

        tracing::info!(
            path = %path.display(),
            entries = store.len(),
            identities = store.distinct_labels().len(),
            "enrollment store loaded"
        );
        Ok(store)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn encode_values(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_values(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
