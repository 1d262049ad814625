//! In-memory vector store with optional JSON snapshot.
//!
//! Brute-force search: cosine similarity for dense fields, `MaxSim` (mean of
//! per-token best matches) for multi-vector fields.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::PointFilter;
use crate::storage::traits::{Point, ScoredPoint, VectorData, VectorStore};
use crate::{Error, Result};

/// In-memory point collection.
///
/// Uses `RwLock` for reader-writer access. When opened with a snapshot path
/// the collection is loaded from and saved to a JSON file.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    points: RwLock<BTreeMap<String, Point>>,
    snapshot_path: Option<PathBuf>,
    dirty: AtomicBool,
}

impl InMemoryVectorStore {
    /// Creates an empty, non-persistent store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store backed by a JSON snapshot, loading it if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut points = BTreeMap::new();
        if path.exists() {
            let content =
                fs::read_to_string(&path).map_err(|e| Error::operation("read_snapshot", e))?;
            let loaded: Vec<Point> =
                serde_json::from_str(&content).map_err(|e| Error::operation("parse_snapshot", e))?;
            for point in loaded {
                points.insert(point.id.clone(), point);
            }
            tracing::debug!(path = %path.display(), count = points.len(), "Loaded vector snapshot");
        }
        Ok(Self {
            points: RwLock::new(points),
            snapshot_path: Some(path),
            dirty: AtomicBool::new(false),
        })
    }

    /// Snapshot path, if persistent.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Writes the snapshot if anything changed since the last save.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let content = {
            let points = self.read("save_snapshot")?;
            let all: Vec<&Point> = points.values().collect();
            serde_json::to_string(&all).map_err(|e| Error::operation("serialize_snapshot", e))?
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::operation("create_snapshot_dir", e))?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| Error::operation("write_snapshot", e))?;
        fs::rename(&tmp, path).map_err(|e| Error::operation("write_snapshot", e))?;
        Ok(())
    }

    fn read(
        &self,
        operation: &str,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Point>>> {
        self.points.read().map_err(|_| Error::OperationFailed {
            operation: operation.to_string(),
            cause: "Lock poisoned".to_string(),
        })
    }

    fn write(
        &self,
        operation: &str,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Point>>> {
        self.points.write().map_err(|_| Error::OperationFailed {
            operation: operation.to_string(),
            cause: "Lock poisoned".to_string(),
        })
    }
}

/// Cosine similarity normalized to `[0, 1]`.
///
/// Returns 0 for mismatched lengths or zero vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    f32::midpoint(dot / (norm_a * norm_b), 1.0)
}

/// Late-interaction score: mean over query tokens of the best document token match.
#[must_use]
pub fn max_sim(query: &[Vec<f32>], document: &[Vec<f32>]) -> f32 {
    if query.is_empty() || document.is_empty() {
        return 0.0;
    }
    let total: f32 = query
        .iter()
        .map(|q| {
            document
                .iter()
                .map(|d| cosine_similarity(q, d))
                .fold(0.0_f32, f32::max)
        })
        .sum();
    total / query.len() as f32
}

fn similarity(query: &VectorData, stored: &VectorData) -> Option<f32> {
    match (query, stored) {
        (VectorData::Dense(q), VectorData::Dense(d)) => Some(cosine_similarity(q, d)),
        (VectorData::Multi(q), VectorData::Multi(d)) => Some(max_sim(q, d)),
        _ => None,
    }
}

impl VectorStore for InMemoryVectorStore {
    fn upsert(&self, points: &[Point]) -> Result<()> {
        let mut stored = self.write("upsert")?;
        for point in points {
            stored.insert(point.id.clone(), point.clone());
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn query(
        &self,
        vector_name: &str,
        query: &VectorData,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let points = self.read("query")?;

        let mut scored = Vec::new();
        for point in points.values() {
            let Some(stored) = point.vectors.get(vector_name) else {
                continue;
            };
            if !filter.matches(&point.payload) {
                continue;
            }
            let score = similarity(query, stored).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "{} query against {} field '{vector_name}'",
                    query.shape(),
                    stored.shape()
                ))
            })?;
            scored.push(ScoredPoint {
                id: point.id.clone(),
                score,
                payload: point.payload.clone(),
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    fn scroll(&self, filter: &PointFilter) -> Result<Vec<Point>> {
        let points = self.read("scroll")?;
        Ok(points
            .values()
            .filter(|p| filter.matches(&p.payload))
            .cloned()
            .collect())
    }

    fn get(&self, id: &str) -> Result<Option<Point>> {
        Ok(self.read("get")?.get(id).cloned())
    }

    fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut points = self.write("delete")?;
        let removed = ids.iter().filter(|id| points.remove(*id).is_some()).count();
        if removed > 0 {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(removed)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read("count")?.len())
    }
}

impl Drop for InMemoryVectorStore {
    fn drop(&mut self) {
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "Failed to save vector snapshot on drop");
        }
    }
}
