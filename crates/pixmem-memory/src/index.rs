use crate::store::MemoryStore;
use pixmem_core::{PixmemError, PixmemResult};
use tracing::{debug, warn};
use uuid::Uuid;

/// One nearest-neighbor candidate from the index.
#[derive(Debug, Clone)]
pub struct IndexHit {
    /// Identifier of the matching record.
    pub file_id: Uuid,
    /// Last-known path at index time.
    pub path: String,
    /// Squared L2 distance to the query vector. Smaller is more similar.
    pub distance: f32,
}

/// Exact-scan nearest-neighbor index over fixed-dimension vectors.
///
/// An in-process mirror of every stored embedding whose dimension matches.
/// Entirely derived: rebuildable from the [`MemoryStore`] at any time and
/// never a source of truth. Distances are squared L2, so vector magnitude
/// matters; all vectors must come from one embedding provider.
pub struct VectorIndex {
    dim: usize,
    vectors: Vec<Vec<f32>>,
    keys: Vec<(Uuid, String)>,
}

impl VectorIndex {
    /// Creates an empty index for vectors of the given dimension. The
    /// dimension is fixed for the index's lifetime.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
            keys: Vec::new(),
        }
    }

    /// The fixed vector dimension of this index.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Replaces the index wholesale from the store.
    ///
    /// Vectors whose stored dimension does not match are skipped silently
    /// (schema drift tolerance); an empty store yields an empty index.
    /// Returns the number of vectors indexed.
    pub fn rebuild_from_store(&mut self, store: &MemoryStore) -> PixmemResult<usize> {
        let rows = store.embeddings()?;
        self.vectors.clear();
        self.keys.clear();
        let mut dropped = 0usize;
        for row in rows {
            if row.embedding.len() == self.dim {
                self.vectors.push(row.embedding);
                self.keys.push((row.file_id, row.path));
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(dropped, dim = self.dim, "skipped embeddings with mismatched dimension");
        }
        debug!(indexed = self.vectors.len(), "vector index rebuilt");
        Ok(self.vectors.len())
    }

    /// Appends one vector and its key to the live index.
    ///
    /// Errors on dimension mismatch; the index never resizes.
    pub fn add(&mut self, vector: Vec<f32>, file_id: Uuid, path: String) -> PixmemResult<()> {
        if vector.len() != self.dim {
            return Err(PixmemError::Index(format!(
                "vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dim
            )));
        }
        self.vectors.push(vector);
        self.keys.push((file_id, path));
        Ok(())
    }

    /// Returns up to `k` nearest entries by squared L2 distance, ascending.
    ///
    /// An empty index (or a query of the wrong dimension) returns an empty
    /// list, not an error.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<IndexHit> {
        if self.vectors.is_empty() || k == 0 {
            return Vec::new();
        }
        if query.len() != self.dim {
            warn!(
                query_dim = query.len(),
                index_dim = self.dim,
                "query dimension mismatch; returning no candidates"
            );
            return Vec::new();
        }

        let mut hits: Vec<IndexHit> = self
            .vectors
            .iter()
            .zip(&self.keys)
            .map(|(vector, (file_id, path))| IndexHit {
                file_id: *file_id,
                path: path.clone(),
                distance: squared_l2(query, vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> (Uuid, String) {
        (Uuid::new_v4(), "/img.jpg".to_string())
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let mut index = VectorIndex::new(3);
        let (near_id, near_path) = key();
        let (far_id, far_path) = key();
        index.add(vec![0.0, 0.0, 1.0], far_id, far_path).unwrap();
        index.add(vec![0.9, 0.1, 0.0], near_id, near_path).unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].file_id, near_id);
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn search_truncates_to_k() {
        let mut index = VectorIndex::new(2);
        for _ in 0..10 {
            let (id, path) = key();
            index.add(vec![1.0, 0.0], id, path).unwrap();
        }
        assert_eq!(index.search(&[1.0, 0.0], 3).len(), 3);
    }

    #[test]
    fn empty_index_returns_empty_results() {
        let index = VectorIndex::new(4);
        assert!(index.search(&[0.0; 4], 5).is_empty());
    }

    #[test]
    fn add_rejects_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        let (id, path) = key();
        assert!(index.add(vec![1.0, 2.0], id, path).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn mismatched_query_returns_empty() {
        let mut index = VectorIndex::new(3);
        let (id, path) = key();
        index.add(vec![0.0; 3], id, path).unwrap();
        assert!(index.search(&[0.0; 5], 1).is_empty());
    }
}
