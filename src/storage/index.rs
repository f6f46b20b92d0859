use crate::core::error::{Error, Result};
use crate::indexing::segmenter::Granularity;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::Path;

/// Metadata for one indexed segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Text fed to the embedding model
    pub text: String,
    /// Heading text, where the granularity has one
    pub title: Option<String>,
    pub granularity: Granularity,
    /// Source file path the segment was extracted from
    pub source_file: String,
    /// Calendar date derived from the source file path
    pub date: Option<NaiveDate>,
    /// Enclosing memory title (section and line granularities only)
    pub parent_memory: Option<String>,
    /// Enclosing section title (line granularity only)
    pub parent_section: Option<String>,
}

/// The persisted vector-search structure for one granularity: an id
/// allocator plus parallel id and row-major vector arrays.
///
/// Vectors are unit-normalized on insertion and query, so the inner product
/// used for scoring equals cosine similarity. Identifiers are never reused
/// within a run; the space resets only on [`FlatIndex::clear`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    next_id: u64,
    ids: Vec<u64>,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            next_id: 0,
            ids: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Insert a vector under the next identifier and return it.
    ///
    /// The vector's dimension must match the index dimension; a mismatch is
    /// a programming-contract violation (misconfigured embedding function),
    /// not a recoverable error.
    pub fn add(&mut self, mut vector: Vec<f32>) -> u64 {
        assert_eq!(
            vector.len(),
            self.dim,
            "embedding dimension {} does not match index dimension {}",
            vector.len(),
            self.dim
        );
        normalize(&mut vector);
        let id = self.next_id;
        self.next_id += 1;
        self.ids.push(id);
        self.data.extend_from_slice(&vector);
        id
    }

    /// Remove every listed identifier. Identifiers not present are ignored.
    pub fn remove_batch(&mut self, remove: &HashSet<u64>) {
        if remove.is_empty() {
            return;
        }
        let dim = self.dim;
        let mut ids = Vec::with_capacity(self.ids.len());
        let mut data = Vec::with_capacity(self.data.len());
        for (row, &id) in self.ids.iter().enumerate() {
            if !remove.contains(&id) {
                ids.push(id);
                data.extend_from_slice(&self.data[row * dim..(row + 1) * dim]);
            }
        }
        self.ids = ids;
        self.data = data;
    }

    /// Top-`k` identifiers by cosine similarity, descending. Returns fewer
    /// than `k` when the index holds fewer vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        assert_eq!(
            query.len(),
            self.dim,
            "query dimension {} does not match index dimension {}",
            query.len(),
            self.dim
        );
        if k == 0 || self.ids.is_empty() {
            return Vec::new();
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let dim = self.dim;
        let scored: Vec<(u64, f32)> = self
            .ids
            .par_iter()
            .enumerate()
            .map(|(row, &id)| {
                let vector = &self.data[row * dim..(row + 1) * dim];
                let score: f32 = vector.iter().zip(&query).map(|(a, b)| a * b).sum();
                (id, score)
            })
            .collect();

        // Min-heap (via reversed ordering) keeps only the top K
        let mut heap: BinaryHeap<ScoredId> = BinaryHeap::with_capacity(k + 1);
        for (id, score) in scored {
            heap.push(ScoredId(id, score));
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut results: Vec<(u64, f32)> = heap.into_iter().map(|s| (s.0, s.1)).collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results
    }

    /// Empty the index and reset the identifier allocator to zero.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.data.clear();
        self.next_id = 0;
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| Error::Index(format!("Failed to serialize index: {}", e)))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let (index, _) =
            bincode::serde::decode_from_slice::<FlatIndex, _>(&bytes, bincode::config::standard())
                .map_err(|e| Error::Index(format!("Failed to deserialize index: {}", e)))?;
        Ok(index)
    }
}

/// One granularity's complete index: the vector-search structure plus the
/// id → segment metadata map.
///
/// After any mutating operation completes, the id set in the search
/// structure equals the metadata key set. A freshly loaded snapshot is the
/// one exception: metadata is reconstructed by the next rebuild walk, not
/// persisted.
#[derive(Debug)]
pub struct GranularIndex {
    flat: FlatIndex,
    metadata: HashMap<u64, Segment>,
}

impl GranularIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            flat: FlatIndex::new(dim),
            metadata: HashMap::new(),
        }
    }

    /// Wrap a loaded snapshot. Its identifiers stay unresolvable until
    /// metadata is repopulated by re-indexing.
    pub fn from_flat(flat: FlatIndex) -> Self {
        Self {
            flat,
            metadata: HashMap::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.flat.dim()
    }

    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    pub fn ids(&self) -> &[u64] {
        self.flat.ids()
    }

    pub fn metadata_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.metadata.keys().copied()
    }

    /// Number of segments with resolvable metadata
    pub fn segment_count(&self) -> usize {
        self.metadata.len()
    }

    pub fn add(&mut self, vector: Vec<f32>, segment: Segment) -> u64 {
        let id = self.flat.add(vector);
        self.metadata.insert(id, segment);
        id
    }

    pub fn remove_batch(&mut self, ids: &[u64]) {
        let remove: HashSet<u64> = ids.iter().copied().collect();
        self.flat.remove_batch(&remove);
        for id in &remove {
            self.metadata.remove(id);
        }
    }

    pub fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        self.flat.search(query, k)
    }

    pub fn segment(&self, id: u64) -> Option<&Segment> {
        self.metadata.get(&id)
    }

    pub fn clear(&mut self) {
        self.flat.clear();
        self.metadata.clear();
    }

    /// Persist the search structure only; metadata is reconstructed by
    /// re-walking source files.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.flat.save(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_flat(FlatIndex::load(path)?))
    }
}

/// Heap entry with reversed ordering so BinaryHeap (a max-heap) behaves
/// like a min-heap by score.
struct ScoredId(u64, f32);

impl PartialEq for ScoredId {
    fn eq(&self, other: &Self) -> bool {
        self.1 == other.1
    }
}

impl Eq for ScoredId {}

impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> Ordering {
        other.1.partial_cmp(&self.1).unwrap_or(Ordering::Equal)
    }
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn segment(text: &str) -> Segment {
        Segment {
            text: text.to_string(),
            title: None,
            granularity: Granularity::Memory,
            source_file: "test.md".to_string(),
            date: None,
            parent_memory: None,
            parent_section: None,
        }
    }

    #[test]
    fn test_add_allocates_increasing_ids() {
        let mut index = FlatIndex::new(3);
        assert_eq!(index.add(vec![1.0, 0.0, 0.0]), 0);
        assert_eq!(index.add(vec![0.0, 1.0, 0.0]), 1);
        assert_eq!(index.add(vec![0.0, 0.0, 1.0]), 2);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_ids_not_reused_after_removal() {
        let mut index = FlatIndex::new(2);
        let a = index.add(vec![1.0, 0.0]);
        index.remove_batch(&[a].into_iter().collect());
        let b = index.add(vec![0.0, 1.0]);
        assert_eq!(b, 1);
    }

    #[test]
    fn test_clear_resets_allocator() {
        let mut index = FlatIndex::new(2);
        index.add(vec![1.0, 0.0]);
        index.add(vec![0.0, 1.0]);
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.add(vec![1.0, 0.0]), 0);
    }

    #[test]
    fn test_search_ranks_by_cosine_similarity() {
        let mut index = FlatIndex::new(3);
        let close = index.add(vec![1.0, 0.1, 0.0]);
        let far = index.add(vec![0.0, 1.0, 0.0]);
        let exact = index.add(vec![1.0, 0.0, 0.0]);

        let results = index.search(&[1.0, 0.0, 0.0], 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, exact);
        assert_eq!(results[1].0, close);
        assert_eq!(results[2].0, far);
        assert!(results[0].1 > 0.99);
    }

    #[test]
    fn test_search_normalizes_stored_vectors() {
        let mut index = FlatIndex::new(2);
        // Same direction, different magnitude: cosine must treat them equally
        let long = index.add(vec![10.0, 0.0]);
        index.add(vec![0.0, 1.0]);

        let results = index.search(&[0.5, 0.0], 1);
        assert_eq!(results[0].0, long);
        assert!((results[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_search_returns_fewer_than_k() {
        let mut index = FlatIndex::new(2);
        index.add(vec![1.0, 0.0]);
        assert_eq!(index.search(&[1.0, 0.0], 10).len(), 1);
    }

    #[test]
    fn test_search_empty_index() {
        let index = FlatIndex::new(2);
        assert!(index.search(&[1.0, 0.0], 5).is_empty());
    }

    #[test]
    #[should_panic(expected = "does not match index dimension")]
    fn test_dimension_mismatch_panics() {
        let mut index = FlatIndex::new(3);
        index.add(vec![1.0, 0.0]);
    }

    #[test]
    fn test_remove_batch_is_idempotent() {
        let mut index = FlatIndex::new(2);
        let a = index.add(vec![1.0, 0.0]);
        let b = index.add(vec![0.0, 1.0]);

        let remove: HashSet<u64> = [a, 999].into_iter().collect();
        index.remove_batch(&remove);
        assert_eq!(index.len(), 1);

        // Removing the same set again is a no-op
        index.remove_batch(&remove);
        assert_eq!(index.len(), 1);
        assert_eq!(index.ids(), &[b]);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index_memory.bin");

        let mut index = FlatIndex::new(3);
        index.add(vec![1.0, 0.0, 0.0]);
        index.add(vec![0.0, 1.0, 0.0]);
        index.save(&path).unwrap();

        let loaded = FlatIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dim(), 3);
        assert_eq!(loaded.ids(), index.ids());
        // The allocator position survives the round trip
        let mut loaded = loaded;
        assert_eq!(loaded.add(vec![0.0, 0.0, 1.0]), 2);
    }

    #[test]
    fn test_granular_index_invariant_after_mutations() {
        let mut index = GranularIndex::new(2);
        let a = index.add(vec![1.0, 0.0], segment("a"));
        let b = index.add(vec![0.0, 1.0], segment("b"));
        let c = index.add(vec![1.0, 1.0], segment("c"));

        let check = |index: &GranularIndex| {
            let vector_ids: HashSet<u64> = index.ids().iter().copied().collect();
            let meta_ids: HashSet<u64> = index.metadata_ids().collect();
            assert_eq!(vector_ids, meta_ids);
        };
        check(&index);

        index.remove_batch(&[a, c]);
        check(&index);
        assert_eq!(index.len(), 1);
        assert!(index.segment(b).is_some());
        assert!(index.segment(a).is_none());

        index.clear();
        check(&index);
        assert_eq!(index.segment_count(), 0);
    }

    #[test]
    fn test_granular_index_resolves_metadata() {
        let mut index = GranularIndex::new(2);
        let id = index.add(vec![1.0, 0.0], segment("hello"));

        let results = index.search(&[1.0, 0.0], 1);
        assert_eq!(results[0].0, id);
        assert_eq!(index.segment(id).unwrap().text, "hello");
    }

    #[test]
    fn test_loaded_snapshot_has_no_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index_line.bin");

        let mut index = GranularIndex::new(2);
        let id = index.add(vec![1.0, 0.0], segment("ephemeral"));
        index.save(&path).unwrap();

        let loaded = GranularIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.segment(id).is_none());
        assert_eq!(loaded.segment_count(), 0);
    }
}
