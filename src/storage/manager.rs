use crate::core::config::Settings;
use crate::core::error::Result;
use crate::indexing::dates::file_date;
use crate::indexing::discovery::{discover_files, is_journal_file};
use crate::indexing::segmenter::{normalize_timestamps, segment_document, Granularity};
use crate::search::model::Embedder;
use crate::storage::index::{GranularIndex, Segment};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One value per granularity
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PerGranularity<T> {
    pub day: T,
    pub memory: T,
    pub section: T,
    pub line: T,
}

impl<T> PerGranularity<T> {
    pub fn get(&self, granularity: Granularity) -> &T {
        match granularity {
            Granularity::Day => &self.day,
            Granularity::Memory => &self.memory,
            Granularity::Section => &self.section,
            Granularity::Line => &self.line,
        }
    }

    pub fn get_mut(&mut self, granularity: Granularity) -> &mut T {
        match granularity {
            Granularity::Day => &mut self.day,
            Granularity::Memory => &mut self.memory,
            Granularity::Section => &mut self.section,
            Granularity::Line => &mut self.line,
        }
    }
}

/// Options governing how a file is normalized and segmented
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub include_titles: bool,
    pub tz: Tz,
}

impl From<&Settings> for IndexOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            include_titles: settings.include_titles,
            tz: settings.tz(),
        }
    }
}

/// Outcome of a full rebuild walk
#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildStats {
    pub files_indexed: usize,
    pub files_failed: usize,
}

/// Owner of the four granular indices and the file registry.
///
/// All mutation goes through this type; callers serialize access with a
/// single lock (see [`crate::engine::Engine`]).
pub struct IndexManager {
    indices: PerGranularity<GranularIndex>,
    registry: HashMap<String, PerGranularity<Vec<u64>>>,
    embedder: Arc<dyn Embedder>,
    index_dir: PathBuf,
}

impl IndexManager {
    /// Open the manager, loading persisted index snapshots when present.
    /// Loaded snapshots carry no metadata until the next rebuild walk.
    pub fn open(embedder: Arc<dyn Embedder>, index_dir: &Path) -> Self {
        let dim = embedder.dimension();
        let load = |granularity: Granularity| {
            let path = snapshot_path(index_dir, granularity);
            if path.exists() {
                match GranularIndex::load(&path) {
                    Ok(index) if index.dim() == dim => return index,
                    Ok(index) => warn!(
                        "snapshot {} has dimension {}, expected {}; starting fresh",
                        path.display(),
                        index.dim(),
                        dim
                    ),
                    Err(e) => warn!("could not load snapshot {}: {}", path.display(), e),
                }
            }
            GranularIndex::new(dim)
        };

        Self {
            indices: PerGranularity {
                day: load(Granularity::Day),
                memory: load(Granularity::Memory),
                section: load(Granularity::Section),
                line: load(Granularity::Line),
            },
            registry: HashMap::new(),
            embedder,
            index_dir: index_dir.to_path_buf(),
        }
    }

    pub fn index(&self, granularity: Granularity) -> &GranularIndex {
        self.indices.get(granularity)
    }

    /// Identifiers currently attributed to a file, if it is registered
    pub fn registered_ids(&self, path: &Path) -> Option<&PerGranularity<Vec<u64>>> {
        self.registry.get(&registry_key(path))
    }

    /// Union of all per-file identifier lists for one granularity
    pub fn registry_ids(&self, granularity: Granularity) -> HashSet<u64> {
        self.registry
            .values()
            .flat_map(|ids| ids.get(granularity).iter().copied())
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.registry.len()
    }

    /// Segments with resolvable metadata, per granularity
    pub fn segment_counts(&self) -> PerGranularity<usize> {
        PerGranularity {
            day: self.indices.day.segment_count(),
            memory: self.indices.memory.segment_count(),
            section: self.indices.section.segment_count(),
            line: self.indices.line.segment_count(),
        }
    }

    /// Vectors held by the search structures, per granularity. Differs from
    /// [`Self::segment_counts`] only for loaded snapshots that have not been
    /// repopulated by a rebuild yet.
    pub fn vector_counts(&self) -> PerGranularity<usize> {
        PerGranularity {
            day: self.indices.day.len(),
            memory: self.indices.memory.len(),
            section: self.indices.section.len(),
            line: self.indices.line.len(),
        }
    }

    /// (Re-)index one file: every identifier previously attributed to the
    /// path is removed before the new segments are added, so old and new
    /// segments never coexist.
    ///
    /// Non-journal paths are skipped with a warning. A failed embedding
    /// batch skips those segments and continues.
    pub fn index_file(&mut self, path: &Path, content: &str, opts: &IndexOptions) -> Result<()> {
        if !is_journal_file(path) {
            warn!("skipping non-journal file {}", path.display());
            return Ok(());
        }

        let normalized = normalize_timestamps(content, opts.tz);
        let doc = segment_document(&normalized, opts.include_titles);
        let date = file_date(path);
        let key = registry_key(path);

        let previous = self.registry.remove(&key).unwrap_or_default();
        let mut current = PerGranularity::<Vec<u64>>::default();

        for granularity in Granularity::ALL {
            let raw = doc.get(granularity);

            let vectors = if raw.is_empty() {
                Vec::new()
            } else {
                let texts: Vec<String> = raw.iter().map(|s| s.text.clone()).collect();
                match self.embedder.embed_passages(&texts) {
                    Ok(vectors) => vectors,
                    Err(e) => {
                        warn!(
                            "embedding failed for {} {} segments of {}: {}",
                            raw.len(),
                            granularity,
                            path.display(),
                            e
                        );
                        Vec::new()
                    }
                }
            };

            let index = self.indices.get_mut(granularity);
            index.remove_batch(previous.get(granularity));

            for (raw_segment, vector) in raw.iter().zip(vectors) {
                let segment = Segment {
                    text: raw_segment.text.clone(),
                    title: raw_segment.title.clone(),
                    granularity,
                    source_file: key.clone(),
                    date,
                    parent_memory: raw_segment.parent_memory.clone(),
                    parent_section: raw_segment.parent_section.clone(),
                };
                let id = index.add(vector, segment);
                current.get_mut(granularity).push(id);
            }
        }

        debug!(
            "indexed {}: {} day, {} memory, {} section, {} line",
            path.display(),
            current.day.len(),
            current.memory.len(),
            current.section.len(),
            current.line.len()
        );
        self.registry.insert(key, current);
        self.persist();
        Ok(())
    }

    /// Remove every segment attributed to a file. Unknown paths are a no-op.
    pub fn remove_file(&mut self, path: &Path) {
        let key = registry_key(path);
        let Some(previous) = self.registry.remove(&key) else {
            return;
        };
        for granularity in Granularity::ALL {
            self.indices
                .get_mut(granularity)
                .remove_batch(previous.get(granularity));
        }
        debug!("removed {} from index", path.display());
        self.persist();
    }

    /// Discard all state and re-index every journal file under `docs_dir`.
    /// A single bad file is logged and skipped, never aborting the walk.
    pub fn rebuild(&mut self, docs_dir: &Path, opts: &IndexOptions) -> Result<RebuildStats> {
        info!("rebuilding index from {}", docs_dir.display());
        self.clear_all();

        let files = discover_files(docs_dir)?;
        let mut stats = RebuildStats::default();
        for file in &files {
            let content = match std::fs::read_to_string(&file.path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("could not read {}: {}", file.path.display(), e);
                    stats.files_failed += 1;
                    continue;
                }
            };
            match self.index_file(&file.path, &content, opts) {
                Ok(()) => stats.files_indexed += 1,
                Err(e) => {
                    warn!("could not index {}: {}", file.path.display(), e);
                    stats.files_failed += 1;
                }
            }
        }

        info!(
            "rebuild complete: {} files indexed, {} failed",
            stats.files_indexed, stats.files_failed
        );
        Ok(stats)
    }

    /// Clear all state and persist the now-empty indices. Callers must
    /// rebuild explicitly to repopulate.
    pub fn reset(&mut self) {
        self.clear_all();
        self.persist();
        info!("index reset");
    }

    fn clear_all(&mut self) {
        for granularity in Granularity::ALL {
            self.indices.get_mut(granularity).clear();
        }
        self.registry.clear();
    }

    /// Persist all four search structures. Failure is logged; in-memory
    /// state remains authoritative for this process.
    fn persist(&self) {
        for granularity in Granularity::ALL {
            let path = snapshot_path(&self.index_dir, granularity);
            if let Err(e) = self.indices.get(granularity).save(&path) {
                warn!(
                    "failed to persist {} index to {}: {}",
                    granularity,
                    path.display(),
                    e
                );
            }
        }
    }
}

fn snapshot_path(index_dir: &Path, granularity: Granularity) -> PathBuf {
    index_dir.join(format!("index_{}.bin", granularity))
}

fn registry_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
