use crate::core::config::{Config, Settings, SettingsPatch};
use crate::core::error::Result;
use crate::search::model::Embedder;
use crate::search::query::{self, QueryRequest, QueryResult};
use crate::search::rerank::Reranker;
use crate::storage::manager::{IndexManager, IndexOptions, PerGranularity, RebuildStats};
use crate::ui::watch::ChangeEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Index health as reported to callers
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub indexed_files: usize,
    pub indexed_segments: PerGranularity<usize>,
    pub indexed_vectors: PerGranularity<usize>,
    pub last_full_index: Option<DateTime<Utc>>,
    pub last_change_index: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Timestamps {
    last_full_index: Option<DateTime<Utc>>,
    last_change_index: Option<DateTime<Utc>>,
}

/// The facade any request layer talks to. Every method is synchronous.
///
/// One mutex guards the four granular indices, the file registry, and the
/// identifier allocators together; search plus metadata snapshot happen
/// under it so query callers never observe a half-applied mutation.
/// Embedding and reranking run outside the lock.
pub struct Engine {
    manager: Mutex<IndexManager>,
    settings: Mutex<Settings>,
    timestamps: Mutex<Timestamps>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    settings_path: PathBuf,
}

impl Engine {
    pub fn new(
        config: &Config,
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
    ) -> Self {
        let manager = IndexManager::open(embedder.clone(), &config.index_dir);
        Self {
            manager: Mutex::new(manager),
            settings: Mutex::new(settings),
            timestamps: Mutex::new(Timestamps::default()),
            embedder,
            reranker,
            settings_path: config.settings_path.clone(),
        }
    }

    /// Current settings snapshot
    pub fn settings(&self) -> Settings {
        lock(&self.settings).clone()
    }

    /// Apply a partial settings update. Validation failures reject the
    /// whole patch with no state mutation. Committed settings are written
    /// back to disk; a write failure is logged, not fatal.
    pub fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings> {
        let mut settings = lock(&self.settings);
        settings.apply(patch)?;
        if let Err(e) = settings.save(&self.settings_path) {
            warn!(
                "could not save settings to {}: {}",
                self.settings_path.display(),
                e
            );
        }
        Ok(settings.clone())
    }

    /// Two-stage query: dense retrieval, rerank, recency decay.
    pub fn query(&self, request: &QueryRequest) -> Result<Vec<QueryResult>> {
        let text = query::validate_query_text(&request.text)?.to_string();

        let settings = self.settings();
        let mode = request.mode.unwrap_or(settings.retrieval_mode);
        let recency_weight = request.recency_weight.unwrap_or(settings.recency_weight);
        let n_results = request.n_results.unwrap_or(settings.n_results);

        let query_vector = self.embedder.embed_query(&text)?;

        // Candidate search and metadata snapshot are atomic under the lock
        let candidates = {
            let manager = lock(&self.manager);
            query::collect_candidates(manager.index(mode), &query_vector, settings.n_candidates)
        };

        let today = Utc::now().with_timezone(&settings.tz()).date_naive();
        query::rank(
            &text,
            candidates,
            self.reranker.as_ref(),
            recency_weight,
            today,
            n_results,
        )
    }

    /// Full rebuild of all indices from the configured journal directory.
    /// Holds the lock for the entire walk: queries wait, and never observe
    /// a partially rebuilt index.
    pub fn refresh(&self) -> Result<RebuildStats> {
        let settings = self.settings();
        std::fs::create_dir_all(&settings.docs_dir)?;
        let opts = IndexOptions::from(&settings);

        let stats = lock(&self.manager).rebuild(&settings.docs_dir, &opts)?;

        let now = Utc::now();
        let mut timestamps = lock(&self.timestamps);
        timestamps.last_full_index = Some(now);
        timestamps.last_change_index = Some(now);
        Ok(stats)
    }

    /// Clear all indexed state and persist the empty indices. A `refresh`
    /// is required to repopulate.
    pub fn reset(&self) -> Result<()> {
        lock(&self.manager).reset();
        let mut timestamps = lock(&self.timestamps);
        timestamps.last_full_index = None;
        timestamps.last_change_index = None;
        Ok(())
    }

    pub fn status(&self) -> Status {
        let (indexed_files, indexed_segments, indexed_vectors) = {
            let manager = lock(&self.manager);
            (
                manager.file_count(),
                manager.segment_counts(),
                manager.vector_counts(),
            )
        };
        let timestamps = lock(&self.timestamps);
        Status {
            indexed_files,
            indexed_segments,
            indexed_vectors,
            last_full_index: timestamps.last_full_index,
            last_change_index: timestamps.last_change_index,
        }
    }

    /// Apply one filesystem change event. Called by the reconciliation
    /// worker, strictly in delivery order.
    pub fn apply_event(&self, event: &ChangeEvent) -> Result<()> {
        let settings = self.settings();
        let opts = IndexOptions::from(&settings);

        match event {
            ChangeEvent::Created(path) | ChangeEvent::Modified(path) => {
                self.index_path(path, &opts)?;
            }
            ChangeEvent::Deleted(path) => {
                lock(&self.manager).remove_file(path);
            }
            ChangeEvent::Moved(src, dest) => {
                lock(&self.manager).remove_file(src);
                self.index_path(dest, &opts)?;
            }
        }

        lock(&self.timestamps).last_change_index = Some(Utc::now());
        Ok(())
    }

    fn index_path(&self, path: &Path, opts: &IndexOptions) -> Result<()> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("could not read {}: {}", path.display(), e);
                return Ok(());
            }
        };
        lock(&self.manager).index_file(path, &content, opts)
    }
}

// A poisoned lock still holds structurally valid state; recover the guard
// instead of wedging every caller.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
