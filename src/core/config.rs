use super::error::{Error, Result};
use crate::indexing::segmenter::Granularity;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Directory layout for journal2vec data
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for journal2vec data
    pub base_dir: PathBuf,
    /// Directory holding the persisted vector indices
    pub index_dir: PathBuf,
    /// Directory for cached models
    pub models_dir: PathBuf,
    /// Path to the settings file
    pub settings_path: PathBuf,
}

impl Config {
    /// Get the default configuration directory
    pub fn default_base_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))
            .map(|home| home.join(".journal2vec"))
    }

    /// Create a new configuration
    pub fn new(base_dir: Option<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.unwrap_or_else(|| {
            Self::default_base_dir().unwrap_or_else(|_| PathBuf::from(".journal2vec"))
        });

        Ok(Self {
            index_dir: base_dir.join("index"),
            models_dir: base_dir.join("models"),
            settings_path: base_dir.join("settings.json"),
            base_dir,
        })
    }

    /// Initialize the configuration directories
    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(&self.index_dir)?;
        std::fs::create_dir_all(&self.models_dir)?;
        Ok(())
    }

    /// Check if the configuration is already initialized
    pub fn is_initialized(&self) -> bool {
        self.base_dir.exists() && self.index_dir.exists()
    }
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("./journal")
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_include_titles() -> bool {
    true
}

fn default_retrieval_mode() -> Granularity {
    Granularity::Memory
}

fn default_n_candidates() -> usize {
    10
}

fn default_n_results() -> usize {
    5
}

/// Runtime-tunable settings, stored as JSON under the base directory.
///
/// Missing fields take their defaults, so old settings files keep working
/// after new fields are added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory of the journal tree
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    /// IANA time zone name used for timestamp rendering and recency ages
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Prefix segment text with its heading line
    #[serde(default = "default_include_titles")]
    pub include_titles: bool,
    /// Default granularity for queries
    #[serde(default = "default_retrieval_mode")]
    pub retrieval_mode: Granularity,
    /// Score penalty per day of age; zero disables recency decay
    #[serde(default)]
    pub recency_weight: f32,
    /// Candidates fetched from the vector index before reranking
    #[serde(default = "default_n_candidates")]
    pub n_candidates: usize,
    /// Results returned to the caller
    #[serde(default = "default_n_results")]
    pub n_results: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            timezone: default_timezone(),
            include_titles: default_include_titles(),
            retrieval_mode: default_retrieval_mode(),
            recency_weight: 0.0,
            n_candidates: default_n_candidates(),
            n_results: default_n_results(),
        }
    }
}

impl Settings {
    /// Load settings from disk, falling back to defaults on a missing or
    /// unreadable file. An unknown timezone in the file is replaced by UTC.
    /// The resolved settings are written back so the file always reflects
    /// the full surface.
    pub fn load(path: &Path) -> Self {
        let mut settings = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Settings>(&content) {
                Ok(s) => s,
                Err(e) => {
                    warn!("could not parse {}: {}, using defaults", path.display(), e);
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        };

        if settings.timezone.parse::<Tz>().is_err() {
            warn!(
                "invalid timezone '{}' in settings, defaulting to UTC",
                settings.timezone
            );
            settings.timezone = default_timezone();
        }

        if let Err(e) = settings.save(path) {
            warn!("could not write settings file {}: {}", path.display(), e);
        }

        settings
    }

    /// Write settings to disk as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// The configured time zone. Settings are validated on load and update,
    /// so this only falls back to UTC if the field was mutated directly.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// Apply a partial update. Validation happens before any field is
    /// committed, so a rejected patch leaves the settings untouched.
    pub fn apply(&mut self, patch: &SettingsPatch) -> Result<()> {
        if let Some(tz) = &patch.timezone {
            if tz.parse::<Tz>().is_err() {
                return Err(Error::Validation(format!("Invalid timezone: {}", tz)));
            }
        }

        if let Some(tz) = &patch.timezone {
            self.timezone = tz.clone();
        }
        if let Some(include_titles) = patch.include_titles {
            self.include_titles = include_titles;
        }
        if let Some(mode) = patch.retrieval_mode {
            self.retrieval_mode = mode;
        }
        if let Some(weight) = patch.recency_weight {
            self.recency_weight = weight;
        }
        if let Some(n) = patch.n_candidates {
            self.n_candidates = n;
        }
        if let Some(n) = patch.n_results {
            self.n_results = n;
        }
        Ok(())
    }
}

/// Partial settings update: one optional field per recognized setting.
/// Unknown JSON fields are ignored on deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub timezone: Option<String>,
    pub include_titles: Option<bool>,
    pub retrieval_mode: Option<Granularity>,
    pub recency_weight: Option<f32>,
    pub n_candidates: Option<usize>,
    pub n_results: Option<usize>,
}
