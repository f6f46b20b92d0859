// Core functionality
pub mod core {
    pub mod config;
    pub mod error;
}

// Indexing pipeline
pub mod indexing {
    pub mod dates;
    pub mod discovery;
    pub mod segmenter;
}

// Data storage
pub mod storage {
    pub mod index;
    pub mod manager;
}

// Search & ML
pub mod search {
    pub mod model;
    pub mod query;
    pub mod rerank;
}

// Engine facade
pub mod engine;

// User interfaces
pub mod ui {
    pub mod cli;
    pub mod watch;
}

// Re-export commonly used types
pub use crate::core::config::{Config, Settings, SettingsPatch};
pub use crate::core::error::{Error, Result};
pub use crate::engine::{Engine, Status};
pub use crate::indexing::discovery::discover_files;
pub use crate::indexing::segmenter::{segment_document, Granularity};
pub use crate::search::model::{Embedder, EmbeddingModel};
pub use crate::search::query::{QueryRequest, QueryResult};
pub use crate::search::rerank::{CrossEncoder, Reranker};
pub use crate::storage::index::{GranularIndex, Segment};
pub use crate::storage::manager::{IndexManager, PerGranularity};
pub use crate::ui::cli::Cli;
pub use crate::ui::watch::{ChangeEvent, FileWatcher};
