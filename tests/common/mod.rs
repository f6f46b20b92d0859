#![allow(dead_code)]

use journal2vec::core::config::{Config, Settings};
use journal2vec::core::error::Result;
use journal2vec::engine::Engine;
use journal2vec::search::model::Embedder;
use journal2vec::search::rerank::Reranker;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const DIM: usize = 16;

/// Deterministic embedder: words hashed into a fixed-dimension bag.
/// Shared words produce overlapping buckets, so related texts score higher.
pub struct TestEmbedder;

impl TestEmbedder {
    fn embed_one(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIM];
        for word in text.to_lowercase().split_whitespace() {
            let mut h: usize = 0;
            for byte in word.bytes() {
                h = h.wrapping_mul(31).wrapping_add(byte as usize);
            }
            vector[h % DIM] += 1.0;
        }
        vector
    }
}

impl Embedder for TestEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::embed_one(text))
    }

    fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

/// Scores each candidate by the number of query words it contains.
pub struct TestReranker;

impl Reranker for TestReranker {
    fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        let words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Ok(candidates
            .iter()
            .map(|candidate| {
                let lower = candidate.to_lowercase();
                words.iter().filter(|w| lower.contains(*w)).count() as f32
            })
            .collect())
    }
}

/// Panics on any call; proves that validation happens before model work.
pub struct PanickingEmbedder;

impl Embedder for PanickingEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        panic!("embed_query must not be called");
    }

    fn embed_passages(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        panic!("embed_passages must not be called");
    }
}

pub struct TestHarness {
    pub engine: Arc<Engine>,
    pub docs_dir: PathBuf,
    pub config: Config,
    // Held so the directories outlive the harness
    pub _temp: TempDir,
}

pub fn harness() -> TestHarness {
    harness_with_embedder(Arc::new(TestEmbedder))
}

pub fn harness_with_embedder(embedder: Arc<dyn Embedder>) -> TestHarness {
    let temp = TempDir::new().unwrap();
    let config = Config::new(Some(temp.path().join("base"))).unwrap();
    config.init().unwrap();

    let docs_dir = temp.path().join("journal");
    std::fs::create_dir_all(&docs_dir).unwrap();

    let mut settings = Settings::load(&config.settings_path);
    settings.docs_dir = docs_dir.clone();
    settings.save(&config.settings_path).unwrap();

    let engine = Arc::new(Engine::new(
        &config,
        settings,
        embedder,
        Arc::new(TestReranker),
    ));

    TestHarness {
        engine,
        docs_dir,
        config,
        _temp: temp,
    }
}

/// Write a journal file under the harness docs dir and return its path.
pub fn write_journal(harness: &TestHarness, name: &str, content: &str) -> PathBuf {
    let path = harness.docs_dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}
