use crate::core::config::Config;
use crate::core::error::{Error, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::api::sync::Api;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::{PaddingParams, Tokenizer};

/// Default embedding model (small, strong, good for semantic search)
/// https://huggingface.co/BAAI/bge-small-en-v1.5
const DEFAULT_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// The text-embedding capability the engine consumes.
///
/// Implementations must produce vectors of one fixed dimension; the index
/// treats a dimension mismatch as a contract violation, not an error.
pub trait Embedder: Send + Sync {
    /// Dimension of every vector produced by this embedder
    fn dimension(&self) -> usize;

    /// Embed a search query into a unit vector
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of passages for indexing
    fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Checkpoint files for one model, downloaded on first use
pub(crate) struct ModelFiles {
    pub model: PathBuf,
    pub config: PathBuf,
    pub tokenizer: PathBuf,
}

/// Ensure a model's checkpoint files exist under `model_dir`, downloading
/// them from the HuggingFace Hub when missing.
pub(crate) fn fetch_model_files(
    repo_id: &str,
    model_dir: &Path,
    verbose: bool,
) -> Result<ModelFiles> {
    std::fs::create_dir_all(model_dir)?;
    let files = ModelFiles {
        model: model_dir.join("model.safetensors"),
        config: model_dir.join("config.json"),
        tokenizer: model_dir.join("tokenizer.json"),
    };

    if files.model.exists() && files.config.exists() && files.tokenizer.exists() {
        return Ok(files);
    }

    if verbose {
        println!("Downloading model from HuggingFace Hub...");
        println!("Model: {}", repo_id);
    }

    let api = Api::new()?;
    let repo = api.model(repo_id.to_string());

    if verbose {
        println!("  Downloading config.json...");
    }
    let config_file = repo.get("config.json")?;

    if verbose {
        println!("  Downloading tokenizer.json...");
    }
    let tokenizer_file = repo.get("tokenizer.json")?;

    if verbose {
        println!("  Downloading model.safetensors (this may take a while)...");
    }
    let weights_file = repo.get("model.safetensors")?;

    std::fs::copy(&config_file, &files.config)?;
    std::fs::copy(&tokenizer_file, &files.tokenizer)?;
    std::fs::copy(&weights_file, &files.model)?;

    if verbose {
        println!("✓ Model downloaded successfully");
    }
    Ok(files)
}

/// Parse a BERT checkpoint config, also extracting the hidden size (the
/// embedding dimension) from the raw JSON.
pub(crate) fn load_bert_config(path: &Path) -> Result<(BertConfig, usize)> {
    let content = std::fs::read_to_string(path)?;
    let config: BertConfig = serde_json::from_str(&content)
        .map_err(|e| Error::Model(format!("Failed to parse config: {}", e)))?;
    let raw: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| Error::Model(format!("Failed to parse config: {}", e)))?;
    let hidden_size = raw
        .get("hidden_size")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| Error::Model("config.json has no hidden_size".to_string()))?;
    Ok((config, hidden_size as usize))
}

pub(crate) fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(path)
        .map_err(|e| Error::Tokenizer(format!("Failed to load tokenizer: {}", e)))
}

pub(crate) fn weight_builder(path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    unsafe {
        VarBuilder::from_mmaped_safetensors(&[path], DTYPE, device)
            .map_err(|e| Error::Model(format!("Failed to load weights: {}", e)))
    }
}

pub(crate) fn configure_batch_padding(tokenizer: &mut Tokenizer) {
    if let Some(pp) = tokenizer.get_padding_mut() {
        pp.strategy = tokenizers::PaddingStrategy::BatchLongest;
    } else {
        let pp = PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        };
        tokenizer.with_padding(Some(pp));
    }
}

/// L2 normalization along the hidden dimension
pub(crate) fn normalize_l2(v: &Tensor) -> Result<Tensor> {
    Ok(v.broadcast_div(&v.sqr()?.sum_keepdim(1)?.sqrt()?)?)
}

/// BERT embedding model running on candle
pub struct EmbeddingModel {
    model: Arc<Mutex<BertModel>>,
    tokenizer: Arc<Mutex<Tokenizer>>,
    device: Device,
    dim: usize,
}

impl EmbeddingModel {
    /// Initialize quietly. Useful when stdout belongs to someone else.
    pub fn init(config: &Config) -> Result<Self> {
        Self::init_with_verbosity(config, false)
    }

    /// Initialize with progress/status output for CLI commands.
    pub fn init_verbose(config: &Config) -> Result<Self> {
        Self::init_with_verbosity(config, true)
    }

    fn init_with_verbosity(config: &Config, verbose: bool) -> Result<Self> {
        let files = fetch_model_files(DEFAULT_MODEL, &config.models_dir.join("embedding"), verbose)?;

        if verbose {
            println!("Loading embedding model from disk...");
        }

        let (bert_config, dim) = load_bert_config(&files.config)?;
        let tokenizer = load_tokenizer(&files.tokenizer)?;
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);

        let vb = weight_builder(&files.model, &device)?;
        let model = BertModel::load(vb, &bert_config)
            .map_err(|e| Error::Model(format!("Failed to load model: {}", e)))?;

        if verbose {
            println!("✓ Embedding model loaded");
        }

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            tokenizer: Arc::new(Mutex::new(tokenizer)),
            device,
            dim,
        })
    }

    /// Run the BERT forward pass over a batch and CLS-pool the output.
    fn forward(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self
            .model
            .lock()
            .map_err(|e| Error::Model(format!("Failed to lock model: {}", e)))?;
        let mut tokenizer = self
            .tokenizer
            .lock()
            .map_err(|e| Error::Model(format!("Failed to lock tokenizer: {}", e)))?;

        configure_batch_padding(&mut tokenizer);

        let tokens = tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| Error::Tokenizer(format!("Tokenization failed: {}", e)))?;

        let token_ids: Result<Vec<Tensor>> = tokens
            .iter()
            .map(|t| Tensor::new(t.get_ids(), &self.device).map_err(Error::Candle))
            .collect();

        let token_ids = Tensor::stack(&token_ids?, 0)?;
        let token_type_ids = token_ids.zeros_like()?;

        let embeddings = model.forward(&token_ids, &token_type_ids)?;

        // CLS pooling (recommended for BGE-style retrieval models)
        // embeddings: [batch, seq, hidden] -> pooled: [batch, hidden]
        let pooled = embeddings.narrow(1, 0, 1)?.squeeze(1)?;
        let normalized = normalize_l2(&pooled)?;

        let (n_sentences, _) = normalized.dims2()?;
        let mut result = Vec::with_capacity(n_sentences);
        for i in 0..n_sentences {
            result.push(normalized.get(i)?.to_vec1()?);
        }
        Ok(result)
    }
}

impl Embedder for EmbeddingModel {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        // BGE models are trained with an instruction prefix on the query side
        let prefixed = vec![format!("query: {}", text)];
        let mut vectors = self.forward(&prefixed)?;
        vectors
            .pop()
            .ok_or_else(|| Error::Model("Embedding produced no output".to_string()))
    }

    fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let prefixed: Vec<String> = texts.iter().map(|t| format!("passage: {}", t)).collect();
        self.forward(&prefixed)
    }
}
