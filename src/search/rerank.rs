use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::search::model::{
    configure_batch_padding, fetch_model_files, load_bert_config, load_tokenizer, weight_builder,
};
use candle_core::{Device, Tensor};
use candle_nn::{linear, Linear, Module};
use candle_transformers::models::bert::BertModel;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;

/// Default pairwise relevance model
/// https://huggingface.co/cross-encoder/ms-marco-MiniLM-L-6-v2
const DEFAULT_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-6-v2";

/// The pairwise relevance-scoring capability the engine consumes.
pub trait Reranker: Send + Sync {
    /// Score each candidate against the query; one score per candidate,
    /// in candidate order. Higher means more relevant.
    fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>>;
}

/// Cross-encoder reranker: BERT over (query, candidate) pairs with a
/// pooler and a single-logit classification head.
pub struct CrossEncoder {
    model: Arc<Mutex<BertModel>>,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Arc<Mutex<Tokenizer>>,
    device: Device,
}

impl CrossEncoder {
    pub fn init(config: &Config) -> Result<Self> {
        Self::init_with_verbosity(config, false)
    }

    pub fn init_verbose(config: &Config) -> Result<Self> {
        Self::init_with_verbosity(config, true)
    }

    fn init_with_verbosity(config: &Config, verbose: bool) -> Result<Self> {
        let files = fetch_model_files(DEFAULT_MODEL, &config.models_dir.join("reranker"), verbose)?;

        if verbose {
            println!("Loading reranker model from disk...");
        }

        let (bert_config, hidden) = load_bert_config(&files.config)?;
        let tokenizer = load_tokenizer(&files.tokenizer)?;
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);

        let vb = weight_builder(&files.model, &device)?;
        // Checkpoint layout: "bert.*" for the encoder, "classifier.*" for
        // the sequence-classification head
        let model = BertModel::load(vb.pp("bert"), &bert_config)
            .map_err(|e| Error::Model(format!("Failed to load model: {}", e)))?;
        let pooler = linear(hidden, hidden, vb.pp("bert").pp("pooler").pp("dense"))
            .map_err(|e| Error::Model(format!("Failed to load pooler: {}", e)))?;
        let classifier = linear(hidden, 1, vb.pp("classifier"))
            .map_err(|e| Error::Model(format!("Failed to load classifier: {}", e)))?;

        if verbose {
            println!("✓ Reranker model loaded");
        }

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            pooler,
            classifier,
            tokenizer: Arc::new(Mutex::new(tokenizer)),
            device,
        })
    }
}

impl Reranker for CrossEncoder {
    fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let model = self
            .model
            .lock()
            .map_err(|e| Error::Model(format!("Failed to lock model: {}", e)))?;
        let mut tokenizer = self
            .tokenizer
            .lock()
            .map_err(|e| Error::Model(format!("Failed to lock tokenizer: {}", e)))?;

        configure_batch_padding(&mut tokenizer);

        let pairs: Vec<(String, String)> = candidates
            .iter()
            .map(|candidate| (query.to_string(), candidate.clone()))
            .collect();
        let encodings = tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| Error::Tokenizer(format!("Tokenization failed: {}", e)))?;

        let token_ids: Result<Vec<Tensor>> = encodings
            .iter()
            .map(|t| Tensor::new(t.get_ids(), &self.device).map_err(Error::Candle))
            .collect();
        let type_ids: Result<Vec<Tensor>> = encodings
            .iter()
            .map(|t| Tensor::new(t.get_type_ids(), &self.device).map_err(Error::Candle))
            .collect();

        let token_ids = Tensor::stack(&token_ids?, 0)?;
        let token_type_ids = Tensor::stack(&type_ids?, 0)?;

        let hidden = model.forward(&token_ids, &token_type_ids)?;

        // CLS token -> pooler dense + tanh -> single relevance logit
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;
        let scores = logits.squeeze(1)?.to_vec1::<f32>()?;

        Ok(scores)
    }
}
