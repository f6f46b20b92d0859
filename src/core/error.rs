use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("HuggingFace API error: {0}")]
    HuggingFace(#[from] hf_hub::api::sync::ApiError),
}

pub type Result<T> = std::result::Result<T, Error>;
