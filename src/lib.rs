//! Sentiment-steered paragraph generation for local inference in Rust.
//!
//! Powered by [Candle](https://github.com/huggingface/candle). A DistilBERT classifier reads
//! the tone of a prompt, and a GPT-2 model writes a paragraph about it in that tone.
//!
//! ```rust,no_run
//! use sentiment_generator::{ModelConfig, SamplingParams, SentimentGenerator, SentimentLabel};
//!
//! # fn main() -> sentiment_generator::error::Result<()> {
//! let generator = SentimentGenerator::new(ModelConfig::default().gen_model("distilgpt2"))?;
//!
//! let text = generator.generate_text(
//!     "  local coffee shops  ",
//!     Some(SentimentLabel::Negative),
//!     &SamplingParams::default(),
//! )?;
//! assert!(text.starts_with("Write a critical paragraph about:\nlocal coffee shops"));
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

// ============ Internal API ============

pub(crate) mod loaders;
pub(crate) mod pipelines;

// ============ Public API ============

pub mod error;
pub mod models;

pub use pipelines::{cache, sentiment, text_generation, utils};
pub use pipelines::sentiment_generator::{ModelConfig, SentimentGenerator};

pub use error::{PipelineError, Result};
pub use pipelines::sentiment::{SentimentLabel, SentimentResult};
pub use pipelines::text_generation::{GenerationRequest, SamplingParams};
pub use pipelines::utils::DeviceRequest;
