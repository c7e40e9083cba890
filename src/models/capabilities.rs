//! Model capability traits.
//!
//! The orchestrator only talks to models through these traits, so a different
//! inference backend can be dropped in without touching the steering logic.

use crate::error::Result;
use crate::pipelines::text_generation::SamplingParams;
use candle_core::Device;

/// Top prediction of a classifier, before label normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Label exactly as the model's `id2label` spells it (e.g. `POSITIVE`, `LABEL_1`).
    pub label: String,
    /// Softmax probability of that label.
    pub score: f32,
}

/// Anything that turns text into a label and a confidence.
pub trait SentimentClassifier {
    /// Model used when the requested one cannot be loaded.
    const DEFAULT_MODEL: &'static str;

    /// Load the model identified by `model_id` onto `device`.
    fn load(model_id: &str, device: &Device) -> Result<Self>
    where
        Self: Sized;

    /// Classify `text`, truncating it to the model's input window if needed.
    fn classify(&self, text: &str) -> Result<Classification>;
}

/// Anything that continues a prompt under sampling parameters.
pub trait TextGenerator {
    /// Model used when the requested one cannot be loaded.
    const DEFAULT_MODEL: &'static str;

    /// Load the model identified by `model_id` onto `device`.
    fn load(model_id: &str, device: &Device) -> Result<Self>
    where
        Self: Sized;

    /// Sample one continuation of `prompt`.
    ///
    /// The returned text starts with `prompt` itself, followed by the newly generated text.
    fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String>;
}
