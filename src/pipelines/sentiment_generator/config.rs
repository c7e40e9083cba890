use crate::models::capabilities::{SentimentClassifier, TextGenerator};
use crate::models::{DistilBertSentimentModel, Gpt2Model};
use crate::pipelines::utils::DeviceRequest;

/// Which models to load, and where.
///
/// `Eq + Hash` so a caller can key a [`ModelCache`](crate::cache::ModelCache) on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelConfig {
    /// HuggingFace repo id of the sentiment classifier.
    pub sentiment_model: String,
    /// HuggingFace repo id of the causal text generator.
    pub gen_model: String,
    /// Inference device for both models.
    pub device: DeviceRequest,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sentiment_model: DistilBertSentimentModel::DEFAULT_MODEL.to_string(),
            gen_model: Gpt2Model::DEFAULT_MODEL.to_string(),
            device: DeviceRequest::Cpu,
        }
    }
}

impl ModelConfig {
    /// Build from model ids and an integer device selector (`-1` = CPU, `n >= 0` = GPU `n`).
    pub fn new(sentiment_model: &str, gen_model: &str, device: i64) -> Self {
        Self {
            sentiment_model: sentiment_model.into(),
            gen_model: gen_model.into(),
            device: DeviceRequest::from_index(device),
        }
    }

    /// Use a different sentiment classifier.
    pub fn sentiment_model(mut self, model_id: &str) -> Self {
        self.sentiment_model = model_id.into();
        self
    }

    /// Use a different text generator.
    pub fn gen_model(mut self, model_id: &str) -> Self {
        self.gen_model = model_id.into();
        self
    }

    /// Use CPU for inference (default).
    pub fn cpu(mut self) -> Self {
        self.device = DeviceRequest::Cpu;
        self
    }

    /// Use a specific CUDA GPU for inference.
    pub fn cuda(mut self, index: usize) -> Self {
        self.device = DeviceRequest::Cuda(index);
        self
    }
}
