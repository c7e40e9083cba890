use tracing::debug;

use super::acquire::acquire;
use super::config::ModelConfig;
use crate::error::Result;
use crate::models::capabilities::{SentimentClassifier, TextGenerator};
use crate::models::{DistilBertSentimentModel, Gpt2Model};
use crate::pipelines::sentiment::{SentimentLabel, SentimentResult};
use crate::pipelines::text_generation::params::{steered_prompt, GenerationRequest, SamplingParams};

/// Detects the sentiment of a prompt and writes a paragraph in a matching tone.
///
/// Generic over its two capabilities; the defaults run DistilBERT and GPT-2 on Candle.
///
/// # Examples
///
/// ```rust,no_run
/// use sentiment_generator::{ModelConfig, SamplingParams, SentimentGenerator};
///
/// # fn main() -> sentiment_generator::error::Result<()> {
/// let generator = SentimentGenerator::new(ModelConfig::default())?;
///
/// let detected = generator.predict_sentiment("Small shops keep our town alive")?;
/// println!("{} ({:.2})", detected.label, detected.score);
///
/// let text = generator.generate_text(
///     "Small shops keep our town alive",
///     None,
///     &SamplingParams::default().max_new_tokens(120),
/// )?;
/// println!("{text}");
/// # Ok(())
/// # }
/// ```
pub struct SentimentGenerator<C = DistilBertSentimentModel, G = Gpt2Model> {
    classifier: C,
    generator: G,
    sentiment_model_id: String,
    generator_model_id: String,
    fell_back: bool,
}

impl SentimentGenerator {
    /// Load the default Candle backends described by `config`.
    ///
    /// See [`SentimentGenerator::load`] for the fallback policy.
    pub fn new(config: ModelConfig) -> Result<Self> {
        Self::load(config)
    }
}

impl<C: SentimentClassifier, G: TextGenerator> SentimentGenerator<C, G> {
    /// Load both models on the configured device.
    ///
    /// A model that fails to load is replaced by the backend's default model on the
    /// same device, with a warning. Only when that fallback fails as well is an
    /// error returned.
    pub fn load(config: ModelConfig) -> Result<Self> {
        let device = config.device.resolve()?;

        let classifier = acquire(
            "sentiment",
            &config.sentiment_model,
            C::DEFAULT_MODEL,
            |id| C::load(id, &device),
        )?;
        let generator = acquire("generator", &config.gen_model, G::DEFAULT_MODEL, |id| {
            G::load(id, &device)
        })?;

        Ok(Self {
            fell_back: classifier.fell_back || generator.fell_back,
            classifier: classifier.model,
            generator: generator.model,
            sentiment_model_id: classifier.model_id,
            generator_model_id: generator.model_id,
        })
    }

    /// Wrap already loaded capabilities.
    pub fn from_parts(classifier: C, generator: G) -> Self {
        Self {
            classifier,
            generator,
            sentiment_model_id: C::DEFAULT_MODEL.to_string(),
            generator_model_id: G::DEFAULT_MODEL.to_string(),
            fell_back: false,
        }
    }

    /// Id of the sentiment model actually in use.
    pub fn sentiment_model_id(&self) -> &str {
        &self.sentiment_model_id
    }

    /// Id of the generator model actually in use.
    pub fn generator_model_id(&self) -> &str {
        &self.generator_model_id
    }

    /// The sentiment classifier.
    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// The text generator.
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Whether either model had to fall back to its default.
    pub fn used_fallback(&self) -> bool {
        self.fell_back
    }

    /// Classify the sentiment of `text`.
    ///
    /// Blank text is neutral with full confidence and never reaches the classifier.
    pub fn predict_sentiment(&self, text: &str) -> Result<SentimentResult> {
        if text.trim().is_empty() {
            return Ok(SentimentResult::blank());
        }

        let raw = self.classifier.classify(text)?;
        let result = SentimentResult::from_classification(&raw);
        debug!(
            raw_label = %raw.label,
            label = %result.label,
            score = result.score,
            "classified prompt"
        );
        Ok(result)
    }

    /// Write a paragraph about `prompt` in the tone of `sentiment`.
    ///
    /// With `sentiment == None` the tone comes from [`predict_sentiment`](Self::predict_sentiment).
    /// The returned text starts with the instruction-prefixed prompt, followed by the
    /// generated continuation.
    pub fn generate_text(
        &self,
        prompt: &str,
        sentiment: Option<SentimentLabel>,
        params: &SamplingParams,
    ) -> Result<String> {
        let sentiment = match sentiment {
            Some(sentiment) => sentiment,
            None => self.predict_sentiment(prompt)?.label,
        };

        let final_prompt = steered_prompt(prompt, sentiment);
        debug!(%sentiment, max_new_tokens = params.max_new_tokens, "generating");
        self.generator.generate(&final_prompt, params)
    }

    /// [`generate_text`](Self::generate_text) driven by a [`GenerationRequest`].
    pub fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.generate_text(&request.prompt, request.sentiment, &request.params)
    }
}
