use candle_transformers::generation::{LogitsProcessor, Sampling};

use crate::error::{PipelineError, Result};
use crate::sentiment::SentimentLabel;

/// Parameters controlling how a continuation is sampled.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Maximum number of tokens generated beyond the prompt.
    pub max_new_tokens: usize,
    /// Only consider the top k most likely tokens.
    pub top_k: usize,
    /// Nucleus sampling: only consider tokens with cumulative probability <= p.
    pub top_p: f64,
    /// Randomness of sampling. Higher = more random.
    pub temperature: f64,
    /// Random seed for reproducible generation. `None` draws a fresh seed per request.
    pub seed: Option<u64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            top_k: 50,
            top_p: 0.95,
            temperature: 0.9,
            seed: None,
        }
    }
}

impl SamplingParams {
    /// Set maximum tokens to generate.
    pub fn max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    /// Only sample from the top k most likely tokens.
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set nucleus sampling threshold.
    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    /// Set sampling temperature.
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set random seed for reproducible generation.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject parameters the sampler cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_new_tokens == 0 {
            return Err(PipelineError::InvalidParams(
                "max_new_tokens must be greater than 0".into(),
            ));
        }
        if self.top_k == 0 {
            return Err(PipelineError::InvalidParams(
                "top_k must be greater than 0".into(),
            ));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(PipelineError::InvalidParams(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if !(self.temperature > 0.0 && self.temperature.is_finite()) {
            return Err(PipelineError::InvalidParams(format!(
                "temperature must be greater than 0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    /// Always a stochastic strategy; greedy decoding is never used.
    pub(crate) fn sampling_strategy(&self) -> Sampling {
        let temperature = self.temperature.max(1e-7);

        if self.top_p < 1.0 {
            Sampling::TopKThenTopP {
                k: self.top_k,
                p: self.top_p,
                temperature,
            }
        } else {
            Sampling::TopK {
                k: self.top_k,
                temperature,
            }
        }
    }

    pub(crate) fn logits_processor(&self) -> LogitsProcessor {
        let seed = self.seed.unwrap_or_else(rand::random);
        LogitsProcessor::from_sampling(seed, self.sampling_strategy())
    }
}

/// One generation call: what to write about, which tone, and how to sample.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Topic text supplied by the user.
    pub prompt: String,
    /// Tone to steer towards. `None` detects it from the prompt.
    pub sentiment: Option<SentimentLabel>,
    /// Sampling parameters.
    pub params: SamplingParams,
}

impl GenerationRequest {
    /// Request with auto-detected sentiment and default sampling.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Steer towards a fixed sentiment instead of detecting one.
    pub fn sentiment(mut self, sentiment: SentimentLabel) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    /// Replace the sampling parameters.
    pub fn params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }
}

/// Prefix the trimmed prompt with the instruction for `sentiment`.
pub(crate) fn steered_prompt(prompt: &str, sentiment: SentimentLabel) -> String {
    format!("{}{}", sentiment.prefix(), prompt.trim())
}
