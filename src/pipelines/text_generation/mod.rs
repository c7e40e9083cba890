//! Sampling parameters and tone-steered prompts for text generation.
//!
//! ```rust
//! use sentiment_generator::text_generation::{GenerationRequest, SamplingParams};
//! use sentiment_generator::sentiment::SentimentLabel;
//!
//! let request = GenerationRequest::new("local coffee shops")
//!     .sentiment(SentimentLabel::Positive)
//!     .params(SamplingParams::default().max_new_tokens(120).temperature(0.7));
//!
//! assert!(request.params.validate().is_ok());
//! ```

pub(crate) mod params;
pub(crate) mod stats;

pub use params::{GenerationRequest, SamplingParams};
pub use stats::GenerationStats;
