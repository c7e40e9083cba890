//! Sentiment-steered paragraph generation.
//!
//! Classify a prompt, prepend the instruction for its tone, and let a causal
//! language model continue it.
//!
//! | Sentiment | Instruction |
//! |-----------|-------------|
//! | positive  | `Write an optimistic paragraph about:` |
//! | negative  | `Write a critical paragraph about:` |
//! | neutral   | `Write a neutral, factual paragraph about:` |

// ============ Internal API ============

pub(crate) mod acquire;
pub(crate) mod config;
pub(crate) mod pipeline;

// ============ Public API ============

pub use config::ModelConfig;
pub use pipeline::SentimentGenerator;
