//! Sentiment labels and their normalization.
//!
//! Classifiers emit whatever labels their training set used (`POSITIVE`, `neg`,
//! `LABEL_2`, ...). Everything downstream only ever sees one of three
//! [`SentimentLabel`] values.
//!
//! ```rust
//! use sentiment_generator::models::capabilities::Classification;
//! use sentiment_generator::sentiment::{SentimentLabel, SentimentResult};
//!
//! let raw = Classification { label: "POSITIVE".into(), score: 0.51 };
//! let result = SentimentResult::from_classification(&raw);
//!
//! // Too close to a coin flip to count as positive.
//! assert_eq!(result.label, SentimentLabel::Neutral);
//! assert_eq!(result.score, 0.51);
//! ```

pub(crate) mod label;

pub use label::{SentimentLabel, SentimentResult};
