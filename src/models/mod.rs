//! Model backends and the capability traits the generator is written against.

// ============ Model capability traits ============

pub mod capabilities;

// ============ Model implementations ============

pub(crate) mod distilbert;
pub(crate) mod gpt2;

pub use distilbert::DistilBertSentimentModel;
pub use gpt2::Gpt2Model;
