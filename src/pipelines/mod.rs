pub mod cache;
pub mod utils;

pub mod sentiment;
pub mod sentiment_generator;
pub mod text_generation;
