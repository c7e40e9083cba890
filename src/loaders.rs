use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tokenizers::Tokenizer;

use crate::error::{PipelineError, Result};

/// Blocking handle on a single HuggingFace model repository.
#[derive(Debug, Clone)]
pub struct HfLoader {
    pub repo: String,
}

impl HfLoader {
    pub fn new(repo: &str) -> Self {
        Self { repo: repo.into() }
    }

    fn api_repo(&self) -> Result<ApiRepo> {
        let api = Api::new().map_err(|e| {
            PipelineError::Download(format!("Failed to initialize HuggingFace API: {e}"))
        })?;
        Ok(api.repo(Repo::new(self.repo.clone(), RepoType::Model)))
    }

    pub fn get(&self, filename: &str) -> Result<PathBuf> {
        self.api_repo()?.get(filename).map_err(|e| {
            PipelineError::Download(format!(
                "Failed to download '{}' from '{}': {}",
                filename, self.repo, e
            ))
        })
    }

    /// Fetch and deserialize a JSON file, returning the raw text alongside the parsed value.
    pub fn get_json<T: DeserializeOwned>(&self, filename: &str) -> Result<(T, String)> {
        let path = self.get(filename)?;
        let content = std::fs::read_to_string(path)?;
        let parsed = serde_json::from_str(&content)?;
        Ok((parsed, content))
    }

    pub fn tokenizer(&self) -> Result<Tokenizer> {
        self.tokenizer_from(&["tokenizer.json"])
    }

    /// Load the first of `candidates` the repo actually ships.
    pub fn tokenizer_from(&self, candidates: &[&str]) -> Result<Tokenizer> {
        let tokenizer_path = first_available(&self.repo, candidates, |f| self.get(f))?;
        let path_str = tokenizer_path.display().to_string();

        Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            PipelineError::Tokenization(format!(
                "Failed to load tokenizer from '{}': {}",
                path_str, e
            ))
        })
    }

    /// Memory-map `model.safetensors`, or read `pytorch_model.bin` when the repo has no safetensors.
    pub fn weights(&self, device: &Device) -> Result<VarBuilder<'static>> {
        let repo = self.api_repo()?;
        let weights_path = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))
            .map_err(|e| {
                PipelineError::Download(format!(
                    "No usable weights in '{}': {}",
                    self.repo, e
                ))
            })?;

        let vb = if weights_path.extension().is_some_and(|e| e == "safetensors") {
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? }
        } else {
            VarBuilder::from_pth(&weights_path, DType::F32, device)?
        };

        Ok(vb)
    }
}

/// Try `candidates` in order and return the first one `fetch` resolves.
fn first_available<F>(repo: &str, candidates: &[&str], mut fetch: F) -> Result<PathBuf>
where
    F: FnMut(&str) -> Result<PathBuf>,
{
    let mut failures = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match fetch(candidate) {
            Ok(path) => return Ok(path),
            Err(e) => failures.push(format!("{candidate}: {e}")),
        }
    }
    Err(PipelineError::Download(format!(
        "None of [{}] found in '{}' ({})",
        candidates.join(", "),
        repo,
        failures.join("; ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only(available: &'static str) -> impl FnMut(&str) -> Result<PathBuf> {
        move |f| {
            if f == available {
                Ok(PathBuf::from(f))
            } else {
                Err(PipelineError::Download(format!("404 {f}")))
            }
        }
    }

    #[test]
    fn first_candidate_wins() {
        let path = first_available(
            "repo",
            &["tokenizer.json", "onnx/tokenizer.json"],
            |f| Ok(PathBuf::from(f)),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("tokenizer.json"));
    }

    #[test]
    fn later_candidates_are_tried_in_order() {
        let mut tried = Vec::new();
        let mut fetch = only("onnx/tokenizer.json");
        let path = first_available("repo", &["tokenizer.json", "onnx/tokenizer.json"], |f| {
            tried.push(f.to_string());
            fetch(f)
        })
        .unwrap();

        assert_eq!(path, PathBuf::from("onnx/tokenizer.json"));
        assert_eq!(tried, vec!["tokenizer.json", "onnx/tokenizer.json"]);
    }

    #[test]
    fn missing_everywhere_names_every_candidate() {
        let err = first_available(
            "distilbert-base-uncased-finetuned-sst-2-english",
            &["tokenizer.json", "onnx/tokenizer.json"],
            only("vocab.txt"),
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::Download(_)));
        let message = err.to_string();
        assert!(message.contains("tokenizer.json, onnx/tokenizer.json"));
        assert!(message.contains("distilbert-base-uncased-finetuned-sst-2-english"));
    }
}
