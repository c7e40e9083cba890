use candle_core::{DType, Device, IndexOp, Module, Tensor, D};
use candle_nn::{ops::softmax, Linear, VarBuilder};
use candle_transformers::models::distilbert::{Config, DistilBertModel};
use serde::Deserialize;
use std::collections::HashMap;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::loaders::HfLoader;
use crate::models::capabilities::{Classification, SentimentClassifier};

/// Places a classifier repo may keep its fast tokenizer.
const TOKENIZER_FILES: &[&str] = &["tokenizer.json", "onnx/tokenizer.json"];

/// Serves fine-tuned checkpoints that ship only `vocab.txt`.
const BASE_TOKENIZER_REPO: &str = "distilbert-base-uncased";

fn default_max_position_embeddings() -> usize {
    512
}

/// Fields of `config.json` the classification head needs beyond the encoder config.
#[derive(Deserialize)]
struct ClassifierConfigJson {
    dim: usize,
    #[serde(default = "default_max_position_embeddings")]
    max_position_embeddings: usize,
    #[serde(default)]
    id2label: HashMap<String, String>,
}

/// `pre_classifier -> ReLU -> classifier` over the `[CLS]` hidden state.
#[derive(Debug, Clone)]
struct ClassificationHead {
    pre_classifier: Linear,
    classifier: Linear,
}

impl ClassificationHead {
    fn load(vb: VarBuilder, dim: usize, num_labels: usize) -> candle_core::Result<Self> {
        Ok(Self {
            pre_classifier: candle_nn::linear(dim, dim, vb.pp("pre_classifier"))?,
            classifier: candle_nn::linear(dim, num_labels, vb.pp("classifier"))?,
        })
    }

    /// Class probabilities for a `(batch, dim)` pooled input.
    fn probabilities(&self, pooled: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.pre_classifier.forward(pooled)?.relu()?;
        let logits = self.classifier.forward(&hidden)?;
        softmax(&logits, D::Minus1)
    }
}

/// Pick the most probable class and look up its name.
fn top_label(probs: &[f32], id2label: &HashMap<String, String>) -> Result<Classification> {
    let (pred_id, score) = probs
        .iter()
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .ok_or_else(|| PipelineError::Unexpected("Model returned no predictions".into()))?;

    let label = id2label.get(&pred_id.to_string()).ok_or_else(|| {
        let mut available: Vec<&str> = id2label.keys().map(String::as_str).collect();
        available.sort_unstable();
        PipelineError::Unexpected(format!(
            "Predicted label ID {} not in id2label. Available: {}",
            pred_id,
            available.join(", ")
        ))
    })?;

    Ok(Classification {
        label: label.clone(),
        score,
    })
}

fn load_tokenizer(loader: &HfLoader) -> Result<Tokenizer> {
    loader.tokenizer_from(TOKENIZER_FILES).or_else(|e| {
        debug!(
            repo = %loader.repo,
            base = BASE_TOKENIZER_REPO,
            error = %e,
            "no tokenizer.json in model repo, using base tokenizer"
        );
        HfLoader::new(BASE_TOKENIZER_REPO).tokenizer()
    })
}

/// Cap encodings, special tokens included, at the encoder's position limit.
fn truncate_to(tokenizer: &mut Tokenizer, max_length: usize) -> Result<()> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| PipelineError::Tokenization(format!("Failed to enable truncation: {e}")))?;
    Ok(())
}

/// DistilBERT sequence classifier, e.g. the SST-2 sentiment checkpoint.
pub struct DistilBertSentimentModel {
    encoder: DistilBertModel,
    head: ClassificationHead,
    tokenizer: Tokenizer,
    id2label: HashMap<String, String>,
    device: Device,
}

impl DistilBertSentimentModel {
    /// Returns the device (CPU/GPU) the model is running on.
    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl SentimentClassifier for DistilBertSentimentModel {
    const DEFAULT_MODEL: &'static str = "distilbert-base-uncased-finetuned-sst-2-english";

    fn load(model_id: &str, device: &Device) -> Result<Self> {
        let loader = HfLoader::new(model_id);
        let (config, config_str): (Config, String) = loader.get_json("config.json")?;
        let head_cfg: ClassifierConfigJson = serde_json::from_str(&config_str)?;
        if head_cfg.id2label.is_empty() {
            return Err(PipelineError::Unexpected(format!(
                "'{model_id}' has no id2label mapping; not a sequence classifier"
            )));
        }

        let mut tokenizer = load_tokenizer(&loader)?;
        truncate_to(&mut tokenizer, head_cfg.max_position_embeddings)?;

        let vb = loader.weights(device)?;
        let encoder_vb = if vb.contains_tensor("distilbert.embeddings.word_embeddings.weight") {
            vb.pp("distilbert")
        } else {
            vb.clone()
        };
        let encoder = DistilBertModel::load(encoder_vb, &config)?;
        let head = ClassificationHead::load(vb, head_cfg.dim, head_cfg.id2label.len())?;

        info!(
            model = model_id,
            labels = head_cfg.id2label.len(),
            "loaded sentiment classifier"
        );
        Ok(Self {
            encoder,
            head,
            tokenizer,
            id2label: head_cfg.id2label,
            device: device.clone(),
        })
    }

    fn classify(&self, text: &str) -> Result<Classification> {
        let encoding = self.tokenizer.encode(text, true).map_err(|e| {
            PipelineError::Tokenization(format!(
                "Tokenization failed on '{}': {}",
                &text.chars().take(50).collect::<String>(),
                e
            ))
        })?;
        let ids = encoding.get_ids();

        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        // Positions set to 1 are masked out; a single unpadded sequence attends everywhere.
        let attention_mask = Tensor::zeros((ids.len(), ids.len()), DType::U8, &self.device)?;

        let hidden = self.encoder.forward(&input_ids, &attention_mask)?;
        let cls = hidden.i((.., 0))?;
        let probs = self.head.probabilities(&cls)?.squeeze(0)?.to_vec1::<f32>()?;

        top_label(&probs, &self.id2label)
    }
}
