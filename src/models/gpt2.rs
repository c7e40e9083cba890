//! GPT-2 causal language model with an external KV cache.
//!
//! - Model weights are `&self` (immutable); every generation call owns its own [`Cache`]
//! - Loads both the bare layout (`h.0.attn...`) and the `transformer.`-prefixed one
//! - LM head is tied to the token embedding

use candle_core::{Device, IndexOp, Module, Tensor, D};
use candle_nn::{Embedding, LayerNorm, Linear, VarBuilder};
use serde::Deserialize;
use tokenizers::{PaddingParams, Tokenizer};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::loaders::HfLoader;
use crate::models::capabilities::TextGenerator;
use crate::pipelines::text_generation::params::SamplingParams;
use crate::pipelines::text_generation::stats::GenerationStats;

fn default_layer_norm_epsilon() -> f64 {
    1e-5
}

fn default_eos_token_id() -> u32 {
    50256
}

/// Subset of a HuggingFace `GPT2Config`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub vocab_size: usize,
    pub n_positions: usize,
    pub n_embd: usize,
    pub n_layer: usize,
    pub n_head: usize,
    #[serde(default)]
    pub n_inner: Option<usize>,
    #[serde(default = "default_layer_norm_epsilon")]
    pub layer_norm_epsilon: f64,
    #[serde(default = "default_eos_token_id")]
    pub eos_token_id: u32,
}

/// GPT-2 stores projections as `Conv1D` with `(in, out)` weights; transpose into a [`Linear`].
fn conv1d(in_dim: usize, out_dim: usize, vb: VarBuilder) -> candle_core::Result<Linear> {
    let weight = vb.get((in_dim, out_dim), "weight")?.t()?.contiguous()?;
    let bias = vb.get(out_dim, "bias")?;
    Ok(Linear::new(weight, Some(bias)))
}

#[derive(Debug, Clone)]
struct Attention {
    c_attn: Linear,
    c_proj: Linear,
    n_head: usize,
    head_dim: usize,
    span: tracing::Span,
}

impl Attention {
    fn load(vb: VarBuilder, cfg: &Config) -> candle_core::Result<Self> {
        let c_attn = conv1d(cfg.n_embd, 3 * cfg.n_embd, vb.pp("c_attn"))?;
        let c_proj = conv1d(cfg.n_embd, cfg.n_embd, vb.pp("c_proj"))?;
        Ok(Self {
            c_attn,
            c_proj,
            n_head: cfg.n_head,
            head_dim: cfg.n_embd / cfg.n_head,
            span: tracing::span!(tracing::Level::TRACE, "attn"),
        })
    }

    fn split_heads(&self, xs: &Tensor, b_sz: usize, seq_len: usize) -> candle_core::Result<Tensor> {
        xs.reshape((b_sz, seq_len, self.n_head, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    fn forward(
        &self,
        xs: &Tensor,
        mask: Option<&Tensor>,
        kv_cache: &mut Option<(Tensor, Tensor)>,
    ) -> candle_core::Result<Tensor> {
        let _enter = self.span.enter();
        let (b_sz, seq_len, n_embd) = xs.dims3()?;

        let qkv = self.c_attn.forward(xs)?;
        let q = self.split_heads(&qkv.narrow(D::Minus1, 0, n_embd)?, b_sz, seq_len)?;
        let k = self.split_heads(&qkv.narrow(D::Minus1, n_embd, n_embd)?, b_sz, seq_len)?;
        let v = self.split_heads(&qkv.narrow(D::Minus1, 2 * n_embd, n_embd)?, b_sz, seq_len)?;

        let (k, v) = match kv_cache.take() {
            Some((k_prev, v_prev)) => (
                Tensor::cat(&[&k_prev, &k], 2)?,
                Tensor::cat(&[&v_prev, &v], 2)?,
            ),
            None => (k, v),
        };
        *kv_cache = Some((k.clone(), v.clone()));

        let scale = (self.head_dim as f64).sqrt();
        let att = (q.matmul(&k.t()?.contiguous()?)? / scale)?;
        let att = match mask {
            Some(mask) => att.broadcast_add(mask)?,
            None => att,
        };
        let att = candle_nn::ops::softmax_last_dim(&att)?;

        let ys = att
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((b_sz, seq_len, n_embd))?;
        self.c_proj.forward(&ys)
    }
}

#[derive(Debug, Clone)]
struct Mlp {
    c_fc: Linear,
    c_proj: Linear,
}

impl Mlp {
    fn load(vb: VarBuilder, cfg: &Config) -> candle_core::Result<Self> {
        let inner = cfg.n_inner.unwrap_or(4 * cfg.n_embd);
        Ok(Self {
            c_fc: conv1d(cfg.n_embd, inner, vb.pp("c_fc"))?,
            c_proj: conv1d(inner, cfg.n_embd, vb.pp("c_proj"))?,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        // gelu_new: tanh approximation
        self.c_proj.forward(&self.c_fc.forward(xs)?.gelu()?)
    }
}

#[derive(Debug, Clone)]
struct Block {
    ln_1: LayerNorm,
    attn: Attention,
    ln_2: LayerNorm,
    mlp: Mlp,
    span_mlp: tracing::Span,
}

impl Block {
    fn load(vb: VarBuilder, cfg: &Config) -> candle_core::Result<Self> {
        Ok(Self {
            ln_1: candle_nn::layer_norm(cfg.n_embd, cfg.layer_norm_epsilon, vb.pp("ln_1"))?,
            attn: Attention::load(vb.pp("attn"), cfg)?,
            ln_2: candle_nn::layer_norm(cfg.n_embd, cfg.layer_norm_epsilon, vb.pp("ln_2"))?,
            mlp: Mlp::load(vb.pp("mlp"), cfg)?,
            span_mlp: tracing::span!(tracing::Level::TRACE, "mlp"),
        })
    }

    fn forward(
        &self,
        xs: &Tensor,
        mask: Option<&Tensor>,
        kv_cache: &mut Option<(Tensor, Tensor)>,
    ) -> candle_core::Result<Tensor> {
        let residual = xs;
        let xs = (self.attn.forward(&self.ln_1.forward(xs)?, mask, kv_cache)? + residual)?;

        let _enter = self.span_mlp.enter();
        let residual = &xs;
        self.mlp.forward(&self.ln_2.forward(&xs)?)? + residual
    }
}

/// Per-request key/value cache, one slot per layer.
#[derive(Debug, Clone)]
pub struct Cache {
    kvs: Vec<Option<(Tensor, Tensor)>>,
    seq_len: usize,
}

impl Cache {
    pub fn new(n_layer: usize) -> Self {
        Self {
            kvs: vec![None; n_layer],
            seq_len: 0,
        }
    }

    /// Tokens already processed.
    pub fn current_seq_len(&self) -> usize {
        self.seq_len
    }
}

/// Additive causal mask of shape `(seq_len, past_len + seq_len)`.
fn causal_mask(seq_len: usize, past_len: usize, device: &Device) -> candle_core::Result<Tensor> {
    let total = past_len + seq_len;
    let mask: Vec<f32> = (0..seq_len)
        .flat_map(|i| {
            (0..total).map(move |j| {
                if j > i + past_len {
                    f32::NEG_INFINITY
                } else {
                    0.0
                }
            })
        })
        .collect();
    Tensor::from_slice(&mask, (seq_len, total), device)
}

/// GPT-2 decoder stack.
#[derive(Debug, Clone)]
pub struct Gpt2 {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    n_positions: usize,
    span: tracing::Span,
}

impl Gpt2 {
    pub fn load(vb: VarBuilder, cfg: &Config) -> candle_core::Result<Self> {
        let vb = if vb.contains_tensor("wte.weight") {
            vb
        } else {
            vb.pp("transformer")
        };

        let wte = candle_nn::embedding(cfg.vocab_size, cfg.n_embd, vb.pp("wte"))?;
        let wpe = candle_nn::embedding(cfg.n_positions, cfg.n_embd, vb.pp("wpe"))?;
        let blocks = (0..cfg.n_layer)
            .map(|i| Block::load(vb.pp(format!("h.{i}")), cfg))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let ln_f = candle_nn::layer_norm(cfg.n_embd, cfg.layer_norm_epsilon, vb.pp("ln_f"))?;

        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            n_positions: cfg.n_positions,
            span: tracing::span!(tracing::Level::TRACE, "gpt2"),
        })
    }

    pub fn new_cache(&self) -> Cache {
        Cache::new(self.blocks.len())
    }

    /// Run `input_ids` of shape `(batch, seq_len)` and return logits for the last position.
    pub fn forward(&self, input_ids: &Tensor, cache: &mut Cache) -> candle_core::Result<Tensor> {
        let _enter = self.span.enter();
        let (_b_sz, seq_len) = input_ids.dims2()?;
        let past_len = cache.current_seq_len();
        if past_len + seq_len > self.n_positions {
            candle_core::bail!(
                "sequence of {} tokens exceeds the {} position context",
                past_len + seq_len,
                self.n_positions
            );
        }

        let device = input_ids.device();
        let positions = Tensor::arange(past_len as u32, (past_len + seq_len) as u32, device)?;
        let mut xs = self
            .wte
            .forward(input_ids)?
            .broadcast_add(&self.wpe.forward(&positions)?)?;

        let mask = if seq_len > 1 {
            Some(causal_mask(seq_len, past_len, device)?)
        } else {
            None
        };

        for (block, kv_cache) in self.blocks.iter().zip(cache.kvs.iter_mut()) {
            xs = block.forward(&xs, mask.as_ref(), kv_cache)?;
        }
        cache.seq_len += seq_len;

        let xs = self.ln_f.forward(&xs)?;
        let last = xs.i((.., seq_len - 1, ..))?;
        last.matmul(&self.wte.embeddings().t()?)
    }
}

/// Causal generation tokenizers often ship without a padding token; reuse EOS for it.
pub(crate) fn ensure_pad_token(tokenizer: &mut Tokenizer, eos_token_id: u32) -> Result<()> {
    if tokenizer.get_padding().is_some() {
        return Ok(());
    }

    let pad_token = tokenizer.id_to_token(eos_token_id).ok_or_else(|| {
        PipelineError::Tokenization(format!(
            "EOS token id {eos_token_id} is not in the tokenizer vocabulary"
        ))
    })?;
    tokenizer.with_padding(Some(PaddingParams {
        pad_id: eos_token_id,
        pad_token,
        ..Default::default()
    }));

    Ok(())
}

/// GPT-2 family text generator (`gpt2`, `distilgpt2`, `gpt2-medium`, ...).
pub struct Gpt2Model {
    model: Gpt2,
    tokenizer: Tokenizer,
    config: Config,
    device: Device,
}

impl Gpt2Model {
    pub(crate) fn from_parts(
        model: Gpt2,
        mut tokenizer: Tokenizer,
        config: Config,
        device: Device,
    ) -> Result<Self> {
        ensure_pad_token(&mut tokenizer, config.eos_token_id)?;
        Ok(Self {
            model,
            tokenizer,
            config,
            device,
        })
    }

    /// Returns the device (CPU/GPU) the model is running on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn sample(
        &self,
        prompt_tokens: &[u32],
        params: &SamplingParams,
    ) -> Result<(String, GenerationStats)> {
        let mut logits_processor = params.logits_processor();
        let mut cache = self.model.new_cache();
        let mut stats = GenerationStats::new(prompt_tokens.len());

        let room = self.config.n_positions.saturating_sub(prompt_tokens.len());
        let budget = params.max_new_tokens.min(room);
        let mut generated: Vec<u32> = Vec::with_capacity(budget);

        let mut input = Tensor::new(prompt_tokens, &self.device)?.unsqueeze(0)?;
        for _ in 0..budget {
            let logits = self.model.forward(&input, &mut cache)?.squeeze(0)?;
            let next_token = logits_processor.sample(&logits)?;
            if next_token == self.config.eos_token_id {
                break;
            }
            stats.record_token();
            generated.push(next_token);
            input = Tensor::new(&[next_token], &self.device)?.unsqueeze(0)?;
        }

        let text = self
            .tokenizer
            .decode(&generated, /*skip_special_tokens=*/ true)
            .map_err(|e| PipelineError::Tokenization(format!("Decode error: {}", e)))?;

        stats.finalize();
        Ok((text, stats))
    }
}

impl TextGenerator for Gpt2Model {
    const DEFAULT_MODEL: &'static str = "gpt2";

    fn load(model_id: &str, device: &Device) -> Result<Self> {
        let loader = HfLoader::new(model_id);
        let (config, _): (Config, String) = loader.get_json("config.json")?;
        let tokenizer = loader.tokenizer()?;
        let vb = loader.weights(device)?;
        let model = Gpt2::load(vb, &config)?;

        info!(
            model = model_id,
            layers = config.n_layer,
            context = config.n_positions,
            "loaded text generator"
        );
        Self::from_parts(model, tokenizer, config, device.clone())
    }

    fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        params.validate()?;

        let encoding = self.tokenizer.encode(prompt, false).map_err(|e| {
            PipelineError::Tokenization(format!(
                "Tokenization failed on '{}': {}",
                &prompt.chars().take(50).collect::<String>(),
                e
            ))
        })?;
        let prompt_tokens = encoding.get_ids();
        if prompt_tokens.is_empty() {
            return Err(PipelineError::Tokenization(
                "Prompt produced no tokens".into(),
            ));
        }
        if prompt_tokens.len() >= self.config.n_positions {
            return Err(PipelineError::Tokenization(format!(
                "Prompt is {} tokens but the model context holds {}",
                prompt_tokens.len(),
                self.config.n_positions
            )));
        }

        let (continuation, stats) = self.sample(prompt_tokens, params)?;
        debug!(
            prompt_tokens = stats.prompt_tokens,
            tokens_generated = stats.tokens_generated,
            tokens_per_second = stats.tokens_per_second,
            "generation finished"
        );

        Ok(format!("{prompt}{continuation}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    const TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "[UNK]": 0, "hello": 1, "world": 2, "<|endoftext|>": 3 },
            "unk_token": "[UNK]"
        }
    }"#;

    fn tiny_tokenizer() -> Tokenizer {
        Tokenizer::from_bytes(TOKENIZER_JSON.as_bytes()).unwrap()
    }

    fn tiny_config() -> Config {
        Config {
            vocab_size: 4,
            n_positions: 16,
            n_embd: 8,
            n_layer: 2,
            n_head: 2,
            n_inner: None,
            layer_norm_epsilon: 1e-5,
            eos_token_id: 3,
        }
    }

    fn tiny_model() -> Gpt2Model {
        let config = tiny_config();
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = Gpt2::load(vb, &config).unwrap();
        Gpt2Model::from_parts(model, tiny_tokenizer(), config, Device::Cpu).unwrap()
    }

    #[test]
    fn config_parses_hf_json() {
        let config: Config = serde_json::from_str(
            r#"{"vocab_size": 50257, "n_positions": 1024, "n_embd": 768,
                "n_layer": 12, "n_head": 12, "activation_function": "gelu_new"}"#,
        )
        .unwrap();
        assert_eq!(config.eos_token_id, 50256);
        assert_eq!(config.layer_norm_epsilon, 1e-5);
        assert!(config.n_inner.is_none());
    }

    #[test]
    fn pad_token_defaults_to_eos() {
        let mut tokenizer = tiny_tokenizer();
        assert!(tokenizer.get_padding().is_none());

        ensure_pad_token(&mut tokenizer, 3).unwrap();
        let padding = tokenizer.get_padding().unwrap();
        assert_eq!(padding.pad_id, 3);
        assert_eq!(padding.pad_token, "<|endoftext|>");
    }

    #[test]
    fn existing_pad_token_is_kept() {
        let mut tokenizer = tiny_tokenizer();
        tokenizer.with_padding(Some(PaddingParams {
            pad_id: 0,
            pad_token: "[UNK]".into(),
            ..Default::default()
        }));

        ensure_pad_token(&mut tokenizer, 3).unwrap();
        assert_eq!(tokenizer.get_padding().unwrap().pad_id, 0);
    }

    #[test]
    fn unknown_eos_id_is_an_error() {
        let mut tokenizer = tiny_tokenizer();
        assert!(ensure_pad_token(&mut tokenizer, 99).is_err());
    }

    #[test]
    fn causal_mask_hides_future_positions() {
        let mask = causal_mask(2, 1, &Device::Cpu).unwrap();
        let rows = mask.to_vec2::<f32>().unwrap();
        assert_eq!(rows[0], vec![0.0, 0.0, f32::NEG_INFINITY]);
        assert_eq!(rows[1], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn forward_returns_last_position_logits_and_fills_cache() {
        let model = tiny_model();
        let mut cache = model.model.new_cache();

        let input = Tensor::new(&[1u32, 2, 1], &Device::Cpu)
            .unwrap()
            .unsqueeze(0)
            .unwrap();
        let logits = model.model.forward(&input, &mut cache).unwrap();
        assert_eq!(logits.dims(), &[1, 4]);
        assert_eq!(cache.current_seq_len(), 3);

        let input = Tensor::new(&[2u32], &Device::Cpu)
            .unwrap()
            .unsqueeze(0)
            .unwrap();
        let logits = model.model.forward(&input, &mut cache).unwrap();
        assert_eq!(logits.dims(), &[1, 4]);
        assert_eq!(cache.current_seq_len(), 4);
    }

    #[test]
    fn forward_rejects_overlong_sequences() {
        let model = tiny_model();
        let mut cache = model.model.new_cache();
        let input = Tensor::zeros((1, 17), DType::U32, &Device::Cpu).unwrap();
        assert!(model.model.forward(&input, &mut cache).is_err());
    }

    #[test]
    fn generation_echoes_the_prompt() {
        let model = tiny_model();
        let params = SamplingParams::default().max_new_tokens(5).top_k(2).seed(42);

        let output = model.generate("hello world", &params).unwrap();
        assert!(output.starts_with("hello world"));
    }

    /// Zero weights except a final-norm bias and EOS embedding that make EOS the only likely token.
    fn eos_first_model() -> Gpt2Model {
        let config = tiny_config();
        let dev = &Device::Cpu;
        let zeros = |shape: &[usize]| Tensor::zeros(shape, DType::F32, dev).unwrap();

        let mut tensors = std::collections::HashMap::new();
        for i in 0..config.n_layer {
            let h = format!("h.{i}");
            for ln in ["ln_1", "ln_2"] {
                tensors.insert(format!("{h}.{ln}.weight"), zeros(&[8]));
                tensors.insert(format!("{h}.{ln}.bias"), zeros(&[8]));
            }
            for (name, fan_in, fan_out) in [
                ("attn.c_attn", 8, 24),
                ("attn.c_proj", 8, 8),
                ("mlp.c_fc", 8, 32),
                ("mlp.c_proj", 32, 8),
            ] {
                tensors.insert(format!("{h}.{name}.weight"), zeros(&[fan_in, fan_out]));
                tensors.insert(format!("{h}.{name}.bias"), zeros(&[fan_out]));
            }
        }
        tensors.insert("wpe.weight".into(), zeros(&[16, 8]));
        tensors.insert("ln_f.weight".into(), zeros(&[8]));
        tensors.insert(
            "ln_f.bias".into(),
            Tensor::ones(8, DType::F32, dev).unwrap(),
        );
        let eos_row = Tensor::ones((1, 8), DType::F32, dev).unwrap();
        let wte = Tensor::cat(&[&zeros(&[3, 8]), &eos_row], 0).unwrap();
        tensors.insert("wte.weight".into(), wte);

        let vb = VarBuilder::from_tensors(tensors, DType::F32, dev);
        let model = Gpt2::load(vb, &config).unwrap();
        Gpt2Model::from_parts(model, tiny_tokenizer(), config, Device::Cpu).unwrap()
    }

    #[test]
    fn eos_ends_generation_without_being_counted() {
        let model = eos_first_model();
        let params = SamplingParams::default().top_k(1).top_p(1.0).seed(3);

        let (continuation, stats) = model.sample(&[1, 2], &params).unwrap();
        assert!(continuation.is_empty());
        assert_eq!(stats.prompt_tokens, 2);
        assert_eq!(stats.tokens_generated, 0);

        let output = model.generate("hello world", &params).unwrap();
        assert_eq!(output, "hello world");
    }

    #[test]
    fn generation_validates_params() {
        let model = tiny_model();
        let params = SamplingParams::default().temperature(0.0);
        assert!(matches!(
            model.generate("hello", &params),
            Err(PipelineError::InvalidParams(_))
        ));
    }
}
