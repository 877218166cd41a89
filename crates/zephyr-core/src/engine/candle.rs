//! Candle-backed engine for quantized GGUF chat models

use super::{ChatTemplate, TextGenerationEngine, ZephyrChatTemplate};
use crate::{
    conversation::Conversation,
    generation::{GenerationOutput, GenerationParams},
    CoreError, Result,
};
use candle_core::{quantized::gguf_file, DType, Device, Tensor};
use candle_transformers::{
    generation::{LogitsProcessor, Sampling},
    models::quantized_llama::ModelWeights,
    utils::apply_repeat_penalty,
};
use parking_lot::Mutex;
use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::{Instant, SystemTime, UNIX_EPOCH},
};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

/// Compute device to run the model on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Metal,
}

/// Configuration for loading a [`CandleEngine`]
#[derive(Debug, Clone)]
pub struct CandleEngineConfig {
    /// Path to the quantized GGUF weights
    pub model_path: PathBuf,

    /// Path to the HuggingFace `tokenizer.json`
    pub tokenizer_path: PathBuf,

    /// Name reported by the engine
    pub model_name: String,

    /// Base seed for sampling; derived from the clock when absent
    pub seed: Option<u64>,

    /// Preferred device; falls back to CPU if unavailable
    pub device: DeviceKind,

    /// Device ordinal for multi-GPU systems
    pub device_id: usize,
}

/// Quantized llama-architecture model (Zephyr, Mistral) driven by candle
pub struct CandleEngine {
    model: Mutex<ModelWeights>,
    tokenizer: Tokenizer,
    template: ZephyrChatTemplate,
    device: Device,
    eos_token_id: u32,
    model_name: String,
    base_seed: u64,
    calls: AtomicU64,
}

impl CandleEngine {
    /// Load weights and tokenizer from disk.
    ///
    /// Any failure here is reported as `EngineUnavailable`.
    pub fn load(config: &CandleEngineConfig) -> Result<Self> {
        let start = Instant::now();
        let device = select_device(config.device, config.device_id);
        info!("Loading model {:?} on {:?}", config.model_path, device);

        let tokenizer = Tokenizer::from_file(&config.tokenizer_path).map_err(|e| {
            CoreError::engine_load(
                format!("Failed to load tokenizer from {:?}", config.tokenizer_path),
                "Check that tokenizer_path points to a valid tokenizer.json",
                anyhow::anyhow!("{}", e),
            )
        })?;

        let template = ZephyrChatTemplate::default();
        let eos_token_id = tokenizer.token_to_id(template.eos_token()).ok_or_else(|| {
            CoreError::engine_unavailable(
                format!("Tokenizer has no {} token", template.eos_token()),
                "Use the tokenizer that ships with the model",
            )
        })?;

        let mut file = std::fs::File::open(&config.model_path).map_err(|e| {
            CoreError::engine_load(
                format!("Failed to open model file {:?}", config.model_path),
                "Check that model_path exists and is readable",
                e.into(),
            )
        })?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| {
            CoreError::engine_load(
                format!("Failed to read GGUF header from {:?}", config.model_path),
                "The model file must be a GGUF checkpoint",
                e.into(),
            )
        })?;
        let model = ModelWeights::from_gguf(content, &mut file, &device).map_err(|e| {
            CoreError::engine_load(
                "Failed to load model weights",
                "Use a llama-architecture GGUF checkpoint (e.g. zephyr-7b Q4_K_M)",
                e.into(),
            )
        })?;

        let base_seed = config.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default()
        });

        info!("Model loaded in {:.2}s", start.elapsed().as_secs_f64());

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            template,
            device,
            eos_token_id,
            model_name: config.model_name.clone(),
            base_seed,
            calls: AtomicU64::new(0),
        })
    }

    fn next_seed(&self) -> u64 {
        self.base_seed
            .wrapping_add(self.calls.fetch_add(1, Ordering::Relaxed))
    }
}

fn select_device(kind: DeviceKind, ordinal: usize) -> Device {
    let selected = match kind {
        DeviceKind::Cpu => return Device::Cpu,
        DeviceKind::Cuda => Device::new_cuda(ordinal),
        DeviceKind::Metal => Device::new_metal(ordinal),
    };
    selected.unwrap_or_else(|e| {
        warn!("Device {:?} unavailable ({}), falling back to CPU", kind, e);
        Device::Cpu
    })
}

/// Map sampling controls onto candle's sampler; zero `top_k` or a `top_p` of
/// one disables that filter.
fn sampling_for(params: &GenerationParams) -> Sampling {
    let temperature = params.temperature;
    let use_top_p = params.top_p < 1.0;
    match (params.top_k, use_top_p) {
        (0, false) => Sampling::All { temperature },
        (0, true) => Sampling::TopP { p: params.top_p, temperature },
        (k, false) => Sampling::TopK { k, temperature },
        (k, true) => Sampling::TopKThenTopP { k, p: params.top_p, temperature },
    }
}

fn generation_error(context: &str) -> impl Fn(candle_core::Error) -> CoreError + '_ {
    move |e| CoreError::generation("GENERATION_FAILED", e.to_string(), context)
}

impl TextGenerationEngine for CandleEngine {
    fn apply_chat_template(&self, conversation: &Conversation) -> Result<String> {
        Ok(self.template.render(conversation))
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, true).map_err(|e| {
            CoreError::generation("TOKENIZE_FAILED", e.to_string(), "Encoding templated prompt")
        })?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.tokenizer
            .decode(tokens, skip_special_tokens)
            .map_err(|e| CoreError::generation("DECODE_FAILED", e.to_string(), "Decoding tokens"))
    }

    fn generate(&self, tokens: &[u32], params: &GenerationParams) -> Result<GenerationOutput> {
        if tokens.is_empty() {
            return Err(CoreError::generation(
                "EMPTY_PROMPT",
                "Cannot generate from an empty token sequence",
                "Starting generation",
            ));
        }

        let start = Instant::now();
        let mut model = self.model.lock();
        let mut sampler = LogitsProcessor::from_sampling(self.next_seed(), sampling_for(params));
        let mut sequence = tokens.to_vec();

        // The first pass consumes the whole prompt at position zero, which also
        // resets the model's KV cache from any previous request.
        let mut input = Tensor::new(tokens, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(generation_error("Building prompt tensor"))?;
        let mut index_pos = 0;

        for _ in 0..params.max_new_tokens {
            let logits = model
                .forward(&input, index_pos)
                .and_then(|l| l.squeeze(0))
                .and_then(|l| l.to_dtype(DType::F32))
                .map_err(generation_error("Model forward pass"))?;

            let logits = if params.repetition_penalty == 1.0 {
                logits
            } else {
                apply_repeat_penalty(&logits, params.repetition_penalty, &sequence)
                    .map_err(generation_error("Applying repetition penalty"))?
            };

            let next = sampler
                .sample(&logits)
                .map_err(generation_error("Sampling next token"))?;
            index_pos += input.dim(1).map_err(generation_error("Reading input length"))?;
            sequence.push(next);

            if next == self.eos_token_id {
                break;
            }

            input = Tensor::new(&[next], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(generation_error("Building step tensor"))?;
        }

        let generated = sequence.len() - tokens.len();
        let elapsed = start.elapsed().as_secs_f64();
        debug!(
            "Generated {} tokens in {:.2}s ({:.1} tok/s)",
            generated,
            elapsed,
            if elapsed > 0.0 { generated as f64 / elapsed } else { 0.0 }
        );

        Ok(GenerationOutput::new(sequence))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
