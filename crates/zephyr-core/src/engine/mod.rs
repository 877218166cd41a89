//! Text generation engine contract
//!
//! The pipeline never loads, configures or mutates a model itself. It only
//! talks to a ready engine through [`TextGenerationEngine`]. Engine calls are
//! synchronous and may block for a long time; the [`crate::worker`] module is
//! responsible for keeping them off the async executor.

mod template;

#[cfg(feature = "candle")]
pub mod candle;

pub use template::{ChatTemplate, ZephyrChatTemplate};

#[cfg(feature = "candle")]
pub use self::candle::{CandleEngine, CandleEngineConfig, DeviceKind};

use crate::{
    conversation::Conversation,
    generation::{GenerationOutput, GenerationParams},
    Result,
};
use std::sync::Arc;

/// Contract every text generation backend must fulfil
pub trait TextGenerationEngine: Send + Sync {
    /// Render a conversation into the single prompt string the model expects,
    /// including the trailing assistant header
    fn apply_chat_template(&self, conversation: &Conversation) -> Result<String>;

    /// Encode text into token IDs
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token IDs back into text
    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String>;

    /// Run generation and return the full prompt + generated sequence
    fn generate(&self, tokens: &[u32], params: &GenerationParams) -> Result<GenerationOutput>;

    /// Name of the loaded model
    fn model_name(&self) -> &str;
}

/// Shared, read-only reference to a loaded engine
pub type EngineHandle = Arc<dyn TextGenerationEngine>;
