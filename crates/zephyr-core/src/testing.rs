//! Scripted engine for tests
//!
//! Tokens are raw bytes; IDs at or above 256 are special tokens. Every call
//! is recorded so tests can assert on what the pipeline handed the engine.

use crate::{
    conversation::Conversation,
    engine::{ChatTemplate, TextGenerationEngine, ZephyrChatTemplate},
    generation::{GenerationOutput, GenerationParams},
    CoreError, Result,
};
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

#[derive(Debug, Clone)]
enum Behavior {
    Reply,
    Fail(String),
    Panic,
}

pub struct MockEngine {
    reply: String,
    behavior: Behavior,
    delay: Option<Duration>,
    template: ZephyrChatTemplate,
    conversations: Mutex<Vec<Conversation>>,
    prompts: Mutex<Vec<String>>,
    params: Mutex<Vec<GenerationParams>>,
    decoded_lengths: Mutex<Vec<usize>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockEngine {
    pub const EOS_TOKEN_ID: u32 = 256;

    /// Engine that answers every generation with `reply`
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            behavior: Behavior::Reply,
            delay: None,
            template: ZephyrChatTemplate::default(),
            conversations: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
            decoded_lengths: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Engine whose `generate` returns a generation failure
    pub fn failing(message: impl Into<String>) -> Self {
        Self { behavior: Behavior::Fail(message.into()), ..Self::new("") }
    }

    /// Engine whose `generate` panics
    pub fn panicking() -> Self {
        Self { behavior: Behavior::Panic, ..Self::new("") }
    }

    /// Block inside `generate` for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.lock().clone()
    }

    /// Templated prompts, in the order generation ran
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn params(&self) -> Vec<GenerationParams> {
        self.params.lock().clone()
    }

    pub fn generate_calls(&self) -> usize {
        self.params.lock().len()
    }

    pub fn decoded_lengths(&self) -> Vec<usize> {
        self.decoded_lengths.lock().clone()
    }

    /// Highest number of `generate` calls observed running at once
    pub fn max_concurrent_generations(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn bytes_to_text(tokens: &[u32], skip_special_tokens: bool) -> String {
        let mut bytes = Vec::with_capacity(tokens.len());
        for &token in tokens {
            match u8::try_from(token) {
                Ok(byte) => bytes.push(byte),
                Err(_) if skip_special_tokens => {}
                Err(_) => bytes.extend_from_slice(b"</s>"),
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl TextGenerationEngine for MockEngine {
    fn apply_chat_template(&self, conversation: &Conversation) -> Result<String> {
        self.conversations.lock().push(conversation.clone());
        Ok(self.template.render(conversation))
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.bytes().map(u32::from).collect())
    }

    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.decoded_lengths.lock().push(tokens.len());
        Ok(Self::bytes_to_text(tokens, skip_special_tokens))
    }

    fn generate(&self, tokens: &[u32], params: &GenerationParams) -> Result<GenerationOutput> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        self.params.lock().push(params.clone());
        self.prompts.lock().push(Self::bytes_to_text(tokens, false));
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match &self.behavior {
            Behavior::Reply => {
                let mut sequence = tokens.to_vec();
                sequence.extend(self.reply.bytes().take(params.max_new_tokens).map(u32::from));
                sequence.push(Self::EOS_TOKEN_ID);
                Ok(GenerationOutput::new(sequence))
            }
            Behavior::Fail(message) => Err(CoreError::generation(
                "GENERATION_FAILED",
                message.clone(),
                "Mock generation",
            )),
            Behavior::Panic => panic!("mock engine panicked during generation"),
        }
    }

    fn model_name(&self) -> &str {
        "mock-zephyr"
    }
}
