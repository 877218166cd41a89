//! Zephyr Core - location-aware request-to-generation pipeline
//!
//! This crate turns a user prompt, optionally paired with a nearby place hint,
//! into text produced by a [`TextGenerationEngine`]. The pipeline stages are
//! plain functions; the only long-lived resource is the engine, which is owned
//! by a single-slot [`GenerationWorker`].

// Module declarations
pub mod conversation;
pub mod engine;
pub mod extract;
pub mod generation;
pub mod location;
pub mod request;
pub mod service;
pub mod worker;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// The engine could not be loaded or is no longer accepting work
    #[error("Engine unavailable [{code}]: {message}\nSuggestion: {suggestion}")]
    EngineUnavailable {
        code: &'static str,
        message: String,
        suggestion: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A request field failed validation before reaching the engine
    #[error("Invalid parameter [{code}]: {parameter} = {value} (valid range: {valid_range})")]
    InvalidParameter {
        code: &'static str,
        parameter: String,
        value: String,
        valid_range: String,
    },

    /// Templating, tokenization, generation or decoding failed
    #[error("Generation failure [{code}]: {message}\nContext: {context}")]
    GenerationFailure {
        code: &'static str,
        message: String,
        context: String,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an engine unavailable error
    pub fn engine_unavailable<S1, S2>(message: S1, suggestion: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::EngineUnavailable {
            code: "ENGINE_UNAVAILABLE",
            message: message.into(),
            suggestion: suggestion.into(),
            source: None,
        }
    }

    /// Create an engine unavailable error that keeps its underlying cause
    pub fn engine_load<S1, S2>(message: S1, suggestion: S2, source: anyhow::Error) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::EngineUnavailable {
            code: "ENGINE_LOAD_FAILED",
            message: message.into(),
            suggestion: suggestion.into(),
            source: Some(source),
        }
    }

    /// Create an invalid parameter error with validation details
    pub fn invalid_parameter<S1, S2, S3>(parameter: S1, value: S2, valid_range: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::InvalidParameter {
            code: "INVALID_PARAMETER",
            parameter: parameter.into(),
            value: value.into(),
            valid_range: valid_range.into(),
        }
    }

    /// Create a generation failure
    pub fn generation<S1, S2>(code: &'static str, message: S1, context: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::GenerationFailure {
            code,
            message: message.into(),
            context: context.into(),
        }
    }

    /// Get the error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::EngineUnavailable { code, .. } => code,
            Self::InvalidParameter { code, .. } => code,
            Self::GenerationFailure { code, .. } => code,
        }
    }

    /// Whether this error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidParameter { .. })
    }
}

// Re-export key types at the crate root
pub use conversation::Conversation;
pub use engine::{EngineHandle, TextGenerationEngine};
pub use request::GenerationRequest;
pub use service::{GenerationOutcome, RequestService};
pub use worker::GenerationWorker;
