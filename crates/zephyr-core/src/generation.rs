//! Generation parameters and engine output

use crate::{request::GenerationRequest, CoreError, Result};
use serde::{Deserialize, Serialize};

/// Repetition penalty applied to every generation
pub const REPETITION_PENALTY: f32 = 1.1;

/// Parameters for a single engine generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate after the prompt
    pub max_new_tokens: usize,

    /// Sampling temperature
    pub temperature: f64,

    /// Top-p (nucleus) sampling threshold
    pub top_p: f64,

    /// Top-k sampling parameter
    pub top_k: usize,

    /// Sample instead of greedy decoding
    pub do_sample: bool,

    /// Beam width; 1 disables beam search
    pub num_beams: usize,

    /// Repetition penalty (1.0 = no penalty)
    pub repetition_penalty: f32,

    /// Return the full prompt + generated sequence rather than text only
    pub return_full_sequence: bool,

    /// Reuse incremental decoding state between steps
    pub use_cache: bool,
}

/// Output of an engine generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// Prompt tokens followed by the newly generated tokens
    pub sequence: Vec<u32>,
}

impl GenerationOutput {
    pub fn new(sequence: Vec<u32>) -> Self {
        Self { sequence }
    }
}

/// Validate a request's sampling controls and map them to engine parameters.
pub fn map_params(request: &GenerationRequest) -> Result<GenerationParams> {
    if request.max_tokens <= 0 {
        return Err(CoreError::invalid_parameter(
            "max_tokens",
            request.max_tokens.to_string(),
            "integer > 0",
        ));
    }

    if !(request.temperature.is_finite() && request.temperature > 0.0) {
        return Err(CoreError::invalid_parameter(
            "temperature",
            request.temperature.to_string(),
            "(0, inf)",
        ));
    }

    if !(request.top_p > 0.0 && request.top_p <= 1.0) {
        return Err(CoreError::invalid_parameter(
            "top_p",
            request.top_p.to_string(),
            "(0, 1]",
        ));
    }

    if request.top_k < 0 {
        return Err(CoreError::invalid_parameter(
            "top_k",
            request.top_k.to_string(),
            "integer >= 0",
        ));
    }

    Ok(GenerationParams {
        max_new_tokens: request.max_tokens as usize,
        temperature: request.temperature,
        top_p: request.top_p,
        top_k: request.top_k as usize,
        do_sample: true,
        num_beams: 1,
        repetition_penalty: REPETITION_PENALTY,
        return_full_sequence: true,
        use_cache: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(max_tokens: i64, temperature: f64, top_p: f64, top_k: i64) -> GenerationRequest {
        GenerationRequest {
            max_tokens,
            temperature,
            top_p,
            top_k,
            ..GenerationRequest::new("hi")
        }
    }

    #[test]
    fn test_values_pass_through_with_fixed_policy() {
        let params = map_params(&request(100, 0.5, 0.9, 40)).unwrap();

        assert_eq!(params.max_new_tokens, 100);
        assert_eq!(params.temperature, 0.5);
        assert_eq!(params.top_p, 0.9);
        assert_eq!(params.top_k, 40);
        assert!(params.do_sample);
        assert_eq!(params.num_beams, 1);
        assert_eq!(params.repetition_penalty, 1.1);
        assert!(params.return_full_sequence);
        assert!(params.use_cache);
    }

    #[test]
    fn test_defaults_are_valid() {
        let params = map_params(&GenerationRequest::new("hi")).unwrap();
        assert_eq!(params.max_new_tokens, 150);
        assert_eq!(params.top_k, 50);
    }

    #[test]
    fn test_boundaries_accepted() {
        assert!(map_params(&request(1, 0.01, 1.0, 0)).is_ok());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let cases = [
            (request(0, 0.7, 0.8, 50), "max_tokens"),
            (request(-3, 0.7, 0.8, 50), "max_tokens"),
            (request(150, 0.0, 0.8, 50), "temperature"),
            (request(150, -1.0, 0.8, 50), "temperature"),
            (request(150, f64::INFINITY, 0.8, 50), "temperature"),
            (request(150, 0.7, 1.5, 50), "top_p"),
            (request(150, 0.7, 0.0, 50), "top_p"),
            (request(150, 0.7, 0.8, -1), "top_k"),
        ];

        for (req, expected) in cases {
            match map_params(&req) {
                Err(CoreError::InvalidParameter { parameter, .. }) => assert_eq!(parameter, expected),
                other => panic!("expected InvalidParameter for {}, got {:?}", expected, other),
            }
        }
    }
}
