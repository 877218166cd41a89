//! Response extraction

use crate::{engine::TextGenerationEngine, generation::GenerationOutput, CoreError, Result};

/// Decode the tokens generated after the prompt.
///
/// The first `prompt_token_count` tokens of the full sequence are the prompt
/// and are dropped; everything after them is decoded in order with special
/// tokens skipped, then trimmed.
pub fn extract_response(
    engine: &dyn TextGenerationEngine,
    output: &GenerationOutput,
    prompt_token_count: usize,
) -> Result<String> {
    let generated = output.sequence.get(prompt_token_count..).ok_or_else(|| {
        CoreError::generation(
            "SEQUENCE_TOO_SHORT",
            format!(
                "Engine returned {} tokens for a {}-token prompt",
                output.sequence.len(),
                prompt_token_count
            ),
            "Slicing generated tokens from the full sequence",
        )
    })?;

    let text = engine.decode(generated, true)?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;

    #[test]
    fn test_only_generated_tokens_are_decoded() {
        let engine = MockEngine::new("unused");
        let prompt: Vec<u32> = (0..12).map(|i| b'a' as u32 + i).collect();
        let mut sequence = prompt.clone();
        sequence.extend("hello".bytes().map(u32::from));

        let text = extract_response(&engine, &GenerationOutput::new(sequence), prompt.len()).unwrap();

        assert_eq!(text, "hello");
        assert_eq!(engine.decoded_lengths(), vec![5]);
    }

    #[test]
    fn test_prompt_content_does_not_matter() {
        let engine = MockEngine::new("unused");
        for fill in [b'x', b' ', b'#'] {
            let mut sequence = vec![fill as u32; 12];
            sequence.extend("Hi!".bytes().map(u32::from));
            let text = extract_response(&engine, &GenerationOutput::new(sequence), 12).unwrap();
            assert_eq!(text, "Hi!");
        }
    }

    #[test]
    fn test_special_tokens_skipped_and_text_trimmed() {
        let engine = MockEngine::new("unused");
        let mut sequence = vec![1u32, 2, 3];
        sequence.extend("  The park is open. ".bytes().map(u32::from));
        sequence.push(MockEngine::EOS_TOKEN_ID);

        let text = extract_response(&engine, &GenerationOutput::new(sequence), 3).unwrap();
        assert_eq!(text, "The park is open.");
    }

    #[test]
    fn test_no_generated_tokens_yields_empty_text() {
        let engine = MockEngine::new("unused");
        let text = extract_response(&engine, &GenerationOutput::new(vec![1, 2, 3]), 3).unwrap();
        assert_eq!(text, "");
    }

    #[test]
    fn test_short_sequence_is_generation_failure() {
        let engine = MockEngine::new("unused");
        let err = extract_response(&engine, &GenerationOutput::new(vec![1, 2]), 3).unwrap_err();
        assert_eq!(err.code(), "SEQUENCE_TOO_SHORT");
    }
}
