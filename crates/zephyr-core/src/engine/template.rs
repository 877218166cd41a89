//! Chat templates

use crate::conversation::Conversation;

/// Renders a conversation into a model-specific prompt string
pub trait ChatTemplate: Send + Sync {
    /// Render with the generation prompt (assistant header) appended
    fn render(&self, conversation: &Conversation) -> String;
}

/// Template used by the Zephyr family of chat models
#[derive(Debug, Clone)]
pub struct ZephyrChatTemplate {
    eos_token: String,
}

impl Default for ZephyrChatTemplate {
    fn default() -> Self {
        Self { eos_token: "</s>".to_string() }
    }
}

impl ZephyrChatTemplate {
    pub fn new(eos_token: impl Into<String>) -> Self {
        Self { eos_token: eos_token.into() }
    }

    pub fn eos_token(&self) -> &str {
        &self.eos_token
    }
}

impl ChatTemplate for ZephyrChatTemplate {
    fn render(&self, conversation: &Conversation) -> String {
        let mut prompt = String::new();
        for turn in conversation.turns() {
            prompt.push_str("<|");
            prompt.push_str(turn.role.as_str());
            prompt.push_str("|>\n");
            prompt.push_str(&turn.content);
            prompt.push_str(&self.eos_token);
            prompt.push('\n');
        }
        prompt.push_str("<|assistant|>\n");
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_only() {
        let rendered = ZephyrChatTemplate::default().render(&Conversation::user("What is 2+2?"));
        assert_eq!(rendered, "<|user|>\nWhat is 2+2?</s>\n<|assistant|>\n");
    }

    #[test]
    fn test_system_then_user() {
        let conversation = Conversation::with_system("User is near Central Park.", "What's here?");
        let rendered = ZephyrChatTemplate::default().render(&conversation);
        assert_eq!(
            rendered,
            "<|system|>\nUser is near Central Park.</s>\n<|user|>\nWhat's here?</s>\n<|assistant|>\n"
        );
    }

    #[test]
    fn test_custom_eos() {
        let rendered = ZephyrChatTemplate::new("<eos>").render(&Conversation::user("hi"));
        assert_eq!(rendered, "<|user|>\nhi<eos>\n<|assistant|>\n");
    }
}
