use crate::models::ChatMessage;

pub const ROLE_MARKERS: &[&str] = &["<|system|>", "<|user|>", "<|assistant|>", "</s>"];

/// How the conversation history is folded into the upstream `inputs` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptFormat {
    /// Single-turn backends only see the newest message.
    #[default]
    LastMessage,
    /// Multi-turn backends get every turn wrapped in role markers.
    RoleDelimited,
}

impl PromptFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "last-message" | "last_message" => Some(Self::LastMessage),
            "role-delimited" | "role_delimited" => Some(Self::RoleDelimited),
            _ => None,
        }
    }

    pub fn strips_markers(self) -> bool {
        self == Self::RoleDelimited
    }

    pub fn render(self, messages: &[ChatMessage]) -> String {
        match self {
            Self::LastMessage => messages
                .last()
                .map(|message| message.content.clone())
                .unwrap_or_default(),
            Self::RoleDelimited => {
                let mut prompt = String::new();
                for message in messages {
                    prompt.push_str("<|");
                    prompt.push_str(message.role.as_str());
                    prompt.push_str("|>\n");
                    prompt.push_str(&message.content);
                    prompt.push_str("</s>\n");
                }
                prompt.push_str("<|assistant|>\n");
                prompt
            }
        }
    }
}
