use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the tool some agents call instead of answering directly.
pub const SEND_MESSAGE_TOOL: &str = "send_message";

/// Content of the single user message posted to the agent.
///
/// Serializes as a bare string, or as a content-block array when images ride
/// along.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Plain text when there are no images, otherwise one text block followed
    /// by one block per image.
    pub fn with_images(text: String, images: Vec<ImageSource>) -> Self {
        if images.is_empty() {
            return Self::Text(text);
        }
        let mut blocks = Vec::with_capacity(images.len() + 1);
        blocks.push(ContentBlock::Text { text });
        blocks.extend(images.into_iter().map(|source| ContentBlock::Image { source }));
        Self::Blocks(blocks)
    }

    /// Length of the text portion, in chars.
    pub fn text_len(&self) -> usize {
        match self {
            Self::Text(t) => t.chars().count(),
            Self::Blocks(blocks) => blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => text.chars().count(),
                    ContentBlock::Image { .. } => 0,
                })
                .sum(),
        }
    }

    pub fn image_count(&self) -> usize {
        match self {
            Self::Text(_) => 0,
            Self::Blocks(blocks) => blocks
                .iter()
                .filter(|b| matches!(b, ContentBlock::Image { .. }))
                .count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    pub fn base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: "base64".to_string(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

/// One typed entry of the agent's response list.
///
/// Unknown `message_type` tags (reasoning, tool returns, usage, ...) decode
/// to [`AgentMessage::Other`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum AgentMessage {
    AssistantMessage {
        #[serde(default)]
        content: AssistantContent,
    },
    ToolCallMessage {
        tool_call: ToolCall,
    },
    #[serde(other)]
    Other,
}

impl AgentMessage {
    /// Decode one response entry; anything malformed is `Other`.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or(Self::Other)
    }

    /// The text this message wants delivered to the user, if any.
    pub fn reply_text(&self) -> Option<String> {
        match self {
            Self::AssistantMessage { content } => Some(content.text()),
            Self::ToolCallMessage { tool_call } if tool_call.name == SEND_MESSAGE_TOOL => {
                tool_call.message().filter(|m| !m.is_empty())
            }
            _ => None,
        }
    }
}

/// Assistant content arrives either as a string or as a list of typed parts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AssistantContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for AssistantContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl AssistantContent {
    pub fn text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// A JSON-encoded string in practice; objects are accepted too.
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    /// The `message` argument of a `send_message` call.
    pub fn message(&self) -> Option<String> {
        let args = match &self.arguments {
            Value::String(raw) => serde_json::from_str::<Value>(raw).ok()?,
            other => other.clone(),
        };
        args.get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// First actionable reply in a response list. Later entries are ignored.
pub fn extract_reply(messages: &[AgentMessage]) -> Option<String> {
    messages.iter().find_map(AgentMessage::reply_text)
}
