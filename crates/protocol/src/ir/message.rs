/// The four message roles the IR understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in a conversation.
///
/// `content` is either a plain string, absent, or a list of [`IrContentPart`]s.
/// Keeping these distinct (rather than always normalizing to a list) matters
/// because several wire formats treat a bare string and a one-part array
/// differently on the way back out.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IrMessage {
    pub role: IrRole,
    pub content: IrContent,
    /// Chain-of-thought the assistant produced alongside this message.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thinking: Option<IrThinking>,
    /// Tool calls the assistant requested in this turn.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_calls: Vec<IrToolCall>,
    /// Set only on `role: Tool` messages; matches an earlier assistant tool call's id.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    /// Optional echo of the tool name on a `role: Tool` message.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_name: Option<String>,
}

impl IrMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: IrRole::System,
            content: IrContent::Text(text.into()),
            thinking: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: IrRole::User,
            content: IrContent::Text(text.into()),
            thinking: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: IrRole::Assistant,
            content: IrContent::Text(text.into()),
            thinking: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: IrContent) -> Self {
        Self {
            role: IrRole::Tool,
            content,
            thinking: None,
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: None,
        }
    }

    /// Concatenates another message's content parts onto this one.
    ///
    /// Used to merge consecutive same-role messages for wire formats (Anthropic)
    /// that reject them.
    pub fn merge_content(&mut self, other: IrMessage) {
        self.content = match (std::mem::replace(&mut self.content, IrContent::Null), other.content) {
            (IrContent::Null, b) => b,
            (a, IrContent::Null) => a,
            (IrContent::Text(a), IrContent::Text(b)) => {
                IrContent::Parts(vec![IrContentPart::text(a), IrContentPart::text(b)])
            }
            (IrContent::Text(a), IrContent::Parts(mut b)) => {
                let mut parts = vec![IrContentPart::text(a)];
                parts.append(&mut b);
                IrContent::Parts(parts)
            }
            (IrContent::Parts(mut a), IrContent::Text(b)) => {
                a.push(IrContentPart::text(b));
                IrContent::Parts(a)
            }
            (IrContent::Parts(mut a), IrContent::Parts(mut b)) => {
                a.append(&mut b);
                IrContent::Parts(a)
            }
        };
        self.tool_calls.extend(other.tool_calls);
        if self.thinking.is_none() {
            self.thinking = other.thinking;
        }
    }
}

/// Message content: absent, a bare string, or a list of tagged parts.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum IrContent {
    Null,
    Text(String),
    Parts(Vec<IrContentPart>),
}

impl IrContent {
    /// Flattens to a single string, concatenating text parts and ignoring images.
    pub fn as_text(&self) -> String {
        match self {
            IrContent::Null => String::new(),
            IrContent::Text(s) => s.clone(),
            IrContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    IrContentPart::Text { text, .. } => Some(text.as_str()),
                    IrContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, IrContent::Null) || matches!(self, IrContent::Text(s) if s.is_empty())
    }
}

/// One tagged content part.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IrContentPart {
    Text {
        text: String,
        /// Opaque pass-through for provider-specific cache hints (e.g. Anthropic's
        /// `cache_control`). The core never interprets this; it only round-trips it.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        cache_control: Option<serde_json::Value>,
    },
    Image {
        #[serde(flatten)]
        source: IrImageSource,
        media_type: String,
    },
}

impl IrContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        IrContentPart::Text {
            text: text.into(),
            cache_control: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum IrImageSource {
    Url { url: String },
    Base64 { inline_base64: String },
}

/// An assistant's chain-of-thought, carried opaquely alongside the visible reply.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IrThinking {
    pub content: String,
    /// Opaque provider-issued signature (e.g. Anthropic's `signature`, Gemini's
    /// `thoughtSignature`) carried through unverified so a later turn can replay it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,
}

/// A completed tool call attached to an assistant message.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IrToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded arguments string, never pre-parsed: downstream formatters
    /// decide whether and how to parse it, and must tolerate malformed JSON.
    pub arguments: String,
}
