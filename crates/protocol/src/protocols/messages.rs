//! Anthropic Messages transformer (§4.2).
//!
//! The stream formatter is the block-lifecycle state machine described in
//! the design notes: three block kinds (text, thinking, tool_use), a single
//! active block at a time, and a monotonically increasing block index. A
//! `finish_reason` does not close the message immediately — it is deferred
//! until `flush` so a trailing usage-only chunk can still be folded in
//! (scenario 4).

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::{
    error::{GatewayError, Result},
    ir::*,
    stream::sse,
    token_counter,
    transformer::{ApiFormat, BuiltRequest, ByteStream, ChunkStream, Transformer},
};

pub const FORMAT: ApiFormat = ApiFormat::Messages;

// ---------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AnthropicRequest {
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub system: Option<SystemField>,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub tools: Vec<WireTool>,
    #[serde(default)]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SystemField {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Deserialize)]
pub struct SystemBlock {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ThinkingConfig {
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub budget_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WireTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "input_schema")]
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: ContentField,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ContentField {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<serde_json::Value>,
    },
    Image {
        source: serde_json::Value,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<ContentField>,
        #[serde(default)]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Serialize)]
pub struct AnthropicResponse {
    pub id: String,
    pub r#type: &'static str,
    pub role: &'static str,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: AnthropicResponseUsage,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AnthropicResponseUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UnaryResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: AnthropicResponseUsage,
}

// ---------------------------------------------------------------------
// SSE event shapes
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: MessageStartPayload,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {
        #[allow(dead_code)]
        index: u32,
    },
    MessageDelta {
        delta: MessageDeltaPayload,
        #[serde(default)]
        usage: Option<AnthropicResponseUsage>,
    },
    MessageStop,
    Ping,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStartPayload {
    id: String,
    model: String,
    #[serde(default)]
    usage: Option<AnthropicResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaPayload {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    InputJsonDelta { partial_json: String },
}

// ---------------------------------------------------------------------
// Helpers shared by parse/build/response/stream
// ---------------------------------------------------------------------

fn stop_reason_to_ir(reason: &str) -> IrFinishReason {
    match reason {
        "end_turn" | "stop_sequence" => IrFinishReason::Stop,
        "max_tokens" => IrFinishReason::Length,
        "tool_use" => IrFinishReason::ToolCalls,
        other => IrFinishReason::Other(other.to_string()),
    }
}

fn finish_reason_to_stop_reason(reason: &IrFinishReason, has_tool_calls: bool) -> String {
    if has_tool_calls {
        return "tool_use".to_string();
    }
    match reason {
        IrFinishReason::Stop => "end_turn".to_string(),
        IrFinishReason::Length => "max_tokens".to_string(),
        IrFinishReason::ToolCalls => "tool_use".to_string(),
        IrFinishReason::ContentFilter => "end_turn".to_string(),
        IrFinishReason::Other(s) => s.clone(),
    }
}

/// Splits a user message's content blocks into tool-result IR messages plus
/// one remaining user message, per §4.2's parse rule.
fn split_user_content(blocks: Vec<ContentBlock>) -> Vec<IrMessage> {
    let mut tool_messages = Vec::new();
    let mut remaining = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::ToolResult {
                tool_use_id, content, ..
            } => {
                let text = match content {
                    Some(ContentField::Text(s)) => s,
                    Some(ContentField::Blocks(parts)) => parts
                        .into_iter()
                        .filter_map(|p| match p {
                            ContentBlock::Text { text, .. } => Some(text),
                            _ => None,
                        })
                        .collect::<Vec<_>>()
                        .join(""),
                    None => String::new(),
                };
                tool_messages.push(IrMessage::tool_result(tool_use_id, IrContent::Text(text)));
            }
            other => remaining.push(other),
        }
    }

    if !remaining.is_empty() {
        tool_messages.push(IrMessage {
            role: IrRole::User,
            content: block_to_ir_content(remaining),
            thinking: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        });
    }

    tool_messages
}

fn block_to_ir_content(blocks: Vec<ContentBlock>) -> IrContent {
    let parts: Vec<IrContentPart> = blocks
        .into_iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text, cache_control } => Some(IrContentPart::Text { text, cache_control }),
            ContentBlock::Image { source } => Some(IrContentPart::Image {
                source: IrImageSource::Url {
                    url: source.get("url").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                },
                media_type: source
                    .get("media_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("application/octet-stream")
                    .to_string(),
            }),
            _ => None,
        })
        .collect();

    if parts.len() == 1
        && let IrContentPart::Text { text, cache_control: None } = &parts[0]
    {
        return IrContent::Text(text.clone());
    }
    IrContent::Parts(parts)
}

fn assistant_content_to_ir(blocks: Vec<ContentBlock>) -> (IrContent, Option<IrThinking>, Vec<IrToolCall>) {
    let mut thinking = None;
    let mut tool_calls = Vec::new();
    let mut rest = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Thinking { thinking: t, signature } => {
                thinking = Some(IrThinking { content: t, signature });
            }
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(IrToolCall {
                    id,
                    name,
                    arguments: sonic_rs::to_string(&input).unwrap_or_else(|_| "{}".to_string()),
                });
            }
            other => rest.push(other),
        }
    }

    (block_to_ir_content(rest), thinking, tool_calls)
}

pub struct MessagesTransformer;

#[async_trait]
impl Transformer for MessagesTransformer {
    fn parse_request(&self, raw: &[u8]) -> Result<IrRequest> {
        let req: AnthropicRequest =
            sonic_rs::from_slice(raw).map_err(|e| GatewayError::MalformedRequest(e.to_string()))?;

        let mut messages = Vec::new();

        if let Some(system) = req.system {
            let text = match system {
                SystemField::Text(s) => s,
                SystemField::Blocks(blocks) => blocks.into_iter().map(|b| b.text).collect::<Vec<_>>().join("\n"),
            };
            if !text.is_empty() {
                messages.push(IrMessage::system(text));
            }
        }

        for wire_message in req.messages {
            let role = match wire_message.role.as_str() {
                "assistant" => IrRole::Assistant,
                _ => IrRole::User,
            };

            let blocks = match wire_message.content {
                ContentField::Text(text) => {
                    messages.push(IrMessage {
                        role,
                        content: IrContent::Text(text),
                        thinking: None,
                        tool_calls: Vec::new(),
                        tool_call_id: None,
                        tool_name: None,
                    });
                    continue;
                }
                ContentField::Blocks(blocks) => blocks,
            };

            if role == IrRole::User {
                messages.extend(split_user_content(blocks));
            } else {
                let (content, thinking, tool_calls) = assistant_content_to_ir(blocks);
                messages.push(IrMessage {
                    role,
                    content,
                    thinking,
                    tool_calls,
                    tool_call_id: None,
                    tool_name: None,
                });
            }
        }

        let tools = req
            .tools
            .into_iter()
            .map(|t| IrToolDef {
                name: t.name,
                description: t.description,
                parameters: t.input_schema,
                strict: None,
            })
            .collect();

        let tool_choice = req.tool_choice.and_then(|v| match v.get("type").and_then(|t| t.as_str()) {
            Some("auto") => Some(IrToolChoice::Auto),
            Some("any") => Some(IrToolChoice::Required),
            Some("none") => Some(IrToolChoice::None),
            Some("tool") => v
                .get("name")
                .and_then(|n| n.as_str())
                .map(|n| IrToolChoice::Named(n.to_string())),
            _ => None,
        });

        let reasoning = req.thinking.map(|t| IrReasoning {
            effort: None,
            max_tokens: t.budget_tokens,
            enabled: t.r#type == "enabled",
        });

        Ok(IrRequest {
            model: req.model,
            messages,
            tools,
            tool_choice,
            response_format: None,
            reasoning,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            stream: req.stream.unwrap_or(false),
            request_id: None,
            metadata: Default::default(),
        })
    }

    fn build_request(&self, request: &IrRequest) -> Result<BuiltRequest> {
        let mut system_text = String::new();
        let mut wire_messages: Vec<WireMessage> = Vec::new();

        for message in &request.messages {
            if message.role == IrRole::System {
                if !system_text.is_empty() {
                    system_text.push('\n');
                }
                system_text.push_str(&message.content.as_text());
                continue;
            }

            let role = match message.role {
                IrRole::Assistant => "assistant",
                _ => "user",
            };

            let mut blocks = Vec::new();

            if message.role == IrRole::Tool {
                blocks.push(ContentBlock::ToolResult {
                    tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: Some(ContentField::Text(message.content.as_text())),
                    is_error: None,
                });
            } else {
                if let Some(thinking) = &message.thinking {
                    blocks.push(ContentBlock::Thinking {
                        thinking: thinking.content.clone(),
                        signature: thinking.signature.clone(),
                    });
                }
                match &message.content {
                    IrContent::Null => {}
                    IrContent::Text(text) if !text.is_empty() => blocks.push(ContentBlock::Text {
                        text: text.clone(),
                        cache_control: None,
                    }),
                    IrContent::Text(_) => {}
                    IrContent::Parts(parts) => {
                        for part in parts {
                            if let IrContentPart::Text { text, cache_control } = part {
                                blocks.push(ContentBlock::Text {
                                    text: text.clone(),
                                    cache_control: cache_control.clone(),
                                });
                            }
                        }
                    }
                }
                for tool_call in &message.tool_calls {
                    let input = sonic_rs::from_str(&tool_call.arguments).unwrap_or(serde_json::Value::Null);
                    blocks.push(ContentBlock::ToolUse {
                        id: tool_call.id.clone(),
                        name: tool_call.name.clone(),
                        input,
                    });
                }
            }

            let new_message = WireMessage {
                role: role.to_string(),
                content: ContentField::Blocks(blocks),
            };

            // Anthropic rejects consecutive same-role messages: merge by
            // concatenating content blocks onto the previous message.
            if let Some(last) = wire_messages.last_mut()
                && last.role == new_message.role
            {
                if let (ContentField::Blocks(last_blocks), ContentField::Blocks(mut new_blocks)) =
                    (&mut last.content, new_message.content)
                {
                    last_blocks.append(&mut new_blocks);
                }
                continue;
            }

            wire_messages.push(new_message);
        }

        let tools: Vec<_> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();

        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens.unwrap_or(4096),
            "system": (!system_text.is_empty()).then_some(&system_text),
            "messages": wire_messages,
            "tools": tools,
            "temperature": request.temperature,
            "stream": request.stream,
        });

        Ok(BuiltRequest {
            path: "/v1/messages".to_string(),
            body,
        })
    }

    fn transform_response(&self, body: &[u8]) -> Result<IrResponse> {
        let resp: UnaryResponse =
            sonic_rs::from_slice(body).map_err(|e| GatewayError::UpstreamProtocolViolation(e.to_string()))?;

        let (content, thinking, tool_calls) = assistant_content_to_ir(resp.content);
        let reasoning_content = thinking.as_ref().map(|t| t.content.clone());

        let combined_output = resp.usage.output_tokens;
        let (output_tokens, reasoning_tokens) = match &reasoning_content {
            Some(text) if !text.is_empty() => {
                let text_tokens = token_counter::count(&content.as_text());
                (text_tokens, combined_output.saturating_sub(text_tokens))
            }
            _ => (combined_output, 0),
        };

        let cached_tokens = resp.usage.cache_read_input_tokens.unwrap_or(0);
        let cache_creation_tokens = resp.usage.cache_creation_input_tokens.unwrap_or(0);

        let finish_reason = resp.stop_reason.as_deref().map(stop_reason_to_ir).or_else(|| {
            Some(if tool_calls.is_empty() {
                IrFinishReason::Stop
            } else {
                IrFinishReason::ToolCalls
            })
        });

        Ok(IrResponse {
            id: Some(resp.id),
            model: Some(resp.model),
            created: None,
            content: (!content.is_empty()).then(|| content.as_text()),
            reasoning_content,
            thinking,
            tool_calls,
            finish_reason,
            citations: Vec::new(),
            usage: IrUsage {
                input_tokens: resp.usage.input_tokens,
                output_tokens,
                total_tokens: resp.usage.input_tokens + output_tokens + reasoning_tokens,
                reasoning_tokens,
                cached_tokens,
                cache_creation_tokens,
            },
            bypass: false,
            raw_response: None,
        })
    }

    fn format_response(&self, response: &IrResponse) -> Result<serde_json::Value> {
        let mut content = Vec::new();

        if let Some(thinking) = &response.thinking {
            content.push(ContentBlock::Thinking {
                thinking: thinking.content.clone(),
                signature: thinking.signature.clone(),
            });
        }

        if let Some(text) = &response.content
            && !text.is_empty()
        {
            content.push(ContentBlock::Text {
                text: text.clone(),
                cache_control: None,
            });
        }

        for tool_call in &response.tool_calls {
            // Tool-argument-malformed (§7): never fail the response; wrap the
            // raw string instead of raising.
            let input = sonic_rs::from_str(&tool_call.arguments)
                .unwrap_or_else(|_| serde_json::json!({ "raw_arguments": tool_call.arguments }));
            content.push(ContentBlock::ToolUse {
                id: tool_call.id.clone(),
                name: tool_call.name.clone(),
                input,
            });
        }

        let stop_reason = response
            .finish_reason
            .as_ref()
            .map(|r| finish_reason_to_stop_reason(r, !response.tool_calls.is_empty()));

        let out = AnthropicResponse {
            id: response.id.clone().unwrap_or_default(),
            r#type: "message",
            role: "assistant",
            model: response.model.clone().unwrap_or_default(),
            content,
            stop_reason,
            usage: AnthropicResponseUsage {
                input_tokens: response.usage.input_tokens.saturating_sub(response.usage.cached_tokens),
                output_tokens: response.usage.output_tokens,
                cache_creation_input_tokens: Some(response.usage.cache_creation_tokens),
                cache_read_input_tokens: Some(response.usage.cached_tokens),
            },
        };

        serde_json::to_value(out).map_err(|e| GatewayError::Internal(Some(e.to_string())))
    }

    fn transform_stream(&self, upstream: ByteStream) -> ChunkStream {
        let events = Box::pin(sse::parse(upstream));

        let chunks = futures::stream::unfold(
            (events, AnthropicTransformState::default()),
            |(mut events, mut state)| async move {
                loop {
                    let event = events.next().await?;
                    if event.data == "[DONE]" {
                        return None;
                    }

                    let parsed: StreamEvent = match sonic_rs::from_str(&event.data) {
                        Ok(e) => e,
                        Err(e) => {
                            log::warn!("failed to parse Anthropic stream event: {e}");
                            continue;
                        }
                    };

                    if let Some(chunk) = state.apply(parsed) {
                        return Some((Ok(chunk), (events, state)));
                    }
                }
            },
        );

        Box::pin(chunks)
    }

    fn format_stream(&self, chunks: ChunkStream) -> ByteStream {
        let bytes_stream = futures::stream::unfold(
            (chunks, AnthropicStreamFormatter::default(), false),
            |(mut chunks, mut formatter, flushed)| async move {
                if flushed {
                    return None;
                }

                match chunks.next().await {
                    Some(Ok(chunk)) => {
                        let bytes = formatter.apply(chunk);
                        Some((bytes, (chunks, formatter, false)))
                    }
                    Some(Err(e)) => {
                        let bytes = sse::frame_named("error", &sse::serialize_error(&e));
                        Some((bytes, (chunks, formatter, false)))
                    }
                    None => {
                        let bytes = formatter.flush();
                        Some((bytes, (chunks, formatter, true)))
                    }
                }
            },
        )
        .map(|bytes| Ok(bytes::Bytes::from(bytes)))
        .map(|r: std::io::Result<bytes::Bytes>| r);

        Box::pin(bytes_stream)
    }

    fn extract_usage(&self, data: &[u8]) -> Option<IrUsage> {
        let event: StreamEvent = sonic_rs::from_slice(data).ok()?;
        match event {
            StreamEvent::MessageDelta { usage: Some(usage), .. } => Some(IrUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                total_tokens: usage.input_tokens + usage.output_tokens,
                reasoning_tokens: 0,
                cached_tokens: usage.cache_read_input_tokens.unwrap_or(0),
                cache_creation_tokens: usage.cache_creation_input_tokens.unwrap_or(0),
            }),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------
// SSE -> IR state machine (§4.2)
// ---------------------------------------------------------------------

#[derive(Default)]
struct AnthropicTransformState {
    id: Option<String>,
    model: Option<String>,
    block_kinds: HashMap<u32, BlockKind>,
    tool_ordinals: HashMap<u32, u32>,
    next_tool_ordinal: u32,
    text_buffer: String,
    thinking_seen: bool,
    started: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

impl AnthropicTransformState {
    fn apply(&mut self, event: StreamEvent) -> Option<IrChunk> {
        match event {
            StreamEvent::MessageStart { message } => {
                self.id = Some(message.id.clone());
                self.model = Some(message.model.clone());
                self.started = true;
                Some(IrChunk {
                    id: Some(message.id),
                    model: Some(message.model),
                    created: None,
                    delta: IrDelta {
                        role: Some(IrRole::Assistant),
                        ..Default::default()
                    },
                    finish_reason: None,
                    usage: message.usage.map(|u| IrUsage {
                        input_tokens: u.input_tokens,
                        output_tokens: u.output_tokens,
                        total_tokens: u.input_tokens + u.output_tokens,
                        reasoning_tokens: 0,
                        cached_tokens: u.cache_read_input_tokens.unwrap_or(0),
                        cache_creation_tokens: u.cache_creation_input_tokens.unwrap_or(0),
                    }),
                })
            }
            StreamEvent::ContentBlockStart { index, content_block } => match content_block {
                ContentBlock::ToolUse { id, name, .. } => {
                    self.block_kinds.insert(index, BlockKind::ToolUse);
                    let ordinal = self.next_tool_ordinal;
                    self.next_tool_ordinal += 1;
                    self.tool_ordinals.insert(index, ordinal);

                    Some(IrChunk {
                        delta: IrDelta {
                            tool_calls: vec![IrToolCallDelta {
                                index: ordinal,
                                id: Some(id),
                                name: Some(name),
                                arguments: Some(String::new()),
                            }],
                            ..Default::default()
                        },
                        ..Default::default()
                    })
                }
                ContentBlock::Thinking { .. } => {
                    self.block_kinds.insert(index, BlockKind::Thinking);
                    self.thinking_seen = true;
                    None
                }
                _ => {
                    self.block_kinds.insert(index, BlockKind::Text);
                    None
                }
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => {
                    self.text_buffer.push_str(&text);
                    Some(IrChunk {
                        delta: IrDelta {
                            content: Some(text),
                            ..Default::default()
                        },
                        ..Default::default()
                    })
                }
                BlockDelta::ThinkingDelta { thinking } => {
                    self.thinking_seen = true;
                    Some(IrChunk {
                        delta: IrDelta {
                            thinking: Some(IrThinkingDelta {
                                content: Some(thinking),
                                signature: None,
                            }),
                            ..Default::default()
                        },
                        ..Default::default()
                    })
                }
                BlockDelta::SignatureDelta { signature } => Some(IrChunk {
                    delta: IrDelta {
                        thinking: Some(IrThinkingDelta {
                            content: None,
                            signature: Some(signature),
                        }),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                BlockDelta::InputJsonDelta { partial_json } => {
                    let ordinal = self.tool_ordinals.get(&index).copied().unwrap_or(index);
                    Some(IrChunk {
                        delta: IrDelta {
                            tool_calls: vec![IrToolCallDelta {
                                index: ordinal,
                                id: None,
                                name: None,
                                arguments: Some(partial_json),
                            }],
                            ..Default::default()
                        },
                        ..Default::default()
                    })
                }
            },
            StreamEvent::ContentBlockStop { .. } => None,
            StreamEvent::MessageDelta { delta, usage } => {
                let combined_output = usage.as_ref().map(|u| u.output_tokens).unwrap_or(0);
                let (output_tokens, reasoning_tokens) = if self.thinking_seen {
                    let text_tokens = token_counter::count(&self.text_buffer);
                    (text_tokens, combined_output.saturating_sub(text_tokens))
                } else {
                    (combined_output, 0)
                };

                let input_tokens = usage.as_ref().map(|u| u.input_tokens).unwrap_or(0);
                let cached_tokens = usage.as_ref().and_then(|u| u.cache_read_input_tokens).unwrap_or(0);
                let cache_creation_tokens = usage
                    .as_ref()
                    .and_then(|u| u.cache_creation_input_tokens)
                    .unwrap_or(0);

                Some(IrChunk {
                    delta: IrDelta::default(),
                    finish_reason: delta
                        .stop_reason
                        .as_deref()
                        .map(stop_reason_to_ir)
                        .or(Some(IrFinishReason::Stop)),
                    usage: Some(IrUsage {
                        input_tokens,
                        output_tokens,
                        total_tokens: input_tokens + output_tokens + reasoning_tokens,
                        reasoning_tokens,
                        cached_tokens,
                        cache_creation_tokens,
                    }),
                    ..Default::default()
                })
            }
            StreamEvent::MessageStop | StreamEvent::Ping | StreamEvent::Unknown => None,
        }
    }
}

// ---------------------------------------------------------------------
// IR -> SSE block-lifecycle formatter (§4.2)
// ---------------------------------------------------------------------

#[derive(Default)]
struct AnthropicStreamFormatter {
    message_started: bool,
    message_id: String,
    model: String,
    next_block_index: u32,
    active: Option<(u32, ActiveKind)>,
    tool_block_index: HashMap<u32, u32>,
    pending_finish_reason: Option<IrFinishReason>,
    pending_usage: Option<IrUsage>,
    has_tool_calls: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ActiveKind {
    Text,
    Thinking,
    Tool(u32),
}

impl AnthropicStreamFormatter {
    fn apply(&mut self, chunk: IrChunk) -> Vec<u8> {
        let mut out = Vec::new();

        if !self.message_started {
            self.message_started = true;
            self.message_id = chunk.id.clone().unwrap_or_else(|| "msg_stream".to_string());
            self.model = chunk.model.clone().unwrap_or_default();

            out.extend(sse::frame_named(
                "message_start",
                &sonic_rs::to_string(&serde_json::json!({
                    "type": "message_start",
                    "message": {
                        "id": self.message_id,
                        "type": "message",
                        "role": "assistant",
                        "model": self.model,
                        "content": [],
                    }
                }))
                .unwrap_or_default(),
            ));
        }

        if let Some(thinking) = &chunk.delta.thinking {
            if let Some(content) = &thinking.content {
                out.extend(self.switch_to(ActiveKind::Thinking, || {
                    serde_json::json!({"type": "thinking", "thinking": ""})
                }));
                out.extend(self.emit_delta(serde_json::json!({"type": "thinking_delta", "thinking": content})));
            }
            if let Some(signature) = &thinking.signature {
                out.extend(self.switch_to(ActiveKind::Thinking, || {
                    serde_json::json!({"type": "thinking", "thinking": ""})
                }));
                out.extend(self.emit_delta(serde_json::json!({"type": "signature_delta", "signature": signature})));
            }
        }

        if let Some(text) = &chunk.delta.content {
            out.extend(self.switch_to(ActiveKind::Text, || serde_json::json!({"type": "text", "text": ""})));
            out.extend(self.emit_delta(serde_json::json!({"type": "text_delta", "text": text})));
        }

        for tool_delta in &chunk.delta.tool_calls {
            self.has_tool_calls = true;
            let kind = ActiveKind::Tool(tool_delta.index);

            if let (Some(id), Some(name)) = (&tool_delta.id, &tool_delta.name) {
                let id = id.clone();
                let name = name.clone();
                out.extend(self.switch_to(kind, move || {
                    serde_json::json!({"type": "tool_use", "id": id, "name": name, "input": {}})
                }));
            } else {
                out.extend(self.switch_to(kind, || {
                    serde_json::json!({"type": "tool_use", "id": "", "name": "", "input": {}})
                }));
            }

            if let Some(args) = &tool_delta.arguments {
                out.extend(self.emit_delta(serde_json::json!({"type": "input_json_delta", "partial_json": args})));
            }
        }

        if let Some(reason) = chunk.finish_reason {
            self.pending_finish_reason = Some(reason);
        }
        if let Some(usage) = chunk.usage {
            self.pending_usage = Some(usage);
        }

        out
    }

    fn switch_to(&mut self, kind: ActiveKind, seed: impl FnOnce() -> serde_json::Value) -> Vec<u8> {
        if let Some((_, active_kind)) = self.active
            && active_kind == kind
        {
            return Vec::new();
        }

        let mut out = Vec::new();
        if let Some((index, _)) = self.active.take() {
            out.extend(sse::frame_named(
                "content_block_stop",
                &sonic_rs::to_string(&serde_json::json!({"type": "content_block_stop", "index": index}))
                    .unwrap_or_default(),
            ));
        }

        let index = self.next_block_index;
        self.next_block_index += 1;
        if let ActiveKind::Tool(tool_index) = kind {
            self.tool_block_index.insert(tool_index, index);
        }
        self.active = Some((index, kind));

        out.extend(sse::frame_named(
            "content_block_start",
            &sonic_rs::to_string(&serde_json::json!({
                "type": "content_block_start",
                "index": index,
                "content_block": seed(),
            }))
            .unwrap_or_default(),
        ));

        out
    }

    fn emit_delta(&self, delta: serde_json::Value) -> Vec<u8> {
        let index = self.active.map(|(i, _)| i).unwrap_or(0);
        sse::frame_named(
            "content_block_delta",
            &sonic_rs::to_string(&serde_json::json!({
                "type": "content_block_delta",
                "index": index,
                "delta": delta,
            }))
            .unwrap_or_default(),
        )
    }

    fn flush(&mut self) -> Vec<u8> {
        let mut out = Vec::new();

        if let Some((index, _)) = self.active.take() {
            out.extend(sse::frame_named(
                "content_block_stop",
                &sonic_rs::to_string(&serde_json::json!({"type": "content_block_stop", "index": index}))
                    .unwrap_or_default(),
            ));
        }

        let usage = self.pending_usage.take().unwrap_or_default();
        let stop_reason = self
            .pending_finish_reason
            .take()
            .map(|r| finish_reason_to_stop_reason(&r, self.has_tool_calls))
            .unwrap_or_else(|| "end_turn".to_string());

        out.extend(sse::frame_named(
            "message_delta",
            &sonic_rs::to_string(&serde_json::json!({
                "type": "message_delta",
                "delta": {"stop_reason": stop_reason},
                "usage": {
                    "input_tokens": usage.input_tokens.saturating_sub(usage.cached_tokens),
                    "output_tokens": usage.output_tokens,
                    "cache_read_input_tokens": usage.cached_tokens,
                    "cache_creation_input_tokens": usage.cache_creation_tokens,
                    "thinkingTokens": usage.reasoning_tokens,
                },
            }))
            .unwrap_or_default(),
        ));

        out.extend(sse::frame_named(
            "message_stop",
            &sonic_rs::to_string(&serde_json::json!({"type": "message_stop"})).unwrap_or_default(),
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_imputation_splits_combined_output_tokens() {
        let body = serde_json::json!({
            "id": "msg_1",
            "model": "claude-x",
            "content": [
                {"type": "thinking", "thinking": "let me consider"},
                {"type": "text", "text": "Hello"},
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 7, "output_tokens": 325},
        });

        let transformer = MessagesTransformer;
        let response = transformer.transform_response(body.to_string().as_bytes()).unwrap();

        assert_eq!(response.usage.output_tokens, 2);
        assert_eq!(response.usage.reasoning_tokens, 323);
        assert_eq!(response.usage.total_tokens, 332);
    }

    #[test]
    fn malformed_tool_arguments_wrap_instead_of_fail() {
        let response = IrResponse {
            tool_calls: vec![IrToolCall {
                id: "t1".to_string(),
                name: "f".to_string(),
                arguments: "not json".to_string(),
            }],
            ..Default::default()
        };

        let transformer = MessagesTransformer;
        let wire = transformer.format_response(&response).unwrap();
        let content = &wire["content"][0];
        assert_eq!(content["type"], "tool_use");
        assert_eq!(content["input"]["raw_arguments"], "not json");
    }

    #[test]
    fn finish_reason_deferred_until_usage_arrives() {
        let mut formatter = AnthropicStreamFormatter::default();

        let first = IrChunk {
            id: Some("msg_1".into()),
            finish_reason: Some(IrFinishReason::Stop),
            ..Default::default()
        };
        let out1 = formatter.apply(first);
        assert!(!String::from_utf8_lossy(&out1).contains("message_delta"));

        let second = IrChunk {
            usage: Some(IrUsage {
                input_tokens: 10,
                output_tokens: 20,
                ..Default::default()
            }),
            ..Default::default()
        };
        let out2 = formatter.apply(second);
        assert!(!String::from_utf8_lossy(&out2).contains("message_delta"));

        let flushed = formatter.flush();
        let text = String::from_utf8_lossy(&flushed);
        assert!(text.contains("message_delta"));
        assert!(text.contains("\"output_tokens\":20"));
        assert!(text.contains("\"stop_reason\":\"end_turn\""));
    }

    #[test]
    fn every_content_block_start_has_a_matching_stop() {
        let mut formatter = AnthropicStreamFormatter::default();
        let mut out = Vec::new();

        out.extend(formatter.apply(IrChunk {
            delta: IrDelta { content: Some("Hel".to_string()), ..Default::default() },
            ..Default::default()
        }));
        out.extend(formatter.apply(IrChunk {
            delta: IrDelta {
                thinking: Some(IrThinkingDelta { content: Some("pondering".to_string()), ..Default::default() }),
                ..Default::default()
            },
            ..Default::default()
        }));
        out.extend(formatter.apply(IrChunk {
            delta: IrDelta {
                tool_calls: vec![IrToolCallDelta {
                    index: 0,
                    id: Some("t1".to_string()),
                    name: Some("lookup".to_string()),
                    arguments: Some("{}".to_string()),
                }],
                ..Default::default()
            },
            ..Default::default()
        }));
        out.extend(formatter.apply(IrChunk {
            delta: IrDelta { content: Some("lo".to_string()), ..Default::default() },
            ..Default::default()
        }));
        out.extend(formatter.flush());

        let text = String::from_utf8_lossy(&out);
        let started = block_indices(&text, "content_block_start");
        let stopped = block_indices(&text, "content_block_stop");

        assert!(!started.is_empty());
        assert_eq!(started, stopped);
    }

    fn block_indices(text: &str, event_type: &str) -> Vec<u32> {
        let needle = format!("\"type\":\"{event_type}\"");
        let mut indices: Vec<u32> = text
            .split("\n\n")
            .filter(|frame| frame.contains(&needle))
            .filter_map(|frame| {
                let pos = frame.find("\"index\":")? + "\"index\":".len();
                frame[pos..].split(|c: char| !c.is_ascii_digit()).next()?.parse().ok()
            })
            .collect();
        indices.sort_unstable();
        indices
    }
}
