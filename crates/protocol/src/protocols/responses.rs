//! OpenAI Responses transformer (§4.5) — the hardest format.
//!
//! A Responses reply is a collection of typed output items (`message`,
//! `reasoning`, `function_call`) rather than one choice. The stream
//! formatter below is the most elaborate state machine in the crate: it
//! reserves a single shared output-index space across message, reasoning,
//! and tool-call items, and defers closing every item until finalization so
//! the final `response.completed` event can list them in reserved order.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::{
    error::{GatewayError, Result},
    ir::*,
    stream::sse,
    transformer::{ApiFormat, BuiltRequest, ByteStream, ChunkStream, Transformer},
};

pub const FORMAT: ApiFormat = ApiFormat::Responses;

// ---------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: InputField,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub tools: Vec<ResponsesToolIn>,
    #[serde(default)]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub reasoning: Option<ReasoningIn>,
    #[serde(default)]
    pub text: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ReasoningIn {
    #[serde(default)]
    pub effort: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InputField {
    Text(String),
    Items(Vec<InputItem>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message {
        #[serde(default = "default_role")]
        role: String,
        content: MessageContent,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: serde_json::Value,
    },
    Reasoning {
        #[serde(default)]
        summary: Vec<SummaryPartIn>,
    },
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<MessageContentPart>),
}

#[derive(Debug, Deserialize)]
pub struct MessageContentPart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryPartIn {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ResponsesToolIn {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub r#type: Option<String>,
}

// ---------------------------------------------------------------------
// Unary response wire shape
// ---------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Reasoning {
        id: String,
        summary: Vec<SummaryPartOut>,
    },
    FunctionCall {
        id: String,
        call_id: String,
        name: String,
        arguments: String,
        status: String,
    },
    Message {
        id: String,
        role: String,
        content: Vec<MessageContentOut>,
        status: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryPartOut {
    pub r#type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContentOut {
    pub r#type: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct UnaryResponse {
    id: String,
    model: String,
    #[serde(default)]
    output: Vec<OutputItem>,
    usage: ResponsesUsage,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
struct ResponsesUsage {
    input_tokens: u64,
    #[serde(default)]
    input_tokens_details: InputTokensDetails,
    output_tokens: u64,
    #[serde(default)]
    output_tokens_details: OutputTokensDetails,
    total_tokens: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct InputTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OutputTokensDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

fn parse_message_content(content: MessageContent) -> String {
    match content {
        MessageContent::Text(s) => s,
        MessageContent::Parts(parts) => parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""),
    }
}

fn role_from_wire(role: &str) -> IrRole {
    match role {
        "developer" | "system" => IrRole::System,
        "assistant" => IrRole::Assistant,
        "tool" => IrRole::Tool,
        _ => IrRole::User,
    }
}

fn response_format_from_text_config(text: serde_json::Value) -> Option<IrResponseFormat> {
    let format = text.get("format")?;
    match format.get("type").and_then(|t| t.as_str())? {
        "text" => Some(IrResponseFormat::Text),
        "json_object" => Some(IrResponseFormat::JsonObject),
        "json_schema" => Some(IrResponseFormat::JsonSchema {
            schema: format.get("schema").cloned().unwrap_or(serde_json::Value::Null),
        }),
        _ => None,
    }
}

fn response_format_to_text_config(format: &IrResponseFormat) -> serde_json::Value {
    let format = match format {
        IrResponseFormat::Text => serde_json::json!({"type": "text"}),
        IrResponseFormat::JsonObject => serde_json::json!({"type": "json_object"}),
        IrResponseFormat::JsonSchema { schema } => serde_json::json!({
            "type": "json_schema",
            "name": "response",
            "schema": schema,
        }),
    };
    serde_json::json!({"format": format})
}

pub struct ResponsesTransformer;

#[async_trait]
impl Transformer for ResponsesTransformer {
    fn parse_request(&self, raw: &[u8]) -> Result<IrRequest> {
        let req: ResponsesRequest =
            sonic_rs::from_slice(raw).map_err(|e| GatewayError::MalformedRequest(e.to_string()))?;

        let mut messages = Vec::new();

        if let Some(instructions) = req.instructions
            && !instructions.is_empty()
        {
            messages.push(IrMessage::system(instructions));
        }

        let items = match req.input {
            InputField::Text(text) => vec![InputItem::Message {
                role: "user".to_string(),
                content: MessageContent::Text(text),
            }],
            InputField::Items(items) => items,
        };

        for item in items {
            match item {
                InputItem::Message { role, content } => {
                    messages.push(IrMessage {
                        role: role_from_wire(&role),
                        content: IrContent::Text(parse_message_content(content)),
                        thinking: None,
                        tool_calls: Vec::new(),
                        tool_call_id: None,
                        tool_name: None,
                    });
                }
                InputItem::FunctionCall { call_id, name, arguments } => {
                    messages.push(IrMessage {
                        role: IrRole::Assistant,
                        content: IrContent::Null,
                        thinking: None,
                        tool_calls: vec![IrToolCall {
                            id: call_id,
                            name,
                            arguments,
                        }],
                        tool_call_id: None,
                        tool_name: None,
                    });
                }
                InputItem::FunctionCallOutput { call_id, output } => {
                    let text = match output {
                        serde_json::Value::String(s) => s,
                        other => sonic_rs::to_string(&other).unwrap_or_default(),
                    };
                    messages.push(IrMessage::tool_result(call_id, IrContent::Text(text)));
                }
                InputItem::Reasoning { summary } => {
                    let text = summary.into_iter().map(|s| s.text).collect::<Vec<_>>().join("\n");
                    if !text.is_empty() {
                        messages.push(IrMessage::assistant(text));
                    }
                }
            }
        }

        let tools = req
            .tools
            .into_iter()
            .filter(|t| t.r#type.as_deref().unwrap_or("function") == "function")
            .map(|t| IrToolDef {
                name: t.name,
                description: t.description,
                parameters: t.parameters,
                strict: None,
            })
            .collect();

        let tool_choice = req.tool_choice.and_then(|v| match v {
            serde_json::Value::String(s) if s == "auto" => Some(IrToolChoice::Auto),
            serde_json::Value::String(s) if s == "none" => Some(IrToolChoice::None),
            serde_json::Value::String(s) if s == "required" => Some(IrToolChoice::Required),
            serde_json::Value::Object(obj) => obj
                .get("name")
                .and_then(|n| n.as_str())
                .map(|n| IrToolChoice::Named(n.to_string())),
            _ => None,
        });

        let reasoning = req.reasoning.map(|r| IrReasoning {
            effort: match r.effort.as_deref() {
                Some("low") => Some(IrReasoningEffort::Low),
                Some("medium") => Some(IrReasoningEffort::Medium),
                Some("high") => Some(IrReasoningEffort::High),
                _ => None,
            },
            max_tokens: None,
            enabled: true,
        });

        Ok(IrRequest {
            model: req.model,
            messages,
            tools,
            tool_choice,
            response_format: req.text.and_then(response_format_from_text_config),
            reasoning,
            max_tokens: req.max_output_tokens,
            temperature: req.temperature,
            stream: req.stream.unwrap_or(false),
            request_id: None,
            metadata: Default::default(),
        })
    }

    fn build_request(&self, request: &IrRequest) -> Result<BuiltRequest> {
        let mut instructions = None;
        let mut input = Vec::new();

        for message in &request.messages {
            if message.role == IrRole::System {
                let text = instructions.get_or_insert_with(String::new);
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&message.content.as_text());
                continue;
            }

            if message.role == IrRole::Tool {
                input.push(serde_json::json!({
                    "type": "function_call_output",
                    "call_id": message.tool_call_id.clone().unwrap_or_default(),
                    "output": message.content.as_text(),
                }));
                continue;
            }

            if let Some(thinking) = &message.thinking {
                input.push(serde_json::json!({
                    "type": "reasoning",
                    "summary": [{"type": "summary_text", "text": thinking.content}],
                }));
            }

            for tool_call in &message.tool_calls {
                input.push(serde_json::json!({
                    "type": "function_call",
                    "call_id": tool_call.id,
                    "name": tool_call.name,
                    "arguments": tool_call.arguments,
                }));
            }

            let text = message.content.as_text();
            if !text.is_empty() {
                let role = if message.role == IrRole::Assistant { "assistant" } else { "user" };
                input.push(serde_json::json!({
                    "type": "message",
                    "role": role,
                    "content": text,
                }));
            }
        }

        let tools: Vec<_> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();

        let body = serde_json::json!({
            "model": request.model,
            "input": input,
            "instructions": instructions,
            "tools": tools,
            "max_output_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": request.stream,
            "reasoning": request.reasoning.as_ref().map(|r| serde_json::json!({
                "effort": r.effort,
            })),
            "text": request.response_format.as_ref().map(response_format_to_text_config),
        });

        Ok(BuiltRequest {
            path: "/v1/responses".to_string(),
            body,
        })
    }

    fn transform_response(&self, body: &[u8]) -> Result<IrResponse> {
        let resp: UnaryResponse =
            sonic_rs::from_slice(body).map_err(|e| GatewayError::UpstreamProtocolViolation(e.to_string()))?;

        let mut content = String::new();
        let mut thinking_text = String::new();
        let mut tool_calls = Vec::new();

        for item in resp.output {
            match item {
                OutputItem::Message { content: parts, .. } => {
                    for part in parts {
                        content.push_str(&part.text);
                    }
                }
                OutputItem::Reasoning { summary, .. } => {
                    for part in summary {
                        thinking_text.push_str(&part.text);
                    }
                }
                OutputItem::FunctionCall { call_id, name, arguments, .. } => {
                    tool_calls.push(IrToolCall {
                        id: call_id,
                        name,
                        arguments,
                    });
                }
            }
        }

        let cached = resp.usage.input_tokens_details.cached_tokens;
        let reasoning_tokens = resp.usage.output_tokens_details.reasoning_tokens;
        let input_tokens = resp.usage.input_tokens.saturating_sub(cached);
        let output_tokens = resp.usage.output_tokens.saturating_sub(reasoning_tokens);

        let finish_reason = Some(if tool_calls.is_empty() {
            IrFinishReason::Stop
        } else {
            IrFinishReason::ToolCalls
        });

        Ok(IrResponse {
            id: Some(resp.id),
            model: Some(resp.model),
            created: None,
            content: (!content.is_empty()).then_some(content),
            reasoning_content: (!thinking_text.is_empty()).then_some(thinking_text.clone()),
            thinking: (!thinking_text.is_empty()).then(|| IrThinking {
                content: thinking_text,
                signature: None,
            }),
            tool_calls,
            finish_reason,
            citations: Vec::new(),
            usage: IrUsage {
                input_tokens,
                output_tokens,
                total_tokens: resp.usage.total_tokens,
                reasoning_tokens,
                cached_tokens: cached,
                cache_creation_tokens: 0,
            },
            bypass: false,
            raw_response: None,
        })
    }

    fn format_response(&self, response: &IrResponse) -> Result<serde_json::Value> {
        let mut output = Vec::new();

        if let Some(thinking) = &response.thinking {
            output.push(OutputItem::Reasoning {
                id: format!("rs_{}", uuid::Uuid::new_v4()),
                summary: vec![SummaryPartOut {
                    r#type: "summary_text".to_string(),
                    text: thinking.content.clone(),
                }],
            });
        }

        for tool_call in &response.tool_calls {
            output.push(OutputItem::FunctionCall {
                id: format!("fc_{}", uuid::Uuid::new_v4()),
                call_id: tool_call.id.clone(),
                name: tool_call.name.clone(),
                arguments: tool_call.arguments.clone(),
                status: "completed".to_string(),
            });
        }

        output.push(OutputItem::Message {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            role: "assistant".to_string(),
            content: vec![MessageContentOut {
                r#type: "output_text".to_string(),
                text: response.content.clone().unwrap_or_default(),
            }],
            status: "completed".to_string(),
        });

        let out = serde_json::json!({
            "id": response.id.clone().unwrap_or_default(),
            "object": "response",
            "model": response.model.clone().unwrap_or_default(),
            "status": "completed",
            "output": output,
            "usage": {
                "input_tokens": response.usage.input_tokens + response.usage.cached_tokens,
                "input_tokens_details": {"cached_tokens": response.usage.cached_tokens},
                "output_tokens": response.usage.output_tokens + response.usage.reasoning_tokens,
                "output_tokens_details": {"reasoning_tokens": response.usage.reasoning_tokens},
                "total_tokens": response.usage.total_tokens,
            },
        });

        Ok(out)
    }

    fn transform_stream(&self, upstream: ByteStream) -> ChunkStream {
        let events = Box::pin(sse::parse(upstream));

        let chunks = futures::stream::unfold(events, |mut events| async move {
            loop {
                let event = events.next().await?;

                let value: serde_json::Value = match sonic_rs::from_str(&event.data) {
                    Ok(v) => v,
                    Err(e) => {
                        log::warn!("failed to parse Responses stream event: {e}");
                        continue;
                    }
                };

                let event_type = value.get("type").and_then(|t| t.as_str()).unwrap_or_default();

                let chunk = match event_type {
                    "response.created" => {
                        let response = value.get("response").cloned().unwrap_or_default();
                        IrChunk {
                            id: response.get("id").and_then(|v| v.as_str()).map(str::to_string),
                            model: response.get("model").and_then(|v| v.as_str()).map(str::to_string),
                            delta: IrDelta {
                                role: Some(IrRole::Assistant),
                                ..Default::default()
                            },
                            ..Default::default()
                        }
                    }
                    "response.output_text.delta" => IrChunk {
                        delta: IrDelta {
                            content: value.get("delta").and_then(|v| v.as_str()).map(str::to_string),
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                    "response.output_item.added" => {
                        let item = value.get("item").cloned().unwrap_or_default();
                        if item.get("type").and_then(|t| t.as_str()) == Some("function_call") {
                            IrChunk {
                                delta: IrDelta {
                                    tool_calls: vec![IrToolCallDelta {
                                        index: value.get("output_index").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                                        id: item.get("call_id").and_then(|v| v.as_str()).map(str::to_string),
                                        name: item.get("name").and_then(|v| v.as_str()).map(str::to_string),
                                        arguments: Some(String::new()),
                                    }],
                                    ..Default::default()
                                },
                                ..Default::default()
                            }
                        } else {
                            continue;
                        }
                    }
                    "response.function_call_arguments.delta" => IrChunk {
                        delta: IrDelta {
                            tool_calls: vec![IrToolCallDelta {
                                index: value.get("output_index").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                                id: None,
                                name: None,
                                arguments: value.get("delta").and_then(|v| v.as_str()).map(str::to_string),
                            }],
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                    "response.completed" => {
                        let response = value.get("response").cloned().unwrap_or_default();
                        let usage = response.get("usage").cloned().unwrap_or_default();
                        let cached = usage
                            .get("input_tokens_details")
                            .and_then(|d| d.get("cached_tokens"))
                            .and_then(|v| v.as_u64())
                            .unwrap_or(0);
                        let reasoning_tokens = usage
                            .get("output_tokens_details")
                            .and_then(|d| d.get("reasoning_tokens"))
                            .and_then(|v| v.as_u64())
                            .unwrap_or(0);
                        let wire_input = usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
                        let wire_output = usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
                        let total = usage.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0);

                        IrChunk {
                            finish_reason: Some(IrFinishReason::Stop),
                            usage: Some(IrUsage {
                                input_tokens: wire_input.saturating_sub(cached),
                                output_tokens: wire_output.saturating_sub(reasoning_tokens),
                                total_tokens: total,
                                reasoning_tokens,
                                cached_tokens: cached,
                                cache_creation_tokens: 0,
                            }),
                            ..Default::default()
                        }
                    }
                    _ => continue,
                };

                return Some((Ok(chunk), events));
            }
        });

        Box::pin(chunks)
    }

    fn format_stream(&self, chunks: ChunkStream) -> ByteStream {
        let bytes_stream = futures::stream::unfold(
            (chunks, ResponsesStreamFormatter::default(), false),
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
                        let bytes = formatter.emit("error", serde_json::json!({"error": e.to_string()}));
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
        let value: serde_json::Value = sonic_rs::from_slice(data).ok()?;
        if value.get("type").and_then(|t| t.as_str()) != Some("response.completed") {
            return None;
        }
        let usage = value.get("response")?.get("usage")?;
        let cached = usage
            .get("input_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let reasoning_tokens = usage
            .get("output_tokens_details")
            .and_then(|d| d.get("reasoning_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let wire_input = usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        let wire_output = usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        let total = usage.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        Some(IrUsage {
            input_tokens: wire_input.saturating_sub(cached),
            output_tokens: wire_output.saturating_sub(reasoning_tokens),
            total_tokens: total,
            reasoning_tokens,
            cached_tokens: cached,
            cache_creation_tokens: 0,
        })
    }
}

/// Normalizes an accumulating tool-argument string against a new fragment
/// (§4.5 step 6): a syntactically complete JSON object replaces the
/// accumulator outright (some providers emit the full string each time);
/// otherwise the fragment is appended.
fn normalize_tool_args(previous: &str, delta: &str) -> String {
    let trimmed = delta.trim();
    if !trimmed.is_empty() && sonic_rs::from_str::<serde_json::Value>(trimmed).is_ok_and(|v| v.is_object()) {
        delta.to_string()
    } else {
        format!("{previous}{delta}")
    }
}

// ---------------------------------------------------------------------
// IR -> Responses SSE state machine
// ---------------------------------------------------------------------

struct MessageState {
    output_index: u32,
    item_id: String,
    text: String,
    part_added: bool,
}

struct ReasoningState {
    output_index: u32,
    item_id: String,
    text: String,
}

struct ToolState {
    output_index: u32,
    call_id: String,
    item_id: String,
    name: Option<String>,
    accumulated_args: String,
}

#[derive(Default)]
struct ResponsesStreamFormatter {
    has_sent_created: bool,
    sequence_number: u64,
    next_output_index: u32,
    response_id: String,
    model: String,
    message: Option<MessageState>,
    reasoning: Option<ReasoningState>,
    tools: HashMap<u32, ToolState>,
    tool_order: Vec<u32>,
    pending_finish_reason: Option<IrFinishReason>,
    pending_usage: Option<IrUsage>,
}

impl ResponsesStreamFormatter {
    fn reserve_output_index(&mut self) -> u32 {
        let index = self.next_output_index;
        self.next_output_index += 1;
        index
    }

    fn emit(&mut self, event_type: &str, mut payload: serde_json::Value) -> Vec<u8> {
        if let serde_json::Value::Object(map) = &mut payload {
            map.insert("type".to_string(), serde_json::json!(event_type));
            map.insert("sequence_number".to_string(), serde_json::json!(self.sequence_number));
        }
        self.sequence_number += 1;
        sse::frame_named(event_type, &sonic_rs::to_string(&payload).unwrap_or_default())
    }

    fn apply(&mut self, chunk: IrChunk) -> Vec<u8> {
        let mut out = Vec::new();

        if !self.has_sent_created {
            self.has_sent_created = true;
            self.response_id = chunk.id.clone().unwrap_or_else(|| format!("resp_{}", uuid::Uuid::new_v4()));
            self.model = chunk.model.clone().unwrap_or_default();

            out.extend(self.emit(
                "response.created",
                serde_json::json!({"response": {"id": self.response_id, "model": self.model, "status": "in_progress"}}),
            ));
            out.extend(self.emit(
                "response.in_progress",
                serde_json::json!({"response": {"id": self.response_id, "status": "in_progress"}}),
            ));
        }

        if let Some(thinking) = &chunk.delta.thinking
            && let Some(content) = &thinking.content
        {
            if self.reasoning.is_none() {
                let output_index = self.reserve_output_index();
                let item_id = format!("rs_{}", uuid::Uuid::new_v4());
                out.extend(self.emit(
                    "response.output_item.added",
                    serde_json::json!({"output_index": output_index, "item": {"id": item_id, "type": "reasoning", "summary": []}}),
                ));
                self.reasoning = Some(ReasoningState {
                    output_index,
                    item_id,
                    text: String::new(),
                });
            }
            if let Some(state) = &mut self.reasoning {
                state.text.push_str(content);
            }
        }

        if let Some(text) = &chunk.delta.content {
            if self.message.is_none() {
                let output_index = self.reserve_output_index();
                let item_id = format!("msg_{}", uuid::Uuid::new_v4());
                out.extend(self.emit(
                    "response.output_item.added",
                    serde_json::json!({"output_index": output_index, "item": {"id": item_id, "type": "message", "role": "assistant", "content": []}}),
                ));
                self.message = Some(MessageState {
                    output_index,
                    item_id,
                    text: String::new(),
                    part_added: false,
                });
            }

            if let Some(mut state) = self.message.take() {
                if !state.part_added {
                    out.extend(self.emit(
                        "response.content_part.added",
                        serde_json::json!({"item_id": state.item_id, "output_index": state.output_index, "content_index": 0, "part": {"type": "output_text", "text": ""}}),
                    ));
                    state.part_added = true;
                }
                out.extend(self.emit(
                    "response.output_text.delta",
                    serde_json::json!({"item_id": state.item_id, "output_index": state.output_index, "content_index": 0, "delta": text}),
                ));
                state.text.push_str(text);
                self.message = Some(state);
            }
        }

        for tool_delta in &chunk.delta.tool_calls {
            if !self.tools.contains_key(&tool_delta.index) {
                let output_index = self.reserve_output_index();
                let item_id = format!("fc_{}", uuid::Uuid::new_v4());
                let call_id = tool_delta.id.clone().unwrap_or_default();
                out.extend(self.emit(
                    "response.output_item.added",
                    serde_json::json!({"output_index": output_index, "item": {"id": item_id, "type": "function_call", "call_id": call_id, "name": tool_delta.name}}),
                ));
                self.tools.insert(
                    tool_delta.index,
                    ToolState {
                        output_index,
                        call_id,
                        item_id,
                        name: tool_delta.name.clone(),
                        accumulated_args: String::new(),
                    },
                );
                self.tool_order.push(tool_delta.index);
            }

            if let Some(args) = &tool_delta.arguments {
                let found = self.tools.get(&tool_delta.index).map(|state| (state.output_index, state.item_id.clone()));
                if let Some((output_index, item_id)) = found {
                    out.extend(self.emit(
                        "response.function_call_arguments.delta",
                        serde_json::json!({"item_id": item_id, "output_index": output_index, "delta": args}),
                    ));
                    if let Some(state) = self.tools.get_mut(&tool_delta.index) {
                        state.accumulated_args = normalize_tool_args(&state.accumulated_args, args);
                    }
                }
            }

            if let Some(name) = &tool_delta.name
                && let Some(state) = self.tools.get_mut(&tool_delta.index)
                && state.name.is_none()
            {
                state.name = Some(name.clone());
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

    fn flush(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut finished: Vec<(u32, OutputItem)> = Vec::new();

        if let Some(state) = self.reasoning.take() {
            out.extend(self.emit(
                "response.output_item.done",
                serde_json::json!({"output_index": state.output_index, "item": {"id": state.item_id, "type": "reasoning", "summary": [{"type": "summary_text", "text": state.text}]}}),
            ));
            finished.push((
                state.output_index,
                OutputItem::Reasoning {
                    id: state.item_id,
                    summary: vec![SummaryPartOut {
                        r#type: "summary_text".to_string(),
                        text: state.text,
                    }],
                },
            ));
        }

        if let Some(state) = self.message.take() {
            out.extend(self.emit(
                "response.output_text.done",
                serde_json::json!({"item_id": state.item_id, "output_index": state.output_index, "content_index": 0, "text": state.text}),
            ));
            out.extend(self.emit(
                "response.content_part.done",
                serde_json::json!({"item_id": state.item_id, "output_index": state.output_index, "content_index": 0, "part": {"type": "output_text", "text": state.text}}),
            ));
            out.extend(self.emit(
                "response.output_item.done",
                serde_json::json!({"output_index": state.output_index, "item": {"id": state.item_id, "type": "message", "role": "assistant", "content": [{"type": "output_text", "text": state.text}]}}),
            ));
            finished.push((
                state.output_index,
                OutputItem::Message {
                    id: state.item_id,
                    role: "assistant".to_string(),
                    content: vec![MessageContentOut {
                        r#type: "output_text".to_string(),
                        text: state.text,
                    }],
                    status: "completed".to_string(),
                },
            ));
        }

        for index in self.tool_order.drain(..).collect::<Vec<_>>() {
            let Some(state) = self.tools.remove(&index) else { continue };
            out.extend(self.emit(
                "response.output_item.done",
                serde_json::json!({"output_index": state.output_index, "item": {"id": state.item_id, "type": "function_call", "call_id": state.call_id, "name": state.name, "arguments": state.accumulated_args}}),
            ));
            finished.push((
                state.output_index,
                OutputItem::FunctionCall {
                    id: state.item_id,
                    call_id: state.call_id,
                    name: state.name.unwrap_or_default(),
                    arguments: state.accumulated_args,
                    status: "completed".to_string(),
                },
            ));
        }

        finished.sort_by_key(|(index, _)| *index);
        let output: Vec<&OutputItem> = finished.iter().map(|(_, item)| item).collect();

        let usage = self.pending_usage.take().unwrap_or_default();
        let _ = self.pending_finish_reason.take();

        out.extend(self.emit(
            "response.completed",
            serde_json::json!({
                "response": {
                    "id": self.response_id,
                    "model": self.model,
                    "status": "completed",
                    "output": output,
                    "usage": {
                        "input_tokens": usage.input_tokens + usage.cached_tokens,
                        "input_tokens_details": {"cached_tokens": usage.cached_tokens},
                        "output_tokens": usage.output_tokens + usage.reasoning_tokens,
                        "output_tokens_details": {"reasoning_tokens": usage.reasoning_tokens},
                        "total_tokens": usage.total_tokens,
                    },
                }
            }),
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_is_denormalized_into_combined_wire_totals() {
        let response = IrResponse {
            content: Some("done".to_string()),
            usage: IrUsage {
                input_tokens: 2571,
                output_tokens: 416,
                cached_tokens: 14976,
                reasoning_tokens: 0,
                total_tokens: 17963,
                cache_creation_tokens: 0,
            },
            ..Default::default()
        };

        let wire = ResponsesTransformer.format_response(&response).unwrap();
        assert_eq!(wire["usage"]["input_tokens"], 17547);
        assert_eq!(wire["usage"]["input_tokens_details"]["cached_tokens"], 14976);
        assert_eq!(wire["usage"]["output_tokens"], 416);
        assert_eq!(wire["usage"]["total_tokens"], 17963);
    }

    #[test]
    fn normalize_tool_args_replaces_on_complete_json() {
        assert_eq!(normalize_tool_args("{\"q\":\"x", "\"}"), "{\"q\":\"x\"}");
        assert_eq!(normalize_tool_args("", "{\"q\": 1}"), "{\"q\": 1}");
    }

    #[test]
    fn sequence_numbers_have_no_gaps() {
        let mut formatter = ResponsesStreamFormatter::default();

        let mut seen = Vec::new();
        let chunk1 = IrChunk {
            id: Some("resp_1".into()),
            delta: IrDelta {
                tool_calls: vec![IrToolCallDelta {
                    index: 0,
                    id: Some("call_a".into()),
                    name: Some("lookup".into()),
                    arguments: Some(String::new()),
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        collect_sequence_numbers(&formatter.apply(chunk1), &mut seen);

        let chunk2 = IrChunk {
            delta: IrDelta {
                tool_calls: vec![IrToolCallDelta {
                    index: 0,
                    id: None,
                    name: None,
                    arguments: Some("{\"q\":\"x".into()),
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        collect_sequence_numbers(&formatter.apply(chunk2), &mut seen);

        let chunk3 = IrChunk {
            delta: IrDelta {
                tool_calls: vec![IrToolCallDelta {
                    index: 0,
                    id: None,
                    name: None,
                    arguments: Some("\"}".into()),
                }],
                ..Default::default()
            },
            finish_reason: Some(IrFinishReason::ToolCalls),
            ..Default::default()
        };
        collect_sequence_numbers(&formatter.apply(chunk3), &mut seen);
        collect_sequence_numbers(&formatter.flush(), &mut seen);

        for (i, n) in seen.iter().enumerate() {
            assert_eq!(*n, i as u64);
        }
    }

    fn collect_sequence_numbers(bytes: &[u8], out: &mut Vec<u64>) {
        let text = String::from_utf8_lossy(bytes);
        for line in text.lines() {
            let Some(data) = line.strip_prefix("data: ") else { continue };
            let value: serde_json::Value = sonic_rs::from_str(data).unwrap();
            out.push(value["sequence_number"].as_u64().unwrap());
        }
    }

    #[test]
    fn out_of_order_tool_argument_fragments_reassemble_in_order() {
        let mut formatter = ResponsesStreamFormatter::default();
        let mut events = Vec::new();

        for chunk in [
            IrChunk {
                id: Some("resp_1".into()),
                delta: IrDelta {
                    tool_calls: vec![IrToolCallDelta {
                        index: 0,
                        id: Some("call_a".into()),
                        name: Some("lookup".into()),
                        arguments: Some(String::new()),
                    }],
                    ..Default::default()
                },
                ..Default::default()
            },
            IrChunk {
                delta: IrDelta {
                    tool_calls: vec![IrToolCallDelta {
                        index: 0,
                        id: None,
                        name: None,
                        arguments: Some("{\"q\":\"x".into()),
                    }],
                    ..Default::default()
                },
                ..Default::default()
            },
            IrChunk {
                delta: IrDelta {
                    tool_calls: vec![IrToolCallDelta {
                        index: 0,
                        id: None,
                        name: None,
                        arguments: Some("\"}".into()),
                    }],
                    ..Default::default()
                },
                finish_reason: Some(IrFinishReason::ToolCalls),
                ..Default::default()
            },
        ] {
            events.push(String::from_utf8(formatter.apply(chunk)).unwrap());
        }
        events.push(String::from_utf8(formatter.flush()).unwrap());

        let delta_events: Vec<&str> = events
            .iter()
            .filter(|e| e.contains("function_call_arguments.delta"))
            .map(String::as_str)
            .collect();
        assert_eq!(delta_events.len(), 2);

        let completed = events.last().unwrap();
        let line = completed.lines().find(|l| l.starts_with("data: ")).unwrap();
        let value: serde_json::Value = sonic_rs::from_str(line.strip_prefix("data: ").unwrap()).unwrap();
        let output = &value["response"]["output"];
        assert_eq!(output.as_array().unwrap().len(), 1);
        assert_eq!(output[0]["type"], "function_call");
        assert_eq!(output[0]["call_id"], "call_a");
        assert_eq!(output[0]["arguments"], "{\"q\":\"x\"}");
    }
}
