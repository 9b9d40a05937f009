//! OpenAI Chat Completions transformer (§4.4).
//!
//! Closest format to the IR; parse and build are mostly field-for-field
//! copies. The only non-trivial work is the usage split that subtracts
//! reasoning tokens out of `completion_tokens`.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::{
    error::{GatewayError, Result},
    ir::*,
    stream::sse,
    transformer::{ApiFormat, BuiltRequest, ByteStream, ChunkStream, Transformer},
};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(default)]
    pub r#type: String,
    pub function: ChatFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTool {
    pub r#type: String,
    pub function: ChatFunctionDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFunctionDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ChatTool>,
    #[serde(default)]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(default)]
    pub response_format: Option<serde_json::Value>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
}

fn chat_completion_object() -> &'static str {
    "chat.completion"
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    #[serde(skip_deserializing, default = "chat_completion_object")]
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: ChatUsage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<ChatPromptTokensDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens_details: Option<ChatCompletionTokensDetails>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ChatPromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ChatCompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatStreamFrame {
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatStreamDelta {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatStreamToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChatStreamFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatStreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

fn role_to_wire(role: IrRole) -> &'static str {
    match role {
        IrRole::System => "system",
        IrRole::User => "user",
        IrRole::Assistant => "assistant",
        IrRole::Tool => "tool",
    }
}

fn role_from_wire(role: &str) -> IrRole {
    match role {
        "system" | "developer" => IrRole::System,
        "assistant" => IrRole::Assistant,
        "tool" => IrRole::Tool,
        _ => IrRole::User,
    }
}

fn response_format_from_wire(value: serde_json::Value) -> Option<IrResponseFormat> {
    match value.get("type").and_then(|t| t.as_str())? {
        "text" => Some(IrResponseFormat::Text),
        "json_object" => Some(IrResponseFormat::JsonObject),
        "json_schema" => Some(IrResponseFormat::JsonSchema {
            schema: value.get("json_schema").and_then(|s| s.get("schema")).cloned().unwrap_or(serde_json::Value::Null),
        }),
        _ => None,
    }
}

fn response_format_to_wire(format: &IrResponseFormat) -> serde_json::Value {
    match format {
        IrResponseFormat::Text => serde_json::json!({"type": "text"}),
        IrResponseFormat::JsonObject => serde_json::json!({"type": "json_object"}),
        IrResponseFormat::JsonSchema { schema } => serde_json::json!({
            "type": "json_schema",
            "json_schema": {"schema": schema},
        }),
    }
}

fn finish_reason_to_wire(reason: &IrFinishReason) -> String {
    match reason {
        IrFinishReason::Stop => "stop".to_string(),
        IrFinishReason::Length => "length".to_string(),
        IrFinishReason::ToolCalls => "tool_calls".to_string(),
        IrFinishReason::ContentFilter => "content_filter".to_string(),
        IrFinishReason::Other(s) => s.clone(),
    }
}

fn finish_reason_from_wire(reason: &str) -> IrFinishReason {
    match reason {
        "stop" => IrFinishReason::Stop,
        "length" => IrFinishReason::Length,
        "tool_calls" => IrFinishReason::ToolCalls,
        "content_filter" => IrFinishReason::ContentFilter,
        other => IrFinishReason::Other(other.to_string()),
    }
}

pub struct ChatTransformer;

#[async_trait]
impl Transformer for ChatTransformer {
    fn parse_request(&self, raw: &[u8]) -> Result<IrRequest> {
        let req: ChatCompletionRequest =
            sonic_rs::from_slice(raw).map_err(|e| GatewayError::MalformedRequest(e.to_string()))?;

        let messages = req
            .messages
            .into_iter()
            .map(|m| IrMessage {
                role: role_from_wire(&m.role),
                content: m.content.map(IrContent::Text).unwrap_or(IrContent::Null),
                thinking: None,
                tool_calls: m
                    .tool_calls
                    .into_iter()
                    .map(|tc| IrToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        arguments: tc.function.arguments,
                    })
                    .collect(),
                tool_call_id: m.tool_call_id,
                tool_name: None,
            })
            .collect();

        let tools = req
            .tools
            .into_iter()
            .map(|t| IrToolDef {
                name: t.function.name,
                description: t.function.description,
                parameters: t.function.parameters,
                strict: t.function.strict,
            })
            .collect();

        let tool_choice = req.tool_choice.and_then(|v| match v {
            serde_json::Value::String(s) if s == "auto" => Some(IrToolChoice::Auto),
            serde_json::Value::String(s) if s == "none" => Some(IrToolChoice::None),
            serde_json::Value::String(s) if s == "required" => Some(IrToolChoice::Required),
            serde_json::Value::Object(obj) => obj
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|n| n.as_str())
                .map(|n| IrToolChoice::Named(n.to_string())),
            _ => None,
        });

        let response_format = req.response_format.and_then(response_format_from_wire);

        let reasoning = req.reasoning_effort.map(|effort| IrReasoning {
            effort: match effort.as_str() {
                "low" => Some(IrReasoningEffort::Low),
                "medium" => Some(IrReasoningEffort::Medium),
                "high" => Some(IrReasoningEffort::High),
                _ => Some(IrReasoningEffort::None),
            },
            max_tokens: None,
            enabled: true,
        });

        Ok(IrRequest {
            model: req.model,
            messages,
            tools,
            tool_choice,
            response_format,
            reasoning,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            stream: req.stream.unwrap_or(false),
            request_id: None,
            metadata: Default::default(),
        })
    }

    fn build_request(&self, request: &IrRequest) -> Result<BuiltRequest> {
        let messages: Vec<ChatMessage> = request
            .messages
            .iter()
            .map(|m| ChatMessage {
                role: role_to_wire(m.role).to_string(),
                content: (!m.content.is_empty() || m.tool_calls.is_empty()).then(|| m.content.as_text()),
                reasoning_content: m.thinking.as_ref().map(|t| t.content.clone()),
                tool_calls: m
                    .tool_calls
                    .iter()
                    .map(|tc| ChatToolCall {
                        id: tc.id.clone(),
                        r#type: "function".to_string(),
                        function: ChatFunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect();

        let body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": request.stream,
            "response_format": request.response_format.as_ref().map(response_format_to_wire),
        });

        Ok(BuiltRequest {
            path: "/v1/chat/completions".to_string(),
            body,
        })
    }

    fn transform_response(&self, body: &[u8]) -> Result<IrResponse> {
        let resp: ChatCompletionResponse =
            sonic_rs::from_slice(body).map_err(|e| GatewayError::UpstreamProtocolViolation(e.to_string()))?;

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::UpstreamProtocolViolation("no choices in response".to_string()))?;

        let cached = resp
            .usage
            .prompt_tokens_details
            .as_ref()
            .map(|d| d.cached_tokens)
            .unwrap_or(0);
        let reasoning = resp
            .usage
            .completion_tokens_details
            .as_ref()
            .map(|d| d.reasoning_tokens)
            .unwrap_or(0);
        let input_tokens = resp.usage.prompt_tokens.saturating_sub(cached);
        let output_tokens = resp.usage.completion_tokens.saturating_sub(reasoning);

        Ok(IrResponse {
            id: Some(resp.id),
            model: Some(resp.model),
            created: Some(resp.created),
            content: choice.message.content,
            reasoning_content: choice.message.reasoning_content,
            thinking: None,
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(|tc| IrToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                })
                .collect(),
            finish_reason: choice.finish_reason.as_deref().map(finish_reason_from_wire),
            citations: Vec::new(),
            usage: IrUsage {
                input_tokens,
                output_tokens,
                total_tokens: input_tokens + cached + output_tokens + reasoning,
                reasoning_tokens: reasoning,
                cached_tokens: cached,
                cache_creation_tokens: 0,
            },
            bypass: false,
            raw_response: None,
        })
    }

    fn format_response(&self, response: &IrResponse) -> Result<serde_json::Value> {
        let message = ChatMessage {
            role: "assistant".to_string(),
            content: response.content.clone(),
            reasoning_content: response.reasoning_content.clone(),
            tool_calls: response
                .tool_calls
                .iter()
                .map(|tc| ChatToolCall {
                    id: tc.id.clone(),
                    r#type: "function".to_string(),
                    function: ChatFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: None,
        };

        let out = ChatCompletionResponse {
            id: response.id.clone().unwrap_or_default(),
            object: "chat.completion",
            created: response.created.unwrap_or(0),
            model: response.model.clone().unwrap_or_default(),
            choices: vec![ChatChoice {
                index: 0,
                message,
                finish_reason: response.finish_reason.as_ref().map(finish_reason_to_wire),
            }],
            usage: ChatUsage {
                prompt_tokens: response.usage.input_tokens + response.usage.cached_tokens,
                completion_tokens: response.usage.output_tokens + response.usage.reasoning_tokens,
                total_tokens: response.usage.total_tokens,
                prompt_tokens_details: Some(ChatPromptTokensDetails {
                    cached_tokens: response.usage.cached_tokens,
                }),
                completion_tokens_details: Some(ChatCompletionTokensDetails {
                    reasoning_tokens: response.usage.reasoning_tokens,
                }),
            },
        };

        serde_json::to_value(out).map_err(|e| GatewayError::Internal(Some(e.to_string())))
    }

    fn transform_stream(&self, upstream: ByteStream) -> ChunkStream {
        let events = sse::parse(upstream);

        let chunks = events.filter_map(|event| async move {
            if event.data == "[DONE]" {
                return None;
            }

            let frame: ChatStreamFrame = match sonic_rs::from_str(&event.data) {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("failed to parse OpenAI chat stream frame: {e}");
                    return None;
                }
            };

            let choice = frame.choices.into_iter().next().unwrap_or_default();

            let tool_calls = choice
                .delta
                .tool_calls
                .into_iter()
                .map(|tc| IrToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name: tc.function.as_ref().and_then(|f| f.name.clone()),
                    arguments: tc.function.and_then(|f| f.arguments),
                })
                .collect();

            Some(Ok(IrChunk {
                id: frame.id,
                model: frame.model,
                created: frame.created,
                delta: IrDelta {
                    role: choice.delta.role.as_deref().map(role_from_wire),
                    content: choice.delta.content,
                    reasoning_content: choice.delta.reasoning_content,
                    thinking: None,
                    tool_calls,
                },
                finish_reason: choice.finish_reason.as_deref().map(finish_reason_from_wire),
                usage: frame.usage.map(|u| {
                    let cached = u.prompt_tokens_details.as_ref().map(|d| d.cached_tokens).unwrap_or(0);
                    let reasoning = u
                        .completion_tokens_details
                        .as_ref()
                        .map(|d| d.reasoning_tokens)
                        .unwrap_or(0);
                    let input_tokens = u.prompt_tokens.saturating_sub(cached);
                    let output_tokens = u.completion_tokens.saturating_sub(reasoning);
                    IrUsage {
                        input_tokens,
                        output_tokens,
                        total_tokens: input_tokens + cached + output_tokens + reasoning,
                        reasoning_tokens: reasoning,
                        cached_tokens: cached,
                        cache_creation_tokens: 0,
                    }
                }),
            }))
        });

        Box::pin(chunks)
    }

    fn format_stream(&self, chunks: ChunkStream) -> ByteStream {
        let bytes_stream = chunks
            .map(|result| {
                let chunk = match result {
                    Ok(chunk) => chunk,
                    Err(e) => return sse::frame(&sse::serialize_error(&e)),
                };

                let tool_calls: Vec<_> = chunk
                    .delta
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        serde_json::json!({
                            "index": tc.index,
                            "id": tc.id,
                            "function": { "name": tc.name, "arguments": tc.arguments },
                        })
                    })
                    .collect();

                let wire = serde_json::json!({
                    "id": chunk.id,
                    "model": chunk.model,
                    "created": chunk.created,
                    "choices": [{
                        "index": 0,
                        "delta": {
                            "role": chunk.delta.role.map(role_to_wire),
                            "content": chunk.delta.content,
                            "reasoning_content": chunk.delta.reasoning_content,
                            "tool_calls": tool_calls,
                        },
                        "finish_reason": chunk.finish_reason.as_ref().map(finish_reason_to_wire),
                    }],
                    "usage": chunk.usage,
                });

                let json = sonic_rs::to_string(&wire).unwrap_or_else(|_| "{}".to_string());
                sse::frame(&json)
            })
            .chain(futures::stream::once(async { sse::done_frame() }))
            .map(|bytes| Ok(bytes::Bytes::from(bytes)))
            .map(|r: std::io::Result<bytes::Bytes>| r);

        Box::pin(bytes_stream)
    }

    fn extract_usage(&self, data: &[u8]) -> Option<IrUsage> {
        if data == b"[DONE]" {
            return None;
        }
        let frame: ChatStreamFrame = sonic_rs::from_slice(data).ok()?;
        let u = frame.usage?;
        let cached = u.prompt_tokens_details.as_ref().map(|d| d.cached_tokens).unwrap_or(0);
        let reasoning = u
            .completion_tokens_details
            .as_ref()
            .map(|d| d.reasoning_tokens)
            .unwrap_or(0);
        let input_tokens = u.prompt_tokens.saturating_sub(cached);
        let output_tokens = u.completion_tokens.saturating_sub(reasoning);
        Some(IrUsage {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + cached + output_tokens + reasoning,
            reasoning_tokens: reasoning,
            cached_tokens: cached,
            cache_creation_tokens: 0,
        })
    }
}

pub const FORMAT: ApiFormat = ApiFormat::Chat;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_subtracts_reasoning_from_completion_tokens() {
        let body = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-5",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}, "finish_reason": "stop"}],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 12,
                "total_tokens": 22,
                "prompt_tokens_details": {"cached_tokens": 2},
                "completion_tokens_details": {"reasoning_tokens": 4},
            },
        });

        let transformer = ChatTransformer;
        let response = transformer.transform_response(body.to_string().as_bytes()).unwrap();

        assert_eq!(response.usage.input_tokens, 8);
        assert_eq!(response.usage.output_tokens, 8);
        assert_eq!(response.usage.cached_tokens, 2);
        assert_eq!(response.usage.reasoning_tokens, 4);
    }

    #[test]
    fn malformed_request_body_is_rejected() {
        let transformer = ChatTransformer;
        let err = transformer.parse_request(b"not json").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedRequest(_)));
    }
}
