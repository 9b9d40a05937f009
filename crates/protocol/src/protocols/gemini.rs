//! Google Gemini `generateContent`/`streamGenerateContent` transformer (§4.3).
//!
//! Gemini has no block-lifecycle stream grammar: every SSE event is a
//! self-contained, monolithic candidate object carrying whatever text or
//! function call arrived since the last event. There is no per-chunk
//! accumulation state to track beyond the running text buffer used for the
//! same token-imputation trick Anthropic needs.

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

pub const FORMAT: ApiFormat = ApiFormat::Gemini;

// ---------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------

/// Mirrors real `GenerateContent` request bodies: no `model` field (the
/// model lives in the URL path) and the `contents`/`systemInstruction`
/// shapes `build_request` below already emits.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    #[serde(default)]
    pub system_instruction: Option<GeminiContentIn>,
    #[serde(default)]
    pub contents: Vec<GeminiContentIn>,
    #[serde(default)]
    pub tools: Vec<GeminiToolGroupIn>,
    #[serde(default)]
    pub tool_config: Option<GeminiToolConfigIn>,
    #[serde(default)]
    pub generation_config: Option<GeminiGenerationConfigIn>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeminiContentIn {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiToolGroupIn {
    #[serde(default)]
    pub function_declarations: Vec<GeminiToolIn>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiToolIn {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiToolConfigIn {
    #[serde(default)]
    pub function_calling_config: Option<GeminiFunctionCallingConfigIn>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFunctionCallingConfigIn {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub allowed_function_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfigIn {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub response_mime_type: Option<String>,
    #[serde(default)]
    pub response_json_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GeminiFunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<serde_json::Value>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn thought(text: impl Into<String>, signature: Option<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: Some(true),
            thought_signature: signature,
            ..Default::default()
        }
    }
}

impl Default for GeminiPart {
    fn default() -> Self {
        Self {
            text: None,
            thought: None,
            thought_signature: None,
            function_call: None,
            function_response: None,
            inline_data: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContentOut,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiContentOut {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
    #[serde(default)]
    thoughts_token_count: u64,
    #[serde(default)]
    cached_content_token_count: u64,
}

fn finish_reason_to_ir(reason: &str) -> IrFinishReason {
    match reason {
        "STOP" => IrFinishReason::Stop,
        "MAX_TOKENS" => IrFinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => IrFinishReason::ContentFilter,
        other => IrFinishReason::Other(other.to_string()),
    }
}

fn finish_reason_to_wire(reason: &IrFinishReason, has_tool_calls: bool) -> &'static str {
    if has_tool_calls {
        return "STOP";
    }
    match reason {
        IrFinishReason::Stop => "STOP",
        IrFinishReason::Length => "MAX_TOKENS",
        IrFinishReason::ToolCalls => "STOP",
        IrFinishReason::ContentFilter => "SAFETY",
        IrFinishReason::Other(_) => "STOP",
    }
}

/// Normalizes a bare model name into Gemini's `models/{name}` resource path.
fn model_resource(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// Inverse of the `responseMimeType`/`responseJsonSchema` mapping in `build_request`.
fn response_format_from_generation_config(gc: &GeminiGenerationConfigIn) -> Option<IrResponseFormat> {
    match gc.response_mime_type.as_deref() {
        Some("application/json") => Some(match &gc.response_json_schema {
            Some(schema) => IrResponseFormat::JsonSchema { schema: schema.clone() },
            None => IrResponseFormat::JsonObject,
        }),
        _ => None,
    }
}

fn candidate_parts_to_ir(parts: Vec<GeminiPart>) -> (Option<String>, Option<IrThinking>, Vec<IrToolCall>) {
    let mut text = String::new();
    let mut thinking_text = String::new();
    let mut signature = None;
    let mut tool_calls = Vec::new();

    for part in parts {
        if part.thought == Some(true) {
            if let Some(t) = part.text {
                thinking_text.push_str(&t);
            }
            if part.thought_signature.is_some() {
                signature = part.thought_signature;
            }
        } else if let Some(t) = part.text {
            text.push_str(&t);
        } else if let Some(call) = part.function_call {
            tool_calls.push(IrToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4()),
                name: call.name,
                arguments: sonic_rs::to_string(&call.args).unwrap_or_else(|_| "{}".to_string()),
            });
        }
    }

    let thinking = (!thinking_text.is_empty()).then(|| IrThinking {
        content: thinking_text,
        signature,
    });

    (Some(text).filter(|t| !t.is_empty()), thinking, tool_calls)
}

pub struct GeminiTransformer;

#[async_trait]
impl Transformer for GeminiTransformer {
    fn parse_request(&self, raw: &[u8]) -> Result<IrRequest> {
        let req: GeminiRequest =
            sonic_rs::from_slice(raw).map_err(|e| GatewayError::MalformedRequest(e.to_string()))?;

        let mut messages = Vec::new();
        if let Some(system) = req.system_instruction {
            let text: String = system.parts.iter().filter_map(|p| p.text.clone()).collect();
            if !text.is_empty() {
                messages.push(IrMessage::system(text));
            }
        }

        for m in req.contents {
            let role = match m.role.as_deref() {
                Some("model") => IrRole::Assistant,
                _ => IrRole::User,
            };

            let mut thinking = None;
            let mut tool_calls = Vec::new();
            let mut tool_result: Option<(String, String)> = None;
            let mut content_parts = Vec::new();

            for part in m.parts {
                if part.thought == Some(true) {
                    let existing = thinking.take().map(|t: IrThinking| t.content).unwrap_or_default();
                    thinking = Some(IrThinking {
                        content: existing + &part.text.unwrap_or_default(),
                        signature: part.thought_signature,
                    });
                } else if let Some(call) = part.function_call {
                    tool_calls.push(IrToolCall {
                        id: format!("call_{}", uuid::Uuid::new_v4()),
                        name: call.name,
                        arguments: sonic_rs::to_string(&call.args).unwrap_or_else(|_| "{}".to_string()),
                    });
                } else if let Some(response) = part.function_response {
                    let text = sonic_rs::to_string(&response.response).unwrap_or_else(|_| "{}".to_string());
                    tool_result = Some((response.name, text));
                } else if let Some(text) = part.text {
                    content_parts.push(IrContentPart::text(text));
                }
            }

            if let Some((name, text)) = tool_result {
                let mut tool_message = IrMessage::tool_result(String::new(), IrContent::Text(text));
                tool_message.tool_name = Some(name);
                messages.push(tool_message);
                continue;
            }

            let content = if content_parts.is_empty() {
                IrContent::Null
            } else {
                IrContent::Parts(content_parts)
            };

            messages.push(IrMessage {
                role,
                content,
                thinking,
                tool_calls,
                tool_call_id: None,
                tool_name: None,
            });
        }

        let tools = req
            .tools
            .into_iter()
            .flat_map(|group| group.function_declarations)
            .map(|t| IrToolDef {
                name: t.name,
                description: t.description,
                parameters: t.parameters,
                strict: None,
            })
            .collect();

        let calling_config = req.tool_config.and_then(|tc| tc.function_calling_config);
        let tool_choice = calling_config.as_ref().and_then(|c| match c.mode.as_deref() {
            Some("AUTO") => Some(IrToolChoice::Auto),
            Some("ANY") => match c.allowed_function_names.first() {
                Some(name) => Some(IrToolChoice::Named(name.clone())),
                None => Some(IrToolChoice::Required),
            },
            Some("NONE") => Some(IrToolChoice::None),
            _ => None,
        });

        let (temperature, max_tokens, response_format) = match req.generation_config {
            Some(gc) => {
                let max_tokens = gc.max_output_tokens;
                let temperature = gc.temperature;
                let response_format = response_format_from_generation_config(&gc);
                (temperature, max_tokens, response_format)
            }
            None => (None, None, None),
        };

        Ok(IrRequest {
            // Overwritten by the server from the URL path, which is the only
            // place a real GenerateContent request carries the model name.
            model: String::new(),
            messages,
            tools,
            tool_choice,
            response_format,
            reasoning: None,
            max_tokens,
            temperature,
            // Overwritten by the server from the URL path (`generateContent`
            // vs `streamGenerateContent`); the body never carries this either.
            stream: false,
            request_id: None,
            metadata: Default::default(),
        })
    }

    fn build_request(&self, request: &IrRequest) -> Result<BuiltRequest> {
        let mut system_text = String::new();
        let mut contents = Vec::new();

        for message in &request.messages {
            if message.role == IrRole::System {
                if !system_text.is_empty() {
                    system_text.push('\n');
                }
                system_text.push_str(&message.content.as_text());
                continue;
            }

            let mut parts = Vec::new();

            if message.role == IrRole::Tool {
                parts.push(GeminiPart {
                    function_response: Some(GeminiFunctionResponse {
                        name: message.tool_name.clone().unwrap_or_default(),
                        response: sonic_rs::from_str(&message.content.as_text())
                            .unwrap_or_else(|_| serde_json::json!({ "result": message.content.as_text() })),
                    }),
                    ..Default::default()
                });
                contents.push(serde_json::json!({ "role": "user", "parts": parts }));
                continue;
            }

            if let Some(thinking) = &message.thinking {
                parts.push(GeminiPart::thought(thinking.content.clone(), thinking.signature.clone()));
            }

            let text = message.content.as_text();
            if !text.is_empty() {
                parts.push(GeminiPart::text(text));
            }

            for tool_call in &message.tool_calls {
                let args = sonic_rs::from_str(&tool_call.arguments).unwrap_or(serde_json::Value::Null);
                parts.push(GeminiPart {
                    function_call: Some(GeminiFunctionCall {
                        name: tool_call.name.clone(),
                        args,
                    }),
                    ..Default::default()
                });
            }

            let role = if message.role == IrRole::Assistant { "model" } else { "user" };
            contents.push(serde_json::json!({ "role": role, "parts": parts }));
        }

        let tools: Vec<_> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();

        let tool_config = request.tool_choice.as_ref().map(|choice| {
            let mode = match choice {
                IrToolChoice::Auto => "AUTO",
                IrToolChoice::Required | IrToolChoice::Named(_) => "ANY",
                IrToolChoice::None => "NONE",
            };
            let allowed_function_names =
                if let IrToolChoice::Named(name) = choice { Some(vec![name.clone()]) } else { None };
            serde_json::json!({
                "functionCallingConfig": { "mode": mode, "allowedFunctionNames": allowed_function_names },
            })
        });

        let (response_mime_type, response_json_schema) = match &request.response_format {
            Some(IrResponseFormat::JsonObject) => (Some("application/json"), None),
            Some(IrResponseFormat::JsonSchema { schema }) => (Some("application/json"), Some(schema.clone())),
            Some(IrResponseFormat::Text) | None => (None, None),
        };

        let generation_config = serde_json::json!({
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
            "thinkingConfig": request.reasoning.as_ref().map(|r| serde_json::json!({
                "includeThoughts": r.enabled,
                "thinkingBudget": r.max_tokens,
            })),
            "responseMimeType": response_mime_type,
            "responseJsonSchema": response_json_schema,
        });

        let body = serde_json::json!({
            "contents": contents,
            "systemInstruction": (!system_text.is_empty()).then(|| serde_json::json!({ "parts": [{"text": system_text}] })),
            "tools": (!tools.is_empty()).then_some(vec![serde_json::json!({ "functionDeclarations": tools })]),
            "toolConfig": tool_config,
            "generationConfig": generation_config,
        });

        let action = if request.stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };

        Ok(BuiltRequest {
            path: format!("/v1beta/{}:{action}", model_resource(&request.model)),
            body,
        })
    }

    fn get_endpoint(&self, built: &BuiltRequest) -> String {
        built.path.clone()
    }

    fn transform_response(&self, body: &[u8]) -> Result<IrResponse> {
        let resp: GeminiResponse =
            sonic_rs::from_slice(body).map_err(|e| GatewayError::UpstreamProtocolViolation(e.to_string()))?;

        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::UpstreamProtocolViolation("no candidates in response".to_string()))?;

        let (content, thinking, tool_calls) = candidate_parts_to_ir(candidate.content.parts);
        let finish_reason = candidate.finish_reason.as_deref().map(finish_reason_to_ir).or_else(|| {
            Some(if tool_calls.is_empty() {
                IrFinishReason::Stop
            } else {
                IrFinishReason::ToolCalls
            })
        });

        let usage = resp.usage_metadata.unwrap_or_default();
        let cached = usage.cached_content_token_count;

        Ok(IrResponse {
            id: None,
            model: None,
            created: None,
            content,
            reasoning_content: thinking.as_ref().map(|t| t.content.clone()),
            thinking,
            tool_calls,
            finish_reason,
            citations: Vec::new(),
            usage: IrUsage {
                input_tokens: usage.prompt_token_count.saturating_sub(cached),
                output_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
                reasoning_tokens: usage.thoughts_token_count,
                cached_tokens: cached,
                cache_creation_tokens: 0,
            },
            bypass: false,
            raw_response: None,
        })
    }

    fn format_response(&self, response: &IrResponse) -> Result<serde_json::Value> {
        let mut parts = Vec::new();

        if let Some(thinking) = &response.thinking {
            parts.push(GeminiPart::thought(thinking.content.clone(), thinking.signature.clone()));
        }
        if let Some(text) = &response.content
            && !text.is_empty()
        {
            parts.push(GeminiPart::text(text.clone()));
        }
        for tool_call in &response.tool_calls {
            let args = sonic_rs::from_str(&tool_call.arguments).unwrap_or(serde_json::Value::Null);
            parts.push(GeminiPart {
                function_call: Some(GeminiFunctionCall {
                    name: tool_call.name.clone(),
                    args,
                }),
                ..Default::default()
            });
        }

        let finish_reason = response
            .finish_reason
            .as_ref()
            .map(|r| finish_reason_to_wire(r, !response.tool_calls.is_empty()));

        let out = serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": parts },
                "finishReason": finish_reason,
            }],
            "usageMetadata": {
                "promptTokenCount": response.usage.input_tokens + response.usage.cached_tokens,
                "candidatesTokenCount": response.usage.output_tokens,
                "totalTokenCount": response.usage.total_tokens,
                "thoughtsTokenCount": response.usage.reasoning_tokens,
                "cachedContentTokenCount": response.usage.cached_tokens,
            },
        });

        Ok(out)
    }

    fn transform_stream(&self, upstream: ByteStream) -> ChunkStream {
        let events = Box::pin(sse::parse(upstream));

        let chunks = futures::stream::unfold((events, String::new()), |(mut events, mut text_buffer)| async move {
            loop {
                let event = events.next().await?;

                let frame: GeminiResponse = match sonic_rs::from_str(&event.data) {
                    Ok(f) => f,
                    Err(e) => {
                        log::warn!("failed to parse Gemini stream frame: {e}");
                        continue;
                    }
                };

                let Some(candidate) = frame.candidates.into_iter().next() else {
                    continue;
                };

                let (content, thinking, tool_calls) = candidate_parts_to_ir(candidate.content.parts);
                if let Some(t) = &content {
                    text_buffer.push_str(t);
                }

                let finish_reason = candidate.finish_reason.as_deref().map(finish_reason_to_ir);
                let usage = frame.usage_metadata.map(|u| {
                    let cached = u.cached_content_token_count;
                    let (output_tokens, reasoning_tokens) = if u.thoughts_token_count > 0 {
                        (token_counter::count(&text_buffer), u.thoughts_token_count)
                    } else {
                        (u.candidates_token_count, 0)
                    };
                    IrUsage {
                        input_tokens: u.prompt_token_count.saturating_sub(cached),
                        output_tokens,
                        total_tokens: u.total_token_count,
                        reasoning_tokens,
                        cached_tokens: cached,
                        cache_creation_tokens: 0,
                    }
                });

                let chunk = IrChunk {
                    id: None,
                    model: None,
                    created: None,
                    delta: IrDelta {
                        role: Some(IrRole::Assistant),
                        content,
                        reasoning_content: thinking.as_ref().map(|t| t.content.clone()),
                        thinking: thinking.map(|t| IrThinkingDelta {
                            content: Some(t.content),
                            signature: t.signature,
                        }),
                        tool_calls: tool_calls
                            .into_iter()
                            .enumerate()
                            .map(|(i, tc)| IrToolCallDelta {
                                index: i as u32,
                                id: Some(tc.id),
                                name: Some(tc.name),
                                arguments: Some(tc.arguments),
                            })
                            .collect(),
                    },
                    finish_reason,
                    usage,
                };

                return Some((Ok(chunk), (events, text_buffer)));
            }
        });

        Box::pin(chunks)
    }

    fn format_stream(&self, chunks: ChunkStream) -> ByteStream {
        let bytes_stream = chunks.map(|result| {
            let chunk = match result {
                Ok(chunk) => chunk,
                Err(e) => return Ok(bytes::Bytes::from(sse::frame(&sse::serialize_error(&e)))),
            };

            let mut parts = Vec::new();
            if let Some(thinking) = &chunk.delta.thinking {
                parts.push(GeminiPart::thought(
                    thinking.content.clone().unwrap_or_default(),
                    thinking.signature.clone(),
                ));
            }
            if let Some(text) = &chunk.delta.content {
                parts.push(GeminiPart::text(text.clone()));
            }
            for tc in &chunk.delta.tool_calls {
                let args = tc
                    .arguments
                    .as_deref()
                    .and_then(|a| sonic_rs::from_str(a).ok())
                    .unwrap_or(serde_json::Value::Null);
                parts.push(GeminiPart {
                    function_call: Some(GeminiFunctionCall {
                        name: tc.name.clone().unwrap_or_default(),
                        args,
                    }),
                    ..Default::default()
                });
            }

            let finish_reason = chunk.finish_reason.as_ref().map(|r| finish_reason_to_wire(r, false));

            let wire = serde_json::json!({
                "candidates": [{
                    "content": { "role": "model", "parts": parts },
                    "finishReason": finish_reason,
                }],
                "usageMetadata": chunk.usage.map(|u| serde_json::json!({
                    "promptTokenCount": u.input_tokens + u.cached_tokens,
                    "candidatesTokenCount": u.output_tokens,
                    "totalTokenCount": u.total_tokens,
                    "thoughtsTokenCount": u.reasoning_tokens,
                    "cachedContentTokenCount": u.cached_tokens,
                })),
            });

            let json = sonic_rs::to_string(&wire).unwrap_or_else(|_| "{}".to_string());
            Ok(bytes::Bytes::from(sse::frame(&json)))
        });

        Box::pin(bytes_stream)
    }

    fn extract_usage(&self, data: &[u8]) -> Option<IrUsage> {
        let frame: GeminiResponse = sonic_rs::from_slice(data).ok()?;
        let usage = frame.usage_metadata?;
        let cached = usage.cached_content_token_count;
        Some(IrUsage {
            input_tokens: usage.prompt_token_count.saturating_sub(cached),
            output_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
            reasoning_tokens: usage.thoughts_token_count,
            cached_tokens: cached,
            cache_creation_tokens: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_resource_adds_prefix_once() {
        assert_eq!(model_resource("gemini-2.0-flash"), "models/gemini-2.0-flash");
        assert_eq!(model_resource("models/gemini-2.0-flash"), "models/gemini-2.0-flash");
    }

    #[test]
    fn streaming_endpoint_uses_sse_suffix() {
        let transformer = GeminiTransformer;
        let request = IrRequest {
            model: "gemini-2.0-flash".to_string(),
            messages: vec![IrMessage::user("hi")],
            tools: Vec::new(),
            tool_choice: None,
            response_format: None,
            reasoning: None,
            max_tokens: None,
            temperature: None,
            stream: true,
            request_id: None,
            metadata: Default::default(),
        };
        let built = transformer.build_request(&request).unwrap();
        assert!(built.path.ends_with(":streamGenerateContent?alt=sse"));
    }

    #[test]
    fn parse_request_reads_contents_and_system_instruction() {
        let body = serde_json::json!({
            "systemInstruction": {"parts": [{"text": "be terse"}]},
            "contents": [
                {"role": "user", "parts": [{"text": "hi"}]},
                {"role": "model", "parts": [{"text": "hello"}]},
            ],
            "tools": [{"functionDeclarations": [{"name": "lookup", "parameters": {"type": "object"}}]}],
            "toolConfig": {"functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": ["lookup"]}},
            "generationConfig": {"temperature": 0.5, "responseMimeType": "application/json"},
        });

        let transformer = GeminiTransformer;
        let request = transformer.parse_request(body.to_string().as_bytes()).unwrap();

        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role, IrRole::System);
        assert_eq!(request.messages[0].content.as_text(), "be terse");
        assert_eq!(request.messages[2].role, IrRole::Assistant);
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tools[0].name, "lookup");
        assert!(matches!(request.tool_choice, Some(IrToolChoice::Named(ref n)) if n == "lookup"));
        assert_eq!(request.temperature, Some(0.5));
        assert!(matches!(request.response_format, Some(IrResponseFormat::JsonObject)));
    }

    #[test]
    fn thought_parts_are_split_from_visible_text() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"thought": true, "text": "thinking..."},
                        {"text": "answer"},
                    ],
                },
                "finishReason": "STOP",
            }],
            "usageMetadata": {
                "promptTokenCount": 5,
                "candidatesTokenCount": 1,
                "totalTokenCount": 6,
            },
        });

        let transformer = GeminiTransformer;
        let response = transformer.transform_response(body.to_string().as_bytes()).unwrap();
        assert_eq!(response.content.as_deref(), Some("answer"));
        assert_eq!(response.reasoning_content.as_deref(), Some("thinking..."));
    }
}
