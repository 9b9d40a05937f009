//! Axum wiring: one route pair per wire format plus its `/v1/models`
//! listing, all driven by the same [`GatewayServer::handle`] core.
//!
//! Grounded on the teacher's `llm::router`/`chat_completions`/
//! `anthropic_messages` handlers (`examples/grafbase-nexus/crates/llm/src/
//! lib.rs`), adapted for two differences from the teacher's shape:
//!
//! - The teacher extracts a typed wire struct with `axum_serde::Sonic` and
//!   converts it to its unified type in the handler. Here `Transformer::
//!   parse_request` already does raw-bytes-to-IR in one step, so handlers
//!   just extract [`bytes::Bytes`] and hand them to the transformer.
//! - The teacher builds `axum::response::sse::Event`s and lets `Sse::new`
//!   frame them. `Transformer::format_stream` here already returns
//!   fully-framed raw SSE bytes (`event: ...\ndata: ...\n\n`), so wrapping it
//!   in `Sse` would frame it twice. Streaming responses are built directly
//!   from the byte stream with the event-stream content type set by hand.

use std::{sync::Arc, time::Instant};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use crate::{
    error::{AnthropicResult, GatewayError, Result},
    interfaces::{AuthBroker, Logger, LogLevel, RequestStatus, Router as EgressRouter, UsageRecord, UsageSink},
    ir::IrUsage,
    models::{self, ModelInfo},
    protocols,
    request_context::{RequestContext, extract_context},
    stream::{observer, usage_recorder},
    transformer::ApiFormat,
    upstream,
};

/// Holds the external collaborators the core never implements itself
/// (§6.1), plus the HTTP client used for upstream dispatch and the model
/// list `/v1/models` reports. Everything here is `Arc`-shared across
/// requests; the server itself carries no per-request mutable state (§5).
pub struct GatewayServer {
    router: Arc<dyn EgressRouter>,
    auth: Arc<dyn AuthBroker>,
    usage_sink: Arc<dyn UsageSink>,
    logger: Arc<dyn Logger>,
    http: reqwest::Client,
    models: Vec<ModelInfo>,
}

/// Model name and streaming intent recovered from the URL path, for ingress
/// wire formats (Gemini) whose request body carries neither.
struct PathOverride {
    model: String,
    stream: bool,
}

impl GatewayServer {
    pub fn new(
        router: Arc<dyn EgressRouter>,
        auth: Arc<dyn AuthBroker>,
        usage_sink: Arc<dyn UsageSink>,
        logger: Arc<dyn Logger>,
        models: Vec<ModelInfo>,
    ) -> Self {
        Self { router, auth, usage_sink, logger, http: reqwest::Client::new(), models }
    }

    /// Runs one request through the full data-flow diagram (§2): parse,
    /// route, build, dispatch, transform, format. Bypass mode (ingress ==
    /// egress format, streaming) skips the transform/format round trip
    /// entirely and forwards upstream SSE bytes unchanged, still tapping
    /// usage off a tee of the same bytes.
    async fn handle(
        &self,
        ingress: ApiFormat,
        raw: &[u8],
        context: &RequestContext,
        path_override: Option<PathOverride>,
    ) -> Result<HandlerOutcome> {
        let start = Instant::now();
        let ingress_transformer = protocols::transformer_for(ingress);

        let mut ir_request = ingress_transformer.parse_request(raw)?;
        ir_request.request_id = Some(context.request_id.clone());
        if let Some(path_override) = path_override {
            ir_request.model = path_override.model;
            ir_request.stream = path_override.stream;
        }

        let target = self.router.resolve(&ir_request, ingress).await?;
        let egress_transformer = protocols::transformer_for(target.egress_api_type);

        let mut outgoing = ir_request.clone();
        outgoing.model = target.provider_model_id.clone();

        let built = egress_transformer.build_request(&outgoing)?;
        let path = target.endpoint_override.clone().unwrap_or_else(|| egress_transformer.get_endpoint(&built));
        let headers = self.headers_for(&target.provider, context).await?;

        self.logger.event(
            LogLevel::Info,
            "dispatching request",
            &[("provider", target.provider.as_str()), ("model", target.provider_model_id.as_str())],
        );

        if outgoing.stream {
            let upstream_bytes =
                upstream::dispatch_stream(&self.http, &target.base_url, &path, headers, &built.body).await?;

            if ingress == target.egress_api_type {
                let (client_bytes, mut drain) = observer::tee_for_bypass(upstream_bytes);
                let sink = self.usage_sink.clone();
                let request_id = context.request_id.clone();
                let provider = target.provider.clone();
                let model = target.provider_model_id.clone();
                let extractor = egress_transformer;

                tokio::spawn(async move {
                    let mut usage = IrUsage::zero();
                    while let Some(bytes) = drain.recv().await {
                        if let Some(partial) = extractor.extract_usage(&bytes) {
                            usage = usage + partial;
                        }
                    }
                    sink.record(UsageRecord {
                        request_id: Some(request_id),
                        provider,
                        model,
                        usage,
                        ttft: None,
                        status: RequestStatus::Completed,
                    })
                    .await;
                });

                return Ok(HandlerOutcome::Stream(client_bytes));
            }

            let upstream_chunks = egress_transformer.transform_stream(upstream_bytes);
            let (observed, state) = observer::observe(start, upstream_chunks);
            let recorded = usage_recorder::record_usage_on_end(
                observed,
                state,
                self.usage_sink.clone(),
                Some(context.request_id.clone()),
                target.provider.clone(),
                target.provider_model_id.clone(),
            );

            let client_bytes = ingress_transformer.format_stream(Box::pin(recorded));
            return Ok(HandlerOutcome::Stream(client_bytes));
        }

        let body = upstream::dispatch_unary(&self.http, &target.base_url, &path, headers, &built.body).await?;
        let ir_response = egress_transformer.transform_response(&body)?;

        self.usage_sink
            .record(UsageRecord {
                request_id: Some(context.request_id.clone()),
                provider: target.provider.clone(),
                model: target.provider_model_id.clone(),
                usage: ir_response.usage,
                ttft: None,
                status: RequestStatus::Completed,
            })
            .await;

        let value = ingress_transformer.format_response(&ir_response)?;
        Ok(HandlerOutcome::Unary(value))
    }

    /// Resolves outbound headers for a provider, applying the BYOK override
    /// (§B.4) on top of whatever the `AuthBroker` supplies. `AuthBroker`
    /// only sees the provider name (§6.1's signature is fixed), so a
    /// bring-your-own-key override is applied by the server afterward: the
    /// caller-supplied key replaces the broker's credential under every
    /// header name one of the four formats might expect it in.
    async fn headers_for(&self, provider: &str, context: &RequestContext) -> Result<HeaderMap> {
        let mut headers = self.auth.headers_for(provider).await?;

        if let Some(key) = &context.byok_api_key {
            let bearer = http::HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| GatewayError::MalformedRequest(e.to_string()))?;
            let raw = http::HeaderValue::from_str(key).map_err(|e| GatewayError::MalformedRequest(e.to_string()))?;
            headers.insert(header::AUTHORIZATION, bearer);
            headers.insert("x-api-key", raw.clone());
            headers.insert("x-goog-api-key", raw);
        }

        Ok(headers)
    }
}

enum HandlerOutcome {
    Unary(serde_json::Value),
    Stream(crate::transformer::ByteStream),
}

impl HandlerOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Unary(value) => axum::Json(value).into_response(),
            Self::Stream(bytes) => {
                let body = Body::from_stream(bytes);
                let mut response = Response::new(body);
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/event-stream"));
                response
                    .headers_mut()
                    .insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
                response
            }
        }
    }
}

/// Builds the axum router, mounting each enabled ingress protocol's chat and
/// model-listing routes under its own path prefix. Mirrors the teacher's
/// `llm::router`'s per-protocol `.nest()` pattern.
pub fn router(
    server: Arc<GatewayServer>,
    chat_path: Option<&str>,
    messages_path: Option<&str>,
    gemini_path: Option<&str>,
    responses_path: Option<&str>,
) -> Router {
    let mut router = Router::new();

    if let Some(path) = chat_path {
        let routes = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .route("/v1/models", get(list_openai_models))
            .with_state(server.clone());
        router = router.nest(path, routes);
    }

    if let Some(path) = messages_path {
        let routes = Router::new()
            .route("/v1/messages", post(anthropic_messages))
            .route("/v1/models", get(list_anthropic_models))
            .with_state(server.clone());
        router = router.nest(path, routes);
    }

    if let Some(path) = gemini_path {
        let routes = Router::new()
            .route("/v1beta/models/{*rest}", post(gemini_generate_content))
            .route("/v1beta/models", get(list_gemini_models))
            .with_state(server.clone());
        router = router.nest(path, routes);
    }

    if let Some(path) = responses_path {
        let routes = Router::new()
            .route("/v1/responses", post(openai_responses))
            .route("/v1/models", get(list_openai_models))
            .with_state(server.clone());
        router = router.nest(path, routes);
    }

    router
}

async fn chat_completions(State(server): State<Arc<GatewayServer>>, headers: HeaderMap, body: Bytes) -> Result<impl IntoResponse> {
    let context = extract_context(&headers);
    let outcome = server.handle(ApiFormat::Chat, &body, &context, None).await?;
    Ok(outcome.into_response())
}

async fn openai_responses(State(server): State<Arc<GatewayServer>>, headers: HeaderMap, body: Bytes) -> Result<impl IntoResponse> {
    let context = extract_context(&headers);
    let outcome = server.handle(ApiFormat::Responses, &body, &context, None).await?;
    Ok(outcome.into_response())
}

async fn gemini_generate_content(
    State(server): State<Arc<GatewayServer>>,
    Path(rest): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let context = extract_context(&headers);
    let (model, action) = rest.split_once(':').unwrap_or((rest.as_str(), ""));
    let path_override = PathOverride { model: model.to_string(), stream: action == "streamGenerateContent" };
    let outcome = server.handle(ApiFormat::Gemini, &body, &context, Some(path_override)).await?;
    Ok(outcome.into_response())
}

async fn anthropic_messages(
    State(server): State<Arc<GatewayServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> AnthropicResult<impl IntoResponse> {
    let context = extract_context(&headers);
    let outcome = server.handle(ApiFormat::Messages, &body, &context, None).await?;
    Ok(outcome.into_response())
}

async fn list_openai_models(State(server): State<Arc<GatewayServer>>) -> impl IntoResponse {
    axum::Json(models::openai_models(&server.models))
}

async fn list_anthropic_models(State(server): State<Arc<GatewayServer>>) -> impl IntoResponse {
    axum::Json(models::anthropic_models(&server.models))
}

async fn list_gemini_models(State(server): State<Arc<GatewayServer>>) -> impl IntoResponse {
    axum::Json(models::gemini_models(&server.models))
}
