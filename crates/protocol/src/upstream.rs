//! Thin, provider-agnostic HTTP dispatch — the "upstream call" step between
//! `buildRequest` and `transformResponse`/`transformStream` in the data-flow
//! diagram (§2). This knows nothing about any vendor's JSON shape; that stays
//! in the transformer. It exists so the crate is runnable end-to-end via the
//! `gateway` binary without pulling routing or auth policy into the core.

use futures::StreamExt;
use http::HeaderMap;

use crate::{
    error::{GatewayError, Result},
    transformer::ByteStream,
};

async fn send(client: &reqwest::Client, base_url: &str, path: &str, headers: HeaderMap, body: &serde_json::Value) -> Result<reqwest::Response> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);

    let response = client
        .post(&url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| GatewayError::ConnectionError(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        log::warn!("upstream returned {status}: {message}");
        return Err(GatewayError::ProviderApiError { status, message });
    }

    Ok(response)
}

/// Issues a unary POST and returns the full raw response body.
pub async fn dispatch_unary(
    client: &reqwest::Client,
    base_url: &str,
    path: &str,
    headers: HeaderMap,
    body: &serde_json::Value,
) -> Result<Vec<u8>> {
    let response = send(client, base_url, path, headers, body).await?;
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| GatewayError::ConnectionError(e.to_string()))
}

/// Issues a streaming POST and returns the raw upstream byte stream, ready to
/// be handed to a transformer's `transform_stream`.
pub async fn dispatch_stream(
    client: &reqwest::Client,
    base_url: &str,
    path: &str,
    headers: HeaderMap,
    body: &serde_json::Value,
) -> Result<ByteStream> {
    let response = send(client, base_url, path, headers, body).await?;
    let stream = response.bytes_stream().map(|result| result.map_err(std::io::Error::other));
    Ok(Box::pin(stream) as ByteStream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connection_error_is_reported_as_connection_error() {
        let client = reqwest::Client::new();
        let err = dispatch_unary(
            &client,
            "http://127.0.0.1:1",
            "/v1/chat/completions",
            HeaderMap::new(),
            &serde_json::json!({}),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::ConnectionError(_)));
    }
}
