//! End-to-end stream translation across two different wire formats: a
//! Gemini upstream response reshaped into an OpenAI Chat Completions
//! stream, exercising only the public `Transformer` surface.

use bytes::Bytes;
use futures::StreamExt;
use protocol::protocols::{chat::ChatTransformer, gemini::GeminiTransformer};
use protocol::transformer::Transformer;

fn sse_frame(data: &str) -> Bytes {
    Bytes::from(format!("data: {data}\n\n"))
}

fn gemini_upstream() -> protocol::transformer::ByteStream {
    let frames = vec![
        sse_frame(r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#),
        sse_frame(r#"{"candidates":[{"content":{"parts":[{"text":"lo"}]}}]}"#),
        sse_frame(
            r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":10,"candidatesTokenCount":2,"totalTokenCount":12}}"#,
        ),
    ];
    Box::pin(futures::stream::iter(frames.into_iter().map(Ok)))
}

#[tokio::test]
async fn gemini_stream_translates_to_chat_sse() {
    let gemini_chunks = GeminiTransformer.transform_stream(gemini_upstream());
    let chat_bytes = ChatTransformer.format_stream(gemini_chunks);

    let frames_bytes: Vec<Bytes> = chat_bytes.map(|chunk| chunk.expect("no transport errors in this test")).collect().await;
    let body: Vec<u8> = frames_bytes.into_iter().flat_map(|b| b.to_vec()).collect();
    let text = String::from_utf8(body).expect("chat SSE output is utf8");

    let frames: Vec<&str> = text.split("\n\n").filter(|f| !f.is_empty()).collect();
    assert_eq!(frames.len(), 4, "expected 3 data frames + terminal [DONE], got: {frames:?}");

    assert!(frames[0].contains(r#""content":"Hel""#));
    assert!(frames[1].contains(r#""content":"lo""#));
    assert!(frames[2].contains(r#""finish_reason":"stop""#));
    assert!(frames[2].contains(r#""output_tokens":2"#) || frames[2].contains(r#""total_tokens":12"#));
    assert_eq!(frames[3], "data: [DONE]");
}
