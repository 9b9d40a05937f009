//! `build_request` then `parse_request` on the same transformer should
//! recover a semantically equivalent IR Request for the fields a wire
//! format actually carries.

use protocol::ir::{IrMessage, IrRequest};
use protocol::protocols::chat::ChatTransformer;
use protocol::transformer::Transformer;

fn sample_request() -> IrRequest {
    IrRequest {
        model: "gpt-4o".to_string(),
        messages: vec![IrMessage::system("be terse"), IrMessage::user("hi there")],
        tools: Vec::new(),
        tool_choice: None,
        response_format: None,
        reasoning: None,
        max_tokens: Some(256),
        temperature: Some(0.5),
        stream: false,
        request_id: None,
        metadata: Default::default(),
    }
}

#[test]
fn chat_round_trips_model_messages_and_sampling_params() {
    let transformer = ChatTransformer;
    let original = sample_request();

    let built = transformer.build_request(&original).expect("build succeeds on valid IR");
    let raw = built.body.to_string();
    let recovered = transformer.parse_request(raw.as_bytes()).expect("parse succeeds on our own output");

    assert_eq!(recovered.model, original.model);
    assert_eq!(recovered.max_tokens, original.max_tokens);
    assert_eq!(recovered.temperature, original.temperature);
    assert_eq!(recovered.messages.len(), original.messages.len());
    for (a, b) in recovered.messages.iter().zip(original.messages.iter()) {
        assert_eq!(a.role, b.role);
        assert_eq!(a.content, b.content);
    }
}
