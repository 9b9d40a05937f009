pub mod observer;
pub mod pipeline;
pub mod sse;
pub mod usage_recorder;
