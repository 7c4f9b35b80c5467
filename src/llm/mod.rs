//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock），以及不会失败的生成能力边界

pub mod fallback;
pub mod mock;
pub mod openai;
pub mod service;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use service::{GenerationService, TextStream};
pub use traits::{FragmentStream, GenerationOptions, LlmClient, LlmError};
