//! 生成能力边界：GenerationService
//!
//! 包装任意 LlmClient，加上请求超时；任何后端失败（传输错误、超时、空回复）都不向调用方传播，
//! 而是降级为 fallback::canned_response，保证下游 JSON 解析总能拿到字符串。

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{future, stream, Stream, StreamExt};

use crate::llm::fallback::canned_response;
use crate::llm::{GenerationOptions, LlmClient, LlmError};
use crate::memory::Message;

/// 面向用户的文本片段流（不会出错）
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// 生成能力：generate 总是返回文本，generate_stream 总是返回片段流
#[derive(Clone)]
pub struct GenerationService {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
    max_output_tokens: u32,
}

impl GenerationService {
    pub fn new(client: Arc<dyn LlmClient>, timeout_secs: u64, max_output_tokens: u32) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            max_output_tokens,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.client.name()
    }

    pub fn options(&self, temperature: f32) -> GenerationOptions {
        GenerationOptions::new(temperature, self.max_output_tokens)
    }

    /// 带超时的原始调用；超时与传输错误同属一类失败
    pub async fn try_generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        match tokio::time::timeout(self.timeout, self.client.complete(messages, options)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
        }
    }

    /// 生成完整文本（默认最大输出 token）
    pub async fn generate(&self, messages: &[Message], temperature: f32) -> String {
        let options = self.options(temperature);
        self.generate_with(messages, &options).await
    }

    /// 生成完整文本；失败时返回按意图匹配的兜底回复
    pub async fn generate_with(&self, messages: &[Message], options: &GenerationOptions) -> String {
        match self.try_generate(messages, options).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(backend = self.client.name(), error = %e, "generation failed, using canned response");
                canned_response(messages)
            }
        }
    }

    /// 流式生成：建立失败时退化为单个兜底片段；中途出错则结束流
    pub async fn generate_stream(&self, messages: &[Message], temperature: f32) -> TextStream {
        let options = self.options(temperature);
        let started =
            tokio::time::timeout(self.timeout, self.client.complete_stream(messages, &options)).await;

        match started {
            Ok(Ok(fragments)) => Box::pin(
                fragments
                    .take_while(|r| {
                        if let Err(e) = r {
                            tracing::warn!(error = %e, "stream interrupted");
                        }
                        future::ready(r.is_ok())
                    })
                    .filter_map(|r| future::ready(r.ok())),
            ),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "stream failed to start, using canned response");
                Box::pin(stream::iter(vec![canned_response(messages)]))
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "stream start timed out");
                Box::pin(stream::iter(vec![canned_response(messages)]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::fallback::{mock_roadmap, APOLOGY};
    use crate::llm::{FragmentStream, MockLlmClient};
    use async_trait::async_trait;

    /// 永不返回的后端
    struct HangingClient;

    #[async_trait]
    impl LlmClient for HangingClient {
        async fn complete(&self, _: &[Message], _: &GenerationOptions) -> Result<String, LlmError> {
            future::pending::<()>().await;
            unreachable!()
        }

        async fn complete_stream(
            &self,
            _: &[Message],
            _: &GenerationOptions,
        ) -> Result<FragmentStream, LlmError> {
            future::pending::<()>().await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_transport_failure_returns_mock_roadmap() {
        let service = GenerationService::new(Arc::new(MockLlmClient::failing()), 5, 4096);
        let text = service
            .generate(&[Message::user("Please generate a roadmap for band 7")], 1.0)
            .await;
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, mock_roadmap());
        assert_eq!(value["estimated_final_band"], 7.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades_to_fallback() {
        let service = GenerationService::new(Arc::new(HangingClient), 2, 4096);
        let text = service.generate(&[Message::user("hello")], 0.5).await;
        assert_eq!(text, APOLOGY);
    }

    #[tokio::test]
    async fn test_stream_concatenates_to_full_text() {
        let mock = MockLlmClient::new().with_rule("hi", "hello there candidate");
        let service = GenerationService::new(Arc::new(mock), 5, 4096);
        let fragments: Vec<String> = service
            .generate_stream(&[Message::user("hi")], 1.0)
            .await
            .collect()
            .await;
        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), "hello there candidate");
    }

    #[tokio::test]
    async fn test_stream_failure_yields_single_fallback() {
        let service = GenerationService::new(Arc::new(MockLlmClient::failing()), 5, 4096);
        let fragments: Vec<String> = service
            .generate_stream(&[Message::user("hi")], 1.0)
            .await
            .collect()
            .await;
        assert_eq!(fragments, vec![APOLOGY.to_string()]);
    }
}
