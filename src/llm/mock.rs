//! Mock LLM 客户端（用于测试与无 API Key 运行）
//!
//! 按最后一条消息的子串匹配规则返回脚本化回复；可设置序列（逐次弹出，最后一条重复）、
//! 默认回复，或强制返回传输错误。会记录调用次数与收到的 prompt，便于断言。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{FragmentStream, GenerationOptions, LlmClient, LlmError};
use crate::memory::Message;

/// 默认回复：不是 JSON，触发各 Agent 的兜底结构
pub const UNSTRUCTURED_REPLY: &str = "I'm not sure how to answer that.";

struct Rule {
    needle: String,
    replies: VecDeque<String>,
}

/// Mock 客户端：脚本化回复
pub struct MockLlmClient {
    rules: Mutex<Vec<Rule>>,
    default_reply: String,
    fail: bool,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            default_reply: UNSTRUCTURED_REPLY.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用都返回传输错误
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// 最后一条消息包含 needle 时返回 reply
    pub fn with_rule(self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.with_sequence(needle, vec![reply.into()])
    }

    /// 最后一条消息包含 needle 时依次返回 replies，用尽后重复最后一条
    pub fn with_sequence(self, needle: impl Into<String>, replies: Vec<String>) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Rule {
                needle: needle.into(),
                replies: replies.into(),
            });
        self
    }

    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 已收到的最后一条消息内容（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn reply_for(&self, prompt: &str) -> String {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        for rule in rules.iter_mut() {
            if prompt.contains(&rule.needle) {
                return if rule.replies.len() > 1 {
                    rule.replies.pop_front().unwrap_or_default()
                } else {
                    rule.replies.front().cloned().unwrap_or_default()
                };
            }
        }
        self.default_reply.clone()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.clone());

        if self.fail {
            return Err(LlmError::Transport("mock backend unavailable".to_string()));
        }
        Ok(self.reply_for(&prompt))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<FragmentStream, LlmError> {
        let content = self.complete(messages, options).await?;
        // 按空白切成多个片段，模拟增量输出
        let fragments: Vec<Result<String, LlmError>> = content
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(fragments)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rule_matching() {
        let mock = MockLlmClient::new().with_rule("grammar", "{\"ok\":true}");
        let opts = GenerationOptions::default();
        let hit = mock.complete(&[Message::system("grammar expert")], &opts).await.unwrap();
        let miss = mock.complete(&[Message::system("other")], &opts).await.unwrap();
        assert_eq!(hit, "{\"ok\":true}");
        assert_eq!(miss, UNSTRUCTURED_REPLY);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let mock = MockLlmClient::new().with_sequence("q", vec!["a".into(), "b".into()]);
        let opts = GenerationOptions::default();
        let msgs = [Message::user("q")];
        assert_eq!(mock.complete(&msgs, &opts).await.unwrap(), "a");
        assert_eq!(mock.complete(&msgs, &opts).await.unwrap(), "b");
        assert_eq!(mock.complete(&msgs, &opts).await.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let mock = MockLlmClient::failing();
        let err = mock
            .complete(&[Message::user("x")], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Transport(_)));
    }
}
