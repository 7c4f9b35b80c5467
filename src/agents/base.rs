//! AgentCore：所有 Agent 共享的骨架
//!
//! 持有角色、生成能力与自身状态（含记忆）；提供 observe / decide / act / reflect 四个记录入口，
//! 以及统一的结构化生成 generate_structured：调用生成能力 -> 解析 -> 失败则换成兜底值。

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::{json, Value};

use crate::agents::structured::{parse_structured, Generated, Structured};
use crate::config::AgentsSection;
use crate::core::{AgentRole, AgentState, AgentStateSnapshot};
use crate::llm::GenerationService;
use crate::memory::{MemoryKind, Message};

pub struct AgentCore {
    role: AgentRole,
    llm: GenerationService,
    state: Mutex<AgentState>,
    memory_window: usize,
    include_memory_in_prompts: bool,
}

impl AgentCore {
    pub fn new(role: AgentRole, llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            role,
            llm,
            state: Mutex::new(AgentState::new(role, settings.memory_enabled)),
            memory_window: settings.memory_window,
            include_memory_in_prompts: settings.include_memory_in_prompts,
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn llm(&self) -> &GenerationService {
        &self.llm
    }

    fn state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> AgentStateSnapshot {
        self.state().snapshot()
    }

    pub fn set_confidence(&self, confidence: f32) {
        self.state().confidence = confidence.clamp(0.0, 1.0);
    }

    fn record(&self, kind: MemoryKind, caused_by: Option<u64>, payload: Value) -> u64 {
        let role = self.role;
        self.state().memory.append(kind, role, caused_by, payload)
    }

    /// 记录对输入的观察
    pub fn observe(&self, context: Value) -> u64 {
        self.record(MemoryKind::Observation, None, context)
    }

    /// 记录基于某条观察的决策
    pub fn decide(&self, based_on: Option<u64>, decision: Value) -> u64 {
        self.record(MemoryKind::Decision, based_on, decision)
    }

    /// 记录执行的动作并更新 last_action
    pub fn act(&self, decision: Option<u64>, action: Value) -> u64 {
        let seq = self.record(MemoryKind::Action, decision, action);
        self.state().last_action = Some(Utc::now());
        seq
    }

    /// 记录对动作结果的反思
    pub fn reflect(&self, action: Option<u64>, outcome: Value) -> u64 {
        self.record(
            MemoryKind::Reflection,
            action,
            json!({ "outcome": outcome, "learnings": [] }),
        )
    }

    /// 最近记忆窗口（prompt 片段）
    pub fn memory_context(&self) -> String {
        self.state().memory.to_prompt_section(self.role, self.memory_window)
    }

    fn compose(&self, prompt: String) -> Vec<Message> {
        if self.include_memory_in_prompts {
            let memory = self.memory_context();
            vec![Message::system(format!("{prompt}\n\n{memory}"))]
        } else {
            vec![Message::system(prompt)]
        }
    }

    /// 结构化生成：解析失败（或生成能力已兜底为非目标形状）时返回 Generated::Fallback
    pub async fn generate_structured<T, F>(
        &self,
        prompt: String,
        temperature: f32,
        fallback: F,
    ) -> Generated<T>
    where
        T: Structured,
        F: FnOnce() -> T,
    {
        let messages = self.compose(prompt);
        self.generate_structured_from(&messages, temperature, |_| fallback())
            .await
    }

    /// 以完整消息序列做结构化生成；兜底值可使用原始输出
    pub async fn generate_structured_from<T, F>(
        &self,
        messages: &[Message],
        temperature: f32,
        fallback: F,
    ) -> Generated<T>
    where
        T: Structured,
        F: FnOnce(&str) -> T,
    {
        let raw = self.llm.generate(messages, temperature).await;
        match parse_structured::<T>(&raw) {
            Ok(value) => {
                tracing::debug!(agent = self.role.as_str(), "structured output parsed");
                Generated::Parsed(value)
            }
            Err(e) => {
                tracing::warn!(agent = self.role.as_str(), error = %e, "structured output rejected, using fallback");
                Generated::Fallback {
                    value: fallback(&raw),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// 自由文本生成（不解析）
    pub async fn generate_text(&self, messages: &[Message], temperature: f32) -> String {
        self.llm.generate(messages, temperature).await
    }
}

/// 把 Generated 结果写入 decision/action 记忆时使用的标记
pub(crate) fn outcome_label<T>(generated: &Generated<T>) -> &'static str {
    if generated.is_fallback() {
        "fallback"
    } else {
        "parsed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde::Deserialize;

    use crate::llm::MockLlmClient;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Answer {
        value: u32,
    }

    impl Structured for Answer {
        fn validate(&self) -> Result<(), String> {
            if self.value == 0 {
                Err("value must be positive".into())
            } else {
                Ok(())
            }
        }
    }

    fn core_with(mock: MockLlmClient, settings: &AgentsSection) -> AgentCore {
        let llm = GenerationService::new(Arc::new(mock), 5, 512);
        AgentCore::new(AgentRole::Content, llm, settings)
    }

    #[tokio::test]
    async fn test_generate_structured_parsed() {
        let core = core_with(
            MockLlmClient::new().with_rule("answer", "```json\n{\"value\": 7}\n```"),
            &AgentsSection::default(),
        );
        let out = core
            .generate_structured("give an answer".into(), 0.1, || Answer { value: 1 })
            .await;
        assert_eq!(out, Generated::Parsed(Answer { value: 7 }));
    }

    #[tokio::test]
    async fn test_generate_structured_fallback_on_validation() {
        let core = core_with(
            MockLlmClient::new().with_rule("answer", "{\"value\": 0}"),
            &AgentsSection::default(),
        );
        let out = core
            .generate_structured("give an answer".into(), 0.1, || Answer { value: 1 })
            .await;
        assert!(out.is_fallback());
        assert_eq!(out.into_inner(), Answer { value: 1 });
    }

    #[tokio::test]
    async fn test_memory_in_prompt_when_enabled() {
        let settings = AgentsSection {
            include_memory_in_prompts: true,
            ..AgentsSection::default()
        };
        let mock = Arc::new(MockLlmClient::new());
        let llm = GenerationService::new(mock.clone(), 5, 512);
        let core = AgentCore::new(AgentRole::Coach, llm, &settings);
        core.observe(json!({"note": "first observation"}));
        let _ = core
            .generate_structured("prompt".into(), 0.1, || Answer { value: 1 })
            .await;
        assert!(mock.prompts()[0].contains("first observation"));
    }

    #[test]
    fn test_lifecycle_records_chain() {
        let llm = GenerationService::new(Arc::new(MockLlmClient::new()), 5, 512);
        let core = AgentCore::new(AgentRole::Grammar, llm, &AgentsSection::default());
        let obs = core.observe(json!({"transcript": "hi"}));
        let dec = core.decide(Some(obs), json!({}));
        core.act(Some(dec), json!({}));
        core.reflect(None, json!({}));
        let snap = core.snapshot();
        assert_eq!(
            (snap.observations, snap.decisions, snap.actions, snap.reflections),
            (1, 1, 1, 1)
        );
        assert!(snap.last_action.is_some());
    }
}
