//! Agent 状态与快照
//!
//! AgentState 由各 Agent 自己持有并修改；对外（状态查询、会话记录）只给轻量的 AgentStateSnapshot。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::memory::{AgentMemory, MemoryKind};

/// Agent 角色（每个角色进程内一个长期实例）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Examiner,
    Fluency,
    Grammar,
    Vocabulary,
    Pronunciation,
    Planner,
    Coach,
    /// 评分编排与质检
    Qa,
    Confidence,
    Content,
    Reflection,
    Tutor,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Examiner => "examiner",
            AgentRole::Fluency => "fluency",
            AgentRole::Grammar => "grammar",
            AgentRole::Vocabulary => "vocabulary",
            AgentRole::Pronunciation => "pronunciation",
            AgentRole::Planner => "planner",
            AgentRole::Coach => "coach",
            AgentRole::Qa => "qa",
            AgentRole::Confidence => "confidence",
            AgentRole::Content => "content",
            AgentRole::Reflection => "reflection",
            AgentRole::Tutor => "tutor",
        }
    }
}

/// Agent 当前状态
#[derive(Clone, Debug)]
pub struct AgentState {
    pub role: AgentRole,
    pub active: bool,
    /// 自评置信度
    pub confidence: f32,
    pub last_action: Option<DateTime<Utc>>,
    pub memory: AgentMemory,
}

impl AgentState {
    pub fn new(role: AgentRole, memory_enabled: bool) -> Self {
        Self {
            role,
            active: true,
            confidence: 1.0,
            last_action: None,
            memory: if memory_enabled {
                AgentMemory::new()
            } else {
                AgentMemory::disabled()
            },
        }
    }

    pub fn snapshot(&self) -> AgentStateSnapshot {
        AgentStateSnapshot {
            role: self.role,
            active: self.active,
            confidence: self.confidence,
            last_action: self.last_action,
            observations: self.memory.len(MemoryKind::Observation),
            decisions: self.memory.len(MemoryKind::Decision),
            actions: self.memory.len(MemoryKind::Action),
            reflections: self.memory.len(MemoryKind::Reflection),
        }
    }
}

/// 状态快照（不含记忆内容，只含条数）
#[derive(Clone, Debug, Serialize)]
pub struct AgentStateSnapshot {
    pub role: AgentRole,
    pub active: bool,
    pub confidence: f32,
    pub last_action: Option<DateTime<Utc>>,
    pub observations: usize,
    pub decisions: usize,
    pub actions: usize,
    pub reflections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_counts_memory() {
        let mut state = AgentState::new(AgentRole::Coach, true);
        state
            .memory
            .append(MemoryKind::Observation, AgentRole::Coach, None, json!({}));
        let snap = state.snapshot();
        assert_eq!(snap.observations, 1);
        assert_eq!(snap.decisions, 0);
        assert!(snap.active);
        assert_eq!(snap.confidence, 1.0);
    }

    #[test]
    fn test_role_serializes_as_str() {
        assert_eq!(serde_json::to_value(AgentRole::Qa).unwrap(), json!("qa"));
        assert_eq!(AgentRole::Pronunciation.as_str(), "pronunciation");
    }
}
