//! Agent 记忆：观察 / 决策 / 行动 / 反思 四条追加式序列
//!
//! 每条记录带时间戳与因果前驱（caused_by）；只追加，不修改、不删除。
//! 对 prompt 只暴露「最近 N 条」窗口，保证上下文大小有界。记忆是参考性上下文，不参与控制流。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::AgentRole;

/// 记录类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Observation,
    Decision,
    Action,
    Reflection,
}

/// 单条记忆
#[derive(Clone, Debug, Serialize)]
pub struct MemoryEntry {
    /// Agent 内单调递增序号
    pub seq: u64,
    pub kind: MemoryKind,
    pub agent: AgentRole,
    pub timestamp: DateTime<Utc>,
    /// 因果前驱的 seq（如决策基于哪条观察）
    pub caused_by: Option<u64>,
    pub payload: serde_json::Value,
}

/// 单个 Agent 独占的记忆日志
#[derive(Clone, Debug, Default, Serialize)]
pub struct AgentMemory {
    observations: Vec<MemoryEntry>,
    decisions: Vec<MemoryEntry>,
    actions: Vec<MemoryEntry>,
    reflections: Vec<MemoryEntry>,
    #[serde(skip)]
    next_seq: u64,
    /// 关闭时只分配序号，不保存条目
    #[serde(skip)]
    disabled: bool,
}

impl AgentMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 不记录任何条目的记忆（行为上与启用时一致，仅不留痕）
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// 追加一条记录，返回其 seq
    pub fn append(
        &mut self,
        kind: MemoryKind,
        agent: AgentRole,
        caused_by: Option<u64>,
        payload: serde_json::Value,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.disabled {
            return seq;
        }
        let entry = MemoryEntry {
            seq,
            kind,
            agent,
            timestamp: Utc::now(),
            caused_by,
            payload,
        };
        self.sequence_mut(kind).push(entry);
        seq
    }

    fn sequence_mut(&mut self, kind: MemoryKind) -> &mut Vec<MemoryEntry> {
        match kind {
            MemoryKind::Observation => &mut self.observations,
            MemoryKind::Decision => &mut self.decisions,
            MemoryKind::Action => &mut self.actions,
            MemoryKind::Reflection => &mut self.reflections,
        }
    }

    fn sequence(&self, kind: MemoryKind) -> &[MemoryEntry] {
        match kind {
            MemoryKind::Observation => &self.observations,
            MemoryKind::Decision => &self.decisions,
            MemoryKind::Action => &self.actions,
            MemoryKind::Reflection => &self.reflections,
        }
    }

    /// 某类记录的最近 limit 条
    pub fn recent(&self, kind: MemoryKind, limit: usize) -> &[MemoryEntry] {
        super::recent_window(self.sequence(kind), limit)
    }

    pub fn len(&self, kind: MemoryKind) -> usize {
        self.sequence(kind).len()
    }

    pub fn total(&self) -> usize {
        self.observations.len() + self.decisions.len() + self.actions.len() + self.reflections.len()
    }

    /// 构建供 prompt 使用的记忆片段（Recent Observations / Decisions / Reflections）
    pub fn to_prompt_section(&self, agent: AgentRole, limit: usize) -> String {
        let mut s = format!("Agent Role: {}\n\n", agent.as_str());
        for (title, kind) in [
            ("Recent Observations", MemoryKind::Observation),
            ("Recent Decisions", MemoryKind::Decision),
            ("Recent Reflections", MemoryKind::Reflection),
        ] {
            s.push_str(title);
            s.push_str(":\n");
            for entry in self.recent(kind, limit) {
                s.push_str(&format!("- {}\n", entry.payload));
            }
            s.push('\n');
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_links_predecessor() {
        let mut memory = AgentMemory::new();
        let obs = memory.append(MemoryKind::Observation, AgentRole::Fluency, None, json!({"t": 1}));
        let dec = memory.append(MemoryKind::Decision, AgentRole::Fluency, Some(obs), json!({"d": 1}));
        assert_eq!(memory.len(MemoryKind::Observation), 1);
        assert_eq!(memory.recent(MemoryKind::Decision, 10)[0].caused_by, Some(obs));
        assert!(dec > obs);
    }

    #[test]
    fn test_recent_window_is_bounded() {
        let mut memory = AgentMemory::new();
        for i in 0..30 {
            memory.append(MemoryKind::Observation, AgentRole::Coach, None, json!(i));
        }
        let recent = memory.recent(MemoryKind::Observation, 10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].payload, json!(20));
        assert_eq!(memory.len(MemoryKind::Observation), 30);
    }

    #[test]
    fn test_disabled_memory_keeps_nothing() {
        let mut memory = AgentMemory::disabled();
        let a = memory.append(MemoryKind::Action, AgentRole::Examiner, None, json!({}));
        let b = memory.append(MemoryKind::Action, AgentRole::Examiner, None, json!({}));
        assert_eq!(memory.total(), 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_prompt_section_lists_recent_entries() {
        let mut memory = AgentMemory::new();
        memory.append(MemoryKind::Observation, AgentRole::Grammar, None, json!("saw transcript"));
        let section = memory.to_prompt_section(AgentRole::Grammar, 5);
        assert!(section.contains("Agent Role: grammar"));
        assert!(section.contains("saw transcript"));
    }
}
