//! 对话消息与追加式对话日志
//!
//! Message/Role 与 LLM API 一致；ConversationLog 只追加不裁剪，
//! 供 prompt 使用的「最近 N 条」通过纯函数 recent_window 取得，存储本身从不截断。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 取序列末尾至多 n 个元素
pub fn recent_window<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

/// 追加式对话日志：条目只追加，不修改、不删除
#[derive(Clone, Debug, Serialize)]
#[serde(transparent)]
pub struct ConversationLog<T> {
    entries: Vec<T>,
}

impl<T> ConversationLog<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: T) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    /// 最近 n 条（prompt 上下文用）
    pub fn recent(&self, n: usize) -> &[T] {
        recent_window(&self.entries, n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for ConversationLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_window_shorter_than_n() {
        let items = [1, 2, 3];
        assert_eq!(recent_window(&items, 5), &[1, 2, 3]);
        assert_eq!(recent_window(&items, 2), &[2, 3]);
        assert!(recent_window(&items, 0).is_empty());
    }

    #[test]
    fn test_log_keeps_full_history() {
        let mut log = ConversationLog::new();
        for i in 0..12 {
            log.push(i);
        }
        assert_eq!(log.len(), 12);
        assert_eq!(log.recent(5), &[7, 8, 9, 10, 11]);
        assert_eq!(log.entries()[0], 0);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::system("hi")).unwrap();
        assert!(json.contains("\"system\""));
    }
}
