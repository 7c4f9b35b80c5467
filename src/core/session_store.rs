//! 会话存储：按 id 查找会话，未命中即 SessionNotFound（从不隐式创建）
//!
//! 每个会话包在独立的 tokio Mutex 中：同一会话上的修改串行执行，不同会话互不阻塞。
//! 表本身的 RwLock 只在插入/查找时短暂持有，不会跨越任何生成调用。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::core::{CoachError, Result, Session};

/// 单个会话的共享句柄；持锁期间独占该会话
pub type SessionHandle = Arc<Mutex<Session>>;

/// 会话存储接口，可替换为持久化实现而不影响 Agent 逻辑
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 插入新会话；id 已存在时报错
    async fn insert(&self, session: Session) -> Result<SessionHandle>;

    /// 按 id 查找；未知 id 返回 SessionNotFound
    async fn get(&self, id: &str) -> Result<SessionHandle>;

    /// 当前所有会话 id（按字典序）
    async fn ids(&self) -> Vec<String>;

    async fn len(&self) -> usize;
}

/// 进程内存储
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session) -> Result<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(CoachError::Internal(format!("duplicate session id: {}", session.id)));
        }
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(id, handle.clone());
        Ok(handle)
    }

    async fn get(&self, id: &str) -> Result<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoachError::SessionNotFound(id.to_string()))
    }

    async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::agents::ExaminerConversation;
    use crate::core::{ErrorKind, SessionType};

    fn session(id: &str) -> Session {
        Session::new(
            id.to_string(),
            "7",
            SessionType::Practice,
            json!({}),
            ExaminerConversation::new(),
        )
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let store = InMemorySessionStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, CoachError::SessionNotFound(ref id) if id == "nope"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_insert_get_and_duplicates() {
        let store = InMemorySessionStore::new();
        store.insert(session("b")).await.unwrap();
        store.insert(session("a")).await.unwrap();
        assert!(store.insert(session("a")).await.is_err());
        assert_eq!(store.ids().await, vec!["a".to_string(), "b".to_string()]);
        let handle = store.get("a").await.unwrap();
        assert_eq!(handle.lock().await.user_id, "7");
    }

    #[tokio::test]
    async fn test_sessions_lock_independently() {
        let store = InMemorySessionStore::new();
        store.insert(session("a")).await.unwrap();
        store.insert(session("b")).await.unwrap();
        let a = store.get("a").await.unwrap();
        let _held = a.lock().await;
        // a 被占用时 b 仍可立即获取
        let b = store.get("b").await.unwrap();
        assert!(b.try_lock().is_ok());
        assert!(a.try_lock().is_err());
    }
}
