//! 会话记录：一次完整的口语练习/模考，从开场到评分
//!
//! 会话只由 Orchestrator 修改，且只有三种修改：追加回合、推进考官对话状态、结束时写入综合分。
//! 结束后不再接受新回合，但记录保留供查询与反思。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::{CompositeScore, ConfidenceAnalysis, ExaminerConversation, NextQuestion};
use crate::core::{CoachError, Result};

/// 会话类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    #[default]
    Practice,
    Mock,
    Exam,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Practice => "practice",
            SessionType::Mock => "mock",
            SessionType::Exam => "exam",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = CoachError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "practice" => Ok(SessionType::Practice),
            "mock" => Ok(SessionType::Mock),
            "exam" => Ok(SessionType::Exam),
            other => Err(CoachError::Internal(format!("unknown session type: {other}"))),
        }
    }
}

/// 一个回合（追加后不再修改）
#[derive(Clone, Debug, Serialize)]
pub struct Exchange {
    pub user_response: String,
    pub metadata: Value,
    pub confidence_analysis: ConfidenceAnalysis,
    pub examiner_response: NextQuestion,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// 会话记录
#[derive(Clone, Debug, Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub session_type: SessionType,
    pub created_at: DateTime<Utc>,
    pub profile: Value,
    examiner: ExaminerConversation,
    exchanges: Vec<Exchange>,
    status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<CompositeScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        id: String,
        user_id: impl Into<String>,
        session_type: SessionType,
        profile: Value,
        examiner: ExaminerConversation,
    ) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            session_type,
            created_at: Utc::now(),
            profile,
            examiner,
            exchanges: Vec::new(),
            status: SessionStatus::Active,
            score: None,
            ended_at: None,
        }
    }

    /// 会话 id：用户 id + 创建时刻（微秒）+ 随机后缀，同一微秒内也不会冲突
    pub fn generate_id(user_id: &str) -> String {
        let micros = Utc::now().timestamp_micros();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}_{}", user_id, micros, &suffix[..8])
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn examiner(&self) -> &ExaminerConversation {
        &self.examiner
    }

    pub(crate) fn examiner_mut(&mut self) -> &mut ExaminerConversation {
        &mut self.examiner
    }

    pub fn current_part(&self) -> u8 {
        self.examiner.current_part()
    }

    pub fn score(&self) -> Option<&CompositeScore> {
        self.score.as_ref()
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// 已结束的会话不再接受新回合
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_ended() {
            return Err(CoachError::SessionEnded(self.id.clone()));
        }
        Ok(())
    }

    pub(crate) fn push_exchange(&mut self, exchange: Exchange) -> Result<()> {
        self.ensure_active()?;
        self.exchanges.push(exchange);
        Ok(())
    }

    /// 写入（或在重新评分时替换）综合分并标记结束
    pub(crate) fn finish(&mut self, score: CompositeScore) {
        self.score = Some(score);
        self.status = SessionStatus::Ended;
        self.ended_at.get_or_insert_with(Utc::now);
    }

    /// 候选人所有回答按顺序拼接
    pub fn transcript(&self) -> String {
        self.exchanges
            .iter()
            .map(|e| e.user_response.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 交给 Reflection Agent 的会话视图
    pub fn reflection_view(&self) -> Value {
        serde_json::json!({
            "user_id": self.user_id,
            "type": self.session_type,
            "started_at": self.created_at,
            "current_part": self.current_part(),
            "exchanges": self.exchanges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_type_parse() {
        assert_eq!("Mock".parse::<SessionType>().unwrap(), SessionType::Mock);
        assert!("quiz".parse::<SessionType>().is_err());
        assert_eq!(serde_json::to_value(SessionType::Exam).unwrap(), json!("exam"));
    }

    #[test]
    fn test_generated_ids_are_unique_and_prefixed() {
        let a = Session::generate_id("42");
        let b = Session::generate_id("42");
        assert!(a.starts_with("42_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_new_session_is_active_in_part_one() {
        let session = Session::new(
            "s1".into(),
            "1",
            SessionType::Practice,
            json!({}),
            ExaminerConversation::new(),
        );
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.current_part(), 1);
        assert!(session.ensure_active().is_ok());
        assert!(session.transcript().is_empty());
    }
}
