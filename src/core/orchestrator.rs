//! 编排器：拥有会话表，按固定流程串联考官、评分编排与辅助 Agent
//!
//! 显式上下文对象，进程启动时构造一次并传给每个请求处理方；没有全局单例。
//! 1. start_speaking_session：Coach 激励 -> 考官开场 -> 建立会话
//! 2. process_user_response：查会话 -> Confidence 分析 -> 考官决定下一问 -> 追加回合
//! 3. end_session_and_score：查会话 -> 评分 -> 质检 -> 必要时合并修正 -> 反思 -> Coach 总结
//! 其余为无会话的直通调用。同一会话上的操作持有该会话的锁串行执行。

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::agents::{
    CoachAgent, CompositeScore, ConfidenceAgent, ConfidenceLevel, ContentAgent, ContentIdeas,
    CueCard, DailyPractice, DailyTopics, DailyVocabulary, ExaminerAction, ExaminerAgent,
    Generated, LanguageTutor, Motivation, PlannerAgent, Reflection, ReflectionAgent,
    ResponseEvaluation, Roadmap, RoadmapRequest, ScoreValidation, ScoringOrchestrator, StudyPlan,
};
use crate::config::AppConfig;
use crate::core::{
    AgentStateSnapshot, Exchange, Result, Session, SessionStore, SessionType,
};
use crate::llm::{GenerationService, LlmClient, MockLlmClient, OpenAiClient, TextStream};
use crate::memory::Message;

/// 未提供 current_band 时的默认当前分
const DEFAULT_CURRENT_BAND: f64 = 5.0;

/// 直接对话流的采样温度
const CHAT_TEMPERATURE: f32 = 0.7;

/// 开始会话的返回
#[derive(Debug, Clone, Serialize)]
pub struct SessionStart {
    pub session_id: String,
    pub motivation: Motivation,
    pub first_question: String,
    pub part: u8,
    pub topic: Option<String>,
    pub session_type: SessionType,
}

/// 一个回合的返回
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub next_question: String,
    pub part: u8,
    pub confidence_tips: Vec<String>,
    pub confidence_level: ConfidenceLevel,
    pub action: ExaminerAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// 从创建到评分完成的秒数
    pub duration_secs: i64,
    pub parts_completed: u8,
    pub exchanges: usize,
}

/// 结束会话的完整报告
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub score: CompositeScore,
    pub validation: ScoreValidation,
    /// 质检修正中实际生效的字段
    pub applied_corrections: Vec<String>,
    pub reflection: Reflection,
    pub coach_message: Motivation,
    pub session_summary: SessionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveSessions {
    pub count: usize,
    pub sessions: Vec<String>,
}

/// 根据配置选择生成后端：provider = mock 或找不到 API Key 时使用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM (configured)");
        return Arc::new(MockLlmClient::new());
    }

    let api_key = std::env::var(&cfg.llm.api_key_env)
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok()
        .filter(|k| !k.trim().is_empty());

    match api_key {
        Some(key) => {
            tracing::info!(model = %cfg.llm.model, "Using OpenAI-compatible LLM");
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                &key,
            ))
        }
        None => {
            tracing::warn!(
                env = %cfg.llm.api_key_env,
                "No API key set, using Mock LLM (all agents will return fallbacks)"
            );
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 编排器
pub struct Orchestrator {
    llm: GenerationService,
    examiner: ExaminerAgent,
    scorer: ScoringOrchestrator,
    planner: PlannerAgent,
    coach: CoachAgent,
    confidence: ConfidenceAgent,
    content: ContentAgent,
    reflection: ReflectionAgent,
    tutor: LanguageTutor,
    sessions: Arc<dyn SessionStore>,
}

impl Orchestrator {
    pub fn new(cfg: &AppConfig, client: Arc<dyn LlmClient>, sessions: Arc<dyn SessionStore>) -> Self {
        let llm = GenerationService::new(client, cfg.llm.timeouts.request, cfg.llm.max_tokens);
        let agents = &cfg.agents;
        Self {
            examiner: ExaminerAgent::new(llm.clone(), agents),
            scorer: ScoringOrchestrator::new(llm.clone(), agents),
            planner: PlannerAgent::new(llm.clone(), agents),
            coach: CoachAgent::new(llm.clone(), agents),
            confidence: ConfidenceAgent::new(llm.clone(), agents),
            content: ContentAgent::new(llm.clone(), agents),
            reflection: ReflectionAgent::new(llm.clone(), agents),
            tutor: LanguageTutor::new(llm.clone(), agents),
            llm,
            sessions,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.llm.backend_name()
    }

    pub fn tutor(&self) -> &LanguageTutor {
        &self.tutor
    }

    /// 开始会话：Coach 激励 -> 考官开场 -> 建立会话记录
    pub async fn start_speaking_session(
        &self,
        user_id: &str,
        profile: &Value,
        session_type: SessionType,
    ) -> Result<SessionStart> {
        let recent = profile
            .get("recent_performance")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let motivation = self.coach.provide_motivation(profile, &recent).await.into_inner();

        let (conversation, opening) = self.examiner.start_session(profile).await;

        let session_id = Session::generate_id(user_id);
        let session = Session::new(
            session_id.clone(),
            user_id,
            session_type,
            profile.clone(),
            conversation,
        );
        self.sessions.insert(session).await?;
        tracing::info!(session_id = %session_id, user_id, session_type = %session_type, "session started");

        Ok(SessionStart {
            session_id,
            motivation,
            first_question: opening.question,
            part: opening.part,
            topic: opening.topic,
            session_type,
        })
    }

    /// 处理一个回合；未知 id 返回 SessionNotFound，已结束的会话返回 SessionEnded
    pub async fn process_user_response(
        &self,
        session_id: &str,
        text: &str,
        metadata: &Value,
    ) -> Result<TurnOutcome> {
        let handle = self.sessions.get(session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_active()?;

        let confidence = self
            .confidence
            .analyze_confidence(metadata, None)
            .await
            .into_inner();
        let next = self
            .examiner
            .process_response(session.examiner_mut(), text, metadata)
            .await;

        let outcome = TurnOutcome {
            next_question: next.question.clone(),
            part: next.part,
            confidence_tips: confidence.recommendations.clone(),
            confidence_level: confidence.confidence_level,
            action: next.action,
        };

        session.push_exchange(Exchange {
            user_response: text.to_string(),
            metadata: metadata.clone(),
            confidence_analysis: confidence,
            examiner_response: next,
            timestamp: Utc::now(),
        })?;
        tracing::debug!(
            session_id,
            part = outcome.part,
            exchanges = session.exchanges().len(),
            "turn recorded"
        );
        Ok(outcome)
    }

    /// 结束并评分。可重复调用：每次都完整重跑流程并替换已存的综合分
    pub async fn end_session_and_score(
        &self,
        session_id: &str,
        transcript: &str,
        metadata: &Value,
    ) -> Result<SessionReport> {
        let handle = self.sessions.get(session_id).await?;
        let mut session = handle.lock().await;
        if session.is_ended() {
            tracing::info!(session_id, "re-scoring an ended session");
        }

        let mut score = self.scorer.score_response(transcript, metadata).await.into_inner();
        let validation = self.scorer.validate_score(&score).await.into_inner();

        let applied_corrections = if validation.should_apply() {
            let applied = score.apply_corrections(&validation.corrections);
            tracing::info!(session_id, fields = ?applied, issues = validation.issues.len(), "score corrected by validation");
            applied
        } else {
            Vec::new()
        };

        // 历史会话尚未持久化，始终传空
        let reflection = self
            .reflection
            .generate_reflection(&session.reflection_view(), &[])
            .await
            .into_inner();

        let performance = serde_json::to_value(&score).unwrap_or_else(|_| json!({}));
        let coach_message = self
            .coach
            .provide_motivation(&json!({ "current_band": score.overall_band }), &performance)
            .await
            .into_inner();

        session.finish(score.clone());
        let ended_at = session.ended_at().unwrap_or_else(Utc::now);
        let session_summary = SessionSummary {
            duration_secs: (ended_at - session.created_at).num_seconds().max(0),
            parts_completed: session.current_part(),
            exchanges: session.exchanges().len(),
        };
        tracing::info!(session_id, overall = %score.overall_band, "session scored");

        Ok(SessionReport {
            session_id: session_id.to_string(),
            score,
            validation,
            applied_corrections,
            reflection,
            coach_message,
            session_summary,
        })
    }

    /// 生成学习计划；current_band 取自 profile，缺省 5.0
    pub async fn generate_study_plan(
        &self,
        profile: &Value,
        target_band: f64,
        available_days: &[String],
    ) -> Generated<StudyPlan> {
        let current_band = profile
            .get("current_band")
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(DEFAULT_CURRENT_BAND);
        self.planner
            .create_study_plan(profile, target_band, available_days, current_band)
            .await
    }

    pub async fn adapt_study_plan(
        &self,
        plan: &StudyPlan,
        progress: &Value,
        missed_sessions: u32,
    ) -> Generated<StudyPlan> {
        self.planner.adapt_plan(plan, progress, missed_sessions).await
    }

    pub async fn get_content_ideas(&self, topic: &str, question_type: &str) -> Generated<ContentIdeas> {
        self.content.generate_ideas(topic, question_type).await
    }

    /// 按周的学习路线图；兜底为空周计划，预计分数等于目标分
    pub async fn generate_roadmap(&self, request: &RoadmapRequest) -> Generated<Roadmap> {
        self.planner.generate_roadmap(request).await
    }

    pub async fn get_daily_practice(&self, part: u8, date: &str) -> Generated<DailyPractice> {
        self.content.daily_practice(part, date).await
    }

    pub async fn get_daily_topics(&self) -> Generated<DailyTopics> {
        self.content.daily_topics().await
    }

    pub async fn get_daily_vocabulary(&self) -> Generated<DailyVocabulary> {
        self.content.daily_vocabulary().await
    }

    pub async fn generate_cue_card(&self, profile: &Value) -> Generated<CueCard> {
        self.examiner.generate_cue_card(profile).await
    }

    pub async fn evaluate_response(&self, text: &str, criteria: &str) -> Generated<ResponseEvaluation> {
        self.examiner.evaluate_response(text, criteria).await
    }

    /// 面向用户的流式对话
    pub async fn stream_chat(&self, messages: &[Message]) -> TextStream {
        self.llm.generate_stream(messages, CHAT_TEMPERATURE).await
    }

    /// 所有 Agent 的状态快照
    pub fn agents_status(&self) -> Vec<AgentStateSnapshot> {
        let mut all = vec![self.examiner.core().snapshot()];
        all.extend(self.scorer.snapshots());
        all.extend([
            self.planner.core().snapshot(),
            self.coach.core().snapshot(),
            self.confidence.core().snapshot(),
            self.content.core().snapshot(),
            self.reflection.core().snapshot(),
            self.tutor.core().snapshot(),
        ]);
        all
    }

    pub async fn active_sessions(&self) -> ActiveSessions {
        let sessions = self.sessions.ids().await;
        ActiveSessions {
            count: sessions.len(),
            sessions,
        }
    }

    /// 会话只读快照
    pub async fn session(&self, session_id: &str) -> Result<Session> {
        let handle = self.sessions.get(session_id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }
}
