//! 考官 Agent：开场提问、按对话自适应追问、决定何时进入下一 Part
//!
//! 考官本身是无状态单例；每个会话的对话状态（当前 Part + 完整对话历史）保存在 [`ExaminerConversation`] 中，
//! 由会话持有，只通过本模块的方法修改。Part 只增不减，且只在生成能力选择 transition 时 +1；
//! 已在 Part 3 时的 transition 降级为 new_topic。历史完整保留，prompt 中只携带最近窗口。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agents::base::{outcome_label, AgentCore};
use crate::agents::structured::{Band, Generated, Structured};
use crate::config::AgentsSection;
use crate::core::AgentRole;
use crate::llm::GenerationService;
use crate::memory::ConversationLog;

/// 口语考试的最后一个 Part
pub const FINAL_PART: u8 = 3;

/// 对话中的发言方
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Examiner,
}

/// 一条对话记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Speaker,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<u8>,
}

/// 单个会话的考官状态
#[derive(Clone, Debug, Serialize)]
pub struct ExaminerConversation {
    current_part: u8,
    history: ConversationLog<Turn>,
}

impl ExaminerConversation {
    pub fn new() -> Self {
        Self {
            current_part: 1,
            history: ConversationLog::new(),
        }
    }

    pub fn current_part(&self) -> u8 {
        self.current_part
    }

    pub fn history(&self) -> &[Turn] {
        self.history.entries()
    }

    /// 进入下一 Part；已是最后一个 Part 时返回 false
    fn advance(&mut self) -> bool {
        if self.current_part >= FINAL_PART {
            return false;
        }
        self.current_part += 1;
        true
    }
}

impl Default for ExaminerConversation {
    fn default() -> Self {
        Self::new()
    }
}

/// 考官在一轮之后的选择
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExaminerAction {
    FollowUp,
    NewTopic,
    Transition,
}

#[derive(Debug, Deserialize)]
struct OpeningDecision {
    question: String,
    #[serde(default)]
    topic: Option<String>,
}

impl Structured for OpeningDecision {
    fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("empty opening question".into());
        }
        Ok(())
    }
}

/// 会话开场问题
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpeningQuestion {
    pub question: String,
    pub part: u8,
    pub topic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TurnDecision {
    action: ExaminerAction,
    next_question: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    topic: Option<String>,
}

impl Structured for TurnDecision {
    fn validate(&self) -> Result<(), String> {
        if self.next_question.trim().is_empty() {
            return Err("empty next question".into());
        }
        Ok(())
    }
}

impl TurnDecision {
    fn fallback() -> Self {
        Self {
            action: ExaminerAction::FollowUp,
            next_question: "That's interesting. Can you tell me more about that?".into(),
            reasoning: "Continue conversation".into(),
            topic: Some("general".into()),
        }
    }
}

/// 处理一轮回答后的下一问
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NextQuestion {
    pub question: String,
    pub part: u8,
    pub action: ExaminerAction,
    pub reasoning: String,
    pub topic: Option<String>,
}

/// Part 2 话题卡
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CueCard {
    pub topic: String,
    pub points: Vec<String>,
    #[serde(skip_deserializing, default = "CueCard::preparation_secs")]
    pub preparation_time: u32,
    #[serde(skip_deserializing, default = "CueCard::speaking_secs")]
    pub speaking_time: u32,
}

impl Structured for CueCard {
    fn validate(&self) -> Result<(), String> {
        if !(3..=4).contains(&self.points.len()) {
            return Err(format!("cue card needs 3-4 points, got {}", self.points.len()));
        }
        Ok(())
    }
}

impl CueCard {
    fn preparation_secs() -> u32 {
        60
    }

    fn speaking_secs() -> u32 {
        120
    }

    pub fn fallback() -> Self {
        Self {
            topic: "Describe a memorable event in your life".into(),
            points: vec![
                "When and where it happened".into(),
                "Who was involved".into(),
                "What happened".into(),
                "Why it was memorable".into(),
            ],
            preparation_time: Self::preparation_secs(),
            speaking_time: Self::speaking_secs(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationExamples {
    #[serde(default)]
    pub good: Vec<String>,
    #[serde(default)]
    pub needs_work: Vec<String>,
}

/// 单条回答的独立评估
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEvaluation {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub examples: EvaluationExamples,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub preliminary_band: Band,
}

impl Structured for ResponseEvaluation {}

impl ResponseEvaluation {
    pub fn fallback() -> Self {
        Self {
            strengths: vec!["Response provided".into()],
            weaknesses: vec!["Needs more detail".into()],
            examples: EvaluationExamples::default(),
            suggestions: vec!["Expand your answers".into()],
            preliminary_band: Band::neutral(),
        }
    }
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// 考官 Agent
pub struct ExaminerAgent {
    core: AgentCore,
    history_window: usize,
}

impl ExaminerAgent {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Examiner, llm, settings),
            history_window: settings.history_window,
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    /// 新会话：返回全新的对话状态与 Part 1 开场问题（开场问题记入历史）
    pub async fn start_session(&self, profile: &Value) -> (ExaminerConversation, OpeningQuestion) {
        let obs = self.core.observe(json!({
            "user_profile": profile,
            "part": 1,
            "action": "start_session",
        }));

        let prompt = format!(
            r#"You are an IELTS speaking examiner starting Part 1.

User Profile: {profile}

Generate an appropriate opening question for IELTS Speaking Part 1.
Topics: work/study, hometown, hobbies, daily routine, etc.

Return JSON:
{{
    "question": "your question here",
    "part": 1,
    "topic": "topic name",
    "expected_duration": "30-60 seconds"
}}"#,
            profile = pretty(profile)
        );

        let decision = self
            .core
            .generate_structured(prompt, 0.7, || OpeningDecision {
                question: "Let's begin. Can you tell me about your work or studies?".into(),
                topic: Some("work_study".into()),
            })
            .await;
        let label = outcome_label(&decision);
        let decision = decision.into_inner();

        let mut conversation = ExaminerConversation::new();
        conversation.history.push(Turn {
            role: Speaker::Examiner,
            content: decision.question.clone(),
            metadata: None,
            part: Some(1),
        });

        let dec = self.core.decide(Some(obs), json!({ "topic": decision.topic, "outcome": label }));
        self.core.act(
            Some(dec),
            json!({ "type": "ask_question", "question": decision.question }),
        );

        let opening = OpeningQuestion {
            question: decision.question,
            part: 1,
            topic: decision.topic,
        };
        (conversation, opening)
    }

    /// 处理一轮回答：记录回答 -> 决定动作与下一问 -> 必要时进入下一 Part -> 记录考官发言
    pub async fn process_response(
        &self,
        conversation: &mut ExaminerConversation,
        user_response: &str,
        metadata: &Value,
    ) -> NextQuestion {
        let part = conversation.current_part;
        let obs = self.core.observe(json!({
            "user_response": user_response,
            "metadata": metadata,
            "current_part": part,
            "history_len": conversation.history.len(),
        }));

        conversation.history.push(Turn {
            role: Speaker::User,
            content: user_response.to_string(),
            metadata: Some(metadata.clone()),
            part: Some(part),
        });

        let prompt = format!(
            r#"You are an IELTS speaking examiner in Part {part}.

Conversation so far:
{history}

User's last response: "{user_response}"
Metadata: {metadata}

Based on the conversation flow and IELTS format:
1. Decide if you should:
   - Ask a follow-up question (same topic)
   - Move to a new topic (still Part {part})
   - Transition to Part {next_part} (if Part {part} is complete)

2. Generate the next question naturally

Return JSON:
{{
    "action": "follow_up|new_topic|transition",
    "next_question": "your question",
    "part": {part},
    "reasoning": "why you chose this action",
    "topic": "topic name"
}}"#,
            history = pretty(conversation.history.recent(self.history_window)),
            metadata = pretty(metadata),
            next_part = part + 1,
        );

        let decision = self
            .core
            .generate_structured(prompt, 0.7, TurnDecision::fallback)
            .await;
        let label = outcome_label(&decision);
        let mut decision = decision.into_inner();

        if decision.action == ExaminerAction::Transition && !conversation.advance() {
            tracing::debug!(part, "transition requested in final part, treated as new topic");
            decision.action = ExaminerAction::NewTopic;
        }
        if decision.action == ExaminerAction::Transition {
            tracing::info!(from = part, to = conversation.current_part, "examiner part transition");
        }

        let dec = self.core.decide(
            Some(obs),
            json!({ "action": decision.action, "outcome": label }),
        );
        self.core.act(
            Some(dec),
            json!({ "type": "ask_question", "question": decision.next_question }),
        );

        conversation.history.push(Turn {
            role: Speaker::Examiner,
            content: decision.next_question.clone(),
            metadata: None,
            part: Some(conversation.current_part),
        });

        NextQuestion {
            question: decision.next_question,
            part: conversation.current_part,
            action: decision.action,
            reasoning: decision.reasoning,
            topic: decision.topic,
        }
    }

    /// 生成 Part 2 话题卡（无状态）
    pub async fn generate_cue_card(&self, profile: &Value) -> Generated<CueCard> {
        let prompt = format!(
            r#"Generate an IELTS Speaking Part 2 cue card.

User Profile: {profile}

Create a cue card with:
- Main topic
- 3-4 bullet points to cover
- Preparation time: 1 minute
- Speaking time: 2 minutes

Return JSON:
{{
    "topic": "Describe a...",
    "points": ["point 1", "point 2", "point 3"],
    "preparation_time": 60,
    "speaking_time": 120
}}"#,
            profile = pretty(profile)
        );
        self.core
            .generate_structured(prompt, 0.8, CueCard::fallback)
            .await
    }

    /// 按指定标准独立评估一条回答（不影响会话）
    pub async fn evaluate_response(&self, user_response: &str, criteria: &str) -> Generated<ResponseEvaluation> {
        let prompt = format!(
            r#"You are an IELTS examiner evaluating a response.

User's Response: "{user_response}"

Evaluate based on IELTS {criteria} criteria.

Provide:
1. Strengths
2. Weaknesses
3. Specific examples from the response
4. Improvement suggestions

Return JSON:
{{
    "strengths": ["strength 1", "strength 2"],
    "weaknesses": ["weakness 1", "weakness 2"],
    "examples": {{"good": ["example"], "needs_work": ["example"]}},
    "suggestions": ["suggestion 1", "suggestion 2"],
    "preliminary_band": "estimated band (5.0-9.0)"
}}"#
        );
        self.core
            .generate_structured(prompt, 0.3, ResponseEvaluation::fallback)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::llm::MockLlmClient;

    fn examiner(mock: MockLlmClient) -> ExaminerAgent {
        ExaminerAgent::new(
            GenerationService::new(Arc::new(mock), 5, 1024),
            &AgentsSection::default(),
        )
    }

    fn decision(action: &str, question: &str) -> String {
        format!(
            r#"{{"action": "{action}", "next_question": "{question}", "part": 1, "reasoning": "r", "topic": "t"}}"#
        )
    }

    #[tokio::test]
    async fn test_start_session_fallback_question() {
        let agent = examiner(MockLlmClient::new());
        let (conversation, opening) = agent.start_session(&json!({})).await;
        assert_eq!(opening.part, 1);
        assert_eq!(
            opening.question,
            "Let's begin. Can you tell me about your work or studies?"
        );
        assert_eq!(opening.topic.as_deref(), Some("work_study"));
        assert_eq!(conversation.current_part(), 1);
        assert_eq!(conversation.history().len(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_follows_up_in_same_part() {
        let agent = examiner(MockLlmClient::new());
        let mut conversation = ExaminerConversation::new();
        let next = agent
            .process_response(&mut conversation, "I work in a bank", &json!({}))
            .await;
        assert_eq!(next.action, ExaminerAction::FollowUp);
        assert_eq!(next.part, 1);
        assert_eq!(next.question, "That's interesting. Can you tell me more about that?");
        assert_eq!(conversation.history().len(), 2);
        assert_eq!(conversation.history()[0].role, Speaker::User);
        assert_eq!(conversation.history()[1].role, Speaker::Examiner);
    }

    #[tokio::test]
    async fn test_part_is_monotonic_and_capped() {
        let mock = MockLlmClient::new().with_sequence(
            "speaking examiner in Part",
            vec![
                decision("follow_up", "q1"),
                decision("transition", "q2"),
                decision("new_topic", "q3"),
                decision("transition", "q4"),
                decision("transition", "q5"),
            ],
        );
        let agent = examiner(mock);
        let mut conversation = ExaminerConversation::new();
        let mut parts = Vec::new();
        let mut actions = Vec::new();
        for _ in 0..5 {
            let next = agent.process_response(&mut conversation, "answer", &json!({})).await;
            parts.push(next.part);
            actions.push(next.action);
        }
        assert_eq!(parts, vec![1, 2, 2, 3, 3]);
        assert_eq!(actions[4], ExaminerAction::NewTopic);
        assert_eq!(conversation.current_part(), 3);
    }

    #[tokio::test]
    async fn test_prompt_carries_bounded_history() {
        let mock = Arc::new(MockLlmClient::new());
        let agent = ExaminerAgent::new(
            GenerationService::new(mock.clone(), 5, 1024),
            &AgentsSection::default(),
        );
        let mut conversation = ExaminerConversation::new();
        for i in 0..6 {
            agent
                .process_response(&mut conversation, &format!("answer-{i}"), &json!({}))
                .await;
        }
        assert_eq!(conversation.history().len(), 12);
        let last_prompt = mock.prompts().pop().unwrap();
        assert!(last_prompt.contains("answer-5"));
        assert!(last_prompt.contains("answer-4"));
        assert!(!last_prompt.contains("answer-2"));
    }

    #[tokio::test]
    async fn test_cue_card_point_count_enforced() {
        let mock = MockLlmClient::new().with_rule(
            "Part 2 cue card",
            r#"{"topic": "Describe a mentor", "points": ["who", "when"], "preparation_time": 10}"#,
        );
        let card = examiner(mock).generate_cue_card(&json!({})).await;
        assert!(card.is_fallback());
        assert_eq!(card.value().points.len(), 4);

        let mock = MockLlmClient::new().with_rule(
            "Part 2 cue card",
            r#"{"topic": "Describe a mentor", "points": ["who", "when", "why"], "preparation_time": 10}"#,
        );
        let card = examiner(mock).generate_cue_card(&json!({})).await.into_inner();
        assert_eq!(card.topic, "Describe a mentor");
        assert_eq!((card.preparation_time, card.speaking_time), (60, 120));
    }

    #[tokio::test]
    async fn test_evaluate_response_fallback() {
        let out = examiner(MockLlmClient::failing())
            .evaluate_response("I like tea", "overall")
            .await;
        assert!(out.is_fallback());
        assert_eq!(out.value().preliminary_band.to_string(), "6.0");
    }
}
