//! 辅助 Agent：学习计划、激励、自信心、内容构思、会后反思
//!
//! 每个都是单次调用、调用间无状态的推理单元；解析失败时返回各自固定的兜底结构，从不报错、从不返回空结果。

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::agents::base::{outcome_label, AgentCore};
use crate::agents::structured::{Generated, Structured};
use crate::config::AgentsSection;
use crate::core::AgentRole;
use crate::llm::GenerationService;

/// Reflection prompt 中携带的历史会话条数
pub const REFLECTION_HISTORY: usize = 3;

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Planner

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedActivity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub focus: String,
    /// 分钟
    #[serde(default)]
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub day: String,
    #[serde(default)]
    pub activities: Vec<PlannedActivity>,
}

/// 学习计划；生成能力额外给出的字段保留在 extra 中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub duration_weeks: u32,
    #[serde(default)]
    pub daily_schedule: Vec<DaySchedule>,
    #[serde(default)]
    pub weekly_goals: Vec<String>,
    #[serde(default)]
    pub mock_tests: Vec<String>,
    #[serde(default)]
    pub rest_days: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Structured for StudyPlan {
    fn validate(&self) -> Result<(), String> {
        if self.duration_weeks == 0 {
            return Err("plan must last at least one week".into());
        }
        Ok(())
    }
}

impl StudyPlan {
    pub fn fallback() -> Self {
        Self {
            duration_weeks: 8,
            daily_schedule: Vec::new(),
            weekly_goals: vec!["Improve fluency".into()],
            mock_tests: vec!["week 4".into(), "week 8".into()],
            rest_days: vec!["Sunday".into()],
            reasoning: "Balanced approach".into(),
            extra: Map::new(),
        }
    }
}

/// 学习计划 Agent
pub struct PlannerAgent {
    core: AgentCore,
}

impl PlannerAgent {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Planner, llm, settings),
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    pub async fn create_study_plan(
        &self,
        profile: &Value,
        target_band: f64,
        available_days: &[String],
        current_band: f64,
    ) -> Generated<StudyPlan> {
        let obs = self.core.observe(json!({
            "user_profile": profile,
            "target_band": target_band,
            "current_band": current_band,
            "available_days": available_days,
            "gap": target_band - current_band,
        }));

        let prompt = format!(
            r#"You are an autonomous IELTS study planner.

User Profile: {profile}
Current Band: {current_band}
Target Band: {target_band}
Available Days: {days}

Create a personalized study plan:
1. Daily practice schedule
2. Focus areas based on weaknesses
3. Mock test schedule
4. Rest days to prevent burnout
5. Milestone targets

Return JSON:
{{
    "duration_weeks": 8,
    "daily_schedule": [
        {{
            "day": "Monday",
            "activities": [
                {{"type": "practice", "focus": "fluency", "duration": 30}}
            ]
        }}
    ],
    "weekly_goals": ["goal 1", "goal 2"],
    "mock_tests": ["week 2", "week 4"],
    "rest_days": ["Sunday"],
    "reasoning": "why this plan"
}}"#,
            profile = pretty(profile),
            days = available_days.join(", "),
        );

        let plan = self
            .core
            .generate_structured(prompt, 0.6, StudyPlan::fallback)
            .await;
        let dec = self.core.decide(
            Some(obs),
            json!({ "duration_weeks": plan.value().duration_weeks, "outcome": outcome_label(&plan) }),
        );
        self.core.act(Some(dec), json!({ "type": "study_plan" }));
        plan
    }

    /// 按进度调整计划；解析失败时原样返回输入计划
    pub async fn adapt_plan(&self, current_plan: &StudyPlan, progress: &Value, missed_sessions: u32) -> Generated<StudyPlan> {
        let prompt = format!(
            r#"Adapt the study plan based on progress.

Current Plan: {plan}
Progress Data: {progress}
Missed Sessions: {missed_sessions}

Decide:
1. Should we increase difficulty?
2. Should we reduce load?
3. Should we change focus areas?
4. Should we reschedule mock tests?

Return the full revised plan as JSON with the same fields as the current plan,
plus an "adaptations" list describing what changed."#,
            plan = pretty(current_plan),
            progress = pretty(progress),
        );

        let revised = self
            .core
            .generate_structured(prompt, 0.5, || current_plan.clone())
            .await;
        self.core.act(
            None,
            json!({ "type": "adapt_plan", "missed_sessions": missed_sessions, "outcome": outcome_label(&revised) }),
        );
        revised
    }
}

// ---------------------------------------------------------------------------
// Coach

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motivation {
    pub message: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub mindset_tip: String,
}

impl Structured for Motivation {
    fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("empty motivation message".into());
        }
        Ok(())
    }
}

impl Motivation {
    pub fn fallback() -> Self {
        Self {
            message: "Keep going! You're making progress.".into(),
            tone: "encouraging".into(),
            action_items: vec!["Practice daily".into()],
            mindset_tip: "Focus on improvement, not perfection".into(),
        }
    }
}

/// 激励教练
pub struct CoachAgent {
    core: AgentCore,
}

impl CoachAgent {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Coach, llm, settings),
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    pub async fn provide_motivation(&self, user_state: &Value, recent_performance: &Value) -> Generated<Motivation> {
        let obs = self.core.observe(json!({
            "user_state": user_state,
            "recent_performance": recent_performance,
        }));

        let prompt = format!(
            r#"You are a supportive IELTS coach.

User State: {state}
Recent Performance: {performance}

Provide:
1. Personalized encouragement
2. Progress acknowledgment
3. Next steps motivation
4. Confidence boost

Return JSON:
{{
    "message": "motivational message",
    "tone": "encouraging|celebratory|supportive",
    "action_items": ["next step 1", "next step 2"],
    "mindset_tip": "psychological tip"
}}"#,
            state = pretty(user_state),
            performance = pretty(recent_performance),
        );

        let motivation = self
            .core
            .generate_structured(prompt, 0.8, Motivation::fallback)
            .await;
        let dec = self.core.decide(
            Some(obs),
            json!({ "tone": motivation.value().tone, "outcome": outcome_label(&motivation) }),
        );
        self.core.act(Some(dec), json!({ "type": "motivation" }));
        motivation
    }
}

// ---------------------------------------------------------------------------
// Confidence

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAnalysis {
    pub confidence_level: ConfidenceLevel,
    #[serde(default)]
    pub nervousness_indicators: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub breathing_exercise: String,
    #[serde(default)]
    pub mindset_shift: String,
}

impl Structured for ConfidenceAnalysis {}

impl ConfidenceAnalysis {
    pub fn fallback() -> Self {
        Self {
            confidence_level: ConfidenceLevel::Medium,
            nervousness_indicators: Vec::new(),
            recommendations: vec!["Take deep breaths".into(), "Speak slowly".into()],
            breathing_exercise: "Breathe in for 4, hold for 4, out for 4".into(),
            mindset_shift: "Focus on communication, not perfection".into(),
        }
    }
}

/// 自信心与心态分析（只看预先计算好的语音特征）
pub struct ConfidenceAgent {
    core: AgentCore,
}

impl ConfidenceAgent {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Confidence, llm, settings),
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    pub async fn analyze_confidence(&self, speech_patterns: &Value, user_feedback: Option<&str>) -> Generated<ConfidenceAnalysis> {
        let obs = self.core.observe(json!({
            "speech_patterns": speech_patterns,
            "user_feedback": user_feedback,
        }));

        let prompt = format!(
            r#"You are a confidence and psychology expert.

Speech Patterns: {patterns}
User Feedback: {feedback}

Detect:
1. Signs of nervousness (rushed speech, long pauses)
2. Confidence level
3. Anxiety indicators

Provide:
1. Confidence assessment
2. Calming techniques
3. Mindset tips

Return JSON:
{{
    "confidence_level": "low|medium|high",
    "nervousness_indicators": ["indicator 1"],
    "recommendations": ["technique 1", "technique 2"],
    "breathing_exercise": "description",
    "mindset_shift": "psychological tip"
}}"#,
            patterns = pretty(speech_patterns),
            feedback = user_feedback.unwrap_or("none"),
        );

        let analysis = self
            .core
            .generate_structured(prompt, 0.6, ConfidenceAnalysis::fallback)
            .await;
        self.core.decide(
            Some(obs),
            json!({ "confidence_level": analysis.value().confidence_level, "outcome": outcome_label(&analysis) }),
        );
        analysis
    }
}

// ---------------------------------------------------------------------------
// Content

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentIdeas {
    pub main_ideas: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub contrasts: Vec<String>,
    #[serde(default)]
    pub structure: String,
}

impl Structured for ContentIdeas {
    fn validate(&self) -> Result<(), String> {
        if self.main_ideas.is_empty() {
            return Err("no main ideas".into());
        }
        Ok(())
    }
}

impl ContentIdeas {
    pub fn fallback() -> Self {
        Self {
            main_ideas: vec!["Consider different perspectives".into()],
            examples: vec!["Use personal experience".into()],
            contrasts: vec!["Compare pros and cons".into()],
            structure: "Introduction → Main points → Conclusion".into(),
        }
    }
}

/// 内容构思：帮助组织观点，而不只是开口
pub struct ContentAgent {
    core: AgentCore,
}

impl ContentAgent {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Content, llm, settings),
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    pub async fn generate_ideas(&self, topic: &str, question_type: &str) -> Generated<ContentIdeas> {
        let prompt = format!(
            r#"Help generate ideas for IELTS speaking.

Topic: {topic}
Question Type: {question_type}

Provide:
1. Main ideas (2-3)
2. Supporting examples
3. Contrasting viewpoints
4. Logical structure

Return JSON:
{{
    "main_ideas": ["idea 1", "idea 2"],
    "examples": ["example 1", "example 2"],
    "contrasts": ["viewpoint A vs viewpoint B"],
    "structure": "suggested flow"
}}"#
        );
        self.core
            .generate_structured(prompt, 0.7, ContentIdeas::fallback)
            .await
    }
}

// ---------------------------------------------------------------------------
// Reflection

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reattempt {
    Yes,
    No,
    Later,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub went_well: Vec<String>,
    pub needs_work: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    pub next_focus: String,
    #[serde(default)]
    pub actionable_steps: Vec<String>,
    pub reattempt_recommendation: Reattempt,
}

impl Structured for Reflection {}

impl Reflection {
    pub fn fallback() -> Self {
        Self {
            went_well: vec!["Completed session".into()],
            needs_work: vec!["Fluency".into()],
            patterns: vec!["Consistent effort".into()],
            next_focus: "Grammar".into(),
            actionable_steps: vec!["Practice daily".into()],
            reattempt_recommendation: Reattempt::Later,
        }
    }
}

/// 会后反思
pub struct ReflectionAgent {
    core: AgentCore,
}

impl ReflectionAgent {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Reflection, llm, settings),
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    /// previous_sessions 只取最后 3 条进入 prompt
    pub async fn generate_reflection(&self, session_data: &Value, previous_sessions: &[Value]) -> Generated<Reflection> {
        let recent = crate::memory::recent_window(previous_sessions, REFLECTION_HISTORY);
        let prompt = format!(
            r#"You are a reflection coach for IELTS.

Current Session: {session}
Previous Sessions: {previous}

Generate reflection questions and insights:
1. What went well?
2. What needs improvement?
3. What patterns do you notice?
4. What should be the focus next time?

Return JSON:
{{
    "went_well": ["positive 1", "positive 2"],
    "needs_work": ["area 1", "area 2"],
    "patterns": ["pattern 1"],
    "next_focus": "specific area",
    "actionable_steps": ["step 1", "step 2"],
    "reattempt_recommendation": "yes|no|later"
}}"#,
            session = pretty(session_data),
            previous = pretty(recent),
        );

        let reflection = self
            .core
            .generate_structured(prompt, 0.5, Reflection::fallback)
            .await;
        self.core.reflect(
            None,
            json!({ "next_focus": reflection.value().next_focus, "outcome": outcome_label(&reflection) }),
        );
        reflection
    }
}
