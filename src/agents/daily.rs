//! 每日练习内容：学习路线图、分 Part 练习题、每日话题、每日词汇
//!
//! 与其它辅助操作一样：一次生成、解析、失败时返回固定兜底。路线图归 Planner，
//! 其余三项归 Content。兜底中的日期取当天（UTC）。

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::agents::base::outcome_label;
use crate::agents::structured::{Generated, Structured};
use crate::agents::support::{ContentAgent, PlannerAgent};
use crate::agents::tutor::VocabularyWord;

fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Num(f64),
    Text(String),
}

/// "10-15" 与 10 都接受
fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Lenient::deserialize(d)? {
        Lenient::Num(n) => n.to_string(),
        Lenient::Text(s) => s,
    })
}

fn de_number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match Lenient::deserialize(d)? {
        Lenient::Num(n) => Ok(n),
        Lenient::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Roadmap

fn default_practice_time() -> String {
    "30min".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapRequest {
    pub user_id: String,
    pub current_band: f64,
    pub target_band: f64,
    pub available_days_per_week: u32,
    pub total_weeks: u32,
    #[serde(default)]
    pub weak_areas: Vec<String>,
    /// 30min / 1hour / 2hours
    #[serde(default = "default_practice_time")]
    pub preferred_practice_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapWeek {
    pub week: u32,
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub daily_activities: Vec<Value>,
    #[serde(default)]
    pub milestone: String,
    #[serde(default, deserialize_with = "de_text")]
    pub expected_improvement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockTestSlot {
    pub week: u32,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roadmap {
    #[serde(default)]
    pub roadmap_id: String,
    pub total_weeks: u32,
    #[serde(default)]
    pub weekly_plan: Vec<RoadmapWeek>,
    #[serde(default)]
    pub mock_tests: Vec<MockTestSlot>,
    #[serde(deserialize_with = "de_number")]
    pub estimated_final_band: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Structured for Roadmap {
    fn validate(&self) -> Result<(), String> {
        if self.total_weeks == 0 {
            return Err("roadmap must last at least one week".into());
        }
        if let Some(w) = self.weekly_plan.iter().find(|w| w.week == 0) {
            return Err(format!("week numbers start at 1, got {}", w.week));
        }
        Ok(())
    }
}

impl Roadmap {
    /// 空周计划，预计分数即目标分
    pub fn fallback(request: &RoadmapRequest) -> Self {
        Self {
            roadmap_id: format!("roadmap_{}_{}", request.user_id, Utc::now().timestamp()),
            total_weeks: request.total_weeks,
            weekly_plan: Vec::new(),
            mock_tests: Vec::new(),
            estimated_final_band: request.target_band,
            extra: Map::new(),
        }
    }
}

impl PlannerAgent {
    pub async fn generate_roadmap(&self, request: &RoadmapRequest) -> Generated<Roadmap> {
        let core = self.core();
        let obs = core.observe(json!({
            "user_id": request.user_id,
            "current_band": request.current_band,
            "target_band": request.target_band,
            "total_weeks": request.total_weeks,
        }));

        let weak_areas = if request.weak_areas.is_empty() {
            "None specified".to_string()
        } else {
            request.weak_areas.join(", ")
        };
        let prompt = format!(
            r#"Create a detailed IELTS speaking study roadmap.

User Details:
- Current Band: {current}
- Target Band: {target}
- Available Days/Week: {days}
- Total Duration: {weeks} weeks
- Weak Areas: {weak_areas}
- Practice Time/Day: {time}

Lay it out week by week with:
1. Weekly focus areas
2. Daily practice activities
3. Milestones
4. Mock test schedule
5. Expected progress

Return JSON:
{{
    "roadmap_id": "unique_id",
    "total_weeks": {weeks},
    "weekly_plan": [
        {{
            "week": 1,
            "focus": "Fluency & Part 1",
            "daily_activities": [
                {{
                    "day": "Monday",
                    "activities": [
                        {{"type": "practice", "part": 1, "duration": 30, "topic": "Introduction & Interview"}}
                    ]
                }}
            ],
            "milestone": "Complete 5 Part 1 sessions",
            "expected_improvement": "0.5 band in fluency"
        }}
    ],
    "mock_tests": [
        {{"week": 4, "type": "mid_term"}}
    ],
    "estimated_final_band": {target}
}}"#,
            current = request.current_band,
            target = request.target_band,
            days = request.available_days_per_week,
            weeks = request.total_weeks,
            time = request.preferred_practice_time,
        );

        let roadmap = core
            .generate_structured(prompt, 0.7, || Roadmap::fallback(request))
            .await;
        let dec = core.decide(
            Some(obs),
            json!({ "weeks": roadmap.value().weekly_plan.len(), "outcome": outcome_label(&roadmap) }),
        );
        core.act(Some(dec), json!({ "type": "roadmap" }));
        roadmap
    }
}

// ---------------------------------------------------------------------------
// Daily practice

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeContent {
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue_card: Option<Value>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub vocabulary: Vec<String>,
    /// 分钟，可能是区间
    #[serde(default, deserialize_with = "de_text")]
    pub expected_duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPractice {
    pub part: u8,
    #[serde(default)]
    pub date: String,
    pub content: PracticeContent,
}

impl Structured for DailyPractice {
    fn validate(&self) -> Result<(), String> {
        if !(1..=3).contains(&self.part) {
            return Err(format!("part must be 1..=3, got {}", self.part));
        }
        if self.content.questions.is_empty() && self.content.cue_card.is_none() {
            return Err("practice content has neither questions nor a cue card".into());
        }
        Ok(())
    }
}

impl DailyPractice {
    pub fn fallback(part: u8, date: &str) -> Self {
        Self {
            part,
            date: date.to_string(),
            content: PracticeContent {
                questions: vec!["Tell me about yourself".into()],
                cue_card: None,
                tips: vec!["Speak naturally".into()],
                vocabulary: Vec::new(),
                expected_duration: "10-15".into(),
            },
        }
    }
}

fn part_requirements(part: u8) -> &'static str {
    match part {
        1 => "Part 1: 4-5 questions about familiar subjects (work, study, hobbies, hometown)",
        2 => "Part 2: Cue card with 1 minute prep, 2 minutes speaking",
        _ => "Part 3: 4-5 abstract discussion questions related to a Part 2 subject",
    }
}

// ---------------------------------------------------------------------------
// Daily topics

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTopic {
    pub part: u8,
    pub topic: String,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTopics {
    #[serde(default)]
    pub date: String,
    pub topics: Vec<DailyTopic>,
}

impl Structured for DailyTopics {
    fn validate(&self) -> Result<(), String> {
        if self.topics.is_empty() {
            return Err("no topics".into());
        }
        if let Some(t) = self.topics.iter().find(|t| !(1..=3).contains(&t.part)) {
            return Err(format!("topic '{}' has part {}", t.topic, t.part));
        }
        Ok(())
    }
}

impl DailyTopics {
    pub fn fallback() -> Self {
        let topic = |part, name: &str, difficulty| DailyTopic {
            part,
            topic: name.to_string(),
            difficulty,
        };
        Self {
            date: today(),
            topics: vec![
                topic(1, "Your daily routine", Difficulty::Easy),
                topic(2, "A memorable journey", Difficulty::Medium),
                topic(3, "The impact of technology", Difficulty::Hard),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Daily vocabulary

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyVocabulary {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub theme: String,
    pub words: Vec<VocabularyWord>,
}

impl Structured for DailyVocabulary {
    fn validate(&self) -> Result<(), String> {
        if self.words.iter().any(|w| w.word.trim().is_empty()) {
            return Err("vocabulary entry without a word".into());
        }
        Ok(())
    }
}

impl DailyVocabulary {
    pub fn fallback() -> Self {
        Self {
            date: today(),
            theme: "General".into(),
            words: Vec::new(),
        }
    }
}

impl ContentAgent {
    /// part 超出 1..=3 时按边界处理
    pub async fn daily_practice(&self, part: u8, date: &str) -> Generated<DailyPractice> {
        let part = part.clamp(1, 3);
        let prompt = format!(
            r#"Generate IELTS Speaking Part {part} practice content.

Part {part} Requirements:
{requirements}

Keep it fresh and engaging for today's session.

Return JSON:
{{
    "part": {part},
    "date": "{date}",
    "content": {{
        "questions": ["q1", "q2"],
        "cue_card": {{}},
        "tips": ["tip1", "tip2"],
        "vocabulary": ["word1", "word2"],
        "expected_duration": "minutes"
    }}
}}
Use "questions" for Parts 1 and 3 and "cue_card" for Part 2."#,
            requirements = part_requirements(part),
        );

        let practice = self
            .core()
            .generate_structured(prompt, 0.8, || DailyPractice::fallback(part, date))
            .await;
        self.core().act(
            None,
            json!({ "type": "daily_practice", "part": part, "outcome": outcome_label(&practice) }),
        );
        practice
    }

    pub async fn daily_topics(&self) -> Generated<DailyTopics> {
        let prompt = r#"Generate 10 fresh, engaging IELTS speaking topics for today.

Include a mix of:
- Part 1 topics (familiar subjects)
- Part 2 cue card topics
- Part 3 discussion topics

Return JSON:
{
    "date": "today's date",
    "topics": [
        {"part": 1, "topic": "topic name", "difficulty": "easy|medium|hard"}
    ]
}"#;
        self.core()
            .generate_structured(prompt.to_string(), 0.9, DailyTopics::fallback)
            .await
    }

    pub async fn daily_vocabulary(&self) -> Generated<DailyVocabulary> {
        let prompt = r#"Generate 10 useful IELTS vocabulary words for today.

Include:
- Advanced but natural words
- Definitions
- Example sentences
- Pronunciation tips

Return JSON:
{
    "date": "today",
    "theme": "theme name",
    "words": [
        {
            "word": "word",
            "definition": "meaning",
            "example": "sentence",
            "pronunciation": "guide",
            "synonyms": ["syn1", "syn2"]
        }
    ]
}"#;
        self.core()
            .generate_structured(prompt.to_string(), 0.7, DailyVocabulary::fallback)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::AgentsSection;
    use crate::llm::{GenerationService, MockLlmClient};

    fn llm(mock: MockLlmClient) -> GenerationService {
        GenerationService::new(Arc::new(mock), 5, 1024)
    }

    fn request() -> RoadmapRequest {
        RoadmapRequest {
            user_id: "42".into(),
            current_band: 6.0,
            target_band: 7.5,
            available_days_per_week: 4,
            total_weeks: 10,
            weak_areas: vec!["grammar".into()],
            preferred_practice_time: default_practice_time(),
        }
    }

    #[tokio::test]
    async fn test_roadmap_parsed() {
        let reply = r#"{"roadmap_id": "r1", "total_weeks": 10,
            "weekly_plan": [{"week": 1, "focus": "Part 1", "milestone": "5 sessions", "expected_improvement": 0.5}],
            "mock_tests": [{"week": 5, "type": "mid_term"}], "estimated_final_band": "7.5"}"#;
        let planner = PlannerAgent::new(
            llm(MockLlmClient::new().with_rule("study roadmap", reply)),
            &AgentsSection::default(),
        );
        let roadmap = planner.generate_roadmap(&request()).await;
        assert!(!roadmap.is_fallback());
        let roadmap = roadmap.into_inner();
        assert_eq!(roadmap.weekly_plan[0].expected_improvement, "0.5");
        assert_eq!(roadmap.mock_tests[0].kind, "mid_term");
        assert_eq!(roadmap.estimated_final_band, 7.5);
    }

    #[tokio::test]
    async fn test_roadmap_fallback_targets_requested_band() {
        let planner = PlannerAgent::new(llm(MockLlmClient::new()), &AgentsSection::default());
        let roadmap = planner.generate_roadmap(&request()).await;
        assert!(roadmap.is_fallback());
        let roadmap = roadmap.into_inner();
        assert!(roadmap.weekly_plan.is_empty());
        assert_eq!(roadmap.total_weeks, 10);
        assert_eq!(roadmap.estimated_final_band, 7.5);
        assert!(roadmap.roadmap_id.starts_with("roadmap_42_"));
    }

    #[tokio::test]
    async fn test_roadmap_prompt_lists_weak_areas() {
        let mock = Arc::new(MockLlmClient::new());
        let planner = PlannerAgent::new(GenerationService::new(mock.clone(), 5, 1024), &AgentsSection::default());
        planner.generate_roadmap(&request()).await;
        let prompt = &mock.prompts()[0];
        assert!(prompt.contains("Weak Areas: grammar"));
        assert!(prompt.contains("Total Duration: 10 weeks"));
    }

    #[tokio::test]
    async fn test_daily_practice_parsed_and_fallback() {
        let reply = r#"{"part": 2, "date": "2026-01-05", "content": {"cue_card": {"topic": "A gift"}, "tips": [], "expected_duration": 4}}"#;
        let content = ContentAgent::new(
            llm(MockLlmClient::new().with_rule("Part 2 practice content", reply)),
            &AgentsSection::default(),
        );
        let parsed = content.daily_practice(2, "2026-01-05").await;
        assert!(!parsed.is_fallback());
        assert_eq!(parsed.value().content.expected_duration, "4");

        let fallback = content.daily_practice(9, "2026-01-05").await;
        assert!(fallback.is_fallback());
        let fallback = fallback.into_inner();
        assert_eq!(fallback.part, 3);
        assert_eq!(fallback.date, "2026-01-05");
        assert_eq!(fallback.content.questions, vec!["Tell me about yourself".to_string()]);
    }

    #[tokio::test]
    async fn test_daily_topics_parsed_and_fallback() {
        let reply = r#"{"date": "2026-01-05", "topics": [{"part": 2, "topic": "A festival", "difficulty": "medium"}]}"#;
        let parsed = ContentAgent::new(
            llm(MockLlmClient::new().with_rule("speaking topics for today", reply)),
            &AgentsSection::default(),
        )
        .daily_topics()
        .await;
        assert!(!parsed.is_fallback());
        assert_eq!(parsed.value().topics[0].difficulty, Difficulty::Medium);

        let fallback = ContentAgent::new(llm(MockLlmClient::new()), &AgentsSection::default())
            .daily_topics()
            .await;
        assert!(fallback.is_fallback());
        let names: Vec<_> = fallback.value().topics.iter().map(|t| t.topic.as_str()).collect();
        assert_eq!(names, ["Your daily routine", "A memorable journey", "The impact of technology"]);
        assert_eq!(fallback.value().date, today());
    }

    #[tokio::test]
    async fn test_daily_vocabulary_parsed_and_fallback() {
        let reply = r#"{"theme": "Work", "words": [{"word": "diligent", "definition": "hard-working", "synonyms": ["industrious"]}]}"#;
        let parsed = ContentAgent::new(
            llm(MockLlmClient::new().with_rule("vocabulary words for today", reply)),
            &AgentsSection::default(),
        )
        .daily_vocabulary()
        .await;
        assert!(!parsed.is_fallback());
        assert_eq!(parsed.value().words[0].synonyms, vec!["industrious".to_string()]);

        let fallback = ContentAgent::new(llm(MockLlmClient::new()), &AgentsSection::default())
            .daily_vocabulary()
            .await;
        assert!(fallback.is_fallback());
        assert_eq!(fallback.value().theme, "General");
        assert!(fallback.value().words.is_empty());
    }

    #[tokio::test]
    async fn test_failing_backend_serves_canned_daily_content() {
        let content = ContentAgent::new(llm(MockLlmClient::failing()), &AgentsSection::default());
        let topics = content.daily_topics().await;
        assert!(!topics.is_fallback());
        assert_eq!(topics.value().topics[2].topic, "Reading habits");
        let practice = content.daily_practice(1, "2026-01-05").await;
        assert!(!practice.is_fallback());
        assert!(practice.value().content.questions.len() >= 3);
        let vocab = content.daily_vocabulary().await;
        assert_eq!(vocab.value().words[0].word, "Itinerary");
    }
}
