//! 四个评分维度 Agent：流利度、语法、词汇、发音
//!
//! 每个 Agent 独立分析同一份转写（发音 Agent 额外接收音频元数据），要求生成能力返回固定 JSON 形状；
//! 解析失败时换成该维度固定的中性兜底（band 6.0），从不报错。记忆只作参考，不影响分析结果。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agents::base::{outcome_label, AgentCore};
use crate::agents::structured::{Band, Generated, Structured};
use crate::config::AgentsSection;
use crate::core::AgentRole;
use crate::llm::GenerationService;

/// 评分维度
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Fluency,
    Grammar,
    Vocabulary,
    Pronunciation,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::Fluency,
        Criterion::Grammar,
        Criterion::Vocabulary,
        Criterion::Pronunciation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Fluency => "fluency",
            Criterion::Grammar => "grammar",
            Criterion::Vocabulary => "vocabulary",
            Criterion::Pronunciation => "pronunciation",
        }
    }

    /// 官方评分标准名称
    pub fn title(&self) -> &'static str {
        match self {
            Criterion::Fluency => "FLUENCY & COHERENCE",
            Criterion::Grammar => "GRAMMATICAL RANGE & ACCURACY",
            Criterion::Vocabulary => "LEXICAL RESOURCE",
            Criterion::Pronunciation => "PRONUNCIATION",
        }
    }
}

/// 所有维度分析共有的部分
pub trait Assessment {
    fn band_estimate(&self) -> Band;
    fn strengths(&self) -> &[String];
    fn weaknesses(&self) -> &[String];
}

/// 评分维度 Agent
#[async_trait]
pub trait CriterionAgent: Send + Sync {
    type Analysis: Assessment + Serialize + Send;

    fn criterion(&self) -> Criterion;

    async fn analyze(&self, transcript: &str, metadata: &Value) -> Generated<Self::Analysis>;
}

macro_rules! impl_assessment {
    ($ty:ty) => {
        impl Assessment for $ty {
            fn band_estimate(&self) -> Band {
                self.band_estimate
            }

            fn strengths(&self) -> &[String] {
                &self.strengths
            }

            fn weaknesses(&self) -> &[String] {
                &self.weaknesses
            }
        }
    };
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// 观察 -> 生成 -> 决策 -> 行动 的公共流程
async fn run_analysis<T>(
    core: &AgentCore,
    observed: Value,
    prompt: String,
    temperature: f32,
    fallback: fn() -> T,
) -> Generated<T>
where
    T: Structured + Assessment,
{
    let obs = core.observe(observed);
    let out = core.generate_structured(prompt, temperature, fallback).await;
    let band = out.value().band_estimate();
    let dec = core.decide(
        Some(obs),
        json!({ "band_estimate": band, "outcome": outcome_label(&out) }),
    );
    core.act(Some(dec), json!({ "type": "analysis_complete" }));
    tracing::debug!(agent = core.role().as_str(), band = %band, "criterion analysis done");
    out
}

// ---------------------------------------------------------------------------
// Fluency

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseAnalysis {
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub impact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluencyAnalysis {
    #[serde(default)]
    pub fluency_score: Option<Band>,
    pub pause_analysis: PauseAnalysis,
    #[serde(default)]
    pub speech_rate: String,
    #[serde(default)]
    pub hesitation_count: u32,
    #[serde(default)]
    pub coherence: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub band_estimate: Band,
}

impl Structured for FluencyAnalysis {}
impl_assessment!(FluencyAnalysis);

impl FluencyAnalysis {
    pub fn fallback() -> Self {
        Self {
            fluency_score: Some(Band::neutral()),
            pause_analysis: PauseAnalysis {
                frequency: "medium".into(),
                impact: "Some pauses affect flow".into(),
            },
            speech_rate: "moderate".into(),
            hesitation_count: 0,
            coherence: "fair".into(),
            strengths: vec!["Maintains conversation".into()],
            weaknesses: vec!["Some hesitation".into()],
            band_estimate: Band::neutral(),
        }
    }
}

/// 流利度与连贯性：停顿、语速、犹豫词、连接词
pub struct FluencyAgent {
    core: AgentCore,
}

impl FluencyAgent {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Fluency, llm, settings),
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }
}

#[async_trait]
impl CriterionAgent for FluencyAgent {
    type Analysis = FluencyAnalysis;

    fn criterion(&self) -> Criterion {
        Criterion::Fluency
    }

    async fn analyze(&self, transcript: &str, metadata: &Value) -> Generated<FluencyAnalysis> {
        let prompt = format!(
            r#"You are a fluency and coherence expert for IELTS speaking.

Transcript: "{transcript}"
Metadata: {metadata}

Analyze:
1. Pause frequency and duration
2. Speech rate (words per minute)
3. Hesitation markers (um, uh, like, you know)
4. Logical connectors usage
5. Coherence and cohesion

Return JSON:
{{
    "fluency_score": "0-9",
    "pause_analysis": {{"frequency": "low|medium|high", "impact": "description"}},
    "speech_rate": "slow|moderate|fast",
    "hesitation_count": 0,
    "coherence": "poor|fair|good|excellent",
    "strengths": ["strength 1"],
    "weaknesses": ["weakness 1"],
    "band_estimate": "5.0-9.0"
}}"#,
            metadata = pretty(metadata)
        );
        run_analysis(
            &self.core,
            json!({ "transcript": transcript, "metadata": metadata }),
            prompt,
            0.3,
            FluencyAnalysis::fallback,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Grammar

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarError {
    pub error: String,
    #[serde(default)]
    pub correction: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarAnalysis {
    #[serde(default)]
    pub errors: Vec<GrammarError>,
    #[serde(default)]
    pub tense_accuracy: String,
    #[serde(default)]
    pub complexity: String,
    #[serde(default)]
    pub error_frequency: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub band_estimate: Band,
}

impl Structured for GrammarAnalysis {}
impl_assessment!(GrammarAnalysis);

impl GrammarAnalysis {
    pub fn fallback() -> Self {
        Self {
            errors: Vec::new(),
            tense_accuracy: "good".into(),
            complexity: "moderate".into(),
            error_frequency: "low".into(),
            strengths: vec!["Correct basic structures".into()],
            weaknesses: vec!["Limited complex sentences".into()],
            band_estimate: Band::neutral(),
        }
    }
}

/// 语法范围与准确性：时态、句式复杂度、错误频率
pub struct GrammarAgent {
    core: AgentCore,
}

impl GrammarAgent {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Grammar, llm, settings),
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }
}

#[async_trait]
impl CriterionAgent for GrammarAgent {
    type Analysis = GrammarAnalysis;

    fn criterion(&self) -> Criterion {
        Criterion::Grammar
    }

    /// 只看转写，不使用元数据
    async fn analyze(&self, transcript: &str, _metadata: &Value) -> Generated<GrammarAnalysis> {
        let prompt = format!(
            r#"You are a grammar expert for IELTS speaking.

Transcript: "{transcript}"

Analyze:
1. Grammatical errors (list each)
2. Tense usage (correct/incorrect)
3. Sentence complexity (simple/compound/complex)
4. Range of structures
5. Error frequency

Return JSON:
{{
    "errors": [
        {{"error": "text", "correction": "fix", "explanation": "why"}}
    ],
    "tense_accuracy": "poor|fair|good|excellent",
    "complexity": "simple|moderate|complex",
    "error_frequency": "high|medium|low",
    "strengths": ["strength 1"],
    "weaknesses": ["weakness 1"],
    "band_estimate": "5.0-9.0"
}}"#
        );
        run_analysis(
            &self.core,
            json!({ "transcript": transcript }),
            prompt,
            0.2,
            GrammarAnalysis::fallback,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Vocabulary

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repetition {
    pub word: String,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collocations {
    #[serde(default)]
    pub correct: Vec<String>,
    #[serde(default)]
    pub incorrect: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyAnalysis {
    #[serde(default)]
    pub lexical_range: String,
    #[serde(default)]
    pub repetitions: Vec<Repetition>,
    #[serde(default)]
    pub collocations: Collocations,
    #[serde(default)]
    pub topic_vocabulary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub band_estimate: Band,
}

impl Structured for VocabularyAnalysis {}
impl_assessment!(VocabularyAnalysis);

impl VocabularyAnalysis {
    pub fn fallback() -> Self {
        Self {
            lexical_range: "adequate".into(),
            repetitions: Vec::new(),
            collocations: Collocations::default(),
            topic_vocabulary: "adequate".into(),
            strengths: vec!["Uses appropriate vocabulary".into()],
            weaknesses: vec!["Some repetition".into()],
            band_estimate: Band::neutral(),
        }
    }
}

/// 词汇资源：用词范围、重复、搭配、话题词汇
pub struct VocabularyAgent {
    core: AgentCore,
}

impl VocabularyAgent {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Vocabulary, llm, settings),
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }
}

#[async_trait]
impl CriterionAgent for VocabularyAgent {
    type Analysis = VocabularyAnalysis;

    fn criterion(&self) -> Criterion {
        Criterion::Vocabulary
    }

    async fn analyze(&self, transcript: &str, _metadata: &Value) -> Generated<VocabularyAnalysis> {
        let prompt = format!(
            r#"You are a vocabulary expert for IELTS speaking.

Transcript: "{transcript}"

Analyze:
1. Lexical range (basic/intermediate/advanced)
2. Repetition of words/phrases
3. Collocations (natural word combinations)
4. Topic-specific vocabulary
5. Paraphrasing ability

Return JSON:
{{
    "lexical_range": "limited|adequate|wide|very_wide",
    "repetitions": [
        {{"word": "word", "count": 5, "alternatives": ["alt1", "alt2"]}}
    ],
    "collocations": {{"correct": ["example"], "incorrect": ["example"]}},
    "topic_vocabulary": "weak|adequate|strong",
    "strengths": ["strength 1"],
    "weaknesses": ["weakness 1"],
    "band_estimate": "5.0-9.0"
}}"#
        );
        run_analysis(
            &self.core,
            json!({ "transcript": transcript }),
            prompt,
            0.3,
            VocabularyAnalysis::fallback,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Pronunciation

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationAnalysis {
    #[serde(default)]
    pub clarity: String,
    #[serde(default)]
    pub stress_accuracy: String,
    #[serde(default)]
    pub intonation: String,
    #[serde(default)]
    pub problem_sounds: Vec<String>,
    #[serde(default)]
    pub intelligibility: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub band_estimate: Band,
}

impl Structured for PronunciationAnalysis {}
impl_assessment!(PronunciationAnalysis);

impl PronunciationAnalysis {
    pub fn fallback() -> Self {
        Self {
            clarity: "good".into(),
            stress_accuracy: "moderate".into(),
            intonation: "varied".into(),
            problem_sounds: Vec::new(),
            intelligibility: "mostly_clear".into(),
            strengths: vec!["Generally clear".into()],
            weaknesses: vec!["Some pronunciation issues".into()],
            band_estimate: Band::neutral(),
        }
    }
}

/// 发音：清晰度、重音、语调、问题音素；只消费预先计算好的音频元数据
pub struct PronunciationAgent {
    core: AgentCore,
}

impl PronunciationAgent {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Pronunciation, llm, settings),
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }
}

#[async_trait]
impl CriterionAgent for PronunciationAgent {
    type Analysis = PronunciationAnalysis;

    fn criterion(&self) -> Criterion {
        Criterion::Pronunciation
    }

    /// metadata 为音频元数据子对象
    async fn analyze(&self, transcript: &str, metadata: &Value) -> Generated<PronunciationAnalysis> {
        let prompt = format!(
            r#"You are a pronunciation expert for IELTS speaking.

Transcript: "{transcript}"
Audio Metadata: {audio}

Analyze:
1. Overall clarity
2. Word stress patterns
3. Sentence intonation
4. Problematic sounds
5. Intelligibility

Return JSON:
{{
    "clarity": "poor|fair|good|excellent",
    "stress_accuracy": "weak|moderate|strong",
    "intonation": "flat|varied|natural",
    "problem_sounds": ["sound 1", "sound 2"],
    "intelligibility": "difficult|mostly_clear|clear|very_clear",
    "strengths": ["strength 1"],
    "weaknesses": ["weakness 1"],
    "band_estimate": "5.0-9.0"
}}"#,
            audio = pretty(metadata)
        );
        run_analysis(
            &self.core,
            json!({ "transcript": transcript, "audio_metadata": metadata }),
            prompt,
            0.3,
            PronunciationAnalysis::fallback,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::llm::MockLlmClient;

    fn service(mock: MockLlmClient) -> GenerationService {
        GenerationService::new(Arc::new(mock), 5, 1024)
    }

    async fn all_bands(mock: MockLlmClient, settings: &AgentsSection) -> Vec<(Band, bool)> {
        let llm = service(mock);
        let meta = json!({"audio": {"pitch": "flat"}});
        let f = FluencyAgent::new(llm.clone(), settings).analyze("I like tea", &meta).await;
        let g = GrammarAgent::new(llm.clone(), settings).analyze("I like tea", &meta).await;
        let v = VocabularyAgent::new(llm.clone(), settings).analyze("I like tea", &meta).await;
        let p = PronunciationAgent::new(llm, settings).analyze("I like tea", &meta).await;
        vec![
            (f.value().band_estimate(), f.is_fallback()),
            (g.value().band_estimate(), g.is_fallback()),
            (v.value().band_estimate(), v.is_fallback()),
            (p.value().band_estimate(), p.is_fallback()),
        ]
    }

    #[tokio::test]
    async fn test_unparseable_output_falls_back_to_neutral_band() {
        let bands = all_bands(MockLlmClient::new(), &AgentsSection::default()).await;
        for (band, fallback) in bands {
            assert!(fallback);
            assert_eq!(band.to_string(), "6.0");
        }
    }

    #[tokio::test]
    async fn test_transport_failure_still_yields_band_in_range() {
        let bands = all_bands(MockLlmClient::failing(), &AgentsSection::default()).await;
        for (band, _) in bands {
            assert!((Band::MIN..=Band::MAX).contains(&band.value()));
        }
    }

    #[tokio::test]
    async fn test_parsed_grammar_analysis() {
        let mock = MockLlmClient::new().with_rule(
            "grammar expert",
            r#"{"errors": [{"error": "I goes", "correction": "I go", "explanation": "agreement"}],
                "tense_accuracy": "fair", "complexity": "simple", "error_frequency": "medium",
                "strengths": ["clear"], "weaknesses": ["agreement"], "band_estimate": "5.5"}"#,
        );
        let agent = GrammarAgent::new(service(mock), &AgentsSection::default());
        let out = agent.analyze("I goes home", &json!({})).await;
        assert!(!out.is_fallback());
        let analysis = out.into_inner();
        assert_eq!(analysis.errors.len(), 1);
        assert_eq!(analysis.band_estimate.to_string(), "5.5");
        assert_eq!(agent.core().snapshot().observations, 1);
    }

    #[tokio::test]
    async fn test_out_of_range_band_is_clamped() {
        let mock = MockLlmClient::new().with_rule(
            "fluency and coherence expert",
            r#"{"pause_analysis": {"frequency": "high", "impact": "x"},
                "strengths": [], "weaknesses": [], "band_estimate": 3.5}"#,
        );
        let agent = FluencyAgent::new(service(mock), &AgentsSection::default());
        let out = agent.analyze("um", &json!({})).await;
        assert_eq!(out.value().band_estimate().value(), 5.0);
    }

    #[tokio::test]
    async fn test_pronunciation_prompt_carries_audio_metadata() {
        let mock = Arc::new(MockLlmClient::new());
        let llm = GenerationService::new(mock.clone(), 5, 1024);
        let agent = PronunciationAgent::new(llm, &AgentsSection::default());
        agent.analyze("hello", &json!({"clarity_score": 0.42})).await;
        assert!(mock.prompts()[0].contains("clarity_score"));
    }

    #[tokio::test]
    async fn test_disabled_memory_does_not_change_result() {
        let reply = r#"{"clarity": "good", "strengths": ["s"], "weaknesses": ["w"], "band_estimate": "7.0"}"#;
        let with_memory = PronunciationAgent::new(
            service(MockLlmClient::new().with_rule("pronunciation expert", reply)),
            &AgentsSection::default(),
        );
        let without_memory = PronunciationAgent::new(
            service(MockLlmClient::new().with_rule("pronunciation expert", reply)),
            &AgentsSection {
                memory_enabled: false,
                ..AgentsSection::default()
            },
        );
        let a = with_memory.analyze("hi", &json!({})).await;
        let b = without_memory.analyze("hi", &json!({})).await;
        assert_eq!(a, b);
        assert_eq!(without_memory.core().snapshot().observations, 0);
    }
}
