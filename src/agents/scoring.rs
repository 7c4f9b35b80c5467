//! 评分编排 Agent：扇出到四个维度 Agent，汇总为综合分，再做一次独立质检
//!
//! 1. 同一份转写并发（或顺序）交给四个维度 Agent，音频元数据只给发音 Agent；四个都完成后才进入汇总
//! 2. 把四份分析原样嵌入 prompt，由生成能力消解分歧、给出总分与综合反馈
//! 3. 汇总解析失败时确定性兜底：总分 = 四个 band_estimate 的算术平均（一位小数），各维度分原样保留
//! 4. 无论走哪条路径，四份原始分析都挂在综合分上，便于审计
//!
//! validate_score 审计分数与反馈是否一致、总分算术是否正确；解析失败时视为「有效」，不阻塞出分。

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::agents::base::{outcome_label, AgentCore};
use crate::agents::criterion::{
    Assessment, CriterionAgent, FluencyAgent, FluencyAnalysis, GrammarAgent, GrammarAnalysis,
    PronunciationAgent, PronunciationAnalysis, VocabularyAgent, VocabularyAnalysis,
};
use crate::agents::structured::{de_confidence, Band, Generated, Structured};
use crate::config::AgentsSection;
use crate::core::{AgentRole, AgentStateSnapshot};
use crate::llm::GenerationService;

/// 综合分中不允许被质检修正覆盖的字段
const PROTECTED_FIELDS: [&str; 1] = ["detailed_analyses"];

/// 四份原始维度分析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedAnalyses {
    pub fluency: FluencyAnalysis,
    pub grammar: GrammarAnalysis,
    pub vocabulary: VocabularyAnalysis,
    pub pronunciation: PronunciationAnalysis,
}

impl DetailedAnalyses {
    pub fn band_estimates(&self) -> [Band; 4] {
        [
            self.fluency.band_estimate(),
            self.grammar.band_estimate(),
            self.vocabulary.band_estimate(),
            self.pronunciation.band_estimate(),
        ]
    }
}

/// 综合分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub fluency_band: Band,
    pub grammar_band: Band,
    pub vocabulary_band: Band,
    pub pronunciation_band: Band,
    pub overall_band: Band,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub priority_improvements: Vec<String>,
    pub detailed_feedback: String,
    #[serde(deserialize_with = "de_confidence")]
    pub confidence: f32,
    pub detailed_analyses: DetailedAnalyses,
    /// 质检修正中出现的额外字段（浅合并时保留）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompositeScore {
    /// 汇总失败时的确定性综合分
    pub fn from_analyses(analyses: DetailedAnalyses) -> Self {
        Reconciliation::from_analyses(&analyses).into_score(analyses)
    }

    /// 浅合并质检修正：逐字段尝试，类型不符或受保护的字段跳过；返回实际生效的字段名
    pub fn apply_corrections(&mut self, corrections: &Map<String, Value>) -> Vec<String> {
        let mut applied = Vec::new();
        for (field, value) in corrections {
            if PROTECTED_FIELDS.contains(&field.as_str()) {
                tracing::warn!(field = %field, "correction targets protected field, skipped");
                continue;
            }
            let mut candidate = match serde_json::to_value(&*self) {
                Ok(Value::Object(map)) => map,
                _ => continue,
            };
            candidate.insert(field.clone(), value.clone());
            match serde_json::from_value::<CompositeScore>(Value::Object(candidate)) {
                Ok(updated) => {
                    *self = updated;
                    applied.push(field.clone());
                }
                Err(e) => {
                    tracing::warn!(field = %field, error = %e, "correction rejected");
                }
            }
        }
        applied
    }
}

/// 汇总 prompt 要求的输出形状
#[derive(Debug, Deserialize)]
struct Reconciliation {
    fluency_band: Band,
    grammar_band: Band,
    vocabulary_band: Band,
    pronunciation_band: Band,
    overall_band: Band,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    priority_improvements: Vec<String>,
    #[serde(default)]
    detailed_feedback: String,
    #[serde(default = "default_confidence", deserialize_with = "de_confidence")]
    confidence: f32,
}

impl Structured for Reconciliation {}

fn default_confidence() -> f32 {
    0.8
}

impl Reconciliation {
    /// 汇总不可用时：总分取四个维度估分的平均，其余为通用反馈
    fn from_analyses(analyses: &DetailedAnalyses) -> Self {
        let [fluency, grammar, vocabulary, pronunciation] = analyses.band_estimates();
        Self {
            fluency_band: fluency,
            grammar_band: grammar,
            vocabulary_band: vocabulary,
            pronunciation_band: pronunciation,
            overall_band: Band::mean(&[fluency, grammar, vocabulary, pronunciation]),
            strengths: vec!["Completed the task".into()],
            weaknesses: vec!["Needs improvement".into()],
            priority_improvements: vec!["Practice more".into()],
            detailed_feedback: "Continue practicing".into(),
            confidence: 0.8,
        }
    }

    fn into_score(self, analyses: DetailedAnalyses) -> CompositeScore {
        CompositeScore {
            fluency_band: self.fluency_band,
            grammar_band: self.grammar_band,
            vocabulary_band: self.vocabulary_band,
            pronunciation_band: self.pronunciation_band,
            overall_band: self.overall_band,
            strengths: self.strengths,
            weaknesses: self.weaknesses,
            priority_improvements: self.priority_improvements,
            detailed_feedback: self.detailed_feedback,
            confidence: self.confidence,
            detailed_analyses: analyses,
            extra: Map::new(),
        }
    }
}

/// 质检结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreValidation {
    pub valid: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub corrections: Map<String, Value>,
    #[serde(default = "default_validation_confidence", deserialize_with = "de_confidence")]
    pub confidence: f32,
}

impl Structured for ScoreValidation {}

fn default_validation_confidence() -> f32 {
    0.9
}

impl ScoreValidation {
    /// 质检不可用时假定有效
    pub fn assume_valid() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
            corrections: Map::new(),
            confidence: default_validation_confidence(),
        }
    }

    /// 是否需要把修正合并进综合分
    pub fn should_apply(&self) -> bool {
        !self.valid && !self.corrections.is_empty()
    }
}

/// 去掉音频子对象（音频只路由给发音 Agent）
fn without_audio(metadata: &Value) -> Value {
    match metadata {
        Value::Object(map) => {
            let mut map = map.clone();
            map.remove("audio");
            Value::Object(map)
        }
        other => other.clone(),
    }
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// 评分编排 Agent（兼任质检）
pub struct ScoringOrchestrator {
    core: AgentCore,
    fluency: FluencyAgent,
    grammar: GrammarAgent,
    vocabulary: VocabularyAgent,
    pronunciation: PronunciationAgent,
    parallel: bool,
}

impl ScoringOrchestrator {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Qa, llm.clone(), settings),
            fluency: FluencyAgent::new(llm.clone(), settings),
            grammar: GrammarAgent::new(llm.clone(), settings),
            vocabulary: VocabularyAgent::new(llm.clone(), settings),
            pronunciation: PronunciationAgent::new(llm, settings),
            parallel: settings.parallel_scoring,
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    /// 自身与四个维度 Agent 的状态快照
    pub fn snapshots(&self) -> Vec<AgentStateSnapshot> {
        vec![
            self.core.snapshot(),
            self.fluency.core().snapshot(),
            self.grammar.core().snapshot(),
            self.vocabulary.core().snapshot(),
            self.pronunciation.core().snapshot(),
        ]
    }

    /// 扇出四个维度 Agent，全部完成后返回（join 屏障）
    async fn collect_analyses(&self, transcript: &str, metadata: &Value) -> DetailedAnalyses {
        let general = without_audio(metadata);
        let audio = metadata.get("audio").cloned().unwrap_or_else(|| json!({}));

        let (fluency, grammar, vocabulary, pronunciation) = if self.parallel {
            tokio::join!(
                self.fluency.analyze(transcript, &general),
                self.grammar.analyze(transcript, &general),
                self.vocabulary.analyze(transcript, &general),
                self.pronunciation.analyze(transcript, &audio),
            )
        } else {
            (
                self.fluency.analyze(transcript, &general).await,
                self.grammar.analyze(transcript, &general).await,
                self.vocabulary.analyze(transcript, &general).await,
                self.pronunciation.analyze(transcript, &audio).await,
            )
        };

        DetailedAnalyses {
            fluency: fluency.into_inner(),
            grammar: grammar.into_inner(),
            vocabulary: vocabulary.into_inner(),
            pronunciation: pronunciation.into_inner(),
        }
    }

    /// 综合评分；Generated::Fallback 表示汇总步骤使用了平均分兜底
    pub async fn score_response(&self, transcript: &str, metadata: &Value) -> Generated<CompositeScore> {
        let analyses = self.collect_analyses(transcript, metadata).await;
        let obs = self.core.observe(json!({ "band_estimates": analyses.band_estimates() }));

        let sections = [
            (self.fluency.criterion(), pretty(&analyses.fluency)),
            (self.grammar.criterion(), pretty(&analyses.grammar)),
            (self.vocabulary.criterion(), pretty(&analyses.vocabulary)),
            (self.pronunciation.criterion(), pretty(&analyses.pronunciation)),
        ]
        .iter()
        .map(|(criterion, body)| format!("{}:\n{}", criterion.title(), body))
        .collect::<Vec<_>>()
        .join("\n\n");

        let prompt = format!(
            r#"You are an IELTS scoring orchestrator.

Agent Analyses:

{sections}

Your task:
1. Review all agent scores
2. Resolve any conflicts or inconsistencies
3. Calculate final band score (average of 4 criteria)
4. Provide comprehensive feedback

Return JSON:
{{
    "fluency_band": "5.0-9.0",
    "grammar_band": "5.0-9.0",
    "vocabulary_band": "5.0-9.0",
    "pronunciation_band": "5.0-9.0",
    "overall_band": "5.0-9.0",
    "strengths": ["overall strength 1", "overall strength 2"],
    "weaknesses": ["overall weakness 1", "overall weakness 2"],
    "priority_improvements": ["improvement 1", "improvement 2"],
    "detailed_feedback": "comprehensive explanation",
    "confidence": "0.0-1.0"
}}"#
        );

        let fallback = Reconciliation::from_analyses(&analyses);
        let score = self
            .core
            .generate_structured(prompt, 0.2, move || fallback)
            .await
            .map(|r| r.into_score(analyses));

        let value = score.value();
        let dec = self.core.decide(
            Some(obs),
            json!({ "overall_band": value.overall_band, "outcome": outcome_label(&score) }),
        );
        self.core.act(Some(dec), json!({ "type": "composite_score" }));
        self.core.set_confidence(value.confidence);
        tracing::info!(overall = %value.overall_band, fallback = score.is_fallback(), "composite score ready");
        score
    }

    /// 独立质检；解析失败时假定有效
    pub async fn validate_score(&self, score: &CompositeScore) -> Generated<ScoreValidation> {
        let prompt = format!(
            r#"You are a QA agent validating IELTS scores.

Score to validate:
{score}

Check:
1. Are scores consistent with feedback?
2. Is the overall band correctly calculated?
3. Are there any biases or unfair judgments?
4. Is feedback constructive and specific?

Return JSON:
{{
    "valid": true|false,
    "issues": ["issue 1", "issue 2"],
    "corrections": {{"field": "corrected_value"}},
    "confidence": "0.0-1.0"
}}"#,
            score = pretty(score)
        );

        let validation = self
            .core
            .generate_structured(prompt, 0.1, ScoreValidation::assume_valid)
            .await;
        let v = validation.value();
        self.core.reflect(
            None,
            json!({ "valid": v.valid, "issues": v.issues.len(), "outcome": outcome_label(&validation) }),
        );
        validation
    }
}
