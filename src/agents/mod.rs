//! Agent 层：共享骨架、结构化输出、评分维度、评分编排、考官、辅助 Agent、每日内容与语言导师

pub mod base;
pub mod criterion;
pub mod daily;
pub mod examiner;
pub mod scoring;
pub mod structured;
pub mod support;
pub mod tutor;

pub use base::AgentCore;
pub use criterion::{
    Assessment, Criterion, CriterionAgent, FluencyAgent, FluencyAnalysis, GrammarAgent,
    GrammarAnalysis, PronunciationAgent, PronunciationAnalysis, VocabularyAgent,
    VocabularyAnalysis,
};
pub use daily::{
    DailyPractice, DailyTopic, DailyTopics, DailyVocabulary, Difficulty, PracticeContent, Roadmap,
    RoadmapRequest, RoadmapWeek,
};
pub use examiner::{
    CueCard, ExaminerAction, ExaminerAgent, ExaminerConversation, NextQuestion, OpeningQuestion,
    ResponseEvaluation, Speaker, Turn,
};
pub use scoring::{CompositeScore, DetailedAnalyses, ScoreValidation, ScoringOrchestrator};
pub use structured::{Band, Generated, Structured};
pub use support::{
    CoachAgent, ConfidenceAgent, ConfidenceAnalysis, ConfidenceLevel, ContentAgent, ContentIdeas,
    Motivation, PlannerAgent, Reattempt, Reflection, ReflectionAgent, StudyPlan,
};
pub use tutor::{GrammarCorrection, LanguageTutor, Quiz, Translation, VocabularyWord};
