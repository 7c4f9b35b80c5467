//! 语言导师：对话练习、语法纠错、主题词汇、小测验、带语境的翻译
//!
//! 与口语会话无关的单次调用工具；每个操作都有固定兜底（纠错与翻译的兜底直接使用原始输出）。

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agents::base::AgentCore;
use crate::agents::structured::{Generated, Structured};
use crate::config::AgentsSection;
use crate::core::AgentRole;
use crate::llm::{GenerationService, TextStream};
use crate::memory::Message;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mistake {
    pub error: String,
    #[serde(default)]
    pub correction: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarCorrection {
    #[serde(default)]
    pub original: String,
    pub corrected: String,
    #[serde(default)]
    pub mistakes: Vec<Mistake>,
}

impl Structured for GrammarCorrection {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyWord {
    pub word: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub example: String,
    #[serde(default)]
    pub pronunciation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
}

/// 生成能力可能返回裸数组，也可能包一层 {"words": [...]}
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VocabularyList {
    Bare(Vec<VocabularyWord>),
    Wrapped { words: Vec<VocabularyWord> },
}

impl Structured for VocabularyList {}

impl VocabularyList {
    fn into_words(self) -> Vec<VocabularyWord> {
        match self {
            VocabularyList::Bare(words) | VocabularyList::Wrapped { words } => words,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    FillBlank,
    Translation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
}

impl Structured for Quiz {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    #[serde(default)]
    pub original: String,
    pub translation: String,
    #[serde(default)]
    pub literal: String,
    #[serde(default)]
    pub notes: String,
}

impl Structured for Translation {}

/// 语言导师
pub struct LanguageTutor {
    core: AgentCore,
}

impl LanguageTutor {
    pub fn new(llm: GenerationService, settings: &AgentsSection) -> Self {
        Self {
            core: AgentCore::new(AgentRole::Tutor, llm, settings),
        }
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    fn conversation_messages(message: &str, language: &str, level: &str) -> Vec<Message> {
        vec![
            Message::system(format!(
                "You are a friendly language tutor helping students practice {language}. \
                 The student's level is {level}. Respond naturally to their message, and gently correct any mistakes \
                 they make. Keep your responses conversational and encouraging."
            )),
            Message::user(message),
        ]
    }

    /// 自由对话练习，返回导师的回复文本
    pub async fn practice_conversation(&self, message: &str, language: &str, level: &str) -> String {
        let messages = Self::conversation_messages(message, language, level);
        self.core.act(None, json!({ "type": "practice_conversation", "language": language }));
        self.core.generate_text(&messages, 0.8).await
    }

    /// 对话练习的流式版本
    pub async fn practice_conversation_stream(&self, message: &str, language: &str, level: &str) -> TextStream {
        let messages = Self::conversation_messages(message, language, level);
        self.core.llm().generate_stream(&messages, 0.8).await
    }

    pub async fn grammar_correction(&self, text: &str, language: &str) -> Generated<GrammarCorrection> {
        let messages = vec![
            Message::system(format!(
                r#"You are a {language} grammar expert. Analyze the following text and:
1. Identify any grammar mistakes
2. Provide corrections
3. Explain why each correction is needed

Return your response in JSON format with the following structure:
{{
    "original": "original text",
    "corrected": "corrected text",
    "mistakes": [
        {{"error": "mistake", "correction": "fix", "explanation": "why"}}
    ]
}}"#
            )),
            Message::user(text),
        ];
        let mut out = self
            .core
            .generate_structured_from(&messages, 0.3, |raw| GrammarCorrection {
                original: text.to_string(),
                corrected: raw.to_string(),
                mistakes: Vec::new(),
            })
            .await;
        if let Generated::Parsed(ref mut correction) = out {
            if correction.original.is_empty() {
                correction.original = text.to_string();
            }
        }
        out
    }

    pub async fn vocabulary_builder(&self, topic: &str, language: &str, count: usize) -> Generated<Vec<VocabularyWord>> {
        let messages = vec![
            Message::system(format!(
                r#"Generate {count} useful {language} vocabulary words related to '{topic}'.
For each word, provide:
1. The word
2. Definition
3. Example sentence
4. Pronunciation guide (if applicable)

Return as JSON array with structure:
[
    {{"word": "word", "definition": "def", "example": "sentence", "pronunciation": "guide"}}
]"#
            )),
            Message::user(format!("Generate vocabulary for: {topic}")),
        ];
        self.core
            .generate_structured_from(&messages, 0.7, |_| VocabularyList::Bare(Vec::new()))
            .await
            .map(VocabularyList::into_words)
    }

    pub async fn generate_quiz(&self, topic: &str, language: &str, difficulty: &str) -> Generated<Quiz> {
        let messages = vec![
            Message::system(format!(
                r#"Create a {difficulty} level {language} quiz about '{topic}' with 5 questions.
Include multiple choice, fill-in-the-blank, and translation questions.

Return as JSON:
{{
    "title": "Quiz title",
    "questions": [
        {{
            "type": "multiple_choice|fill_blank|translation",
            "question": "question text",
            "options": ["opt1", "opt2", "opt3", "opt4"],
            "correct_answer": "answer",
            "explanation": "why this is correct"
        }}
    ]
}}"#
            )),
            Message::user(format!("Create quiz for: {topic}")),
        ];
        self.core
            .generate_structured_from(&messages, 0.6, |_| Quiz {
                title: topic.to_string(),
                questions: Vec::new(),
            })
            .await
    }

    pub async fn translate_with_context(&self, text: &str, source: &str, target: &str) -> Generated<Translation> {
        let messages = vec![
            Message::system(format!(
                r#"Translate the following text from {source} to {target}.
Provide:
1. Direct translation
2. Literal translation (word-by-word if helpful)
3. Cultural context or notes if relevant

Return as JSON:
{{
    "original": "original text",
    "translation": "translated text",
    "literal": "literal translation",
    "notes": "cultural context or grammar notes"
}}"#
            )),
            Message::user(text),
        ];
        self.core
            .generate_structured_from(&messages, 0.5, |raw| Translation {
                original: text.to_string(),
                translation: raw.to_string(),
                literal: String::new(),
                notes: String::new(),
            })
            .await
    }
}
