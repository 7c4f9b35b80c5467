//! 后端不可用时的兜底回复
//!
//! 按最后一条消息中的关键词（roadmap / practice content / topics / vocabulary）返回固定 JSON，
//! 其余情况返回一句致歉文本。这是最外层的安全网，刻意保持简单，不做扩展。

use serde_json::json;

use crate::memory::Message;

/// 未命中任何关键词时的回复
pub const APOLOGY: &str = "I apologize, but I cannot generate a response at the moment due to API limitations. Please check your API key.";

/// 根据消息意图返回兜底文本（总是非空）
pub fn canned_response(messages: &[Message]) -> String {
    let last = messages
        .last()
        .map(|m| m.content.to_lowercase())
        .unwrap_or_default();

    if last.contains("roadmap") {
        mock_roadmap().to_string()
    } else if last.contains("practice content") {
        json!({
            "part": 1,
            "date": "2025-12-29",
            "content": {
                "questions": ["What is your favorite color?", "Do you like to travel?", "Tell me about your hometown."],
                "tips": ["Speak clearly", "Expand your answers"],
                "vocabulary": ["vibrant", "journey", "hometown"],
                "expected_duration": "10"
            }
        })
        .to_string()
    } else if last.contains("topics") {
        json!({
            "date": "2025-12-29",
            "topics": [
                {"part": 1, "topic": "Hometown", "difficulty": "easy"},
                {"part": 2, "topic": "A book you read", "difficulty": "medium"},
                {"part": 3, "topic": "Reading habits", "difficulty": "hard"}
            ]
        })
        .to_string()
    } else if last.contains("vocabulary") {
        json!({
            "date": "2025-12-29",
            "theme": "Travel",
            "words": [
                {"word": "Itinerary", "definition": "A planned route or journey", "example": "We planned a detailed itinerary.", "pronunciation": "/aɪˈtɪnəˌrɛri/"},
                {"word": "Excursion", "definition": "A short journey or trip", "example": "We went on an excursion to the mountains.", "pronunciation": "/ɪkˈskɜːrʒən/"}
            ]
        })
        .to_string()
    } else {
        APOLOGY.to_string()
    }
}

/// 固定的学习路线图
pub fn mock_roadmap() -> serde_json::Value {
    json!({
        "roadmap_id": "mock_roadmap",
        "total_weeks": 8,
        "weekly_plan": [
            {"week": 1, "focus": "Mock Focus", "daily_activities": [], "milestone": "Start", "expected_improvement": "0.5"}
        ],
        "mock_tests": [],
        "estimated_final_band": 7.5
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roadmap_intent() {
        let reply = canned_response(&[Message::user("Build me a ROADMAP to band 7")]);
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value, mock_roadmap());
        assert_eq!(value["estimated_final_band"], 7.5);
    }

    #[test]
    fn test_only_last_message_is_sniffed() {
        let messages = vec![Message::system("roadmap"), Message::user("hello")];
        assert_eq!(canned_response(&messages), APOLOGY);
    }

    #[test]
    fn test_vocabulary_and_topics_intents() {
        let vocab = canned_response(&[Message::user("daily vocabulary please")]);
        assert!(vocab.contains("Itinerary"));
        let topics = canned_response(&[Message::user("today's topics")]);
        assert!(topics.contains("Reading habits"));
        let practice = canned_response(&[Message::user("generate practice content")]);
        assert!(practice.contains("expected_duration"));
    }

    #[test]
    fn test_empty_messages() {
        assert_eq!(canned_response(&[]), APOLOGY);
    }
}
