//! 结构化输出：从 LLM 文本中提取 JSON 并解析为固定结构
//!
//! 每个 Agent 的输出都是固定形状的结构体；解析失败返回 Err，由 AgentCore 换成该 Agent 的兜底值，
//! 并以 Generated::Fallback 标记，使兜底路径可观测、可测试。

use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::core::CoachError;

/// 可由 LLM 生成的结构：解析后可追加形状校验
pub trait Structured: DeserializeOwned {
    /// 解析成功后的额外校验（如条目数量），默认通过
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Structured for serde_json::Value {}

/// 一次结构化生成的结果：解析成功，或使用了兜底值
#[derive(Debug, Clone, PartialEq)]
pub enum Generated<T> {
    Parsed(T),
    Fallback { value: T, reason: String },
}

impl<T> Generated<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Generated::Fallback { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Generated::Parsed(v) => v,
            Generated::Fallback { value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Generated::Parsed(v) => v,
            Generated::Fallback { value, .. } => value,
        }
    }

    /// 转换内部值，保留是否兜底的标记
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Generated<U> {
        match self {
            Generated::Parsed(v) => Generated::Parsed(f(v)),
            Generated::Fallback { value, reason } => Generated::Fallback {
                value: f(value),
                reason,
            },
        }
    }
}

/// 从文本中截取 JSON：```json 代码块，或第一个 { / [ 到与之配对类型的最后一个 } / ]
pub fn extract_json(output: &str) -> &str {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }

    let open = trimmed.find(['{', '[']);
    match open {
        Some(start) => {
            let close = if trimmed[start..].starts_with('{') { '}' } else { ']' };
            match trimmed.rfind(close) {
                Some(end) if end > start => &trimmed[start..=end],
                _ => trimmed,
            }
        }
        None => trimmed,
    }
}

/// 解析为目标结构并校验
pub fn parse_structured<T: Structured>(output: &str) -> Result<T, CoachError> {
    let json_str = extract_json(output);
    let parsed: T = serde_json::from_str(json_str)
        .map_err(|e| CoachError::JsonParseError(format!("{}: {}", e, preview(json_str))))?;
    parsed.validate().map_err(CoachError::JsonParseError)?;
    Ok(parsed)
}

fn preview(s: &str) -> String {
    s.chars().take(120).collect()
}

/// 数字或字符串形式的数值（LLM 两种都会输出）
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberLike {
    Num(f64),
    Str(String),
}

impl NumberLike {
    fn to_f64<E: de::Error>(self) -> Result<f64, E> {
        let v = match self {
            NumberLike::Num(n) => n,
            NumberLike::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("not a number: {s}")))?,
        };
        if v.is_finite() {
            Ok(v)
        } else {
            Err(E::custom("non-finite number"))
        }
    }
}

/// 口语 band 分：本系统评分区间 [5.0, 9.0]，保留一位小数（四舍五入，.x5 向远离零方向进位）
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Band(f64);

impl Band {
    pub const MIN: f64 = 5.0;
    pub const MAX: f64 = 9.0;

    pub fn new(value: f64) -> Self {
        let clamped = value.clamp(Self::MIN, Self::MAX);
        Band((clamped * 10.0).round() / 10.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// 算术平均后按同一规则取一位小数；空输入返回中性分 6.0
    pub fn mean(bands: &[Band]) -> Band {
        if bands.is_empty() {
            return Band::neutral();
        }
        let sum: f64 = bands.iter().map(|b| b.0).sum();
        Band::new(sum / bands.len() as f64)
    }

    pub fn neutral() -> Band {
        Band(6.0)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

impl Serialize for Band {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Band {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = NumberLike::deserialize(deserializer)?;
        Ok(Band::new(raw.to_f64()?))
    }
}

/// 置信度：接受 "0.8" 或 0.8，截断到 [0, 1]
pub fn de_confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let raw = NumberLike::deserialize(deserializer)?;
    Ok(raw.to_f64()?.clamp(0.0, 1.0) as f32)
}
