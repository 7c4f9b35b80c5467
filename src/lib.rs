//! SpeakFluent - Rust 多智能体口语考试教练
//!
//! 模块划分：
//! - **agents**: 考官、四个评分维度 Agent、评分编排、辅助 Agent、语言导师
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、Agent 状态、会话与存储、编排器
//! - **llm**: 生成能力（OpenAI 兼容 / Mock）与兜底边界
//! - **memory**: Agent 记忆日志与追加式对话历史
//! - **observability**: 日志初始化

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;

pub use crate::core::{CoachError, Orchestrator, OrchestratorBuilder, SessionType};
