//! 记忆层：Agent 记忆日志（观察/决策/行动/反思）与追加式对话历史

pub mod agent_memory;
pub mod conversation;

pub use agent_memory::{AgentMemory, MemoryEntry, MemoryKind};
pub use conversation::{recent_window, ConversationLog, Message, Role};
