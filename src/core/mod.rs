//! 核心编排层：错误、Agent 状态、会话与会话存储、编排器及其构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod session_store;
pub mod state;

pub use builder::OrchestratorBuilder;
pub use error::{CoachError, ErrorKind, Result};
pub use orchestrator::{
    create_llm_from_config, ActiveSessions, Orchestrator, SessionReport, SessionStart,
    SessionSummary, TurnOutcome,
};
pub use session::{Exchange, Session, SessionStatus, SessionType};
pub use session_store::{InMemorySessionStore, SessionHandle, SessionStore};
pub use state::{AgentRole, AgentState, AgentStateSnapshot};
