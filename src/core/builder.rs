//! 编排器构建器：统一的初始化逻辑
//!
//! 控制台、测试与上层服务都经由这里组装 Orchestrator：配置 -> 生成后端 -> 会话存储。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{load_config, AppConfig};
use crate::core::orchestrator::create_llm_from_config;
use crate::core::{InMemorySessionStore, Orchestrator, Result, SessionStore};
use crate::llm::LlmClient;

/// 编排器构建器
pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            store: None,
        }
    }

    /// 严格加载：配置无法解析时返回 CoachError::ConfigError
    pub fn try_from_config_path(config_path: Option<PathBuf>) -> Result<Self> {
        let config = load_config(config_path)?;
        Ok(Self::new(config))
    }

    /// 从配置文件加载；加载失败时使用默认配置并告警
    pub fn from_config_path(config_path: Option<PathBuf>) -> Self {
        Self::try_from_config_path(config_path).unwrap_or_else(|e| {
            tracing::warn!("{}, using defaults", e);
            Self::new(AppConfig::default())
        })
    }

    /// 指定生成后端（测试中注入 Mock）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 指定会话存储（默认进程内存储）
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build(self) -> Orchestrator {
        let llm = self
            .llm
            .unwrap_or_else(|| create_llm_from_config(&self.config));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));
        tracing::debug!(backend = llm.name(), "building orchestrator");
        Orchestrator::new(&self.config, llm, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::core::CoachError;
    use crate::llm::MockLlmClient;

    fn malformed_config() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[llm]\nmax_tokens = \"plenty\"").unwrap();
        file
    }

    #[test]
    fn test_strict_load_reports_config_error() {
        let file = malformed_config();
        let err = OrchestratorBuilder::try_from_config_path(Some(file.path().to_path_buf()))
            .err()
            .unwrap();
        assert!(matches!(err, CoachError::ConfigError(_)));
    }

    #[test]
    fn test_lenient_load_falls_back_to_defaults() {
        let file = malformed_config();
        let builder = OrchestratorBuilder::from_config_path(Some(file.path().to_path_buf()));
        assert_eq!(builder.config().llm.max_tokens, AppConfig::default().llm.max_tokens);
    }

    #[tokio::test]
    async fn test_build_with_injected_backend() {
        let orch = OrchestratorBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::new()))
            .build();
        assert_eq!(orch.backend_name(), "mock");
        assert_eq!(orch.active_sessions().await.count, 0);
    }
}
