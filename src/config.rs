//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SPEAKFLUENT__*` 覆盖（双下划线表示嵌套，如 `SPEAKFLUENT__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agents: AgentsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择、输出上限与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai（任意 OpenAI 兼容端点）/ mock
    pub provider: String,
    pub model: String,
    /// 未设置时使用 NVIDIA integrate 端点
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名；未设置时再尝试 OPENAI_API_KEY
    pub api_key_env: String,
    pub max_tokens: u32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: crate::llm::openai::DEFAULT_MODEL.to_string(),
            base_url: None,
            api_key_env: "NVIDIA_API_KEY".to_string(),
            max_tokens: 4096,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次生成请求超时（秒），超时按后端失败处理
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [agents] 段：记忆窗口、对话窗口与评分并发
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentsSection {
    /// 关闭后 Agent 不再记录记忆（不影响任何输出）
    pub memory_enabled: bool,
    /// 暴露给 prompt 的最近记忆条数
    pub memory_window: usize,
    /// 考官 prompt 中携带的最近对话条数
    pub history_window: usize,
    /// 是否把记忆窗口拼入 prompt
    pub include_memory_in_prompts: bool,
    /// 四个评分 Agent 是否并发调用
    pub parallel_scoring: bool,
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            memory_enabled: true,
            memory_window: 10,
            history_window: 5,
            include_memory_in_prompts: false,
            parallel_scoring: true,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SPEAKFLUENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SPEAKFLUENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SPEAKFLUENT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
