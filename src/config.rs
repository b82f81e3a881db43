//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RESTOCK__*` 覆盖（双下划线表示嵌套，如
//! `RESTOCK__AGENT__MAX_ITERATIONS=10`）。密钥只从环境变量读取，不进入配置文件。

use std::path::PathBuf;

use serde::Deserialize;

use crate::react::DEFAULT_MAX_ITERATIONS;

/// 补全服务 API Key 的环境变量
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// 供应商搜索 API Key 的环境变量
pub const TAVILY_API_KEY_ENV: &str = "TAVILY_API_KEY";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
}

/// [app] 段：智能体与收件人身份
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub agent_name: String,
    pub boss_name: String,
    pub boss_email: String,
    pub agent_email: String,
    /// 对话历史保留轮数（仅 chat 前端使用）
    pub max_history_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            agent_name: "Restock".to_string(),
            boss_name: "the manager".to_string(),
            boss_email: String::new(),
            agent_email: "restock@localhost".to_string(),
            max_history_turns: 10,
        }
    }
}

/// [llm] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// 流水线格式化阶段是否调用模型（否则只用确定性 HTML 渲染）
    pub format_with_model: bool,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.0,
            request_timeout_secs: 60,
            format_with_model: true,
        }
    }
}

/// [agent] 段：推理循环
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: usize,
    /// 单次 run 的截止时间，0 表示不限
    pub run_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            run_timeout_secs: 0,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// SQLite 数据库（products / inventory / action_log）
    pub database_path: PathBuf,
    pub tool_timeout_secs: u64,
    pub search: SearchToolSection,
    pub email: EmailToolSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("database/data.db"),
            tool_timeout_secs: 30,
            search: SearchToolSection::default(),
            email: EmailToolSection::default(),
        }
    }
}

/// [tools.search] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchToolSection {
    pub api_url: String,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchToolSection {
    fn default() -> Self {
        Self {
            api_url: crate::tools::search::DEFAULT_SEARCH_URL.to_string(),
            max_results: 3,
            timeout_secs: 15,
        }
    }
}

/// [tools.email] 段：邮件写入的 outbox 目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailToolSection {
    pub outbox_dir: PathBuf,
}

impl Default for EmailToolSection {
    fn default() -> Self {
        Self {
            outbox_dir: PathBuf::from("outbox"),
        }
    }
}

/// 从默认路径与环境变量加载配置
///
/// 默认路径：config/default.toml 或 ../config/default.toml；可选显式文件；
/// 环境变量：RESTOCK__APP__BOSS_EMAIL、RESTOCK__AGENT__MAX_ITERATIONS 等
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RESTOCK")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 读取环境变量中的密钥；空串视为未设置
pub fn secret(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
