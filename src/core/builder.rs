//! 编排器构建器：从 AppConfig 组装补全服务、工具注册表与编排器
//!
//! chat 与 pipeline 两种入口共享同一套工具，推理循环与流水线看到的工具名和审计日志一致。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{secret, AppConfig, OPENAI_API_KEY_ENV, TAVILY_API_KEY_ENV};
use crate::core::{AgentError, Orchestrator};
use crate::llm::{CompletionService, OpenAiCompletion};
use crate::react::PromptTemplate;
use crate::tools::{
    DatabaseReaderTool, EmailSenderTool, LogTrackerTool, OutboxMailer, SupplierSearchTool,
    ToolExecutor, ToolRegistry,
};

pub struct OrchestratorBuilder {
    config: AppConfig,
    completion: Option<Arc<dyn CompletionService>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            completion: None,
        }
    }

    /// 指定补全服务（测试或离线演示用），不再从环境变量创建
    pub fn with_completion(mut self, completion: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// 根据配置与 OPENAI_API_KEY 创建补全服务；没有 Key 时返回 None
    pub fn build_completion(&self) -> Option<Arc<dyn CompletionService>> {
        if let Some(completion) = &self.completion {
            return Some(Arc::clone(completion));
        }
        let Some(api_key) = secret(OPENAI_API_KEY_ENV) else {
            tracing::warn!("{} not set, agent mode disabled", OPENAI_API_KEY_ENV);
            return None;
        };
        let llm = &self.config.llm;
        tracing::info!(model = %llm.model, "using OpenAI-compatible completion service");
        Some(Arc::new(
            OpenAiCompletion::new(llm.base_url.as_deref(), &llm.model, Some(&api_key))
                .with_temperature(llm.temperature)
                .with_timeout(Duration::from_secs(llm.request_timeout_secs)),
        ))
    }

    /// 构建工具注册表：Database Reader、Supplier Finder、Email Sender、Log Tracker
    pub fn build_tool_registry(&self) -> Result<ToolRegistry, AgentError> {
        let tools = &self.config.tools;
        ensure_parent_dir(&tools.database_path)?;

        let reader = DatabaseReaderTool::open(&tools.database_path)
            .map_err(|e| AgentError::Io(format!("open {}: {e}", tools.database_path.display())))?
            .with_schema_in_description();
        let tracker = LogTrackerTool::open(&tools.database_path)
            .map_err(|e| AgentError::Io(format!("open action log: {e}")))?;

        let search_key = secret(TAVILY_API_KEY_ENV).unwrap_or_else(|| {
            tracing::warn!("{} not set, supplier searches will fail", TAVILY_API_KEY_ENV);
            String::new()
        });
        let search = SupplierSearchTool::new(
            tools.search.api_url.clone(),
            search_key,
            tools.search.max_results,
            tools.search.timeout_secs,
        );

        let app = &self.config.app;
        if app.boss_email.trim().is_empty() {
            tracing::warn!("app.boss_email is empty, notifications cannot be sent");
        }
        let email = EmailSenderTool::new(
            Arc::new(OutboxMailer::new(&tools.email.outbox_dir)),
            app.agent_email.clone(),
            app.boss_email.clone(),
        );

        Ok(ToolRegistry::builder()
            .register(reader)
            .register(search)
            .register(email)
            .register(tracker)
            .build()?)
    }

    pub fn build(self) -> Result<Orchestrator, AgentError> {
        let registry = self.build_tool_registry()?;
        let executor = ToolExecutor::new(Arc::new(registry), self.config.tools.tool_timeout_secs);
        let prompt = PromptTemplate::new(&self.config.app.agent_name, &self.config.app.boss_name);

        let mut orchestrator = Orchestrator::new(executor, prompt)
            .with_max_iterations(self.config.agent.max_iterations)
            .with_model_formatting(self.config.llm.format_with_model);
        if let Some(completion) = self.build_completion() {
            orchestrator = orchestrator.with_completion(completion);
        }
        Ok(orchestrator)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), AgentError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| AgentError::Io(format!("create {}: {e}", parent.display()))),
        _ => Ok(()),
    }
}
