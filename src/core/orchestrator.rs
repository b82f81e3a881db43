//! 编排器：单一入口 run(workflow, input) -> String
//!
//! 无状态门面：按调用方意图选择推理循环（动态选工具）或固定流水线，返回终止文本。
//! 任何不可恢复错误都在这里包装为可读文本，调用方永远拿到字符串。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, TerminationResult};
use crate::llm::CompletionService;
use crate::pipeline::state::INPUT;
use crate::pipeline::{canonical_stages, PipelineExecutor, PipelineRun, PipelineState};
use crate::react::{Message, PromptTemplate, ReactEvent, ReasoningLoop, DEFAULT_MAX_ITERATIONS};
use crate::tools::ToolExecutor;

/// 调用方选择的引擎
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    /// 推理循环：由模型决定调用哪些工具
    Agent,
    /// 固定六阶段库存流水线
    Pipeline,
}

/// 单次 run 的可选参数
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    pub cancel_token: Option<CancellationToken>,
    pub deadline: Option<Instant>,
    /// 仅推理循环使用
    pub history: Vec<Message>,
    pub event_tx: Option<UnboundedSender<ReactEvent>>,
}

pub struct Orchestrator {
    completion: Option<Arc<dyn CompletionService>>,
    executor: ToolExecutor,
    prompt: PromptTemplate,
    max_iterations: usize,
    format_with_model: bool,
}

impl Orchestrator {
    pub fn new(executor: ToolExecutor, prompt: PromptTemplate) -> Self {
        Self {
            completion: None,
            executor,
            prompt,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            format_with_model: true,
        }
    }

    pub fn with_completion(mut self, completion: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// 流水线格式化阶段是否使用补全服务
    pub fn with_model_formatting(mut self, enabled: bool) -> Self {
        self.format_with_model = enabled;
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn completion(&self) -> Option<&Arc<dyn CompletionService>> {
        self.completion.as_ref()
    }

    pub async fn run(&self, workflow: Workflow, input: &str) -> String {
        self.run_with(workflow, input, RunOptions::default()).await
    }

    pub async fn run_with(&self, workflow: Workflow, input: &str, options: RunOptions) -> String {
        match workflow {
            Workflow::Agent => match self.run_agent(input, options).await {
                Ok(result) => result.to_user_message(),
                Err(e) => describe_error(&e),
            },
            Workflow::Pipeline => {
                let run = self.run_pipeline(input, options).await;
                run.status()
                    .map(str::to_string)
                    .unwrap_or_else(|| "Pipeline completed with no status.".to_string())
            }
        }
    }

    /// 推理循环；没有配置补全服务时返回 Config 错误
    pub async fn run_agent(
        &self,
        input: &str,
        options: RunOptions,
    ) -> Result<TerminationResult, AgentError> {
        let completion = self.completion.as_deref().ok_or_else(|| {
            AgentError::Config("no completion service configured (set OPENAI_API_KEY)".to_string())
        })?;

        let mut reasoning = ReasoningLoop::new(completion, &self.executor, &self.prompt)
            .with_max_iterations(self.max_iterations)
            .with_history(&options.history);
        if let Some(token) = options.cancel_token {
            reasoning = reasoning.with_cancel_token(token);
        }
        if let Some(deadline) = options.deadline {
            reasoning = reasoning.with_deadline(deadline);
        }
        if let Some(tx) = options.event_tx.as_ref() {
            reasoning = reasoning.with_event_tx(tx);
        }
        reasoning.run(input).await
    }

    /// 固定流水线；非空输入记入初始状态的 input 字段
    pub async fn run_pipeline(&self, input: &str, options: RunOptions) -> PipelineRun {
        let formatter = self
            .completion
            .clone()
            .filter(|_| self.format_with_model);
        let mut pipeline =
            PipelineExecutor::new().stages(canonical_stages(&self.executor, formatter));
        if let Some(token) = options.cancel_token {
            pipeline = pipeline.with_cancel_token(token);
        }
        if let Some(deadline) = options.deadline {
            pipeline = pipeline.with_deadline(deadline);
        }

        let mut initial = PipelineState::new();
        if !input.trim().is_empty() {
            initial.set(INPUT, input.trim());
        }
        pipeline.execute(initial).await
    }
}

/// 不可恢复错误的用户可读文本
pub fn describe_error(err: &AgentError) -> String {
    match err {
        AgentError::Cancelled => "Run cancelled before completion.".to_string(),
        AgentError::DeadlineExceeded => "Run stopped: the deadline was exceeded.".to_string(),
        AgentError::Completion(e) => format!("Agent stopped: the completion service failed ({e})."),
        other => format!("Agent unavailable: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedCompletion};
    use crate::tools::{EchoTool, ToolRegistry};

    fn orchestrator() -> Orchestrator {
        let registry = ToolRegistry::builder().register(EchoTool).build().unwrap();
        Orchestrator::new(ToolExecutor::new(Arc::new(registry), 5), PromptTemplate::default())
    }

    #[tokio::test]
    async fn test_agent_returns_final_answer_text() {
        let orch = orchestrator().with_completion(Arc::new(ScriptedCompletion::new([
            "Action: EchoTool\nAction Input: ping",
            "Final Answer: pong",
        ])));
        assert_eq!(orch.run(Workflow::Agent, "ping?").await, "pong");
    }

    #[tokio::test]
    async fn test_agent_without_completion_is_readable_message() {
        let out = orchestrator().run(Workflow::Agent, "hi").await;
        assert!(out.starts_with("Agent unavailable: Config error"));
    }

    #[tokio::test]
    async fn test_completion_failure_is_wrapped() {
        let orch = orchestrator().with_completion(Arc::new(
            ScriptedCompletion::default().then_fail(LlmError::Request("HTTP 500".to_string())),
        ));
        let out = orch.run(Workflow::Agent, "hi").await;
        assert_eq!(
            out,
            "Agent stopped: the completion service failed (request failed: HTTP 500)."
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_is_wrapped() {
        let orch = orchestrator().with_completion(Arc::new(ScriptedCompletion::repeat("Final Answer: x")));
        let token = CancellationToken::new();
        token.cancel();
        let out = orch
            .run_with(
                Workflow::Agent,
                "hi",
                RunOptions {
                    cancel_token: Some(token),
                    ..RunOptions::default()
                },
            )
            .await;
        assert_eq!(out, "Run cancelled before completion.");
    }

    #[tokio::test]
    async fn test_pipeline_without_inventory_tool_reports_failing_stage() {
        let out = orchestrator().run(Workflow::Pipeline, "").await;
        assert!(out.starts_with("Pipeline failed at stage 'CheckInventory'"));
        assert!(out.contains("tool not found"));
    }
}
