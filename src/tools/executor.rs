//! 工具执行器
//!
//! 持有只读 ToolRegistry 与单次调用超时。invoke(tool_name, input) 总是返回 ToolOutcome，
//! 从不向上传播错误：未知工具、工具返回 Err、超时、甚至 panic 都被转为对应变体；
//! 每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::time::timeout;

use crate::tools::ToolRegistry;

/// 未知工具时写回 transcript 的观察文本
pub const TOOL_NOT_FOUND: &str = "Error: tool not found";
/// 工具失败时观察文本的前缀
pub const TOOL_ERROR_PREFIX: &str = "Error executing tool:";

/// 单次工具调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// 工具正常返回
    Output(String),
    /// 注册表中不存在该工具（DispatchError）
    UnknownTool(String),
    /// 工具返回 Err 或 panic（ToolExecutionError）
    Failed { tool: String, reason: String },
    /// 超过执行器超时
    TimedOut { tool: String, after: Duration },
}

impl ToolOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Output(_))
    }

    /// 转为写回 transcript 的观察文本
    pub fn into_observation(self) -> String {
        match self {
            ToolOutcome::Output(s) => s,
            ToolOutcome::UnknownTool(_) => TOOL_NOT_FOUND.to_string(),
            ToolOutcome::Failed { reason, .. } => format!("{TOOL_ERROR_PREFIX} {reason}"),
            ToolOutcome::TimedOut { after, .. } => {
                format!("{TOOL_ERROR_PREFIX} timed out after {}s", after.as_secs())
            }
        }
    }

    /// 供流水线使用：成功取输出，其余转为错误描述
    pub fn into_result(self) -> Result<String, String> {
        match self {
            ToolOutcome::Output(s) => Ok(s),
            other => Err(other.into_observation()),
        }
    }
}

/// 工具执行器：对每次调用施加超时，并将结果映射为 ToolOutcome
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub async fn invoke(&self, tool_name: &str, input: &str) -> ToolOutcome {
        let Some(tool) = self.registry.get(tool_name) else {
            audit(tool_name, "unknown_tool", 0, input);
            return ToolOutcome::UnknownTool(tool_name.to_string());
        };

        let start = Instant::now();
        let call = AssertUnwindSafe(tool.execute(input)).catch_unwind();
        let result = timeout(self.timeout, call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(Ok(Ok(content))) => ToolOutcome::Output(content),
            Ok(Ok(Err(reason))) => ToolOutcome::Failed {
                tool: tool_name.to_string(),
                reason,
            },
            Ok(Err(panic)) => ToolOutcome::Failed {
                tool: tool_name.to_string(),
                reason: format!("tool panicked: {}", panic_message(&*panic)),
            },
            Err(_) => ToolOutcome::TimedOut {
                tool: tool_name.to_string(),
                after: self.timeout,
            },
        };
        let label = match &outcome {
            ToolOutcome::Output(_) => "ok",
            ToolOutcome::UnknownTool(_) => "unknown_tool",
            ToolOutcome::Failed { .. } => "error",
            ToolOutcome::TimedOut { .. } => "timeout",
        };
        audit(tool_name, label, duration_ms, input);
        outcome
    }
}

fn audit(tool: &str, outcome: &str, duration_ms: u64, input: &str) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "ok": outcome == "ok",
        "outcome": outcome,
        "duration_ms": duration_ms,
        "input_preview": input_preview(input),
    });
    tracing::info!(audit = %audit, "tool");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn input_preview(input: &str) -> String {
    if input.chars().count() > 200 {
        format!("{}...", input.chars().take(200).collect::<String>())
    } else {
        input.to_string()
    }
}
