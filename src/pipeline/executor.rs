//! 流水线执行器
//!
//! 按固定顺序逐个运行阶段，阶段 n+1 只在阶段 n 返回后开始；不跳过、不重试。
//! 阶段返回 Err 即终止整次运行，status 字段记录失败阶段名与错误文本；阶段 panic 同样按失败处理。
//! 取消与截止时间只在阶段边界检查，status 记录尚未开始的那个阶段。

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::pipeline::state::{PipelineState, STATUS};
use crate::tools::TableError;

/// 阶段内的非预期错误（对整次运行是致命的）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("tool '{tool}' failed: {reason}")]
    Tool { tool: String, reason: String },

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("stage panicked: {0}")]
    Panicked(String),
}

impl From<TableError> for StageError {
    fn from(e: TableError) -> Self {
        StageError::Malformed(e.to_string())
    }
}

/// 一个确定性的状态变换步骤
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// 读取当前状态，返回写入本阶段字段后的新状态
    async fn run(&self, state: &PipelineState) -> Result<PipelineState, StageError>;
}

/// 一次运行的结束方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    Failed { stage: String, error: StageError },
    Cancelled { stage: String, completed: usize },
    DeadlineExceeded { stage: String, completed: usize },
}

/// 终态 + 结束方式
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub state: PipelineState,
    pub outcome: PipelineOutcome,
}

impl PipelineRun {
    pub fn is_completed(&self) -> bool {
        self.outcome == PipelineOutcome::Completed
    }

    pub fn status(&self) -> Option<&str> {
        self.state.get(STATUS)
    }
}

pub struct PipelineExecutor {
    stages: Vec<Box<dyn Stage>>,
    cancel_token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            cancel_token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stages(mut self, stages: Vec<Box<dyn Stage>>) -> Self {
        self.stages.extend(stages);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn execute(&self, initial_state: PipelineState) -> PipelineRun {
        let total = self.stages.len();
        let mut state = initial_state;

        for (idx, stage) in self.stages.iter().enumerate() {
            let name = stage.name();

            if self.cancel_token.is_cancelled() {
                tracing::warn!(stage = name, completed = idx, "pipeline cancelled");
                state.set(
                    STATUS,
                    format!("Pipeline cancelled before stage '{name}' ({idx}/{total} stages completed)."),
                );
                return PipelineRun {
                    state,
                    outcome: PipelineOutcome::Cancelled {
                        stage: name.to_string(),
                        completed: idx,
                    },
                };
            }
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(stage = name, completed = idx, "pipeline deadline exceeded");
                state.set(
                    STATUS,
                    format!("Pipeline deadline exceeded before stage '{name}' ({idx}/{total} stages completed)."),
                );
                return PipelineRun {
                    state,
                    outcome: PipelineOutcome::DeadlineExceeded {
                        stage: name.to_string(),
                        completed: idx,
                    },
                };
            }

            tracing::info!(stage = name, step = idx + 1, total, "stage started");
            let result = AssertUnwindSafe(stage.run(&state))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(StageError::Panicked(panic_message(&*panic))));
            match result {
                Ok(next) => {
                    state = next;
                    tracing::info!(stage = name, "stage finished");
                }
                Err(error) => {
                    tracing::error!(stage = name, error = %error, "stage failed, aborting pipeline");
                    state.set(STATUS, format!("Pipeline failed at stage '{name}': {error}"));
                    return PipelineRun {
                        state,
                        outcome: PipelineOutcome::Failed {
                            stage: name.to_string(),
                            error,
                        },
                    };
                }
            }
        }

        PipelineRun {
            state,
            outcome: PipelineOutcome::Completed,
        }
    }
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
