//! Agent 错误类型与终止结果
//!
//! 推理循环只把「不可恢复」的情况作为 AgentError 返回；格式错误、未知工具、工具失败
//! 都在循环内折叠为 Observation。TerminationResult 描述一次 run 的正常终止方式。

use serde::Serialize;
use thiserror::Error;

use crate::llm::LlmError;
use crate::tools::RegistryError;

/// 引擎运行过程中无法在循环内恢复的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Completion service failed: {0}")]
    Completion(#[from] LlmError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run deadline exceeded")]
    DeadlineExceeded,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Tool registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(String),
}

/// 推理循环的终止方式（每次 run 恰好一种）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    FinalAnswer,
    IterationLimitExceeded,
    UnrecoverableParseError,
}

/// 推理循环结果：终止方式 + 文本（最终回复，或尽力而为的最后上下文）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminationResult {
    pub kind: TerminationKind,
    pub text: String,
    /// 实际执行的循环次数（每次调用 CompletionService 计一次）
    pub cycles: usize,
}

impl TerminationResult {
    pub fn final_answer(text: impl Into<String>, cycles: usize) -> Self {
        Self {
            kind: TerminationKind::FinalAnswer,
            text: text.into(),
            cycles,
        }
    }

    pub fn iteration_limit(text: impl Into<String>, cycles: usize) -> Self {
        Self {
            kind: TerminationKind::IterationLimitExceeded,
            text: text.into(),
            cycles,
        }
    }

    pub fn unrecoverable_parse(text: impl Into<String>, cycles: usize) -> Self {
        Self {
            kind: TerminationKind::UnrecoverableParseError,
            text: text.into(),
            cycles,
        }
    }

    pub fn is_final_answer(&self) -> bool {
        self.kind == TerminationKind::FinalAnswer
    }

    /// 面向用户的终止文本：最终回复原样返回，其余两种包装为可读说明
    pub fn to_user_message(&self) -> String {
        match self.kind {
            TerminationKind::FinalAnswer => self.text.clone(),
            TerminationKind::IterationLimitExceeded => format!(
                "Agent stopped after reaching the iteration limit ({} cycles). Last context:\n{}",
                self.cycles, self.text
            ),
            TerminationKind::UnrecoverableParseError => format!(
                "Agent stopped: the model output could not be parsed twice in a row. Last output:\n{}",
                self.text
            ),
        }
    }
}
