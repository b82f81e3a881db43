//! 推理循环过程事件：供前端展示每个周期的思考、工具调用与观察

use serde::Serialize;

use crate::core::TerminationKind;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 新周期开始（第几轮 / 上限）
    CycleStarted { cycle: usize, max_cycles: usize },
    /// 模型给出的思考
    Thought { text: String },
    /// 调用工具
    ToolCall { tool: String, input: String },
    /// 工具返回或错误文本
    Observation { tool: String, text: String },
    /// 模型输出无法解析
    FormatViolation { reason: String, consecutive: usize },
    /// 循环终止
    Terminated { kind: TerminationKind, cycles: usize },
    /// 补全服务失败等终止性错误
    Error { text: String },
}
