//! Restock - 库存补货智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、终止结果、编排器与构建器
//! - **llm**: 文本补全服务抽象与实现（OpenAI 兼容 / 脚本化回放）
//! - **observability**: tracing 初始化
//! - **pipeline**: 固定六阶段库存流水线与执行器
//! - **react**: ReAct 输出解析、Transcript、指令模板、推理循环
//! - **tools**: 工具注册表、执行器与库存场景工具

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod react;
pub mod tools;

pub use crate::core::{Orchestrator, OrchestratorBuilder, RunOptions, Workflow};
