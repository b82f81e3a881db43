//! 核心编排层：错误与终止结果、编排器门面、从配置构建编排器

pub mod builder;
pub mod error;
pub mod orchestrator;

pub use builder::OrchestratorBuilder;
pub use error::{AgentError, TerminationKind, TerminationResult};
pub use orchestrator::{describe_error, Orchestrator, RunOptions, Workflow};
