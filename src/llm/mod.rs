//! LLM 层：补全服务抽象与实现（OpenAI 兼容 / 脚本化 Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::ScriptedCompletion;
pub use openai::{OpenAiCompletion, TokenUsage};
pub use traits::{CompletionService, LlmError};
