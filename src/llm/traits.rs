//! 文本补全服务抽象
//!
//! 推理循环只依赖 CompletionService：把完整上下文（指令 + 历史 + scratchpad）作为一段文本发送，
//! 取回一段自由文本。失败直接上抛为终止错误，核心不做额外重试。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// 补全服务错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("empty response")]
    EmptyResponse,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// 文本补全服务：每个推理循环周期调用一次 complete
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, context: &str) -> Result<String, LlmError>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
