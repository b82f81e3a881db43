//! 脚本化补全服务（用于测试与离线演示，无需 API）
//!
//! 按顺序回放预置回复；脚本耗尽后重复最后一条（或使用 repeat 构造的固定回复）。
//! 同时记录调用次数与每次收到的上下文，便于断言循环步数。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{CompletionService, LlmError};

#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    script: Vec<Result<String, LlmError>>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: responses.into_iter().map(|s| Ok(s.into())).collect(),
            ..Self::default()
        }
    }

    /// 每次都返回同一段文本
    pub fn repeat(response: impl Into<String>) -> Self {
        Self::new([response.into()])
    }

    /// 追加一条失败回复
    pub fn then_fail(mut self, err: LlmError) -> Self {
        self.script.push(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的上下文副本
    pub fn contexts(&self) -> Vec<String> {
        self.contexts
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, context: &str) -> Result<String, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut c) = self.contexts.lock() {
            c.push(context.to_string());
        }
        match self.script.get(n).or_else(|| self.script.last()) {
            Some(r) => r.clone(),
            None => Err(LlmError::EmptyResponse),
        }
    }
}
