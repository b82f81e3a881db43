//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / execute），输入输出均为文本。
//! ToolRegistry 通过 ToolRegistryBuilder 一次性构建，构建后只读，可经 Arc 在多个 run 之间并发共享。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// 工具 trait：名称（唯一）、描述（供 LLM 理解）、异步执行（string -> string）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（对应 ReAct 文本中的 `Action:` 行）
    fn name(&self) -> &str;

    /// 工具描述（写入 prompt 的工具列表）
    fn description(&self) -> &str;

    /// 执行工具；Err 中的文本会被执行器折叠为 Observation
    async fn execute(&self, input: &str) -> Result<String, String>;
}

/// 注册表构建错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool name must not be empty or whitespace")]
    EmptyName,
    #[error("duplicate tool name: {0}")]
    DuplicateName(String),
}

/// 构建器：按注册顺序收集工具，build 时校验名称
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let mut index = HashMap::with_capacity(self.tools.len());
        for (i, tool) in self.tools.iter().enumerate() {
            let name = tool.name();
            if name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if index.insert(name.to_string(), i).is_some() {
                return Err(RegistryError::DuplicateName(name.to_string()));
            }
        }
        Ok(ToolRegistry {
            tools: self.tools,
            index,
        })
    }
}

/// 只读工具注册表：按名查找，保留注册顺序用于生成 prompt
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的工具段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
