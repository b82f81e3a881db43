//! Echo 工具（测试用）

use async_trait::async_trait;

use crate::tools::Tool;

/// Echo 工具：原样返回输入
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "EchoTool"
    }

    fn description(&self) -> &str {
        "Echo the input back verbatim (for testing)."
    }

    async fn execute(&self, input: &str) -> Result<String, String> {
        Ok(input.to_string())
    }
}
