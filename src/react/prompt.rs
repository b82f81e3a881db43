//! ReAct 指令模板
//!
//! 每个周期把「指令 + 工具列表 + 对话历史 + 用户问题 + scratchpad」拼成一段上下文交给补全服务。
//! 规则里明确要求最终回复与工具调用不得出现在同一轮。

use crate::react::history::{render_history, Message};
use crate::react::transcript::Transcript;
use crate::tools::ToolRegistry;

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    agent_name: String,
    boss_name: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new("Restock", "the manager")
    }
}

impl PromptTemplate {
    pub fn new(agent_name: impl Into<String>, boss_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            boss_name: boss_name.into(),
        }
    }

    pub fn render(
        &self,
        registry: &ToolRegistry,
        history: &[Message],
        user_input: &str,
        transcript: &Transcript,
    ) -> String {
        let tools = registry
            .tool_descriptions()
            .into_iter()
            .map(|(name, desc)| format!("- {name}: {desc}"))
            .collect::<Vec<_>>()
            .join("\n");
        let tool_names = registry.tool_names().join(", ");
        let history = if history.is_empty() {
            "(none)".to_string()
        } else {
            render_history(history)
        };

        format!(
            "You are an inventory assistant named {agent}. The user is {boss}.\n\
Task: answer inventory-related questions and perform the requested actions with the tools below.\n\
\n\
You have tools:\n\
{tools}\n\
\n\
Rules:\n\
- NEVER include a Final Answer and an Action in the same response.\n\
- Emit exactly one Action per response, then stop and wait for the Observation.\n\
- When writing SQL, write ONLY the SQL (no backticks, markdown or comments).\n\
- Prefer ONE SQL that joins products with inventory, sums quantity and filters total < threshold.\n\
- If a tool fails, try a corrected attempt; do not conclude after an error.\n\
- Ground your Final Answer in the actual tool Observations and keep it concise.\n\
- When using the Email Sender tool, write the input as: subject || body, with the body as HTML.\n\
\n\
Format:\n\
Thought: reasoning\n\
Action: one of [{tool_names}]\n\
Action Input: input for the action\n\
Observation: (the system inserts the tool result)\n\
... (repeat Thought/Action/Action Input/Observation as needed)\n\
Thought: I now know the final answer\n\
Final Answer: concise result grounded in the Observations\n\
\n\
Conversation history:\n\
{history}\n\
\n\
User query: {input}\n\
\n\
{scratchpad}",
            agent = self.agent_name,
            boss = self.boss_name,
            tools = tools,
            tool_names = tool_names,
            history = history,
            input = user_input,
            scratchpad = transcript.render_scratchpad(),
        )
    }
}
