//! Transcript：单次 run 内的 Thought / Action / Observation 记录
//!
//! 只追加，不跨 run 保留。格式违规也记为一轮（带纠正性 Observation），从不静默丢弃。

use crate::react::parser::{ActionCall, FormatError};

/// 一轮的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnKind {
    /// 合法的工具调用
    Action { thought: String, call: ActionCall },
    /// 无法分类的输出
    FormatViolation { error: FormatError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub kind: TurnKind,
    pub observation: String,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_action(&mut self, thought: String, call: ActionCall, observation: String) {
        self.turns.push(Turn {
            kind: TurnKind::Action { thought, call },
            observation,
        });
    }

    pub fn push_violation(&mut self, error: FormatError, observation: String) {
        self.turns.push(Turn {
            kind: TurnKind::FormatViolation { error },
            observation,
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 渲染为 prompt 末尾的 scratchpad
    pub fn render_scratchpad(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            match &turn.kind {
                TurnKind::Action { thought, call } => {
                    if !thought.is_empty() {
                        out.push_str(&format!("Thought: {thought}\n"));
                    }
                    out.push_str(&format!(
                        "Action: {}\nAction Input: {}\n",
                        call.tool_name, call.input
                    ));
                }
                TurnKind::FormatViolation { error } => {
                    out.push_str(&format!("{}\n", error.excerpt));
                }
            }
            out.push_str(&format!("Observation: {}\n", turn.observation));
        }
        out
    }

    /// 最后一轮的思考与观察（迭代上限时作为尽力而为的上下文返回）
    pub fn last_context(&self) -> String {
        match self.turns.last() {
            Some(Turn {
                kind: TurnKind::Action { thought, .. },
                observation,
            }) if !thought.is_empty() => format!("Thought: {thought}\nObservation: {observation}"),
            Some(turn) => format!("Observation: {}", turn.observation),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::parser::parse;

    fn call(tool: &str, input: &str) -> ActionCall {
        ActionCall {
            tool_name: tool.to_string(),
            input: input.to_string(),
        }
    }

    #[test]
    fn test_scratchpad_rendering() {
        let mut t = Transcript::new();
        t.push_action("look up".to_string(), call("EchoTool", "x"), "x".to_string());
        let err = parse("gibberish").unwrap_err();
        t.push_violation(err, "Invalid format".to_string());

        let pad = t.render_scratchpad();
        assert_eq!(
            pad,
            "Thought: look up\nAction: EchoTool\nAction Input: x\nObservation: x\ngibberish\nObservation: Invalid format\n"
        );
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_last_context() {
        let mut t = Transcript::new();
        assert_eq!(t.last_context(), "");
        t.push_action("again".to_string(), call("EchoTool", "x"), "x".to_string());
        assert_eq!(t.last_context(), "Thought: again\nObservation: x");
    }
}
