//! 认知层：ReAct 输出解析、Transcript、指令模板、对话历史与主循环

pub mod events;
pub mod history;
pub mod loop_;
pub mod parser;
pub mod prompt;
pub mod transcript;

pub use events::ReactEvent;
pub use history::{render_history, ConversationMemory, Message, Role};
pub use loop_::{ReasoningLoop, DEFAULT_MAX_ITERATIONS, MAX_CONSECUTIVE_FORMAT_ERRORS};
pub use parser::{parse, ActionCall, ConversationStep, FormatError, FormatViolation};
pub use prompt::PromptTemplate;
pub use transcript::{Transcript, Turn, TurnKind};
