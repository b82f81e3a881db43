//! ReAct 主循环
//!
//! AwaitingModel -> AwaitingParse -> Dispatching -> AwaitingModel ... -> Terminated。
//! 格式错误、未知工具、工具失败都折叠为 Observation 写回 transcript，由下一轮自行纠正；
//! 连续两次格式错误、达到迭代上限、或给出最终回复时终止。补全服务失败、取消、超过截止时间
//! 作为 AgentError 上抛。取消与截止时间只在周期边界检查，不会打断正在执行的工具。

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, TerminationResult};
use crate::llm::CompletionService;
use crate::react::history::Message;
use crate::react::parser::{parse, ActionCall, ConversationStep, FormatError};
use crate::react::prompt::PromptTemplate;
use crate::react::transcript::Transcript;
use crate::react::ReactEvent;
use crate::tools::{ToolExecutor, ToolOutcome};

/// 默认迭代上限（每次调用补全服务计一轮）
pub const DEFAULT_MAX_ITERATIONS: usize = 30;
/// 连续格式错误达到此值即终止
pub const MAX_CONSECUTIVE_FORMAT_ERRORS: usize = 2;

/// 循环状态
enum LoopState {
    AwaitingModel,
    AwaitingParse(String),
    Dispatching { thought: String, call: ActionCall },
    Terminated(TerminationResult),
}

/// 格式错误时写回 transcript 的纠正提示
pub fn corrective_observation(err: &FormatError) -> String {
    format!(
        "Invalid format: {err}. Reply with either 'Thought:' + 'Action:' + 'Action Input:' \
         or 'Thought:' + 'Final Answer:', never both in the same response."
    )
}

/// 推理循环会话：补全服务与执行器必需，其余可选
pub struct ReasoningLoop<'a> {
    completion: &'a dyn CompletionService,
    executor: &'a ToolExecutor,
    prompt: &'a PromptTemplate,
    max_iterations: usize,
    cancel_token: CancellationToken,
    deadline: Option<Instant>,
    history: &'a [Message],
    event_tx: Option<&'a UnboundedSender<ReactEvent>>,
}

impl<'a> ReasoningLoop<'a> {
    pub fn new(
        completion: &'a dyn CompletionService,
        executor: &'a ToolExecutor,
        prompt: &'a PromptTemplate,
    ) -> Self {
        Self {
            completion,
            executor,
            prompt,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            cancel_token: CancellationToken::new(),
            deadline: None,
            history: &[],
            event_tx: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_history(mut self, history: &'a [Message]) -> Self {
        self.history = history;
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, ev: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn check_boundary(&self) -> Result<(), AgentError> {
        if self.cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(AgentError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    pub async fn run(&self, user_input: &str) -> Result<TerminationResult, AgentError> {
        self.run_with_transcript(user_input)
            .await
            .map(|(result, _)| result)
    }

    /// 执行循环并同时返回本次 run 的 transcript
    pub async fn run_with_transcript(
        &self,
        user_input: &str,
    ) -> Result<(TerminationResult, Transcript), AgentError> {
        let mut transcript = Transcript::new();
        let mut cycles = 0usize;
        let mut consecutive_format_errors = 0usize;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if cycles >= self.max_iterations {
                        LoopState::Terminated(TerminationResult::iteration_limit(
                            transcript.last_context(),
                            cycles,
                        ))
                    } else {
                        self.check_boundary()?;
                        cycles += 1;
                        self.send_event(ReactEvent::CycleStarted {
                            cycle: cycles,
                            max_cycles: self.max_iterations,
                        });
                        tracing::debug!(cycle = cycles, "reasoning cycle");

                        let context = self.prompt.render(
                            self.executor.registry(),
                            self.history,
                            user_input,
                            &transcript,
                        );
                        match self.completion.complete(&context).await {
                            Ok(output) => LoopState::AwaitingParse(output),
                            Err(e) => {
                                tracing::error!(error = %e, cycle = cycles, "completion failed");
                                self.send_event(ReactEvent::Error {
                                    text: e.to_string(),
                                });
                                return Err(AgentError::Completion(e));
                            }
                        }
                    }
                }
                LoopState::AwaitingParse(output) => match parse(&output) {
                    Err(err) => {
                        consecutive_format_errors += 1;
                        tracing::warn!(
                            reason = %err,
                            consecutive = consecutive_format_errors,
                            "model output format violation"
                        );
                        self.send_event(ReactEvent::FormatViolation {
                            reason: err.to_string(),
                            consecutive: consecutive_format_errors,
                        });
                        let excerpt = err.excerpt.clone();
                        let observation = corrective_observation(&err);
                        transcript.push_violation(err, observation);
                        if consecutive_format_errors >= MAX_CONSECUTIVE_FORMAT_ERRORS {
                            LoopState::Terminated(TerminationResult::unrecoverable_parse(
                                excerpt, cycles,
                            ))
                        } else {
                            LoopState::AwaitingModel
                        }
                    }
                    Ok(step) => {
                        consecutive_format_errors = 0;
                        if !step.thought().is_empty() {
                            self.send_event(ReactEvent::Thought {
                                text: step.thought().to_string(),
                            });
                        }
                        match step {
                            ConversationStep::FinalAnswer { answer, .. } => {
                                LoopState::Terminated(TerminationResult::final_answer(answer, cycles))
                            }
                            ConversationStep::Action { thought, call } => {
                                LoopState::Dispatching { thought, call }
                            }
                        }
                    }
                },
                LoopState::Dispatching { thought, call } => {
                    self.send_event(ReactEvent::ToolCall {
                        tool: call.tool_name.clone(),
                        input: call.input.clone(),
                    });
                    let outcome = self.executor.invoke(&call.tool_name, &call.input).await;
                    if let ToolOutcome::UnknownTool(name) = &outcome {
                        tracing::warn!(tool = %name, "model requested unknown tool");
                    }
                    let observation = outcome.into_observation();
                    self.send_event(ReactEvent::Observation {
                        tool: call.tool_name.clone(),
                        text: observation.clone(),
                    });
                    transcript.push_action(thought, call, observation);
                    LoopState::AwaitingModel
                }
                LoopState::Terminated(result) => {
                    tracing::info!(kind = ?result.kind, cycles = result.cycles, "reasoning loop terminated");
                    self.send_event(ReactEvent::Terminated {
                        kind: result.kind,
                        cycles: result.cycles,
                    });
                    return Ok((result, transcript));
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::TerminationKind;
    use crate::llm::{LlmError, ScriptedCompletion};
    use crate::react::transcript::TurnKind;
    use crate::tools::{EchoTool, ToolRegistry, TOOL_NOT_FOUND};

    fn echo_executor() -> ToolExecutor {
        let registry = ToolRegistry::builder().register(EchoTool).build().unwrap();
        ToolExecutor::new(Arc::new(registry), 5)
    }

    #[tokio::test]
    async fn test_final_answer_terminates_immediately() {
        let llm = ScriptedCompletion::new(["Thought: easy\nFinal Answer: 42"]);
        let exec = echo_executor();
        let prompt = PromptTemplate::default();
        let result = ReasoningLoop::new(&llm, &exec, &prompt).run("q").await.unwrap();
        assert_eq!(result, TerminationResult::final_answer("42", 1));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_action_then_answer() {
        let llm = ScriptedCompletion::new([
            "Thought: echo it\nAction: EchoTool\nAction Input: hello",
            "Thought: done\nFinal Answer: hello",
        ]);
        let exec = echo_executor();
        let prompt = PromptTemplate::default();
        let (result, transcript) = ReasoningLoop::new(&llm, &exec, &prompt)
            .run_with_transcript("q")
            .await
            .unwrap();
        assert!(result.is_final_answer());
        assert_eq!(result.cycles, 2);
        assert_eq!(transcript.turns()[0].observation, "hello");
        assert!(llm.contexts()[1].contains("Observation: hello"));
    }

    #[tokio::test]
    async fn test_echo_forever_hits_iteration_cap() {
        let llm = ScriptedCompletion::repeat("Action: EchoTool\nAction Input: \"x\"");
        let exec = echo_executor();
        let prompt = PromptTemplate::default();
        let result = ReasoningLoop::new(&llm, &exec, &prompt)
            .with_max_iterations(3)
            .run("loop")
            .await
            .unwrap();
        assert_eq!(result.kind, TerminationKind::IterationLimitExceeded);
        assert_eq!(result.cycles, 3);
        assert_eq!(llm.calls(), 3);
        assert_eq!(result.text, "Observation: x");
    }

    #[tokio::test]
    async fn test_two_consecutive_format_errors_are_fatal() {
        let llm = ScriptedCompletion::repeat("just chatting");
        let exec = echo_executor();
        let prompt = PromptTemplate::default();
        let result = ReasoningLoop::new(&llm, &exec, &prompt)
            .with_max_iterations(100)
            .run("q")
            .await
            .unwrap();
        assert_eq!(result.kind, TerminationKind::UnrecoverableParseError);
        assert_eq!(llm.calls(), 2);
        assert_eq!(result.text, "just chatting");
    }

    #[tokio::test]
    async fn test_format_error_counter_resets_after_valid_step() {
        let llm = ScriptedCompletion::new([
            "garbage",
            "Action: EchoTool\nAction Input: a",
            "garbage again",
            "Final Answer: ok",
        ]);
        let exec = echo_executor();
        let prompt = PromptTemplate::default();
        let (result, transcript) = ReasoningLoop::new(&llm, &exec, &prompt)
            .run_with_transcript("q")
            .await
            .unwrap();
        assert_eq!(result, TerminationResult::final_answer("ok", 4));
        assert!(matches!(
            transcript.turns()[0].kind,
            TurnKind::FormatViolation { .. }
        ));
        assert!(transcript.turns()[0].observation.starts_with("Invalid format"));
    }

    #[tokio::test]
    async fn test_answer_and_action_never_dispatches() {
        let llm = ScriptedCompletion::repeat(
            "Final Answer: done\nAction: EchoTool\nAction Input: should not run",
        );
        let exec = echo_executor();
        let prompt = PromptTemplate::default();
        let (result, transcript) = ReasoningLoop::new(&llm, &exec, &prompt)
            .run_with_transcript("q")
            .await
            .unwrap();
        assert_eq!(result.kind, TerminationKind::UnrecoverableParseError);
        assert_eq!(transcript.len(), 2);
        assert!(transcript
            .turns()
            .iter()
            .all(|t| matches!(t.kind, TurnKind::FormatViolation { .. })));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_observation_not_termination() {
        let llm = ScriptedCompletion::new([
            "Action: Teleporter\nAction Input: x",
            "Final Answer: recovered",
        ]);
        let exec = echo_executor();
        let prompt = PromptTemplate::default();
        let (result, transcript) = ReasoningLoop::new(&llm, &exec, &prompt)
            .run_with_transcript("q")
            .await
            .unwrap();
        assert_eq!(result.text, "recovered");
        assert_eq!(transcript.turns()[0].observation, TOOL_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_completion_failure_is_terminal_error() {
        let llm = ScriptedCompletion::new(["Action: EchoTool\nAction Input: x"])
            .then_fail(LlmError::Request("503".to_string()));
        let exec = echo_executor();
        let prompt = PromptTemplate::default();
        let err = ReasoningLoop::new(&llm, &exec, &prompt)
            .run("q")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Completion(LlmError::Request(_))));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_cycle() {
        let llm = ScriptedCompletion::repeat("Final Answer: x");
        let exec = echo_executor();
        let prompt = PromptTemplate::default();
        let token = CancellationToken::new();
        token.cancel();
        let err = ReasoningLoop::new(&llm, &exec, &prompt)
            .with_cancel_token(token)
            .run("q")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_deadline_aborts_at_boundary() {
        let llm = ScriptedCompletion::repeat("Final Answer: x");
        let exec = echo_executor();
        let prompt = PromptTemplate::default();
        let err = ReasoningLoop::new(&llm, &exec, &prompt)
            .with_deadline(Instant::now())
            .run("q")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let llm = ScriptedCompletion::new([
            "Thought: t\nAction: EchoTool\nAction Input: a",
            "Final Answer: b",
        ]);
        let exec = echo_executor();
        let prompt = PromptTemplate::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        ReasoningLoop::new(&llm, &exec, &prompt)
            .with_event_tx(&tx)
            .run("q")
            .await
            .unwrap();
        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert!(events.contains(&ReactEvent::ToolCall {
            tool: "EchoTool".to_string(),
            input: "a".to_string()
        }));
        assert_eq!(
            events.last(),
            Some(&ReactEvent::Terminated {
                kind: TerminationKind::FinalAnswer,
                cycles: 2
            })
        );
    }
}
