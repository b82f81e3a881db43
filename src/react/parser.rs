//! ReAct 文本解析：把一轮模型输出分类为 Action 步骤或 Final Answer 步骤
//!
//! 识别四种标记：`Final Answer:`、`Action:` / `Action Input:`、`Thought:`，另把模型自行编造的
//! `Observation:` 视为段落边界。标记只在行首生效，正文中出现的同名词语不算标记。
//! 只有紧跟 `Action Input:` 的 `Action:` 才构成工具调用；同一段文本同时出现 Final Answer 与
//! 工具调用时一律视为格式违规，绝不替调用方挑选其一；只采纳第一个工具调用，其后的内容本轮忽略。

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// FormatError 中保留的原始输出前缀长度（字符）
const EXCERPT_CHARS: usize = 200;

static MARKER_RE: OnceLock<Regex> = OnceLock::new();

fn marker_re() -> &'static Regex {
    MARKER_RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(Final[ \t]+Answer|Action[ \t]+Input|Action|Thought|Observation)[ \t]*:")
            .unwrap()
    })
}

/// 工具调用：工具名 + 文本输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCall {
    pub tool_name: String,
    pub input: String,
}

/// 一轮合法输出：要么调用工具，要么给出最终回复，二者互斥
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationStep {
    Action { thought: String, call: ActionCall },
    FinalAnswer { thought: String, answer: String },
}

impl ConversationStep {
    pub fn thought(&self) -> &str {
        match self {
            ConversationStep::Action { thought, .. } => thought,
            ConversationStep::FinalAnswer { thought, .. } => thought,
        }
    }
}

/// 格式违规的具体原因
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatViolation {
    #[error("output contains both 'Final Answer:' and 'Action:'")]
    AnswerAndAction,
    #[error("output contains neither 'Action:' nor 'Final Answer:'")]
    NoMarker,
    #[error("'Action:' is not followed by 'Action Input:'")]
    MissingActionInput,
    #[error("'Action:' names no tool")]
    EmptyToolName,
    #[error("'Final Answer:' is empty")]
    EmptyFinalAnswer,
}

/// 无法分类的模型输出；excerpt 用于构造纠正性 Observation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{violation}")]
pub struct FormatError {
    pub violation: FormatViolation,
    pub excerpt: String,
}

impl FormatError {
    fn new(violation: FormatViolation, raw: &str) -> Self {
        Self {
            violation,
            excerpt: excerpt(raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    FinalAnswer,
    ActionInput,
    Action,
    Thought,
    Observation,
}

#[derive(Debug, Clone, Copy)]
struct Found {
    marker: Marker,
    start: usize,
    end: usize,
}

fn scan(raw: &str) -> Vec<Found> {
    marker_re()
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let text = caps.get(1)?.as_str();
            let marker = if text.starts_with("Final") {
                Marker::FinalAnswer
            } else if text.starts_with("Thought") {
                Marker::Thought
            } else if text.starts_with("Observation") {
                Marker::Observation
            } else if text.contains("Input") {
                Marker::ActionInput
            } else {
                Marker::Action
            };
            Some(Found {
                marker,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// 解析一轮模型输出
pub fn parse(raw: &str) -> Result<ConversationStep, FormatError> {
    let markers = scan(raw);
    let final_idx = markers.iter().position(|f| f.marker == Marker::FinalAnswer);
    // 工具调用：Action 紧跟 Action Input
    let call_idx = markers.windows(2).position(|pair| {
        pair[0].marker == Marker::Action && pair[1].marker == Marker::ActionInput
    });

    match (final_idx, call_idx) {
        (Some(_), Some(_)) => Err(FormatError::new(FormatViolation::AnswerAndAction, raw)),
        (Some(i), None) => {
            let thought = thought_before(raw, &markers, i);
            let answer = answer_segment(raw, &markers, i).trim().to_string();
            if answer.is_empty() {
                return Err(FormatError::new(FormatViolation::EmptyFinalAnswer, raw));
            }
            Ok(ConversationStep::FinalAnswer { thought, answer })
        }
        (None, Some(i)) => {
            let thought = thought_before(raw, &markers, i);
            let tool_name = clean_tool_name(segment(raw, &markers, i));
            if tool_name.is_empty() {
                return Err(FormatError::new(FormatViolation::EmptyToolName, raw));
            }
            let input = clean_action_input(segment(raw, &markers, i + 1));
            Ok(ConversationStep::Action {
                thought,
                call: ActionCall { tool_name, input },
            })
        }
        (None, None) => match markers.iter().position(|f| f.marker == Marker::Action) {
            Some(i) if clean_tool_name(segment(raw, &markers, i)).is_empty() => {
                Err(FormatError::new(FormatViolation::EmptyToolName, raw))
            }
            Some(_) => Err(FormatError::new(FormatViolation::MissingActionInput, raw)),
            None => Err(FormatError::new(FormatViolation::NoMarker, raw)),
        },
    }
}

/// 第 idx 个标记之后、下一个标记之前的文本
fn segment<'a>(raw: &'a str, markers: &[Found], idx: usize) -> &'a str {
    let start = markers[idx].end;
    let end = markers.get(idx + 1).map(|f| f.start).unwrap_or(raw.len());
    &raw[start..end]
}

/// Final Answer 正文：延续到下一个 `Thought:` / `Observation:` 行为止，中间不成对的 Action 行属于正文
fn answer_segment<'a>(raw: &'a str, markers: &[Found], idx: usize) -> &'a str {
    let start = markers[idx].end;
    let end = markers[idx + 1..]
        .iter()
        .find(|f| matches!(f.marker, Marker::Thought | Marker::Observation))
        .map(|f| f.start)
        .unwrap_or(raw.len());
    &raw[start..end]
}

/// 第 idx 个标记之前的思考：若前面有 `Thought:` 取其后文本，否则取整段前缀
fn thought_before(raw: &str, markers: &[Found], idx: usize) -> String {
    let prefix_end = markers[idx].start;
    let thought_start = markers[..idx]
        .iter()
        .rev()
        .find(|f| f.marker == Marker::Thought)
        .map(|f| f.end)
        .unwrap_or(0);
    raw[thought_start..prefix_end].trim().to_string()
}

fn clean_tool_name(segment: &str) -> String {
    let line = segment.trim().lines().next().unwrap_or("");
    line.trim()
        .trim_matches(|c| matches!(c, '`' | '"' | '\'' | '[' | ']' | '*'))
        .trim()
        .to_string()
}

/// 去掉空白、Markdown 代码围栏与成对引号；多行内容保持原样
fn clean_action_input(segment: &str) -> String {
    let mut text = strip_fences(segment.trim());
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = &text[1..text.len() - 1];
    }
    text.to_string()
}

fn strip_fences(text: &str) -> &str {
    if let Some(rest) = text.strip_prefix("```") {
        let body = match rest.find('\n') {
            Some(nl) if is_fence_tag(&rest[..nl]) => &rest[nl + 1..],
            _ => rest,
        };
        return body.trim_end().strip_suffix("```").unwrap_or(body).trim();
    }
    if text.len() >= 2 && text.starts_with('`') && text.ends_with('`') {
        return text[1..text.len() - 1].trim();
    }
    text
}

fn is_fence_tag(line: &str) -> bool {
    let tag = line.trim();
    tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn excerpt(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() > EXCERPT_CHARS {
        format!("{}...", trimmed.chars().take(EXCERPT_CHARS).collect::<String>())
    } else {
        trimmed.to_string()
    }
}
