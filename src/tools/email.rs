//! Email Sender 工具：输入 `subject || body`，以 HTML 邮件发送给负责人
//!
//! 传输方式由 Mailer trait 决定；默认 OutboxMailer 把每封邮件写成一个 .eml 文件放入发件箱目录，
//! 由外部投递程序接手。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::tools::Tool;

pub const EMAIL_SENDER: &str = "Email Sender";

/// 出站消息分隔符
pub const SUBJECT_BODY_SEPARATOR: &str = "||";

pub const EMAIL_SENT: &str = "Email sent successfully.";

/// 一封待发送的邮件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// 邮件传输
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), String>;
}

/// 文件发件箱：每封邮件一个 `<uuid>.eml`
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn render(email: &OutgoingEmail) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/html; charset=utf-8\r\n\r\n{}\r\n",
            header_value(&email.from),
            header_value(&email.to),
            header_value(&email.subject),
            chrono::Utc::now().to_rfc2822(),
            email.html_body
        )
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| e.to_string())?;
        let path = self.dir.join(format!("{}.eml", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, Self::render(email))
            .await
            .map_err(|e| e.to_string())?;
        tracing::info!(path = %path.display(), to = %email.to, "email written to outbox");
        Ok(())
    }
}

/// 头部字段值：CR / LF 折叠为单个空格，防止注入额外头部
fn header_value(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 拆分 `subject || body`（只在第一个 `||` 处拆分，两侧去空白）
pub fn split_subject_body(input: &str) -> Option<(String, String)> {
    let (subject, body) = input.split_once(SUBJECT_BODY_SEPARATOR)?;
    Some((subject.trim().to_string(), body.trim().to_string()))
}

pub struct EmailSenderTool {
    mailer: Arc<dyn Mailer>,
    from: String,
    to: String,
}

impl EmailSenderTool {
    pub fn new(mailer: Arc<dyn Mailer>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            mailer,
            from: from.into(),
            to: to.into(),
        }
    }
}

#[async_trait]
impl Tool for EmailSenderTool {
    fn name(&self) -> &str {
        EMAIL_SENDER
    }

    fn description(&self) -> &str {
        "Send an email to the manager using: subject || body (body as HTML)."
    }

    async fn execute(&self, input: &str) -> Result<String, String> {
        let (subject, html_body) = split_subject_body(input)
            .ok_or_else(|| "Failed to send email: expected `subject || body`".to_string())?;
        if self.to.trim().is_empty() {
            return Err("Failed to send email: no recipient configured".to_string());
        }
        let email = OutgoingEmail {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: header_value(&subject),
            html_body,
        };
        self.mailer
            .send(&email)
            .await
            .map_err(|e| format!("Failed to send email: {e}"))?;
        Ok(EMAIL_SENT.to_string())
    }
}
