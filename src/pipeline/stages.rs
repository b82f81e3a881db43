//! 库存补货的六个固定阶段
//!
//! CheckInventory -> SearchSuppliers -> FormatSupplierInfo -> ComposeMessage -> SendMessage -> LogAction
//!
//! 所有外部操作都经 ToolExecutor 调用已注册工具，与推理循环共享同一套工具与审计日志。
//! 没有低库存条目时每个阶段仍照常运行并写出明确的空结果文本；单个条目搜索失败、邮件发送失败、
//! 日志写入失败降级为字段文本；库存查询失败或结果表格无法解析是致命的。

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::CompletionService;
use crate::pipeline::executor::{Stage, StageError};
use crate::pipeline::state::{
    PipelineState, AUDIT_ENTRY, LOW_STOCK_ITEMS, MESSAGE_BODY, STATUS, SUPPLIER_INFO,
};
use crate::tools::{
    parse_table, LowStockItem, ToolExecutor, DATABASE_READER, EMAIL_SENDER, LOG_TRACKER,
    SUPPLIER_FINDER,
};

/// 汇总每个商品的库存并筛出低于阈值者
pub const LOW_STOCK_SQL: &str = "SELECT p.name, p.barcode, COALESCE(SUM(i.quantity),0) AS total_quantity, p.threshold \
FROM products p \
LEFT JOIN inventory i ON i.barcode = p.barcode \
GROUP BY p.name, p.barcode, p.threshold \
HAVING COALESCE(SUM(i.quantity),0) < p.threshold \
ORDER BY p.name;";

pub const NO_LOW_STOCK_ITEMS: &str = "No low-stock items found.";
pub const NO_ITEMS_TO_REPORT: &str =
    "No items to report: all products are at or above their threshold.";
pub const ALERT_SUBJECT: &str = "Inventory Alert: Low Stock Summary";
pub const AUDIT_ACTION: &str = "Inventory Run";

/// 读取 low_stock_items；字段缺省或为空视为没有条目
fn read_items(state: &PipelineState) -> Result<Vec<LowStockItem>, StageError> {
    match state.get(LOW_STOCK_ITEMS) {
        Some(text) if !text.trim().is_empty() => {
            let table = parse_table(text)?;
            Ok(LowStockItem::from_table(&table)?)
        }
        _ => Ok(Vec::new()),
    }
}

pub struct CheckInventory {
    executor: ToolExecutor,
    sql: String,
}

impl CheckInventory {
    pub fn new(executor: ToolExecutor) -> Self {
        Self {
            executor,
            sql: LOW_STOCK_SQL.to_string(),
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = sql.into();
        self
    }
}

#[async_trait]
impl Stage for CheckInventory {
    fn name(&self) -> &str {
        "CheckInventory"
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState, StageError> {
        let table = self
            .executor
            .invoke(DATABASE_READER, &self.sql)
            .await
            .into_result()
            .map_err(|reason| StageError::Tool {
                tool: DATABASE_READER.to_string(),
                reason,
            })?;
        let next = state.clone().with(LOW_STOCK_ITEMS, table);
        let count = read_items(&next)?.len();
        tracing::info!(count, "low-stock items found");
        Ok(next)
    }
}

pub struct SearchSuppliers {
    executor: ToolExecutor,
}

impl SearchSuppliers {
    pub fn new(executor: ToolExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Stage for SearchSuppliers {
    fn name(&self) -> &str {
        "SearchSuppliers"
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState, StageError> {
        let items = read_items(state)?;
        if items.is_empty() {
            return Ok(state.clone().with(SUPPLIER_INFO, NO_LOW_STOCK_ITEMS));
        }

        let mut sections = Vec::with_capacity(items.len());
        for item in &items {
            let query = format!("{} supplier", item.name);
            match self.executor.invoke(SUPPLIER_FINDER, &query).await.into_result() {
                Ok(found) => sections.push(found),
                Err(reason) => {
                    tracing::warn!(item = %item.name, reason = %reason, "supplier search failed");
                    sections.push(format!("Search failed for '{}': {}", item.name, reason));
                }
            }
        }
        Ok(state.clone().with(SUPPLIER_INFO, sections.join("\n\n")))
    }
}

/// 把搜索结果整理为 HTML：有补全服务时交给模型，否则或失败时使用确定性渲染
pub struct FormatSupplierInfo {
    formatter: Option<Arc<dyn CompletionService>>,
}

impl FormatSupplierInfo {
    pub fn new(formatter: Option<Arc<dyn CompletionService>>) -> Self {
        Self { formatter }
    }

    async fn format_with_model(&self, raw: &str) -> Option<String> {
        let formatter = self.formatter.as_ref()?;
        let prompt = format!(
            "Format the following supplier search results into clean HTML. \
             Output only the HTML fragment.\n\n{raw}"
        );
        match formatter.complete(&prompt).await {
            Ok(html) => {
                let html = strip_html_fence(&html);
                (!html.is_empty()).then(|| html.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "supplier formatting fell back to plain rendering");
                None
            }
        }
    }
}

#[async_trait]
impl Stage for FormatSupplierInfo {
    fn name(&self) -> &str {
        "FormatSupplierInfo"
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState, StageError> {
        if read_items(state)?.is_empty() {
            return Ok(state.clone().with(SUPPLIER_INFO, NO_LOW_STOCK_ITEMS));
        }
        let raw = state.get(SUPPLIER_INFO).unwrap_or_default();
        let html = match self.format_with_model(raw).await {
            Some(html) => html,
            None => render_supplier_html(raw),
        };
        Ok(state.clone().with(SUPPLIER_INFO, html))
    }
}

pub struct ComposeMessage;

#[async_trait]
impl Stage for ComposeMessage {
    fn name(&self) -> &str {
        "ComposeMessage"
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState, StageError> {
        let items = read_items(state)?;
        if items.is_empty() {
            return Ok(state.clone().with(MESSAGE_BODY, NO_ITEMS_TO_REPORT));
        }

        let mut body = String::from("<p><b>Low Stock Items:</b></p><ul>");
        for item in &items {
            body.push_str(&format!(
                "<li>{} ({}): {} units, threshold {}</li>",
                escape_html(&item.name),
                escape_html(&item.barcode),
                item.total_quantity,
                item.threshold
            ));
        }
        body.push_str("</ul><p><b>Supplier Links:</b></p>");
        body.push_str(state.get(SUPPLIER_INFO).unwrap_or(NO_LOW_STOCK_ITEMS));
        Ok(state.clone().with(MESSAGE_BODY, body))
    }
}

pub struct SendMessage {
    executor: ToolExecutor,
}

impl SendMessage {
    pub fn new(executor: ToolExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Stage for SendMessage {
    fn name(&self) -> &str {
        "SendMessage"
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState, StageError> {
        let body = state.get(MESSAGE_BODY).unwrap_or("No content.");
        let input = format!("{ALERT_SUBJECT} || {body}");
        let status = match self.executor.invoke(EMAIL_SENDER, &input).await.into_result() {
            Ok(sent) => sent,
            Err(reason) => {
                tracing::warn!(reason = %reason, "notification not sent");
                format!("Email not sent: {reason}")
            }
        };
        Ok(state.clone().with(STATUS, status))
    }
}

pub struct LogAction {
    executor: ToolExecutor,
}

impl LogAction {
    pub fn new(executor: ToolExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Stage for LogAction {
    fn name(&self) -> &str {
        "LogAction"
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState, StageError> {
        let summary = state.get(STATUS).unwrap_or("No status.");
        let input = format!("{AUDIT_ACTION} | {summary}");
        let entry = match self.executor.invoke(LOG_TRACKER, &input).await.into_result() {
            Ok(logged) => logged,
            Err(reason) => {
                tracing::warn!(reason = %reason, "audit log not written");
                format!("Audit log not written: {reason}")
            }
        };
        Ok(state.clone().with(AUDIT_ENTRY, entry))
    }
}

/// 按固定顺序构造六个阶段
pub fn canonical_stages(
    executor: &ToolExecutor,
    formatter: Option<Arc<dyn CompletionService>>,
) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(CheckInventory::new(executor.clone())),
        Box::new(SearchSuppliers::new(executor.clone())),
        Box::new(FormatSupplierInfo::new(formatter)),
        Box::new(ComposeMessage),
        Box::new(SendMessage::new(executor.clone())),
        Box::new(LogAction::new(executor.clone())),
    ]
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn strip_html_fence(text: &str) -> &str {
    let text = text.trim();
    match text.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("html").unwrap_or(rest);
            rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
        }
        None => text,
    }
}

/// `- \[title\](url)` 行渲染为链接，标题行加粗，其余行按段落输出
fn render_supplier_html(raw: &str) -> String {
    let mut html = String::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some((title, url)) = parse_link_line(line) {
            html.push_str(&format!(
                "<p><a href=\"{}\">{}</a></p>",
                escape_html(url),
                escape_html(title)
            ));
        } else if let Some(query) = line
            .strip_prefix("Search results for **")
            .and_then(|rest| rest.strip_suffix("**:"))
        {
            html.push_str(&format!("<h4>{}</h4>", escape_html(query)));
        } else {
            html.push_str(&format!("<p>{}</p>", escape_html(line)));
        }
    }
    html
}

fn parse_link_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("- \\[")?;
    let (title, rest) = rest.split_once("\\](")?;
    let url = rest.strip_suffix(')')?;
    Some((title, url))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::{LlmError, ScriptedCompletion};
    use crate::pipeline::PipelineExecutor;
    use crate::tools::{Tool, ToolRegistry};

    const HEADER: &str = "name|barcode|total_quantity|threshold";

    struct Canned {
        name: &'static str,
        reply: Result<String, String>,
        inputs: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for Canned {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "canned"
        }

        async fn execute(&self, input: &str) -> Result<String, String> {
            self.inputs.lock().unwrap().push(input.to_string());
            self.reply.clone()
        }
    }

    struct Rig {
        executor: ToolExecutor,
        searches: Arc<Mutex<Vec<String>>>,
        emails: Arc<Mutex<Vec<String>>>,
        logs: Arc<Mutex<Vec<String>>>,
    }

    fn rig(table: Result<&str, &str>, search: Result<&str, &str>, email: Result<&str, &str>) -> Rig {
        let own = |r: Result<&str, &str>| r.map(str::to_string).map_err(str::to_string);
        let searches = Arc::new(Mutex::new(Vec::new()));
        let emails = Arc::new(Mutex::new(Vec::new()));
        let logs = Arc::new(Mutex::new(Vec::new()));
        let registry = ToolRegistry::builder()
            .register(Canned {
                name: DATABASE_READER,
                reply: own(table),
                inputs: Arc::default(),
            })
            .register(Canned {
                name: SUPPLIER_FINDER,
                reply: own(search),
                inputs: searches.clone(),
            })
            .register(Canned {
                name: EMAIL_SENDER,
                reply: own(email),
                inputs: emails.clone(),
            })
            .register(Canned {
                name: LOG_TRACKER,
                reply: Ok("Logged action: Inventory Run".to_string()),
                inputs: logs.clone(),
            })
            .build()
            .unwrap();
        Rig {
            executor: ToolExecutor::new(Arc::new(registry), 5),
            searches,
            emails,
            logs,
        }
    }

    fn pipeline(rig: &Rig, formatter: Option<Arc<dyn CompletionService>>) -> PipelineExecutor {
        PipelineExecutor::new().stages(canonical_stages(&rig.executor, formatter))
    }

    #[tokio::test]
    async fn test_low_stock_flow_sends_alert() {
        let rig = rig(
            Ok("name|barcode|total_quantity|threshold\nCable|99999|0|5\nWidget A|12345|4|10"),
            Ok("Search results for **Cable supplier**:\n- \\[Cable Co\\](https://cable.example)\n  Bulk"),
            Ok("Email sent successfully."),
        );
        let run = pipeline(&rig, None).execute(PipelineState::new()).await;

        assert!(run.is_completed());
        assert_eq!(run.status(), Some("Email sent successfully."));
        assert_eq!(
            *rig.searches.lock().unwrap(),
            vec!["Cable supplier", "Widget A supplier"]
        );
        let body = run.state.get(MESSAGE_BODY).unwrap();
        assert!(body.contains("<li>Cable (99999): 0 units, threshold 5</li>"));
        assert!(body.contains("<a href=\"https://cable.example\">Cable Co</a>"));
        assert!(rig.emails.lock().unwrap()[0].starts_with("Inventory Alert: Low Stock Summary || "));
        assert_eq!(
            rig.logs.lock().unwrap()[0],
            "Inventory Run | Email sent successfully."
        );
        assert_eq!(
            run.state.field_names(),
            vec![LOW_STOCK_ITEMS, SUPPLIER_INFO, MESSAGE_BODY, STATUS, AUDIT_ENTRY]
        );
    }

    #[tokio::test]
    async fn test_header_only_still_runs_every_stage() {
        let rig = rig(Ok(HEADER), Ok("unused"), Ok("Email sent successfully."));
        let run = pipeline(&rig, None).execute(PipelineState::new()).await;

        assert!(run.is_completed());
        assert!(rig.searches.lock().unwrap().is_empty());
        assert_eq!(run.state.get(SUPPLIER_INFO), Some(NO_LOW_STOCK_ITEMS));
        assert!(run.state.get(MESSAGE_BODY).unwrap().contains("No items to report"));
        assert_eq!(rig.emails.lock().unwrap().len(), 1);
        assert_eq!(rig.logs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_format_stage_reports_no_items_for_header_only_table() {
        let state = PipelineState::new()
            .with(LOW_STOCK_ITEMS, HEADER)
            .with(SUPPLIER_INFO, "");
        let next = FormatSupplierInfo::new(None).run(&state).await.unwrap();
        assert_eq!(next.get(SUPPLIER_INFO), Some(NO_LOW_STOCK_ITEMS));
    }

    #[tokio::test]
    async fn test_inventory_failure_is_fatal() {
        let rig = rig(Err("no such table: products"), Ok(""), Ok(""));
        let run = pipeline(&rig, None).execute(PipelineState::new()).await;

        assert!(!run.is_completed());
        let status = run.status().unwrap();
        assert!(status.starts_with("Pipeline failed at stage 'CheckInventory'"));
        assert!(status.contains("no such table"));
        assert!(rig.emails.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_table_is_fatal() {
        let rig = rig(Ok("name|barcode|total_quantity|threshold\nCable|99999|lots|5"), Ok(""), Ok(""));
        let run = pipeline(&rig, None).execute(PipelineState::new()).await;
        assert!(run.status().unwrap().contains("is not a number"));
    }

    #[tokio::test]
    async fn test_search_and_email_failures_degrade() {
        let rig = rig(
            Ok("name|barcode|total_quantity|threshold\nCable|99999|0|5"),
            Err("Error during search: HTTP 401"),
            Err("Failed to send email: outbox unavailable"),
        );
        let run = pipeline(&rig, None).execute(PipelineState::new()).await;

        assert!(run.is_completed());
        assert!(run
            .state
            .get(SUPPLIER_INFO)
            .unwrap()
            .contains("Search failed for 'Cable'"));
        assert!(run.status().unwrap().starts_with("Email not sent:"));
        assert!(rig.logs.lock().unwrap()[0].contains("Email not sent:"));
    }

    #[tokio::test]
    async fn test_model_formatting_used_when_available() {
        let rig = rig(
            Ok("name|barcode|total_quantity|threshold\nCable|99999|0|5"),
            Ok("Search results for **Cable supplier**:"),
            Ok("Email sent successfully."),
        );
        let llm: Arc<dyn CompletionService> =
            Arc::new(ScriptedCompletion::new(["```html\n<ul><li>Cable Co</li></ul>\n```"]));
        let run = pipeline(&rig, Some(llm)).execute(PipelineState::new()).await;
        assert_eq!(run.state.get(SUPPLIER_INFO), Some("<ul><li>Cable Co</li></ul>"));
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_plain_html() {
        let llm: Arc<dyn CompletionService> = Arc::new(
            ScriptedCompletion::default().then_fail(LlmError::Timeout(std::time::Duration::from_secs(1))),
        );
        let state = PipelineState::new()
            .with(LOW_STOCK_ITEMS, "name|barcode|total_quantity|threshold\nCable|99999|0|5")
            .with(SUPPLIER_INFO, "Search results for **Cable supplier**:\n- \\[A & B\\](https://ab.example)");
        let next = FormatSupplierInfo::new(Some(llm)).run(&state).await.unwrap();
        assert_eq!(
            next.get(SUPPLIER_INFO),
            Some("<h4>Cable supplier</h4><p><a href=\"https://ab.example\">A &amp; B</a></p>")
        );
    }
}
