//! 流水线集成测试：真实 SQLite + outbox 邮件 + 审计日志，供应商搜索用固定回复替身

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use restock::pipeline::state::{AUDIT_ENTRY, LOW_STOCK_ITEMS, MESSAGE_BODY, SUPPLIER_INFO};
use restock::pipeline::{canonical_stages, PipelineExecutor, PipelineOutcome, PipelineState, NO_LOW_STOCK_ITEMS};
use restock::tools::{
    DatabaseReaderTool, EmailSenderTool, LogTrackerTool, OutboxMailer, Tool, ToolExecutor,
    ToolRegistry, SUPPLIER_FINDER,
};
use rusqlite::Connection;
use tempfile::TempDir;

struct FixedSearch;

#[async_trait]
impl Tool for FixedSearch {
    fn name(&self) -> &str {
        SUPPLIER_FINDER
    }

    fn description(&self) -> &str {
        "fixed supplier results"
    }

    async fn execute(&self, input: &str) -> Result<String, String> {
        Ok(format!(
            "Search results for **{input}**:\n- \\[Acme Wholesale\\](https://acme.example)\n  Bulk orders"
        ))
    }
}

fn seed(path: &Path, products: &str, inventory: &str) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(&format!(
        "CREATE TABLE products (name TEXT, barcode TEXT, threshold INTEGER);
         CREATE TABLE inventory (barcode TEXT, quantity INTEGER);
         {products}
         {inventory}"
    ))
    .unwrap();
}

fn executor(dir: &TempDir) -> ToolExecutor {
    let db = dir.path().join("data.db");
    let registry = ToolRegistry::builder()
        .register(DatabaseReaderTool::open(&db).unwrap())
        .register(FixedSearch)
        .register(EmailSenderTool::new(
            Arc::new(OutboxMailer::new(dir.path().join("outbox"))),
            "restock@example.com",
            "boss@example.com",
        ))
        .register(LogTrackerTool::open(&db).unwrap())
        .build()
        .unwrap();
    ToolExecutor::new(Arc::new(registry), 10)
}

fn outbox(dir: &TempDir) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir.path().join("outbox")) else {
        return Vec::new();
    };
    entries
        .map(|e| std::fs::read_to_string(e.unwrap().path()).unwrap())
        .collect()
}

#[tokio::test]
async fn test_low_stock_run_emails_and_logs() {
    let dir = tempfile::tempdir().unwrap();
    seed(
        &dir.path().join("data.db"),
        "INSERT INTO products VALUES ('Widget A', '12345', 10), ('Cable', '99999', 5), ('Bolt', '55555', 2);",
        "INSERT INTO inventory VALUES ('12345', 3), ('12345', 1), ('55555', 8);",
    );
    let exec = executor(&dir);

    let run = PipelineExecutor::new()
        .stages(canonical_stages(&exec, None))
        .execute(PipelineState::new())
        .await;

    assert_eq!(run.outcome, PipelineOutcome::Completed);
    assert_eq!(run.status(), Some("Email sent successfully."));
    assert_eq!(
        run.state.get(LOW_STOCK_ITEMS),
        Some("name|barcode|total_quantity|threshold\nCable|99999|0|5\nWidget A|12345|4|10")
    );
    assert!(run
        .state
        .get(SUPPLIER_INFO)
        .unwrap()
        .contains("<a href=\"https://acme.example\">Acme Wholesale</a>"));
    assert_eq!(run.state.get(AUDIT_ENTRY), Some("Logged action: Inventory Run"));

    let mails = outbox(&dir);
    assert_eq!(mails.len(), 1);
    assert!(mails[0].contains("Subject: Inventory Alert: Low Stock Summary"));
    assert!(mails[0].contains("<li>Widget A (12345): 4 units, threshold 10</li>"));

    let log = LogTrackerTool::open(dir.path().join("data.db")).unwrap();
    let entries = log.recent(5).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "Inventory Run");
    assert_eq!(entries[0].details, "Email sent successfully.");
}

#[tokio::test]
async fn test_nothing_low_still_runs_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    seed(
        &dir.path().join("data.db"),
        "INSERT INTO products VALUES ('Bolt', '55555', 2);",
        "INSERT INTO inventory VALUES ('55555', 8);",
    );
    let exec = executor(&dir);

    let run = PipelineExecutor::new()
        .stages(canonical_stages(&exec, None))
        .execute(PipelineState::new())
        .await;

    assert!(run.is_completed());
    assert_eq!(
        run.state.get(LOW_STOCK_ITEMS),
        Some("name|barcode|total_quantity|threshold")
    );
    assert_eq!(run.state.get(SUPPLIER_INFO), Some(NO_LOW_STOCK_ITEMS));
    assert!(run
        .state
        .get(MESSAGE_BODY)
        .unwrap()
        .contains("No items to report"));
    assert_eq!(run.status(), Some("Email sent successfully."));
    assert_eq!(outbox(&dir).len(), 1);
}

#[tokio::test]
async fn test_missing_inventory_tables_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let exec = executor(&dir);

    let run = PipelineExecutor::new()
        .stages(canonical_stages(&exec, None))
        .execute(PipelineState::new())
        .await;

    match &run.outcome {
        PipelineOutcome::Failed { stage, .. } => assert_eq!(stage, "CheckInventory"),
        other => panic!("expected failure, got {other:?}"),
    }
    let status = run.status().unwrap();
    assert!(status.starts_with("Pipeline failed at stage 'CheckInventory'"));
    assert!(status.contains("no such table"));
    assert!(outbox(&dir).is_empty());
    assert!(!run.state.contains(MESSAGE_BODY));
}
