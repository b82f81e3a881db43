//! Log Tracker 工具：把动作写入 SQLite 审计表
//!
//! 输入 `action | details`（details 可省略），每次调用追加一行 action_log，时间戳为 RFC 3339。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::tools::Tool;

pub const LOG_TRACKER: &str = "Log Tracker";

/// 一条审计记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLogEntry {
    pub action: String,
    pub details: String,
    pub logged_at: String,
}

pub struct LogTrackerTool {
    conn: Arc<Mutex<Connection>>,
}

impl LogTrackerTool {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn from_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS action_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT NOT NULL,
                details TEXT NOT NULL,
                logged_at TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 最近的记录，最新在前
    pub fn recent(&self, limit: usize) -> Result<Vec<ActionLogEntry>, String> {
        let conn = self.conn.lock().map_err(|_| "connection poisoned".to_string())?;
        let mut stmt = conn
            .prepare("SELECT action, details, logged_at FROM action_log ORDER BY id DESC LIMIT ?1")
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(ActionLogEntry {
                    action: row.get(0)?,
                    details: row.get(1)?,
                    logged_at: row.get(2)?,
                })
            })
            .map_err(|e| e.to_string())?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| e.to_string())
    }
}

/// 拆分 `action | details`
fn split_action(input: &str) -> (String, String) {
    match input.split_once(" | ") {
        Some((action, details)) => (action.trim().to_string(), details.trim().to_string()),
        None => (input.trim().to_string(), String::new()),
    }
}

#[async_trait]
impl Tool for LogTrackerTool {
    fn name(&self) -> &str {
        LOG_TRACKER
    }

    fn description(&self) -> &str {
        "Record actions/results for auditing & debugging. Input: action | details"
    }

    async fn execute(&self, input: &str) -> Result<String, String> {
        let (action, details) = split_action(input);
        if action.is_empty() {
            return Err("Failed to log: empty action".to_string());
        }
        let conn = Arc::clone(&self.conn);
        let logged_at = chrono::Utc::now().to_rfc3339();
        let stored = action.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| "connection poisoned".to_string())?;
            conn.execute(
                "INSERT INTO action_log (action, details, logged_at) VALUES (?1, ?2, ?3)",
                params![stored, details, logged_at],
            )
            .map(|_| ())
            .map_err(|e| format!("Failed to log: {e}"))
        })
        .await
        .map_err(|e| format!("Failed to log: {e}"))??;
        Ok(format!("Logged action: {action}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_action() {
        assert_eq!(
            split_action("Task Completed | emailed boss"),
            ("Task Completed".to_string(), "emailed boss".to_string())
        );
        assert_eq!(split_action("Ping"), ("Ping".to_string(), String::new()));
    }

    #[tokio::test]
    async fn test_log_persists_row() {
        let tool = LogTrackerTool::from_connection(Connection::open_in_memory().unwrap()).unwrap();
        let out = tool.execute("Inventory Run | Email sent successfully.").await.unwrap();
        assert_eq!(out, "Logged action: Inventory Run");

        let rows = tool.recent(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].details, "Email sent successfully.");
        assert!(!rows[0].logged_at.is_empty());
    }

    #[tokio::test]
    async fn test_empty_action_is_error() {
        let tool = LogTrackerTool::from_connection(Connection::open_in_memory().unwrap()).unwrap();
        assert!(tool.execute("   ").await.is_err());
    }
}
