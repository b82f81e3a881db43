//! Database Reader 工具：执行 SQL 并返回 `|` 分隔表格
//!
//! rusqlite 连接是同步的，放在 Mutex 中并经 spawn_blocking 执行，不阻塞 tokio 工作线程。
//! 可选地把库表结构摘要附加到工具描述里，让模型无需先探查 schema。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::tools::table::format_table;
use crate::tools::Tool;

pub const DATABASE_READER: &str = "Database Reader";

const BASE_DESCRIPTION: &str =
    "Execute a SQL query and return raw tabular results. Use for inventory & thresholds.";

pub struct DatabaseReaderTool {
    conn: Arc<Mutex<Connection>>,
    description: String,
}

impl DatabaseReaderTool {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            description: BASE_DESCRIPTION.to_string(),
        }
    }

    /// 在描述后附加 schema 摘要；读取失败时保持原描述
    pub fn with_schema_in_description(mut self) -> Self {
        match self.schema_summary() {
            Ok(summary) if !summary.is_empty() => {
                self.description = format!("{BASE_DESCRIPTION} Schema:\n{summary}");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "schema summary unavailable"),
        }
        self
    }

    /// 每张表一行：`Table: products Columns: [name, barcode, threshold]`
    pub fn schema_summary(&self) -> Result<String, String> {
        let conn = self.conn.lock().map_err(|_| "connection poisoned".to_string())?;
        schema_summary(&conn).map_err(|e| e.to_string())
    }
}

fn schema_summary(conn: &Connection) -> rusqlite::Result<String> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut lines = Vec::with_capacity(tables.len());
    for table in tables {
        let mut info = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\"")))?;
        let columns = info
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        lines.push(format!("Table: {} Columns: [{}]", table, columns.join(", ")));
    }
    Ok(lines.join("\n"))
}

fn value_to_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(format!("<{} bytes>", b.len())),
    }
}

/// 执行单条语句并渲染为表格文本
pub fn run_query(conn: &Connection, sql: &str) -> rusqlite::Result<String> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    if columns.is_empty() {
        stmt.execute([])?;
        return Ok(format_table(&columns, &[]));
    }

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(value_to_string(row.get_ref(i)?));
        }
        out.push(values);
    }
    Ok(format_table(&columns, &out))
}

#[async_trait]
impl Tool for DatabaseReaderTool {
    fn name(&self) -> &str {
        DATABASE_READER
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, input: &str) -> Result<String, String> {
        let sql = input.trim().to_string();
        if sql.is_empty() {
            return Err("empty query".to_string());
        }
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| "database connection poisoned".to_string())?;
            run_query(&conn, &sql).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| format!("query task failed: {e}"))?
    }
}
