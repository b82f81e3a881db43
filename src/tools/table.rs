//! `|` 分隔表格文本约定
//!
//! 数据库工具输出：首行为列名，其后每行一条记录，字段以 `|` 连接，NULL 渲染为空串；
//! 无匹配记录时只有表头。流水线按同一约定解析低库存条目。

use thiserror::Error;

/// 语句没有结果列（如 UPDATE）时的输出
pub const NO_RESULT_COLUMNS: &str = "No result columns.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("table text is empty")]
    Empty,
    #[error("row {row} has {got} fields, expected at least {expected}")]
    ShortRow {
        row: usize,
        got: usize,
        expected: usize,
    },
    #[error("row {row}: field '{field}' is not a number: {value}")]
    NotANumber {
        row: usize,
        field: &'static str,
        value: String,
    },
}

/// 解析后的表格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 渲染表格：无列时返回 NO_RESULT_COLUMNS，无行时只返回表头
pub fn format_table(columns: &[String], rows: &[Vec<Option<String>>]) -> String {
    if columns.is_empty() {
        return NO_RESULT_COLUMNS.to_string();
    }
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(columns.join("|"));
    for row in rows {
        let line: Vec<&str> = row.iter().map(|v| v.as_deref().unwrap_or("")).collect();
        lines.push(line.join("|"));
    }
    lines.join("\n")
}

/// 解析表格文本；空行被忽略
pub fn parse_table(text: &str) -> Result<Table, TableError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let header = lines.next().ok_or(TableError::Empty)?;
    let split = |line: &str| line.split('|').map(|f| f.trim().to_string()).collect();
    Ok(Table {
        header: split(header),
        rows: lines.map(split).collect(),
    })
}

/// 低于阈值的库存条目（name|barcode|total_quantity|threshold）
#[derive(Debug, Clone, PartialEq)]
pub struct LowStockItem {
    pub name: String,
    pub barcode: String,
    pub total_quantity: f64,
    pub threshold: f64,
}

impl LowStockItem {
    pub fn from_row(index: usize, row: &[String]) -> Result<Self, TableError> {
        if row.len() < 4 {
            return Err(TableError::ShortRow {
                row: index,
                got: row.len(),
                expected: 4,
            });
        }
        let number = |field: &'static str, value: &str| {
            value.parse::<f64>().map_err(|_| TableError::NotANumber {
                row: index,
                field,
                value: value.to_string(),
            })
        };
        Ok(Self {
            name: row[0].clone(),
            barcode: row[1].clone(),
            total_quantity: number("total_quantity", &row[2])?,
            threshold: number("threshold", &row[3])?,
        })
    }

    /// 解析整张表；表头不参与
    pub fn from_table(table: &Table) -> Result<Vec<Self>, TableError> {
        table
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| Self::from_row(i + 1, row))
            .collect()
    }
}
