//! 流水线共享状态：按写入顺序保存的具名字段
//!
//! 字段在产生它的阶段运行前均为缺省；缺省是下游可读的「无事可做」信号而非错误。

use serde::Serialize;

/// 原始低库存查询结果（`|` 表格文本）
pub const LOW_STOCK_ITEMS: &str = "low_stock_items";
/// 供应商搜索结果，格式化阶段会原地覆盖为 HTML
pub const SUPPLIER_INFO: &str = "supplier_info";
/// 通知正文
pub const MESSAGE_BODY: &str = "message_body";
/// 终态说明：发送结果，或失败/取消时的阶段信息
pub const STATUS: &str = "status";
/// 审计日志写入结果
pub const AUDIT_ENTRY: &str = "audit_entry";
/// 调用方给出的原始输入（可选）
pub const INPUT: &str = "input";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineState {
    fields: Vec<(String, String)>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式写入，便于构造初始状态
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// 已存在的字段原地覆盖（保持原位置），否则追加到末尾
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
