//! 工具箱：注册表、执行器与库存场景的四个协作工具（数据库 / 供应商搜索 / 邮件 / 审计日志）

pub mod database;
pub mod echo;
pub mod email;
pub mod executor;
pub mod log_tracker;
pub mod registry;
pub mod search;
pub mod table;

pub use database::{DatabaseReaderTool, DATABASE_READER};
pub use echo::EchoTool;
pub use email::{EmailSenderTool, Mailer, OutboxMailer, OutgoingEmail, EMAIL_SENDER};
pub use executor::{ToolExecutor, ToolOutcome, TOOL_ERROR_PREFIX, TOOL_NOT_FOUND};
pub use log_tracker::{LogTrackerTool, LOG_TRACKER};
pub use registry::{RegistryError, Tool, ToolRegistry, ToolRegistryBuilder};
pub use search::{SupplierSearchTool, SUPPLIER_FINDER};
pub use table::{format_table, parse_table, LowStockItem, Table, TableError};
