//! 固定流水线：有序阶段 + 共享状态

pub mod executor;
pub mod stages;
pub mod state;

pub use executor::{PipelineExecutor, PipelineOutcome, PipelineRun, Stage, StageError};
pub use stages::{
    canonical_stages, CheckInventory, ComposeMessage, FormatSupplierInfo, LogAction, SearchSuppliers,
    SendMessage, LOW_STOCK_SQL, NO_ITEMS_TO_REPORT, NO_LOW_STOCK_ITEMS,
};
pub use state::PipelineState;
