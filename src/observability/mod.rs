//! 可观测性：tracing 订阅器初始化
//!
//! 日志写 stderr，stdout 留给对话与流水线结果。过滤规则来自 RUST_LOG，缺省为 info。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局订阅器；重复调用（如多个测试）时静默忽略
pub fn init() {
    init_with_default("info");
}

pub fn init_with_default(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
