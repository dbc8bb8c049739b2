//! 日誌初始化
//!
//! 使用 `tracing-subscriber`，日誌級別由 `RUST_LOG` 設定（預設 `info`），
//! 例如 `RUST_LOG=wireplan_optimizer=debug` 可看到每個退火溫度階段。

use tracing_subscriber::{fmt, EnvFilter};

/// 初始化日誌；重複呼叫會 panic，應用程式啟動時呼叫一次
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();
}

/// 測試用：debug 級別，寫到測試輸出，可重複呼叫
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
