pub mod catalog;
pub mod cfg;
pub mod cursor;
pub mod db_error;
pub mod fk;
pub mod refresh;
pub mod relation;
pub mod ring;
pub mod session;
pub mod sql;
pub mod storage;
pub mod types;
pub mod utils;

use tracing_subscriber::EnvFilter;

/// 初始化日志，默认级别 info，可通过 `RUST_LOG` 覆盖；重复调用无副作用
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}
