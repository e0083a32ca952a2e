mod config;
mod watcher;

use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::db_error::Result;
pub use config::{Config, ConfigBuilder, ConfigWrapper};
pub use watcher::{reload, watch_config};

lazy_static! {
    /// 进程内的运行配置，由配置监听任务热更新
    pub static ref CONFIG: Mutex<Config> = Mutex::new(Config::default());
}

/// 当前配置的副本
pub fn current() -> Result<Config> {
    Ok(CONFIG.lock()?.clone())
}

/// 替换整个运行配置（启动时加载配置文件后调用）
pub fn install(config: Config) -> Result<()> {
    config.validate()?;
    *CONFIG.lock()? = config;
    Ok(())
}
