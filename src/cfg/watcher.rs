use std::path::{Path, PathBuf};

use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::config::Config;
use crate::db_error::Result;

/// 把新配置中可以热更新的字段合并到运行中的配置
///
/// 窗口高度不参与热更新，启动时的值（包括命令行覆盖）一直保留。
pub fn merge(live: &mut Config, new: &Config) {
    live.cursor_idle_ms = new.cursor_idle_ms;
    live.refresh_ms = new.refresh_ms;
    live.text_size_fallback = new.text_size_fallback;
}

/// 重新读取配置文件并更新全局配置
pub fn reload(path: &Path) -> Result<Config> {
    let new_config = Config::load_config(path)?;
    let mut config = super::CONFIG.lock()?;
    merge(&mut config, &new_config);
    Ok(config.clone())
}

/// 监听配置文件变化，更新全局的配置实例
///
/// 重新加载失败只记录日志，保留旧配置。收到 shutdown 信号后退出。
pub fn watch_config(path: impl Into<PathBuf>, mut shutdown: broadcast::Receiver<()>) -> Result<JoinHandle<()>> {
    let path = path.into();
    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "watching config file");

    Ok(tokio::spawn(async move {
        // watcher 随任务存活
        let _watcher = watcher;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("config watcher stopped");
                    break;
                }
                opt = rx.recv() => {
                    match opt {
                        Some(Ok(ev)) if ev.kind.is_modify() || ev.kind.is_create() => {
                            match reload(&path) {
                                Ok(config) => info!(?config, "config reloaded"),
                                Err(e) => error!("config reload failed: {e}"),
                            }
                        }
                        Some(Ok(ev)) => debug!("file event: {:?}", ev),
                        Some(Err(e)) => error!("config watch error: {:?}", e),
                        None => break,
                    }
                }
            }
        }
    }))
}
