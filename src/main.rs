use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use gridview::cfg::{self, Config};
use gridview::db_error::Result;
use gridview::relation::Relation;
use gridview::ring::Jump;
use gridview::session::{Notice, RingUpdated, Session};
use gridview::storage::{Engine, SqliteEngine};
use gridview::types::Row;
use gridview::utils::render_row;
use gridview::{errinput, init_tracing};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info};

/// 以固定高度的窗口流式浏览一张表，并持续刷新、标记变化
#[derive(Parser, Debug)]
#[command(name = "gridview", version)]
struct Args {
    /// SQLite 数据库文件
    #[arg(long)]
    db: PathBuf,

    /// 要浏览的表
    #[arg(long, conflicts_with = "sql")]
    table: Option<String>,

    /// 要浏览的查询
    #[arg(long)]
    sql: Option<String>,

    /// 配置文件（TOML，`[config]` 表），修改后自动重新加载
    #[arg(long)]
    config: Option<PathBuf>,

    /// 窗口行数，覆盖配置文件
    #[arg(long)]
    height: Option<usize>,

    /// 打印多少次刷新后退出
    #[arg(long, default_value_t = 1)]
    epochs: u64,

    /// 以 JSON 输出
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Frame<'a> {
    epoch: u64,
    focus_col: usize,
    columns: Vec<&'a str>,
    rows: Vec<&'a Row>,
}

fn print_frame(session: &Session, update: RingUpdated, json: bool) -> Result<()> {
    let relation = session.relation();
    let frame = Frame {
        epoch: update.epoch,
        focus_col: update.focus_col,
        columns: relation.attributes.iter().map(|a| a.name.as_str()).collect(),
        rows: session.visible_rows(),
    };
    if json {
        println!("{}", serde_json::to_string(&frame)?);
        return Ok(());
    }
    println!("-- epoch {} ({})", frame.epoch, relation.name);
    println!("  {}", frame.columns.join(" | "));
    for row in frame.rows {
        println!("{}", render_row(row));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    init_tracing();
    let args = Args::parse();

    // 加载配置
    let mut config = match &args.config {
        Some(path) => Config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(height) = args.height {
        config.viewport_height = height;
    }
    cfg::install(config.clone())?;

    // 启动配置监听
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let watcher = match &args.config {
        Some(path) => Some(cfg::watch_config(path.clone(), shutdown_rx)?),
        None => None,
    };

    let engine: Arc<dyn Engine> = Arc::new(SqliteEngine::open(&args.db)?);
    let relation = match (&args.table, &args.sql) {
        (Some(table), _) => Relation::open(engine.as_ref(), table, config.text_size_fallback)?,
        (None, Some(query)) => Relation::open_sql(engine.as_ref(), query)?,
        (None, None) => return errinput!("either --table or --sql is required"),
    };
    info!(relation = %relation.name, key = %relation.key_names().join(","), "browsing");

    let mut session = Session::new(engine, Arc::new(relation), config);
    session.jump(Jump::Top, 0);
    let result = loop {
        match session.next_notice().await {
            Notice::Updated(update) => {
                if let Err(err) = print_frame(&session, update, args.json) {
                    break Err(err);
                }
                if update.epoch >= args.epochs {
                    break Ok(());
                }
            }
            Notice::Failed(err) => {
                error!("{err}");
                break Err(err);
            }
        }
        // 计时器跟随配置文件热更新
        match cfg::current() {
            Ok(live) => session.apply_config(live),
            Err(err) => break Err(err),
        }
    };

    session.shutdown();
    let _ = shutdown_tx.send(());
    if let Some(handle) = watcher {
        let _ = handle.await;
    }
    result
}
