//! 会话：并发模型
//!
//! 会话对象扮演 UI 事件线程，独占环形窗口。后台任务（`spawn_blocking`）负责打开游标、
//! 读取行和执行刷新查询，完成后把结果作为事件投递回会话的通道；窗口只在事件被应用时修改。
//!
//! - 命令按提交顺序排队，同一时刻只有一个后台任务在执行，锚点在派发时从窗口计算；
//! - 刷新计时器只在没有存活游标、没有排队命令时运行：提交命令即停止，最后一个游标关闭后重新启动；
//! - 空闲回收按 `cursor_idle / 2` 的节拍检查游标；
//! - 取消（切换关系、关闭）递增代数，丢弃在途事件，关闭游标，停止计时器并清空窗口。

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::cfg::Config;
use crate::cursor::{Direction, Scan, Scanner};
use crate::db_error::{Error, Result};
use crate::fk::{FkPreview, FkResolver};
use crate::relation::Relation;
use crate::ring::{Jump, Ring};
use crate::storage::Engine;
use crate::types::{KeyTuple, Row, Value};
use crate::utils::display_key;

const UPDATE_CAPACITY: usize = 64;

/// 窗口已更新，界面据此重绘
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingUpdated {
    pub epoch: u64,
    pub focus_col: usize,
}

/// 会话交给界面的通知
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    Updated(RingUpdated),
    /// 后台任务失败，窗口保持调用前的状态
    Failed(Error),
}

/// 界面提交的命令
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ScrollDown(usize),
    ScrollUp(usize),
    Jump { key: Option<KeyTuple>, to: Jump, focus_col: usize },
    Refresh,
}

enum Outcome {
    Scrolled(Direction, Scan),
    Jumped(Jump, usize, Scan),
    Refreshed(Scan),
}

struct SessionEvent {
    generation: u64,
    outcome: Result<Outcome>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RefreshTimer {
    Armed(Instant),
    Stopped,
}

pub struct Session {
    scanner: Scanner,
    ring: Ring,
    config: Config,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    pending: VecDeque<Command>,
    in_flight: bool,
    generation: u64,
    refresh: RefreshTimer,
    reap_at: Instant,
    updates: broadcast::Sender<RingUpdated>,
}

impl Session {
    pub fn new(engine: Arc<dyn Engine>, relation: Arc<Relation>, config: Config) -> Session {
        let (tx, rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let ring = Ring::new(config.viewport_height, relation.key.clone());
        let reap_at = Instant::now() + reap_period(&config);
        Session {
            scanner: Scanner::new(engine, relation),
            ring,
            config,
            tx,
            rx,
            pending: VecDeque::new(),
            in_flight: false,
            generation: 0,
            refresh: RefreshTimer::Stopped,
            reap_at,
            updates,
        }
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn visible_rows(&self) -> Vec<&Row> {
        self.ring.visible_rows()
    }

    pub fn relation(&self) -> &Arc<Relation> {
        self.scanner.relation()
    }

    pub fn cursor_live(&self) -> bool {
        self.scanner.slot().is_live()
    }

    /// 订阅窗口更新
    pub fn subscribe(&self) -> broadcast::Receiver<RingUpdated> {
        self.updates.subscribe()
    }

    /// 没有排队、在途的命令，也没有存活的游标
    pub fn is_idle(&self) -> bool {
        !self.in_flight && self.pending.is_empty() && !self.cursor_live()
    }

    /// 热更新计时器，窗口高度在下一次切换关系时生效
    pub fn apply_config(&mut self, config: Config) {
        if config.refresh_ms != self.config.refresh_ms || config.cursor_idle_ms != self.config.cursor_idle_ms {
            debug!(refresh_ms = config.refresh_ms, cursor_idle_ms = config.cursor_idle_ms, "session timers updated");
        }
        self.config = config;
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.submit(Command::ScrollDown(n));
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.submit(Command::ScrollUp(n));
    }

    pub fn jump(&mut self, to: Jump, focus_col: usize) {
        self.submit(Command::Jump { key: None, to, focus_col });
    }

    pub fn jump_to_key(&mut self, key: KeyTuple, to: Jump, focus_col: usize) {
        self.submit(Command::Jump { key: Some(key), to, focus_col });
    }

    pub fn refresh_now(&mut self) {
        self.submit(Command::Refresh);
    }

    /// 提交命令：停止刷新计时器，空闲时立即派发
    pub fn submit(&mut self, command: Command) {
        self.refresh = RefreshTimer::Stopped;
        self.pending.push_back(command);
        self.dispatch();
    }

    /// 派发队首命令到后台任务，锚点在此刻从窗口计算
    fn dispatch(&mut self) {
        if self.in_flight {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        let Some(command) = self.pending.pop_front() else {
            return;
        };
        let (work, anchor, budget) = match command {
            Command::ScrollDown(n) => (Work::Scroll(Direction::Forward), self.ring.anchor(Direction::Forward), n),
            Command::ScrollUp(n) => (Work::Scroll(Direction::Backward), self.ring.anchor(Direction::Backward), n),
            Command::Jump { key, to, focus_col } => (Work::Jump(to, focus_col), key.unwrap_or_default(), self.ring.jump_budget(to)),
            Command::Refresh => (Work::Refresh, self.ring.first_key().unwrap_or_default(), self.ring.height()),
        };
        debug!(?work, anchor = %display_key(&anchor), budget, "dispatch");
        self.in_flight = true;
        let scanner = self.scanner.clone();
        let tx = self.tx.clone();
        let generation = self.generation;
        handle.spawn_blocking(move || {
            let outcome = work.run(&scanner, &anchor, budget);
            // 会话已经销毁时直接丢弃
            let _ = tx.send(SessionEvent { generation, outcome });
        });
    }

    /// 等待下一次窗口更新或失败
    ///
    /// 在此期间驱动事件应用、刷新计时器与空闲回收。
    pub async fn next_notice(&mut self) -> Notice {
        loop {
            self.dispatch();
            let refresh_at = match self.refresh {
                RefreshTimer::Armed(at) => Some(at),
                RefreshTimer::Stopped => None,
            };
            let reap_at = self.reap_at;
            tokio::select! {
                Some(event) = self.rx.recv() => {
                    if let Some(notice) = self.apply(event) {
                        return notice;
                    }
                }
                _ = time::sleep_until(refresh_at.unwrap_or(reap_at)), if refresh_at.is_some() => {
                    self.fire_refresh();
                }
                _ = time::sleep_until(reap_at) => {
                    if let Err(err) = self.reap() {
                        return Notice::Failed(err);
                    }
                }
            }
        }
    }

    fn apply(&mut self, event: SessionEvent) -> Option<Notice> {
        if event.generation != self.generation {
            debug!(generation = event.generation, current = self.generation, "discarding stale event");
            return None;
        }
        self.in_flight = false;
        let notice = match event.outcome.and_then(|outcome| self.apply_outcome(outcome)) {
            Ok(()) => {
                let update = RingUpdated { epoch: self.ring.epoch(), focus_col: self.ring.focus_col() };
                // 没有订阅者时发送失败，忽略
                let _ = self.updates.send(update);
                Notice::Updated(update)
            }
            Err(err) => {
                warn!("ring update failed: {err}");
                Notice::Failed(err)
            }
        };
        self.settle();
        Some(notice)
    }

    fn apply_outcome(&mut self, outcome: Outcome) -> Result<()> {
        match outcome {
            Outcome::Scrolled(Direction::Forward, scan) => {
                if self.ring.apply_scroll_down(scan)? {
                    debug!("reached end");
                }
            }
            Outcome::Scrolled(Direction::Backward, scan) => {
                if self.ring.apply_scroll_up(scan)? {
                    debug!("reached top");
                }
            }
            Outcome::Jumped(to, focus_col, scan) => self.ring.apply_jump(scan.rows, to, focus_col)?,
            Outcome::Refreshed(scan) => {
                self.ring.apply_refresh(scan)?;
            }
        }
        Ok(())
    }

    /// 空闲时启动刷新计时器
    fn settle(&mut self) {
        if self.refresh == RefreshTimer::Stopped && self.is_idle() {
            self.refresh = RefreshTimer::Armed(Instant::now() + self.config.refresh_interval());
        }
    }

    fn fire_refresh(&mut self) {
        self.refresh = RefreshTimer::Stopped;
        if self.is_idle() {
            self.pending.push_back(Command::Refresh);
        } else {
            self.settle();
        }
    }

    fn reap(&mut self) -> Result<()> {
        self.reap_at = Instant::now() + reap_period(&self.config);
        if self.scanner.slot().close_if_idle(self.config.cursor_idle())? {
            self.settle();
        }
        Ok(())
    }

    /// 取消：丢弃在途事件与排队命令，关闭游标，停止计时器，清空窗口
    pub fn cancel(&mut self) {
        self.generation += 1;
        let detached = self.scanner.detach();
        let previous = std::mem::replace(&mut self.scanner, detached);
        // 正在扫描的游标随旧槽位的最后一个持有者释放
        if let Err(err) = previous.slot().try_close() {
            warn!("closing cursor on cancel: {err}");
        }
        self.pending.clear();
        self.in_flight = false;
        self.refresh = RefreshTimer::Stopped;
        self.ring.reset();
        debug!(generation = self.generation, "session cancelled");
    }

    /// 切换到另一个关系并跳到顶部
    pub fn switch_relation(&mut self, relation: Arc<Relation>) {
        self.cancel();
        info!(relation = %relation.name, "switching relation");
        self.ring = Ring::new(self.config.viewport_height, relation.key.clone());
        self.scanner = Scanner::new(self.scanner.engine().clone(), relation);
        self.jump(Jump::Top, 0);
    }

    pub fn shutdown(&mut self) {
        self.cancel();
        info!("session shut down");
    }

    /// 外键预览，在后台线程上查询
    pub fn preview_fk(&self, row: &[Value], col: usize, new_value: Value) -> impl Future<Output = Result<FkPreview>> {
        let resolver = FkResolver::new(self.scanner.engine().clone(), self.scanner.relation().clone());
        let row = row.to_vec();
        async move {
            tokio::task::spawn_blocking(move || resolver.preview(&row, col, new_value))
                .await
                .map_err(|err| if err.is_cancelled() { Error::Cancelled } else { Error::FkResolve(err.to_string()) })?
        }
    }
}

fn reap_period(config: &Config) -> Duration {
    (config.cursor_idle() / 2).max(Duration::from_millis(1))
}

/// 后台任务要做的事
#[derive(Clone, Copy, Debug)]
enum Work {
    Scroll(Direction),
    Jump(Jump, usize),
    Refresh,
}

impl Work {
    fn run(self, scanner: &Scanner, anchor: &[Value], budget: usize) -> Result<Outcome> {
        Ok(match self {
            Work::Scroll(direction) => Outcome::Scrolled(direction, scanner.scan(direction, anchor, budget)?),
            Work::Jump(to, focus_col) => Outcome::Jumped(to, focus_col, scanner.fetch(to.direction(), anchor, budget)?),
            Work::Refresh => Outcome::Refreshed(scanner.fetch(Direction::Forward, anchor, budget)?),
        })
    }
}
