//! 环形窗口
//!
//! 固定 H 个槽位的环形缓冲，`pointer` 指向逻辑上的第一行：
//! 槽位 `(pointer + i) mod H` 存放第 i 个可见行。
//!
//! 不变量（每次操作后成立）：
//! - 逻辑顺序中第一个哨兵之后全是哨兵；
//! - 非哨兵行按键元组严格递增。
//!
//! 窗口只在一个线程上被修改。同步的 `jump`/`scroll_*`/`refresh` 直接驱动扫描器；
//! 并发场景由会话层在后台取数，再在事件线程上调用对应的 `apply_*`。

use tracing::{debug, info, warn};

use crate::cursor::{Direction, Scan, Scanner};
use crate::db_error::{Error, Result};
use crate::errdata;
use crate::refresh::{self, RefreshStats};
use crate::types::{KeyTuple, Row, RowState, Value};
use crate::utils::display_key;

/// 跳转目标
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Jump {
    /// 锚点（含）放在第一行，向后填充
    Top,
    /// 锚点（含）放在最后一个非哨兵行，向前填充
    Bottom,
}

impl Jump {
    pub fn direction(self) -> Direction {
        match self {
            Jump::Top => Direction::Forward,
            Jump::Bottom => Direction::Backward,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ring {
    slots: Vec<Row>,
    pointer: usize,
    epoch: u64,
    focus_col: usize,
    key: Vec<usize>,
}

impl Ring {
    /// 创建全为哨兵的窗口，`height` 至少为 1
    pub fn new(height: usize, key: Vec<usize>) -> Ring {
        let height = height.max(1);
        Ring { slots: vec![Row::sentinel(); height], pointer: 0, epoch: 0, focus_col: 0, key }
    }

    pub fn height(&self) -> usize {
        self.slots.len()
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn focus_col(&self) -> usize {
        self.focus_col
    }

    fn slot(&self, i: usize) -> &Row {
        &self.slots[(self.pointer + i) % self.slots.len()]
    }

    /// 从 pointer 开始的可见行，遇到第一个哨兵停止
    pub fn visible_rows(&self) -> Vec<&Row> {
        (0..self.height()).map(|i| self.slot(i)).take_while(|row| !row.is_sentinel()).collect()
    }

    /// 可见行数
    pub fn len(&self) -> usize {
        (0..self.height()).take_while(|&i| !self.slot(i).is_sentinel()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slot(0).is_sentinel()
    }

    pub fn first_key(&self) -> Option<KeyTuple> {
        self.visible_rows().first().map(|row| row.key(&self.key))
    }

    pub fn last_key(&self) -> Option<KeyTuple> {
        self.visible_rows().last().map(|row| row.key(&self.key))
    }

    /// 沿方向继续滚动时的锚点：向下为最后一行，向上为第一行；窗口为空时为空元组
    pub fn anchor(&self, direction: Direction) -> KeyTuple {
        let key = match direction {
            Direction::Forward => self.last_key(),
            Direction::Backward => self.first_key(),
        };
        key.unwrap_or_default()
    }

    /// 全部置为哨兵
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = Row::sentinel());
        self.pointer = 0;
    }

    /// 跳转时需要读取的行数：向下跳转留出一个哨兵槽位
    pub fn jump_budget(&self, to: Jump) -> usize {
        match to {
            Jump::Top => self.height(),
            Jump::Bottom => (self.height() - 1).max(1),
        }
    }

    /// 用一次跳转读到的行填充窗口
    ///
    /// 向上跳转时行按降序到达，反转后从槽位 0 开始放置，锚点落在最后一个非哨兵槽位。
    pub fn apply_jump(&mut self, rows: Vec<Vec<Value>>, to: Jump, focus_col: usize) -> Result<()> {
        let budget = self.jump_budget(to);
        let mut rows: Vec<Vec<Value>> = rows.into_iter().take(budget).collect();
        self.check_order(&rows, to.direction(), None)?;
        if to == Jump::Bottom {
            rows.reverse();
        }
        let mut staged = self.clone();
        staged.reset();
        for (slot, values) in staged.slots.iter_mut().zip(rows) {
            *slot = Row::new(values);
        }
        staged.focus_col = focus_col;
        self.commit(staged)?;
        debug!(?to, rows = self.len(), "ring jumped");
        Ok(())
    }

    /// 把向下滚动读到的行写入窗口，返回是否到达末尾
    ///
    /// 窗口未满时追加到尾部；已满时覆盖 pointer 处的槽位并前移 pointer。
    /// 游标提前读完时在尾部放入哨兵。
    pub fn apply_scroll_down(&mut self, scan: Scan) -> Result<bool> {
        let rows = self.fresh_rows(scan.rows);
        self.check_order(&rows, Direction::Forward, self.last_key())?;
        let height = self.height();
        let mut staged = self.clone();
        for values in rows {
            let len = staged.len();
            if len < height {
                staged.slots[(staged.pointer + len) % height] = Row::new(values);
            } else {
                staged.slots[staged.pointer] = Row::new(values);
                staged.pointer = (staged.pointer + 1) % height;
            }
        }
        if scan.exhausted && staged.len() == height {
            staged.slots[staged.pointer] = Row::sentinel();
            staged.pointer = (staged.pointer + 1) % height;
        }
        self.commit(staged)?;
        Ok(scan.exhausted)
    }

    /// 把向上滚动读到的行（降序）写入窗口，返回是否到达顶部
    ///
    /// 每一行先把 pointer 后退一格再写入，被挤出的是逻辑上的最后一个槽位。
    pub fn apply_scroll_up(&mut self, scan: Scan) -> Result<bool> {
        let rows = self.fresh_rows(scan.rows);
        self.check_order(&rows, Direction::Backward, self.first_key())?;
        let height = self.height();
        let mut staged = self.clone();
        for values in rows {
            staged.pointer = (staged.pointer + height - 1) % height;
            staged.slots[staged.pointer] = Row::new(values);
        }
        self.commit(staged)?;
        Ok(scan.exhausted)
    }

    fn key_of(&self, values: &[Value]) -> KeyTuple {
        self.key.iter().map(|&i| values.get(i).cloned().unwrap_or(Value::Null)).collect()
    }

    /// 丢弃窗口中已经存在的键，游标续读与窗口不同步时保持顺序不变量
    fn fresh_rows(&self, rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
        let present: Vec<KeyTuple> = self.visible_rows().iter().map(|row| row.key(&self.key)).collect();
        rows.into_iter()
            .filter(|values| {
                let key = self.key_of(values);
                let duplicate = present.contains(&key);
                if duplicate {
                    debug!(key = %display_key(&key), "dropping row already in ring");
                }
                !duplicate
            })
            .collect()
    }

    /// 读入的行必须沿方向严格有序，并且都在 `edge`（不含）之外
    ///
    /// 键不唯一或数据库排序与 [`Value`] 全序不一致时在这里拒绝，窗口保持原样。
    fn check_order(&self, rows: &[Vec<Value>], direction: Direction, edge: Option<KeyTuple>) -> Result<()> {
        let mut previous = edge;
        for values in rows {
            let key = self.key_of(values);
            if let Some(prev) = &previous {
                let ordered = match direction {
                    Direction::Forward => *prev < key,
                    Direction::Backward => *prev > key,
                };
                if !ordered {
                    warn!(%direction, "rejecting out-of-order rows");
                    return Err(errdata!(
                        "{direction} rows out of key order: {} then {}",
                        display_key(prev),
                        display_key(&key)
                    ));
                }
            }
            previous = Some(key);
        }
        Ok(())
    }

    /// 暂存副本通过自检后才替换当前窗口
    fn commit(&mut self, staged: Ring) -> Result<()> {
        staged.self_check()?;
        *self = staged;
        Ok(())
    }

    /// 用刷新读到的行替换窗口内容，按旧快照分类每一行
    pub fn apply_refresh(&mut self, scan: Scan) -> Result<RefreshStats> {
        self.check_order(&scan.rows, Direction::Forward, None)?;
        let old: Vec<Row> = self.visible_rows().into_iter().cloned().collect();
        let height = self.height();
        let exhausted = scan.exhausted || scan.rows.len() < height;
        let (rows, mut stats) = refresh::diff(&old, scan.rows, &self.key, exhausted, height);
        let mut staged = self.clone();
        staged.reset();
        for (slot, row) in staged.slots.iter_mut().zip(rows) {
            *slot = row;
        }
        staged.epoch += 1;
        self.commit(staged)?;
        stats.epoch = self.epoch;
        info!(
            epoch = stats.epoch,
            new = stats.new,
            deleted = stats.deleted,
            modified = stats.modified,
            "ring refreshed"
        );
        Ok(stats)
    }

    /// 自检：哨兵只出现在尾部，非哨兵行的键严格递增
    ///
    /// 键的比较使用 [`Value`] 的全序，与数据库排序规则可能不一致，
    /// 因此只有测试构建中违反时才会断言失败。
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen_sentinel = false;
        let mut previous: Option<KeyTuple> = None;
        for i in 0..self.height() {
            let row = self.slot(i);
            if row.is_sentinel() {
                seen_sentinel = true;
                continue;
            }
            if seen_sentinel {
                return Err(Error::InvalidData(format!("row after sentinel at logical slot {i}")));
            }
            let key = row.key(&self.key);
            if let Some(prev) = &previous {
                if *prev >= key {
                    return Err(Error::InvalidData(format!(
                        "keys not increasing at logical slot {i}: {} then {}",
                        display_key(prev),
                        display_key(&key)
                    )));
                }
            }
            previous = Some(key);
        }
        Ok(())
    }

    fn self_check(&self) -> Result<()> {
        let checked = self.check_invariants();
        if cfg!(test) {
            if let Err(err) = &checked {
                panic!("ring invariant violated: {err}");
            }
        }
        checked
    }

    /// 跳转到首尾，锚点为 `None` 时表示绝对起点/终点
    pub fn jump(&mut self, scanner: &Scanner, anchor: Option<KeyTuple>, to: Jump, focus_col: usize) -> Result<()> {
        let anchor = anchor.unwrap_or_default();
        let scan = scanner.fetch(to.direction(), &anchor, self.jump_budget(to))?;
        self.apply_jump(scan.rows, to, focus_col)
    }

    /// 按键跳转，UI 使用
    pub fn jump_to_key(&mut self, scanner: &Scanner, key: KeyTuple, to: Jump, focus_col: usize) -> Result<()> {
        self.jump(scanner, Some(key), to, focus_col)
    }

    pub fn scroll_down(&mut self, scanner: &Scanner, n: usize) -> Result<bool> {
        let scan = scanner.scan(Direction::Forward, &self.anchor(Direction::Forward), n)?;
        self.apply_scroll_down(scan)
    }

    pub fn scroll_up(&mut self, scanner: &Scanner, n: usize) -> Result<bool> {
        let scan = scanner.scan(Direction::Backward, &self.anchor(Direction::Backward), n)?;
        self.apply_scroll_up(scan)
    }

    /// 刷新：从第一行的键（含）重新读取一个窗口并分类
    pub fn refresh(&mut self, scanner: &Scanner) -> Result<RefreshStats> {
        let anchor = self.first_key().unwrap_or_default();
        let scan = scanner.fetch(Direction::Forward, &anchor, self.height())?;
        self.apply_refresh(scan)
    }

    /// 所有非哨兵行的状态
    pub fn states(&self) -> Vec<RowState> {
        self.visible_rows().iter().map(|row| row.state).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::size::TEXT_SIZE_FALLBACK;
    use crate::relation::Relation;
    use crate::storage::SqliteEngine;

    fn setup(rows: i64, height: usize) -> Result<(tempfile::TempDir, Scanner, Ring)> {
        let dir = tempfile::tempdir()?;
        let engine = SqliteEngine::open(dir.path().join("ring.db"))?;
        engine.execute_batch("CREATE TABLE t (k INTEGER PRIMARY KEY, v INTEGER)")?;
        for k in 1..=rows {
            engine.execute("INSERT INTO t VALUES (?, ?)", &[Value::Int(k), Value::Int(k * 10)])?;
        }
        let relation = Relation::open(&engine, "t", TEXT_SIZE_FALLBACK)?;
        let ring = Ring::new(height, relation.key.clone());
        Ok((dir, Scanner::new(Arc::new(engine), Arc::new(relation)), ring))
    }

    fn keys(ring: &Ring) -> Vec<i64> {
        ring.visible_rows().iter().filter_map(|row| row.cells()[0].as_i64()).collect()
    }

    #[test]
    fn test_forward_pagination() -> Result<()> {
        let (_dir, scanner, mut ring) = setup(10, 3)?;
        ring.jump(&scanner, None, Jump::Top, 0)?;
        assert_eq!(keys(&ring), vec![1, 2, 3]);
        assert!(!ring.scroll_down(&scanner, 2)?);
        assert_eq!(keys(&ring), vec![3, 4, 5]);
        assert!(ring.scroll_down(&scanner, 10)?);
        assert_eq!(keys(&ring), vec![9, 10]);
        // 第三个逻辑槽位是哨兵
        assert_eq!(ring.len(), 2);
        Ok(())
    }

    #[test]
    fn test_backward_pagination() -> Result<()> {
        let (_dir, scanner, mut ring) = setup(10, 3)?;
        ring.jump(&scanner, None, Jump::Top, 0)?;
        ring.scroll_down(&scanner, 2)?;
        ring.scroll_down(&scanner, 10)?;
        assert!(!ring.scroll_up(&scanner, 3)?);
        assert_eq!(keys(&ring), vec![6, 7, 8]);
        assert!(ring.scroll_up(&scanner, 10)?);
        assert_eq!(keys(&ring), vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_empty_relation() -> Result<()> {
        let (_dir, scanner, mut ring) = setup(0, 4)?;
        ring.jump(&scanner, None, Jump::Top, 0)?;
        assert!(ring.visible_rows().is_empty());
        assert!(ring.scroll_down(&scanner, 1)?);
        assert!(ring.scroll_up(&scanner, 1)?);
        assert!(ring.is_empty());
        Ok(())
    }

    #[test]
    fn test_exactly_height_rows() -> Result<()> {
        let (_dir, scanner, mut ring) = setup(3, 3)?;
        ring.jump(&scanner, None, Jump::Top, 0)?;
        assert_eq!(keys(&ring), vec![1, 2, 3]);
        assert_eq!(ring.len(), 3);
        assert!(ring.scroll_down(&scanner, 1)?);
        assert_eq!(keys(&ring), vec![2, 3]);
        Ok(())
    }

    #[test]
    fn test_jump_bottom_keeps_trailing_sentinel() -> Result<()> {
        let (_dir, scanner, mut ring) = setup(10, 4)?;
        ring.jump(&scanner, None, Jump::Bottom, 1)?;
        assert_eq!(keys(&ring), vec![8, 9, 10]);
        assert_eq!(ring.pointer(), 0);
        assert_eq!(ring.focus_col(), 1);
        ring.jump_to_key(&scanner, vec![Value::Int(5)], Jump::Bottom, 0)?;
        assert_eq!(keys(&ring), vec![3, 4, 5]);
        ring.jump_to_key(&scanner, vec![Value::Int(5)], Jump::Top, 0)?;
        assert_eq!(keys(&ring), vec![5, 6, 7, 8]);
        assert!(!scanner.slot().is_live());
        Ok(())
    }

    #[test]
    fn test_scroll_on_partial_ring_appends() -> Result<()> {
        let (_dir, scanner, mut ring) = setup(10, 4)?;
        ring.jump_to_key(&scanner, vec![Value::Int(3)], Jump::Bottom, 0)?;
        assert_eq!(keys(&ring), vec![1, 2, 3]);
        assert!(!ring.scroll_down(&scanner, 1)?);
        assert_eq!(keys(&ring), vec![1, 2, 3, 4]);
        assert!(!ring.scroll_down(&scanner, 1)?);
        assert_eq!(keys(&ring), vec![2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn test_duplicate_rows_dropped() -> Result<()> {
        let mut ring = Ring::new(3, vec![0]);
        ring.apply_jump(vec![vec![Value::Int(1)], vec![Value::Int(2)]], Jump::Top, 0)?;
        let scan = Scan { rows: vec![vec![Value::Int(2)], vec![Value::Int(3)]], exhausted: false };
        ring.apply_scroll_down(scan)?;
        assert_eq!(keys(&ring), vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_rejected_update_leaves_ring_unchanged() -> Result<()> {
        let mut ring = Ring::new(3, vec![0]);
        ring.apply_jump(vec![vec![Value::Int(1)], vec![Value::Int(2)]], Jump::Top, 1)?;
        let before = (keys(&ring), ring.pointer(), ring.epoch(), ring.focus_col());

        // 键不唯一的结果
        let dup = vec![vec![Value::Int(5)], vec![Value::Int(5)]];
        assert!(matches!(ring.apply_jump(dup.clone(), Jump::Top, 0), Err(Error::InvalidData(_))));
        assert!(ring.apply_refresh(Scan { rows: dup, exhausted: true }).is_err());
        // 向下滚动读到了窗口之前的键
        let behind = Scan { rows: vec![vec![Value::Int(0)]], exhausted: false };
        assert!(ring.apply_scroll_down(behind).is_err());
        let ahead = Scan { rows: vec![vec![Value::Int(9)]], exhausted: false };
        assert!(ring.apply_scroll_up(ahead).is_err());

        assert_eq!((keys(&ring), ring.pointer(), ring.epoch(), ring.focus_col()), before);
        Ok(())
    }

    #[test]
    fn test_refresh_overflow_not_counted_as_new() -> Result<()> {
        let (dir, scanner, mut ring) = setup(3, 3)?;
        ring.jump(&scanner, None, Jump::Top, 0)?;
        let writer = SqliteEngine::open(dir.path().join("ring.db"))?;
        writer.execute_batch("UPDATE t SET v = 25 WHERE k = 2; DELETE FROM t WHERE k = 3; INSERT INTO t VALUES (4, 40);")?;

        let stats = ring.refresh(&scanner)?;
        assert_eq!((stats.new, stats.deleted, stats.modified), (0, 1, 1));
        assert_eq!(keys(&ring), vec![1, 2, 3]);
        assert_eq!(ring.states(), vec![RowState::Normal, RowState::Normal, RowState::Deleted]);

        let stats = ring.refresh(&scanner)?;
        assert_eq!((stats.new, stats.deleted, stats.modified), (1, 0, 0));
        assert_eq!(keys(&ring), vec![1, 2, 4]);
        assert_eq!(ring.states(), vec![RowState::Normal, RowState::Normal, RowState::New]);

        let stats = ring.refresh(&scanner)?;
        assert_eq!(stats.new, 0);
        assert_eq!(ring.states(), vec![RowState::Normal; 3]);
        Ok(())
    }

    #[test]
    fn test_check_invariants_detects_disorder() {
        let mut ring = Ring::new(3, vec![0]);
        ring.slots[0] = Row::new(vec![Value::Int(2)]);
        ring.slots[1] = Row::new(vec![Value::Int(1)]);
        assert!(ring.check_invariants().is_err());
        ring.slots[1] = Row::sentinel();
        ring.slots[2] = Row::new(vec![Value::Int(3)]);
        assert!(ring.check_invariants().is_err());
        ring.reset();
        assert!(ring.check_invariants().is_ok());
    }

    #[test]
    fn test_reset() -> Result<()> {
        let (_dir, scanner, mut ring) = setup(5, 3)?;
        ring.jump(&scanner, None, Jump::Top, 0)?;
        ring.scroll_down(&scanner, 1)?;
        ring.reset();
        assert!(ring.visible_rows().is_empty());
        assert_eq!(ring.pointer(), 0);
        Ok(())
    }
}
