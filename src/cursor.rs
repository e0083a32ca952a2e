//! 键集分页游标
//!
//! 查询的形状为
//!
//! ```text
//! SELECT <全部列> FROM <关系>
//! [ WHERE <键元组与锚点的字典序比较> ]
//! ORDER BY <键列> ASC|DESC
//! ```
//!
//! 键元组比较展开为 OR-of-AND，不依赖行值比较语法。

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use itertools::Itertools;
use tracing::{debug, info};

use crate::db_error::{Error, Result};
use crate::relation::Relation;
use crate::storage::{Engine, RowStream};
use crate::types::Value;

/// 扫描方向
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// 生成键集分页查询与参数
///
/// 键 (k1..kn) 与锚点 (a1..an)：
/// `(k1 > a1) OR (k1 = a1 AND k2 > a2) OR ... OR (k1 = a1 AND ... AND kn > an)`，
/// 包含锚点时最后一项使用 `>=`；反向时使用 `<`/`<=` 并降序排列。锚点为空时省略 WHERE。
pub fn build_query(
    relation: &Relation,
    anchor: &[Value],
    inclusive: bool,
    direction: Direction,
) -> Result<(String, Vec<Value>)> {
    let keys: Vec<String> = relation.key.iter().map(|&i| relation.quote_ident(&relation.attributes[i].name)).collect();
    if !anchor.is_empty() && anchor.len() != keys.len() {
        return crate::errinput!("anchor has {} values, key has {} columns", anchor.len(), keys.len());
    }
    let (strict, order) = match direction {
        Direction::Forward => (">", "ASC"),
        Direction::Backward => ("<", "DESC"),
    };

    let mut sql = format!("SELECT {} FROM {}", relation.select_list(), relation.from_clause());
    let mut params = Vec::new();
    if !anchor.is_empty() {
        let mut terms = Vec::with_capacity(keys.len());
        for i in 0..keys.len() {
            let mut conds = Vec::with_capacity(i + 1);
            for j in 0..i {
                conds.push(format!("{} = ?", keys[j]));
                params.push(anchor[j].clone());
            }
            let op = if inclusive && i + 1 == keys.len() { format!("{strict}=") } else { strict.to_string() };
            conds.push(format!("{} {op} ?", keys[i]));
            params.push(anchor[i].clone());
            terms.push(format!("({})", conds.join(" AND ")));
        }
        sql.push_str(&format!(" WHERE {}", terms.join(" OR ")));
    }
    sql.push_str(&format!(" ORDER BY {}", keys.iter().map(|k| format!("{k} {order}")).join(", ")));
    Ok((sql, params))
}

/// 一个活动的服务端游标
pub struct Cursor {
    direction: Direction,
    stream: Box<dyn RowStream>,
    last_used: Instant,
    fetched: usize,
}

impl Cursor {
    pub fn open(
        engine: &dyn Engine,
        relation: &Relation,
        anchor: &[Value],
        inclusive: bool,
        direction: Direction,
    ) -> Result<Cursor> {
        let (sql, params) = build_query(relation, anchor, inclusive, direction)?;
        debug!(relation = %relation.name, %direction, "open cursor: {sql}");
        let stream = engine.open_stream(&sql, &params)?;
        Ok(Cursor { direction, stream, last_used: Instant::now(), fetched: 0 })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 读取下一行，每次读取都会重置空闲计时
    pub fn next(&mut self) -> Result<Option<Vec<Value>>> {
        self.last_used = Instant::now();
        let row = self.stream.next_row()?;
        if row.is_some() {
            self.fetched += 1;
        }
        Ok(row)
    }

    pub fn is_idle(&self, idle: Duration) -> bool {
        self.last_used.elapsed() >= idle
    }
}

/// 一次扫描的结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scan {
    pub rows: Vec<Vec<Value>>,
    /// 游标在取满之前已读完
    pub exhausted: bool,
}

/// (活动游标, 方向) 这一对状态上的唯一一把锁
///
/// 用户滚动与刷新计时器都可能打开或关闭游标，因此共享同一个槽位；
/// 同一时刻最多只有一个游标存活，切换方向即关闭旧游标。
#[derive(Clone, Default)]
pub struct CursorSlot(Arc<Mutex<Option<Cursor>>>);

impl CursorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否有存活的游标，锁被占用时视为存活（扫描正在进行）
    pub fn is_live(&self) -> bool {
        match self.0.try_lock() {
            Ok(guard) => guard.is_some(),
            Err(_) => true,
        }
    }

    pub fn direction(&self) -> Result<Option<Direction>> {
        Ok(self.0.lock()?.as_ref().map(Cursor::direction))
    }

    /// 关闭游标，返回之前是否存在
    pub fn close(&self) -> Result<bool> {
        Ok(self.0.lock()?.take().is_some())
    }

    /// 不等待锁的关闭；正在扫描时返回 false，游标随槽位的最后一个持有者释放
    pub fn try_close(&self) -> Result<bool> {
        match self.0.try_lock() {
            Ok(mut guard) => Ok(guard.take().is_some()),
            Err(TryLockError::WouldBlock) => Ok(false),
            Err(TryLockError::Poisoned(err)) => Err(err.into()),
        }
    }

    /// 空闲超时则关闭；正在扫描时跳过
    pub fn close_if_idle(&self, idle: Duration) -> Result<bool> {
        let mut guard = match self.0.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Ok(false),
            Err(TryLockError::Poisoned(err)) => return Err(err.into()),
        };
        match guard.as_ref() {
            Some(cursor) if cursor.is_idle(idle) => {
                info!(direction = %cursor.direction, fetched = cursor.fetched, "cursor idle-closed");
                *guard = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// 绑定连接、关系与游标槽位的扫描器，可以廉价克隆给后台任务
#[derive(Clone)]
pub struct Scanner {
    engine: Arc<dyn Engine>,
    relation: Arc<Relation>,
    slot: CursorSlot,
}

impl Scanner {
    pub fn new(engine: Arc<dyn Engine>, relation: Arc<Relation>) -> Self {
        Self { engine, relation, slot: CursorSlot::new() }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn relation(&self) -> &Arc<Relation> {
        &self.relation
    }

    pub fn slot(&self) -> &CursorSlot {
        &self.slot
    }

    /// 换用新的槽位，旧槽位中的游标随最后一个持有者释放
    pub fn detach(&self) -> Scanner {
        Scanner { engine: self.engine.clone(), relation: self.relation.clone(), slot: CursorSlot::new() }
    }

    /// 沿方向继续滚动 n 行
    ///
    /// 槽位中已有同方向的游标时直接续读，否则关闭旧游标并在锚点处（不含锚点）重新打开。
    /// 游标读完或出错时关闭。
    pub fn scan(&self, direction: Direction, anchor: &[Value], n: usize) -> Result<Scan> {
        let mut guard = self.slot.0.lock()?;
        if guard.as_ref().is_some_and(|c| c.direction != direction) {
            debug!(%direction, "direction changed, closing cursor");
            *guard = None;
        }
        if guard.is_none() {
            *guard = Some(Cursor::open(self.engine.as_ref(), &self.relation, anchor, false, direction)?);
        }
        let mut scan = Scan::default();
        let result = match guard.as_mut() {
            Some(cursor) => Self::pull(cursor, n, &mut scan),
            None => Err(Error::Cursor("cursor vanished".to_string())),
        };
        if result.is_err() || scan.exhausted {
            if scan.exhausted {
                debug!(%direction, "cursor exhausted");
            }
            *guard = None;
        }
        result.map(|_| scan)
    }

    /// 一次性读取：关闭存活的游标，打开新游标（包含锚点），读取至多 n 行后立即关闭
    pub fn fetch(&self, direction: Direction, anchor: &[Value], n: usize) -> Result<Scan> {
        let mut guard = self.slot.0.lock()?;
        *guard = None;
        let mut cursor = Cursor::open(self.engine.as_ref(), &self.relation, anchor, true, direction)?;
        let mut scan = Scan::default();
        Self::pull(&mut cursor, n, &mut scan)?;
        Ok(scan)
    }

    fn pull(cursor: &mut Cursor, n: usize, scan: &mut Scan) -> Result<()> {
        while scan.rows.len() < n {
            match cursor.next()? {
                Some(row) => scan.rows.push(row),
                None => {
                    scan.exhausted = true;
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::size::TEXT_SIZE_FALLBACK;
    use crate::storage::SqliteEngine;

    fn setup(rows: i64) -> Result<(tempfile::TempDir, Arc<SqliteEngine>, Arc<Relation>)> {
        let dir = tempfile::tempdir()?;
        let engine = SqliteEngine::open(dir.path().join("c.db"))?;
        engine.execute_batch("CREATE TABLE t (k INTEGER PRIMARY KEY, v TEXT)")?;
        for k in 1..=rows {
            engine.execute("INSERT INTO t VALUES (?, ?)", &[Value::Int(k), Value::from(format!("v{k}"))])?;
        }
        let relation = Relation::open(&engine, "t", TEXT_SIZE_FALLBACK)?;
        Ok((dir, Arc::new(engine), Arc::new(relation)))
    }

    fn keys(scan: &Scan) -> Vec<i64> {
        scan.rows.iter().filter_map(|r| r[0].as_i64()).collect()
    }

    #[test]
    fn test_build_query_composite() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = SqliteEngine::open(dir.path().join("q.db"))?;
        engine.execute_batch("CREATE TABLE m (a INTEGER, b TEXT, c REAL, PRIMARY KEY (a, b))")?;
        let rel = Relation::open(&engine, "m", TEXT_SIZE_FALLBACK)?;

        let (sql, params) = build_query(&rel, &[Value::Int(1), Value::from("x")], false, Direction::Forward)?;
        assert_eq!(
            sql,
            "SELECT \"a\", \"b\", \"c\" FROM \"m\" WHERE (\"a\" > ?) OR (\"a\" = ? AND \"b\" > ?) ORDER BY \"a\" ASC, \"b\" ASC"
        );
        assert_eq!(params, vec![Value::Int(1), Value::Int(1), Value::from("x")]);

        let (sql, _) = build_query(&rel, &[Value::Int(1), Value::from("x")], true, Direction::Backward)?;
        assert!(sql.ends_with("WHERE (\"a\" < ?) OR (\"a\" = ? AND \"b\" <= ?) ORDER BY \"a\" DESC, \"b\" DESC"));

        let (sql, params) = build_query(&rel, &[], true, Direction::Backward)?;
        assert_eq!(sql, "SELECT \"a\", \"b\", \"c\" FROM \"m\" ORDER BY \"a\" DESC, \"b\" DESC");
        assert!(params.is_empty());

        assert!(build_query(&rel, &[Value::Int(1)], false, Direction::Forward).is_err());
        Ok(())
    }

    #[test]
    fn test_scan_continues_same_direction() -> Result<()> {
        let (_dir, engine, rel) = setup(10)?;
        let scanner = Scanner::new(engine, rel);
        assert_eq!(keys(&scanner.scan(Direction::Forward, &[Value::Int(3)], 2)?), vec![4, 5]);
        assert!(scanner.slot().is_live());
        // 续读时忽略锚点
        assert_eq!(keys(&scanner.scan(Direction::Forward, &[Value::Int(5)], 2)?), vec![6, 7]);
        let tail = scanner.scan(Direction::Forward, &[], 10)?;
        assert_eq!(keys(&tail), vec![8, 9, 10]);
        assert!(tail.exhausted);
        assert!(!scanner.slot().is_live());
        Ok(())
    }

    #[test]
    fn test_direction_change_reopens() -> Result<()> {
        let (_dir, engine, rel) = setup(10)?;
        let scanner = Scanner::new(engine, rel);
        scanner.scan(Direction::Forward, &[Value::Int(3)], 2)?;
        assert_eq!(scanner.slot().direction()?, Some(Direction::Forward));
        let up = scanner.scan(Direction::Backward, &[Value::Int(4)], 5)?;
        assert_eq!(keys(&up), vec![3, 2, 1]);
        assert!(up.exhausted);
        Ok(())
    }

    #[test]
    fn test_fetch_is_inclusive_and_one_shot() -> Result<()> {
        let (_dir, engine, rel) = setup(5)?;
        let scanner = Scanner::new(engine, rel);
        scanner.scan(Direction::Forward, &[], 1)?;
        let scan = scanner.fetch(Direction::Forward, &[Value::Int(2)], 2)?;
        assert_eq!(keys(&scan), vec![2, 3]);
        assert!(!scan.exhausted);
        assert!(!scanner.slot().is_live());
        let scan = scanner.fetch(Direction::Backward, &[], 2)?;
        assert_eq!(keys(&scan), vec![5, 4]);
        Ok(())
    }

    #[test]
    fn test_idle_close() -> Result<()> {
        let (_dir, engine, rel) = setup(5)?;
        let scanner = Scanner::new(engine, rel);
        scanner.scan(Direction::Forward, &[], 1)?;
        assert!(!scanner.slot().close_if_idle(Duration::from_secs(60))?);
        std::thread::sleep(Duration::from_millis(20));
        assert!(scanner.slot().close_if_idle(Duration::from_millis(10))?);
        assert!(!scanner.slot().is_live());
        Ok(())
    }

    #[test]
    fn test_open_failure_is_cursor_error() -> Result<()> {
        let (_dir, engine, rel) = setup(1)?;
        engine.execute_batch("DROP TABLE t")?;
        let scanner = Scanner::new(engine, rel);
        assert!(matches!(scanner.scan(Direction::Forward, &[], 1), Err(Error::Cursor(_))));
        assert!(!scanner.slot().is_live());
        Ok(())
    }
}
