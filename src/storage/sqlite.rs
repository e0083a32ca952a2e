//! 基于 rusqlite 的连接实现
//!
//! 元数据查询与外键预览共用一个受互斥锁保护的主连接；
//! 每个游标在独立线程上持有自己的连接和语句，通过容量为 1 的通道逐行交付，
//! 接收端被 drop 时线程退出、语句被终结。

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, ToSql};
use tracing::debug;

use crate::db_error::{Error, Result};
use crate::storage::engine::{Dialect, Engine, RowStream};
use crate::types::Value;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite 连接
pub struct SqliteEngine {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteEngine {
    /// 打开（或创建）数据库文件
    ///
    /// 使用 WAL 模式，游标线程的读取不会阻塞主连接上的写入。
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = open_connection(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { path, conn: Mutex::new(conn) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 在主连接上执行语句，返回受影响的行数
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let conn = self.conn.lock()?;
        Ok(conn.execute(sql, params_from_iter(params.iter()))?)
    }

    /// 执行多条语句（建表脚本等）
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.conn.lock()?;
        Ok(conn.execute_batch(sql)?)
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// SQLite 的存储类直接映射到单元格变体
fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

fn read_row(row: &rusqlite::Row<'_>, width: usize) -> Result<Vec<Value>> {
    (0..width).map(|i| Ok(read_value(row.get_ref(i)?))).collect()
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Int(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(*b as i64)),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Text(s) | Value::Timestamp(s) | Value::Decimal(s) | Value::Custom(s) => {
                ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))
            }
        })
    }
}

impl Engine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(read_row(row, width)?);
        }
        Ok(result)
    }

    fn open_stream(&self, sql: &str, params: &[Value]) -> Result<Box<dyn RowStream>> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
        let (row_tx, row_rx) = mpsc::sync_channel::<Result<Vec<Value>>>(1);
        let path = self.path.clone();
        let sql = sql.to_string();
        let params = params.to_vec();
        thread::Builder::new()
            .name("sqlite-cursor".to_string())
            .spawn(move || stream_rows(path, sql, params, ready_tx, row_tx))?;
        // 等待语句准备完成，打开失败在这里同步返回
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(SqliteStream { rows: row_rx, done: false })),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(crate::errcursor!("cursor thread exited before the statement was prepared")),
        }
    }

    fn column_names(&self, sql: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock()?;
        let stmt = conn.prepare(sql)?;
        Ok(stmt.column_names().into_iter().map(str::to_string).collect())
    }
}

/// 游标线程主体
fn stream_rows(
    path: PathBuf,
    sql: String,
    params: Vec<Value>,
    ready: SyncSender<Result<()>>,
    rows_tx: SyncSender<Result<Vec<Value>>>,
) {
    let conn = match open_connection(&path) {
        Ok(conn) => conn,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    let mut stmt = match conn.prepare(&sql) {
        Ok(stmt) => stmt,
        Err(err) => {
            let _ = ready.send(Err(err.into()));
            return;
        }
    };
    let width = stmt.column_count();
    let mut rows = match stmt.query(params_from_iter(params.iter())) {
        Ok(rows) => rows,
        Err(err) => {
            let _ = ready.send(Err(err.into()));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }
    loop {
        let item = match rows.next() {
            Ok(Some(row)) => read_row(row, width),
            Ok(None) => break,
            Err(err) => Err(Error::from(err)),
        };
        let failed = item.is_err();
        // 接收端已关闭：游标被关闭，结束线程并终结语句
        if rows_tx.send(item).is_err() || failed {
            break;
        }
    }
    debug!("sqlite cursor stream finished");
}

/// 游标线程的接收端
struct SqliteStream {
    rows: Receiver<Result<Vec<Value>>>,
    done: bool,
}

impl Iterator for SqliteStream {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.rows.recv() {
            Ok(Ok(row)) => Some(Ok(row)),
            Ok(Err(err)) => {
                self.done = true;
                Some(Err(err))
            }
            // 发送端关闭即结果读完
            Err(_) => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Result<(tempfile::TempDir, SqliteEngine)> {
        let dir = tempfile::tempdir()?;
        let engine = SqliteEngine::open(dir.path().join("t.db"))?;
        engine.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL, data BLOB);
             INSERT INTO t VALUES (1, 'a', 1.5, x'01'), (2, NULL, NULL, NULL), (3, 'c', 3.0, NULL);",
        )?;
        Ok((dir, engine))
    }

    #[test]
    fn test_query_values() -> Result<()> {
        let (_dir, engine) = sample()?;
        let rows = engine.query("SELECT id, name, score, data FROM t WHERE id = ?", &[Value::Int(1)])?;
        assert_eq!(
            rows,
            vec![vec![Value::Int(1), Value::from("a"), Value::Float(1.5), Value::Blob(vec![1])]]
        );
        Ok(())
    }

    #[test]
    fn test_stream_is_lazy_and_ends() -> Result<()> {
        let (_dir, engine) = sample()?;
        let mut stream = engine.open_stream("SELECT id FROM t ORDER BY id DESC", &[])?;
        assert_eq!(stream.next_row()?, Some(vec![Value::Int(3)]));
        assert_eq!(stream.next_row()?, Some(vec![Value::Int(2)]));
        assert_eq!(stream.next_row()?, Some(vec![Value::Int(1)]));
        assert_eq!(stream.next_row()?, None);
        assert_eq!(stream.next_row()?, None);
        Ok(())
    }

    #[test]
    fn test_stream_open_error() -> Result<()> {
        let (_dir, engine) = sample()?;
        let err = engine.open_stream("SELECT nope FROM t", &[]).err();
        assert!(matches!(err, Some(Error::Cursor(_))));
        Ok(())
    }

    #[test]
    fn test_write_while_stream_open() -> Result<()> {
        let (_dir, engine) = sample()?;
        let mut stream = engine.open_stream("SELECT id FROM t ORDER BY id", &[])?;
        assert_eq!(stream.next_row()?, Some(vec![Value::Int(1)]));
        engine.execute("UPDATE t SET name = ? WHERE id = ?", &[Value::from("z"), Value::Int(3)])?;
        drop(stream);
        let rows = engine.query("SELECT name FROM t WHERE id = 3", &[])?;
        assert_eq!(rows, vec![vec![Value::from("z")]]);
        Ok(())
    }

    #[test]
    fn test_column_names() -> Result<()> {
        let (_dir, engine) = sample()?;
        assert_eq!(engine.column_names("SELECT id, name AS n FROM t")?, vec!["id", "n"]);
        Ok(())
    }
}
