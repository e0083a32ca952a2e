use std::sync::Mutex;

use tracing::debug;

use crate::db_error::Result;
use crate::storage::engine::{Dialect, Engine, RowStream};
use crate::types::Value;

/// 一条预置的应答：SQL 文本包含 `pattern`（且参数匹配时）返回 `rows`
#[derive(Clone, Debug)]
struct Script {
    pattern: String,
    params: Option<Vec<Value>>,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

// 实现内存引擎
// 按子串匹配语句返回预置结果，用来在没有数据库服务的情况下驱动方言适配器和外键预览
pub struct Memory {
    dialect: Dialect,
    scripts: Mutex<Vec<Script>>,
    executed: Mutex<Vec<(String, Vec<Value>)>>,
}

impl Memory {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect, scripts: Mutex::new(Vec::new()), executed: Mutex::new(Vec::new()) }
    }

    /// 预置应答，后注册的优先匹配
    pub fn on(&self, pattern: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        self.push(Script { pattern: pattern.to_string(), params: None, columns: Vec::new(), rows })
    }

    /// 预置只在参数完全相同时生效的应答
    pub fn on_params(&self, pattern: &str, params: Vec<Value>, rows: Vec<Vec<Value>>) -> Result<()> {
        self.push(Script { pattern: pattern.to_string(), params: Some(params), columns: Vec::new(), rows })
    }

    /// 预置投影列名
    pub fn on_columns(&self, pattern: &str, columns: &[&str]) -> Result<()> {
        self.push(Script {
            pattern: pattern.to_string(),
            params: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        })
    }

    fn push(&self, script: Script) -> Result<()> {
        self.scripts.lock()?.push(script);
        Ok(())
    }

    /// 已执行过的语句与参数
    pub fn executed(&self) -> Result<Vec<(String, Vec<Value>)>> {
        Ok(self.executed.lock()?.clone())
    }

    fn lookup(&self, sql: &str, params: &[Value]) -> Result<Option<Script>> {
        self.executed.lock()?.push((sql.to_string(), params.to_vec()));
        let scripts = self.scripts.lock()?;
        let found = scripts
            .iter()
            .rev()
            .find(|s| sql.contains(&s.pattern) && s.params.as_deref().map_or(true, |p| p == params))
            .cloned();
        if found.is_none() {
            debug!("memory engine: no script for {sql}");
        }
        Ok(found)
    }
}

impl Engine for Memory {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        Ok(self.lookup(sql, params)?.map(|s| s.rows).unwrap_or_default())
    }

    fn open_stream(&self, sql: &str, params: &[Value]) -> Result<Box<dyn RowStream>> {
        let rows = self.query(sql, params)?;
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn column_names(&self, sql: &str) -> Result<Vec<String>> {
        Ok(self.lookup(sql, &[])?.map(|s| s.columns).unwrap_or_default())
    }
}
