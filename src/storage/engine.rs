use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db_error::{Error, Result};
use crate::types::Value;

/// 方言标签，挂在打开的连接上，元数据适配器按它注册与查找
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// 基于 SQL 标准 `information_schema` 的方言族（MySQL/MariaDB 等）
    Standard,
    /// 基于 `PRAGMA` 的嵌入式数据库（SQLite）
    Sqlite,
}

impl Dialect {
    /// 引用标识符
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::Standard => format!("`{}`", ident.replace('`', "``")),
            Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}

impl Display for Dialect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Standard => write!(f, "standard"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "mysql" | "mariadb" => Ok(Dialect::Standard),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => crate::errinput!("unknown dialect {other}"),
        }
    }
}

/// Engine trait
/// 定义一个活动数据库连接的通用行为
///
/// 连接句柄被所有后台任务共享，实现需要自己串行化同一连接上的语句
/// 或者透明地管理连接池。
pub trait Engine: Send + Sync {
    /// 连接的方言标签
    fn dialect(&self) -> Dialect;

    // 执行查询并一次性取回全部结果，元数据查询与外键预览使用
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>>;

    // 打开一个惰性结果流，游标使用
    fn open_stream(&self, sql: &str, params: &[Value]) -> Result<Box<dyn RowStream>>;

    // 查询投影出的列名，用户 SQL 构建关系时使用
    fn column_names(&self, sql: &str) -> Result<Vec<String>>;

    // 只取第一行
    fn query_row(&self, sql: &str, params: &[Value]) -> Result<Option<Vec<Value>>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

/// RowStream 是服务端结果流的句柄
///
/// 结果流在被 drop 时关闭，保证每个流只关闭一次。
pub trait RowStream: Send {
    /// 读取下一行，`Ok(None)` 表示结果已读完
    fn next_row(&mut self) -> Result<Option<Vec<Value>>>;
}

/// 为任意行迭代器实现 RowStream，内存引擎与测试使用
impl<I> RowStream for I
where
    I: Iterator<Item = Result<Vec<Value>>> + Send,
{
    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        self.next().transpose()
    }
}
