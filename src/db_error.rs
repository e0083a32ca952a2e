use serde::{Deserialize, Serialize};

/// 自定义错误信息
///
/// 行引擎对外只暴露这一种错误类型，调用方（UI 层）决定哪些展示给用户，
/// 哪些只进入日志。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// 关系既没有主键，也没有全部列 NOT NULL 的唯一索引，仅对该关系致命
    NoKeyableColumns(String),
    /// 关系无法被浏览（例如用户 SQL 未投影出底层表的主键）
    NotViewable(String),
    /// 元数据查询失败，打开关系的调用整体失败
    Catalog(String),
    /// 打开或扫描游标失败，游标被关闭，环形窗口保持调用前状态
    Cursor(String),
    /// 外键预览失败，非致命，只显示在状态栏
    FkResolve(String),
    /// 构建关系时外键目标表加载失败，对应的引用被丢弃
    MissingFkTarget {
        relation: String,
        target: String,
        reason: String,
    },
    /// 无效数据
    InvalidData(String),
    /// 无效输入（SQL 文本、枚举字面量等）
    InvalidInput(String),
    /// 文件IO错误
    IO(String),
    //配置错误
    ConfigError(String),
    /// 配置监听错误
    ConfigWatcherError(String),
    /// Mutex 锁错误
    MutexError(String),
    /// 会话已切换关系或关闭，后台结果被丢弃
    Cancelled,
}

/// 自定义错误类型
pub type Result<T> = std::result::Result<T, Error>;

/// 实现标准库std::error::Error特征
impl std::error::Error for Error {}

/// 实现格式输出
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NoKeyableColumns(name) => write!(f, "no keyable columns: {name}"),
            Error::NotViewable(msg) => write!(f, "not viewable: {msg}"),
            Error::Catalog(msg) => write!(f, "catalog error: {msg}"),
            Error::Cursor(msg) => write!(f, "cursor error: {msg}"),
            Error::FkResolve(msg) => write!(f, "foreign key lookup failed: {msg}"),
            Error::MissingFkTarget { relation, target, reason } => {
                write!(f, "reference {relation} -> {target} dropped: {reason}")
            }
            Error::InvalidData(msg) => write!(f, "invalid data:{msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input:{msg}"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
            Error::ConfigError(msg) => write!(f, "error: config error:{msg}"),
            Error::ConfigWatcherError(msg) => write!(f, "error: config watcher error:{msg}"),
            Error::MutexError(msg) => write!(f, "error: mutex error:{msg}"),
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl Error {
    /// 把驱动层错误归类为元数据错误。
    /// 驱动错误默认转换为 [`Error::Cursor`]，元数据加载路径用它改写分类。
    pub fn into_catalog(self) -> Error {
        match self {
            Error::Cursor(msg) | Error::InvalidData(msg) => Error::Catalog(msg),
            other => other,
        }
    }

    /// 把驱动层错误归类为外键预览错误
    pub fn into_fk(self) -> Error {
        match self {
            Error::Cursor(msg) | Error::InvalidData(msg) | Error::Catalog(msg) => Error::FkResolve(msg),
            other => other,
        }
    }
}

/// 构建一个结构体实例
/// an Error::InvalidData for the given format string.
#[macro_export]
macro_rules! errdata {
    ($($args:tt)*) => {
        $crate::db_error::Error::InvalidData(format!($($args)*))
    };
}

/// 构建 Err(Error::InvalidInput)，词法分析等输入校验使用
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => {
        Err($crate::db_error::Error::InvalidInput(format!($($args)*)))
    };
}

/// 构建 Error::Cursor
#[macro_export]
macro_rules! errcursor {
    ($($args:tt)*) => {
        $crate::db_error::Error::Cursor(format!($($args)*))
    };
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::ConfigWatcherError(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Cursor(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidData(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::MutexError(err.to_string())
    }
}
