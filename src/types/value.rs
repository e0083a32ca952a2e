//! # 单元格值与行模块概览
//!
//! 单元格的运行时类型在扫描前是未知的，因此用带标签的 [`Value`] 承载，
//! 由各个方言适配器/驱动负责把原始数据分类到具体的变体。
//!
//! ## 主要组成
//! - `Value`：`Null`/`Int`/`Float`/`Text`/`Blob`/`Bool`/`Timestamp`/`Decimal`/`Custom`。
//!   - **等价语义**：同变体内按值比较，`Null == Null`（与 SQL 不同），
//!     这样刷新比对时未变化的 NULL 单元格不会被误标记为已修改；
//!     浮点按位比较，`NaN == NaN`。
//!   - **排序语义**：定义跨类型的全序
//!     `Null < Bool < 数值 < 文本类 < Blob`，`Int` 与 `Float` 混合时按 `f64::total_cmp` 比较，
//!     数值相等时再按变体排序，保证与 `Eq` 一致。该顺序只用于窗口的自检。
//! - `RowState`：`Normal`/`New`/`Deleted`。
//! - `Row`：状态 + 单元格值 + 上次刷新标记的已修改列；值为空时是哨兵行。
//! - `KeyTuple`：按键列顺序排列的值。

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// 单元格值
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
    /// 时间戳保持数据库给出的文本形式
    Timestamp(String),
    /// 定点数保持文本形式，避免精度损失
    Decimal(String),
    /// 方言自定义类型（枚举、几何等）的文本形式
    Custom(String),
}

/// 键元组：按关系键列顺序排列的值
pub type KeyTuple = Vec<Value>;

impl Value {
    /// 跨类型比较时的分组序号
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) | Value::Timestamp(_) | Value::Decimal(_) | Value::Custom(_) => 3,
            Value::Blob(_) => 4,
        }
    }

    /// 同组内部的变体序号，用于打破平局
    fn variant(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
            Value::Timestamp(_) => 5,
            Value::Decimal(_) => 6,
            Value::Custom(_) => 7,
            Value::Blob(_) => 8,
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Timestamp(s) | Value::Decimal(s) | Value::Custom(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// 以字符串读取（元数据查询结果常用）
    pub fn as_str(&self) -> Option<&str> {
        self.text()
    }

    /// 以整数读取；文本形式的数字也接受，不同驱动对元数据列的类型并不统一
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) | Value::Decimal(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Custom(a), Value::Custom(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_rank = self.rank().cmp(&other.rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        let by_value = match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (a, b) => match (a.text(), b.text()) {
                (Some(a), Some(b)) => a.cmp(b),
                _ => Ordering::Equal,
            },
        };
        by_value.then_with(|| self.variant().cmp(&other.variant()))
    }
}

/// 实现格式化打印，UI 与命令行直接使用
impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) | Value::Timestamp(s) | Value::Decimal(s) | Value::Custom(s) => write!(f, "{s}"),
            Value::Blob(b) => write!(f, "x'{}'", hex::encode(b)),
            Value::Bool(true) => write!(f, "TRUE"),
            Value::Bool(false) => write!(f, "FALSE"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// 行状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowState {
    #[default]
    Normal,
    /// 上次刷新新出现的行
    New,
    /// 上次刷新已消失的行，下一次刷新后移除
    Deleted,
}

/// 环形窗口中的一行
///
/// `values` 为 `None` 时表示哨兵：窗口中"此处再无数据"。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub state: RowState,
    pub values: Option<Vec<Value>>,
    /// 上一次刷新中值发生变化的列下标
    pub modified: BTreeSet<usize>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { state: RowState::Normal, values: Some(values), modified: BTreeSet::new() }
    }

    pub fn with_state(values: Vec<Value>, state: RowState) -> Self {
        Self { state, values: Some(values), modified: BTreeSet::new() }
    }

    /// 哨兵行
    pub fn sentinel() -> Self {
        Self::default()
    }

    pub fn is_sentinel(&self) -> bool {
        self.values.is_none()
    }

    pub fn cells(&self) -> &[Value] {
        self.values.as_deref().unwrap_or(&[])
    }

    /// 按键列下标抽取键元组
    pub fn key(&self, key: &[usize]) -> KeyTuple {
        let cells = self.cells();
        key.iter().map(|&i| cells.get(i).cloned().unwrap_or(Value::Null)).collect()
    }

    pub fn is_modified(&self, col: usize) -> bool {
        self.modified.contains(&col)
    }
}
