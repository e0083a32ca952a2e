use serde::{Deserialize, Serialize};

/// 元数据层读到的一列
///
/// 由方言适配器按模式中的序号顺序返回。
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ColumnInfo {
    /// 列名 不可为空
    pub name: String,
    /// 方言声明的类型字符串，例如 `varchar(32)`
    pub type_name: String,
    /// 是否允许为空
    pub nullable: bool,
    /// 方言单独给出的长度（例如 `character_maximum_length`）
    pub declared_length: Option<u64>,
    /// 计算列、虚拟列或隐藏列，不可编辑
    pub read_only: bool,
    /// 自定义类型名（枚举、集合等）
    pub custom_type: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self { name: name.into(), type_name: type_name.into(), nullable, ..Default::default() }
    }
}

/// 一个索引（含主键）
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub primary: bool,
    pub unique: bool,
    /// 按索引内序号排列的列名
    pub columns: Vec<String>,
}

/// 一个外键约束
///
/// `columns` 中每一项为 (本表列名, 目标表列名)，按约束内序号排列；
/// 目标列名为空时按位置匹配目标表键的第 i 列。
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ForeignKeyInfo {
    pub constraint: String,
    pub target_table: String,
    pub columns: Vec<(String, String)>,
}

/// 关系中的一列，关系构建完成后不可变
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Attribute {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
    /// 枚举取值域，按声明顺序
    pub enum_values: Option<Vec<String>>,
    pub custom_type: Option<String>,
    /// 所属外键在关系引用列表中的下标，`None` 表示不是外键列
    pub reference: Option<usize>,
    pub read_only: bool,
}

impl From<ColumnInfo> for Attribute {
    fn from(col: ColumnInfo) -> Self {
        Self {
            name: col.name,
            type_name: col.type_name,
            nullable: col.nullable,
            enum_values: None,
            custom_type: col.custom_type,
            reference: None,
            read_only: col.read_only,
        }
    }
}
