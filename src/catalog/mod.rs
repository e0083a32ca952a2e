//! 方言感知的元数据层
//!
//! 每个方言适配器实现 [`Catalog`]，按方言标签注册到全局表中；
//! 引擎只在查找适配器时区分方言，其余代码与方言无关。

pub mod enum_parser;
mod info_schema;
pub mod key_selector;
mod pragma;
pub mod size;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use crate::db_error::{Error, Result};
use crate::storage::{Dialect, Engine};
use crate::types::{ColumnInfo, ForeignKeyInfo, IndexInfo};

pub use info_schema::InfoSchema;
pub use pragma::Pragma;

/// 元数据适配器
pub trait Catalog: Send + Sync {
    /// 按模式序号顺序返回全部列
    fn load_attributes(&self, engine: &dyn Engine, table: &str) -> Result<Vec<ColumnInfo>>;

    /// 主键与唯一/普通索引，列按索引内序号排列
    fn load_indexes(&self, engine: &dyn Engine, table: &str) -> Result<Vec<IndexInfo>>;

    /// 按约束分组、按序号排序的外键
    fn load_foreign_keys(&self, engine: &dyn Engine, table: &str) -> Result<Vec<ForeignKeyInfo>>;

    /// 列名 -> 枚举取值域
    fn load_enum_domains(&self, engine: &dyn Engine, table: &str) -> Result<HashMap<String, Vec<String>>>;

    /// 最短可用查找键，没有时返回空
    fn find_shortest_key(&self, engine: &dyn Engine, table: &str, text_fallback: u64) -> Result<Vec<String>> {
        let columns = self.load_attributes(engine, table)?;
        let indexes = self.load_indexes(engine, table)?;
        Ok(key_selector::select_key(&columns, &indexes, text_fallback))
    }

    /// 表的主键列（用户 SQL 构建关系时使用）
    fn primary_key(&self, engine: &dyn Engine, table: &str) -> Result<Vec<String>> {
        Ok(self
            .load_indexes(engine, table)?
            .into_iter()
            .find(|idx| idx.primary)
            .map(|idx| idx.columns)
            .unwrap_or_default())
    }
}

lazy_static! {
    /// 方言标签 -> 适配器
    static ref REGISTRY: RwLock<HashMap<Dialect, Arc<dyn Catalog>>> = {
        let mut adapters: HashMap<Dialect, Arc<dyn Catalog>> = HashMap::new();
        adapters.insert(Dialect::Standard, Arc::new(InfoSchema));
        adapters.insert(Dialect::Sqlite, Arc::new(Pragma));
        RwLock::new(adapters)
    };
}

/// 注册（或替换）某个方言的适配器
pub fn register(dialect: Dialect, adapter: Arc<dyn Catalog>) -> Result<()> {
    REGISTRY.write()?.insert(dialect, adapter);
    Ok(())
}

/// 按连接的方言标签查找适配器
pub fn adapter_for(dialect: Dialect) -> Result<Arc<dyn Catalog>> {
    REGISTRY
        .read()?
        .get(&dialect)
        .cloned()
        .ok_or_else(|| Error::Catalog(format!("no catalog adapter registered for dialect {dialect}")))
}

/// 以 (key, 行) 的顺序把相同键的相邻行合并，保持首次出现的顺序
pub(crate) fn group_ordered<K: PartialEq, T>(items: impl IntoIterator<Item = (K, T)>) -> Vec<(K, Vec<T>)> {
    let mut groups: Vec<(K, Vec<T>)> = Vec::new();
    for (key, item) in items {
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(item),
            None => groups.push((key, vec![item])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_adapters_registered() {
        assert!(adapter_for(Dialect::Standard).is_ok());
        assert!(adapter_for(Dialect::Sqlite).is_ok());
    }

    #[test]
    fn test_group_ordered() {
        let grouped = group_ordered(vec![("b", 1), ("a", 2), ("b", 3)]);
        assert_eq!(grouped, vec![("b", vec![1, 3]), ("a", vec![2])]);
    }
}
