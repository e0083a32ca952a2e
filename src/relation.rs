//! 关系：一个可查询的数据源（基表或用户 SQL）
//!
//! 关系在 (连接, 表名) 上构建一次，持有属性列表、键列下标和已解析的外键引用。
//! 外键目标关系在构建时一并构建，但只展开一层，目标关系自己的引用不再递归。

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::catalog::{self, key_selector};
use crate::db_error::{Error, Result};
use crate::sql;
use crate::storage::{Dialect, Engine};
use crate::types::{Attribute, ForeignKeyInfo, KeyTuple, Value};

// 用户 SQL 作为子查询时的别名
const SUBQUERY_ALIAS: &str = "gridview_q";

/// 关系的数据来源
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    Table,
    Sql(String),
}

/// 外键边
///
/// 目标关系只按名字识别，目标关系本身不再持有引用的展开结果，因此不会形成所有权环。
#[derive(Clone, Debug)]
pub struct Reference {
    pub constraint: String,
    pub target_name: String,
    /// 只在第一层展开，第二层的引用为 `None`
    pub target: Option<Arc<Relation>>,
    /// (本关系列下标, 目标关系列名)，按约束内序号排列
    pub columns: Vec<(usize, String)>,
}

#[derive(Clone, Debug)]
pub struct Relation {
    pub name: String,
    pub source: Source,
    pub dialect: Dialect,
    pub attributes: Vec<Attribute>,
    positions: HashMap<String, usize>,
    pub references: Vec<Reference>,
    /// 键列下标，保证唯一且每一列都非空
    pub key: Vec<usize>,
}

impl Relation {
    /// 按表名构建关系
    pub fn open(engine: &dyn Engine, name: &str, text_fallback: u64) -> Result<Relation> {
        Self::build(engine, name, text_fallback, true)
    }

    fn build(engine: &dyn Engine, name: &str, text_fallback: u64, expand: bool) -> Result<Relation> {
        let adapter = catalog::adapter_for(engine.dialect())?;
        let columns = adapter.load_attributes(engine, name)?;
        if columns.is_empty() {
            return Err(Error::Catalog(format!("relation {name} has no columns")));
        }
        let indexes = adapter.load_indexes(engine, name)?;
        let key_names = key_selector::select_key(&columns, &indexes, text_fallback);
        if key_names.is_empty() {
            return Err(Error::NoKeyableColumns(name.to_string()));
        }

        let mut attributes: Vec<Attribute> = columns.into_iter().map(Attribute::from).collect();
        let positions: HashMap<String, usize> =
            attributes.iter().enumerate().map(|(i, a)| (a.name.clone(), i)).collect();
        let key = key_names
            .iter()
            .map(|k| positions.get(k).copied().ok_or_else(|| Error::Catalog(format!("key column {k} not in {name}"))))
            .collect::<Result<Vec<usize>>>()?;

        for (column, values) in adapter.load_enum_domains(engine, name)? {
            if let Some(&i) = positions.get(&column) {
                attributes[i].enum_values = Some(values);
            }
        }

        let mut references = Vec::new();
        for fk in adapter.load_foreign_keys(engine, name)? {
            match Self::resolve_reference(engine, name, &positions, fk, text_fallback, expand) {
                Ok(reference) => {
                    for &(i, _) in &reference.columns {
                        attributes[i].reference = Some(references.len());
                    }
                    references.push(reference);
                }
                Err(err) => warn!(relation = name, "{err}"),
            }
        }

        info!(
            relation = name,
            key = %key_names.join(","),
            references = references.len(),
            "relation opened"
        );
        Ok(Relation {
            name: name.to_string(),
            source: Source::Table,
            dialect: engine.dialect(),
            attributes,
            positions,
            references,
            key,
        })
    }

    fn resolve_reference(
        engine: &dyn Engine,
        name: &str,
        positions: &HashMap<String, usize>,
        fk: ForeignKeyInfo,
        text_fallback: u64,
        expand: bool,
    ) -> Result<Reference> {
        let missing = |reason: String| Error::MissingFkTarget {
            relation: name.to_string(),
            target: fk.target_table.clone(),
            reason,
        };
        let target = if expand {
            let relation = Self::build(engine, &fk.target_table, text_fallback, false)
                .map_err(|err| missing(err.to_string()))?;
            Some(Arc::new(relation))
        } else {
            None
        };
        let mut columns = Vec::with_capacity(fk.columns.len());
        for (i, (from, to)) in fk.columns.iter().enumerate() {
            let &pos = positions.get(from).ok_or_else(|| missing(format!("unknown column {from}")))?;
            let to = match (&target, to.is_empty()) {
                // 目标列名为空时按位置匹配目标关系的第 i 个键列
                (Some(target), true) => target
                    .key
                    .get(i)
                    .map(|&k| target.attributes[k].name.clone())
                    .ok_or_else(|| missing(format!("no key column at position {i}")))?,
                _ => to.clone(),
            };
            columns.push((pos, to));
        }
        Ok(Reference { constraint: fk.constraint.clone(), target_name: fk.target_table.clone(), target, columns })
    }

    /// 由用户 SQL 构建关系
    ///
    /// 键为 FROM/JOIN 中出现的各表主键列的并集，这些列必须全部出现在投影中，
    /// 否则该关系不可浏览。
    pub fn open_sql(engine: &dyn Engine, query: &str) -> Result<Relation> {
        let adapter = catalog::adapter_for(engine.dialect())?;
        let names = engine.column_names(query).map_err(|e| e.into_catalog())?;
        if names.is_empty() {
            return Err(Error::Catalog(format!("query projects no columns: {query}")));
        }
        let tables = sql::source_tables(query)?;
        if tables.is_empty() {
            return Err(Error::NotViewable(format!("no source tables in query: {query}")));
        }

        let mut key = Vec::new();
        let mut owner: HashMap<usize, &str> = HashMap::new();
        let mut known = HashMap::new();
        for table in &tables {
            let pk = adapter.primary_key(engine, table)?;
            if pk.is_empty() {
                return Err(Error::NotViewable(format!("table {table} has no primary key")));
            }
            for column in &pk {
                let found: Vec<usize> = names.iter().positions(|n| n == column).collect();
                match found.as_slice() {
                    // 两张表的主键落在同一投影列上时，这一列不能区分连接后的行
                    [i] => match owner.insert(*i, table.as_str()) {
                        Some(other) => {
                            return Err(Error::NotViewable(format!(
                                "primary keys of {other} and {table} both resolve to projected column {column}"
                            )))
                        }
                        None => key.push(*i),
                    },
                    [] => return Err(Error::NotViewable(format!("primary key column {table}.{column} not projected"))),
                    _ => return Err(Error::NotViewable(format!("primary key column {column} is ambiguous"))),
                }
            }
            for col in adapter.load_attributes(engine, table)? {
                known.entry(col.name.clone()).or_insert(col);
            }
        }

        // 用户 SQL 的列一律只读
        let attributes: Vec<Attribute> = names
            .iter()
            .map(|n| {
                let mut attr = known.get(n).cloned().map(Attribute::from).unwrap_or_else(|| Attribute {
                    name: n.clone(),
                    type_name: String::new(),
                    nullable: true,
                    enum_values: None,
                    custom_type: None,
                    reference: None,
                    read_only: true,
                });
                attr.read_only = true;
                attr
            })
            .collect();
        let mut positions = HashMap::new();
        for (i, n) in names.iter().enumerate() {
            positions.entry(n.clone()).or_insert(i);
        }
        debug!(tables = %tables.join(","), "query relation opened");
        Ok(Relation {
            name: query.to_string(),
            source: Source::Sql(query.to_string()),
            dialect: engine.dialect(),
            attributes,
            positions,
            references: Vec::new(),
            key,
        })
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn key_names(&self) -> Vec<&str> {
        self.key.iter().map(|&i| self.attributes[i].name.as_str()).collect()
    }

    /// 计算列、隐藏列以及用户 SQL 的列不可编辑
    pub fn is_column_editable(&self, i: usize) -> bool {
        match self.source {
            Source::Sql(_) => false,
            Source::Table => self.attributes.get(i).is_some_and(|a| !a.read_only),
        }
    }

    /// 抽取一行的键元组
    pub fn key_of(&self, values: &[Value]) -> KeyTuple {
        self.key.iter().map(|&i| values.get(i).cloned().unwrap_or(Value::Null)).collect()
    }

    pub fn quote_ident(&self, ident: &str) -> String {
        self.dialect.quote(ident)
    }

    /// 游标查询中 FROM 之后的部分
    pub fn from_clause(&self) -> String {
        match &self.source {
            Source::Table => self.quote_ident(&self.name),
            Source::Sql(query) => format!("({}) AS {SUBQUERY_ALIAS}", query.trim().trim_end_matches(';')),
        }
    }

    /// 全部属性的投影列表
    pub fn select_list(&self) -> String {
        self.attributes.iter().map(|a| self.quote_ident(&a.name)).join(", ")
    }
}
