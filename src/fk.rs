use std::fmt::{Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;
use tracing::debug;

use crate::db_error::{Error, Result};
use crate::relation::Relation;
use crate::storage::Engine;
use crate::types::Value;

/// 外键预览结果
#[derive(Clone, Debug, PartialEq)]
pub enum FkPreview {
    /// 目标行，按目标关系的属性顺序排列
    Found(Vec<(String, Value)>),
    NotFound,
}

impl FkPreview {
    pub fn get(&self, column: &str) -> Option<&Value> {
        match self {
            FkPreview::Found(cells) => cells.iter().find(|(name, _)| name == column).map(|(_, v)| v),
            FkPreview::NotFound => None,
        }
    }
}

/// 渲染为 `col=value, ...`
impl Display for FkPreview {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FkPreview::Found(cells) => write!(f, "{}", cells.iter().map(|(name, v)| format!("{name}={v}")).join(", ")),
            FkPreview::NotFound => write!(f, "not found"),
        }
    }
}

/// 外键解析器
///
/// 给定引用列的候选新值与同一行中其他列的值，按引用的列映射在目标关系上查一行。
/// 出错时返回 `FkResolve`，不会阻塞行编辑。
#[derive(Clone)]
pub struct FkResolver {
    engine: Arc<dyn Engine>,
    relation: Arc<Relation>,
}

impl FkResolver {
    pub fn new(engine: Arc<dyn Engine>, relation: Arc<Relation>) -> Self {
        Self { engine, relation }
    }

    pub fn preview(&self, row: &[Value], col: usize, new_value: Value) -> Result<FkPreview> {
        let relation = &self.relation;
        let attr = relation
            .attributes
            .get(col)
            .ok_or_else(|| Error::FkResolve(format!("column {col} out of range")))?;
        let reference = attr
            .reference
            .and_then(|i| relation.references.get(i))
            .ok_or_else(|| Error::FkResolve(format!("column {} is not a foreign key", attr.name)))?;
        let target = reference
            .target
            .as_ref()
            .ok_or_else(|| Error::FkResolve(format!("target {} is not loaded", reference.target_name)))?;

        let mut conds = Vec::with_capacity(reference.columns.len());
        let mut params = Vec::with_capacity(reference.columns.len());
        for (pos, target_col) in &reference.columns {
            let value = if *pos == col { new_value.clone() } else { row.get(*pos).cloned().unwrap_or(Value::Null) };
            // NULL 外键不引用任何行
            if value.is_null() {
                return Ok(FkPreview::NotFound);
            }
            conds.push(format!("{} = ?", target.quote_ident(target_col)));
            params.push(value);
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            target.select_list(),
            target.from_clause(),
            conds.join(" AND ")
        );
        debug!(target = %target.name, "fk preview: {sql}");
        let found = self.engine.query_row(&sql, &params).map_err(|e| e.into_fk())?;
        Ok(match found {
            Some(values) => FkPreview::Found(
                target.attributes.iter().map(|a| a.name.clone()).zip(values).collect(),
            ),
            None => FkPreview::NotFound,
        })
    }
}
