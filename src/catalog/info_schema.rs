use std::collections::HashMap;

use tracing::warn;

use crate::catalog::{enum_parser, group_ordered, Catalog};
use crate::db_error::Result;
use crate::storage::Engine;
use crate::types::{ColumnInfo, ForeignKeyInfo, IndexInfo, Value};

const COLUMNS_SQL: &str = "SELECT column_name, data_type, is_nullable, character_maximum_length, column_type, extra \
     FROM information_schema.columns \
     WHERE table_schema = DATABASE() AND table_name = ? \
     ORDER BY ordinal_position";

const STATISTICS_SQL: &str = "SELECT index_name, non_unique, column_name, seq_in_index \
     FROM information_schema.statistics \
     WHERE table_schema = DATABASE() AND table_name = ? \
     ORDER BY index_name, seq_in_index";

const KEY_COLUMN_USAGE_SQL: &str =
    "SELECT constraint_name, column_name, referenced_table_name, referenced_column_name, ordinal_position \
     FROM information_schema.key_column_usage \
     WHERE table_schema = DATABASE() AND table_name = ? AND referenced_table_name IS NOT NULL \
     ORDER BY constraint_name, ordinal_position";

const ENUM_SQL: &str = "SELECT column_name, column_type \
     FROM information_schema.columns \
     WHERE table_schema = DATABASE() AND table_name = ? AND data_type IN ('enum', 'set') \
     ORDER BY ordinal_position";

/// SQL 标准 `information_schema` 方言适配器（MySQL/MariaDB 一族）
#[derive(Clone, Copy, Debug, Default)]
pub struct InfoSchema;

fn text(row: &[Value], i: usize) -> String {
    row.get(i).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn int(row: &[Value], i: usize) -> Option<i64> {
    row.get(i).and_then(Value::as_i64)
}

impl Catalog for InfoSchema {
    fn load_attributes(&self, engine: &dyn Engine, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = engine.query(COLUMNS_SQL, &[Value::from(table)]).map_err(|e| e.into_catalog())?;
        Ok(rows
            .iter()
            .map(|row| {
                let data_type = text(row, 1).to_ascii_lowercase();
                let column_type = text(row, 4);
                let extra = text(row, 5).to_ascii_uppercase();
                ColumnInfo {
                    name: text(row, 0),
                    type_name: if column_type.is_empty() { data_type.clone() } else { column_type },
                    nullable: text(row, 2).eq_ignore_ascii_case("YES"),
                    declared_length: int(row, 3).and_then(|n| u64::try_from(n).ok()),
                    // DEFAULT_GENERATED 只是带表达式默认值的普通列
                    read_only: extra.contains("VIRTUAL GENERATED") || extra.contains("STORED GENERATED"),
                    custom_type: matches!(data_type.as_str(), "enum" | "set").then_some(data_type),
                }
            })
            .collect())
    }

    fn load_indexes(&self, engine: &dyn Engine, table: &str) -> Result<Vec<IndexInfo>> {
        let rows = engine.query(STATISTICS_SQL, &[Value::from(table)]).map_err(|e| e.into_catalog())?;
        let entries = rows.iter().map(|row| (text(row, 0), (int(row, 1), row.get(2).cloned(), int(row, 3))));
        let mut indexes = Vec::new();
        for (name, mut members) in group_ordered(entries) {
            members.sort_by_key(|(_, _, seq)| *seq);
            // 函数索引的 column_name 为 NULL，无法作为键
            let columns: Option<Vec<String>> =
                members.iter().map(|(_, col, _)| col.as_ref().and_then(Value::as_str).map(str::to_string)).collect();
            let Some(columns) = columns else { continue };
            let unique = members.iter().all(|(non_unique, _, _)| *non_unique == Some(0));
            indexes.push(IndexInfo { primary: name == "PRIMARY", unique, name, columns });
        }
        Ok(indexes)
    }

    fn load_foreign_keys(&self, engine: &dyn Engine, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let rows = engine.query(KEY_COLUMN_USAGE_SQL, &[Value::from(table)]).map_err(|e| e.into_catalog())?;
        let entries = rows
            .iter()
            .map(|row| (text(row, 0), (int(row, 4).unwrap_or(0), text(row, 1), text(row, 2), text(row, 3))));
        Ok(group_ordered(entries)
            .into_iter()
            .filter_map(|(constraint, mut members)| {
                members.sort_by_key(|(ordinal, _, _, _)| *ordinal);
                let target_table = members.first()?.2.clone();
                let columns = members.into_iter().map(|(_, from, _, to)| (from, to)).collect();
                Some(ForeignKeyInfo { constraint, target_table, columns })
            })
            .collect())
    }

    fn load_enum_domains(&self, engine: &dyn Engine, table: &str) -> Result<HashMap<String, Vec<String>>> {
        let rows = engine.query(ENUM_SQL, &[Value::from(table)]).map_err(|e| e.into_catalog())?;
        let mut domains = HashMap::new();
        for row in &rows {
            let column = text(row, 0);
            match enum_parser::parse(&text(row, 1)) {
                Ok(values) => {
                    domains.insert(column, values);
                }
                Err(err) => warn!(table, column = %column, "unparsable enum domain: {err}"),
            }
        }
        Ok(domains)
    }
}
