use std::collections::HashMap;

use crate::catalog::{group_ordered, Catalog};
use crate::db_error::Result;
use crate::storage::Engine;
use crate::types::{ColumnInfo, ForeignKeyInfo, IndexInfo, Value};

// table_xinfo 是 table_info 的超集，多出的 hidden 列标记生成列/隐藏列
const TABLE_INFO_SQL: &str = "SELECT cid, name, type, \"notnull\", pk, hidden FROM pragma_table_xinfo(?) ORDER BY cid";
const INDEX_LIST_SQL: &str = "SELECT name, \"unique\", origin FROM pragma_index_list(?) ORDER BY name";
const INDEX_INFO_SQL: &str = "SELECT seqno, name FROM pragma_index_info(?) ORDER BY seqno";
const FOREIGN_KEY_LIST_SQL: &str = "SELECT id, seq, \"table\", \"from\", \"to\" FROM pragma_foreign_key_list(?) ORDER BY id, seq";

/// 嵌入式数据库 `PRAGMA` 方言适配器（SQLite）
#[derive(Clone, Copy, Debug, Default)]
pub struct Pragma;

fn text(row: &[Value], i: usize) -> String {
    row.get(i).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn int(row: &[Value], i: usize) -> i64 {
    row.get(i).and_then(Value::as_i64).unwrap_or(0)
}

impl Pragma {
    fn table_info(&self, engine: &dyn Engine, table: &str) -> Result<Vec<Vec<Value>>> {
        let rows = engine.query(TABLE_INFO_SQL, &[Value::from(table)]).map_err(|e| e.into_catalog())?;
        if rows.is_empty() {
            return Err(crate::db_error::Error::Catalog(format!("no such table: {table}")));
        }
        Ok(rows)
    }
}

impl Catalog for Pragma {
    fn load_attributes(&self, engine: &dyn Engine, table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self
            .table_info(engine, table)?
            .iter()
            .map(|row| ColumnInfo {
                name: text(row, 1),
                type_name: text(row, 2),
                nullable: int(row, 3) == 0,
                declared_length: None,
                read_only: int(row, 5) != 0,
                custom_type: None,
            })
            .collect())
    }

    fn load_indexes(&self, engine: &dyn Engine, table: &str) -> Result<Vec<IndexInfo>> {
        // 主键来自 table_info 的 pk 序号，INTEGER PRIMARY KEY 不会出现在 index_list 中
        let mut pk: Vec<(i64, String)> = self
            .table_info(engine, table)?
            .iter()
            .filter(|row| int(row, 4) > 0)
            .map(|row| (int(row, 4), text(row, 1)))
            .collect();
        pk.sort();
        let mut indexes = Vec::new();
        if !pk.is_empty() {
            indexes.push(IndexInfo {
                name: "PRIMARY".to_string(),
                primary: true,
                unique: true,
                columns: pk.into_iter().map(|(_, name)| name).collect(),
            });
        }
        let list = engine.query(INDEX_LIST_SQL, &[Value::from(table)]).map_err(|e| e.into_catalog())?;
        for row in &list {
            let name = text(row, 0);
            // 主键的自动索引已经由上面处理
            if text(row, 2) == "pk" {
                continue;
            }
            let info = engine.query(INDEX_INFO_SQL, &[Value::from(name.as_str())]).map_err(|e| e.into_catalog())?;
            // 表达式索引的列名为 NULL
            let columns: Option<Vec<String>> =
                info.iter().map(|r| r.get(1).and_then(Value::as_str).map(str::to_string)).collect();
            match columns {
                Some(columns) if !columns.is_empty() => {
                    indexes.push(IndexInfo { name, primary: false, unique: int(row, 1) != 0, columns })
                }
                _ => continue,
            }
        }
        Ok(indexes)
    }

    fn load_foreign_keys(&self, engine: &dyn Engine, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let rows = engine.query(FOREIGN_KEY_LIST_SQL, &[Value::from(table)]).map_err(|e| e.into_catalog())?;
        let entries = rows.iter().map(|row| (int(row, 0), (int(row, 1), text(row, 2), text(row, 3), text(row, 4))));
        Ok(group_ordered(entries)
            .into_iter()
            .filter_map(|(id, mut members)| {
                members.sort_by_key(|(seq, _, _, _)| *seq);
                let target_table = members.first()?.1.clone();
                // `to` 为 NULL 时按位置匹配目标表的键
                let columns = members.into_iter().map(|(_, _, from, to)| (from, to)).collect();
                Some(ForeignKeyInfo { constraint: format!("fk_{id}"), target_table, columns })
            })
            .collect())
    }

    fn load_enum_domains(&self, _engine: &dyn Engine, _table: &str) -> Result<HashMap<String, Vec<String>>> {
        // SQLite 没有枚举类型
        Ok(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::size::TEXT_SIZE_FALLBACK;
    use crate::db_error::Error;
    use crate::storage::SqliteEngine;

    fn open(schema: &str) -> Result<(tempfile::TempDir, SqliteEngine)> {
        let dir = tempfile::tempdir()?;
        let engine = SqliteEngine::open(dir.path().join("c.db"))?;
        engine.execute_batch(schema)?;
        Ok((dir, engine))
    }

    #[test]
    fn test_attributes_in_order() -> Result<()> {
        let (_dir, db) = open(
            "CREATE TABLE t (a INTEGER NOT NULL, b VARCHAR(10), c TEXT NOT NULL,
             d INTEGER GENERATED ALWAYS AS (a * 2) VIRTUAL)",
        )?;
        let cols = Pragma.load_attributes(&db, "t")?;
        let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert!(!cols[0].nullable && cols[1].nullable);
        assert_eq!(cols[1].type_name, "VARCHAR(10)");
        assert!(cols[3].read_only && !cols[0].read_only);
        Ok(())
    }

    #[test]
    fn test_missing_table() -> Result<()> {
        let (_dir, db) = open("CREATE TABLE t (a INTEGER)")?;
        assert!(matches!(Pragma.load_attributes(&db, "nope"), Err(Error::Catalog(_))));
        Ok(())
    }

    #[test]
    fn test_pk_preferred() -> Result<()> {
        let (_dir, db) = open("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL UNIQUE)")?;
        assert_eq!(Pragma.find_shortest_key(&db, "users", TEXT_SIZE_FALLBACK)?, vec!["id"]);
        Ok(())
    }

    #[test]
    fn test_composite_pk_order() -> Result<()> {
        let (_dir, db) = open("CREATE TABLE m (x TEXT, y INTEGER, z INTEGER, PRIMARY KEY (z, x))")?;
        assert_eq!(Pragma.find_shortest_key(&db, "m", TEXT_SIZE_FALLBACK)?, vec!["z", "x"]);
        Ok(())
    }

    #[test]
    fn test_not_null_unique_selected() -> Result<()> {
        let (_dir, db) = open(
            "CREATE TABLE t (a INTEGER NOT NULL, b INTEGER NOT NULL, c INTEGER);
             CREATE UNIQUE INDEX t_ab ON t (a, b);
             CREATE UNIQUE INDEX t_c ON t (c);",
        )?;
        assert_eq!(Pragma.find_shortest_key(&db, "t", TEXT_SIZE_FALLBACK)?, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_no_key() -> Result<()> {
        let (_dir, db) = open("CREATE TABLE t (a INTEGER, b TEXT); CREATE UNIQUE INDEX t_a ON t (a);")?;
        assert!(Pragma.find_shortest_key(&db, "t", TEXT_SIZE_FALLBACK)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_foreign_keys() -> Result<()> {
        let (_dir, db) = open(
            "CREATE TABLE users (id INTEGER PRIMARY KEY);
             CREATE TABLE pairs (a INTEGER, b INTEGER, PRIMARY KEY (a, b));
             CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                user_id INTEGER REFERENCES users(id),
                pa INTEGER, pb INTEGER,
                FOREIGN KEY (pa, pb) REFERENCES pairs);",
        )?;
        let mut fks = Pragma.load_foreign_keys(&db, "orders")?;
        fks.sort_by(|a, b| a.target_table.cmp(&b.target_table));
        assert_eq!(fks.len(), 2);
        assert_eq!(fks[0].target_table, "pairs");
        assert_eq!(fks[0].columns, vec![("pa".to_string(), String::new()), ("pb".to_string(), String::new())]);
        assert_eq!(fks[1].columns, vec![("user_id".to_string(), "id".to_string())]);
        Ok(())
    }
}
