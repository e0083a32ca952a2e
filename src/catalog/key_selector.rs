use itertools::Itertools;
use tracing::debug;

use crate::catalog::size;
use crate::types::{ColumnInfo, IndexInfo};

/// 候选键的排序依据：(列数, 总字节数, 索引名)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate<'a> {
    num_cols: usize,
    total_bytes: u64,
    name: &'a str,
    columns: &'a [String],
}

/// 选出最短的可用查找键
///
/// 1. 主键存在且非空时直接返回主键列（按声明序号），即使唯一索引更窄也优先主键；
/// 2. 否则枚举所有非主键的唯一索引，丢弃包含可空列（或未知列）的索引；
/// 3. 按 (列数, 总字节数, 索引名) 升序排序，取第一个。
///
/// 没有可用键时返回空，调用方必须拒绝打开该关系。
pub fn select_key(columns: &[ColumnInfo], indexes: &[IndexInfo], text_fallback: u64) -> Vec<String> {
    if let Some(pk) = indexes.iter().find(|idx| idx.primary && !idx.columns.is_empty()) {
        return pk.columns.clone();
    }
    let width = |name: &str| -> Option<u64> {
        let col = columns.iter().find(|c| c.name == name)?;
        // 可空列无法用于可靠的键集分页
        (!col.nullable).then(|| size::estimate(&col.type_name, col.declared_length, text_fallback))
    };
    let best = indexes
        .iter()
        .filter(|idx| idx.unique && !idx.primary && !idx.columns.is_empty())
        .filter_map(|idx| {
            let total_bytes = idx.columns.iter().map(|c| width(c.as_str())).sum::<Option<u64>>()?;
            Some(Candidate { num_cols: idx.columns.len(), total_bytes, name: &idx.name, columns: &idx.columns })
        })
        .sorted()
        .next();
    match best {
        Some(candidate) => {
            debug!(index = candidate.name, bytes = candidate.total_bytes, "unique index chosen as key");
            candidate.columns.to_vec()
        }
        None => Vec::new(),
    }
}
