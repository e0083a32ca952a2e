//! 刷新比对
//!
//! 以旧窗口为快照，与重新读取的同一窗口逐键比对：
//! - 两边都有的键输出新行，`modified` 记录取值不同的列；
//! - 只在旧快照中的键标记为 `Deleted`，下一次刷新时消失；
//! - 只在新结果中的键标记为 `New`。
//!
//! 旧快照中位于新结果范围之外的键（新结果没有读完且键大于新结果的最后一个键）
//! 只是滚出了视野，直接丢弃而不是标记删除。
//!
//! 删除行归并回去后可能超过窗口高度，超出的尾部不显示，也不计入统计；
//! 被截掉的新行留到下一次刷新时才第一次显示为 `New`。

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::types::{KeyTuple, Row, RowState, Value};
use crate::utils::key_string;

/// 一次刷新的统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub epoch: u64,
    pub new: usize,
    pub deleted: usize,
    pub modified: usize,
}

/// 发生变化的列下标，`Null` 只等于 `Null`
pub fn changed_columns(old: &[Value], new: &[Value]) -> BTreeSet<usize> {
    (0..old.len().max(new.len())).filter(|&i| old.get(i) != new.get(i)).collect()
}

/// 比对旧快照与新读取的行，返回按键排序的新窗口内容
///
/// `exhausted` 表示新结果在取满窗口之前已经读完，结果最多 `height` 行。
pub fn diff(
    old: &[Row],
    fresh: Vec<Vec<Value>>,
    key: &[usize],
    exhausted: bool,
    height: usize,
) -> (Vec<Row>, RefreshStats) {
    let key_of = |values: &[Value]| -> KeyTuple {
        key.iter().map(|&i| values.get(i).cloned().unwrap_or(Value::Null)).collect()
    };
    // 已标记删除的行不进入快照
    let snapshot: HashMap<String, &Row> = old
        .iter()
        .filter(|row| !row.is_sentinel() && row.state != RowState::Deleted)
        .map(|row| (key_string(&row.key(key)), row))
        .collect();
    let fresh_keys: HashSet<String> = fresh.iter().map(|values| key_string(&key_of(values))).collect();
    let horizon = fresh.last().map(|values| key_of(values));

    let mut current = Vec::with_capacity(fresh.len());
    for values in fresh {
        let row = match snapshot.get(&key_string(&key_of(&values))) {
            Some(previous) => {
                let mut row = Row::new(values);
                row.modified = changed_columns(previous.cells(), row.cells());
                row
            }
            None => Row::with_state(values, RowState::New),
        };
        current.push(row);
    }

    let deleted: Vec<Row> = old
        .iter()
        .filter(|row| !row.is_sentinel() && row.state != RowState::Deleted)
        .filter(|row| !fresh_keys.contains(&key_string(&row.key(key))))
        .filter(|row| exhausted || horizon.as_ref().is_some_and(|last| row.key(key) <= *last))
        .map(|row| Row::with_state(row.cells().to_vec(), RowState::Deleted))
        .collect();

    // 按键序把删除行归并回去，两边各自已经有序
    let mut merged = Vec::with_capacity(current.len() + deleted.len());
    let mut current = current.into_iter().peekable();
    let mut deleted = deleted.into_iter().peekable();
    while merged.len() < height {
        let take_deleted = match (current.peek(), deleted.peek()) {
            (Some(c), Some(d)) => d.key(key) < c.key(key),
            (None, Some(_)) => true,
            (_, None) => false,
        };
        let next = if take_deleted { deleted.next() } else { current.next() };
        match next {
            Some(row) => merged.push(row),
            None => break,
        }
    }
    let stats = RefreshStats {
        epoch: 0,
        new: merged.iter().filter(|row| row.state == RowState::New).count(),
        deleted: merged.iter().filter(|row| row.state == RowState::Deleted).count(),
        modified: merged.iter().filter(|row| !row.modified.is_empty()).count(),
    };
    (merged, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(k: i64, v: i64) -> Row {
        Row::new(vec![Value::Int(k), Value::Int(v)])
    }

    fn cells(k: i64, v: i64) -> Vec<Value> {
        vec![Value::Int(k), Value::Int(v)]
    }

    fn summary(rows: &[Row]) -> Vec<(i64, RowState, Vec<usize>)> {
        rows.iter()
            .map(|r| (r.cells()[0].as_i64().unwrap_or(-1), r.state, r.modified.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn test_refresh_classification() {
        let old = vec![row(1, 10), row(2, 20), row(3, 30)];
        let fresh = vec![cells(1, 10), cells(2, 25), cells(4, 40)];
        let (rows, stats) = diff(&old, fresh, &[0], true, 8);
        assert_eq!(
            summary(&rows),
            vec![
                (1, RowState::Normal, vec![]),
                (2, RowState::Normal, vec![1]),
                (3, RowState::Deleted, vec![]),
                (4, RowState::New, vec![]),
            ]
        );
        assert_eq!(stats, RefreshStats { epoch: 0, new: 1, deleted: 1, modified: 1 });
    }

    #[test]
    fn test_merged_rows_trimmed_to_height() {
        let old = vec![row(1, 10), row(2, 20), row(3, 30)];
        let fresh = vec![cells(1, 10), cells(2, 25), cells(4, 40)];
        let (rows, stats) = diff(&old, fresh.clone(), &[0], false, 3);
        // 4 放不下，不算新行
        assert_eq!(
            summary(&rows),
            vec![(1, RowState::Normal, vec![]), (2, RowState::Normal, vec![1]), (3, RowState::Deleted, vec![])]
        );
        assert_eq!(stats, RefreshStats { epoch: 0, new: 0, deleted: 1, modified: 1 });

        let (rows, stats) = diff(&rows, fresh, &[0], false, 3);
        assert_eq!(
            summary(&rows),
            vec![(1, RowState::Normal, vec![]), (2, RowState::Normal, vec![]), (4, RowState::New, vec![])]
        );
        assert_eq!(stats, RefreshStats { epoch: 0, new: 1, deleted: 0, modified: 0 });
    }

    #[test]
    fn test_deleted_within_horizon_when_not_exhausted() {
        let old = vec![row(1, 10), row(2, 20), row(3, 30), row(9, 90)];
        let fresh = vec![cells(1, 10), cells(2, 20), cells(4, 40)];
        let (rows, stats) = diff(&old, fresh, &[0], false, 8);
        // 9 滚出视野，不是删除
        assert_eq!(
            summary(&rows),
            vec![
                (1, RowState::Normal, vec![]),
                (2, RowState::Normal, vec![]),
                (3, RowState::Deleted, vec![]),
                (4, RowState::New, vec![]),
            ]
        );
        assert_eq!(stats.deleted, 1);
    }

    #[test]
    fn test_state_transitions() {
        let old = vec![
            Row::with_state(cells(1, 10), RowState::New),
            Row::with_state(cells(2, 20), RowState::Deleted),
            {
                let mut r = row(3, 30);
                r.modified.insert(1);
                r
            },
        ];
        let fresh = vec![cells(1, 10), cells(3, 30)];
        let (rows, stats) = diff(&old, fresh, &[0], true, 8);
        // New -> Normal，Deleted 消失，旧的修改标记不保留
        assert_eq!(summary(&rows), vec![(1, RowState::Normal, vec![]), (3, RowState::Normal, vec![])]);
        assert_eq!(stats, RefreshStats::default());
    }

    #[test]
    fn test_null_cells_not_modified() {
        let old = vec![Row::new(vec![Value::Int(1), Value::Null, Value::from("a")])];
        let fresh = vec![vec![Value::Int(1), Value::Null, Value::from("b")]];
        let (rows, _) = diff(&old, fresh, &[0], true, 8);
        assert_eq!(rows[0].modified, BTreeSet::from([2]));
        assert_eq!(changed_columns(&[Value::Null], &[Value::Int(0)]), BTreeSet::from([0]));
    }

    #[test]
    fn test_diff_completeness() {
        // 同一键空间上的多组新旧集合
        let cases: Vec<(Vec<i64>, Vec<i64>)> = vec![
            (vec![1, 2, 3, 4], vec![2, 4, 6]),
            (vec![], vec![1, 2]),
            (vec![5, 6], vec![]),
            (vec![1, 3, 5, 7], vec![1, 2, 3, 4, 5, 6, 7]),
        ];
        for (old_keys, new_keys) in cases {
            let old: Vec<Row> = old_keys.iter().map(|&k| row(k, k)).collect();
            let fresh: Vec<Vec<Value>> = new_keys.iter().map(|&k| cells(k, k * 2)).collect();
            let (rows, _) = diff(&old, fresh, &[0], true, 8);
            for r in &rows {
                let k = r.cells()[0].as_i64().unwrap_or(-1);
                let expected = match (old_keys.contains(&k), new_keys.contains(&k)) {
                    (true, true) => RowState::Normal,
                    (true, false) => RowState::Deleted,
                    (false, true) => RowState::New,
                    (false, false) => unreachable!(),
                };
                assert_eq!(r.state, expected, "key {k}");
                if expected == RowState::Normal {
                    let changed = if k == k * 2 { vec![] } else { vec![1] };
                    assert_eq!(r.modified.iter().copied().collect::<Vec<_>>(), changed);
                }
            }
            let mut all: Vec<i64> = old_keys.iter().chain(new_keys.iter()).copied().collect();
            all.sort();
            all.dedup();
            let got: Vec<i64> = rows.iter().filter_map(|r| r.cells()[0].as_i64()).collect();
            assert_eq!(got, all);
        }
    }
}
