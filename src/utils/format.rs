use itertools::Itertools;

use crate::types::{Row, RowState, Value};

/// 键元组的字符串形式，用作刷新快照的索引
///
/// 带类型标记，`Int(1)` 与 `Text("1")`、`Float(1.0)` 互不相同。
pub fn key_string(key: &[Value]) -> String {
    key.iter().map(|v| format!("{v:?}")).join("\u{1f}")
}

/// 日志中展示的键元组，空元组表示绝对起点/终点
pub fn display_key(key: &[Value]) -> String {
    if key.is_empty() {
        return "<edge>".to_string();
    }
    format!("({})", key.iter().join(", "))
}

/// 行状态标记：`+` 新增，`-` 已删除
pub fn state_marker(state: RowState) -> char {
    match state {
        RowState::Normal => ' ',
        RowState::New => '+',
        RowState::Deleted => '-',
    }
}

/// 终端输出的一行，被修改的单元格以 `*` 开头
pub fn render_row(row: &Row) -> String {
    if row.is_sentinel() {
        return "~".to_string();
    }
    let cells = row
        .cells()
        .iter()
        .enumerate()
        .map(|(i, v)| if row.is_modified(i) { format!("*{v}") } else { v.to_string() })
        .join(" | ");
    format!("{} {cells}", state_marker(row.state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_string_is_type_tagged() {
        let a = key_string(&[Value::Int(1)]);
        assert_ne!(a, key_string(&[Value::from("1")]));
        assert_ne!(a, key_string(&[Value::Float(1.0)]));
        assert_eq!(a, key_string(&[Value::Int(1)]));
        // 分隔符不会与内容混淆
        assert_ne!(
            key_string(&[Value::from("a"), Value::from("b")]),
            key_string(&[Value::from("a\u{1f}b")])
        );
    }

    #[test]
    fn test_render_row() {
        let mut row = Row::with_state(vec![Value::Int(2), Value::from("x"), Value::Null], RowState::New);
        row.modified.insert(1);
        assert_eq!(render_row(&row), "+ 2 | *x | NULL");
        assert_eq!(render_row(&Row::sentinel()), "~");
        assert_eq!(display_key(&[]), "<edge>");
        assert_eq!(display_key(&[Value::Int(1), Value::from("a")]), "(1, a)");
    }
}
