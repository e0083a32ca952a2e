/// 无界文本/二进制列的默认字节成本：1 MiB
pub const TEXT_SIZE_FALLBACK: u64 = 1024 * 1024;

/// 估算一列的字节宽度，只用于候选键之间打破平局
///
/// 按类型族做大小写不敏感的子串匹配，匹配顺序有讲究：
/// `bigint`/`smallint`/`tinyint` 先于 `int`，`timestamp` 归入时间族，`varchar` 归入字符族。
/// 文本类优先使用声明长度，其次是类型串里的 `(N)`，都没有时取 `text_fallback`，
/// 使无界文本列在比较中总是落败。
pub fn estimate(type_name: &str, declared_length: Option<u64>, text_fallback: u64) -> u64 {
    let t = type_name.to_ascii_lowercase();
    let has = |needle: &str| t.contains(needle);
    if has("tinyint") {
        1
    } else if has("smallint") {
        2
    } else if has("bigint") {
        8
    } else if has("int") {
        4
    } else if has("real") || has("double") || has("float") {
        8
    } else if has("bool") {
        1
    } else if has("uuid") {
        16
    } else if has("date") || has("time") {
        8
    } else if has("decimal") || has("numeric") {
        16
    } else if has("char") || has("text") || has("clob") {
        declared_length.or_else(|| parse_length(&t)).unwrap_or(text_fallback)
    } else if has("blob") || has("bytea") || has("binary") {
        text_fallback
    } else {
        8
    }
}

/// 解析类型串中的 `(N)`，例如 `varchar(32)`
fn parse_length(type_name: &str) -> Option<u64> {
    let start = type_name.find('(')?;
    let end = type_name[start..].find(')')? + start;
    type_name[start + 1..end].split(',').next()?.trim().parse().ok()
}
