pub mod lexer;

use crate::db_error::Result;
use lexer::{Keyword, Lexer, Token};

/// 找出查询语句引用的来源表
///
/// 扫描 `FROM` 与 `JOIN` 之后的表名（`FROM a, b` 形式的逗号列表也会被识别），
/// `schema.table` 只保留表名，子查询 `FROM (...)` 跳过但会继续扫描其内部。
/// 结果按首次出现的顺序去重。
pub fn source_tables(sql: &str) -> Result<Vec<String>> {
    let tokens = Lexer::new(sql).collect::<Result<Vec<Token>>>()?;
    let mut tables: Vec<String> = Vec::new();
    // 当前是否处于 FROM 子句的表列表中
    let mut in_from = false;
    let mut expect_table = false;
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Keyword(Keyword::From) | Token::Keyword(Keyword::Join) => {
                in_from = matches!(tokens[i], Token::Keyword(Keyword::From)) || in_from;
                expect_table = true;
            }
            Token::Identifier(name) if expect_table => {
                let mut name = name.clone();
                // schema.table
                while let (Some(Token::Period), Some(Token::Identifier(next))) = (tokens.get(i + 1), tokens.get(i + 2)) {
                    name = next.clone();
                    i += 2;
                }
                if !tables.contains(&name) {
                    tables.push(name);
                }
                expect_table = false;
            }
            Token::Comma if in_from => expect_table = true,
            Token::OpenParen => expect_table = false,
            Token::Keyword(
                Keyword::Where
                | Keyword::Group
                | Keyword::Order
                | Keyword::Limit
                | Keyword::Having
                | Keyword::Union
                | Keyword::Except
                | Keyword::Intersect
                | Keyword::Window
                | Keyword::Select,
            )
            | Token::CloseParen => {
                in_from = false;
                expect_table = false;
            }
            _ => expect_table = false,
        }
        i += 1;
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_table() -> Result<()> {
        assert_eq!(source_tables("SELECT * FROM users WHERE id > 3")?, vec!["users"]);
        Ok(())
    }

    #[test]
    fn test_joins_and_aliases() -> Result<()> {
        let sql = "SELECT u.id, o.id AS oid FROM main.users u
                   LEFT OUTER JOIN \"Orders\" AS o ON o.user_id = u.id
                   JOIN users u2 ON u2.id = u.id ORDER BY u.id";
        assert_eq!(source_tables(sql)?, vec!["users", "Orders"]);
        Ok(())
    }

    #[test]
    fn test_comma_list_and_subquery() -> Result<()> {
        let sql = "SELECT * FROM a, b x, (SELECT * FROM c) s WHERE a.id = b.id";
        assert_eq!(source_tables(sql)?, vec!["a", "b", "c"]);
        Ok(())
    }
}
