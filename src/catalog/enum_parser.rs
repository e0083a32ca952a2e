//! 枚举字面量解析
//!
//! `information_schema.columns.column_type` 中枚举列的形式为
//! `enum('active','in\'active','pending')`，复用 SQL 词法分析器并打开反斜杠转义。

use crate::db_error::Result;
use crate::errinput;
use crate::sql::lexer::{Keyword, Lexer, Token};

/// 解析 `enum(...)` / `set(...)` 字面量，返回按声明顺序排列的原始取值
pub fn parse(input: &str) -> Result<Vec<String>> {
    let mut lexer = Lexer::with_backslash_escapes(input);
    match lexer.next().transpose()? {
        Some(Token::Keyword(Keyword::Enum)) | Some(Token::Keyword(Keyword::Set)) => {}
        other => return errinput!("expected enum(...), found {}", describe(other)),
    }
    expect(&mut lexer, Token::OpenParen)?;
    let mut values = Vec::new();
    // 允许空枚举 enum()
    loop {
        match lexer.next().transpose()? {
            Some(Token::String(value)) => values.push(value),
            Some(Token::CloseParen) if values.is_empty() => break,
            other => return errinput!("expected quoted enum value, found {}", describe(other)),
        }
        match lexer.next().transpose()? {
            Some(Token::Comma) => continue,
            Some(Token::CloseParen) => break,
            other => return errinput!("expected , or ), found {}", describe(other)),
        }
    }
    if let Some(token) = lexer.next().transpose()? {
        return errinput!("unexpected trailing token {token}");
    }
    Ok(values)
}

/// 生成与 [`parse`] 相对应的字面量
pub fn render(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("'{}'", v.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect();
    format!("enum({})", quoted.join(","))
}

fn expect(lexer: &mut Lexer<'_>, want: Token) -> Result<()> {
    match lexer.next().transpose()? {
        Some(token) if token == want => Ok(()),
        other => errinput!("expected {want}, found {}", describe(other)),
    }
}

fn describe(token: Option<Token>) -> String {
    token.map_or_else(|| "end of input".to_string(), |t| t.to_string())
}
