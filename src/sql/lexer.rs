use crate::errinput;
use std::fmt::Display;
use std::iter::Peekable;
use std::str::Chars;

/// 词法解析Token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(String),
    String(String),
    Identifier(String), // 普通标志符
    Keyword(Keyword),
    Period,             // .
    Equal,              // =
    NotEqual,           // !=
    GreaterThan,        // >
    GreaterThanOrEqual, // >=
    LessThan,           // <
    LessThanOrEqual,    // <=
    LessOrGreaterThan,  // <>
    Plus,               // +
    Minus,              // -
    Asterisk,           // *
    Slash,              // /
    Percent,            // %
    Exclamation,        // !
    Question,           // ?
    Comma,              // ,
    Semicolon,          // ;
    OpenParen,          // (
    CloseParen,         // )
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Number(n) => n,
            Self::String(s) => s,
            Self::Identifier(s) => s,
            Self::Keyword(k) => return std::fmt::Display::fmt(&k, f),
            Self::Period => ".",
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::LessOrGreaterThan => "<>",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Asterisk => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Exclamation => "!",
            Self::Question => "?",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::OpenParen => "(",
            Self::CloseParen => ")",
        })
    }
}

/// 词法关键字
///
/// 只保留定位查询来源表所需的关键字，其余单词都作为普通标识符。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Keyword {
    As,
    By,
    Cross,
    Enum,
    Except,
    From,
    Group,
    Having,
    Inner,
    Intersect,
    Join,
    Left,
    Limit,
    Natural,
    On,
    Order,
    Outer,
    Right,
    Select,
    Set,
    Union,
    Using,
    Where,
    Window,
}

impl TryFrom<&str> for Keyword {
    // Use a cheap static error string. This just indicates it's not a keyword.
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // 词法分析器保证传入的是小写
        debug_assert!(value.chars().all(|c| !c.is_uppercase()), "keyword must be lowercase");
        Ok(match value {
            "as" => Self::As,
            "by" => Self::By,
            "cross" => Self::Cross,
            "enum" => Self::Enum,
            "except" => Self::Except,
            "from" => Self::From,
            "group" => Self::Group,
            "having" => Self::Having,
            "inner" => Self::Inner,
            "intersect" => Self::Intersect,
            "join" => Self::Join,
            "left" => Self::Left,
            "limit" => Self::Limit,
            "natural" => Self::Natural,
            "on" => Self::On,
            "order" => Self::Order,
            "outer" => Self::Outer,
            "right" => Self::Right,
            "select" => Self::Select,
            "set" => Self::Set,
            "union" => Self::Union,
            "using" => Self::Using,
            "where" => Self::Where,
            "window" => Self::Window,
            _ => return Err("not a keyword"),
        })
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::As => "AS",
            Self::By => "BY",
            Self::Cross => "CROSS",
            Self::Enum => "ENUM",
            Self::Except => "EXCEPT",
            Self::From => "FROM",
            Self::Group => "GROUP",
            Self::Having => "HAVING",
            Self::Inner => "INNER",
            Self::Intersect => "INTERSECT",
            Self::Join => "JOIN",
            Self::Left => "LEFT",
            Self::Limit => "LIMIT",
            Self::Natural => "NATURAL",
            Self::On => "ON",
            Self::Order => "ORDER",
            Self::Outer => "OUTER",
            Self::Right => "RIGHT",
            Self::Select => "SELECT",
            Self::Set => "SET",
            Self::Union => "UNION",
            Self::Using => "USING",
            Self::Where => "WHERE",
            Self::Window => "WINDOW",
        })
    }
}

/// # 词法分析器
///
/// 服务两个场景：
///
/// 1. 用户输入的查询语句：找出 `FROM` / `JOIN` 后面的来源表；
/// 2. `information_schema.columns.column_type` 里的枚举字面量：
///    `enum('a','b\'c')`，此时需要打开反斜杠转义。
///
/// 标识符支持 `"ident"` 与 `` `ident` `` 两种引用方式。
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    backslash_escapes: bool,
}

impl Iterator for Lexer<'_> {
    type Item = crate::db_error::Result<Token>;
    fn next(&mut self) -> Option<Self::Item> {
        match self.scan_token() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => self.chars.peek().map(|c| errinput!("unexpected character {c}")),
            Err(err) => Some(Err(err)),
        }
    }
}

impl<'a> Lexer<'a> {
    /// 创建一个解析器结构体：
    ///
    /// 输入 `input`链式调用[`str::chars`] 和 [`Iterator::peekable`]函数
    /// 返回一个[`Peekable`]的迭代器
    pub fn new(input: &'a str) -> Self {
        Self { chars: input.chars().peekable(), backslash_escapes: false }
    }

    /// 字符串字面量中 `\x` 表示字符 `x` 本身（MySQL 风格）
    pub fn with_backslash_escapes(input: &'a str) -> Self {
        Self { chars: input.chars().peekable(), backslash_escapes: true }
    }

    /// 返回下一个字符（`char`），仅当它满足给定的谓词条件。
    ///
    /// - 如果满足条件：消费并返回该字符。
    /// - 如果不满足条件：不消费字符，返回 `None`。
    fn next_char_predicate<F>(&mut self, predicate: F) -> Option<char>
    where
        F: Fn(&char) -> bool,
    {
        self.chars.peek().filter(|&c| predicate(c))?;
        self.chars.next()
    }

    fn next_is(&mut self, ch: char) -> bool {
        self.next_char_predicate(|c| ch.eq(c)).is_some()
    }

    fn next_map<F, T>(&mut self, map: F) -> Option<T>
    where
        F: Fn(&char) -> Option<T>,
    {
        // 获取下一个元素
        let value = self.chars.peek().copied().and_then(|c| map(&c))?;
        self.chars.next();
        Some(value)
    }

    fn scan_symbol(&mut self) -> Option<Token> {
        let mut token = self.next_map(|c| {
            Some(match c {
                '.' => Token::Period,
                ',' => Token::Comma,
                '=' => Token::Equal,
                '>' => Token::GreaterThan,
                '<' => Token::LessThan,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '/' => Token::Slash,
                '*' => Token::Asterisk,
                '%' => Token::Percent,
                '?' => Token::Question,
                ';' => Token::Semicolon,
                '(' => Token::OpenParen,
                ')' => Token::CloseParen,
                '!' => Token::Exclamation,
                _ => return None,
            })
        })?;
        token = match token {
            Token::Exclamation if self.next_is('=') => Token::NotEqual,
            Token::GreaterThan if self.next_is('=') => Token::GreaterThanOrEqual,
            Token::LessThan if self.next_is('=') => Token::LessThanOrEqual,
            Token::LessThan if self.next_is('>') => Token::LessOrGreaterThan,
            token => token,
        };
        Some(token)
    }

    /// 扫描并返回下一个 `Token`（如果有的话）。
    ///
    /// 1. 跳过空白字符与 `--` 注释
    /// 2. 根据首字符分派：`'` 字符串，`"`/`` ` `` 引用标识符，数字，字母，其它符号
    fn scan_token(&mut self) -> crate::db_error::Result<Option<Token>> {
        //1、跳过空白字符串
        self.skip_whitespace();

        //2、读取下一个元素，注意这里通过peek去借用
        let Some(c) = self.chars.peek() else {
            return Ok(None);
        };
        //3、根据元素类型，决定后续使用什么方法展开扫描
        match c {
            '\'' => self.scan_string(),
            '"' => self.scan_quoted('"'),
            '`' => self.scan_quoted('`'),
            '0'..='9' => Ok(self.scan_number()),
            c if c.is_alphabetic() || *c == '_' => Ok(self.scan_keyword_or_identifier()),
            _ => Ok(self.scan_symbol()),
        }
    }

    /// 扫描未加引号的标识符或关键字，统一转成小写后匹配关键字表
    fn scan_keyword_or_identifier(&mut self) -> Option<Token> {
        let mut result = self
            .next_char_predicate(|c| c.is_alphabetic() || '_'.eq(c))?
            .to_lowercase()
            .to_string();

        while let Some(c) = self.next_char_predicate(|c| c.is_alphanumeric() || '_'.eq(c) || '$'.eq(c)) {
            result.extend(c.to_lowercase());
        }

        // 判断是否能和关键字匹配上
        // 是 => 返回对应的关键字token
        // 否 => 返回普通标识符
        if let Ok(keyword) = Keyword::try_from(result.as_str()) {
            return Some(Token::Keyword(keyword));
        }
        Some(Token::Identifier(result))
    }

    /// 引用标识符保留原始大小写，连续两个引号表示引号本身
    fn scan_quoted(&mut self, quote: char) -> crate::db_error::Result<Option<Token>> {
        if !self.next_is(quote) {
            return Ok(None);
        }
        let mut result_str = String::new();
        loop {
            match self.chars.next() {
                Some(c) if c == quote && self.next_is(quote) => result_str.push(quote),
                Some(c) if c == quote => break,
                Some(c) => result_str.push(c),
                None => return errinput!("unexpected end of quoted identifier"),
            }
        }
        Ok(Some(Token::Identifier(result_str)))
    }

    /// 字符串扫描规则：字符串是由两个单引号引起来的`'test'`
    ///
    /// `''` 表示一个单引号；打开反斜杠转义时 `\'`、`\\` 也被接受
    fn scan_string(&mut self) -> crate::db_error::Result<Option<Token>> {
        if !self.next_is('\'') {
            return Ok(None);
        }
        let mut result_str = String::new();
        loop {
            match self.chars.next() {
                Some('\\') if self.backslash_escapes => match self.chars.next() {
                    Some('n') => result_str.push('\n'),
                    Some('t') => result_str.push('\t'),
                    Some('0') => result_str.push('\0'),
                    Some(c) => result_str.push(c),
                    None => return errinput!("unexpected end of string literal"),
                },
                Some('\'') if self.next_is('\'') => result_str.push('\''),
                Some('\'') => break,
                Some(c) => result_str.push(c),
                None => return errinput!("unexpected end of string literal"),
            }
        }
        Ok(Some(Token::String(result_str)))
    }

    /// 扫描数字字面量：整数部分、可选小数部分、可选指数部分
    fn scan_number(&mut self) -> Option<Token> {
        // 扫描整数部分
        let mut number = self.next_char_predicate(|e| e.is_ascii_digit())?.to_string();
        while let Some(c) = self.next_char_predicate(|e| e.is_ascii_digit()) {
            number.push(c);
        }
        // 扫描小数部分
        if self.next_is('.') {
            number.push('.');
            while let Some(n) = self.next_char_predicate(|c| c.is_ascii_digit()) {
                number.push(n);
            }
        }

        // 扫描指数类型
        if let Some(exp) = self.next_char_predicate(|c| 'e'.eq(c) || 'E'.eq(c)) {
            number.push(exp);
            if let Some(sign) = self.next_char_predicate(|c| '+'.eq(c) || '-'.eq(c)) {
                number.push(sign);
            }
            while let Some(ch) = self.next_char_predicate(|c| c.is_ascii_digit()) {
                number.push(ch);
            }
        }
        Some(Token::Number(number))
    }

    /// 消耗掉空白字符和 `--` 行注释
    fn skip_whitespace(&mut self) {
        loop {
            while self.next_char_predicate(|c| c.is_whitespace()).is_some() {}
            let mut ahead = self.chars.clone();
            if ahead.next() == Some('-') && ahead.next() == Some('-') {
                while self.next_char_predicate(|c| *c != '\n').is_some() {}
                continue;
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_error::Result;

    fn tokens(input: &str) -> Result<Vec<Token>> {
        Lexer::new(input).collect()
    }

    #[test]
    fn test_scan_string() -> Result<()> {
        assert_eq!(tokens("'it''s'")?, vec![Token::String("it's".into())]);
        Ok(())
    }

    #[test]
    fn test_scan_backslash_string() -> Result<()> {
        let toks: Vec<Token> = Lexer::with_backslash_escapes(r"'in\'active' 'a\\b'").collect::<Result<_>>()?;
        assert_eq!(toks, vec![Token::String("in'active".into()), Token::String("a\\b".into())]);
        // 未打开转义时反斜杠是普通字符
        assert_eq!(tokens(r"'a\b'")?, vec![Token::String("a\\b".into())]);
        Ok(())
    }

    #[test]
    fn test_scan_quoted() -> Result<()> {
        assert_eq!(
            tokens("\"My Table\" `or``der`")?,
            vec![Token::Identifier("My Table".into()), Token::Identifier("or`der".into())]
        );
        Ok(())
    }

    #[test]
    fn test_lexer() -> Result<()> {
        let toks = tokens(
            "select u.id, o.total -- comment
             from users u inner join orders o on o.user_id = u.id where o.total >= 10.5e1",
        )?;
        assert_eq!(toks[0], Token::Keyword(Keyword::Select));
        assert!(toks.contains(&Token::Keyword(Keyword::Join)));
        assert!(toks.contains(&Token::GreaterThanOrEqual));
        assert_eq!(toks.last(), Some(&Token::Number("10.5e1".into())));
        assert!(!toks.contains(&Token::Identifier("comment".into())));
        Ok(())
    }

    #[test]
    fn test_unterminated() {
        assert!(tokens("'abc").is_err());
        assert!(tokens("\"abc").is_err());
    }
}
