//! Tokenizer for plugin source text.
//!
//! Produces a flat token stream with line numbers for diagnostics. The lexer
//! is strict: unknown characters, unterminated strings, and template literals
//! are reported as parse errors rather than skipped.

use std::fmt;

use crate::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Num(f64),
    Str(String),
    Ident(String),

    // Keywords
    Function,
    Return,
    Let,
    Const,
    Var,
    If,
    Else,
    While,
    For,
    Break,
    Continue,
    Throw,
    New,
    Typeof,
    True,
    False,
    Null,
    Undefined,
    Export,
    Default,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Semicolon,
    Colon,
    Question,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Bang,
    Arrow,

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Num(n) => return write!(f, "number {n}"),
            Token::Str(_) => "string literal",
            Token::Ident(name) => return write!(f, "identifier '{name}'"),
            Token::Function => "'function'",
            Token::Return => "'return'",
            Token::Let => "'let'",
            Token::Const => "'const'",
            Token::Var => "'var'",
            Token::If => "'if'",
            Token::Else => "'else'",
            Token::While => "'while'",
            Token::For => "'for'",
            Token::Break => "'break'",
            Token::Continue => "'continue'",
            Token::Throw => "'throw'",
            Token::New => "'new'",
            Token::Typeof => "'typeof'",
            Token::True => "'true'",
            Token::False => "'false'",
            Token::Null => "'null'",
            Token::Undefined => "'undefined'",
            Token::Export => "'export'",
            Token::Default => "'default'",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::Comma => "','",
            Token::Dot => "'.'",
            Token::Semicolon => "';'",
            Token::Colon => "':'",
            Token::Question => "'?'",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::Percent => "'%'",
            Token::Assign => "'='",
            Token::EqEq => "'=='",
            Token::EqEqEq => "'==='",
            Token::NotEq => "'!='",
            Token::NotEqEq => "'!=='",
            Token::Lt => "'<'",
            Token::LtEq => "'<='",
            Token::Gt => "'>'",
            Token::GtEq => "'>='",
            Token::AndAnd => "'&&'",
            Token::OrOr => "'||'",
            Token::Bang => "'!'",
            Token::Arrow => "'=>'",
            Token::Eof => "end of input",
        };
        f.write_str(text)
    }
}

/// A token tagged with the 1-based source line it started on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub line: u32,
}

fn keyword(ident: &str) -> Option<Token> {
    let token = match ident {
        "function" => Token::Function,
        "return" => Token::Return,
        "let" => Token::Let,
        "const" => Token::Const,
        "var" => Token::Var,
        "if" => Token::If,
        "else" => Token::Else,
        "while" => Token::While,
        "for" => Token::For,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "throw" => Token::Throw,
        "new" => Token::New,
        "typeof" => Token::Typeof,
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        "undefined" => Token::Undefined,
        "export" => Token::Export,
        "default" => Token::Default,
        _ => return None,
    };
    Some(token)
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ScriptError> {
        loop {
            match self.bump() {
                Some('*') if self.eat('/') => return Ok(()),
                Some(_) => {}
                None => return Err(self.error("unterminated block comment")),
            }
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, ScriptError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(Token::Str(text)),
                Some('\\') => {
                    let escaped = self
                        .bump()
                        .ok_or_else(|| self.error("unterminated string literal"))?;
                    match escaped {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        '0' => text.push('\0'),
                        '\\' => text.push('\\'),
                        '\'' => text.push('\''),
                        '"' => text.push('"'),
                        '`' => text.push('`'),
                        other => {
                            return Err(
                                self.error(format!("unsupported escape sequence '\\{other}'"))
                            );
                        }
                    }
                }
                Some('\n') | None => return Err(self.error("unterminated string literal")),
                Some(c) => text.push(c),
            }
        }
    }

    fn lex_number(&mut self, first: char) -> Result<Token, ScriptError> {
        let mut text = String::new();
        text.push(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.chars.peek() == Some(&'.') {
            // Lookahead is single-char, so clone to check for a digit after
            // the dot and avoid consuming member access on numbers.
            let mut ahead = self.chars.clone();
            ahead.next();
            if ahead.peek().is_some_and(char::is_ascii_digit) {
                text.push('.');
                self.bump();
                while let Some(&c) = self.chars.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }
        if matches!(self.chars.peek(), Some('e' | 'E')) {
            text.push('e');
            self.bump();
            if matches!(self.chars.peek(), Some('+' | '-')) {
                let sign = self.bump().unwrap_or('+');
                text.push(sign);
            }
            let mut saw_digit = false;
            while let Some(&c) = self.chars.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                    saw_digit = true;
                } else {
                    break;
                }
            }
            if !saw_digit {
                return Err(self.error("invalid number literal"));
            }
        }
        text.parse::<f64>()
            .map(Token::Num)
            .map_err(|_| self.error("invalid number literal"))
    }

    fn lex_ident(&mut self, first: char) -> Token {
        let mut text = String::new();
        text.push(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        keyword(&text).unwrap_or(Token::Ident(text))
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, ScriptError> {
        loop {
            let line = self.line;
            let c = match self.bump() {
                Some(c) => c,
                None => return Ok(None),
            };
            let token = match c {
                ' ' | '\t' | '\r' | '\n' => continue,
                '/' if self.eat('/') => {
                    self.skip_line_comment();
                    continue;
                }
                '/' if self.eat('*') => {
                    self.skip_block_comment()?;
                    continue;
                }
                '/' => Token::Slash,
                '\'' | '"' => self.lex_string(c)?,
                '`' => return Err(self.error("template literals are not supported")),
                '(' => Token::LParen,
                ')' => Token::RParen,
                '{' => Token::LBrace,
                '}' => Token::RBrace,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                ',' => Token::Comma,
                '.' => Token::Dot,
                ';' => Token::Semicolon,
                ':' => Token::Colon,
                '?' => Token::Question,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '%' => Token::Percent,
                '=' => {
                    if self.eat('=') {
                        if self.eat('=') {
                            Token::EqEqEq
                        } else {
                            Token::EqEq
                        }
                    } else if self.eat('>') {
                        Token::Arrow
                    } else {
                        Token::Assign
                    }
                }
                '!' => {
                    if self.eat('=') {
                        if self.eat('=') {
                            Token::NotEqEq
                        } else {
                            Token::NotEq
                        }
                    } else {
                        Token::Bang
                    }
                }
                '<' => {
                    if self.eat('=') {
                        Token::LtEq
                    } else {
                        Token::Lt
                    }
                }
                '>' => {
                    if self.eat('=') {
                        Token::GtEq
                    } else {
                        Token::Gt
                    }
                }
                '&' => {
                    if self.eat('&') {
                        Token::AndAnd
                    } else {
                        return Err(self.error("bitwise '&' is not supported"));
                    }
                }
                '|' => {
                    if self.eat('|') {
                        Token::OrOr
                    } else {
                        return Err(self.error("bitwise '|' is not supported"));
                    }
                }
                c if c.is_ascii_digit() => self.lex_number(c)?,
                c if c.is_ascii_alphabetic() || c == '_' || c == '$' => self.lex_ident(c),
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            };
            return Ok(Some(Spanned { token, line }));
        }
    }
}

/// Tokenize `source`, appending a final [`Token::Eof`].
pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ScriptError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(spanned) = lexer.next_token()? {
        tokens.push(spanned);
    }
    tokens.push(Spanned {
        token: Token::Eof,
        line: lexer.line,
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn lexes_function_declaration() {
        assert_eq!(
            kinds("function Widget() {}"),
            vec![
                Token::Function,
                Token::Ident("Widget".into()),
                Token::LParen,
                Token::RParen,
                Token::LBrace,
                Token::RBrace,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_numbers_and_member_access() {
        assert_eq!(
            kinds("1.5 2 3e2 x.y"),
            vec![
                Token::Num(1.5),
                Token::Num(2.0),
                Token::Num(300.0),
                Token::Ident("x".into()),
                Token::Dot,
                Token::Ident("y".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn integer_dot_member_is_not_a_fraction() {
        // `1.toString` style access must not swallow the dot into the number.
        assert_eq!(
            kinds("x[1].length"),
            vec![
                Token::Ident("x".into()),
                Token::LBracket,
                Token::Num(1.0),
                Token::RBracket,
                Token::Dot,
                Token::Ident("length".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_strings_with_escapes() {
        assert_eq!(
            kinds(r#"'a\'b' "c\nd""#),
            vec![
                Token::Str("a'b".into()),
                Token::Str("c\nd".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_equality_operators() {
        assert_eq!(
            kinds("= == === != !== =>"),
            vec![
                Token::Assign,
                Token::EqEq,
                Token::EqEqEq,
                Token::NotEq,
                Token::NotEqEq,
                Token::Arrow,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments_and_tracks_lines() {
        let tokens = tokenize("// header\nlet x = 1 /* mid\ncomment */ let y").unwrap();
        assert_eq!(tokens[0].token, Token::Let);
        assert_eq!(tokens[0].line, 2);
        let last_let = &tokens[tokens.len() - 3];
        assert_eq!(last_let.token, Token::Let);
        assert_eq!(last_let.line, 3);
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = tokenize("let s = 'oops").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn rejects_template_literals() {
        let err = tokenize("let s = `hi`").unwrap_err();
        assert!(err.to_string().contains("template literals"));
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = tokenize("let a = 1 @ 2").unwrap_err();
        assert!(err.to_string().contains("unexpected character '@'"));
    }
}
