//! Recursive-descent parser producing [`Program`] values.
//!
//! Semicolons are optional between statements (plugin authors rarely write
//! them consistently); inside `for (…)` headers they are required. At most
//! one `export default` is allowed per program.

use crate::ast::{BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use crate::error::ScriptError;
use crate::token::{Spanned, Token, tokenize};

/// Parse plugin source text into a [`Program`].
pub fn parse(source: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.parse_program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn matches(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, context: &str) -> Result<(), ScriptError> {
        if self.check(&token) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {token} {context}, found {}", self.peek())))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<String, ScriptError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected {context}, found {other}"))),
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            line: self.line(),
            message: message.into(),
        }
    }

    fn eat_semi(&mut self) {
        self.matches(&Token::Semicolon);
    }

    // ================================================================
    // Statements
    // ================================================================

    fn parse_program(mut self) -> Result<Program, ScriptError> {
        let mut body = Vec::new();
        let mut saw_default_export = false;
        while !self.check(&Token::Eof) {
            if self.matches(&Token::Semicolon) {
                continue;
            }
            let stmt = self.parse_stmt()?;
            if matches!(stmt, Stmt::ExportDefault { .. }) {
                if saw_default_export {
                    return Err(self.error("duplicate default export"));
                }
                saw_default_export = true;
            }
            body.push(stmt);
        }
        Ok(Program { body })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            Token::Function => self.parse_function_decl(),
            Token::Let | Token::Const | Token::Var => self.parse_var_decl(true),
            Token::Export => self.parse_export_default(),
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::For => self.parse_for(),
            Token::Return => self.parse_return(),
            Token::Break => {
                self.advance();
                self.eat_semi();
                Ok(Stmt::Break)
            }
            Token::Continue => {
                self.advance();
                self.eat_semi();
                Ok(Stmt::Continue)
            }
            Token::Throw => {
                self.advance();
                let value = self.parse_expr()?;
                self.eat_semi();
                Ok(Stmt::Throw { value })
            }
            Token::LBrace => Ok(Stmt::Block {
                body: self.parse_block()?,
            }),
            _ => {
                let expr = self.parse_expr()?;
                self.eat_semi();
                Ok(Stmt::Expr { expr })
            }
        }
    }

    fn parse_function_decl(&mut self) -> Result<Stmt, ScriptError> {
        self.advance(); // function
        let name = self.expect_ident("function name")?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Stmt::FunctionDecl { name, params, body })
    }

    fn parse_var_decl(&mut self, consume_semi: bool) -> Result<Stmt, ScriptError> {
        self.advance(); // let | const | var
        let name = self.expect_ident("variable name")?;
        let init = if self.matches(&Token::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if consume_semi {
            self.eat_semi();
        }
        Ok(Stmt::VarDecl { name, init })
    }

    fn parse_export_default(&mut self) -> Result<Stmt, ScriptError> {
        self.advance(); // export
        self.expect(Token::Default, "after 'export'")?;
        let value = self.parse_expr()?;
        self.eat_semi();
        Ok(Stmt::ExportDefault { value })
    }

    fn parse_if(&mut self) -> Result<Stmt, ScriptError> {
        self.advance(); // if
        self.expect(Token::LParen, "after 'if'")?;
        let cond = self.parse_expr()?;
        self.expect(Token::RParen, "after condition")?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.matches(&Token::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ScriptError> {
        self.advance(); // while
        self.expect(Token::LParen, "after 'while'")?;
        let cond = self.parse_expr()?;
        self.expect(Token::RParen, "after condition")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_for(&mut self) -> Result<Stmt, ScriptError> {
        self.advance(); // for
        self.expect(Token::LParen, "after 'for'")?;
        let init = if self.matches(&Token::Semicolon) {
            None
        } else {
            let stmt = if matches!(self.peek(), Token::Let | Token::Const | Token::Var) {
                self.parse_var_decl(false)?
            } else {
                Stmt::Expr {
                    expr: self.parse_expr()?,
                }
            };
            self.expect(Token::Semicolon, "after for-loop initializer")?;
            Some(Box::new(stmt))
        };
        let cond = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(Token::Semicolon, "after for-loop condition")?;
        let step = if self.check(&Token::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(Token::RParen, "after for-loop header")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, ScriptError> {
        self.advance(); // return
        if self.matches(&Token::Semicolon) {
            return Ok(Stmt::Return { value: None });
        }
        if self.check(&Token::RBrace) || self.check(&Token::Eof) {
            return Ok(Stmt::Return { value: None });
        }
        let value = self.parse_expr()?;
        self.eat_semi();
        Ok(Stmt::Return { value: Some(value) })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(Token::LBrace, "to open block")?;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) && !self.check(&Token::Eof) {
            if self.matches(&Token::Semicolon) {
                continue;
            }
            body.push(self.parse_stmt()?);
        }
        self.expect(Token::RBrace, "to close block")?;
        Ok(body)
    }

    fn parse_params(&mut self) -> Result<Vec<String>, ScriptError> {
        self.expect(Token::LParen, "to open parameter list")?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            params.push(self.expect_ident("parameter name")?);
            if !self.matches(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen, "to close parameter list")?;
        Ok(params)
    }

    // ================================================================
    // Expressions, lowest precedence first
    // ================================================================

    fn parse_expr(&mut self) -> Result<Expr, ScriptError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ScriptError> {
        let expr = self.parse_ternary()?;
        if self.check(&Token::Assign) {
            if !matches!(
                expr,
                Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }
            ) {
                return Err(self.error("invalid assignment target"));
            }
            self.advance();
            let value = self.parse_assignment()?;
            return Ok(Expr::Assign {
                target: Box::new(expr),
                value: Box::new(value),
            });
        }
        Ok(expr)
    }

    fn parse_ternary(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.parse_logical_or()?;
        if self.matches(&Token::Question) {
            let then_value = self.parse_assignment()?;
            self.expect(Token::Colon, "in conditional expression")?;
            let else_value = self.parse_assignment()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
            });
        }
        Ok(cond)
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_logical_and()?;
        while self.matches(&Token::OrOr) {
            let right = self.parse_logical_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_equality()?;
        while self.matches(&Token::AndAnd) {
            let right = self.parse_equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::EqEqEq => BinaryOp::StrictEq,
                Token::NotEq => BinaryOp::NotEq,
                Token::NotEqEq => BinaryOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::LtEq => BinaryOp::LtEq,
                Token::Gt => BinaryOp::Gt,
                Token::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            Token::Typeof => UnaryOp::TypeOf,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let property = self.expect_ident("property name")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket, "to close index")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Token::LParen => {
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ScriptError> {
        self.expect(Token::LParen, "to open arguments")?;
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            args.push(self.parse_expr()?);
            if !self.matches(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen, "to close arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptError> {
        match self.peek().clone() {
            Token::Num(n) => {
                self.advance();
                Ok(Expr::Num(n))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Token::Null | Token::Undefined => {
                self.advance();
                Ok(Expr::Null)
            }
            Token::Function => self.parse_function_expr(),
            Token::New => self.parse_new(),
            Token::Ident(name) => {
                if self.peek_at(1) == &Token::Arrow {
                    self.advance(); // identifier
                    self.advance(); // =>
                    return self.parse_arrow_body(vec![name]);
                }
                self.advance();
                Ok(Expr::Ident(name))
            }
            Token::LParen => {
                if self.lparen_starts_arrow() {
                    let params = self.parse_params()?;
                    self.expect(Token::Arrow, "after arrow parameters")?;
                    return self.parse_arrow_body(params);
                }
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(Token::RParen, "to close group")?;
                Ok(expr)
            }
            Token::LBracket => self.parse_array(),
            Token::LBrace => self.parse_object(),
            other => Err(self.error(format!("expected expression, found {other}"))),
        }
    }

    fn parse_function_expr(&mut self) -> Result<Expr, ScriptError> {
        self.advance(); // function
        // Function expressions may carry a name; it is not bound anywhere.
        if matches!(self.peek(), Token::Ident(_)) {
            self.advance();
        }
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Expr::Function { params, body })
    }

    fn parse_new(&mut self) -> Result<Expr, ScriptError> {
        self.advance(); // new
        let callee = self.expect_ident("constructor name")?;
        let args = self.parse_args()?;
        Ok(Expr::New { callee, args })
    }

    fn parse_arrow_body(&mut self, params: Vec<String>) -> Result<Expr, ScriptError> {
        if self.check(&Token::LBrace) {
            let body = self.parse_block()?;
            return Ok(Expr::Function { params, body });
        }
        let expr = self.parse_assignment()?;
        Ok(Expr::Function {
            params,
            body: vec![Stmt::Return { value: Some(expr) }],
        })
    }

    /// Whether the `(` at the current position opens arrow-function
    /// parameters, decided by finding its matching `)` and checking for `=>`.
    fn lparen_starts_arrow(&self) -> bool {
        let mut depth = 0usize;
        let mut idx = self.pos;
        while idx < self.tokens.len() {
            match &self.tokens[idx].token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self
                            .tokens
                            .get(idx + 1)
                            .is_some_and(|next| next.token == Token::Arrow);
                    }
                }
                Token::Eof => return false,
                _ => {}
            }
            idx += 1;
        }
        false
    }

    fn parse_array(&mut self) -> Result<Expr, ScriptError> {
        self.expect(Token::LBracket, "to open array")?;
        let mut elements = Vec::new();
        while !self.check(&Token::RBracket) {
            elements.push(self.parse_expr()?);
            if !self.matches(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBracket, "to close array")?;
        Ok(Expr::Array(elements))
    }

    fn parse_object(&mut self) -> Result<Expr, ScriptError> {
        self.expect(Token::LBrace, "to open object literal")?;
        let mut entries = Vec::new();
        while !self.check(&Token::RBrace) {
            let (key, shorthand_ok) = match self.peek().clone() {
                Token::Ident(name) => {
                    self.advance();
                    (name, true)
                }
                Token::Str(s) => {
                    self.advance();
                    (s, false)
                }
                other => {
                    return Err(self.error(format!("expected object key, found {other}")));
                }
            };
            let value = if self.matches(&Token::Colon) {
                self.parse_expr()?
            } else if shorthand_ok {
                Expr::Ident(key.clone())
            } else {
                return Err(self.error("expected ':' after object key"));
            };
            entries.push((key, value));
            if !self.matches(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace, "to close object literal")?;
        Ok(Expr::Object(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        match parse(source) {
            Ok(program) => program,
            Err(err) => panic!("parse failed for {source:?}: {err}"),
        }
    }

    // ================================================================
    // Statements
    // ================================================================

    #[test]
    fn parses_declaration_then_default_export_without_semicolons() {
        let program = parse_ok("function Widget(){ return null } export default Widget");
        assert_eq!(program.body.len(), 2);
        assert!(matches!(
            &program.body[0],
            Stmt::FunctionDecl { name, params, .. } if name == "Widget" && params.is_empty()
        ));
        assert!(matches!(
            &program.body[1],
            Stmt::ExportDefault { value: Expr::Ident(name) } if name == "Widget"
        ));
        assert!(program.has_default_export());
    }

    #[test]
    fn declared_names_preserve_order() {
        let program = parse_ok("let a = 1\nfunction Beta(){}\nconst Gamma = () => null");
        let names: Vec<&str> = program.declared_names().collect();
        assert_eq!(names, vec!["a", "Beta", "Gamma"]);
    }

    #[test]
    fn rejects_duplicate_default_export() {
        let err = parse("export default 1; export default 2").unwrap_err();
        assert!(err.to_string().contains("duplicate default export"));
    }

    #[test]
    fn parses_if_else_chain() {
        let program = parse_ok("if (a) { b() } else if (c) d(); else { e() }");
        let Stmt::If { else_branch, .. } = &program.body[0] else {
            panic!("expected if statement");
        };
        assert!(matches!(else_branch.as_deref(), Some(Stmt::If { .. })));
    }

    #[test]
    fn parses_for_header_with_required_semicolons() {
        let program = parse_ok("for (let i = 0; i < 10; i = i + 1) { total = total + i }");
        let Stmt::For {
            init, cond, step, ..
        } = &program.body[0]
        else {
            panic!("expected for statement");
        };
        assert!(matches!(init.as_deref(), Some(Stmt::VarDecl { name, .. }) if name == "i"));
        assert!(cond.is_some());
        assert!(step.is_some());
    }

    #[test]
    fn bare_return_before_closing_brace() {
        let program = parse_ok("function f(){ return }");
        let Stmt::FunctionDecl { body, .. } = &program.body[0] else {
            panic!("expected function");
        };
        assert_eq!(body.len(), 1);
        assert!(matches!(&body[0], Stmt::Return { value: None }));
    }

    #[test]
    fn function_declaration_requires_a_name() {
        let err = parse("function () {}").unwrap_err();
        assert!(err.to_string().contains("expected function name"));
    }

    // ================================================================
    // Expressions
    // ================================================================

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse_ok("let x = 1 + 2 * 3");
        let Stmt::VarDecl {
            init: Some(Expr::Binary { op, right, .. }),
            ..
        } = &program.body[0]
        else {
            panic!("expected var decl with binary init");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.as_ref(),
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn arrow_with_expression_body_desugars_to_return() {
        let program = parse_ok("const double = x => x * 2");
        let Stmt::VarDecl {
            init: Some(Expr::Function { params, body }),
            ..
        } = &program.body[0]
        else {
            panic!("expected arrow function");
        };
        assert_eq!(params, &vec!["x".to_string()]);
        assert!(matches!(&body[0], Stmt::Return { value: Some(_) }));
    }

    #[test]
    fn parenthesized_arrow_params_disambiguate_from_grouping() {
        let program = parse_ok("let f = (a, b) => a + b; let g = (1 + 2) * 3");
        assert!(matches!(
            &program.body[0],
            Stmt::VarDecl {
                init: Some(Expr::Function { .. }),
                ..
            }
        ));
        assert!(matches!(
            &program.body[1],
            Stmt::VarDecl {
                init: Some(Expr::Binary {
                    op: BinaryOp::Mul,
                    ..
                }),
                ..
            }
        ));
    }

    #[test]
    fn parses_member_index_call_chain() {
        let program = parse_ok("items[0].children.push(Text('hi'))");
        let Stmt::Expr {
            expr: Expr::Call { callee, .. },
        } = &program.body[0]
        else {
            panic!("expected call statement");
        };
        assert!(matches!(callee.as_ref(), Expr::Member { property, .. } if property == "push"));
    }

    #[test]
    fn parses_object_literal_with_shorthand_and_string_keys() {
        let program = parse_ok("let props = { title: 'Hi', count, 'data-id': 7 }");
        let Stmt::VarDecl {
            init: Some(Expr::Object(entries)),
            ..
        } = &program.body[0]
        else {
            panic!("expected object literal");
        };
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, "title");
        assert!(matches!(&entries[1].1, Expr::Ident(name) if name == "count"));
        assert_eq!(entries[2].0, "data-id");
    }

    #[test]
    fn parses_new_error() {
        let program = parse_ok("throw new Error('boom')");
        assert!(matches!(
            &program.body[0],
            Stmt::Throw {
                value: Expr::New { callee, args }
            } if callee == "Error" && args.len() == 1
        ));
    }

    #[test]
    fn ternary_and_logical_precedence() {
        let program = parse_ok("let label = ready && name || 'pending' ? name : 'n/a'");
        let Stmt::VarDecl {
            init: Some(Expr::Ternary { cond, .. }),
            ..
        } = &program.body[0]
        else {
            panic!("expected ternary");
        };
        assert!(matches!(
            cond.as_ref(),
            Expr::Logical {
                op: LogicalOp::Or,
                ..
            }
        ));
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        let err = parse("1 + 2 = 3").unwrap_err();
        assert!(err.to_string().contains("invalid assignment target"));
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse("let a = 1\nlet b = )").unwrap_err();
        assert!(err.to_string().contains("line 2"), "got: {err}");
    }

    #[test]
    fn rejects_unclosed_call() {
        let err = parse("f(1, 2").unwrap_err();
        assert!(err.to_string().contains("')'"));
    }
}
