use crate::{
    ast::{BinaryOperator, Block, Expression, PrefixOperator, Program, Statement},
    error::{byte_offset_to_line, LangError, LangResult, Location, ParseErrors},
    lexer::{Token, TokenKind},
    stack::ensure_sufficient_stack,
};
use std::path::PathBuf;
use std::rc::Rc;

/// Deepest expression nesting accepted in one statement.
const MAX_NESTING: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
}

fn infix_precedence(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Equal | TokenKind::NotEqual => Precedence::Equals,
        TokenKind::LessThan
        | TokenKind::LessThanEq
        | TokenKind::GreaterThan
        | TokenKind::GreaterThanEq => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Product,
        TokenKind::LParen | TokenKind::LBracket => Precedence::Call,
        _ => Precedence::Lowest,
    }
}

fn binary_operator(kind: &TokenKind) -> Option<BinaryOperator> {
    let op = match kind {
        TokenKind::Plus => BinaryOperator::Add,
        TokenKind::Minus => BinaryOperator::Sub,
        TokenKind::Star => BinaryOperator::Mul,
        TokenKind::Slash => BinaryOperator::Div,
        TokenKind::Percent => BinaryOperator::Rem,
        TokenKind::Equal => BinaryOperator::Eq,
        TokenKind::NotEqual => BinaryOperator::NotEq,
        TokenKind::LessThan => BinaryOperator::LessThan,
        TokenKind::LessThanEq => BinaryOperator::LessThanEq,
        TokenKind::GreaterThan => BinaryOperator::GreaterThan,
        TokenKind::GreaterThanEq => BinaryOperator::GreaterThanEq,
        _ => return None,
    };
    Some(op)
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    nesting: usize,
    source: String,
    file_path: PathBuf,
}

impl Parser {

    pub fn with_source_and_file(tokens: Vec<Token>, source: String, file_path: PathBuf) -> Self {
        Self {
            tokens,
            current: 0,
            nesting: 0,
            source,
            file_path,
        }
    }

    fn error_with_location(&self, message: String) -> LangError {
        let location = if self.current < self.tokens.len() {
            let token = &self.tokens[self.current];
            let line = byte_offset_to_line(&self.source, token.span.start);
            Some(Location::new(self.file_path.clone(), line))
        } else if !self.tokens.is_empty() {
            let last_token = &self.tokens[self.tokens.len() - 1];
            let line = byte_offset_to_line(&self.source, last_token.span.end);
            Some(Location::new(self.file_path.clone(), line))
        } else {
            None
        };
        LangError::Parser { message, location }
    }

    /// Parse every statement, recovering at the next statement separator
    /// after a failure so that all diagnostics of the unit are reported.
    pub fn parse_program(&mut self) -> Result<Program, ParseErrors> {
        let mut statements = Vec::new();
        let mut errors = Vec::new();

        loop {
            self.skip_separators();
            if self.is_at_end() {
                break;
            }

            let parsed = self
                .parse_statement()
                .and_then(|statement| self.expect_statement_end(false).map(|_| statement));
            match parsed {
                Ok(statement) => statements.push(statement),
                Err(err) => {
                    errors.push(err);
                    self.synchronize();
                }
            }
        }

        if errors.is_empty() {
            Ok(Program { statements })
        } else {
            Err(ParseErrors(errors))
        }
    }

    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if matches!(
                self.current_kind(),
                TokenKind::Newline | TokenKind::Semicolon
            ) {
                return;
            }
            self.advance();
        }
    }

    fn expect_statement_end(&mut self, in_block: bool) -> LangResult<()> {
        match self.current_kind() {
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof => Ok(()),
            TokenKind::RBrace if in_block => Ok(()),
            other => Err(self.error_with_location(format!(
                "expected end of statement but found {}",
                other.describe()
            ))),
        }
    }

    fn parse_statement(&mut self) -> LangResult<Statement> {
        match self.current_kind() {
            TokenKind::Return => {
                self.advance();
                if matches!(
                    self.current_kind(),
                    TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
                ) {
                    Ok(Statement::Return(None))
                } else {
                    Ok(Statement::Return(Some(
                        self.parse_expression(Precedence::Lowest)?,
                    )))
                }
            }
            TokenKind::Identifier(name)
                if matches!(
                    self.peek_kind(),
                    TokenKind::Declare | TokenKind::Assign
                ) =>
            {
                let name = name.clone();
                self.advance();
                let declare = matches!(self.current_kind(), TokenKind::Declare);
                self.advance();
                self.skip_newlines();
                let value = self.parse_expression(Precedence::Lowest)?;
                if declare {
                    Ok(Statement::Declare { name, value })
                } else {
                    Ok(Statement::Assign { name, value })
                }
            }
            _ => Ok(Statement::Expression(
                self.parse_expression(Precedence::Lowest)?,
            )),
        }
    }

    fn parse_block(&mut self) -> LangResult<Block> {
        self.expect(TokenKind::LBrace)?;
        let mut statements = Vec::new();

        loop {
            self.skip_separators();
            match self.current_kind() {
                TokenKind::RBrace => {
                    self.advance();
                    return Ok(Block { statements });
                }
                TokenKind::Eof => {
                    return Err(self.error_with_location(
                        "expected '}' but found end of input".to_string(),
                    ))
                }
                _ => {
                    statements.push(self.parse_statement()?);
                    self.expect_statement_end(true)?;
                }
            }
        }
    }

    fn parse_expression(&mut self, precedence: Precedence) -> LangResult<Expression> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error_with_location(format!(
                "expression nested more than {} levels deep",
                MAX_NESTING
            )));
        }
        self.nesting += 1;
        let result = ensure_sufficient_stack(|| self.parse_operators(precedence));
        self.nesting -= 1;
        result
    }

    fn parse_operators(&mut self, precedence: Precedence) -> LangResult<Expression> {
        let mut left = self.parse_prefix()?;

        while precedence < infix_precedence(self.current_kind()) {
            left = match self.current_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_expression_list(TokenKind::RParen)?;
                    Expression::Call {
                        callee: Box::new(left),
                        args,
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    self.skip_newlines();
                    let index = self.parse_expression(Precedence::Lowest)?;
                    self.skip_newlines();
                    self.expect(TokenKind::RBracket)?;
                    Expression::Index {
                        target: Box::new(left),
                        index: Box::new(index),
                    }
                }
                kind => {
                    let op_precedence = infix_precedence(kind);
                    let op = match binary_operator(kind) {
                        Some(op) => op,
                        None => return Ok(left),
                    };
                    self.advance();
                    self.skip_newlines();
                    let right = self.parse_expression(op_precedence)?;
                    Expression::Binary {
                        left: Box::new(left),
                        op,
                        right: Box::new(right),
                    }
                }
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> LangResult<Expression> {
        let kind = self.current_kind().clone();
        match kind {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expression::Integer(n))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(Expression::String(s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Boolean(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expression::Null)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expression::Identifier(name))
            }
            TokenKind::Bang | TokenKind::Minus => {
                self.advance();
                let op = if kind == TokenKind::Bang {
                    PrefixOperator::Not
                } else {
                    PrefixOperator::Negate
                };
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expression::Prefix {
                    op,
                    right: Box::new(right),
                })
            }
            TokenKind::LParen => self.parse_group_or_tuple(),
            TokenKind::LBracket => {
                self.advance();
                Ok(Expression::List(
                    self.parse_expression_list(TokenKind::RBracket)?,
                ))
            }
            TokenKind::LBrace => self.parse_map_literal(),
            TokenKind::If => self.parse_if(),
            TokenKind::Fn => self.parse_function_literal(),
            other => Err(self.error_with_location(format!(
                "expected an expression but found {}",
                other.describe()
            ))),
        }
    }

    /// `(e)` groups, `()` / `(e,)` / `(a, b)` are tuples.
    fn parse_group_or_tuple(&mut self) -> LangResult<Expression> {
        self.expect(TokenKind::LParen)?;
        self.skip_newlines();
        if matches!(self.current_kind(), TokenKind::RParen) {
            self.advance();
            return Ok(Expression::Tuple(Vec::new()));
        }

        let first = self.parse_expression(Precedence::Lowest)?;
        self.skip_newlines();
        if !matches!(self.current_kind(), TokenKind::Comma) {
            self.expect(TokenKind::RParen)?;
            return Ok(first);
        }

        self.advance();
        let mut elements = vec![first];
        elements.extend(self.parse_expression_list(TokenKind::RParen)?);
        Ok(Expression::Tuple(elements))
    }

    /// Comma-separated expressions up to and including `end`; the opening
    /// delimiter must already be consumed. A trailing comma is allowed.
    fn parse_expression_list(&mut self, end: TokenKind) -> LangResult<Vec<Expression>> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if *self.current_kind() == end {
                self.advance();
                return Ok(items);
            }
            items.push(self.parse_expression(Precedence::Lowest)?);
            self.skip_newlines();
            if matches!(self.current_kind(), TokenKind::Comma) {
                self.advance();
            } else {
                self.expect(end)?;
                return Ok(items);
            }
        }
    }

    fn parse_map_literal(&mut self) -> LangResult<Expression> {
        self.expect(TokenKind::LBrace)?;
        let mut pairs = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.current_kind(), TokenKind::RBrace) {
                self.advance();
                return Ok(Expression::Map(pairs));
            }
            let key = self.parse_expression(Precedence::Lowest)?;
            self.skip_newlines();
            self.expect(TokenKind::Colon)?;
            self.skip_newlines();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            self.skip_newlines();
            if matches!(self.current_kind(), TokenKind::Comma) {
                self.advance();
            } else {
                self.expect(TokenKind::RBrace)?;
                return Ok(Expression::Map(pairs));
            }
        }
    }

    fn parse_if(&mut self) -> LangResult<Expression> {
        self.expect(TokenKind::If)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        let consequence = self.parse_block()?;

        if self.next_significant_is(&TokenKind::Else) {
            self.skip_newlines();
            self.advance();
            let alternative = if matches!(self.current_kind(), TokenKind::If) {
                Block {
                    statements: vec![Statement::Expression(self.parse_if()?)],
                }
            } else {
                self.parse_block()?
            };
            return Ok(Expression::If {
                condition: Box::new(condition),
                consequence,
                alternative: Some(alternative),
            });
        }

        Ok(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative: None,
        })
    }

    fn parse_function_literal(&mut self) -> LangResult<Expression> {
        self.expect(TokenKind::Fn)?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        loop {
            self.skip_newlines();
            match self.current_kind().clone() {
                TokenKind::RParen => {
                    self.advance();
                    break;
                }
                TokenKind::Identifier(name) => {
                    if params.contains(&name) {
                        return Err(self
                            .error_with_location(format!("duplicate parameter '{}'", name)));
                    }
                    params.push(name);
                    self.advance();
                    self.skip_newlines();
                    if matches!(self.current_kind(), TokenKind::Comma) {
                        self.advance();
                    } else {
                        self.expect(TokenKind::RParen)?;
                        break;
                    }
                }
                other => {
                    return Err(self.error_with_location(format!(
                        "expected a parameter name but found {}",
                        other.describe()
                    )))
                }
            }
        }
        let body = self.parse_block()?;
        Ok(Expression::Function {
            params,
            body: Rc::new(body),
        })
    }

    fn expect(&mut self, expected: TokenKind) -> LangResult<()> {
        if *self.current_kind() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error_with_location(format!(
                "expected {} but found {}",
                expected.describe(),
                self.current_kind().describe()
            )))
        }
    }

    fn next_significant_is(&self, kind: &TokenKind) -> bool {
        self.tokens[self.current..]
            .iter()
            .find(|token| token.kind != TokenKind::Newline)
            .map_or(false, |token| token.kind == *kind)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.current_kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(
            self.current_kind(),
            TokenKind::Newline | TokenKind::Semicolon
        ) {
            self.advance();
        }
    }

    fn current_kind(&self) -> &TokenKind {
        self.tokens
            .get(self.current)
            .map_or(&TokenKind::Eof, |token| &token.kind)
    }

    fn peek_kind(&self) -> &TokenKind {
        self.tokens
            .get(self.current + 1)
            .map_or(&TokenKind::Eof, |token| &token.kind)
    }

    fn advance(&mut self) {
        if self.current < self.tokens.len() {
            self.current += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }
}

/// Lex and parse `source` in one go.
pub fn parse_source(source: &str, file_path: PathBuf) -> Result<Program, ParseErrors> {
    let tokens = crate::lexer::Lexer::with_file(source, file_path.clone()).lex()?;
    Parser::with_source_and_file(tokens, source.to_string(), file_path).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Program {
        parse_source(source, PathBuf::from("test.tang")).expect("source should parse")
    }

    fn render(source: &str) -> String {
        parse(source).to_string()
    }

    #[test]
    fn deep_nesting_is_a_diagnostic() {
        for source in [
            format!("{}1", "-".repeat(200_000)),
            format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000)),
        ] {
            let errors = parse_source(&source, PathBuf::from("test.tang")).unwrap_err();
            let messages: Vec<_> = errors.messages().collect();
            assert_eq!(
                messages,
                vec!["Parse error: expression nested more than 1000 levels deep (test.tang line 1)"]
            );
        }
    }

    #[test]
    fn nesting_below_the_limit_parses() {
        let program = parse(&format!("{}1", "!".repeat(900)));
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn operator_precedence() {
        assert_eq!(render("1 + 2 * 3"), "(1 + (2 * 3))");
        assert_eq!(render("-a * b"), "((-a) * b)");
        assert_eq!(render("!(1 < 2) == false"), "((!(1 < 2)) == false)");
        assert_eq!(render("a + b(c)[0]"), "(a + (b(c)[0]))");
        assert_eq!(render("10 - 4 - 3"), "((10 - 4) - 3)");
    }

    #[test]
    fn statements_split_on_newlines_and_semicolons() {
        let program = parse("x := 1; y = x\nreturn y");
        assert_eq!(
            program.statements,
            vec![
                Statement::Declare {
                    name: "x".to_string(),
                    value: Expression::Integer(1),
                },
                Statement::Assign {
                    name: "y".to_string(),
                    value: Expression::Identifier("x".to_string()),
                },
                Statement::Return(Some(Expression::Identifier("y".to_string()))),
            ]
        );
    }

    #[test]
    fn tuples_groups_and_lists() {
        assert_eq!(render("()"), "()");
        assert_eq!(render("(1)"), "1");
        assert_eq!(render("(1,)"), "(1,)");
        assert_eq!(render("(1, \"a\")"), "(1, \"a\")");
        assert_eq!(render("[1,\n 2,\n]"), "[1, 2]");
    }

    #[test]
    fn map_literal_in_expression_position() {
        assert_eq!(render("{\"a\": 1, true: 2}"), "{\"a\": 1, true: 2}");
    }

    #[test]
    fn if_else_chain_across_lines() {
        assert_eq!(
            render("if x { 1 }\nelse if y { 2 } else { 3 }"),
            "if x { 1 } else { if y { 2 } else { 3 } }"
        );
    }

    #[test]
    fn function_literal_with_multiline_body() {
        assert_eq!(
            render("fn(a, b) {\n  c := a + b\n  return c\n}"),
            "fn(a, b) { c := (a + b); return c }"
        );
    }

    #[test]
    fn reports_every_bad_statement() {
        let errors = parse_source("x := \ny := )\nz := 3\n(1", PathBuf::from("bad.tang"))
            .expect_err("source should not parse");
        let lines: Vec<_> = errors
            .0
            .iter()
            .map(|err| match err {
                LangError::Parser { location, .. } => location.as_ref().map(|l| l.line),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec![Some(2), Some(4)]);
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        assert!(parse_source("fn(a, a) { a }", PathBuf::from("dup.tang")).is_err());
    }
}
