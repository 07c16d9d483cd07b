use std::collections::HashMap;

use crate::ast::{ASTNode, Expression, Function, Prototype};
use crate::lexer::{Lexer, Token};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("unknown token when expecting an expression, found {0}")]
    UnknownToken(Token),
    #[error("expected ')', found {0}")]
    UnclosedParen(Token),
    #[error("expected ')' or ',' in argument list, found {0}")]
    InvalidArgumentList(Token),
    #[error("expected function name in prototype, found {0}")]
    MissingFunctionName(Token),
    #[error("expected '(' in prototype, found {0}")]
    MissingPrototypeOpenParen(Token),
    #[error("expected ')' in prototype, found {0}")]
    MissingPrototypeCloseParen(Token),
}

pub type PartialParseResult = Result<Expression, ParserError>;

pub struct Parser<I: Iterator<Item = char>> {
    lexer: Lexer<I>,
    current: Token,
    pub operator_precedence: HashMap<char, i32>,
}

fn default_precedence() -> HashMap<char, i32> {
    let mut operator_precedence = HashMap::new();
    operator_precedence.insert('<', 10);
    operator_precedence.insert('+', 20);
    operator_precedence.insert('-', 20);
    operator_precedence.insert('*', 40);
    operator_precedence
}

impl<'a> Parser<std::str::Chars<'a>> {
    pub fn from_source(input: &'a str) -> Self {
        Self::new(Lexer::new(input.chars()))
    }

    /// Parse a whole source string, failing on the first error.
    pub fn parse_str(input: &'a str) -> Result<Vec<ASTNode>, ParserError> {
        Self::from_source(input).parse()
    }
}

impl<I: Iterator<Item = char>> Parser<I> {
    /// Primes the first token, so this reads from the source immediately.
    pub fn new(mut lexer: Lexer<I>) -> Self {
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            operator_precedence: default_precedence(),
        }
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Consume the current token.
    pub fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    fn token_precedence(&self) -> i32 {
        match self.current {
            Token::Char(c) if c.is_ascii() => {
                self.operator_precedence.get(&c).copied().unwrap_or(-1)
            }
            _ => -1,
        }
    }

    /// numberexpr ::= number
    fn parse_number(&mut self, num: f64) -> PartialParseResult {
        self.advance();
        Ok(Expression::Literal(num))
    }

    /// identifierexpr ::= identifier | identifier '(' (expression (',' expression)*)? ')'
    fn parse_identifier(&mut self, ident: String) -> PartialParseResult {
        self.advance();

        if self.current != Token::Char('(') {
            return Ok(Expression::Variable(ident));
        }
        self.advance();

        let mut args = Vec::new();
        if self.current != Token::Char(')') {
            loop {
                args.push(self.parse_expr()?);

                match self.current {
                    Token::Char(')') => break,
                    Token::Char(',') => self.advance(),
                    _ => return Err(ParserError::InvalidArgumentList(self.current.clone())),
                }
            }
        }
        self.advance();

        Ok(Expression::Call(ident, args))
    }

    /// parenexpr ::= '(' expression ')'
    fn parse_nested(&mut self) -> PartialParseResult {
        self.advance();
        let res = self.parse_expr()?;
        if self.current != Token::Char(')') {
            return Err(ParserError::UnclosedParen(self.current.clone()));
        }
        self.advance();
        Ok(res)
    }

    fn parse_primary(&mut self) -> PartialParseResult {
        match self.current.clone() {
            Token::Ident(ident) => self.parse_identifier(ident),
            Token::Number(num) => self.parse_number(num),
            Token::Char('(') => self.parse_nested(),
            tok => Err(ParserError::UnknownToken(tok)),
        }
    }

    /// binoprhs ::= (binop primary)*
    fn parse_rhs(&mut self, expr_precedence: i32, lhs: Expression) -> PartialParseResult {
        let mut result = lhs;

        loop {
            let (operator, precedence) = match self.current {
                Token::Char(op) => (op, self.token_precedence()),
                _ => return Ok(result),
            };
            if precedence < expr_precedence {
                return Ok(result);
            }
            self.advance();

            let mut rhs = self.parse_primary()?;

            if precedence < self.token_precedence() {
                rhs = self.parse_rhs(precedence + 1, rhs)?;
            }

            result = Expression::Binary(operator, Box::new(result), Box::new(rhs));
        }
    }

    /// expression ::= primary binoprhs
    pub fn parse_expr(&mut self) -> PartialParseResult {
        let lhs = self.parse_primary()?;
        self.parse_rhs(0, lhs)
    }

    /// prototype ::= identifier '(' identifier* ')'
    pub fn parse_prototype(&mut self) -> Result<Prototype, ParserError> {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            tok => return Err(ParserError::MissingFunctionName(tok.clone())),
        };
        self.advance();

        if self.current != Token::Char('(') {
            return Err(ParserError::MissingPrototypeOpenParen(self.current.clone()));
        }

        let mut args = Vec::new();
        loop {
            self.advance();
            match &self.current {
                Token::Ident(arg) => args.push(arg.clone()),
                _ => break,
            }
        }

        if self.current != Token::Char(')') {
            return Err(ParserError::MissingPrototypeCloseParen(self.current.clone()));
        }
        self.advance();

        Ok(Prototype { name, args })
    }

    /// definition ::= 'def' prototype expression
    pub fn parse_definition(&mut self) -> Result<Function, ParserError> {
        self.advance();
        let prototype = self.parse_prototype()?;
        let body = self.parse_expr()?;
        Ok(Function { prototype, body })
    }

    /// external ::= 'extern' prototype
    pub fn parse_extern(&mut self) -> Result<Prototype, ParserError> {
        self.advance();
        self.parse_prototype()
    }

    /// toplevelexpr ::= expression
    pub fn parse_top_level_expr(&mut self) -> Result<Function, ParserError> {
        let body = self.parse_expr()?;
        Ok(Function {
            prototype: Prototype::anonymous(),
            body,
        })
    }

    /// Parse every remaining top-level item, skipping stray semicolons.
    pub fn parse(&mut self) -> Result<Vec<ASTNode>, ParserError> {
        let mut ast = Vec::new();

        loop {
            let node = match self.current {
                Token::Eof => break,
                Token::Char(';') => {
                    self.advance();
                    continue;
                }
                Token::Def => ASTNode::Function(self.parse_definition()?),
                Token::Extern => ASTNode::Extern(self.parse_extern()?),
                _ => ASTNode::Function(self.parse_top_level_expr()?),
            };
            ast.push(node);
        }

        Ok(ast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> Box<Expression> {
        Box::new(Expression::Variable(name.to_string()))
    }

    fn num(value: f64) -> Box<Expression> {
        Box::new(Expression::Literal(value))
    }

    fn parse_expr(input: &str) -> PartialParseResult {
        Parser::from_source(input).parse_expr()
    }

    #[test]
    fn parse_expr_works() {
        let res = parse_expr("x + 1 * (2 - 3)").unwrap();
        let target = Expression::Binary(
            '+',
            var("x"),
            Box::new(Expression::Binary(
                '*',
                num(1.0),
                Box::new(Expression::Binary('-', num(2.0), num(3.0))),
            )),
        );
        assert_eq!(res, target);
    }

    #[test]
    fn tighter_operator_binds_first() {
        assert_eq!(
            parse_expr("1+2*3").unwrap(),
            Expression::Binary(
                '+',
                num(1.0),
                Box::new(Expression::Binary('*', num(2.0), num(3.0)))
            )
        );
        assert_eq!(
            parse_expr("1*2+3").unwrap(),
            Expression::Binary(
                '+',
                Box::new(Expression::Binary('*', num(1.0), num(2.0))),
                num(3.0)
            )
        );
        assert_eq!(
            parse_expr("1<2+3").unwrap(),
            Expression::Binary(
                '<',
                num(1.0),
                Box::new(Expression::Binary('+', num(2.0), num(3.0)))
            )
        );
    }

    #[test]
    fn equal_precedence_is_left_associative() {
        assert_eq!(
            parse_expr("a-b+c").unwrap(),
            Expression::Binary(
                '+',
                Box::new(Expression::Binary('-', var("a"), var("b"))),
                var("c")
            )
        );
    }

    #[test]
    fn mixed_precedence_chain() {
        // a + b*c*d < e
        assert_eq!(
            parse_expr("a + b*c*d < e").unwrap(),
            Expression::Binary(
                '<',
                Box::new(Expression::Binary(
                    '+',
                    var("a"),
                    Box::new(Expression::Binary(
                        '*',
                        Box::new(Expression::Binary('*', var("b"), var("c"))),
                        var("d")
                    ))
                )),
                var("e")
            )
        );
    }

    #[test]
    fn unknown_operator_ends_expression() {
        let mut parser = Parser::from_source("a / b");
        assert_eq!(parser.parse_expr().unwrap(), Expression::Variable("a".to_string()));
        assert_eq!(parser.current(), &Token::Char('/'));
    }

    #[test]
    fn parse_calls() {
        assert_eq!(
            parse_expr("foo()").unwrap(),
            Expression::Call("foo".to_string(), vec![])
        );
        assert_eq!(
            parse_expr("foo(1, x+2, bar(y))").unwrap(),
            Expression::Call(
                "foo".to_string(),
                vec![
                    Expression::Literal(1.0),
                    Expression::Binary('+', var("x"), num(2.0)),
                    Expression::Call("bar".to_string(), vec![Expression::Variable("y".to_string())]),
                ]
            )
        );
    }

    #[test]
    fn parse_definition_works() {
        let ast = Parser::parse_str("def foo(x y) x+y").unwrap();
        assert_eq!(
            ast,
            vec![ASTNode::Function(Function {
                prototype: Prototype {
                    name: "foo".to_string(),
                    args: vec!["x".to_string(), "y".to_string()],
                },
                body: Expression::Binary('+', var("x"), var("y")),
            })]
        );
    }

    #[test]
    fn parse_program() {
        let ast = Parser::parse_str("extern sin(a); ;def one() 1; one() * 2").unwrap();
        assert_eq!(
            ast,
            vec![
                ASTNode::Extern(Prototype {
                    name: "sin".to_string(),
                    args: vec!["a".to_string()],
                }),
                ASTNode::Function(Function {
                    prototype: Prototype {
                        name: "one".to_string(),
                        args: vec![],
                    },
                    body: Expression::Literal(1.0),
                }),
                ASTNode::Function(Function {
                    prototype: Prototype::anonymous(),
                    body: Expression::Binary(
                        '*',
                        Box::new(Expression::Call("one".to_string(), vec![])),
                        num(2.0)
                    ),
                }),
            ]
        );
    }

    #[test]
    fn duplicate_parameters_are_accepted() {
        let mut parser = Parser::from_source("dup(a a)");
        assert_eq!(parser.parse_prototype().unwrap().args, ["a", "a"]);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            parse_expr(")"),
            Err(ParserError::UnknownToken(Token::Char(')')))
        );
        assert_eq!(parse_expr("(1 + 2"), Err(ParserError::UnclosedParen(Token::Eof)));
        assert_eq!(
            parse_expr("f(1 2)"),
            Err(ParserError::InvalidArgumentList(Token::Number(2.0)))
        );
        assert_eq!(
            Parser::parse_str("def 1(x) x"),
            Err(ParserError::MissingFunctionName(Token::Number(1.0)))
        );
        assert_eq!(
            Parser::parse_str("extern sin x"),
            Err(ParserError::MissingPrototypeOpenParen(Token::Ident(
                "x".to_string()
            )))
        );
        assert_eq!(
            Parser::parse_str("def f(x, y) x"),
            Err(ParserError::MissingPrototypeCloseParen(Token::Char(',')))
        );
    }

    #[test]
    fn printed_ast_reparses_identically() {
        let source = "extern cos(t); def f(a b c) a*(b+c) < g(a, 2.5) - 1; def g(p q) p; f(1, 2, 3)*4";
        let ast = Parser::parse_str(source).unwrap();
        let printed = ast
            .iter()
            .map(|node| node.to_string())
            .collect::<Vec<_>>()
            .join(";\n");
        assert_eq!(Parser::parse_str(&printed).unwrap(), ast);
    }
}
