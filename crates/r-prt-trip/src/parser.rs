//! ---
//! prt_section: "03-trip-evaluation"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Recursive-descent parser for trip rule expressions."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and ('||' and)*
//! and        := not ('&&' not)*
//! not        := '!' not | '(' or ')' | comparison
//! comparison := path op literal
//! ```

use crate::ast::{Expr, Literal};
use crate::lexer::{tokenize, LexError, Token, TokenKind};

/// Deepest accepted nesting of `!`, parentheses and chained operators.
pub const MAX_DEPTH: usize = 256;

/// Syntax error with the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub position: usize,
    pub message: String,
}

impl From<LexError> for SyntaxError {
    fn from(err: LexError) -> Self {
        Self {
            position: err.position,
            message: err.message,
        }
    }
}

/// Parse a complete expression. Trailing tokens are an error.
pub fn parse_expression(input: &str) -> Result<Expr, SyntaxError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
    };
    if parser.tokens.is_empty() {
        return Err(parser.error_here("empty expression"));
    }
    let (expr, _) = parser.parse_or(0)?;
    match parser.peek() {
        None => Ok(expr),
        Some(Token {
            kind: TokenKind::RParen,
            ..
        }) => Err(parser.error_here("unbalanced ')'")),
        Some(_) => Err(parser.error_here("unexpected trailing input")),
    }
}

/// Classify a bare literal by its lexical form.
pub fn classify_literal(word: &str) -> Literal {
    match word {
        "true" => return Literal::Bool(true),
        "false" => return Literal::Bool(false),
        _ => {}
    }
    let digits = word.strip_prefix('-').unwrap_or(word);
    let numeric = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && digits.chars().any(|c| c.is_ascii_digit());
    if numeric {
        if digits.contains('.') {
            if let Ok(value) = word.parse::<f64>() {
                return Literal::Float(value);
            }
        } else if let Ok(value) = word.parse::<i64>() {
            return Literal::Int(value);
        } else if let Ok(value) = word.parse::<f64>() {
            return Literal::Float(value);
        }
    }
    Literal::Str(word.to_owned())
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|t| &t.kind) == Some(kind) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        SyntaxError {
            position: self.peek().map(|t| t.position).unwrap_or(self.end),
            message: message.to_owned(),
        }
    }

    fn nested(&self, depth: usize) -> Result<usize, SyntaxError> {
        if depth > MAX_DEPTH {
            return Err(self.error_here("expression nested too deeply"));
        }
        Ok(depth)
    }

    // Each production returns its subtree depth so evaluation and drop stay bounded.
    fn parse_or(&mut self, depth: usize) -> Result<(Expr, usize), SyntaxError> {
        let (mut left, mut height) = self.parse_and(depth)?;
        while self.eat(&TokenKind::Or) {
            let (right, right_height) = self.parse_and(depth)?;
            height = self.nested(height.max(right_height) + 1)?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok((left, height))
    }

    fn parse_and(&mut self, depth: usize) -> Result<(Expr, usize), SyntaxError> {
        let (mut left, mut height) = self.parse_not(depth)?;
        while self.eat(&TokenKind::And) {
            let (right, right_height) = self.parse_not(depth)?;
            height = self.nested(height.max(right_height) + 1)?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok((left, height))
    }

    fn parse_not(&mut self, depth: usize) -> Result<(Expr, usize), SyntaxError> {
        let depth = self.nested(depth + 1)?;
        if self.eat(&TokenKind::Not) {
            let (inner, height) = self.parse_not(depth)?;
            let height = self.nested(height + 1)?;
            return Ok((Expr::Not(Box::new(inner)), height));
        }
        if let Some(Token {
            kind: TokenKind::LParen,
            position,
        }) = self.peek().cloned()
        {
            self.cursor += 1;
            let inner = self.parse_or(depth)?;
            if !self.eat(&TokenKind::RParen) {
                return Err(SyntaxError {
                    position,
                    message: "unbalanced '(': missing ')'".into(),
                });
            }
            return Ok(inner);
        }
        Ok((self.parse_comparison()?, 1))
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let path = match self.peek() {
            Some(Token {
                kind: TokenKind::Word(word),
                ..
            }) => word.clone(),
            _ => return Err(self.error_here("expected data point path")),
        };
        self.cursor += 1;

        let op = match self.peek() {
            Some(Token {
                kind: TokenKind::Op(op),
                ..
            }) => *op,
            _ => return Err(self.error_here("expected comparison operator")),
        };
        self.cursor += 1;

        let literal = match self.peek() {
            Some(Token {
                kind: TokenKind::Word(word),
                ..
            }) => classify_literal(word),
            Some(Token {
                kind: TokenKind::Quoted(text),
                ..
            }) => Literal::Str(text.clone()),
            _ => return Err(self.error_here("expected literal")),
        };
        self.advance();

        Ok(Expr::Compare { path, op, literal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CompareOp;

    fn cmp(path: &str, op: CompareOp, literal: Literal) -> Expr {
        Expr::Compare {
            path: path.into(),
            op,
            literal,
        }
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse_expression("a == 1 || b == 2 && c == 3").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(cmp("a", CompareOp::Eq, Literal::Int(1))),
                Box::new(Expr::And(
                    Box::new(cmp("b", CompareOp::Eq, Literal::Int(2))),
                    Box::new(cmp("c", CompareOp::Eq, Literal::Int(3))),
                )),
            )
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse_expression("!(a == true || b == true) && c > 0.5").unwrap();
        match expr {
            Expr::And(left, right) => {
                assert!(matches!(*left, Expr::Not(_)));
                assert_eq!(*right, cmp("c", CompareOp::Gt, Literal::Float(0.5)));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn literal_typing_follows_lexical_form() {
        assert_eq!(classify_literal("false"), Literal::Bool(false));
        assert_eq!(classify_literal("-42"), Literal::Int(-42));
        assert_eq!(classify_literal("1.25"), Literal::Float(1.25));
        assert_eq!(classify_literal("1.2.3"), Literal::Str("1.2.3".into()));
        assert_eq!(classify_literal("on"), Literal::Str("on".into()));
        assert_eq!(classify_literal("-"), Literal::Str("-".into()));
    }

    #[test]
    fn rejects_malformed_input() {
        let err = parse_expression("(a == true").unwrap_err();
        assert_eq!(err.position, 0);
        let err = parse_expression("a == true)").unwrap_err();
        assert_eq!(err.position, 9);
        assert!(parse_expression("").is_err());
        assert!(parse_expression("a ==").is_err());
        assert!(parse_expression("a true").is_err());
        assert!(parse_expression("a == 1 b == 2").is_err());
        assert!(parse_expression("&& a == 1").is_err());
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let negations = format!("{}a == 1", "!".repeat(200_000));
        let err = parse_expression(&negations).unwrap_err();
        assert_eq!(err.message, "expression nested too deeply");

        let parens = format!("{}a == 1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(parse_expression(&parens).is_err());

        let chain = vec!["a == 1"; 5_000].join(" && ");
        let err = parse_expression(&chain).unwrap_err();
        assert_eq!(err.message, "expression nested too deeply");

        let within = format!("{}a == 1", "!".repeat(MAX_DEPTH / 2));
        assert!(parse_expression(&within).is_ok());
        let short_chain = vec!["a == 1"; 100].join(" || ");
        assert!(parse_expression(&short_chain).is_ok());
    }
}
