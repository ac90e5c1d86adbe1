//! ---
//! prt_section: "03-trip-evaluation"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Tokenizer for trip rule expressions."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use crate::ast::CompareOp;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    /// Bare word: a data point path or an unquoted literal.
    Word(String),
    /// Double-quoted string literal, quotes removed.
    Quoted(String),
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub position: usize,
    pub message: String,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '!' | '&' | '|' | '=' | '<' | '>' | '"')
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        chars.next();
        let next = chars.peek().map(|&(_, n)| n);
        let kind = match (c, next) {
            ('(', _) => TokenKind::LParen,
            (')', _) => TokenKind::RParen,
            ('&', Some('&')) => {
                chars.next();
                TokenKind::And
            }
            ('|', Some('|')) => {
                chars.next();
                TokenKind::Or
            }
            ('=', Some('=')) => {
                chars.next();
                TokenKind::Op(CompareOp::Eq)
            }
            ('!', Some('=')) => {
                chars.next();
                TokenKind::Op(CompareOp::Ne)
            }
            ('>', Some('=')) => {
                chars.next();
                TokenKind::Op(CompareOp::Ge)
            }
            ('<', Some('=')) => {
                chars.next();
                TokenKind::Op(CompareOp::Le)
            }
            ('!', _) => TokenKind::Not,
            ('>', _) => TokenKind::Op(CompareOp::Gt),
            ('<', _) => TokenKind::Op(CompareOp::Lt),
            ('"', _) => {
                let mut text = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == '"' {
                        closed = true;
                        break;
                    }
                    text.push(ch);
                }
                if !closed {
                    return Err(LexError {
                        position,
                        message: "unterminated string literal".into(),
                    });
                }
                TokenKind::Quoted(text)
            }
            ('&' | '|' | '=', _) => {
                return Err(LexError {
                    position,
                    message: format!("unexpected character '{}'", c),
                });
            }
            _ => {
                let mut word = String::from(c);
                while let Some(&(_, ch)) = chars.peek() {
                    if !is_word_char(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                TokenKind::Word(word)
            }
        };
        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn splits_operators_without_whitespace() {
        assert_eq!(
            kinds("IED1/LLN0$ST$Trip.stVal==true&&!(x<=-1.5)"),
            vec![
                TokenKind::Word("IED1/LLN0$ST$Trip.stVal".into()),
                TokenKind::Op(CompareOp::Eq),
                TokenKind::Word("true".into()),
                TokenKind::And,
                TokenKind::Not,
                TokenKind::LParen,
                TokenKind::Word("x".into()),
                TokenKind::Op(CompareOp::Le),
                TokenKind::Word("-1.5".into()),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn quoted_literals_keep_spaces() {
        assert_eq!(
            kinds("mode != \"on line\""),
            vec![
                TokenKind::Word("mode".into()),
                TokenKind::Op(CompareOp::Ne),
                TokenKind::Quoted("on line".into()),
            ]
        );
    }

    #[test]
    fn reports_positions() {
        let tokens = tokenize("a  || b").unwrap();
        assert_eq!(tokens[1].position, 3);
        let err = tokenize("a & b").unwrap_err();
        assert_eq!(err.position, 2);
        assert!(tokenize("a == \"open").is_err());
    }
}
