//! Recursive-descent parser from tokens to AST nodes.
//!
//! A program is a sequence of expressions. Nesting is bounded by
//! [`MAX_PARSE_DEPTH`] so hostile input cannot overflow the stack.

use crate::ast::{Node, NodeKind};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::{Error, Loc, MAX_PARSE_DEPTH, SyntaxError, SyntaxErrorKind};

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens
            .get(self.pos)
            .filter(|t| t.kind != TokenKind::Eof)
    }

    /// Location of the current token, or of the end of input
    fn here(&self) -> Loc {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(Loc::new(1, 1), Token::loc)
    }

    fn expr(&mut self, depth: usize) -> Result<Node, SyntaxError> {
        let Some(token) = self.peek() else {
            return Err(SyntaxError::new(
                SyntaxErrorKind::UnexpectedToken,
                "Unexpected end of input",
                self.here(),
            ));
        };
        let loc = token.loc();
        if depth >= MAX_PARSE_DEPTH {
            return Err(SyntaxError::new(
                SyntaxErrorKind::TooDeeplyNested,
                format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                loc,
            ));
        }
        self.pos += 1;

        let kind = match &token.kind {
            TokenKind::Int(n) => NodeKind::Int(*n),
            TokenKind::Float(n) => NodeKind::Float(*n),
            TokenKind::Str(s) => NodeKind::Str(s.clone()),
            TokenKind::Bool(b) => NodeKind::Bool(*b),
            TokenKind::Null => NodeKind::Null,
            TokenKind::Symbol(s) => NodeKind::Symbol(s.clone()),
            TokenKind::Keyword(k) => NodeKind::Keyword(k.clone()),
            TokenKind::Hash(h) => NodeKind::HashRef(h.clone()),
            TokenKind::Pipe => NodeKind::Symbol("|>".to_owned()),
            TokenKind::Quote => NodeKind::Quote(Box::new(self.expr(depth + 1)?)),
            TokenKind::Unquote => NodeKind::Unquote(Box::new(self.expr(depth + 1)?)),
            TokenKind::Splice => NodeKind::Splice(Box::new(self.expr(depth + 1)?)),
            TokenKind::LParen => NodeKind::SExpr(self.seq(&TokenKind::RParen, "(", loc, depth)?),
            TokenKind::LBracket => {
                NodeKind::ListLit(self.seq(&TokenKind::RBracket, "[", loc, depth)?)
            }
            TokenKind::LBrace => {
                let items = self.seq(&TokenKind::RBrace, "{", loc, depth)?;
                if items.len() % 2 != 0 {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::OddMapLiteral,
                        "Map literal needs an even number of forms",
                        loc,
                    ));
                }
                NodeKind::MapLit(items)
            }
            other => {
                return Err(SyntaxError::new(
                    SyntaxErrorKind::UnexpectedToken,
                    format!("Unexpected {}", other.describe()),
                    loc,
                ));
            }
        };
        Ok(Node::at(kind, loc))
    }

    /// Elements up to the closing delimiter. Running out of input reports
    /// the location of the opening one.
    fn seq(
        &mut self,
        close: &TokenKind,
        open: &str,
        open_loc: Loc,
        depth: usize,
    ) -> Result<Vec<Node>, SyntaxError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::Unclosed,
                        format!("Unclosed '{open}'"),
                        open_loc,
                    ));
                }
                Some(token) if token.kind == *close => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(_) => items.push(self.expr(depth + 1)?),
            }
        }
    }
}

/// Parse a token stream into top-level expressions
pub fn parse(tokens: &[Token]) -> Result<Vec<Node>, Error> {
    let mut parser = Parser { tokens, pos: 0 };
    let mut nodes = Vec::new();
    while parser.peek().is_some() {
        nodes.push(parser.expr(0)?);
    }
    Ok(nodes)
}

/// Tokenize and parse source text
pub fn parse_source(source: &str) -> Result<Vec<Node>, Error> {
    parse(&tokenize(source)?)
}
