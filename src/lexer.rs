//! Tokenizer for HiveSpeak source text.
//!
//! Each token carries the 1-based line and column of its first character.
//! The token stream always ends with a single [`TokenKind::Eof`].

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, satisfy},
    combinator::{opt, recognize, value},
    sequence::{pair, preceded},
};

use crate::{Error, Loc, SyntaxError, SyntaxErrorKind};

/// Characters that may start a symbol in addition to letters
pub const SYMBOL_SPECIAL_CHARS: &str = "_!?+-*/<>=&|%";

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Symbol(String),
    Keyword(String),
    Hash(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Quote,
    Unquote,
    Splice,
    Pipe,
    Eof,
}

impl TokenKind {
    /// Short upper-case name used by the token dump
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Int(_) => "INT",
            TokenKind::Float(_) => "FLOAT",
            TokenKind::Str(_) => "STRING",
            TokenKind::Bool(_) => "BOOL",
            TokenKind::Null => "NULL",
            TokenKind::Symbol(_) => "SYM",
            TokenKind::Keyword(_) => "KW",
            TokenKind::Hash(_) => "HASH",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::LBracket => "LBRACKET",
            TokenKind::RBracket => "RBRACKET",
            TokenKind::LBrace => "LBRACE",
            TokenKind::RBrace => "RBRACE",
            TokenKind::Quote => "QUOTE",
            TokenKind::Unquote => "UNQUOTE",
            TokenKind::Splice => "SPLICE",
            TokenKind::Pipe => "PIPE",
            TokenKind::Eof => "EOF",
        }
    }

    /// Source-like rendering used in parser error messages
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Int(n) => n.to_string(),
            TokenKind::Float(n) => n.to_string(),
            TokenKind::Str(s) => format!("{s:?}"),
            TokenKind::Bool(true) => "T".into(),
            TokenKind::Bool(false) => "F".into(),
            TokenKind::Null => "N".into(),
            TokenKind::Symbol(s) => s.clone(),
            TokenKind::Keyword(k) => format!(":{k}"),
            TokenKind::Hash(h) => format!("#{h}"),
            TokenKind::LParen => "'('".into(),
            TokenKind::RParen => "')'".into(),
            TokenKind::LBracket => "'['".into(),
            TokenKind::RBracket => "']'".into(),
            TokenKind::LBrace => "'{'".into(),
            TokenKind::RBrace => "'}'".into(),
            TokenKind::Quote => "'''".into(),
            TokenKind::Unquote => "'~'".into(),
            TokenKind::Splice => "'~@'".into(),
            TokenKind::Pipe => "'|>'".into(),
            TokenKind::Eof => "EOF".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub col: usize,
}

impl Token {
    pub fn loc(&self) -> Loc {
        Loc::new(self.line, self.col)
    }
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';' | '\'')
}

fn is_symbol_start(c: char) -> bool {
    c.is_alphabetic() || SYMBOL_SPECIAL_CHARS.contains(c)
}

/// Skip whitespace and `;` comments
fn skip_trivia(input: &str) -> &str {
    let mut rest = input.trim_start();
    while let Some(comment) = rest.strip_prefix(';') {
        rest = match comment.find('\n') {
            Some(end) => comment[end..].trim_start(),
            None => "",
        };
    }
    rest
}

fn lex_punct(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::LBracket, char('[')),
        value(TokenKind::RBracket, char(']')),
        value(TokenKind::LBrace, char('{')),
        value(TokenKind::RBrace, char('}')),
        value(TokenKind::Quote, char('\'')),
        value(TokenKind::Splice, tag("~@")),
        value(TokenKind::Unquote, char('~')),
        value(TokenKind::Pipe, tag("|>")),
    ))
    .parse(input)
}

/// Number text: `-?digits(.digits)?`. Conversion happens in the caller so
/// out-of-range literals become syntax errors rather than symbols.
fn lex_number(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        pair(opt(char('-')), digit1),
        opt(pair(char('.'), digit1)),
    ))
    .parse(input)
}

fn lex_keyword(input: &str) -> IResult<&str, TokenKind> {
    preceded(char(':'), take_while(|c: char| !is_boundary(c)))
        .map(|name: &str| TokenKind::Keyword(name.to_owned()))
        .parse(input)
}

fn lex_hash(input: &str) -> IResult<&str, TokenKind> {
    preceded(char('#'), take_while1(|c: char| !is_boundary(c)))
        .map(|name: &str| TokenKind::Hash(name.to_owned()))
        .parse(input)
}

fn lex_symbol(input: &str) -> IResult<&str, TokenKind> {
    recognize(pair(satisfy(is_symbol_start), take_while(|c: char| !is_boundary(c))))
        .map(|text: &str| match text {
            "T" => TokenKind::Bool(true),
            "F" => TokenKind::Bool(false),
            "N" => TokenKind::Null,
            _ => TokenKind::Symbol(text.to_owned()),
        })
        .parse(input)
}

/// Parse a string literal body after the opening quote. Returns `None` when
/// the input ends before the closing quote.
fn lex_string(input: &str) -> Option<(&str, String)> {
    let mut chars = input.char_indices();
    let mut out = String::new();
    while let Some((_, ch)) = chars.next() {
        match ch {
            '"' => return Some((chars.as_str(), out)),
            '\\' => {
                let (_, escaped) = chars.next()?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
            }
            other => out.push(other),
        }
    }
    None
}

/// Maps byte offsets into the source to line/column positions.
struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex {
            source,
            line_starts,
        }
    }

    fn loc(&self, offset: usize) -> Loc {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let start = self.line_starts[line - 1];
        let col = self.source[start..offset].chars().count() + 1;
        Loc::new(line, col)
    }
}

/// Split source text into located tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    let index = LineIndex::new(source);
    let mut tokens = Vec::new();
    let mut rest = skip_trivia(source);

    while !rest.is_empty() {
        let loc = index.loc(source.len() - rest.len());
        let (remaining, kind) = lex_one(rest, loc)?;
        tokens.push(Token {
            kind,
            line: loc.line,
            col: loc.col,
        });
        rest = skip_trivia(remaining);
    }

    let end = index.loc(source.len());
    tokens.push(Token {
        kind: TokenKind::Eof,
        line: end.line,
        col: end.col,
    });
    Ok(tokens)
}

fn lex_one(input: &str, loc: Loc) -> Result<(&str, TokenKind), SyntaxError> {
    if let Some(body) = input.strip_prefix('"') {
        return lex_string(body)
            .map(|(rest, s)| (rest, TokenKind::Str(s)))
            .ok_or_else(|| {
                SyntaxError::new(
                    SyntaxErrorKind::UnterminatedString,
                    "Unterminated string",
                    loc,
                )
            });
    }

    if let Ok((rest, text)) = lex_number(input) {
        return number_token(text, loc).map(|kind| (rest, kind));
    }

    alt((lex_punct, lex_keyword, lex_hash, lex_symbol))
        .parse(input)
        .map_err(|_| {
            let found = input.chars().next().unwrap_or_default();
            SyntaxError::new(
                SyntaxErrorKind::UnexpectedCharacter,
                format!("Unexpected character '{found}'"),
                loc,
            )
        })
}

fn number_token(text: &str, loc: Loc) -> Result<TokenKind, SyntaxError> {
    let invalid = || {
        SyntaxError::new(
            SyntaxErrorKind::InvalidNumber,
            format!("Number literal out of range: {text}"),
            loc,
        )
    };
    if text.contains('.') {
        text.parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|_| invalid())
    } else {
        text.parse::<i64>().map(TokenKind::Int).map_err(|_| invalid())
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn sym(s: &str) -> TokenKind {
        TokenKind::Symbol(s.into())
    }

    #[test]
    fn test_token_kinds() {
        use TokenKind::*;
        let cases: Vec<(&str, Vec<TokenKind>)> = vec![
            ("42", vec![Int(42), Eof]),
            ("-7", vec![Int(-7), Eof]),
            ("2.5", vec![Float(2.5), Eof]),
            ("-0.5", vec![Float(-0.5), Eof]),
            ("T F N", vec![Bool(true), Bool(false), Null, Eof]),
            ("\"hi\"", vec![Str("hi".into()), Eof]),
            (":name", vec![Keyword("name".into()), Eof]),
            ("#abc123", vec![Hash("abc123".into()), Eof]),
            ("|>", vec![Pipe, Eof]),
            ("'x", vec![Quote, sym("x"), Eof]),
            ("~x ~@xs", vec![Unquote, sym("x"), Splice, sym("xs"), Eof]),
            (
                "([{}])",
                vec![LParen, LBracket, LBrace, RBrace, RBracket, RParen, Eof],
            ),
            // Symbols with punctuation stay whole
            ("suggest~", vec![sym("suggest~"), Eof]),
            ("accept+ reject-", vec![sym("accept+"), sym("reject-"), Eof]),
            ("int? set-state", vec![sym("int?"), sym("set-state"), Eof]),
            ("- -x", vec![sym("-"), sym("-x"), Eof]),
            ("<= != %", vec![sym("<="), sym("!="), sym("%"), Eof]),
            // Literal names only match exactly
            ("Tx Nope", vec![sym("Tx"), sym("Nope"), Eof]),
            // Comments and whitespace
            ("; only a comment", vec![Eof]),
            ("1 ; trailing\n2", vec![Int(1), Int(2), Eof]),
            ("", vec![Eof]),
        ];

        for (source, expected) in cases {
            assert_eq!(kinds(source), expected, "source: {source:?}");
        }
    }

    #[test]
    fn test_string_escapes() {
        let cases = [
            (r#""a\nb""#, "a\nb"),
            (r#""tab\there""#, "tab\there"),
            (r#""cr\r""#, "cr\r"),
            (r#""back\\slash""#, "back\\slash"),
            (r#""say \"hi\"""#, "say \"hi\""),
            (r#""keep\q""#, "keepq"),
        ];
        for (source, expected) in cases {
            assert_eq!(
                kinds(source),
                vec![TokenKind::Str(expected.into()), TokenKind::Eof],
                "source: {source}"
            );
        }
    }

    #[test]
    fn test_locations() {
        let tokens = tokenize("(def x\n  42)").unwrap();
        let locs: Vec<(usize, usize)> = tokens.iter().map(|t| (t.line, t.col)).collect();
        assert_eq!(locs, vec![(1, 1), (1, 2), (1, 6), (2, 3), (2, 5), (2, 6)]);
    }

    #[test]
    fn test_lex_errors() {
        let cases = [
            ("\"open", SyntaxErrorKind::UnterminatedString, (1, 1)),
            ("(a @)", SyntaxErrorKind::UnexpectedCharacter, (1, 4)),
            (
                "99999999999999999999",
                SyntaxErrorKind::InvalidNumber,
                (1, 1),
            ),
        ];
        for (source, kind, (line, col)) in cases {
            match tokenize(source) {
                Err(Error::Syntax(err)) => {
                    assert_eq!(err.kind, kind, "source: {source}");
                    assert_eq!((err.line, err.col), (line, col), "source: {source}");
                }
                other => panic!("expected syntax error for {source}, got {other:?}"),
            }
        }
    }
}
