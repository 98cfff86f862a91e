//! AST node model produced by the parser and consumed by the evaluator.
//!
//! Every [`Node`] carries an optional source location. Locations are ignored
//! by equality, so a tree rebuilt from runtime data (see [`crate::quote`])
//! compares equal to the parsed original. Helper constructors such as
//! [`int`], [`sym`] and [`sexpr`] build location-free nodes for tests and for
//! code that synthesizes programs.

use crate::Loc;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Symbol(String),
    Keyword(String),
    HashRef(String),
    /// `( ... )`: call form or special form
    SExpr(Vec<Node>),
    /// `[ ... ]`
    ListLit(Vec<Node>),
    /// `{ ... }`, flat alternating key/value
    MapLit(Vec<Node>),
    Quote(Box<Node>),
    Unquote(Box<Node>),
    Splice(Box<Node>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub loc: Option<Loc>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Node { kind, loc: None }
    }

    pub fn at(kind: NodeKind, loc: Loc) -> Self {
        Node {
            kind,
            loc: Some(loc),
        }
    }

    /// The symbol name, if this node is a bare symbol
    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Elements of a bracketed or parenthesized sequence
    pub fn as_sequence(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::SExpr(items) | NodeKind::ListLit(items) => Some(items),
            _ => None,
        }
    }

    /// Upper-case tag used by the AST dump
    pub fn tag(&self) -> &'static str {
        match &self.kind {
            NodeKind::Int(_) => "INT",
            NodeKind::Float(_) => "FLOAT",
            NodeKind::Str(_) => "STR",
            NodeKind::Bool(_) => "BOOL",
            NodeKind::Null => "NULL",
            NodeKind::Symbol(_) => "SYM",
            NodeKind::Keyword(_) => "KW",
            NodeKind::HashRef(_) => "HASH",
            NodeKind::SExpr(_) => "SEXPR",
            NodeKind::ListLit(_) => "LIST",
            NodeKind::MapLit(_) => "MAP",
            NodeKind::Quote(_) => "QUOTE",
            NodeKind::Unquote(_) => "UNQUOTE",
            NodeKind::Splice(_) => "SPLICE",
        }
    }

    /// Indented tree dump, one node per line.
    pub fn dump(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        match &self.kind {
            NodeKind::SExpr(items) | NodeKind::ListLit(items) | NodeKind::MapLit(items) => {
                out.push_str(&format!("{indent}{}:\n", self.tag()));
                for item in items {
                    item.dump(depth + 1, out);
                }
            }
            NodeKind::Quote(inner) | NodeKind::Unquote(inner) | NodeKind::Splice(inner) => {
                out.push_str(&format!("{indent}{}:\n", self.tag()));
                inner.dump(depth + 1, out);
            }
            NodeKind::Null => out.push_str(&format!("{indent}NULL\n")),
            _ => out.push_str(&format!("{indent}{}: {self}\n", self.tag())),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[Node], close: &str) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "{close}")
}

/// Renders the node back to parseable source text.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Int(n) => write!(f, "{n}"),
            NodeKind::Float(n) => write!(f, "{}", crate::value::format_float(*n)),
            NodeKind::Str(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            NodeKind::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
            NodeKind::Null => write!(f, "N"),
            NodeKind::Symbol(s) => write!(f, "{s}"),
            NodeKind::Keyword(k) => write!(f, ":{k}"),
            NodeKind::HashRef(h) => write!(f, "#{h}"),
            NodeKind::SExpr(items) => write_seq(f, "(", items, ")"),
            NodeKind::ListLit(items) => write_seq(f, "[", items, "]"),
            NodeKind::MapLit(items) => write_seq(f, "{", items, "}"),
            NodeKind::Quote(inner) => write!(f, "'{inner}"),
            NodeKind::Unquote(inner) => write!(f, "~{inner}"),
            NodeKind::Splice(inner) => write!(f, "~@{inner}"),
        }
    }
}

pub fn int(n: i64) -> Node {
    Node::new(NodeKind::Int(n))
}

pub fn float(n: f64) -> Node {
    Node::new(NodeKind::Float(n))
}

pub fn string<S: Into<String>>(s: S) -> Node {
    Node::new(NodeKind::Str(s.into()))
}

pub fn boolean(b: bool) -> Node {
    Node::new(NodeKind::Bool(b))
}

pub fn null() -> Node {
    Node::new(NodeKind::Null)
}

pub fn sym<S: AsRef<str>>(name: S) -> Node {
    Node::new(NodeKind::Symbol(name.as_ref().to_owned()))
}

pub fn keyword<S: AsRef<str>>(name: S) -> Node {
    Node::new(NodeKind::Keyword(name.as_ref().to_owned()))
}

pub fn hash_ref<S: AsRef<str>>(name: S) -> Node {
    Node::new(NodeKind::HashRef(name.as_ref().to_owned()))
}

pub fn sexpr(items: Vec<Node>) -> Node {
    Node::new(NodeKind::SExpr(items))
}

pub fn list(items: Vec<Node>) -> Node {
    Node::new(NodeKind::ListLit(items))
}

pub fn map(items: Vec<Node>) -> Node {
    Node::new(NodeKind::MapLit(items))
}

pub fn quote(inner: Node) -> Node {
    Node::new(NodeKind::Quote(Box::new(inner)))
}
