//! Conversion between code and data.
//!
//! [`node_to_data`] turns an AST node into a first-class value without
//! evaluating it: symbols stay symbols, S-expressions become [`Value::Form`]
//! and list literals become lists. [`data_to_node`] is the inverse used by
//! `eval`. Quote prefixes become two-element forms headed by `quote`,
//! `unquote` or `splice`, and rebuild as the prefix node on the way back.

use crate::ast::{Node, NodeKind};
use crate::value::{Value, ValueMap};
use crate::{Error, MAX_PARSE_DEPTH};

const WRAPPERS: [&str; 3] = ["quote", "unquote", "splice"];

fn wrapped(name: &str, inner: &Node) -> Value {
    Value::form(vec![Value::Symbol(name.to_owned()), node_to_data(inner)])
}

pub fn node_to_data(node: &Node) -> Value {
    match &node.kind {
        NodeKind::Int(n) => Value::Int(*n),
        NodeKind::Float(n) => Value::Float(*n),
        NodeKind::Str(s) => Value::Str(s.clone()),
        NodeKind::Bool(b) => Value::Bool(*b),
        NodeKind::Null => Value::Null,
        NodeKind::Symbol(s) => Value::Symbol(s.clone()),
        NodeKind::Keyword(k) => Value::Keyword(k.clone()),
        NodeKind::HashRef(h) => Value::HashRef(h.clone()),
        NodeKind::SExpr(items) => Value::form(items.iter().map(node_to_data).collect()),
        NodeKind::ListLit(items) => Value::list(items.iter().map(node_to_data).collect()),
        NodeKind::MapLit(items) => Value::map(
            items
                .chunks_exact(2)
                .map(|pair| (node_to_data(&pair[0]).to_key(), node_to_data(&pair[1])))
                .collect(),
        ),
        NodeKind::Quote(inner) => wrapped("quote", inner),
        NodeKind::Unquote(inner) => wrapped("unquote", inner),
        NodeKind::Splice(inner) => wrapped("splice", inner),
    }
}

/// Rebuild code from data. Nesting is bounded by [`MAX_PARSE_DEPTH`], the
/// same limit source text is held to.
pub fn data_to_node(value: &Value) -> Result<Node, Error> {
    convert(value, 0)
}

fn convert(value: &Value, depth: usize) -> Result<Node, Error> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(Error::EvalError(format!(
            "data too deeply nested to evaluate (max depth: {MAX_PARSE_DEPTH})"
        )));
    }
    let kind = match value {
        Value::Null => NodeKind::Null,
        Value::Bool(b) => NodeKind::Bool(*b),
        Value::Int(n) => NodeKind::Int(*n),
        Value::Float(n) => NodeKind::Float(*n),
        Value::Str(s) => NodeKind::Str(s.clone()),
        Value::Symbol(s) => NodeKind::Symbol(s.clone()),
        Value::Keyword(k) => NodeKind::Keyword(k.clone()),
        Value::HashRef(h) => NodeKind::HashRef(h.clone()),
        Value::List(items) => NodeKind::ListLit(nodes(items, depth)?),
        Value::Map(map) => NodeKind::MapLit(map_nodes(map, depth)?),
        Value::Form(items) => match items.as_slice() {
            [Value::Symbol(head), inner] if WRAPPERS.contains(&head.as_str()) => {
                let inner = Box::new(convert(inner, depth + 1)?);
                match head.as_str() {
                    "quote" => NodeKind::Quote(inner),
                    "unquote" => NodeKind::Unquote(inner),
                    _ => NodeKind::Splice(inner),
                }
            }
            _ => NodeKind::SExpr(nodes(items, depth)?),
        },
        other => {
            return Err(Error::TypeError(format!(
                "cannot convert {} to code",
                other.type_name()
            )));
        }
    };
    Ok(Node::new(kind))
}

fn nodes(items: &[Value], depth: usize) -> Result<Vec<Node>, Error> {
    items.iter().map(|item| convert(item, depth + 1)).collect()
}

fn map_nodes(map: &ValueMap, depth: usize) -> Result<Vec<Node>, Error> {
    let mut out = Vec::with_capacity(map.len() * 2);
    for (key, value) in map {
        out.push(Node::new(NodeKind::Keyword(key.clone())));
        out.push(convert(value, depth + 1)?);
    }
    Ok(out)
}
