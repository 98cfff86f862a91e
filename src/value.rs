//! Runtime values.
//!
//! [`Value`] is a closed sum type covering data (numbers, strings, lists,
//! maps, keywords, hash references, quoted code), callables (closures,
//! macros, builtins) and the hive records (cells, collectives, packets,
//! intents). Helper functions [`val`] and [`sym`] build values from Rust
//! literals, mostly for tests.
//!
//! `Display` is the language's own rendering, used by `print`, `str` and the
//! REPL: `N`, `T`, `F`, raw strings, `[1 2 3]`, `{:a 1}` and `<cell id>`.

use crate::Error;
use crate::ast::Node;
use crate::evaluator::Environment;
use crate::evaluator::intooperation::OperationFn;
use crate::evaluator::{Arity, Interpreter};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Map payload. Keys are kept sorted so display and hashing are stable.
pub type ValueMap = BTreeMap<String, Value>;

/// Shared handle to a mutable cell
pub type CellRef = Rc<RefCell<Cell>>;

/// Builtin that needs the interpreter, e.g. to call back into closures or
/// to write to its output sink.
pub type HostFn = fn(&mut Interpreter, Vec<Value>) -> Result<Value, Error>;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<Vec<Value>>),
    Map(Rc<ValueMap>),
    Keyword(String),
    HashRef(String),
    /// A quoted symbol
    Symbol(String),
    /// A quoted S-expression
    Form(Rc<Vec<Value>>),
    Closure(Rc<Closure>),
    Macro(Rc<Macro>),
    Builtin(Builtin),
    Cell(CellRef),
    Collective(Rc<Collective>),
    Packet(Rc<Packet>),
    Intent(Rc<Intent>),
}

/// Positional parameter names plus an optional rest parameter (`& rest`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    pub names: Vec<String>,
    pub rest: Option<String>,
}

impl Params {
    /// Collect parameter names from symbol nodes, honoring the `&` marker.
    pub fn from_nodes(nodes: &[Node]) -> Result<Self, Error> {
        let mut params = Params::default();
        let mut iter = nodes.iter();
        while let Some(node) = iter.next() {
            let name = node.as_symbol().ok_or_else(|| {
                Error::TypeError(format!("parameter must be a symbol, got {node}"))
            })?;
            if name == "&" {
                params.rest = iter
                    .next()
                    .and_then(Node::as_symbol)
                    .map(str::to_owned);
                break;
            }
            params.names.push(name.to_owned());
        }
        Ok(params)
    }
}

pub struct Closure {
    pub params: Params,
    pub body: Vec<Node>,
    pub env: Environment,
}

pub struct Macro {
    pub name: String,
    pub params: Params,
    pub template: Node,
}

#[derive(Clone)]
pub enum BuiltinFn {
    /// Pure function over evaluated arguments
    Pure(Arc<OperationFn>),
    /// Function that needs interpreter access
    Host(HostFn),
}

#[derive(Clone)]
pub struct Builtin {
    pub id: String,
    pub arity: Arity,
    pub func: BuiltinFn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub from: String,
    pub content: Value,
}

impl Message {
    pub fn to_value(&self) -> Value {
        let mut map = ValueMap::new();
        map.insert("from".into(), Value::Str(self.from.clone()));
        map.insert("content".into(), self.content.clone());
        Value::map(map)
    }
}

#[derive(Debug)]
pub struct Cell {
    pub id: String,
    pub state: ValueMap,
    pub inbox: VecDeque<Message>,
}

#[derive(Debug)]
pub struct Collective {
    pub shared: BTreeMap<String, Vec<Value>>,
    pub members: Vec<CellRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub hash: String,
    pub data: ValueMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Assert,
    Ask,
    Request,
    Suggest,
    Accept,
    Reject,
}

impl IntentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IntentKind::Assert => "assert",
            IntentKind::Ask => "ask",
            IntentKind::Request => "request",
            IntentKind::Suggest => "suggest",
            IntentKind::Accept => "accept",
            IntentKind::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub kind: IntentKind,
    pub content: Value,
}

/// A number pulled out of a `Value` by the numeric builtins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Value::Int(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// Float rendering: integral values keep one fractional digit (`5.0`).
pub fn format_float(n: f64) -> String {
    if n.is_nan() {
        "nan".to_owned()
    } else if n.is_infinite() {
        let sign = if n < 0.0 { "-" } else { "" };
        format!("{sign}inf")
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn map(map: ValueMap) -> Value {
        Value::Map(Rc::new(map))
    }

    pub fn form(items: Vec<Value>) -> Value {
        Value::Form(Rc::new(items))
    }

    /// HiveSpeak truthiness: `N`, `F`, zero, and empty strings, lists and
    /// maps are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Bool(false) => false,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            _ => true,
        }
    }

    /// Name returned (as a keyword) by the `type` builtin
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Keyword(_) => "keyword",
            Value::HashRef(_) => "hash",
            Value::Symbol(_) => "symbol",
            Value::Form(_) => "form",
            Value::Closure(_) | Value::Builtin(_) => "fn",
            Value::Macro(_) => "macro",
            Value::Cell(_) => "cell",
            Value::Collective(_) => "collective",
            Value::Packet(_) => "packet",
            Value::Intent(_) => "intent",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    /// Coerce a value into a map key: keywords, strings, symbols and hash
    /// references use their bare name, anything else its display text.
    pub fn to_key(&self) -> String {
        match self {
            Value::Keyword(s) | Value::Str(s) | Value::Symbol(s) | Value::HashRef(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Sequence view shared by lists and quoted forms
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Form(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Field lookup used by `get` and `has`. Maps look up their entries;
    /// hive records expose their fields by name.
    pub fn field(&self, key: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.get(key).cloned(),
            Value::Cell(cell) => {
                let cell = cell.borrow();
                match key {
                    "id" => Some(Value::Str(cell.id.clone())),
                    "state" => Some(Value::map(cell.state.clone())),
                    "inbox" => Some(Value::list(
                        cell.inbox.iter().map(Message::to_value).collect(),
                    )),
                    _ => None,
                }
            }
            Value::Collective(coll) => match key {
                "shared" => Some(Value::map(
                    coll.shared
                        .iter()
                        .map(|(k, vs)| (k.clone(), Value::list(vs.clone())))
                        .collect(),
                )),
                "cells" => Some(Value::list(
                    coll.members.iter().cloned().map(Value::Cell).collect(),
                )),
                _ => None,
            },
            Value::Packet(packet) => match key {
                "hash" => Some(Value::Str(packet.hash.clone())),
                "data" => Some(Value::map(packet.data.clone())),
                _ => None,
            },
            Value::Intent(intent) => match key {
                "intent" => Some(Value::Str(intent.kind.as_str().to_owned())),
                "content" => Some(intent.content.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// All fields as a map, for `keys` and `vals`
    pub fn fields(&self) -> Option<ValueMap> {
        let names: &[&str] = match self {
            Value::Map(map) => return Some(ValueMap::clone(map)),
            Value::Cell(_) => &["id", "inbox", "state"],
            Value::Collective(_) => &["cells", "shared"],
            Value::Packet(_) => &["data", "hash"],
            Value::Intent(_) => &["content", "intent"],
            _ => return None,
        };
        names
            .iter()
            .map(|name| Some(((*name).to_owned(), self.field(name)?)))
            .collect()
    }

    /// Ordering for `<`, `>` and `srt`: numbers, strings, and lists of
    /// comparable elements.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_number()?.as_f64().partial_cmp(&other.as_number()?.as_f64())
            }
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        unequal => return Some(unequal),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(n) => Some(Number::Float(*n)),
            _ => None,
        }
    }

    /// Canonical JSON form used for content hashing. Values without a JSON
    /// counterpart serialize as their display text.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or_else(|| Json::String(format_float(*n))),
            Value::Str(s) => Json::String(s.clone()),
            Value::List(items) | Value::Form(items) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Packet(packet) => Json::Object(
                [
                    ("hash".to_owned(), Json::String(packet.hash.clone())),
                    ("data".to_owned(), Value::map(packet.data.clone()).to_json()),
                ]
                .into_iter()
                .collect(),
            ),
            other => Json::String(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "N"),
            Value::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => write_seq(f, "[", items, "]"),
            Value::Form(items) => write_seq(f, "(", items, ")"),
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, ":{k} {v}")?;
                }
                write!(f, "}}")
            }
            Value::Keyword(k) => write!(f, ":{k}"),
            Value::HashRef(h) => write!(f, "#{h}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Closure(_) => write!(f, "<fn>"),
            Value::Macro(_) => write!(f, "<macro>"),
            Value::Builtin(_) => write!(f, "<builtin>"),
            Value::Cell(cell) => write!(f, "<cell {}>", cell.borrow().id),
            Value::Collective(coll) => write!(f, "<collective {}>", coll.members.len()),
            Value::Packet(packet) => write!(f, "<packet {}>", packet.hash),
            Value::Intent(intent) => write!(f, "<intent {}>", intent.kind.as_str()),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "{close}")
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(n) => write!(f, "Float({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Form(items) => f.debug_tuple("Form").field(items).finish(),
            Value::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Value::Keyword(k) => write!(f, "Keyword({k})"),
            Value::HashRef(h) => write!(f, "HashRef({h})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Closure(c) => write!(f, "Closure({:?})", c.params),
            Value::Macro(m) => write!(f, "Macro({})", m.name),
            Value::Builtin(b) => write!(f, "Builtin({})", b.id),
            Value::Cell(cell) => write!(f, "Cell({})", cell.borrow().id),
            Value::Collective(coll) => f.debug_tuple("Collective").field(&coll.shared).finish(),
            Value::Packet(p) => write!(f, "Packet({})", p.hash),
            Value::Intent(i) => write!(f, "Intent({}, {:?})", i.kind.as_str(), i.content),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Form(a), Value::Form(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::HashRef(a), Value::HashRef(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Macro(a), Value::Macro(b)) => Rc::ptr_eq(a, b),
            // Compare builtins by id, not function pointer
            (Value::Builtin(a), Value::Builtin(b)) => a.id == b.id,
            (Value::Cell(a), Value::Cell(b)) => Rc::ptr_eq(a, b),
            (Value::Collective(a), Value::Collective(b)) => Rc::ptr_eq(a, b),
            (Value::Packet(a), Value::Packet(b)) => a.hash == b.hash,
            (Value::Intent(a), Value::Intent(b)) => a == b,
            _ => false,
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Int(n as i64)
            }
        }
    };
}

impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u32);

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// Fallible conversions from `Value` back into primitive Rust types.

impl TryInto<i64> for Value {
    type Error = Error;

    fn try_into(self) -> Result<i64, Error> {
        if let Value::Int(n) = self {
            Ok(n)
        } else {
            Err(Error::TypeError(format!("expected int, got {}", self.type_name())))
        }
    }
}

impl TryInto<Number> for Value {
    type Error = Error;

    fn try_into(self) -> Result<Number, Error> {
        self.as_number().ok_or_else(|| {
            Error::TypeError(format!("expected number, got {}", self.type_name()))
        })
    }
}

impl TryInto<ValueMap> for Value {
    type Error = Error;

    fn try_into(self) -> Result<ValueMap, Error> {
        if let Value::Map(map) = self {
            Ok(Rc::unwrap_or_clone(map))
        } else {
            Err(Error::TypeError(format!("expected map, got {}", self.type_name())))
        }
    }
}

impl TryInto<Vec<Value>> for Value {
    type Error = Error;

    fn try_into(self) -> Result<Vec<Value>, Error> {
        match self {
            Value::List(items) | Value::Form(items) => Ok(Rc::unwrap_or_clone(items)),
            other => Err(Error::TypeError(format!(
                "expected list, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Helper function for creating Values from Rust literals
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating quoted symbols
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating keywords
pub fn kw<S: AsRef<str>>(name: S) -> Value {
    Value::Keyword(name.as_ref().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness_table() {
        let falsy = vec![
            Value::Null,
            val(false),
            val(0),
            val(0.0),
            val(""),
            Value::list(vec![]),
            Value::map(ValueMap::new()),
        ];
        for v in falsy {
            assert!(!v.is_truthy(), "{v:?} should be falsy");
        }

        let truthy = vec![
            val(true),
            val(-1),
            val(0.5),
            val(" "),
            val([0]),
            kw("k"),
            Value::HashRef("h".into()),
            Value::map([("a".to_owned(), Value::Null)].into_iter().collect()),
        ];
        for v in truthy {
            assert!(v.is_truthy(), "{v:?} should be truthy");
        }
    }

    #[test]
    fn test_display_format() {
        let map: ValueMap = [("b".to_owned(), val(2)), ("a".to_owned(), val("x"))]
            .into_iter()
            .collect();
        let cases = vec![
            (Value::Null, "N"),
            (val(true), "T"),
            (val(false), "F"),
            (val(42), "42"),
            (val(5.0), "5.0"),
            (val(2.5), "2.5"),
            (val(f64::INFINITY), "inf"),
            (val("raw text"), "raw text"),
            (val([1, 2, 3]), "[1 2 3]"),
            (Value::map(map), "{:a x :b 2}"),
            (kw("name"), ":name"),
            (Value::HashRef("abc".into()), "#abc"),
            (Value::form(vec![sym("+"), val(1), val(2)]), "(+ 1 2)"),
            (
                Value::Intent(Rc::new(Intent {
                    kind: IntentKind::Ask,
                    content: Value::Null,
                })),
                "<intent ask>",
            ),
        ];
        for (value, expected) in cases {
            assert_eq!(value.to_string(), expected);
        }
    }

    #[test]
    fn test_equality() {
        assert_eq!(val(1), val(1.0));
        assert_eq!(val([1, 2]), val([1, 2]));
        assert_ne!(val(1), val("1"));
        assert_ne!(Value::list(vec![val(1)]), Value::form(vec![val(1)]));
        assert_ne!(kw("a"), val("a"));
    }

    #[test]
    fn test_compare() {
        assert_eq!(val(1).compare(&val(2.5)), Some(Ordering::Less));
        assert_eq!(val("b").compare(&val("a")), Some(Ordering::Greater));
        assert_eq!(val([1, 2]).compare(&val([1, 3])), Some(Ordering::Less));
        assert_eq!(val(1).compare(&val("a")), None);
    }

    #[test]
    fn test_to_json_is_canonical() {
        let map: ValueMap = [("z".to_owned(), val(1)), ("a".to_owned(), val([true]))]
            .into_iter()
            .collect();
        assert_eq!(Value::map(map).to_json().to_string(), r#"{"a":[true],"z":1}"#);
        assert_eq!(kw("k").to_json().to_string(), r#"":k""#);
    }
}
