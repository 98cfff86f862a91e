//! Built-in operations registry.
//!
//! Every name the evaluator knows natively lives in one table: pure
//! functions, host functions that need the interpreter (to call back into
//! closures or write output), and special forms that receive their arguments
//! unevaluated.
//!
//! ```text
//! (+ 1 2 3)                 ; function: arguments evaluated first
//! (map (fn [x] (* x x)) xs) ; host function: calls back into a closure
//! (if c a b)                ; special form: controls evaluation
//! ```
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with ordinary Rust parameter types
//!    (`Value`, `i64`, `Number`, `&str`, `ValueMap`, `Vec<Value>`, or one of
//!    the iterator types for a variadic tail)
//! 2. **Add it to BUILTIN_OPS** with its name and arity
//! 3. **Add tests** covering edge cases and error conditions

use crate::Error;
use crate::evaluator::hive::{self, content_hash};
use crate::evaluator::intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
use crate::evaluator::{
    Arity, Interpreter, NumIter, SpecialFormFn, ValueIter, modules, special_forms,
};
use crate::value::{HostFn, Number, Value, ValueMap, format_float};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Represents the implementation of a built-in operation
#[derive(Clone)]
pub enum OpKind {
    /// Regular function over evaluated arguments, via the canonical erased
    /// builtin signature
    Function(Arc<OperationFn>),
    /// Function over evaluated arguments that needs the interpreter
    Host(HostFn),
    /// Special form receiving unevaluated argument nodes
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::Host(_) => write!(f, "Host(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

impl PartialEq for OpKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OpKind::Function(f1), OpKind::Function(f2)) => Arc::ptr_eq(f1, f2),
            (OpKind::Host(f1), OpKind::Host(f2)) => std::ptr::fn_addr_eq(*f1, *f2),
            (OpKind::SpecialForm(f1), OpKind::SpecialForm(f2)) => std::ptr::fn_addr_eq(*f1, *f2),
            _ => false,
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The name this operation is bound to
    pub id: &'static str,
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    #[cfg_attr(not(test), expect(dead_code))]
    pub(crate) fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }
}

//
// Arithmetic
//

fn number(value: &Value) -> Result<Number, Error> {
    value
        .as_number()
        .ok_or_else(|| Error::TypeError(format!("expected number, got {}", value.type_name())))
}

// Integer results are overflow checked; any float operand promotes.
macro_rules! checked_arithmetic {
    ($name:ident, $checked:ident, $op:tt, $what:literal) => {
        fn $name(a: Number, b: Number) -> Result<Number, Error> {
            match (a, b) {
                (Number::Int(x), Number::Int(y)) => x
                    .$checked(y)
                    .map(Number::Int)
                    .ok_or_else(|| Error::EvalError(concat!("Integer overflow in ", $what).into())),
                _ => Ok(Number::Float(a.as_f64() $op b.as_f64())),
            }
        }
    };
}

checked_arithmetic!(num_add, checked_add, +, "addition");
checked_arithmetic!(num_sub, checked_sub, -, "subtraction");
checked_arithmetic!(num_mul, checked_mul, *, "multiplication");

/// Numeric sum, or concatenation when every argument is a string or every
/// argument is a list
fn builtin_add(args: ValueIter<'_>) -> Result<Value, Error> {
    let args: Vec<&Value> = args.collect();
    if args.is_empty() {
        return Ok(Value::Int(0));
    }
    if args.iter().all(|v| matches!(v, Value::Str(_))) {
        return Ok(Value::Str(args.iter().map(|v| v.to_string()).collect()));
    }
    if args.iter().all(|v| matches!(v, Value::List(_))) {
        let joined = args
            .iter()
            .filter_map(|v| v.as_seq())
            .flatten()
            .cloned()
            .collect();
        return Ok(Value::list(joined));
    }
    args.iter()
        .try_fold(Number::Int(0), |acc, v| num_add(acc, number(v)?))
        .map(Value::from)
}

fn builtin_sub(first: Number, rest: NumIter<'_>) -> Result<Number, Error> {
    let mut rest = rest.peekable();
    if rest.peek().is_none() {
        return num_sub(Number::Int(0), first);
    }
    rest.try_fold(first, num_sub)
}

fn builtin_mul(args: NumIter<'_>) -> Result<Number, Error> {
    args.fold(Ok(Number::Int(1)), |acc, n| num_mul(acc?, n))
}

fn divide(a: f64, b: f64) -> f64 {
    if b == 0.0 { f64::INFINITY } else { a / b }
}

/// Float division; `(/ x)` is `1/x` and a zero divisor yields `inf`
fn builtin_div(first: Number, rest: NumIter<'_>) -> f64 {
    let mut rest = rest.peekable();
    if rest.peek().is_none() {
        return divide(1.0, first.as_f64());
    }
    rest.fold(first.as_f64(), |acc, n| divide(acc, n.as_f64()))
}

/// Remainder with the sign of the divisor
fn builtin_mod(a: Number, b: Number) -> Result<Number, Error> {
    if b.as_f64() == 0.0 {
        return Err(Error::EvalError("modulo by zero".into()));
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let r = x.wrapping_rem(y);
            Ok(Number::Int(if r != 0 && (r < 0) != (y < 0) { r + y } else { r }))
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            let r = x % y;
            Ok(Number::Float(if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }))
        }
    }
}

//
// Comparison and logic
//

fn builtin_eq(a: Value, b: Value) -> bool {
    a == b
}

fn builtin_ne(a: Value, b: Value) -> bool {
    a != b
}

macro_rules! ordering_comparison {
    ($name:ident, $op:literal, $accept:pat) => {
        fn $name(a: Value, b: Value) -> Result<bool, Error> {
            match a.compare(&b) {
                Some(ordering) => Ok(matches!(ordering, $accept)),
                None => Err(Error::TypeError(format!(
                    "cannot compare {} {} {}",
                    a.type_name(),
                    $op,
                    b.type_name()
                ))),
            }
        }
    };
}

ordering_comparison!(builtin_lt, "<", Ordering::Less);
ordering_comparison!(builtin_gt, ">", Ordering::Greater);
ordering_comparison!(builtin_le, "<=", Ordering::Less | Ordering::Equal);
ordering_comparison!(builtin_ge, ">=", Ordering::Greater | Ordering::Equal);

fn builtin_and(a: Value, b: Value) -> Value {
    if a.is_truthy() { b } else { a }
}

fn builtin_or(a: Value, b: Value) -> Value {
    if a.is_truthy() { a } else { b }
}

fn builtin_not(value: Value) -> bool {
    !value.is_truthy()
}

//
// Strings
//

/// Lists concatenate; anything else joins display text
fn builtin_cat(args: ValueIter<'_>) -> Result<Value, Error> {
    let args: Vec<&Value> = args.collect();
    if !matches!(args.first(), Some(Value::List(_))) {
        return Ok(Value::Str(args.iter().map(|v| v.to_string()).collect()));
    }
    let mut joined = Vec::new();
    for arg in args {
        match arg {
            Value::List(items) => joined.extend(items.iter().cloned()),
            other => {
                return Err(Error::TypeError(format!(
                    "cat cannot append {} to a list",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::list(joined))
}

fn builtin_len(value: Value) -> Result<usize, Error> {
    match &value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(items) | Value::Form(items) => Ok(items.len()),
        Value::Map(map) => Ok(map.len()),
        other => Err(Error::TypeError(format!("len of {}", other.type_name()))),
    }
}

/// Clamp a possibly negative index into `0..=len`
fn clamp_index(index: i64, len: usize) -> usize {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let index = if index < 0 { index.saturating_add(len) } else { index };
    usize::try_from(index.clamp(0, len)).unwrap_or(0)
}

fn builtin_slc(value: Value, start: i64, mut end: ValueIter<'_>) -> Result<Value, Error> {
    let end = match end.next() {
        Some(Value::Int(n)) => Some(*n),
        None | Some(Value::Null) => None,
        Some(other) => {
            return Err(Error::TypeError(format!(
                "slc end must be an int, got {}",
                other.type_name()
            )));
        }
    };
    let bounds = |len: usize| {
        let from = clamp_index(start, len);
        let to = end.map_or(len, |e| clamp_index(e, len));
        (from, to.max(from))
    };

    match value {
        Value::Str(s) => {
            let (from, to) = bounds(s.chars().count());
            Ok(Value::Str(s.chars().skip(from).take(to - from).collect()))
        }
        Value::List(items) => {
            let (from, to) = bounds(items.len());
            Ok(Value::list(items[from..to].to_vec()))
        }
        other => Err(Error::TypeError(format!("slc of {}", other.type_name()))),
    }
}

/// Character index of a substring, position of a list element, or -1
fn builtin_idx(haystack: Value, needle: Value) -> Result<i64, Error> {
    let position = match (&haystack, &needle) {
        (Value::Str(s), Value::Str(sub)) => s.find(sub.as_str()).map(|b| s[..b].chars().count()),
        (Value::List(items), _) => items.iter().position(|v| *v == needle),
        (other, _) => {
            return Err(Error::TypeError(format!("idx of {}", other.type_name())));
        }
    };
    Ok(position.map_or(-1, |p| i64::try_from(p).unwrap_or(i64::MAX)))
}

fn builtin_spl(s: &str, separator: &str) -> Result<Value, Error> {
    if separator.is_empty() {
        return Err(Error::EvalError("spl: empty separator".into()));
    }
    Ok(Value::list(s.split(separator).map(Value::from).collect()))
}

fn builtin_upr(s: &str) -> String {
    s.to_uppercase()
}

fn builtin_lwr(s: &str) -> String {
    s.to_lowercase()
}

/// Replace each `{}` in order; placeholders without an argument stay
fn builtin_fmt(template: &str, mut args: ValueIter<'_>) -> String {
    let mut pieces = template.split("{}");
    let mut out = pieces.next().unwrap_or_default().to_owned();
    for piece in pieces {
        match args.next() {
            Some(arg) => out.push_str(&arg.to_string()),
            None => out.push_str("{}"),
        }
        out.push_str(piece);
    }
    out
}

//
// Lists
//

fn builtin_hd(value: Value) -> Result<Value, Error> {
    match value {
        Value::List(items) | Value::Form(items) => {
            Ok(items.first().cloned().unwrap_or(Value::Null))
        }
        Value::Str(s) => Ok(s.chars().next().map_or(Value::Null, |c| c.to_string().into())),
        other => Err(Error::TypeError(format!("hd of {}", other.type_name()))),
    }
}

fn builtin_tl(value: Value) -> Result<Value, Error> {
    match value {
        Value::List(items) | Value::Form(items) => {
            Ok(Value::list(items.iter().skip(1).cloned().collect()))
        }
        Value::Str(s) => Ok(Value::Str(s.chars().skip(1).collect())),
        other => Err(Error::TypeError(format!("tl of {}", other.type_name()))),
    }
}

fn builtin_nth(value: Value, index: i64) -> Result<Value, Error> {
    let Ok(index) = usize::try_from(index) else {
        return Ok(Value::Null);
    };
    match value {
        Value::List(items) | Value::Form(items) => {
            Ok(items.get(index).cloned().unwrap_or(Value::Null))
        }
        Value::Str(s) => Ok(s.chars().nth(index).map_or(Value::Null, |c| c.to_string().into())),
        other => Err(Error::TypeError(format!("nth of {}", other.type_name()))),
    }
}

fn builtin_push(mut items: Vec<Value>, item: Value) -> Vec<Value> {
    items.push(item);
    items
}

fn builtin_rev(mut items: Vec<Value>) -> Vec<Value> {
    items.reverse();
    items
}

/// Flatten one level; non-list elements are kept as they are
fn builtin_flat(items: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::List(inner) => out.extend(inner.iter().cloned()),
            other => out.push(other),
        }
    }
    out
}

fn builtin_uniq(items: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn builtin_zip(lists: ValueIter<'_>) -> Result<Value, Error> {
    let lists = lists
        .map(|v| {
            v.as_seq().ok_or_else(|| {
                Error::TypeError(format!("zip expects lists, got {}", v.type_name()))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let shortest = lists.iter().map(|l| l.len()).min().unwrap_or(0);
    Ok(Value::list(
        (0..shortest)
            .map(|i| Value::list(lists.iter().map(|l| l[i].clone()).collect()))
            .collect(),
    ))
}

/// `(range end)`, `(range start end)` or `(range start end step)`
fn builtin_range(args: ValueIter<'_>) -> Result<Value, Error> {
    let bounds = args
        .map(|v| -> Result<i64, Error> { v.clone().try_into() })
        .collect::<Result<Vec<i64>, Error>>()?;
    let (start, end, step) = match bounds[..] {
        [end] => (0, end, 1),
        [start, end] => (start, end, 1),
        [start, end, step] => (start, end, step),
        _ => return Err(Error::arity_error("range", Arity::Range(1, 3), bounds.len())),
    };
    if step == 0 {
        return Err(Error::EvalError("range step must not be zero".into()));
    }

    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        out.push(Value::Int(i));
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    Ok(Value::list(out))
}

//
// Host functions: higher-order list operations and I/O
//

fn host_args<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], Error> {
    let got = args.len();
    args.try_into()
        .map_err(|_| Error::arity_error(name, N, got))
}

fn host_map(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [func, list] = host_args("map", args)?;
    let items: Vec<Value> = list.try_into()?;
    items
        .into_iter()
        .map(|item| interp.apply(&func, vec![item]))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::list)
}

fn host_flt(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [func, list] = host_args("flt", args)?;
    let items: Vec<Value> = list.try_into()?;
    let mut kept = Vec::new();
    for item in items {
        if interp.apply(&func, vec![item.clone()])?.is_truthy() {
            kept.push(item);
        }
    }
    Ok(Value::list(kept))
}

fn host_red(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [func, init, list] = host_args("red", args)?;
    let items: Vec<Value> = list.try_into()?;
    items
        .into_iter()
        .try_fold(init, |acc, item| interp.apply(&func, vec![acc, item]))
}

fn host_any(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [func, list] = host_args("any", args)?;
    let items: Vec<Value> = list.try_into()?;
    for item in items {
        if interp.apply(&func, vec![item])?.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn host_all(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [func, list] = host_args("all", args)?;
    let items: Vec<Value> = list.try_into()?;
    for item in items {
        if !interp.apply(&func, vec![item])?.is_truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

/// Stable sort, by the values themselves or by an optional key function
fn host_srt(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let mut args = args.into_iter();
    let items: Vec<Value> = args.next().unwrap_or(Value::Null).try_into()?;
    let mut keyed: Vec<(Value, Value)> = match args.next() {
        Some(key) => items
            .into_iter()
            .map(|item| Ok((interp.apply(&key, vec![item.clone()])?, item)))
            .collect::<Result<_, Error>>()?,
        None => items.into_iter().map(|item| (item.clone(), item)).collect(),
    };

    let mut incomparable = None;
    keyed.sort_by(|(a, _), (b, _)| {
        a.compare(b).unwrap_or_else(|| {
            incomparable.get_or_insert_with(|| {
                Error::TypeError(format!(
                    "srt cannot order {} and {}",
                    a.type_name(),
                    b.type_name()
                ))
            });
            Ordering::Equal
        })
    });
    match incomparable {
        Some(err) => Err(err),
        None => Ok(Value::list(keyed.into_iter().map(|(_, item)| item).collect())),
    }
}

fn display_joined(args: &[Value]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn host_print(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    interp.write_line(&display_joined(&args))?;
    Ok(Value::Null)
}

/// One line from stdin without its line ending, or `N` at end of input
fn host_read_line(_interp: &mut Interpreter, _args: Vec<Value>) -> Result<Value, Error> {
    let mut line = String::new();
    let read = std::io::stdin()
        .read_line(&mut line)
        .map_err(|err| Error::EvalError(format!("read-line failed: {err}")))?;
    if read == 0 {
        return Ok(Value::Null);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Value::Str(line))
}

fn host_read_file(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [path] = host_args("read-file", args)?;
    let Value::Str(path) = path else {
        return Err(Error::TypeError(format!(
            "read-file expects a path string, got {}",
            path.type_name()
        )));
    };
    interp
        .loader()
        .load(&path)
        .map(Value::Str)
        .map_err(|err| Error::EvalError(err.to_string()))
}

fn builtin_print_err(args: ValueIter<'_>) {
    let line: Vec<String> = args.map(ToString::to_string).collect();
    eprintln!("{}", line.join(" "));
}

fn builtin_write_file(path: &str, data: Value) -> Result<(), Error> {
    std::fs::write(path, data.to_string())
        .map_err(|err| Error::EvalError(format!("cannot write {path}: {err}")))
}

//
// Maps and records
//

fn is_record(value: &Value) -> bool {
    matches!(
        value,
        Value::Map(_) | Value::Cell(_) | Value::Collective(_) | Value::Packet(_) | Value::Intent(_)
    )
}

fn builtin_get(target: Value, key: Value) -> Result<Value, Error> {
    if !is_record(&target) {
        return Err(Error::TypeError(format!("get from {}", target.type_name())));
    }
    Ok(target.field(&key.to_key()).unwrap_or(Value::Null))
}

fn builtin_has(target: Value, key: Value) -> Result<bool, Error> {
    if !is_record(&target) {
        return Err(Error::TypeError(format!("has on {}", target.type_name())));
    }
    Ok(target.field(&key.to_key()).is_some())
}

fn builtin_put(mut map: ValueMap, key: Value, value: Value) -> Value {
    map.insert(key.to_key(), value);
    Value::map(map)
}

fn builtin_del(mut map: ValueMap, key: Value) -> Value {
    map.remove(&key.to_key());
    Value::map(map)
}

fn builtin_mrg(mut base: ValueMap, overrides: ValueMap) -> Value {
    base.extend(overrides);
    Value::map(base)
}

fn record_fields(value: &Value, name: &str) -> Result<ValueMap, Error> {
    value
        .fields()
        .ok_or_else(|| Error::TypeError(format!("{name} of {}", value.type_name())))
}

fn builtin_keys(value: Value) -> Result<Value, Error> {
    let fields = record_fields(&value, "keys")?;
    Ok(Value::list(fields.into_keys().map(Value::Keyword).collect()))
}

fn builtin_vals(value: Value) -> Result<Value, Error> {
    let fields = record_fields(&value, "vals")?;
    Ok(Value::list(fields.into_values().collect()))
}

//
// Types and conversions
//

fn builtin_type(value: Value) -> Value {
    Value::Keyword(value.type_name().to_owned())
}

macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(value: Value) -> bool {
            matches!(value, $pattern)
        }
    };
}

type_predicate!(builtin_is_int, Value::Int(_));
type_predicate!(builtin_is_float, Value::Float(_));
type_predicate!(builtin_is_str, Value::Str(_));
type_predicate!(builtin_is_bool, Value::Bool(_));
type_predicate!(builtin_is_null, Value::Null);
type_predicate!(builtin_is_list, Value::List(_));
type_predicate!(builtin_is_map, Value::Map(_));
type_predicate!(builtin_is_cell, Value::Cell(_));

fn builtin_is_fn(value: Value) -> bool {
    value.is_callable()
}

fn builtin_str(value: Value) -> String {
    value.to_string()
}

fn builtin_int(value: Value) -> Result<i64, Error> {
    match value {
        Value::Int(n) => Ok(n),
        // i64::MAX as f64 rounds up to 2^63, which is already out of range
        Value::Float(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(f.trunc() as i64)
        }
        Value::Float(f) => Err(Error::EvalError(format!(
            "cannot convert {} to int",
            format_float(f)
        ))),
        Value::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::EvalError(format!("invalid int literal: {s:?}"))),
        Value::Bool(b) => Ok(i64::from(b)),
        other => Err(Error::TypeError(format!("int of {}", other.type_name()))),
    }
}

fn builtin_float(value: Value) -> Result<f64, Error> {
    match value {
        Value::Int(n) => Ok(n as f64),
        Value::Float(f) => Ok(f),
        Value::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::EvalError(format!("invalid float literal: {s:?}"))),
        Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
        other => Err(Error::TypeError(format!("float of {}", other.type_name()))),
    }
}

fn builtin_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| elapsed.as_secs_f64())
}

fn builtin_hash(value: Value) -> String {
    content_hash(&value)
}

//
// Cell state
//

fn builtin_get_state(value: Value) -> Value {
    match value {
        Value::Cell(cell) => Value::map(cell.borrow().state.clone()),
        _ => Value::Null,
    }
}

fn builtin_set_state(target: Value, key: Value, value: Value) -> Result<Value, Error> {
    let Value::Cell(cell) = target else {
        return Err(Error::TypeError(format!(
            "set-state expects a cell, got {}",
            target.type_name()
        )));
    };
    let mut cell = cell.borrow_mut();
    cell.state.insert(key.to_key(), value);
    Ok(Value::map(cell.state.clone()))
}

/// Global registry of all built-in operations.
///
/// Pure builtins are wired through the same adapter layer used for custom
/// builtin registration. This is done once at initialization time via a
/// `LazyLock`.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn builtin_fixed<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoOperation<Args>,
    {
        <F as IntoOperation<Args>>::into_operation(f)
    }

    fn builtin_variadic<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoVariadicOperation<Args>,
    {
        <F as IntoVariadicOperation<Args>>::into_variadic_operation(f)
    }

    fn host(id: &'static str, func: HostFn, arity: Arity) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::Host(func),
            arity,
        }
    }

    fn special_form(id: &'static str, form: SpecialFormFn, arity: Arity) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::SpecialForm(form),
            arity,
        }
    }

    vec![
        // Arithmetic
        BuiltinOp {
            id: "+",
            op_kind: OpKind::Function(builtin_variadic::<(ValueIter<'static>,), _>(builtin_add)),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "-",
            op_kind: OpKind::Function(builtin_variadic::<(Number, NumIter<'static>), _>(
                builtin_sub,
            )),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            id: "*",
            op_kind: OpKind::Function(builtin_variadic::<(NumIter<'static>,), _>(builtin_mul)),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "/",
            op_kind: OpKind::Function(builtin_variadic::<(Number, NumIter<'static>), _>(
                builtin_div,
            )),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            id: "%",
            op_kind: OpKind::Function(builtin_fixed::<(Number, Number), _>(builtin_mod)),
            arity: Arity::Exact(2),
        },
        // Comparison
        BuiltinOp {
            id: "=",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_eq)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "!=",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_ne)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "<",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_lt)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: ">",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_gt)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "<=",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_le)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: ">=",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_ge)),
            arity: Arity::Exact(2),
        },
        // Logic
        BuiltinOp {
            id: "and",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_and)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "or",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_or)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "not",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_not)),
            arity: Arity::Exact(1),
        },
        // Strings
        BuiltinOp {
            id: "cat",
            op_kind: OpKind::Function(builtin_variadic::<(ValueIter<'static>,), _>(builtin_cat)),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "len",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_len)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "slc",
            op_kind: OpKind::Function(builtin_variadic::<(Value, i64, ValueIter<'static>), _>(
                builtin_slc,
            )),
            arity: Arity::Range(2, 3),
        },
        BuiltinOp {
            id: "idx",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_idx)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "spl",
            op_kind: OpKind::Function(builtin_fixed::<(&'static str, &'static str), _>(
                builtin_spl,
            )),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "upr",
            op_kind: OpKind::Function(builtin_fixed::<(&'static str,), _>(builtin_upr)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "lwr",
            op_kind: OpKind::Function(builtin_fixed::<(&'static str,), _>(builtin_lwr)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "fmt",
            op_kind: OpKind::Function(builtin_variadic::<(&'static str, ValueIter<'static>), _>(
                builtin_fmt,
            )),
            arity: Arity::AtLeast(1),
        },
        // Lists
        BuiltinOp {
            id: "hd",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_hd)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "tl",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_tl)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "nth",
            op_kind: OpKind::Function(builtin_fixed::<(Value, i64), _>(builtin_nth)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "push",
            op_kind: OpKind::Function(builtin_fixed::<(Vec<Value>, Value), _>(builtin_push)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "rev",
            op_kind: OpKind::Function(builtin_fixed::<(Vec<Value>,), _>(builtin_rev)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "flat",
            op_kind: OpKind::Function(builtin_fixed::<(Vec<Value>,), _>(builtin_flat)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "uniq",
            op_kind: OpKind::Function(builtin_fixed::<(Vec<Value>,), _>(builtin_uniq)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "zip",
            op_kind: OpKind::Function(builtin_variadic::<(ValueIter<'static>,), _>(builtin_zip)),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "range",
            op_kind: OpKind::Function(builtin_variadic::<(ValueIter<'static>,), _>(
                builtin_range,
            )),
            arity: Arity::Range(1, 3),
        },
        host("map", host_map, Arity::Exact(2)),
        host("flt", host_flt, Arity::Exact(2)),
        host("red", host_red, Arity::Exact(3)),
        host("srt", host_srt, Arity::Range(1, 2)),
        host("any", host_any, Arity::Exact(2)),
        host("all", host_all, Arity::Exact(2)),
        // Maps
        BuiltinOp {
            id: "get",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_get)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "has",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_has)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "put",
            op_kind: OpKind::Function(builtin_fixed::<(ValueMap, Value, Value), _>(builtin_put)),
            arity: Arity::Exact(3),
        },
        BuiltinOp {
            id: "del",
            op_kind: OpKind::Function(builtin_fixed::<(ValueMap, Value), _>(builtin_del)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "mrg",
            op_kind: OpKind::Function(builtin_fixed::<(ValueMap, ValueMap), _>(builtin_mrg)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "keys",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_keys)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "vals",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_vals)),
            arity: Arity::Exact(1),
        },
        // Types
        BuiltinOp {
            id: "type",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_type)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "int?",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_is_int)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "float?",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_is_float)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "str?",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_is_str)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "bool?",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_is_bool)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "null?",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_is_null)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "list?",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_is_list)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "map?",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_is_map)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "fn?",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_is_fn)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "cell?",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_is_cell)),
            arity: Arity::Exact(1),
        },
        // I/O
        host("print", host_print, Arity::Any),
        host("read-line", host_read_line, Arity::Exact(0)),
        host("read-file", host_read_file, Arity::Exact(1)),
        BuiltinOp {
            id: "print-err",
            op_kind: OpKind::Function(builtin_variadic::<(ValueIter<'static>,), _>(
                builtin_print_err,
            )),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "write-file",
            op_kind: OpKind::Function(builtin_fixed::<(&'static str, Value), _>(
                builtin_write_file,
            )),
            arity: Arity::Exact(2),
        },
        // Utility
        BuiltinOp {
            id: "str",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_str)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "int",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_int)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "float",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_float)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "time",
            op_kind: OpKind::Function(builtin_fixed::<(), _>(builtin_time)),
            arity: Arity::Exact(0),
        },
        BuiltinOp {
            id: "hash",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_hash)),
            arity: Arity::Exact(1),
        },
        // Cell state
        BuiltinOp {
            id: "get-state",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_get_state)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "set-state",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value, Value), _>(
                builtin_set_state,
            )),
            arity: Arity::Exact(3),
        },
        // Special forms
        special_form("def", special_forms::eval_def, Arity::AtLeast(1)),
        special_form("let", special_forms::eval_let, Arity::AtLeast(1)),
        special_form("fn", special_forms::eval_fn, Arity::AtLeast(1)),
        special_form("if", special_forms::eval_if, Arity::Range(2, 3)),
        special_form("do", special_forms::eval_do, Arity::Any),
        special_form("match", special_forms::eval_match, Arity::AtLeast(1)),
        special_form("loop", special_forms::eval_loop, Arity::AtLeast(1)),
        special_form("recur", special_forms::eval_recur, Arity::Any),
        special_form("quote", special_forms::eval_quote, Arity::Exact(1)),
        special_form("eval", special_forms::eval_eval, Arity::Exact(1)),
        special_form("macro", special_forms::eval_macro, Arity::Exact(2)),
        special_form("try", special_forms::eval_try, Arity::Any),
        special_form("catch", special_forms::eval_catch, Arity::Any),
        special_form("throw", special_forms::eval_throw, Arity::Exact(1)),
        special_form("|>", special_forms::eval_pipe, Arity::AtLeast(1)),
        special_form("mod", modules::eval_mod, Arity::AtLeast(1)),
        special_form("use", modules::eval_use, Arity::AtLeast(1)),
        // Hive primitives
        special_form("cell", hive::eval_cell, Arity::Exact(1)),
        special_form("emit", hive::eval_emit, Arity::Range(3, 4)),
        special_form("recv", hive::eval_recv, Arity::Exact(1)),
        special_form("merge", hive::eval_merge, Arity::Range(1, 3)),
        special_form("compress", hive::eval_compress, Arity::Exact(1)),
        special_form("ref", hive::eval_ref, Arity::Exact(1)),
        special_form("packet", hive::eval_packet, Arity::Exact(1)),
        special_form("assert!", hive::eval_assert, Arity::Range(0, 1)),
        special_form("ask?", hive::eval_ask, Arity::Range(0, 1)),
        special_form("request!", hive::eval_request, Arity::Range(0, 1)),
        special_form("suggest~", hive::eval_suggest, Arity::Range(0, 1)),
        special_form("accept+", hive::eval_accept, Arity::Range(0, 1)),
        special_form("reject-", hive::eval_reject, Arity::Range(0, 1)),
    ]
});

/// Lazy static map from id to BuiltinOp (private - use find_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by name
pub(crate) fn find_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}
