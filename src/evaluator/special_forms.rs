//! Core special forms: binding, control flow, quoting and macros.
//!
//! Every handler receives its argument nodes unevaluated, after the arity
//! recorded in the builtin registry has been checked.

use super::{Environment, Flow, Interpreter, Unwind};
use crate::Error;
use crate::ast::{Node, NodeKind};
use crate::quote::{data_to_node, node_to_data};
use crate::value::{Closure, Macro, Params, Value};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

fn symbol_name<'a>(node: &'a Node, form: &str) -> Result<&'a str, Error> {
    node.as_symbol()
        .ok_or_else(|| Error::TypeError(format!("{form} requires a symbol, got {node}")))
}

fn sequence<'a>(node: &'a Node, form: &str) -> Result<&'a [Node], Error> {
    node.as_sequence().ok_or_else(|| {
        Error::TypeError(format!("{form} requires a bracketed list, got {node}"))
    })
}

/// Split `(name params...)` into the name and its parameter list
fn signature<'a>(node: &'a Node, form: &str) -> Result<(&'a str, Params), Error> {
    match sequence(node, form)?.split_first() {
        Some((name, params)) => Ok((symbol_name(name, form)?, Params::from_nodes(params)?)),
        None => Err(Error::TypeError(format!("{form} requires a name"))),
    }
}

/// `(def name expr)` or `(def (name params...) body...)`
pub(crate) fn eval_def(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    if let NodeKind::SExpr(_) = &args[0].kind {
        let (name, params) = signature(&args[0], "def")?;
        let closure = Value::Closure(Rc::new(Closure {
            params,
            body: args[1..].to_vec(),
            env: env.clone(),
        }));
        env.define(name, closure.clone());
        return Ok(closure);
    }

    let name = symbol_name(&args[0], "def")?;
    let [_, expr] = args else {
        return Err(Error::arity_error("def", 2, args.len()).into());
    };
    let value = interp.eval(expr, env)?;
    env.define(name, value.clone());
    Ok(value)
}

/// `(let [name expr ...] body...)`: each initializer sees the earlier names
pub(crate) fn eval_let(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let frame = env.child();
    for pair in sequence(&args[0], "let")?.chunks_exact(2) {
        let name = symbol_name(&pair[0], "let")?;
        let value = interp.eval(&pair[1], &frame)?;
        frame.define(name, value);
    }
    interp.eval_body(&args[1..], &frame)
}

/// `(fn [params...] body...)`
pub(crate) fn eval_fn(_interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let params = Params::from_nodes(sequence(&args[0], "fn")?)?;
    Ok(Value::Closure(Rc::new(Closure {
        params,
        body: args[1..].to_vec(),
        env: env.clone(),
    })))
}

pub(crate) fn eval_if(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    if interp.eval(&args[0], env)?.is_truthy() {
        interp.eval(&args[1], env)
    } else {
        match args.get(2) {
            Some(otherwise) => interp.eval(otherwise, env),
            None => Ok(Value::Null),
        }
    }
}

pub(crate) fn eval_do(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    interp.eval_body(args, env)
}

/// `(match value pattern result ...)`; `_` matches anything, other patterns
/// are evaluated and compared by equality.
pub(crate) fn eval_match(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let value = interp.eval(&args[0], env)?;
    for clause in args[1..].chunks_exact(2) {
        let matched = match clause[0].as_symbol() {
            Some("_") => true,
            _ => interp.eval(&clause[0], env)? == value,
        };
        if matched {
            return interp.eval(&clause[1], env);
        }
    }
    Ok(Value::Null)
}

/// `(loop [name init ...] body...)`.
///
/// The body runs in one loop frame. A `Recur` reaching this handler rebinds
/// the loop names in that frame, pairwise, and the body runs again, so
/// iteration does not grow the stack.
pub(crate) fn eval_loop(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let frame = env.child();
    let mut names = Vec::new();
    for pair in sequence(&args[0], "loop")?.chunks_exact(2) {
        let name = symbol_name(&pair[0], "loop")?;
        let value = interp.eval(&pair[1], &frame)?;
        frame.define(name, value);
        names.push(name);
    }

    let body = &args[1..];
    loop {
        match interp.eval_body(body, &frame) {
            Err(Unwind::Recur(values)) => {
                for (name, value) in names.iter().zip(values) {
                    frame.define(*name, value);
                }
            }
            other => return other,
        }
    }
}

pub(crate) fn eval_recur(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let values = interp.eval_all(args, env)?;
    Err(Unwind::Recur(values))
}

pub(crate) fn eval_quote(_interp: &mut Interpreter, args: &[Node], _env: &Environment) -> Flow {
    Ok(node_to_data(&args[0]))
}

/// Evaluate data as code in the current environment
pub(crate) fn eval_eval(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let data = interp.eval(&args[0], env)?;
    let node = data_to_node(&data)?;
    interp.eval(&node, env)
}

/// `(macro (name params...) template)`
pub(crate) fn eval_macro(_interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let (name, params) = signature(&args[0], "macro")?;
    let mac = Value::Macro(Rc::new(Macro {
        name: name.to_owned(),
        params,
        template: args[1].clone(),
    }));
    env.define(name, mac.clone());
    Ok(mac)
}

/// Substitute the unevaluated argument nodes into the template and evaluate
/// the expansion in the caller's environment, so argument forms see the
/// caller's locals and definitions land where the macro was called.
pub(crate) fn expand_macro(
    interp: &mut Interpreter,
    mac: &Macro,
    args: &[Node],
    env: &Environment,
) -> Flow {
    let mut bindings: HashMap<&str, Node> = HashMap::new();
    let mut args = args.iter();
    for name in &mac.params.names {
        bindings.insert(name, args.next().cloned().unwrap_or_else(crate::ast::null));
    }
    if let Some(rest) = &mac.params.rest {
        bindings.insert(rest, crate::ast::list(args.cloned().collect()));
    }

    let expansion = substitute(&mac.template, &bindings);
    trace!(name = %mac.name, %expansion, "macro expansion");
    interp.eval(&expansion, env)
}

fn substitute(node: &Node, bindings: &HashMap<&str, Node>) -> Node {
    let kind = match &node.kind {
        NodeKind::Symbol(name) => match bindings.get(name.as_str()) {
            Some(arg) => return arg.clone(),
            None => return node.clone(),
        },
        NodeKind::SExpr(items) => NodeKind::SExpr(substitute_all(items, bindings)),
        NodeKind::ListLit(items) => NodeKind::ListLit(substitute_all(items, bindings)),
        NodeKind::MapLit(items) => NodeKind::MapLit(substitute_all(items, bindings)),
        NodeKind::Quote(inner) => NodeKind::Quote(Box::new(substitute(inner, bindings))),
        // Template parameters are substituted whether or not they are marked
        NodeKind::Unquote(inner) | NodeKind::Splice(inner) => return substitute(inner, bindings),
        _ => return node.clone(),
    };
    Node {
        kind,
        loc: node.loc,
    }
}

/// Substitute a sequence, splicing the elements of `~@` arguments in place
fn substitute_all(items: &[Node], bindings: &HashMap<&str, Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let NodeKind::Splice(inner) = &item.kind {
            let spliced = substitute(inner, bindings);
            match spliced.kind {
                NodeKind::SExpr(elems) | NodeKind::ListLit(elems) => out.extend(elems),
                _ => out.push(spliced),
            }
        } else {
            out.push(substitute(item, bindings));
        }
    }
    out
}

/// `(try body... (catch name handler...))`
///
/// Only thrown values are caught; failures such as undefined symbols pass
/// through. Without a catch clause a throw propagates unchanged.
pub(crate) fn eval_try(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let (body, handler) = match args.split_last() {
        Some((last, body)) => match catch_clause(last) {
            Some(clause) => (body, Some(clause)),
            None => (args, None),
        },
        None => (args, None),
    };

    match (interp.eval_body(body, env), handler) {
        (Err(Unwind::Throw(thrown)), Some((name, handler))) => {
            let name = symbol_name(name, "catch")?;
            let frame = env.child();
            frame.define(name, thrown);
            interp.eval_body(handler, &frame)
        }
        (result, _) => result,
    }
}

/// The binding name and handler body of a `(catch e ...)` form
fn catch_clause(node: &Node) -> Option<(&Node, &[Node])> {
    let NodeKind::SExpr(items) = &node.kind else {
        return None;
    };
    match items.as_slice() {
        [head, name, handler @ ..] if head.as_symbol() == Some("catch") => Some((name, handler)),
        _ => None,
    }
}

/// A `catch` outside `try` has nothing to handle
pub(crate) fn eval_catch(_interp: &mut Interpreter, _args: &[Node], _env: &Environment) -> Flow {
    Ok(Value::Null)
}

pub(crate) fn eval_throw(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let value = interp.eval(&args[0], env)?;
    Err(Unwind::Throw(value))
}

/// `(|> value step...)`: a call step receives the value as its last
/// argument, any other step is called with the value alone.
pub(crate) fn eval_pipe(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let mut value = interp.eval(&args[0], env)?;
    for step in &args[1..] {
        value = match &step.kind {
            NodeKind::SExpr(items) if !items.is_empty() => {
                let func = interp.eval(&items[0], env)?;
                let mut call_args = interp.eval_all(&items[1..], env)?;
                call_args.push(value);
                interp.apply_at(&func, call_args, items[0].loc)?
            }
            _ => {
                let func = interp.eval(step, env)?;
                interp.apply_at(&func, vec![value], step.loc)?
            }
        };
    }
    Ok(value)
}
