//! Cell, packet and intent primitives.
//!
//! Cells are shared mutable records: every copy of a cell value refers to
//! the same state and inbox. Packets are immutable and content addressed;
//! they live in the packet store of the [`Interpreter`] that created them.

use super::{Environment, Flow, Interpreter};
use crate::Error;
use crate::ast::{Node, NodeKind};
use crate::value::{Cell, Collective, Intent, IntentKind, Message, Packet, Value, ValueMap};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use tracing::debug;

/// Length of the hex prefix used as cell id and packet hash
const HASH_LEN: usize = 12;

/// Content hash: the first 12 hex digits of the SHA-256 of the canonical
/// JSON form of `value`.
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_json().to_string().as_bytes());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}

fn keyword_is(value: &Value, name: &str) -> bool {
    matches!(value, Value::Keyword(k) if k == name)
}

/// `(cell state)`
pub(crate) fn eval_cell(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let state: ValueMap = interp.eval(&args[0], env)?.try_into()?;
    let id = content_hash(&Value::map(state.clone()));
    Ok(Value::Cell(Rc::new(RefCell::new(Cell {
        id,
        state,
        inbox: VecDeque::new(),
    }))))
}

/// `(emit from target content)`, `(emit from :target target content)` or
/// `(emit from :broadcast content)`. Always returns the content.
pub(crate) fn eval_emit(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let from = interp.eval(&args[0], env)?;
    let mode = interp.eval(&args[1], env)?;

    let (target, content) = if keyword_is(&mode, "target") && args.len() == 4 {
        (interp.eval(&args[2], env)?, interp.eval(&args[3], env)?)
    } else if keyword_is(&mode, "broadcast") {
        return interp.eval(&args[2], env);
    } else {
        (mode, interp.eval(&args[2], env)?)
    };

    if let Value::Cell(target) = &target {
        let sender = match &from {
            Value::Cell(cell) => cell.borrow().id.clone(),
            other => other.to_string(),
        };
        let mut target = target.borrow_mut();
        debug!(from = %sender, to = %target.id, "message delivered");
        target.inbox.push_back(Message {
            from: sender,
            content: content.clone(),
        });
    }
    Ok(content)
}

/// `(recv cell)`: oldest message as `{:from :content}`, or `N`
pub(crate) fn eval_recv(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let message = match interp.eval(&args[0], env)? {
        Value::Cell(cell) => cell.borrow_mut().inbox.pop_front(),
        _ => None,
    };
    Ok(message.map_or(Value::Null, |m| m.to_value()))
}

/// `(merge cells)` or `(merge cells :on keys)`
pub(crate) fn eval_merge(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let cells: Vec<Value> = interp.eval(&args[0], env)?.try_into()?;
    let only: Option<Vec<String>> = match args.len() {
        1 => None,
        _ => {
            let keys: Vec<Value> = interp.eval(&args[args.len() - 1], env)?.try_into()?;
            Some(keys.iter().map(Value::to_key).collect())
        }
    };

    let mut shared: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    let mut members = Vec::new();
    for value in cells {
        let Value::Cell(cell) = value else { continue };
        for (key, v) in &cell.borrow().state {
            if only.as_ref().is_none_or(|keys| keys.contains(key)) {
                shared.entry(key.clone()).or_default().push(v.clone());
            }
        }
        members.push(cell);
    }
    Ok(Value::Collective(Rc::new(Collective { shared, members })))
}

/// Most frequent value; ties go to the one seen first
fn consensus(values: &[Value]) -> Option<&Value> {
    let mut counts: Vec<(&Value, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(seen, _)| *seen == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&Value, usize)> = None;
    for (value, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

fn store_packet(interp: &mut Interpreter, data: ValueMap) -> Rc<Packet> {
    let hash = content_hash(&Value::map(data.clone()));
    let packet = Rc::new(Packet { hash, data });
    debug!(hash = %packet.hash, "packet stored");
    interp.insert_packet(Rc::clone(&packet));
    packet
}

/// `(compress collective)`: `{:ok packet}`, or `{:fail "not-collective"}`
pub(crate) fn eval_compress(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let Value::Collective(coll) = interp.eval(&args[0], env)? else {
        let mut fail = ValueMap::new();
        fail.insert("fail".into(), Value::Str("not-collective".into()));
        return Ok(Value::map(fail));
    };

    let data: ValueMap = coll
        .shared
        .iter()
        .filter_map(|(key, values)| Some((key.clone(), consensus(values)?.clone())))
        .collect();
    let packet = store_packet(interp, data);

    let mut ok = ValueMap::new();
    ok.insert("ok".into(), Value::Packet(packet));
    Ok(Value::map(ok))
}

/// `(ref #hash)`: stored packet, or `N`
pub(crate) fn eval_ref(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let hash = match &args[0].kind {
        NodeKind::HashRef(hash) => hash.clone(),
        _ => interp.eval(&args[0], env)?.to_key(),
    };
    Ok(interp.packet(&hash).map_or(Value::Null, Value::Packet))
}

/// `(packet data)`
pub(crate) fn eval_packet(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let data: ValueMap = interp
        .eval(&args[0], env)?
        .try_into()
        .map_err(|_| Error::TypeError("packet requires a map".into()))?;
    Ok(Value::Packet(store_packet(interp, data)))
}

macro_rules! intent_form {
    ($name:ident, $kind:expr) => {
        pub(crate) fn $name(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
            let content = match args.first() {
                Some(node) => interp.eval(node, env)?,
                None => Value::Null,
            };
            Ok(Value::Intent(Rc::new(Intent {
                kind: $kind,
                content,
            })))
        }
    };
}

intent_form!(eval_assert, IntentKind::Assert);
intent_form!(eval_ask, IntentKind::Ask);
intent_form!(eval_request, IntentKind::Request);
intent_form!(eval_suggest, IntentKind::Suggest);
intent_form!(eval_accept, IntentKind::Accept);
intent_form!(eval_reject, IntentKind::Reject);
