use crate::Error;
use crate::evaluator::Arity;
use crate::evaluator::intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
use crate::value::{Builtin, BuiltinFn, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

struct Frame {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
}

/// Environment for variable bindings.
///
/// A handle to one frame of the scope chain. Frames are reference counted:
/// a closure keeps its defining frame (and that frame's ancestors) alive
/// after the call that created it has returned, and cloning the handle
/// shares the frame rather than copying its bindings.
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// A root frame with no bindings
    pub fn new() -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    /// A fresh child frame of this one
    pub fn child(&self) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
        }))
    }

    /// Bind in this frame, shadowing any ancestor binding
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut frame = self;
        loop {
            if let Some(value) = frame.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            frame = frame.0.parent.as_ref()?;
        }
    }

    /// Rebind `name` in the nearest frame that already holds it.
    pub fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        let mut frame = self;
        loop {
            if let Some(slot) = frame.0.bindings.borrow_mut().get_mut(name) {
                *slot = value;
                return Ok(());
            }
            frame = frame
                .0
                .parent
                .as_ref()
                .ok_or_else(|| Error::undefined(name, None))?;
        }
    }

    /// The outermost frame of the chain
    pub fn root(&self) -> Environment {
        let mut frame = self;
        while let Some(parent) = &frame.0.parent {
            frame = parent;
        }
        frame.clone()
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Bindings held directly by this frame, sorted by name
    pub fn local_bindings(&self) -> Vec<(String, Value)> {
        let mut result: Vec<_> = self
            .0
            .bindings
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Register a strongly-typed Rust function as a builtin using automatic
    /// argument extraction and result conversion.
    ///
    /// ```rust
    /// use hivespeak::{Interpreter, Value, default_environment};
    ///
    /// fn add(a: i64, b: i64) -> i64 { a + b }
    ///
    /// let env = default_environment();
    /// env.register_builtin_operation::<_, (i64, i64)>("add2", add);
    /// let mut interp = Interpreter::new();
    /// let result = interp.eval_source("(add2 7 5)", &env).unwrap();
    /// assert_eq!(result, Value::Int(12));
    /// ```
    ///
    /// Supported parameter types: `i64`, `Number`, `&str`, `ValueMap`,
    /// `Vec<Value>` and `Value`. Additional scalar types participate by
    /// implementing `TryInto<T, Error = Error>` for `Value`.
    pub fn register_builtin_operation<F, Args>(&self, name: &str, func: F)
    where
        F: IntoOperation<Args> + 'static,
    {
        let wrapped: Arc<OperationFn> = func.into_operation();
        self.define(
            name,
            Value::Builtin(Builtin {
                id: name.to_owned(),
                arity: Arity::Any,
                func: BuiltinFn::Pure(wrapped),
            }),
        );
    }

    /// Register a variadic builtin whose trailing parameter is one of the
    /// iterator types (`ValueIter`, `NumIter`, `StringIter`). The given
    /// [`Arity`] is checked at call time.
    pub fn register_variadic_builtin_operation<F, Args>(
        &self,
        name: &str,
        arity: Arity,
        func: F,
    ) where
        F: IntoVariadicOperation<Args> + 'static,
    {
        self.define(
            name,
            Value::Builtin(Builtin {
                id: name.to_owned(),
                arity,
                func: BuiltinFn::Pure(func.into_variadic_operation()),
            }),
        );
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.local_bindings().into_iter().map(|(k, _)| k).collect();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::value::val;

    #[test]
    fn test_lookup_walks_chain() {
        let root = Environment::new();
        root.define("a", val(1));
        let child = root.child();
        child.define("b", val(2));

        assert_eq!(child.lookup("a"), Some(val(1)));
        assert_eq!(child.lookup("b"), Some(val(2)));
        assert_eq!(root.lookup("b"), None);
    }

    #[test]
    fn test_define_shadows_in_current_frame() {
        let root = Environment::new();
        root.define("x", val(1));
        let child = root.child();
        child.define("x", val(2));

        assert_eq!(child.lookup("x"), Some(val(2)));
        assert_eq!(root.lookup("x"), Some(val(1)));
    }

    #[test]
    fn test_set_targets_owning_frame() {
        let root = Environment::new();
        root.define("x", val(1));
        let child = root.child();
        child.set("x", val(5)).unwrap();

        assert_eq!(root.lookup("x"), Some(val(5)));
        assert!(child.local_bindings().is_empty());
        assert!(matches!(
            child.set("missing", val(0)),
            Err(Error::UndefinedSymbol { .. })
        ));
    }

    #[test]
    fn test_shared_frames() {
        let root = Environment::new();
        let alias = root.clone();
        alias.define("late", val(true));
        assert_eq!(root.lookup("late"), Some(val(true)));
        assert!(root.child().root().ptr_eq(&root));
    }

    #[test]
    fn test_lookup_shares_collection_payloads() {
        let root = Environment::new();
        root.define("xs", val((0..1000).collect::<Vec<i64>>()));
        root.define("m", Value::map([("k".to_owned(), val(1))].into_iter().collect()));

        let (Some(Value::List(a)), Some(Value::List(b))) = (root.lookup("xs"), root.lookup("xs"))
        else {
            panic!("xs should be a list");
        };
        assert!(Rc::ptr_eq(&a, &b));

        let (Some(Value::Map(a)), Some(Value::Map(b))) = (root.lookup("m"), root.lookup("m"))
        else {
            panic!("m should be a map");
        };
        assert!(Rc::ptr_eq(&a, &b));
    }
}
