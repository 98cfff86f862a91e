//! `mod` and `use`.
//!
//! A module is a plain map of the public bindings left in a frame after its
//! body has run. File modules are read through the interpreter's
//! [`SourceLoader`](super::SourceLoader), evaluated below the root frame and
//! cached by path.

use super::{Environment, Flow, Interpreter};
use crate::ast::{Node, NodeKind};
use crate::value::{Value, ValueMap};
use crate::{Error, parse_source};
use tracing::debug;

/// Public bindings of a module frame. Names starting with `_` stay private.
fn exports(frame: &Environment) -> ValueMap {
    frame
        .local_bindings()
        .into_iter()
        .filter(|(name, _)| !name.starts_with('_'))
        .collect()
}

/// `(mod name body...)`
pub(crate) fn eval_mod(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let name = args[0]
        .as_symbol()
        .ok_or_else(|| Error::TypeError(format!("mod requires a name, got {}", args[0])))?;
    let frame = env.child();
    interp.eval_body(&args[1..], &frame)?;
    let module = Value::map(exports(&frame));
    env.define(name, module.clone());
    Ok(module)
}

/// `(use module name...)`: copy all, or only the named, bindings of a
/// module into the current frame.
pub(crate) fn eval_use(interp: &mut Interpreter, args: &[Node], env: &Environment) -> Flow {
    let (label, module) = match &args[0].kind {
        NodeKind::Symbol(name) => {
            let module = env
                .lookup(name)
                .ok_or_else(|| Error::undefined(name, args[0].loc))?;
            (name.clone(), module)
        }
        _ => match interp.eval(&args[0], env)? {
            Value::Str(path) => {
                let module = interp.load_module(&path, env)?;
                (path, module)
            }
            other => (args[0].to_string(), other),
        },
    };

    let Value::Map(module) = module else {
        return Err(Error::NotAModule { name: label }.into());
    };

    if args.len() == 1 {
        for (name, value) in module.iter() {
            env.define(name.as_str(), value.clone());
        }
        return Ok(Value::Null);
    }

    for node in &args[1..] {
        let name = node
            .as_symbol()
            .ok_or_else(|| Error::TypeError(format!("use expects names, got {node}")))?;
        let value = module.get(name).ok_or_else(|| Error::MissingModuleName {
            name: name.to_owned(),
            module: label.clone(),
        })?;
        env.define(name, value.clone());
    }
    Ok(Value::Null)
}

impl Interpreter {
    /// Load, evaluate and cache the module at `path`. A path already being
    /// imported yields an empty module, which cuts the cycle.
    fn load_module(&mut self, path: &str, env: &Environment) -> Flow {
        if let Some(module) = self.modules.get(path) {
            return Ok(module.clone());
        }
        if self.importing.contains(path) {
            debug!(path, "circular use, importing nothing");
            return Ok(Value::map(ValueMap::new()));
        }

        let source = self.loader().load(path)?;
        let nodes = parse_source(&source)?;
        debug!(path, forms = nodes.len(), "loading module");

        self.importing.insert(path.to_owned());
        let frame = env.root().child();
        let result = nodes
            .iter()
            .try_for_each(|node| self.eval(node, &frame).map(drop));
        self.importing.remove(path);
        result?;

        let module = Value::map(exports(&frame));
        self.modules.insert(path.to_owned(), module.clone());
        Ok(module)
    }
}
