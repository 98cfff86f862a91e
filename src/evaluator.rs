use crate::ast::{Node, NodeKind};
use crate::builtinops::{OpKind, find_op, get_builtin_ops};
use crate::value::{Builtin, BuiltinFn, Closure, Packet, Params, Value, ValueMap};
use crate::{Error, Loc, MAX_EVAL_DEPTH, parse_source, quote};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;
use tracing::trace;

pub mod environment;
pub(crate) mod hive;
pub mod intooperation;
pub(crate) mod modules;
pub(crate) mod special_forms;

pub use environment::Environment;
pub use intooperation::{NumIter, StringIter, ValueIter};

/// Expected number of arguments for a builtin or special form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    /// Check `got` against this arity, naming `name` in the error
    pub fn validate(&self, name: &str, got: usize) -> Result<(), Error> {
        let ok = match *self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity_error(name, self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Evaluation limits for one [`Interpreter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Maximum nesting of `evaluate` calls before `DepthExceeded`
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// Read capability used by path-based `use` and `read-file`.
pub trait SourceLoader {
    fn load(&self, path: &str) -> Result<String, Error>;
}

/// Loads sources from the file system, relative to the working directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn load(&self, path: &str) -> Result<String, Error> {
        std::fs::read_to_string(path).map_err(|_| Error::FileNotFound {
            path: path.to_owned(),
        })
    }
}

/// In-memory sources keyed by path
impl SourceLoader for HashMap<String, String> {
    fn load(&self, path: &str) -> Result<String, Error> {
        self.get(path).cloned().ok_or_else(|| Error::FileNotFound {
            path: path.to_owned(),
        })
    }
}

/// Non-value outcome of evaluating a node.
///
/// `Recur` travels up to the nearest enclosing `loop`, `Throw` to the nearest
/// `try`. Everything else is a `Fail`, which no language construct
/// intercepts.
#[derive(Debug)]
pub enum Unwind {
    Recur(Vec<Value>),
    Throw(Value),
    Fail(Error),
}

impl Unwind {
    /// The error a host sees when this signal escapes a top-level form
    pub fn into_error(self) -> Error {
        match self {
            Unwind::Recur(_) => Error::RecurOutsideLoop,
            Unwind::Throw(value) => Error::Thrown(value),
            Unwind::Fail(err) => err,
        }
    }
}

impl From<Error> for Unwind {
    fn from(err: Error) -> Self {
        match err {
            // A throw that crossed a builtin boundary is still catchable
            Error::Thrown(value) => Unwind::Throw(value),
            other => Unwind::Fail(other),
        }
    }
}

/// Result of internal evaluation steps
pub type Flow = Result<Value, Unwind>;

/// Handler for a special form: receives the unevaluated argument nodes.
pub type SpecialFormFn = fn(&mut Interpreter, &[Node], &Environment) -> Flow;

/// One evaluation session.
///
/// Owns the packet store, the module cache and the I/O collaborators. The
/// packet store is shared by everything this instance evaluates and is never
/// evicted; separate instances never see each other's packets.
pub struct Interpreter {
    config: EvalConfig,
    depth: usize,
    packets: HashMap<String, Rc<Packet>>,
    modules: HashMap<String, Value>,
    importing: HashSet<String>,
    loader: Box<dyn SourceLoader>,
    output: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("config", &self.config)
            .field("packets", &self.packets.len())
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(EvalConfig::default())
    }

    pub fn with_config(config: EvalConfig) -> Self {
        Interpreter {
            config,
            depth: 0,
            packets: HashMap::new(),
            modules: HashMap::new(),
            importing: HashSet::new(),
            loader: Box::new(FsLoader),
            output: Box::new(std::io::stdout()),
        }
    }

    /// Replace the source loader used by `use` and `read-file`
    pub fn with_loader(mut self, loader: impl SourceLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Replace the sink `print` writes to
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn config(&self) -> EvalConfig {
        self.config
    }

    /// Evaluate a single node (REPL entry point).
    pub fn evaluate(&mut self, node: &Node, env: &Environment) -> Result<Value, Error> {
        self.eval(node, env).map_err(Unwind::into_error)
    }

    /// Evaluate top-level nodes in order and return the last value (`N` for
    /// an empty program). Without an environment a fresh
    /// [`default_environment`] is used.
    pub fn run(&mut self, nodes: &[Node], env: Option<&Environment>) -> Result<Value, Error> {
        let env = match env {
            Some(env) => env.clone(),
            None => default_environment(),
        };
        let mut result = Value::Null;
        for node in nodes {
            result = self.evaluate(node, &env)?;
        }
        Ok(result)
    }

    /// Parse and run source text in `env`.
    pub fn eval_source(&mut self, source: &str, env: &Environment) -> Result<Value, Error> {
        let nodes = parse_source(source)?;
        self.run(&nodes, Some(env))
    }

    /// Call a function value with already evaluated arguments.
    pub fn apply(&mut self, func: &Value, args: Vec<Value>) -> Result<Value, Error> {
        self.apply_at(func, args, None).map_err(Unwind::into_error)
    }

    /// Look up a stored packet by hash
    pub fn packet(&self, hash: &str) -> Option<Rc<Packet>> {
        self.packets.get(hash).cloned()
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub(crate) fn insert_packet(&mut self, packet: Rc<Packet>) {
        self.packets.insert(packet.hash.clone(), packet);
    }

    pub(crate) fn loader(&self) -> &dyn SourceLoader {
        self.loader.as_ref()
    }

    pub(crate) fn write_line(&mut self, line: &str) -> Result<(), Error> {
        writeln!(self.output, "{line}")
            .and_then(|()| self.output.flush())
            .map_err(|err| Error::EvalError(format!("write failed: {err}")))
    }

    pub(crate) fn eval(&mut self, node: &Node, env: &Environment) -> Flow {
        if self.depth >= self.config.max_depth {
            return Err(Error::DepthExceeded {
                max: self.config.max_depth,
            }
            .into());
        }
        self.depth += 1;
        let result = self.eval_node(node, env);
        self.depth -= 1;
        result
    }

    fn eval_node(&mut self, node: &Node, env: &Environment) -> Flow {
        match &node.kind {
            NodeKind::Int(n) => Ok(Value::Int(*n)),
            NodeKind::Float(n) => Ok(Value::Float(*n)),
            NodeKind::Str(s) => Ok(Value::Str(s.clone())),
            NodeKind::Bool(b) => Ok(Value::Bool(*b)),
            NodeKind::Null => Ok(Value::Null),

            NodeKind::Symbol(name) => env
                .lookup(name)
                .ok_or_else(|| Error::undefined(name, node.loc).into()),

            NodeKind::Keyword(k) => Ok(Value::Keyword(k.clone())),
            NodeKind::HashRef(h) => Ok(Value::HashRef(h.clone())),

            NodeKind::ListLit(items) => Ok(Value::list(self.eval_all(items, env)?)),
            NodeKind::MapLit(items) => {
                let mut map = ValueMap::new();
                for pair in items.chunks_exact(2) {
                    let key = self.eval(&pair[0], env)?.to_key();
                    let value = self.eval(&pair[1], env)?;
                    map.insert(key, value);
                }
                Ok(Value::map(map))
            }

            NodeKind::Quote(inner) => Ok(quote::node_to_data(inner)),
            NodeKind::Unquote(_) | NodeKind::Splice(_) => Err(Error::EvalError(format!(
                "{node} used outside of a macro template"
            ))
            .into()),

            NodeKind::SExpr(items) => self.eval_sexpr(items, env),
        }
    }

    fn eval_sexpr(&mut self, items: &[Node], env: &Environment) -> Flow {
        let Some((head, args)) = items.split_first() else {
            return Ok(Value::Null);
        };

        if let Some(name) = head.as_symbol() {
            if let Some(op) = find_op(name)
                && let OpKind::SpecialForm(form) = &op.op_kind
            {
                op.arity.validate(op.id, args.len())?;
                trace!(form = op.id, "special form");
                return form(self, args, env);
            }
            // Macro heads are expanded before any argument is evaluated
            if let Some(Value::Macro(mac)) = env.lookup(name) {
                return special_forms::expand_macro(self, &mac, args, env);
            }
        }

        let func = self.eval(head, env)?;
        let values = self.eval_all(args, env)?;
        self.apply_at(&func, values, head.loc)
    }

    pub(crate) fn eval_all(&mut self, nodes: &[Node], env: &Environment) -> Result<Vec<Value>, Unwind> {
        nodes.iter().map(|node| self.eval(node, env)).collect()
    }

    /// Evaluate a body in order, returning the last value or `N`
    pub(crate) fn eval_body(&mut self, nodes: &[Node], env: &Environment) -> Flow {
        let mut result = Value::Null;
        for node in nodes {
            result = self.eval(node, env)?;
        }
        Ok(result)
    }

    pub(crate) fn apply_at(&mut self, func: &Value, args: Vec<Value>, loc: Option<Loc>) -> Flow {
        match func {
            Value::Builtin(builtin) => {
                builtin.arity.validate(&builtin.id, args.len())?;
                match &builtin.func {
                    BuiltinFn::Pure(op) => Ok(op(args)?),
                    BuiltinFn::Host(host) => Ok(host(self, args)?),
                }
            }
            Value::Closure(closure) => self.call_closure(closure, args),
            other => Err(Error::NotCallable {
                value: other.to_string(),
                loc,
            }
            .into()),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Flow {
        let frame = closure.env.child();
        bind_params(&frame, &closure.params, args);
        match self.eval_body(&closure.body, &frame) {
            // recur is lexical: it never crosses a function boundary
            Err(Unwind::Recur(_)) => Err(Error::RecurOutsideLoop.into()),
            other => other,
        }
    }
}

/// Bind positional parameters, `N` for missing ones, and collect the
/// remainder into the rest parameter.
fn bind_params(frame: &Environment, params: &Params, args: Vec<Value>) {
    let mut args = args.into_iter();
    for name in &params.names {
        frame.define(name.clone(), args.next().unwrap_or(Value::Null));
    }
    if let Some(rest) = &params.rest {
        frame.define(rest.clone(), Value::list(args.collect()));
    }
}

/// Create a root environment with every builtin function and the `T`, `F`
/// and `N` constants bound.
pub fn default_environment() -> Environment {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        let func = match &builtin_op.op_kind {
            OpKind::Function(func) => BuiltinFn::Pure(Arc::clone(func)),
            OpKind::Host(host) => BuiltinFn::Host(*host),
            OpKind::SpecialForm(_) => continue,
        };
        env.define(
            builtin_op.id,
            Value::Builtin(Builtin {
                id: builtin_op.id.to_owned(),
                arity: builtin_op.arity,
                func,
            }),
        );
    }

    env.define("T", Value::Bool(true));
    env.define("F", Value::Bool(false));
    env.define("N", Value::Null);
    env
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::value::{kw, sym, val};
    use std::cell::RefCell;

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        Error,                       // Evaluation should fail (any error)
        Success,                     // Evaluation should succeed, value not compared
    }
    use TestResult::*;

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    fn null() -> TestResult {
        EvalResult(Value::Null)
    }

    /// Macro for setup expressions whose value is not interesting (like a
    /// function definition)
    macro_rules! test_setup {
        ($expr:expr) => {
            ($expr, Success)
        };
    }

    /// Run tests in isolated environments with shared state
    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let env = default_environment();
            let mut interp = Interpreter::new();

            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &mut interp, &env, &test_id);
            }
        }
    }

    /// Execute a single test case with detailed error reporting
    fn execute_test_case(
        input: &str,
        expected: &TestResult,
        interp: &mut Interpreter,
        env: &Environment,
        test_id: &str,
    ) {
        match (interp.eval_source(input, env), expected) {
            (Ok(actual), EvalResult(expected_val)) => {
                assert!(
                    actual == *expected_val,
                    "{test_id}: '{input}' expected {expected_val:?}, got {actual:?}"
                );
            }
            (Ok(_), Success) | (Err(_), Error) => {}
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: '{input}' error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Err(err), Success) => {
                panic!("{test_id}: '{input}' expected success, got error {err:?}");
            }
            (Ok(actual), Error) => {
                panic!("{test_id}: '{input}' expected error, got {actual:?}");
            }
            (Ok(actual), SpecificError(expected_text)) => {
                panic!("{test_id}: '{input}' expected error containing '{expected_text}', got {actual:?}");
            }
            (Err(err), EvalResult(expected_val)) => {
                panic!("{test_id}: '{input}' expected {expected_val:?}, got error {err:?}");
            }
        }
    }

    /// Each case in a fresh environment
    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let env = default_environment();
            let mut interp = Interpreter::new();
            let test_id = format!("#{}", i + 1);
            execute_test_case(input, expected, &mut interp, &env, &test_id);
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING FORMS ===
            ("42", success(42)),
            ("-271", success(-271)),
            ("2.5", success(2.5)),
            ("9223372036854775807", success(i64::MAX)),
            ("T", success(true)),
            ("F", success(false)),
            ("N", null()),
            ("\"with\\\"quotes\"", success("with\"quotes")),
            (":name", EvalResult(kw("name"))),
            ("#abc123", EvalResult(Value::HashRef("abc123".into()))),
            ("()", null()),
            ("", null()),
            // === AGGREGATE LITERALS ===
            ("[1 (+ 1 1) 3]", success([1, 2, 3])),
            ("[]", EvalResult(Value::list(vec![]))),
            (
                "{:a 1 \"b\" (+ 1 1)}",
                EvalResult(Value::map(
                    [("a".to_owned(), val(1)), ("b".to_owned(), val(2))]
                        .into_iter()
                        .collect(),
                )),
            ),
            // === ARITHMETIC ===
            ("(+ 1 2 3)", success(6)),
            ("(+)", success(0)),
            ("(+ 1 2.5)", success(3.5)),
            ("(+ \"ab\" \"cd\")", success("abcd")),
            ("(+ [1] [2 3])", success([1, 2, 3])),
            ("(- 10 3 2)", success(5)),
            ("(- 7)", success(-7)),
            ("(* 2 3 4)", success(24)),
            ("(/ 10 4)", success(2.5)),
            ("(/ 4)", success(0.25)),
            ("(/ 1 0)", success(f64::INFINITY)),
            ("(% 7 3)", success(1)),
            ("(% -7 3)", success(2)),
            ("(% 7 0)", SpecificError("modulo by zero")),
            ("(+ 9223372036854775807 1)", SpecificError("overflow")),
            ("(+ 1 \"a\")", Error),
            // === COMPARISON AND LOGIC ===
            ("(= 1 1.0)", success(true)),
            ("(= [1 2] [1 2])", success(true)),
            ("(!= \"a\" \"b\")", success(true)),
            ("(< 1 2)", success(true)),
            ("(>= 2 2)", success(true)),
            ("(< \"abc\" \"abd\")", success(true)),
            ("(< 1 \"a\")", Error),
            ("(and 1 2)", success(2)),
            ("(and 0 2)", success(0)),
            ("(or N \"x\")", success("x")),
            ("(not [])", success(true)),
            // === IF AND TRUTHINESS ===
            ("(if 42 \"yes\" \"no\")", success("yes")),
            ("(if 0 \"yes\" \"no\")", success("no")),
            ("(if 0.0 \"yes\" \"no\")", success("no")),
            ("(if \"\" \"yes\" \"no\")", success("no")),
            ("(if \" \" \"yes\" \"no\")", success("yes")),
            ("(if -1 \"yes\" \"no\")", success("yes")),
            ("(if [] \"yes\" \"no\")", success("no")),
            ("(if {} \"yes\" \"no\")", success("no")),
            ("(if N \"yes\")", null()),
            ("(if)", SpecificError("ArityError")),
            // === LET / DO / FN ===
            ("(let [a 5 b (* a 2)] b)", success(10)),
            ("(let [x 1] (let [x 2] x))", success(2)),
            ("(do 1 2 3)", success(3)),
            ("(do)", null()),
            ("((fn [x y] (+ x y)) 3 4)", success(7)),
            ("((fn [x y] y) 1)", null()),
            ("((fn [x & rest] rest) 1 2 3)", success([2, 3])),
            ("((fn [& rest] rest))", EvalResult(Value::list(vec![]))),
            ("((fn [] 1 2))", success(2)),
            // === MATCH ===
            ("(match 2 1 \"one\" 2 \"two\" _ \"other\")", success("two")),
            ("(match 99 1 \"one\" _ \"other\")", success("other")),
            ("(match 99 1 \"one\" 2 \"two\")", null()),
            ("(match \"b\" \"a\" 1 \"b\" 2)", success(2)),
            // === LOOP / RECUR ===
            (
                "(loop [i 0 acc 0] (if (< i 5) (recur (+ i 1) (+ acc i)) acc))",
                success(10),
            ),
            (
                "(loop [i 0] (if (< i 10000) (recur (+ i 1)) i))",
                success(10000),
            ),
            ("(loop [i 0 j (+ i 1)] j)", success(1)),
            ("(recur 1)", SpecificError("recur outside of loop")),
            (
                "(loop [i 0] (if (< i 3) ((fn [] (recur (+ i 1)))) i))",
                SpecificError("recur outside of loop"),
            ),
            (
                "(loop [i 0] (let [j (+ i 1)] (if (< j 4) (recur j) j)))",
                success(4),
            ),
            // === QUOTE / EVAL ===
            (
                "'(+ 1 2)",
                EvalResult(Value::form(vec![sym("+"), val(1), val(2)])),
            ),
            (
                "(quote (+ 1 2))",
                EvalResult(Value::form(vec![sym("+"), val(1), val(2)])),
            ),
            ("'x", EvalResult(sym("x"))),
            ("'[1 2]", success([1, 2])),
            ("(eval '(+ 1 2))", success(3)),
            ("(eval [1 (+ 1 1)])", success([1, 2])),
            ("(eval (quote (if T :a :b)))", EvalResult(kw("a"))),
            // === TRY / THROW ===
            ("(try 42 (catch e 0))", success(42)),
            ("(try (throw \"boom\") (catch e e))", success("boom")),
            ("(try (throw {:code 7}) (catch e (get e :code)))", success(7)),
            ("(try (+ 1 (throw 5)) (catch e (* e 2)))", success(10)),
            ("(try (map (fn [x] (throw x)) [3]) (catch e e))", success(3)),
            ("(throw \"loose\")", SpecificError("Uncaught throw: loose")),
            ("(try (throw 1))", SpecificError("Uncaught throw")),
            ("(try undefined-thing (catch e 0))", SpecificError("Undefined symbol")),
            ("(try (42) (catch e 0))", SpecificError("Not callable")),
            // === PIPE ===
            ("(|> 5 (+ 3))", success(8)),
            ("(|> 5 (- 3))", success(-2)),
            ("(|> \"abc\" upr)", success("ABC")),
            ("(|> 3 (fn [x] (* x x)))", success(9)),
            (
                "(|> [1 2 3 4 5 6 7 8 9 10] (flt (fn [x] (= (% x 2) 0))) (map (fn [x] (* x x))) (red + 0))",
                success(220),
            ),
            // === INTENTS ===
            ("(get (assert! {:claim \"x\"}) :intent)", success("assert")),
            ("(get (reject- 5) :content)", success(5)),
            ("(type (ask?))", EvalResult(kw("intent"))),
            // === ERRORS ===
            ("undefined_var", SpecificError("Undefined symbol: undefined_var at line 1, col 1")),
            ("(42 1 2)", SpecificError("Not callable: 42 at line 1, col 2")),
            ("(+ 1", SpecificError("SyntaxError")),
            ("~x", SpecificError("outside of a macro template")),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_shared_environment_cases() {
        run_tests_in_environment(vec![
            TestEnvironment(vec![
                ("(def x 42)", success(42)),
                ("x", success(42)),
                test_setup!("(def (double n) (* n 2))"),
                ("(double x)", success(84)),
            ]),
            TestEnvironment(vec![
                test_setup!(
                    "(def (factorial n) (loop [i n acc 1] (if (<= i 1) acc (recur (- i 1) (* acc i)))))"
                ),
                ("(factorial 10)", success(3_628_800)),
            ]),
            TestEnvironment(vec![
                test_setup!("(def (fib n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))"),
                ("(fib 15)", success(610)),
            ]),
            // A failing form leaves earlier bindings intact
            TestEnvironment(vec![
                ("(def kept 1)", success(1)),
                ("(do (def half 2) (undefined-call))", SpecificError("Undefined symbol")),
                ("kept", success(1)),
                ("half", success(2)),
            ]),
            TestEnvironment(vec![
                ("(def counter 0)", success(0)),
                ("(let [counter 5] counter)", success(5)),
                ("counter", success(0)),
                ("(def (bump) (def counter 9) counter)", Success),
                ("(bump)", success(9)),
                ("counter", success(0)),
            ]),
        ]);
    }

    #[test]
    fn test_closure_capture() {
        let env = default_environment();
        let mut interp = Interpreter::new();
        let result = interp
            .eval_source(
                "(def (make-adder n) (fn [x] (+ x n)))
                 (def add5 (make-adder 5))
                 (def n 1000)
                 (add5 10)",
                &env,
            )
            .unwrap();
        assert_eq!(result, val(15));
    }

    #[test]
    fn test_macros() {
        run_comprehensive_tests(vec![
            (
                "(macro (unless cond body) (if (not cond) body N)) (unless F 42)",
                success(42),
            ),
            (
                "(macro (unless cond body) (if (not cond) body N)) (unless T 42)",
                null(),
            ),
            ("(macro (defconst name v) (def name v)) (defconst pi 3.5) pi", success(3.5)),
            (
                "(macro (square-sum a b) (let [s (+ a b)] (* s s))) (square-sum 3 4)",
                success(49),
            ),
            (
                "(def x 10) (macro (show-and-return expr) expr) (show-and-return (+ x 5))",
                success(15),
            ),
            // Arguments are substituted unevaluated, so a branch not taken never runs
            (
                "(macro (unless cond body) (if (not cond) body N)) (unless T (throw 1))",
                null(),
            ),
            (
                "(macro (my-do & forms) (do ~@forms)) (my-do 1 2 3)",
                success(3),
            ),
            ("(macro (wrap x) [~x ~x]) (wrap (+ 1 1))", success([2, 2])),
            // Argument forms resolve in the caller's scope
            (
                "(macro (unless cond body) (if (not cond) body N))
                 (def (g y) (unless F y))
                 (g 3)",
                success(3),
            ),
            (
                "(macro (unless cond body) (if (not cond) body N))
                 (let [z 4] (unless F z))",
                success(4),
            ),
            (
                "(macro (defconst name v) (def name v))
                 (def (setup) (defconst inner 1) inner)
                 (setup)",
                success(1),
            ),
            (
                "(macro (defconst name v) (def name v))
                 (def (setup) (defconst inner 1) inner)
                 (setup)
                 inner",
                SpecificError("Undefined symbol: inner"),
            ),
            ("(macro (q x) 'x) (q (+ 1 2))", EvalResult(Value::form(vec![sym("+"), val(1), val(2)]))),
            (
                "(macro (m x) x) ((do m) 1)",
                SpecificError("Not callable: <macro>"),
            ),
        ]);
    }

    #[test]
    fn test_depth_limit() {
        let env = default_environment();
        let mut interp = Interpreter::with_config(EvalConfig { max_depth: 64 });
        let err = interp
            .eval_source("(def (down n) (+ 1 (down n))) (down 1)", &env)
            .unwrap_err();
        assert!(matches!(err, crate::Error::DepthExceeded { max: 64 }));

        // The interpreter is usable again afterwards
        assert_eq!(interp.eval_source("(+ 1 2)", &env).unwrap(), val(3));
    }

    #[test]
    fn test_default_depth_limit_fits_a_spawned_thread() {
        // Spawned threads get the default 2 MiB stack
        let outcome = std::thread::spawn(|| {
            let env = default_environment();
            let err = Interpreter::new()
                .eval_source(
                    "(def (f n) (if (= n 0) 0 (+ 1 (f (- n 1))))) (f 100000)",
                    &env,
                )
                .unwrap_err();
            matches!(err, crate::Error::DepthExceeded { max: MAX_EVAL_DEPTH })
        })
        .join()
        .unwrap();
        assert!(outcome);
        assert_eq!(EvalConfig::default().max_depth, crate::MAX_EVAL_DEPTH);
    }

    #[test]
    fn test_run_without_environment() {
        let nodes = parse_source("(def a 2) (* a 21)").unwrap();
        let result = Interpreter::new().run(&nodes, None).unwrap();
        assert_eq!(result, val(42));
        assert_eq!(Interpreter::new().run(&[], None).unwrap(), Value::Null);
    }

    #[test]
    fn test_apply_from_host() {
        let env = default_environment();
        let mut interp = Interpreter::new();
        let inc = interp.eval_source("(fn [x] (+ x 1))", &env).unwrap();
        assert_eq!(interp.apply(&inc, vec![val(41)]).unwrap(), val(42));

        let plus = env.lookup("+").unwrap();
        assert_eq!(interp.apply(&plus, vec![val(1), val(2)]).unwrap(), val(3));
        assert!(matches!(
            interp.apply(&val(1), vec![]),
            Err(crate::Error::NotCallable { loc: None, .. })
        ));
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_print_goes_to_output_sink() {
        let buffer = SharedBuffer::default();
        let env = default_environment();
        let mut interp = Interpreter::new().with_output(buffer.clone());
        let result = interp
            .eval_source("(print 42) (print \"hello\" T [1 2] {:a N}) (print)", &env)
            .unwrap();
        assert_eq!(result, Value::Null);
        let printed = String::from_utf8(buffer.0.borrow().clone()).unwrap();
        assert_eq!(printed, "42\nhello T [1 2] {:a N}\n\n");
    }

    #[test]
    fn test_arity_display() {
        assert_eq!(Arity::Exact(2).to_string(), "2");
        assert_eq!(Arity::Range(1, 3).to_string(), "1 to 3");
        let err = Arity::AtLeast(1).validate("-", 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ArityError: - expected at least 1 arguments, got 0"
        );
        assert!(Arity::Any.validate("list", 99).is_ok());
    }

    #[test]
    fn test_register_builtin_operation_add() {
        fn add(a: i64, b: i64) -> i64 {
            a + b
        }
        let env = default_environment();
        env.register_builtin_operation::<_, (i64, i64)>("add2", add);
        let mut interp = Interpreter::new();
        assert_eq!(interp.eval_source("(add2 7 5)", &env).unwrap(), val(12));
        assert!(interp.eval_source("(add2 7)", &env).is_err());
    }

    #[test]
    fn test_register_builtin_operation_result_builtin() {
        fn safe_div(a: i64, b: i64) -> Result<i64, crate::Error> {
            if b == 0 {
                Err(crate::Error::EvalError("division by zero".into()))
            } else {
                Ok(a / b)
            }
        }

        let env = default_environment();
        env.register_builtin_operation::<_, (i64, i64)>("safe-div", safe_div);
        let mut interp = Interpreter::new();
        assert_eq!(interp.eval_source("(safe-div 6 3)", &env).unwrap(), val(2));
        let err = interp.eval_source("(safe-div 1 0)", &env).unwrap_err();
        assert!(format!("{err}").contains("division by zero"));
    }

    #[test]
    fn test_register_variadic_builtin_operation_with_explicit_arity() {
        fn count_strings(first: &str, rest: StringIter<'_>) -> i64 {
            1 + rest.filter(|s| s.len() > first.len()).count() as i64
        }

        let env = default_environment();
        env.register_variadic_builtin_operation::<_, (&str, StringIter<'static>)>(
            "count-longer",
            Arity::AtLeast(1),
            count_strings,
        );
        let mut interp = Interpreter::new();
        assert_eq!(
            interp
                .eval_source("(count-longer \"ab\" \"a\" \"abc\" \"abcd\")", &env)
                .unwrap(),
            val(3)
        );
        let err = interp.eval_source("(count-longer)", &env).unwrap_err();
        assert!(matches!(err, crate::Error::ArityError { .. }));
    }
}
