//! End-to-end language properties through the public API.

use hivespeak::evaluator::EvalConfig;
use hivespeak::value::{kw, val};
use hivespeak::{Error, Interpreter, Value, default_environment, parse_source};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// Output sink that can be inspected after the interpreter has written to it
#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn eval(source: &str) -> Result<Value, Error> {
    Interpreter::new().eval_source(source, &default_environment())
}

fn eval_ok(source: &str) -> Value {
    eval(source).unwrap_or_else(|err| panic!("{source}: {err}"))
}

#[test]
fn literals_round_trip_through_display() {
    let values = [
        val(0),
        val(-42),
        val(i64::MAX),
        val(2.5),
        val(-0.125),
        val(7.0),
        Value::Null,
        val(true),
        val(false),
    ];
    for value in values {
        let source = value.to_string();
        assert_eq!(eval_ok(&source), value, "{source}");
    }

    for text in ["", "plain", "tab\tand \"quotes\"", "line\nbreak", "back\\slash"] {
        let escaped = format!("{text:?}");
        assert_eq!(eval_ok(&escaped), val(text), "{escaped}");
    }
}

#[test]
fn let_bindings_are_sequential() {
    assert_eq!(eval_ok("(let [a 5 b (* a 2)] b)"), val(10));
    assert_eq!(eval_ok("(let [a 1] (let [a 2] a))"), val(2));
    assert!(matches!(
        eval("(let [a 1] a) a"),
        Err(Error::UndefinedSymbol { name, .. }) if name == "a"
    ));
}

#[test]
fn closures_capture_their_environment() {
    let mut interp = Interpreter::new();
    let env = default_environment();
    let source = "
        (def n 1)
        (def (make-adder n) (fn [x] (+ x n)))
        (def add5 (make-adder 5))
        (def n 100)
        (add5 10)";
    assert_eq!(interp.eval_source(source, &env).unwrap(), val(15));
}

#[test]
fn loop_recur_runs_in_constant_stack() {
    assert_eq!(
        eval_ok("(loop [i 0 acc 0] (if (< i 5) (recur (+ i 1) (+ acc i)) acc))"),
        val(10)
    );

    let mut interp = Interpreter::with_config(EvalConfig { max_depth: 64 });
    let counted = interp
        .eval_source(
            "(loop [i 0] (if (< i 10000) (recur (+ i 1)) i))",
            &default_environment(),
        )
        .unwrap();
    assert_eq!(counted, val(10000));
}

#[test]
fn accumulating_loop_leaves_the_seed_list_unchanged() {
    let source = "
        (def base [1 2])
        (def grown (loop [i 0 acc base] (if (< i 5000) (recur (+ i 1) (push acc i)) acc)))
        [base (len grown) (nth grown 4001)]";
    assert_eq!(
        eval_ok(source),
        val(vec![val([1, 2]), val(5002), val(3999)])
    );
}

#[test]
fn truthiness() {
    let falsy = ["0", "0.0", "\"\"", "[]", "{}", "N", "F"];
    let truthy = ["1", "-1", "\" \"", "[0]", "{:a N}", "T", ":k", "(fn [] 1)"];
    for source in falsy {
        assert_eq!(eval_ok(&format!("(if {source} 1 2)")), val(2), "{source}");
    }
    for source in truthy {
        assert_eq!(eval_ok(&format!("(if {source} 1 2)")), val(1), "{source}");
    }
}

#[test]
fn match_picks_first_equal_clause() {
    let program = |subject: &str| {
        format!("(match {subject} 1 \"one\" 2 \"two\" _ \"other\")")
    };
    assert_eq!(eval_ok(&program("2")), val("two"));
    assert_eq!(eval_ok(&program("9")), val("other"));
    assert_eq!(eval_ok("(match 3 1 \"one\" 2 \"two\")"), Value::Null);
}

#[test]
fn consensus_packet_is_deterministic_and_retrievable() {
    let mut interp = Interpreter::new();
    let env = default_environment();
    let source = "
        (def a (cell {:x 42 :y 1}))
        (def b (cell {:x 42 :y 2}))
        (def result (compress (merge [a b])))
        (def p (get result :ok))
        [(get (get p :data) :x) (= (ref (get p :hash)) p)]";
    assert_eq!(
        interp.eval_source(source, &env).unwrap(),
        val(vec![val(42), val(true)])
    );
    assert_eq!(interp.packet_count(), 1);

    let again = eval_ok("(get (get (compress (merge [(cell {:x 42 :y 1}) (cell {:x 42 :y 2})])) :ok) :hash)");
    let first = interp.eval_source("(get p :hash)", &env).unwrap();
    assert_eq!(again, first);
}

#[test]
fn try_catch_and_throw() {
    assert_eq!(
        eval_ok("(try (throw {:code 7}) (catch e (get e :code)))"),
        val(7)
    );
    assert_eq!(
        eval_ok("(try (map (fn [x] (throw x)) [3]) (catch e (* e 2)))"),
        val(6)
    );
    assert!(matches!(eval("(throw :boom)"), Err(Error::Thrown(v)) if v == kw("boom")));
    // Structural failures are not catchable
    assert!(matches!(
        eval("(try (missing) (catch e 0))"),
        Err(Error::UndefinedSymbol { .. })
    ));
}

#[test]
fn macros_expand_before_evaluation() {
    let mut interp = Interpreter::new();
    let env = default_environment();
    let source = "
        (macro (unless c & body) (if ~c N (do ~@body)))
        (def hits 0)
        (unless F (def hits (+ hits 1)) hits)";
    assert_eq!(interp.eval_source(source, &env).unwrap(), val(1));
}

#[test]
fn pipe_threads_last() {
    assert_eq!(
        eval_ok("(|> (range 1 6) (flt (fn [x] (= (% x 2) 1))) (map (fn [x] (* x x))) (red + 0))"),
        val(35)
    );
}

#[test]
fn print_writes_to_the_output_sink() {
    let out = Captured::default();
    let mut interp = Interpreter::new().with_output(out.clone());
    let env = default_environment();
    interp
        .eval_source(
            "(print \"n =\" 5 [1 2] {:a 1.0})
             (print (fmt \"{}-{}\" :x N))",
            &env,
        )
        .unwrap();
    assert_eq!(out.text(), "n = 5 [1 2] {:a 1.0}\n:x-N\n");
}

#[test]
fn failing_form_keeps_earlier_bindings() {
    let mut interp = Interpreter::new();
    let env = default_environment();
    assert!(interp.eval_source("(def kept 1) (undefined-fn)", &env).is_err());
    assert_eq!(interp.eval_source("kept", &env).unwrap(), val(1));
}

#[test]
fn run_uses_a_fresh_environment_when_none_is_given() {
    let nodes = parse_source("(def x 2) (* x 21)").unwrap();
    assert_eq!(Interpreter::new().run(&nodes, None).unwrap(), val(42));
}

#[test]
fn errors_carry_locations() {
    let err = eval("(do\n  (nope 1))").unwrap_err();
    assert_eq!(err.to_string(), "Undefined symbol: nope at line 2, col 4");

    let err = eval("(1 2)").unwrap_err();
    assert_eq!(err.to_string(), "Not callable: 1 at line 1, col 2");
}
