//! Path-based modules loaded from real files.

use hivespeak::value::val;
use hivespeak::{Error, Interpreter, default_environment};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write `files` into a fresh directory, substituting `{dir}` in their
/// contents with the directory path.
fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().display().to_string();
    for (name, text) in files {
        fs::write(dir.path().join(name), text.replace("{dir}", &root)).unwrap();
    }
    dir
}

fn path_of(dir: &TempDir, name: &str) -> String {
    Path::new(dir.path()).join(name).display().to_string()
}

#[test]
fn use_imports_public_bindings_from_a_file() {
    let dir = project(&[(
        "geometry.hs",
        "(def _unit 1)
         (def (area w h) (* w h))
         (def origin [0 0])",
    )]);
    let lib = path_of(&dir, "geometry.hs");
    let mut interp = Interpreter::new();
    let env = default_environment();

    let result = interp
        .eval_source(&format!("(use {lib:?} area) (area 3 4)"), &env)
        .unwrap();
    assert_eq!(result, val(12));
    assert_eq!(env.lookup("origin"), None);

    interp.eval_source(&format!("(use {lib:?})"), &env).unwrap();
    assert_eq!(env.lookup("origin"), Some(val([0, 0])));
    assert_eq!(env.lookup("_unit"), None);
}

#[test]
fn circular_imports_terminate() {
    let dir = project(&[
        ("a.hs", "(use \"{dir}/b.hs\") (def a-val 1) (def (from-a) b-val)"),
        ("b.hs", "(use \"{dir}/a.hs\") (def b-val 2)"),
    ]);
    let mut interp = Interpreter::new();
    let env = default_environment();
    let result = interp
        .eval_source(
            &format!("(use {:?}) [a-val b-val (from-a)]", path_of(&dir, "a.hs")),
            &env,
        )
        .unwrap();
    assert_eq!(result, val([1, 2, 2]));
}

#[test]
fn missing_files_and_names_are_reported() {
    let dir = project(&[("small.hs", "(def one 1)")]);
    let small = path_of(&dir, "small.hs");
    let missing = path_of(&dir, "nope.hs");
    let mut interp = Interpreter::new();
    let env = default_environment();

    let err = interp
        .eval_source(&format!("(use {missing:?})"), &env)
        .unwrap_err();
    assert!(matches!(err, Error::FileNotFound { path } if path == missing));

    let err = interp
        .eval_source(&format!("(use {small:?} two)"), &env)
        .unwrap_err();
    assert_eq!(err.to_string(), format!("two not found in module {small}"));
}

#[test]
fn modules_are_evaluated_once_per_interpreter() {
    let dir = project(&[("noisy.hs", "(def loaded (time))")]);
    let noisy = path_of(&dir, "noisy.hs");
    let mut interp = Interpreter::new();
    let env = default_environment();

    let first = interp
        .eval_source(&format!("(use {noisy:?}) loaded"), &env)
        .unwrap();
    // Changing the file has no effect once the module is cached
    fs::write(dir.path().join("noisy.hs"), "(def loaded 0)").unwrap();
    let second = interp
        .eval_source(&format!("(use {noisy:?}) loaded"), &env)
        .unwrap();
    assert_eq!(first, second);

    let fresh = Interpreter::new()
        .eval_source(&format!("(use {noisy:?}) loaded"), &default_environment())
        .unwrap();
    assert_eq!(fresh, val(0));
}

#[test]
fn read_and_write_file_builtins() {
    let dir = project(&[]);
    let out = path_of(&dir, "out.txt");
    let mut interp = Interpreter::new();
    let env = default_environment();
    let result = interp
        .eval_source(
            &format!("(write-file {out:?} (fmt \"{{}} cells\" 3)) (read-file {out:?})"),
            &env,
        )
        .unwrap();
    assert_eq!(result, val("3 cells"));
}
