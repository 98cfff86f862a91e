use hivespeak::evaluator::Environment;
use hivespeak::lexer::tokenize;
use hivespeak::{Error, Interpreter, SyntaxErrorKind, Value, default_environment, parse_source};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::process;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: hivespeak <command> [FILE]

Commands:
  run FILE       Interpret a HiveSpeak file
  repl           Start the interactive REPL
  tokenize FILE  Print the token stream of a file
  parse FILE     Print the AST of a file";

fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let outcome = match args[..] {
        ["run", path] => run_file(path),
        ["tokenize", path] => tokenize_file(path),
        ["parse", path] => parse_file(path),
        ["repl"] => {
            run_repl();
            Ok(())
        }
        _ => {
            eprintln!("{USAGE}");
            process::exit(1);
        }
    };

    if let Err(err) = outcome {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn read_source(path: &str) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|_| Error::FileNotFound {
        path: path.to_owned(),
    })
}

fn run_file(path: &str) -> Result<(), Error> {
    let nodes = parse_source(&read_source(path)?)?;
    Interpreter::new().run(&nodes, None)?;
    Ok(())
}

fn tokenize_file(path: &str) -> Result<(), Error> {
    for token in tokenize(&read_source(path)?)? {
        println!(
            "L{}:{}\t{}\t{}",
            token.line,
            token.col,
            token.kind.name(),
            token.kind.describe()
        );
    }
    Ok(())
}

fn parse_file(path: &str) -> Result<(), Error> {
    let mut out = String::new();
    for node in parse_source(&read_source(path)?)? {
        node.dump(0, &mut out);
    }
    print!("{out}");
    Ok(())
}

/// Input that only lacks closing delimiters or a closing quote
fn is_incomplete(source: &str) -> bool {
    matches!(
        parse_source(source),
        Err(Error::Syntax(err))
            if matches!(err.kind, SyntaxErrorKind::Unclosed | SyntaxErrorKind::UnterminatedString)
    )
}

fn run_repl() {
    println!("HiveSpeak REPL");
    println!("Type :help for commands, :q or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Error: could not initialize REPL: {err}");
            process::exit(1);
        }
    };
    let mut env = default_environment();
    let mut interp = Interpreter::new();
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "ht> " } else { "... " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() {
                    match line.trim() {
                        "" => continue,
                        ":q" | ":quit" => break,
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(&env);
                            continue;
                        }
                        ":reset" => {
                            env = default_environment();
                            interp = Interpreter::new();
                            println!("Environment reset.");
                            continue;
                        }
                        _ => {}
                    }
                }

                buffer.push_str(&line);
                buffer.push('\n');
                if is_incomplete(&buffer) {
                    continue;
                }

                let source = std::mem::take(&mut buffer);
                let _ = rl.add_history_entry(source.trim_end());
                match interp.eval_source(&source, &env) {
                    Ok(Value::Null) => {}
                    Ok(result) => println!("{result}"),
                    Err(err) => println!("Error: {err}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C abandons a pending multi-line input
                buffer.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
    println!("Goodbye!");
}

fn print_help() {
    println!("HiveSpeak REPL commands:");
    println!("  :help   - Show this help message");
    println!("  :env    - Show user-defined bindings");
    println!("  :reset  - Discard all bindings and stored packets");
    println!("  :q      - Exit the interpreter");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (def (square x) (* x x))");
    println!("  (|> [1 2 3] (map square) (red + 0))");
    println!("  (compress (merge [(cell {{:x 1}}) (cell {{:x 1}})]))");
    println!();
}

fn print_environment(env: &Environment) {
    let mut user_defined: Vec<(String, Value)> = env
        .local_bindings()
        .into_iter()
        .filter(|(name, value)| {
            !matches!(value, Value::Builtin(_)) && !matches!(name.as_str(), "T" | "F" | "N")
        })
        .collect();

    if user_defined.is_empty() {
        println!("No user-defined bindings.");
        return;
    }

    user_defined.sort_by(|(a, _), (b, _)| a.cmp(b));
    println!("User-defined bindings ({}):", user_defined.len());
    for (name, value) in user_defined {
        println!("  {name} = {value}");
    }
}
