//! mathexpr CLI and REPL
//!
//! Usage:
//!   mathexpr repl                - Start interactive REPL
//!   mathexpr eval <expr>         - Evaluate one formula
//!   mathexpr run <file>          - Evaluate a formula file
//!   mathexpr compile <expr>      - Show bytecode and the VM result
//!   mathexpr help                - Show help message
//!
//! `--config <file>` before the command loads engine settings.

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use mathexpr::{Config, Interpreter, Value, VERSION};

fn main() {
    mathexpr::init_tracing();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let config = match take_config(&mut args) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{}: {}", "error".red(), message);
            process::exit(1);
        }
    };

    let Some(command) = args.first() else {
        print_help();
        return;
    };

    match command.as_str() {
        "repl" => run_repl(config),
        "eval" => {
            let source = require_arg(&args, "eval <expr>");
            let mut interp = Interpreter::with_config(config);
            let ok = evaluate_and_print(&mut interp, &source);
            if !ok {
                process::exit(1);
            }
        }
        "run" => {
            let path = require_arg(&args, "run <file>");
            run_file(config, &path);
        }
        "compile" => {
            let source = require_arg(&args, "compile <expr>");
            let mut interp = Interpreter::with_config(config);
            if !compile_and_run(&mut interp, &source) {
                process::exit(1);
            }
        }
        "help" | "--help" | "-h" => print_help(),
        "version" | "--version" | "-v" => println!("mathexpr {}", VERSION),
        _ => {
            eprintln!("{}: unknown command '{}'", "error".red(), command);
            print_help();
            process::exit(1);
        }
    }
}

/// Removes `--config <file>` from `args` and loads it.
fn take_config(args: &mut Vec<String>) -> Result<Config, String> {
    let Some(pos) = args.iter().position(|a| a == "--config") else {
        return Ok(Config::default());
    };
    if pos + 1 >= args.len() {
        return Err("--config needs a file argument".to_string());
    }
    let path = args.remove(pos + 1);
    args.remove(pos);

    let (config, problems) = Config::load_file(Path::new(&path))
        .map_err(|e| format!("cannot read config '{}': {}", path, e))?;
    for problem in problems {
        eprintln!("{}: {}: {}", "warning".yellow(), path, problem);
    }
    Ok(config)
}

/// Everything after the command, joined so unquoted formulas work too.
fn require_arg(args: &[String], usage: &str) -> String {
    if args.len() < 2 {
        eprintln!("{}: missing argument", "error".red());
        eprintln!("Usage: mathexpr {}", usage);
        process::exit(1);
    }
    args[1..].join(" ")
}

fn print_help() {
    println!("{}", "mathexpr".cyan().bold());
    println!("An embeddable formula language");
    println!("{} {}\n", "Version".cyan(), VERSION);
    println!("{}", "USAGE:".yellow());
    println!("  mathexpr [--config <file>] <command>\n");
    println!("{}", "COMMANDS:".yellow());
    println!("  repl                 Start interactive REPL");
    println!("  eval <expr>          Evaluate one formula");
    println!("  run <file>           Evaluate a formula file");
    println!("  compile <expr>       Show bytecode and run it on the VM");
    println!("  help                 Show this help message");
    println!("  version              Show version\n");
    println!("{}", "EXAMPLES:".yellow());
    println!("  mathexpr eval \"sum(i, 1, 10, i^2)\"");
    println!("  mathexpr compile \"f(x) = x * x; f(3) + 1\"");
    println!("  mathexpr repl\n");
    println!("{}", "LANGUAGE FEATURES:".yellow());
    println!("  x = 2; x * 3             Variables and statement lists");
    println!("  [1, 2; 3, 4]             Vectors and matrices");
    println!("  1:2:9                    Ranges");
    println!("  f(a, b) = a * b          Function definition");
    println!("  if(c, a, b)              Conditionals and cases(...)");
    println!("  for(i, 1, 5, i^2)        Loops: sum, prod, for, filterfor, ...");
}

/// Prints the errors recorded since `from`.
fn print_errors(interp: &Interpreter, from: usize) {
    for error in interp.errors().iter().skip(from) {
        eprintln!("{}", error.to_string().red());
    }
}

/// Evaluates `source` and prints the result or the new errors.
fn evaluate_and_print(interp: &mut Interpreter, source: &str) -> bool {
    let before = interp.error_count();
    let value = interp.evaluate(source);
    if interp.error_count() > before {
        print_errors(interp, before);
        return false;
    }
    if !matches!(value, Value::Void) {
        println!("{} {}", "=>".dimmed(), value.to_string().cyan());
    }
    true
}

/// Compiles `source`, prints the disassembly and runs it.
fn compile_and_run(interp: &mut Interpreter, source: &str) -> bool {
    let before = interp.error_count();
    let node = interp.parse(source);
    if interp.error_count() > before {
        print_errors(interp, before);
        return false;
    }
    let program = match interp.compile(&node) {
        Ok(program) => program,
        Err(_) => {
            print_errors(interp, before);
            return false;
        }
    };
    print!("{}", program.disassemble(source).dimmed());
    let result = interp.run(&program);
    if interp.error_count() > before {
        print_errors(interp, before);
        return false;
    }
    println!("{} {}", "=>".dimmed(), Value::Double(result).to_string().cyan());
    true
}

fn run_file(config: Config, path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("{}: cannot read file '{}': {}", "error".red(), path, e);
            process::exit(1);
        }
    };

    let mut interp = Interpreter::with_config(config);
    if !evaluate_and_print(&mut interp, &source) {
        process::exit(1);
    }
}

fn run_repl(config: Config) {
    println!("{} {} - {}", "mathexpr".cyan().bold(), VERSION.cyan(), "formula REPL".dimmed());
    println!("Type {} to exit, {} for help\n", "exit".yellow(), "help".yellow());

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("{}: cannot start line editor: {}", "error".red(), err);
            process::exit(1);
        }
    };

    // One interpreter for the whole session so variables persist
    let mut interp = Interpreter::with_config(config);

    loop {
        match rl.readline(&format!("{} ", "mathexpr>".green().bold())) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    "exit" | "quit" => {
                        println!("{}", "Goodbye!".cyan());
                        break;
                    }
                    "help" => {
                        print_repl_help();
                        continue;
                    }
                    ":vars" => {
                        for (name, value) in interp.environment().variables() {
                            println!("  {} = {}", name.yellow(), value);
                        }
                        continue;
                    }
                    ":reset" => {
                        interp.clear_environment();
                        interp.reset_errors();
                        println!("{}", "Environment cleared.".dimmed());
                        continue;
                    }
                    ":errors" => {
                        if interp.has_error_occurred() {
                            print_errors(&interp, 0);
                        } else {
                            println!("{}", "No errors.".dimmed());
                        }
                        continue;
                    }
                    _ => {}
                }

                if let Some(source) = line.strip_prefix(":compile") {
                    compile_and_run(&mut interp, source.trim());
                } else {
                    evaluate_and_print(&mut interp, line);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".dimmed());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "Goodbye!".cyan());
                break;
            }
            Err(err) => {
                eprintln!("{}: {:?}", "error".red(), err);
                break;
            }
        }
    }
}

fn print_repl_help() {
    println!("{}", "REPL Commands:".yellow());
    println!("  exit, quit          Exit the REPL");
    println!("  :vars               List variables");
    println!("  :reset              Clear variables, functions and errors");
    println!("  :errors             Show every recorded error");
    println!("  :compile <expr>     Show bytecode and run it on the VM");
    println!("  help                Show this help\n");
    println!("{}", "Language Examples:".yellow());
    println!("  x = 10");
    println!("  v = [1, 2, 3]; v[v > 1]");
    println!("  sq(n) = n * n");
    println!("  sum(i, 1, 100, sq(i))");
}
