//! mathexpr - an embeddable formula language
//!
//! Formulas are parsed into an AST and evaluated by a tree-walking
//! [`Interpreter`] over multi-type [`Value`]s. The numeric subset can also be
//! compiled to a [`Program`] and run on a small stack VM.

pub mod token;
pub mod lexer;
pub mod parser;
pub mod ast;
pub mod value;
pub mod environment;
pub mod interpreter;
pub mod builtins;
pub mod config;
pub mod error;
pub mod bytecode;
pub mod compiler;
pub mod vm;
mod stack;

use std::sync::Once;

pub use ast::Node;
pub use bytecode::Program;
pub use config::{Config, ConfigError};
pub use environment::{HostVar, SimpleCtxFn, SimpleFn, SimpleFns};
pub use error::{ErrorCategory, ErrorKind, MathError, Result};
pub use interpreter::Interpreter;
pub use lexer::Lexer;
pub use parser::{parse, Parser};
pub use value::Value;

/// Evaluates `source` on a fresh interpreter with the default catalog.
/// Returns the first recorded error, if any.
pub fn evaluate(source: &str) -> Result<Value> {
    let mut interp = Interpreter::new();
    let value = interp.evaluate(source);
    match interp.first_error() {
        Some(error) => Err(error.clone()),
        None => Ok(value),
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs a `tracing` subscriber filtered by `RUST_LOG`. Does nothing when
/// `RUST_LOG` is unset; later calls are ignored.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

/// Version of the mathexpr crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
