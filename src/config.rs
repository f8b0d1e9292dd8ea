//! Engine configuration
//!
//! Limits and defaults of an [`Interpreter`](crate::Interpreter). A config
//! file holds `key = value` lines; blank lines and lines starting with `#` or
//! `;` are ignored.
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `register_builtins` | `true` | register the default functions and constants |
//! | `max_call_depth` | `256` | nesting limit for function calls |
//! | `max_parse_depth` | `1000` | deepest expression tree the parser builds |
//! | `vm_stack_limit` | `2048` | maximum VM stack depth |
//! | `vm_initial_heap` | `16` | heap slots the VM starts with |

use std::fmt;
use std::path::Path;

/// A non-fatal error found while loading a config.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub register_builtins: bool,
    pub max_call_depth: usize,
    pub max_parse_depth: usize,
    pub vm_stack_limit: usize,
    pub vm_initial_heap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            register_builtins: true,
            max_call_depth: 256,
            max_parse_depth: crate::parser::DEFAULT_MAX_DEPTH,
            vm_stack_limit: 2048,
            vm_initial_heap: 16,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses config text. Bad lines are reported and skipped; every other
    /// key keeps its default.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                let message = format!("expected 'key = value', got '{}'", line);
                errors.push(ConfigError { line: lineno, message });
                continue;
            };

            if let Err(message) = config.set(key.trim(), value.trim()) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Reads and parses a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "register_builtins" => self.register_builtins = parse_bool(value)?,
            "max_call_depth" => self.max_call_depth = parse_count(key, value)?,
            "max_parse_depth" => self.max_parse_depth = parse_count(key, value)?,
            "vm_stack_limit" => self.vm_stack_limit = parse_count(key, value)?,
            "vm_initial_heap" => self.vm_initial_heap = parse_count(key, value)?,
            _ => return Err(format!("unknown key '{}'", key)),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(format!("expected a boolean, got '{}'", value)),
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|_| format!("{} must be a non-negative integer, got '{}'", key, value))
}
