//! Tang: a small tree-walking scripting language.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod runner;
pub mod stack;

pub use config::Config;
pub use environment::Environment;
pub use error::{LangError, LangResult, ParseErrors, RuntimeError};
pub use interpreter::{Flow, Interpreter, Outcome, Output};
pub use lexer::Lexer;
pub use object::{MapKey, Object, ObjectType};
pub use parser::{parse_source, Parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
