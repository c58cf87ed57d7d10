use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub file: PathBuf,
    pub line: usize,
}

impl Location {
    pub fn new(file: PathBuf, line: usize) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filename = self
            .file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_else(|| self.file.to_str().unwrap_or("<unknown>"));
        write!(f, "{} line {}", filename, self.line)
    }
}

fn at(location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!(" ({})", loc),
        None => String::new(),
    }
}

/// Host-side failures: anything that keeps a program from being evaluated.
///
/// Language-level failures raised while evaluating are [`RuntimeError`]s and
/// never show up here.
#[derive(Debug, Error)]
pub enum LangError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Lex error: {message}{}", at(.location))]
    Lexer {
        message: String,
        location: Option<Location>,
    },
    #[error("Parse error: {message}{}", at(.location))]
    Parser {
        message: String,
        location: Option<Location>,
    },
    #[error("{0}")]
    Usage(String),
}

pub type LangResult<T> = Result<T, LangError>;

/// Every diagnostic collected while parsing one unit, in source order.
#[derive(Debug, Error)]
#[error("{}", render_all(.0))]
pub struct ParseErrors(pub Vec<LangError>);

impl ParseErrors {
    pub fn messages(&self) -> impl Iterator<Item = String> + '_ {
        self.0.iter().map(|err| err.to_string())
    }
}

impl From<LangError> for ParseErrors {
    fn from(err: LangError) -> Self {
        Self(vec![err])
    }
}

fn render_all(errors: &[LangError]) -> String {
    errors
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A language-level error object. Rendered as `ERROR: <message>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ERROR: {message}")]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn byte_offset_to_line(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())]
        .chars()
        .filter(|&c| c == '\n')
        .count()
        + 1
}
