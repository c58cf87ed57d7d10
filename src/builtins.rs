//! Native functions callable from programs.
//!
//! The registry is built once per session and only read afterwards. Every
//! builtin checks its own argument count and types and reports violations as
//! language-level errors.

use std::io::Write;

use rustc_hash::FxHashMap;

use crate::error::RuntimeError;
use crate::interpreter::Flow;
use crate::object::{Builtin, Object, ObjectType};

pub struct BuiltinRegistry {
    table: FxHashMap<&'static str, Builtin>,
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            table: FxHashMap::default(),
        };
        registry.add("len", builtin_len);
        registry.add("print", builtin_print);
        registry.add("format", builtin_format);
        registry.add("first", builtin_first);
        registry.add("last", builtin_last);
        registry.add("rest", builtin_rest);
        registry.add("append", builtin_append);
        registry.add("exit", builtin_exit);
        registry.add("panic", builtin_panic);
        registry
    }

    fn add(&mut self, name: &'static str, func: crate::object::BuiltinFn) {
        self.table.insert(name, Builtin { name, func });
    }

    pub fn get(&self, name: &str) -> Option<Builtin> {
        self.table.get(name).copied()
    }
}

fn error(message: impl Into<String>) -> Flow {
    Flow::Error(RuntimeError::new(message))
}

fn expect_arity(args: &[Object], want: usize) -> Result<(), Flow> {
    if args.len() != want {
        return Err(error(format!(
            "wrong number of arguments. got={}, want={}",
            args.len(),
            want
        )));
    }
    Ok(())
}

fn expect_list<'a>(name: &str, arg: &'a Object) -> Result<&'a [Object], Flow> {
    match arg {
        Object::List(elements) => Ok(elements.as_slice()),
        other => Err(error(format!(
            "argument to `{}` must be {}, got {}",
            name,
            ObjectType::List,
            other.kind()
        ))),
    }
}

fn write_line(out: &mut dyn Write, text: &str) -> Result<(), Flow> {
    writeln!(out, "{}", text).map_err(|err| error(format!("failed to write output: {}", err)))
}

fn builtin_len(_: &mut dyn Write, args: Vec<Object>) -> Result<Object, Flow> {
    expect_arity(&args, 1)?;
    match &args[0] {
        Object::List(elements) => Ok(Object::Integer(elements.len() as i64)),
        Object::String(s) => Ok(Object::Integer(s.len() as i64)),
        other => Err(error(format!(
            "argument to `len` not supported, got {}",
            other.kind()
        ))),
    }
}

fn builtin_print(out: &mut dyn Write, args: Vec<Object>) -> Result<Object, Flow> {
    for arg in &args {
        write_line(out, &arg.to_string())?;
    }
    Ok(Object::Null)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FormatState {
    Normal,
    AfterPercent,
}

fn builtin_format(_: &mut dyn Write, args: Vec<Object>) -> Result<Object, Flow> {
    let mut args = args.into_iter();
    let template = match args.next() {
        Some(Object::String(template)) => template,
        _ => {
            return Err(error(format!(
                "first argument to `format` must be {}",
                ObjectType::String
            )))
        }
    };

    let mut state = FormatState::Normal;
    let mut result = String::with_capacity(template.len());

    for ch in template.chars() {
        match (state, ch) {
            (FormatState::Normal, '%') => state = FormatState::AfterPercent,
            (FormatState::Normal, ch) => result.push(ch),
            (FormatState::AfterPercent, '%') => {
                result.push('%');
                state = FormatState::Normal;
            }
            (FormatState::AfterPercent, 'v') => {
                let value = args
                    .next()
                    .ok_or_else(|| error("not enough arguments for format verb `%v`"))?;
                result.push_str(&value.to_string());
                state = FormatState::Normal;
            }
            (FormatState::AfterPercent, other) => {
                return Err(error(format!("invalid format verb `%{}`", other)));
            }
        }
    }

    if state == FormatState::AfterPercent {
        return Err(error("invalid format verb `%`"));
    }

    Ok(Object::String(result))
}

fn builtin_first(_: &mut dyn Write, args: Vec<Object>) -> Result<Object, Flow> {
    expect_arity(&args, 1)?;
    let elements = expect_list("first", &args[0])?;
    Ok(elements.first().cloned().unwrap_or(Object::Null))
}

fn builtin_last(_: &mut dyn Write, args: Vec<Object>) -> Result<Object, Flow> {
    expect_arity(&args, 1)?;
    let elements = expect_list("last", &args[0])?;
    Ok(elements.last().cloned().unwrap_or(Object::Null))
}

fn builtin_rest(_: &mut dyn Write, args: Vec<Object>) -> Result<Object, Flow> {
    expect_arity(&args, 1)?;
    let elements = expect_list("rest", &args[0])?;
    match elements.split_first() {
        Some((_, rest)) => Ok(Object::list(rest.to_vec())),
        None => Ok(Object::Null),
    }
}

fn builtin_append(_: &mut dyn Write, args: Vec<Object>) -> Result<Object, Flow> {
    expect_arity(&args, 2)?;
    let elements = expect_list("append", &args[0])?;
    let mut appended = Vec::with_capacity(elements.len() + 1);
    appended.extend_from_slice(elements);
    appended.push(args[1].clone());
    Ok(Object::list(appended))
}

fn builtin_exit(_: &mut dyn Write, args: Vec<Object>) -> Result<Object, Flow> {
    expect_arity(&args, 1)?;
    match &args[0] {
        Object::Integer(code) => {
            let code = i32::try_from(*code)
                .map_err(|_| error(format!("exit code out of range: {}", code)))?;
            tracing::debug!(code, "exit requested");
            Err(Flow::Exit(code))
        }
        other => Err(error(format!(
            "argument to `exit` must be {}, got {}",
            ObjectType::Integer,
            other.kind()
        ))),
    }
}

fn builtin_panic(out: &mut dyn Write, args: Vec<Object>) -> Result<Object, Flow> {
    expect_arity(&args, 1)?;
    write_line(out, &format!("PANIC: {}", args[0]))?;
    Err(Flow::Exit(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: Vec<Object>) -> (Result<Object, Flow>, String) {
        let registry = BuiltinRegistry::new();
        let builtin = registry.get(name).expect("builtin should exist");
        let mut out = Vec::new();
        let result = builtin.call(&mut out, args);
        (result, String::from_utf8(out).expect("output is utf-8"))
    }

    fn ok(name: &str, args: Vec<Object>) -> Object {
        match call(name, args).0 {
            Ok(value) => value,
            Err(flow) => panic!("expected `{}` to succeed, got {:?}", name, flow),
        }
    }

    fn err(name: &str, args: Vec<Object>) -> String {
        match call(name, args).0 {
            Err(Flow::Error(err)) => err.message,
            other => panic!("expected `{}` to fail, got {:?}", name, other),
        }
    }

    fn ints(values: &[i64]) -> Object {
        Object::list(values.iter().map(|n| Object::Integer(*n)).collect())
    }

    #[test]
    fn registry_holds_every_builtin() {
        let registry = BuiltinRegistry::new();
        for name in ["append", "exit", "first", "format", "last", "len", "panic", "print", "rest"] {
            let builtin = registry.get(name).expect("builtin is registered");
            assert_eq!(builtin.name, name);
        }
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn len_counts_elements_and_bytes() {
        assert_eq!(ok("len", vec![ints(&[1, 2, 3])]), Object::Integer(3));
        assert_eq!(ok("len", vec![Object::string("héllo")]), Object::Integer(6));
        assert_eq!(
            err("len", vec![Object::Integer(1)]),
            "argument to `len` not supported, got INTEGER"
        );
        assert_eq!(
            err("len", vec![]),
            "wrong number of arguments. got=0, want=1"
        );
    }

    #[test]
    fn print_writes_each_argument_on_its_own_line() {
        let (result, output) = call("print", vec![Object::Integer(1), Object::string("two")]);
        assert_eq!(result.ok(), Some(Object::Null));
        assert_eq!(output, "1\ntwo\n");
    }

    #[test]
    fn format_substitutes_verbs() {
        assert_eq!(
            ok(
                "format",
                vec![
                    Object::string("%v and %v"),
                    Object::Integer(1),
                    Object::string("x")
                ]
            ),
            Object::string("1 and x")
        );
        assert_eq!(
            ok("format", vec![Object::string("100%%")]),
            Object::string("100%")
        );
        assert_eq!(
            ok("format", vec![Object::string("v%v"), ints(&[1])]),
            Object::string("v[1]")
        );
    }

    #[test]
    fn format_rejects_bad_templates() {
        assert_eq!(
            err("format", vec![Object::string("%q")]),
            "invalid format verb `%q`"
        );
        assert_eq!(
            err("format", vec![Object::string("%v")]),
            "not enough arguments for format verb `%v`"
        );
        assert_eq!(
            err("format", vec![Object::string("50%")]),
            "invalid format verb `%`"
        );
        assert_eq!(
            err("format", vec![Object::Integer(1)]),
            "first argument to `format` must be STRING"
        );
    }

    #[test]
    fn first_last_rest() {
        assert_eq!(ok("first", vec![ints(&[])]), Object::Null);
        assert_eq!(ok("last", vec![ints(&[])]), Object::Null);
        assert_eq!(ok("rest", vec![ints(&[])]), Object::Null);
        assert_eq!(ok("first", vec![ints(&[4, 5])]), Object::Integer(4));
        assert_eq!(ok("last", vec![ints(&[4, 5])]), Object::Integer(5));
        assert_eq!(ok("rest", vec![ints(&[9])]), ints(&[]));
        assert_eq!(ok("rest", vec![ints(&[1, 2, 3])]), ints(&[2, 3]));
        assert_eq!(
            err("rest", vec![Object::string("abc")]),
            "argument to `rest` must be LIST, got STRING"
        );
    }

    #[test]
    fn append_copies() {
        let original = ints(&[1, 2]);
        let appended = ok("append", vec![original.clone(), Object::Integer(3)]);
        assert_eq!(appended, ints(&[1, 2, 3]));
        assert_eq!(original, ints(&[1, 2]));
        assert_eq!(
            err("append", vec![ints(&[])]),
            "wrong number of arguments. got=1, want=2"
        );
    }

    #[test]
    fn exit_and_panic_request_termination() {
        assert!(matches!(
            call("exit", vec![Object::Integer(3)]).0,
            Err(Flow::Exit(3))
        ));
        assert_eq!(
            err("exit", vec![Object::string("3")]),
            "argument to `exit` must be INTEGER, got STRING"
        );
        let (result, output) = call("panic", vec![Object::string("boom")]);
        assert!(matches!(result, Err(Flow::Exit(1))));
        assert_eq!(output, "PANIC: boom\n");
    }
}
