//! The two ways of running source text: a line-oriented interactive loop and
//! whole-file execution. Both only parse, evaluate once per unit and print.

use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    config::Config,
    environment::Environment,
    error::{LangResult, ParseErrors},
    interpreter::{Interpreter, Outcome, Output},
    parser::parse_source,
};

/// Run the interactive loop until `reader` is exhausted.
///
/// Bindings persist across lines. Returns the requested exit status when a
/// program called `exit` or `panic`.
pub fn repl<R: BufRead>(reader: R, output: Output, config: &Config) -> io::Result<Option<i32>> {
    let interpreter = Interpreter::with_output(config, Rc::clone(&output));
    let env = Environment::new(None);
    let mut lines = reader.lines();

    loop {
        {
            let mut out = output.borrow_mut();
            write!(out, "{}", config.prompt)?;
            out.flush()?;
        }

        let line = match lines.next() {
            Some(line) => line?,
            None => return Ok(None),
        };

        let program = match parse_source(&line, PathBuf::from("<stdin>")) {
            Ok(program) => program,
            Err(errors) => {
                print_parser_errors(&mut *output.borrow_mut(), &errors)?;
                continue;
            }
        };

        tracing::debug!(statements = program.statements.len(), "evaluating line");
        if let Some(code) = report(&interpreter.eval_program(&program, &env), &output)? {
            return Ok(Some(code));
        }
    }
}

/// Evaluate the file at `path` in a fresh environment and print its result.
pub fn exec_file(path: &Path, output: Output, config: &Config) -> LangResult<Option<i32>> {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "cannot read source file");
            writeln!(output.borrow_mut(), "{}: {}", path.display(), err)?;
            return Ok(None);
        }
    };

    let program = match parse_source(&source, path.to_path_buf()) {
        Ok(program) => program,
        Err(errors) => {
            print_parser_errors(&mut *output.borrow_mut(), &errors)?;
            return Ok(None);
        }
    };

    tracing::debug!(path = %path.display(), statements = program.statements.len(), "evaluating file");
    let interpreter = Interpreter::with_output(config, Rc::clone(&output));
    let env = Environment::new(None);
    Ok(report(&interpreter.eval_program(&program, &env), &output)?)
}

fn report(outcome: &Outcome, output: &Output) -> io::Result<Option<i32>> {
    let mut out = output.borrow_mut();
    match outcome {
        Outcome::Value(Some(value)) => writeln!(out, "{}", value)?,
        Outcome::Value(None) => {}
        Outcome::Error(err) => writeln!(out, "{}", err)?,
        Outcome::Exit(code) => return Ok(Some(*code)),
    }
    Ok(None)
}

fn print_parser_errors(out: &mut dyn Write, errors: &ParseErrors) -> io::Result<()> {
    for message in errors.messages() {
        writeln!(out, "\t{}", message)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    fn shared_buffer() -> (Rc<RefCell<Vec<u8>>>, Output) {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let output: Output = buffer.clone();
        (buffer, output)
    }

    fn text(buffer: &Rc<RefCell<Vec<u8>>>) -> String {
        String::from_utf8(buffer.borrow().clone()).expect("output is utf-8")
    }

    #[test]
    fn repl_keeps_bindings_between_lines() {
        let (buffer, output) = shared_buffer();
        let input = "x := 40\nx + 2\nprint(\"hi\")\n";
        let status = repl(input.as_bytes(), output, &Config::default()).expect("io succeeds");
        assert_eq!(status, None);
        assert_eq!(text(&buffer), ">>> >>> 42\n>>> hi\nnull\n>>> ");
    }

    #[test]
    fn repl_reports_errors_and_continues() {
        let (buffer, output) = shared_buffer();
        let input = "1 +\nnope\n(1, 2)\n";
        repl(input.as_bytes(), output, &Config::default()).expect("io succeeds");
        assert_eq!(
            text(&buffer),
            ">>> \tParse error: expected an expression but found end of input (<stdin> line 1)\n\
             >>> ERROR: identifier not found: nope\n\
             >>> (1, 2)\n\
             >>> "
        );
    }

    #[test]
    fn repl_stops_on_exit() {
        let (buffer, output) = shared_buffer();
        let input = "exit(4)\nprint(\"never\")\n";
        let status = repl(input.as_bytes(), output, &Config::default()).expect("io succeeds");
        assert_eq!(status, Some(4));
        assert_eq!(text(&buffer), ">>> ");
    }

    fn write_script(name: &str, source: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("tang-{}-{}.tang", name, std::process::id()));
        std::fs::write(&path, source).expect("temp file is writable");
        path
    }

    #[test]
    fn file_prints_final_result() {
        let path = write_script("result", "print(\"start\")\nsum := fn(a, b) { a + b }\nsum(1, 2)\n");
        let (buffer, output) = shared_buffer();
        let status = exec_file(&path, output, &Config::default()).expect("file runs");
        std::fs::remove_file(&path).ok();
        assert_eq!(status, None);
        assert_eq!(text(&buffer), "start\n3\n");
    }

    #[test]
    fn file_runtime_error_is_printed_not_fatal() {
        let path = write_script("error", "x := 1\nx + \"a\"\nprint(\"skipped\")\n");
        let (buffer, output) = shared_buffer();
        let status = exec_file(&path, output, &Config::default()).expect("file runs");
        std::fs::remove_file(&path).ok();
        assert_eq!(status, None);
        assert_eq!(text(&buffer), "ERROR: type mismatch: INTEGER + STRING\n");
    }

    #[test]
    fn file_parse_errors_are_listed() {
        let path = write_script("parse", "x := )\ny := ]\n");
        let (buffer, output) = shared_buffer();
        exec_file(&path, output, &Config::default()).expect("file runs");
        std::fs::remove_file(&path).ok();
        let printed = text(&buffer);
        assert_eq!(printed.lines().count(), 2);
        assert!(printed.lines().all(|line| line.starts_with("\tParse error:")));
    }

    #[test]
    fn file_panic_requests_status_one() {
        let path = write_script("panic", "panic(\"bad\")\n");
        let (buffer, output) = shared_buffer();
        let status = exec_file(&path, output, &Config::default()).expect("file runs");
        std::fs::remove_file(&path).ok();
        assert_eq!(status, Some(1));
        assert_eq!(text(&buffer), "PANIC: bad\n");
    }

    #[test]
    fn missing_file_is_reported_on_the_output() {
        let (buffer, output) = shared_buffer();
        let status = exec_file(
            Path::new("/definitely/not/here.tang"),
            output,
            &Config::default(),
        )
        .expect("an unreadable file is not a host failure");
        assert_eq!(status, None);
        assert!(text(&buffer).starts_with("/definitely/not/here.tang: "));
    }
}
