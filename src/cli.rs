use std::{
    cell::RefCell,
    env,
    io::{self, Write},
    path::PathBuf,
    process,
    rc::Rc,
};

use tang_lang::{
    error::{LangError, LangResult},
    runner, Config, Output, VERSION,
};
use tracing_subscriber::filter::EnvFilter;

enum Command {
    Repl,
    Run(PathBuf),
    Help,
    Version,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let command = match parse_args(env::args().skip(1).collect()) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("Error: {}", err);
            print_usage();
            process::exit(2);
        }
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(2);
        }
    };

    let status = match command {
        Command::Help => {
            print_usage();
            Ok(None)
        }
        Command::Version => {
            println!("tang {}", VERSION);
            Ok(None)
        }
        Command::Repl => {
            println!("Tang {}", VERSION);
            runner::repl(io::stdin().lock(), stdout_output(), &config).map_err(LangError::from)
        }
        Command::Run(path) => runner::exec_file(&path, stdout_output(), &config),
    };

    match status {
        Ok(Some(code)) => {
            io::stdout().flush().ok();
            process::exit(code);
        }
        Ok(None) => {}
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    }
}

fn parse_args(args: Vec<String>) -> LangResult<Command> {
    match args.as_slice() {
        [] => Ok(Command::Repl),
        [flag] if flag == "-h" || flag == "--help" => Ok(Command::Help),
        [flag] if flag == "-V" || flag == "--version" => Ok(Command::Version),
        [flag] if flag.starts_with('-') => {
            Err(LangError::Usage(format!("unknown option '{}'", flag)))
        }
        [file] => Ok(Command::Run(PathBuf::from(file))),
        _ => Err(LangError::Usage("too many arguments".to_string())),
    }
}

fn stdout_output() -> Output {
    Rc::new(RefCell::new(io::stdout()))
}

fn print_usage() {
    eprintln!("Tang scripting language");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  tang                 Start the interactive prompt");
    eprintln!("  tang <file>          Run a Tang program");
    eprintln!("  tang -h, --help      Show this help message");
    eprintln!("  tang -V, --version   Show version information");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TANG_MAX_CALL_DEPTH  Nested call limit (default 1024)");
    eprintln!("  RUST_LOG             Log filter, e.g. tang_lang=debug");
}
