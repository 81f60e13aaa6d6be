use luaplus::{LuaObject, LuaResult, LuaState, LuaType, StateOptions, TableBuilder};
use std::env;
use std::fs;
use std::process::ExitCode;
use tracing::{debug, info};

const VERSION: &str = "luaplus 0.1.0 (Lua 5.4)";

fn print_usage() {
    eprintln!("usage: luaplus [options] [script [args]]");
    eprintln!("Available options are:");
    eprintln!("  -e stat         execute string 'stat'");
    eprintln!("  -p name         print global 'name' after running");
    eprintln!("  -j name         print global 'name' as JSON after running");
    eprintln!("  -v              show version information");
    eprintln!("  --options file  read state options from a JSON file");
    eprintln!("  --              stop handling options");
}

#[derive(Default)]
struct Options {
    execute_strings: Vec<String>,
    print_globals: Vec<String>,
    json_globals: Vec<String>,
    options_file: Option<String>,
    script_file: Option<String>,
    script_args: Vec<String>,
    show_version: bool,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut opts = Options::default();
    let mut i = 1;
    let mut stop_options = false;

    while i < args.len() {
        let arg = &args[i];

        if !stop_options && arg.starts_with('-') {
            match arg.as_str() {
                "-e" | "-p" | "-j" | "--options" => {
                    i += 1;
                    let Some(value) = args.get(i) else {
                        return Err(format!("'{}' needs argument", arg));
                    };
                    let value = value.clone();
                    match arg.as_str() {
                        "-e" => opts.execute_strings.push(value),
                        "-p" => opts.print_globals.push(value),
                        "-j" => opts.json_globals.push(value),
                        _ => opts.options_file = Some(value),
                    }
                }
                "-v" => {
                    opts.show_version = true;
                }
                "--" => {
                    stop_options = true;
                }
                _ => {
                    return Err(format!("unrecognized option '{}'", arg));
                }
            }
        } else {
            // First non-option argument is the script; the rest are its arguments
            opts.script_file = Some(arg.clone());
            opts.script_args = args[i + 1..].to_vec();
            break;
        }
        i += 1;
    }

    Ok(opts)
}

fn load_state_options(path: Option<&str>) -> Result<StateOptions, String> {
    let options = match path {
        Some(path) => {
            let text =
                fs::read_to_string(path).map_err(|e| format!("cannot open {}: {}", path, e))?;
            serde_json::from_str::<StateOptions>(&text)
                .map_err(|e| format!("{}: invalid options: {}", path, e))?
        }
        None => StateOptions::default(),
    };
    Ok(options.with_libs())
}

/// arg[0] = script, arg[1..] = script arguments.
fn setup_arg_table(state: &LuaState, script: &str, args: &[String]) -> LuaResult<()> {
    let mut builder = TableBuilder::new().set(0, script);
    for a in args {
        builder = builder.push(a.as_str());
    }
    let arg_table = builder.build(state)?;
    state.globals()?.set("arg", &arg_table)
}

/// One-line rendering of a value for `-p`.
fn describe(value: &LuaObject) -> LuaResult<String> {
    Ok(match value.type_of() {
        LuaType::None => "no value".to_string(),
        LuaType::Nil => "nil".to_string(),
        LuaType::Boolean => value.to_boolean()?.to_string(),
        LuaType::Number => value.to_str()?.unwrap_or_default(),
        LuaType::String => format!("{:?}", value.to_str()?.unwrap_or_default()),
        LuaType::Table => format!("{{{} entries}}", value.pairs()?.len()),
        other => match value.to_pointer()? {
            ptr if ptr.is_null() => other.name().to_string(),
            ptr => format!("{}: {:p}", other.name(), ptr),
        },
    })
}

fn run(opts: &Options, options: StateOptions) -> LuaResult<()> {
    let state = LuaState::with_options(options)?;
    debug!(options = ?state.options(), "state ready");

    for chunk in &opts.execute_strings {
        state.do_string(chunk)?;
    }

    if let Some(script) = &opts.script_file {
        setup_arg_table(&state, script, &opts.script_args)?;
        info!(script = %script, "running script");
        state.do_file(script)?;
    }

    let globals = state.globals()?;
    for name in &opts.print_globals {
        let value = globals.get_by_name(name)?;
        println!("{}: {} = {}", name, value.type_name(), describe(&value)?);
    }
    for name in &opts.json_globals {
        let json = globals.get_by_name(name)?.to_json()?;
        println!("{}", json);
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("luaplus: {}", e);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    if opts.show_version {
        println!("{}", VERSION);
        if opts.execute_strings.is_empty() && opts.script_file.is_none() {
            return ExitCode::SUCCESS;
        }
    }

    let options = match load_state_options(opts.options_file.as_deref()) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("luaplus: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&opts, options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("luaplus: {}", e);
            ExitCode::FAILURE
        }
    }
}
