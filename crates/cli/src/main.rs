//! `oyc`: compiles and runs a single source file.

mod host;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use oyc_compiler::CompilerConfig;
use oyc_runtime::{RuntimeError, Value, Vm};

use host::FsHost;

/// Exit code for a file that could not be found or read (BSD `EX_NOINPUT`).
const EX_NOINPUT: u8 = 66;

#[derive(ClapParser)]
#[command(name = "oyc", version, about = "Compiler and VM for the oyc scripting language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compiles and runs a source file.
    Run {
        /// Path to a `.oyc` source file.
        file: PathBuf,
        /// Arguments forwarded to the script as its top-level parameters.
        args: Vec<String>,
        /// Overrides `oyc.toml`'s `max_registers` for this run.
        #[arg(long)]
        max_registers: Option<u16>,
    },
    /// Prints a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run { file, args, max_registers } => run(file, args, max_registers),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::SUCCESS
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("OYC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(file: PathBuf, args: Vec<String>, max_registers: Option<u16>) -> ExitCode {
    let source = match std::fs::read_to_string(&file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: error: {e}", file.display());
            return ExitCode::from(EX_NOINPUT);
        }
    };

    let project_dir = file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut config = match CompilerConfig::load_from_dir(&project_dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };
    if let Some(max_registers) = max_registers {
        config.max_registers = max_registers;
    }

    let compile: oyc_runtime::CompileFn = Rc::new({
        let config = config.clone();
        move |src: &str, path: &std::path::Path| {
            oyc_compiler::compile(src, path, &config).map_err(|e| e.to_string())
        }
    });

    let proto = match oyc_compiler::compile(&source, &file, &config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(1);
        }
    };

    let require_root = config.require_root.as_ref().map(|root| {
        if root.is_absolute() {
            root.clone()
        } else {
            project_dir.join(root)
        }
    });
    let mut vm = Vm::new(FsHost { require_root }, compile);
    let args: Vec<Value> = args.into_iter().map(Value::str).collect();
    match vm.run(proto, file, args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            print_runtime_error(&err);
            ExitCode::from(2)
        }
    }
}

fn print_runtime_error(err: &RuntimeError) {
    eprintln!("{err}");
}
