use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pcc::backend::Backend;
use pcc::compiler;
use pcc::config::Options;
use pcc::driver::{self, Toolchain};

#[derive(Parser, Debug)]
#[command(version, about = "Compile a Python subset to C")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the generated C source
    Emit {
        #[command(flatten)]
        input: InputArgs,
        /// Write the C source here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the front end and type checker only
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Build an executable
    Build {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        toolchain: ToolchainArgs,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Build and run, forwarding the program's output and exit code
    Run {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        toolchain: ToolchainArgs,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Source file; reads stdin when omitted
    input: Option<PathBuf>,
    #[arg(short, long, value_enum, env = "PCC_BACKEND", default_value_t = Backend::Fast)]
    backend: Backend,
}

#[derive(Args, Debug)]
struct ToolchainArgs {
    #[arg(long, env = "CC", default_value = "cc")]
    cc: String,
    #[arg(long, env = "PCC_RUNTIME_DIR", default_value = "runtime")]
    runtime_dir: PathBuf,
    #[arg(long, default_value_t = driver::DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,
}

impl ToolchainArgs {
    fn toolchain(&self) -> Toolchain {
        Toolchain::new(&self.cc, &self.runtime_dir)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

impl InputArgs {
    fn read(&self) -> Result<(String, Options)> {
        let (source, name) = match &self.input {
            Some(path) => (
                fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?,
                path.display().to_string(),
            ),
            None => {
                let mut buffer = String::new();
                io::stdin()
                    .read_to_string(&mut buffer)
                    .context("Reading stdin")?;
                (buffer, "<stdin>".to_string())
            }
        };
        let options = Options::with_backend(self.backend).source_name(name);
        Ok((source, options))
    }

    fn compile(&self) -> Result<String> {
        let (source, options) = self.read()?;
        compiler::compile(&source, &options).with_context(|| format!("Compiling {}", options.source_name))
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {
        Command::Emit { input, output } => {
            let c_source = input.compile()?;
            match output {
                Some(path) => write_output(&path, &c_source)?,
                None => print!("{c_source}"),
            }
        }
        Command::Check { input } => {
            let (source, options) = input.read()?;
            let module = compiler::frontend(&source)?;
            compiler::check(&module, &options)?;
        }
        Command::Build {
            input,
            toolchain,
            output,
        } => {
            let c_source = input.compile()?;
            toolchain.toolchain().build_to(&c_source, &output)?;
        }
        Command::Run { input, toolchain } => {
            let c_source = input.compile()?;
            let result = toolchain.toolchain().run(&c_source)?;
            io::stdout()
                .write_all(result.stdout.as_bytes())
                .context("Writing program output")?;
            io::stderr()
                .write_all(result.stderr.as_bytes())
                .context("Writing program diagnostics")?;
            let code = result.exit_code.unwrap_or(1);
            return Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Writing {}", path.display()))
}
