//! Turns generated C into an executable with the system C compiler and
//! the runtime support sources.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::codegen::runtime;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct Toolchain {
    pub cc: String,
    /// Directory holding the runtime's `*.c` sources.
    pub runtime_dir: PathBuf,
    /// Passed to the compiler ahead of the sources.
    pub flags: Vec<String>,
    pub timeout: Duration,
}

/// Captured result of running a built program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A built executable. The binary lives as long as this value.
#[derive(Debug)]
pub struct Build {
    dir: TempDir,
    binary: PathBuf,
}

impl Build {
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl Toolchain {
    pub fn new(cc: impl Into<String>, runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            cc: cc.into(),
            runtime_dir: runtime_dir.into(),
            flags: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn runtime_sources(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.runtime_dir)
            .with_context(|| format!("Reading runtime directory {}", self.runtime_dir.display()))?;
        let mut sources = Vec::new();
        for entry in entries {
            let path = entry.context("Listing runtime sources")?.path();
            if path.extension().is_some_and(|ext| ext == "c") {
                sources.push(path);
            }
        }
        if sources.is_empty() {
            bail!("No runtime sources found in {}", self.runtime_dir.display());
        }
        sources.sort();
        Ok(sources)
    }

    /// Writes `main.c` and the runtime header into a fresh temporary
    /// directory and compiles them together with the runtime sources.
    pub fn build(&self, c_source: &str) -> Result<Build> {
        let dir = tempfile::Builder::new()
            .prefix("pcc-")
            .tempdir()
            .context("Creating build directory")?;
        let main_c = dir.path().join("main.c");
        fs::write(&main_c, c_source).context("Writing C source")?;
        fs::write(dir.path().join(runtime::HEADER_NAME), runtime::HEADER)
            .context("Writing runtime header")?;
        let binary = dir.path().join(if cfg!(windows) { "main.exe" } else { "main" });

        let sources = self.runtime_sources()?;
        info!(cc = %self.cc, sources = sources.len(), "compiling C");
        let mut command = Command::new(&self.cc);
        command
            .arg("-std=c99")
            .arg("-O2")
            .args(&self.flags)
            .arg("-I")
            .arg(dir.path())
            .arg("-I")
            .arg(&self.runtime_dir)
            .arg(&main_c)
            .args(&sources)
            .arg("-o")
            .arg(&binary)
            .arg("-lm");
        let output = run_bounded(command, self.timeout)
            .with_context(|| format!("Running C compiler '{}'", self.cc))?;
        if !output.success() {
            bail!("C compilation failed: {}", output.stderr.trim_end());
        }
        debug!(binary = %binary.display(), "built executable");
        Ok(Build { dir, binary })
    }

    /// Builds and runs the program, returning whatever it printed. A
    /// non-zero exit is reported through `RunOutput`, not as an error.
    pub fn run(&self, c_source: &str) -> Result<RunOutput> {
        let build = self.build(c_source)?;
        run_bounded(Command::new(build.binary()), self.timeout).context("Running compiled program")
    }

    /// Builds the program and copies the executable to `destination`.
    pub fn build_to(&self, c_source: &str, destination: &Path) -> Result<()> {
        let build = self.build(c_source)?;
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating {}", parent.display()))?;
        }
        fs::copy(build.binary(), destination)
            .with_context(|| format!("Copying executable to {}", destination.display()))?;
        Ok(())
    }
}

/// Runs `command` to completion, killing it once `timeout` has elapsed.
pub fn run_bounded(mut command: Command, timeout: Duration) -> Result<RunOutput> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Spawning process")?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = wait_with_deadline(&mut child, timeout)?;
    let stdout = collect(stdout)?;
    let stderr = collect(stderr)?;
    match status {
        Some(status) => Ok(RunOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        }),
        None => bail!("Process timed out after {:.1}s", timeout.as_secs_f64()),
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().context("Waiting for process")? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            child.kill().context("Killing timed-out process")?;
            child.wait().context("Reaping timed-out process")?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

type Pipe = Option<thread::JoinHandle<std::io::Result<Vec<u8>>>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Pipe {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            pipe.read_to_end(&mut buffer)?;
            Ok(buffer)
        })
    })
}

fn collect(pipe: Pipe) -> Result<String> {
    let Some(handle) = pipe else {
        return Ok(String::new());
    };
    let bytes = match handle.join() {
        Ok(result) => result.context("Reading process output")?,
        Err(_) => bail!("Output reader thread panicked"),
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_output_and_exit_code() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("echo out; echo err >&2; exit 3");
        let output = run_bounded(command, Duration::from_secs(10)).expect("run sh");
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
    }

    #[test]
    fn kills_processes_past_the_deadline() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("sleep 5");
        let err = run_bounded(command, Duration::from_millis(50)).expect_err("timeout");
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[test]
    fn missing_runtime_directory_is_reported() {
        let toolchain = Toolchain::new("cc", "/nonexistent/pcc-runtime");
        let err = toolchain.build("int main(void) { return 0; }\n").expect_err("no runtime");
        assert!(format!("{err:#}").contains("runtime directory"), "{err:#}");
    }
}
