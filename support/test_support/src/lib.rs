use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseClass {
    /// Compiles, runs and prints `expected.stdout_file`.
    RuntimeSuccess,
    /// Rejected by the compiler at `expected.stage`.
    CompileError,
    /// Compiles, then exits non-zero through an uncaught exception.
    RuntimeError,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BenchConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExpectedOutcome {
    pub exit_code: i32,
    pub stdout_file: Option<String>,
    pub stderr_contains_file: Option<String>,
    /// Pipeline stage expected to fail, for `compile_error` cases.
    pub stage: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaseSpec {
    pub class: CaseClass,
    /// Output must also match CPython's when an interpreter is present.
    #[serde(default)]
    pub parity: bool,
    #[serde(default)]
    pub unsupported_backends: Vec<String>,
    #[serde(default)]
    pub bench: BenchConfig,
    /// Needs integers beyond 64 bits, so the bundled stub runtime cannot
    /// run it.
    #[serde(default)]
    pub bigint_runtime: bool,
    pub expected: ExpectedOutcome,
}

#[derive(Debug, Clone)]
pub struct Case {
    pub name: String,
    pub dir: PathBuf,
    pub program_path: PathBuf,
    pub spec: CaseSpec,
}

impl Case {
    pub fn read_text(&self, relative_path: &str) -> Result<String> {
        fs::read_to_string(self.dir.join(relative_path))
            .with_context(|| format!("Reading {} fixture file {}", self.name, relative_path))
    }

    pub fn source(&self) -> Result<String> {
        fs::read_to_string(&self.program_path)
            .with_context(|| format!("Reading {}", self.program_path.display()))
    }

    pub fn expected_stdout(&self) -> Result<String> {
        let file = self
            .spec
            .expected
            .stdout_file
            .as_deref()
            .with_context(|| format!("Missing stdout_file in {}", self.name))?;
        self.read_text(file)
    }

    pub fn expected_error(&self) -> Result<String> {
        let file = self
            .spec
            .expected
            .stderr_contains_file
            .as_deref()
            .with_context(|| format!("Missing stderr_contains_file in {}", self.name))?;
        Ok(self.read_text(file)?.trim().to_string())
    }
}

pub fn load_cases(programs_dir: &Path) -> Result<Vec<Case>> {
    let mut cases = Vec::new();

    for entry in
        fs::read_dir(programs_dir).with_context(|| format!("Reading {}", programs_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }

        let case_path = path.join("case.yaml");
        if !case_path.exists() {
            continue;
        }

        let program_path = path.join("program.py");
        ensure!(
            program_path.exists(),
            "Missing program.py for case {}",
            path.display()
        );

        let case_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid case directory name {}", path.display()))?;
        let case_raw = fs::read_to_string(&case_path)
            .with_context(|| format!("Reading {}", case_path.display()))?;
        let spec: CaseSpec = serde_yaml::from_str(&case_raw)
            .with_context(|| format!("Parsing {}", case_path.display()))?;

        cases.push(Case {
            name: case_name,
            dir: path,
            program_path,
            spec,
        });
    }

    ensure!(
        !cases.is_empty(),
        "No test cases found in {}",
        programs_dir.display()
    );
    cases.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(cases)
}

/// Checks the fields each case class depends on, so a malformed fixture
/// fails loudly instead of being skipped.
pub fn validate_case(case: &Case, known_backends: &[&str]) -> Result<()> {
    for backend in &case.spec.unsupported_backends {
        ensure!(
            known_backends.contains(&backend.as_str()),
            "Case {} contains unknown unsupported backend '{}'",
            case.name,
            backend
        );
    }
    let expected = &case.spec.expected;
    match case.spec.class {
        CaseClass::RuntimeSuccess => {
            ensure!(
                expected.exit_code == 0,
                "Case {} expected exit code must be 0 for runtime_success",
                case.name
            );
            ensure!(
                expected.stdout_file.is_some(),
                "Case {} needs stdout_file",
                case.name
            );
        }
        CaseClass::CompileError => {
            ensure!(
                expected.exit_code == 1,
                "Case {} expected exit code must be 1 for compile_error",
                case.name
            );
            ensure!(
                expected.stage.is_some() && expected.stderr_contains_file.is_some(),
                "Case {} needs stage and stderr_contains_file",
                case.name
            );
        }
        CaseClass::RuntimeError => {
            ensure!(
                expected.exit_code != 0,
                "Case {} expected exit code must be non-zero for runtime_error",
                case.name
            );
            ensure!(
                expected.stderr_contains_file.is_some(),
                "Case {} needs stderr_contains_file",
                case.name
            );
        }
    }
    if case.spec.bench.enabled {
        ensure!(
            !case.spec.bench.tags.is_empty(),
            "Case {} has bench enabled but no tags",
            case.name
        );
    }
    Ok(())
}

pub fn is_backend_unsupported(case: &Case, backend_name: &str) -> bool {
    case.spec
        .unsupported_backends
        .iter()
        .any(|name| name == backend_name)
}

pub fn normalize_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim_end().to_string()
}

/// The C compiler named by `CC`, or `cc`, when it answers `--version`.
pub fn detect_c_compiler() -> Option<String> {
    let cc = std::env::var("CC").unwrap_or_else(|_| "cc".to_string());
    let status = Command::new(&cc).arg("--version").output().ok()?.status;
    status.success().then_some(cc)
}

/// C compiler and runtime sources for executing generated programs, taken
/// from `CC` and `PCC_RUNTIME_DIR`. `None` when either is unusable.
pub fn detect_c_toolchain() -> Option<(String, PathBuf)> {
    let runtime_dir = PathBuf::from(std::env::var_os("PCC_RUNTIME_DIR")?);
    if !runtime_dir.is_dir() {
        return None;
    }
    detect_c_compiler().map(|cc| (cc, runtime_dir))
}

pub fn detect_python_interpreter() -> Option<String> {
    let candidates = std::env::var("PYTHON")
        .into_iter()
        .chain(["python3".to_string(), "python".to_string()]);
    for candidate in candidates {
        let status = Command::new(&candidate)
            .arg("-c")
            .arg("pass")
            .output()
            .ok()
            .map(|output| output.status);
        if status.is_some_and(|status| status.success()) {
            return Some(candidate);
        }
    }
    None
}

pub fn run_python_file(interpreter: &str, path: &Path) -> Result<String> {
    let output = Command::new(interpreter)
        .arg(path)
        .output()
        .with_context(|| format!("Running python file {}", path.display()))?;
    ensure!(
        output.status.success(),
        "python failed for {}: {}",
        path.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
