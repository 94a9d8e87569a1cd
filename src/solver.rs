// Copyright 2025 Cornell University
// released under MIT License

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, trace};

use crate::bes::{Bes, FixpointSolver};
use crate::errors::{IaError, Result};

/// A decision procedure that consumes a textual problem and answers yes or no.
pub trait Solver {
    /// Names of required external tools that could not be found.
    fn missing_tools(&self) -> Vec<String> {
        vec![]
    }

    fn ensure_available(&self) -> Result<()> {
        let missing = self.missing_tools();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(IaError::SolverUnavailable(missing))
        }
    }

    fn solve(&self, script: &str) -> Result<bool>;
}

/// Adapts a closure into a [`Solver`].
pub struct FnSolver<F>(pub F);

impl<F: Fn(&str) -> bool> Solver for FnSolver<F> {
    fn solve(&self, script: &str) -> Result<bool> {
        Ok((self.0)(script))
    }
}

/// Locations of the external tools and where to keep generated scripts.
#[derive(Debug, Clone, Default)]
pub struct ToolConfig {
    pub z3: Option<PathBuf>,
    pub pbes2bes: Option<PathBuf>,
    pub pbessolve: Option<PathBuf>,
    /// generated scripts are kept here instead of a temporary directory
    pub dump_dir: Option<PathBuf>,
}

impl ToolConfig {
    /// Fills in every tool that was not given explicitly from `PATH`.
    pub fn resolve(mut self) -> Self {
        self.z3 = self.z3.or_else(|| find_tool("z3"));
        self.pbes2bes = self.pbes2bes.or_else(|| find_tool("pbes2bes"));
        self.pbessolve = self.pbessolve.or_else(|| find_tool("pbessolve"));
        self
    }
}

pub fn find_tool(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn run_tool(tool: &Path, args: &[&str], working_dir: &Path, stdin: Option<&str>) -> Result<String> {
    let mut cmd = Command::new(tool);
    cmd.args(args)
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    debug!("running {cmd:?}");

    let mut child = cmd.spawn()?;
    if let Some(mut pipe) = child.stdin.take() {
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes())?;
        }
    }
    let res = child.wait_with_output()?;
    let out = String::from_utf8_lossy(&res.stdout).to_string();
    if res.status.success() {
        Ok(out)
    } else {
        let err = String::from_utf8_lossy(&res.stderr).to_string();
        Err(IaError::SolverFailed {
            command: format!("{cmd:?}"),
            stdout: out,
            stderr: err,
        })
    }
}

/// Scratch space for one tool invocation.
enum WorkDir {
    Temp(tempfile::TempDir),
    Dump(PathBuf),
}

impl WorkDir {
    fn new(dump_dir: Option<&Path>) -> Result<Self> {
        match dump_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(WorkDir::Dump(dir.to_path_buf()))
            }
            None => Ok(WorkDir::Temp(tempfile::TempDir::new()?)),
        }
    }

    fn path(&self) -> &Path {
        match self {
            WorkDir::Temp(dir) => dir.path(),
            WorkDir::Dump(dir) => dir.as_path(),
        }
    }
}

/// Satisfiability checks through `z3 -in`.
pub struct Z3Solver {
    path: Option<PathBuf>,
    dump_dir: Option<PathBuf>,
    queries: AtomicUsize,
}

impl Z3Solver {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            path: config.z3.clone(),
            dump_dir: config.dump_dir.clone(),
            queries: AtomicUsize::new(0),
        }
    }
}

impl Solver for Z3Solver {
    fn missing_tools(&self) -> Vec<String> {
        match self.path {
            Some(_) => vec![],
            None => vec!["z3".to_string()],
        }
    }

    fn solve(&self, script: &str) -> Result<bool> {
        let Some(z3) = &self.path else {
            return Err(IaError::SolverUnavailable(self.missing_tools()));
        };
        let query = self.queries.fetch_add(1, Ordering::Relaxed);
        trace!("smt query {query}:\n{script}");
        let dir = WorkDir::new(self.dump_dir.as_deref())?;
        if self.dump_dir.is_some() {
            std::fs::write(dir.path().join(format!("query_{query}.smt2")), script)?;
        }

        let out = run_tool(z3, &["-in"], dir.path(), Some(script))?;
        match out.trim() {
            "sat" => Ok(true),
            // an undecided query is treated like a failed one
            "unsat" | "unknown" => Ok(false),
            other => Err(IaError::SolverFailed {
                command: format!("{} -in", z3.display()),
                stdout: other.to_string(),
                stderr: String::new(),
            }),
        }
    }
}

/// Solves boolean equation systems with the mCRL2 tools `pbes2bes` and
/// `pbessolve`.
pub struct PbesSolver {
    pbes2bes: Option<PathBuf>,
    pbessolve: Option<PathBuf>,
    dump_dir: Option<PathBuf>,
    verbose: bool,
}

impl PbesSolver {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            pbes2bes: config.pbes2bes.clone(),
            pbessolve: config.pbessolve.clone(),
            dump_dir: config.dump_dir.clone(),
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Solver for PbesSolver {
    fn missing_tools(&self) -> Vec<String> {
        let mut missing = vec![];
        if self.pbes2bes.is_none() {
            missing.push("pbes2bes".to_string());
        }
        if self.pbessolve.is_none() {
            missing.push("pbessolve".to_string());
        }
        missing
    }

    fn solve(&self, script: &str) -> Result<bool> {
        let (Some(pbes2bes), Some(pbessolve)) = (&self.pbes2bes, &self.pbessolve) else {
            return Err(IaError::SolverUnavailable(Solver::missing_tools(self)));
        };
        trace!("bes:\n{script}");
        let dir = WorkDir::new(self.dump_dir.as_deref())?;
        std::fs::write(dir.path().join("refinement.txt"), script)?;

        run_tool(
            pbes2bes,
            &["-itext", "-opbes", "refinement.txt", "refinement.pbes"],
            dir.path(),
            None,
        )?;
        let quiet = if self.verbose { "-v" } else { "-q" };
        let out = run_tool(pbessolve, &[quiet, "refinement.pbes"], dir.path(), None)?;
        match out.lines().map(str::trim).find(|l| *l == "true" || *l == "false") {
            Some(verdict) => Ok(verdict == "true"),
            None => Err(IaError::SolverFailed {
                command: format!("{} {quiet} refinement.pbes", pbessolve.display()),
                stdout: out,
                stderr: String::new(),
            }),
        }
    }
}

impl FixpointSolver for PbesSolver {
    fn missing_tools(&self) -> Vec<String> {
        Solver::missing_tools(self)
    }

    fn solve_bes(&self, bes: &Bes) -> Result<bool> {
        self.solve(&bes.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tools_are_reported() {
        let config = ToolConfig::default();
        let z3 = Z3Solver::new(&config);
        assert!(matches!(
            z3.ensure_available(),
            Err(IaError::SolverUnavailable(tools)) if tools == vec!["z3".to_string()]
        ));
        let pbes = PbesSolver::new(&config);
        let err = pbes.solve("pbes nu X0 = true; init X0;").unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to find pbes2bes, pbessolve, make sure it is on your path!"
        );
    }

    #[test]
    fn test_fn_solver() {
        let solver = FnSolver(|script: &str| script.contains("x"));
        assert!(solver.ensure_available().is_ok());
        assert!(solver.solve("(assert x)").unwrap());
        assert!(!solver.solve("(assert y)").unwrap());
    }

    #[test]
    fn test_find_tool_misses_unknown_names() {
        assert_eq!(find_tool("surely-not-an-installed-tool-name"), None);
    }
}
