/*!
The evaluation harness: reads the test-suite manifests, runs the solver
under a time limit, and drives the grading state machine through levels.

Suite layout on disk:

```text
<root>/in/info.json           {"levels": ["level1", ...]}
<root>/in/<level>/info.json   {"timeout": 2.0, "timeouts_allowed": 0,
                               "tests": {"name.cnf": true, ...}}
<root>/in/<level>/<name>.cnf
<root>/out/<level>/<name>.answer
```
*/

use std::{
    fs,
    io::BufReader,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::{Duration, Instant},
};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use wait_timeout::ChildExt;

use crate::grade::{FinalResult, LevelResult, TestOutcome};
use crate::prelude::*;
use crate::validate;

pub const INFO_BASENAME: &str = "info.json";

const MAX_TESTNAME_WIDTH: usize = 60;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("missing manifest file '{}'", path.display()))]
    MissingManifest {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("bad format for manifest '{}'", path.display()))]
    ManifestFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("level '{}' declares a non-positive time limit", level))]
    BadTimeLimit { level: String },
    #[snafu(display("failed to create the output directory '{}'", path.display()))]
    CreateOutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to run the solver"))]
    SolverIo { source: std::io::Error },
    #[snafu(display("the solver exited with code {}", code))]
    SolverExit { code: i32 },
    #[snafu(display("'make build' failed with code {}", code))]
    BuildFailed { code: i32 },
    #[snafu(display("test '{}' is broken", path.display()))]
    BrokenTest {
        path: PathBuf,
        source: validate::Error,
    },
}

#[derive(Debug, Deserialize)]
pub struct SuiteInfo {
    pub levels: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LevelInfo {
    pub timeout: f64,
    #[serde(default)]
    pub timeouts_allowed: u32,
    /// Test file name -> reference verdict. Tests run in sorted name order.
    pub tests: std::collections::BTreeMap<String, bool>,
}

/// What the external run reports back: wall time and whether the hard
/// timeout fired. On a forced kill `elapsed` is infinite, so a measured
/// below-limit value can never be mistaken for a timeout.
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    pub elapsed: f64,
    pub timed_out: bool,
}

/// Contract with the external solver: produce an answer file at `output`
/// for the formula at `input`, or be killed at the limit.
pub trait SolverRunner {
    fn run(&self, input: &Path, output: &Path, limit: f64) -> Result<RunOutcome, Error>;
}

/// Runs the submission through its Makefile: `make run INPUT=.. OUTPUT=..`.
#[derive(Debug, Default)]
pub struct MakeRunner;

/// Compiles the submission with `make build`. Fatal on failure.
pub fn build_solver() -> Result<(), Error> {
    debug!("Running 'make build'");
    let status = Command::new("make")
        .arg("build")
        .status()
        .context(SolverIo)?;

    ensure!(
        status.success(),
        BuildFailed {
            code: status.code().unwrap_or(-1),
        }
    );

    Ok(())
}

impl SolverRunner for MakeRunner {
    fn run(&self, input: &Path, output: &Path, limit: f64) -> Result<RunOutcome, Error> {
        let mut command = Command::new("make");
        command
            .arg("run")
            .arg(format!("INPUT={}", input.display()))
            .arg(format!("OUTPUT={}", output.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        debug!("Running command: {:?}", command);

        let start = Instant::now();
        let mut child = command.spawn().context(SolverIo)?;

        match child
            .wait_timeout(Duration::from_secs_f64(limit))
            .context(SolverIo)?
        {
            Some(status) => {
                let elapsed = start.elapsed().as_secs_f64();
                ensure!(
                    status.success(),
                    SolverExit {
                        code: status.code().unwrap_or(-1),
                    }
                );
                Ok(RunOutcome {
                    elapsed,
                    timed_out: elapsed > limit,
                })
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Ok(RunOutcome {
                    elapsed: f64::INFINITY,
                    timed_out: true,
                })
            }
        }
    }
}

/// Drives a whole grading run over one test-suite tree.
pub struct Checker<R> {
    root: PathBuf,
    runner: R,
}

impl<R: SolverRunner> Checker<R> {
    pub fn new(root: impl Into<PathBuf>, runner: R) -> Self {
        Checker {
            root: root.into(),
            runner,
        }
    }

    fn read_manifest<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
        let file = fs::File::open(path).context(MissingManifest {
            path: path.to_owned(),
        })?;
        serde_json::from_reader(BufReader::new(file)).context(ManifestFormat {
            path: path.to_owned(),
        })
    }

    /// Evaluates one level. In competition mode the loop stops at the first
    /// outcome that fails the level; in practice mode every test runs and a
    /// progress line is printed per test.
    pub fn evaluate_level(&self, level: &str, competition: bool) -> Result<LevelResult, Error> {
        let level_dir = self.root.join("in").join(level);
        let info: LevelInfo = Self::read_manifest(&level_dir.join(INFO_BASENAME))?;
        ensure!(
            info.timeout.is_finite() && info.timeout > 0.0,
            BadTimeLimit {
                level: level.to_owned(),
            }
        );

        let out_dir = self.root.join("out").join(level);
        fs::create_dir_all(&out_dir).context(CreateOutputDir {
            path: out_dir.clone(),
        })?;

        let mut level_result = LevelResult::new();

        for (test, &reference_verdict) in &info.tests {
            let input = level_dir.join(test);
            let stem = Path::new(test)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| test.clone());
            let output = out_dir.join(format!("{}.answer", stem));

            let run = self.runner.run(&input, &output, info.timeout)?;

            let (verdict, valid) = if run.timed_out {
                info!(
                    "Time limit ({} s) exceeded for '{}'!",
                    info.timeout,
                    input.display()
                );
                // Never consulted for a timed-out test.
                (false, false)
            } else {
                match validate::check_files(&input, &output, reference_verdict) {
                    Ok(checked) => checked,
                    Err(error @ validate::Error::AnswerFile { .. }) => {
                        // A garbage answer file fails this test, not the run.
                        warn!("{}", error);
                        (!reference_verdict, false)
                    }
                    Err(error) => {
                        return Err(error).context(BrokenTest {
                            path: input.clone(),
                        })
                    }
                }
            };

            let outcome = TestOutcome::new(run.elapsed, info.timeout, verdict, reference_verdict, valid);
            level_result.update(outcome);

            if !competition {
                let prefix = format!("Running {}", test);
                let dots = ".".repeat(MAX_TESTNAME_WIDTH.saturating_sub(prefix.len()));
                println!("{}  {}  {}", prefix, dots, outcome);
            } else if !level_result.passed() {
                return Ok(level_result);
            }
        }

        if level_result.timeouts() > info.timeouts_allowed {
            level_result.fail_timeout_budget();
        }

        Ok(level_result)
    }

    /// Evaluates the suite: every declared level in competition mode, only
    /// the first level in practice mode. Competition stops early on a
    /// disqualification or an exceeded timeout budget; the stopping level
    /// still counts as reached.
    pub fn check(&self, competition: bool) -> Result<FinalResult, Error> {
        let suite_manifest = self.root.join("in").join(INFO_BASENAME);
        let info: SuiteInfo = Self::read_manifest(&suite_manifest)?;

        let levels = if competition {
            &info.levels[..]
        } else {
            &info.levels[..info.levels.len().min(1)]
        };

        let mut final_result = FinalResult::new();
        for level in levels {
            let level_result = self.evaluate_level(level, competition)?;
            final_result.absorb(&level_result);
            final_result.advance_level();

            if competition && !level_result.valid() {
                info!("Submission disqualified for giving a wrong answer!");
                break;
            }

            if competition && !level_result.passed() {
                info!(
                    "Too many timeouts ({})! Evaluation stopped!",
                    level_result.timeouts()
                );
                break;
            }
        }

        Ok(final_result)
    }
}
