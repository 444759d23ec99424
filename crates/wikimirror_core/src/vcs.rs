use std::path::Path;
use std::process::Command;

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub trait CommandRunner {
    fn run(&self, working_dir: &Path, program: &str, args: &[&str]) -> std::io::Result<ProcessOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, working_dir: &Path, program: &str, args: &[&str]) -> std::io::Result<ProcessOutput> {
        let output = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .output()?;
        Ok(ProcessOutput {
            code: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VcsOutcome {
    NoChanges,
    Pushed,
    /// Committed locally; the push was rejected or no remote is configured.
    PushFailed { message: String },
    Failed { step: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VcsReport {
    pub initialized: bool,
    pub committed: bool,
    pub outcome: VcsOutcome,
}

pub const PUSH_REMOTE_HINT: &str =
    "set up a remote first:\n  git remote add origin <your-repo-url>\n  git push -u origin main";

/// Stage everything under `dir`, commit if anything is staged, then try to
/// push. Nothing here is fatal to the run: every failure ends up in the
/// returned report.
pub fn sync_repository<R: CommandRunner + ?Sized>(runner: &R, dir: &Path, message: &str) -> VcsReport {
    let mut report = VcsReport {
        initialized: false,
        committed: false,
        outcome: VcsOutcome::NoChanges,
    };
    let git = |step: &str, args: &[&str]| -> Result<ProcessOutput, VcsOutcome> {
        runner
            .run(dir, "git", args)
            .map_err(|error| VcsOutcome::Failed {
                step: step.to_string(),
                message: format!("failed to execute git: {error}"),
            })
    };
    let require = |step: &str, output: ProcessOutput| -> Result<ProcessOutput, VcsOutcome> {
        if output.success() {
            Ok(output)
        } else {
            Err(VcsOutcome::Failed {
                step: step.to_string(),
                message: output.stderr.trim().to_string(),
            })
        }
    };

    let result = (|| -> Result<VcsOutcome, VcsOutcome> {
        info!(dir = %dir.display(), "committing changes to git");
        if !git("status", &["status"])?.success() {
            info!("initializing git repository");
            require("init", git("init", &["init"])?)?;
            require("branch", git("branch", &["branch", "-M", "main"])?)?;
            report.initialized = true;
        }

        require("add", git("add", &["add", "."])?)?;

        let diff = git("diff", &["diff", "--cached", "--quiet"])?;
        match diff.code {
            0 => {
                info!("no changes to commit");
                return Ok(VcsOutcome::NoChanges);
            }
            1 => {}
            _ => {
                return Err(VcsOutcome::Failed {
                    step: "diff".to_string(),
                    message: diff.stderr.trim().to_string(),
                });
            }
        }

        require("commit", git("commit", &["commit", "-m", message])?)?;
        report.committed = true;
        info!("changes committed");

        let push = git("push", &["push"])?;
        if push.success() {
            info!("pushed to remote");
            Ok(VcsOutcome::Pushed)
        } else {
            warn!(stderr = %push.stderr.trim(), "push failed; {PUSH_REMOTE_HINT}");
            Ok(VcsOutcome::PushFailed {
                message: push.stderr.trim().to_string(),
            })
        }
    })();

    report.outcome = match result {
        Ok(outcome) => outcome,
        Err(outcome) => {
            warn!(?outcome, "git sync failed");
            outcome
        }
    };
    report
}
