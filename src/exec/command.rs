// src/exec/command.rs

//! Shell command task used by the CLI workflows.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, bail};
use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::task::{DataKey, Task, TaskContext, TaskPorts};

/// Last line a command wrote to stdout.
///
/// Every [`CommandTask`] publishes it and reads the nearest upstream one,
/// which the command sees as the `JOBGRAPH_UPSTREAM_OUTPUT` environment
/// variable.
pub const LAST_LINE: DataKey<String> = DataKey::new("last_line");

pub const UPSTREAM_ENV: &str = "JOBGRAPH_UPSTREAM_OUTPUT";

/// Runs `cmd` through the platform shell. Non-zero exit is a failure.
#[derive(Debug, Clone)]
pub struct CommandTask {
    name: String,
    cmd: String,
    cwd: Option<PathBuf>,
}

impl CommandTask {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            cwd: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    async fn run(&self, ctx: &mut TaskContext) -> anyhow::Result<()> {
        info!(job = %ctx.job_name(), task = %self.name, cmd = %self.cmd, "starting task process");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(upstream) = ctx.input(LAST_LINE) {
            cmd.env(UPSTREAM_ENV, upstream);
        }

        // Dropping the child (job abort) kills the process.
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", self.name))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let task_name = self.name.as_str();
        let read_stdout = async {
            let mut last = None;
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(task = %task_name, "stdout: {}", line);
                    last = Some(line);
                }
            }
            last
        };
        let read_stderr = async {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %task_name, "stderr: {}", line);
                }
            }
        };

        let (last_line, (), status) = tokio::join!(read_stdout, read_stderr, child.wait());
        let status =
            status.with_context(|| format!("waiting for process of task '{}'", self.name))?;

        let code = status.code().unwrap_or(-1);
        info!(
            task = %self.name,
            exit_code = code,
            success = status.success(),
            "task process exited"
        );

        if !status.success() {
            bail!("command `{}` exited with code {}", self.cmd, code);
        }

        if let Some(line) = last_line {
            ctx.set_output(LAST_LINE, line);
        }
        Ok(())
    }
}

impl Task for CommandTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute<'a>(&'a self, ctx: &'a mut TaskContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.run(ctx))
    }

    fn ports(&self) -> TaskPorts {
        TaskPorts::new().input(LAST_LINE).output(LAST_LINE)
    }
}
