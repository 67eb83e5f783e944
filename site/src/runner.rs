use crate::context::OperationContext;
use crate::error::SiteError;
use log::{debug, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Exit code reported when the program could not be started at all.
const SPAWN_FAILURE_CODE: i32 = 127;
const NO_EXIT_CODE: i32 = i32::MIN;

/// One external command, described before it runs.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    allow_non_zero: bool,
    long_running: bool,
    show_output: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            allow_non_zero: false,
            long_running: false,
            show_output: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs the command from `dir`; the caller's working directory is untouched.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Returns non-zero exits to the caller instead of failing.
    pub fn allow_non_zero(mut self) -> Self {
        self.allow_non_zero = true;
        self
    }

    /// Polls the child instead of blocking on it, emitting keep-alive
    /// messages and killing it if it ends up stopped.
    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }

    /// Copies the output into the message log even on success.
    pub fn show_output(mut self) -> Self {
        self.show_output = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What a finished command left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// stdout and stderr, interleaved in arrival order.
    pub lines: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Single entry point for every external process a site operation starts.
#[derive(Debug)]
pub struct CommandRunner {
    poll_interval: Duration,
    last_exit_code: AtomicI32,
}

impl CommandRunner {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            last_exit_code: AtomicI32::new(NO_EXIT_CODE),
        }
    }

    /// Exit code of the most recent command, if one has finished.
    pub fn last_exit_code(&self) -> Option<i32> {
        match self.last_exit_code.load(Ordering::SeqCst) {
            NO_EXIT_CODE => None,
            code => Some(code),
        }
    }

    pub async fn exec(
        &self,
        ctx: &mut OperationContext,
        invocation: &Invocation,
    ) -> Result<CommandOutput, SiteError> {
        let command = invocation.to_string();
        match invocation.dir() {
            Some(dir) => ctx.msg(format!("{command} (in {})", dir.display())),
            None => ctx.msg(command.clone()),
        }

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.dir {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.last_exit_code
                    .store(SPAWN_FAILURE_CODE, Ordering::SeqCst);
                ctx.error(format!("Unable to start {}: {e}", invocation.program));
                return Err(SiteError::CommandExecutionFailed {
                    command,
                    code: SPAWN_FAILURE_CODE,
                });
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx);
        } else {
            drop(tx);
        }

        let status = if invocation.long_running {
            let mut ticker = tokio::time::interval(self.poll_interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                let finished = tokio::select! {
                    status = child.wait() => Some(status),
                    _ = ticker.tick() => None,
                };
                if let Some(status) = finished {
                    break status?;
                }
                ctx.keep_alive(&command);
                if child.id().map(is_stopped).unwrap_or(false) {
                    warn!("{command} is stopped, terminating it");
                    if let Err(e) = child.kill().await {
                        ctx.error(format!("Failed to terminate stopped process: {e}"));
                    }
                    self.last_exit_code.store(-1, Ordering::SeqCst);
                    ctx.error(format!("Command was stopped and has been terminated: {command}"));
                    return Err(SiteError::CommandStopped(command));
                }
            }
        } else {
            child.wait().await?
        };

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }

        let exit_code = status.code().unwrap_or(-1);
        self.last_exit_code.store(exit_code, Ordering::SeqCst);
        let failed = exit_code != 0 && !invocation.allow_non_zero;

        if failed || invocation.show_output {
            for line in &lines {
                ctx.msg(format!("  {line}"));
            }
        } else {
            for line in &lines {
                ctx.output(line);
            }
        }

        if failed {
            ctx.error(format!(
                "Command execution failure. Return code={exit_code}"
            ));
            return Err(SiteError::CommandExecutionFailed {
                command,
                code: exit_code,
            });
        }
        if exit_code != 0 {
            debug!("{command} exited with {exit_code} (tolerated)");
        }

        Ok(CommandOutput { exit_code, lines })
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

/// Reads the process state from procfs; `T` and `t` mean stopped or traced.
fn is_stopped(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .as_deref()
        .and_then(process_state)
        .map(|state| state == 'T' || state == 't')
        .unwrap_or(false)
}

/// The state field follows the parenthesised command name, which may itself
/// contain spaces or parentheses.
fn process_state(stat: &str) -> Option<char> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}
