//! Command templates and the copy-on-bake builder
//!
//! A [`Command`] is an immutable snapshot of everything needed to launch a
//! process. Every bake returns a new `Command`; the receiver is never
//! modified, so commands derived from a shared ancestor stay independent.
//!
//! ```no_run
//! use command_template::{Command, Env, Opts};
//!
//! # fn main() -> command_template::Result<()> {
//! let git = Command::new("git").bake_env(Env::new().set("GIT_PAGER", "cat"));
//! let log = git.bake_args(["log", "--oneline"]);
//! let status = git.bake_args(["status"]).bake_opts(Opts::new().cwd("/tmp"));
//!
//! let history = log.output_blocking()?;
//! status.run_blocking()?;
//! # let _ = history;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_process::Command as ProcessCommand;

use crate::env::{Env, host_snapshot};
use crate::error::{Error, Result};
use crate::io::{Buffer, Input};
use crate::modifier::Modifier;
use crate::opts::Opts;
use crate::pipeline;
use crate::process::RunningCommand;
use crate::resolve::{self, StdinSource, StdoutTarget};

/// Everything baked into a command so far
#[derive(Debug, Clone)]
struct Template {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    opts: Opts,
}

impl Template {
    fn apply(&mut self, modifier: Modifier) {
        match modifier {
            Modifier::Arg(arg) => self.args.push(arg),
            Modifier::Env(env) => env.merge_into(&mut self.env),
            Modifier::ClearEnv => self.env.clear(),
            Modifier::Opts(opts) => self.opts.overlay(opts),
        }
    }
}

/// An immutable, reusable description of a process to launch
#[derive(Debug, Clone)]
pub struct Command {
    template: Arc<Template>,
}

impl Command {
    /// Create a command for `program` with a snapshot of the host environment
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_env(program, host_snapshot().clone())
    }

    /// Create a command for `program` with an explicit environment
    pub fn with_env(program: impl Into<String>, env: HashMap<String, String>) -> Self {
        Self {
            template: Arc::new(Template {
                program: program.into(),
                args: Vec::new(),
                env,
                opts: Opts {
                    ok_exit: Some(vec![0]),
                    ..Opts::default()
                },
            }),
        }
    }

    /// Apply modifiers in order, or run the command if there are none.
    ///
    /// With at least one modifier this returns the newly baked command. With
    /// none it is the same as [`Command::run_blocking`] and returns `None`.
    pub fn call(&self, modifiers: impl IntoIterator<Item = Modifier>) -> Result<Option<Command>> {
        let mut modifiers = modifiers.into_iter().peekable();
        if modifiers.peek().is_none() {
            self.run_blocking()?;
            return Ok(None);
        }

        let mut next = self.clone();
        let template = Arc::make_mut(&mut next.template);
        for modifier in modifiers {
            tracing::trace!(program = %template.program, ?modifier, "baking modifier");
            template.apply(modifier);
        }
        Ok(Some(next))
    }

    /// Bake a single modifier into a new command
    pub fn bake(&self, modifier: impl Into<Modifier>) -> Command {
        let modifier = modifier.into();
        tracing::trace!(program = %self.program(), ?modifier, "baking modifier");
        let mut next = self.clone();
        Arc::make_mut(&mut next.template).apply(modifier);
        next
    }

    /// Append arguments
    pub fn bake_args<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        let template = Arc::make_mut(&mut next.template);
        for arg in args {
            template.apply(Modifier::Arg(arg.into()));
        }
        next
    }

    /// Merge an environment overlay; empty values remove variables
    pub fn bake_env(&self, env: Env) -> Command {
        self.bake(Modifier::Env(env))
    }

    /// Drop every environment variable
    pub fn clear_env(&self) -> Command {
        self.bake(Modifier::ClearEnv)
    }

    /// Overlay the options that are set in `opts`
    pub fn bake_opts(&self, opts: Opts) -> Command {
        self.bake(Modifier::Opts(opts))
    }

    /// Get the program name
    pub fn program(&self) -> &str {
        &self.template.program
    }

    /// Get the arguments
    pub fn args(&self) -> &[String] {
        &self.template.args
    }

    /// Get the environment the process will see
    pub fn env(&self) -> &HashMap<String, String> {
        &self.template.env
    }

    /// Get the baked options
    pub fn opts(&self) -> &Opts {
        &self.template.opts
    }

    /// Get the working directory, if one was baked in
    pub fn cwd(&self) -> Option<&Path> {
        self.template.opts.cwd.as_deref()
    }

    /// Exit codes treated as success
    pub fn ok_exit(&self) -> &[i32] {
        self.template.opts.ok_exit.as_deref().unwrap_or(&[0])
    }

    /// Build the process description without any stream wiring
    fn prepare(&self) -> ProcessCommand {
        let template = &self.template;
        let mut cmd = ProcessCommand::new(&template.program);

        cmd.args(&template.args);

        cmd.env_clear();
        cmd.envs(&template.env);

        if let Some(dir) = &template.opts.cwd {
            cmd.current_dir(dir);
        }

        cmd
    }

    /// Start the command and return immediately.
    ///
    /// Stream bindings are resolved now. If stdin is bound to another
    /// command, that command is started as well and piped in.
    pub fn start(&self) -> Result<RunningCommand> {
        self.launch(StdoutTarget::Binding(self.opts().stdout.as_ref()))
    }

    pub(crate) fn launch(&self, stdout: StdoutTarget<'_>) -> Result<RunningCommand> {
        match &self.template.opts.stdin {
            Some(Input::Command(upstream)) => pipeline::launch(upstream, self, stdout),
            stdin => self.spawn(StdinSource::Binding(stdin.as_ref()), stdout),
        }
    }

    pub(crate) fn spawn(
        &self,
        stdin: StdinSource<'_>,
        stdout: StdoutTarget<'_>,
    ) -> Result<RunningCommand> {
        let mut cmd = self.prepare();
        let attached = resolve::attach(&mut cmd, stdin, stdout, self.opts().stderr.as_ref())?;

        tracing::debug!(
            program = %self.program(),
            args = self.args().len(),
            cwd = ?self.cwd(),
            "spawning process"
        );
        let spawned = cmd.spawn();
        // Release our copies of any pipe ends handed to the child.
        drop(cmd);
        let mut child = spawned.map_err(|e| Error::spawn_failed(self.program(), e.to_string()))?;

        let (feed, drains) = attached.into_pumps(&mut child);
        RunningCommand::new(
            self.program().to_string(),
            self.ok_exit().to_vec(),
            child,
            feed,
            drains,
        )
    }

    /// Start the command, wait for it, and check its exit code.
    ///
    /// Fails with [`Error::FailureExitCode`] when the code is not one of
    /// [`Command::ok_exit`]. Use [`Command::start`] to inspect codes directly.
    pub async fn run(&self) -> Result<()> {
        let mut running = self.start()?;
        running.wait().await?;
        running.classify()
    }

    /// Run the command and return what it wrote to stdout.
    ///
    /// Any previously bound stdout is replaced; stderr is left alone.
    pub async fn output(&self) -> Result<String> {
        let buf = Buffer::new();
        self.bake_opts(Opts::new().stdout(buf.clone())).run().await?;
        Ok(buf.to_string_lossy())
    }

    /// Run the command and return stdout and stderr interleaved in write order
    pub async fn combined_output(&self) -> Result<String> {
        let buf = Buffer::new();
        self.bake_opts(Opts::new().stdout(buf.clone()).stderr(buf.clone()))
            .run()
            .await?;
        Ok(buf.to_string_lossy())
    }

    /// Blocking version of [`Command::run`]
    pub fn run_blocking(&self) -> Result<()> {
        futures_lite::future::block_on(self.run())
    }

    /// Blocking version of [`Command::output`]
    pub fn output_blocking(&self) -> Result<String> {
        futures_lite::future::block_on(self.output())
    }

    /// Blocking version of [`Command::combined_output`]
    pub fn combined_output_blocking(&self) -> Result<String> {
        futures_lite::future::block_on(self.combined_output())
    }
}
