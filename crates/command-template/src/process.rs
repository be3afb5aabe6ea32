//! Running processes: waiting, signalling and exit classification

use std::fmt;

use async_process::Child;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, Either};

use crate::error::{Error, Result};
use crate::event::{ProcessEvent, ProcessEventType};
use crate::resolve::Pump;
use crate::task::PumpTask;

/// A handle to control a running process
#[async_trait]
pub trait ProcessHandle: Send {
    /// Get the process ID
    fn pid(&self) -> Option<u32>;

    /// Wait for the process to complete and return its exit status
    async fn wait(&mut self) -> Result<ExitStatus>;

    /// Send SIGTERM (or equivalent) for graceful shutdown
    async fn terminate(&mut self) -> Result<()>;

    /// Send SIGKILL (or equivalent) to forcefully stop the process
    async fn kill(&mut self) -> Result<()>;

    /// Send SIGINT (or equivalent) to interrupt the process
    async fn interrupt(&mut self) -> Result<()>;
}

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (always `None` off Unix)
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns true if the process was terminated by a signal
    pub fn terminated_by_signal(&self) -> bool {
        self.signal.is_some()
    }

    /// Whether the process died writing to a pipe nobody reads any more.
    ///
    /// Covers both the raw signal and a shell reporting it as `128 + SIGPIPE`.
    pub(crate) fn broken_pipe(&self) -> bool {
        #[cfg(unix)]
        {
            let sigpipe = nix::sys::signal::Signal::SIGPIPE as i32;
            self.signal == Some(sigpipe) || self.code == Some(128 + sigpipe)
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }
}

/// A started command.
///
/// Owns the child process, the background pumps servicing its stream bindings
/// and, when stdin was piped from another command, the upstream
/// `RunningCommand`. The pumps run from the moment the process is started.
/// Dropping the handle without waiting stops feeding stdin but lets output
/// drain.
pub struct RunningCommand {
    program: String,
    ok_exit: Vec<i32>,
    child: Child,
    started_at: DateTime<Utc>,
    feed: Option<PumpTask>,
    drains: Vec<PumpTask>,
    upstream: Option<Box<RunningCommand>>,
    status: Option<ExitStatus>,
    events: Vec<ProcessEvent>,
}

impl RunningCommand {
    pub(crate) fn new(
        program: String,
        ok_exit: Vec<i32>,
        mut child: Child,
        feed: Option<Pump>,
        drains: Vec<Pump>,
    ) -> Result<Self> {
        let started = ProcessEvent::new(ProcessEventType::Started { pid: child.id() });
        tracing::debug!(program = %program, pid = child.id(), "process started");

        let tasks = (|| -> Result<_> {
            let feed = feed
                .map(|pump| PumpTask::spawn_cancellable(&program, pump))
                .transpose()?;
            let drains = drains
                .into_iter()
                .map(|pump| PumpTask::spawn(&program, pump))
                .collect::<Result<Vec<_>>>()?;
            Ok((feed, drains))
        })();
        let (feed, drains) = match tasks {
            Ok(tasks) => tasks,
            Err(err) => {
                if let Err(kill_err) = child.kill() {
                    tracing::warn!(program = %program, error = %kill_err, "failed to kill process");
                }
                return Err(err);
            }
        };

        Ok(Self {
            program,
            ok_exit,
            child,
            started_at: started.timestamp,
            feed,
            drains,
            upstream: None,
            status: None,
            events: vec![started],
        })
    }

    pub(crate) fn with_upstream(mut self, upstream: RunningCommand) -> Self {
        self.upstream = Some(Box::new(upstream));
        self
    }

    /// The program this process runs
    pub fn program(&self) -> &str {
        &self.program
    }

    /// When the process was spawned
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Lifecycle events recorded so far
    pub fn events(&self) -> &[ProcessEvent] {
        &self.events
    }

    /// The exit status, once the process has been waited on
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// The exit code, once the process has been waited on
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|status| status.code)
    }

    /// The command whose output feeds this one, if stdin was piped
    pub fn upstream(&self) -> Option<&RunningCommand> {
        self.upstream.as_deref()
    }

    /// Wait for the process (and any upstream) to exit.
    ///
    /// Output bindings are fully drained before this returns. A stdin binding
    /// that is still producing when the process exits is abandoned. The exit
    /// status is recorded even when a binding failed, and waiting again
    /// returns it.
    pub fn wait(&mut self) -> BoxFuture<'_, Result<ExitStatus>> {
        Box::pin(async move {
            if let Some(status) = self.status {
                return Ok(status);
            }

            let child = &mut self.child;
            let feed = self.feed.take();
            let drains = std::mem::take(&mut self.drains);

            let own = async move {
                let status = child.status().await;
                // Output pumps end once every copy of the write ends is closed
                let drained = future::try_join_all(drains.into_iter().map(PumpTask::join)).await;
                let fed = feed.and_then(PumpTask::finished).unwrap_or(Ok(()));
                (status, drained, fed)
            };

            let upstream = self.upstream.as_deref_mut();
            let upstream = async move {
                match upstream {
                    Some(upstream) => upstream.wait().await.map(Some),
                    None => Ok(None),
                }
            };

            let ((status, drained, fed), upstream) = future::join(own, upstream).await;
            let status = ExitStatus::from(status?);

            tracing::debug!(
                program = %self.program,
                code = ?status.code,
                signal = ?status.signal,
                "process exited"
            );
            self.events.push(ProcessEvent::new(ProcessEventType::Exited {
                code: status.code,
                signal: status.signal,
            }));
            self.status = Some(status);

            drained?;
            fed?;
            upstream?;
            Ok(status)
        })
    }

    /// Block the calling thread until the process exits
    pub fn wait_blocking(&mut self) -> Result<ExitStatus> {
        futures_lite::future::block_on(self.wait())
    }

    /// Check the recorded exit status against the accepted exit codes.
    ///
    /// Upstream stages are checked first, each against its own codes. An
    /// upstream stage that died of `SIGPIPE` is accepted: its reader exited
    /// before consuming everything, as `head` does.
    pub(crate) fn classify(&self) -> Result<()> {
        self.classify_stage(false)
    }

    fn classify_stage(&self, piped: bool) -> Result<()> {
        if let Some(upstream) = &self.upstream {
            upstream.classify_stage(true)?;
        }

        let status = self.status.ok_or_else(|| {
            Error::Io(std::io::Error::other(format!(
                "`{}` has not been waited on",
                self.program
            )))
        })?;

        if piped && status.broken_pipe() {
            tracing::trace!(program = %self.program, "upstream stopped by closed pipe");
            return Ok(());
        }

        match (status.code, status.signal) {
            (Some(code), _) if self.ok_exit.contains(&code) => Ok(()),
            (Some(code), _) => Err(Error::FailureExitCode {
                program: self.program.clone(),
                code,
            }),
            (None, Some(signal)) => Err(Error::SignalTerminated {
                program: self.program.clone(),
                signal,
            }),
            (None, None) => Err(Error::Io(std::io::Error::other(format!(
                "`{}` exited without a status code",
                self.program
            )))),
        }
    }

    /// Kill this process and its upstream stages without waiting
    pub(crate) fn abort(&mut self) {
        if let Some(upstream) = self.upstream.as_deref_mut() {
            upstream.abort();
        }
        if let Err(err) = self.child.kill() {
            tracing::warn!(program = %self.program, error = %err, "failed to kill process");
        }
    }

    #[cfg(unix)]
    fn send_signal(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        use nix::sys::signal;
        use nix::unistd::Pid;

        if self.status.is_some() {
            return Ok(());
        }
        let pid = Pid::from_raw(self.child.id() as i32);
        signal::kill(pid, signal).map_err(|e| Error::signal_failed(signal as i32, e.to_string()))
    }
}

#[async_trait]
impl ProcessHandle for RunningCommand {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        RunningCommand::wait(self).await
    }

    async fn terminate(&mut self) -> Result<()> {
        if let Some(upstream) = self.upstream.as_deref_mut() {
            upstream.terminate().await?;
        }

        #[cfg(unix)]
        {
            self.send_signal(nix::sys::signal::Signal::SIGTERM)?;
        }

        #[cfg(not(unix))]
        {
            self.child
                .kill()
                .map_err(|e| Error::signal_failed(-1, e.to_string()))?;
        }

        Ok(())
    }

    async fn kill(&mut self) -> Result<()> {
        if let Some(upstream) = self.upstream.as_deref_mut() {
            upstream.kill().await?;
        }

        if self.status.is_none() {
            self.child
                .kill()
                .map_err(|e| Error::signal_failed(9, e.to_string()))?;
        }
        Ok(())
    }

    async fn interrupt(&mut self) -> Result<()> {
        if let Some(upstream) = self.upstream.as_deref_mut() {
            upstream.interrupt().await?;
        }

        #[cfg(unix)]
        {
            self.send_signal(nix::sys::signal::Signal::SIGINT)?;
        }

        #[cfg(not(unix))]
        {
            // Windows doesn't have SIGINT equivalent
            if self.status.is_none() {
                self.child
                    .kill()
                    .map_err(|e| Error::signal_failed(2, e.to_string()))?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for RunningCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningCommand")
            .field("program", &self.program)
            .field("pid", &self.child.id())
            .field("started_at", &self.started_at)
            .field("status", &self.status)
            .field("upstream", &self.upstream)
            .finish_non_exhaustive()
    }
}
