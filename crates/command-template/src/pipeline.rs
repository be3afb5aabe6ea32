//! Piping one command's output into another's input
//!
//! A pipeline is started upstream first: the upstream process gets the write
//! end of an OS pipe as its stdout, the downstream process gets the read end
//! as its stdin. The downstream [`RunningCommand`] owns the upstream one, so
//! waiting on it waits for the whole chain and classifying it checks every
//! stage.

use crate::command::Command;
use crate::error::{Error, Result};
use crate::process::RunningCommand;
use crate::resolve::{StdinSource, StdoutTarget};

/// Start `upstream | downstream`, with `stdout` as the downstream's output.
pub(crate) fn launch(
    upstream: &Command,
    downstream: &Command,
    stdout: StdoutTarget<'_>,
) -> Result<RunningCommand> {
    if upstream.opts().stdout.is_some() {
        return Err(Error::PipingNotImplemented {
            program: upstream.program().to_string(),
        });
    }

    let (reader, writer) = std::io::pipe()?;
    let mut upstream_handle = upstream.launch(StdoutTarget::Pipe(writer))?;

    tracing::debug!(
        upstream = %upstream.program(),
        downstream = %downstream.program(),
        "piping commands"
    );

    match downstream.spawn(StdinSource::Pipe(reader), stdout) {
        Ok(handle) => Ok(handle.with_upstream(upstream_handle)),
        Err(err) => {
            upstream_handle.abort();
            Err(err)
        }
    }
}
