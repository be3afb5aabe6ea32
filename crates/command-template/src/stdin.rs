//! Feeding a process's stdin
//!
//! [`StdinFeeder`] owns the write end of a child's stdin and pushes data
//! from whichever input binding was resolved at start time. Dropping or
//! closing the feeder signals end-of-file to the process.

use async_channel::Receiver;
use async_process::ChildStdin;
use futures::io::{AsyncRead, AsyncWriteExt};

use crate::error::Result;

/// Writer half of a process's stdin
pub(crate) struct StdinFeeder {
    stdin: Option<ChildStdin>,
}

impl StdinFeeder {
    pub(crate) fn new(stdin: ChildStdin) -> Self {
        Self { stdin: Some(stdin) }
    }

    /// Write a line to stdin (adds newline)
    pub(crate) async fn write_line(&mut self, line: &str) -> Result<()> {
        if let Some(stdin) = &mut self.stdin {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
        }
        Ok(())
    }

    /// Write raw bytes to stdin
    pub(crate) async fn write(&mut self, data: &[u8]) -> Result<()> {
        if let Some(stdin) = &mut self.stdin {
            stdin.write_all(data).await?;
            stdin.flush().await?;
        }
        Ok(())
    }

    /// Forward lines until the channel is closed
    pub(crate) async fn forward_lines(&mut self, channel: &Receiver<String>) -> Result<()> {
        while let Ok(line) = channel.recv().await {
            self.write_line(&line).await?;
        }
        Ok(())
    }

    /// Forward byte chunks until the channel is closed
    pub(crate) async fn forward_chunks(&mut self, channel: &Receiver<Vec<u8>>) -> Result<()> {
        while let Ok(chunk) = channel.recv().await {
            self.write(&chunk).await?;
        }
        Ok(())
    }

    /// Copy a reader into stdin until it reaches end-of-file
    pub(crate) async fn copy_from<R>(&mut self, reader: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if let Some(stdin) = &mut self.stdin {
            futures::io::copy(reader, stdin).await?;
            stdin.flush().await?;
        }
        Ok(())
    }

    /// Close stdin by dropping the writer
    pub(crate) fn close(&mut self) {
        self.stdin.take();
    }
}
