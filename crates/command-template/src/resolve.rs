//! Resolution of I/O endpoints into process streams
//!
//! Resolution is done in two steps around the spawn:
//!
//! 1. [`attach`] turns the stdin/stdout/stderr bindings into `Stdio` values on
//!    the process builder and remembers what still has to be serviced.
//! 2. [`Attached::into_pumps`] takes the pipes off the spawned child and
//!    returns futures that move bytes between the pipes and the endpoints.
//!
//! The pumps are run in the background as soon as the process is started.

use std::future::Future;
use std::io::{ErrorKind, PipeReader, PipeWriter};
use std::pin::Pin;

use async_channel::{Receiver, Sender};
use async_process::{Child, Command as ProcessCommand, Stdio};
use futures::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::io::{Buffer, Input, Output, SharedReader, SharedWriter};
use crate::stdin::StdinFeeder;

/// A boxed future moving bytes between a process and an endpoint
pub(crate) type Pump = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

const CHUNK_SIZE: usize = 8 * 1024;

/// Data that has to be pushed into stdin after spawning
enum Feed {
    Bytes(Vec<u8>),
    Reader(SharedReader),
    Lines(Receiver<String>),
    Chunks(Receiver<Vec<u8>>),
}

/// A destination that has to be filled from a process pipe
#[derive(Clone)]
enum Sink {
    Buffer(Buffer),
    Writer(SharedWriter),
    Lines(Sender<String>),
    Chunks(Sender<Vec<u8>>),
}

/// How stdin is connected
enum FeedPlan {
    Null,
    Inherit,
    Feed(Feed),
}

fn plan_feed(input: Option<&Input>) -> Result<FeedPlan> {
    Ok(match input {
        None => FeedPlan::Null,
        Some(Input::Inherit) => FeedPlan::Inherit,
        Some(Input::Text(text)) => FeedPlan::Feed(Feed::Bytes(text.as_bytes().to_vec())),
        Some(Input::Bytes(bytes)) => FeedPlan::Feed(Feed::Bytes(bytes.clone())),
        Some(Input::Buffer(buf)) => FeedPlan::Feed(Feed::Bytes(buf.contents())),
        Some(Input::Reader(reader)) => FeedPlan::Feed(Feed::Reader(reader.clone())),
        Some(Input::Lines(rx)) => FeedPlan::Feed(Feed::Lines(rx.clone())),
        Some(Input::Chunks(rx)) => FeedPlan::Feed(Feed::Chunks(rx.clone())),
        // Upstream commands are wired by the pipeline before resolution.
        Some(Input::Command(upstream)) => {
            return Err(Error::PipingNotImplemented {
                program: upstream.program().to_string(),
            });
        }
        Some(Input::Other(opaque)) => {
            return Err(Error::UnsupportedStreamBinding {
                stream: "stdin",
                type_name: opaque.type_name,
            });
        }
    })
}

/// How one output stream is connected
enum SinkPlan {
    Null,
    Inherit,
    Drain(Sink),
}

fn plan_sink(output: Option<&Output>, stream: &'static str) -> Result<SinkPlan> {
    Ok(match output {
        None => SinkPlan::Null,
        Some(Output::Inherit) => SinkPlan::Inherit,
        Some(Output::Buffer(buf)) => SinkPlan::Drain(Sink::Buffer(buf.clone())),
        Some(Output::Writer(writer)) => SinkPlan::Drain(Sink::Writer(writer.clone())),
        Some(Output::Lines(tx)) => SinkPlan::Drain(Sink::Lines(tx.clone())),
        Some(Output::Chunks(tx)) => SinkPlan::Drain(Sink::Chunks(tx.clone())),
        Some(Output::Other(opaque)) => {
            return Err(Error::UnsupportedStreamBinding {
                stream,
                type_name: opaque.type_name,
            });
        }
    })
}

fn sink_stdio(plan: &SinkPlan) -> Stdio {
    match plan {
        SinkPlan::Null => Stdio::null(),
        SinkPlan::Inherit => Stdio::inherit(),
        SinkPlan::Drain(_) => Stdio::piped(),
    }
}

/// Where stdin comes from once the command has been wired
pub(crate) enum StdinSource<'a> {
    /// Resolve from the command's own binding
    Binding(Option<&'a Input>),
    /// Read end of a pipe fed by an upstream process
    Pipe(PipeReader),
}

/// Where stdout goes once the command has been wired
pub(crate) enum StdoutTarget<'a> {
    /// Resolve from the command's own binding
    Binding(Option<&'a Output>),
    /// Write end of a pipe read by a downstream process
    Pipe(PipeWriter),
}

/// Streams that still need servicing after the spawn
pub(crate) struct Attached {
    feed: Option<Feed>,
    stdout: Option<Sink>,
    stderr: Option<Sink>,
    merged: Option<(PipeReader, Sink)>,
}

/// Configure the standard streams of `cmd` from the given bindings.
///
/// When stderr names the very same sink as stdout, both are attached to one
/// OS pipe so that the bytes keep the order in which the process wrote them.
pub(crate) fn attach(
    cmd: &mut ProcessCommand,
    stdin: StdinSource<'_>,
    stdout: StdoutTarget<'_>,
    stderr: Option<&Output>,
) -> Result<Attached> {
    let feed = match stdin {
        StdinSource::Pipe(reader) => {
            cmd.stdin(std::process::Stdio::from(reader));
            None
        }
        StdinSource::Binding(input) => match plan_feed(input)? {
            FeedPlan::Null => {
                cmd.stdin(Stdio::null());
                None
            }
            FeedPlan::Inherit => {
                cmd.stdin(Stdio::inherit());
                None
            }
            FeedPlan::Feed(feed) => {
                cmd.stdin(Stdio::piped());
                Some(feed)
            }
        },
    };

    let err_plan = plan_sink(stderr, "stderr")?;
    let out_plan = match stdout {
        StdoutTarget::Pipe(writer) => {
            cmd.stdout(std::process::Stdio::from(writer));
            // Wired straight to the downstream process; nothing to drain.
            SinkPlan::Null
        }
        StdoutTarget::Binding(stdout) => {
            let out_plan = plan_sink(stdout, "stdout")?;
            let same_sink = matches!((stdout, stderr), (Some(out), Some(err)) if out.same_sink(err));
            if same_sink {
                if let SinkPlan::Drain(sink) = &out_plan {
                    let sink = sink.clone();
                    let (reader, writer) = std::io::pipe()?;
                    cmd.stdout(std::process::Stdio::from(writer.try_clone()?));
                    cmd.stderr(std::process::Stdio::from(writer));
                    return Ok(Attached {
                        feed,
                        stdout: None,
                        stderr: None,
                        merged: Some((reader, sink)),
                    });
                }
            }
            cmd.stdout(sink_stdio(&out_plan));
            out_plan
        }
    };
    cmd.stderr(sink_stdio(&err_plan));

    let into_sink = |plan: SinkPlan| match plan {
        SinkPlan::Drain(sink) => Some(sink),
        SinkPlan::Null | SinkPlan::Inherit => None,
    };

    Ok(Attached {
        feed,
        stdout: into_sink(out_plan),
        stderr: into_sink(err_plan),
        merged: None,
    })
}

impl Attached {
    /// Take the child's pipes and build the pumps that service them.
    ///
    /// The stdin feed is returned separately: it may outlive the process
    /// (e.g. a channel nobody closes) and must not hold up `wait`.
    pub(crate) fn into_pumps(self, child: &mut Child) -> (Option<Pump>, Vec<Pump>) {
        let feed = match (self.feed, child.stdin.take()) {
            (Some(feed), Some(stdin)) => Some(Box::pin(run_feed(feed, StdinFeeder::new(stdin))) as Pump),
            _ => None,
        };

        let mut drains: Vec<Pump> = Vec::new();
        if let (Some(sink), Some(stdout)) = (self.stdout, child.stdout.take()) {
            drains.push(Box::pin(drain(stdout, sink)));
        }
        if let (Some(sink), Some(stderr)) = (self.stderr, child.stderr.take()) {
            drains.push(Box::pin(drain(stderr, sink)));
        }
        if let Some((reader, sink)) = self.merged {
            let file = async_fs::File::from(pipe_into_file(reader));
            drains.push(Box::pin(drain(file, sink)));
        }

        (feed, drains)
    }
}

/// Convert the read end of an OS pipe into a file usable by `async-fs`
fn pipe_into_file(reader: PipeReader) -> std::fs::File {
    #[cfg(unix)]
    {
        std::fs::File::from(std::os::fd::OwnedFd::from(reader))
    }
    #[cfg(windows)]
    {
        std::fs::File::from(std::os::windows::io::OwnedHandle::from(reader))
    }
}

async fn run_feed(feed: Feed, mut stdin: StdinFeeder) -> Result<()> {
    let result = match &feed {
        Feed::Bytes(bytes) => stdin.write(bytes).await,
        Feed::Reader(reader) => {
            let mut reader = reader.0.lock().await;
            stdin.copy_from(&mut **reader).await
        }
        Feed::Lines(rx) => stdin.forward_lines(rx).await,
        Feed::Chunks(rx) => stdin.forward_chunks(rx).await,
    };
    stdin.close();

    match result {
        // The process stopped reading; that is its business, not an error.
        Err(Error::Io(err)) if err.kind() == ErrorKind::BrokenPipe => {
            tracing::trace!("stdin closed by process before input was exhausted");
            Ok(())
        }
        other => other,
    }
}

async fn drain<R>(mut reader: R, sink: Sink) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut pending_line = Vec::new();
    let mut receiver_gone = false;

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if receiver_gone {
            continue;
        }
        let data = &chunk[..n];

        match &sink {
            Sink::Buffer(buf) => buf.append(data),
            Sink::Writer(writer) => {
                let mut writer = writer.0.lock().await;
                writer.write_all(data).await?;
                writer.flush().await?;
            }
            Sink::Chunks(tx) => {
                if tx.send(data.to_vec()).await.is_err() {
                    receiver_gone = true;
                }
            }
            Sink::Lines(tx) => {
                pending_line.extend_from_slice(data);
                while let Some(pos) = pending_line.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = pending_line.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
                    if tx.send(line).await.is_err() {
                        receiver_gone = true;
                        break;
                    }
                }
            }
        }

        if receiver_gone {
            tracing::warn!("output channel closed, discarding remaining output");
        }
    }

    if let Sink::Lines(tx) = &sink {
        if !receiver_gone && !pending_line.is_empty() {
            let line = String::from_utf8_lossy(&pending_line).into_owned();
            let _ = tx.send(line).await;
        }
    }

    Ok(())
}
