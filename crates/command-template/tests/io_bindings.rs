//! Tests for binding standard streams to the various endpoint kinds

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use command_template::{Buffer, Command, Error, Input, Opts, Output, SharedReader, SharedWriter};
use futures::io::AsyncWrite;

/// Async writer that collects everything into a shared vector
#[derive(Clone, Default)]
struct Collect(Arc<Mutex<Vec<u8>>>);

impl Collect {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl AsyncWrite for Collect {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Async writer whose every write fails
struct Failing;

impl AsyncWrite for Failing {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::Error::other("disk full")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn cat() -> Command {
    Command::new("cat")
}

#[test]
fn test_stdin_from_text() {
    futures::executor::block_on(async {
        let out = cat()
            .bake_opts(Opts::new().stdin("literal text"))
            .output()
            .await
            .unwrap();
        assert_eq!(out, "literal text");
    });
}

#[test]
fn test_stdin_from_bytes() {
    futures::executor::block_on(async {
        let out = cat()
            .bake_opts(Opts::new().stdin(b"raw bytes".to_vec()))
            .output()
            .await
            .unwrap();
        assert_eq!(out, "raw bytes");
    });
}

#[test]
fn test_stdin_buffer_is_read_at_start() {
    futures::executor::block_on(async {
        let input = Buffer::new();
        let cmd = cat().bake_opts(Opts::new().stdin(input.clone()));

        // Written after baking, before starting
        input.append(b"late data");

        assert_eq!(cmd.output().await.unwrap(), "late data");
    });
}

#[test]
fn test_stdin_from_reader() {
    futures::executor::block_on(async {
        let reader = SharedReader::new(futures::io::Cursor::new(b"streamed in".to_vec()));
        let out = cat()
            .bake_opts(Opts::new().stdin(reader))
            .output()
            .await
            .unwrap();
        assert_eq!(out, "streamed in");
    });
}

#[smol_potat::test]
async fn test_stdin_from_line_channel() {
    let (tx, rx) = async_channel::unbounded::<String>();
    let out = Buffer::new();
    let mut running = cat()
        .bake_opts(Opts::new().stdin(rx).stdout(out.clone()))
        .start()
        .unwrap();

    tx.send("line 1".to_string()).await.unwrap();
    tx.send("line 2".to_string()).await.unwrap();
    drop(tx);

    assert!(running.wait().await.unwrap().success());
    assert_eq!(out.to_string_lossy(), "line 1\nline 2\n");
}

#[smol_potat::test]
async fn test_line_channel_in_chunk_channel_out() {
    let (in_tx, in_rx) = async_channel::unbounded::<String>();
    let (out_tx, out_rx) = async_channel::unbounded::<Vec<u8>>();

    in_tx.send("first".to_string()).await.unwrap();
    in_tx.send("second".to_string()).await.unwrap();
    drop(in_tx);

    cat()
        .bake_opts(Opts::new().stdin(in_rx).stdout(out_tx))
        .run()
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Ok(chunk) = out_rx.try_recv() {
        received.extend(chunk);
    }
    assert_eq!(received, b"first\nsecond\n");
}

#[smol_potat::test]
async fn test_chunk_channel_in() {
    let (tx, rx) = async_channel::unbounded::<Vec<u8>>();
    tx.send(b"ab".to_vec()).await.unwrap();
    tx.send(b"cd".to_vec()).await.unwrap();
    drop(tx);

    let out = cat()
        .bake_opts(Opts::new().stdin(rx))
        .output()
        .await
        .unwrap();
    assert_eq!(out, "abcd");
}

#[smol_potat::test]
async fn test_stdout_to_line_channel() {
    let (tx, rx) = async_channel::unbounded::<String>();

    Command::new("sh")
        .bake_args(["-c", "echo alpha; echo beta; printf gamma"])
        .bake_opts(Opts::new().stdout(tx))
        .run()
        .await
        .unwrap();

    let lines: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(lines, vec!["alpha", "beta", "gamma"]);
}

#[smol_potat::test]
async fn test_stdout_and_stderr_to_separate_writers() {
    let out = Collect::default();
    let err = Collect::default();

    Command::new("sh")
        .bake_args(["-c", "printf to-out; printf to-err >&2"])
        .bake_opts(
            Opts::new()
                .stdout(SharedWriter::new(out.clone()))
                .stderr(SharedWriter::new(err.clone())),
        )
        .run()
        .await
        .unwrap();

    assert_eq!(out.text(), "to-out");
    assert_eq!(err.text(), "to-err");
}

#[smol_potat::test]
async fn test_same_writer_merges_streams() {
    let sink = Collect::default();
    let writer = SharedWriter::new(sink.clone());

    Command::new("sh")
        .bake_args(["-c", "echo 1; echo 2 >&2; echo 3"])
        .bake_opts(Opts::new().stdout(writer.clone()).stderr(writer))
        .run()
        .await
        .unwrap();

    assert_eq!(sink.text(), "1\n2\n3\n");
}

#[smol_potat::test]
async fn test_stderr_to_buffer_with_stdout_discarded() {
    let err = Buffer::new();

    Command::new("sh")
        .bake_args(["-c", "echo ignored; echo kept >&2"])
        .bake_opts(Opts::new().stderr(err.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(err.to_string_lossy(), "kept\n");
}

#[test]
fn test_closed_output_channel_is_not_an_error() {
    futures::executor::block_on(async {
        let (tx, rx) = async_channel::unbounded::<String>();
        drop(rx);

        Command::new("sh")
            .bake_args(["-c", "for i in 1 2 3; do echo $i; done"])
            .bake_opts(Opts::new().stdout(tx))
            .run()
            .await
            .unwrap();
    });
}

#[test]
fn test_process_ignoring_stdin_still_completes() {
    futures::executor::block_on(async {
        let (tx, rx) = async_channel::unbounded::<String>();

        // The sender is never closed; the feed is abandoned once `true` exits.
        Command::new("true")
            .bake_opts(Opts::new().stdin(rx))
            .run()
            .await
            .unwrap();
        drop(tx);
    });
}

#[test]
fn test_unsupported_stdout_fails_at_start() {
    let cmd = Command::new("true").bake_opts(Opts::new().stdout(Output::from_value(17u32)));

    let err = cmd.start().unwrap_err();
    match err {
        Error::UnsupportedStreamBinding { stream, type_name } => {
            assert_eq!(stream, "stdout");
            assert_eq!(type_name, "u32");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unsupported_stdin_fails_at_start() {
    let cmd = Command::new("true").bake_opts(Opts::new().stdin(Input::from_value(1.5f32)));

    assert!(matches!(
        cmd.start().unwrap_err(),
        Error::UnsupportedStreamBinding { stream: "stdin", .. }
    ));
}

#[smol_potat::test]
async fn test_line_channel_streams_before_wait() {
    let (tx, rx) = async_channel::unbounded::<String>();
    let mut running = Command::new("sh")
        .bake_args(["-c", "echo first; sleep 0.2; echo second"])
        .bake_opts(Opts::new().stdout(tx))
        .start()
        .unwrap();

    // Delivered while the process is still running, before anyone waits
    assert_eq!(rx.recv().await.unwrap(), "first");

    assert!(running.wait().await.unwrap().success());
    assert_eq!(rx.recv().await.unwrap(), "second");
}

#[smol_potat::test]
async fn test_bounded_stdin_channel_is_fed_before_wait() {
    let (tx, rx) = async_channel::bounded::<String>(1);
    let out = Buffer::new();
    let mut running = cat()
        .bake_opts(Opts::new().stdin(rx).stdout(out.clone()))
        .start()
        .unwrap();

    for i in 0..5 {
        tx.send(format!("line {i}")).await.unwrap();
    }
    drop(tx);

    assert!(running.wait().await.unwrap().success());
    assert_eq!(out.to_string_lossy(), "line 0\nline 1\nline 2\nline 3\nline 4\n");
}

#[smol_potat::test]
async fn test_large_output_does_not_stall_unwaited_process() {
    let out = Buffer::new();
    let (tx, rx) = async_channel::unbounded::<String>();
    let mut running = Command::new("sh")
        .bake_args(["-c", "head -c 200000 /dev/zero; echo done >&2"])
        .bake_opts(Opts::new().stdout(out.clone()).stderr(tx))
        .start()
        .unwrap();

    // Only reachable once all of stdout went through the pipe
    assert_eq!(rx.recv().await.unwrap(), "done");

    running.wait().await.unwrap();
    assert_eq!(out.len(), 200_000);
}

#[smol_potat::test]
async fn test_failed_writer_still_records_status() {
    let mut running = Command::new("sh")
        .bake_args(["-c", "echo out; exit 3"])
        .bake_opts(Opts::new().stdout(SharedWriter::new(Failing)))
        .start()
        .unwrap();

    assert!(matches!(running.wait().await, Err(Error::Io(_))));
    assert_eq!(running.exit_code(), Some(3));
    assert_eq!(running.events().len(), 2);

    let again = running.wait().await.unwrap();
    assert_eq!(again.code, Some(3));
}
