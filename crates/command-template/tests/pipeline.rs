//! Tests for piping one command into another

use std::time::Duration;

use command_template::{Buffer, Command, Error, Opts, ProcessHandle};

fn sh(script: &str) -> Command {
    Command::new("sh").bake_args(["-c", script])
}

#[test]
fn test_upstream_output_feeds_downstream() {
    futures::executor::block_on(async {
        let out = Command::new("tr")
            .bake_args(["a-z", "A-Z"])
            .bake_opts(Opts::new().stdin(sh("printf 'hello pipe'")))
            .output()
            .await
            .unwrap();
        assert_eq!(out, "HELLO PIPE");
    });
}

#[test]
fn test_three_stage_pipeline() {
    futures::executor::block_on(async {
        let produce = sh("printf 'b\\na\\nc\\n'");
        let sort = Command::new("sort").bake_opts(Opts::new().stdin(produce));
        let count = Command::new("wc")
            .bake_args(["-l"])
            .bake_opts(Opts::new().stdin(sort));

        let out = count.output().await.unwrap();
        assert_eq!(out.trim(), "3");
    });
}

#[test]
fn test_aggregate_wait_tracks_both_stages() {
    futures::executor::block_on(async {
        let out = Buffer::new();
        let mut running = Command::new("cat")
            .bake_opts(Opts::new().stdin(sh("echo piped; exit 4")).stdout(out.clone()))
            .start()
            .unwrap();

        let status = running.wait().await.unwrap();
        assert_eq!(status.code, Some(0));

        let upstream = running.upstream().expect("pipeline should own its upstream");
        assert_eq!(upstream.program(), "sh");
        assert_eq!(upstream.exit_code(), Some(4));
        assert_eq!(out.to_string_lossy(), "piped\n");
    });
}

#[test]
fn test_failing_upstream_fails_the_run() {
    futures::executor::block_on(async {
        let err = Command::new("cat")
            .bake_opts(Opts::new().stdin(sh("echo data; exit 3")))
            .run()
            .await
            .unwrap_err();

        match err {
            Error::FailureExitCode { program, code } => {
                assert_eq!(program, "sh");
                assert_eq!(code, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    });
}

#[test]
fn test_upstream_uses_its_own_accepted_codes() {
    futures::executor::block_on(async {
        let upstream = sh("echo data; exit 3").bake_opts(Opts::new().ok_exit([3]));
        Command::new("cat")
            .bake_opts(Opts::new().stdin(upstream))
            .run()
            .await
            .unwrap();
    });
}

#[test]
fn test_failing_downstream_is_reported() {
    futures::executor::block_on(async {
        let err = sh("cat >/dev/null; exit 5")
            .bake_opts(Opts::new().stdin(Command::new("echo").bake_args(["x"])))
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(5));
    });
}

#[test]
fn test_upstream_stderr_stays_separate() {
    futures::executor::block_on(async {
        let upstream_err = Buffer::new();
        let upstream = sh("echo to-pipe; echo to-err >&2")
            .bake_opts(Opts::new().stderr(upstream_err.clone()));

        let out = Command::new("cat")
            .bake_opts(Opts::new().stdin(upstream))
            .output()
            .await
            .unwrap();

        assert_eq!(out, "to-pipe\n");
        assert_eq!(upstream_err.to_string_lossy(), "to-err\n");
    });
}

#[test]
fn test_upstream_with_bound_output_is_rejected() {
    let upstream = Command::new("echo").bake_opts(Opts::new().stdout(Buffer::new()));
    let err = Command::new("cat")
        .bake_opts(Opts::new().stdin(upstream))
        .start()
        .unwrap_err();

    assert!(matches!(err, Error::PipingNotImplemented { program } if program == "echo"));
}

#[test]
fn test_downstream_spawn_failure_is_reported() {
    let err = Command::new("this_command_does_not_exist_12345")
        .bake_opts(Opts::new().stdin(Command::new("sleep").bake_args(["5"])))
        .start()
        .unwrap_err();

    assert!(matches!(err, Error::SpawnFailed { .. }));
}

#[test]
#[cfg(unix)]
fn test_reader_exiting_early_is_not_a_failure() {
    futures::executor::block_on(async {
        // `yes` itself dies of SIGPIPE once `head` is done
        let out = Command::new("head")
            .bake_args(["-n1"])
            .bake_opts(Opts::new().stdin(Command::new("yes")))
            .output()
            .await
            .unwrap();
        assert_eq!(out, "y\n");

        // A shell reports the same thing as exit code 141
        let out = Command::new("head")
            .bake_args(["-n1"])
            .bake_opts(Opts::new().stdin(sh("yes")))
            .output()
            .await
            .unwrap();
        assert_eq!(out, "y\n");
    });
}

#[smol_potat::test]
#[cfg(unix)]
async fn test_interrupt_reaches_every_stage() {
    let mut running = Command::new("cat")
        .bake_opts(Opts::new().stdin(Command::new("sleep").bake_args(["10"])))
        .start()
        .unwrap();

    // Give both stages a moment to start
    smol::Timer::after(Duration::from_millis(100)).await;

    running.interrupt().await.unwrap();
    let status = running.wait().await.unwrap();
    assert_eq!(status.signal, Some(2));

    let upstream = running.upstream().unwrap().exit_status().unwrap();
    assert_eq!(upstream.signal, Some(2));
}
