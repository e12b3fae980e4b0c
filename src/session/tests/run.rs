//! Tests for connecting and running remote commands.

use super::super::*;
use crate::test_support::ScriptedRunner;
use rstest::rstest;

use super::fixtures::{HOST, base_config, connected};

#[rstest]
fn connect_rejects_missing_host(base_config: SessionConfig) {
    let runner = ScriptedRunner::new();
    let err = RemoteSession::connect("  ", base_config, runner.clone())
        .expect_err("blank host should fail");
    assert!(matches!(err, SessionError::Connection { .. }), "error: {err}");
    assert!(runner.invocations().is_empty(), "nothing should be spawned");
}

#[rstest]
fn connect_rejects_invalid_config_before_probing(base_config: SessionConfig) {
    let cfg = SessionConfig {
        user: String::new(),
        ..base_config
    };
    let runner = ScriptedRunner::new();
    let err = RemoteSession::connect(HOST, cfg, runner.clone()).expect_err("invalid config");
    assert!(matches!(err, SessionError::InvalidConfig { .. }), "error: {err}");
    assert!(runner.invocations().is_empty());
}

#[rstest]
#[case::ssh_failure(Some(SSH_CONNECTION_FAILURE))]
#[case::remote_failure(Some(1))]
#[case::killed(None)]
fn failed_probe_is_a_connection_error(base_config: SessionConfig, #[case] code: Option<i32>) {
    let runner = ScriptedRunner::new();
    runner.push_output(code, "", "Permission denied (publickey).");
    let err = RemoteSession::connect(HOST, base_config, runner).expect_err("probe fails");
    let SessionError::Connection { ref host, .. } = err else {
        panic!("expected Connection error, got {err:?}");
    };
    assert_eq!(host, HOST);
}

#[rstest]
fn unspawnable_client_is_a_connection_error(base_config: SessionConfig) {
    // An empty script makes the runner report a spawn failure.
    let err = RemoteSession::connect(HOST, base_config, ScriptedRunner::new())
        .expect_err("spawn fails");
    assert!(matches!(err, SessionError::Connection { .. }), "error: {err}");
}

#[rstest]
fn run_returns_output_on_success(base_config: SessionConfig) {
    let (session, runner) = connected(base_config);
    runner.push_output(Some(0), "hello\n", "");
    let output = session
        .run("echo hello", RunOptions::default())
        .expect("run should succeed");
    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout, "hello\n");
}

#[rstest]
fn run_fails_on_non_zero_exit_unless_tolerant(base_config: SessionConfig) {
    let (session, runner) = connected(base_config);
    runner.push_output(Some(3), "", "no such package\n");
    let err = session
        .run("dpkg -s nope", RunOptions::default())
        .expect_err("strict run should fail");
    assert_eq!(
        err,
        SessionError::CommandFailed {
            command: String::from("dpkg -s nope"),
            status: Some(3),
            status_text: String::from("3"),
            stderr: String::from("no such package"),
        }
    );

    runner.push_exit_code(3);
    let output = session
        .run("dpkg -s nope", RunOptions::default().tolerant())
        .expect("tolerant run returns the status");
    assert_eq!(output.exit_code, 3);
    assert!(!output.is_success());
}

#[rstest]
fn mid_session_ssh_failure_is_a_connection_error(base_config: SessionConfig) {
    let (session, runner) = connected(base_config);
    runner.push_output(Some(SSH_CONNECTION_FAILURE), "", "Connection reset by peer");
    let err = session
        .run("uptime", RunOptions::PROBE)
        .expect_err("tolerance does not cover transport failures");
    assert!(matches!(err, SessionError::Connection { .. }), "error: {err}");
}

#[rstest]
fn run_privileged_wraps_command_in_sudo(base_config: SessionConfig) {
    let (session, runner) = connected(base_config);
    runner.push_success();
    session
        .run_privileged("apt-get update", RunOptions::default().hidden())
        .expect("privileged run");
    let remote = runner
        .invocations()
        .last()
        .and_then(|invocation| invocation.remote_command())
        .expect("remote command");
    assert_eq!(remote, "sudo -n sh -c 'apt-get update'");
}

#[rstest]
fn run_after_close_is_rejected(base_config: SessionConfig) {
    let (mut session, runner) = connected(base_config);
    session.close().expect("close");
    let err = session
        .run("true", RunOptions::default())
        .expect_err("closed session");
    assert_eq!(
        err,
        SessionError::Closed {
            host: String::from(HOST)
        }
    );
    assert_eq!(runner.invocations().len(), 1);
}
