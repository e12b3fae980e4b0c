//! Tests for ssh argument construction and connection sharing.

use super::super::*;
use rstest::rstest;

use super::fixtures::{HOST, as_strings, base_config, connected};

#[rstest]
fn ssh_args_carry_identity_and_host_key_policy(base_config: SessionConfig) {
    let (session, _runner) = connected(base_config);
    let args = as_strings(&session.build_ssh_args("uptime"));

    for expected in [
        "-i",
        "/keys/ci_ed25519",
        "BatchMode=yes",
        "StrictHostKeyChecking=no",
        "UserKnownHostsFile=/dev/null",
        "ConnectionAttempts=5",
    ] {
        assert!(
            args.contains(&expected.to_owned()),
            "missing {expected}: {args:?}"
        );
    }
    assert_eq!(
        args.iter().rev().take(2).cloned().collect::<Vec<_>>(),
        vec![String::from("uptime"), format!("root@{HOST}")]
    );
}

#[rstest]
fn ssh_config_is_ignored_unless_enabled(base_config: SessionConfig) {
    let (isolated, _isolated_runner) = connected(base_config.clone());
    let isolated_args = as_strings(&isolated.build_ssh_args("true"));
    let position = isolated_args
        .iter()
        .position(|arg| arg == "-F")
        .expect("-F should be present");
    assert_eq!(
        isolated_args.get(position + 1).map(String::as_str),
        Some("/dev/null")
    );

    let cfg = SessionConfig {
        use_ssh_config: true,
        ..base_config
    };
    let (honouring, _honouring_runner) = connected(cfg);
    let honouring_args = as_strings(&honouring.build_ssh_args("true"));
    assert!(
        !honouring_args.contains(&String::from("-F")),
        "args: {honouring_args:?}"
    );
}

#[rstest]
fn port_and_user_come_from_config(base_config: SessionConfig) {
    let cfg = SessionConfig {
        port: 2222,
        user: String::from("ubuntu"),
        ..base_config
    };
    let (session, runner) = connected(cfg);
    let probe = runner
        .invocations()
        .first()
        .cloned()
        .expect("probe invocation");
    let args = as_strings(&probe.args);
    assert_eq!(args.get(0..2), Some(&[String::from("-p"), String::from("2222")][..]));
    assert!(args.contains(&format!("ubuntu@{HOST}")), "args: {args:?}");
    assert_eq!(probe.remote_command().as_deref(), Some("true"));
    drop(session);
}

#[rstest]
fn eager_sessions_do_not_share_a_control_master(base_config: SessionConfig) {
    let (session, _runner) = connected(base_config);
    let args = as_strings(&session.build_ssh_args("true"));
    assert!(
        !args.iter().any(|arg| arg.starts_with("ControlMaster")),
        "args: {args:?}"
    );
}

#[rstest]
fn shared_sessions_use_control_master_and_stop_it_on_close(base_config: SessionConfig) {
    let cfg = SessionConfig {
        eager_disconnect: false,
        control_path: String::from("/tmp/mesobox-%C"),
        ..base_config
    };
    let (mut session, runner) = connected(cfg);
    let args = as_strings(&session.build_ssh_args("true"));
    assert!(args.contains(&String::from("ControlMaster=auto")), "args: {args:?}");
    assert!(
        args.contains(&String::from("ControlPath=/tmp/mesobox-%C")),
        "args: {args:?}"
    );

    runner.push_success();
    session.close().expect("close should stop the master");
    session.close().expect("second close is a no-op");

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 2, "probe plus one exit request");
    let exit = invocations.last().expect("exit invocation").command_string();
    assert!(exit.contains("-O exit"), "exit command: {exit}");
}

#[rstest]
fn eager_close_runs_nothing_remote(base_config: SessionConfig) {
    let (mut session, runner) = connected(base_config);
    session.close().expect("close");
    assert!(session.is_closed());
    assert_eq!(runner.invocations().len(), 1, "only the probe ran");
}

#[rstest]
fn privileged_command_escapes_for_sudo() {
    assert_eq!(
        privileged_command("apt-get install -y 'git'"),
        "sudo -n sh -c 'apt-get install -y '\\''git'\\'''"
    );
    assert_eq!(privileged_command("lsmod"), "sudo -n sh -c lsmod");
}
