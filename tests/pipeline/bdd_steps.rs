//! BDD step definitions for the provisioning and verification tasks.

use mesobox::test_support::{FakeHost, HostCall};
use mesobox::{Distribution, Protocol};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{PipelineContext, TaskOutcome};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("unknown task '{0}'")]
    UnknownTask(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a healthy host")]
fn healthy_host(pipeline_context: PipelineContext) -> PipelineContext {
    let _ = pipeline_context;
    PipelineContext::for_host(FakeHost::healthy())
}

#[given("a fresh host")]
fn fresh_host(pipeline_context: PipelineContext) -> PipelineContext {
    let _ = pipeline_context;
    PipelineContext::for_host(FakeHost::new())
}

#[given("port \"{port}\" is not listening")]
fn port_closed(pipeline_context: PipelineContext, port: u16) -> PipelineContext {
    pipeline_context.host.set_port(port, Protocol::Tcp, false);
    pipeline_context
}

#[given("provisioning fails at \"{marker}\"")]
fn provisioning_fails(pipeline_context: PipelineContext, marker: String) -> PipelineContext {
    pipeline_context.host.fail_when(marker.trim());
    pipeline_context
}

#[given("the host refuses connections")]
fn host_refuses(pipeline_context: PipelineContext) -> PipelineContext {
    pipeline_context.connector.refuse_connections();
    pipeline_context
}

#[when("I run the \"{task}\" task for \"{distribution}\"")]
fn run_task(
    pipeline_context: PipelineContext,
    task: String,
    distribution: String,
) -> Result<PipelineContext, StepError> {
    let runner = pipeline_context.task_runner();
    let result = match task.as_str() {
        "bootstrap" => runner.bootstrap(&distribution),
        "tests" => runner.tests(&distribution),
        "it" => runner.it(&distribution),
        other => return Err(StepError::UnknownTask(other.to_owned())),
    };
    let outcome = match result {
        Ok(report) => TaskOutcome::Passed(report),
        Err(err) => TaskOutcome::Failed(err.to_string()),
    };
    Ok(PipelineContext {
        outcome: Some(outcome),
        ..pipeline_context
    })
}

#[then("the task succeeds")]
fn task_succeeds(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    match &pipeline_context.outcome {
        Some(TaskOutcome::Passed(_)) => Ok(()),
        Some(TaskOutcome::Failed(message)) => Err(StepError::Assertion(format!(
            "task failed unexpectedly: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the task fails naming \"{expected}\"")]
fn task_fails_naming(pipeline_context: &PipelineContext, expected: String) -> Result<(), StepError> {
    match &pipeline_context.outcome {
        Some(TaskOutcome::Failed(message)) if message.contains(expected.trim()) => Ok(()),
        Some(TaskOutcome::Failed(message)) => Err(StepError::Assertion(format!(
            "expected failure naming '{expected}', got '{message}'"
        ))),
        Some(TaskOutcome::Passed(_)) => Err(StepError::Assertion(String::from(
            "task passed but a failure was expected",
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("no provisioning step ran")]
fn no_provisioning(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let calls = pipeline_context.host.provision_calls();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("unexpected steps: {calls:?}")))
    }
}

#[then("no check ran")]
fn no_checks(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let calls = pipeline_context.host.check_calls();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("unexpected checks: {calls:?}")))
    }
}

#[then("no check mentions \"{needle}\"")]
fn no_check_mentions(pipeline_context: &PipelineContext, needle: String) -> Result<(), StepError> {
    let calls = pipeline_context.host.check_calls();
    if calls.iter().any(|call| call.contains(needle.trim())) {
        Err(StepError::Assertion(format!(
            "'{needle}' should not be checked: {calls:?}"
        )))
    } else {
        Ok(())
    }
}

#[then("the session was closed")]
fn session_closed(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    match pipeline_context.host.calls().last() {
        Some(HostCall::Close) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected the last call to close the session, got {other:?}"
        ))),
    }
}

#[then("no connection was attempted")]
fn no_connection(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    match pipeline_context.connector.connects() {
        0 => Ok(()),
        count => Err(StepError::Assertion(format!(
            "expected no connection, saw {count}"
        ))),
    }
}

#[then("the bootstrap steps ran \"{times}\" times in the same order")]
fn bootstrap_repeated(pipeline_context: &PipelineContext, times: usize) -> Result<(), StepError> {
    let expected: Vec<String> = Distribution::Ubuntu1404
        .bootstrap_steps()
        .iter()
        .map(|step| step.action().to_string())
        .collect();
    let repeated: Vec<String> = std::iter::repeat_n(expected, times).flatten().collect();
    let actual = pipeline_context.host.provision_calls();
    if actual == repeated {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {times} identical bootstrap runs, got {actual:?}"
        )))
    }
}
