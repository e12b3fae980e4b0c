//! BDD scenarios for the provisioning and verification tasks.

use rstest_bdd_macros::scenario;

use super::test_helpers::{PipelineContext, pipeline_context};

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Acceptance checks pass on a healthy host"
)]
fn scenario_checks_pass_on_healthy_host(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "A closed zookeeper port stops verification"
)]
fn scenario_closed_port_stops_verification(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "Bootstrap can be repeated on a provisioned host"
)]
fn scenario_bootstrap_is_repeatable(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "A failed bootstrap skips the acceptance checks"
)]
fn scenario_failed_bootstrap_skips_checks(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "An unsupported distribution never connects"
)]
fn scenario_unsupported_distribution(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}

#[scenario(
    path = "tests/features/pipeline.feature",
    name = "An unreachable host fails before any step"
)]
fn scenario_unreachable_host(pipeline_context: PipelineContext) {
    let _ = pipeline_context;
}
