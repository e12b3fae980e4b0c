//! Shared fixtures for pipeline BDD scenarios.

use mesobox::test_support::{FakeConnector, FakeHost, MemoryStateStore};
use mesobox::{PipelineReport, TaskRunner};
use rstest::fixture;

#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub host: FakeHost,
    pub connector: FakeConnector,
    pub state: MemoryStateStore,
    pub outcome: Option<TaskOutcome>,
}

#[derive(Clone, Debug)]
pub enum TaskOutcome {
    Passed(PipelineReport),
    Failed(String),
}

impl PipelineContext {
    pub fn for_host(host: FakeHost) -> Self {
        Self {
            connector: FakeConnector::new(host.clone()),
            host,
            state: MemoryStateStore::new(),
            outcome: None,
        }
    }

    pub fn task_runner(&self) -> TaskRunner<FakeConnector, MemoryStateStore> {
        TaskRunner::new(self.connector.clone(), self.state.clone())
    }
}

#[fixture]
pub fn pipeline_context() -> PipelineContext {
    PipelineContext::for_host(FakeHost::new())
}
