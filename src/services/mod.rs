//! Business logic services.

pub mod actors;
pub mod escalation;
pub mod event_broadcaster;
pub mod execution_queue;
pub mod recovery;
pub mod runner;
pub mod test_cases;
pub mod test_runs;

pub use actors::{change_role, resolve_actor};
pub use escalation::{EscalationCoordinator, EscalationReport, StatusChange};
pub use event_broadcaster::EventBroadcaster;
pub use execution_queue::{ExecutionJob, ExecutionQueue, start_execution_workers};
pub use recovery::{RecoveryConfig, RecoverySummary, start_recovery_task};
pub use runner::{ExecutionResult, ProcessRunner, RunnerError, ScriptExecutor};
pub use test_cases::TestCaseService;
pub use test_runs::{CompletedRun, CreatedRun, TestRunService};
