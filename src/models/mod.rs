//! Domain models for the QA pipeline.

pub mod automation_script;
pub mod notification;
pub mod pipeline_event;
pub mod test_case;
pub mod test_run;
pub mod ticket;
pub mod user;

// Re-export commonly used types
pub use automation_script::{AutomationScript, NewAutomationScript, ScriptStatus};
pub use notification::{Notifiable, NotifiableKind, Notification};
pub use pipeline_event::{EventMessage, PipelineEvent};
pub use test_case::{NewTestCase, Priority, TestCase, TestCaseStatus};
pub use test_run::{
    CreateRunRequest, INFRASTRUCTURE_ERROR_MARKER, RunOutcome, RunStatus, RunTransition, TestRun,
};
pub use ticket::{NewTicket, Severity, Ticket, TicketStatus};
pub use user::{Actor, Role, User};
