//! Pipeline integration test suite.
//!
//! Each test runs against its own migrated in-memory SQLite database with a
//! scripted test tool, so no external services are needed.
//!
//! Run with: cargo test --test pipeline

mod test_helpers;

mod test_authorization;
mod test_automated_runs;
mod test_escalation;
mod test_recovery;
