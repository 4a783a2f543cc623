//! QA test execution and defect-escalation pipeline.
//!
//! This library provides the authorization engine, the test run lifecycle,
//! the external test tool runner and the escalation of automated failures
//! into tickets and notifications.

pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod migration;
pub mod models;
pub mod services;
