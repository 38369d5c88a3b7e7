//! Connects a Scrum game to external issue trackers.
//!
//! [`services::ImsConnector`] is the contract every tracker implements;
//! [`infra::jira::JiraConnector`] talks to Jira Cloud and
//! [`infra::memory::InMemoryConnector`] keeps a tracker in process.

pub mod cache;
pub mod cmd;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;
pub mod workflow;
