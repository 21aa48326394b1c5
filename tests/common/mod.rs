//! Common test utilities and fixtures for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: engine builders and provider response bodies
//! - `log_capture`: tracing layer that records events for assertions

#![allow(dead_code)]

pub mod fixtures;
pub mod log_capture;
