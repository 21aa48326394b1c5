//! upkeep - application deployment and maintenance tracker
//!
//! Connects a user's GitHub, Vercel and Cloudflare Pages accounts, pulls
//! deployment state into one canonical model, and keeps an append-only log
//! of maintenance runs with a derived per-application checklist.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod render;
pub mod storage;

pub use error::{ExitCode, Result, UpkeepError};
