//! jobscout - client-side orchestrator for remote job-scraping sessions
//!
//! Starts scraping runs on a backend, polls their progress, resumes
//! interrupted starts, and presents results.

pub mod api;
pub mod config;
pub mod logging;
pub mod results;
pub mod services;
pub mod session;
pub mod state;
