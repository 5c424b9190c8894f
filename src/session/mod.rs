//! Scraping session orchestration.
//!
//! - `pipeline`: the fixed six-step progress pipeline and its projection
//! - `model` / `status`: the session record and its state machine
//! - `controller`: starts sessions and drives the poll loop
//! - `verification`: email one-time-code start
//! - `resume`: durable auto-start across process runs

pub mod controller;
pub mod model;
pub mod pipeline;
pub mod resume;
pub mod status;
pub mod verification;

pub use controller::{
    ControllerSettings, SessionController, SessionEvent, StartError, StartStrategy,
};
pub use model::{MergeOutcome, Session};
pub use pipeline::{default_pipeline, project, ProgressModel, Step, StepId, StepStatus};
pub use resume::{ResumeAction, ResumeOutcome, StoredCredentials};
pub use status::{ServerStatus, SessionStatus};
pub use verification::{
    sanitize_code, VerificationError, VerificationFlow, VerificationListener, VerificationStep,
};
