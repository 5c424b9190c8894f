//! Auto-resume of a start request interrupted by leaving the process.
//!
//! A writer arms two durable flags before exiting; the next controller
//! mount consumes them exactly once. Both keys are cleared before any start
//! call is made, so a failed resumed start is never replayed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::controller::{SessionController, StartError, StartStrategy};
use crate::state::{FlagStore, StoreError};

pub const AUTO_START_KEY: &str = "autoStartGreenhouseScraping";
pub const CREDENTIALS_KEY: &str = "greenhouseCredentials";

/// Credentials payload stored under [`CREDENTIALS_KEY`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub use_verification_code: bool,
}

/// What a mount should do with the consumed flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeAction {
    Nothing,
    /// Open the verification prompt for this email; no network call
    ShowVerification { email: String },
    Start(StartStrategy),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// A session or poll loop already exists
    Skipped,
    NotArmed,
    AwaitingVerification { email: String },
    Started(Result<String, StartError>),
}

/// Arm an auto-start for the next mount
pub fn arm(store: &dyn FlagStore, credentials: &StoredCredentials) -> Result<(), StoreError> {
    store.set(CREDENTIALS_KEY, &serde_json::to_string(credentials)?)?;
    store.set(AUTO_START_KEY, "true")?;
    Ok(())
}

/// Read and clear the resume flags, returning what to do.
///
/// Flags are only touched when the auto-start flag is set. If they cannot
/// be cleared the resume is abandoned rather than risk a second replay.
pub fn consume(store: &dyn FlagStore) -> ResumeAction {
    match store.get(AUTO_START_KEY) {
        Ok(Some(flag)) if flag == "true" => {}
        Ok(_) => return ResumeAction::Nothing,
        Err(e) => {
            warn!(error = %e, "Could not read auto-start flag");
            return ResumeAction::Nothing;
        }
    }

    let stored = match store.get(CREDENTIALS_KEY) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Could not read stored credentials");
            None
        }
    };

    let cleared = [AUTO_START_KEY, CREDENTIALS_KEY]
        .into_iter()
        .map(|key| store.remove(key))
        .collect::<Result<Vec<_>, _>>();
    if let Err(e) = cleared {
        warn!(error = %e, "Could not clear auto-start flags, skipping resume");
        return ResumeAction::Nothing;
    }

    let credentials = stored.and_then(|raw| {
        serde_json::from_str::<StoredCredentials>(&raw)
            .map_err(|e| warn!(error = %e, "Ignoring unreadable stored credentials"))
            .ok()
    });

    match credentials {
        Some(c) if c.use_verification_code => ResumeAction::ShowVerification { email: c.email },
        Some(StoredCredentials {
            email,
            password: Some(password),
            ..
        }) if !password.is_empty() => {
            ResumeAction::Start(StartStrategy::Credentials { email, password })
        }
        _ => ResumeAction::Start(StartStrategy::Demo),
    }
}

/// Drop an armed resume because the user chose another way to start.
///
/// Returns true if a pending resume was discarded.
pub fn discard_armed(store: &dyn FlagStore) -> bool {
    match consume(store) {
        ResumeAction::Nothing => false,
        action => {
            let kind = match &action {
                ResumeAction::Start(strategy) => strategy.kind(),
                _ => "verification",
            };
            info!(kind, "Discarding armed auto-start in favour of an explicit start");
            true
        }
    }
}

/// Run the resume check for a freshly constructed controller
pub async fn resume_on_mount(
    controller: &SessionController,
    store: &dyn FlagStore,
) -> ResumeOutcome {
    if controller.has_session() || controller.is_polling() {
        debug!("Session already active, auto-resume skipped");
        return ResumeOutcome::Skipped;
    }

    match consume(store) {
        ResumeAction::Nothing => ResumeOutcome::NotArmed,
        ResumeAction::ShowVerification { email } => {
            info!("Resuming into email verification");
            ResumeOutcome::AwaitingVerification { email }
        }
        ResumeAction::Start(strategy) => {
            info!(strategy = strategy.kind(), "Resuming scraping session start");
            ResumeOutcome::Started(controller.start(strategy).await)
        }
    }
}
