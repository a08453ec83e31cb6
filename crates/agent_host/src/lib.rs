//! Agent Host - conversation and workflow logic for ConsultBot
//!
//! This crate provides:
//! - Role presets and the prompt texts each action sends
//! - Prompt assembly from role, knowledge base and history
//! - The explicit per-session state object
//! - Multi-step workflows over the remote capabilities

pub mod assembler;
pub mod prompts;
pub mod session;
pub mod workflows;

pub use prompts::{find_role, Role, ROLES};
pub use session::{RoleChange, Session};

use services::documents::ExtractionError;
use shared::error::{FailureKind, GatewayError};
use shared::settings::SettingsError;
use thiserror::Error;

/// Failure of one user action. None of these end the session.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    InvalidInput(String),
}

impl WorkflowError {
    pub fn invalid(message: impl Into<String>) -> Self {
        WorkflowError::InvalidInput(message.into())
    }

    /// Failure category, or `None` for rejected input.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            WorkflowError::Gateway(e) => Some(e.kind()),
            WorkflowError::Extraction(_) => Some(FailureKind::Extraction),
            WorkflowError::InvalidInput(_) => None,
        }
    }
}

impl From<SettingsError> for WorkflowError {
    fn from(e: SettingsError) -> Self {
        WorkflowError::InvalidInput(e.to_string())
    }
}
