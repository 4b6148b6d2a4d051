//! Error kinds shared by every stage of a naming session.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Bad participant identifier or configuration value. The session never starts.
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// A stimulus asset or the audio source could not be acquired during preload.
    #[error("Failed to acquire {resource}: {message}")]
    ResourceAcquisition { resource: String, message: String },

    /// The audio source failed while a trial was running.
    #[error("Capture failed during trial {trial}: {message}")]
    Capture { trial: usize, message: String },

    #[error("A capture window is already active")]
    WindowAlreadyActive,

    #[error("Session aborted: {reason}")]
    Aborted { reason: String },

    #[error("Another session is already active in this process")]
    SessionActive,
}

impl SessionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn resource(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceAcquisition {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn capture(trial: usize, message: impl Into<String>) -> Self {
        Self::Capture {
            trial,
            message: message.into(),
        }
    }

    /// Errors raised before any timing began; no session state exists yet.
    pub fn is_preload_failure(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::ResourceAcquisition { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
