//! Error types for the licensing module.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// A required field was empty after trimming.
    #[error("invalid input: {0} is required")]
    InvalidInput(&'static str),

    /// The directory already holds a user with this id or code.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No directory user matches the name/code pair.
    #[error("invalid credentials: no user matches this name and code")]
    InvalidCredentials,

    /// The code is on the disabled list.
    #[error("code {0} is disabled")]
    Disabled(String),

    /// The code was seen on a second device and has been disabled.
    #[error("code {code} is bound to another device ({bound_to})")]
    Violation {
        /// The offending code.
        code: String,
        /// The device that holds the binding.
        bound_to: String,
    },

    /// Network or backend failure talking to the directory.
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Stable, machine-readable reason codes for rejections and locks.
///
/// `Expired` and `SettingsDrifted` only arise as lock reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    InvalidInput,
    InvalidCredentials,
    Disabled,
    Violation,
    Expired,
    SettingsDrifted,
    DirectoryUnavailable,
    Storage,
}

impl Reason {
    /// Returns the wire name of this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Disabled => "disabled",
            Self::Violation => "violation",
            Self::Expired => "expired",
            Self::SettingsDrifted => "settings_drifted",
            Self::DirectoryUnavailable => "directory_unavailable",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LicenseError {
    /// Returns the reason code for this error.
    #[must_use]
    pub fn reason(&self) -> Reason {
        match self {
            Self::InvalidInput(_) | Self::Conflict(_) => Reason::InvalidInput,
            Self::InvalidCredentials => Reason::InvalidCredentials,
            Self::Disabled(_) => Reason::Disabled,
            Self::Violation { .. } => Reason::Violation,
            Self::DirectoryUnavailable(_) => Reason::DirectoryUnavailable,
            Self::Storage(_) | Self::Serialization(_) => Reason::Storage,
        }
    }

    /// Returns true if the user can recover by re-submitting credentials.
    ///
    /// `Disabled` and `Violation` stay terminal until an administrator
    /// re-enables the code.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Disabled(_) | Self::Violation { .. })
    }

    /// Returns true for the credential mismatch an operator may override
    /// with `force_accept`.
    #[must_use]
    pub fn is_overridable(&self) -> bool {
        matches!(self, Self::InvalidCredentials)
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
