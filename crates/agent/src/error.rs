// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Closed set of status codes carried in reply frames.
///
/// The numeric codes are part of the wire protocol and never change for a
/// given protocol version. `0` on the wire means success and has no variant
/// here; see [`AgentError::from_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentError {
    // Protocol
    ProtocolMismatch,
    Disconnected,
    Timeout,
    BadRequest,
    BadArg,
    // Lifecycle
    NoState,
    MustDropState,
    MustCreateState,
    // Policy
    PolicyDenied,
    PolicyGeneration,
    PolicyRegeneration,
    PolicySalt,
    PolicyDisabled,
    PolicyShow,
    // Storage
    Locked,
    IoError,
    CorruptState,
    NumSpace,
    // Validation
    Range,
    IllegalChar,
    TooLong,
    SpassSet,
    SpassUnset,
    AuthFailed,
    // Fatal
    Memory,
    Internal,
    // Agent startup (Init frame only)
    ConfigOwnership,
    ConfigPermissions,
}

impl AgentError {
    /// Wire code for this error. Success is `0` and is not representable here.
    pub fn code(&self) -> i32 {
        match self {
            Self::ProtocolMismatch => 100,
            Self::Disconnected => 101,
            Self::Timeout => 102,
            Self::BadRequest => 103,
            Self::BadArg => 104,
            Self::NoState => 110,
            Self::MustDropState => 111,
            Self::MustCreateState => 112,
            Self::PolicyDenied => 120,
            Self::PolicyGeneration => 121,
            Self::PolicyRegeneration => 122,
            Self::PolicySalt => 123,
            Self::PolicyDisabled => 124,
            Self::PolicyShow => 125,
            Self::Locked => 130,
            Self::IoError => 131,
            Self::CorruptState => 132,
            Self::NumSpace => 133,
            Self::Range => 140,
            Self::IllegalChar => 141,
            Self::TooLong => 142,
            Self::SpassSet => 143,
            Self::SpassUnset => 144,
            Self::AuthFailed => 145,
            Self::Memory => 150,
            Self::Internal => 151,
            Self::ConfigOwnership => 160,
            Self::ConfigPermissions => 161,
        }
    }

    /// Decode a wire code. Returns `None` for `0` (success) and for codes
    /// this build does not know about.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            100 => Self::ProtocolMismatch,
            101 => Self::Disconnected,
            102 => Self::Timeout,
            103 => Self::BadRequest,
            104 => Self::BadArg,
            110 => Self::NoState,
            111 => Self::MustDropState,
            112 => Self::MustCreateState,
            120 => Self::PolicyDenied,
            121 => Self::PolicyGeneration,
            122 => Self::PolicyRegeneration,
            123 => Self::PolicySalt,
            124 => Self::PolicyDisabled,
            125 => Self::PolicyShow,
            130 => Self::Locked,
            131 => Self::IoError,
            132 => Self::CorruptState,
            133 => Self::NumSpace,
            140 => Self::Range,
            141 => Self::IllegalChar,
            142 => Self::TooLong,
            143 => Self::SpassSet,
            144 => Self::SpassUnset,
            145 => Self::AuthFailed,
            150 => Self::Memory,
            151 => Self::Internal,
            160 => Self::ConfigOwnership,
            161 => Self::ConfigPermissions,
            _ => return None,
        })
    }

    /// Interpret a reply frame status field.
    ///
    /// Unknown non-zero codes map to [`AgentError::Internal`] so a newer
    /// peer never turns into silent success.
    pub fn from_status(status: i32) -> Result<(), AgentError> {
        if status == 0 {
            return Ok(());
        }
        Err(Self::from_code(status).unwrap_or(Self::Internal))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProtocolMismatch => "PROTOCOL_MISMATCH",
            Self::Disconnected => "DISCONNECTED",
            Self::Timeout => "TIMEOUT",
            Self::BadRequest => "BAD_REQUEST",
            Self::BadArg => "BAD_ARG",
            Self::NoState => "NO_STATE",
            Self::MustDropState => "MUST_DROP_STATE",
            Self::MustCreateState => "MUST_CREATE_STATE",
            Self::PolicyDenied => "POLICY_DENIED",
            Self::PolicyGeneration => "POLICY_GENERATION",
            Self::PolicyRegeneration => "POLICY_REGENERATION",
            Self::PolicySalt => "POLICY_SALT",
            Self::PolicyDisabled => "POLICY_DISABLED",
            Self::PolicyShow => "POLICY_SHOW",
            Self::Locked => "LOCKED",
            Self::IoError => "IO_ERROR",
            Self::CorruptState => "CORRUPT_STATE",
            Self::NumSpace => "NUM_SPACE",
            Self::Range => "RANGE",
            Self::IllegalChar => "ILLEGAL_CHAR",
            Self::TooLong => "TOO_LONG",
            Self::SpassSet => "SPASS_SET",
            Self::SpassUnset => "SPASS_UNSET",
            Self::AuthFailed => "AUTH_FAILED",
            Self::Memory => "MEMORY",
            Self::Internal => "INTERNAL",
            Self::ConfigOwnership => "CONFIG_OWNERSHIP",
            Self::ConfigPermissions => "CONFIG_PERMISSIONS",
        }
    }

    /// Single translation point from status codes to user-facing text.
    pub fn message(&self) -> &'static str {
        match self {
            Self::ProtocolMismatch => "Agent protocol mismatch. Reinstall the software.",
            Self::Disconnected => "Agent unexpectedly disconnected.",
            Self::Timeout => "Timed out waiting for the agent.",
            Self::BadRequest => "Malformed request.",
            Self::BadArg => "Illegal request argument.",
            Self::NoState => "No OTP state found. Generate a key first.",
            Self::MustDropState => "State already loaded; drop it first.",
            Self::MustCreateState => "A new state must be created first.",
            Self::PolicyDenied => "Denied by policy.",
            Self::PolicyGeneration => "Key generation denied by policy.",
            Self::PolicyRegeneration => "Key regeneration denied by policy.",
            Self::PolicySalt => "Salt configuration denied by policy.",
            Self::PolicyDisabled => "Changing the disabled flag denied by policy.",
            Self::PolicyShow => "Changing the show flag denied by policy.",
            Self::Locked => "State file is locked by another process.",
            Self::IoError => "Error while accessing the state file.",
            Self::CorruptState => "State file is corrupted.",
            Self::NumSpace => "No passcodes left in the counter space.",
            Self::Range => "Value out of range.",
            Self::IllegalChar => "Value contains illegal characters.",
            Self::TooLong => "Value is too long.",
            Self::SpassSet => "Static password set.",
            Self::SpassUnset => "Static password unset.",
            Self::AuthFailed => "Authentication failed.",
            Self::Memory => "Out of memory.",
            Self::Internal => "Internal agent error.",
            Self::ConfigOwnership => "Agent config file must be owned by root.",
            Self::ConfigPermissions => "Agent config file permissions are too broad.",
        }
    }

    /// Whether the dispatcher must terminate the session on this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProtocolMismatch | Self::Disconnected | Self::Memory | Self::Internal
        )
    }

    /// Success-with-info codes reported through the error channel.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::SpassSet | Self::SpassUnset)
    }

    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            Self::PolicyDenied
                | Self::PolicyGeneration
                | Self::PolicyRegeneration
                | Self::PolicySalt
                | Self::PolicyDisabled
                | Self::PolicyShow
        )
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for AgentError {}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NoState,
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => {
                Self::Disconnected
            }
            _ => Self::IoError,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
