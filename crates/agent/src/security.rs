// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Privilege detection and username validation.

use nix::unistd::{Uid, User};

use crate::error::AgentError;

/// When set, the agent treats the caller as unprivileged even if running
/// as root. Only ever narrows rights, never widens them; used by test
/// harnesses and cautious operators.
pub const DROP_PRIVILEGE_ENV: &str = "OTPCARD_DROP_PRIVILEGE";

pub const USERNAME_MAX: usize = 32;

/// Whether the calling user may bind the session to arbitrary usernames.
pub fn is_privileged() -> bool {
    if std::env::var_os(DROP_PRIVILEGE_ENV).is_some() {
        return false;
    }
    Uid::current().is_root()
}

/// Validate an untrusted username coming off the wire.
pub fn parse_user(raw: &str) -> Result<String, AgentError> {
    if raw.is_empty() || raw.len() > USERNAME_MAX {
        return Err(AgentError::BadArg);
    }
    if raw.starts_with('-') {
        return Err(AgentError::BadArg);
    }
    if !raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(AgentError::BadArg);
    }
    Ok(raw.to_owned())
}

/// Name of the invoking user; the initial binding of every session.
pub fn current_username() -> Result<String, AgentError> {
    let user = User::from_uid(Uid::current())
        .map_err(|_| AgentError::Internal)?
        .ok_or(AgentError::Internal)?;
    Ok(user.name)
}

#[cfg(test)]
#[path = "security_tests.rs"]
mod tests;
