// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The policy gate: maps (request, caller privilege, policy) to allow or a
//! specific denial before any handler runs.
//!
//! Deeper value-level checks happen in the state setters; this layer
//! decides whether the request class is admissible at all.

use crate::config::{Allowance, PolicyConfig};
use crate::error::AgentError;
use crate::frame::RequestKind;
use crate::state::{flags, FieldId};

/// Immutable facts about the caller and session the gate decides on.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub privileged: bool,
    pub has_state: bool,
    pub policy: &'a PolicyConfig,
}

/// Verify a request against policy.
///
/// `peek_flags` supplies the flags of the user's *persisted* state (or
/// `None` when there is none); it is only consulted for `StateNew`, which
/// must inspect existing state it is about to replace. The callback keeps
/// the gate itself free of storage concerns.
pub fn verify(
    kind: RequestKind,
    int_arg: i32,
    ctx: &GateContext<'_>,
    peek_flags: impl FnOnce() -> Result<Option<u32>, AgentError>,
) -> Result<(), AgentError> {
    let policy = ctx.policy;
    match kind {
        // Only an administrator may select the target username.
        RequestKind::UserSet => {
            if ctx.privileged {
                Ok(())
            } else {
                Err(AgentError::PolicyDenied)
            }
        }

        RequestKind::Disconnect => Ok(()),

        RequestKind::KeyGenerate => {
            if !ctx.privileged && !policy.allow_key_generation {
                return Err(AgentError::PolicyDenied);
            }
            Ok(())
        }

        RequestKind::KeyRemove => {
            if !ctx.privileged && !policy.allow_key_removal {
                return Err(AgentError::PolicyDenied);
            }
            Ok(())
        }

        RequestKind::Authenticate => {
            if !ctx.privileged && !policy.allow_shell_auth {
                return Err(AgentError::PolicyDenied);
            }
            Ok(())
        }

        // Replacing state must respect what is already on disk: a disabled
        // state may not be regenerated away, and regeneration itself can be
        // forbidden.
        RequestKind::StateNew => {
            if ctx.has_state {
                return Err(AgentError::MustDropState);
            }
            if ctx.privileged {
                return Ok(());
            }
            match peek_flags()? {
                None => {
                    // No existing state: plain generation.
                    if !policy.allow_key_generation {
                        return Err(AgentError::PolicyGeneration);
                    }
                    Ok(())
                }
                Some(stored_flags) => {
                    if stored_flags & flags::DISABLED != 0 && !policy.allow_disabling {
                        return Err(AgentError::PolicyDenied);
                    }
                    if !policy.allow_key_regeneration {
                        return Err(AgentError::PolicyRegeneration);
                    }
                    Ok(())
                }
            }
        }

        RequestKind::StateLoad
        | RequestKind::StateStore
        | RequestKind::StateDrop
        | RequestKind::GetNum
        | RequestKind::GetInt
        | RequestKind::GetWarnings
        | RequestKind::UpdateLatest
        | RequestKind::GetPrompt
        | RequestKind::FlagGet
        | RequestKind::GetAlphabet
        | RequestKind::SetNum
        | RequestKind::SetInt
        | RequestKind::SetStr
        | RequestKind::SetSpass => Ok(()),

        RequestKind::GetStr => {
            let field = FieldId::from_code(int_arg);
            let is_key_material =
                matches!(field, Some(FieldId::Key) | Some(FieldId::Counter));
            if is_key_material && !policy.allow_key_print && !ctx.privileged {
                return Err(AgentError::PolicyDenied);
            }
            Ok(())
        }

        RequestKind::GetPasscode => {
            if !ctx.privileged && !policy.allow_passcode_print {
                return Err(AgentError::PolicyDenied);
            }
            Ok(())
        }

        RequestKind::Skip => {
            if !ctx.privileged && !policy.allow_skipping {
                return Err(AgentError::PolicyDenied);
            }
            Ok(())
        }

        RequestKind::FlagAdd => {
            let mask = int_arg as u32;
            // No one, root included, may salt against a disallow policy.
            if mask & flags::SALTED != 0 && policy.salt == Allowance::Disallow {
                return Err(AgentError::PolicySalt);
            }
            if ctx.privileged {
                return Ok(());
            }
            if mask & flags::DISABLED != 0 && !policy.allow_disabling {
                return Err(AgentError::PolicyDisabled);
            }
            if mask & flags::SHOW != 0 && policy.show == Allowance::Disallow {
                return Err(AgentError::PolicyShow);
            }
            Ok(())
        }

        RequestKind::FlagClear => {
            let mask = int_arg as u32;
            // Clearing an enforced salt is off-limits even for root.
            if mask & flags::SALTED != 0 && policy.salt == Allowance::Enforce {
                return Err(AgentError::PolicySalt);
            }
            if ctx.privileged {
                return Ok(());
            }
            if mask & flags::DISABLED != 0 && !policy.allow_disabling {
                return Err(AgentError::PolicyDisabled);
            }
            if mask & flags::SHOW != 0 && policy.show == Allowance::Enforce {
                return Err(AgentError::PolicyShow);
            }
            Ok(())
        }

        // Init and Reply are never valid as incoming requests.
        RequestKind::Init | RequestKind::Reply => Err(AgentError::BadRequest),
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
